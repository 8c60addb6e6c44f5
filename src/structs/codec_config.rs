//! Codec config OBU and the per-codec decoder configs.

use crate::utils::bits::StreamBuffer;
use crate::utils::errors::ObuError;

/// Four-character codec identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecId {
    /// "ipcm"
    Lpcm,
    /// "Opus"
    Opus,
    /// "fLaC"
    Flac,
    /// "mp4a"
    AacLc,
}

impl CodecId {
    pub fn from_fourcc(fourcc: u32) -> Option<Self> {
        match fourcc {
            0x6970_636D => Some(CodecId::Lpcm),
            0x4F70_7573 => Some(CodecId::Opus),
            0x664C_6143 => Some(CodecId::Flac),
            0x6D70_3461 => Some(CodecId::AacLc),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LpcmConfig {
    pub little_endian: bool,
    pub sample_size: u8,
    pub sample_rate: u32,
}

impl LpcmConfig {
    fn read(buf: &mut StreamBuffer) -> Result<Self, ObuError> {
        let sample_format_flags = buf.read_u8()?;
        let little_endian = match sample_format_flags {
            0 => false,
            1 => true,
            other => {
                return Err(ObuError::Malformed(format!(
                    "invalid sample_format_flags {other}"
                )))
            }
        };
        let sample_size = buf.read_u8()?;
        if !matches!(sample_size, 16 | 24 | 32) {
            return Err(ObuError::Malformed(format!(
                "invalid LPCM sample_size {sample_size}"
            )));
        }
        let sample_rate = buf.read_u32()?;
        if !matches!(sample_rate, 16_000 | 32_000 | 44_100 | 48_000 | 96_000) {
            return Err(ObuError::Malformed(format!(
                "invalid LPCM sample_rate {sample_rate}"
            )));
        }
        Ok(Self {
            little_endian,
            sample_size,
            sample_rate,
        })
    }
}

#[derive(Debug, Clone)]
pub struct OpusConfig {
    pub version: u8,
    pub output_channel_count: u8,
    pub pre_skip: u16,
    pub input_sample_rate: u32,
    pub output_gain: i16,
    pub mapping_family: u8,
}

impl OpusConfig {
    fn read(buf: &mut StreamBuffer) -> Result<Self, ObuError> {
        let config = Self {
            version: buf.read_u8()?,
            output_channel_count: buf.read_u8()?,
            pre_skip: buf.read_u16()?,
            input_sample_rate: buf.read_u32()?,
            output_gain: buf.read_i16()?,
            mapping_family: buf.read_u8()?,
        };
        if config.version != 1 {
            return Err(ObuError::Malformed(format!(
                "unsupported Opus version {}",
                config.version
            )));
        }
        Ok(config)
    }
}

#[derive(Debug, Clone)]
pub struct FlacConfig {
    pub minimum_block_size: u16,
    pub maximum_block_size: u16,
    pub sample_rate: u32,
    pub number_of_channels: u8,
    pub bits_per_sample: u8,
    pub total_samples_in_stream: u64,
    /// Raw STREAMINFO payload, handed to the FLAC decoder as extra data.
    pub streaminfo: Vec<u8>,
}

impl FlacConfig {
    fn read(buf: &mut StreamBuffer) -> Result<Self, ObuError> {
        // METADATA_BLOCK sequence; STREAMINFO must come first, everything
        // else is skipped.
        let mut streaminfo: Option<Vec<u8>> = None;
        loop {
            let last_block = buf.read_bool()?;
            let block_type = buf.read_bits(7)? as u8;
            let block_len = buf.read_bits(24)? as usize;
            let payload = buf.read_vec(block_len)?;
            if block_type == 0 {
                if streaminfo.is_some() {
                    return Err(ObuError::Malformed(
                        "duplicate FLAC STREAMINFO block".into(),
                    ));
                }
                if block_len < 34 {
                    return Err(ObuError::Malformed(format!(
                        "FLAC STREAMINFO block of {block_len} bytes is too short"
                    )));
                }
                streaminfo = Some(payload);
            } else {
                log::debug!("skipping FLAC metadata block type {block_type}");
            }
            if last_block {
                break;
            }
        }
        let streaminfo =
            streaminfo.ok_or_else(|| ObuError::Malformed("missing FLAC STREAMINFO".into()))?;

        let mut info = StreamBuffer::from_bytes(&streaminfo);
        let minimum_block_size = info.read_u16()?;
        let maximum_block_size = info.read_u16()?;
        info.skip_bits(24 + 24)?; // min/max frame size
        let sample_rate = info.read_bits(20)? as u32;
        let number_of_channels = info.read_bits(3)? as u8 + 1;
        let bits_per_sample = info.read_bits(5)? as u8 + 1;
        let total_samples_in_stream = info.read_bits(36)?;
        if sample_rate == 0 {
            return Err(ObuError::Malformed("FLAC sample_rate is zero".into()));
        }
        Ok(Self {
            minimum_block_size,
            maximum_block_size,
            sample_rate,
            number_of_channels,
            bits_per_sample,
            total_samples_in_stream,
            streaminfo,
        })
    }
}

#[derive(Debug, Clone)]
pub struct AacConfig {
    pub audio_object_type: u8,
    pub sample_rate: u32,
    pub channel_configuration: u8,
    /// Raw AudioSpecificConfig, handed to the AAC decoder as extra data.
    pub audio_specific_config: Vec<u8>,
}

impl AacConfig {
    const DECODER_CONFIG_DESCRIPTOR_TAG: u8 = 0x04;
    const DECODER_SPECIFIC_INFO_TAG: u8 = 0x05;

    fn read(buf: &mut StreamBuffer) -> Result<Self, ObuError> {
        // DecoderConfigDescriptor per ISO 14496-1.
        let tag = buf.read_u8()?;
        if tag != Self::DECODER_CONFIG_DESCRIPTOR_TAG {
            return Err(ObuError::Malformed(format!(
                "unexpected DecoderConfigDescriptor tag {tag:#04x}"
            )));
        }
        let (_descriptor_size, _) = buf.read_expandable_size()?;
        let _object_type_indication = buf.read_u8()?;
        let _stream_type = buf.read_bits(6)? as u8;
        let _upstream = buf.read_bool()?;
        let _reserved = buf.read_bool()?;
        buf.skip_bits(24)?; // buffer_size_db
        buf.skip_bits(32)?; // max_bitrate
        buf.skip_bits(32)?; // average_bitrate

        let tag = buf.read_u8()?;
        if tag != Self::DECODER_SPECIFIC_INFO_TAG {
            return Err(ObuError::Malformed(format!(
                "unexpected DecoderSpecificInfo tag {tag:#04x}"
            )));
        }
        let (asc_size, _) = buf.read_expandable_size()?;
        let audio_specific_config = buf.read_vec(asc_size as usize)?;

        let mut asc = StreamBuffer::from_bytes(&audio_specific_config);
        let audio_object_type = asc.read_bits(5)? as u8;
        if audio_object_type != 2 {
            return Err(ObuError::Malformed(format!(
                "audio_object_type {audio_object_type} is not AAC-LC"
            )));
        }
        let sample_frequency_index = asc.read_bits(4)? as u8;
        let sample_rate = match sample_frequency_index {
            0 => 96_000,
            1 => 88_200,
            2 => 64_000,
            3 => 48_000,
            4 => 44_100,
            5 => 32_000,
            6 => 24_000,
            7 => 22_050,
            8 => 16_000,
            9 => 12_000,
            10 => 11_025,
            11 => 8_000,
            12 => 7_350,
            15 => asc.read_bits(24)? as u32,
            other => {
                return Err(ObuError::Malformed(format!(
                    "reserved sample_frequency_index {other}"
                )))
            }
        };
        let channel_configuration = asc.read_bits(4)? as u8;

        Ok(Self {
            audio_object_type,
            sample_rate,
            channel_configuration,
            audio_specific_config,
        })
    }
}

#[derive(Debug, Clone)]
pub enum DecoderConfig {
    Lpcm(LpcmConfig),
    Opus(OpusConfig),
    Flac(FlacConfig),
    Aac(AacConfig),
}

/// A parsed codec config OBU.
#[derive(Debug, Clone)]
pub struct CodecConfig {
    pub id: u32,
    pub num_samples_per_frame: u32,
    pub audio_roll_distance: i16,
    pub decoder_config: DecoderConfig,
}

impl CodecConfig {
    pub fn read(payload_size: u64, buf: &mut StreamBuffer) -> Result<Self, ObuError> {
        let start = buf.tell();
        let (id, _) = buf.read_uleb128()?;
        let fourcc = buf.read_u32()?;
        let codec_id = CodecId::from_fourcc(fourcc).ok_or_else(|| {
            ObuError::Malformed(format!("unknown codec_id fourcc {fourcc:#010x}"))
        })?;
        let (num_samples_per_frame, _) = buf.read_uleb128()?;
        if num_samples_per_frame == 0 {
            return Err(ObuError::Malformed("num_samples_per_frame is zero".into()));
        }
        let audio_roll_distance = buf.read_i16()?;

        let decoder_config = match codec_id {
            CodecId::Lpcm => DecoderConfig::Lpcm(LpcmConfig::read(buf)?),
            CodecId::Opus => DecoderConfig::Opus(OpusConfig::read(buf)?),
            CodecId::Flac => DecoderConfig::Flac(FlacConfig::read(buf)?),
            CodecId::AacLc => DecoderConfig::Aac(AacConfig::read(buf)?),
        };

        let consumed = buf.tell() - start;
        let payload_bits = payload_size << 3;
        if consumed > payload_bits {
            return Err(ObuError::Malformed(
                "decoder config overran the codec config payload".into(),
            ));
        }
        buf.skip_bits(payload_bits - consumed)?;

        Ok(Self {
            id,
            num_samples_per_frame,
            audio_roll_distance,
            decoder_config,
        })
    }

    pub fn codec_id(&self) -> CodecId {
        match self.decoder_config {
            DecoderConfig::Lpcm(_) => CodecId::Lpcm,
            DecoderConfig::Opus(_) => CodecId::Opus,
            DecoderConfig::Flac(_) => CodecId::Flac,
            DecoderConfig::Aac(_) => CodecId::AacLc,
        }
    }

    /// Output sample rate of decoded audio.
    pub fn sample_rate(&self) -> u32 {
        match &self.decoder_config {
            DecoderConfig::Lpcm(c) => c.sample_rate,
            // Opus always decodes at 48 kHz; input_sample_rate is
            // informational.
            DecoderConfig::Opus(_) => 48_000,
            DecoderConfig::Flac(c) => c.sample_rate,
            DecoderConfig::Aac(c) => c.sample_rate,
        }
    }

    pub fn frame_size(&self) -> u32 {
        self.num_samples_per_frame
    }

    pub fn bit_depth(&self) -> u8 {
        match &self.decoder_config {
            DecoderConfig::Lpcm(c) => c.sample_size,
            DecoderConfig::Opus(_) => 16,
            DecoderConfig::Flac(c) => c.bits_per_sample,
            DecoderConfig::Aac(_) => 16,
        }
    }
}

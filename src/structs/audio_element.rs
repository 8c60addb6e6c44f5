//! Audio element OBU.
//!
//! Binds a group of coded substreams to either a scalable channel layout or
//! an ambisonics configuration, plus the parameter definitions that drive
//! demixing and recon gain.

use crate::structs::param::{DemixingParamDefinition, ParamDefinition};
use crate::utils::bits::StreamBuffer;
use crate::utils::errors::ObuError;

#[derive(Debug, Clone)]
pub struct ChannelAudioLayerConfig {
    pub loudspeaker_layout: u8,
    pub output_gain_is_present: bool,
    pub recon_gain_is_present: bool,
    pub substream_count: u8,
    pub coupled_substream_count: u8,
    pub output_gain_flag: u8,
    pub output_gain: i16,
    pub expanded_loudspeaker_layout: Option<u8>,
}

impl ChannelAudioLayerConfig {
    fn read(buf: &mut StreamBuffer) -> Result<Self, ObuError> {
        let loudspeaker_layout = buf.read_bits(4)? as u8;
        let output_gain_is_present = buf.read_bool()?;
        let recon_gain_is_present = buf.read_bool()?;
        let _reserved = buf.read_bits(2)?;
        let substream_count = buf.read_u8()?;
        let coupled_substream_count = buf.read_u8()?;
        let mut output_gain_flag = 0;
        let mut output_gain = 0;
        if output_gain_is_present {
            output_gain_flag = buf.read_bits(6)? as u8;
            let _reserved = buf.read_bits(2)?;
            output_gain = buf.read_i16()?;
        }
        let expanded_loudspeaker_layout = if loudspeaker_layout == 15 {
            Some(buf.read_u8()?)
        } else {
            None
        };
        Ok(Self {
            loudspeaker_layout,
            output_gain_is_present,
            recon_gain_is_present,
            substream_count,
            coupled_substream_count,
            output_gain_flag,
            output_gain,
            expanded_loudspeaker_layout,
        })
    }

    /// Channels carried by this layer's substreams.
    pub fn channel_count(&self) -> usize {
        self.substream_count as usize + self.coupled_substream_count as usize
    }
}

#[derive(Debug, Clone)]
pub struct ScalableChannelLayoutConfig {
    pub layers: Vec<ChannelAudioLayerConfig>,
}

impl ScalableChannelLayoutConfig {
    fn read(buf: &mut StreamBuffer) -> Result<Self, ObuError> {
        let num_layers = buf.read_bits(3)? as usize;
        let _reserved = buf.read_bits(5)?;
        if num_layers == 0 {
            return Err(ObuError::Malformed(
                "scalable channel layout needs at least one layer".into(),
            ));
        }
        let mut layers = Vec::with_capacity(num_layers);
        for _ in 0..num_layers {
            layers.push(ChannelAudioLayerConfig::read(buf)?);
        }
        Ok(Self { layers })
    }
}

#[derive(Debug, Clone)]
pub struct AmbisonicsMonoConfig {
    pub output_channel_count: u8,
    pub substream_count: u8,
    /// ACN channel index to substream index; 255 marks an inactive channel.
    pub channel_mapping: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct AmbisonicsProjectionConfig {
    pub output_channel_count: u8,
    pub substream_count: u8,
    pub coupled_substream_count: u8,
    /// Row-major (substream channels x output channels) Q1.14 matrix.
    pub demixing_matrix: Vec<i16>,
}

#[derive(Debug, Clone)]
pub enum AmbisonicsConfig {
    Mono(AmbisonicsMonoConfig),
    Projection(AmbisonicsProjectionConfig),
}

impl AmbisonicsConfig {
    fn read(num_substreams: u32, buf: &mut StreamBuffer) -> Result<Self, ObuError> {
        let (mode, _) = buf.read_uleb128()?;
        match mode {
            0 => {
                let output_channel_count = buf.read_u8()?;
                let substream_count = buf.read_u8()?;
                if u32::from(substream_count) != num_substreams {
                    return Err(ObuError::Malformed(format!(
                        "ambisonics substream_count {substream_count} disagrees with \
                         num_substreams {num_substreams}"
                    )));
                }
                let channel_mapping = buf.read_vec(output_channel_count as usize)?;
                for &mapping in &channel_mapping {
                    if mapping != 255 && mapping >= substream_count {
                        return Err(ObuError::Malformed(format!(
                            "channel_mapping entry {mapping} has no substream"
                        )));
                    }
                }
                Ok(AmbisonicsConfig::Mono(AmbisonicsMonoConfig {
                    output_channel_count,
                    substream_count,
                    channel_mapping,
                }))
            }
            1 => {
                let output_channel_count = buf.read_u8()?;
                let substream_count = buf.read_u8()?;
                let coupled_substream_count = buf.read_u8()?;
                if u32::from(substream_count) != num_substreams {
                    return Err(ObuError::Malformed(format!(
                        "ambisonics substream_count {substream_count} disagrees with \
                         num_substreams {num_substreams}"
                    )));
                }
                let rows = substream_count as usize + coupled_substream_count as usize;
                let mut demixing_matrix =
                    Vec::with_capacity(rows * output_channel_count as usize);
                for _ in 0..rows * output_channel_count as usize {
                    demixing_matrix.push(buf.read_i16()?);
                }
                Ok(AmbisonicsConfig::Projection(AmbisonicsProjectionConfig {
                    output_channel_count,
                    substream_count,
                    coupled_substream_count,
                    demixing_matrix,
                }))
            }
            other => Err(ObuError::Malformed(format!(
                "reserved ambisonics_mode {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub enum AudioElementConfig {
    Channel(ScalableChannelLayoutConfig),
    Ambisonics(AmbisonicsConfig),
}

#[derive(Debug, Clone)]
pub enum AudioElementParam {
    Demixing(DemixingParamDefinition),
    ReconGain(ParamDefinition),
    /// Unknown parameter definition type, structurally skipped.
    Extension(u32, Vec<u8>),
}

impl AudioElementParam {
    fn read(buf: &mut StreamBuffer) -> Result<Self, ObuError> {
        let (param_definition_type, _) = buf.read_uleb128()?;
        match param_definition_type {
            1 => Ok(AudioElementParam::Demixing(DemixingParamDefinition::read(
                buf,
            )?)),
            2 => Ok(AudioElementParam::ReconGain(ParamDefinition::read(buf)?)),
            0 => Err(ObuError::Malformed(
                "mix gain parameter definitions belong to mix presentations".into(),
            )),
            other => {
                let (size, _) = buf.read_uleb128()?;
                let bytes = buf.read_vec(size as usize)?;
                Ok(AudioElementParam::Extension(other, bytes))
            }
        }
    }
}

/// A parsed audio element OBU.
#[derive(Debug, Clone)]
pub struct AudioElement {
    pub id: u32,
    pub codec_config_id: u32,
    pub substream_ids: Vec<u32>,
    pub params: Vec<AudioElementParam>,
    pub config: AudioElementConfig,
}

impl AudioElement {
    pub fn read(payload_size: u64, buf: &mut StreamBuffer) -> Result<Self, ObuError> {
        let start = buf.tell();
        let (id, _) = buf.read_uleb128()?;
        let audio_element_type = buf.read_bits(3)? as u8;
        let _reserved = buf.read_bits(5)?;
        let (codec_config_id, _) = buf.read_uleb128()?;
        let (num_substreams, _) = buf.read_uleb128()?;
        if num_substreams == 0 {
            return Err(ObuError::Malformed("audio element has no substreams".into()));
        }
        let mut substream_ids = Vec::with_capacity(num_substreams as usize);
        for _ in 0..num_substreams {
            substream_ids.push(buf.read_uleb128()?.0);
        }
        let (num_parameters, _) = buf.read_uleb128()?;
        let mut params = Vec::with_capacity(num_parameters as usize);
        for _ in 0..num_parameters {
            params.push(AudioElementParam::read(buf)?);
        }

        let config = match audio_element_type {
            0 => AudioElementConfig::Channel(ScalableChannelLayoutConfig::read(buf)?),
            1 => AudioElementConfig::Ambisonics(AmbisonicsConfig::read(num_substreams, buf)?),
            other => {
                return Err(ObuError::Malformed(format!(
                    "reserved audio_element_type {other}"
                )))
            }
        };

        let consumed = buf.tell() - start;
        let payload_bits = payload_size << 3;
        if consumed > payload_bits {
            return Err(ObuError::Malformed(
                "config overran the audio element payload".into(),
            ));
        }
        buf.skip_bits(payload_bits - consumed)?;

        Ok(Self {
            id,
            codec_config_id,
            substream_ids,
            params,
            config,
        })
    }

    /// Total decoded channels across this element's substreams.
    pub fn channel_count(&self) -> usize {
        match &self.config {
            AudioElementConfig::Channel(scalable) => scalable
                .layers
                .iter()
                .map(ChannelAudioLayerConfig::channel_count)
                .sum(),
            AudioElementConfig::Ambisonics(AmbisonicsConfig::Mono(mono)) => {
                mono.output_channel_count as usize
            }
            AudioElementConfig::Ambisonics(AmbisonicsConfig::Projection(projection)) => {
                projection.output_channel_count as usize
            }
        }
    }

    /// Channels carried by each substream, in substream order.
    pub fn substream_channel_counts(&self) -> Vec<usize> {
        match &self.config {
            AudioElementConfig::Channel(scalable) => {
                let mut counts = Vec::new();
                for layer in &scalable.layers {
                    let coupled = layer.coupled_substream_count as usize;
                    for i in 0..layer.substream_count as usize {
                        counts.push(if i < coupled { 2 } else { 1 });
                    }
                }
                counts
            }
            AudioElementConfig::Ambisonics(AmbisonicsConfig::Mono(mono)) => {
                vec![1; mono.substream_count as usize]
            }
            AudioElementConfig::Ambisonics(AmbisonicsConfig::Projection(projection)) => {
                let coupled = projection.coupled_substream_count as usize;
                (0..projection.substream_count as usize)
                    .map(|i| if i < coupled { 2 } else { 1 })
                    .collect()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ambisonics_mono_element() -> Vec<u8> {
        vec![
            0xAC, 0x02, // id = 300
            1 << 5, // scene based
            21, // codec_config_id
            1,  // num_substreams
            18, // substream id
            0,  // num_parameters
            0,  // ambisonics_mode mono
            1,  // output_channel_count
            1,  // substream_count
            0,  // channel_mapping: ACN 0 -> substream 0
        ]
    }

    #[test]
    fn parses_ambisonics_mono_element() -> anyhow::Result<()> {
        let payload = ambisonics_mono_element();
        let mut buf = StreamBuffer::from_bytes(&payload);
        let element = AudioElement::read(payload.len() as u64, &mut buf)?;
        assert_eq!(element.id, 300);
        assert_eq!(element.codec_config_id, 21);
        assert_eq!(element.substream_ids, vec![18]);
        assert_eq!(element.channel_count(), 1);
        assert_eq!(element.substream_channel_counts(), vec![1]);
        Ok(())
    }

    #[test]
    fn substream_count_mismatch_is_malformed() {
        let mut payload = ambisonics_mono_element();
        payload[9] = 2; // ambisonics substream_count disagrees
        let mut buf = StreamBuffer::from_bytes(&payload);
        assert!(matches!(
            AudioElement::read(payload.len() as u64, &mut buf),
            Err(ObuError::Malformed(_))
        ));
    }

    #[test]
    fn coupled_substreams_carry_two_channels() -> anyhow::Result<()> {
        // Channel-based element: one layer, 5.1 layout (2), three substreams
        // of which two are coupled.
        let payload = vec![
            7,  // id
            0,  // channel based
            21, // codec_config_id
            3,  // num_substreams
            4, 5, 6, // substream ids
            0,  // num_parameters
            1 << 5, // num_layers=1
            2 << 4, // loudspeaker_layout=2, no flags
            3,  // substream_count
            2,  // coupled_substream_count
        ];
        let mut buf = StreamBuffer::from_bytes(&payload);
        let element = AudioElement::read(payload.len() as u64, &mut buf)?;
        assert_eq!(element.channel_count(), 5);
        assert_eq!(element.substream_channel_counts(), vec![2, 2, 1]);
        Ok(())
    }
}

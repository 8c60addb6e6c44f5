//! Substream decoders.
//!
//! Contract: coded substream bytes in, channel-major normalised samples
//! out. Decoders are constructed once per substream at descriptor seal time
//! and stay alive across temporal units, since Opus, FLAC and AAC all carry
//! inter-frame state.

use symphonia::core::audio::{Channels, SampleBuffer};
use symphonia::core::codecs::{CodecParameters, DecoderOptions, CODEC_TYPE_AAC, CODEC_TYPE_FLAC};
use symphonia::core::formats::Packet;

use crate::structs::codec_config::{CodecConfig, DecoderConfig};
use crate::utils::errors::Error;

/// Scale from a top-aligned 32-bit integer sample to [-1, 1).
const Q31_SCALE: f64 = 2_147_483_648.0;

pub trait SubstreamDecoder {
    /// Decodes one coded frame into per-channel normalised samples.
    fn decode_frame(&mut self, data: &[u8]) -> Result<Vec<Vec<f64>>, Error>;
}

/// Builds the decoder for one substream of the given codec config.
pub fn for_substream(
    config: &CodecConfig,
    channels: usize,
) -> Result<Box<dyn SubstreamDecoder>, Error> {
    match &config.decoder_config {
        DecoderConfig::Lpcm(lpcm) => Ok(Box::new(LpcmSubstreamDecoder {
            little_endian: lpcm.little_endian,
            bytes_per_sample: usize::from(lpcm.sample_size / 8),
            channels,
            samples_per_frame: config.num_samples_per_frame as usize,
        })),
        DecoderConfig::Opus(_) => {
            let opus_channels = match channels {
                1 => opus::Channels::Mono,
                2 => opus::Channels::Stereo,
                other => {
                    return Err(Error::Codec(format!(
                        "opus substreams carry one or two channels, not {other}"
                    )))
                }
            };
            // Opus substreams always decode at 48 kHz.
            let decoder = opus::Decoder::new(48_000, opus_channels)
                .map_err(|e| Error::Codec(format!("opus decoder init: {e}")))?;
            Ok(Box::new(OpusSubstreamDecoder {
                decoder,
                channels,
                samples_per_frame: config.num_samples_per_frame as usize,
            }))
        }
        DecoderConfig::Flac(flac) => SymphoniaSubstreamDecoder::new(
            CODEC_TYPE_FLAC,
            flac.sample_rate,
            channels,
            Some(flac.streaminfo.clone()),
            config.num_samples_per_frame,
        )
        .map(|decoder| Box::new(decoder) as Box<dyn SubstreamDecoder>),
        DecoderConfig::Aac(aac) => SymphoniaSubstreamDecoder::new(
            CODEC_TYPE_AAC,
            aac.sample_rate,
            channels,
            Some(aac.audio_specific_config.clone()),
            config.num_samples_per_frame,
        )
        .map(|decoder| Box::new(decoder) as Box<dyn SubstreamDecoder>),
    }
}

/// Byte reassembly for "ipcm" substreams; the wire is interleaved
/// tick-major.
struct LpcmSubstreamDecoder {
    little_endian: bool,
    bytes_per_sample: usize,
    channels: usize,
    samples_per_frame: usize,
}

impl LpcmSubstreamDecoder {
    fn sample_to_q31(&self, bytes: &[u8]) -> i32 {
        let mut value: u32 = 0;
        if self.little_endian {
            for (i, &byte) in bytes.iter().enumerate() {
                value |= u32::from(byte) << (8 * i);
            }
        } else {
            for &byte in bytes {
                value = (value << 8) | u32::from(byte);
            }
        }
        // Top-align so 16- and 24-bit samples share the 32-bit range.
        (value << (32 - 8 * self.bytes_per_sample)) as i32
    }
}

impl SubstreamDecoder for LpcmSubstreamDecoder {
    fn decode_frame(&mut self, data: &[u8]) -> Result<Vec<Vec<f64>>, Error> {
        let stride = self.bytes_per_sample * self.channels;
        if stride == 0 || data.len() % stride != 0 {
            return Err(Error::Codec(format!(
                "LPCM frame of {} bytes does not divide into {} channel(s) of {}-byte samples",
                data.len(),
                self.channels,
                self.bytes_per_sample
            )));
        }
        let ticks = data.len() / stride;
        if ticks > self.samples_per_frame {
            return Err(Error::Codec(format!(
                "LPCM frame carries {ticks} ticks but the codec config allows {}",
                self.samples_per_frame
            )));
        }
        let mut out = vec![Vec::with_capacity(ticks); self.channels];
        for t in 0..ticks {
            for (c, channel) in out.iter_mut().enumerate() {
                let offset = (t * self.channels + c) * self.bytes_per_sample;
                let q31 = self.sample_to_q31(&data[offset..offset + self.bytes_per_sample]);
                channel.push(f64::from(q31) / Q31_SCALE);
            }
        }
        Ok(out)
    }
}

struct OpusSubstreamDecoder {
    decoder: opus::Decoder,
    channels: usize,
    samples_per_frame: usize,
}

impl SubstreamDecoder for OpusSubstreamDecoder {
    fn decode_frame(&mut self, data: &[u8]) -> Result<Vec<Vec<f64>>, Error> {
        let mut pcm = vec![0i16; self.samples_per_frame * self.channels];
        let ticks = self
            .decoder
            .decode(data, &mut pcm, false)
            .map_err(|e| Error::Codec(format!("opus decode: {e}")))?;
        let mut out = vec![Vec::with_capacity(ticks); self.channels];
        for t in 0..ticks {
            for (c, channel) in out.iter_mut().enumerate() {
                channel.push(f64::from(pcm[t * self.channels + c]) / 32_768.0);
            }
        }
        Ok(out)
    }
}

/// FLAC and AAC-LC substreams decode through symphonia, fed packets built
/// straight from the substream bytes with the decoder configs' extra data.
struct SymphoniaSubstreamDecoder {
    decoder: Box<dyn symphonia::core::codecs::Decoder>,
    channels: usize,
    timestamp: u64,
    frame_duration: u64,
}

impl SymphoniaSubstreamDecoder {
    fn new(
        codec: symphonia::core::codecs::CodecType,
        sample_rate: u32,
        channels: usize,
        extra_data: Option<Vec<u8>>,
        frame_duration: u32,
    ) -> Result<Self, Error> {
        let channel_mask = match channels {
            1 => Channels::FRONT_LEFT,
            2 => Channels::FRONT_LEFT | Channels::FRONT_RIGHT,
            other => {
                return Err(Error::Codec(format!(
                    "coded substreams carry one or two channels, not {other}"
                )))
            }
        };
        let mut params = CodecParameters::new();
        params
            .for_codec(codec)
            .with_sample_rate(sample_rate)
            .with_channels(channel_mask);
        if let Some(extra) = extra_data {
            params.with_extra_data(extra.into_boxed_slice());
        }
        let decoder = symphonia::default::get_codecs()
            .make(&params, &DecoderOptions::default())
            .map_err(|e| Error::Codec(format!("decoder init: {e}")))?;
        Ok(Self {
            decoder,
            channels,
            timestamp: 0,
            frame_duration: u64::from(frame_duration),
        })
    }
}

impl SubstreamDecoder for SymphoniaSubstreamDecoder {
    fn decode_frame(&mut self, data: &[u8]) -> Result<Vec<Vec<f64>>, Error> {
        let packet = Packet::new_from_slice(0, self.timestamp, self.frame_duration, data);
        self.timestamp += self.frame_duration;
        let decoded = self
            .decoder
            .decode(&packet)
            .map_err(|e| Error::Codec(format!("decode: {e}")))?;
        let spec = *decoded.spec();
        let mut samples = SampleBuffer::<f64>::new(decoded.capacity() as u64, spec);
        samples.copy_planar_ref(decoded);
        let planar = samples.samples();
        let ticks = planar.len() / self.channels;
        let out = (0..self.channels)
            .map(|c| planar[c * ticks..(c + 1) * ticks].to_vec())
            .collect();
        Ok(out)
    }
}

//! Temporal-unit OBUs: audio frames and parameter blocks.
//!
//! Parameter block payloads are carried opaque; their interpretation against
//! the parameter definitions happens downstream of the assembler.

use crate::structs::obu::{ObuHeader, ObuType};
use crate::utils::bits::StreamBuffer;
use crate::utils::errors::ObuError;

/// One coded audio frame for a single substream.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    pub substream_id: u32,
    pub data: Vec<u8>,
    pub num_samples_to_trim_at_start: u32,
    pub num_samples_to_trim_at_end: u32,
}

impl AudioFrame {
    /// Reads the payload of an audio frame OBU whose header was already
    /// consumed.
    pub fn read(header: &ObuHeader, buf: &mut StreamBuffer) -> Result<Self, ObuError> {
        let (substream_id, id_len) = match header.obu_type {
            ObuType::AudioFrameId(id) => (u32::from(id), 0),
            ObuType::AudioFrame => {
                let (id, len) = buf.read_uleb128()?;
                (id, len as u64)
            }
            other => {
                return Err(ObuError::Malformed(format!(
                    "obu_type {} is not an audio frame",
                    other.raw()
                )))
            }
        };
        let data_len = header.payload_size.checked_sub(id_len).ok_or_else(|| {
            ObuError::Malformed("audio frame payload is smaller than its substream id".into())
        })?;
        let data = buf.read_vec(data_len as usize)?;
        Ok(Self {
            substream_id,
            data,
            num_samples_to_trim_at_start: header.num_samples_to_trim_at_start,
            num_samples_to_trim_at_end: header.num_samples_to_trim_at_end,
        })
    }
}

/// One parameter block, payload kept raw.
#[derive(Debug, Clone)]
pub struct ParameterBlock {
    pub param_id: u32,
    pub data: Vec<u8>,
}

impl ParameterBlock {
    pub fn read(header: &ObuHeader, buf: &mut StreamBuffer) -> Result<Self, ObuError> {
        let (param_id, id_len) = buf.read_uleb128()?;
        let data_len = header
            .payload_size
            .checked_sub(id_len as u64)
            .ok_or_else(|| {
                ObuError::Malformed(
                    "parameter block payload is smaller than its parameter id".into(),
                )
            })?;
        let data = buf.read_vec(data_len as usize)?;
        Ok(Self { param_id, data })
    }
}

/// All OBUs of a single timestamp, emitted atomically by the assembler.
///
/// All audio frames share the timestamp; each substream contributes at most
/// one frame. A trivial unit (no frames, no parameter blocks) is valid and
/// advances the clock without producing audio.
#[derive(Debug, Clone, Default)]
pub struct TemporalUnit {
    pub timestamp: i64,
    pub audio_frames: Vec<AudioFrame>,
    pub parameter_blocks: Vec<ParameterBlock>,
}

impl TemporalUnit {
    pub fn is_trivial(&self) -> bool {
        self.audio_frames.is_empty() && self.parameter_blocks.is_empty()
    }

    pub fn frame_for_substream(&self, substream_id: u32) -> Option<&AudioFrame> {
        self.audio_frames
            .iter()
            .find(|frame| frame.substream_id == substream_id)
    }
}

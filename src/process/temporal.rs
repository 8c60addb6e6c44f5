//! Temporal-unit assembly.
//!
//! Groups audio frame and parameter block OBUs into one unit per timestamp.
//! A unit ends when every declared substream has contributed a frame, when a
//! temporal delimiter closes it, when a substream contributes twice (the
//! implicit delimiter), or when end-of-stream flushes whatever is pending.
//! Mid-unit insufficiency rewinds the stream to the start of the unit so the
//! pull can be retried once more bytes arrive; a unit is either fully
//! produced or not produced at all.

use std::collections::BTreeSet;

use log::{debug, warn};

use crate::process::descriptors::DescriptorSet;
use crate::structs::obu::{ObuHeader, ObuType};
use crate::structs::temporal::{AudioFrame, ParameterBlock, TemporalUnit};
use crate::utils::bits::StreamBuffer;
use crate::utils::errors::{ObuError, TemporalError};

#[derive(Debug)]
pub struct UnitAssembler {
    next_timestamp: i64,
    frame_duration: i64,
}

impl UnitAssembler {
    pub fn new(frame_size: u32) -> Self {
        Self {
            next_timestamp: 0,
            frame_duration: i64::from(frame_size),
        }
    }

    /// Pulls at most one temporal unit from the stream.
    ///
    /// `Ok(None)` means no complete unit is available yet (or, with
    /// `eos == true`, that the stream is drained); the cursor is back at the
    /// start of the unfinished unit. On `Ok(Some(_))` the cursor sits right
    /// after the consumed OBUs and the caller should flush the stream.
    pub fn pull_one(
        &mut self,
        buf: &mut StreamBuffer,
        descriptors: &DescriptorSet,
        eos: bool,
    ) -> Result<Option<TemporalUnit>, TemporalError> {
        let start = buf.tell();
        let expected = descriptors.substream_ids();
        let mut frames: Vec<AudioFrame> = Vec::new();
        let mut parameter_blocks: Vec<ParameterBlock> = Vec::new();
        let mut seen: BTreeSet<u32> = BTreeSet::new();
        let mut opened_by_delimiter = false;

        let corrupt = |message: String| TemporalError::Corrupt(message);

        loop {
            let peek = match ObuHeader::peek(buf) {
                Ok(peek) => peek,
                Err(ObuError::Insufficient) => {
                    if eos {
                        if buf.available_bits() > 0 {
                            warn!("dropping a truncated OBU at end of stream");
                        }
                        break;
                    }
                    let _ = buf.seek(start);
                    return Ok(None);
                }
                Err(ObuError::Malformed(message)) => return Err(corrupt(message)),
            };

            if peek.obu_type.is_descriptor() {
                return Err(TemporalError::UnexpectedDescriptor);
            }

            if buf.available_bytes() < peek.total_size {
                if eos {
                    warn!("dropping a truncated OBU at end of stream");
                    break;
                }
                let _ = buf.seek(start);
                return Ok(None);
            }

            let obu_start = buf.tell();
            let header = ObuHeader::read(buf).map_err(|e| corrupt(e.to_string()))?;
            match header.obu_type {
                ObuType::TemporalDelimiter => {
                    if header.payload_size != 0 {
                        return Err(corrupt(format!(
                            "temporal delimiter with {} payload bytes",
                            header.payload_size
                        )));
                    }
                    if frames.is_empty() && parameter_blocks.is_empty() {
                        if opened_by_delimiter {
                            // Two delimiters with nothing between them: an
                            // explicitly empty unit that still advances the
                            // clock.
                            return Ok(Some(self.emit(frames, parameter_blocks)));
                        }
                        opened_by_delimiter = true;
                        continue;
                    }
                    // Terminates a unit that was still waiting on
                    // substreams.
                    break;
                }
                ObuType::AudioFrame | ObuType::AudioFrameId(_) => {
                    let frame = AudioFrame::read(&header, buf).map_err(|e| corrupt(e.to_string()))?;
                    if !expected.contains(&frame.substream_id) {
                        warn!(
                            "skipping audio frame for undeclared substream {}",
                            frame.substream_id
                        );
                        continue;
                    }
                    if !seen.insert(frame.substream_id) {
                        // A second frame for this substream belongs to the
                        // next unit.
                        buf.seek(obu_start).map_err(|e| corrupt(e.to_string()))?;
                        break;
                    }
                    frames.push(frame);
                    if seen.len() == expected.len() {
                        break;
                    }
                }
                ObuType::ParameterBlock => {
                    let block =
                        ParameterBlock::read(&header, buf).map_err(|e| corrupt(e.to_string()))?;
                    parameter_blocks.push(block);
                }
                ObuType::Reserved(raw) => {
                    debug!("skipping reserved OBU type {raw} inside a temporal unit");
                    buf.skip_bits(header.payload_size << 3)
                        .map_err(|e| corrupt(e.to_string()))?;
                }
                descriptor => {
                    return Err(TemporalError::Corrupt(format!(
                        "descriptor obu_type {} slipped past the peek",
                        descriptor.raw()
                    )));
                }
            }
        }

        if frames.is_empty() && parameter_blocks.is_empty() {
            return Ok(None);
        }
        Ok(Some(self.emit(frames, parameter_blocks)))
    }

    fn emit(
        &mut self,
        audio_frames: Vec<AudioFrame>,
        parameter_blocks: Vec<ParameterBlock>,
    ) -> TemporalUnit {
        let unit = TemporalUnit {
            timestamp: self.next_timestamp,
            audio_frames,
            parameter_blocks,
        };
        self.next_timestamp += self.frame_duration;
        unit
    }

    pub fn rewind_clock(&mut self) {
        self.next_timestamp = 0;
    }
}

//! Descriptor OBU accumulation.
//!
//! Consumes framed OBUs until the descriptor set is provably complete: the
//! first temporal-territory OBU closes the set in streaming mode, end of
//! input closes it in exhaustive mode. Anything short of that rewinds the
//! stream to where accumulation began and reports insufficiency so the
//! caller can retry with more bytes.

use std::collections::{BTreeMap, BTreeSet};

use log::{debug, warn};

use crate::structs::audio_element::AudioElement;
use crate::structs::codec_config::CodecConfig;
use crate::structs::mix_presentation::MixPresentation;
use crate::structs::obu::{ObuHeader, ObuType};
use crate::structs::sequence_header::IaSequenceHeader;
use crate::utils::bits::StreamBuffer;
use crate::utils::errors::{DescriptorError, ObuError};

/// Codec config OBUs smaller than this are treated as bitstream corruption
/// and skipped rather than parsed.
const SMALLEST_PLAUSIBLE_CODEC_CONFIG: u64 = 8;

/// The sealed, immutable result of descriptor accumulation.
#[derive(Debug, Clone)]
pub struct DescriptorSet {
    pub sequence_header: IaSequenceHeader,
    pub codec_configs: BTreeMap<u32, CodecConfig>,
    pub audio_elements: BTreeMap<u32, AudioElement>,
    pub mix_presentations: Vec<MixPresentation>,
    /// Exact bytes of the descriptor OBUs, snapshotted so `reset` can
    /// re-initialise without re-feeding.
    pub raw_bytes: Vec<u8>,
}

impl DescriptorSet {
    /// The codec config that defines the output clock. IAMF requires all
    /// codec configs of a sequence to agree on frame timing.
    pub fn primary_codec_config(&self) -> &CodecConfig {
        self.codec_configs
            .values()
            .next()
            .expect("descriptor set always holds at least one codec config")
    }

    pub fn sample_rate(&self) -> u32 {
        self.primary_codec_config().sample_rate()
    }

    pub fn frame_size(&self) -> u32 {
        self.primary_codec_config().frame_size()
    }

    pub fn element_for_substream(&self, substream_id: u32) -> Option<&AudioElement> {
        self.audio_elements
            .values()
            .find(|element| element.substream_ids.contains(&substream_id))
    }

    pub fn substream_ids(&self) -> BTreeSet<u32> {
        self.audio_elements
            .values()
            .flat_map(|element| element.substream_ids.iter().copied())
            .collect()
    }
}

fn invalid(message: impl Into<String>) -> DescriptorError {
    DescriptorError::Invalid(message.into())
}

/// Accumulates descriptor OBUs from the stream.
///
/// In streaming mode (`exhaustive == false`) the cursor is left immediately
/// after the last descriptor OBU on success, or restored to its starting
/// position on [`DescriptorError::Insufficient`]. In exhaustive mode every
/// remaining byte must belong to the descriptor set; trailing or truncated
/// data is an error.
pub fn accumulate(
    buf: &mut StreamBuffer,
    exhaustive: bool,
) -> Result<DescriptorSet, DescriptorError> {
    let start = buf.tell();
    let mut sequence_header: Option<IaSequenceHeader> = None;
    let mut codec_configs: BTreeMap<u32, CodecConfig> = BTreeMap::new();
    let mut audio_elements: BTreeMap<u32, AudioElement> = BTreeMap::new();
    let mut mix_presentations: Vec<MixPresentation> = Vec::new();
    let mut seen_substreams: BTreeSet<u32> = BTreeSet::new();

    let rewind_insufficient = |buf: &mut StreamBuffer| -> DescriptorError {
        // The starting position is always within the buffer.
        let _ = buf.seek(start);
        if exhaustive {
            invalid("descriptor OBUs are truncated")
        } else {
            DescriptorError::Insufficient
        }
    };

    loop {
        if exhaustive && buf.available_bits() == 0 {
            break;
        }
        let peek = match ObuHeader::peek(buf) {
            Ok(peek) => peek,
            Err(ObuError::Insufficient) => return Err(rewind_insufficient(buf)),
            Err(ObuError::Malformed(message)) => return Err(invalid(message)),
        };

        if peek.obu_type.is_temporal() {
            if exhaustive {
                return Err(invalid(
                    "descriptor bytes must not contain temporal unit OBUs",
                ));
            }
            if sequence_header.is_none() {
                return Err(invalid("IA sequence must start with a sequence header"));
            }
            // Temporal territory begins here; the peek already left the
            // cursor at the start of this OBU.
            break;
        }

        if buf.available_bytes() < peek.total_size {
            return Err(rewind_insufficient(buf));
        }

        let header = ObuHeader::read(buf).map_err(|e| invalid(e.to_string()))?;
        match header.obu_type {
            ObuType::SequenceHeader => {
                if sequence_header.is_some() {
                    if header.redundant_copy {
                        debug!("skipping redundant IA sequence header");
                        buf.skip_bits(header.payload_size << 3)
                            .map_err(|e| invalid(e.to_string()))?;
                        continue;
                    }
                    return Err(invalid("second IA sequence header in descriptors"));
                }
                sequence_header =
                    Some(IaSequenceHeader::read(buf).map_err(|e| invalid(e.to_string()))?);
                // ia_code + two profile bytes; anything extra is reserved.
                if header.payload_size > 6 {
                    buf.skip_bits((header.payload_size - 6) << 3)
                        .map_err(|e| invalid(e.to_string()))?;
                }
            }
            ObuType::CodecConfig => {
                if sequence_header.is_none() {
                    return Err(invalid("IA sequence must start with a sequence header"));
                }
                if header.payload_size < SMALLEST_PLAUSIBLE_CODEC_CONFIG {
                    warn!(
                        "skipping implausibly small codec config OBU ({} bytes)",
                        header.payload_size
                    );
                    buf.skip_bits(header.payload_size << 3)
                        .map_err(|e| invalid(e.to_string()))?;
                    continue;
                }
                let config = CodecConfig::read(header.payload_size, buf)
                    .map_err(|e| invalid(e.to_string()))?;
                if codec_configs.insert(config.id, config).is_some() {
                    return Err(invalid("duplicate codec config id"));
                }
            }
            ObuType::AudioElement => {
                if sequence_header.is_none() {
                    return Err(invalid("IA sequence must start with a sequence header"));
                }
                let element = AudioElement::read(header.payload_size, buf)
                    .map_err(|e| invalid(e.to_string()))?;
                if !codec_configs.contains_key(&element.codec_config_id) {
                    return Err(invalid(format!(
                        "audio element {} references unknown codec config {}",
                        element.id, element.codec_config_id
                    )));
                }
                for &substream_id in &element.substream_ids {
                    if !seen_substreams.insert(substream_id) {
                        return Err(invalid(format!(
                            "substream id {substream_id} appears in more than one audio element"
                        )));
                    }
                }
                if audio_elements.insert(element.id, element).is_some() {
                    return Err(invalid("duplicate audio element id"));
                }
            }
            ObuType::MixPresentation => {
                if sequence_header.is_none() {
                    return Err(invalid("IA sequence must start with a sequence header"));
                }
                let mix = MixPresentation::read(header.payload_size, buf)
                    .map_err(|e| invalid(e.to_string()))?;
                for element_id in mix.audio_element_ids() {
                    if !audio_elements.contains_key(&element_id) {
                        return Err(invalid(format!(
                            "mix presentation {} references unknown audio element {element_id}",
                            mix.id
                        )));
                    }
                }
                mix_presentations.push(mix);
            }
            ObuType::Reserved(raw) => {
                debug!("skipping reserved OBU type {raw} among descriptors");
                buf.skip_bits(header.payload_size << 3)
                    .map_err(|e| invalid(e.to_string()))?;
            }
            other => {
                // Unreachable: temporal types break out of the loop above.
                return Err(invalid(format!(
                    "unexpected obu_type {} in descriptors",
                    other.raw()
                )));
            }
        }
    }

    let sequence_header = sequence_header
        .ok_or_else(|| invalid("IA sequence must start with a sequence header"))?;
    if codec_configs.is_empty() {
        return Err(invalid("descriptor set has no codec config"));
    }
    if audio_elements.is_empty() {
        return Err(invalid("descriptor set has no audio element"));
    }
    if mix_presentations.is_empty() {
        return Err(invalid("descriptor set has no mix presentation"));
    }

    let raw_bytes = buf.byte_slice(start, buf.tell()).to_vec();
    debug!(
        "sealed descriptor set: {} codec config(s), {} audio element(s), {} mix presentation(s)",
        codec_configs.len(),
        audio_elements.len(),
        mix_presentations.len()
    );

    Ok(DescriptorSet {
        sequence_header,
        codec_configs,
        audio_elements,
        mix_presentations,
        raw_bytes,
    })
}

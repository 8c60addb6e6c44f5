//! Render pipeline adapter.
//!
//! Owns the long-lived codec decoders and the gain plans for the selected
//! mix. A temporal unit goes in; a quantised channel-major frame for the
//! selected output layout comes out. Substreams that are not part of the
//! selected mix are skipped without being decoded.

use log::warn;

use crate::process::codecs::{self, SubstreamDecoder};
use crate::process::descriptors::DescriptorSet;
use crate::process::render;
use crate::process::select::Selection;
use crate::structs::audio_element::{AmbisonicsConfig, AudioElementConfig};
use crate::structs::temporal::TemporalUnit;
use crate::utils::errors::Error;

struct ElementContext {
    element_id: u32,
    substream_ids: Vec<u32>,
    /// Channels carried by each substream, in substream order; sizes the
    /// silence placeholder when a substream is missing from a unit.
    substream_channels: Vec<usize>,
    decoders: Vec<Box<dyn SubstreamDecoder>>,
    /// ACN channel to substream index for mono-mode ambisonics; identity
    /// concatenation otherwise.
    ambisonics_mapping: Option<Vec<u8>>,
    gains: Vec<Vec<f64>>,
    /// Element and output mix gain defaults, folded into one linear scale.
    scale: f64,
}

pub struct RenderPipeline {
    elements: Vec<ElementContext>,
    output_channels: usize,
    frame_size: usize,
}

impl RenderPipeline {
    pub fn create(descriptors: &DescriptorSet, selection: &Selection) -> Result<Self, Error> {
        let mix = &descriptors.mix_presentations[selection.mix_index];
        let sub_mix = &mix.sub_mixes[selection.sub_mix_index];
        let output_layout = selection.selected.output_layout;
        let frame_size = descriptors.frame_size() as usize;

        let mut elements = Vec::with_capacity(sub_mix.audio_elements.len());
        for sub_mix_element in &sub_mix.audio_elements {
            let element = descriptors
                .audio_elements
                .get(&sub_mix_element.audio_element_id)
                .ok_or_else(|| {
                    Error::Internal(format!(
                        "selected mix references missing element {}",
                        sub_mix_element.audio_element_id
                    ))
                })?;
            let codec_config =
                descriptors
                    .codec_configs
                    .get(&element.codec_config_id)
                    .ok_or_else(|| {
                        Error::Internal(format!(
                            "element {} references missing codec config {}",
                            element.id, element.codec_config_id
                        ))
                    })?;

            let substream_channels = element.substream_channel_counts();
            let mut decoders = Vec::with_capacity(substream_channels.len());
            for &channels in &substream_channels {
                decoders.push(codecs::for_substream(codec_config, channels)?);
            }

            let ambisonics_mapping = match &element.config {
                AudioElementConfig::Ambisonics(AmbisonicsConfig::Mono(mono)) => {
                    Some(mono.channel_mapping.clone())
                }
                _ => None,
            };

            elements.push(ElementContext {
                element_id: element.id,
                substream_ids: element.substream_ids.clone(),
                substream_channels,
                decoders,
                ambisonics_mapping,
                gains: render::plan_gains(element, output_layout)?,
                scale: sub_mix_element.element_mix_gain.default_linear_gain()
                    * sub_mix.output_mix_gain.default_linear_gain(),
            });
        }

        Ok(Self {
            elements,
            output_channels: output_layout.channel_count(),
            frame_size,
        })
    }

    pub fn output_channels(&self) -> usize {
        self.output_channels
    }

    /// Decodes and renders one temporal unit into a quantised channel-major
    /// frame. Trivial units yield `None`: the clock advanced but there is
    /// nothing to play.
    pub fn render_unit(&mut self, unit: &TemporalUnit) -> Result<Option<Vec<Vec<f64>>>, Error> {
        if unit.audio_frames.is_empty() {
            return Ok(None);
        }

        let mut output = vec![vec![0.0f64; self.frame_size]; self.output_channels];
        let mut ticks = 0usize;
        let mut trim_start = 0u32;
        let mut trim_end = 0u32;

        for element in &mut self.elements {
            // Decode this element's substreams in declaration order.
            let mut decoded: Vec<Vec<Vec<f64>>> = Vec::with_capacity(element.decoders.len());
            for ((decoder, &substream_id), &channels) in element
                .decoders
                .iter_mut()
                .zip(&element.substream_ids)
                .zip(&element.substream_channels)
            {
                match unit.frame_for_substream(substream_id) {
                    Some(frame) => {
                        trim_start = trim_start.max(frame.num_samples_to_trim_at_start);
                        trim_end = trim_end.max(frame.num_samples_to_trim_at_end);
                        decoded.push(decoder.decode_frame(&frame.data)?);
                    }
                    None => {
                        warn!(
                            "temporal unit at {} is missing substream {substream_id}; \
                             substituting silence",
                            unit.timestamp
                        );
                        decoded.push(vec![vec![0.0; self.frame_size]; channels]);
                    }
                }
            }

            // Assemble the element's channels.
            let element_channels: Vec<Vec<f64>> = match &element.ambisonics_mapping {
                Some(mapping) => mapping
                    .iter()
                    .map(|&substream_index| {
                        if substream_index == 255 {
                            vec![0.0; self.frame_size]
                        } else {
                            decoded[substream_index as usize][0].clone()
                        }
                    })
                    .collect(),
                None => decoded.into_iter().flatten().collect(),
            };

            for channel in &element_channels {
                ticks = ticks.max(channel.len());
            }
            if element_channels.len() != element.gains.len() {
                return Err(Error::Internal(format!(
                    "element {} decoded {} channels but the gain plan expects {}",
                    element.element_id,
                    element_channels.len(),
                    element.gains.len()
                )));
            }
            render::mix_into(&mut output, &element_channels, &element.gains, element.scale);
        }

        let ticks = ticks.min(self.frame_size);
        for channel in &mut output {
            channel.truncate(ticks);
        }

        // Header-driven trimming shortens the frame edges.
        let trim_start = (trim_start as usize).min(ticks);
        let trim_end = (trim_end as usize).min(ticks - trim_start);
        if trim_start > 0 || trim_end > 0 {
            for channel in &mut output {
                channel.truncate(ticks - trim_end);
                channel.drain(..trim_start);
            }
        }

        render::quantize_frame(&mut output);
        Ok(Some(output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::descriptors::accumulate;
    use crate::process::select::{self, RequestedMix};
    use crate::process::temporal::UnitAssembler;
    use crate::testdata;
    use crate::utils::bits::StreamBuffer;

    fn pipeline_for_basic_set() -> (DescriptorSet, RenderPipeline) {
        let mut buf = StreamBuffer::from_bytes(&testdata::basic_descriptors());
        let descriptors = accumulate(&mut buf, true).unwrap();
        let selection = select::select(&descriptors, &RequestedMix::default(), &[]).unwrap();
        let pipeline = RenderPipeline::create(&descriptors, &selection).unwrap();
        (descriptors, pipeline)
    }

    fn pull_unit(descriptors: &DescriptorSet, bytes: &[u8]) -> TemporalUnit {
        let mut assembler = UnitAssembler::new(descriptors.frame_size());
        let mut buf = StreamBuffer::from_bytes(bytes);
        assembler
            .pull_one(&mut buf, descriptors, false)
            .unwrap()
            .unwrap()
    }

    /// The known integer matrix for the 16-byte ramp frame rendered to
    /// stereo.
    const EXPECTED_TICKS: [[i32; 2]; 8] = [
        [23_772_706, 23_773_107],
        [47_591_754, 47_592_556],
        [71_410_802, 71_412_005],
        [95_229_849, 95_231_454],
        [119_048_897, 119_050_903],
        [142_867_944, 142_870_353],
        [166_686_992, 166_689_802],
        [190_506_039, 190_509_251],
    ];

    #[test]
    fn renders_the_known_lpcm_ramp() -> anyhow::Result<()> {
        let (descriptors, mut pipeline) = pipeline_for_basic_set();
        let unit = pull_unit(
            &descriptors,
            &testdata::audio_frame(testdata::SUBSTREAM_ID, &testdata::lpcm_16bit_frame()),
        );
        let frame = pipeline.render_unit(&unit)?.expect("audible unit");
        assert_eq!(frame.len(), 2);
        assert_eq!(frame[0].len(), 8);
        for (t, expected) in EXPECTED_TICKS.iter().enumerate() {
            for (c, &value) in expected.iter().enumerate() {
                let quantized = (frame[c][t] * 2_147_483_648.0).round() as i32;
                assert_eq!(quantized, value, "tick {t} channel {c}");
            }
        }
        Ok(())
    }

    #[test]
    fn trivial_units_render_to_nothing() -> anyhow::Result<()> {
        let (_, mut pipeline) = pipeline_for_basic_set();
        let unit = TemporalUnit::default();
        assert!(pipeline.render_unit(&unit)?.is_none());
        Ok(())
    }

    #[test]
    fn trims_shorten_the_frame_edges() -> anyhow::Result<()> {
        let (descriptors, mut pipeline) = pipeline_for_basic_set();
        // Audio frame with trimming flags: 2 samples off the end, 1 off the
        // start.
        let mut payload = testdata::uleb(testdata::SUBSTREAM_ID);
        payload.extend_from_slice(&testdata::lpcm_16bit_frame());
        let mut obu = vec![(5 << 3) | 0b010];
        obu.extend_from_slice(&testdata::uleb(payload.len() as u32 + 2));
        obu.push(2); // trim at end
        obu.push(1); // trim at start
        obu.extend_from_slice(&payload);

        let unit = pull_unit(&descriptors, &obu);
        let frame = pipeline.render_unit(&unit)?.expect("audible unit");
        assert_eq!(frame[0].len(), 5);
        Ok(())
    }

    #[test]
    fn missing_substreams_fall_back_to_silence() -> anyhow::Result<()> {
        let mut buf = StreamBuffer::from_bytes(&testdata::two_substream_descriptors());
        let descriptors = accumulate(&mut buf, true).unwrap();
        let selection = select::select(&descriptors, &RequestedMix::default(), &[]).unwrap();
        let mut pipeline = RenderPipeline::create(&descriptors, &selection).unwrap();

        // Only substream 40 arrives; the implicit delimiter comes from a
        // duplicate.
        let mut stream = testdata::audio_frame(40, &testdata::lpcm_16bit_frame());
        stream.extend_from_slice(&testdata::audio_frame(40, &testdata::lpcm_16bit_frame()));
        let mut assembler = UnitAssembler::new(descriptors.frame_size());
        let mut unit_buf = StreamBuffer::from_bytes(&stream);
        let unit = assembler
            .pull_one(&mut unit_buf, &descriptors, false)
            .unwrap()
            .unwrap();

        let frame = pipeline.render_unit(&unit)?.expect("audible unit");
        // Channel 1 (substream 41) is silent, channel 0 is not.
        assert!(frame[0].iter().any(|&s| s != 0.0));
        assert!(frame[1].iter().all(|&s| s == 0.0));
        Ok(())
    }

    #[test]
    fn missing_coupled_substream_renders_silence() -> anyhow::Result<()> {
        let mut buf = StreamBuffer::from_bytes(&testdata::mixed_elements_descriptors());
        let descriptors = accumulate(&mut buf, true).unwrap();
        let selection = select::select(&descriptors, &RequestedMix::default(), &[]).unwrap();
        let mut pipeline = RenderPipeline::create(&descriptors, &selection).unwrap();

        // Only the ambisonics substream arrives; coupled substream 50 of
        // the other element is absent, and the repeat of 18 closes the
        // unit. Its silence placeholder must span both coupled channels.
        let mut stream =
            testdata::audio_frame(testdata::SUBSTREAM_ID, &testdata::lpcm_16bit_frame());
        stream.extend_from_slice(&testdata::audio_frame(
            testdata::SUBSTREAM_ID,
            &testdata::lpcm_16bit_frame(),
        ));
        let mut assembler = UnitAssembler::new(descriptors.frame_size());
        let mut unit_buf = StreamBuffer::from_bytes(&stream);
        let unit = assembler
            .pull_one(&mut unit_buf, &descriptors, false)
            .unwrap()
            .unwrap();

        let frame = pipeline.render_unit(&unit)?.expect("audible unit");
        assert_eq!(frame.len(), 2);
        // The ambisonics element still comes through.
        assert!(frame[0].iter().any(|&s| s != 0.0));
        assert!(frame[1].iter().any(|&s| s != 0.0));
        Ok(())
    }
}

//! Loudspeaker rendering.
//!
//! Maps an audio element's decoded channels onto the selected sound system
//! through a static gain matrix, then quantises the mixed result to the
//! 32-bit grid that the sample serialiser works from.
//!
//! Supported shapes: passthrough when the element's channel bed already
//! matches the output system, mono fan-out to stereo, and the W-channel
//! projection of mono-mode ambisonics to stereo or mono. Scalable-layout
//! demixing and projection-mode ambisonics are not rendered; a stream that
//! requires them fails at descriptor seal time instead of guessing.

use crate::structs::audio_element::{
    AmbisonicsConfig, AudioElement, AudioElementConfig, ScalableChannelLayoutConfig,
};
use crate::structs::mix_presentation::SoundSystem;
use crate::utils::errors::Error;

/// Zeroth-order ambisonics W to stereo, from the channel-bed rendering
/// tables.
pub const W_TO_STEREO: [f64; 2] = [0.707_100_821_161_033_2, 0.707_112_740_911_977_8];

const FRAC_1_SQRT_2: f64 = std::f64::consts::FRAC_1_SQRT_2;

/// One step up from [-1, 1) floats: the 32-bit quantisation grid.
const Q31_SCALE: f64 = 2_147_483_648.0;

/// The sound system a channel-based layer's `loudspeaker_layout` field
/// corresponds to.
fn layout_sound_system(loudspeaker_layout: u8) -> Option<SoundSystem> {
    Some(match loudspeaker_layout {
        0 => SoundSystem::Ext12, // mono
        1 => SoundSystem::A,     // stereo
        2 => SoundSystem::B,     // 5.1
        3 => SoundSystem::C,     // 5.1.2
        4 => SoundSystem::D,     // 5.1.4
        5 => SoundSystem::I,     // 7.1
        6 => SoundSystem::Ext10, // 7.1.2
        7 => SoundSystem::J,     // 7.1.4
        8 => SoundSystem::Ext11, // 3.1.2
        _ => return None,
    })
}

fn identity(n: usize) -> Vec<Vec<f64>> {
    (0..n)
        .map(|i| {
            let mut row = vec![0.0; n];
            row[i] = 1.0;
            row
        })
        .collect()
}

fn channel_bed_gains(
    scalable: &ScalableChannelLayoutConfig,
    in_channels: usize,
    output: SoundSystem,
) -> Result<Vec<Vec<f64>>, Error> {
    // Only the highest layer's bed is rendered; lower layers are subsets.
    let layer = scalable
        .layers
        .last()
        .expect("scalable layout always has a layer");
    let bed = layout_sound_system(layer.loudspeaker_layout);

    if bed == Some(output) {
        return Ok(identity(in_channels));
    }
    match (bed, output) {
        (Some(SoundSystem::Ext12), SoundSystem::A) => {
            // Constant-power mono fan-out.
            Ok(vec![vec![FRAC_1_SQRT_2, FRAC_1_SQRT_2]])
        }
        (Some(SoundSystem::A), SoundSystem::Ext12) => {
            Ok(vec![vec![FRAC_1_SQRT_2], vec![FRAC_1_SQRT_2]])
        }
        _ => Err(Error::Codec(format!(
            "no rendering path from loudspeaker_layout {} to sound system {output:?}",
            layer.loudspeaker_layout
        ))),
    }
}

fn ambisonics_gains(in_channels: usize, output: SoundSystem) -> Result<Vec<Vec<f64>>, Error> {
    // Project the omnidirectional W channel; higher-order components steer
    // direction and carry no additional energy for these beds.
    let w_row = match output {
        SoundSystem::A => W_TO_STEREO.to_vec(),
        SoundSystem::Ext12 => vec![1.0],
        other => {
            return Err(Error::Codec(format!(
                "no rendering path from ambisonics to sound system {other:?}"
            )))
        }
    };
    let out_channels = w_row.len();
    let mut gains = vec![vec![0.0; out_channels]; in_channels];
    gains[0] = w_row;
    Ok(gains)
}

/// Builds the element-channels x output-channels gain matrix.
pub fn plan_gains(element: &AudioElement, output: SoundSystem) -> Result<Vec<Vec<f64>>, Error> {
    let in_channels = element.channel_count();
    if in_channels == 0 {
        return Err(Error::Codec(format!(
            "audio element {} has no channels",
            element.id
        )));
    }
    match &element.config {
        AudioElementConfig::Channel(scalable) => channel_bed_gains(scalable, in_channels, output),
        AudioElementConfig::Ambisonics(AmbisonicsConfig::Mono(_)) => {
            ambisonics_gains(in_channels, output)
        }
        AudioElementConfig::Ambisonics(AmbisonicsConfig::Projection(_)) => {
            Err(Error::Codec(format!(
                "projection-mode ambisonics in element {} is not renderable",
                element.id
            )))
        }
    }
}

/// Mixes one element's channels into the output accumulator through the
/// gain matrix, scaled by the mix gains.
pub fn mix_into(
    output: &mut [Vec<f64>],
    element_channels: &[Vec<f64>],
    gains: &[Vec<f64>],
    scale: f64,
) {
    for (in_index, samples) in element_channels.iter().enumerate() {
        for (out_index, out_channel) in output.iter_mut().enumerate() {
            let gain = gains[in_index][out_index] * scale;
            if gain == 0.0 {
                continue;
            }
            let ticks = samples.len().min(out_channel.len());
            for t in 0..ticks {
                out_channel[t] += samples[t] * gain;
            }
        }
    }
}

/// Snaps every sample to the signed 32-bit grid: scale by `2^31`, truncate
/// toward zero, clip, and normalise back. The serialiser's rounding then
/// reproduces the integer matrix bit-exactly.
pub fn quantize_frame(channels: &mut [Vec<f64>]) {
    for channel in channels {
        for sample in channel {
            let scaled = (*sample * Q31_SCALE).trunc();
            let clipped = scaled.clamp(f64::from(i32::MIN), f64::from(i32::MAX));
            *sample = clipped / Q31_SCALE;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::descriptors::accumulate;
    use crate::testdata;
    use crate::utils::bits::StreamBuffer;

    fn basic_element() -> AudioElement {
        let mut buf = StreamBuffer::from_bytes(&testdata::basic_descriptors());
        let set = accumulate(&mut buf, true).unwrap();
        set.audio_elements[&testdata::AUDIO_ELEMENT_ID].clone()
    }

    #[test]
    fn mono_ambisonics_projects_w_to_stereo() -> anyhow::Result<()> {
        let gains = plan_gains(&basic_element(), SoundSystem::A)?;
        assert_eq!(gains, vec![W_TO_STEREO.to_vec()]);
        Ok(())
    }

    #[test]
    fn ambisonics_to_tall_layouts_is_rejected() {
        assert!(matches!(
            plan_gains(&basic_element(), SoundSystem::H),
            Err(Error::Codec(_))
        ));
    }

    #[test]
    fn stereo_bed_passes_through() -> anyhow::Result<()> {
        let mut buf = StreamBuffer::from_bytes(&testdata::two_substream_descriptors());
        let set = accumulate(&mut buf, true).unwrap();
        let element = set.audio_elements[&301].clone();
        let gains = plan_gains(&element, SoundSystem::A)?;
        assert_eq!(gains, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
        Ok(())
    }

    #[test]
    fn quantization_truncates_toward_zero() {
        let mut channels = vec![vec![0.3, -0.3]];
        quantize_frame(&mut channels);
        let expected_pos = (0.3f64 * Q31_SCALE).trunc() / Q31_SCALE;
        let expected_neg = (-0.3f64 * Q31_SCALE).trunc() / Q31_SCALE;
        assert_eq!(channels[0][0], expected_pos);
        assert_eq!(channels[0][1], expected_neg);
    }

    #[test]
    fn mix_into_accumulates_across_elements() {
        let mut output = vec![vec![0.0; 2]; 2];
        let element = vec![vec![0.5, 0.25]];
        let gains = vec![vec![1.0, 0.5]];
        mix_into(&mut output, &element, &gains, 1.0);
        mix_into(&mut output, &element, &gains, 1.0);
        assert_eq!(output[0], vec![1.0, 0.5]);
        assert_eq!(output[1], vec![0.5, 0.25]);
    }
}

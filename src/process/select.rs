//! Mix presentation and layout selection.
//!
//! Maps the caller's requested (profile, mix, layout) hints onto what the
//! descriptors actually declare, with a deterministic stereo fallback. Runs
//! exactly once, right after the descriptor set is sealed; the outcome is
//! immutable until a reset.

use log::debug;

use crate::process::descriptors::DescriptorSet;
use crate::structs::mix_presentation::{MixPresentation, SoundSystem};
use crate::structs::sequence_header::ProfileVersion;
use crate::utils::errors::DescriptorError;

/// Caller hints for the selection. All fields are optional.
#[derive(Debug, Clone, Default)]
pub struct RequestedMix {
    pub mix_presentation_id: Option<u32>,
    pub output_layout: Option<SoundSystem>,
}

/// The resolved selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectedMix {
    pub mix_presentation_id: u32,
    pub output_layout: SoundSystem,
}

/// Selection plus the indices the render pipeline needs to find the chosen
/// sub-mix and layout again.
#[derive(Debug, Clone, Copy)]
pub struct Selection {
    pub selected: SelectedMix,
    pub mix_index: usize,
    pub sub_mix_index: usize,
    pub layout_index: usize,
}

/// The least capable profile that can carry a mix presentation.
fn required_profile(mix: &MixPresentation, descriptors: &DescriptorSet) -> ProfileVersion {
    let element_count = mix.audio_element_ids().count();
    let channel_count: usize = mix
        .audio_element_ids()
        .filter_map(|id| descriptors.audio_elements.get(&id))
        .map(|element| element.channel_count())
        .sum();
    if element_count <= 1 && channel_count <= 16 {
        ProfileVersion::Simple
    } else if element_count <= 2 && channel_count <= 18 {
        ProfileVersion::Base
    } else {
        ProfileVersion::BaseEnhanced
    }
}

fn first_ss_layout(mix: &MixPresentation) -> Option<(usize, usize, SoundSystem)> {
    for (sub_mix_index, sub_mix) in mix.sub_mixes.iter().enumerate() {
        for (layout_index, layout) in sub_mix.layouts.iter().enumerate() {
            if let Some(system) = layout.layout.sound_system() {
                return Some((sub_mix_index, layout_index, system));
            }
        }
    }
    None
}

/// Chooses one mix presentation and one of its loudspeaker layouts.
///
/// 1. Keep mix presentations whose profile is in `profiles` (all, if the
///    set is empty).
/// 2. Honor `requested.mix_presentation_id` when it names a survivor, else
///    take the first survivor in descriptor order.
/// 3. Within the chosen mix, use the requested layout when declared.
/// 4. Otherwise fall back to stereo (sound system A) when declared.
/// 5. Otherwise take the mix's first loudspeaker layout.
pub fn select(
    descriptors: &DescriptorSet,
    requested: &RequestedMix,
    profiles: &[ProfileVersion],
) -> Result<Selection, DescriptorError> {
    let survivors: Vec<(usize, &MixPresentation)> = descriptors
        .mix_presentations
        .iter()
        .enumerate()
        .filter(|(_, mix)| {
            profiles.is_empty() || profiles.contains(&required_profile(mix, descriptors))
        })
        .collect();
    if survivors.is_empty() {
        return Err(DescriptorError::Invalid(
            "no mix presentation matches the requested profile versions".into(),
        ));
    }

    let &(mix_index, mix) = requested
        .mix_presentation_id
        .and_then(|id| survivors.iter().find(|(_, mix)| mix.id == id))
        .unwrap_or(&survivors[0]);

    let (sub_mix_index, layout_index, output_layout) = requested
        .output_layout
        .and_then(|system| {
            mix.find_layout(system)
                .map(|(sub_mix, layout)| (sub_mix, layout, system))
        })
        .or_else(|| {
            mix.find_layout(SoundSystem::A)
                .map(|(sub_mix, layout)| (sub_mix, layout, SoundSystem::A))
        })
        .or_else(|| first_ss_layout(mix))
        .ok_or_else(|| {
            DescriptorError::Invalid(format!(
                "mix presentation {} has no loudspeaker layout",
                mix.id
            ))
        })?;

    debug!(
        "selected mix presentation {} with sound system {:?}",
        mix.id, output_layout
    );
    Ok(Selection {
        selected: SelectedMix {
            mix_presentation_id: mix.id,
            output_layout,
        },
        mix_index,
        sub_mix_index,
        layout_index,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::descriptors::accumulate;
    use crate::testdata;
    use crate::utils::bits::StreamBuffer;

    fn basic_set() -> DescriptorSet {
        let mut buf = StreamBuffer::from_bytes(&testdata::basic_descriptors());
        accumulate(&mut buf, true).unwrap()
    }

    #[test]
    fn unsupported_layout_falls_back_to_stereo() {
        let descriptors = basic_set();
        let requested = RequestedMix {
            mix_presentation_id: None,
            output_layout: Some(SoundSystem::E),
        };
        let selection = select(&descriptors, &requested, &[]).unwrap();
        assert_eq!(selection.selected.output_layout, SoundSystem::A);
        assert_eq!(
            selection.selected.mix_presentation_id,
            testdata::MIX_PRESENTATION_ID
        );
    }

    #[test]
    fn requested_id_wins_when_present() {
        let descriptors = basic_set();
        let requested = RequestedMix {
            mix_presentation_id: Some(testdata::MIX_PRESENTATION_ID),
            output_layout: None,
        };
        let selection = select(&descriptors, &requested, &[]).unwrap();
        assert_eq!(
            selection.selected.mix_presentation_id,
            testdata::MIX_PRESENTATION_ID
        );
    }

    #[test]
    fn unknown_id_falls_back_to_first_mix() {
        let descriptors = basic_set();
        let requested = RequestedMix {
            mix_presentation_id: Some(77),
            output_layout: None,
        };
        let selection = select(&descriptors, &requested, &[]).unwrap();
        assert_eq!(
            selection.selected.mix_presentation_id,
            testdata::MIX_PRESENTATION_ID
        );
    }

    #[test]
    fn profile_filter_can_rule_out_every_mix() {
        let descriptors = basic_set();
        // The basic mix needs only the simple profile, so restricting the
        // request to base-enhanced leaves nothing.
        let result = select(
            &descriptors,
            &RequestedMix::default(),
            &[ProfileVersion::BaseEnhanced],
        );
        assert!(matches!(result, Err(DescriptorError::Invalid(_))));

        let selection = select(
            &descriptors,
            &RequestedMix::default(),
            &[ProfileVersion::Simple, ProfileVersion::Base],
        )
        .unwrap();
        assert_eq!(selection.selected.output_layout, SoundSystem::A);
    }
}

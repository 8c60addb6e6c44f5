//! Channel reordering.
//!
//! Permutes rendered channels from the canonical IAMF order into a target
//! channel convention. The permutation moves the per-channel containers in
//! the outer slice; no audio samples are copied.

use crate::structs::mix_presentation::SoundSystem;

/// Target channel convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReorderScheme {
    /// Keep the canonical IAMF order.
    #[default]
    NoOp,
    /// The Android audio HAL convention: back surrounds before sides, LFE
    /// after the screen channels, heights last.
    AndroidConvention,
}

/// The permutation for a sound system, as `destination[i] = source[table[i]]`.
///
/// `None` means identity. Sound systems A..E and the 11..13 extensions
/// already match the Android convention.
pub fn permutation(system: SoundSystem, scheme: ReorderScheme) -> Option<Vec<usize>> {
    if scheme == ReorderScheme::NoOp {
        return None;
    }
    match system {
        // Back L/R move before side L/R; everything else stays.
        SoundSystem::I | SoundSystem::J | SoundSystem::Ext10 => {
            let mut table: Vec<usize> = (0..system.channel_count()).collect();
            table.swap(4, 6);
            table.swap(5, 7);
            Some(table)
        }
        SoundSystem::F => Some(vec![1, 2, 0, 10, 7, 8, 5, 6, 9, 3, 4, 11]),
        SoundSystem::G => Some(vec![0, 1, 2, 3, 6, 7, 12, 13, 4, 5, 8, 9, 10, 11]),
        SoundSystem::H => Some(vec![
            0, 1, 2, 3, 4, 5, 6, 7, 8, 10, 11, 15, 12, 14, 13, 16, 20, 17, 18, 19, 22, 21, 23, 9,
        ]),
        _ => None,
    }
}

/// Applies the scheme's permutation to a channel-major frame in place.
pub fn reorder<T: Default>(channels: &mut Vec<T>, system: SoundSystem, scheme: ReorderScheme) {
    let Some(table) = permutation(system, scheme) else {
        return;
    };
    debug_assert_eq!(table.len(), channels.len());
    let mut source: Vec<T> = std::mem::take(channels);
    let mut destination = Vec::with_capacity(source.len());
    for &index in &table {
        destination.push(std::mem::take(&mut source[index]));
    }
    *channels = destination;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn systems() -> [SoundSystem; 14] {
        [
            SoundSystem::A,
            SoundSystem::B,
            SoundSystem::C,
            SoundSystem::D,
            SoundSystem::E,
            SoundSystem::F,
            SoundSystem::G,
            SoundSystem::H,
            SoundSystem::I,
            SoundSystem::J,
            SoundSystem::Ext10,
            SoundSystem::Ext11,
            SoundSystem::Ext12,
            SoundSystem::Ext13,
        ]
    }

    #[test]
    fn every_table_is_an_exact_permutation() {
        for system in systems() {
            let n = system.channel_count();
            let mut channels: Vec<Vec<usize>> = (0..n).map(|c| vec![c]).collect();
            reorder(&mut channels, system, ReorderScheme::AndroidConvention);
            let mut seen: Vec<usize> = channels.iter().map(|c| c[0]).collect();
            seen.sort_unstable();
            assert_eq!(seen, (0..n).collect::<Vec<_>>(), "system {system:?}");
        }
    }

    #[test]
    fn noop_scheme_never_moves_channels() {
        for system in systems() {
            let n = system.channel_count();
            let mut channels: Vec<Vec<usize>> = (0..n).map(|c| vec![c]).collect();
            reorder(&mut channels, system, ReorderScheme::NoOp);
            let flat: Vec<usize> = channels.iter().map(|c| c[0]).collect();
            assert_eq!(flat, (0..n).collect::<Vec<_>>());
        }
    }

    #[test]
    fn seven_surround_systems_swap_backs_and_sides() {
        for system in [SoundSystem::I, SoundSystem::J, SoundSystem::Ext10] {
            let n = system.channel_count();
            let mut channels: Vec<Vec<usize>> = (0..n).map(|c| vec![c]).collect();
            reorder(&mut channels, system, ReorderScheme::AndroidConvention);
            let flat: Vec<usize> = channels.iter().map(|c| c[0]).collect();
            assert_eq!(&flat[..8], &[0, 1, 2, 3, 6, 7, 4, 5], "system {system:?}");
            assert_eq!(&flat[8..], (8..n).collect::<Vec<_>>(), "system {system:?}");
        }
    }

    #[test]
    fn fixed_tables_match_the_convention() {
        assert_eq!(
            permutation(SoundSystem::F, ReorderScheme::AndroidConvention).unwrap(),
            vec![1, 2, 0, 10, 7, 8, 5, 6, 9, 3, 4, 11]
        );
        assert_eq!(
            permutation(SoundSystem::G, ReorderScheme::AndroidConvention).unwrap(),
            vec![0, 1, 2, 3, 6, 7, 12, 13, 4, 5, 8, 9, 10, 11]
        );
        assert_eq!(
            permutation(SoundSystem::H, ReorderScheme::AndroidConvention).unwrap(),
            vec![
                0, 1, 2, 3, 4, 5, 6, 7, 8, 10, 11, 15, 12, 14, 13, 16, 20, 17, 18, 19, 22, 21,
                23, 9
            ]
        );
        for system in [
            SoundSystem::A,
            SoundSystem::B,
            SoundSystem::C,
            SoundSystem::D,
            SoundSystem::E,
            SoundSystem::Ext11,
            SoundSystem::Ext12,
            SoundSystem::Ext13,
        ] {
            assert!(permutation(system, ReorderScheme::AndroidConvention).is_none());
        }
    }
}

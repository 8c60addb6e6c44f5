//! Mix presentation OBU: sub-mixes, reproduction layouts, loudness metadata.

use crate::structs::param::MixGainParamDefinition;
use crate::utils::bits::StreamBuffer;
use crate::utils::errors::ObuError;

/// ITU-R BS.2051 sound systems A..J plus the IAMF extensions 10..13.
///
/// Each value fixes a channel count and a canonical IAMF channel order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SoundSystem {
    /// 0+2+0 stereo
    A,
    /// 0+5+0
    B,
    /// 2+5+0
    C,
    /// 4+5+0
    D,
    /// 4+5+1
    E,
    /// 3+7+0
    F,
    /// 4+9+0
    G,
    /// 9+10+3
    H,
    /// 0+7+0
    I,
    /// 4+7+0
    J,
    /// 2+7+0, IAMF's 7.1.2
    Ext10,
    /// 2+3+0, IAMF's 3.1.2
    Ext11,
    /// 0+1+0 mono
    Ext12,
    /// 6+9+0, IAMF's 9.1.6
    Ext13,
}

impl SoundSystem {
    pub fn from_raw(raw: u8) -> Option<Self> {
        Some(match raw {
            0 => SoundSystem::A,
            1 => SoundSystem::B,
            2 => SoundSystem::C,
            3 => SoundSystem::D,
            4 => SoundSystem::E,
            5 => SoundSystem::F,
            6 => SoundSystem::G,
            7 => SoundSystem::H,
            8 => SoundSystem::I,
            9 => SoundSystem::J,
            10 => SoundSystem::Ext10,
            11 => SoundSystem::Ext11,
            12 => SoundSystem::Ext12,
            13 => SoundSystem::Ext13,
            _ => return None,
        })
    }

    pub fn raw(self) -> u8 {
        match self {
            SoundSystem::A => 0,
            SoundSystem::B => 1,
            SoundSystem::C => 2,
            SoundSystem::D => 3,
            SoundSystem::E => 4,
            SoundSystem::F => 5,
            SoundSystem::G => 6,
            SoundSystem::H => 7,
            SoundSystem::I => 8,
            SoundSystem::J => 9,
            SoundSystem::Ext10 => 10,
            SoundSystem::Ext11 => 11,
            SoundSystem::Ext12 => 12,
            SoundSystem::Ext13 => 13,
        }
    }

    pub fn channel_count(self) -> usize {
        match self {
            SoundSystem::A => 2,
            SoundSystem::B => 6,
            SoundSystem::C => 8,
            SoundSystem::D => 10,
            SoundSystem::E => 11,
            SoundSystem::F => 12,
            SoundSystem::G => 14,
            SoundSystem::H => 24,
            SoundSystem::I => 8,
            SoundSystem::J => 12,
            SoundSystem::Ext10 => 10,
            SoundSystem::Ext11 => 6,
            SoundSystem::Ext12 => 1,
            SoundSystem::Ext13 => 16,
        }
    }
}

/// A reproduction layout attached to a sub-mix.
///
/// Only the loudspeaker sound-system convention crosses the public decoder
/// boundary; reserved and binaural layouts are parsed and kept so loudness
/// metadata stays addressable, but they are never selected for output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    SsConvention(SoundSystem),
    ReservedOrBinaural(u8),
}

impl Layout {
    fn read(buf: &mut StreamBuffer) -> Result<Self, ObuError> {
        let layout_type = buf.read_bits(2)? as u8;
        match layout_type {
            2 => {
                let sound_system_raw = buf.read_bits(4)? as u8;
                let _reserved = buf.read_bits(2)?;
                let sound_system = SoundSystem::from_raw(sound_system_raw).ok_or_else(|| {
                    ObuError::Malformed(format!("reserved sound_system {sound_system_raw}"))
                })?;
                Ok(Layout::SsConvention(sound_system))
            }
            other => {
                let _reserved = buf.read_bits(6)?;
                Ok(Layout::ReservedOrBinaural(other))
            }
        }
    }

    pub fn sound_system(self) -> Option<SoundSystem> {
        match self {
            Layout::SsConvention(system) => Some(system),
            Layout::ReservedOrBinaural(_) => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LoudnessInfo {
    pub info_type: u8,
    pub integrated_loudness: i16,
    pub digital_peak: i16,
    pub true_peak: Option<i16>,
    pub anchored_loudness: Vec<(u8, i16)>,
    pub extension: Vec<u8>,
}

impl LoudnessInfo {
    const TRUE_PEAK: u8 = 0b01;
    const ANCHORED: u8 = 0b10;

    fn read(buf: &mut StreamBuffer) -> Result<Self, ObuError> {
        let mut loudness = Self {
            info_type: buf.read_u8()?,
            integrated_loudness: buf.read_i16()?,
            digital_peak: buf.read_i16()?,
            ..Default::default()
        };
        if loudness.info_type & Self::TRUE_PEAK != 0 {
            loudness.true_peak = Some(buf.read_i16()?);
        }
        if loudness.info_type & Self::ANCHORED != 0 {
            let count = buf.read_u8()?;
            for _ in 0..count {
                let anchor_element = buf.read_u8()?;
                let anchored_loudness = buf.read_i16()?;
                loudness.anchored_loudness.push((anchor_element, anchored_loudness));
            }
        }
        if loudness.info_type & !(Self::TRUE_PEAK | Self::ANCHORED) != 0 {
            let (size, _) = buf.read_uleb128()?;
            loudness.extension = buf.read_vec(size as usize)?;
        }
        Ok(loudness)
    }
}

#[derive(Debug, Clone)]
pub struct MixPresentationLayout {
    pub layout: Layout,
    pub loudness: LoudnessInfo,
}

#[derive(Debug, Clone)]
pub struct SubMixAudioElement {
    pub audio_element_id: u32,
    pub localized_annotations: Vec<String>,
    pub headphones_rendering_mode: u8,
    pub rendering_config_extension: Vec<u8>,
    pub element_mix_gain: MixGainParamDefinition,
}

impl SubMixAudioElement {
    fn read(count_label: u32, buf: &mut StreamBuffer) -> Result<Self, ObuError> {
        let (audio_element_id, _) = buf.read_uleb128()?;
        let mut localized_annotations = Vec::with_capacity(count_label as usize);
        for _ in 0..count_label {
            localized_annotations.push(buf.read_string()?);
        }
        let headphones_rendering_mode = buf.read_bits(2)? as u8;
        let _reserved = buf.read_bits(6)?;
        let (extension_size, _) = buf.read_uleb128()?;
        let rendering_config_extension = buf.read_vec(extension_size as usize)?;
        let element_mix_gain = MixGainParamDefinition::read(buf)?;
        Ok(Self {
            audio_element_id,
            localized_annotations,
            headphones_rendering_mode,
            rendering_config_extension,
            element_mix_gain,
        })
    }
}

#[derive(Debug, Clone)]
pub struct MixPresentationSubMix {
    pub audio_elements: Vec<SubMixAudioElement>,
    pub output_mix_gain: MixGainParamDefinition,
    pub layouts: Vec<MixPresentationLayout>,
}

impl MixPresentationSubMix {
    fn read(count_label: u32, buf: &mut StreamBuffer) -> Result<Self, ObuError> {
        let (num_audio_elements, _) = buf.read_uleb128()?;
        if num_audio_elements == 0 {
            return Err(ObuError::Malformed("sub-mix has no audio elements".into()));
        }
        let mut audio_elements = Vec::with_capacity(num_audio_elements as usize);
        for _ in 0..num_audio_elements {
            audio_elements.push(SubMixAudioElement::read(count_label, buf)?);
        }
        let output_mix_gain = MixGainParamDefinition::read(buf)?;
        let (num_layouts, _) = buf.read_uleb128()?;
        if num_layouts == 0 {
            return Err(ObuError::Malformed("sub-mix has no layouts".into()));
        }
        let mut layouts = Vec::with_capacity(num_layouts as usize);
        for _ in 0..num_layouts {
            layouts.push(MixPresentationLayout {
                layout: Layout::read(buf)?,
                loudness: LoudnessInfo::read(buf)?,
            });
        }
        Ok(Self {
            audio_elements,
            output_mix_gain,
            layouts,
        })
    }
}

/// A parsed mix presentation OBU.
#[derive(Debug, Clone)]
pub struct MixPresentation {
    pub id: u32,
    pub annotations_language: Vec<String>,
    pub localized_annotations: Vec<String>,
    pub sub_mixes: Vec<MixPresentationSubMix>,
    pub tags: Vec<(String, String)>,
}

impl MixPresentation {
    pub fn read(payload_size: u64, buf: &mut StreamBuffer) -> Result<Self, ObuError> {
        let start = buf.tell();
        let (id, _) = buf.read_uleb128()?;
        let (count_label, _) = buf.read_uleb128()?;
        let mut annotations_language = Vec::with_capacity(count_label as usize);
        for _ in 0..count_label {
            annotations_language.push(buf.read_string()?);
        }
        let mut localized_annotations = Vec::with_capacity(count_label as usize);
        for _ in 0..count_label {
            localized_annotations.push(buf.read_string()?);
        }
        let (num_sub_mixes, _) = buf.read_uleb128()?;
        if num_sub_mixes == 0 {
            return Err(ObuError::Malformed(
                "mix presentation has no sub-mixes".into(),
            ));
        }
        let mut sub_mixes = Vec::with_capacity(num_sub_mixes as usize);
        for _ in 0..num_sub_mixes {
            sub_mixes.push(MixPresentationSubMix::read(count_label, buf)?);
        }

        // The tags block is optional; its presence is implied by remaining
        // payload bytes.
        let mut tags = Vec::new();
        let payload_bits = payload_size << 3;
        if buf.tell() - start < payload_bits {
            let num_tags = buf.read_u8()?;
            for _ in 0..num_tags {
                let name = buf.read_string()?;
                let value = buf.read_string()?;
                tags.push((name, value));
            }
        }

        let consumed = buf.tell() - start;
        if consumed > payload_bits {
            return Err(ObuError::Malformed(
                "sub-mixes overran the mix presentation payload".into(),
            ));
        }
        buf.skip_bits(payload_bits - consumed)?;

        Ok(Self {
            id,
            annotations_language,
            localized_annotations,
            sub_mixes,
            tags,
        })
    }

    /// All audio element ids referenced by any sub-mix.
    pub fn audio_element_ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.sub_mixes
            .iter()
            .flat_map(|sub_mix| sub_mix.audio_elements.iter())
            .map(|element| element.audio_element_id)
    }

    /// Looks up the first (sub-mix, layout) pair using the given sound
    /// system.
    pub fn find_layout(&self, system: SoundSystem) -> Option<(usize, usize)> {
        for (sub_mix_index, sub_mix) in self.sub_mixes.iter().enumerate() {
            for (layout_index, layout) in sub_mix.layouts.iter().enumerate() {
                if layout.layout.sound_system() == Some(system) {
                    return Some((sub_mix_index, layout_index));
                }
            }
        }
        None
    }
}

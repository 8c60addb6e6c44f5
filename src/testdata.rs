//! Hand-assembled bitstream snippets shared across tests.
//!
//! The "basic" descriptor set mirrors the smallest useful IA sequence: one
//! sequence header, a 48 kHz / 8-samples-per-frame / 16-bit LPCM codec
//! config, a zeroth-order mono ambisonics element on substream 18, and mix
//! presentation 3 with a single stereo layout.

pub const CODEC_CONFIG_ID: u32 = 21;
pub const AUDIO_ELEMENT_ID: u32 = 300;
pub const MIX_PRESENTATION_ID: u32 = 3;
pub const SUBSTREAM_ID: u32 = 18;
pub const SEQUENCE_HEADER_LEN: usize = 8;

pub fn uleb(mut value: u32) -> Vec<u8> {
    let mut out = Vec::new();
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return out;
        }
        out.push(byte | 0x80);
    }
}

/// Frames `payload` as an OBU of the given raw type with clear flags.
pub fn obu(type_raw: u8, payload: &[u8]) -> Vec<u8> {
    let mut out = vec![type_raw << 3];
    out.extend_from_slice(&uleb(payload.len() as u32));
    out.extend_from_slice(payload);
    out
}

pub fn sequence_header() -> Vec<u8> {
    let mut payload = b"iamf".to_vec();
    payload.push(0); // primary_profile: simple
    payload.push(1); // additional_profile: base
    obu(31, &payload)
}

pub fn lpcm_codec_config() -> Vec<u8> {
    let mut payload = uleb(CODEC_CONFIG_ID);
    payload.extend_from_slice(b"ipcm");
    payload.extend_from_slice(&uleb(8)); // num_samples_per_frame
    payload.extend_from_slice(&0i16.to_be_bytes()); // audio_roll_distance
    payload.push(1); // little endian
    payload.push(16); // sample_size
    payload.extend_from_slice(&48_000u32.to_be_bytes());
    obu(0, &payload)
}

pub fn ambisonics_mono_element() -> Vec<u8> {
    let mut payload = uleb(AUDIO_ELEMENT_ID);
    payload.push(1 << 5); // scene based
    payload.extend_from_slice(&uleb(CODEC_CONFIG_ID));
    payload.extend_from_slice(&uleb(1)); // num_substreams
    payload.extend_from_slice(&uleb(SUBSTREAM_ID));
    payload.extend_from_slice(&uleb(0)); // num_parameters
    payload.extend_from_slice(&uleb(0)); // ambisonics_mode mono
    payload.push(1); // output_channel_count
    payload.push(1); // substream_count
    payload.push(0); // channel_mapping
    obu(1, &payload)
}

pub fn stereo_mix_presentation() -> Vec<u8> {
    stereo_mix_presentation_referencing(AUDIO_ELEMENT_ID)
}

pub fn stereo_mix_presentation_referencing(element_id: u32) -> Vec<u8> {
    stereo_mix_presentation_for(&[element_id])
}

/// Mix presentation 3 with one sub-mix over the given elements and a single
/// stereo layout.
pub fn stereo_mix_presentation_for(element_ids: &[u32]) -> Vec<u8> {
    let mut payload = uleb(MIX_PRESENTATION_ID);
    payload.extend_from_slice(&uleb(0)); // count_label
    payload.extend_from_slice(&uleb(1)); // num_sub_mixes
    payload.extend_from_slice(&uleb(element_ids.len() as u32));
    for &element_id in element_ids {
        payload.extend_from_slice(&uleb(element_id));
        payload.push(0); // headphones_rendering_mode + reserved
        payload.extend_from_slice(&uleb(0)); // rendering_config_extension_size
        payload.extend_from_slice(&[10, 48, 0x80, 0, 0]); // element_mix_gain, 0 dB
    }
    payload.extend_from_slice(&[11, 48, 0x80, 0, 0]); // output_mix_gain, 0 dB
    payload.extend_from_slice(&uleb(1)); // num_layouts
    payload.push(0b1000_0000); // ss convention, sound system A
    payload.extend_from_slice(&[0, 0, 0, 0, 0]); // loudness info
    obu(2, &payload)
}

/// The complete basic descriptor blob.
pub fn basic_descriptors() -> Vec<u8> {
    let mut blob = sequence_header();
    blob.extend_from_slice(&lpcm_codec_config());
    blob.extend_from_slice(&ambisonics_mono_element());
    blob.extend_from_slice(&stereo_mix_presentation());
    blob
}

/// Channel-based stereo element carried by two mono substreams 40 and 41.
pub fn channel_element_two_substreams() -> Vec<u8> {
    let mut payload = uleb(301);
    payload.push(0); // channel based
    payload.extend_from_slice(&uleb(CODEC_CONFIG_ID));
    payload.extend_from_slice(&uleb(2)); // num_substreams
    payload.extend_from_slice(&uleb(40));
    payload.extend_from_slice(&uleb(41));
    payload.extend_from_slice(&uleb(0)); // num_parameters
    payload.push(1 << 5); // num_layers = 1
    payload.push(1 << 4); // loudspeaker_layout stereo, no flags
    payload.push(2); // substream_count
    payload.push(0); // coupled_substream_count
    obu(1, &payload)
}

/// Descriptor blob whose only element spans substreams 40 and 41.
pub fn two_substream_descriptors() -> Vec<u8> {
    let mut blob = sequence_header();
    blob.extend_from_slice(&lpcm_codec_config());
    blob.extend_from_slice(&channel_element_two_substreams());
    blob.extend_from_slice(&stereo_mix_presentation_referencing(301));
    blob
}

/// Channel-based stereo element whose single substream 50 is coupled and
/// carries both channels.
pub fn coupled_stereo_element() -> Vec<u8> {
    let mut payload = uleb(302);
    payload.push(0); // channel based
    payload.extend_from_slice(&uleb(CODEC_CONFIG_ID));
    payload.extend_from_slice(&uleb(1)); // num_substreams
    payload.extend_from_slice(&uleb(50));
    payload.extend_from_slice(&uleb(0)); // num_parameters
    payload.push(1 << 5); // num_layers = 1
    payload.push(1 << 4); // loudspeaker_layout stereo, no flags
    payload.push(1); // substream_count
    payload.push(1); // coupled_substream_count
    obu(1, &payload)
}

/// Descriptor blob mixing the mono ambisonics element with the coupled
/// stereo element.
pub fn mixed_elements_descriptors() -> Vec<u8> {
    let mut blob = sequence_header();
    blob.extend_from_slice(&lpcm_codec_config());
    blob.extend_from_slice(&ambisonics_mono_element());
    blob.extend_from_slice(&coupled_stereo_element());
    blob.extend_from_slice(&stereo_mix_presentation_for(&[AUDIO_ELEMENT_ID, 302]));
    blob
}

pub fn temporal_delimiter() -> Vec<u8> {
    obu(4, &[])
}

/// Audio frame OBU with an explicit substream id.
pub fn audio_frame(substream_id: u32, data: &[u8]) -> Vec<u8> {
    let mut payload = uleb(substream_id);
    payload.extend_from_slice(data);
    obu(5, &payload)
}

/// 8 little-endian 16-bit samples: 0x0201, 0x0403, ... 0x100F.
pub fn lpcm_16bit_frame() -> Vec<u8> {
    (1..=16).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uleb_matches_known_encodings() {
        assert_eq!(uleb(0), vec![0]);
        assert_eq!(uleb(127), vec![0x7f]);
        assert_eq!(uleb(300), vec![0xAC, 0x02]);
    }

    #[test]
    fn sequence_header_len_is_in_sync() {
        assert_eq!(sequence_header().len(), SEQUENCE_HEADER_LEN);
    }
}

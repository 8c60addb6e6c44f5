//! Iterative streaming decoder for IAMF bitstreams.
//!
//! ## Bitstream Organization
//!
//! An IA sequence is a run of self-delimiting Open Bitstream Units: a
//! descriptor block (sequence header, codec configs, audio elements, mix
//! presentations) followed by temporal units (audio frames and parameter
//! blocks, one group per timestamp).
//!
//! ## Decoding Model
//!
//! The decoder is push/pull: the caller pushes arbitrary byte chunks with
//! [`decoder::IamfDecoder::decode`] and pulls rendered temporal units as
//! interleaved little-endian PCM. Partial input is never an error; every
//! stage rewinds on insufficiency and resumes once more bytes arrive.
//!
//! 1. Feed bytes until [`decoder::IamfDecoder::is_descriptor_processing_complete`]
//!    turns true. The call that seals the descriptors returns before any
//!    audio is decoded so output buffers can be sized from the metadata
//!    getters.
//! 2. Keep feeding; collect frames through
//!    [`decoder::IamfDecoder::get_output_temporal_unit`] while
//!    [`decoder::IamfDecoder::is_temporal_unit_available`].
//! 3. Finish with [`decoder::IamfDecoder::signal_end_of_stream`] and drain
//!    the tail.
//!
//! Decoded substreams are rendered to one loudspeaker layout chosen from
//! the stream's mix presentations against the caller's requested mix,
//! profile, and layout hints, with a deterministic stereo fallback.

/// The public decoder facade and its settings.
pub mod decoder;

/// Pipeline stages: descriptor accumulation, selection, temporal-unit
/// assembly, codecs, rendering, reordering.
pub mod process;

/// Wire-format data structures for every OBU kind.
pub mod structs;

/// Bit buffer, error types, PCM serialisation.
pub mod utils;

#[cfg(test)]
pub(crate) mod testdata;

pub use crate::decoder::{IamfDecoder, RequestedMix, SelectedMix, Settings};
pub use crate::process::reorder::ReorderScheme;
pub use crate::structs::mix_presentation::SoundSystem;
pub use crate::structs::sequence_header::ProfileVersion;
pub use crate::utils::errors::Error;
pub use crate::utils::pcm::OutputSampleType;

//! Pipeline stages, descriptor territory first.
//!
//! 1. **Descriptor accumulation** ([`descriptors`]): framed OBUs in, a
//!    sealed [`descriptors::DescriptorSet`] out.
//! 2. **Selection** ([`select`]): caller hints against the sealed set.
//! 3. **Temporal assembly** ([`temporal`]): one unit per timestamp,
//!    all-or-nothing.
//! 4. **Decode and render** ([`pipeline`], [`codecs`], [`render`]):
//!    substream bytes to a quantised output frame.
//! 5. **Reordering** ([`reorder`]): canonical IAMF order to the requested
//!    channel convention.

pub mod codecs;
pub mod descriptors;
pub mod pipeline;
pub mod render;
pub mod reorder;
pub mod select;
pub mod temporal;

//! Supporting infrastructure.
//!
//! - **Stream bit buffer** ([`bits`]): push-based byte absorption with
//!   bit-aligned, all-or-nothing reads
//! - **Error types** ([`errors`]): per-layer error enums and the public
//!   decoder error
//! - **PCM serialisation** ([`pcm`]): interleaved little-endian output

pub mod bits;
pub mod errors;
pub mod pcm;

//! Error types for bitstream reading, OBU parsing, and the decoder facade.

/// Errors from the stream bit buffer.
///
/// `Insufficient` is the load-bearing variant: it tells the caller that the
/// requested read would run past the buffered bytes and that the cursor was
/// left untouched, so the read can be retried after more data is pushed.
#[derive(thiserror::Error, Debug)]
pub enum BitsError {
    #[error("insufficient data in stream buffer")]
    Insufficient,

    #[error("uleb128 needs more than {0} bytes or exceeds 32 bits")]
    UlebOverflow(usize),

    #[error("string exceeds {0} bytes without a NUL terminator")]
    UnterminatedString(usize),

    #[error("expandable size field exceeds 32 bits")]
    ExpandableSizeOverflow,

    #[error("seek to bit {target} outside the buffered range of {len} bits")]
    SeekOutOfRange { target: u64, len: u64 },

    #[error("cannot flush {bytes} bytes past the read cursor at bit {cursor}")]
    FlushPastCursor { bytes: usize, cursor: u64 },
}

/// Errors from framing and parsing a single OBU.
#[derive(thiserror::Error, Debug)]
pub enum ObuError {
    #[error("insufficient data for a complete OBU")]
    Insufficient,

    #[error("{0}")]
    Malformed(String),
}

impl From<BitsError> for ObuError {
    fn from(e: BitsError) -> Self {
        match e {
            BitsError::Insufficient => ObuError::Insufficient,
            other => ObuError::Malformed(other.to_string()),
        }
    }
}

/// Errors from accumulating the descriptor OBUs into a sealed set.
#[derive(thiserror::Error, Debug)]
pub enum DescriptorError {
    #[error("need more data to finish the descriptor OBUs")]
    Insufficient,

    #[error("{0}")]
    Invalid(String),
}

/// Errors from assembling one temporal unit.
#[derive(thiserror::Error, Debug)]
pub enum TemporalError {
    #[error("descriptor OBU found after the descriptor set was sealed")]
    UnexpectedDescriptor,

    #[error("{0}")]
    Corrupt(String),
}

/// Errors surfaced by the public decoder API.
///
/// Only `BufferTooSmall`, `DescriptorsNotReady`, `DecodeAfterEos` and
/// `ResetUnavailable` leave the decoder usable. Every other variant poisons
/// the instance; the stream position and downstream codec state are then
/// indeterminate and only dropping the decoder (or `reset` in descriptor
/// mode) is defined.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid descriptor OBUs: {0}")]
    InvalidDescriptors(String),

    #[error("descriptor OBU arrived after the descriptor set was sealed")]
    UnexpectedDescriptor,

    #[error("corrupt temporal unit: {0}")]
    CorruptTemporalUnit(String),

    #[error("codec error: {0}")]
    Codec(String),

    #[error("output buffer holds {provided} bytes but the frame needs {required}")]
    BufferTooSmall { required: usize, provided: usize },

    #[error("descriptor processing is not complete")]
    DescriptorsNotReady,

    #[error("decode() is not allowed after signal_end_of_stream()")]
    DecodeAfterEos,

    #[error("reset() is only available for decoders created from descriptors")]
    ResetUnavailable,

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether the decoder remains usable after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::BufferTooSmall { .. }
                | Error::DescriptorsNotReady
                | Error::DecodeAfterEos
                | Error::ResetUnavailable
        )
    }
}

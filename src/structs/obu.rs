//! OBU framing.
//!
//! Every entity in an IAMF bitstream is an Open Bitstream Unit: a one-byte
//! header (5-bit type plus three flags), a ULEB128 payload size, optional
//! trimming and extension fields, then the payload. [`ObuHeader::peek`]
//! identifies type and total size without moving the cursor so callers can
//! check that a whole OBU is buffered before committing to read it.

use crate::utils::bits::StreamBuffer;
use crate::utils::errors::ObuError;

/// An entire OBU, header included, may not exceed two megabytes.
const MAX_OBU_BYTES: u64 = 2 * 1024 * 1024;

/// The 5-bit OBU type space.
///
/// Audio frames for substream ids 0..=17 get dedicated compact types; larger
/// substream ids use [`ObuType::AudioFrame`] with an explicit id in the
/// payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObuType {
    CodecConfig,
    AudioElement,
    MixPresentation,
    ParameterBlock,
    TemporalDelimiter,
    AudioFrame,
    /// Types 6..=23, carrying the substream id in the type itself.
    AudioFrameId(u8),
    Reserved(u8),
    SequenceHeader,
}

impl ObuType {
    pub fn from_raw(raw: u8) -> Self {
        match raw {
            0 => ObuType::CodecConfig,
            1 => ObuType::AudioElement,
            2 => ObuType::MixPresentation,
            3 => ObuType::ParameterBlock,
            4 => ObuType::TemporalDelimiter,
            5 => ObuType::AudioFrame,
            6..=23 => ObuType::AudioFrameId(raw - 6),
            31 => ObuType::SequenceHeader,
            other => ObuType::Reserved(other),
        }
    }

    pub fn raw(self) -> u8 {
        match self {
            ObuType::CodecConfig => 0,
            ObuType::AudioElement => 1,
            ObuType::MixPresentation => 2,
            ObuType::ParameterBlock => 3,
            ObuType::TemporalDelimiter => 4,
            ObuType::AudioFrame => 5,
            ObuType::AudioFrameId(id) => 6 + id,
            ObuType::Reserved(raw) => raw,
            ObuType::SequenceHeader => 31,
        }
    }

    pub fn is_descriptor(self) -> bool {
        matches!(
            self,
            ObuType::SequenceHeader
                | ObuType::CodecConfig
                | ObuType::AudioElement
                | ObuType::MixPresentation
        )
    }

    pub fn is_temporal(self) -> bool {
        matches!(
            self,
            ObuType::ParameterBlock
                | ObuType::TemporalDelimiter
                | ObuType::AudioFrame
                | ObuType::AudioFrameId(_)
        )
    }

    pub fn is_audio_frame(self) -> bool {
        matches!(self, ObuType::AudioFrame | ObuType::AudioFrameId(_))
    }
}

/// Result of [`ObuHeader::peek`]: just enough to decide whether the whole
/// OBU is buffered and whether the caller wants it.
#[derive(Debug, Clone, Copy)]
pub struct ObuPeek {
    pub obu_type: ObuType,
    /// Total OBU size in bytes, the type byte and size field included.
    pub total_size: u64,
}

#[derive(Debug, Clone)]
pub struct ObuHeader {
    pub obu_type: ObuType,
    pub redundant_copy: bool,
    pub num_samples_to_trim_at_end: u32,
    pub num_samples_to_trim_at_start: u32,
    pub extension_bytes: Vec<u8>,
    /// Payload bytes remaining after all header fields.
    pub payload_size: u64,
}

impl ObuHeader {
    /// Reads the type byte and size field, restoring the cursor afterwards.
    ///
    /// Fails with [`ObuError::Insufficient`] when even those first few bytes
    /// are not buffered yet.
    pub fn peek(buf: &mut StreamBuffer) -> Result<ObuPeek, ObuError> {
        let start = buf.tell();
        let result = Self::peek_inner(buf);
        buf.seek(start)?;
        result
    }

    fn peek_inner(buf: &mut StreamBuffer) -> Result<ObuPeek, ObuError> {
        let type_byte = buf.read_u8()?;
        let (obu_size, size_len) = buf.read_uleb128()?;
        Ok(ObuPeek {
            obu_type: ObuType::from_raw(type_byte >> 3),
            total_size: 1 + size_len as u64 + u64::from(obu_size),
        })
    }

    /// Reads and validates a complete OBU header.
    ///
    /// The caller is expected to have confirmed via [`ObuHeader::peek`] that
    /// the entire OBU is buffered, so failures past that point are malformed
    /// data rather than insufficiency.
    pub fn read(buf: &mut StreamBuffer) -> Result<Self, ObuError> {
        let type_byte = buf.read_u8()?;
        let obu_type = ObuType::from_raw(type_byte >> 3);
        let redundant_copy = type_byte & 0b100 != 0;
        let trimming_status_flag = type_byte & 0b010 != 0;
        let extension_flag = type_byte & 0b001 != 0;

        let (obu_size, size_len) = buf.read_uleb128()?;
        if 1 + size_len as u64 + u64::from(obu_size) > MAX_OBU_BYTES {
            return Err(ObuError::Malformed(format!(
                "obu_size {obu_size} exceeds the two-megabyte OBU limit"
            )));
        }

        let mut header_after_size = 0u64;
        let mut num_samples_to_trim_at_end = 0;
        let mut num_samples_to_trim_at_start = 0;
        if trimming_status_flag {
            if !obu_type.is_audio_frame() {
                return Err(ObuError::Malformed(format!(
                    "trimming flag set on obu_type {}",
                    obu_type.raw()
                )));
            }
            let (end, end_len) = buf.read_uleb128()?;
            let (start, start_len) = buf.read_uleb128()?;
            num_samples_to_trim_at_end = end;
            num_samples_to_trim_at_start = start;
            header_after_size += (end_len + start_len) as u64;
        }

        let mut extension_bytes = Vec::new();
        if extension_flag {
            let (ext_size, ext_len) = buf.read_uleb128()?;
            extension_bytes = buf.read_vec(ext_size as usize)?;
            header_after_size += ext_len as u64 + u64::from(ext_size);
        }

        if redundant_copy && !obu_type.is_descriptor() && !matches!(obu_type, ObuType::Reserved(_))
        {
            return Err(ObuError::Malformed(format!(
                "redundant copy flag set on obu_type {}",
                obu_type.raw()
            )));
        }

        let payload_size = u64::from(obu_size)
            .checked_sub(header_after_size)
            .ok_or_else(|| {
                ObuError::Malformed(format!(
                    "obu_size {obu_size} is smaller than its own header fields"
                ))
            })?;

        Ok(Self {
            obu_type,
            redundant_copy,
            num_samples_to_trim_at_end,
            num_samples_to_trim_at_start,
            extension_bytes,
            payload_size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peek_reports_type_and_size_without_consuming() -> anyhow::Result<()> {
        // Temporal delimiter: type 4, no flags, zero payload.
        let mut buf = StreamBuffer::from_bytes(&[4 << 3, 0x00]);
        let peek = ObuHeader::peek(&mut buf)?;
        assert_eq!(peek.obu_type, ObuType::TemporalDelimiter);
        assert_eq!(peek.total_size, 2);
        assert_eq!(buf.tell(), 0);
        Ok(())
    }

    #[test]
    fn peek_on_a_few_stray_bytes_is_insufficient() {
        let mut buf = StreamBuffer::from_bytes(&[0x01]);
        assert!(matches!(
            ObuHeader::peek(&mut buf),
            Err(ObuError::Insufficient)
        ));
        assert_eq!(buf.tell(), 0);
    }

    #[test]
    fn header_with_trimming_fields() -> anyhow::Result<()> {
        // Audio frame id 2 (type 8), trimming flag set, obu_size 5:
        // trim_end=3 (1 byte), trim_start=1 (1 byte), 3 payload bytes.
        let mut buf = StreamBuffer::from_bytes(&[(8 << 3) | 0b010, 5, 3, 1, 0xAA, 0xBB, 0xCC]);
        let header = ObuHeader::read(&mut buf)?;
        assert_eq!(header.obu_type, ObuType::AudioFrameId(2));
        assert_eq!(header.num_samples_to_trim_at_end, 3);
        assert_eq!(header.num_samples_to_trim_at_start, 1);
        assert_eq!(header.payload_size, 3);
        Ok(())
    }

    #[test]
    fn trimming_on_non_audio_frame_is_malformed() {
        let mut buf = StreamBuffer::from_bytes(&[(0 << 3) | 0b010, 2, 0, 0]);
        assert!(matches!(
            ObuHeader::read(&mut buf),
            Err(ObuError::Malformed(_))
        ));
    }

    #[test]
    fn extension_header_is_skipped_but_counted() -> anyhow::Result<()> {
        // Codec config with extension flag: ext_size=2 + 2 bytes, 1 payload byte.
        let mut buf = StreamBuffer::from_bytes(&[(0 << 3) | 0b001, 4, 2, 0xDE, 0xAD, 0x42]);
        let header = ObuHeader::read(&mut buf)?;
        assert_eq!(header.extension_bytes, vec![0xDE, 0xAD]);
        assert_eq!(header.payload_size, 1);
        Ok(())
    }

    #[test]
    fn audio_frame_type_range_maps_to_substream_ids() {
        assert_eq!(ObuType::from_raw(6), ObuType::AudioFrameId(0));
        assert_eq!(ObuType::from_raw(23), ObuType::AudioFrameId(17));
        assert_eq!(ObuType::from_raw(31), ObuType::SequenceHeader);
        assert!(!ObuType::from_raw(24).is_temporal());
        assert!(ObuType::from_raw(2).is_descriptor());
    }
}

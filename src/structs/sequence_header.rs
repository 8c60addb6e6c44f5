//! IA sequence header OBU.

use crate::utils::bits::StreamBuffer;
use crate::utils::errors::ObuError;

/// "iamf", the 32-bit code opening every IA sequence.
pub const IA_CODE: u32 = 0x6961_6D66;

/// IAMF profile declared by the sequence header.
///
/// Reserved values are carried so redundant headers round-trip, but they
/// never cross the public decoder boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ProfileVersion {
    Simple,
    Base,
    BaseEnhanced,
    Reserved(u8),
}

impl ProfileVersion {
    pub fn from_raw(raw: u8) -> Self {
        match raw {
            0 => ProfileVersion::Simple,
            1 => ProfileVersion::Base,
            2 => ProfileVersion::BaseEnhanced,
            other => ProfileVersion::Reserved(other),
        }
    }

    pub fn is_supported(self) -> bool {
        !matches!(self, ProfileVersion::Reserved(_))
    }
}

#[derive(Debug, Clone)]
pub struct IaSequenceHeader {
    pub primary_profile: ProfileVersion,
    pub additional_profile: ProfileVersion,
}

impl IaSequenceHeader {
    pub fn read(buf: &mut StreamBuffer) -> Result<Self, ObuError> {
        let ia_code = buf.read_u32()?;
        if ia_code != IA_CODE {
            return Err(ObuError::Malformed(format!(
                "ia_code {ia_code:#010x} is not \"iamf\""
            )));
        }
        let primary_profile = ProfileVersion::from_raw(buf.read_u8()?);
        if !primary_profile.is_supported() {
            return Err(ObuError::Malformed(format!(
                "unsupported primary_profile {primary_profile:?}"
            )));
        }
        // The additional profile may be a future value; it only matters for
        // mix selection, which skips what it does not understand.
        let additional_profile = ProfileVersion::from_raw(buf.read_u8()?);
        Ok(Self {
            primary_profile,
            additional_profile,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_profiles() -> anyhow::Result<()> {
        let mut buf = StreamBuffer::from_bytes(&[0x69, 0x61, 0x6D, 0x66, 0, 2]);
        let header = IaSequenceHeader::read(&mut buf)?;
        assert_eq!(header.primary_profile, ProfileVersion::Simple);
        assert_eq!(header.additional_profile, ProfileVersion::BaseEnhanced);
        Ok(())
    }

    #[test]
    fn rejects_wrong_magic() {
        let mut buf = StreamBuffer::from_bytes(&[b'w', b'a', b'v', b'e', 0, 0]);
        assert!(matches!(
            IaSequenceHeader::read(&mut buf),
            Err(ObuError::Malformed(_))
        ));
    }
}

/*!
CRC support for the Bundle Integrity Block (BIB). Three payload-CRC types are
defined by the wire format: none, CRC-16, and CRC-32. The CRC is always
computed over the payload bytes alone, never over any header bytes — patching
a header field after the fact must never require recomputing a CRC.
*/

const CRC16_CCITT_FALSE: ::crc::Crc<u16> = ::crc::Crc::<u16>::new(&::crc::CRC_16_IBM_3740);
const CRC32_IEEE: ::crc::Crc<u32> = ::crc::Crc::<u32>::new(&::crc::CRC_32_ISO_HDLC);

/// The payload-CRC type carried in a Bundle Integrity Block.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum CrcType {
    #[default]
    None,
    Crc16,
    Crc32,
}

impl CrcType {
    /// Width in bytes of the CRC value field for this type (0 for `None`).
    pub const fn width(self) -> usize {
        match self {
            CrcType::None => 0,
            CrcType::Crc16 => 2,
            CrcType::Crc32 => 4,
        }
    }

    pub fn compute(self, payload: &[u8]) -> u64 {
        match self {
            CrcType::None => 0,
            CrcType::Crc16 => CRC16_CCITT_FALSE.checksum(payload) as u64,
            CrcType::Crc32 => CRC32_IEEE.checksum(payload) as u64,
        }
    }

    pub fn verify(self, payload: &[u8], value: u64) -> bool {
        self == CrcType::None || self.compute(payload) == value
    }
}

impl TryFrom<u8> for CrcType {
    type Error = crate::error::Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(CrcType::None),
            1 => Ok(CrcType::Crc16),
            2 => Ok(CrcType::Crc32),
            _ => Err(crate::error::Error::InvalidCrcType(value)),
        }
    }
}

impl From<CrcType> for u8 {
    fn from(value: CrcType) -> Self {
        match value {
            CrcType::None => 0,
            CrcType::Crc16 => 1,
            CrcType::Crc32 => 2,
        }
    }
}

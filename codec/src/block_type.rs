/*!
Extension block type codes. RFC 5050 reserves 1 for the Payload Block; the
CTEB and BIB codes below follow the values used by deployed custody-transfer
implementations of this protocol family.
*/

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockType {
    Payload,
    CustodyTransferExtension,
    BundleIntegrity,
    Unknown(u8),
}

impl From<u8> for BlockType {
    fn from(value: u8) -> Self {
        match value {
            1 => BlockType::Payload,
            10 => BlockType::CustodyTransferExtension,
            13 => BlockType::BundleIntegrity,
            v => BlockType::Unknown(v),
        }
    }
}

impl From<BlockType> for u8 {
    fn from(value: BlockType) -> Self {
        match value {
            BlockType::Payload => 1,
            BlockType::CustodyTransferExtension => 10,
            BlockType::BundleIntegrity => 13,
            BlockType::Unknown(v) => v,
        }
    }
}

/*!
The Custody Transfer Extension Block: the current custodian's EID and the
custody ID (CID) it assigned this bundle. `custody_id` is the one field in
this block that gets patched after the block is first laid out — [`load`]
assigns it only once the bundle is actually dequeued for transmission.
*/

use crate::{block_flags::BlockFlags, block_type::BlockType, eid::Eid, error::Error, sdnv};

const GENEROUS_CID_WIDTH: usize = 5;
const GENEROUS_EID_WIDTH: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cteb {
    pub flags: BlockFlags,
    pub custody_id: u64,
    pub custodian: Eid,
}

#[derive(Debug, Clone, Copy)]
pub struct CtebTemplate {
    flags: sdnv::Field,
    block_length: sdnv::Field,
    custody_id: sdnv::Field,
    custodian_node: sdnv::Field,
    custodian_service: sdnv::Field,
    pub header_len: usize,
}

impl CtebTemplate {
    pub fn initialize(block: &Cteb) -> Result<(Vec<u8>, Self), Error> {
        let mut offset = 1usize; // block type byte
        let flags_bits: u64 = block.flags.into();
        let flags = sdnv::Field::new(offset, sdnv::minimal_width(flags_bits).max(1));
        offset += flags.width;
        let block_length = sdnv::Field::new(offset, 3);
        offset += block_length.width;
        let body_start = offset;

        let custody_id = sdnv::Field::new(offset, GENEROUS_CID_WIDTH);
        offset += custody_id.width;
        let custodian_node = sdnv::Field::new(offset, GENEROUS_EID_WIDTH);
        offset += custodian_node.width;
        let custodian_service = sdnv::Field::new(offset, GENEROUS_EID_WIDTH);
        offset += custodian_service.width;

        let header_len = offset;
        let mut buf = vec![0u8; header_len];
        buf[0] = u8::from(BlockType::CustodyTransferExtension);

        let mut flags = flags;
        flags.value = flags_bits;
        flags.write(&mut buf)?;

        let mut custody_id = custody_id;
        custody_id.value = block.custody_id;
        custody_id.write(&mut buf)?;

        let mut custodian_node = custodian_node;
        custodian_node.value = block.custodian.node;
        custodian_node.write(&mut buf)?;

        let mut custodian_service = custodian_service;
        custodian_service.value = block.custodian.service;
        custodian_service.write(&mut buf)?;

        let mut block_length = block_length;
        block_length.value = (header_len - body_start) as u64;
        block_length.write(&mut buf)?;

        Ok((
            buf,
            Self {
                flags,
                block_length,
                custody_id,
                custodian_node,
                custodian_service,
                header_len,
            },
        ))
    }

    /// Patches the custody ID in place, leaving the rest of the block untouched.
    pub fn patch_custody_id(&mut self, buf: &mut [u8], custody_id: u64) -> Result<(), Error> {
        self.custody_id.value = custody_id;
        self.custody_id.write(buf)
    }

    pub fn custody_id_offset(&self) -> usize {
        self.custody_id.offset
    }
}

pub fn read(buf: &[u8]) -> Result<(Cteb, usize), Error> {
    if buf.is_empty() {
        return Err(Error::Truncated("cteb type"));
    }
    let mut offset = 1usize;
    let (flags_raw, n) = sdnv::decode(&buf[offset..])?;
    offset += n;
    let (block_length, n) = sdnv::decode(&buf[offset..])?;
    offset += n;
    let body_start = offset;

    let (custody_id, n) = sdnv::decode(&buf[offset..])?;
    offset += n;
    let (custodian_node, n) = sdnv::decode(&buf[offset..])?;
    offset += n;
    let (custodian_service, n) = sdnv::decode(&buf[offset..])?;
    offset += n;

    let consumed_body = (offset - body_start) as u64;
    if consumed_body != block_length {
        return Err(Error::LengthMismatch {
            declared: block_length,
            consumed: consumed_body,
        });
    }

    Ok((
        Cteb {
            flags: BlockFlags::from(flags_raw),
            custody_id,
            custodian: Eid::new(custodian_node, custodian_service),
        },
        offset,
    ))
}

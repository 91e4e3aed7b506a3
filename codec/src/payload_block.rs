/*!
The Payload Block. Unlike the other blocks, its contents (the application
payload) are arbitrarily large and are never copied through this module —
callers stream them directly into the transmit buffer or store record
following a small, fixed 4-byte prelude: one type byte, a 1-byte flags SDNV,
and a 2-byte length-SDNV placeholder. [`PayloadPrelude::update`] patches the
length once the payload size is known, exactly like the other blocks' `update`.
*/

use crate::{block_flags::BlockFlags, block_type::BlockType, error::Error, sdnv};

/// Total size, in bytes, of the fixed prelude (excludes the payload itself).
pub const PRELUDE_LEN: usize = 4;

#[derive(Debug, Clone, Copy)]
pub struct PayloadPrelude {
    flags: sdnv::Field,
    length: sdnv::Field,
}

impl PayloadPrelude {
    /// Writes the 4-byte prelude for a payload block with the given flags
    /// and (initially unknown, zero) length into `buf[..4]`.
    pub fn initialize(flags: BlockFlags) -> Result<([u8; PRELUDE_LEN], Self), Error> {
        let flags_field = sdnv::Field::new(1, 1);
        let length_field = sdnv::Field::new(2, 2);

        let mut buf = [0u8; PRELUDE_LEN];
        buf[0] = u8::from(BlockType::Payload);

        let mut flags_field = flags_field;
        flags_field.value = flags.into();
        flags_field.write(&mut buf)?;

        Ok((
            buf,
            Self {
                flags: flags_field,
                length: length_field,
            },
        ))
    }

    /// Patches the payload length into the prelude in place.
    pub fn update(&mut self, buf: &mut [u8], payload_len: u64) -> Result<(), Error> {
        self.length.value = payload_len;
        self.length.write(buf)
    }

    pub fn flags(&self, buf: &[u8]) -> Result<BlockFlags, Error> {
        let (bits, _) = sdnv::decode(&buf[self.flags.offset..])?;
        Ok(BlockFlags::from(bits))
    }
}

/// Parses a payload block prelude at the front of `buf`. Returns the
/// decoded flags, the declared payload length, and the offset at which the
/// payload bytes themselves begin.
pub fn read_prelude(buf: &[u8]) -> Result<(BlockFlags, u64, usize), Error> {
    if buf.is_empty() {
        return Err(Error::Truncated("payload block type"));
    }
    let mut offset = 1usize;
    let (flags_raw, n) = sdnv::decode(&buf[offset..])?;
    offset += n;
    let (length, n) = sdnv::decode(&buf[offset..])?;
    offset += n;
    Ok((BlockFlags::from(flags_raw), length, offset))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prelude_is_exactly_four_bytes() {
        let (buf, _prelude) = PayloadPrelude::initialize(BlockFlags::default()).unwrap();
        assert_eq!(buf.len(), PRELUDE_LEN);
    }

    #[test]
    fn round_trips_length_after_update() {
        let mut flags = BlockFlags::default();
        flags.last_block = true;
        let (mut buf, mut prelude) = PayloadPrelude::initialize(flags).unwrap();
        prelude.update(&mut buf, 1234).unwrap();
        let (decoded_flags, length, payload_offset) = read_prelude(&buf).unwrap();
        assert_eq!(length, 1234);
        assert_eq!(payload_offset, PRELUDE_LEN);
        assert!(decoded_flags.last_block);
    }

    #[test]
    fn length_overflows_two_byte_width_cleanly() {
        let (mut buf, mut prelude) = PayloadPrelude::initialize(BlockFlags::default()).unwrap();
        // 2 bytes => 14 bits => max 0x3FFF
        assert!(prelude.update(&mut buf, 0x4000).is_err());
        assert!(prelude.update(&mut buf, 0x3FFF).is_ok());
    }
}

/*!
The Bundle Integrity Block: a single CRC computed over the payload bytes
alone. [`BibTemplate::update`] is the only way the CRC value field is ever
touched after the block is laid out — it recomputes the checksum from the
caller-supplied payload and patches the value in place, never touching the
header bytes that produced it.
*/

use crate::{block_flags::BlockFlags, block_type::BlockType, crc::CrcType, error::Error, sdnv};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bib {
    pub flags: BlockFlags,
    pub crc_type: CrcType,
    pub crc_value: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct BibTemplate {
    flags: sdnv::Field,
    block_length: sdnv::Field,
    crc_type_offset: usize,
    crc_value: sdnv::Field,
    crc_type: CrcType,
    pub header_len: usize,
}

/// Width of the CRC value SDNV needed to hold any value of `crc_type`
/// without ever overflowing when [`BibTemplate::update`] patches it.
fn crc_value_width(crc_type: CrcType) -> usize {
    match crc_type {
        CrcType::None => 0,
        CrcType::Crc16 => 3, // ceil(16 / 7)
        CrcType::Crc32 => 5, // ceil(32 / 7)
    }
}

impl BibTemplate {
    pub fn initialize(block: &Bib) -> Result<(Vec<u8>, Self), Error> {
        let mut offset = 1usize; // block type byte
        let flags_bits: u64 = block.flags.into();
        let flags = sdnv::Field::new(offset, sdnv::minimal_width(flags_bits).max(1));
        offset += flags.width;
        let block_length = sdnv::Field::new(offset, 3);
        offset += block_length.width;
        let body_start = offset;

        let crc_type_offset = offset;
        offset += 1; // crc type is a raw byte, not an SDNV: it is fixed for the channel's lifetime.

        let crc_value = sdnv::Field::new(offset, crc_value_width(block.crc_type));
        offset += crc_value.width;

        let header_len = offset;
        let mut buf = vec![0u8; header_len];
        buf[0] = u8::from(BlockType::BundleIntegrity);

        let mut flags = flags;
        flags.value = flags_bits;
        flags.write(&mut buf)?;

        buf[crc_type_offset] = block.crc_type.into();

        let mut crc_value = crc_value;
        crc_value.value = block.crc_value;
        crc_value.write(&mut buf)?;

        let mut block_length = block_length;
        block_length.value = (header_len - body_start) as u64;
        block_length.write(&mut buf)?;

        Ok((
            buf,
            Self {
                flags,
                block_length,
                crc_type_offset,
                crc_value,
                crc_type: block.crc_type,
                header_len,
            },
        ))
    }

    /// Recomputes the CRC over `payload` and patches the value field in place.
    pub fn update(&mut self, buf: &mut [u8], payload: &[u8]) -> Result<(), Error> {
        self.crc_value.value = self.crc_type.compute(payload);
        self.crc_value.write(buf)
    }

    /// Verifies `payload` against the CRC value currently patched into `buf`.
    pub fn verify(&self, buf: &[u8], payload: &[u8]) -> bool {
        self.crc_type.verify(payload, self.crc_value.value)
    }

    pub fn crc_type(&self) -> CrcType {
        self.crc_type
    }
}

pub fn read(buf: &[u8]) -> Result<(Bib, usize), Error> {
    if buf.is_empty() {
        return Err(Error::Truncated("bib type"));
    }
    let mut offset = 1usize;
    let (flags_raw, n) = sdnv::decode(&buf[offset..])?;
    offset += n;
    let (block_length, n) = sdnv::decode(&buf[offset..])?;
    offset += n;
    let body_start = offset;

    if buf.len() <= offset {
        return Err(Error::Truncated("bib crc type"));
    }
    let crc_type = CrcType::try_from(buf[offset])?;
    offset += 1;

    let (crc_value, n) = sdnv::decode(&buf[offset..])?;
    offset += n;

    let consumed_body = (offset - body_start) as u64;
    if consumed_body != block_length {
        return Err(Error::LengthMismatch {
            declared: block_length,
            consumed: consumed_body,
        });
    }

    Ok((
        Bib {
            flags: BlockFlags::from(flags_raw),
            crc_type,
            crc_value,
        },
        offset,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_and_verifies() {
        let payload = b"hello, custody";
        let mut bib = Bib {
            flags: BlockFlags::default(),
            crc_type: CrcType::Crc16,
            crc_value: 0,
        };
        bib.crc_value = bib.crc_type.compute(payload);
        let (buf, template) = BibTemplate::initialize(&bib).unwrap();
        let (decoded, consumed) = read(&buf).unwrap();
        assert_eq!(consumed, buf.len());
        assert_eq!(decoded, bib);
        assert!(template.verify(&buf, payload));
    }

    #[test]
    fn update_recomputes_crc_over_payload_only() {
        let mut bib = Bib {
            flags: BlockFlags::default(),
            crc_type: CrcType::Crc32,
            crc_value: 0,
        };
        let (mut buf, mut template) = BibTemplate::initialize(&bib).unwrap();
        let header_len_before = buf.len();
        template.update(&mut buf, b"payload one").unwrap();
        assert_eq!(buf.len(), header_len_before);
        assert!(template.verify(&buf, b"payload one"));
        assert!(!template.verify(&buf, b"payload two"));

        // Recomputing for a different payload again patches in place.
        template.update(&mut buf, b"payload two").unwrap();
        assert!(template.verify(&buf, b"payload two"));
        bib.crc_value = template.crc_value.value;
        let _ = bib;
    }

    #[test]
    fn rejects_corrupt_crc_type_byte() {
        let bib = Bib {
            flags: BlockFlags::default(),
            crc_type: CrcType::Crc16,
            crc_value: 0,
        };
        let (mut buf, template) = BibTemplate::initialize(&bib).unwrap();
        buf[template.crc_type_offset] = 0xFF;
        assert!(matches!(read(&buf), Err(Error::InvalidCrcType(0xFF))));
    }
}

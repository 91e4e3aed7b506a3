/*!
The Primary Block, RFC 5050 §4.5, compressed CBHE form (no dictionary: every
endpoint is an `ipn:node.service` pair encoded inline).

Layout, after the one-byte version:

```text
flags | block_length | dest.node | dest.service | source.node | source.service
     | report_to.node | report_to.service | custodian.node | custodian.service
     | creation.seconds | creation.nanos | creation.sequence | lifetime | dict_length
     | [fragment_offset | total_adu_length]   (only if is_fragment)
```

`block_length` covers every byte after itself. Every SDNV field's width is
fixed the first time the block is laid out ([`PrimaryTemplate::initialize`])
and never changes afterwards — later calls only patch values in place via
[`PrimaryTemplate::patch_creation`] / [`patch_fragment`]. This is what lets
`store` bump the creation sequence, and `load` nothing at all for the
primary block, without re-encoding the rest of the header.
*/

use crate::{bundle_flags::BundleFlags, eid::Eid, error::Error, sdnv, time::DtnTime};

/// Minimum width given to EID and time fields so that ordinary value growth
/// (sequence numbers ticking up, a host with a multi-decade uptime) never
/// needs the field re-laid out. See [`crate`] module docs §9 on fixed-width SDNVs.
const GENEROUS_EID_WIDTH: usize = 5;
const GENEROUS_TIME_WIDTH: usize = 5;
const GENEROUS_SEQUENCE_WIDTH: usize = 3;
const GENEROUS_LIFETIME_WIDTH: usize = 4;
const GENEROUS_BLOCK_LEN_WIDTH: usize = 3;

fn width_at_least(value: u64, minimum: usize) -> usize {
    sdnv::minimal_width(value).max(minimum)
}

/// The supported bundle protocol version.
pub const VERSION: u8 = 6;

/// The decoded, owned contents of a Primary Block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrimaryBlock {
    pub version: u8,
    pub flags: BundleFlags,
    pub destination: Eid,
    pub source: Eid,
    pub report_to: Eid,
    pub custodian: Eid,
    pub creation_timestamp: DtnTime,
    pub creation_sequence: u64,
    pub lifetime_secs: u64,
    pub fragment_offset: u64,
    pub total_adu_length: u64,
}

impl Default for PrimaryBlock {
    fn default() -> Self {
        Self {
            version: VERSION,
            flags: BundleFlags::default(),
            destination: Eid::NULL,
            source: Eid::NULL,
            report_to: Eid::NULL,
            custodian: Eid::NULL,
            creation_timestamp: DtnTime::EPOCH,
            creation_sequence: 0,
            lifetime_secs: 0,
            fragment_offset: 0,
            total_adu_length: 0,
        }
    }
}

/// The fixed offset/width layout of a written Primary Block, recorded so
/// later patches never need to shift bytes.
#[derive(Debug, Clone, Copy)]
pub struct PrimaryTemplate {
    flags: sdnv::Field,
    block_length: sdnv::Field,
    dest_node: sdnv::Field,
    dest_service: sdnv::Field,
    source_node: sdnv::Field,
    source_service: sdnv::Field,
    report_to_node: sdnv::Field,
    report_to_service: sdnv::Field,
    custodian_node: sdnv::Field,
    custodian_service: sdnv::Field,
    creation_seconds: sdnv::Field,
    creation_nanos: sdnv::Field,
    creation_sequence: sdnv::Field,
    lifetime: sdnv::Field,
    dict_length: sdnv::Field,
    fragment_offset: sdnv::Field,
    total_adu_length: sdnv::Field,
    /// Total encoded length of the block, including the version byte.
    pub header_len: usize,
}

impl PrimaryTemplate {
    /// Lays out a fresh Primary Block for `block`, returning the encoded
    /// bytes and the template recording every field's fixed offset/width.
    pub fn initialize(block: &PrimaryBlock) -> Result<(Vec<u8>, Self), Error> {
        let is_fragment = block.flags.is_fragment;

        // offset 0 is the version byte; SDNV fields start at 1.
        let mut offset = 1usize;
        let mut field_at = |value: u64, width: usize, offset: &mut usize| {
            let f = sdnv::Field {
                value,
                offset: *offset,
                width,
            };
            *offset += width;
            f
        };

        let flags: u64 = block.flags.into();
        let flags_field = field_at(flags, width_at_least(flags, 3), &mut offset);
        // block_length's own width is generous and fixed up-front; its value
        // is computed only once the rest of the layout is known.
        let block_length_field = field_at(0, GENEROUS_BLOCK_LEN_WIDTH, &mut offset);

        let dest_node = field_at(block.destination.node, GENEROUS_EID_WIDTH, &mut offset);
        let dest_service = field_at(block.destination.service, GENEROUS_EID_WIDTH, &mut offset);
        let source_node = field_at(block.source.node, GENEROUS_EID_WIDTH, &mut offset);
        let source_service = field_at(block.source.service, GENEROUS_EID_WIDTH, &mut offset);
        let report_to_node = field_at(block.report_to.node, GENEROUS_EID_WIDTH, &mut offset);
        let report_to_service = field_at(block.report_to.service, GENEROUS_EID_WIDTH, &mut offset);
        let custodian_node = field_at(block.custodian.node, GENEROUS_EID_WIDTH, &mut offset);
        let custodian_service = field_at(block.custodian.service, GENEROUS_EID_WIDTH, &mut offset);

        let creation_seconds = field_at(
            block.creation_timestamp.seconds,
            GENEROUS_TIME_WIDTH,
            &mut offset,
        );
        let creation_nanos = field_at(
            block.creation_timestamp.nanos as u64,
            GENEROUS_TIME_WIDTH,
            &mut offset,
        );
        let creation_sequence = field_at(
            block.creation_sequence,
            GENEROUS_SEQUENCE_WIDTH,
            &mut offset,
        );
        let lifetime = field_at(block.lifetime_secs, GENEROUS_LIFETIME_WIDTH, &mut offset);
        // Dictionary length is always zero: this codec only speaks the
        // compressed, dictionary-less form.
        let dict_length = field_at(0, 1, &mut offset);

        let (fragment_offset, total_adu_length) = if is_fragment {
            (
                field_at(block.fragment_offset, GENEROUS_TIME_WIDTH, &mut offset),
                field_at(block.total_adu_length, GENEROUS_TIME_WIDTH, &mut offset),
            )
        } else {
            // Zero-width descriptors: absent field, always decodes as zero.
            (
                field_at(0, 0, &mut offset),
                field_at(0, 0, &mut offset),
            )
        };

        let header_len = offset;
        let mut buf = vec![0u8; header_len];
        buf[0] = block.version;

        flags_field.write(&mut buf)?;
        dest_node.write(&mut buf)?;
        dest_service.write(&mut buf)?;
        source_node.write(&mut buf)?;
        source_service.write(&mut buf)?;
        report_to_node.write(&mut buf)?;
        report_to_service.write(&mut buf)?;
        custodian_node.write(&mut buf)?;
        custodian_service.write(&mut buf)?;
        creation_seconds.write(&mut buf)?;
        creation_nanos.write(&mut buf)?;
        creation_sequence.write(&mut buf)?;
        lifetime.write(&mut buf)?;
        dict_length.write(&mut buf)?;
        fragment_offset.write(&mut buf)?;
        total_adu_length.write(&mut buf)?;

        // block_length covers everything after the block_length field itself.
        let mut block_length_field = block_length_field;
        block_length_field.value = (header_len - (block_length_field.offset + block_length_field.width)) as u64;
        block_length_field.write(&mut buf)?;

        Ok((
            buf,
            Self {
                flags: flags_field,
                block_length: block_length_field,
                dest_node,
                dest_service,
                source_node,
                source_service,
                report_to_node,
                report_to_service,
                custodian_node,
                custodian_service,
                creation_seconds,
                creation_nanos,
                creation_sequence,
                lifetime,
                dict_length,
                fragment_offset,
                total_adu_length,
                header_len,
            },
        ))
    }

    /// Patches the creation timestamp (seconds and nanoseconds) and sequence
    /// number in place.
    pub fn patch_creation(&mut self, buf: &mut [u8], time: DtnTime, sequence: u64) -> Result<(), Error> {
        self.creation_seconds.value = time.seconds;
        self.creation_seconds.write(buf)?;
        self.creation_nanos.value = time.nanos as u64;
        self.creation_nanos.write(buf)?;
        self.creation_sequence.value = sequence;
        self.creation_sequence.write(buf)
    }

    /// Patches the fragment offset and total ADU length in place. A no-op
    /// (both fields zero-width) if the block was not initialized as a fragment.
    pub fn patch_fragment(&mut self, buf: &mut [u8], offset: u64, total: u64) -> Result<(), Error> {
        self.fragment_offset.value = offset;
        self.fragment_offset.write(buf)?;
        self.total_adu_length.value = total;
        self.total_adu_length.write(buf)
    }

    pub fn is_fragment(&self) -> bool {
        self.fragment_offset.width > 0
    }
}

/// Parses a Primary Block from the front of `buf`, returning the decoded
/// block and the number of bytes consumed.
pub fn read(buf: &[u8]) -> Result<(PrimaryBlock, usize), Error> {
    if buf.is_empty() {
        return Err(Error::Truncated("primary block version"));
    }
    let version = buf[0];
    if version != VERSION {
        return Err(Error::UnsupportedVersion(version));
    }
    let mut offset = 1usize;

    let (flags_raw, n) = sdnv::decode(&buf[offset..])?;
    offset += n;
    let flags = BundleFlags::from(flags_raw);

    let (block_length, n) = sdnv::decode(&buf[offset..])?;
    offset += n;
    let body_start = offset;

    let (dest_node, n) = sdnv::decode(&buf[offset..])?;
    offset += n;
    let (dest_service, n) = sdnv::decode(&buf[offset..])?;
    offset += n;
    let (source_node, n) = sdnv::decode(&buf[offset..])?;
    offset += n;
    let (source_service, n) = sdnv::decode(&buf[offset..])?;
    offset += n;
    let (report_to_node, n) = sdnv::decode(&buf[offset..])?;
    offset += n;
    let (report_to_service, n) = sdnv::decode(&buf[offset..])?;
    offset += n;
    let (custodian_node, n) = sdnv::decode(&buf[offset..])?;
    offset += n;
    let (custodian_service, n) = sdnv::decode(&buf[offset..])?;
    offset += n;
    let (creation_seconds, n) = sdnv::decode(&buf[offset..])?;
    offset += n;
    let (creation_nanos, n) = sdnv::decode(&buf[offset..])?;
    offset += n;
    let (creation_sequence, n) = sdnv::decode(&buf[offset..])?;
    offset += n;
    let (lifetime_secs, n) = sdnv::decode(&buf[offset..])?;
    offset += n;
    let (dict_length, n) = sdnv::decode(&buf[offset..])?;
    offset += n;
    if dict_length != 0 {
        return Err(Error::DictionaryUnsupported(dict_length));
    }

    let (fragment_offset, total_adu_length) = if flags.is_fragment {
        let (fo, n) = sdnv::decode(&buf[offset..])?;
        offset += n;
        let (total, n) = sdnv::decode(&buf[offset..])?;
        offset += n;
        (fo, total)
    } else {
        (0, 0)
    };

    let consumed_body = (offset - body_start) as u64;
    if consumed_body != block_length {
        return Err(Error::LengthMismatch {
            declared: block_length,
            consumed: consumed_body,
        });
    }

    Ok((
        PrimaryBlock {
            version,
            flags,
            destination: Eid::new(dest_node, dest_service),
            source: Eid::new(source_node, source_service),
            report_to: Eid::new(report_to_node, report_to_service),
            custodian: Eid::new(custodian_node, custodian_service),
            creation_timestamp: DtnTime::new(creation_seconds, creation_nanos as u32),
            creation_sequence,
            lifetime_secs,
            fragment_offset,
            total_adu_length,
        },
        offset,
    ))
}

/// Parses only enough of the Primary Block to recover the destination EID,
/// for routers that want to classify a bundle without fully decoding it.
pub fn route_info(buf: &[u8]) -> Result<Eid, Error> {
    read(buf).map(|(primary, _)| primary.destination)
}

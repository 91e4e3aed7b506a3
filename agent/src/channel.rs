/*!
The channel engine (§4.E): one bidirectional RFC 5050 custody-transfer
endpoint, bound to a local/remote EID pair, an active-custody table, and
three store queues (outbound data, outbound DACS, inbound payload). All of
a channel's state is owned by the `Channel` value itself — including its
own `std::sync::Mutex`-free single-threaded-per-call contract — so an
[`crate::Agent`] can hold many of them in a fixed-size array without any
shared global state.
*/

use crate::custody::CustodyEngine;
use crate::error::{Error, Result};
use crate::options::{Options, WrapPolicy};
use crate::platform::Clock;
use crate::records::{DataRecord, PayloadRecord, DATA_RECORD_LEN, PAYLOAD_RECORD_LEN};
use crate::store::{Store, StoreHandle, StorageId};
use crate::Flags;

use bp6_codec::acs::AcsRecord;
use bp6_codec::bib::{Bib, BibTemplate};
use bp6_codec::block_flags::BlockFlags;
use bp6_codec::block_type::BlockType;
use bp6_codec::bundle_flags::BundleFlags;
use bp6_codec::crc::CrcType;
use bp6_codec::cteb::{Cteb, CtebTemplate};
use bp6_codec::eid::Eid;
use bp6_codec::payload_block::{self, PayloadPrelude};
use bp6_codec::primary_block::{self, PrimaryBlock, PrimaryTemplate};
use bp6_codec::time::DtnTime;

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, trace, warn};

/// Number of distinct remote custodians a channel can track ACS accumulators
/// for concurrently. Not user-configurable: it bounds only how many inbound
/// custody sources may be in flight at once, not any wire-visible property.
const MAX_ACS_SOURCES: usize = 16;

/// Sentinel `DataRecord::cteb_offset` meaning "this bundle carries no CTEB
/// and is never assigned a custody ID" — forwarded bundles and any bundle
/// stored while `request_custody` is false.
const NO_CTEB: u32 = u32::MAX;

fn sdnv_err(e: bp6_codec::sdnv::Error) -> Error {
    bp6_codec::error::Error::from(e).into()
}

/// Selects a per-channel option for [`Channel::setopt`]/[`Channel::getopt`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opt {
    Source,
    Destination,
    ReportTo,
    Custodian,
    UseSystemTime,
    LifetimeSecs,
    RequestCustody,
    AllowFragmentation,
    CrcType,
    TimeoutMs,
    MaxBundleLength,
    MaxFragmentLength,
    AdminOnly,
    WrapResponse,
    AcsRateMs,
}

/// The value half of a [`Channel::setopt`]/[`Channel::getopt`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptValue {
    Eid(Eid),
    Bool(bool),
    U64(u64),
    USize(usize),
    CrcType(CrcType),
    WrapPolicy(WrapPolicy),
}

/// The outbound header a channel keeps pre-built: Primary + (optional) CTEB
/// + BIB + Payload prelude, concatenated into one buffer. Every `store` call
/// clones this buffer and patches only the fields that vary per bundle.
struct HeaderLayout {
    primary: PrimaryTemplate,
    primary_len: usize,
    cteb: Option<(CtebTemplate, usize, usize)>,
    bib: (BibTemplate, usize, usize),
    prelude: (PayloadPrelude, usize),
    buf: Vec<u8>,
}

impl HeaderLayout {
    fn build(options: &Options) -> Result<Self> {
        let primary_block = PrimaryBlock {
            version: primary_block::VERSION,
            flags: BundleFlags {
                // Reserves room for the fragment fields in every bundle this
                // channel emits whenever fragmentation is allowed at all, since
                // the template's field widths are fixed once and never grow.
                // `store`/`emit_bundle` patch offset/total per bundle; an
                // unfragmented bundle just gets offset=0, total=payload.len().
                is_fragment: options.allow_fragmentation,
                do_not_fragment: !options.allow_fragmentation,
                request_custody: options.request_custody,
                destination_singleton: true,
                ..Default::default()
            },
            destination: options.destination,
            source: options.source,
            report_to: options.report_to,
            custodian: options.custodian,
            creation_timestamp: DtnTime::EPOCH,
            creation_sequence: 0,
            lifetime_secs: options.lifetime_secs,
            fragment_offset: 0,
            total_adu_length: 0,
        };
        let (mut buf, primary) = PrimaryTemplate::initialize(&primary_block)?;
        let primary_len = buf.len();

        let mut cteb = None;
        if options.request_custody {
            let cteb_block = Cteb {
                flags: BlockFlags::default(),
                custody_id: 0,
                custodian: options.custodian,
            };
            let (cteb_buf, template) = CtebTemplate::initialize(&cteb_block)?;
            let start = buf.len();
            let len = cteb_buf.len();
            buf.extend_from_slice(&cteb_buf);
            cteb = Some((template, start, len));
        }

        let bib_block = Bib {
            flags: BlockFlags::default(),
            crc_type: options.crc_type,
            crc_value: 0,
        };
        let (bib_buf, bib_template) = BibTemplate::initialize(&bib_block)?;
        let bib_start = buf.len();
        let bib_len = bib_buf.len();
        buf.extend_from_slice(&bib_buf);

        let mut payload_flags = BlockFlags::default();
        payload_flags.last_block = true;
        let (prelude_buf, prelude) = PayloadPrelude::initialize(payload_flags)?;
        let prelude_start = buf.len();
        buf.extend_from_slice(&prelude_buf);

        Ok(Self {
            primary,
            primary_len,
            cteb,
            bib: (bib_template, bib_start, bib_len),
            prelude: (prelude, prelude_start),
            buf,
        })
    }
}

/// One open custody-transfer endpoint. See the module docs for ownership and
/// concurrency notes.
pub struct Channel {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    options: Options,
    header: HeaderLayout,

    data_queue: StoreHandle,
    payload_queue: StoreHandle,
    dacs_queue: StoreHandle,

    active_table: Vec<StorageId>,
    current_custody_id: u64,
    oldest_custody_id: u64,

    custody_engine: CustodyEngine,
    creation_sequence: u64,
    opened_at: std::time::Instant,
}

impl Channel {
    /// Opens a new channel. Callers needing `CHANNELS_FULL` semantics across
    /// a bounded set of channels do so at the [`crate::Agent`] layer, which
    /// owns a fixed-size array of these.
    pub fn open(
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
        local: Eid,
        remote: Eid,
        mut options: Options,
    ) -> Result<Self> {
        options.source = local;
        options.custodian = local;
        options.report_to = local;
        options.destination = remote;

        let header = HeaderLayout::build(&options)?;
        let data_queue = store.create()?;
        let payload_queue = store.create()?;
        let dacs_queue = store.create()?;
        let active_table = vec![StorageId::VACANT; options.active_table_size.max(1)];
        let opened_at = clock.monotonic_now();

        Ok(Self {
            store,
            clock,
            header,
            active_table,
            data_queue,
            payload_queue,
            dacs_queue,
            current_custody_id: 0,
            oldest_custody_id: 0,
            custody_engine: CustodyEngine::new(MAX_ACS_SOURCES),
            creation_sequence: 0,
            opened_at,
            options,
        })
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn setopt(&mut self, opt: Opt, value: OptValue) -> Result<()> {
        let rebuild = matches!(
            opt,
            Opt::Source
                | Opt::Destination
                | Opt::ReportTo
                | Opt::Custodian
                | Opt::RequestCustody
                | Opt::AllowFragmentation
                | Opt::CrcType
                | Opt::LifetimeSecs
        );
        match (opt, value) {
            (Opt::Source, OptValue::Eid(e)) => self.options.source = e,
            (Opt::Destination, OptValue::Eid(e)) => self.options.destination = e,
            (Opt::ReportTo, OptValue::Eid(e)) => self.options.report_to = e,
            (Opt::Custodian, OptValue::Eid(e)) => self.options.custodian = e,
            (Opt::UseSystemTime, OptValue::Bool(b)) => self.options.use_system_time = b,
            (Opt::LifetimeSecs, OptValue::U64(v)) => self.options.lifetime_secs = v,
            (Opt::RequestCustody, OptValue::Bool(b)) => self.options.request_custody = b,
            (Opt::AllowFragmentation, OptValue::Bool(b)) => self.options.allow_fragmentation = b,
            (Opt::CrcType, OptValue::CrcType(c)) => self.options.crc_type = c,
            (Opt::TimeoutMs, OptValue::U64(v)) => self.options.timeout_ms = v,
            (Opt::MaxBundleLength, OptValue::USize(v)) => self.options.max_bundle_length = v,
            (Opt::MaxFragmentLength, OptValue::USize(v)) => self.options.max_fragment_length = v,
            (Opt::AdminOnly, OptValue::Bool(b)) => self.options.admin_only = b,
            (Opt::WrapResponse, OptValue::WrapPolicy(w)) => self.options.wrap_response = w,
            (Opt::AcsRateMs, OptValue::U64(v)) => self.options.acs_rate_ms = v,
            _ => return Err(Error::ParmErr("option/value type mismatch")),
        }
        if rebuild {
            self.header = HeaderLayout::build(&self.options)?;
            debug!(?opt, "channel option changed, header rebuilt");
        }
        Ok(())
    }

    pub fn getopt(&self, opt: Opt) -> OptValue {
        match opt {
            Opt::Source => OptValue::Eid(self.options.source),
            Opt::Destination => OptValue::Eid(self.options.destination),
            Opt::ReportTo => OptValue::Eid(self.options.report_to),
            Opt::Custodian => OptValue::Eid(self.options.custodian),
            Opt::UseSystemTime => OptValue::Bool(self.options.use_system_time),
            Opt::LifetimeSecs => OptValue::U64(self.options.lifetime_secs),
            Opt::RequestCustody => OptValue::Bool(self.options.request_custody),
            Opt::AllowFragmentation => OptValue::Bool(self.options.allow_fragmentation),
            Opt::CrcType => OptValue::CrcType(self.options.crc_type),
            Opt::TimeoutMs => OptValue::U64(self.options.timeout_ms),
            Opt::MaxBundleLength => OptValue::USize(self.options.max_bundle_length),
            Opt::MaxFragmentLength => OptValue::USize(self.options.max_fragment_length),
            Opt::AdminOnly => OptValue::Bool(self.options.admin_only),
            Opt::WrapResponse => OptValue::WrapPolicy(self.options.wrap_response),
            Opt::AcsRateMs => OptValue::U64(self.options.acs_rate_ms),
        }
    }

    /// Queues `payload` for transmission, splitting it into fragments first
    /// if it exceeds `max_fragment_length` and fragmentation is allowed.
    pub fn store(&mut self, payload: &[u8], timeout_ms: u64) -> Result<()> {
        if self.options.allow_fragmentation && payload.len() > self.options.max_fragment_length {
            let total = payload.len() as u64;
            let mut off = 0usize;
            let mut count = 0u32;
            while off < payload.len() {
                let len = self.options.max_fragment_length.min(payload.len() - off);
                self.emit_bundle(&payload[off..off + len], off as u64, total, timeout_ms)?;
                off += len;
                count += 1;
            }
            debug!(total, fragments = count, "split payload into fragments");
            Ok(())
        } else {
            if payload.len() > self.options.max_bundle_length {
                warn!(len = payload.len(), max = self.options.max_bundle_length, "payload exceeds max_bundle_length");
                return Err(Error::BundleTooLarge);
            }
            let total = payload.len() as u64;
            self.emit_bundle(payload, 0, total, timeout_ms)
        }
    }

    fn emit_bundle(&mut self, payload: &[u8], frag_offset: u64, total_adu: u64, timeout_ms: u64) -> Result<()> {
        let mut header = self.header.buf.clone();
        let seq = self.creation_sequence;
        self.creation_sequence += 1;
        let creation_time = if self.options.use_system_time {
            self.clock.dtn_now()
        } else {
            DtnTime::EPOCH
        };

        self.header
            .primary
            .patch_creation(&mut header[..self.header.primary_len], creation_time, seq)?;
        if self.header.primary.is_fragment() {
            self.header
                .primary
                .patch_fragment(&mut header[..self.header.primary_len], frag_offset, total_adu)?;
        }

        let (_, bib_start, bib_len) = self.header.bib;
        self.header.bib.0.update(&mut header[bib_start..bib_start + bib_len], payload)?;

        let (_, prelude_start) = self.header.prelude;
        self.header.prelude.0.update(&mut header[prelude_start..], payload.len() as u64)?;

        let cteb_offset = self.header.cteb.as_ref().map(|c| c.1 as u32).unwrap_or(NO_CTEB);

        let record = DataRecord {
            retx_due_millis: 0,
            cteb_offset,
            bib_offset: bib_start as u32,
            payload_prelude_offset: prelude_start as u32,
            header_len: header.len() as u32,
        };

        let mut blob = Vec::with_capacity(DATA_RECORD_LEN + header.len() + payload.len());
        blob.extend_from_slice(&record.encode());
        blob.extend_from_slice(&header);
        blob.extend_from_slice(payload);

        self.store.enqueue(self.data_queue, &blob, &[], timeout_ms)
    }

    fn write_out(&self, out: &mut [u8], bytes: &[u8]) -> Result<usize> {
        if bytes.len() > out.len() {
            return Err(Error::BundleTooLarge);
        }
        out[..bytes.len()].copy_from_slice(bytes);
        Ok(bytes.len())
    }

    /// Produces the next bundle to transmit, in DACS-then-retransmit-then-fresh
    /// priority order. Returns `0` if nothing is ready within `timeout_ms`.
    pub fn load(&mut self, out: &mut [u8], timeout_ms: u64, flags: &mut Flags) -> Result<usize> {
        if let Some((bytes, id)) = self.store.dequeue(self.dacs_queue, timeout_ms)? {
            flags.set(Flags::ROUTE_NEEDED);
            let n = self.write_out(out, &bytes)?;
            self.store.relinquish(id);
            return Ok(n);
        }

        let table_len = self.active_table.len() as u64;
        let now_mono = self.clock.monotonic_now();
        while self.oldest_custody_id < self.current_custody_id {
            let idx = (self.oldest_custody_id % table_len) as usize;
            let sid = self.active_table[idx];
            if sid.is_vacant() {
                self.oldest_custody_id += 1;
                continue;
            }
            let stored = self.store.retrieve(sid, timeout_ms)?;
            let record = DataRecord::decode(&stored).ok_or_else(|| Error::FailedStore("corrupt data record".into()))?;
            let due = self.opened_at + Duration::from_millis(record.retx_due_millis);
            if due > now_mono {
                break;
            }
            let mut record = record;
            record.retx_due_millis = (now_mono - self.opened_at + Duration::from_millis(self.options.timeout_ms)).as_millis() as u64;
            self.store.refresh(sid, 0, &record.encode(), timeout_ms)?;
            return self.write_out(out, &stored[DATA_RECORD_LEN..]);
        }

        let Some((bytes, sid)) = self.store.dequeue(self.data_queue, timeout_ms)? else {
            return Ok(0);
        };
        let record = DataRecord::decode(&bytes).ok_or_else(|| Error::FailedStore("corrupt data record".into()))?;

        if !self.options.request_custody || record.cteb_offset == NO_CTEB {
            let n = self.write_out(out, &bytes[DATA_RECORD_LEN..])?;
            self.store.relinquish(sid);
            return Ok(n);
        }

        let idx = (self.current_custody_id % table_len) as usize;
        loop {
            if self.active_table[idx].is_vacant() {
                break;
            }
            warn!(idx, policy = ?self.options.wrap_response, "active custody table slot collision");
            match self.options.wrap_response {
                WrapPolicy::Resend => {
                    let occupant = self.active_table[idx];
                    let occupant_bytes = self.store.retrieve(occupant, timeout_ms)?;
                    self.store.enqueue(self.data_queue, &bytes, &[], timeout_ms)?;
                    return self.write_out(out, &occupant_bytes[DATA_RECORD_LEN..]);
                }
                WrapPolicy::Block => {
                    self.store.enqueue(self.data_queue, &bytes, &[], timeout_ms)?;
                    return Err(Error::Overflow);
                }
                WrapPolicy::Drop => {
                    let occupant = self.active_table[idx];
                    self.store.relinquish(occupant);
                    self.active_table[idx] = StorageId::VACANT;
                    self.oldest_custody_id = self
                        .oldest_custody_id
                        .max(self.current_custody_id.saturating_sub(table_len) + 1);
                }
            }
        }

        let cteb_abs_offset = DATA_RECORD_LEN + record.cteb_offset as usize;
        let (existing_cteb, consumed) = bp6_codec::cteb::read(&bytes[cteb_abs_offset..])?;
        let (mut cteb_buf, mut cteb_template) = CtebTemplate::initialize(&existing_cteb)?;
        debug_assert_eq!(cteb_buf.len(), consumed);
        cteb_template.patch_custody_id(&mut cteb_buf, self.current_custody_id)?;
        self.store.refresh(sid, cteb_abs_offset, &cteb_buf, timeout_ms)?;

        let now_mono = self.clock.monotonic_now();
        let mut new_record = record;
        new_record.retx_due_millis = (now_mono - self.opened_at + Duration::from_millis(self.options.timeout_ms)).as_millis() as u64;
        self.store.refresh(sid, 0, &new_record.encode(), timeout_ms)?;

        self.active_table[idx] = sid;
        self.current_custody_id += 1;

        let mut body = bytes[DATA_RECORD_LEN..].to_vec();
        body[record.cteb_offset as usize..record.cteb_offset as usize + cteb_buf.len()].copy_from_slice(&cteb_buf);
        self.write_out(out, &body)
    }

    fn enqueue_dacs(&mut self, ready: crate::custody::ReadyAcs, timeout_ms: u64) -> Result<()> {
        let creation_time = self.clock.dtn_now();
        let seq = self.creation_sequence;
        self.creation_sequence += 1;
        let payload = ready.record.encode();

        let primary_block = PrimaryBlock {
            version: primary_block::VERSION,
            flags: BundleFlags {
                is_admin_record: true,
                destination_singleton: true,
                do_not_fragment: true,
                ..Default::default()
            },
            destination: ready.custodian,
            source: self.options.source,
            report_to: self.options.source,
            custodian: self.options.source,
            creation_timestamp: creation_time,
            creation_sequence: seq,
            lifetime_secs: self.options.lifetime_secs,
            fragment_offset: 0,
            total_adu_length: 0,
        };
        let (mut buf, _) = PrimaryTemplate::initialize(&primary_block)?;

        let bib_block = Bib {
            flags: BlockFlags::default(),
            crc_type: self.options.crc_type,
            crc_value: self.options.crc_type.compute(&payload),
        };
        let (bib_buf, _) = BibTemplate::initialize(&bib_block)?;
        buf.extend_from_slice(&bib_buf);

        let mut prelude_flags = BlockFlags::default();
        prelude_flags.last_block = true;
        let (mut prelude_buf, mut prelude) = PayloadPrelude::initialize(prelude_flags)?;
        prelude.update(&mut prelude_buf, payload.len() as u64)?;
        buf.extend_from_slice(&prelude_buf);
        buf.extend_from_slice(&payload);

        self.store.enqueue(self.dacs_queue, &buf, &[], timeout_ms)
    }

    /// Parses and applies one inbound bundle: accumulates custody for an ACS,
    /// enqueues locally-destined payloads, or forwards bundles addressed
    /// elsewhere.
    pub fn process(&mut self, bytes: &[u8], timeout_ms: u64, flags: &mut Flags) -> Result<()> {
        let (primary, mut offset) = primary_block::read(bytes)?;

        let now_dtn = self.clock.dtn_now();
        if primary.creation_timestamp.seconds.saturating_add(primary.lifetime_secs) < now_dtn.seconds {
            return Err(Error::Expired);
        }
        if self.options.admin_only && !primary.flags.is_admin_record {
            return Err(Error::Ignore);
        }

        let mut cteb: Option<Cteb> = None;
        let mut bib: Option<Bib> = None;

        loop {
            if offset >= bytes.len() {
                return Err(bp6_codec::error::Error::Truncated("missing payload block").into());
            }
            match BlockType::from(bytes[offset]) {
                BlockType::CustodyTransferExtension => {
                    let (block, consumed) = bp6_codec::cteb::read(&bytes[offset..])?;
                    cteb = Some(block);
                    offset += consumed;
                }
                BlockType::BundleIntegrity => {
                    let (block, consumed) = bp6_codec::bib::read(&bytes[offset..])?;
                    bib = Some(block);
                    offset += consumed;
                }
                BlockType::Payload => {
                    let (_pflags, length, consumed) = payload_block::read_prelude(&bytes[offset..])?;
                    let payload_start = offset + consumed;
                    let payload_end = payload_start + length as usize;
                    if payload_end > bytes.len() {
                        return Err(bp6_codec::error::Error::Truncated("payload bytes").into());
                    }
                    let payload = &bytes[payload_start..payload_end];

                    // This core never reassembles fragments: accept only a
                    // fragment that happens to be the whole ADU by itself.
                    if primary.flags.is_fragment
                        && (primary.fragment_offset != 0 || primary.total_adu_length != payload.len() as u64)
                    {
                        return Err(Error::Unsupported("inbound fragment reassembly"));
                    }

                    if let Some(b) = &bib {
                        if !b.crc_type.verify(payload, b.crc_value) {
                            warn!(source = %primary.source, "bundle integrity check failed, dropping");
                            flags.set(Flags::NONCOMPLIANT);
                            return Err(Error::Dropped);
                        }
                    }

                    return self.process_payload(&primary, cteb, payload, bytes, timeout_ms, flags);
                }
                BlockType::Unknown(_) => {
                    let (consumed, block_flags) = skip_unknown_block(&bytes[offset..])?;
                    if block_flags.delete_bundle_if_unprocessed {
                        warn!("unrecognised block requested delete-if-unprocessed, dropping bundle");
                        return Err(Error::Dropped);
                    }
                    flags.set(Flags::INCOMPLETE);
                    offset += consumed;
                }
            }
        }
    }

    fn process_payload(
        &mut self,
        primary: &PrimaryBlock,
        cteb: Option<Cteb>,
        payload: &[u8],
        raw_bundle: &[u8],
        timeout_ms: u64,
        flags: &mut Flags,
    ) -> Result<()> {
        if primary.flags.is_admin_record {
            match payload.first().copied() {
                Some(bp6_codec::acs::ADMIN_REC_TYPE_ACS) => {
                    let record = AcsRecord::decode(payload)?;
                    self.apply_inbound_acs(&record);
                    return Ok(());
                }
                _ => return Err(Error::UnknownRec),
            }
        }

        // Compare against our own local address, not `options.destination`
        // (the remote peer outbound bundles are addressed to) — those are
        // different endpoints whenever `local != remote`.
        let ours_node = primary.destination.node == self.options.source.node;
        if !ours_node {
            // Forward: a bundle carrying a custody request we can act on is
            // re-housed under our own header, exactly like a locally-stored
            // bundle (fresh CTEB, a custody ID assigned the next time `load`
            // runs), and the prior custodian is acknowledged as
            // delivered=false. Anything else is relayed byte-for-byte, since
            // we have no CTEB to re-stamp.
            if self.options.request_custody {
                if let Some(cteb) = cteb {
                    if payload.len() > self.options.max_fragment_length {
                        return if self.options.allow_fragmentation {
                            Err(Error::Unsupported("re-fragmenting a forwarded bundle"))
                        } else {
                            Err(Error::BundleTooLarge)
                        };
                    }
                    self.emit_bundle(payload, 0, payload.len() as u64, timeout_ms)?;

                    let now = self.clock.monotonic_now();
                    let (f, ready) = self.custody_engine.update(cteb.custodian, cteb.custody_id, false, now);
                    flags.set(f);
                    if let Some(ready) = ready {
                        self.enqueue_dacs(ready, timeout_ms)?;
                    }
                    return Ok(());
                }
            }
            let record = DataRecord {
                retx_due_millis: 0,
                cteb_offset: NO_CTEB,
                bib_offset: NO_CTEB,
                payload_prelude_offset: NO_CTEB,
                header_len: raw_bundle.len() as u32,
            };
            let mut blob = Vec::with_capacity(DATA_RECORD_LEN + raw_bundle.len());
            blob.extend_from_slice(&record.encode());
            blob.extend_from_slice(raw_bundle);
            self.store.enqueue(self.data_queue, &blob, &[], timeout_ms)?;
            return Ok(());
        }

        if primary.destination.service != self.options.source.service {
            return Err(Error::WrongChannel);
        }

        let custody_requested = self.options.request_custody && cteb.is_some();
        let payload_record = PayloadRecord {
            custody_requested,
            custodian: cteb.map(|c| c.custodian).unwrap_or(Eid::NULL),
            custody_id: cteb.map(|c| c.custody_id).unwrap_or(0),
        };
        self.store
            .enqueue(self.payload_queue, &payload_record.encode(), payload, timeout_ms)?;
        Ok(())
    }

    fn apply_inbound_acs(&mut self, record: &AcsRecord) {
        let table_len = self.active_table.len() as u64;
        for cid in record.present_cids() {
            let idx = (cid % table_len) as usize;
            if !self.active_table[idx].is_vacant() {
                self.store.relinquish(self.active_table[idx]);
                self.active_table[idx] = StorageId::VACANT;
                if cid == self.oldest_custody_id {
                    self.oldest_custody_id += 1;
                }
            }
        }
    }

    /// Delivers the next locally-destined payload into `out`, returning the
    /// number of bytes written (`0` if none are ready).
    pub fn accept(&mut self, out: &mut [u8], timeout_ms: u64, flags: &mut Flags) -> Result<usize> {
        let Some((bytes, id)) = self.store.dequeue(self.payload_queue, timeout_ms)? else {
            return Ok(0);
        };
        let record = PayloadRecord::decode(&bytes).ok_or_else(|| Error::FailedStore("corrupt payload record".into()))?;
        let payload = &bytes[PAYLOAD_RECORD_LEN..];

        if payload.len() > out.len() {
            self.store.enqueue(self.payload_queue, &bytes, &[], timeout_ms)?;
            return Err(Error::PayloadTooLarge);
        }
        out[..payload.len()].copy_from_slice(payload);
        self.store.relinquish(id);

        if record.custody_requested {
            let now = self.clock.monotonic_now();
            let (f, ready) = self.custody_engine.update(record.custodian, record.custody_id, true, now);
            flags.set(f);
            if let Some(ready) = ready {
                trace!(custodian = %ready.custodian, cids = ready.record.fills.len(), "acs accumulator flushed on delivery");
                self.enqueue_dacs(ready, timeout_ms)?;
            }
        }
        Ok(payload.len())
    }

    /// Flushes any ACS accumulator whose `acs_rate_ms` has elapsed, even
    /// absent an overflow condition.
    pub fn tick(&mut self, timeout_ms: u64) -> Result<Flags> {
        let mut flags = Flags::NONE;
        let now = self.clock.monotonic_now();
        let rate = Duration::from_millis(self.options.acs_rate_ms);
        let ready = self.custody_engine.tick(now, rate);
        for r in ready {
            debug!(custodian = %r.custodian, "rate-triggered acs emission");
            flags.set(Flags::ROUTE_NEEDED);
            self.enqueue_dacs(r, timeout_ms)?;
        }
        Ok(flags)
    }

    /// Destroys this channel's store queues. The channel itself is dropped
    /// by the caller (normally [`crate::Agent::close`]).
    pub fn close(self) {
        self.store.destroy(self.data_queue);
        self.store.destroy(self.payload_queue);
        self.store.destroy(self.dacs_queue);
    }
}

/// Parses only the primary block to recover a bundle's destination, without
/// routing it through any open channel.
pub fn route_info(bytes: &[u8]) -> Result<Eid> {
    Ok(primary_block::route_info(bytes)?)
}

fn skip_unknown_block(buf: &[u8]) -> Result<(usize, BlockFlags)> {
    if buf.is_empty() {
        return Err(bp6_codec::error::Error::Truncated("unknown block type").into());
    }
    let mut offset = 1usize;
    let (flags_raw, n) = bp6_codec::sdnv::decode(&buf[offset..]).map_err(sdnv_err)?;
    offset += n;
    let (length, n) = bp6_codec::sdnv::decode(&buf[offset..]).map_err(sdnv_err)?;
    offset += n;
    offset += length as usize;
    Ok((offset, BlockFlags::from(flags_raw)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::FakeClock;
    use crate::store::mem::MemStore;

    fn open(local: Eid, remote: Eid, options: Options) -> Channel {
        let store = Arc::new(MemStore::new());
        let clock = Arc::new(FakeClock::new(DtnTime::EPOCH));
        Channel::open(store, clock, local, remote, options).unwrap()
    }

    fn shared(local: Eid, remote: Eid, options: Options, store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Channel {
        Channel::open(store, clock, local, remote, options).unwrap()
    }

    #[test]
    fn round_trip_one_bundle_no_custody() {
        let mut a = open(
            Eid::new(1, 1),
            Eid::new(2, 1),
            Options {
                allow_fragmentation: false,
                request_custody: false,
                ..Default::default()
            },
        );
        let mut flags = Flags::NONE;
        a.store(b"hello", 0).unwrap();
        let mut buf = [0u8; 256];
        let n = a.load(&mut buf, 0, &mut flags).unwrap();
        assert!(n > 0);

        let mut b = open(
            Eid::new(2, 1),
            Eid::new(2, 1),
            Options {
                request_custody: false,
                admin_only: false,
                ..Default::default()
            },
        );
        b.process(&buf[..n], 0, &mut flags).unwrap();
        let mut out = [0u8; 16];
        let got = b.accept(&mut out, 0, &mut flags).unwrap();
        assert_eq!(&out[..got], b"hello");

        // No ACS should have been produced.
        assert_eq!(b.load(&mut buf, 0, &mut flags).unwrap(), 0);
    }

    #[test]
    fn custody_round_trip_retires_active_slot() {
        let clock = Arc::new(FakeClock::new(DtnTime::EPOCH));
        let a_store: Arc<dyn Store> = Arc::new(MemStore::new());
        let b_store: Arc<dyn Store> = Arc::new(MemStore::new());

        let mut a = shared(
            Eid::new(1, 1),
            Eid::new(2, 1),
            Options {
                request_custody: true,
                ..Default::default()
            },
            a_store,
            clock.clone(),
        );
        let mut b = shared(
            Eid::new(2, 1),
            Eid::new(1, 1),
            Options {
                admin_only: false,
                ..Default::default()
            },
            b_store,
            clock,
        );

        let mut flags = Flags::NONE;
        a.store(b"ping", 0).unwrap();
        let mut buf = [0u8; 256];
        let n = a.load(&mut buf, 0, &mut flags).unwrap();
        assert!(n > 0);

        b.process(&buf[..n], 0, &mut flags).unwrap();
        let mut out = [0u8; 16];
        let got = b.accept(&mut out, 0, &mut flags).unwrap();
        assert_eq!(&out[..got], b"ping");

        let mut acs_buf = [0u8; 256];
        let acs_len = b.load(&mut acs_buf, 0, &mut flags).unwrap();
        assert!(acs_len > 0);
        assert!(flags.contains(Flags::ROUTE_NEEDED));

        a.process(&acs_buf[..acs_len], 0, &mut flags).unwrap();
        assert!(a.active_table[0].is_vacant());
        assert_eq!(a.oldest_custody_id, 1);
    }

    #[test]
    fn retransmit_on_timeout() {
        let store: Arc<dyn Store> = Arc::new(MemStore::new());
        let clock = Arc::new(FakeClock::new(DtnTime::EPOCH));
        let mut a = shared(
            Eid::new(1, 1),
            Eid::new(2, 1),
            Options {
                request_custody: true,
                timeout_ms: 1000,
                ..Default::default()
            },
            store,
            clock.clone(),
        );
        let mut flags = Flags::NONE;
        a.store(b"x", 0).unwrap();
        let mut buf1 = [0u8; 256];
        let n1 = a.load(&mut buf1, 0, &mut flags).unwrap();
        assert!(n1 > 0);

        clock.advance(Duration::from_millis(1100));

        let mut buf2 = [0u8; 256];
        let n2 = a.load(&mut buf2, 0, &mut flags).unwrap();
        assert_eq!(n1, n2);
        assert_eq!(&buf1[..n1], &buf2[..n2]);
    }

    #[test]
    fn fragmentation_produces_two_bundles_with_correct_offsets() {
        let mut a = open(
            Eid::new(1, 1),
            Eid::new(2, 1),
            Options {
                allow_fragmentation: true,
                max_fragment_length: 8,
                request_custody: false,
                ..Default::default()
            },
        );
        let mut flags = Flags::NONE;
        let payload = b"0123456789ABCDEF";
        a.store(payload, 0).unwrap();

        let mut buf = [0u8; 256];
        let n1 = a.load(&mut buf, 0, &mut flags).unwrap();
        let (first, _) = primary_block::read(&buf[..n1]).unwrap();
        assert_eq!(first.fragment_offset, 0);
        assert_eq!(first.total_adu_length, 16);

        let mut buf2 = [0u8; 256];
        let n2 = a.load(&mut buf2, 0, &mut flags).unwrap();
        let (second, consumed2) = primary_block::read(&buf2[..n2]).unwrap();
        assert_eq!(second.fragment_offset, 8);
        assert_eq!(second.total_adu_length, 16);

        // The two payloads concatenate back to the original.
        let (_pf1, len1, off1) = payload_block::read_prelude(&buf[first_payload_block_offset(&buf[..n1])..]).unwrap();
        let p1 = &buf[first_payload_block_offset(&buf[..n1]) + off1..first_payload_block_offset(&buf[..n1]) + off1 + len1 as usize];
        let base2 = consumed2;
        let (_pf2, len2, off2) = payload_block::read_prelude(&buf2[base2..n2]).unwrap();
        let p2 = &buf2[base2 + off2..base2 + off2 + len2 as usize];
        let mut joined = Vec::new();
        joined.extend_from_slice(p1);
        joined.extend_from_slice(p2);
        assert_eq!(joined, payload);
    }

    fn first_payload_block_offset(buf: &[u8]) -> usize {
        let (_primary, consumed) = primary_block::read(buf).unwrap();
        consumed
    }

    #[test]
    fn wrap_drop_policy_evicts_oldest() {
        let mut a = open(
            Eid::new(1, 1),
            Eid::new(2, 1),
            Options {
                request_custody: true,
                active_table_size: 4,
                wrap_response: WrapPolicy::Drop,
                ..Default::default()
            },
        );
        let mut flags = Flags::NONE;
        let mut buf = [0u8; 256];
        for _ in 0..4 {
            a.store(b"x", 0).unwrap();
            assert!(a.load(&mut buf, 0, &mut flags).unwrap() > 0);
        }
        assert_eq!(a.current_custody_id, 4);
        assert_eq!(a.oldest_custody_id, 0);

        a.store(b"y", 0).unwrap();
        let n = a.load(&mut buf, 0, &mut flags).unwrap();
        assert!(n > 0);
        assert_eq!(a.current_custody_id, 5);
        assert_eq!(a.oldest_custody_id, 1);
    }
}

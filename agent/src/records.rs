/*!
The small binary prolog prepended to every record this engine asks the store
adapter to keep, ahead of the bundle bytes (or payload bytes) that follow it.
This is the wire-level ABI between the channel engine and an external
persistence service (§4.F of the design) — not the Bundle Protocol wire
format itself, so it is a flat, fixed-size, big-endian struct rather than an
SDNV-based encoding.
*/

/// Per-outbound-bundle metadata persisted ahead of the header+payload bytes
/// on the data queue.
///
/// `retx_due_millis` is relative to the owning channel's `opened_at` instant,
/// not an absolute wall-clock time — retransmit scheduling only ever
/// compares monotonic durations (§5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataRecord {
    pub retx_due_millis: u64,
    pub cteb_offset: u32,
    pub bib_offset: u32,
    pub payload_prelude_offset: u32,
    pub header_len: u32,
}

pub const DATA_RECORD_LEN: usize = 8 + 4 + 4 + 4 + 4;

impl DataRecord {
    pub fn encode(&self) -> [u8; DATA_RECORD_LEN] {
        let mut buf = [0u8; DATA_RECORD_LEN];
        buf[0..8].copy_from_slice(&self.retx_due_millis.to_be_bytes());
        buf[8..12].copy_from_slice(&self.cteb_offset.to_be_bytes());
        buf[12..16].copy_from_slice(&self.bib_offset.to_be_bytes());
        buf[16..20].copy_from_slice(&self.payload_prelude_offset.to_be_bytes());
        buf[20..24].copy_from_slice(&self.header_len.to_be_bytes());
        buf
    }

    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < DATA_RECORD_LEN {
            return None;
        }
        Some(Self {
            retx_due_millis: u64::from_be_bytes(buf[0..8].try_into().ok()?),
            cteb_offset: u32::from_be_bytes(buf[8..12].try_into().ok()?),
            bib_offset: u32::from_be_bytes(buf[12..16].try_into().ok()?),
            payload_prelude_offset: u32::from_be_bytes(buf[16..20].try_into().ok()?),
            header_len: u32::from_be_bytes(buf[20..24].try_into().ok()?),
        })
    }
}

/// Per-delivered-payload metadata persisted ahead of the payload bytes on
/// the payload queue, so `accept` knows whether to trigger a custody
/// acknowledgement once it hands the bytes to the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayloadRecord {
    pub custody_requested: bool,
    pub custodian: bp6_codec::eid::Eid,
    pub custody_id: u64,
}

pub const PAYLOAD_RECORD_LEN: usize = 1 + 8 + 8 + 8;

impl PayloadRecord {
    pub fn encode(&self) -> [u8; PAYLOAD_RECORD_LEN] {
        let mut buf = [0u8; PAYLOAD_RECORD_LEN];
        buf[0] = self.custody_requested as u8;
        buf[1..9].copy_from_slice(&self.custodian.node.to_be_bytes());
        buf[9..17].copy_from_slice(&self.custodian.service.to_be_bytes());
        buf[17..25].copy_from_slice(&self.custody_id.to_be_bytes());
        buf
    }

    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < PAYLOAD_RECORD_LEN {
            return None;
        }
        Some(Self {
            custody_requested: buf[0] != 0,
            custodian: bp6_codec::eid::Eid::new(
                u64::from_be_bytes(buf[1..9].try_into().ok()?),
                u64::from_be_bytes(buf[9..17].try_into().ok()?),
            ),
            custody_id: u64::from_be_bytes(buf[17..25].try_into().ok()?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_record_round_trips() {
        let record = DataRecord {
            retx_due_millis: 123456,
            cteb_offset: 10,
            bib_offset: 20,
            payload_prelude_offset: 30,
            header_len: 40,
        };
        let encoded = record.encode();
        assert_eq!(DataRecord::decode(&encoded).unwrap(), record);
    }

    #[test]
    fn payload_record_round_trips() {
        let record = PayloadRecord {
            custody_requested: true,
            custodian: bp6_codec::eid::Eid::new(5, 1),
            custody_id: 99,
        };
        let encoded = record.encode();
        assert_eq!(PayloadRecord::decode(&encoded).unwrap(), record);
    }
}

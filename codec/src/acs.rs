/*!
The Aggregate Custody Signal (ACS) administrative record: `rec_type | status
| first_cid | num_fills | fill_0 | fill_1 | …`. The fills alternate gap/run
lengths of custody IDs, starting from `first_cid`: `fill_0` CIDs are absent,
the next `fill_1` are present, the next `fill_2` are absent, and so on. A run
of zero absent CIDs at the start (`fill_0 == 0`) means the very first CID is
itself present.
*/

use crate::{error::Error, sdnv};

/// Administrative record type code for an Aggregate Custody Signal.
pub const ADMIN_REC_TYPE_ACS: u8 = 0x40;

/// The largest gap or run length a single fill entry can encode (14 bits).
pub const MAX_FILL_RUN: u64 = 0x3FFF;

/// A decoded ACS administrative record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcsRecord {
    pub succeeded: bool,
    pub first_cid: u64,
    /// Alternating gap/run lengths: `[gap_0, run_0, gap_1, run_1, ...]`.
    pub fills: Vec<u64>,
}

impl AcsRecord {
    /// Encodes this record as an admin-record payload.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = vec![ADMIN_REC_TYPE_ACS, if self.succeeded { 1 } else { 0 }];
        out.extend(sdnv::encode_minimal(self.first_cid));
        out.extend(sdnv::encode_minimal(self.fills.len() as u64));
        for &fill in &self.fills {
            out.extend(sdnv::encode_minimal(fill));
        }
        out
    }

    /// Decodes an admin-record payload previously produced by [`Self::encode`].
    pub fn decode(buf: &[u8]) -> Result<Self, Error> {
        if buf.len() < 2 {
            return Err(Error::Truncated("acs record header"));
        }
        if buf[0] != ADMIN_REC_TYPE_ACS {
            return Err(Error::Truncated("acs record type"));
        }
        let succeeded = buf[1] & 0x01 != 0;
        let mut offset = 2usize;

        let (first_cid, n) = sdnv::decode(&buf[offset..])?;
        offset += n;
        let (num_fills, n) = sdnv::decode(&buf[offset..])?;
        offset += n;

        let mut fills = Vec::with_capacity(num_fills as usize);
        for _ in 0..num_fills {
            let (fill, n) = sdnv::decode(&buf[offset..])?;
            offset += n;
            fills.push(fill);
        }

        Ok(Self {
            succeeded,
            first_cid,
            fills,
        })
    }

    /// Iterates every custody ID this record marks as present, in ascending order.
    pub fn present_cids(&self) -> impl Iterator<Item = u64> + '_ {
        let mut cid = self.first_cid;
        self.fills.chunks(2).flat_map(move |chunk| {
            let gap = chunk[0];
            let run = chunk.get(1).copied().unwrap_or(0);
            cid += gap;
            let start = cid;
            cid += run;
            start..cid
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let record = AcsRecord {
            succeeded: true,
            first_cid: 3,
            fills: vec![0, 3, 2, 2],
        };
        let encoded = record.encode();
        let decoded = AcsRecord::decode(&encoded).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn present_cids_matches_fill_compression_example() {
        // CIDs [3, 4, 5, 8, 9] => first_cid=3, fills=[0,3,2,2]
        let record = AcsRecord {
            succeeded: true,
            first_cid: 3,
            fills: vec![0, 3, 2, 2],
        };
        let cids: Vec<u64> = record.present_cids().collect();
        assert_eq!(cids, vec![3, 4, 5, 8, 9]);
    }

    #[test]
    fn rejects_wrong_record_type() {
        let buf = [0x00, 0x01];
        assert!(AcsRecord::decode(&buf).is_err());
    }
}

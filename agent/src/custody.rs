/*!
The per-custodian ACS accumulator table (§4.D). Each accumulator tracks one
remote custodian's run of acknowledged custody IDs as an alternating
gap/run sequence; [`CustodyEngine::update`] is called once per inbound
bundle that carries custody, and either mutates the run in place or, when a
run or the fill array would overflow, finalizes the accumulator into a ready
ACS record and restarts it from the new CID.
*/

use crate::error::Flags;
use bp6_codec::{acs::AcsRecord, eid::Eid};
use std::time::{Duration, Instant};

/// Maximum number of `(gap, run)` array slots a single accumulator's ACS
/// record may hold before it must be flushed. Two slots per completed run,
/// so this bounds an ACS to 32 distinct runs of present CIDs.
pub const MAX_FILLS: usize = 64;

#[derive(Debug, Clone)]
struct Accumulator {
    custodian: Eid,
    succeeded: bool,
    first_cid: Option<u64>,
    last_cid: u64,
    num_cids: u64,
    closed_fills: Vec<u64>,
    pending_gap: u64,
    current_run: u64,
    started_at: Instant,
}

impl Accumulator {
    fn new(custodian: Eid, succeeded: bool, now: Instant) -> Self {
        Self {
            custodian,
            succeeded,
            first_cid: None,
            last_cid: 0,
            num_cids: 0,
            closed_fills: Vec::new(),
            pending_gap: 0,
            current_run: 0,
            started_at: now,
        }
    }

    fn is_empty(&self) -> bool {
        self.first_cid.is_none()
    }

    fn record(&self) -> AcsRecord {
        let mut fills = self.closed_fills.clone();
        fills.push(self.pending_gap);
        fills.push(self.current_run);
        AcsRecord {
            succeeded: self.succeeded,
            first_cid: self.first_cid.unwrap_or(0),
            fills,
        }
    }

    fn reset(&mut self) {
        self.first_cid = None;
        self.last_cid = 0;
        self.num_cids = 0;
        self.closed_fills.clear();
        self.pending_gap = 0;
        self.current_run = 0;
    }

    /// Tries to fold `cid` into this accumulator's run. Leaves the
    /// accumulator untouched and returns `false` for any outcome that needs
    /// the caller to finalize-and-restart (overflow) or simply drop the
    /// update (went-backwards).
    fn add(&mut self, cid: u64, now: Instant) -> (Flags, bool) {
        if self.is_empty() {
            self.first_cid = Some(cid);
            self.last_cid = cid;
            self.num_cids = 1;
            self.current_run = 1;
            self.pending_gap = 0;
            self.started_at = now;
            return (Flags::NONE, true);
        }

        if cid <= self.last_cid {
            return (Flags::CID_WENT_BACKWARDS, false);
        }

        let gap = cid - self.last_cid - 1;
        if gap == 0 && self.current_run < bp6_codec::acs::MAX_FILL_RUN {
            self.current_run += 1;
        } else if gap < bp6_codec::acs::MAX_FILL_RUN {
            if self.closed_fills.len() + 2 > MAX_FILLS {
                return (Flags::TOO_MANY_FILLS, false);
            }
            self.closed_fills.push(self.pending_gap);
            self.closed_fills.push(self.current_run);
            self.pending_gap = gap;
            self.current_run = 1;
        } else {
            return (Flags::FILL_OVERFLOW, false);
        }

        self.last_cid = cid;
        self.num_cids += 1;
        (Flags::NONE, true)
    }
}

/// A finalized accumulator ready to go out as a DACS (DTN ACS) bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadyAcs {
    pub custodian: Eid,
    pub record: AcsRecord,
}

/// The fixed-size per-channel table of ACS accumulators, one per remote
/// custodian currently being acknowledged.
pub struct CustodyEngine {
    entries: Vec<Option<Accumulator>>,
}

impl CustodyEngine {
    pub fn new(max_sources: usize) -> Self {
        Self {
            entries: (0..max_sources).map(|_| None).collect(),
        }
    }

    fn find_active(&self, custodian: Eid) -> Option<usize> {
        self.entries.iter().position(
            |e| matches!(e, Some(a) if a.custodian == custodian && !a.is_empty()),
        )
    }

    fn find_free_slot(&self) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.is_none() || matches!(e, Some(a) if a.is_empty()))
    }

    /// Accumulates one inbound custody acknowledgement. `succeeded` reflects
    /// whether the bundle was actually delivered locally (`true`) or merely
    /// forwarded on (`false`).
    ///
    /// Returns any advisory flags raised, and a [`ReadyAcs`] if accumulating
    /// this CID forced (or coincided with) a flush.
    pub fn update(
        &mut self,
        custodian: Eid,
        cid: u64,
        succeeded: bool,
        now: Instant,
    ) -> (Flags, Option<ReadyAcs>) {
        let idx = match self.find_active(custodian) {
            Some(i) => i,
            None => match self.find_free_slot() {
                Some(i) => {
                    self.entries[i] = Some(Accumulator::new(custodian, succeeded, now));
                    i
                }
                None => return (Flags::TOO_MANY_SOURCES, None),
            },
        };

        let entry = self.entries[idx].as_mut().expect("slot just populated");

        // A change in delivered-vs-forwarded status can't share one ACS
        // record (the `succeeded` bit is record-wide), so it forces the
        // same finalize-and-restart path as a fill overflow.
        let status_changed = !entry.is_empty() && entry.succeeded != succeeded;

        let (mut flags, added) = if status_changed {
            (Flags::NONE, false)
        } else {
            entry.add(cid, now)
        };

        if added {
            return (flags, None);
        }

        let needs_restart = status_changed
            || flags.contains(Flags::FILL_OVERFLOW)
            || flags.contains(Flags::TOO_MANY_FILLS);

        if !needs_restart {
            // CID_WENT_BACKWARDS: diagnostic only, no state change.
            return (flags, None);
        }

        let ready = if entry.is_empty() {
            None
        } else {
            Some(ReadyAcs {
                custodian: entry.custodian,
                record: entry.record(),
            })
        };
        entry.reset();
        entry.succeeded = succeeded;
        let (restart_flags, _) = entry.add(cid, now);
        flags |= restart_flags;
        (flags, ready)
    }

    /// Flushes every accumulator whose oldest CID has been waiting at least
    /// `rate`, independent of any overflow condition.
    pub fn tick(&mut self, now: Instant, rate: Duration) -> Vec<ReadyAcs> {
        let mut ready = Vec::new();
        for entry in self.entries.iter_mut() {
            if let Some(acc) = entry {
                if !acc.is_empty() && now.duration_since(acc.started_at) >= rate {
                    ready.push(ReadyAcs {
                        custodian: acc.custodian,
                        record: acc.record(),
                    });
                    acc.reset();
                }
            }
        }
        ready
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn custodian() -> Eid {
        Eid::new(10, 0)
    }

    #[test]
    fn fill_compression_matches_scenario() {
        let mut engine = CustodyEngine::new(4);
        let now = Instant::now();
        for cid in [3, 4, 5, 8, 9] {
            let (flags, ready) = engine.update(custodian(), cid, true, now);
            assert_eq!(flags, Flags::NONE);
            assert!(ready.is_none());
        }
        let ready = engine.tick(now + Duration::from_secs(10), Duration::from_secs(1));
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].custodian, custodian());
        assert_eq!(ready[0].record.first_cid, 3);
        assert_eq!(ready[0].record.fills, vec![0, 3, 2, 2]);
    }

    #[test]
    fn single_cid_round_trips_through_record() {
        let mut engine = CustodyEngine::new(4);
        let now = Instant::now();
        engine.update(custodian(), 0, true, now);
        let ready = engine.tick(now + Duration::from_secs(5), Duration::from_secs(1));
        assert_eq!(ready.len(), 1);
        let cids: Vec<u64> = ready[0].record.present_cids().collect();
        assert_eq!(cids, vec![0]);
    }

    #[test]
    fn went_backwards_is_a_pure_diagnostic() {
        let mut engine = CustodyEngine::new(4);
        let now = Instant::now();
        engine.update(custodian(), 5, true, now);
        let (flags, ready) = engine.update(custodian(), 5, true, now);
        assert_eq!(flags, Flags::CID_WENT_BACKWARDS);
        assert!(ready.is_none());
        let (flags, _) = engine.update(custodian(), 2, true, now);
        assert_eq!(flags, Flags::CID_WENT_BACKWARDS);
    }

    #[test]
    fn table_full_raises_too_many_sources() {
        let mut engine = CustodyEngine::new(1);
        let now = Instant::now();
        engine.update(Eid::new(1, 0), 0, true, now);
        let (flags, ready) = engine.update(Eid::new(2, 0), 0, true, now);
        assert_eq!(flags, Flags::TOO_MANY_SOURCES);
        assert!(ready.is_none());
    }

    #[test]
    fn rate_tick_flushes_without_overflow() {
        let mut engine = CustodyEngine::new(4);
        let now = Instant::now();
        engine.update(custodian(), 0, true, now);
        assert!(engine.tick(now, Duration::from_secs(1)).is_empty());
        let ready = engine.tick(now + Duration::from_millis(1100), Duration::from_secs(1));
        assert_eq!(ready.len(), 1);
    }
}

/*!
The one piece of host platform state the core reads: time. Logging goes
through `tracing`'s own subscriber mechanism, so it needs no injected
capability; a narrow `Clock` trait is all the core depends on, with a
`std`-backed default and a deterministic fake for tests that need to assert
retransmit timing without sleeping.
*/

use bp6_codec::time::DtnTime;
use std::time::{Duration, Instant};
use time::OffsetDateTime;

/// Monotonic and wall-clock time, as the core needs it.
///
/// Retransmit scheduling compares against the monotonic clock exclusively,
/// so NTP step corrections never cause a spurious retransmit storm or a
/// missed deadline; wall-clock time is only used to stamp `creation_timestamp`
/// when a channel has `use_system_time` enabled.
pub trait Clock: Send + Sync {
    /// A monotonically non-decreasing instant, for comparing against
    /// retransmit-due timestamps.
    fn monotonic_now(&self) -> Instant;

    /// The current DTN wall-clock time, for patching creation timestamps.
    fn dtn_now(&self) -> DtnTime;
}

/// The real system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

const DTN_EPOCH_UNIX_SECONDS: u64 = 946_684_800; // 2000-01-01T00:00:00Z

impl Clock for SystemClock {
    fn monotonic_now(&self) -> Instant {
        Instant::now()
    }

    fn dtn_now(&self) -> DtnTime {
        let now = OffsetDateTime::now_utc();
        let unix_secs = now.unix_timestamp().max(0) as u64;
        DtnTime::new(
            unix_secs.saturating_sub(DTN_EPOCH_UNIX_SECONDS),
            now.nanosecond(),
        )
    }
}

/// A deterministic clock for tests: starts at a fixed instant and only
/// advances when told to, so retransmit-timeout scenarios don't need to
/// actually sleep in wall-clock time.
#[derive(Debug)]
pub struct FakeClock {
    start: Instant,
    offset: std::sync::Mutex<Duration>,
    dtn_base: DtnTime,
}

impl FakeClock {
    pub fn new(dtn_base: DtnTime) -> Self {
        Self {
            start: Instant::now(),
            offset: std::sync::Mutex::new(Duration::ZERO),
            dtn_base,
        }
    }

    /// Advances both the monotonic and DTN clocks by `duration`.
    pub fn advance(&self, duration: Duration) {
        let mut offset = self.offset.lock().expect("fake clock mutex poisoned");
        *offset += duration;
    }
}

impl Clock for FakeClock {
    fn monotonic_now(&self) -> Instant {
        let offset = *self.offset.lock().expect("fake clock mutex poisoned");
        self.start + offset
    }

    fn dtn_now(&self) -> DtnTime {
        let offset = *self.offset.lock().expect("fake clock mutex poisoned");
        let total_nanos = self.dtn_base.nanos as u64 + offset.subsec_nanos() as u64;
        DtnTime::new(
            self.dtn_base.seconds + offset.as_secs() + total_nanos / 1_000_000_000,
            (total_nanos % 1_000_000_000) as u32,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fake_clock_advances_monotonically() {
        let clock = FakeClock::new(DtnTime::EPOCH);
        let t0 = clock.monotonic_now();
        clock.advance(Duration::from_millis(1100));
        let t1 = clock.monotonic_now();
        assert!(t1 >= t0 + Duration::from_millis(1100));
    }

    #[test]
    fn fake_dtn_clock_advances_too() {
        let clock = FakeClock::new(DtnTime::new(1000, 0));
        clock.advance(Duration::from_secs(5));
        assert_eq!(clock.dtn_now().seconds, 1005);
    }
}

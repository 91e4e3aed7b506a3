/*!
A fixed-size table of [`Channel`]s, dispatched by handle. This is the shape
the design calls out in §5: the agent itself holds no lock of its own —
each channel slot is independent, so two handles never contend on anything
but the `Agent`'s own slot table, which every call only touches briefly to
look a channel up.
*/

use crate::channel::Channel;
use crate::error::{Error, Flags, Result};
use crate::options::Options;
use crate::platform::Clock;
use crate::store::Store;

use bp6_codec::eid::Eid;

use std::sync::Arc;

use tracing::{debug, warn};

/// Maximum number of channels one [`Agent`] can hold open simultaneously.
/// A fixed bound, not a configurable one: it is sized for one host's worth
/// of concurrent custody-transfer peers, not a router's full neighbour table.
pub const MAX_CHANNELS: usize = 64;

/// An opaque handle to one open channel, returned by [`Agent::open`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AgentHandle(u32);

/// Owns up to [`MAX_CHANNELS`] open [`Channel`]s and dispatches calls to them
/// by handle.
pub struct Agent {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    slots: Vec<Option<Channel>>,
}

impl Agent {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            slots: (0..MAX_CHANNELS).map(|_| None).collect(),
        }
    }

    fn slot(&self, handle: AgentHandle) -> Result<&Channel> {
        self.slots
            .get(handle.0 as usize)
            .and_then(|s| s.as_ref())
            .ok_or(Error::InvalidChannel)
    }

    fn slot_mut(&mut self, handle: AgentHandle) -> Result<&mut Channel> {
        self.slots
            .get_mut(handle.0 as usize)
            .and_then(|s| s.as_mut())
            .ok_or(Error::InvalidChannel)
    }

    /// Opens a new channel bound to `local`/`remote`, returning a handle for
    /// every subsequent call. Fails with `ChannelsFull` if every slot is
    /// already in use.
    pub fn open(&mut self, local: Eid, remote: Eid, options: Options) -> Result<AgentHandle> {
        let idx = self
            .slots
            .iter()
            .position(|s| s.is_none())
            .ok_or(Error::ChannelsFull)?;

        let channel = Channel::open(self.store.clone(), self.clock.clone(), local, remote, options)?;
        self.slots[idx] = Some(channel);
        debug!(idx, %local, %remote, "channel opened");
        Ok(AgentHandle(idx as u32))
    }

    /// Closes a channel, freeing its slot and destroying its store queues.
    pub fn close(&mut self, handle: AgentHandle) -> Result<()> {
        let channel = self
            .slots
            .get_mut(handle.0 as usize)
            .and_then(|s| s.take())
            .ok_or(Error::InvalidChannel)?;
        channel.close();
        debug!(idx = handle.0, "channel closed");
        Ok(())
    }

    pub fn setopt(&mut self, handle: AgentHandle, opt: crate::channel::Opt, value: crate::channel::OptValue) -> Result<()> {
        self.slot_mut(handle)?.setopt(opt, value)
    }

    pub fn getopt(&self, handle: AgentHandle, opt: crate::channel::Opt) -> Result<crate::channel::OptValue> {
        Ok(self.slot(handle)?.getopt(opt))
    }

    pub fn store(&mut self, handle: AgentHandle, payload: &[u8], timeout_ms: u64) -> Result<()> {
        self.slot_mut(handle)?.store(payload, timeout_ms)
    }

    pub fn load(&mut self, handle: AgentHandle, out: &mut [u8], timeout_ms: u64) -> Result<(usize, Flags)> {
        let mut flags = Flags::NONE;
        let n = self.slot_mut(handle)?.load(out, timeout_ms, &mut flags)?;
        Ok((n, flags))
    }

    pub fn process(&mut self, handle: AgentHandle, bytes: &[u8], timeout_ms: u64) -> Result<Flags> {
        let mut flags = Flags::NONE;
        match self.slot_mut(handle)?.process(bytes, timeout_ms, &mut flags) {
            Ok(()) => Ok(flags),
            Err(Error::Ignore) => Ok(flags),
            Err(e) => {
                warn!(idx = handle.0, error = %e, "process rejected inbound bundle");
                Err(e)
            }
        }
    }

    pub fn accept(&mut self, handle: AgentHandle, out: &mut [u8], timeout_ms: u64) -> Result<(usize, Flags)> {
        let mut flags = Flags::NONE;
        let n = self.slot_mut(handle)?.accept(out, timeout_ms, &mut flags)?;
        Ok((n, flags))
    }

    /// Drives rate-triggered ACS emission for one channel. Callers with
    /// several open channels call this for each handle on their own schedule
    /// (there is no agent-wide timer).
    pub fn tick(&mut self, handle: AgentHandle, timeout_ms: u64) -> Result<Flags> {
        self.slot_mut(handle)?.tick(timeout_ms)
    }

    /// Recovers a bundle's destination without routing it through any open
    /// channel — useful for picking which handle to `process` it on.
    pub fn route_info(&self, bytes: &[u8]) -> Result<Eid> {
        crate::channel::route_info(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{FakeClock, SystemClock};
    use crate::store::mem::MemStore;
    use bp6_codec::time::DtnTime;

    fn agent() -> Agent {
        Agent::new(Arc::new(MemStore::new()), Arc::new(SystemClock))
    }

    #[test]
    fn open_and_close_recycle_slots() {
        let mut a = agent();
        let h = a.open(Eid::new(1, 1), Eid::new(2, 1), Options::default()).unwrap();
        a.close(h).unwrap();
        // The slot should be free again.
        let h2 = a.open(Eid::new(1, 1), Eid::new(2, 1), Options::default()).unwrap();
        assert_eq!(h2, h);
    }

    #[test]
    fn closing_twice_is_an_error() {
        let mut a = agent();
        let h = a.open(Eid::new(1, 1), Eid::new(2, 1), Options::default()).unwrap();
        a.close(h).unwrap();
        assert!(matches!(a.close(h), Err(Error::InvalidChannel)));
    }

    #[test]
    fn channels_full_once_every_slot_is_taken() {
        let mut a = agent();
        for i in 0..MAX_CHANNELS as u64 {
            a.open(Eid::new(i, 1), Eid::new(999, 1), Options::default()).unwrap();
        }
        assert!(matches!(
            a.open(Eid::new(1000, 1), Eid::new(999, 1), Options::default()),
            Err(Error::ChannelsFull)
        ));
    }

    #[test]
    fn store_then_load_round_trips_through_agent_dispatch() {
        let store = Arc::new(MemStore::new());
        let clock = Arc::new(FakeClock::new(DtnTime::EPOCH));
        let mut a = Agent::new(store, clock);
        let h = a
            .open(
                Eid::new(1, 1),
                Eid::new(2, 1),
                Options {
                    request_custody: false,
                    ..Default::default()
                },
            )
            .unwrap();
        a.store(h, b"via agent", 0).unwrap();
        let mut buf = [0u8; 256];
        let (n, _flags) = a.load(h, &mut buf, 0).unwrap();
        assert!(n > 0);
    }
}

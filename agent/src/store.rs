/*!
The store adapter boundary: a narrow capability set the channel engine calls
into for keyed enqueue/dequeue/retrieve/relinquish of opaque blobs, exactly
as described in the design's §4.F. The engine never assumes anything about
*how* a [`Store`] implementation persists bytes — only that a queue is FIFO
within one handle, that handles are independent of each other, and that a
borrowed record stays valid (and stable) until explicitly relinquished.

Represented as a trait object (a capability set) rather than generics, so an
[`crate::channel::Channel`] can hold `Arc<dyn Store>` without knowing its
concrete type — the same "pass it by value, not by inheritance" shape the
design calls out in §9.
*/

use crate::error::{Error, Result};

pub mod mem;

/// An opaque handle to one FIFO queue within a [`Store`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StoreHandle(pub u64);

/// An opaque identifier for one stored record, returned by [`Store::dequeue`]
/// and retained (e.g. in a channel's active table) until [`Store::relinquish`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StorageId(pub u64);

impl StorageId {
    /// The vacancy sentinel used by the active table: no storage ID is ever
    /// allocated with this value.
    pub const VACANT: StorageId = StorageId(u64::MAX);

    pub fn is_vacant(self) -> bool {
        self == Self::VACANT
    }
}

/// A narrow capability set implemented by an external persistence service.
///
/// `timeout_ms = 0` means "try once, do not block". Implementations must
/// never leave a queue or record in a partially-mutated state on error: a
/// caller observes either full success or a clean failure with no side effects.
pub trait Store: Send + Sync {
    /// Allocates a new, empty FIFO queue and returns a handle to it.
    fn create(&self) -> Result<StoreHandle>;

    /// Destroys a queue and every record still enqueued or retrievable on it.
    fn destroy(&self, handle: StoreHandle);

    /// Appends a new record, the concatenation of `prolog` and `payload`, to
    /// the back of `handle`'s queue.
    fn enqueue(&self, handle: StoreHandle, prolog: &[u8], payload: &[u8], timeout_ms: u64) -> Result<()>;

    /// Removes and returns the record at the front of `handle`'s queue, or
    /// `Ok(None)` if nothing was available within `timeout_ms`.
    fn dequeue(&self, handle: StoreHandle, timeout_ms: u64) -> Result<Option<(Vec<u8>, StorageId)>>;

    /// Returns a copy of a previously dequeued record by its storage ID,
    /// without removing it from the store.
    fn retrieve(&self, id: StorageId, timeout_ms: u64) -> Result<Vec<u8>>;

    /// Overwrites `bytes.len()` bytes of a stored record starting at `offset`.
    fn refresh(&self, id: StorageId, offset: usize, bytes: &[u8], timeout_ms: u64) -> Result<()>;

    /// Frees a previously dequeued/retrieved record. Never fails: relinquishing
    /// an already-vacated or unknown ID is a no-op, since the active table may
    /// legitimately ask to vacate a slot it no longer owns (e.g. after a wrap).
    fn relinquish(&self, id: StorageId);
}

pub(crate) fn timeout_to_error(_timeout_ms: u64) -> Error {
    Error::Timeout
}

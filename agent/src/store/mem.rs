/*!
An in-memory reference implementation of [`Store`], backing the engine's own
test suite and serving as the default persistence service for an [`crate::Agent`]
built without an external one. Nothing here ever actually blocks: there is no
other process to wait on, so every `timeout_ms` is honoured as "try
immediately" (RAM never makes you wait).
*/

use super::{Store, StoreHandle, StorageId};
use crate::error::{Error, Result};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

#[derive(Default)]
struct Inner {
    next_handle: u64,
    next_storage_id: u64,
    queues: HashMap<u64, VecDeque<u64>>,
    records: HashMap<u64, Vec<u8>>,
}

/// The in-memory reference [`Store`] adapter.
#[derive(Default)]
pub struct MemStore {
    inner: Mutex<Inner>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for MemStore {
    fn create(&self) -> Result<StoreHandle> {
        let mut inner = self.inner.lock().expect("mem store mutex poisoned");
        let id = inner.next_handle;
        inner.next_handle += 1;
        inner.queues.insert(id, VecDeque::new());
        Ok(StoreHandle(id))
    }

    fn destroy(&self, handle: StoreHandle) {
        let mut inner = self.inner.lock().expect("mem store mutex poisoned");
        if let Some(queue) = inner.queues.remove(&handle.0) {
            for id in queue {
                inner.records.remove(&id);
            }
        }
    }

    fn enqueue(&self, handle: StoreHandle, prolog: &[u8], payload: &[u8], _timeout_ms: u64) -> Result<()> {
        let mut inner = self.inner.lock().expect("mem store mutex poisoned");
        if !inner.queues.contains_key(&handle.0) {
            return Err(Error::InvalidChannel);
        }
        let id = inner.next_storage_id;
        inner.next_storage_id += 1;

        let mut record = Vec::with_capacity(prolog.len() + payload.len());
        record.extend_from_slice(prolog);
        record.extend_from_slice(payload);
        inner.records.insert(id, record);
        inner.queues.get_mut(&handle.0).expect("checked above").push_back(id);
        Ok(())
    }

    fn dequeue(&self, handle: StoreHandle, _timeout_ms: u64) -> Result<Option<(Vec<u8>, StorageId)>> {
        let mut inner = self.inner.lock().expect("mem store mutex poisoned");
        let Some(queue) = inner.queues.get_mut(&handle.0) else {
            return Err(Error::InvalidChannel);
        };
        let Some(id) = queue.pop_front() else {
            return Ok(None);
        };
        let bytes = inner.records.get(&id).cloned().unwrap_or_default();
        Ok(Some((bytes, StorageId(id))))
    }

    fn retrieve(&self, id: StorageId, _timeout_ms: u64) -> Result<Vec<u8>> {
        let inner = self.inner.lock().expect("mem store mutex poisoned");
        inner
            .records
            .get(&id.0)
            .cloned()
            .ok_or_else(|| Error::FailedStore(format!("no such storage id {}", id.0)))
    }

    fn refresh(&self, id: StorageId, offset: usize, bytes: &[u8], _timeout_ms: u64) -> Result<()> {
        let mut inner = self.inner.lock().expect("mem store mutex poisoned");
        let record = inner
            .records
            .get_mut(&id.0)
            .ok_or_else(|| Error::FailedStore(format!("no such storage id {}", id.0)))?;
        if offset + bytes.len() > record.len() {
            return Err(Error::FailedStore("refresh extends past record end".into()));
        }
        record[offset..offset + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    fn relinquish(&self, id: StorageId) {
        let mut inner = self.inner.lock().expect("mem store mutex poisoned");
        inner.records.remove(&id.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_within_a_handle() {
        let store = MemStore::new();
        let h = store.create().unwrap();
        store.enqueue(h, b"a", b"1", 0).unwrap();
        store.enqueue(h, b"b", b"2", 0).unwrap();

        let (first, id1) = store.dequeue(h, 0).unwrap().unwrap();
        assert_eq!(first, b"a1");
        let (second, id2) = store.dequeue(h, 0).unwrap().unwrap();
        assert_eq!(second, b"b2");
        assert_ne!(id1, id2);
        assert!(store.dequeue(h, 0).unwrap().is_none());
    }

    #[test]
    fn independent_handles() {
        let store = MemStore::new();
        let a = store.create().unwrap();
        let b = store.create().unwrap();
        store.enqueue(a, b"", b"only-a", 0).unwrap();
        assert!(store.dequeue(b, 0).unwrap().is_none());
        assert!(store.dequeue(a, 0).unwrap().is_some());
    }

    #[test]
    fn refresh_patches_in_place_and_retrieve_sees_it() {
        let store = MemStore::new();
        let h = store.create().unwrap();
        store.enqueue(h, b"", b"AAAA", 0).unwrap();
        let (_, id) = store.dequeue(h, 0).unwrap().unwrap();
        store.refresh(id, 1, b"BB", 0).unwrap();
        assert_eq!(store.retrieve(id, 0).unwrap(), b"ABBA");
    }

    #[test]
    fn relinquish_frees_the_record() {
        let store = MemStore::new();
        let h = store.create().unwrap();
        store.enqueue(h, b"", b"x", 0).unwrap();
        let (_, id) = store.dequeue(h, 0).unwrap().unwrap();
        store.relinquish(id);
        assert!(store.retrieve(id, 0).is_err());
        // Relinquishing again is a no-op, not an error.
        store.relinquish(id);
    }

    #[test]
    fn destroy_frees_queued_records() {
        let store = MemStore::new();
        let h = store.create().unwrap();
        store.enqueue(h, b"", b"x", 0).unwrap();
        store.destroy(h);
        assert!(store.enqueue(h, b"", b"y", 0).is_err());
    }
}

//! In-memory reference storage.
//!
//! The committed state is an ordered map published through `arc-swap`:
//! readers load the current map without locking, writers clone, apply the
//! batch and publish. Commits serialise on a mutex so two batches never
//! interleave.

use super::{ReadableStorage, Storage, Write, WriteBatch};
use arc_swap::ArcSwap;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

type KeySpace = BTreeMap<Vec<u8>, Vec<u8>>;

/// Ordered in-memory store with snapshot isolation
pub struct MemoryStorage {
    state: ArcSwap<KeySpace>,
    commit_lock: Mutex<()>,
}

impl MemoryStorage {
    pub fn new() -> MemoryStorage {
        MemoryStorage {
            state: ArcSwap::from_pointee(KeySpace::new()),
            commit_lock: Mutex::new(()),
        }
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        MemoryStorage::new()
    }
}

impl Storage for MemoryStorage {
    fn snapshot(&self) -> Arc<dyn ReadableStorage> {
        Arc::new(MemorySnapshot {
            state: self.state.load_full(),
        })
    }

    fn commit(&self, batch: WriteBatch) {
        if batch.is_empty() {
            return;
        }
        let _guard = self.commit_lock.lock();
        let mut next = (**self.state.load()).clone();
        for write in batch.writes {
            match write {
                Write::Put { key, value } => {
                    next.insert(key, value);
                }
                Write::Delete { key } => {
                    next.remove(&key);
                }
            }
        }
        self.state.store(Arc::new(next));
    }
}

/// A pinned view of one committed state
pub struct MemorySnapshot {
    state: Arc<KeySpace>,
}

impl ReadableStorage for MemorySnapshot {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.state.get(key).cloned()
    }

    fn iterate_prefix(&self, prefix: &[u8]) -> Box<dyn Iterator<Item = (Vec<u8>, Vec<u8>)> + '_> {
        let prefix = prefix.to_vec();
        Box::new(
            self.state
                .range::<Vec<u8>, _>((Bound::Included(prefix.clone()), Bound::Unbounded))
                .take_while(move |(k, _)| k.starts_with(&prefix))
                .map(|(k, v)| (k.clone(), v.clone())),
        )
    }

    fn iterate_prefix_from(
        &self,
        prefix: &[u8],
        from: &[u8],
    ) -> Box<dyn Iterator<Item = (Vec<u8>, Vec<u8>)> + '_> {
        let prefix = prefix.to_vec();
        let start = from.max(prefix.as_slice()).to_vec();
        Box::new(
            self.state
                .range::<Vec<u8>, _>((Bound::Included(start), Bound::Unbounded))
                .take_while(move |(k, _)| k.starts_with(&prefix))
                .map(|(k, v)| (k.clone(), v.clone())),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch(writes: Vec<(&[u8], &[u8])>) -> WriteBatch {
        let mut b = WriteBatch::new();
        for (k, v) in writes {
            b.put(k.to_vec(), v.to_vec());
        }
        b
    }

    #[test]
    fn test_snapshot_isolation() {
        let storage = MemoryStorage::new();
        storage.commit(batch(vec![(b"a", b"1")]));

        let before = storage.snapshot();
        storage.commit(batch(vec![(b"a", b"2"), (b"b", b"1")]));
        let after = storage.snapshot();

        assert_eq!(before.get(b"a"), Some(b"1".to_vec()));
        assert_eq!(before.get(b"b"), None);
        assert_eq!(after.get(b"a"), Some(b"2".to_vec()));
        assert_eq!(after.get(b"b"), Some(b"1".to_vec()));
    }

    #[test]
    fn test_prefix_iteration_is_ordered() {
        let storage = MemoryStorage::new();
        storage.commit(batch(vec![
            (b"x\x02", b""),
            (b"x\x01", b""),
            (b"y\x01", b""),
            (b"x\x03", b""),
        ]));
        let snapshot = storage.snapshot();
        let keys: Vec<Vec<u8>> = snapshot.iterate_prefix(b"x").map(|(k, _)| k).collect();
        assert_eq!(keys, vec![b"x\x01".to_vec(), b"x\x02".to_vec(), b"x\x03".to_vec()]);
    }

    #[test]
    fn test_prefix_from_starts_mid_range() {
        let storage = MemoryStorage::new();
        storage.commit(batch(vec![(b"p\x01", b""), (b"p\x05", b""), (b"p\x09", b"")]));
        let snapshot = storage.snapshot();
        let keys: Vec<Vec<u8>> = snapshot
            .iterate_prefix_from(b"p", b"p\x05")
            .map(|(k, _)| k)
            .collect();
        assert_eq!(keys, vec![b"p\x05".to_vec(), b"p\x09".to_vec()]);
    }

    #[test]
    fn test_delete_masks_key() {
        let storage = MemoryStorage::new();
        storage.commit(batch(vec![(b"a", b"1")]));
        let mut b = WriteBatch::new();
        b.delete(b"a".to_vec());
        storage.commit(b);
        assert_eq!(storage.snapshot().get(b"a"), None);
    }
}

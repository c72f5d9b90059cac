//! Layered read view: an in-memory overlay on top of a base snapshot.
//!
//! Overlay entries win over base entries with the same key; deletions in
//! the overlay mask base entries. Merged prefix iteration preserves
//! ascending key order, which the executor's range scans rely on.

use super::ReadableStorage;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

/// Overlay entry: a write or a masking deletion
#[derive(Debug, Clone, PartialEq, Eq)]
enum OverlayEntry {
    Put(Vec<u8>),
    Deleted,
}

/// Mutable key-space delta
#[derive(Debug, Clone, Default)]
pub struct Overlay {
    entries: BTreeMap<Vec<u8>, OverlayEntry>,
}

impl Overlay {
    pub fn new() -> Overlay {
        Overlay::default()
    }

    pub fn put(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.entries.insert(key, OverlayEntry::Put(value));
    }

    pub fn delete(&mut self, key: Vec<u8>) {
        self.entries.insert(key, OverlayEntry::Deleted);
    }

    pub fn get(&self, key: &[u8]) -> Option<Option<&[u8]>> {
        self.entries.get(key).map(|e| match e {
            OverlayEntry::Put(v) => Some(v.as_slice()),
            OverlayEntry::Deleted => None,
        })
    }

    pub fn contains_delete(&self, key: &[u8]) -> bool {
        matches!(self.entries.get(key), Some(OverlayEntry::Deleted))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Drain into a write batch, in key order
    pub fn into_batch(self) -> super::WriteBatch {
        let mut batch = super::WriteBatch::new();
        for (key, entry) in self.entries {
            match entry {
                OverlayEntry::Put(value) => batch.put(key, value),
                OverlayEntry::Deleted => batch.delete(key),
            }
        }
        batch
    }
}

/// Snapshot + overlay, readable as one key space
pub struct OverlayReader {
    base: Arc<dyn ReadableStorage>,
    overlay: Arc<Overlay>,
}

impl OverlayReader {
    pub fn new(base: Arc<dyn ReadableStorage>, overlay: Arc<Overlay>) -> OverlayReader {
        OverlayReader { base, overlay }
    }

    pub fn base(&self) -> &Arc<dyn ReadableStorage> {
        &self.base
    }
}

impl ReadableStorage for OverlayReader {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        match self.overlay.get(key) {
            Some(Some(v)) => Some(v.to_vec()),
            Some(None) => None,
            None => self.base.get(key),
        }
    }

    fn iterate_prefix(&self, prefix: &[u8]) -> Box<dyn Iterator<Item = (Vec<u8>, Vec<u8>)> + '_> {
        self.iterate_prefix_from(prefix, prefix)
    }

    fn iterate_prefix_from(
        &self,
        prefix: &[u8],
        from: &[u8],
    ) -> Box<dyn Iterator<Item = (Vec<u8>, Vec<u8>)> + '_> {
        let prefix_owned = prefix.to_vec();
        let start = from.max(prefix).to_vec();
        let base_iter = self.base.iterate_prefix_from(prefix, &start);
        let overlay_iter = self
            .overlay
            .entries
            .range::<Vec<u8>, _>((Bound::Included(start), Bound::Unbounded))
            .take_while(move |(k, _)| k.starts_with(&prefix_owned))
            .map(|(k, e)| (k.clone(), e.clone()));
        Box::new(MergedIterator {
            base: base_iter.peekable(),
            overlay: overlay_iter.peekable(),
        })
    }
}

/// Ordered merge of base and overlay; overlay wins ties, deletions skip.
struct MergedIterator<B, O>
where
    B: Iterator<Item = (Vec<u8>, Vec<u8>)>,
    O: Iterator<Item = (Vec<u8>, OverlayEntry)>,
{
    base: std::iter::Peekable<B>,
    overlay: std::iter::Peekable<O>,
}

impl<B, O> Iterator for MergedIterator<B, O>
where
    B: Iterator<Item = (Vec<u8>, Vec<u8>)>,
    O: Iterator<Item = (Vec<u8>, OverlayEntry)>,
{
    type Item = (Vec<u8>, Vec<u8>);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let side = match (self.base.peek(), self.overlay.peek()) {
                (None, None) => return None,
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (Some((bk, _)), Some((ok, _))) => bk.cmp(ok),
            };
            match side {
                Ordering::Less => return self.base.next(),
                Ordering::Equal => {
                    // Overlay masks the base entry
                    self.base.next();
                    match self.overlay.next() {
                        Some((k, OverlayEntry::Put(v))) => return Some((k, v)),
                        _ => continue,
                    }
                }
                Ordering::Greater => match self.overlay.next() {
                    Some((k, OverlayEntry::Put(v))) => return Some((k, v)),
                    _ => continue,
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryStorage, Storage, WriteBatch};

    fn base_with(entries: Vec<(&[u8], &[u8])>) -> Arc<dyn ReadableStorage> {
        let storage = MemoryStorage::new();
        let mut batch = WriteBatch::new();
        for (k, v) in entries {
            batch.put(k.to_vec(), v.to_vec());
        }
        storage.commit(batch);
        storage.snapshot()
    }

    #[test]
    fn test_overlay_wins_over_base() {
        let base = base_with(vec![(b"k", b"base")]);
        let mut overlay = Overlay::new();
        overlay.put(b"k".to_vec(), b"overlay".to_vec());
        let reader = OverlayReader::new(base, Arc::new(overlay));
        assert_eq!(reader.get(b"k"), Some(b"overlay".to_vec()));
    }

    #[test]
    fn test_deletion_masks_base() {
        let base = base_with(vec![(b"k", b"base")]);
        let mut overlay = Overlay::new();
        overlay.delete(b"k".to_vec());
        let reader = OverlayReader::new(base, Arc::new(overlay));
        assert_eq!(reader.get(b"k"), None);
        assert_eq!(reader.iterate_prefix(b"k").count(), 0);
    }

    #[test]
    fn test_merged_iteration_is_ordered() {
        let base = base_with(vec![(b"p\x01", b"b1"), (b"p\x04", b"b4")]);
        let mut overlay = Overlay::new();
        overlay.put(b"p\x02".to_vec(), b"o2".to_vec());
        overlay.put(b"p\x04".to_vec(), b"o4".to_vec());
        let reader = OverlayReader::new(base, Arc::new(overlay));

        let merged: Vec<(Vec<u8>, Vec<u8>)> = reader.iterate_prefix(b"p").collect();
        assert_eq!(
            merged,
            vec![
                (b"p\x01".to_vec(), b"b1".to_vec()),
                (b"p\x02".to_vec(), b"o2".to_vec()),
                (b"p\x04".to_vec(), b"o4".to_vec()),
            ]
        );
    }
}

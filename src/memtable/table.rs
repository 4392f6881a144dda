//! MemTable implementation
//!
//! BTreeMap-based memtable guarded by a `parking_lot::RwLock`.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::RwLock;

use super::MemTableEntry;

/// Fixed per-entry bookkeeping overhead counted toward `approximate_bytes`,
/// on top of the raw key/value byte lengths.
const ENTRY_OVERHEAD: usize = 24;

/// In-memory table for recent writes.
///
/// Mutation (`put`/`delete`) never fails except on allocation failure,
/// matching the spec's MemTable invariant: a newer write — including a
/// tombstone — always replaces the prior entry for a key, regardless of the
/// order sequence numbers were handed out in (which can't happen here since
/// the engine assigns sequence numbers while holding its own write lock).
pub struct MemTable {
    data: RwLock<BTreeMap<Vec<u8>, MemTableEntry>>,
    approx_bytes: AtomicUsize,
}

impl MemTable {
    /// Create a new empty MemTable.
    pub fn new() -> Self {
        Self {
            data: RwLock::new(BTreeMap::new()),
            approx_bytes: AtomicUsize::new(0),
        }
    }

    /// Get the current entry for a key, if any (value or tombstone).
    pub fn get(&self, key: &[u8]) -> Option<MemTableEntry> {
        self.data.read().get(key).cloned()
    }

    /// Insert a live value, returning the MemTable's new approximate size.
    pub fn put(&self, key: Vec<u8>, value: Vec<u8>, seq: u64) -> usize {
        let added = key.len() + value.len() + ENTRY_OVERHEAD;
        let entry = MemTableEntry {
            seq,
            value: Some(value),
        };
        self.insert(key, entry, added)
    }

    /// Insert a tombstone, returning the MemTable's new approximate size.
    pub fn delete(&self, key: Vec<u8>, seq: u64) -> usize {
        let added = key.len() + ENTRY_OVERHEAD;
        let entry = MemTableEntry { seq, value: None };
        self.insert(key, entry, added)
    }

    fn insert(&self, key: Vec<u8>, entry: MemTableEntry, added: usize) -> usize {
        let mut map = self.data.write();
        let removed = map
            .get(&key)
            .map(|old| key.len() + old.value.as_ref().map_or(0, |v| v.len()) + ENTRY_OVERHEAD)
            .unwrap_or(0);
        map.insert(key, entry);
        drop(map);

        if added >= removed {
            self.approx_bytes.fetch_add(added - removed, Ordering::SeqCst);
        } else {
            self.approx_bytes.fetch_sub(removed - added, Ordering::SeqCst);
        }
        self.approx_bytes.load(Ordering::SeqCst)
    }

    /// Approximate byte footprint: sum of key+value lengths plus fixed
    /// per-entry overhead.
    pub fn approximate_bytes(&self) -> usize {
        self.approx_bytes.load(Ordering::SeqCst)
    }

    /// Number of live entries, including tombstones.
    pub fn entry_count(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    /// Whether `approximate_bytes` has reached `size_limit`.
    pub fn should_flush(&self, size_limit: usize) -> bool {
        self.approximate_bytes() >= size_limit
    }

    /// Snapshot all entries in sorted key order (for SSTable flush).
    pub fn iter(&self) -> MemTableIterator {
        let entries = self.data.read().iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        MemTableIterator { entries, pos: 0 }
    }

    /// Snapshot entries within `[start, end]` (inclusive both ends), in
    /// sorted key order. Empty (not a panic) if `start > end` —
    /// `BTreeMap::range` panics on an inverted bound, so that case is
    /// short-circuited before it ever reaches the map.
    pub fn scan(&self, start: &[u8], end: &[u8]) -> MemTableIterator {
        if start > end {
            return MemTableIterator { entries: Vec::new(), pos: 0 };
        }
        let entries: Vec<_> = self
            .data
            .read()
            .range((Bound::Included(start.to_vec()), Bound::Included(end.to_vec())))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        MemTableIterator { entries, pos: 0 }
    }

    /// Clear all entries (called after a successful flush).
    pub fn clear(&self) {
        self.data.write().clear();
        self.approx_bytes.store(0, Ordering::SeqCst);
    }

    /// Highest sequence number of any entry currently held, if non-empty.
    pub fn max_seq(&self) -> Option<u64> {
        self.data.read().values().map(|e| e.seq).max()
    }
}

impl Default for MemTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator over a snapshot of MemTable entries in sorted key order.
///
/// Materialized eagerly under a single read-lock acquisition, rather than
/// holding the lock for the lifetime of the iterator — flush and range
/// scans can then proceed while concurrent writers take the write lock.
pub struct MemTableIterator {
    entries: Vec<(Vec<u8>, MemTableEntry)>,
    pos: usize,
}

impl Iterator for MemTableIterator {
    type Item = (Vec<u8>, MemTableEntry);

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.entries.get(self.pos).cloned();
        if item.is_some() {
            self.pos += 1;
        }
        item
    }
}

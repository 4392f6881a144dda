//! Merge iterator
//!
//! Layers the active MemTable, any sealed (flushing) MemTable, and the
//! level-0 SSTable set into a single ordered, deduplicated view over a key
//! range. Implemented with a `BinaryHeap` keyed on `(key, source_priority)`
//! so the next key to yield is always at the top; ties are broken by the
//! lower `source_priority` — `0` for the active MemTable, `1..` for sealed
//! MemTables newest-first, and everything after that for SSTables
//! newest-to-oldest. Tombstones shadow older sources for the same key but
//! are never themselves yielded to the caller.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;
use std::vec::IntoIter;

use crate::error::Result;
use crate::memtable::MemTable;

use super::manager::LiveTable;

struct HeapItem {
    key: Vec<u8>,
    value: Option<Vec<u8>>,
    priority: usize,
    source: usize,
}

impl PartialEq for HeapItem {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.priority == other.priority
    }
}
impl Eq for HeapItem {}

impl PartialOrd for HeapItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapItem {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; reverse key order so the smallest key
        // surfaces first, and reverse priority order so a tie favors the
        // most recent source (the lowest priority number).
        other
            .key
            .cmp(&self.key)
            .then_with(|| other.priority.cmp(&self.priority))
    }
}

/// Ordered, deduplicated view over `[start, end]` across every live source.
pub struct MergeIterator {
    sources: Vec<IntoIter<(Vec<u8>, Option<Vec<u8>>)>>,
    heap: BinaryHeap<HeapItem>,
}

impl MergeIterator {
    pub fn new(
        active: &MemTable,
        sealed: &[Arc<MemTable>],
        tables: &[Arc<LiveTable>],
        start: &[u8],
        end: &[u8],
    ) -> Result<Self> {
        let mut sources: Vec<IntoIter<(Vec<u8>, Option<Vec<u8>>)>> = Vec::new();

        let active_entries: Vec<_> = active
            .scan(start, end)
            .map(|(k, e)| (k, e.value))
            .collect();
        sources.push(active_entries.into_iter());

        for sealed_table in sealed {
            let entries: Vec<_> = sealed_table
                .scan(start, end)
                .map(|(k, e)| (k, e.value))
                .collect();
            sources.push(entries.into_iter());
        }

        for table in tables {
            let entries: Vec<_> = table
                .scan(start, end)?
                .into_iter()
                .map(|(k, v, _seq)| (k, v))
                .collect();
            sources.push(entries.into_iter());
        }

        let mut heap = BinaryHeap::with_capacity(sources.len());
        for (priority, source) in sources.iter_mut().enumerate() {
            if let Some((key, value)) = source.next() {
                heap.push(HeapItem {
                    key,
                    value,
                    priority,
                    source: priority,
                });
            }
        }

        Ok(Self { sources, heap })
    }

    fn refill(&mut self, source: usize, priority: usize) {
        if let Some((key, value)) = self.sources[source].next() {
            self.heap.push(HeapItem {
                key,
                value,
                priority,
                source,
            });
        }
    }
}

impl Iterator for MergeIterator {
    type Item = (Vec<u8>, Vec<u8>);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let winner = self.heap.pop()?;
            self.refill(winner.source, winner.priority);

            while let Some(top) = self.heap.peek() {
                if top.key != winner.key {
                    break;
                }
                let shadowed = self.heap.pop().unwrap();
                self.refill(shadowed.source, shadowed.priority);
            }

            if let Some(value) = winner.value {
                return Some((winner.key, value));
            }
            // Tombstone: this key is deleted, skip it and continue to the
            // next distinct key instead of yielding anything for it.
        }
    }
}

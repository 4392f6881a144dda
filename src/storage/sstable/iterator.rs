//! SSTable Iterator
//!
//! Sequential iteration over a (possibly bounded) run of data blocks,
//! decoding one block at a time.

use std::fs::File;
use std::vec::IntoIter;

use crate::error::Result;

use super::reader::{read_block, IndexEntry};
use super::{decode_block, BlockEntry};

/// Iterator over SSTable entries in sorted key order.
pub struct SSTableIterator<'a> {
    file: &'a mut File,
    blocks: IntoIter<IndexEntry>,
    current: IntoIter<BlockEntry>,
    start: Option<Vec<u8>>,
    end: Option<Vec<u8>>,
    done: bool,
}

impl<'a> SSTableIterator<'a> {
    /// `start`/`end` bound the scan inclusively; `None` means unbounded.
    pub(super) fn new(
        file: &'a mut File,
        index: &[IndexEntry],
        start: Option<Vec<u8>>,
        end: Option<Vec<u8>>,
    ) -> Result<Self> {
        let first_block = match &start {
            Some(key) => {
                let pos = index.partition_point(|e| e.first_key.as_slice() <= key.as_slice());
                pos.saturating_sub(1)
            }
            None => 0,
        };

        let blocks: Vec<IndexEntry> = index[first_block.min(index.len())..].to_vec();

        Ok(Self {
            file,
            blocks: blocks.into_iter(),
            current: Vec::new().into_iter(),
            start,
            end,
            done: false,
        })
    }
}

impl<'a> Iterator for SSTableIterator<'a> {
    /// `(key, value, seq)` — `value` is `None` for a tombstone.
    type Item = Result<(Vec<u8>, Option<Vec<u8>>, u64)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        loop {
            if let Some(entry) = self.current.next() {
                if let Some(start) = &self.start {
                    if entry.key.as_slice() < start.as_slice() {
                        continue;
                    }
                }
                if let Some(end) = &self.end {
                    if entry.key.as_slice() > end.as_slice() {
                        self.done = true;
                        return None;
                    }
                }
                return Some(Ok((entry.key, entry.value, entry.seq)));
            }

            let next_block = self.blocks.next()?;
            let block = match read_block(self.file, next_block.block_offset, next_block.block_len) {
                Ok(b) => b,
                Err(e) => return Some(Err(e)),
            };
            match decode_block(&block) {
                Ok(entries) => self.current = entries.into_iter(),
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

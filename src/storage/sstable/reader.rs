//! SSTable Reader
//!
//! Opens SSTable files and provides key lookups and bounded scans via an
//! in-memory sparse index. Data blocks are read from disk on demand and are
//! not cached across calls.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use crate::error::Result;
use crate::AtlasError;

use super::iterator::SSTableIterator;
use super::{decode_block, FOOTER_SIZE, MAGIC, VERSION};

/// One entry in the in-memory sparse index: the first key of a data block,
/// plus where that block lives on disk.
pub(super) struct IndexEntry {
    pub(super) first_key: Vec<u8>,
    pub(super) block_offset: u64,
    pub(super) block_len: u32,
}

impl Clone for IndexEntry {
    fn clone(&self) -> Self {
        Self {
            first_key: self.first_key.clone(),
            block_offset: self.block_offset,
            block_len: self.block_len,
        }
    }
}

/// Reader for SSTable files.
pub struct SSTableReader {
    pub(super) file: File,
    index: Vec<IndexEntry>,
    entry_count: u64,
    min_key: Vec<u8>,
    max_key: Vec<u8>,
    max_seq: u64,
}

impl SSTableReader {
    /// Open an SSTable for reading.
    ///
    /// Reads the footer and loads the sparse index block eagerly. Since the
    /// footer doesn't carry entry count or key bounds, this also decodes the
    /// first and last data blocks once, up front, to recover them — a
    /// one-time cost at open, not per lookup.
    pub fn open(path: &Path) -> Result<Self> {
        let mut file = File::open(path)?;
        let file_size = file.metadata()?.len();

        if file_size < FOOTER_SIZE {
            return Err(AtlasError::Storage("sstable file shorter than footer".into()));
        }

        file.seek(SeekFrom::Start(file_size - FOOTER_SIZE))?;
        let mut footer = [0u8; FOOTER_SIZE as usize];
        file.read_exact(&mut footer)?;

        let index_offset = u64::from_le_bytes(footer[0..8].try_into().unwrap());
        let index_len = u32::from_le_bytes(footer[8..12].try_into().unwrap()) as usize;
        let magic = u64::from_le_bytes(footer[12..20].try_into().unwrap());
        let version = u32::from_le_bytes(footer[20..24].try_into().unwrap());

        if magic != MAGIC {
            return Err(AtlasError::Storage(format!("invalid sstable magic: {magic:#x}")));
        }
        if version != VERSION {
            return Err(AtlasError::Storage(format!("unsupported sstable version: {version}")));
        }

        file.seek(SeekFrom::Start(index_offset))?;
        let mut index_bytes = vec![0u8; index_len];
        file.read_exact(&mut index_bytes)?;

        let mut index = Vec::new();
        let mut pos = 0usize;
        while pos < index_bytes.len() {
            if pos + 4 > index_bytes.len() {
                return Err(AtlasError::Corruption("sstable index entry truncated".into()));
            }
            let key_len = u32::from_le_bytes(index_bytes[pos..pos + 4].try_into().unwrap()) as usize;
            pos += 4;
            if pos + key_len + 12 > index_bytes.len() {
                return Err(AtlasError::Corruption("sstable index entry truncated".into()));
            }
            let first_key = index_bytes[pos..pos + key_len].to_vec();
            pos += key_len;
            let block_offset = u64::from_le_bytes(index_bytes[pos..pos + 8].try_into().unwrap());
            pos += 8;
            let block_len = u32::from_le_bytes(index_bytes[pos..pos + 4].try_into().unwrap());
            pos += 4;
            index.push(IndexEntry {
                first_key,
                block_offset,
                block_len,
            });
        }

        let min_key = index.first().map(|e| e.first_key.clone()).unwrap_or_default();
        let (entry_count, max_key, max_seq) = if index.is_empty() {
            (0, Vec::new(), 0)
        } else {
            let mut total = 0u64;
            let mut max_seq = 0u64;
            let mut last_block_entries = Vec::new();
            for (i, entry) in index.iter().enumerate() {
                let block = read_block(&mut file, entry.block_offset, entry.block_len)?;
                let decoded = decode_block(&block)?;
                max_seq = decoded.iter().fold(max_seq, |acc, e| acc.max(e.seq));
                if i == index.len() - 1 {
                    last_block_entries = decoded;
                    total += last_block_entries.len() as u64;
                } else {
                    total += decoded.len() as u64;
                }
            }
            let max_key = last_block_entries
                .last()
                .map(|e| e.key.clone())
                .unwrap_or_default();
            (total, max_key, max_seq)
        };

        Ok(Self {
            file,
            index,
            entry_count,
            min_key,
            max_key,
            max_seq,
        })
    }

    /// Get a value by key.
    ///
    /// Returns:
    /// - `Ok(Some(value))` — key found with a live value
    /// - `Ok(None)` — key found but is a tombstone (deleted)
    /// - `Err(KeyNotFound)` — key not present in this table
    pub fn get(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        if self.index.is_empty() {
            return Err(AtlasError::KeyNotFound);
        }
        let idx = match self
            .index
            .partition_point(|e| e.first_key.as_slice() <= key)
        {
            0 => return Err(AtlasError::KeyNotFound),
            n => n - 1,
        };

        let entry = &self.index[idx];
        let block = read_block(&mut self.file, entry.block_offset, entry.block_len)?;
        let decoded = decode_block(&block)?;

        for e in decoded {
            if e.key == key {
                return Ok(e.value);
            }
        }
        Err(AtlasError::KeyNotFound)
    }

    pub fn entry_count(&self) -> u64 {
        self.entry_count
    }

    pub fn min_key(&self) -> &[u8] {
        &self.min_key
    }

    pub fn max_key(&self) -> &[u8] {
        &self.max_key
    }

    pub fn max_seq(&self) -> u64 {
        self.max_seq
    }

    /// Cheap range check: `false` only if `key` is definitely outside
    /// `[min_key, max_key]`.
    pub fn might_contain(&self, key: &[u8]) -> bool {
        if self.index.is_empty() {
            return false;
        }
        key >= self.min_key.as_slice() && key <= self.max_key.as_slice()
    }

    /// Iterate over every entry in the table, in sorted key order.
    pub fn iter(&mut self) -> Result<SSTableIterator<'_>> {
        SSTableIterator::new(&mut self.file, &self.index, None, None)
    }

    /// Iterate over entries within `[start, end]` (inclusive), in sorted
    /// key order. Positions at the block that may contain `start`.
    pub fn scan(&mut self, start: &[u8], end: &[u8]) -> Result<SSTableIterator<'_>> {
        SSTableIterator::new(&mut self.file, &self.index, Some(start.to_vec()), Some(end.to_vec()))
    }
}

pub(super) fn read_block(file: &mut File, offset: u64, len: u32) -> Result<Vec<u8>> {
    file.seek(SeekFrom::Start(offset))?;
    let mut buf = vec![0u8; len as usize];
    file.read_exact(&mut buf)?;
    Ok(buf)
}

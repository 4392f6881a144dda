//! SSTable Builder
//!
//! Consumes an already-sorted, already-deduplicated stream of entries and
//! writes data blocks with restart-prefix key compression, followed by the
//! index block and footer. Rejects out-of-order or duplicate keys — that's
//! a programmer error, never a runtime condition.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::codec::RecordType;
use crate::error::Result;
use crate::AtlasError;

use super::{SSTable, ENTRY_HEADER_SIZE, MAGIC, VERSION};

const DEFAULT_BLOCK_SIZE: usize = 4 * 1024;
const DEFAULT_RESTART_INTERVAL: usize = 16;

/// Builder for creating new SSTables from sorted entries.
pub struct SSTableBuilder {
    path: PathBuf,
    writer: BufWriter<File>,
    block_size_target: usize,
    restart_interval: usize,

    current_block: Vec<u8>,
    restart_offsets: Vec<u32>,
    entries_since_restart: usize,
    last_key: Vec<u8>,
    block_first_key: Option<Vec<u8>>,

    current_offset: u64,
    index: Vec<(Vec<u8>, u64, u32)>,

    entry_count: u64,
    min_key: Option<Vec<u8>>,
    max_key: Option<Vec<u8>>,
    max_seq: u64,
    last_written_key: Option<Vec<u8>>,
}

impl SSTableBuilder {
    /// Create a builder using the default block size (4 KiB) and restart
    /// interval (16 entries).
    pub fn new(path: &Path) -> Result<Self> {
        Self::with_options(path, DEFAULT_BLOCK_SIZE, DEFAULT_RESTART_INTERVAL)
    }

    pub fn with_options(path: &Path, block_size_target: usize, restart_interval: usize) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;

        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
            block_size_target,
            restart_interval: restart_interval.max(1),
            current_block: Vec::new(),
            restart_offsets: Vec::new(),
            entries_since_restart: 0,
            last_key: Vec::new(),
            block_first_key: None,
            current_offset: 0,
            index: Vec::new(),
            entry_count: 0,
            min_key: None,
            max_key: None,
            max_seq: 0,
            last_written_key: None,
        })
    }

    /// Add a live key-value pair. Must be called in strictly increasing key order.
    pub fn add(&mut self, key: &[u8], value: &[u8], seq: u64) -> Result<()> {
        self.write_entry(key, Some(value), seq)
    }

    /// Add a tombstone. Must be called in strictly increasing key order.
    pub fn add_tombstone(&mut self, key: &[u8], seq: u64) -> Result<()> {
        self.write_entry(key, None, seq)
    }

    fn write_entry(&mut self, key: &[u8], value: Option<&[u8]>, seq: u64) -> Result<()> {
        if let Some(last) = &self.last_written_key {
            if key <= last.as_slice() {
                return Err(AtlasError::Storage(format!(
                    "out-of-order or duplicate key passed to SSTableBuilder: {key:?}"
                )));
            }
        }

        if self.block_first_key.is_none() {
            self.block_first_key = Some(key.to_vec());
        }

        let is_restart =
            self.entries_since_restart == 0 || self.entries_since_restart >= self.restart_interval;
        let shared = if is_restart {
            0
        } else {
            common_prefix_len(&self.last_key, key)
        };
        let unshared = &key[shared..];

        if is_restart {
            self.restart_offsets.push(self.current_block.len() as u32);
            self.entries_since_restart = 0;
        }

        let record_type = if value.is_some() { RecordType::Put } else { RecordType::Delete };
        let value_len = value.map_or(0, |v| v.len()) as u32;

        self.current_block.extend_from_slice(&(shared as u16).to_le_bytes());
        self.current_block.extend_from_slice(&(unshared.len() as u16).to_le_bytes());
        self.current_block.extend_from_slice(&value_len.to_le_bytes());
        self.current_block.push(record_type as u8);
        self.current_block.extend_from_slice(&seq.to_le_bytes());
        self.current_block.extend_from_slice(unshared);
        if let Some(v) = value {
            self.current_block.extend_from_slice(v);
        }

        self.entries_since_restart += 1;
        self.last_key = key.to_vec();
        self.last_written_key = Some(key.to_vec());
        self.entry_count += 1;
        if self.min_key.is_none() {
            self.min_key = Some(key.to_vec());
        }
        self.max_key = Some(key.to_vec());
        self.max_seq = self.max_seq.max(seq);

        if self.current_block.len() >= self.block_size_target {
            self.flush_block()?;
        }

        Ok(())
    }

    fn flush_block(&mut self) -> Result<()> {
        if self.current_block.is_empty() {
            return Ok(());
        }

        let block_offset = self.current_offset;
        self.writer.write_all(&self.current_block)?;
        for off in &self.restart_offsets {
            self.writer.write_all(&off.to_le_bytes())?;
        }
        self.writer
            .write_all(&(self.restart_offsets.len() as u32).to_le_bytes())?;

        let block_len = self.current_block.len() as u64 + self.restart_offsets.len() as u64 * 4 + 4;
        self.index.push((
            self.block_first_key.take().expect("block with entries has a first key"),
            block_offset,
            block_len as u32,
        ));
        self.current_offset += block_len;

        self.current_block.clear();
        self.restart_offsets.clear();
        self.entries_since_restart = 0;
        self.last_key.clear();

        Ok(())
    }

    /// Finish building: flush the final partial block, write the index
    /// block and footer, fsync, and return the table's metadata.
    pub fn finish(mut self) -> Result<SSTable> {
        self.flush_block()?;

        let index_offset = self.current_offset;
        let mut index_len: u64 = 0;
        for (key, offset, len) in &self.index {
            self.writer.write_all(&(key.len() as u32).to_le_bytes())?;
            self.writer.write_all(key)?;
            self.writer.write_all(&offset.to_le_bytes())?;
            self.writer.write_all(&len.to_le_bytes())?;
            index_len += 4 + key.len() as u64 + 8 + 4;
        }

        self.writer.write_all(&index_offset.to_le_bytes())?;
        self.writer.write_all(&(index_len as u32).to_le_bytes())?;
        self.writer.write_all(&MAGIC.to_le_bytes())?;
        self.writer.write_all(&VERSION.to_le_bytes())?;

        self.writer.flush()?;
        let file = self
            .writer
            .into_inner()
            .map_err(|e| AtlasError::Storage(format!("failed to flush sstable: {e}")))?;
        file.sync_all()?;
        let file_size = file.metadata()?.len();

        Ok(SSTable {
            path: self.path,
            entry_count: self.entry_count,
            min_key: self.min_key.unwrap_or_default(),
            max_key: self.max_key.unwrap_or_default(),
            max_seq: self.max_seq,
            file_size,
        })
    }
}

fn common_prefix_len(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b.iter()).take_while(|(x, y)| x == y).count()
}

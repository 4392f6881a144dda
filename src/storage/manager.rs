//! Storage Manager
//!
//! Owns the level-0 set: the newest-first ordered list of on-disk SSTables
//! produced by MemTable flushes. Lookups probe them newest-first; the first
//! matching key (value or tombstone) wins. Installation after a flush is
//! guarded by a lock held only for the swap — readers already in the set
//! are immutable and may be read concurrently without it.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::error::Result;
use crate::memtable::MemTable;
use crate::AtlasError;

use super::sstable::{SSTableBuilder, SSTableReader};
use super::SSTable;

/// One SSTable live in the level-0 set: its metadata plus a reader guarded
/// by a mutex (reads seek a shared file handle, so access is serialized,
/// but each lookup's critical section is a handful of disk reads).
pub struct LiveTable {
    pub meta: SSTable,
    reader: Mutex<SSTableReader>,
}

/// Manages the on-disk storage layer: the level-0 SSTable set.
pub struct StorageManager {
    data_dir: PathBuf,
    block_size: usize,
    restart_interval: usize,
    tables: RwLock<Vec<Arc<LiveTable>>>,
    next_create_seq: AtomicU64,
}

fn sstable_filename(create_seq: u64) -> String {
    format!("sst-{create_seq}.sst")
}

fn parse_create_seq(file_name: &str) -> Option<u64> {
    file_name
        .strip_prefix("sst-")
        .and_then(|rest| rest.strip_suffix(".sst"))
        .and_then(|seq| seq.parse().ok())
}

impl StorageManager {
    /// Open (or create) the storage directory, loading any existing
    /// SSTables newest-first by `createSeq`.
    pub fn open(path: &Path) -> Result<Self> {
        Self::with_options(path, 4 * 1024, 16)
    }

    pub fn with_options(path: &Path, block_size: usize, restart_interval: usize) -> Result<Self> {
        fs::create_dir_all(path)?;

        let mut discovered: Vec<(u64, PathBuf)> = Vec::new();
        for entry in fs::read_dir(path)? {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if let Some(seq) = parse_create_seq(&name) {
                discovered.push((seq, entry.path()));
            }
        }
        discovered.sort_by(|a, b| b.0.cmp(&a.0));

        let mut max_seq = 0u64;
        let mut tables = Vec::with_capacity(discovered.len());
        for (seq, file_path) in discovered {
            max_seq = max_seq.max(seq);
            let file_size = fs::metadata(&file_path)?.len();
            let reader = SSTableReader::open(&file_path)?;
            let meta = SSTable {
                path: file_path,
                entry_count: reader.entry_count(),
                min_key: reader.min_key().to_vec(),
                max_key: reader.max_key().to_vec(),
                max_seq: reader.max_seq(),
                file_size,
            };
            tables.push(Arc::new(LiveTable {
                meta,
                reader: Mutex::new(reader),
            }));
        }

        Ok(Self {
            data_dir: path.to_path_buf(),
            block_size,
            restart_interval,
            tables: RwLock::new(tables),
            next_create_seq: AtomicU64::new(max_seq.wrapping_add(1)),
        })
    }

    /// Look up a key across the level-0 set, newest-first.
    ///
    /// Returns `Ok(Some(value))` for a live hit, `Ok(None)` for a
    /// tombstone hit (the key was deleted), `Err(KeyNotFound)` if no table
    /// has ever seen this key.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let tables = self.tables.read();
        for table in tables.iter() {
            if !table.meta.might_contain(key) {
                continue;
            }
            let mut reader = table.reader.lock();
            match reader.get(key) {
                Ok(value) => return Ok(value),
                Err(AtlasError::KeyNotFound) => continue,
                Err(e) => return Err(e),
            }
        }
        Err(AtlasError::KeyNotFound)
    }

    /// Flush a sealed MemTable to a new SSTable and install it at the
    /// newest position of the level-0 set.
    ///
    /// `create_seq` names the file (`sst-<createSeq>.sst`) and must be
    /// strictly greater than any previously flushed table's — the caller
    /// (the engine) passes the highest sequence number observed in
    /// `memtable`.
    pub fn flush(&self, memtable: &MemTable, create_seq: u64) -> Result<Arc<SSTable>> {
        let path = self.data_dir.join(sstable_filename(create_seq));
        let mut builder = SSTableBuilder::with_options(&path, self.block_size, self.restart_interval)?;

        for (key, entry) in memtable.iter() {
            match entry.value {
                Some(value) => builder.add(&key, &value, entry.seq)?,
                None => builder.add_tombstone(&key, entry.seq)?,
            }
        }

        let meta = builder.finish()?;
        let reader = SSTableReader::open(&path)?;
        let live = Arc::new(LiveTable {
            meta: meta.clone(),
            reader: Mutex::new(reader),
        });

        let mut tables = self.tables.write();
        tables.insert(0, live);
        drop(tables);

        self.next_create_seq.fetch_max(create_seq + 1, Ordering::SeqCst);
        Ok(Arc::new(meta))
    }

    /// Metadata for every table in the level-0 set, newest-first.
    pub fn sstables(&self) -> Vec<SSTable> {
        self.tables.read().iter().map(|t| t.meta.clone()).collect()
    }

    /// Readers for every table in the level-0 set, newest-first — used by
    /// the merge iterator to build a range scan.
    pub fn readers(&self) -> Vec<Arc<LiveTable>> {
        self.tables.read().clone()
    }

    pub fn table_count(&self) -> usize {
        self.tables.read().len()
    }

    /// Highest sequence number observed across every table in the level-0
    /// set, used by the engine to seed its sequence counter on startup.
    pub fn max_seq(&self) -> u64 {
        self.tables.read().iter().map(|t| t.meta.max_seq).max().unwrap_or(0)
    }

    /// Next `createSeq` a new SSTable should use if the caller can't derive
    /// one itself (e.g. an empty flush). Monotonic across the manager's
    /// lifetime.
    pub fn allocate_create_seq(&self) -> u64 {
        self.next_create_seq.fetch_add(1, Ordering::SeqCst)
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}

impl LiveTable {
    /// Read a value directly from this table, bypassing the level-0 probe
    /// order — used by the merge iterator, which already knows which
    /// tables are in play.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.reader.lock().get(key)
    }

    pub fn scan(&self, start: &[u8], end: &[u8]) -> Result<Vec<(Vec<u8>, Option<Vec<u8>>, u64)>> {
        let mut reader = self.reader.lock();
        let iter = reader.scan(start, end)?;
        iter.collect()
    }
}

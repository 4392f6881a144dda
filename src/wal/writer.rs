//! WAL Writer
//!
//! Handles appending entries to the current epoch's WAL file.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::config::WalSyncStrategy;
use crate::error::Result;

use super::{Operation, WalEntry};

/// Writes entries to a single WAL epoch file.
///
/// The sequence number of each entry is assigned by the caller (the engine
/// owns the process-wide sequence counter) — the writer only frames and
/// appends.
pub struct WalWriter {
    /// Path of the epoch file currently being written
    path: PathBuf,

    /// Buffered file writer for performance (batches writes)
    file: BufWriter<File>,

    /// How aggressively to sync to disk
    sync_strategy: WalSyncStrategy,

    /// Whether there are buffered bytes not yet fsynced
    dirty: bool,

    /// Byte offset the next append will land at
    offset: u64,
}

impl WalWriter {
    /// Create (truncating) a new epoch file for writing.
    pub fn create(path: &Path, sync_strategy: WalSyncStrategy) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;

        Ok(WalWriter {
            path: path.to_path_buf(),
            file: BufWriter::new(file),
            sync_strategy,
            dirty: false,
            offset: 0,
        })
    }

    /// Append an operation under the given sequence number.
    ///
    /// Returns the byte offset the record was written at.
    pub fn append(&mut self, seq: u64, operation: Operation) -> Result<u64> {
        let entry = WalEntry::new(seq, operation);
        let bytes = entry.to_record().encode();

        let offset = self.offset;
        self.file.write_all(&bytes)?;
        self.offset += bytes.len() as u64;
        self.dirty = true;

        if matches!(self.sync_strategy, WalSyncStrategy::EveryWrite) {
            self.sync()?;
        }

        Ok(offset)
    }

    /// Force sync to disk (flush buffer + fsync). No-op if nothing is
    /// buffered since the last sync.
    pub fn sync(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        self.file.flush()?;
        self.file.get_ref().sync_all()?;
        self.dirty = false;
        Ok(())
    }

    /// The sync policy this writer was opened with.
    pub fn sync_strategy(&self) -> WalSyncStrategy {
        self.sync_strategy
    }

    /// Path of the epoch file currently open.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current write offset (== file length).
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Seal the current epoch and start a fresh one at `new_path`.
    ///
    /// The caller is responsible for deleting the old epoch file once it is
    /// no longer needed for recovery (i.e. once its entries are durable in
    /// an SSTable).
    pub fn rotate(&mut self, new_path: &Path) -> Result<()> {
        self.sync()?;
        *self = WalWriter::create(new_path, self.sync_strategy)?;
        Ok(())
    }
}

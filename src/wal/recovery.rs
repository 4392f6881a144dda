//! WAL Recovery
//!
//! Handles crash recovery by replaying a WAL epoch file end-to-end.

use std::fs::OpenOptions;
use std::path::Path;

use crate::error::Result;

use super::{WalEntry, WalReader};

/// Handles WAL recovery after crash.
pub struct WalRecovery;

/// Result of a recovery operation.
#[derive(Debug, Default, Clone, Copy)]
pub struct RecoveryResult {
    /// Number of entries successfully recovered
    pub entries_recovered: u64,

    /// Highest sequence number observed (0 if no entries)
    pub max_seq: u64,

    /// Whether the file was truncated to drop a torn tail write
    pub was_truncated: bool,
}

impl WalRecovery {
    /// Recover entries from a WAL epoch file.
    ///
    /// Reads all valid entries in order, truncates the file at the end of
    /// the valid prefix if a torn tail write or CRC mismatch was found, and
    /// returns the entries plus recovery stats.
    pub fn recover(path: &Path) -> Result<(Vec<WalEntry>, RecoveryResult)> {
        let reader = WalReader::open(path)?;
        let file_len = std::fs::metadata(path)?.len();

        let mut entries = Vec::new();
        let mut result = RecoveryResult::default();

        let mut reader = reader;
        loop {
            match reader.next_entry()? {
                Some(entry) => {
                    result.max_seq = result.max_seq.max(entry.seq);
                    result.entries_recovered += 1;
                    entries.push(entry);
                }
                None => break,
            }
        }

        let valid_len = reader.valid_len();
        if valid_len < file_len {
            result.was_truncated = true;
            let file = OpenOptions::new().write(true).open(path)?;
            file.set_len(valid_len)?;
        }

        Ok((entries, result))
    }

    /// Verify the integrity of a WAL file without modifying it.
    pub fn verify(path: &Path) -> Result<RecoveryResult> {
        let mut reader = WalReader::open(path)?;
        let file_len = std::fs::metadata(path)?.len();
        let mut result = RecoveryResult::default();

        while let Some(entry) = reader.next_entry()? {
            result.max_seq = result.max_seq.max(entry.seq);
            result.entries_recovered += 1;
        }

        result.was_truncated = reader.valid_len() < file_len;
        Ok(result)
    }
}

//! WAL Reader
//!
//! Handles reading entries from a WAL epoch file sequentially.
//!
//! Used during recovery to replay entries from the WAL back into the
//! MemTable. Stops cleanly — without returning an error — on a short read
//! (a torn write at the tail) or a CRC mismatch, since both indicate the
//! process crashed mid-append rather than that the log is corrupt.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::codec::Record;
use crate::error::Result;

use super::WalEntry;

/// Reads entries from a WAL epoch file sequentially.
pub struct WalReader {
    file: File,
    position: u64,
    file_size: u64,
}

impl WalReader {
    /// Open a WAL file for reading.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let file_size = file.metadata()?.len();

        Ok(Self {
            file,
            position: 0,
            file_size,
        })
    }

    /// Read the next entry from the WAL.
    ///
    /// Returns:
    /// - `Ok(Some(entry))` — successfully read an entry
    /// - `Ok(None)` — reached EOF, a torn tail write, or a CRC mismatch;
    ///   all three stop replay cleanly rather than propagate an error
    pub fn next_entry(&mut self) -> Result<Option<WalEntry>> {
        let mut len_buf = [0u8; 4];
        if self.position + 4 > self.file_size {
            return Ok(None);
        }
        if self.file.read_exact(&mut len_buf).is_err() {
            return Ok(None);
        }
        let len = u32::from_le_bytes(len_buf) as u64;

        if self.position + 4 + len > self.file_size {
            // Torn write at the tail — stop cleanly.
            return Ok(None);
        }

        let mut body = vec![0u8; len as usize];
        if self.file.read_exact(&mut body).is_err() {
            return Ok(None);
        }

        let mut frame = Vec::with_capacity(4 + body.len());
        frame.extend_from_slice(&len_buf);
        frame.extend_from_slice(&body);

        let record = match Record::decode_frame(&frame) {
            Ok(r) => r,
            Err(_) => {
                // CRC mismatch or malformed body — treat as end of log.
                return Ok(None);
            }
        };

        self.position += 4 + len;
        Ok(Some(WalEntry::from_record(record)))
    }

    /// Consume the reader and return an iterator over all valid entries.
    pub fn entries(self) -> WalIterator {
        WalIterator { reader: self }
    }

    /// Byte offset of the last entry successfully read — the end of the
    /// valid, replayable prefix of the file.
    pub fn valid_len(&self) -> u64 {
        self.position
    }
}

/// Iterator over WAL entries.
pub struct WalIterator {
    reader: WalReader,
}

impl Iterator for WalIterator {
    type Item = Result<WalEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.reader.next_entry() {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

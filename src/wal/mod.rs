//! Write-Ahead Log (WAL) Module
//!
//! Provides durability guarantees through per-epoch append-only logging.
//!
//! ## Responsibilities
//! - Append log entries before any mutation
//! - CRC32 checksums for corruption detection
//! - Sequence numbers for ordering (assigned by the engine, not the WAL)
//! - Crash recovery and replay
//!
//! ## File Format
//!
//! Each epoch is one file named `wal-<epoch>.log`. Records use the framing
//! from [`crate::codec`]:
//!
//! ```text
//! [len:u32][crc32:u32][type:u8][seq:u64][key_len:u32][key][value_len:u32][value]
//! ```

mod entry;
mod reader;
mod recovery;
mod writer;

pub use entry::{Operation, WalEntry};
pub use reader::{WalIterator, WalReader};
pub use recovery::{RecoveryResult, WalRecovery};
pub use writer::WalWriter;

/// Filename for a WAL epoch, per the on-disk layout in the spec.
pub fn epoch_filename(epoch: u64) -> String {
    format!("wal-{epoch}.log")
}

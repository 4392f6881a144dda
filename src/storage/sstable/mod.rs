//! SSTable Module
//!
//! Sorted String Table — immutable on-disk sorted key-value storage,
//! organized into fixed-target-size data blocks with restart-prefix key
//! compression, a sparse index block, and a fixed-size footer.
//!
//! ## File Format
//! ```text
//! [data block 0][data block 1]...[data block N][index block][footer]
//! ```
//!
//! A data block is `[entry...][restart_offsets: u32...][restart_count: u32]`.
//! Each entry is:
//!
//! ```text
//! [shared_prefix_len:u16][unshared_len:u16][value_len:u32][type:u8][seq:u64]
//! [unshared_key_bytes][value_bytes]
//! ```
//!
//! Every `restart_interval` entries, `shared_prefix_len` resets to 0 (a
//! "restart point") so the block can be scanned without replaying every
//! prior entry from the start. `value_bytes` is omitted entirely for a
//! `Delete` entry.
//!
//! The index block holds one entry per data block:
//! `[first_key_len:u32][first_key][block_offset:u64][block_len:u32]`.
//!
//! The footer is a fixed 24 bytes: `[index_offset:u64][index_len:u32]`
//! `[magic:u64][format_version:u32]`.

mod builder;
mod iterator;
mod reader;

use std::path::PathBuf;

pub use builder::SSTableBuilder;
pub use iterator::SSTableIterator;
pub use reader::SSTableReader;

use crate::codec::RecordType;
use crate::error::{AtlasError, Result};

/// Magic identifying an SSTable footer (ASCII "ATLASKV1").
pub(crate) const MAGIC: u64 = 0x4154_4C41_534B_5631;

/// Current SSTable format version.
pub(crate) const VERSION: u32 = 1;

/// Footer size: index_offset(8) + index_len(4) + magic(8) + version(4).
pub(crate) const FOOTER_SIZE: u64 = 24;

/// Fixed portion of a data-block entry header: shared(2) + unshared(2) +
/// value_len(4) + type(1) + seq(8).
pub(crate) const ENTRY_HEADER_SIZE: usize = 2 + 2 + 4 + 1 + 8;

/// One decoded data-block entry.
pub(crate) struct BlockEntry {
    pub key: Vec<u8>,
    pub record_type: RecordType,
    pub seq: u64,
    pub value: Option<Vec<u8>>,
}

/// Decode a raw data block (entries plus trailing restart array) into its
/// entries, in the order they were written.
pub(crate) fn decode_block(data: &[u8]) -> Result<Vec<BlockEntry>> {
    if data.len() < 4 {
        return Err(AtlasError::Corruption("sstable block shorter than restart count".into()));
    }
    let count = u32::from_le_bytes(data[data.len() - 4..].try_into().unwrap()) as usize;
    let restarts_len = count * 4;
    if data.len() < 4 + restarts_len {
        return Err(AtlasError::Corruption("sstable block restart array truncated".into()));
    }
    let entries_end = data.len() - 4 - restarts_len;
    let entries = &data[..entries_end];

    let mut out = Vec::new();
    let mut cursor = 0usize;
    let mut last_key: Vec<u8> = Vec::new();

    while cursor < entries.len() {
        if cursor + ENTRY_HEADER_SIZE > entries.len() {
            return Err(AtlasError::Corruption("sstable entry header truncated".into()));
        }
        let shared = u16::from_le_bytes(entries[cursor..cursor + 2].try_into().unwrap()) as usize;
        let unshared_len =
            u16::from_le_bytes(entries[cursor + 2..cursor + 4].try_into().unwrap()) as usize;
        let value_len =
            u32::from_le_bytes(entries[cursor + 4..cursor + 8].try_into().unwrap()) as usize;
        let record_type = RecordType::from_u8(entries[cursor + 8])?;
        let seq = u64::from_le_bytes(entries[cursor + 9..cursor + 17].try_into().unwrap());
        cursor += ENTRY_HEADER_SIZE;

        if shared > last_key.len() {
            return Err(AtlasError::Corruption(
                "sstable shared prefix exceeds previous key length".into(),
            ));
        }
        if cursor + unshared_len > entries.len() {
            return Err(AtlasError::Corruption("sstable key bytes truncated".into()));
        }
        let mut key = Vec::with_capacity(shared + unshared_len);
        key.extend_from_slice(&last_key[..shared]);
        key.extend_from_slice(&entries[cursor..cursor + unshared_len]);
        cursor += unshared_len;

        let value = match record_type {
            RecordType::Put => {
                if cursor + value_len > entries.len() {
                    return Err(AtlasError::Corruption("sstable value bytes truncated".into()));
                }
                let v = entries[cursor..cursor + value_len].to_vec();
                cursor += value_len;
                Some(v)
            }
            RecordType::Delete => None,
        };

        last_key = key.clone();
        out.push(BlockEntry {
            key,
            record_type,
            seq,
            value,
        });
    }

    Ok(out)
}

/// SSTable metadata — a lightweight handle describing a closed, on-disk
/// table without keeping its reader (and index) resident.
#[derive(Debug, Clone)]
pub struct SSTable {
    /// Path to the SSTable file.
    pub path: PathBuf,
    /// Number of entries in this SSTable (live values and tombstones).
    pub entry_count: u64,
    /// Smallest key.
    pub min_key: Vec<u8>,
    /// Largest key.
    pub max_key: Vec<u8>,
    /// Highest sequence number of any entry written into this table.
    pub max_seq: u64,
    /// File size in bytes.
    pub file_size: u64,
}

impl SSTable {
    pub fn entry_count(&self) -> u64 {
        self.entry_count
    }

    /// Cheap range check: `false` only if `key` is definitely outside
    /// `[min_key, max_key]`.
    pub fn might_contain(&self, key: &[u8]) -> bool {
        key >= self.min_key.as_slice() && key <= self.max_key.as_slice()
    }
}

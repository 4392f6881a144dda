//! WAL Entry definitions
//!
//! Defines the structure of individual WAL log entries, layered over the
//! shared [`crate::codec::Record`] framing.

use crate::codec::{Record, RecordType};

/// The mutation a WAL entry replays into the MemTable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// Put a key-value pair
    Put { key: Vec<u8>, value: Vec<u8> },

    /// Delete a key
    Delete { key: Vec<u8> },
}

impl Operation {
    pub fn key(&self) -> &[u8] {
        match self {
            Operation::Put { key, .. } => key,
            Operation::Delete { key } => key,
        }
    }
}

/// A single entry in the WAL: a sequence number paired with the operation
/// it replays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalEntry {
    /// Sequence number assigned by the engine — monotonically increasing.
    pub seq: u64,

    /// The operation to perform on replay.
    pub operation: Operation,
}

impl WalEntry {
    pub fn new(seq: u64, operation: Operation) -> Self {
        Self { seq, operation }
    }

    pub(super) fn to_record(&self) -> Record {
        match &self.operation {
            Operation::Put { key, value } => Record::put(self.seq, key.clone(), value.clone()),
            Operation::Delete { key } => Record::delete(self.seq, key.clone()),
        }
    }

    pub(super) fn from_record(record: Record) -> Self {
        let operation = match record.record_type {
            RecordType::Put => Operation::Put {
                key: record.key,
                value: record.value,
            },
            RecordType::Delete => Operation::Delete { key: record.key },
        };
        Self {
            seq: record.seq,
            operation,
        }
    }
}

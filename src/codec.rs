//! Record codec
//!
//! Frames and unframes the mutation record shared by the WAL and the
//! replication wire protocol:
//!
//! ```text
//! [len: u32 LE][crc32: u32 LE][type: u8][seq: u64 LE][key_len: u32 LE][key]
//! [value_len: u32 LE][value]
//! ```
//!
//! `len` excludes itself and covers everything from `crc32` onward. `crc32`
//! covers everything after itself (type through value). A `PUT` carries a
//! value; a `DELETE` has `value_len = 0` and no value bytes.
//!
//! The on-disk maximums in the spec (key ≤ 64 KiB, value ≤ 4 MiB) are
//! enforced by callers via [`validate_entry`], not by the codec itself —
//! the codec's job is framing, not policy.

use crate::error::{AtlasError, Result};

/// Maximum key length, in bytes.
pub const MAX_KEY_LEN: usize = 64 * 1024;
/// Maximum value length, in bytes.
pub const MAX_VALUE_LEN: usize = 4 * 1024 * 1024;

/// Record type discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordType {
    Put = 1,
    Delete = 2,
}

impl RecordType {
    pub(crate) fn from_u8(b: u8) -> Result<Self> {
        match b {
            1 => Ok(RecordType::Put),
            2 => Ok(RecordType::Delete),
            other => Err(AtlasError::Corruption(format!(
                "unknown record type byte {other}"
            ))),
        }
    }
}

/// A single framed mutation record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub record_type: RecordType,
    pub seq: u64,
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

impl Record {
    pub fn put(seq: u64, key: Vec<u8>, value: Vec<u8>) -> Self {
        Self {
            record_type: RecordType::Put,
            seq,
            key,
            value,
        }
    }

    pub fn delete(seq: u64, key: Vec<u8>) -> Self {
        Self {
            record_type: RecordType::Delete,
            seq,
            key,
            value: Vec::new(),
        }
    }

    pub fn is_tombstone(&self) -> bool {
        matches!(self.record_type, RecordType::Delete)
    }

    /// Encode this record into `[len][crc32][body]` framing.
    pub fn encode(&self) -> Vec<u8> {
        let mut body = Vec::with_capacity(1 + 8 + 4 + self.key.len() + 4 + self.value.len());
        body.push(self.record_type as u8);
        body.extend_from_slice(&self.seq.to_le_bytes());
        body.extend_from_slice(&(self.key.len() as u32).to_le_bytes());
        body.extend_from_slice(&self.key);
        body.extend_from_slice(&(self.value.len() as u32).to_le_bytes());
        body.extend_from_slice(&self.value);

        let crc = crc32fast::hash(&body);
        let len = (4 + body.len()) as u32;

        let mut out = Vec::with_capacity(8 + body.len());
        out.extend_from_slice(&len.to_le_bytes());
        out.extend_from_slice(&crc.to_le_bytes());
        out.extend_from_slice(&body);
        out
    }

    /// Decode a record from a buffer holding exactly `crc32 + body` (i.e.
    /// everything after the `len` prefix has already been stripped/read).
    fn decode_crc_and_body(buf: &[u8]) -> Result<Self> {
        if buf.len() < 4 {
            return Err(AtlasError::Corruption("frame shorter than CRC field".into()));
        }
        let stored_crc = u32::from_le_bytes(buf[0..4].try_into().unwrap());
        let body = &buf[4..];
        let actual_crc = crc32fast::hash(body);
        if actual_crc != stored_crc {
            return Err(AtlasError::Corruption(format!(
                "CRC mismatch: stored {stored_crc}, computed {actual_crc}"
            )));
        }
        Self::decode_body(body)
    }

    fn decode_body(body: &[u8]) -> Result<Self> {
        if body.len() < 1 + 8 + 4 {
            return Err(AtlasError::Corruption("truncated record body".into()));
        }
        let record_type = RecordType::from_u8(body[0])?;
        let seq = u64::from_le_bytes(body[1..9].try_into().unwrap());
        let key_len = u32::from_le_bytes(body[9..13].try_into().unwrap()) as usize;
        let mut pos = 13;
        if body.len() < pos + key_len + 4 {
            return Err(AtlasError::Corruption("truncated record key".into()));
        }
        let key = body[pos..pos + key_len].to_vec();
        pos += key_len;
        let value_len = u32::from_le_bytes(body[pos..pos + 4].try_into().unwrap()) as usize;
        pos += 4;
        if body.len() < pos + value_len {
            return Err(AtlasError::Corruption("truncated record value".into()));
        }
        let value = body[pos..pos + value_len].to_vec();

        Ok(Self {
            record_type,
            seq,
            key,
            value,
        })
    }

    /// Decode a full `[len][crc32][body]` frame, where `frame` starts at the
    /// `len` field.
    pub fn decode_frame(frame: &[u8]) -> Result<Self> {
        if frame.len() < 4 {
            return Err(AtlasError::Corruption("frame shorter than length field".into()));
        }
        let len = u32::from_le_bytes(frame[0..4].try_into().unwrap()) as usize;
        if frame.len() < 4 + len {
            return Err(AtlasError::Corruption("frame shorter than declared length".into()));
        }
        Self::decode_crc_and_body(&frame[4..4 + len])
    }
}

/// Validate an entry against the spec's size limits. Returns a
/// [`AtlasError::Validation`] on a bad key/value.
pub fn validate_entry(key: &[u8], value: Option<&[u8]>) -> Result<()> {
    if key.is_empty() {
        return Err(AtlasError::Validation("key must not be empty".into()));
    }
    if key.len() > MAX_KEY_LEN {
        return Err(AtlasError::Validation(format!(
            "key length {} exceeds max {MAX_KEY_LEN}",
            key.len()
        )));
    }
    if let Some(v) = value {
        if v.len() > MAX_VALUE_LEN {
            return Err(AtlasError::Validation(format!(
                "value length {} exceeds max {MAX_VALUE_LEN}",
                v.len()
            )));
        }
    }
    Ok(())
}

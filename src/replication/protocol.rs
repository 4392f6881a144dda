//! Replication wire protocol
//!
//! Three frame kinds flow over the primary<->backup connection:
//! - **Handshake** (primary -> backup, once, right after connect):
//!   `[magic:u64][version:u32][primary_id:u64]`.
//! - **Op** (primary -> backup, one per write): the same length-prefixed,
//!   CRC-checked framing as [`crate::codec::Record`] / the WAL.
//! - **ACK** (backup -> primary, one per applied op): `[len:u32=8][ack_seq:u64]`.

use std::io::{Read, Write};

use crate::codec::{Record, RecordType};
use crate::error::Result;
use crate::wal::Operation;
use crate::AtlasError;

pub const MAGIC: u64 = 0x4154_4C41_535F_5250;
pub const VERSION: u32 = 1;
const HANDSHAKE_LEN: usize = 8 + 4 + 8;

pub struct Handshake {
    pub primary_id: u64,
}

pub fn write_handshake(writer: &mut impl Write, primary_id: u64) -> Result<()> {
    let mut buf = Vec::with_capacity(HANDSHAKE_LEN);
    buf.extend_from_slice(&MAGIC.to_le_bytes());
    buf.extend_from_slice(&VERSION.to_le_bytes());
    buf.extend_from_slice(&primary_id.to_le_bytes());
    writer.write_all(&buf)?;
    writer.flush()?;
    Ok(())
}

pub fn read_handshake(reader: &mut impl Read) -> Result<Handshake> {
    let mut buf = [0u8; HANDSHAKE_LEN];
    reader.read_exact(&mut buf)?;
    let magic = u64::from_le_bytes(buf[0..8].try_into().unwrap());
    let version = u32::from_le_bytes(buf[8..12].try_into().unwrap());
    let primary_id = u64::from_le_bytes(buf[12..20].try_into().unwrap());
    if magic != MAGIC {
        return Err(AtlasError::Protocol(format!("bad replication handshake magic: {magic:#x}")));
    }
    if version != VERSION {
        return Err(AtlasError::Protocol(format!("unsupported replication version: {version}")));
    }
    Ok(Handshake { primary_id })
}

pub fn write_op(writer: &mut impl Write, seq: u64, operation: &Operation) -> Result<()> {
    let record = match operation {
        Operation::Put { key, value } => Record::put(seq, key.clone(), value.clone()),
        Operation::Delete { key } => Record::delete(seq, key.clone()),
    };
    writer.write_all(&record.encode())?;
    writer.flush()?;
    Ok(())
}

/// Read one op frame, blocking until it's fully available. Returns an
/// error (treated by the caller as "connection broken") on EOF, a short
/// read, or a CRC mismatch.
pub fn read_op(reader: &mut impl Read) -> Result<(u64, Operation)> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf)?;
    let len = u32::from_le_bytes(len_buf) as usize;

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body)?;

    let mut frame = Vec::with_capacity(4 + len);
    frame.extend_from_slice(&len_buf);
    frame.extend_from_slice(&body);

    let record = Record::decode_frame(&frame)?;
    let operation = match record.record_type {
        RecordType::Put => Operation::Put {
            key: record.key,
            value: record.value,
        },
        RecordType::Delete => Operation::Delete { key: record.key },
    };
    Ok((record.seq, operation))
}

pub fn write_ack(writer: &mut impl Write, ack_seq: u64) -> Result<()> {
    writer.write_all(&8u32.to_le_bytes())?;
    writer.write_all(&ack_seq.to_le_bytes())?;
    writer.flush()?;
    Ok(())
}

pub fn read_ack(reader: &mut impl Read) -> Result<u64> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf)?;
    let len = u32::from_le_bytes(len_buf);
    if len != 8 {
        return Err(AtlasError::Protocol(format!("unexpected ack frame length {len}")));
    }
    let mut seq_buf = [0u8; 8];
    reader.read_exact(&mut seq_buf)?;
    Ok(u64::from_le_bytes(seq_buf))
}

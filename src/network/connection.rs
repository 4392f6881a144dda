//! Connection handler for the TCP streaming ingestion façade.
//!
//! Reads a stream of framed mutation records (the same `[len][crc32][body]`
//! framing as the WAL and the replication wire protocol, see
//! [`crate::codec`]) and applies each directly to the engine. Once an op is
//! durable (WAL-appended, MemTable-visible, replicated if this instance is a
//! primary), a single ACK byte is written back: `0x01` on success, `0x00` if
//! the op itself was rejected (bad key/value) — the connection stays open
//! either way. The client half-closing its write side (clean EOF on a frame
//! boundary) ends the loop; anything else (a malformed frame, a write
//! failure) closes the connection.

use std::io::{BufReader, BufWriter, Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use crate::codec::{Record, RecordType};
use crate::engine::Engine;
use crate::error::{AtlasError, Result};

const ACK_OK: u8 = 0x01;
const ACK_REJECTED: u8 = 0x00;

/// Handles a single client connection.
pub struct Connection {
    reader: BufReader<TcpStream>,
    writer: BufWriter<TcpStream>,
    engine: Arc<Engine>,
    peer_addr: String,
}

impl Connection {
    /// Create a new connection handler. Sets up buffered I/O; timeouts are
    /// configured separately via [`Connection::set_timeouts`].
    pub fn new(stream: TcpStream, engine: Arc<Engine>) -> Result<Self> {
        let peer_addr = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        stream.set_nodelay(true)?;

        let read_stream = stream.try_clone()?;
        let write_stream = stream;

        Ok(Self {
            reader: BufReader::new(read_stream),
            writer: BufWriter::new(write_stream),
            engine,
            peer_addr,
        })
    }

    /// Configure connection timeouts.
    pub fn set_timeouts(&mut self, read_ms: u64, write_ms: u64) -> Result<()> {
        let read_stream = self.reader.get_ref();
        let write_stream = self.writer.get_ref();

        if read_ms > 0 {
            read_stream.set_read_timeout(Some(Duration::from_millis(read_ms)))?;
        }
        if write_ms > 0 {
            write_stream.set_write_timeout(Some(Duration::from_millis(write_ms)))?;
        }

        Ok(())
    }

    /// Handle the connection (blocking until closed).
    ///
    /// Reads framed ops in a loop, applies each to the engine, and writes
    /// one ACK byte per op. Returns once the client half-closes or an
    /// unrecoverable I/O/protocol error occurs.
    pub fn handle(&mut self) -> Result<()> {
        tracing::debug!("ingestion connection established from {}", self.peer_addr);

        loop {
            let record = match self.read_record() {
                Ok(Some(record)) => record,
                Ok(None) => {
                    tracing::debug!("client {} half-closed the stream", self.peer_addr);
                    self.writer.flush()?;
                    return Ok(());
                }
                Err(AtlasError::Io(ref e))
                    if matches!(
                        e.kind(),
                        std::io::ErrorKind::UnexpectedEof
                            | std::io::ErrorKind::ConnectionReset
                            | std::io::ErrorKind::ConnectionAborted
                    ) =>
                {
                    tracing::debug!("client {} disconnected", self.peer_addr);
                    return Ok(());
                }
                Err(AtlasError::Io(ref e))
                    if matches!(
                        e.kind(),
                        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                    ) =>
                {
                    tracing::debug!("read timeout for client {}", self.peer_addr);
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!("protocol error from {}: {}", self.peer_addr, e);
                    return Err(e);
                }
            };

            let ack = self.apply(record);
            if let Err(e) = self.write_ack(ack) {
                tracing::debug!(
                    "client {} gone before ack could be sent: {}",
                    self.peer_addr,
                    e
                );
                return Ok(());
            }
        }
    }

    /// Apply one decoded record to the engine, returning the byte to ACK
    /// with. A validation failure is reported as a rejected ACK rather than
    /// tearing down the connection — the stream can keep going.
    fn apply(&self, record: Record) -> u8 {
        let result = match record.record_type {
            RecordType::Put => self.engine.put(&record.key, &record.value),
            RecordType::Delete => self.engine.delete(&record.key),
        };

        match result {
            Ok(()) => ACK_OK,
            Err(e) => {
                tracing::debug!("rejecting op from {}: {}", self.peer_addr, e);
                ACK_REJECTED
            }
        }
    }

    /// Read one `[len][crc32][body]` frame, or `None` on a clean EOF exactly
    /// at a frame boundary (the client half-closed between ops).
    fn read_record(&mut self) -> Result<Option<Record>> {
        let mut len_buf = [0u8; 4];
        if !read_exact_or_eof(&mut self.reader, &mut len_buf)? {
            return Ok(None);
        }
        let len = u32::from_le_bytes(len_buf) as usize;

        let mut rest = vec![0u8; len];
        self.reader.read_exact(&mut rest)?;

        let mut frame = Vec::with_capacity(4 + len);
        frame.extend_from_slice(&len_buf);
        frame.extend_from_slice(&rest);

        Record::decode_frame(&frame).map(Some)
    }

    fn write_ack(&mut self, ack: u8) -> Result<()> {
        self.writer.write_all(&[ack])?;
        self.writer.flush()?;
        Ok(())
    }

    /// Get the peer address string.
    pub fn peer_addr(&self) -> &str {
        &self.peer_addr
    }
}

/// Like `read_exact`, but returns `Ok(false)` instead of an `UnexpectedEof`
/// error when the stream ends before any byte of this read is consumed
/// (i.e. exactly at a frame boundary).
fn read_exact_or_eof<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<bool> {
    let mut read = 0;
    while read < buf.len() {
        match reader.read(&mut buf[read..]) {
            Ok(0) => {
                return if read == 0 {
                    Ok(false)
                } else {
                    Err(AtlasError::Io(std::io::Error::new(
                        std::io::ErrorKind::UnexpectedEof,
                        "connection closed mid-frame",
                    )))
                };
            }
            Ok(n) => read += n,
            Err(ref e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(AtlasError::Io(e)),
        }
    }
    Ok(true)
}

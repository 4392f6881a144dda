//! Replication server (backup side)
//!
//! Accepts one connection at a time on the replication port, reads the
//! one-time handshake, then applies each incoming op to the local engine
//! in order using the primary's own sequence number, ACKing after every
//! successful apply.
//!
//! **Idempotence.** An op with `seq <= last_applied_seq` is skipped but
//! still ACKed (a resend after the primary reconnected). An op with
//! `seq > last_applied_seq + 1` means a gap in the stream — the connection
//! is aborted so the primary is forced to resync from its pending window.

use std::io::{BufReader, BufWriter, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::engine::Engine;
use crate::error::Result;
use crate::AtlasError;

use super::protocol::{read_handshake, read_op, write_ack};

pub struct ReplicationServer {
    listen_addr: String,
    engine: Arc<Engine>,
    last_applied_seq: AtomicU64,
    ops_applied: AtomicU64,
    ops_skipped: AtomicU64,
}

impl ReplicationServer {
    pub fn new(listen_addr: impl Into<String>, engine: Arc<Engine>) -> Self {
        Self {
            listen_addr: listen_addr.into(),
            engine,
            last_applied_seq: AtomicU64::new(0),
            ops_applied: AtomicU64::new(0),
            ops_skipped: AtomicU64::new(0),
        }
    }

    pub fn last_applied_seq(&self) -> u64 {
        self.last_applied_seq.load(Ordering::Acquire)
    }

    /// Ops actually applied to the local engine (`seq > last_applied_seq`).
    pub fn ops_applied(&self) -> u64 {
        self.ops_applied.load(Ordering::Relaxed)
    }

    /// Ops received but not re-applied because their seq was already
    /// durable (a resend after the primary reconnected).
    pub fn ops_skipped(&self) -> u64 {
        self.ops_skipped.load(Ordering::Relaxed)
    }

    /// Accept connections forever, one at a time. Meant to be run on its
    /// own thread.
    pub fn run(self: Arc<Self>) -> Result<()> {
        let listener = TcpListener::bind(&self.listen_addr)?;
        tracing::info!(addr = %self.listen_addr, "replication server listening");
        for incoming in listener.incoming() {
            match incoming {
                Ok(stream) => {
                    if let Err(e) = self.handle_connection(stream) {
                        tracing::warn!(error = %e, "replication connection ended");
                    }
                }
                Err(e) => tracing::warn!(error = %e, "failed to accept replication connection"),
            }
        }
        Ok(())
    }

    fn handle_connection(&self, stream: TcpStream) -> Result<()> {
        stream.set_nodelay(true).ok();
        let mut reader = BufReader::new(stream.try_clone()?);
        let mut writer = BufWriter::new(stream);

        let handshake = read_handshake(&mut reader)?;
        tracing::info!(primary_id = handshake.primary_id, "replication connection established");

        loop {
            let (seq, operation) = match read_op(&mut reader) {
                Ok(v) => v,
                Err(_) => {
                    tracing::info!("replication connection closed by primary");
                    return Ok(());
                }
            };

            let last_applied = self.last_applied_seq.load(Ordering::Acquire);
            if seq > last_applied + 1 {
                return Err(AtlasError::Protocol(format!(
                    "replication stream gap: expected seq {}, got {seq}",
                    last_applied + 1
                )));
            }
            if seq > last_applied {
                self.engine.apply_replicated(seq, operation)?;
                self.last_applied_seq.store(seq, Ordering::Release);
                self.ops_applied.fetch_add(1, Ordering::Relaxed);
            } else {
                self.ops_skipped.fetch_add(1, Ordering::Relaxed);
            }

            write_ack(&mut writer, seq)?;
        }
    }
}

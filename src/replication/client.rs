//! Replication client (primary side)
//!
//! One persistent TCP connection to the configured backup. A bounded
//! pending-ops FIFO tracks every write sent but not yet ACKed. In sync-sync
//! mode — the only mode this implements — [`ReplicationClient::replicate_sync`]
//! blocks the caller until the matching ACK arrives or `ack_timeout_ms`
//! elapses.
//!
//! A background thread owns the connection lifecycle: on disconnect it
//! marks the client unconnected, backs off exponentially (capped), and
//! reconnects, resending every still-pending op in order before the
//! connection is considered usable again. The backup's apply is idempotent
//! by sequence number, so a resent op that already landed is harmless.

use std::collections::VecDeque;
use std::io::BufReader;
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::config::Config;
use crate::engine::ReplicationSink;
use crate::error::Result;
use crate::wal::Operation;
use crate::AtlasError;

use super::protocol::{read_ack, write_handshake, write_op};

struct PendingOp {
    seq: u64,
    operation: Operation,
}

struct ClientState {
    write_half: Option<TcpStream>,
    pending: VecDeque<PendingOp>,
    last_acked_seq: u64,
    connected: bool,
}

pub struct ReplicationClient {
    addr: String,
    primary_id: u64,
    ack_timeout: Duration,
    max_backoff: Duration,
    state: Mutex<ClientState>,
    acked: Condvar,
    /// Highest seq handed to `write_op` on the wire (initial send or resend).
    last_sent_seq: AtomicU64,
    /// Total ops written to the wire, counting resends after a reconnect.
    ops_sent: AtomicU64,
    /// Total ops whose ACK has been observed.
    ops_acked: AtomicU64,
    /// Number of times the connection was (re-)established after the first.
    reconnect_count: AtomicU64,
    connected_once: AtomicBool,
}

impl ReplicationClient {
    /// Start the client and its background connection thread. Returns
    /// immediately; the first `replicate_sync` call may have to wait for
    /// the initial connection to land.
    pub fn connect(config: &Config) -> Result<Arc<Self>> {
        let addr = config
            .backup_addr
            .clone()
            .ok_or_else(|| AtlasError::Config("primary role requires backup_addr".into()))?;

        let client = Arc::new(Self {
            addr,
            primary_id: config.primary_id,
            ack_timeout: Duration::from_millis(config.replication_ack_timeout_ms),
            max_backoff: Duration::from_millis(config.replication_max_backoff_ms),
            state: Mutex::new(ClientState {
                write_half: None,
                pending: VecDeque::new(),
                last_acked_seq: 0,
                connected: false,
            }),
            acked: Condvar::new(),
            last_sent_seq: AtomicU64::new(0),
            ops_sent: AtomicU64::new(0),
            ops_acked: AtomicU64::new(0),
            reconnect_count: AtomicU64::new(0),
            connected_once: AtomicBool::new(false),
        });

        let background = Arc::clone(&client);
        std::thread::Builder::new()
            .name("atlaskv-replication-client".into())
            .spawn(move || background.run())
            .map_err(|e| AtlasError::Network(format!("failed to spawn replication client thread: {e}")))?;

        Ok(client)
    }

    fn run(self: Arc<Self>) {
        let mut backoff = Duration::from_millis(50);
        loop {
            match self.dial_and_resend() {
                Ok(read_half) => {
                    backoff = Duration::from_millis(50);
                    self.read_acks_until_broken(read_half);
                }
                Err(e) => {
                    tracing::warn!(addr = %self.addr, error = %e, "replication connect failed, backing off");
                }
            }
            std::thread::sleep(backoff);
            backoff = (backoff * 2).min(self.max_backoff);
        }
    }

    fn dial_and_resend(&self) -> Result<TcpStream> {
        let stream = TcpStream::connect(&self.addr)?;
        stream.set_nodelay(true).ok();
        let mut write_half = stream.try_clone()?;
        write_handshake(&mut write_half, self.primary_id)?;

        let mut state = self.state.lock();
        for op in state.pending.iter() {
            write_op(&mut write_half, op.seq, &op.operation)?;
            self.ops_sent.fetch_add(1, Ordering::Relaxed);
            self.last_sent_seq.fetch_max(op.seq, Ordering::Relaxed);
        }
        state.write_half = Some(write_half);
        state.connected = true;
        drop(state);

        if self.connected_once.swap(true, Ordering::AcqRel) {
            self.reconnect_count.fetch_add(1, Ordering::Relaxed);
        }

        tracing::info!(addr = %self.addr, "replication client connected");
        Ok(stream)
    }

    fn read_acks_until_broken(&self, read_half: TcpStream) {
        let mut reader = BufReader::new(read_half);
        loop {
            match read_ack(&mut reader) {
                Ok(seq) => {
                    let mut state = self.state.lock();
                    state.last_acked_seq = state.last_acked_seq.max(seq);
                    let before = state.pending.len();
                    state.pending.retain(|op| op.seq > seq);
                    let acked = before - state.pending.len();
                    drop(state);
                    self.ops_acked.fetch_add(acked as u64, Ordering::Relaxed);
                    self.acked.notify_all();
                }
                Err(e) => {
                    tracing::warn!(error = %e, "replication connection broken, will reconnect");
                    let mut state = self.state.lock();
                    state.connected = false;
                    state.write_half = None;
                    break;
                }
            }
        }
    }

    /// Enqueue `operation` under `seq` and block the caller until the
    /// backup ACKs it or `ack_timeout_ms` elapses.
    pub fn replicate_sync(&self, seq: u64, operation: &Operation) -> Result<()> {
        {
            let mut state = self.state.lock();
            state.pending.push_back(PendingOp {
                seq,
                operation: operation.clone(),
            });
            if let Some(write_half) = state.write_half.as_mut() {
                if write_op(write_half, seq, operation).is_err() {
                    state.connected = false;
                    state.write_half = None;
                } else {
                    self.ops_sent.fetch_add(1, Ordering::Relaxed);
                    self.last_sent_seq.fetch_max(seq, Ordering::Relaxed);
                }
            }
        }

        let mut state = self.state.lock();
        let deadline = Instant::now() + self.ack_timeout;
        while state.last_acked_seq < seq {
            let now = Instant::now();
            if now >= deadline {
                return Err(AtlasError::ReplicationTimeout(seq));
            }
            let timed_out = self.acked.wait_until(&mut state, deadline).timed_out();
            if timed_out && state.last_acked_seq < seq {
                return Err(AtlasError::ReplicationTimeout(seq));
            }
        }
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    pub fn last_acked_seq(&self) -> u64 {
        self.state.lock().last_acked_seq
    }

    /// Highest seq written to the wire, counting resends after a reconnect.
    pub fn last_sent_seq(&self) -> u64 {
        self.last_sent_seq.load(Ordering::Relaxed)
    }

    /// Ops enqueued but not yet ACKed.
    pub fn pending_count(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Total frames written to the wire (initial sends plus resends).
    pub fn ops_sent(&self) -> u64 {
        self.ops_sent.load(Ordering::Relaxed)
    }

    /// Total ACKs observed.
    pub fn ops_acked(&self) -> u64 {
        self.ops_acked.load(Ordering::Relaxed)
    }

    /// Number of times the connection was re-established after the first.
    pub fn reconnect_count(&self) -> u64 {
        self.reconnect_count.load(Ordering::Relaxed)
    }
}

impl ReplicationSink for ReplicationClient {
    fn replicate(&self, seq: u64, operation: &Operation) -> Result<()> {
        self.replicate_sync(seq, operation)
    }
}

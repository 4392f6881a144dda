//! Engine Module
//!
//! The core storage engine: coordinates the WAL, the active/sealed
//! MemTables, and the on-disk SSTable set, and drives the ACTIVE ->
//! FLUSHING -> ACTIVE' overflow state machine.
//!
//! ## Concurrency Model
//!
//! A single `parking_lot::Mutex<EngineState>` guards the active MemTable,
//! the sealed (flushing) MemTable, the WAL epoch, and the sequence counter
//! together, so they always move in lockstep: a write either lands
//! entirely before or entirely after any concurrent seal. Reads against
//! the MemTables and the SSTable set do not need this lock — both are
//! internally synchronized and safe to read while a write is in flight.
//! Flushing a sealed MemTable to an SSTable happens off the write path, on
//! a dedicated background worker fed by a bounded channel, so a slow flush
//! never blocks concurrent `get`/`put` calls against the *other* MemTable.

mod compaction;

pub use compaction::{CompactionStrategy, NoopCompaction};

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam::channel::{bounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::{Mutex, RwLock};

use crate::codec::validate_entry;
use crate::config::{Config, WalSyncStrategy};
use crate::error::Result;
use crate::memtable::MemTable;
use crate::storage::{MergeIterator, StorageManager};
use crate::wal::{self, Operation, WalRecovery, WalWriter};
use crate::AtlasError;

/// Hook the engine calls synchronously, after a write is durable in its own
/// WAL and visible in its own MemTable but before returning control to the
/// caller — the primary side of synchronous replication. Implemented by
/// `crate::replication::ReplicationClient`; kept as a trait here so this
/// module has no hard dependency on the replication wire protocol.
pub trait ReplicationSink: Send + Sync {
    fn replicate(&self, seq: u64, operation: &Operation) -> Result<()>;
}

/// A sealed MemTable handed to the background worker, plus the WAL epoch
/// that can be retired once the flush lands durably on disk.
struct FlushRequest {
    sealed: Arc<MemTable>,
    epoch_to_retire: u64,
}

/// State mutated together under one lock.
struct EngineState {
    active: Arc<MemTable>,
    /// At most one sealed MemTable is ever in flight at a time — a second
    /// overflow while one is still flushing is absorbed by letting `active`
    /// keep growing past `memtable_size_limit` rather than sealing again.
    sealed: Option<Arc<MemTable>>,
    wal: WalWriter,
    wal_epoch: u64,
    next_seq: u64,
}

struct EngineCore {
    config: Config,
    state: Mutex<EngineState>,
    storage: StorageManager,
    replication: RwLock<Option<Arc<dyn ReplicationSink>>>,
    compaction: RwLock<Arc<dyn CompactionStrategy>>,
}

/// The embedded storage engine.
pub struct Engine {
    core: Arc<EngineCore>,
    flush_tx: Sender<FlushRequest>,
    flush_thread: Option<JoinHandle<()>>,
    /// Dropped on `close()` to signal the WAL sync worker to exit; absent
    /// entirely under a sync strategy that doesn't need a background timer.
    wal_sync_shutdown: Option<Sender<()>>,
    wal_sync_thread: Option<JoinHandle<()>>,
}

fn parse_wal_epoch(file_name: &str) -> Option<u64> {
    file_name
        .strip_prefix("wal-")
        .and_then(|rest| rest.strip_suffix(".log"))
        .and_then(|epoch| epoch.parse().ok())
}

impl Engine {
    /// Open (or create) an engine rooted at `config.data_dir`.
    ///
    /// Replays every WAL epoch found on disk (ascending, in case a crash
    /// landed between rotating the epoch and retiring the old one), flushes
    /// any recovered entries straight to a new SSTable so they're durable
    /// independent of the WAL, deletes the now-redundant epoch files, and
    /// starts a fresh epoch for new writes. The sequence counter is seeded
    /// from the highest sequence number observed across the WAL replay and
    /// the existing level-0 set.
    pub fn open(config: Config) -> Result<Self> {
        fs::create_dir_all(&config.data_dir)?;

        let storage = StorageManager::with_options(
            &config.data_dir,
            config.sstable_block_size,
            config.sstable_restart_interval,
        )?;

        let mut epochs: Vec<u64> = fs::read_dir(&config.data_dir)?
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| parse_wal_epoch(&entry.file_name().to_string_lossy()))
            .collect();
        epochs.sort_unstable();

        let active = MemTable::new();
        let mut max_replayed_seq = 0u64;

        for epoch in &epochs {
            let path = config.data_dir.join(wal::epoch_filename(*epoch));
            let (entries, recovery) = WalRecovery::recover(&path)?;
            if recovery.was_truncated {
                tracing::warn!(epoch = *epoch, "wal epoch had a torn tail write, truncated during recovery");
            }
            max_replayed_seq = max_replayed_seq.max(recovery.max_seq);
            for entry in entries {
                match entry.operation {
                    Operation::Put { key, value } => {
                        active.put(key, value, entry.seq);
                    }
                    Operation::Delete { key } => {
                        active.delete(key, entry.seq);
                    }
                }
            }
        }

        if !active.is_empty() {
            let create_seq = active.max_seq().unwrap_or(0);
            tracing::info!(entries = active.entry_count(), create_seq, "flushing recovered wal entries to a new sstable");
            storage.flush(&active, create_seq)?;
            active.clear();
        }

        for epoch in &epochs {
            let _ = fs::remove_file(config.data_dir.join(wal::epoch_filename(*epoch)));
        }

        let wal_epoch = epochs.last().map(|e| e + 1).unwrap_or(0);
        let wal_path = config.data_dir.join(wal::epoch_filename(wal_epoch));
        let wal = WalWriter::create(&wal_path, config.wal_sync_strategy)?;

        let next_seq = max_replayed_seq.max(storage.max_seq()).wrapping_add(1);

        let (flush_tx, flush_rx) = bounded::<FlushRequest>(1);

        let core = Arc::new(EngineCore {
            config,
            state: Mutex::new(EngineState {
                active: Arc::new(active),
                sealed: None,
                wal,
                wal_epoch,
                next_seq,
            }),
            storage,
            replication: RwLock::new(None),
            compaction: RwLock::new(Arc::new(NoopCompaction) as Arc<dyn CompactionStrategy>),
        });

        let worker_core = Arc::clone(&core);
        let flush_thread = std::thread::Builder::new()
            .name("atlaskv-flush".into())
            .spawn(move || flush_worker_loop(worker_core, flush_rx))
            .map_err(|e| AtlasError::Storage(format!("failed to spawn flush worker: {e}")))?;

        let (wal_sync_shutdown, wal_sync_thread) =
            if let WalSyncStrategy::IntervalMs(interval_ms) = core.config.wal_sync_strategy {
                let (shutdown_tx, shutdown_rx) = bounded::<()>(0);
                let sync_core = Arc::clone(&core);
                let thread = std::thread::Builder::new()
                    .name("atlaskv-wal-sync".into())
                    .spawn(move || wal_sync_worker_loop(sync_core, shutdown_rx, interval_ms))
                    .map_err(|e| AtlasError::Storage(format!("failed to spawn wal sync worker: {e}")))?;
                (Some(shutdown_tx), Some(thread))
            } else {
                (None, None)
            };

        Ok(Self {
            core,
            flush_tx,
            flush_thread: Some(flush_thread),
            wal_sync_shutdown,
            wal_sync_thread,
        })
    }

    /// Convenience constructor: default config rooted at `path`.
    pub fn open_path(path: &Path) -> Result<Self> {
        let config = Config::builder().data_dir(path).build();
        Self::open(config)
    }

    /// Install the replication hook; writes made after this call block on
    /// the backup's ACK before returning. No-op for a standalone or backup
    /// instance.
    pub fn attach_replication_sink(&self, sink: Arc<dyn ReplicationSink>) {
        *self.core.replication.write() = Some(sink);
    }

    pub fn set_compaction_strategy(&self, strategy: Arc<dyn CompactionStrategy>) {
        *self.core.compaction.write() = strategy;
    }

    /// Look up a key.
    ///
    /// Probes the active MemTable, then the sealed MemTable (if one is
    /// flushing), then the level-0 SSTable set, newest-first. A tombstone
    /// at any level is reported the same as an absent key.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let (active, sealed) = {
            let state = self.core.state.lock();
            (Arc::clone(&state.active), state.sealed.clone())
        };

        if let Some(entry) = active.get(key) {
            return Ok(entry.value);
        }
        if let Some(sealed) = sealed {
            if let Some(entry) = sealed.get(key) {
                return Ok(entry.value);
            }
        }

        match self.core.storage.get(key) {
            Ok(value) => Ok(value),
            Err(AtlasError::KeyNotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Ordered, deduplicated view of every live key in `[start, end]`
    /// across every source, optionally capped at `limit` results.
    pub fn read_key_range(
        &self,
        start: &[u8],
        end: &[u8],
        limit: Option<usize>,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        if limit == Some(0) {
            return Err(AtlasError::Validation("limit must be greater than zero".into()));
        }
        if start > end {
            return Ok(Vec::new());
        }
        let (active, sealed, tables) = {
            let state = self.core.state.lock();
            (
                Arc::clone(&state.active),
                state.sealed.clone(),
                self.core.storage.readers(),
            )
        };
        let sealed_slice: Vec<Arc<MemTable>> = sealed.into_iter().collect();
        let merged = MergeIterator::new(&active, &sealed_slice, &tables, start, end)?;

        Ok(match limit {
            Some(n) => merged.take(n).collect(),
            None => merged.collect(),
        })
    }

    /// Write a key-value pair: WAL-append, MemTable-insert, then (if
    /// replication is attached) block until the backup ACKs it.
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        validate_entry(key, Some(value))?;
        self.apply_local(Operation::Put {
            key: key.to_vec(),
            value: value.to_vec(),
        })
    }

    /// Delete a key (writes a tombstone).
    pub fn delete(&self, key: &[u8]) -> Result<()> {
        validate_entry(key, None)?;
        self.apply_local(Operation::Delete { key: key.to_vec() })
    }

    /// Write a batch of key-value pairs as one contiguous run of sequence
    /// numbers. Each op is still replicated individually, in order, so the
    /// backup's idempotent-by-seq apply path doesn't need batch framing of
    /// its own.
    pub fn batch_put(&self, pairs: Vec<(Vec<u8>, Vec<u8>)>) -> Result<()> {
        if pairs.is_empty() {
            return Err(AtlasError::Validation("batch must not be empty".into()));
        }
        for (key, value) in &pairs {
            validate_entry(key, Some(value))?;
        }

        let base_seq = {
            let mut state = self.core.state.lock();
            let base_seq = state.next_seq;
            for (i, (key, value)) in pairs.iter().enumerate() {
                state.wal.append(
                    base_seq + i as u64,
                    Operation::Put {
                        key: key.clone(),
                        value: value.clone(),
                    },
                )?;
            }
            for (i, (key, value)) in pairs.iter().enumerate() {
                state.active.put(key.clone(), value.clone(), base_seq + i as u64);
            }
            state.next_seq = base_seq + pairs.len() as u64;
            self.maybe_seal(&mut state)?;
            base_seq
        };

        if let Some(sink) = self.core.replication.read().clone() {
            for (i, (key, value)) in pairs.into_iter().enumerate() {
                sink.replicate(
                    base_seq + i as u64,
                    &Operation::Put { key, value },
                )?;
            }
        }

        Ok(())
    }

    fn apply_local(&self, operation: Operation) -> Result<()> {
        let seq = {
            let mut state = self.core.state.lock();
            let seq = state.next_seq;
            state.wal.append(seq, operation.clone())?;
            match &operation {
                Operation::Put { key, value } => {
                    state.active.put(key.clone(), value.clone(), seq);
                }
                Operation::Delete { key } => {
                    state.active.delete(key.clone(), seq);
                }
            }
            state.next_seq = seq + 1;
            self.maybe_seal(&mut state)?;
            seq
        };

        if let Some(sink) = self.core.replication.read().clone() {
            sink.replicate(seq, &operation)?;
        }

        Ok(())
    }

    /// Apply an operation received from a primary via replication, under
    /// the sequence number the primary assigned. Idempotent: resending an
    /// already-applied `seq` (as happens after a reconnect) is a no-op.
    pub fn apply_replicated(&self, seq: u64, operation: Operation) -> Result<()> {
        let mut state = self.core.state.lock();
        if seq < state.next_seq {
            return Ok(());
        }
        state.wal.append(seq, operation.clone())?;
        match operation {
            Operation::Put { key, value } => {
                state.active.put(key, value, seq);
            }
            Operation::Delete { key } => {
                state.active.delete(key, seq);
            }
        }
        state.next_seq = seq + 1;
        self.maybe_seal(&mut state)
    }

    /// Seal the active MemTable and hand it to the background flush
    /// worker if it has crossed the configured size limit. A no-op while a
    /// previous seal is still flushing.
    fn maybe_seal(&self, state: &mut EngineState) -> Result<()> {
        if state.sealed.is_some() {
            return Ok(());
        }
        if !state.active.should_flush(self.core.config.memtable_size_limit) {
            return Ok(());
        }

        let sealed = std::mem::replace(&mut state.active, Arc::new(MemTable::new()));
        let old_epoch = state.wal_epoch;
        let new_epoch = old_epoch + 1;
        let new_wal_path = self.core.config.data_dir.join(wal::epoch_filename(new_epoch));
        state.wal.rotate(&new_wal_path)?;
        state.wal_epoch = new_epoch;
        state.sealed = Some(Arc::clone(&sealed));

        let request = FlushRequest {
            sealed,
            epoch_to_retire: old_epoch,
        };
        if self.flush_tx.send(request).is_err() {
            tracing::error!("flush worker is gone; sealed memtable will not be retired automatically");
        }

        Ok(())
    }

    /// Stop the background worker and make sure everything in memory is
    /// durable before returning. Requires sole ownership of the engine
    /// (e.g. via `Arc::try_unwrap` once every other handle has been
    /// dropped) since it consumes `self`.
    pub fn close(self) -> Result<()> {
        let Engine {
            core,
            flush_tx,
            flush_thread,
            wal_sync_shutdown,
            wal_sync_thread,
        } = self;

        drop(flush_tx);
        if let Some(handle) = flush_thread {
            let _ = handle.join();
        }

        drop(wal_sync_shutdown);
        if let Some(handle) = wal_sync_thread {
            let _ = handle.join();
        }

        let mut state = core.state.lock();
        if let Some(sealed) = state.sealed.take() {
            let create_seq = sealed.max_seq().unwrap_or(0);
            core.storage.flush(&sealed, create_seq)?;
        }
        if !state.active.is_empty() {
            let create_seq = state.active.max_seq().unwrap_or(0);
            core.storage.flush(&state.active, create_seq)?;
            state.active.clear();
        }
        state.wal.sync()?;
        Ok(())
    }

    pub fn data_dir(&self) -> &Path {
        &self.core.config.data_dir
    }

    pub fn memtable_size(&self) -> usize {
        self.core.state.lock().active.approximate_bytes()
    }

    pub fn memtable_entry_count(&self) -> usize {
        self.core.state.lock().active.entry_count()
    }

    pub fn table_count(&self) -> usize {
        self.core.storage.table_count()
    }

    pub fn config(&self) -> &Config {
        &self.core.config
    }
}

/// Background fsync timer for `WalSyncStrategy::IntervalMs`: wakes up every
/// `interval_ms` and syncs the WAL under the engine's state lock. Exits as
/// soon as the shutdown channel disconnects (the engine dropped its sender).
fn wal_sync_worker_loop(core: Arc<EngineCore>, shutdown_rx: Receiver<()>, interval_ms: u64) {
    let interval = Duration::from_millis(interval_ms);
    loop {
        match shutdown_rx.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => {
                let mut state = core.state.lock();
                if let Err(e) = state.wal.sync() {
                    tracing::error!(error = %e, "background wal sync failed");
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
            Ok(()) => {}
        }
    }
}

fn flush_worker_loop(core: Arc<EngineCore>, rx: Receiver<FlushRequest>) {
    while let Ok(request) = rx.recv() {
        let create_seq = request.sealed.max_seq().unwrap_or(0);
        match core.storage.flush(&request.sealed, create_seq) {
            Ok(_) => {
                core.state.lock().sealed = None;
                if let Err(e) = core.compaction.read().maybe_compact(&core.storage) {
                    tracing::error!(error = %e, "compaction pass failed");
                }
                let retired = core.config.data_dir.join(wal::epoch_filename(request.epoch_to_retire));
                if let Err(e) = fs::remove_file(&retired) {
                    tracing::warn!(path = %retired.display(), error = %e, "failed to remove retired wal epoch");
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "background flush failed; sealed memtable retained for retry");
            }
        }
    }
}

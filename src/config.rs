//! Configuration for AtlasKV
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

/// Role this instance plays in a replicated deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// No replication; a plain standalone engine.
    Standalone,
    /// Accepts writes and replicates them to a backup.
    Primary,
    /// Receives replicated writes from a primary.
    Backup,
}

impl Default for Role {
    fn default() -> Self {
        Role::Standalone
    }
}

/// Main configuration for AtlasKV instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Directory for all data files
    pub data_dir: PathBuf,

    // -------------------------------------------------------------------------
    // WAL Configuration
    // -------------------------------------------------------------------------
    /// Sync strategy: how aggressively to fsync the WAL
    pub wal_sync_strategy: WalSyncStrategy,

    // -------------------------------------------------------------------------
    // MemTable Configuration
    // -------------------------------------------------------------------------
    /// Max size of memtable before flush (in bytes)
    pub memtable_size_limit: usize,

    // -------------------------------------------------------------------------
    // SSTable Configuration
    // -------------------------------------------------------------------------
    /// Target size of a single data block, in bytes
    pub sstable_block_size: usize,

    /// Number of entries between restart points inside a data block
    pub sstable_restart_interval: usize,

    // -------------------------------------------------------------------------
    // Network Configuration (TCP streaming ingestion façade)
    // -------------------------------------------------------------------------
    /// TCP listen address for the streaming ingestion façade
    pub listen_addr: String,

    /// Max concurrent client connections
    pub max_connections: usize,

    /// Connection read timeout (milliseconds)
    pub read_timeout_ms: u64,

    /// Connection write timeout (milliseconds)
    pub write_timeout_ms: u64,

    // -------------------------------------------------------------------------
    // HTTP façade
    // -------------------------------------------------------------------------
    /// HTTP listen address
    pub http_addr: String,

    // -------------------------------------------------------------------------
    // Replication
    // -------------------------------------------------------------------------
    /// Role this instance plays
    pub role: Role,

    /// Address the backup's replication server listens on (backup role)
    pub replication_addr: String,

    /// Address of the backup to replicate to (primary role)
    pub backup_addr: Option<String>,

    /// How long the primary blocks waiting for an ACK before failing the
    /// call with `ReplicationTimeout`
    pub replication_ack_timeout_ms: u64,

    /// Cap on the primary's exponential reconnect backoff
    pub replication_max_backoff_ms: u64,

    /// Numeric identifier the primary sends in its handshake frame
    pub primary_id: u64,
}

/// WAL sync strategy, matching the three policies the spec names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalSyncStrategy {
    /// fsync before every write acknowledges (safest, slowest)
    EveryWrite,

    /// Buffered writes ack immediately; a background thread fsyncs every
    /// `n` milliseconds
    IntervalMs(u64),

    /// Never explicitly fsync; rely on the OS to flush eventually
    Never,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./atlaskv_data"),
            wal_sync_strategy: WalSyncStrategy::IntervalMs(100),
            memtable_size_limit: 64 * 1024 * 1024, // 64 MB
            sstable_block_size: 4 * 1024,
            sstable_restart_interval: 16,
            listen_addr: "127.0.0.1:6380".to_string(),
            max_connections: 1024,
            read_timeout_ms: 5000,
            write_timeout_ms: 5000,
            http_addr: "127.0.0.1:6379".to_string(),
            role: Role::Standalone,
            replication_addr: "127.0.0.1:6381".to_string(),
            backup_addr: None,
            replication_ack_timeout_ms: 5000,
            replication_max_backoff_ms: 10_000,
            primary_id: 1,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    pub fn wal_sync_strategy(mut self, strategy: WalSyncStrategy) -> Self {
        self.config.wal_sync_strategy = strategy;
        self
    }

    pub fn memtable_size_limit(mut self, limit: usize) -> Self {
        self.config.memtable_size_limit = limit;
        self
    }

    pub fn sstable_block_size(mut self, size: usize) -> Self {
        self.config.sstable_block_size = size;
        self
    }

    pub fn sstable_restart_interval(mut self, interval: usize) -> Self {
        self.config.sstable_restart_interval = interval;
        self
    }

    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.listen_addr = addr.into();
        self
    }

    pub fn http_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.http_addr = addr.into();
        self
    }

    pub fn max_connections(mut self, n: usize) -> Self {
        self.config.max_connections = n;
        self
    }

    pub fn read_timeout_ms(mut self, ms: u64) -> Self {
        self.config.read_timeout_ms = ms;
        self
    }

    pub fn write_timeout_ms(mut self, ms: u64) -> Self {
        self.config.write_timeout_ms = ms;
        self
    }

    pub fn role(mut self, role: Role) -> Self {
        self.config.role = role;
        self
    }

    pub fn replication_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.replication_addr = addr.into();
        self
    }

    pub fn backup_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.backup_addr = Some(addr.into());
        self
    }

    pub fn replication_ack_timeout_ms(mut self, ms: u64) -> Self {
        self.config.replication_ack_timeout_ms = ms;
        self
    }

    pub fn replication_max_backoff_ms(mut self, ms: u64) -> Self {
        self.config.replication_max_backoff_ms = ms;
        self
    }

    pub fn primary_id(mut self, id: u64) -> Self {
        self.config.primary_id = id;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

//! # AtlasKV
//!
//! An embedded LSM-tree key-value store with:
//! - Write-ahead logging with epoch rotation and crash recovery
//! - An in-memory MemTable layered over an immutable, growing SSTable set
//! - A TCP streaming ingestion façade and an HTTP façade over the same engine
//! - Optional synchronous primary -> backup replication
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐
//! │ TCP ingestion │   │ HTTP façade  │
//! └──────┬───────┘   └──────┬───────┘
//!        └─────────┬────────┘
//!                   ▼
//!             ┌───────────┐        ┌────────────────────┐
//!             │  Engine   │──────▶│ ReplicationClient    │
//!             │           │        │ (primary, sync ACK)  │
//!             └─────┬─────┘        └────────────────────┘
//!        ┌──────────┼──────────┐
//!        ▼          ▼          ▼
//!   ┌─────────┐ ┌─────────┐ ┌──────────────┐
//!   │   WAL   │ │MemTable │ │StorageManager │
//!   │ (epoch) │ │(active/ │ │ (SSTable L0)  │
//!   │         │ │ sealed) │ │               │
//!   └─────────┘ └─────────┘ └──────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod codec;
pub mod wal;
pub mod memtable;
pub mod storage;
pub mod network;
pub mod engine;
pub mod replication;
pub mod http;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{AtlasError, Result};
pub use config::Config;
pub use engine::Engine;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of AtlasKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

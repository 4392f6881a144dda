//! Primary -> backup synchronous replication.
//!
//! [`ReplicationClient`] is the primary side: one persistent connection,
//! sync-sync ACK-wait, reconnect with exponential backoff. [`ReplicationServer`]
//! is the backup side: single-connection accept loop, ordered idempotent
//! apply. [`ReplicationStatusProvider`] lets the HTTP façade query either
//! role without depending on replication internals.

mod client;
mod protocol;
mod server;
mod status;

pub use client::ReplicationClient;
pub use server::ReplicationServer;
pub use status::{ReplicationStatus, ReplicationStatusProvider};

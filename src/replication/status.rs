//! Replication status
//!
//! The HTTP façade's `/replication/status` handler needs to introspect
//! either a replication client or server without caring which. Modeled as
//! a small capability the façade depends on, resolved as a sum type rather
//! than an inheritance hierarchy — see
//! [`ReplicationStatusProvider::status`].

use std::sync::Arc;

use super::client::ReplicationClient;
use super::server::ReplicationServer;

#[derive(Debug, Clone)]
pub struct ReplicationStatus {
    pub enabled: bool,
    pub role: &'static str,

    // Primary-side fields (`Some` only when `role == "primary"`).
    pub connected: Option<bool>,
    pub last_sent_seq: Option<u64>,
    pub last_acked_seq: Option<u64>,
    pub pending_count: Option<usize>,
    pub ops_sent: Option<u64>,
    pub ops_acked: Option<u64>,
    pub reconnect_count: Option<u64>,

    // Backup-side fields (`Some` only when `role == "backup"`).
    pub last_applied_seq: Option<u64>,
    pub ops_applied: Option<u64>,
    pub ops_skipped: Option<u64>,
}

/// Wraps whichever replication role this instance plays.
pub enum ReplicationStatusProvider {
    Disabled,
    Primary(Arc<ReplicationClient>),
    Backup(Arc<ReplicationServer>),
}

impl ReplicationStatusProvider {
    pub fn status(&self) -> ReplicationStatus {
        match self {
            ReplicationStatusProvider::Disabled => ReplicationStatus {
                enabled: false,
                role: "standalone",
                connected: None,
                last_sent_seq: None,
                last_acked_seq: None,
                pending_count: None,
                ops_sent: None,
                ops_acked: None,
                reconnect_count: None,
                last_applied_seq: None,
                ops_applied: None,
                ops_skipped: None,
            },
            ReplicationStatusProvider::Primary(client) => ReplicationStatus {
                enabled: true,
                role: "primary",
                connected: Some(client.is_connected()),
                last_sent_seq: Some(client.last_sent_seq()),
                last_acked_seq: Some(client.last_acked_seq()),
                pending_count: Some(client.pending_count()),
                ops_sent: Some(client.ops_sent()),
                ops_acked: Some(client.ops_acked()),
                reconnect_count: Some(client.reconnect_count()),
                last_applied_seq: None,
                ops_applied: None,
                ops_skipped: None,
            },
            ReplicationStatusProvider::Backup(server) => ReplicationStatus {
                enabled: true,
                role: "backup",
                connected: None,
                last_sent_seq: None,
                last_acked_seq: None,
                pending_count: None,
                ops_sent: None,
                ops_acked: None,
                reconnect_count: None,
                last_applied_seq: Some(server.last_applied_seq()),
                ops_applied: Some(server.ops_applied()),
                ops_skipped: Some(server.ops_skipped()),
            },
        }
    }
}

//! HTTP façade
//!
//! A thin, synchronous HTTP server over the engine's capability set
//! (`put`, `delete`, `get`, `batch_put`, `read_key_range`), built on
//! `tiny_http` (blocking, one request handled at a time per connection —
//! plenty for this store's scale) and `serde_json` for request/response
//! bodies.

mod routes;

use std::sync::Arc;

use tiny_http::Server;

use crate::engine::Engine;
use crate::error::{AtlasError, Result};
use crate::replication::ReplicationStatusProvider;

/// Binds an HTTP listener and serves requests against `engine` until the
/// process exits. Meant to be run on its own thread.
pub struct HttpFacade {
    engine: Arc<Engine>,
    replication: Arc<ReplicationStatusProvider>,
}

impl HttpFacade {
    pub fn new(engine: Arc<Engine>, replication: Arc<ReplicationStatusProvider>) -> Self {
        Self { engine, replication }
    }

    pub fn run(&self, addr: &str) -> Result<()> {
        let server = Server::http(addr)
            .map_err(|e| AtlasError::Network(format!("failed to bind http facade on {addr}: {e}")))?;
        tracing::info!(addr, "http facade listening");

        for mut request in server.incoming_requests() {
            let response = routes::dispatch(&self.engine, &self.replication, &mut request);
            if let Err(e) = request.respond(response) {
                tracing::warn!(error = %e, "failed to write http response");
            }
        }
        Ok(())
    }
}

//! Network Module
//!
//! The TCP streaming ingestion façade: a framed stream of put/delete ops,
//! each ACKed with a single byte once durable.
//!
//! ## Architecture
//! - Single acceptor thread
//! - Worker thread pool for connections
//! - Ops applied directly against the shared Engine

mod server;
mod connection;

pub use server::Server;
pub use connection::Connection;

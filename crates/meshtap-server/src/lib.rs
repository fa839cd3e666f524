//! # meshtap-server
//!
//! WebSocket fan-out of decoded mesh packets.
//!
//! - HTTP endpoints: `/health`, `/metrics`
//! - `WebSocket` gateway: `/ws` subscribers, 1008 on every other path,
//!   heartbeat and per-subscriber session tasks
//! - [`websocket::BroadcastHub`]: serialise once, deliver to a snapshot,
//!   prune failing subscribers
//! - [`ingest::Ingestor`]: upstream source → record builder → sink
//! - Graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod config;
pub mod errors;
pub mod health;
pub mod ingest;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use config::ServerConfig;
pub use errors::{Result, ServerError};
pub use ingest::{IngestEnd, IngestReport, Ingestor, JsonLinesSink, RecordSink};
pub use server::MeshtapServer;
pub use websocket::{BroadcastHub, PublishReport, SubscriberId};

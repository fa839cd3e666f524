//! Server error types.

use thiserror::Error;

/// Errors surfaced by the server crate.
///
/// Delivery failures to individual subscribers are not errors; the hub
/// handles them by pruning.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Could not bind the listening socket.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address that was requested.
        addr: String,
        /// Underlying error.
        source: std::io::Error,
    },
    /// The global Prometheus recorder could not be installed.
    #[error("failed to install metrics recorder: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),
    /// A record could not be rendered as JSON.
    #[error("failed to serialize record: {0}")]
    Serialize(#[from] serde_json::Error),
    /// Writing a record to an output stream failed.
    #[error("failed to write record: {0}")]
    Output(#[source] std::io::Error),
}

/// Result type for server operations.
pub type Result<T> = std::result::Result<T, ServerError>;

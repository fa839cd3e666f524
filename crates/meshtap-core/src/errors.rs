//! Error types for frame parsing and upstream sources.
//!
//! Payload decoding never produces these: decoder failures are carried as
//! data inside [`crate::decoder::Decoded`]. These errors cover the edges of
//! the pipeline, where a frame cannot be framed at all or the upstream
//! connection misbehaves.

use thiserror::Error;

/// A serialised frame could not be split into header, path and payload.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum WireError {
    /// Zero-length frame.
    #[error("empty frame")]
    Empty,

    /// The frame ended before a required field.
    #[error("truncated frame: {field} needs {needed} bytes, {available} available")]
    Truncated {
        /// Field being read when the frame ran out.
        field: &'static str,
        /// Bytes required for the field.
        needed: usize,
        /// Bytes left in the frame.
        available: usize,
    },

    /// Declared path length exceeds the protocol maximum.
    #[error("path length {0} exceeds maximum")]
    PathTooLong(usize),

    /// Payload exceeds the protocol maximum.
    #[error("payload length {0} exceeds maximum")]
    PayloadTooLong(usize),

    /// Input was not valid hex.
    #[error("invalid hex: {0}")]
    InvalidHex(String),
}

impl From<hex::FromHexError> for WireError {
    fn from(e: hex::FromHexError) -> Self {
        WireError::InvalidHex(e.to_string())
    }
}

/// Errors raised by a [`crate::source::PacketSource`].
#[derive(Debug, Error)]
pub enum SourceError {
    /// The upstream could not be reached when opening it.
    #[error("failed to connect upstream source {target}: {source}")]
    Connect {
        /// Human-readable description of what was being opened.
        target: String,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// Reading from an established upstream failed.
    #[error("upstream read failed: {0}")]
    Io(#[from] std::io::Error),

    /// The source description itself is invalid.
    #[error("invalid source spec: {0}")]
    InvalidSpec(String),

    /// The upstream went away mid-run.
    #[error("upstream disconnected")]
    Disconnected,
}

/// A line from a line-oriented source could not be turned into an event.
#[derive(Debug, Error)]
pub enum LineError {
    /// The line looked like JSON but did not match the line schema.
    #[error("invalid json line: {0}")]
    Json(#[from] serde_json::Error),

    /// The frame bytes could not be parsed.
    #[error(transparent)]
    Wire(#[from] WireError),

    /// The line exceeded the length limit and was discarded unread.
    #[error("line longer than {max} bytes")]
    TooLong {
        /// Limit in bytes.
        max: usize,
    },

    /// The line is not valid UTF-8.
    #[error("line is not valid utf-8")]
    NotUtf8,
}

//! Upstream packet sources.
//!
//! The protocol node and the companion bridge are external collaborators.
//! They reach the tap through [`PacketSource`], which the ingestion task polls
//! for the next [`UpstreamEvent`].
//!
//! Two implementations live here:
//! - [`channel`]: a callback adapter. The node's "packet received" hook
//!   pushes into a [`channel::PacketSink`] and the tap pulls from the paired
//!   [`channel::ChannelSource`].
//! - [`lines`]: newline-delimited hex or JSON frames read from stdin, a file
//!   or a TCP stream.

pub mod channel;
pub mod lines;

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::errors::SourceError;
use crate::packet::{RawPacket, RxLogEvent};

pub use channel::{ChannelSource, PacketSink};
pub use lines::LineSource;

/// One event handed over by the upstream collaborator.
#[derive(Clone, Debug, PartialEq)]
pub enum UpstreamEvent {
    /// Packet parsed by a full protocol node.
    Packet(RawPacket),
    /// Raw frame reported by a companion device.
    RxLog(RxLogEvent),
}

impl UpstreamEvent {
    /// Short label used in logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Packet(_) => "packet",
            Self::RxLog(_) => "rx_log",
        }
    }
}

/// Pull-based access to an upstream collaborator.
///
/// `recv` suspends until the next event; `Ok(None)` means the upstream is
/// exhausted and no further events will arrive. There is no timeout on
/// arrival: an idle mesh is normal.
#[async_trait]
pub trait PacketSource: Send {
    /// Wait for the next event.
    async fn recv(&mut self) -> Result<Option<UpstreamEvent>, SourceError>;

    /// Release the upstream connection. Subsequent `recv` calls return
    /// `Ok(None)`.
    async fn close(&mut self) -> Result<(), SourceError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Mode
// ─────────────────────────────────────────────────────────────────────────────

/// How frames read from a line source are interpreted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceMode {
    /// Frames are parsed into [`RawPacket`]s and fully decoded.
    #[default]
    Node,
    /// Frames are forwarded as [`RxLogEvent`]s with telemetry only.
    Companion,
}

impl SourceMode {
    /// Lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Node => "node",
            Self::Companion => "companion",
        }
    }
}

impl fmt::Display for SourceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceMode {
    type Err = SourceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "node" => Ok(Self::Node),
            "companion" => Ok(Self::Companion),
            other => Err(SourceError::InvalidSpec(format!("unknown source mode: {other}"))),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Source selection
// ─────────────────────────────────────────────────────────────────────────────

/// Where a line source reads from.
///
/// Textual forms: `stdin` (or `-`), `file:PATH`, `tcp:HOST:PORT`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum SourceSpec {
    /// Standard input.
    #[default]
    Stdin,
    /// A file, read to the end.
    File(PathBuf),
    /// A TCP stream, `HOST:PORT`.
    Tcp(String),
}

impl fmt::Display for SourceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stdin => f.write_str("stdin"),
            Self::File(path) => write!(f, "file:{}", path.display()),
            Self::Tcp(addr) => write!(f, "tcp:{addr}"),
        }
    }
}

impl FromStr for SourceSpec {
    type Err = SourceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s == "stdin" || s == "-" {
            return Ok(Self::Stdin);
        }
        if let Some(path) = s.strip_prefix("file:") {
            if path.is_empty() {
                return Err(SourceError::InvalidSpec("file: needs a path".into()));
            }
            return Ok(Self::File(PathBuf::from(path)));
        }
        if let Some(addr) = s.strip_prefix("tcp:") {
            return match addr.rsplit_once(':') {
                Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => {
                    Ok(Self::Tcp(addr.to_owned()))
                }
                _ => Err(SourceError::InvalidSpec(format!(
                    "tcp source needs HOST:PORT, got {addr:?}"
                ))),
            };
        }
        Err(SourceError::InvalidSpec(format!(
            "expected stdin, file:PATH or tcp:HOST:PORT, got {s:?}"
        )))
    }
}

/// Open a line source. Failing to reach the upstream is returned as
/// [`SourceError::Connect`].
pub async fn open(spec: &SourceSpec, mode: SourceMode) -> Result<Box<dyn PacketSource>, SourceError> {
    let connect_err = |source| SourceError::Connect {
        target: spec.to_string(),
        source,
    };
    let source: Box<dyn PacketSource> = match spec {
        SourceSpec::Stdin => Box::new(LineSource::new(tokio::io::stdin(), mode, spec.to_string())),
        SourceSpec::File(path) => {
            let file = tokio::fs::File::open(path).await.map_err(connect_err)?;
            Box::new(LineSource::new(file, mode, spec.to_string()))
        }
        SourceSpec::Tcp(addr) => {
            let stream = tokio::net::TcpStream::connect(addr.as_str())
                .await
                .map_err(connect_err)?;
            Box::new(LineSource::new(stream, mode, spec.to_string()))
        }
    };
    info!(source = %spec, %mode, "upstream source opened");
    Ok(source)
}

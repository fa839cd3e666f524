//! Settings model.
//!
//! Every struct is `#[serde(default)]` so a settings file only needs the
//! keys it changes.

use std::time::Duration;

use meshtap_core::SourceSpec;
use meshtap_core::source::SourceMode;
use meshtap_logging::LogFormat;
use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshtapSettings {
    /// WebSocket server.
    pub server: ServerSettings,
    /// Upstream packet source.
    pub source: SourceSettings,
    /// Logging.
    pub logging: LoggingSettings,
}

/// WebSocket server settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Bind host.
    pub host: String,
    /// Bind port. `0` picks a free port.
    pub port: u16,
    /// Per-subscriber delivery timeout; exceeding it prunes the subscriber.
    pub send_timeout_ms: u64,
    /// Outbound queue depth per subscriber.
    pub queue_capacity: usize,
    /// Connections beyond this are closed with "try again later".
    pub max_connections: usize,
    /// Interval between server pings.
    pub heartbeat_interval_secs: u64,
    /// Close a subscriber that has not answered pings for this long.
    pub heartbeat_timeout_secs: u64,
    /// Upper bound on graceful shutdown.
    pub shutdown_timeout_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8080,
            send_timeout_ms: 2_000,
            queue_capacity: 256,
            max_connections: 256,
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 90,
            shutdown_timeout_secs: 10,
        }
    }
}

impl ServerSettings {
    /// `host:port` for binding.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Delivery timeout as a [`Duration`].
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }
}

/// Upstream source settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceSettings {
    /// `stdin`, `file:PATH` or `tcp:HOST:PORT`.
    pub spec: String,
    /// How frames are interpreted.
    pub mode: SourceMode,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            spec: "stdin".into(),
            mode: SourceMode::Node,
        }
    }
}

impl SourceSettings {
    /// Parsed source spec.
    pub fn parsed_spec(&self) -> Result<SourceSpec> {
        self.spec
            .parse()
            .map_err(|e: meshtap_core::SourceError| SettingsError::InvalidValue(e.to_string()))
    }
}

/// Logging settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
    /// Output format.
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: LogFormat::Compact,
        }
    }
}

impl MeshtapSettings {
    /// Reject values the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.server.send_timeout_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "server.send_timeout_ms must be greater than zero".into(),
            ));
        }
        if self.server.queue_capacity == 0 {
            return Err(SettingsError::InvalidValue(
                "server.queue_capacity must be greater than zero".into(),
            ));
        }
        if self.server.heartbeat_interval_secs == 0 {
            return Err(SettingsError::InvalidValue(
                "server.heartbeat_interval_secs must be greater than zero".into(),
            ));
        }
        let _ = self.source.parsed_spec()?;
        Ok(())
    }
}

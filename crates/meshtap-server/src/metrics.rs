//! Prometheus metrics recorder and `/metrics` rendering.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::info;

use crate::errors::Result;

/// Install the Prometheus metrics recorder (global).
///
/// Call once at startup, before any metric is recorded.
pub fn install_recorder() -> Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Render Prometheus text format from the installed recorder.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

// Metric names, shared by the hub, gateway and ingestor.

/// Upstream events received (counter, labels: kind).
pub const PACKETS_RECEIVED_TOTAL: &str = "packets_received_total";
/// Records handed to at least one subscriber (counter).
pub const RECORDS_PUBLISHED_TOTAL: &str = "records_published_total";
/// Deliveries that failed and pruned a subscriber (counter).
pub const DELIVERIES_FAILED_TOTAL: &str = "deliveries_failed_total";
/// WebSocket subscribers accepted (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// WebSocket upgrades refused (counter, labels: reason).
pub const WS_CONNECTIONS_REJECTED_TOTAL: &str = "ws_connections_rejected_total";
/// Live WebSocket subscribers (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// Subscriber lifetime (histogram).
pub const WS_CONNECTION_DURATION_SECONDS: &str = "ws_connection_duration_seconds";

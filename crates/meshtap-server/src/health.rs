//! `/health` endpoint.

use serde::Serialize;
use std::time::Instant;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` when the server is running.
    pub status: String,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Currently registered subscribers.
    pub subscribers: usize,
    /// Publish passes that reached at least one subscriber.
    pub packets_published: u64,
}

/// Build a health response from live counters.
pub fn health_check(start_time: Instant, subscribers: usize, packets_published: u64) -> HealthResponse {
    HealthResponse {
        status: "ok".into(),
        uptime_secs: start_time.elapsed().as_secs(),
        subscribers,
        packets_published,
    }
}

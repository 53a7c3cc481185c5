//! Health check payload.

use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Response body for `GET /health`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Always `"ok"` while the process is serving.
    pub status: String,
    /// RFC-3339 timestamp of when the server started.
    pub started_at: String,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Live WebSocket session count.
    pub connections: usize,
}

/// Build the current health snapshot.
pub fn health_check(
    start_time: Instant,
    started_at: DateTime<Utc>,
    connections: usize,
) -> HealthResponse {
    HealthResponse {
        status: "ok".into(),
        started_at: started_at.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
        uptime_secs: start_time.elapsed().as_secs(),
        connections,
    }
}

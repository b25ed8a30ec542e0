//! Health check endpoint handler.
//!
//! This module provides the `/health` endpoint handler that returns
//! collector health statistics as plain text.

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use tracing::{debug, instrument};

use crate::state::SharedState;

// Time conversion constants
const SECONDS_PER_HOUR: f64 = 3600.0;
const MINUTES_PER_HOUR: f64 = 60.0;
const HOURS_PER_DAY: f64 = 24.0;

/// Formats an uptime in the largest fitting unit.
pub fn format_uptime(uptime_seconds: u64) -> String {
    let uptime_hours = uptime_seconds as f64 / SECONDS_PER_HOUR;
    if uptime_hours < 1.0 {
        format!("{:.1} minutes", uptime_hours * MINUTES_PER_HOUR)
    } else if uptime_hours < HOURS_PER_DAY {
        format!("{:.1} hours", uptime_hours)
    } else {
        format!("{:.1} days", uptime_hours / HOURS_PER_DAY)
    }
}

/// Handler for the /health endpoint.
///
/// 200 when the last collection cycle enumerated instances, 503 otherwise
/// (including before the first cycle has finished).
#[instrument(skip(state))]
pub async fn health_handler(State(state): State<SharedState>) -> impl IntoResponse {
    debug!("Processing /health request");

    let healthy = state.health.is_healthy();
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let message = if healthy {
        "OK".to_string()
    } else {
        match state.health.last_error() {
            Some(e) => format!("Collection failed: {e}"),
            None => "Waiting for first collection cycle".to_string(),
        }
    };

    let uptime_str = format_uptime(state.health.get_uptime_seconds());
    let table = state.health.render_table();
    let uri = state.config.libvirt_uri();

    debug!("Health check: {} - {}", status, message);
    (
        status,
        [("Content-Type", "text/plain; charset=utf-8")],
        format!("{message}\n\nHypervisor: {uri}\nUptime: {uptime_str}\n\n{table}"),
    )
}

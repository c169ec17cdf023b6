//! Liveness endpoint for monitors and load balancers.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use blewatch_core::{TrackerResult, TrackerStatus};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::state::SharedState;

/// Overall service condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// The tracker answers commands.
    Ok,
    /// The tracker task is gone; only a restart recovers.
    Unavailable,
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "status": "ok",
    "version": "0.1.0",
    "uptime_secs": 3600,
    "scanner": "listening"
}))]
pub struct HealthResponse {
    /// Service condition.
    pub status: HealthStatus,

    /// Service version from Cargo.toml.
    #[schema(example = "0.1.0")]
    pub version: String,

    /// Seconds since the server started.
    #[schema(example = 3600, minimum = 0)]
    pub uptime_secs: u64,

    /// Scanner lifecycle state, absent when the tracker does not answer.
    #[schema(example = "listening")]
    pub scanner: Option<String>,
}

impl HealthResponse {
    fn new(tracker: TrackerResult<TrackerStatus>, uptime_secs: u64) -> (StatusCode, Self) {
        let (code, status, scanner) = match tracker {
            Ok(s) => (StatusCode::OK, HealthStatus::Ok, Some(s.state.to_string())),
            Err(_) => (StatusCode::SERVICE_UNAVAILABLE, HealthStatus::Unavailable, None),
        };
        let body = Self {
            status,
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_secs,
            scanner,
        };
        (code, body)
    }
}

/// Creates the health router.
pub fn router() -> Router<SharedState> {
    Router::new().route("/", get(health_check))
}

/// Health check endpoint.
///
/// A stopped scanner is still healthy. Only a tracker that no longer answers
/// makes this return 503.
#[utoipa::path(
    get,
    path = "/health",
    tag = "system",
    operation_id = "healthCheck",
    summary = "Check service health",
    description = "Returns service status, uptime, and the scanner state. Use this \
        endpoint for load balancer health checks and monitoring.",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
        (status = 503, description = "Tracker is not answering", body = HealthResponse)
    )
)]
pub async fn health_check(
    State(state): State<SharedState>,
) -> (StatusCode, Json<HealthResponse>) {
    let uptime = Utc::now().signed_duration_since(state.started_at);
    let uptime_secs = u64::try_from(uptime.num_seconds()).unwrap_or(0);

    let (code, body) = HealthResponse::new(state.tracker.status().await, uptime_secs);
    (code, Json(body))
}

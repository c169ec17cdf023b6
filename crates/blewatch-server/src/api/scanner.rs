//! Scanner lifecycle API endpoints.
//!
//! Starting the scanner opens the advertisement source; stopping it closes
//! the source and forgets every device.

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use blewatch_core::TrackerStatus;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::api::error::ApiResult;
use crate::state::SharedState;

/// Creates the scanner router.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/", get(get_scanner))
        .route("/start", post(start_scanner))
        .route("/stop", post(stop_scanner))
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// Scanner status.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "state": "listening",
    "device_count": 4,
    "heartbeat_timeout_secs": 30
}))]
pub struct ScannerResponse {
    /// `listening` or `stopped`.
    #[schema(example = "listening")]
    pub state: String,

    /// Devices currently tracked.
    #[schema(example = 4, minimum = 0)]
    pub device_count: usize,

    /// Silence after which a device is dropped.
    #[schema(example = 30, minimum = 1)]
    pub heartbeat_timeout_secs: u64,
}

impl From<TrackerStatus> for ScannerResponse {
    fn from(status: TrackerStatus) -> Self {
        Self {
            state: status.state.to_string(),
            device_count: status.device_count,
            heartbeat_timeout_secs: status.heartbeat_timeout.as_secs(),
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Get scanner status.
#[utoipa::path(
    get,
    path = "/api/scanner",
    tag = "scanner",
    operation_id = "getScanner",
    summary = "Get scanner status",
    responses(
        (status = 200, description = "Scanner status", body = ScannerResponse)
    )
)]
pub async fn get_scanner(State(state): State<SharedState>) -> ApiResult<Json<ScannerResponse>> {
    let status = state.tracker.status().await?;
    Ok(Json(status.into()))
}

/// Start listening for advertisements.
#[utoipa::path(
    post,
    path = "/api/scanner/start",
    tag = "scanner",
    operation_id = "startScanner",
    summary = "Start the scanner",
    description = "Opens the advertisement source. Calling this while the \
        scanner is already listening has no effect.",
    responses(
        (status = 200, description = "Scanner is listening", body = ScannerResponse),
        (status = 403, description = "Not permitted to scan", body = crate::api::error::ErrorResponse),
        (status = 503, description = "Bluetooth adapter unavailable", body = crate::api::error::ErrorResponse)
    )
)]
pub async fn start_scanner(State(state): State<SharedState>) -> ApiResult<Json<ScannerResponse>> {
    state.tracker.start().await?;
    let status = state.tracker.status().await?;
    Ok(Json(status.into()))
}

/// Stop listening and forget every device.
#[utoipa::path(
    post,
    path = "/api/scanner/stop",
    tag = "scanner",
    operation_id = "stopScanner",
    summary = "Stop the scanner",
    description = "Closes the advertisement source and clears the registry. \
        Calling this while the scanner is stopped has no effect.",
    responses(
        (status = 200, description = "Scanner is stopped", body = ScannerResponse)
    )
)]
pub async fn stop_scanner(State(state): State<SharedState>) -> ApiResult<Json<ScannerResponse>> {
    state.tracker.stop().await?;
    let status = state.tracker.status().await?;
    Ok(Json(status.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use blewatch_core::TrackerState;
    use std::time::Duration;

    #[test]
    fn test_scanner_response_from_status() {
        let response = ScannerResponse::from(TrackerStatus {
            state: TrackerState::Listening,
            device_count: 3,
            heartbeat_timeout: Duration::from_secs(30),
        });

        assert_eq!(response.state, "listening");
        assert_eq!(response.device_count, 3);
        assert_eq!(response.heartbeat_timeout_secs, 30);
    }
}

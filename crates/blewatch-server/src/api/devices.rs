//! Device registry API endpoints.
//!
//! Every read goes through the tracker, which evicts silent devices before
//! answering, so a listed device was heard within the heartbeat timeout.

use std::time::Instant;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use blewatch_core::{DeviceAddress, DeviceRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::api::error::{ApiError, ApiResult};
use crate::state::SharedState;

/// Creates the devices router.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/", get(list_devices))
        .route("/{address}", get(get_device))
        .route("/{address}/refresh", post(refresh_device))
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// A tracked Bluetooth LE device.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "address": "AA:BB:CC:DD:EE:FF",
    "name": "Heart Rate Strap",
    "rssi_dbm": -62,
    "last_seen_secs_ago": 0.8,
    "last_seen_utc": "2025-01-15T03:30:00Z",
    "connected": false,
    "pairable": null,
    "paired": null,
    "platform_id": null
}))]
pub struct DeviceResponse {
    /// 48-bit hardware address.
    #[schema(example = "AA:BB:CC:DD:EE:FF")]
    pub address: String,

    /// Advertised name, absent until the device has advertised one.
    #[schema(example = "Heart Rate Strap")]
    pub name: Option<String>,

    /// Signal strength of the latest sighting in dBm.
    #[schema(example = -62)]
    pub rssi_dbm: i16,

    /// Seconds since the latest sighting.
    #[schema(example = 0.8, minimum = 0)]
    pub last_seen_secs_ago: f64,

    /// Wall-clock estimate of the latest sighting.
    #[schema(example = "2025-01-15T03:30:00Z")]
    pub last_seen_utc: String,

    /// Connection state, when reported.
    pub connected: Option<bool>,

    /// Pairability, when reported.
    pub pairable: Option<bool>,

    /// Bond state, when reported.
    pub paired: Option<bool>,

    /// Platform-issued identifier, when known.
    pub platform_id: Option<String>,
}

impl DeviceResponse {
    /// Renders `record` relative to the given instant and wall-clock time.
    #[must_use]
    pub fn from_record(record: DeviceRecord, now: Instant, now_utc: DateTime<Utc>) -> Self {
        let age = now.saturating_duration_since(record.last_seen);
        let last_seen_utc = chrono::Duration::from_std(age)
            .ok()
            .and_then(|age| now_utc.checked_sub_signed(age))
            .unwrap_or(now_utc);

        Self {
            address: record.address.to_string(),
            name: record.name().map(str::to_string),
            rssi_dbm: record.rssi,
            last_seen_secs_ago: age.as_secs_f64(),
            last_seen_utc: last_seen_utc.to_rfc3339(),
            connected: record.connected,
            pairable: record.pairable,
            paired: record.paired,
            platform_id: record.platform_id,
        }
    }
}

/// Device list response.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DevicesResponse {
    /// Tracked devices ordered by address.
    pub devices: Vec<DeviceResponse>,

    /// Number of devices returned.
    #[schema(example = 1, minimum = 0)]
    pub count: usize,

    /// When the list was taken.
    #[schema(example = "2025-01-15T03:30:00Z")]
    pub listed_at_utc: String,
}

// ============================================================================
// Handlers
// ============================================================================

fn parse_address(raw: &str) -> ApiResult<DeviceAddress> {
    raw.parse::<DeviceAddress>().map_err(ApiError::from)
}

/// List every tracked device.
#[utoipa::path(
    get,
    path = "/api/devices",
    tag = "devices",
    operation_id = "listDevices",
    summary = "List tracked devices",
    description = "Returns every device heard within the heartbeat timeout, \
        ordered by address. The list is empty while the scanner is stopped.",
    responses(
        (status = 200, description = "Current devices", body = DevicesResponse)
    )
)]
pub async fn list_devices(State(state): State<SharedState>) -> ApiResult<Json<DevicesResponse>> {
    let records = state.tracker.current_devices().await?;

    let now = state.tracker.now();
    let now_utc = Utc::now();
    let devices: Vec<DeviceResponse> = records
        .into_iter()
        .map(|record| DeviceResponse::from_record(record, now, now_utc))
        .collect();

    Ok(Json(DevicesResponse {
        count: devices.len(),
        devices,
        listed_at_utc: now_utc.to_rfc3339(),
    }))
}

/// Get one tracked device.
#[utoipa::path(
    get,
    path = "/api/devices/{address}",
    tag = "devices",
    operation_id = "getDevice",
    summary = "Get a tracked device",
    params(
        ("address" = String, Path, description = "Device address, XX:XX:XX:XX:XX:XX")
    ),
    responses(
        (status = 200, description = "The device", body = DeviceResponse),
        (status = 400, description = "Malformed address", body = crate::api::error::ErrorResponse),
        (status = 404, description = "Device is not tracked", body = crate::api::error::ErrorResponse)
    )
)]
pub async fn get_device(
    State(state): State<SharedState>,
    Path(address): Path<String>,
) -> ApiResult<Json<DeviceResponse>> {
    let address = parse_address(&address)?;

    let record = state
        .tracker
        .device(address)
        .await?
        .ok_or_else(|| ApiError::NotFound {
            error_code: "device_not_found".to_string(),
            message: format!("Device {address} is not being tracked"),
        })?;

    Ok(Json(DeviceResponse::from_record(
        record,
        state.tracker.now(),
        Utc::now(),
    )))
}

/// Re-resolve a tracked device.
#[utoipa::path(
    post,
    path = "/api/devices/{address}/refresh",
    tag = "devices",
    operation_id = "refreshDevice",
    summary = "Refresh a tracked device",
    description = "Looks the device up again through the platform and stores \
        the resolved name and flags. Requires the scanner to be listening.",
    params(
        ("address" = String, Path, description = "Device address, XX:XX:XX:XX:XX:XX")
    ),
    responses(
        (status = 200, description = "The refreshed device", body = DeviceResponse),
        (status = 400, description = "Malformed address", body = crate::api::error::ErrorResponse),
        (status = 404, description = "Device is not tracked", body = crate::api::error::ErrorResponse),
        (status = 409, description = "Scanner is stopped", body = crate::api::error::ErrorResponse),
        (status = 502, description = "Platform lookup failed", body = crate::api::error::ErrorResponse)
    )
)]
pub async fn refresh_device(
    State(state): State<SharedState>,
    Path(address): Path<String>,
) -> ApiResult<Json<DeviceResponse>> {
    let address = parse_address(&address)?;
    let record = state.tracker.refresh_device(address).await?;

    tracing::info!(address = %address, name = record.name().unwrap_or_default(), "Device refreshed");

    Ok(Json(DeviceResponse::from_record(
        record,
        state.tracker.now(),
        Utc::now(),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn record(name: &str, last_seen: Instant) -> DeviceRecord {
        let address: DeviceAddress = "AA:BB:CC:DD:EE:01".parse().unwrap();
        DeviceRecord::new(address, name, -62, last_seen)
    }

    #[test]
    fn test_unnamed_device_renders_without_name() {
        let now = Instant::now();
        let response = DeviceResponse::from_record(record("", now), now, Utc::now());

        assert_eq!(response.address, "AA:BB:CC:DD:EE:01");
        assert!(response.name.is_none());
        assert!(response.last_seen_secs_ago.abs() < f64::EPSILON);
    }

    #[test]
    fn test_age_is_measured_from_last_sighting() {
        let seen = Instant::now();
        let now = seen + Duration::from_secs(3);
        let now_utc = Utc::now();
        let response = DeviceResponse::from_record(record("Strap", seen), now, now_utc);

        assert_eq!(response.name.as_deref(), Some("Strap"));
        assert!((response.last_seen_secs_ago - 3.0).abs() < 1e-6);
        let expected = (now_utc - chrono::Duration::seconds(3)).to_rfc3339();
        assert_eq!(response.last_seen_utc, expected);
    }

    #[test]
    fn test_invalid_address_is_rejected() {
        assert!(matches!(
            parse_address("not-an-address"),
            Err(ApiError::BadRequest { .. })
        ));
        assert!(parse_address("aa:bb:cc:dd:ee:ff").is_ok());
    }
}

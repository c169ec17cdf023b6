//! OpenAPI specification generation for the blewatch API.
//!
//! The document is served at `/api/openapi.json` and written to the workspace
//! root by the `gen-openapi` binary for client generation.

use axum::Json;
use utoipa::OpenApi;

use super::devices::{DeviceResponse, DevicesResponse};
use super::error::ErrorResponse;
use super::health::{HealthResponse, HealthStatus};
use super::scanner::ScannerResponse;

/// Serve the OpenAPI specification as JSON.
pub async fn get_openapi_spec() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Returns the OpenAPI specification as pretty-printed JSON.
///
/// # Errors
///
/// Returns an error if the document cannot be serialized.
pub fn get_openapi_json() -> Result<String, serde_json::Error> {
    ApiDoc::openapi().to_pretty_json()
}

/// Main OpenAPI document structure for blewatch.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "blewatch API",
        version = "0.1.0",
        description = r#"
# blewatch API

blewatch keeps a live registry of the Bluetooth Low Energy devices advertising
near this host.

## Overview

1. **Scanner**: Start and stop listening for advertisements
2. **Devices**: Read the devices heard within the heartbeat timeout
3. **Refresh**: Re-resolve one device's name and connection flags

Devices that stay silent longer than the heartbeat timeout are dropped before
any read is answered. Stopping the scanner forgets every device.
"#,
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    servers(
        (url = "/", description = "Local blewatch server")
    ),
    tags(
        (
            name = "system",
            description = "Health checks"
        ),
        (
            name = "scanner",
            description = "Scanner lifecycle"
        ),
        (
            name = "devices",
            description = "Tracked Bluetooth LE devices"
        )
    ),
    paths(
        // Health endpoints
        super::health::health_check,
        // Scanner endpoints
        super::scanner::get_scanner,
        super::scanner::start_scanner,
        super::scanner::stop_scanner,
        // Device endpoints
        super::devices::list_devices,
        super::devices::get_device,
        super::devices::refresh_device,
    ),
    components(
        schemas(
            ErrorResponse,
            HealthResponse,
            HealthStatus,
            ScannerResponse,
            DeviceResponse,
            DevicesResponse,
        )
    )
)]
pub struct ApiDoc;

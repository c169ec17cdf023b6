//! HTTP API routes and handlers.
//!
//! This module contains all HTTP endpoint implementations organized by domain:
//! - `devices` - The live device registry
//! - `scanner` - Scanner lifecycle
//! - `health` - Service health checks
//! - `error` - API error types
//! - `openapi` - OpenAPI specification generation

use axum::routing::get;
use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::SharedState;

pub mod devices;
pub mod error;
pub mod health;
pub mod openapi;
pub mod scanner;

// Re-export commonly used types
pub use error::{ApiError, ApiResult, ErrorResponse};

// Re-export OpenAPI utilities for the gen-openapi binary
pub use openapi::get_openapi_json;

/// Creates the combined API router with all endpoints.
///
/// # Route Structure
///
/// ```text
/// /health                        - Health check
/// /api
/// ├── /devices                   - Tracked devices
/// │   ├── /{address}             - One device
/// │   └── /{address}/refresh     - Re-resolve one device
/// ├── /scanner                   - Scanner status
/// │   ├── /start
/// │   └── /stop
/// └── /openapi.json              - OpenAPI specification
/// ```
pub fn create_router(state: SharedState) -> Router {
    Router::new()
        .nest("/health", health::router())
        .nest(
            "/api",
            Router::new()
                .nest("/devices", devices::router())
                .nest("/scanner", scanner::router())
                // OpenAPI spec at /api/openapi.json
                .route("/openapi.json", get(openapi::get_openapi_spec)),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request, StatusCode};
    use axum::response::Response;
    use blewatch_core::{
        Clock, Config, DeviceAddress, DiscoveryTracker, ManualClock, MockLookup, MockSource,
        MockSourceHandle, Sighting, SourceError, TrackerEvent,
    };
    use tower::ServiceExt;

    use super::*;
    use crate::state::AppState;

    struct TestApp {
        router: Router,
        handle: MockSourceHandle,
        clock: ManualClock,
        state: SharedState,
    }

    fn test_app() -> TestApp {
        let (source, handle) = MockSource::new();
        let clock = ManualClock::new();
        let config = Config::default();
        let tracker = DiscoveryTracker::builder(Arc::new(source))
            .lookup(Arc::new(MockLookup::new()))
            .clock(Arc::new(clock.clone()))
            .config(config.tracker.clone())
            .build();
        let state = AppState::new(tracker, config);
        TestApp {
            router: create_router(Arc::clone(&state)),
            handle,
            clock,
            state,
        }
    }

    impl TestApp {
        async fn send(&self, method: Method, uri: &str) -> Response {
            let request = Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())
                .unwrap();
            self.router.clone().oneshot(request).await.unwrap()
        }

        /// Pushes a sighting and waits until the tracker has applied it.
        async fn sight(&self, address: &str, name: Option<&str>) {
            let mut events = self.state.tracker.subscribe();
            let address: DeviceAddress = address.parse().unwrap();
            let sighting =
                Sighting::new(address, name.map(str::to_string), -60, self.clock.now());
            assert!(self.handle.push(sighting).await);

            loop {
                let event = tokio::time::timeout(Duration::from_secs(2), events.recv())
                    .await
                    .unwrap()
                    .unwrap();
                if matches!(event, TrackerEvent::DeviceDiscovered(ref d) if d.address == address) {
                    break;
                }
            }
        }
    }

    async fn json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_check() {
        let app = test_app();
        let response = app.send(Method::GET, "/health").await;

        assert_eq!(response.status(), StatusCode::OK);
        let body = json(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["scanner"], "stopped");

        app.send(Method::POST, "/api/scanner/start").await;
        let body = json(app.send(Method::GET, "/health").await).await;
        assert_eq!(body["scanner"], "listening");
    }

    #[tokio::test]
    async fn test_devices_empty_while_stopped() {
        let app = test_app();
        let response = app.send(Method::GET, "/api/devices").await;

        assert_eq!(response.status(), StatusCode::OK);
        let body = json(response).await;
        assert_eq!(body["count"], 0);
        assert_eq!(body["devices"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_start_sight_list_and_stop() {
        let app = test_app();

        let response = app.send(Method::POST, "/api/scanner/start").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json(response).await["state"], "listening");

        app.sight("AA:BB:CC:DD:EE:02", Some("Strap")).await;
        app.sight("AA:BB:CC:DD:EE:01", None).await;

        let body = json(app.send(Method::GET, "/api/devices").await).await;
        assert_eq!(body["count"], 2);
        assert_eq!(body["devices"][0]["address"], "AA:BB:CC:DD:EE:01");
        assert!(body["devices"][0]["name"].is_null());
        assert_eq!(body["devices"][1]["name"], "Strap");

        let body = json(app.send(Method::GET, "/api/devices/aa:bb:cc:dd:ee:02").await).await;
        assert_eq!(body["address"], "AA:BB:CC:DD:EE:02");
        assert_eq!(body["rssi_dbm"], -60);

        let response = app.send(Method::POST, "/api/scanner/stop").await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json(response).await;
        assert_eq!(body["state"], "stopped");
        assert_eq!(body["device_count"], 0);
    }

    #[tokio::test]
    async fn test_silent_device_disappears_from_list() {
        let app = test_app();
        app.send(Method::POST, "/api/scanner/start").await;
        app.sight("AA:BB:CC:DD:EE:01", Some("Strap")).await;

        app.clock.advance(Duration::from_secs(31));

        let body = json(app.send(Method::GET, "/api/devices").await).await;
        assert_eq!(body["count"], 0);
        let response = app.send(Method::GET, "/api/devices/AA:BB:CC:DD:EE:01").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_device_age_uses_tracker_clock() {
        let app = test_app();
        app.send(Method::POST, "/api/scanner/start").await;
        app.sight("AA:BB:CC:DD:EE:01", Some("Strap")).await;

        app.clock.advance(Duration::from_secs(3));

        let body = json(app.send(Method::GET, "/api/devices/AA:BB:CC:DD:EE:01").await).await;
        assert_eq!(body["last_seen_secs_ago"], 3.0);
        let body = json(app.send(Method::GET, "/api/devices").await).await;
        assert_eq!(body["devices"][0]["last_seen_secs_ago"], 3.0);
    }

    #[tokio::test]
    async fn test_malformed_address_is_bad_request() {
        let app = test_app();
        let response = app.send(Method::GET, "/api/devices/not-an-address").await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json(response).await["error"], "invalid_address");
    }

    #[tokio::test]
    async fn test_unknown_device_is_not_found() {
        let app = test_app();
        let response = app.send(Method::GET, "/api/devices/AA:BB:CC:DD:EE:FF").await;

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json(response).await["error"], "device_not_found");
    }

    #[tokio::test]
    async fn test_refresh_while_stopped_is_conflict() {
        let app = test_app();
        let response = app
            .send(Method::POST, "/api/devices/AA:BB:CC:DD:EE:FF/refresh")
            .await;

        assert_eq!(response.status(), StatusCode::CONFLICT);
        let body = json(response).await;
        assert_eq!(body["error"], "invalid_state");
        assert_eq!(body["details"]["state"], "stopped");
    }

    #[tokio::test]
    async fn test_refresh_tracked_device() {
        let app = test_app();
        app.send(Method::POST, "/api/scanner/start").await;
        app.sight("AA:BB:CC:DD:EE:01", Some("Strap")).await;

        let response = app
            .send(Method::POST, "/api/devices/AA:BB:CC:DD:EE:01/refresh")
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json(response).await["name"], "Strap");
    }

    #[tokio::test]
    async fn test_start_failure_is_service_unavailable() {
        let app = test_app();
        app.handle.fail_next_open(SourceError::AdapterPoweredOff);

        let response = app.send(Method::POST, "/api/scanner/start").await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            json(response).await["error"],
            "bluetooth_adapter_powered_off"
        );

        let body = json(app.send(Method::GET, "/api/scanner").await).await;
        assert_eq!(body["state"], "stopped");
    }

    #[tokio::test]
    async fn test_openapi_document_is_served() {
        let app = test_app();
        let response = app.send(Method::GET, "/api/openapi.json").await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json(response).await["info"]["title"], "blewatch API");
    }
}

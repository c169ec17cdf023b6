//! Application state shared across handlers.

use std::sync::Arc;

use blewatch_core::{
    AdvertisementSource, BlewatchError, Config, DeviceInfoLookup, DiscoveryTracker,
};
use chrono::{DateTime, Utc};
use tracing::{info, warn};

/// State handed to every handler.
pub type SharedState = Arc<AppState>;

/// Shared application state.
///
/// The tracker is itself a cloneable handle onto a single actor, so no lock
/// is needed here. The configuration is read-only once the server is up.
#[derive(Debug)]
pub struct AppState {
    /// The discovery tracker.
    pub tracker: DiscoveryTracker,

    /// Configuration the server was started with.
    pub config: Config,

    /// When the server started.
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Wraps an already-built tracker.
    #[must_use]
    pub fn new(tracker: DiscoveryTracker, config: Config) -> SharedState {
        Arc::new(Self {
            tracker,
            config,
            started_at: Utc::now(),
        })
    }

    /// Builds the tracker described by `config` and wraps it.
    ///
    /// # Errors
    ///
    /// Returns an error if enrichment is enabled and the lookup cannot be
    /// connected.
    pub async fn from_config(config: Config) -> anyhow::Result<SharedState> {
        let (source, lookup) = collaborators(&config).await?;

        let mut builder = DiscoveryTracker::builder(source).config(config.tracker.clone());
        if let Some(lookup) = lookup {
            builder = builder.lookup(lookup);
        }

        Ok(Self::new(builder.build(), config))
    }

    /// Starts the scanner at boot.
    ///
    /// A source that cannot be opened (no adapter, radio off, no permission)
    /// is logged and left stopped so the API still comes up.
    ///
    /// # Errors
    ///
    /// Returns any failure that is not a source failure.
    pub async fn auto_start(&self) -> blewatch_core::Result<()> {
        let Err(e) = self.tracker.start().await else {
            return Ok(());
        };

        let err = BlewatchError::from(e);
        if err.is_source_error() {
            warn!(
                error = %err,
                code = err.error_code(),
                "Scanner did not start; use POST /api/scanner/start to retry"
            );
            return Ok(());
        }
        Err(err)
    }
}

type Collaborators = (
    Arc<dyn AdvertisementSource>,
    Option<Arc<dyn DeviceInfoLookup>>,
);

#[cfg(feature = "bluetooth")]
async fn collaborators(config: &Config) -> anyhow::Result<Collaborators> {
    use blewatch_core::{BluezLookup, BluezSource};

    let adapter = config.bluetooth.adapter.clone();
    info!(
        adapter = adapter.as_deref().unwrap_or("default"),
        duplicate_data = config.bluetooth.duplicate_data,
        "Using BlueZ advertisement source"
    );
    let source = Arc::new(BluezSource::new(adapter, config.bluetooth.duplicate_data));

    let lookup: Option<Arc<dyn DeviceInfoLookup>> = if config.bluetooth.enrich {
        let lookup = BluezLookup::connect(config.bluetooth.adapter.as_deref()).await?;
        Some(Arc::new(lookup))
    } else {
        None
    };

    Ok((source, lookup))
}

#[cfg(not(feature = "bluetooth"))]
#[allow(clippy::unused_async)]
async fn collaborators(config: &Config) -> anyhow::Result<Collaborators> {
    use blewatch_core::{MockLookup, MockSource};

    tracing::warn!("Built without the 'bluetooth' feature; using an in-memory source that reports nothing");
    let (source, _handle) = MockSource::new();

    let lookup: Option<Arc<dyn DeviceInfoLookup>> = if config.bluetooth.enrich {
        info!("Enrichment enabled with an in-memory lookup");
        Some(Arc::new(MockLookup::new()))
    } else {
        None
    };

    Ok((Arc::new(source), lookup))
}

#[cfg(all(test, not(feature = "bluetooth")))]
mod tests {
    use super::*;
    use blewatch_core::{MockSource, SourceError, TrackerState};
    use tokio_test::assert_ok;

    #[tokio::test]
    async fn test_from_config_builds_stopped_tracker() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[tracker]\nheartbeat_timeout_secs = 7\n").unwrap();
        let config = Config::load(&path).unwrap();

        let state = AppState::from_config(config).await.unwrap();
        let status = state.tracker.status().await.unwrap();

        assert_eq!(status.state, TrackerState::Stopped);
        assert_eq!(status.heartbeat_timeout.as_secs(), 7);
    }

    #[tokio::test]
    async fn test_auto_start_tolerates_source_failure() {
        let (source, handle) = MockSource::new();
        let state = AppState::new(DiscoveryTracker::new(Arc::new(source)), Config::default());

        handle.fail_next_open(SourceError::AdapterNotFound);
        assert_ok!(state.auto_start().await);
        assert_eq!(state.tracker.status().await.unwrap().state, TrackerState::Stopped);

        assert_ok!(state.auto_start().await);
        assert_eq!(state.tracker.status().await.unwrap().state, TrackerState::Listening);
        assert_ok!(state.tracker.stop().await);
    }
}

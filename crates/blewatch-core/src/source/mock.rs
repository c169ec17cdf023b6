//! In-memory collaborators.
//!
//! [`MockSource`] lets tests and radio-less deployments drive the tracker by
//! hand through a [`MockSourceHandle`]. [`MockLookup`] answers lookups from a
//! map.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::{
    AdvertisementSource, DeviceInfo, DeviceInfoLookup, LookupError, Sighting, SourceError,
    SourceEvent,
};
use crate::device::DeviceAddress;

/// Channel depth between the mock source and its consumer.
const MOCK_CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Default)]
struct MockSourceState {
    sender: Option<mpsc::Sender<SourceEvent>>,
    fail_next_open: Option<SourceError>,
    open_count: usize,
}

/// An advertisement source fed by hand.
#[derive(Debug, Clone, Default)]
pub struct MockSource {
    state: Arc<Mutex<MockSourceState>>,
}

/// Pushes events into a [`MockSource`].
#[derive(Debug, Clone)]
pub struct MockSourceHandle {
    state: Arc<Mutex<MockSourceState>>,
}

impl MockSource {
    /// Creates a closed source and the handle that drives it.
    #[must_use]
    pub fn new() -> (Self, MockSourceHandle) {
        let source = Self::default();
        let handle = MockSourceHandle {
            state: Arc::clone(&source.state),
        };
        (source, handle)
    }
}

#[async_trait]
impl AdvertisementSource for MockSource {
    async fn open(&self) -> Result<mpsc::Receiver<SourceEvent>, SourceError> {
        let mut state = self.state.lock();
        if let Some(err) = state.fail_next_open.take() {
            return Err(err);
        }
        let (tx, rx) = mpsc::channel(MOCK_CHANNEL_CAPACITY);
        state.sender = Some(tx);
        state.open_count += 1;
        Ok(rx)
    }

    async fn close(&self) {
        self.state.lock().sender = None;
    }
}

impl MockSourceHandle {
    /// Delivers a sighting. Returns `false` if the source is not open.
    pub async fn push(&self, sighting: Sighting) -> bool {
        self.send(SourceEvent::Sighting(sighting)).await
    }

    /// Simulates the medium stopping on its own.
    pub async fn stop_unexpectedly(&self, reason: impl Into<String>) -> bool {
        let delivered = self
            .send(SourceEvent::Stopped {
                reason: reason.into(),
            })
            .await;
        self.state.lock().sender = None;
        delivered
    }

    /// Makes the next `open` fail with `err`.
    pub fn fail_next_open(&self, err: SourceError) {
        self.state.lock().fail_next_open = Some(err);
    }

    /// Whether the source is currently open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state.lock().sender.is_some()
    }

    /// How many times the source was opened successfully.
    #[must_use]
    pub fn open_count(&self) -> usize {
        self.state.lock().open_count
    }

    async fn send(&self, event: SourceEvent) -> bool {
        // Clone the sender so the lock is not held across the await.
        let sender = self.state.lock().sender.clone();
        match sender {
            Some(tx) => tx.send(event).await.is_ok(),
            None => false,
        }
    }
}

/// A lookup answered from an in-memory table.
///
/// Addresses with neither an entry nor a configured failure resolve to an
/// empty [`DeviceInfo`].
#[derive(Debug, Clone, Default)]
pub struct MockLookup {
    entries: Arc<Mutex<HashMap<DeviceAddress, Result<DeviceInfo, LookupError>>>>,
}

impl MockLookup {
    /// Creates an empty lookup.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers lookups for `address` with `info`.
    pub fn insert(&self, address: DeviceAddress, info: DeviceInfo) {
        self.entries.lock().insert(address, Ok(info));
    }

    /// Fails lookups for `address` with `err`.
    pub fn fail(&self, address: DeviceAddress, err: LookupError) {
        self.entries.lock().insert(address, Err(err));
    }
}

#[async_trait]
impl DeviceInfoLookup for MockLookup {
    async fn lookup(&self, address: DeviceAddress) -> Result<DeviceInfo, LookupError> {
        self.entries
            .lock()
            .get(&address)
            .cloned()
            .unwrap_or_else(|| Ok(DeviceInfo::default()))
    }
}

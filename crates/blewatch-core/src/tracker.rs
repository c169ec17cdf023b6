//! The discovery tracker.
//!
//! A [`DiscoveryTracker`] is a cheap, cloneable handle to a single actor task
//! that owns the [`Registry`]. Every read and write travels through the
//! actor's command channel, so registry access is exclusive without a lock,
//! and each sighting's classification happens in the same turn as its write.
//!
//! ```text
//!  AdvertisementSource ──► ingest pump ──(enrich)──► actor ──► broadcast<TrackerEvent>
//!                                                      ▲
//!  start / stop / current_devices / sweep / refresh ───┘
//! ```
//!
//! Enrichment through a [`DeviceInfoLookup`] runs in the pump (or the caller's
//! task for [`DiscoveryTracker::on_sighting`]) and never inside the actor.
//! Events are published after the command's mutation, so subscribers may call
//! back into the tracker freely.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::TrackerConfig;
use crate::device::{DeviceAddress, DeviceRecord};
use crate::events::{StopReason, TrackerEvent};
use crate::registry::Registry;
use crate::source::{
    derive_record, AdvertisementSource, DeviceInfo, DeviceInfoLookup, LookupError, Sighting,
    SourceError, SourceEvent,
};

/// Lifecycle state of the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerState {
    /// Not listening; the registry is empty.
    Stopped,
    /// Accepting sightings.
    Listening,
}

impl TrackerState {
    /// Lower-case name of the state.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Listening => "listening",
        }
    }
}

impl fmt::Display for TrackerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time summary of the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackerStatus {
    /// Lifecycle state.
    pub state: TrackerState,
    /// Devices currently tracked.
    pub device_count: usize,
    /// Configured heartbeat timeout.
    pub heartbeat_timeout: Duration,
}

/// Errors returned by tracker operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TrackerError {
    /// The advertisement source could not be opened.
    #[error("Cannot start tracker: {0}")]
    SourceUnavailable(SourceError),

    /// The process may not open the advertisement source.
    #[error("Cannot start tracker, permission denied: {0}")]
    PermissionDenied(String),

    /// The operation is not valid in the current state.
    #[error("Cannot {operation} while tracker is {state}")]
    InvalidState {
        /// What was attempted.
        operation: &'static str,
        /// The state the tracker was in.
        state: TrackerState,
    },

    /// The address is not in the registry.
    #[error("Device {0} is not being tracked")]
    UnknownDevice(DeviceAddress),

    /// The device-info lookup failed.
    #[error(transparent)]
    Lookup(#[from] LookupError),

    /// The actor task is gone.
    #[error("Tracker task has shut down")]
    Closed,
}

impl From<SourceError> for TrackerError {
    fn from(err: SourceError) -> Self {
        match err {
            SourceError::PermissionDenied { message } => Self::PermissionDenied(message),
            other => Self::SourceUnavailable(other),
        }
    }
}

/// Result alias for tracker operations.
pub type TrackerResult<T> = std::result::Result<T, TrackerError>;

enum Command {
    Activate {
        reply: oneshot::Sender<bool>,
    },
    Deactivate {
        reason: StopReason,
        reply: Option<oneshot::Sender<bool>>,
    },
    Ingest(DeviceRecord),
    Sweep {
        now: Instant,
        timeout: Duration,
        reply: oneshot::Sender<Vec<DeviceRecord>>,
    },
    Snapshot {
        reply: oneshot::Sender<Vec<DeviceRecord>>,
    },
    Get {
        address: DeviceAddress,
        reply: oneshot::Sender<Option<DeviceRecord>>,
    },
    BeginRefresh {
        address: DeviceAddress,
        reply: oneshot::Sender<TrackerResult<()>>,
    },
    CompleteRefresh {
        address: DeviceAddress,
        info: DeviceInfo,
        reply: oneshot::Sender<TrackerResult<DeviceRecord>>,
    },
    Status {
        reply: oneshot::Sender<TrackerStatus>,
    },
}

/// Owns the registry. Runs until every command sender is dropped.
struct TrackerActor {
    registry: Registry,
    state: TrackerState,
    clock: Arc<dyn Clock>,
    timeout: Duration,
    events: broadcast::Sender<TrackerEvent>,
}

impl TrackerActor {
    async fn run(mut self, mut commands: mpsc::Receiver<Command>, sweep_interval: Duration) {
        let mut ticker = tokio::time::interval(sweep_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle(command),
                    None => break,
                },
                _ = ticker.tick() => {
                    if self.state == TrackerState::Listening {
                        let events = self.expire(self.clock.now(), self.timeout);
                        self.publish(events.into_iter().map(TrackerEvent::DeviceTimedOut));
                    }
                }
            }
        }
        debug!("Tracker actor exiting");
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Activate { reply } => {
                let activated = self.state == TrackerState::Stopped;
                if activated {
                    self.state = TrackerState::Listening;
                    info!("Tracker listening");
                    self.publish([TrackerEvent::Started]);
                }
                let _ = reply.send(activated);
            }
            Command::Deactivate { reason, reply } => {
                let deactivated = self.state == TrackerState::Listening;
                if deactivated {
                    self.state = TrackerState::Stopped;
                    let forgotten = self.registry.clear();
                    info!(forgotten, reason = ?reason, "Tracker stopped");
                    self.publish([TrackerEvent::Stopped { reason }]);
                }
                if let Some(reply) = reply {
                    let _ = reply.send(deactivated);
                }
            }
            Command::Ingest(candidate) => {
                if self.state == TrackerState::Stopped {
                    debug!(address = %candidate.address, "Dropping sighting while stopped");
                    return;
                }
                let expired = self.expire(self.clock.now(), self.timeout);
                let applied = self.registry.apply(candidate);
                self.publish(
                    expired
                        .into_iter()
                        .map(TrackerEvent::DeviceTimedOut)
                        .chain(applied),
                );
            }
            Command::Sweep {
                now,
                timeout,
                reply,
            } => {
                let expired = self.expire(now, timeout);
                self.publish(expired.iter().cloned().map(TrackerEvent::DeviceTimedOut));
                let _ = reply.send(expired);
            }
            Command::Snapshot { reply } => {
                self.sweep_now();
                let _ = reply.send(self.registry.snapshot());
            }
            Command::Get { address, reply } => {
                self.sweep_now();
                let _ = reply.send(self.registry.get(&address).cloned());
            }
            Command::BeginRefresh { address, reply } => {
                self.sweep_now();
                let _ = reply.send(self.check_refreshable(address).map(|_| ()));
            }
            Command::CompleteRefresh {
                address,
                info,
                reply,
            } => {
                self.sweep_now();
                let result = match self.check_refreshable(address).cloned() {
                    Ok(mut candidate) => {
                        info.apply_to(&mut candidate);
                        let fallback = candidate.clone();
                        let applied = self.registry.apply(candidate);
                        self.publish(applied);
                        Ok(self.registry.get(&address).cloned().unwrap_or(fallback))
                    }
                    Err(e) => Err(e),
                };
                let _ = reply.send(result);
            }
            Command::Status { reply } => {
                self.sweep_now();
                let _ = reply.send(TrackerStatus {
                    state: self.state,
                    device_count: self.registry.len(),
                    heartbeat_timeout: self.timeout,
                });
            }
        }
    }

    fn check_refreshable(&self, address: DeviceAddress) -> TrackerResult<&DeviceRecord> {
        if self.state != TrackerState::Listening {
            return Err(TrackerError::InvalidState {
                operation: "refresh a device",
                state: self.state,
            });
        }
        self.registry
            .get(&address)
            .ok_or(TrackerError::UnknownDevice(address))
    }

    fn expire(&mut self, now: Instant, timeout: Duration) -> Vec<DeviceRecord> {
        let expired = self.registry.sweep(now, timeout);
        for device in &expired {
            info!(address = %device.address, name = %device.name, "Device timed out");
        }
        expired
    }

    fn sweep_now(&mut self) {
        let expired = self.expire(self.clock.now(), self.timeout);
        self.publish(expired.into_iter().map(TrackerEvent::DeviceTimedOut));
    }

    fn publish(&self, events: impl IntoIterator<Item = TrackerEvent>) {
        for event in events {
            if let TrackerEvent::NewDeviceDiscovered(device) = &event {
                info!(address = %device.address, name = %device.name, rssi = device.rssi, "New device discovered");
            }
            // An error only means nobody is subscribed.
            let _ = self.events.send(event);
        }
    }
}

struct IngestPump {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

struct Shared {
    commands: mpsc::Sender<Command>,
    events: broadcast::Sender<TrackerEvent>,
    source: Arc<dyn AdvertisementSource>,
    lookup: Option<Arc<dyn DeviceInfoLookup>>,
    clock: Arc<dyn Clock>,
    pump: Mutex<Option<IngestPump>>,
}

impl Drop for Shared {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.get_mut() {
            pump.cancel.cancel();
        }
    }
}

/// Derives a record for `sighting` and hands it to the actor.
async fn ingest(
    commands: &mpsc::Sender<Command>,
    lookup: Option<&dyn DeviceInfoLookup>,
    sighting: Sighting,
) {
    let Some(record) = derive_record(sighting, lookup).await else {
        return;
    };
    if commands.send(Command::Ingest(record)).await.is_err() {
        debug!("Tracker closed, dropping sighting");
    }
}

async fn run_pump(
    mut source_events: mpsc::Receiver<SourceEvent>,
    commands: mpsc::Sender<Command>,
    lookup: Option<Arc<dyn DeviceInfoLookup>>,
    cancel: CancellationToken,
) {
    let reason = loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            event = source_events.recv() => match event {
                Some(SourceEvent::Sighting(sighting)) => {
                    ingest(&commands, lookup.as_deref(), sighting).await;
                }
                Some(SourceEvent::Stopped { reason }) => break reason,
                None => break "advertisement source closed".to_string(),
            },
        }
    };

    warn!(%reason, "Advertisement source stopped unexpectedly");
    let _ = commands
        .send(Command::Deactivate {
            reason: StopReason::SourceLost(reason),
            reply: None,
        })
        .await;
}

/// Builds a [`DiscoveryTracker`].
pub struct TrackerBuilder {
    source: Arc<dyn AdvertisementSource>,
    lookup: Option<Arc<dyn DeviceInfoLookup>>,
    clock: Arc<dyn Clock>,
    config: TrackerConfig,
}

impl TrackerBuilder {
    /// Uses `lookup` to enrich every sighting.
    #[must_use]
    pub fn lookup(mut self, lookup: Arc<dyn DeviceInfoLookup>) -> Self {
        self.lookup = Some(lookup);
        self
    }

    /// Reads `now` from `clock` instead of the system clock.
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Applies tracker settings.
    #[must_use]
    pub fn config(mut self, config: TrackerConfig) -> Self {
        self.config = config;
        self
    }

    /// Spawns the actor and returns its handle.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    #[must_use]
    pub fn build(self) -> DiscoveryTracker {
        let (commands, command_rx) = mpsc::channel(self.config.command_capacity.max(1));
        let (events, _) = broadcast::channel(self.config.event_capacity.max(1));

        let actor = TrackerActor {
            registry: Registry::new(),
            state: TrackerState::Stopped,
            clock: Arc::clone(&self.clock),
            timeout: self.config.heartbeat_timeout(),
            events: events.clone(),
        };
        let sweep_interval = self.config.sweep_interval().max(Duration::from_millis(1));
        tokio::spawn(actor.run(command_rx, sweep_interval));

        DiscoveryTracker {
            shared: Arc::new(Shared {
                commands,
                events,
                source: self.source,
                lookup: self.lookup,
                clock: self.clock,
                pump: Mutex::new(None),
            }),
        }
    }
}

/// Handle to the discovery tracker.
#[derive(Clone)]
pub struct DiscoveryTracker {
    shared: Arc<Shared>,
}

impl fmt::Debug for DiscoveryTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiscoveryTracker")
            .field("subscribers", &self.shared.events.receiver_count())
            .field("enriching", &self.shared.lookup.is_some())
            .finish_non_exhaustive()
    }
}

impl DiscoveryTracker {
    /// Starts building a tracker fed by `source`.
    #[must_use]
    pub fn builder(source: Arc<dyn AdvertisementSource>) -> TrackerBuilder {
        TrackerBuilder {
            source,
            lookup: None,
            clock: Arc::new(SystemClock),
            config: TrackerConfig::default(),
        }
    }

    /// Creates a tracker with default settings.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    #[must_use]
    pub fn new(source: Arc<dyn AdvertisementSource>) -> Self {
        Self::builder(source).build()
    }

    /// The current instant on the tracker's clock.
    ///
    /// Ages of [`DeviceRecord::last_seen`] must be measured against this.
    #[must_use]
    pub fn now(&self) -> Instant {
        self.shared.clock.now()
    }

    /// Subscribes to tracker events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<TrackerEvent> {
        self.shared.events.subscribe()
    }

    /// Opens the source and starts listening. Does nothing if already listening.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::SourceUnavailable`] or
    /// [`TrackerError::PermissionDenied`] if the source cannot be opened; the
    /// tracker stays stopped.
    pub async fn start(&self) -> TrackerResult<()> {
        let mut pump = self.shared.pump.lock().await;
        if self.status().await?.state == TrackerState::Listening {
            return Ok(());
        }
        if let Some(stale) = pump.take() {
            // The source stopped on its own; its pump is already winding down.
            stale.cancel.cancel();
            let _ = stale.task.await;
            self.shared.source.close().await;
        }

        let source_events = self.shared.source.open().await.map_err(|e| {
            warn!(error = %e, "Failed to open advertisement source");
            TrackerError::from(e)
        })?;

        self.request(|reply| Command::Activate { reply }).await?;

        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_pump(
            source_events,
            self.shared.commands.clone(),
            self.shared.lookup.clone(),
            cancel.clone(),
        ));
        *pump = Some(IngestPump { cancel, task });
        Ok(())
    }

    /// Stops listening and forgets every device. Does nothing if already stopped.
    ///
    /// If the source already stopped on its own, the tracker is stopped and
    /// [`TrackerEvent::Stopped`] with [`StopReason::SourceLost`] was already
    /// published. This call then only closes the source and publishes nothing.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::Closed`] if the actor is gone.
    pub async fn stop(&self) -> TrackerResult<()> {
        let mut pump = self.shared.pump.lock().await;
        if let Some(running) = pump.take() {
            running.cancel.cancel();
            if let Err(e) = running.task.await {
                warn!(error = %e, "Ingest pump ended abnormally");
            }
            self.shared.source.close().await;
        }

        self.request(|reply| Command::Deactivate {
            reason: StopReason::Requested,
            reply: Some(reply),
        })
        .await?;
        Ok(())
    }

    /// Ingests one sighting. Never fails; unusable sightings are dropped.
    pub async fn on_sighting(&self, sighting: Sighting) {
        ingest(
            &self.shared.commands,
            self.shared.lookup.as_deref(),
            sighting,
        )
        .await;
    }

    /// Evicts records older than `now - timeout` and returns them.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::Closed`] if the actor is gone.
    pub async fn sweep(&self, now: Instant, timeout: Duration) -> TrackerResult<Vec<DeviceRecord>> {
        self.request(|reply| Command::Sweep {
            now,
            timeout,
            reply,
        })
        .await
    }

    /// Sweeps, then returns a copy of every tracked device ordered by address.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::Closed`] if the actor is gone.
    pub async fn current_devices(&self) -> TrackerResult<Vec<DeviceRecord>> {
        self.request(|reply| Command::Snapshot { reply }).await
    }

    /// Sweeps, then returns a copy of one device if tracked.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::Closed`] if the actor is gone.
    pub async fn device(&self, address: DeviceAddress) -> TrackerResult<Option<DeviceRecord>> {
        self.request(|reply| Command::Get { address, reply }).await
    }

    /// Re-resolves a tracked device through the lookup and stores the result.
    ///
    /// Without a configured lookup the current record is returned unchanged.
    ///
    /// # Errors
    ///
    /// - [`TrackerError::InvalidState`] if the tracker is stopped
    /// - [`TrackerError::UnknownDevice`] if the address is not tracked
    /// - [`TrackerError::Lookup`] if the lookup fails
    pub async fn refresh_device(&self, address: DeviceAddress) -> TrackerResult<DeviceRecord> {
        self.request(|reply| Command::BeginRefresh { address, reply })
            .await??;

        let info = match &self.shared.lookup {
            Some(lookup) => lookup.lookup(address).await?,
            None => DeviceInfo::default(),
        };

        self.request(|reply| Command::CompleteRefresh {
            address,
            info,
            reply,
        })
        .await?
    }

    /// Sweeps, then reports state and device count.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::Closed`] if the actor is gone.
    pub async fn status(&self) -> TrackerResult<TrackerStatus> {
        self.request(|reply| Command::Status { reply }).await
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> TrackerResult<T> {
        let (reply, response) = oneshot::channel();
        self.shared
            .commands
            .send(command(reply))
            .await
            .map_err(|_| TrackerError::Closed)?;
        response.await.map_err(|_| TrackerError::Closed)
    }
}

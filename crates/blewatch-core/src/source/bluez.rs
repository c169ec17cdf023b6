//! BlueZ collaborators backed by `bluer` (Linux only).
//!
//! [`BluezSource`] runs LE discovery with duplicate reporting enabled, so every
//! re-advertisement of a known device shows up as a property change and is
//! forwarded as a fresh [`Sighting`]. [`BluezLookup`] reads the cached D-Bus
//! device properties for one address.

use std::time::Instant;

use async_trait::async_trait;
use bluer::{
    Adapter, AdapterEvent, AdapterProperty, DiscoveryFilter, DiscoveryTransport, ErrorKind,
    Session,
};
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{
    AdvertisementSource, DeviceInfo, DeviceInfoLookup, LookupError, Sighting, SourceError,
    SourceEvent,
};
use crate::device::DeviceAddress;

/// Channel depth between the discovery task and the tracker.
const SIGHTING_CHANNEL_CAPACITY: usize = 512;

fn to_address(addr: bluer::Address) -> DeviceAddress {
    DeviceAddress::from_bytes(addr.0)
}

fn to_bluer(addr: DeviceAddress) -> bluer::Address {
    bluer::Address::new(addr.to_bytes())
}

fn map_open_error(err: &bluer::Error) -> SourceError {
    match err.kind {
        ErrorKind::NotFound | ErrorKind::DoesNotExist => SourceError::AdapterNotFound,
        ErrorKind::NotReady => SourceError::AdapterPoweredOff,
        ErrorKind::NotAuthorized | ErrorKind::NotPermitted => SourceError::PermissionDenied {
            message: err.message.clone(),
        },
        _ => SourceError::Unavailable {
            message: err.to_string(),
        },
    }
}

async fn open_adapter(adapter_name: Option<&str>) -> Result<Adapter, SourceError> {
    let session = Session::new().await.map_err(|e| map_open_error(&e))?;
    let adapter = match adapter_name {
        Some(name) => session.adapter(name),
        None => session.default_adapter().await,
    }
    .map_err(|e| map_open_error(&e))?;

    if !adapter.is_powered().await.map_err(|e| map_open_error(&e))? {
        return Err(SourceError::AdapterPoweredOff);
    }
    Ok(adapter)
}

/// Reads one device's properties into a sighting.
async fn read_sighting(adapter: &Adapter, addr: bluer::Address) -> bluer::Result<Option<Sighting>> {
    let device = adapter.device(addr)?;
    // Devices only known from the cache have no RSSI; they are not advertising.
    let Some(rssi) = device.rssi().await? else {
        return Ok(None);
    };

    let mut sighting = Sighting::new(to_address(addr), device.name().await?, rssi, Instant::now());
    sighting.connected = Some(device.is_connected().await?);
    sighting.paired = Some(device.is_paired().await?);
    Ok(Some(sighting))
}

/// LE advertisement source using the BlueZ daemon.
#[derive(Debug, Default)]
pub struct BluezSource {
    adapter_name: Option<String>,
    duplicate_data: bool,
    running: Mutex<Option<CancellationToken>>,
}

impl BluezSource {
    /// Creates a source for the named adapter, or the default adapter.
    #[must_use]
    pub fn new(adapter_name: Option<String>, duplicate_data: bool) -> Self {
        Self {
            adapter_name,
            duplicate_data,
            running: Mutex::new(None),
        }
    }

    async fn run(
        adapter: Adapter,
        tx: mpsc::Sender<SourceEvent>,
        cancel: CancellationToken,
    ) -> Result<(), bluer::Error> {
        let events = adapter.discover_devices_with_changes().await?;
        let mut events = Box::pin(events);
        info!(adapter = %adapter.name(), "BlueZ discovery started");

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    debug!("BlueZ discovery cancelled");
                    return Ok(());
                }
                event = events.next() => match event {
                    Some(AdapterEvent::DeviceAdded(addr)) => {
                        match read_sighting(&adapter, addr).await {
                            Ok(Some(sighting)) => {
                                if tx.send(SourceEvent::Sighting(sighting)).await.is_err() {
                                    return Ok(());
                                }
                            }
                            Ok(None) => {}
                            Err(e) => debug!(address = %addr, error = %e, "Skipping unreadable device"),
                        }
                    }
                    Some(AdapterEvent::PropertyChanged(AdapterProperty::Powered(false))) => {
                        let _ = tx
                            .send(SourceEvent::Stopped {
                                reason: "Bluetooth adapter powered off".to_string(),
                            })
                            .await;
                        return Ok(());
                    }
                    Some(_) => {}
                    None => {
                        let _ = tx
                            .send(SourceEvent::Stopped {
                                reason: "BlueZ discovery stream ended".to_string(),
                            })
                            .await;
                        return Ok(());
                    }
                },
            }
        }
    }
}

#[async_trait]
impl AdvertisementSource for BluezSource {
    async fn open(&self) -> Result<mpsc::Receiver<SourceEvent>, SourceError> {
        let adapter = open_adapter(self.adapter_name.as_deref()).await?;

        adapter
            .set_discovery_filter(DiscoveryFilter {
                transport: DiscoveryTransport::Le,
                duplicate_data: self.duplicate_data,
                ..DiscoveryFilter::default()
            })
            .await
            .map_err(|e| map_open_error(&e))?;

        let (tx, rx) = mpsc::channel(SIGHTING_CHANNEL_CAPACITY);
        let cancel = CancellationToken::new();
        if let Some(previous) = self.running.lock().replace(cancel.clone()) {
            previous.cancel();
        }

        tokio::spawn(async move {
            let failure_tx = tx.clone();
            if let Err(e) = Self::run(adapter, tx, cancel).await {
                warn!(error = %e, "BlueZ discovery failed");
                let _ = failure_tx
                    .send(SourceEvent::Stopped {
                        reason: e.to_string(),
                    })
                    .await;
            }
        });

        Ok(rx)
    }

    async fn close(&self) {
        if let Some(cancel) = self.running.lock().take() {
            cancel.cancel();
        }
    }
}

/// Device-info lookup reading BlueZ's device properties.
#[derive(Debug, Clone)]
pub struct BluezLookup {
    adapter: Adapter,
}

impl BluezLookup {
    /// Wraps an already opened adapter.
    #[must_use]
    pub const fn new(adapter: Adapter) -> Self {
        Self { adapter }
    }

    /// Opens the named adapter, or the default adapter.
    ///
    /// # Errors
    ///
    /// Returns a [`SourceError`] if the adapter cannot be opened.
    pub async fn connect(adapter_name: Option<&str>) -> Result<Self, SourceError> {
        Ok(Self::new(open_adapter(adapter_name).await?))
    }

    fn platform_id(&self, address: DeviceAddress) -> String {
        format!(
            "/org/bluez/{}/dev_{}",
            self.adapter.name(),
            address.to_string().replace(':', "_")
        )
    }
}

#[async_trait]
impl DeviceInfoLookup for BluezLookup {
    async fn lookup(&self, address: DeviceAddress) -> Result<DeviceInfo, LookupError> {
        let map_err = |e: bluer::Error| match e.kind {
            ErrorKind::NotFound | ErrorKind::DoesNotExist => LookupError::DeviceGone { address },
            _ => LookupError::Failed {
                message: e.to_string(),
            },
        };

        let device = self.adapter.device(to_bluer(address)).map_err(map_err)?;
        Ok(DeviceInfo {
            name: device.name().await.map_err(map_err)?,
            connected: Some(device.is_connected().await.map_err(map_err)?),
            pairable: None,
            paired: Some(device.is_paired().await.map_err(map_err)?),
            platform_id: Some(self.platform_id(address)),
        })
    }
}

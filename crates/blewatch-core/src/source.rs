//! Collaborator interfaces: where sightings come from and how they are enriched.
//!
//! The tracker never talks to a radio directly. An [`AdvertisementSource`]
//! delivers raw [`Sighting`]s over a channel, and an optional
//! [`DeviceInfoLookup`] resolves richer per-device fields before a sighting
//! reaches the registry.
//!
//! Two implementations ship with the crate:
//!
//! - [`mock`] - in-memory source and lookup, always available
//! - `bluez` - BlueZ discovery via `bluer` (feature `bluetooth`, Linux only)

use std::time::Instant;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::device::{DeviceAddress, DeviceRecord};

#[cfg(feature = "bluetooth")]
pub mod bluez;
pub mod mock;

#[cfg(feature = "bluetooth")]
pub use bluez::{BluezLookup, BluezSource};
pub use mock::{MockLookup, MockSource, MockSourceHandle};

/// One received advertisement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sighting {
    /// Advertiser's hardware address.
    pub address: DeviceAddress,

    /// Local name, if the advertisement carried one.
    pub name: Option<String>,

    /// Received signal strength in dBm.
    pub rssi: i16,

    /// When the advertisement was received.
    pub timestamp: Instant,

    /// Connection state, if the source knows it.
    pub connected: Option<bool>,

    /// Pairability, if the source knows it.
    pub pairable: Option<bool>,

    /// Bond state, if the source knows it.
    pub paired: Option<bool>,
}

impl Sighting {
    /// Creates a sighting carrying only the raw advertisement fields.
    pub fn new(address: DeviceAddress, name: Option<String>, rssi: i16, timestamp: Instant) -> Self {
        Self {
            address,
            name,
            rssi,
            timestamp,
            connected: None,
            pairable: None,
            paired: None,
        }
    }

    /// Converts the raw fields into a candidate record.
    #[must_use]
    pub fn into_record(self) -> DeviceRecord {
        DeviceRecord {
            address: self.address,
            name: self.name.unwrap_or_default(),
            rssi: self.rssi,
            last_seen: self.timestamp,
            connected: self.connected,
            pairable: self.pairable,
            paired: self.paired,
            platform_id: None,
        }
    }
}

/// Something the advertisement source reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceEvent {
    /// A device advertised.
    Sighting(Sighting),

    /// The source stopped without being asked to.
    Stopped {
        /// Human-readable cause.
        reason: String,
    },
}

/// Errors raised by an advertisement source.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SourceError {
    /// No radio adapter is present.
    #[error("No Bluetooth adapter found")]
    AdapterNotFound,

    /// The adapter exists but is powered off.
    #[error("Bluetooth adapter is powered off")]
    AdapterPoweredOff,

    /// The process is not allowed to scan.
    #[error("Permission denied opening advertisement source: {message}")]
    PermissionDenied {
        /// Platform message.
        message: String,
    },

    /// The source could not be opened for any other reason.
    #[error("Advertisement source unavailable: {message}")]
    Unavailable {
        /// Platform message.
        message: String,
    },
}

/// Delivers raw sightings to the tracker.
///
/// `open` hands back the receiving end of a channel. The source signals an
/// unexpected stop either by sending [`SourceEvent::Stopped`] or by dropping
/// its sender.
#[async_trait]
pub trait AdvertisementSource: Send + Sync + 'static {
    /// Starts listening on the medium.
    ///
    /// # Errors
    ///
    /// Returns a [`SourceError`] if the medium cannot be opened.
    async fn open(&self) -> Result<mpsc::Receiver<SourceEvent>, SourceError>;

    /// Stops listening. Idempotent.
    async fn close(&self);
}

/// Extra device fields resolved by a deeper lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Resolved name, preferred over the advertised one when non-empty.
    pub name: Option<String>,

    /// Connection state.
    pub connected: Option<bool>,

    /// Pairability.
    pub pairable: Option<bool>,

    /// Bond state.
    pub paired: Option<bool>,

    /// Platform-issued identifier.
    pub platform_id: Option<String>,
}

impl DeviceInfo {
    /// Overlays the resolved fields onto `record`.
    pub fn apply_to(self, record: &mut DeviceRecord) {
        if let Some(name) = self.name.filter(|n| !n.is_empty()) {
            record.name = name;
        }
        record.connected = self.connected.or(record.connected);
        record.pairable = self.pairable.or(record.pairable);
        record.paired = self.paired.or(record.paired);
        record.platform_id = self.platform_id.or(record.platform_id.take());
    }
}

/// Errors raised by a device-info lookup.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LookupError {
    /// The device disappeared while it was being looked up.
    #[error("Device {address} vanished during lookup")]
    DeviceGone {
        /// The device that vanished.
        address: DeviceAddress,
    },

    /// The lookup failed; the raw sighting is still usable.
    #[error("Device lookup failed: {message}")]
    Failed {
        /// Platform message.
        message: String,
    },
}

/// Resolves richer fields for a device given its address.
#[async_trait]
pub trait DeviceInfoLookup: Send + Sync + 'static {
    /// Looks up `address`.
    ///
    /// # Errors
    ///
    /// Returns [`LookupError::DeviceGone`] if the device vanished, or
    /// [`LookupError::Failed`] for any other failure.
    async fn lookup(&self, address: DeviceAddress) -> Result<DeviceInfo, LookupError>;
}

/// Turns a sighting into a candidate record, enriching it when a lookup is given.
///
/// Returns `None` when the sighting must be dropped (the device vanished mid
/// lookup). Other lookup failures fall back to the raw fields.
pub async fn derive_record(
    sighting: Sighting,
    lookup: Option<&dyn DeviceInfoLookup>,
) -> Option<DeviceRecord> {
    let mut record = sighting.into_record();
    let Some(lookup) = lookup else {
        return Some(record);
    };

    match lookup.lookup(record.address).await {
        Ok(info) => {
            info.apply_to(&mut record);
            Some(record)
        }
        Err(LookupError::DeviceGone { address }) => {
            tracing::debug!(%address, "Dropping sighting, device vanished during lookup");
            None
        }
        Err(e) => {
            tracing::warn!(address = %record.address, error = %e, "Lookup failed, using raw sighting");
            Some(record)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(raw: u64) -> DeviceAddress {
        DeviceAddress::new(raw).unwrap()
    }

    #[test]
    fn test_into_record_maps_missing_name_to_empty() {
        let now = Instant::now();
        let record = Sighting::new(addr(1), None, -60, now).into_record();
        assert_eq!(record.name, "");
        assert_eq!(record.last_seen, now);
        assert_eq!(record.platform_id, None);
    }

    #[test]
    fn test_device_info_overlay_keeps_existing_values_when_absent() {
        let mut record = DeviceRecord::new(addr(1), "Raw", -60, Instant::now());
        record.paired = Some(true);

        DeviceInfo {
            name: Some(String::new()),
            connected: Some(false),
            platform_id: Some("/org/bluez/hci0/dev_00_00_00_00_00_01".into()),
            ..DeviceInfo::default()
        }
        .apply_to(&mut record);

        assert_eq!(record.name, "Raw");
        assert_eq!(record.connected, Some(false));
        assert_eq!(record.paired, Some(true));
        assert!(record.platform_id.is_some());
    }

    #[tokio::test]
    async fn test_derive_record_without_lookup_uses_raw_fields() {
        let sighting = Sighting::new(addr(7), Some("Tag".into()), -71, Instant::now());
        let record = derive_record(sighting, None).await.unwrap();
        assert_eq!(record.name, "Tag");
    }

    #[tokio::test]
    async fn test_derive_record_drops_vanished_devices() {
        let lookup = MockLookup::new();
        lookup.fail(addr(7), LookupError::DeviceGone { address: addr(7) });

        let sighting = Sighting::new(addr(7), Some("Tag".into()), -71, Instant::now());
        assert!(derive_record(sighting, Some(&lookup)).await.is_none());
    }

    #[tokio::test]
    async fn test_derive_record_falls_back_on_other_failures() {
        let lookup = MockLookup::new();
        lookup.fail(
            addr(7),
            LookupError::Failed {
                message: "busy".into(),
            },
        );

        let sighting = Sighting::new(addr(7), Some("Tag".into()), -71, Instant::now());
        let record = derive_record(sighting, Some(&lookup)).await.unwrap();
        assert_eq!(record.name, "Tag");
        assert_eq!(record.connected, None);
    }

    #[tokio::test]
    async fn test_derive_record_applies_resolved_fields() {
        let lookup = MockLookup::new();
        lookup.insert(
            addr(7),
            DeviceInfo {
                name: Some("Resolved".into()),
                connected: Some(true),
                paired: Some(true),
                ..DeviceInfo::default()
            },
        );

        let sighting = Sighting::new(addr(7), None, -71, Instant::now());
        let record = derive_record(sighting, Some(&lookup)).await.unwrap();
        assert_eq!(record.name, "Resolved");
        assert_eq!(record.connected, Some(true));
        assert_eq!(record.paired, Some(true));
    }
}

//! # blewatch-core
//!
//! Core logic for the blewatch Bluetooth LE discovery engine.
//!
//! This crate provides:
//! - A device registry keyed by 48-bit hardware address
//! - A discovery tracker that turns raw advertisement sightings into
//!   discovered / new / renamed / timed-out events
//! - Pluggable advertisement sources and device-info lookups (BlueZ and mock)
//! - Configuration management
//!
//! ## Architecture
//!
//! The crate is organized into the following modules:
//!
//! - [`device`] - Device addresses and records
//! - [`registry`] - The address-keyed registry and its transition rules
//! - [`tracker`] - The tracker actor, its lifecycle, and the ingest pump
//! - [`events`] - Events published to subscribers
//! - [`source`] - Advertisement source and lookup traits with their adapters
//! - [`clock`] - Injectable time source
//! - [`config`] - Application configuration loading, saving, and validation
//! - [`error`] - Unified error types for the crate

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![warn(missing_docs)]

pub mod clock;
pub mod config;
pub mod device;
pub mod error;
pub mod events;
pub mod registry;
pub mod source;
pub mod tracker;

// Re-export primary types for convenience
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    default_config_path, BluetoothConfig, Config, ConfigError, ConfigResult, ServerConfig,
    TrackerConfig,
};
pub use device::{is_valid_address, DeviceAddress, DeviceRecord, ParseAddressError};
pub use error::{BlewatchError, Result};
pub use events::{StopReason, TrackerEvent};
pub use registry::Registry;
#[cfg(feature = "bluetooth")]
pub use source::{BluezLookup, BluezSource};
pub use source::{
    AdvertisementSource, DeviceInfo, DeviceInfoLookup, LookupError, MockLookup, MockSource,
    MockSourceHandle, Sighting, SourceError, SourceEvent,
};
pub use tracker::{
    DiscoveryTracker, TrackerBuilder, TrackerError, TrackerResult, TrackerState, TrackerStatus,
};

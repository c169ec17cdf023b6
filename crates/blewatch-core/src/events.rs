//! Notifications published by the tracker.

use crate::device::DeviceRecord;

/// Why the tracker went to `Stopped`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// `stop()` was called.
    Requested,

    /// The advertisement source stopped on its own.
    SourceLost(String),
}

/// A state transition observed by the tracker.
///
/// For one sighting the tracker publishes `DeviceDiscovered` first, then
/// `NameChanged` and `NewDeviceDiscovered` when they apply, in that order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerEvent {
    /// The tracker began listening.
    Started,

    /// The tracker stopped listening and forgot all devices.
    Stopped {
        /// What caused the stop.
        reason: StopReason,
    },

    /// A sighting was applied. Fires for every accepted sighting.
    DeviceDiscovered(DeviceRecord),

    /// A sighting introduced an address the registry did not hold.
    NewDeviceDiscovered(DeviceRecord),

    /// A known device advertised a different non-empty name.
    NameChanged {
        /// The record after the change.
        device: DeviceRecord,
        /// The name it replaced.
        previous_name: String,
    },

    /// A device was silent longer than the heartbeat timeout and was removed.
    DeviceTimedOut(DeviceRecord),
}

impl TrackerEvent {
    /// The device this event is about, if any.
    #[must_use]
    pub const fn device(&self) -> Option<&DeviceRecord> {
        match self {
            Self::Started | Self::Stopped { .. } => None,
            Self::DeviceDiscovered(device)
            | Self::NewDeviceDiscovered(device)
            | Self::NameChanged { device, .. }
            | Self::DeviceTimedOut(device) => Some(device),
        }
    }

    /// Short machine-readable kind, used as a log field.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Stopped { .. } => "stopped",
            Self::DeviceDiscovered(_) => "device_discovered",
            Self::NewDeviceDiscovered(_) => "new_device_discovered",
            Self::NameChanged { .. } => "name_changed",
            Self::DeviceTimedOut(_) => "device_timed_out",
        }
    }
}

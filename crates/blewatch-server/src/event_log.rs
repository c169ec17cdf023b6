//! Logs every tracker event.

use blewatch_core::{DiscoveryTracker, TrackerEvent};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Subscribes to `tracker` and logs each event until the tracker shuts down.
pub fn spawn(tracker: &DiscoveryTracker) -> JoinHandle<()> {
    let mut events = tracker.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => log_event(&event),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event log fell behind; some events were not logged");
                }
                Err(RecvError::Closed) => break,
            }
        }
        debug!("Event log exiting");
    })
}

fn log_event(event: &TrackerEvent) {
    let kind = event.kind();
    match event {
        TrackerEvent::Started => info!(kind, "Scanner started"),
        TrackerEvent::Stopped { reason } => info!(kind, reason = ?reason, "Scanner stopped"),
        // One per sighting, so keep it below info.
        TrackerEvent::DeviceDiscovered(device) => debug!(
            kind,
            address = %device.address,
            rssi = device.rssi,
            "Device sighted"
        ),
        TrackerEvent::NewDeviceDiscovered(device) => info!(
            kind,
            address = %device.address,
            name = device.name().unwrap_or_default(),
            rssi = device.rssi,
            "New device"
        ),
        TrackerEvent::NameChanged {
            device,
            previous_name,
        } => info!(
            kind,
            address = %device.address,
            previous_name = %previous_name,
            name = %device.name,
            "Device renamed"
        ),
        TrackerEvent::DeviceTimedOut(device) => info!(
            kind,
            address = %device.address,
            name = device.name().unwrap_or_default(),
            "Device timed out"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use blewatch_core::MockSource;
    use tokio_test::assert_ok;

    #[tokio::test]
    async fn test_event_log_exits_when_tracker_is_dropped() {
        let (source, _handle) = MockSource::new();
        let tracker = DiscoveryTracker::new(Arc::new(source));
        let task = spawn(&tracker);

        assert_ok!(tracker.start().await);
        assert_ok!(tracker.stop().await);
        drop(tracker);

        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("event log did not exit")
            .unwrap();
    }
}

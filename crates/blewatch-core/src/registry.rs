//! The device registry and its transition rules.
//!
//! [`Registry`] is plain synchronous state. It decides whether a sighting is
//! new, renames a device, or is a repeat, and which records have outlived the
//! heartbeat timeout. The tracker actor owns exactly one of these and is the
//! only thing that mutates it.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::device::{DeviceAddress, DeviceRecord};
use crate::events::TrackerEvent;

/// Returns `true` if `record` was last seen strictly before `now - timeout`.
#[must_use]
pub fn is_expired(record: &DeviceRecord, now: Instant, timeout: Duration) -> bool {
    now.saturating_duration_since(record.last_seen) > timeout
}

/// Map from address to the latest record for that address.
#[derive(Debug, Default, Clone)]
pub struct Registry {
    devices: HashMap<DeviceAddress, DeviceRecord>,
}

impl Registry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tracked devices.
    #[must_use]
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// Whether no devices are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// The record for `address`, if tracked.
    #[must_use]
    pub fn get(&self, address: &DeviceAddress) -> Option<&DeviceRecord> {
        self.devices.get(address)
    }

    /// Writes `candidate` and returns the events the write produced.
    ///
    /// The new/renamed classification reads the previous record in the same
    /// call as the write. An empty candidate name keeps the stored name, and
    /// absent flags keep their stored values.
    pub fn apply(&mut self, candidate: DeviceRecord) -> Vec<TrackerEvent> {
        let mut record = candidate;
        let mut previous_name = None;

        let is_new = match self.devices.get(&record.address) {
            None => true,
            Some(prev) => {
                if record.name.is_empty() {
                    record.name.clone_from(&prev.name);
                } else if !prev.name.is_empty() && record.name != prev.name {
                    previous_name = Some(prev.name.clone());
                }
                record.connected = record.connected.or(prev.connected);
                record.pairable = record.pairable.or(prev.pairable);
                record.paired = record.paired.or(prev.paired);
                if record.platform_id.is_none() {
                    record.platform_id.clone_from(&prev.platform_id);
                }
                false
            }
        };

        self.devices.insert(record.address, record.clone());

        let mut events = Vec::with_capacity(3);
        events.push(TrackerEvent::DeviceDiscovered(record.clone()));
        if let Some(previous_name) = previous_name {
            events.push(TrackerEvent::NameChanged {
                device: record.clone(),
                previous_name,
            });
        }
        if is_new {
            events.push(TrackerEvent::NewDeviceDiscovered(record));
        }
        events
    }

    /// Removes every record that expired by `now` and returns them.
    pub fn sweep(&mut self, now: Instant, timeout: Duration) -> Vec<DeviceRecord> {
        let expired: Vec<DeviceAddress> = self
            .devices
            .values()
            .filter(|record| is_expired(record, now, timeout))
            .map(|record| record.address)
            .collect();

        let mut removed: Vec<DeviceRecord> = expired
            .iter()
            .filter_map(|address| self.devices.remove(address))
            .collect();
        removed.sort_by_key(|record| record.address);
        removed
    }

    /// Owned copy of all records, ordered by address.
    #[must_use]
    pub fn snapshot(&self) -> Vec<DeviceRecord> {
        let mut records: Vec<DeviceRecord> = self.devices.values().cloned().collect();
        records.sort_by_key(|record| record.address);
        records
    }

    /// Forgets every device and returns how many were dropped.
    pub fn clear(&mut self) -> usize {
        let count = self.devices.len();
        self.devices.clear();
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(raw: u64) -> DeviceAddress {
        DeviceAddress::new(raw).unwrap()
    }

    fn record(raw: u64, name: &str, at: Instant) -> DeviceRecord {
        DeviceRecord::new(addr(raw), name, -60, at)
    }

    fn kinds(events: &[TrackerEvent]) -> Vec<&'static str> {
        events.iter().map(TrackerEvent::kind).collect()
    }

    #[test]
    fn test_first_sighting_is_discovered_then_new() {
        let mut registry = Registry::new();
        let events = registry.apply(record(1, "", Instant::now()));

        assert_eq!(kinds(&events), ["device_discovered", "new_device_discovered"]);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_first_name_after_unnamed_is_not_a_rename() {
        let t0 = Instant::now();
        let mut registry = Registry::new();
        registry.apply(record(1, "", t0));

        let events = registry.apply(record(1, "Foo", t0 + Duration::from_secs(1)));
        assert_eq!(kinds(&events), ["device_discovered"]);
        assert_eq!(registry.get(&addr(1)).unwrap().name, "Foo");
    }

    #[test]
    fn test_rename_between_non_empty_names() {
        let t0 = Instant::now();
        let mut registry = Registry::new();
        registry.apply(record(1, "Foo", t0));

        let events = registry.apply(record(1, "Bar", t0));
        assert_eq!(kinds(&events), ["device_discovered", "name_changed"]);
        match &events[1] {
            TrackerEvent::NameChanged {
                device,
                previous_name,
            } => {
                assert_eq!(device.name, "Bar");
                assert_eq!(previous_name, "Foo");
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_empty_name_never_erases_known_name() {
        let t0 = Instant::now();
        let mut registry = Registry::new();
        registry.apply(record(1, "Foo", t0));

        for i in 1..5 {
            let events = registry.apply(record(1, "", t0 + Duration::from_secs(i)));
            assert_eq!(kinds(&events), ["device_discovered"]);
            match &events[0] {
                TrackerEvent::DeviceDiscovered(device) => assert_eq!(device.name, "Foo"),
                other => panic!("unexpected event {other:?}"),
            }
        }
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get(&addr(1)).unwrap().name, "Foo");
    }

    #[test]
    fn test_repeat_sighting_overwrites_signal_and_timestamp() {
        let t0 = Instant::now();
        let mut registry = Registry::new();
        registry.apply(record(1, "Foo", t0 + Duration::from_secs(10)));

        // Out-of-order timestamps are written as given.
        let mut older = record(1, "Foo", t0);
        older.rssi = -90;
        registry.apply(older);

        let stored = registry.get(&addr(1)).unwrap();
        assert_eq!(stored.rssi, -90);
        assert_eq!(stored.last_seen, t0);
    }

    #[test]
    fn test_absent_flags_keep_previous_values() {
        let t0 = Instant::now();
        let mut registry = Registry::new();
        let mut enriched = record(1, "Foo", t0);
        enriched.paired = Some(true);
        enriched.platform_id = Some("dev_1".into());
        registry.apply(enriched);

        registry.apply(record(1, "Foo", t0));
        let stored = registry.get(&addr(1)).unwrap();
        assert_eq!(stored.paired, Some(true));
        assert_eq!(stored.platform_id.as_deref(), Some("dev_1"));
    }

    #[test]
    fn test_sweep_evicts_only_strictly_older_records() {
        let t0 = Instant::now();
        let timeout = Duration::from_secs(5);
        let mut registry = Registry::new();
        registry.apply(record(1, "Foo", t0));

        assert!(registry.sweep(t0 + Duration::from_secs(4), timeout).is_empty());
        assert!(registry.sweep(t0 + timeout, timeout).is_empty());
        assert_eq!(registry.len(), 1);

        let removed = registry.sweep(t0 + Duration::from_secs(6), timeout);
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].address, addr(1));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_sweep_ignores_timestamps_in_the_future() {
        let t0 = Instant::now();
        let mut registry = Registry::new();
        registry.apply(record(1, "Foo", t0 + Duration::from_secs(60)));

        assert!(registry.sweep(t0, Duration::from_secs(5)).is_empty());
    }

    #[test]
    fn test_snapshot_is_sorted_and_detached() {
        let t0 = Instant::now();
        let mut registry = Registry::new();
        for raw in [3, 1, 2] {
            registry.apply(record(raw, "", t0));
        }

        let mut snapshot = registry.snapshot();
        let order: Vec<u64> = snapshot.iter().map(|r| r.address.as_u64()).collect();
        assert_eq!(order, [1, 2, 3]);

        snapshot[0].name = "mutated".into();
        assert_eq!(registry.get(&addr(1)).unwrap().name, "");
    }

    #[test]
    fn test_clear_reports_dropped_count() {
        let mut registry = Registry::new();
        registry.apply(record(1, "", Instant::now()));
        registry.apply(record(2, "", Instant::now()));

        assert_eq!(registry.clear(), 2);
        assert!(registry.is_empty());
    }
}

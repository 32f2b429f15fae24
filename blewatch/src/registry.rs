//! Device state tracking and retention.
//!
//! The registry is the single owner of every known device record. Other
//! components only ever see snapshots, so eviction can never invalidate
//! a reference held elsewhere.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::config::MonitorConfig;
use crate::observation::DeviceObservation;

/// Derived activity classification. Never stored; recomputed from the
/// last-seen timestamp whenever a snapshot is taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activity {
    Active,
    Inactive,
}

/// State kept per physical device, keyed by address.
///
/// Every observation overwrites all fields except `address` and
/// `first_seen`; nothing is merged.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceRecord {
    pub address: String,
    pub name: Option<String>,
    pub rssi: i16,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub services: Vec<String>,
    pub manufacturer_data: Vec<u8>,
}

impl DeviceRecord {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.address)
    }
}

/// One row of a snapshot: a copy of the record augmented with the
/// derived state the view needs.
#[derive(Debug, Clone)]
pub struct SnapshotEntry {
    pub record: DeviceRecord,
    pub activity: Activity,
    /// Elapsed since last seen, at the time the snapshot was taken.
    pub age: Duration,
}

pub struct DeviceRegistry {
    devices: HashMap<String, DeviceRecord>,
    inactivity_threshold: Duration,
    retention_window: Duration,
}

/// Elapsed time between two instants. Observations stamped ahead of the
/// clock count as just seen.
fn elapsed_since(now: DateTime<Utc>, then: DateTime<Utc>) -> Duration {
    (now - then).to_std().unwrap_or(Duration::ZERO)
}

impl DeviceRegistry {
    pub fn new(config: &MonitorConfig) -> DeviceRegistry {
        DeviceRegistry {
            devices: HashMap::new(),
            inactivity_threshold: config.inactivity_threshold,
            retention_window: config.retention_window,
        }
    }

    /// Insert or update the record for the observed address. Cannot
    /// fail: a degenerate observation still updates last-seen.
    pub fn observe(&mut self, obs: &DeviceObservation) {
        match self.devices.get_mut(&obs.address) {
            Some(record) => {
                record.name = obs.name.clone();
                record.rssi = obs.rssi;
                record.last_seen = obs.observed_at;
                record.services = obs.services.clone();
                record.manufacturer_data = obs.manufacturer_data.clone();
            }
            None => {
                self.devices.insert(
                    obs.address.clone(),
                    DeviceRecord {
                        address: obs.address.clone(),
                        name: obs.name.clone(),
                        rssi: obs.rssi,
                        first_seen: obs.observed_at,
                        last_seen: obs.observed_at,
                        services: obs.services.clone(),
                        manufacturer_data: obs.manufacturer_data.clone(),
                    },
                );
            }
        }
    }

    /// Drop every record unseen for longer than the retention window
    /// and return the evicted addresses, so the view can release a
    /// selection that pointed at one of them.
    pub fn evict(&mut self, now: DateTime<Utc>) -> Vec<String> {
        let retention = self.retention_window;
        let evicted: Vec<String> = self
            .devices
            .values()
            .filter(|record| elapsed_since(now, record.last_seen) > retention)
            .map(|record| record.address.clone())
            .collect();
        for address in &evicted {
            self.devices.remove(address);
        }
        evicted
    }

    /// Ordered, render-ready view of the registry.
    ///
    /// Active devices come first, strongest signal first; inactive
    /// devices follow, most recently lost first. Ties break on address
    /// so identical inputs always produce identical ordering. Records
    /// past the retention window never appear, even before the next
    /// `evict` call.
    pub fn snapshot(&self, now: DateTime<Utc>) -> Vec<SnapshotEntry> {
        let mut entries: Vec<SnapshotEntry> = self
            .devices
            .values()
            .filter_map(|record| {
                let age = elapsed_since(now, record.last_seen);
                if age > self.retention_window {
                    return None;
                }
                let activity = if age <= self.inactivity_threshold {
                    Activity::Active
                } else {
                    Activity::Inactive
                };
                Some(SnapshotEntry {
                    record: record.clone(),
                    activity,
                    age,
                })
            })
            .collect();
        entries.sort_by(|a, b| match (a.activity, b.activity) {
            (Activity::Active, Activity::Inactive) => Ordering::Less,
            (Activity::Inactive, Activity::Active) => Ordering::Greater,
            (Activity::Active, Activity::Active) => b
                .record
                .rssi
                .cmp(&a.record.rssi)
                .then_with(|| a.record.address.cmp(&b.record.address)),
            (Activity::Inactive, Activity::Inactive) => b
                .record
                .last_seen
                .cmp(&a.record.last_seen)
                .then_with(|| a.record.address.cmp(&b.record.address)),
        });
        entries
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap() + chrono::Duration::seconds(secs)
    }

    fn obs(address: &str, rssi: i16, at: i64) -> DeviceObservation {
        DeviceObservation {
            address: address.to_string(),
            name: Some(format!("dev-{}", address)),
            rssi,
            services: vec![],
            manufacturer_data: vec![],
            observed_at: t(at),
        }
    }

    fn registry() -> DeviceRegistry {
        // threshold 15s, retention 60s
        let mut config = MonitorConfig::default();
        config.inactivity_threshold = Duration::from_secs(15);
        config.retention_window = Duration::from_secs(60);
        DeviceRegistry::new(&config)
    }

    #[test]
    fn one_record_per_address() {
        let mut reg = registry();
        reg.observe(&obs("AA:BB", -45, 0));
        reg.observe(&obs("AA:BB", -50, 1));
        reg.observe(&obs("AA:BB", -55, 2));
        assert_eq!(reg.len(), 1);
        let snap = reg.snapshot(t(2));
        assert_eq!(snap[0].record.rssi, -55);
    }

    #[test]
    fn fields_overwritten_except_first_seen() {
        let mut reg = registry();
        let mut first = obs("AA:BB", -45, 0);
        first.services = vec!["180f".to_string()];
        reg.observe(&first);

        let mut second = obs("AA:BB", -60, 5);
        second.name = None;
        second.services = vec![];
        reg.observe(&second);

        let snap = reg.snapshot(t(5));
        let record = &snap[0].record;
        assert_eq!(record.name, None);
        assert_eq!(record.rssi, -60);
        assert_eq!(record.services, Vec::<String>::new());
        assert_eq!(record.first_seen, t(0));
        assert_eq!(record.last_seen, t(5));
        // with no name, the address stands in
        assert_eq!(record.display_name(), "AA:BB");
    }

    #[test]
    fn activity_boundary_is_inclusive() {
        let mut reg = registry();
        reg.observe(&obs("AA:BB", -45, 0));
        // exactly at the threshold: still active
        assert_eq!(reg.snapshot(t(15))[0].activity, Activity::Active);
        // one second past: inactive
        assert_eq!(reg.snapshot(t(16))[0].activity, Activity::Inactive);
    }

    #[test]
    fn retention_boundary_is_exclusive() {
        let mut reg = registry();
        reg.observe(&obs("AA:BB", -45, 0));
        assert_eq!(reg.snapshot(t(60)).len(), 1);
        assert_eq!(reg.evict(t(60)), Vec::<String>::new());
        assert_eq!(reg.snapshot(t(61)).len(), 0);
        assert_eq!(reg.evict(t(61)), vec!["AA:BB".to_string()]);
        assert!(reg.is_empty());
    }

    #[test]
    fn evict_is_idempotent_for_equal_now() {
        let mut reg = registry();
        reg.observe(&obs("AA:BB", -45, 0));
        reg.observe(&obs("CC:DD", -70, 50));
        assert_eq!(reg.evict(t(70)), vec!["AA:BB".to_string()]);
        assert_eq!(reg.evict(t(70)), Vec::<String>::new());
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn snapshot_never_shows_expired_records() {
        let mut reg = registry();
        reg.observe(&obs("AA:BB", -45, 0));
        // no evict call in between: the snapshot filter alone hides it
        assert!(reg.snapshot(t(100)).is_empty());
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn active_devices_sort_by_rssi_descending() {
        let mut reg = registry();
        reg.observe(&obs("CC:DD", -70, 1));
        reg.observe(&obs("AA:BB", -45, 0));
        let snap = reg.snapshot(t(10));
        assert_eq!(snap[0].record.address, "AA:BB");
        assert_eq!(snap[1].record.address, "CC:DD");
        assert!(snap.iter().all(|e| e.activity == Activity::Active));
    }

    #[test]
    fn rssi_ties_break_on_address() {
        let mut reg = registry();
        reg.observe(&obs("CC:DD", -45, 0));
        reg.observe(&obs("AA:BB", -45, 0));
        let snap = reg.snapshot(t(1));
        assert_eq!(snap[0].record.address, "AA:BB");
        assert_eq!(snap[1].record.address, "CC:DD");
    }

    #[test]
    fn inactive_devices_follow_sorted_by_last_seen() {
        let mut reg = registry();
        reg.observe(&obs("AA:BB", -45, 0));
        reg.observe(&obs("CC:DD", -70, 18));
        // at t=20, AA:BB has gone inactive while CC:DD is still active
        let snap = reg.snapshot(t(20));
        assert_eq!(snap[0].record.address, "CC:DD");
        assert_eq!(snap[0].activity, Activity::Active);
        assert_eq!(snap[1].record.address, "AA:BB");
        assert_eq!(snap[1].activity, Activity::Inactive);

        // a second stale device, lost more recently, ranks above
        reg.observe(&obs("EE:FF", -30, 3));
        let snap = reg.snapshot(t(20));
        let inactive: Vec<&str> = snap
            .iter()
            .filter(|e| e.activity == Activity::Inactive)
            .map(|e| e.record.address.as_str())
            .collect();
        assert_eq!(inactive, vec!["EE:FF", "AA:BB"]);
    }

    #[test]
    fn snapshot_ordering_is_deterministic() {
        let mut reg = registry();
        for (addr, rssi, at) in [
            ("AA:01", -40, 0),
            ("AA:02", -40, 1),
            ("AA:03", -90, 2),
            ("AA:04", -90, 2),
        ] {
            reg.observe(&obs(addr, rssi, at));
        }
        let a: Vec<String> = reg
            .snapshot(t(10))
            .iter()
            .map(|e| e.record.address.clone())
            .collect();
        let b: Vec<String> = reg
            .snapshot(t(10))
            .iter()
            .map(|e| e.record.address.clone())
            .collect();
        assert_eq!(a, b);
    }

    #[test]
    fn snapshot_age_tracks_last_seen() {
        let mut reg = registry();
        reg.observe(&obs("AA:BB", -45, 0));
        assert_eq!(reg.snapshot(t(7))[0].age, Duration::from_secs(7));
    }
}

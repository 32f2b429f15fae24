//! Raw advertisement observations, as delivered by a BLE adapter.

use chrono::{DateTime, Utc};

/// A single advertisement event.
///
/// Optional fields may be absent or change between observations of the
/// same device; consumers must tolerate both. A missing name is never
/// an error, the address stands in for display purposes.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceObservation {
    /// Stable device identifier, typically a MAC-like string.
    pub address: String,
    pub name: Option<String>,
    /// Received signal strength, dBm. Higher (less negative) is stronger.
    pub rssi: i16,
    pub services: Vec<String>,
    pub manufacturer_data: Vec<u8>,
    pub observed_at: DateTime<Utc>,
}

impl DeviceObservation {
    /// Name to show for this device, falling back to the address when
    /// the advertisement carried none.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.address)
    }
}

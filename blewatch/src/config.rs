//! Monitor configuration.
//!
//! All knobs are fixed for the lifetime of a monitor. The tools crate
//! exposes them as command line flags.

use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Devices seen within this window are classified active.
    pub inactivity_threshold: Duration,
    /// Devices unseen for longer than this are evicted entirely.
    /// Must be larger than the inactivity threshold, so a device shows
    /// up as stale before it disappears.
    pub retention_window: Duration,
    /// Wall clock period between scan block rotations.
    pub log_rotation_period: Duration,
    /// Period of the eviction/redraw tick.
    pub render_tick_period: Duration,
    /// Weak end of the RSSI display domain, in dBm.
    pub rssi_floor: i16,
    /// Strong end of the RSSI display domain, in dBm.
    pub rssi_ceiling: i16,
}

impl Default for MonitorConfig {
    fn default() -> MonitorConfig {
        MonitorConfig {
            inactivity_threshold: Duration::from_secs(10),
            retention_window: Duration::from_secs(60),
            log_rotation_period: Duration::from_secs(30),
            render_tick_period: Duration::from_secs(1),
            rssi_floor: -100,
            rssi_ceiling: -30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The inactivity threshold must stay below the retention window.
    ThresholdBeyondRetention,
    /// The named period is zero.
    ZeroPeriod(&'static str),
    /// The RSSI floor is at or above the ceiling.
    EmptyRssiDomain,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConfigError::ThresholdBeyondRetention => {
                write!(f, "inactivity threshold must be shorter than the retention window")
            }
            ConfigError::ZeroPeriod(name) => write!(f, "{} must be nonzero", name),
            ConfigError::EmptyRssiDomain => {
                write!(f, "RSSI floor must be below the RSSI ceiling")
            }
        }
    }
}

impl MonitorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.inactivity_threshold.is_zero() {
            return Err(ConfigError::ZeroPeriod("inactivity threshold"));
        }
        if self.log_rotation_period.is_zero() {
            return Err(ConfigError::ZeroPeriod("log rotation period"));
        }
        if self.render_tick_period.is_zero() {
            return Err(ConfigError::ZeroPeriod("render tick period"));
        }
        if self.inactivity_threshold >= self.retention_window {
            return Err(ConfigError::ThresholdBeyondRetention);
        }
        if self.rssi_floor >= self.rssi_ceiling {
            return Err(ConfigError::EmptyRssiDomain);
        }
        Ok(())
    }
}

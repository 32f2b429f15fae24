pub mod blocklog;
pub mod config;
pub mod monitor;
pub mod observation;
pub mod registry;
pub mod view;

pub use config::MonitorConfig;
pub use monitor::{KeyAction, Monitor, MonitorEvent};
pub use observation::DeviceObservation;
pub use registry::DeviceRegistry;

//! Bridge from the system BLE radio to the monitor event channel.
//!
//! btleplug delivers central events on an async stream; a dedicated
//! thread drives a current-thread tokio runtime and forwards each
//! advertisement as a `MonitorEvent`, so the monitor side never awaits
//! the radio.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use blewatch::{DeviceObservation, MonitorEvent};
use btleplug::api::{Central, CentralEvent, Manager as _, Peripheral as _, PeripheralProperties, ScanFilter};
use btleplug::platform::{Adapter, Manager};
use chrono::Utc;
use crossbeam::channel;
use futures::StreamExt;

/// RSSI reported when the stack delivered an advertisement without
/// one. Pins the device to the weak end of the display domain.
const RSSI_UNKNOWN: i16 = -100;

#[derive(Debug)]
pub enum AdapterError {
    /// No usable Bluetooth adapter on this system.
    NoAdapter,
    /// The Bluetooth stack refused us.
    Bluetooth(btleplug::Error),
    Io(std::io::Error),
}

impl fmt::Display for AdapterError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AdapterError::NoAdapter => write!(
                f,
                "no Bluetooth adapter found: check that the radio is present and powered on"
            ),
            AdapterError::Bluetooth(err) => write!(
                f,
                "Bluetooth stack error: {} (check that this user may perform BLE scans)",
                err
            ),
            AdapterError::Io(err) => write!(f, "failed to start scan thread: {}", err),
        }
    }
}

impl From<btleplug::Error> for AdapterError {
    fn from(err: btleplug::Error) -> AdapterError {
        AdapterError::Bluetooth(err)
    }
}

/// Handle to a running scan. Dropping it without calling `stop` leaves
/// the scan running until the event channel disconnects.
pub struct ScanHandle {
    stop: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<()>>,
}

impl ScanHandle {
    /// Stop scanning and wait for the pump thread to exit.
    pub fn stop(mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

/// Start a continuous scan, pushing one `MonitorEvent::Advertisement`
/// per received advertisement into `events`.
///
/// The adapter is probed before the thread starts, so a missing radio
/// or permission problem surfaces here, while stderr is still usable.
pub fn start_scanning(events: channel::Sender<MonitorEvent>) -> Result<ScanHandle, AdapterError> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(AdapterError::Io)?;

    let central = runtime.block_on(async {
        let manager = Manager::new().await?;
        let mut adapters = manager.adapters().await?;
        if adapters.is_empty() {
            return Err(AdapterError::NoAdapter);
        }
        Ok(adapters.remove(0))
    })?;

    let stop = Arc::new(AtomicBool::new(false));
    let pump_stop = stop.clone();
    let thread = thread::Builder::new()
        .name("ble-scan".to_string())
        .spawn(move || runtime.block_on(pump(central, events, pump_stop)))
        .map_err(AdapterError::Io)?;

    Ok(ScanHandle {
        stop,
        thread: Some(thread),
    })
}

async fn pump(
    central: Adapter,
    events: channel::Sender<MonitorEvent>,
    stop: Arc<AtomicBool>,
) {
    let mut stream = match central.events().await {
        Ok(stream) => stream,
        Err(err) => {
            log::warn!("BLE event stream unavailable: {}", err);
            return;
        }
    };
    if let Err(err) = central.start_scan(ScanFilter::default()).await {
        log::warn!("failed to start BLE scan: {}", err);
        return;
    }

    loop {
        if stop.load(Ordering::Relaxed) {
            break;
        }
        // The sleep arm keeps the stop flag honored through quiet air.
        let event = tokio::select! {
            event = stream.next() => match event {
                Some(event) => event,
                None => break,
            },
            _ = tokio::time::sleep(Duration::from_millis(250)) => continue,
        };
        let id = match event {
            CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => id,
            _ => continue,
        };
        let peripheral = match central.peripheral(&id).await {
            Ok(peripheral) => peripheral,
            Err(_) => continue,
        };
        let props = match peripheral.properties().await {
            Ok(Some(props)) => props,
            _ => continue,
        };
        if events
            .send(MonitorEvent::Advertisement(observation_from(props)))
            .is_err()
        {
            // monitor is gone
            break;
        }
    }

    let _ = central.stop_scan().await;
}

fn observation_from(props: PeripheralProperties) -> DeviceObservation {
    // Flatten the lowest-numbered manufacturer entry to raw bytes:
    // little-endian company id followed by the payload.
    let manufacturer_data = props
        .manufacturer_data
        .iter()
        .min_by_key(|(id, _)| **id)
        .map(|(id, data)| {
            let mut raw = id.to_le_bytes().to_vec();
            raw.extend_from_slice(data);
            raw
        })
        .unwrap_or_default();

    DeviceObservation {
        address: props.address.to_string(),
        name: props.local_name,
        rssi: props.rssi.unwrap_or(RSSI_UNKNOWN),
        services: props.services.iter().map(|uuid| uuid.to_string()).collect(),
        manufacturer_data,
        observed_at: Utc::now(),
    }
}

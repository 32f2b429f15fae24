//! Selection state and frame rendering.
//!
//! Rendering is a pure function from the view state and a registry
//! snapshot to a list of lines; painting them is left to the binary.

use std::time::Duration;

use crate::config::MonitorConfig;
use crate::registry::{Activity, SnapshotEntry};

const NAME_WIDTH: usize = 20;
const ADDR_WIDTH: usize = 17;
const BAR_WIDTH: usize = 20;
const SERVICES_WIDTH: usize = 40;
const MANUFACTURER_HEX_WIDTH: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewMode {
    List,
    Detail,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionMove {
    Up,
    Down,
}

/// One rendered terminal frame, top line first.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub lines: Vec<String>,
}

pub struct ViewController {
    mode: ViewMode,
    selected: Option<String>,
    rssi_floor: i16,
    rssi_ceiling: i16,
}

impl ViewController {
    pub fn new(config: &MonitorConfig) -> ViewController {
        ViewController {
            mode: ViewMode::List,
            selected: None,
            rssi_floor: config.rssi_floor,
            rssi_ceiling: config.rssi_ceiling,
        }
    }

    pub fn mode(&self) -> ViewMode {
        self.mode
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    /// Move the cursor within the current snapshot ordering. Clamps at
    /// both ends, no wraparound; a move with nothing selected picks the
    /// top entry; no-op on an empty snapshot.
    pub fn move_selection(&mut self, direction: SelectionMove, snapshot: &[SnapshotEntry]) {
        if snapshot.is_empty() {
            return;
        }
        let current = self
            .selected
            .as_ref()
            .and_then(|addr| snapshot.iter().position(|e| &e.record.address == addr));
        let next = match (direction, current) {
            (_, None) => 0,
            (SelectionMove::Up, Some(i)) => i.saturating_sub(1),
            (SelectionMove::Down, Some(i)) => (i + 1).min(snapshot.len() - 1),
        };
        self.selected = Some(snapshot[next].record.address.clone());
    }

    /// Switch between list and detail. Detail requires a selection.
    pub fn toggle_detail(&mut self) {
        self.mode = match self.mode {
            ViewMode::Detail => ViewMode::List,
            ViewMode::List if self.selected.is_some() => ViewMode::Detail,
            ViewMode::List => ViewMode::List,
        };
    }

    pub fn back_to_list(&mut self) {
        self.mode = ViewMode::List;
    }

    /// React to registry eviction: a selection pointing at an evicted
    /// address is released and the view reverts to list mode.
    pub fn forget(&mut self, evicted: &[String]) {
        if let Some(selected) = &self.selected {
            if evicted.contains(selected) {
                self.selected = None;
                self.mode = ViewMode::List;
            }
        }
    }

    pub fn render(&self, snapshot: &[SnapshotEntry]) -> Frame {
        match self.mode {
            ViewMode::List => self.render_list(snapshot),
            ViewMode::Detail => self.render_detail(snapshot),
        }
    }

    fn render_list(&self, snapshot: &[SnapshotEntry]) -> Frame {
        let mut lines = Vec::with_capacity(snapshot.len() + 3);
        lines.push(format!(
            "blewatch - {} device(s)   q:quit  enter:detail  up/down:select",
            snapshot.len()
        ));
        lines.push(format!(
            "  {:<name$} | {:<addr$} | {:<bar$} | RSSI",
            "Device Name",
            "Address",
            "Signal",
            name = NAME_WIDTH,
            addr = ADDR_WIDTH,
            bar = BAR_WIDTH,
        ));
        lines.push("-".repeat(lines[1].len()));
        for entry in snapshot {
            let marker = if self.selected.as_deref() == Some(entry.record.address.as_str()) {
                "> "
            } else {
                "  "
            };
            let name = truncate(entry.record.display_name(), NAME_WIDTH);
            let line = match entry.activity {
                Activity::Active => format!(
                    "{}{:<name$} | {:<addr$} | {} | {} dBm",
                    marker,
                    name,
                    entry.record.address,
                    self.signal_bar(entry.record.rssi),
                    entry.record.rssi,
                    name = NAME_WIDTH,
                    addr = ADDR_WIDTH,
                ),
                Activity::Inactive => format!(
                    "{}{:<name$} | {:<addr$} | last seen {} ago",
                    marker,
                    name,
                    entry.record.address,
                    format_age(entry.age),
                    name = NAME_WIDTH,
                    addr = ADDR_WIDTH,
                ),
            };
            lines.push(line);
        }
        Frame { lines }
    }

    fn render_detail(&self, snapshot: &[SnapshotEntry]) -> Frame {
        let entry = self
            .selected
            .as_ref()
            .and_then(|addr| snapshot.iter().find(|e| &e.record.address == addr));
        let entry = match entry {
            Some(e) => e,
            // Evicted between ticks: show a placeholder until the next
            // eviction pass resets the view.
            None => {
                return Frame {
                    lines: vec![
                        "Device no longer in range.".to_string(),
                        String::new(),
                        "esc:list  q:quit".to_string(),
                    ],
                }
            }
        };
        let signal = match entry.activity {
            Activity::Active => format!(
                "Signal: {} ({} dBm)",
                self.signal_bar(entry.record.rssi),
                entry.record.rssi
            ),
            Activity::Inactive => format!("Last seen: {} ago", format_age(entry.age)),
        };
        Frame {
            lines: vec![
                format!("Device: {}", entry.record.display_name()),
                format!("Address: {}", entry.record.address),
                signal,
                format!(
                    "First seen: {}",
                    entry.record.first_seen.format("%Y-%m-%d %H:%M:%S UTC")
                ),
                format!("Services: {}", format_services(&entry.record.services)),
                format!(
                    "Manufacturer: {}",
                    format_manufacturer(&entry.record.manufacturer_data)
                ),
                String::new(),
                "esc:list  q:quit".to_string(),
            ],
        }
    }

    /// Fixed-width signal bar. RSSI is clamped to the display domain,
    /// so out-of-range values pin to the nearest end.
    fn signal_bar(&self, rssi: i16) -> String {
        let clamped = rssi.clamp(self.rssi_floor, self.rssi_ceiling);
        let span = (self.rssi_ceiling - self.rssi_floor) as f64;
        let fraction = (clamped - self.rssi_floor) as f64 / span;
        let filled = ((fraction * BAR_WIDTH as f64).ceil() as usize).min(BAR_WIDTH);
        format!("{}{}", "█".repeat(filled), "░".repeat(BAR_WIDTH - filled))
    }
}

fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

/// Human-readable elapsed time, coarse on purpose.
pub fn format_age(age: Duration) -> String {
    let secs = age.as_secs();
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    }
}

fn format_services(services: &[String]) -> String {
    if services.is_empty() {
        return "none".to_string();
    }
    let joined = services
        .iter()
        .map(|uuid| truncate(uuid, 8))
        .collect::<Vec<String>>()
        .join(", ");
    truncate(&joined, SERVICES_WIDTH)
}

fn format_manufacturer(data: &[u8]) -> String {
    if data.is_empty() {
        return "none".to_string();
    }
    if data.len() < 2 {
        return hex_string(data);
    }
    // First two bytes are the little-endian company identifier.
    let id = u16::from_le_bytes([data[0], data[1]]);
    let payload = hex_string(&data[2..]);
    format!(
        "ID: {:04x}, Data: {}",
        id,
        truncate(&payload, MANUFACTURER_HEX_WIDTH)
    )
}

fn hex_string(data: &[u8]) -> String {
    data.iter().map(|b| format!("{:02x}", b)).collect()
}

//! The event loop backbone.
//!
//! One monitor owns all mutable state (registry, block logger, view);
//! everything else is a producer. Advertisements, decoded key presses
//! and shutdown requests arrive on a single channel, and the rotation
//! and redraw timers are periodic messages on tick channels in the
//! same `select!`, so every mutation passes through one serialized
//! point.
//!
//! Note: the monitor runs in a dedicated thread; rendered frames go
//! out on a channel for the terminal side to paint.

use chrono::{DateTime, Utc};
use crossbeam::channel;

use crate::blocklog::{BlockSink, ScanBlockLogger};
use crate::config::MonitorConfig;
use crate::observation::DeviceObservation;
use crate::registry::DeviceRegistry;
use crate::view::{Frame, SelectionMove, ViewController};

/// Keyboard actions, after terminal-specific decoding in the binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    Up,
    Down,
    ToggleDetail,
    BackToList,
    Quit,
}

/// Everything producers can feed into the monitor.
#[derive(Debug, Clone)]
pub enum MonitorEvent {
    Advertisement(DeviceObservation),
    Key(KeyAction),
    Shutdown,
}

pub struct Monitor<S: BlockSink> {
    config: MonitorConfig,
    registry: DeviceRegistry,
    logger: ScanBlockLogger<S>,
    view: ViewController,
    frames: channel::Sender<Frame>,
}

impl<S: BlockSink> Monitor<S> {
    pub fn new(config: MonitorConfig, sink: S, frames: channel::Sender<Frame>) -> Monitor<S> {
        Monitor {
            registry: DeviceRegistry::new(&config),
            logger: ScanBlockLogger::new(sink),
            view: ViewController::new(&config),
            config,
            frames,
        }
    }

    /// Run until a quit key, an explicit shutdown, or all producers
    /// hanging up. The open scan block is flushed exactly once on the
    /// way out.
    pub fn run(mut self, events: channel::Receiver<MonitorEvent>) {
        let log_tick = channel::tick(self.config.log_rotation_period);
        let render_tick = channel::tick(self.config.render_tick_period);

        loop {
            channel::select! {
                recv(events) -> event => match event {
                    Ok(MonitorEvent::Advertisement(obs)) => self.on_advertisement(obs),
                    Ok(MonitorEvent::Key(key)) => {
                        if self.on_key(key, Utc::now()) {
                            break;
                        }
                    }
                    Ok(MonitorEvent::Shutdown) | Err(_) => break,
                },
                recv(log_tick) -> _ => self.on_log_tick(),
                recv(render_tick) -> _ => self.on_render_tick(Utc::now()),
            }
        }

        self.logger.finish();
    }

    /// One advertisement updates the registry and lands in the block
    /// open at this instant, so it appears in exactly one block.
    fn on_advertisement(&mut self, obs: DeviceObservation) {
        self.registry.observe(&obs);
        self.logger.append(&obs);
    }

    fn on_log_tick(&mut self) {
        self.logger.rotate();
    }

    /// Eviction and redraw run on the render tick, independent of
    /// advertisement volume, so the display stays live with zero
    /// incoming traffic.
    fn on_render_tick(&mut self, now: DateTime<Utc>) {
        let evicted = self.registry.evict(now);
        if !evicted.is_empty() {
            self.view.forget(&evicted);
        }
        self.redraw(now);
    }

    /// Returns true when the monitor should shut down. Every other key
    /// mutates the view and triggers an immediate redraw.
    fn on_key(&mut self, key: KeyAction, now: DateTime<Utc>) -> bool {
        match key {
            KeyAction::Quit => return true,
            KeyAction::Up => {
                let snapshot = self.registry.snapshot(now);
                self.view.move_selection(SelectionMove::Up, &snapshot);
            }
            KeyAction::Down => {
                let snapshot = self.registry.snapshot(now);
                self.view.move_selection(SelectionMove::Down, &snapshot);
            }
            KeyAction::ToggleDetail => self.view.toggle_detail(),
            KeyAction::BackToList => self.view.back_to_list(),
        }
        self.redraw(now);
        false
    }

    fn redraw(&mut self, now: DateTime<Utc>) {
        let frame = self.view.render(&self.registry.snapshot(now));
        // The paint side hanging up just means nobody is watching.
        let _ = self.frames.send(frame);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocklog::ScanBlock;
    use chrono::TimeZone;
    use std::cell::RefCell;
    use std::io;
    use std::rc::Rc;
    use std::time::Duration;

    #[derive(Clone, Default)]
    struct SharedSink {
        blocks: Rc<RefCell<Vec<ScanBlock>>>,
    }

    impl BlockSink for SharedSink {
        fn write_block(&mut self, block: &ScanBlock) -> io::Result<()> {
            self.blocks.borrow_mut().push(block.clone());
            Ok(())
        }
    }

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

    fn monitor() -> (
        Monitor<SharedSink>,
        Rc<RefCell<Vec<ScanBlock>>>,
        channel::Receiver<Frame>,
    ) {
        let mut config = MonitorConfig::default();
        config.inactivity_threshold = Duration::from_secs(15);
        config.retention_window = Duration::from_secs(60);
        let sink = SharedSink::default();
        let blocks = sink.blocks.clone();
        let (frames_tx, frames_rx) = channel::unbounded();
        (Monitor::new(config, sink, frames_tx), blocks, frames_rx)
    }

    #[test]
    fn advertisements_update_registry_and_open_block() {
        let (mut m, blocks, frames) = monitor();
        m.on_advertisement(obs("AA:BB", -45, 0));
        m.on_render_tick(t(1));

        let frame = frames.try_recv().unwrap();
        assert!(frame.lines.iter().any(|l| l.contains("AA:BB")));

        m.on_log_tick();
        assert_eq!(blocks.borrow()[0].entries[0].address, "AA:BB");
    }

    #[test]
    fn rotation_splits_observations_into_consecutive_blocks() {
        // rotation period 30s: observations at t=5 and t=40 end up in
        // blocks 1 and 2 respectively
        let (mut m, blocks, _frames) = monitor();
        m.on_advertisement(obs("AA:BB", -45, 5));
        m.on_log_tick();
        m.on_advertisement(obs("CC:DD", -70, 40));
        m.on_log_tick();

        let blocks = blocks.borrow();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].seq, 1);
        assert_eq!(blocks[0].entries[0].address, "AA:BB");
        assert_eq!(blocks[1].seq, 2);
        assert_eq!(blocks[1].entries[0].address, "CC:DD");
    }

    #[test]
    fn eviction_during_detail_falls_back_to_list_without_selection() {
        let (mut m, _blocks, frames) = monitor();
        m.on_advertisement(obs("AA:BB", -45, 0));
        assert!(!m.on_key(KeyAction::Down, t(1)));
        assert!(!m.on_key(KeyAction::ToggleDetail, t(1)));

        // drain the redraws so far; the last one was the detail view
        let drained: Vec<Frame> = frames.try_iter().collect();
        assert!(drained
            .last()
            .unwrap()
            .lines[0]
            .starts_with("Device: dev-AA:BB"));

        // past the retention window the render tick must show the list
        // again with nothing selected
        m.on_render_tick(t(90));
        let frame = frames.try_recv().unwrap();
        assert!(frame.lines[0].starts_with("blewatch - 0 device(s)"));
        assert!(!frame.lines.iter().any(|l| l.starts_with("> ")));
    }

    #[test]
    fn render_tick_emits_a_frame_with_zero_traffic() {
        let (mut m, _blocks, frames) = monitor();
        m.on_render_tick(t(0));
        let frame = frames.try_recv().unwrap();
        assert!(frame.lines[0].starts_with("blewatch - 0 device(s)"));
    }

    #[test]
    fn run_flushes_the_final_block_on_shutdown() {
        let (m, blocks, frames) = monitor();
        let (events_tx, events_rx) = channel::unbounded();
        events_tx
            .send(MonitorEvent::Advertisement(obs("AA:BB", -45, 0)))
            .unwrap();
        events_tx.send(MonitorEvent::Shutdown).unwrap();
        m.run(events_rx);
        drop(frames);

        let blocks = blocks.borrow();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].seq, 1);
        assert_eq!(blocks[0].entries.len(), 1);
    }

    #[test]
    fn run_exits_when_all_producers_hang_up() {
        let (m, blocks, _frames) = monitor();
        let (events_tx, events_rx) = channel::unbounded::<MonitorEvent>();
        drop(events_tx);
        m.run(events_rx);
        assert_eq!(blocks.borrow().len(), 1);
    }

    #[test]
    fn quit_key_stops_the_loop() {
        let (m, blocks, _frames) = monitor();
        let (events_tx, events_rx) = channel::unbounded();
        events_tx.send(MonitorEvent::Key(KeyAction::Quit)).unwrap();
        m.run(events_rx);
        assert_eq!(blocks.borrow().len(), 1);
    }
}

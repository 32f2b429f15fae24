//! Timed scan block logging.
//!
//! Observations are buffered into the currently open block and handed
//! to the sink as a unit on every rotation, so the log shows exactly
//! what was heard in each window, including windows where nothing was.

use std::io;

use chrono::{DateTime, SecondsFormat, Utc};

use crate::observation::DeviceObservation;

#[derive(Debug, Clone, PartialEq)]
pub struct BlockEntry {
    pub timestamp: DateTime<Utc>,
    pub name: String,
    pub address: String,
    pub rssi: i16,
}

/// All observations heard within one rotation window.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanBlock {
    /// Starts at 1, strictly increasing, never reused, never skipped.
    pub seq: u64,
    pub entries: Vec<BlockEntry>,
}

impl ScanBlock {
    fn new(seq: u64) -> ScanBlock {
        ScanBlock {
            seq,
            entries: Vec::new(),
        }
    }

    /// Text form written to the sink: delimiters carrying the sequence
    /// number, one comma-separated line per entry in timestamp, name,
    /// address, RSSI order, and a blank line separating this block from
    /// the next.
    pub fn render(&self) -> String {
        let mut out = format!("--- scan block {} start ---\n", self.seq);
        for entry in &self.entries {
            out.push_str(&format!(
                "{},{},{},{}\n",
                entry.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
                entry.name,
                entry.address,
                entry.rssi,
            ));
        }
        out.push_str(&format!("--- scan block {} end ---\n\n", self.seq));
        out
    }
}

/// Append-only destination for closed scan blocks.
pub trait BlockSink {
    fn write_block(&mut self, block: &ScanBlock) -> io::Result<()>;
}

pub struct ScanBlockLogger<S: BlockSink> {
    sink: S,
    current: ScanBlock,
    sink_warned: bool,
}

impl<S: BlockSink> ScanBlockLogger<S> {
    pub fn new(sink: S) -> ScanBlockLogger<S> {
        ScanBlockLogger {
            sink,
            current: ScanBlock::new(1),
            sink_warned: false,
        }
    }

    /// Buffer one observation into the currently open block. Performs
    /// no I/O; the entry lands in whichever block is open at the moment
    /// of this call.
    pub fn append(&mut self, obs: &DeviceObservation) {
        self.current.entries.push(BlockEntry {
            timestamp: obs.observed_at,
            name: obs.display_name().to_string(),
            address: obs.address.clone(),
            rssi: obs.rssi,
        });
    }

    /// Close the open block, hand it to the sink, and open the next
    /// one. Empty blocks are emitted too: a quiet window is itself
    /// informative.
    pub fn rotate(&mut self) {
        let next_seq = self.current.seq + 1;
        let closed = std::mem::replace(&mut self.current, ScanBlock::new(next_seq));
        self.flush(&closed);
    }

    /// Flush the final, possibly partial block. Consuming the logger
    /// makes flushing the same block twice impossible.
    pub fn finish(mut self) {
        let closed = std::mem::replace(&mut self.current, ScanBlock::new(0));
        self.flush(&closed);
    }

    /// Sequence number of the block currently accepting entries.
    pub fn open_seq(&self) -> u64 {
        self.current.seq
    }

    pub fn open_len(&self) -> usize {
        self.current.entries.len()
    }

    fn flush(&mut self, block: &ScanBlock) {
        if let Err(err) = self.sink.write_block(block) {
            // A logging fault must not take down the interactive
            // session; say so once and keep scanning.
            if !self.sink_warned {
                log::warn!("scan log write failed, continuing without log: {}", err);
                self.sink_warned = true;
            }
        }
    }
}

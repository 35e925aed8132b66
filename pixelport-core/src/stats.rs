//! Frame counters.
//!
//! Write-mostly from the router and serial workers, read by the periodic
//! stats ticker. Each counter is an independent atomic; the ticker takes a
//! per-counter consistent snapshot, not a cross-counter one.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Counters for one configured output.
#[derive(Debug, Default)]
pub struct OutputStats {
    /// Frames the router sliced and published toward this output.
    pub frames_received: AtomicU64,
    /// Frames dropped by slot replacement (skip-ahead).
    pub dropped_replaced: AtomicU64,
    /// Frames skipped because the payload was too short for this output.
    pub dropped_short: AtomicU64,
    /// Frames fully written to the serial port.
    pub frames_written: AtomicU64,
    /// Duration of the most recent serial write, in microseconds.
    pub last_write_micros: AtomicU64,
    /// Most recent port error, if any.
    last_error: Mutex<Option<String>>,
}

impl OutputStats {
    pub fn record_error(&self, error: impl ToString) {
        *self.last_error.lock().expect("stats lock poisoned") = Some(error.to_string());
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().expect("stats lock poisoned").clone()
    }

    pub fn snapshot(&self) -> OutputSnapshot {
        OutputSnapshot {
            frames_received: self.frames_received.load(Ordering::Relaxed),
            dropped_replaced: self.dropped_replaced.load(Ordering::Relaxed),
            dropped_short: self.dropped_short.load(Ordering::Relaxed),
            frames_written: self.frames_written.load(Ordering::Relaxed),
            last_write_micros: self.last_write_micros.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of one output's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutputSnapshot {
    pub frames_received: u64,
    pub dropped_replaced: u64,
    pub dropped_short: u64,
    pub frames_written: u64,
    pub last_write_micros: u64,
}

/// Server-wide counters.
#[derive(Debug, Default)]
pub struct ServerStats {
    /// Pixel-data messages received across all connections.
    pub frames_received: AtomicU64,
    /// Messages with a command other than set-pixel-colors.
    pub unknown_commands: AtomicU64,
}

impl ServerStats {
    pub fn snapshot(&self) -> (u64, u64) {
        (
            self.frames_received.load(Ordering::Relaxed),
            self.unknown_commands.load(Ordering::Relaxed),
        )
    }
}

/// Relaxed increment helper; all counters tolerate torn cross-counter
/// reads by design.
pub(crate) fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

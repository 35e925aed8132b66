//! Optional output pacing.
//!
//! When `target_fps` is configured, each worker sleeps out the remainder
//! of the frame interval after a write. Combined with the latest-wins slot
//! this caps the serial frame rate without ever queueing more than one
//! frame. No catch-up bursts: a late frame just resets the deadline.

use std::time::{Duration, Instant};

/// Paces one worker's writes toward a fixed frame interval.
#[derive(Debug, Clone)]
pub struct FramePacer {
    interval: Duration,
    next_due: Option<Instant>,
}

impl FramePacer {
    pub fn new(target_fps: u32) -> Self {
        Self {
            interval: Duration::from_secs(1) / target_fps.max(1),
            next_due: None,
        }
    }

    /// Build a pacer only when a target is configured.
    pub fn from_target(target_fps: Option<u32>) -> Option<Self> {
        target_fps.map(Self::new)
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Sleep until the current frame interval has elapsed, then arm the
    /// next one. Called from the blocking worker thread after each write.
    pub fn pace(&mut self) {
        let now = Instant::now();
        if let Some(due) = self.next_due {
            if due > now {
                std::thread::sleep(due - now);
                self.next_due = Some(due + self.interval);
                return;
            }
        }
        self.next_due = Some(now + self.interval);
    }
}

//! Single-element latest-wins mailbox between the router and one serial
//! worker.
//!
//! The slot is the only mechanism enforcing skip-ahead: when a worker is
//! slow on its port, intermediate frames evaporate and the worker observes
//! only the most recent frame at the moment it becomes ready. Publishing
//! never blocks and never fails under congestion; a pending frame is
//! simply replaced. Installations prefer current over complete.
//!
//! The publisher side runs on whichever async task received the TCP frame;
//! the consumer side is a blocking OS thread, so the wait is a condvar
//! rather than an async primitive.

use std::sync::{Condvar, Mutex};

use crate::error::BridgeError;

/// One pixel buffer queued for an output, tagged with its publish order.
#[derive(Debug)]
pub struct Frame {
    /// Monotonically increasing per-slot sequence number. A worker never
    /// observes a smaller value than the last one it consumed.
    pub seq: u64,
    /// Sliced pixel bytes, `led_count × 3` at this boundary (transforms
    /// run inside the worker).
    pub pixels: Vec<u8>,
}

/// Outcome of a publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Published {
    /// The slot was empty; the frame is now pending.
    Fresh,
    /// A pending frame was dropped to make room.
    Replaced,
}

#[derive(Debug, Default)]
struct Inner {
    pending: Option<Frame>,
    next_seq: u64,
    closed: bool,
}

/// Single-slot handoff. See module docs.
#[derive(Debug, Default)]
pub struct Slot {
    inner: Mutex<Inner>,
    ready: Condvar,
}

impl Slot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `pixels`, replacing any pending frame.
    ///
    /// Never blocks. Fails only once the slot has been closed for
    /// shutdown.
    pub fn publish(&self, pixels: Vec<u8>) -> Result<Published, BridgeError> {
        let mut inner = self.inner.lock().expect("slot lock poisoned");
        if inner.closed {
            return Err(BridgeError::SlotClosed);
        }
        let seq = inner.next_seq;
        inner.next_seq += 1;
        let outcome = if inner.pending.replace(Frame { seq, pixels }).is_some() {
            Published::Replaced
        } else {
            Published::Fresh
        };
        self.ready.notify_one();
        Ok(outcome)
    }

    /// Block until a frame is pending, then remove and return it.
    ///
    /// Returns `None` once the slot is closed and drained, which is the
    /// worker's signal to shut down.
    pub fn take(&self) -> Option<Frame> {
        let mut inner = self.inner.lock().expect("slot lock poisoned");
        loop {
            if let Some(frame) = inner.pending.take() {
                return Some(frame);
            }
            if inner.closed {
                return None;
            }
            inner = self.ready.wait(inner).expect("slot lock poisoned");
        }
    }

    /// Non-blocking take, for reconnect loops and tests.
    pub fn try_take(&self) -> Option<Frame> {
        self.inner.lock().expect("slot lock poisoned").pending.take()
    }

    /// Close the slot: wake the worker and make future publishes fail.
    ///
    /// A frame already pending is still delivered before the shutdown
    /// sentinel, so a final blackout frame can be flushed.
    pub fn close(&self) {
        let mut inner = self.inner.lock().expect("slot lock poisoned");
        inner.closed = true;
        self.ready.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().expect("slot lock poisoned").closed
    }

    /// Number of frames currently pending (0 or 1 by construction).
    pub fn depth(&self) -> usize {
        usize::from(
            self.inner
                .lock()
                .expect("slot lock poisoned")
                .pending
                .is_some(),
        )
    }
}

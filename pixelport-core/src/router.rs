//! Channel → output fan-out.
//!
//! The router runs on whichever connection task decoded the message and
//! publishes into each output's slot synchronously: no suspension points,
//! no allocation beyond the one per-output slice. Pixel-format conversion
//! happens later, inside the worker, so a slow transform can never stall
//! the TCP side.

use std::ops::Range;
use std::sync::Arc;

use crate::config::OutputConfig;
use crate::opc::OpcMessage;
use crate::slot::{Published, Slot};
use crate::stats::{bump, OutputStats, ServerStats};

/// One output as the router sees it: a channel filter, a byte range and a
/// slot to publish into.
#[derive(Debug)]
pub struct Target {
    name: String,
    channel: u8,
    range: Range<usize>,
    slot: Arc<Slot>,
    stats: Arc<OutputStats>,
}

impl Target {
    pub fn new(config: &OutputConfig, slot: Arc<Slot>, stats: Arc<OutputStats>) -> Self {
        Self {
            name: config.port.clone(),
            channel: config.opc_channel,
            range: config.byte_range(),
            slot,
            stats,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Maps `(channel, payload)` to the outputs that care and slices each
/// output's pixel window out of the payload.
#[derive(Debug)]
pub struct Router {
    targets: Vec<Target>,
    stats: Arc<ServerStats>,
}

impl Router {
    pub fn new(targets: Vec<Target>, stats: Arc<ServerStats>) -> Self {
        Self { targets, stats }
    }

    pub fn server_stats(&self) -> &Arc<ServerStats> {
        &self.stats
    }

    /// Deliver one OPC message.
    ///
    /// Channel 0 broadcasts to every output; other channels address
    /// outputs configured for them. A payload too short for an output's
    /// window skips that output only. Commands other than set-pixel-colors
    /// are reserved by the wire protocol; they are counted and discarded.
    pub fn dispatch(&self, msg: &OpcMessage) {
        if !msg.is_set_pixels() {
            bump(&self.stats.unknown_commands);
            tracing::trace!(command = msg.command, "ignoring unknown OPC command");
            return;
        }
        bump(&self.stats.frames_received);

        for target in &self.targets {
            if !msg.is_broadcast() && target.channel != msg.channel {
                continue;
            }
            bump(&target.stats.frames_received);

            if target.range.end > msg.data.len() {
                bump(&target.stats.dropped_short);
                tracing::trace!(
                    output = %target.name,
                    need = target.range.end,
                    got = msg.data.len(),
                    "payload too short; output skipped for this frame"
                );
                continue;
            }

            let pixels = msg.data[target.range.clone()].to_vec();
            match target.slot.publish(pixels) {
                Ok(Published::Replaced) => bump(&target.stats.dropped_replaced),
                Ok(Published::Fresh) => {}
                // Shutdown race: the worker is gone, nothing to do.
                Err(_) => {}
            }
        }
    }
}

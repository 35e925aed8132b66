//! Open Pixel Control message model.
//!
//! OPC messages travel over TCP with a fixed 4-byte header:
//!
//! ```text
//! channel:  u8   (0 = broadcast to every output)
//! command:  u8   (0x00 = set pixel colors; everything else is ignored)
//! length:   u16  big-endian payload byte count
//! data:     [u8; length]
//! ```

use bytes::Bytes;

/// Length of the OPC header preceding every payload.
pub const OPC_HEADER_LEN: usize = 4;

/// The only command the bridge acts on: set pixel colors.
pub const CMD_SET_PIXELS: u8 = 0x00;

/// Channel 0 addresses every configured output.
pub const CHANNEL_BROADCAST: u8 = 0;

/// Default OPC listen port.
pub const DEFAULT_OPC_PORT: u16 = 7890;

/// One parsed OPC message.
///
/// `data` is a cheap handle into the connection's read buffer; the router
/// slices per-output ranges out of it without copying the whole payload.
#[derive(Debug, Clone)]
pub struct OpcMessage {
    pub channel: u8,
    pub command: u8,
    pub data: Bytes,
}

impl OpcMessage {
    pub fn new(channel: u8, command: u8, data: Bytes) -> Self {
        Self {
            channel,
            command,
            data,
        }
    }

    /// Whether this message carries pixel data the bridge should act on.
    pub fn is_set_pixels(&self) -> bool {
        self.command == CMD_SET_PIXELS
    }

    /// Whether this message addresses every output.
    pub fn is_broadcast(&self) -> bool {
        self.channel == CHANNEL_BROADCAST
    }

    /// Encode the message into OPC wire bytes (header + payload).
    ///
    /// The payload must fit the 16-bit length field; callers control this
    /// by construction (the codec never produces larger payloads).
    pub fn to_wire(&self) -> Vec<u8> {
        let len = self.data.len() as u16;
        let mut wire = Vec::with_capacity(OPC_HEADER_LEN + self.data.len());
        wire.push(self.channel);
        wire.push(self.command);
        wire.extend_from_slice(&len.to_be_bytes());
        wire.extend_from_slice(&self.data);
        wire
    }
}

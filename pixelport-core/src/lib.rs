//! OPC → serial LED bridge.
//!
//! Accepts Open Pixel Control frames over TCP and fans them out, with
//! per-output slicing and pixel-format conversion, to USB serial LED
//! controllers speaking AdaLight, AWA (HyperSerial) or WLED's AdaLight
//! variant with runtime baud switching. A drop-in replacement for
//! discontinued FadeCandy hardware in LED-art installations.
//!
//! Data flows strictly left to right:
//!
//! ```text
//! TCP client → acceptor → framer → router
//!   → (per output) slot → serial worker
//!   → pixel transform → protocol codec → serial port
//! ```
//!
//! The slot between router and worker holds at most one frame and always
//! keeps the newest: when a port is slow, intermediate frames evaporate
//! instead of queueing. LED art prefers current over complete.

mod codec;
mod config;
mod error;
mod opc;
mod output;
mod pacing;
mod pixel;
pub mod protocol;
mod router;
mod server;
mod slot;
mod stats;

pub use codec::OpcCodec;
pub use config::{Config, OpcEndpoint, OutputConfig};
pub use error::BridgeError;
pub use opc::{OpcMessage, CHANNEL_BROADCAST, CMD_SET_PIXELS, DEFAULT_OPC_PORT, OPC_HEADER_LEN};
pub use output::{spawn as spawn_output, OutputHandle};
pub use pacing::FramePacer;
pub use pixel::{transform, PixelFormat};
pub use protocol::Protocol;
pub use router::{Router, Target};
pub use server::{serve_connection, BridgeServer, STATS_INTERVAL};
pub use slot::{Frame, Published, Slot};
pub use stats::{OutputSnapshot, OutputStats, ServerStats};

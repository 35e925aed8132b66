//! Domain-specific error types for the bridge.
//!
//! All fallible operations return `Result<T, BridgeError>`.
//! Peer- and device-caused failures are typed and recoverable; each call
//! site decides locally between ignore, skip-this-frame, and
//! reset-this-output. Only configuration and bind failures are fatal.

use thiserror::Error;

/// The canonical error type for the bridge.
#[derive(Debug, Error)]
pub enum BridgeError {
    // ── Configuration (fatal before startup) ─────────────────────
    /// The configuration is invalid or self-inconsistent.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Configuration file could not be parsed.
    #[error("config parse error: {0}")]
    ConfigParse(#[from] serde_json::Error),

    /// A WLED output requested a data baud with no serial command byte.
    #[error("unsupported WLED baud rate: {0}")]
    UnsupportedBaud(u32),

    // ── Network (fatal bind, recoverable per connection) ─────────
    /// Binding the OPC listener failed.
    #[error("failed to bind OPC listener on {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    /// The TCP/IO layer reported an error on one connection.
    #[error("connection error: {0}")]
    Connection(#[from] std::io::Error),

    // ── Serial (recoverable per output) ──────────────────────────
    /// Opening or configuring a serial port failed.
    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),

    // ── Protocol ─────────────────────────────────────────────────
    /// A serial frame failed structural validation when parsed back.
    #[error("frame decode error: {0}")]
    Decode(&'static str),

    // ── Handoff ──────────────────────────────────────────────────
    /// A publish hit a slot whose worker has shut down.
    #[error("output slot closed")]
    SlotClosed,

    /// A lifecycle transition was requested from the wrong phase.
    #[error("invalid link phase transition: {0}")]
    InvalidPhase(&'static str),
}

impl From<&str> for BridgeError {
    fn from(s: &str) -> Self {
        BridgeError::Config(s.to_string())
    }
}

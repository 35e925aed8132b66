//! Bridge configuration.
//!
//! Loaded once at startup from JSON, validated, then consumed as typed
//! records. Downstream code never re-checks these fields.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::BridgeError;
use crate::opc::DEFAULT_OPC_PORT;
use crate::pixel::PixelFormat;
use crate::protocol::{wled, Protocol};

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// OPC listener endpoint.
    #[serde(default)]
    pub opc: OpcEndpoint,
    /// Optional output pacing target. Absent → frames go out as they land.
    #[serde(default)]
    pub target_fps: Option<u32>,
    /// Serial outputs, one per attached controller.
    pub outputs: Vec<OutputConfig>,
}

/// Where the OPC listener binds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpcEndpoint {
    pub host: String,
    pub port: u16,
}

impl Default for OpcEndpoint {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: DEFAULT_OPC_PORT,
        }
    }
}

impl OpcEndpoint {
    /// Format as `"host:port"` for socket binding.
    pub fn to_socket_string(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// One serial LED controller destination. Immutable after startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Serial device path (`/dev/ttyACM0`, `COM3`, ...).
    pub port: String,
    /// Protocol the controller speaks.
    pub protocol: Protocol,
    /// Optional hardware identifier; `"WLED"` enables baud negotiation
    /// even when `protocol` is `adalight`.
    #[serde(default)]
    pub hardware_type: Option<String>,
    /// Baud for pixel data.
    pub baud_rate: u32,
    /// Baud for the WLED JSON probe; defaults to 115200.
    #[serde(default)]
    pub handshake_baud_rate: Option<u32>,
    /// Total pixels this output drives.
    pub led_count: usize,
    /// OPC channel this output listens on (0 also receives broadcasts).
    #[serde(default)]
    pub opc_channel: u8,
    /// Starting pixel index into the channel's pixel data.
    #[serde(default)]
    pub opc_offset: usize,
    /// Byte order at the serial wire; `null` → passthrough.
    #[serde(default)]
    pub pixel_format: Option<PixelFormat>,
}

impl OutputConfig {
    /// Protocol after resolving the `hardware_type: "WLED"` override.
    pub fn effective_protocol(&self) -> Protocol {
        if self.protocol == Protocol::Wled {
            return Protocol::Wled;
        }
        match &self.hardware_type {
            Some(hw) if hw.eq_ignore_ascii_case("wled") => Protocol::Wled,
            _ => self.protocol,
        }
    }

    /// Pixel format with the `null` default applied.
    pub fn format(&self) -> PixelFormat {
        self.pixel_format.unwrap_or_default()
    }

    /// Baud for the initial probe (WLED only).
    pub fn handshake_baud(&self) -> u32 {
        self.handshake_baud_rate
            .unwrap_or(wled::DEFAULT_HANDSHAKE_BAUD)
    }

    /// Byte range this output consumes from an inbound payload.
    pub fn byte_range(&self) -> std::ops::Range<usize> {
        let start = self.opc_offset * 3;
        start..start + self.led_count * 3
    }
}

impl Config {
    /// Parse a JSON document and validate it in one step.
    pub fn from_json(text: &str) -> Result<Self, BridgeError> {
        let config: Config = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject invalid or self-inconsistent configurations before any port
    /// or socket is touched.
    pub fn validate(&self) -> Result<(), BridgeError> {
        if self.outputs.is_empty() {
            return Err(BridgeError::Config("no outputs defined".into()));
        }
        if self.target_fps == Some(0) {
            return Err(BridgeError::Config("target_fps must be at least 1".into()));
        }

        let mut seen_ports = HashSet::new();
        for output in &self.outputs {
            if output.port.is_empty() {
                return Err(BridgeError::Config("output with empty port name".into()));
            }
            if !seen_ports.insert(output.port.as_str()) {
                return Err(BridgeError::Config(format!(
                    "duplicate output port: {}",
                    output.port
                )));
            }
            if output.led_count == 0 {
                return Err(BridgeError::Config(format!(
                    "{}: led_count must be at least 1",
                    output.port
                )));
            }

            if output.effective_protocol() == Protocol::Wled {
                // WLED expects RGB at the wire; reordering is its job.
                match output.format() {
                    PixelFormat::Passthrough | PixelFormat::Rgb => {}
                    other => {
                        return Err(BridgeError::Config(format!(
                            "{}: WLED outputs take RGB data, not {:?}",
                            output.port, other
                        )))
                    }
                }
                if wled::baud_command(output.baud_rate).is_none() {
                    return Err(BridgeError::UnsupportedBaud(output.baud_rate));
                }
            } else if output.handshake_baud_rate.is_some() {
                tracing::warn!(
                    port = %output.port,
                    "handshake_baud_rate is ignored for non-WLED outputs"
                );
            }
        }
        Ok(())
    }
}

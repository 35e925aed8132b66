//! WLED baud negotiation.
//!
//! WLED receivers speak AdaLight on the data path but additionally accept a
//! one-byte baud-change command and a JSON info query over the same serial
//! line. The bridge opens at a handshake baud (115200 unless configured),
//! confirms the device is WLED, switches the device to the data baud and
//! reopens the port there. None of this is acknowledged on the hot path,
//! so the whole exchange runs before the first pixel frame.
//!
//! ```text
//!  Opening ──► Probing ──► Switching ──► Running
//!     ▲           │                         │
//!     │           └────────(not WLED)──────►│
//!     └───────────────── Error ◄────────────┘
//! ```
//!
//! Baud changes are not persistent across power cycles; the sequence
//! re-runs on every open.

use std::io::{ErrorKind, Read, Write};
use std::time::{Duration, Instant};

use crate::error::BridgeError;

/// Handshake query understood by WLED's serial JSON API.
pub const PROBE_QUERY: &[u8] = b"{\"v\":true}\n";

/// Default baud for the initial JSON probe.
pub const DEFAULT_HANDSHAKE_BAUD: u32 = 115_200;

/// How long to wait for a probe response.
pub const PROBE_TIMEOUT: Duration = Duration::from_millis(250);

/// Settle time after sending a baud-change byte, before reopening.
pub const SWITCH_SETTLE: Duration = Duration::from_millis(200);

/// One-byte baud-change commands. Sent only in idle, never mid-frame.
const BAUD_COMMANDS: [(u32, u8); 9] = [
    (115_200, 0xB0),
    (230_400, 0xB1),
    (460_800, 0xB2),
    (500_000, 0xB3),
    (576_000, 0xB4),
    (921_600, 0xB5),
    (1_000_000, 0xB6),
    (1_500_000, 0xB7),
    (2_000_000, 0xB8),
];

/// The command byte that switches a WLED device to `baud`, if any.
pub fn baud_command(baud: u32) -> Option<u8> {
    BAUD_COMMANDS
        .iter()
        .find(|(rate, _)| *rate == baud)
        .map(|(_, cmd)| *cmd)
}

/// Baud rates a WLED device can be switched to.
pub fn supported_bauds() -> impl Iterator<Item = u32> {
    BAUD_COMMANDS.iter().map(|(rate, _)| *rate)
}

// ── LinkPhase ────────────────────────────────────────────────────

/// Lifecycle of one WLED serial link, with validated transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkPhase {
    /// Port not yet open (or reopening after an error). Initial state.
    #[default]
    Opening,

    /// Port open at the handshake baud; JSON probe in flight.
    Probing,

    /// Device confirmed; baud-change byte sent, waiting to reopen.
    Switching,

    /// Emitting AdaLight frames at the data baud.
    Running,

    /// Serial error; the port must be closed and reopened.
    Error,
}

impl std::fmt::Display for LinkPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Opening => write!(f, "Opening"),
            Self::Probing => write!(f, "Probing"),
            Self::Switching => write!(f, "Switching"),
            Self::Running => write!(f, "Running"),
            Self::Error => write!(f, "Error"),
        }
    }
}

impl LinkPhase {
    /// Transition to `Probing`. Valid from: `Opening`.
    pub fn begin_probe(&mut self) -> Result<(), BridgeError> {
        match self {
            Self::Opening => {
                *self = Self::Probing;
                Ok(())
            }
            _ => Err(BridgeError::InvalidPhase("probe requires Opening")),
        }
    }

    /// Transition to `Switching`. Valid from: `Probing`.
    pub fn begin_switch(&mut self) -> Result<(), BridgeError> {
        match self {
            Self::Probing => {
                *self = Self::Switching;
                Ok(())
            }
            _ => Err(BridgeError::InvalidPhase("switch requires Probing")),
        }
    }

    /// Transition to `Running`.
    ///
    /// Valid from: `Switching` (reopened at the data baud), and `Probing`
    /// (no switch needed, or probe failed → best-effort AdaLight at the
    /// current baud).
    pub fn start_running(&mut self) -> Result<(), BridgeError> {
        match self {
            Self::Probing | Self::Switching => {
                *self = Self::Running;
                Ok(())
            }
            _ => Err(BridgeError::InvalidPhase(
                "running requires Probing or Switching",
            )),
        }
    }

    /// Force into `Error` from any phase; use on any serial failure.
    pub fn fail(&mut self) {
        *self = Self::Error;
    }

    /// Transition back to `Opening`. Valid from: `Error`.
    pub fn reopen(&mut self) -> Result<(), BridgeError> {
        match self {
            Self::Error => {
                *self = Self::Opening;
                Ok(())
            }
            _ => Err(BridgeError::InvalidPhase("reopen requires Error")),
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }
}

// ── Probe / switch I/O ───────────────────────────────────────────

/// Send the JSON info query and decide whether the device is WLED.
///
/// Generic over `Read + Write` so the exchange can be exercised without a
/// physical port; the port's own read timeout bounds each read call, and
/// `deadline` bounds the whole exchange. A negative answer is not an
/// error: the caller downgrades to best-effort AdaLight.
pub fn probe<P: Read + Write>(port: &mut P, deadline: Duration) -> std::io::Result<bool> {
    port.write_all(PROBE_QUERY)?;
    port.flush()?;

    let mut response = Vec::new();
    let mut buf = [0u8; 256];
    let until = Instant::now() + deadline;

    while Instant::now() < until {
        match port.read(&mut buf) {
            Ok(0) => continue,
            Ok(n) => {
                response.extend_from_slice(&buf[..n]);
                if confirms_wled(&response) {
                    return Ok(true);
                }
                // Bounded: a chatty non-WLED device cannot grow this forever.
                if response.len() > 4096 {
                    break;
                }
            }
            Err(e) if e.kind() == ErrorKind::TimedOut || e.kind() == ErrorKind::WouldBlock => {
                continue;
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }

    Ok(confirms_wled(&response))
}

/// Whether accumulated probe bytes identify a WLED device.
///
/// Accepts either a parseable JSON state object carrying the `info` field,
/// or a brand string anywhere in the (possibly still partial) response.
fn confirms_wled(response: &[u8]) -> bool {
    if let Ok(value) = serde_json::from_slice::<serde_json::Value>(response) {
        if value.get("info").is_some() {
            return true;
        }
    }
    let text = String::from_utf8_lossy(response);
    text.to_ascii_lowercase().contains("wled")
}

/// Write the one-byte baud-change command for `target`.
///
/// Must only be called between frames; the caller then waits
/// [`SWITCH_SETTLE`] (the device prints "Baud is now <N>"), closes the
/// port and reopens it at `target`.
pub fn send_baud_command<P: Write>(port: &mut P, target: u32) -> Result<u8, BridgeError> {
    let cmd = baud_command(target).ok_or(BridgeError::UnsupportedBaud(target))?;
    port.write_all(&[cmd])?;
    port.flush()?;
    Ok(cmd)
}

// ── Tests ────────────────────────────────────────────────────────

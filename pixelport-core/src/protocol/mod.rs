//! Serial protocol codecs.
//!
//! Codecs are tagged variants selected once per output and dispatched per
//! frame. All of them emit a contiguous byte stream with no acknowledgement
//! on the data path. WLED is the AdaLight codec plus a baud-negotiation
//! prelude (see [`wled`]).

pub mod adalight;
pub mod awa;
pub mod wled;

use serde::{Deserialize, Serialize};

/// Which serial protocol an output speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Adalight,
    Awa,
    Wled,
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Adalight => write!(f, "adalight"),
            Self::Awa => write!(f, "awa"),
            Self::Wled => write!(f, "wled"),
        }
    }
}

impl Protocol {
    /// Whether this output runs the WLED negotiation prelude on open.
    pub fn negotiates_baud(self) -> bool {
        matches!(self, Self::Wled)
    }
}

/// Encode one frame of wire-ordered pixel bytes for `protocol`.
pub fn encode_frame(protocol: Protocol, pixels: &[u8], stride: usize) -> Vec<u8> {
    match protocol {
        // WLED receivers speak plain AdaLight on the data path.
        Protocol::Adalight | Protocol::Wled => adalight::encode_frame(pixels, stride),
        Protocol::Awa => awa::encode_frame(pixels, stride),
    }
}

/// Shared header count field: `(N − 1)` big-endian plus XOR checksum.
///
/// Both AdaLight and AWA encode the LED count as `count − 1`. The two MUST
/// stay identical: a count encoded as N would shift every following byte,
/// and a stray 0xB0..0xB8 landing where a WLED receiver expects a command
/// switches its baud rate until power cycle.
pub(crate) fn count_field(led_count: usize) -> (u8, u8, u8) {
    let n = led_count.saturating_sub(1);
    let hi = (n >> 8) as u8;
    let lo = n as u8;
    (hi, lo, hi ^ lo ^ 0x55)
}

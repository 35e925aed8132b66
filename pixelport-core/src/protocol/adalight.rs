//! AdaLight frame codec.
//!
//! ```text
//! 'A' 'd' 'a'  count_hi count_lo checksum  <pixel bytes>
//! ```
//!
//! The count field is `(led_count − 1)` big-endian; the checksum is
//! `hi ^ lo ^ 0x55`.

use super::count_field;
use crate::error::BridgeError;

/// AdaLight magic prefix.
pub const MAGIC: [u8; 3] = [0x41, 0x64, 0x61];

/// Header bytes preceding the pixel payload.
pub const HEADER_LEN: usize = 6;

/// Build a complete AdaLight frame from wire-ordered pixel bytes.
pub fn encode_frame(pixels: &[u8], stride: usize) -> Vec<u8> {
    let led_count = pixels.len() / stride;
    let (hi, lo, checksum) = count_field(led_count);

    let mut frame = Vec::with_capacity(HEADER_LEN + pixels.len());
    frame.extend_from_slice(&MAGIC);
    frame.push(hi);
    frame.push(lo);
    frame.push(checksum);
    frame.extend_from_slice(pixels);
    frame
}

/// Parse an AdaLight frame back into `(led_count, payload)`.
///
/// Verifies magic and header checksum. The payload length is whatever
/// follows the header; callers know the stride.
pub fn decode_frame(frame: &[u8]) -> Result<(usize, &[u8]), BridgeError> {
    if frame.len() < HEADER_LEN {
        return Err(BridgeError::Decode("AdaLight frame shorter than header"));
    }
    if frame[..3] != MAGIC {
        return Err(BridgeError::Decode("missing AdaLight magic"));
    }
    let (hi, lo) = (frame[3], frame[4]);
    if frame[5] != hi ^ lo ^ 0x55 {
        return Err(BridgeError::Decode("AdaLight header checksum mismatch"));
    }
    let led_count = u16::from_be_bytes([hi, lo]) as usize + 1;
    Ok((led_count, &frame[HEADER_LEN..]))
}

//! AWA (HyperSerial) frame codec.
//!
//! Same header layout as AdaLight but with an `'Awa'` magic and a 3-byte
//! Fletcher-style trailer over the pixel payload. The trailer must match
//! the HyperSerialPico firmware byte for byte: two classic Fletcher
//! accumulators mod 255 plus a position-XOR extension byte, where an
//! extension value of 0x41 ('A') is replaced by 0xAA so the trailer can
//! never be mistaken for the start of a new frame.

use super::count_field;

/// AWA magic prefix.
pub const MAGIC: [u8; 3] = [0x41, 0x77, 0x61];

/// Header bytes preceding the pixel payload.
pub const HEADER_LEN: usize = 6;

/// Trailer bytes following the pixel payload.
pub const TRAILER_LEN: usize = 3;

/// Build a complete AWA frame from wire-ordered pixel bytes.
pub fn encode_frame(pixels: &[u8], stride: usize) -> Vec<u8> {
    let led_count = pixels.len() / stride;
    let (hi, lo, checksum) = count_field(led_count);

    let mut frame = Vec::with_capacity(HEADER_LEN + pixels.len() + TRAILER_LEN);
    frame.extend_from_slice(&MAGIC);
    frame.push(hi);
    frame.push(lo);
    frame.push(checksum);
    frame.extend_from_slice(pixels);
    frame.extend_from_slice(&fletcher_trailer(pixels));
    frame
}

/// Fletcher trailer over the pixel payload.
pub(crate) fn fletcher_trailer(payload: &[u8]) -> [u8; TRAILER_LEN] {
    let mut sum: u16 = 0;
    let mut sum_of_sums: u16 = 0;
    let mut ext: u16 = 0;

    for (position, &byte) in payload.iter().enumerate() {
        sum = (sum + byte as u16) % 255;
        sum_of_sums = (sum_of_sums + sum) % 255;
        ext = (ext + (byte as u16 ^ position as u16)) % 255;
    }

    // 0x41 would read as the start of a magic sequence downstream.
    if ext == 0x41 {
        ext = 0xAA;
    }

    [sum as u8, sum_of_sums as u8, ext as u8]
}

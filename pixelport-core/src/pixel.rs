//! Pixel-format conversion between OPC wire order (RGB) and the byte order
//! each LED strip expects.
//!
//! Three-byte reorders are swaps done in place on the frame buffer; the
//! four-byte formats allocate a wider buffer and derive the white channel
//! as `min(R, G, B)` with the color channels carried through unchanged.
//! Gamma and color-temperature-aware white derivation are out of scope.

use serde::{Deserialize, Serialize};

/// Byte order of one pixel at the serial wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PixelFormat {
    /// Leave bytes exactly as received.
    #[default]
    Passthrough,
    Rgb,
    Grb,
    Bgr,
    Rgbw,
    Grbw,
}

impl PixelFormat {
    /// Bytes per pixel at the serial wire.
    pub fn stride(self) -> usize {
        match self {
            Self::Passthrough | Self::Rgb | Self::Grb | Self::Bgr => 3,
            Self::Rgbw | Self::Grbw => 4,
        }
    }

    /// Whether the conversion keeps the 3-byte stride (and runs in place).
    pub fn in_place(self) -> bool {
        self.stride() == 3
    }
}

/// Convert an RGB frame buffer into `format` order.
///
/// Takes ownership: 3-stride formats mutate and return the same buffer,
/// 4-stride formats return a freshly allocated one.
pub fn transform(mut pixels: Vec<u8>, format: PixelFormat) -> Vec<u8> {
    match format {
        PixelFormat::Passthrough | PixelFormat::Rgb => pixels,
        PixelFormat::Grb => {
            for px in pixels.chunks_exact_mut(3) {
                px.swap(0, 1);
            }
            pixels
        }
        PixelFormat::Bgr => {
            for px in pixels.chunks_exact_mut(3) {
                px.swap(0, 2);
            }
            pixels
        }
        PixelFormat::Rgbw => expand_white(&pixels, false),
        PixelFormat::Grbw => expand_white(&pixels, true),
    }
}

/// 3 → 4 stride expansion with W = min(R, G, B).
fn expand_white(pixels: &[u8], swap_rg: bool) -> Vec<u8> {
    let mut out = Vec::with_capacity(pixels.len() / 3 * 4);
    for px in pixels.chunks_exact(3) {
        let (r, g, b) = (px[0], px[1], px[2]);
        let w = r.min(g).min(b);
        if swap_rg {
            out.extend_from_slice(&[g, r, b, w]);
        } else {
            out.extend_from_slice(&[r, g, b, w]);
        }
    }
    out
}

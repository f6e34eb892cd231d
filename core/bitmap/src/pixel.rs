use image::Rgba;
use serde::{Deserialize, Serialize};

use crate::palette;

/// One 32-bit ARGB pixel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pixel {
    pub alpha: u8,
    pub red: u8,
    pub green: u8,
    pub blue: u8,
}

// Luminosity weights out of 255.
const LUMA_RED: u32 = 54;
const LUMA_GREEN: u32 = 182;
const LUMA_BLUE: u32 = 19;

impl Pixel {
    pub const fn new(red: u8, green: u8, blue: u8, alpha: u8) -> Self {
        Self {
            alpha,
            red,
            green,
            blue,
        }
    }

    pub const fn gray(value: u8, alpha: u8) -> Self {
        Self::new(value, value, value, alpha)
    }

    pub fn from_pixel(p: Rgba<u8>) -> Self {
        Self::new(p[0], p[1], p[2], p[3])
    }

    pub fn to_pixel(self) -> Rgba<u8> {
        Rgba([self.red, self.green, self.blue, self.alpha])
    }

    /// Channels in alpha, red, green, blue order.
    pub fn channels(self) -> [u8; 4] {
        [self.alpha, self.red, self.green, self.blue]
    }

    pub fn from_channels(c: [u8; 4]) -> Self {
        Self::new(c[1], c[2], c[3], c[0])
    }

    pub fn same_color(self, other: Pixel) -> bool {
        self.red == other.red && self.green == other.green && self.blue == other.blue
    }

    /// Y8 luminosity. Grays are returned unchanged.
    pub fn luminosity(self) -> u8 {
        if self.red == self.green && self.green == self.blue {
            return self.red;
        }
        let scale = |c: u8, w: u32| (c as u32 * w + 128) / 255;
        let y = scale(self.red, LUMA_RED) + scale(self.green, LUMA_GREEN) + scale(self.blue, LUMA_BLUE);
        y.min(255) as u8
    }

    /// Pack into a 16-bit value with the given channel widths (alpha highest, blue lowest).
    /// Channels with zero bits are dropped.
    pub fn to_16_bit(self, alpha_bits: u8, red_bits: u8, green_bits: u8, blue_bits: u8) -> u16 {
        let mut out: u32 = 0;
        for (value, bits) in [
            (self.alpha, alpha_bits),
            (self.red, red_bits),
            (self.green, green_bits),
            (self.blue, blue_bits),
        ] {
            if bits == 0 {
                continue;
            }
            let max = (1u32 << bits) - 1;
            out = (out << bits) | ((value as u32 * max + 128) / 255);
        }
        out as u16
    }

    /// Inverse of [`Pixel::to_16_bit`]. Missing channels come back as 0xFF.
    pub fn from_16_bit(
        value: u16,
        alpha_bits: u8,
        red_bits: u8,
        green_bits: u8,
        blue_bits: u8,
    ) -> Self {
        let mut remaining = value as u32;
        let mut take = |bits: u8| -> u8 {
            if bits == 0 {
                return 0xFF;
            }
            let max = (1u32 << bits) - 1;
            let field = remaining & max;
            remaining >>= bits;
            (255 * field / max) as u8
        };
        let blue = take(blue_bits);
        let green = take(green_bits);
        let red = take(red_bits);
        let alpha = take(alpha_bits);
        Self::new(red, green, blue, alpha)
    }

    pub fn to_a8y8(self) -> u16 {
        ((self.alpha as u16) << 8) | self.luminosity() as u16
    }

    pub fn from_a8y8(value: u16) -> Self {
        Self::gray((value & 0xFF) as u8, (value >> 8) as u8)
    }

    /// White with the given alpha.
    pub fn from_a8(alpha: u8) -> Self {
        Self::gray(0xFF, alpha)
    }

    pub fn from_y8(luminosity: u8) -> Self {
        Self::gray(luminosity, 0xFF)
    }

    pub fn from_ay8(value: u8) -> Self {
        Self::gray(value, value)
    }

    pub fn to_p8(self) -> u8 {
        palette::nearest_index(self)
    }

    pub fn from_p8(index: u8) -> Self {
        palette::color(index)
    }

    /// Composite `source` over this pixel.
    pub fn alpha_blend(self, source: Pixel) -> Pixel {
        if source.alpha == 0 {
            return self;
        }

        let source_alpha = source.alpha as f32 / 255.0;
        let destination_alpha = self.alpha as f32 / 255.0;
        let blend = destination_alpha * (1.0 - source_alpha);
        let output_alpha = source_alpha + blend;

        let mix = |s: u8, d: u8| {
            ((s as f32 * source_alpha + d as f32 * blend) / output_alpha).clamp(0.0, 255.0) as u8
        };

        Pixel {
            alpha: (output_alpha * 255.0).clamp(0.0, 255.0) as u8,
            red: mix(source.red, self.red),
            green: mix(source.green, self.green),
            blue: mix(source.blue, self.blue),
        }
    }
}

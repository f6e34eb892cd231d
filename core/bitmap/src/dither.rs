//! Floyd-Steinberg error diffusion for the reduced-precision formats.

use crate::codec::PixelCodec;
use crate::pixel::Pixel;
use crate::types::DitherChannels;

/// Right, below-left, below and below-right weights out of 16.
const WEIGHTS: [(isize, usize, f32); 4] = [(1, 0, 7.0), (-1, 1, 3.0), (0, 1, 5.0), (1, 1, 1.0)];

#[derive(Debug, Clone, PartialEq)]
pub struct DitherOutcome {
    /// One encoded value per pixel, in the codec's representation.
    pub encoded: Vec<u32>,
    /// Error that stayed in place, per channel in alpha, red, green, blue order.
    pub undiffused_error: [f32; 4],
}

#[derive(Debug, Clone, Copy)]
pub struct Ditherer {
    pub channels: DitherChannels,
}

impl Ditherer {
    pub fn new(channels: DitherChannels) -> Self {
        Self { channels }
    }

    /// Quantize one `width` x `height` image, pushing each enabled channel's
    /// error onto the neighbours that have not been visited yet.
    ///
    /// Pixels on the first or last column or on the last row keep their error.
    pub fn dither(&self, pixels: &[Pixel], width: u32, height: u32, codec: PixelCodec) -> DitherOutcome {
        let (w, h) = (width as usize, height as usize);
        let enabled = self.channels.as_array();
        let mut working: Vec<[f32; 4]> = pixels
            .iter()
            .map(|p| p.channels().map(|c| c as f32))
            .collect();
        let mut encoded = Vec::with_capacity(pixels.len());
        let mut undiffused_error = [0.0f32; 4];

        for y in 0..h {
            for x in 0..w {
                let value = working[x + y * w];
                let quantized = Pixel::from_channels(value.map(|c| c.round().clamp(0.0, 255.0) as u8));
                let code = codec.encode(quantized);
                encoded.push(code);

                let reconstructed = codec.decode(code).channels();
                let error: [f32; 4] = std::array::from_fn(|c| value[c] - reconstructed[c] as f32);
                let interior = x > 0 && x + 1 < w && y + 1 < h;

                for c in 0..4 {
                    if !(interior && enabled[c]) {
                        undiffused_error[c] += error[c];
                        continue;
                    }
                    for (dx, dy, weight) in WEIGHTS {
                        let nx = (x as isize + dx) as usize;
                        working[nx + (y + dy) * w][c] += error[c] * weight / 16.0;
                    }
                }
            }
        }

        DitherOutcome {
            encoded,
            undiffused_error,
        }
    }
}

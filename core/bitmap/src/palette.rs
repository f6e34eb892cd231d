//! Fixed 256-entry palette used by `P8_BUMP` bitmaps.
//!
//! Entries 0..=252 are unit normals spread over the upper hemisphere on a
//! golden-angle spiral, 253 is the flat normal, and 254/255 are the two fully
//! transparent entries (blue channel low/high).

use std::f64::consts::PI;
use std::sync::OnceLock;

use crate::pixel::Pixel;

/// Number of entries a pixel with visible alpha can map to.
const OPAQUE_ENTRIES: usize = 253;
const FLAT_NORMAL: usize = 253;
const TRANSPARENT_LOW: u8 = 0xFE;

/// Pixels below this alpha map onto one of the transparent entries.
const ALPHA_CUTOFF: u8 = 0x2F;

struct Palette {
    colors: [Pixel; 256],
    /// Nearest opaque entry for every (red, green) pair.
    lookup: Vec<u8>,
}

fn palette() -> &'static Palette {
    static PALETTE: OnceLock<Palette> = OnceLock::new();
    PALETTE.get_or_init(build_palette)
}

fn build_palette() -> Palette {
    let mut colors = [Pixel::default(); 256];
    let golden_angle = PI * (3.0 - 5.0f64.sqrt());
    let last = (OPAQUE_ENTRIES - 1) as f64;
    let to_channel = |v: f64| ((v + 1.0) / 2.0 * 255.0) as u8;

    for (k, color) in colors.iter_mut().enumerate().take(OPAQUE_ENTRIES) {
        let radius = (k as f64 / last).sqrt();
        let theta = k as f64 * golden_angle;
        let x = radius * theta.cos();
        let y = radius * theta.sin();
        let z = (1.0 - radius * radius).max(0.0).sqrt();
        *color = Pixel::new(to_channel(x), to_channel(y), to_channel(z), 0xFF);
    }
    colors[FLAT_NORMAL] = Pixel::new(127, 127, 255, 0xFF);
    colors[254] = Pixel::new(127, 127, 0, 0);
    colors[255] = Pixel::new(127, 127, 255, 0);

    let mut lookup = vec![0u8; 256 * 256];
    for red in 0..256i32 {
        for green in 0..256i32 {
            let mut best = 0usize;
            let mut best_distance = i32::MAX;
            for (index, color) in colors.iter().enumerate().take(OPAQUE_ENTRIES) {
                let dr = red - color.red as i32;
                let dg = green - color.green as i32;
                let distance = dr * dr + dg * dg;
                if distance < best_distance {
                    best = index;
                    best_distance = distance;
                }
            }
            lookup[(red as usize) << 8 | green as usize] = best as u8;
        }
    }

    Palette { colors, lookup }
}

pub fn color(index: u8) -> Pixel {
    palette().colors[index as usize]
}

/// Map a pixel to its palette index. Only red and green pick the normal; blue
/// is implied by the hemisphere.
pub fn nearest_index(pixel: Pixel) -> u8 {
    if pixel.alpha < ALPHA_CUTOFF {
        return TRANSPARENT_LOW + (pixel.blue >= 0x80) as u8;
    }
    palette().lookup[(pixel.red as usize) << 8 | pixel.green as usize]
}

use tracing::warn;

use crate::generated::GeneratedBitmapData;
use crate::pixel::Pixel;

pub const MAX_BUMP_HEIGHT: f32 = 0.5;

/// Turn grayscale height maps into tangent-space normal maps. Alpha is kept.
pub fn process_height_maps(data: &mut GeneratedBitmapData, bump_height: f32) {
    if bump_height <= 0.0 {
        warn!("No bump height given, so no bump map will be generated");
        return;
    }
    let bump_height = if bump_height > MAX_BUMP_HEIGHT {
        warn!("Bump height was capped to {}", MAX_BUMP_HEIGHT);
        MAX_BUMP_HEIGHT
    } else {
        bump_height
    };

    for bitmap in &mut data.bitmaps {
        for level in 0..bitmap.mipmaps.len() {
            let m = bitmap.mipmaps[level];
            for slice in bitmap.level_mut(level).chunks_exact_mut(m.width as usize * m.height as usize) {
                height_to_normals(slice, m.width, m.height, bump_height);
            }
        }
    }
}

/// Sobel filter over luminosity.
pub fn height_to_normals(pixels: &mut [Pixel], width: u32, height: u32, bump_height: f32) {
    let source: Vec<f32> = pixels
        .iter()
        .map(|p| p.luminosity() as f32 / 255.0)
        .collect();
    let (w, h) = (width as usize, height as usize);
    let scale = 1.5 / (width.min(height) as f32 / 256.0);
    let z = scale / (bump_height / 0.02);
    let at = |x: usize, y: usize| source[x + y * w];

    for y in 0..h {
        for x in 0..w {
            let down = y.saturating_sub(1);
            let up = (y + 1).min(h - 1);
            let right = x.saturating_sub(1);
            let left = (x + 1).min(w - 1);

            let (left_up, up_, right_up) = (at(left, up), at(x, up), at(right, up));
            let (left_, right_) = (at(left, y), at(right, y));
            let (left_down, down_, right_down) = (at(left, down), at(x, down), at(right, down));

            let nx = (right_up + 2.0 * right_ + right_down) - (left_up + 2.0 * left_ + left_down);
            let ny = (left_down + 2.0 * down_ + right_down) - (left_up + 2.0 * up_ + right_up);
            let length = (nx * nx + ny * ny + z * z).sqrt();
            let to_channel = |v: f32| ((v / length + 1.0) / 2.0 * 255.0) as u8;

            let p = &mut pixels[x + y * w];
            p.red = to_channel(nx);
            p.green = to_channel(ny);
            p.blue = to_channel(z);
        }
    }
}

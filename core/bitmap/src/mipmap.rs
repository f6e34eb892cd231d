//! Mipmap chains, plus the passes that fold faces and slices into the single
//! bitmap records cube maps and 3D textures are stored as.

use tracing::warn;

use crate::error::{BitmapError, Result};
use crate::generated::{Bitmap, GeneratedBitmapData, Mipmap, Sequence};
use crate::pixel::Pixel;
use crate::types::{BitmapType, BitmapUsage, MipmapScaleType};

/// Builds one mipmap level from its parent.
pub trait MipmapFilter {
    fn resample(
        &self,
        parent: &[Pixel],
        parent_width: u32,
        parent_height: u32,
        width: u32,
        height: u32,
    ) -> Vec<Pixel>;
}

/// 2x2 box filter. Each output texel combines the four parent texels it covers,
/// falling back to the top-left one along an axis that did not shrink.
#[derive(Debug, Clone, Copy)]
pub struct BoxFilter {
    pub scale: MipmapScaleType,
    pub usage: BitmapUsage,
}

impl MipmapFilter for BoxFilter {
    fn resample(
        &self,
        parent: &[Pixel],
        parent_width: u32,
        parent_height: u32,
        width: u32,
        height: u32,
    ) -> Vec<Pixel> {
        let pw = parent_width as usize;
        let shrink_x = width < parent_width;
        let shrink_y = height < parent_height;
        let mut out = Vec::with_capacity(width as usize * height as usize);

        for y in 0..height as usize {
            for x in 0..width as usize {
                let px = if shrink_x { x * 2 } else { x };
                let py = if shrink_y { y * 2 } else { y };
                let a = parent[py * pw + px];
                let b = if shrink_x { parent[py * pw + px + 1] } else { a };
                let c = if shrink_y { parent[(py + 1) * pw + px] } else { a };
                let d = match (shrink_x, shrink_y) {
                    (true, true) => parent[(py + 1) * pw + px + 1],
                    (true, false) => b,
                    (false, true) => c,
                    (false, false) => a,
                };
                out.push(self.combine(a, [a, b, c, d]));
            }
        }
        out
    }
}

impl BoxFilter {
    fn combine(&self, first: Pixel, samples: [Pixel; 4]) -> Pixel {
        if self.scale == MipmapScaleType::Nearest {
            return first;
        }

        // Fully transparent texels carry no color under alpha blending.
        let alpha_blend = self.usage == BitmapUsage::AlphaBlend;
        let used: Vec<Pixel> = samples
            .into_iter()
            .filter(|p| !alpha_blend || p.alpha != 0)
            .collect();
        if used.is_empty() {
            return Pixel::default();
        }

        let n = used.len() as u32;
        let average = |f: fn(&Pixel) -> u8| -> u8 {
            let sum: u32 = used.iter().map(|p| f(p) as u32).sum();
            ((sum + n / 2) / n) as u8
        };

        let alpha = if self.scale == MipmapScaleType::Linear && self.usage != BitmapUsage::VectorMap
        {
            average(|p| p.alpha)
        } else {
            first.alpha
        };
        Pixel {
            alpha,
            red: average(|p| p.red),
            green: average(|p| p.green),
            blue: average(|p| p.blue),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MipmapOptions {
    /// `None` means as many as the dimensions allow.
    pub max_count: Option<u32>,
    pub scale: MipmapScaleType,
    pub usage: BitmapUsage,
    pub fade_factor: Option<f32>,
    pub sharpen: Option<f32>,
    pub blur: Option<f32>,
    /// Sprite chains stop at `log2(spacing)` levels so padding survives every level.
    pub sprite_spacing: Option<u32>,
}

/// `min(requested, floor(log2(max(width, height))))`.
pub fn max_mipmap_count(width: u32, height: u32, requested: Option<u32>) -> u32 {
    let possible = width.max(height).max(1).ilog2();
    requested.map_or(possible, |r| r.min(possible))
}

/// Width and height of `level` for a base of `width` x `height`.
pub fn level_dimensions(width: u32, height: u32, level: u32) -> (u32, u32) {
    ((width >> level).max(1), (height >> level).max(1))
}

pub fn generate_mipmaps(data: &mut GeneratedBitmapData, options: &MipmapOptions) {
    let filter = BoxFilter {
        scale: options.scale,
        usage: options.usage,
    };
    let mut black_mipmaps = false;

    for bitmap in &mut data.bitmaps {
        let mut target = max_mipmap_count(bitmap.width, bitmap.height, options.max_count);
        if let Some(spacing) = options.sprite_spacing {
            target = target.min(if spacing == 0 { 0 } else { spacing.ilog2() });
        }
        let target = target as usize;

        let existing = bitmap.mipmap_count();
        if existing >= target {
            bitmap.truncate_mipmaps(target);
            continue;
        }

        if options.usage == BitmapUsage::AlphaBlend && bitmap.level(existing).iter().any(|p| p.alpha == 0) {
            black_mipmaps = true;
        }

        let last = bitmap.mipmaps[existing];
        if let Some(radius) = options.blur.filter(|&b| b > 0.0) {
            blur(bitmap.level_mut(existing), last.width, last.height, radius);
        }
        if let Some(amount) = options.sharpen.filter(|&s| s > 0.0) {
            let amount = amount / (2.0 * (existing as f32 + 1.0));
            sharpen(bitmap.level_mut(existing), last.width, last.height, amount);
        }

        while bitmap.mipmap_count() < target {
            let parent = bitmap.mipmaps[bitmap.mipmap_count()];
            let (width, height) = ((parent.width / 2).max(1), (parent.height / 2).max(1));
            let pixels = filter.resample(
                bitmap.level(bitmap.mipmap_count()),
                parent.width,
                parent.height,
                width,
                height,
            );
            bitmap.push_level(width, height, 1, pixels);

            if let Some(amount) = options.sharpen.filter(|&s| s > 0.0) {
                let count = bitmap.mipmap_count();
                let amount = amount / (2.0 * (count as f32 + 1.0));
                sharpen(bitmap.level_mut(count), width, height, amount);
            }
        }

        if options.usage == BitmapUsage::DetailMap {
            if let Some(fade) = options.fade_factor.filter(|&f| f > 0.0) {
                fade_to_gray(bitmap, fade);
            }
        }
    }

    if black_mipmaps {
        warn!("Usage is alpha blend, and a bitmap has zero alpha; its mipmaps will be black");
    }
}

/// Blend each mipmap toward 50% gray, more strongly at smaller levels.
pub fn fade_to_gray(bitmap: &mut Bitmap, fade: f32) {
    let count = bitmap.mipmap_count();
    let levels = (count + 1) as f32;
    let overall = levels - fade * ((levels - 1.0) + (1.0 - fade));

    for m in 0..count {
        let gray = ((m + 1) as f32 / overall).min(1.0);
        let alpha_delta = if fade >= 1.0 {
            0xFF
        } else {
            (255.0 * gray + 0.5).floor().clamp(0.0, 255.0) as u8
        };
        let overlay = Pixel::gray(0x7F, alpha_delta);
        for pixel in bitmap.level_mut(m + 1) {
            *pixel = pixel.alpha_blend(overlay);
        }
    }
}

/// Box blur of the color channels. The window is `2 * round(radius)` texels wide.
pub fn blur(pixels: &mut [Pixel], width: u32, height: u32, radius: f32) {
    let radius = radius.round() as i64;
    if radius <= 0 {
        return;
    }
    let source = pixels.to_vec();
    let (w, h) = (width as i64, height as i64);
    let size = radius * 2;
    let area = (size * size) as u32;

    for y in 0..h {
        for x in 0..w {
            let mut sum = [0u32; 3];
            for dy in 0..size {
                let sy = (y - radius + dy).clamp(0, h - 1);
                for dx in 0..size {
                    let sx = (x - radius + dx).clamp(0, w - 1);
                    let p = source[(sy * w + sx) as usize];
                    sum[0] += p.red as u32;
                    sum[1] += p.green as u32;
                    sum[2] += p.blue as u32;
                }
            }
            let p = &mut pixels[(y * w + x) as usize];
            p.red = (sum[0] / area) as u8;
            p.green = (sum[1] / area) as u8;
            p.blue = (sum[2] / area) as u8;
        }
    }
}

/// Unsharp mask on the color channels using the four direct neighbours.
pub fn sharpen(pixels: &mut [Pixel], width: u32, height: u32, amount: f32) {
    let source = pixels.to_vec();
    let (w, h) = (width as usize, height as usize);

    for y in 0..h {
        for x in 0..w {
            let center = source[y * w + x];
            let top = if y > 0 { source[(y - 1) * w + x] } else { center };
            let bottom = if y + 1 < h { source[(y + 1) * w + x] } else { center };
            let left = if x > 0 { source[y * w + x - 1] } else { center };
            let right = if x + 1 < w { source[y * w + x + 1] } else { center };

            let channel = |f: fn(&Pixel) -> u8| -> u8 {
                let neighbours = f(&top) as f32 + f(&bottom) as f32 + f(&left) as f32 + f(&right) as f32;
                let v = f(&center) as f32 * (1.0 + 4.0 * amount) - neighbours * amount;
                v.round().clamp(0.0, 255.0) as u8
            };

            let p = &mut pixels[y * w + x];
            p.red = channel(|p| p.red);
            p.green = channel(|p| p.green);
            p.blue = channel(|p| p.blue);
        }
    }
}

/// Fold each sequence of a cube map or 3D texture into one bitmap whose levels
/// store all faces (or slices) back to back.
pub fn consolidate_stacked_bitmaps(data: &mut GeneratedBitmapData) -> Result<()> {
    let cube_map = match data.bitmap_type {
        BitmapType::CubeMaps => true,
        BitmapType::ThreeDTextures => false,
        _ => return Ok(()),
    };

    let mut bitmaps = Vec::with_capacity(data.sequences.len());
    let mut sequences = Vec::with_capacity(data.sequences.len());

    for sequence in &data.sequences {
        let faces = sequence.bitmap_count;
        if faces == 0 {
            return Err(BitmapError::InvalidBitmap(
                "stacked bitmaps must have at least one bitmap".to_string(),
            ));
        }
        let group = &data.bitmaps[sequence.first_bitmap..sequence.first_bitmap + faces];
        let first = &group[0];

        if cube_map {
            if faces != 6 {
                return Err(BitmapError::InvalidBitmap(format!(
                    "cube maps must have six bitmaps per cube map, {} found",
                    faces
                )));
            }
            if first.width != first.height {
                return Err(BitmapError::InvalidBitmap(format!(
                    "cube map faces must be square, {}x{} found",
                    first.width, first.height
                )));
            }
        } else if !faces.is_power_of_two() {
            return Err(BitmapError::InvalidBitmap(format!(
                "3D texture depth must be a power of two, got {}",
                faces
            )));
        }

        for bitmap in group {
            if (bitmap.width, bitmap.height) != (first.width, first.height) {
                return Err(BitmapError::InvalidBitmap(format!(
                    "stacked bitmaps must be the same dimensions: expected {}x{}, {}x{} found",
                    first.width, first.height, bitmap.width, bitmap.height
                )));
            }
            if bitmap.mipmaps.len() != first.mipmaps.len() {
                return Err(BitmapError::InvalidBitmap(format!(
                    "stacked bitmaps must have the same number of mipmaps: expected {}, {} found",
                    first.mipmap_count(),
                    bitmap.mipmap_count()
                )));
            }
        }

        let mut pixels = Vec::with_capacity(group.iter().map(|b| b.pixels.len()).sum());
        let mut mipmaps = Vec::with_capacity(first.mipmaps.len());
        for (level, m) in first.mipmaps.iter().enumerate() {
            let first_pixel = pixels.len();
            for bitmap in group {
                pixels.extend_from_slice(bitmap.level(level));
            }
            mipmaps.push(Mipmap {
                first_pixel,
                pixel_count: pixels.len() - first_pixel,
                width: m.width,
                height: m.height,
                depth: if cube_map { 1 } else { faces as u32 },
            });
        }

        sequences.push(Sequence {
            y_start: sequence.y_start,
            y_end: sequence.y_end,
            first_bitmap: bitmaps.len(),
            bitmap_count: 1,
            sprites: Vec::new(),
        });
        bitmaps.push(Bitmap {
            width: first.width,
            height: first.height,
            depth: if cube_map { 1 } else { faces as u32 },
            faces: if cube_map { 6 } else { 1 },
            color_plate_x: first.color_plate_x,
            color_plate_y: first.color_plate_y,
            registration_point_x: 0,
            registration_point_y: 0,
            pixels,
            mipmaps,
        });
    }

    data.bitmaps = bitmaps;
    data.sequences = sequences;
    Ok(())
}

/// Halve the depth of each 3D texture mipmap by averaging neighbouring slices.
pub fn merge_3d_texture_mipmaps(data: &mut GeneratedBitmapData) {
    for bitmap in &mut data.bitmaps {
        let depth = bitmap.depth as usize;
        if depth <= 1 {
            continue;
        }

        let mut pixels = bitmap.level(0).to_vec();
        let mut mipmaps = vec![bitmap.mipmaps[0]];

        for level in 1..bitmap.mipmaps.len() {
            let m = bitmap.mipmaps[level];
            let source = bitmap.level(level);
            let slice = m.width as usize * m.height as usize;
            let merge = (1usize << level).min(depth);
            let new_depth = (depth >> level).max(1);

            let first_pixel = pixels.len();
            for d in 0..new_depth {
                for i in 0..slice {
                    let mut sum = [0u32; 4];
                    for s in d * merge..(d + 1) * merge {
                        for (acc, c) in sum.iter_mut().zip(source[s * slice + i].channels()) {
                            *acc += c as u32;
                        }
                    }
                    pixels.push(Pixel::from_channels(sum.map(|c| (c / merge as u32) as u8)));
                }
            }
            mipmaps.push(Mipmap {
                first_pixel,
                pixel_count: pixels.len() - first_pixel,
                width: m.width,
                height: m.height,
                depth: new_depth as u32,
            });
        }

        bitmap.pixels = pixels;
        bitmap.mipmaps = mipmaps;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid_bitmap(width: u32, height: u32, color: Pixel) -> Bitmap {
        Bitmap::new(width, height, vec![color; width as usize * height as usize])
    }

    fn data_with(bitmap_type: BitmapType, bitmaps: Vec<Bitmap>) -> GeneratedBitmapData {
        let count = bitmaps.len();
        GeneratedBitmapData {
            bitmap_type,
            bitmaps,
            sequences: vec![Sequence {
                bitmap_count: count,
                ..Default::default()
            }],
        }
    }

    #[test]
    fn test_mipmap_count_formula() {
        for (w, h) in [(1, 1), (2, 1), (16, 4), (3, 100), (256, 256), (1024, 8)] {
            for requested in [None, Some(0), Some(1), Some(3), Some(100)] {
                let mut data = data_with(
                    BitmapType::InterfaceBitmaps,
                    vec![solid_bitmap(w, h, Pixel::gray(0x40, 0xFF))],
                );
                let options = MipmapOptions {
                    max_count: requested,
                    ..Default::default()
                };
                generate_mipmaps(&mut data, &options);

                let bitmap = &data.bitmaps[0];
                let possible = w.max(h).ilog2();
                let expected = requested.map_or(possible, |r| r.min(possible));
                assert_eq!(bitmap.mipmap_count() as u32, expected, "{}x{} {:?}", w, h, requested);
                for (level, m) in bitmap.mipmaps.iter().enumerate() {
                    assert_eq!((m.width, m.height), level_dimensions(w, h, level as u32));
                    assert_eq!(m.pixel_count, m.width as usize * m.height as usize);
                }
                assert_eq!(bitmap.pixels.len(), bitmap.mipmaps.iter().map(|m| m.pixel_count).sum::<usize>());
            }
        }
    }

    #[test]
    fn test_linear_average() {
        let filter = BoxFilter {
            scale: MipmapScaleType::Linear,
            usage: BitmapUsage::Default,
        };
        let parent = [
            Pixel::new(0, 0, 0, 0),
            Pixel::new(100, 100, 100, 100),
            Pixel::new(200, 200, 200, 200),
            Pixel::new(100, 100, 100, 100),
        ];
        let out = filter.resample(&parent, 2, 2, 1, 1);
        assert_eq!(out, vec![Pixel::new(100, 100, 100, 100)]);

        let nearest_alpha = BoxFilter {
            scale: MipmapScaleType::NearestAlpha,
            usage: BitmapUsage::Default,
        };
        assert_eq!(nearest_alpha.resample(&parent, 2, 2, 1, 1)[0].alpha, 0);

        let alpha_blend = BoxFilter {
            scale: MipmapScaleType::Linear,
            usage: BitmapUsage::AlphaBlend,
        };
        let out = alpha_blend.resample(&parent, 2, 2, 1, 1);
        assert_eq!(out[0].red, 133, "transparent texels should not darken the average");
    }

    #[test]
    fn test_one_axis_shrink() {
        let filter = BoxFilter {
            scale: MipmapScaleType::Linear,
            usage: BitmapUsage::Default,
        };
        let parent = [Pixel::gray(0, 255), Pixel::gray(255, 255)];
        let out = filter.resample(&parent, 1, 2, 1, 1);
        assert_eq!(out, vec![Pixel::gray(128, 255)]);
    }

    #[test]
    fn test_sprite_spacing_limits_mipmaps() {
        let mut data = data_with(BitmapType::Sprites, vec![solid_bitmap(64, 64, Pixel::default())]);
        let options = MipmapOptions {
            sprite_spacing: Some(4),
            ..Default::default()
        };
        generate_mipmaps(&mut data, &options);
        assert_eq!(data.bitmaps[0].mipmap_count(), 2);
    }

    #[test]
    fn test_fade_to_gray() {
        let mut data = data_with(
            BitmapType::TwoDTextures,
            vec![solid_bitmap(8, 8, Pixel::new(255, 0, 0, 255))],
        );
        let options = MipmapOptions {
            usage: BitmapUsage::DetailMap,
            fade_factor: Some(1.0),
            ..Default::default()
        };
        generate_mipmaps(&mut data, &options);
        let bitmap = &data.bitmaps[0];
        assert_eq!(bitmap.level(0)[0], Pixel::new(255, 0, 0, 255), "base level is untouched");
        assert_eq!(bitmap.level(1)[0], Pixel::gray(0x7F, 255));
    }

    #[test]
    fn test_sharpen_flat_image_is_unchanged() {
        let mut pixels = vec![Pixel::gray(90, 255); 16];
        sharpen(&mut pixels, 4, 4, 0.5);
        assert!(pixels.iter().all(|&p| p == Pixel::gray(90, 255)));

        let mut pixels = vec![Pixel::gray(10, 255); 9];
        pixels[4] = Pixel::gray(50, 255);
        sharpen(&mut pixels, 3, 3, 0.25);
        assert_eq!(pixels[4].red, 90);
    }

    #[test]
    fn test_blur() {
        let mut pixels = vec![Pixel::gray(0, 255); 4];
        pixels[0] = Pixel::gray(200, 255);
        blur(&mut pixels, 2, 2, 1.0);
        assert_eq!(pixels[3].red, 50);
        assert_eq!(pixels[3].alpha, 255);
    }

    #[test]
    fn test_consolidate_cube_map() {
        let faces: Vec<Bitmap> = (0..6).map(|i| solid_bitmap(4, 4, Pixel::gray(i * 10, 255))).collect();
        let mut data = data_with(BitmapType::CubeMaps, faces);
        generate_mipmaps(&mut data, &MipmapOptions::default());
        consolidate_stacked_bitmaps(&mut data).unwrap();

        assert_eq!(data.bitmaps.len(), 1);
        let cube = &data.bitmaps[0];
        assert_eq!(cube.faces, 6);
        assert_eq!(cube.mipmap_count(), 2);
        assert_eq!(cube.mipmaps[1].pixel_count, 2 * 2 * 6);
        assert_eq!(cube.level(1)[4], Pixel::gray(10, 255), "second face follows the first");
        assert_eq!(data.sequences[0].bitmap_count, 1);
    }

    #[test]
    fn test_consolidate_rejects_bad_stacks() {
        let faces: Vec<Bitmap> = (0..5).map(|_| solid_bitmap(4, 4, Pixel::default())).collect();
        let mut data = data_with(BitmapType::CubeMaps, faces);
        assert!(consolidate_stacked_bitmaps(&mut data).is_err());

        let slices: Vec<Bitmap> = (0..3).map(|_| solid_bitmap(4, 4, Pixel::default())).collect();
        let mut data = data_with(BitmapType::ThreeDTextures, slices);
        assert!(consolidate_stacked_bitmaps(&mut data).is_err());
    }

    #[test]
    fn test_merge_3d() {
        let slices: Vec<Bitmap> = (0..4).map(|i| solid_bitmap(4, 4, Pixel::gray(i * 40, 255))).collect();
        let mut data = data_with(BitmapType::ThreeDTextures, slices);
        generate_mipmaps(&mut data, &MipmapOptions::default());
        consolidate_stacked_bitmaps(&mut data).unwrap();
        merge_3d_texture_mipmaps(&mut data);

        let volume = &data.bitmaps[0];
        assert_eq!(volume.depth, 4);
        assert_eq!(volume.mipmaps[1].depth, 2);
        assert_eq!(volume.mipmaps[2].depth, 1);
        assert_eq!(volume.level(1)[0], Pixel::gray(20, 255));
        assert_eq!(volume.level(1)[4], Pixel::gray(100, 255));
        assert_eq!(volume.level(2), &[Pixel::gray(60, 255)]);
    }
}

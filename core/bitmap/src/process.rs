use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

use crate::color_plate::ColorPlateCompression;
use crate::encoder::{encode_bitmap_data, BitmapDataEntry, EncodeOptions};
use crate::error::{BitmapError, Result};
use crate::generated::{Bitmap, GeneratedBitmapData};
use crate::height_map::process_height_maps;
use crate::mipmap::{
    consolidate_stacked_bitmaps, generate_mipmaps, merge_3d_texture_mipmaps, MipmapOptions,
};
use crate::pixel::Pixel;
use crate::scanner::{scan_color_plate, MarkerColors};
use crate::sprite::{process_sprites, SpriteParameters};
use crate::types::{BitmapFormat, BitmapType, BitmapUsage, DitherChannels, MipmapScaleType};

/// Sprite sheets keep at most this many mipmaps.
const MAX_SPRITE_MIPMAPS: u32 = 2;

/// Everything a compile needs besides the source pixels.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CompileOptions {
    pub bitmap_type: BitmapType,
    pub usage: BitmapUsage,
    pub format: BitmapFormat,
    /// `None` generates as many as the dimensions allow.
    pub max_mipmap_count: Option<u32>,
    pub mipmap_scale: MipmapScaleType,
    pub mipmap_fade_factor: Option<f32>,
    pub sharpen: Option<f32>,
    pub blur: Option<f32>,
    pub bump_height: f32,
    pub palettize: bool,
    pub dither: DitherChannels,
    pub sprite: SpriteParameters,
    pub markers: MarkerColors,
    pub color_plate_compression: ColorPlateCompression,
}

impl CompileOptions {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn encode_options(&self) -> EncodeOptions {
        EncodeOptions {
            format: self.format,
            usage: self.usage,
            palettize: self.palettize,
            dither: self.dither,
        }
    }
}

/// Sprite rectangle and registration point as fractions of its sheet.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GroupSprite {
    pub bitmap_index: usize,
    pub left: f32,
    pub right: f32,
    pub top: f32,
    pub bottom: f32,
    pub registration_point_x: f32,
    pub registration_point_y: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupSequence {
    pub first_bitmap_index: usize,
    pub bitmap_count: usize,
    pub sprites: Vec<GroupSprite>,
}

/// Everything one compile produces.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledBitmap {
    pub entries: Vec<BitmapDataEntry>,
    pub pixel_data: Vec<u8>,
    pub sequences: Vec<GroupSequence>,
}

fn crop_bounds(bitmap: &Bitmap) -> Option<(u32, u32, u32, u32)> {
    let (w, h) = (bitmap.width, bitmap.height);
    let visible = |x: u32, y: u32| bitmap.pixels[x as usize + y as usize * w as usize].alpha != 0;

    let left = (0..w).find(|&x| (0..h).any(|y| visible(x, y)))?;
    let top = (0..h).find(|&y| (0..w).any(|x| visible(x, y)))?;
    let right = (left..w).rev().find(|&x| (0..h).any(|y| visible(x, y)))? + 1;
    let bottom = (top..h).rev().find(|&y| (0..w).any(|x| visible(x, y)))? + 1;
    Some((left, top, right, bottom))
}

/// Trim fully transparent borders and drop fully transparent bitmaps.
fn crop_alpha_blend(data: &mut GeneratedBitmapData) -> Result<()> {
    let power_of_two = data.bitmap_type.requires_power_of_two();
    let mut removed = Vec::new();

    for (b, bitmap) in data.bitmaps.iter_mut().enumerate() {
        let Some((left, top, right, bottom)) = crop_bounds(bitmap) else {
            warn!("Bitmap #{} was deleted due to zero alpha (alpha blend usage)", b);
            removed.push(b);
            continue;
        };
        if (left, top, right, bottom) == (0, 0, bitmap.width, bitmap.height) {
            continue;
        }

        let (width, height) = (right - left, bottom - top);
        warn!(
            "Bitmap #{} was resized to {}x{} due to zero alpha on edge (alpha blend usage)",
            b, width, height
        );
        let mut pixels = Vec::with_capacity(width as usize * height as usize);
        for y in top..bottom {
            let row = left as usize + y as usize * bitmap.width as usize;
            pixels.extend_from_slice(&bitmap.pixels[row..row + width as usize]);
        }

        // Hand-made mipmaps no longer line up with the cropped image.
        let mut cropped = Bitmap::new(width, height, pixels);
        cropped.color_plate_x = bitmap.color_plate_x + left;
        cropped.color_plate_y = bitmap.color_plate_y + top;
        cropped.registration_point_x = bitmap.registration_point_x - left as i32;
        cropped.registration_point_y = bitmap.registration_point_y - top as i32;
        *bitmap = cropped;

        if power_of_two && !bitmap.is_power_of_two() {
            return Err(BitmapError::InvalidBitmap(format!(
                "bitmap #{} is {}x{} after cropping, but the bitmap type requires power-of-two dimensions",
                b, width, height
            )));
        }
    }

    if !removed.is_empty() {
        warn!(
            "{} bitmap(s) were deleted due to no alpha (usage is set to alpha blend)",
            removed.len()
        );
        // Highest index first so earlier indices stay valid.
        for &index in removed.iter().rev() {
            for sequence in &mut data.sequences {
                let end = sequence.first_bitmap + sequence.bitmap_count;
                if sequence.first_bitmap > index {
                    sequence.first_bitmap -= 1;
                } else if index < end {
                    sequence.bitmap_count -= 1;
                }
            }
            data.bitmaps.remove(index);
        }
    }
    Ok(())
}

/// Run every stage between scanning and encoding.
pub fn process_bitmap_data(data: &mut GeneratedBitmapData, options: &CompileOptions) -> Result<()> {
    let bitmap_type = data.bitmap_type;

    if options.usage == BitmapUsage::AlphaBlend {
        crop_alpha_blend(data)?;
    }
    if data.bitmaps.is_empty() {
        return Err(BitmapError::InvalidBitmap(
            "no bitmaps were found in the color plate".to_string(),
        ));
    }
    data.purge_empty_last_sequence();

    let mut max_count = options.max_mipmap_count;
    let mut sprite_spacing = None;
    if bitmap_type == BitmapType::Sprites {
        let mipmaps = max_count.map_or(MAX_SPRITE_MIPMAPS, |m| m.min(MAX_SPRITE_MIPMAPS));
        max_count = Some(mipmaps);
        options.sprite.validate()?;
        let spacing = options.sprite.effective_spacing(mipmaps);
        debug!(spacing, "packing sprites");
        process_sprites(data, &options.sprite, spacing)?;
        sprite_spacing = Some(spacing);
    }

    if options.usage == BitmapUsage::HeightMap {
        process_height_maps(data, options.bump_height);
    }

    if bitmap_type != BitmapType::InterfaceBitmaps && options.usage != BitmapUsage::LightMap {
        let mipmap_options = MipmapOptions {
            max_count,
            scale: options.mipmap_scale,
            usage: options.usage,
            fade_factor: options.mipmap_fade_factor,
            sharpen: options.sharpen,
            blur: options.blur,
            sprite_spacing,
        };
        generate_mipmaps(data, &mipmap_options);
    } else {
        for bitmap in &mut data.bitmaps {
            bitmap.truncate_mipmaps(0);
        }
    }

    if matches!(bitmap_type, BitmapType::CubeMaps | BitmapType::ThreeDTextures) {
        consolidate_stacked_bitmaps(data)?;
    }
    if bitmap_type == BitmapType::ThreeDTextures {
        merge_3d_texture_mipmaps(data);
    }
    Ok(())
}

/// Express sprite rectangles relative to the sheet they landed in.
pub fn group_sequences(data: &GeneratedBitmapData) -> Vec<GroupSequence> {
    data.sequences
        .iter()
        .map(|sequence| GroupSequence {
            first_bitmap_index: sequence.first_bitmap,
            bitmap_count: sequence.bitmap_count,
            sprites: sequence
                .sprites
                .iter()
                .filter_map(|sprite| {
                    let sheet = data.bitmaps.get(sprite.bitmap_index)?;
                    let (w, h) = (sheet.width as f32, sheet.height as f32);
                    Some(GroupSprite {
                        bitmap_index: sprite.bitmap_index,
                        left: sprite.left as f32 / w,
                        right: sprite.right as f32 / w,
                        top: sprite.top as f32 / h,
                        bottom: sprite.bottom as f32 / h,
                        registration_point_x: sprite.registration_point_x as f32 / w,
                        registration_point_y: sprite.registration_point_y as f32 / h,
                    })
                })
                .collect(),
        })
        .collect()
}

/// Scan, process and encode one source image.
pub fn compile_image(
    pixels: &[Pixel],
    width: u32,
    height: u32,
    options: &CompileOptions,
) -> Result<CompiledBitmap> {
    let mut data = scan_color_plate(pixels, width, height, options.bitmap_type, options.markers)?;
    debug!(
        bitmaps = data.bitmaps.len(),
        sequences = data.sequences.len(),
        "scanned color plate"
    );
    process_bitmap_data(&mut data, options)?;

    let encoded = encode_bitmap_data(&data, &options.encode_options())?;
    Ok(CompiledBitmap {
        entries: encoded.entries,
        pixel_data: encoded.pixel_data,
        sequences: group_sequences(&data),
    })
}

//! Final format selection and serialization of every bitmap's mip chain.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::codec::dxt::{self, BlockFormat, BLOCK_LENGTH};
use crate::codec::PixelCodec;
use crate::dither::Ditherer;
use crate::error::{BitmapError, Result};
use crate::generated::{Bitmap, GeneratedBitmapData};
use crate::pixel::Pixel;
use crate::types::{
    BitmapDataFlags, BitmapDataFormat, BitmapDataType, BitmapFormat, BitmapType, BitmapUsage,
    DitherChannels,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AlphaType {
    /// Every pixel is opaque.
    None,
    /// Alpha is only ever 0 or 255.
    OneBit,
    MultiBit,
}

pub fn classify_alpha(pixels: &[Pixel]) -> AlphaType {
    let mut alpha = AlphaType::None;
    for p in pixels {
        match p.alpha {
            0xFF => {}
            0 => alpha = AlphaType::OneBit,
            _ => return AlphaType::MultiBit,
        }
    }
    alpha
}

/// What a monochrome target can drop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonochromeTraits {
    pub alpha_equals_luminosity: bool,
    /// Some pixel whose alpha differs from its luminosity is not white.
    pub luminosity_set: bool,
    pub alpha: AlphaType,
}

pub fn classify_monochrome(pixels: &[Pixel]) -> MonochromeTraits {
    let mut traits = MonochromeTraits {
        alpha_equals_luminosity: true,
        luminosity_set: false,
        alpha: AlphaType::None,
    };
    for p in pixels {
        let luminosity = p.luminosity();
        if luminosity == p.alpha {
            continue;
        }
        traits.alpha_equals_luminosity = false;
        if luminosity != 0xFF {
            traits.luminosity_set = true;
        }
        if p.alpha != 0xFF {
            traits.alpha = AlphaType::MultiBit;
        }
    }
    traits
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EncodeOptions {
    pub format: BitmapFormat,
    pub usage: BitmapUsage,
    pub palettize: bool,
    pub dither: DitherChannels,
}

/// Pick the on-disk format for one bitmap.
pub fn resolve_format(bitmap: &Bitmap, options: &EncodeOptions) -> BitmapDataFormat {
    let mut format = options.format;
    if format.is_compressed() && (bitmap.width % 4 != 0 || bitmap.height % 4 != 0) {
        format = BitmapFormat::Color32Bit;
    }
    if options.usage == BitmapUsage::HeightMap && options.palettize {
        return BitmapDataFormat::P8Bump;
    }

    let alpha = || classify_alpha(&bitmap.pixels);
    match format {
        BitmapFormat::Color32Bit => match alpha() {
            AlphaType::None => BitmapDataFormat::X8R8G8B8,
            _ => BitmapDataFormat::A8R8G8B8,
        },
        BitmapFormat::Color16Bit => match alpha() {
            AlphaType::None => BitmapDataFormat::R5G6B5,
            AlphaType::OneBit => BitmapDataFormat::A1R5G5B5,
            AlphaType::MultiBit => BitmapDataFormat::A4R4G4B4,
        },
        BitmapFormat::Monochrome => {
            let traits = classify_monochrome(&bitmap.pixels);
            if traits.alpha_equals_luminosity {
                BitmapDataFormat::Ay8
            } else if traits.alpha == AlphaType::MultiBit {
                if traits.luminosity_set {
                    BitmapDataFormat::A8Y8
                } else {
                    BitmapDataFormat::A8
                }
            } else {
                BitmapDataFormat::Y8
            }
        }
        BitmapFormat::Dxt1 => BitmapDataFormat::Dxt1,
        BitmapFormat::Dxt3 => match alpha() {
            AlphaType::None => BitmapDataFormat::Dxt1,
            _ => BitmapDataFormat::Dxt3,
        },
        BitmapFormat::Dxt5 => match alpha() {
            AlphaType::None => BitmapDataFormat::Dxt1,
            _ => BitmapDataFormat::Dxt5,
        },
    }
}

/// One stored bitmap, as the tag records it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BitmapDataEntry {
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    #[serde(rename = "type")]
    pub bitmap_type: BitmapDataType,
    pub format: BitmapDataFormat,
    pub flags: BitmapDataFlags,
    /// Levels after the base image.
    pub mipmap_count: u32,
    pub pixel_data_offset: u32,
    pub pixel_data_size: u32,
    pub registration_point_x: i32,
    pub registration_point_y: i32,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct EncodedBitmapData {
    pub entries: Vec<BitmapDataEntry>,
    /// Every bitmap's encoded pixels back to back, in entry order.
    pub pixel_data: Vec<u8>,
}

pub fn data_type_for(bitmap_type: BitmapType) -> BitmapDataType {
    match bitmap_type {
        BitmapType::CubeMaps => BitmapDataType::CubeMap,
        BitmapType::ThreeDTextures => BitmapDataType::Texture3D,
        _ => BitmapDataType::Texture2D,
    }
}

fn offset(value: usize) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| BitmapError::Unsupported(format!("pixel data too large ({} bytes)", value)))
}

/// Encode each level of `bitmap` as `format`, appending to `out`. Returns the
/// number of levels after the base image that were written.
fn encode_levels(
    bitmap: &Bitmap,
    format: BitmapDataFormat,
    dither: DitherChannels,
    out: &mut Vec<u8>,
) -> Result<u32> {
    if let Some(block_format) = BlockFormat::from_data_format(format) {
        // Levels smaller than a block are not stored.
        let levels = bitmap
            .mipmaps
            .iter()
            .take_while(|m| m.width as usize >= BLOCK_LENGTH && m.height as usize >= BLOCK_LENGTH)
            .count();
        for (level, m) in bitmap.mipmaps.iter().take(levels).enumerate() {
            let slice = m.width as usize * m.height as usize;
            for face in bitmap.level(level).chunks_exact(slice) {
                out.extend(dxt::compress(face, m.width as usize, m.height as usize, block_format));
            }
        }
        return Ok(levels.saturating_sub(1) as u32);
    }

    let codec = PixelCodec::from_data_format(format)
        .ok_or_else(|| BitmapError::Internal(format!("no pixel codec for {}", format)))?;
    let ditherer = (dither.any() && codec.dithers()).then(|| Ditherer::new(dither));

    for (level, m) in bitmap.mipmaps.iter().enumerate() {
        let pixels = bitmap.level(level);
        match ditherer {
            Some(ditherer) => {
                let slice = m.width as usize * m.height as usize;
                for face in pixels.chunks_exact(slice) {
                    let outcome = ditherer.dither(face, m.width, m.height, codec);
                    for value in outcome.encoded {
                        codec.write(value, out);
                    }
                }
            }
            None => codec.encode_pixels(pixels, out),
        }
    }
    Ok(bitmap.mipmap_count() as u32)
}

/// Serialize every bitmap, choosing each one's format from `options` and its alpha.
pub fn encode_bitmap_data(
    data: &GeneratedBitmapData,
    options: &EncodeOptions,
) -> Result<EncodedBitmapData> {
    let mut encoded = EncodedBitmapData::default();
    let bitmap_type = data_type_for(data.bitmap_type);

    if options.dither.any() && options.format.is_compressed() {
        warn!("Dithering is ignored for block-compressed formats");
    }

    for (i, bitmap) in data.bitmaps.iter().enumerate() {
        let format = resolve_format(bitmap, options);
        let start = encoded.pixel_data.len();
        let mipmap_count = encode_levels(bitmap, format, options.dither, &mut encoded.pixel_data)?;
        let size = encoded.pixel_data.len() - start;

        let mut flags = BitmapDataFlags::default();
        if format.is_compressed() {
            flags.insert(BitmapDataFlags::COMPRESSED);
        }
        if data.bitmap_type == BitmapType::InterfaceBitmaps {
            flags.insert(BitmapDataFlags::LINEAR);
        }
        if bitmap.is_power_of_two() {
            flags.insert(BitmapDataFlags::POWER_OF_TWO_DIMENSIONS);
        }
        if format == BitmapDataFormat::P8Bump {
            flags.insert(BitmapDataFlags::PALETTIZED);
        }

        info!(
            "Bitmap #{}: {}x{}, {} mipmap{}, {} - {:.3} MiB",
            i,
            bitmap.width,
            bitmap.height,
            mipmap_count,
            if mipmap_count == 1 { "" } else { "s" },
            format.name(),
            size as f64 / 1024.0 / 1024.0
        );

        encoded.entries.push(BitmapDataEntry {
            width: bitmap.width,
            height: bitmap.height,
            depth: if bitmap_type == BitmapDataType::Texture3D { bitmap.depth } else { 1 },
            bitmap_type,
            format,
            flags,
            mipmap_count,
            pixel_data_offset: offset(start)?,
            pixel_data_size: offset(size)?,
            registration_point_x: bitmap.registration_point_x,
            registration_point_y: bitmap.registration_point_y,
        });
    }

    Ok(encoded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generated::Mipmap;

    fn solid(width: u32, height: u32, pixel: Pixel) -> Bitmap {
        Bitmap::new(width, height, vec![pixel; width as usize * height as usize])
    }

    fn single(bitmap_type: BitmapType, bitmap: Bitmap) -> GeneratedBitmapData {
        GeneratedBitmapData {
            bitmap_type,
            bitmaps: vec![bitmap],
            sequences: Vec::new(),
        }
    }

    fn options(format: BitmapFormat) -> EncodeOptions {
        EncodeOptions {
            format,
            ..Default::default()
        }
    }

    #[test]
    fn test_alpha_classification() {
        let mut pixels = vec![Pixel::gray(10, 255); 16];
        assert_eq!(classify_alpha(&pixels), AlphaType::None);

        pixels[3].alpha = 0;
        assert_eq!(classify_alpha(&pixels), AlphaType::OneBit);

        for a in [1, 128, 254] {
            let mut p = pixels.clone();
            p[9].alpha = a;
            assert_eq!(classify_alpha(&p), AlphaType::MultiBit);
        }
    }

    #[test]
    fn test_compressed_falls_back_on_unaligned() {
        let opaque = solid(6, 6, Pixel::new(1, 2, 3, 255));
        let translucent = solid(6, 6, Pixel::new(1, 2, 3, 100));
        for format in [BitmapFormat::Dxt1, BitmapFormat::Dxt3, BitmapFormat::Dxt5] {
            assert_eq!(resolve_format(&opaque, &options(format)), BitmapDataFormat::X8R8G8B8);
            assert_eq!(resolve_format(&translucent, &options(format)), BitmapDataFormat::A8R8G8B8);
        }
    }

    #[test]
    fn test_format_table() {
        let opaque = solid(4, 4, Pixel::new(9, 8, 7, 255));
        let mut one_bit = opaque.clone();
        one_bit.pixels[0].alpha = 0;
        let mut multi = opaque.clone();
        multi.pixels[0].alpha = 77;

        let check = |bitmap: &Bitmap, format, expected| {
            assert_eq!(resolve_format(bitmap, &options(format)), expected, "{:?}", format);
        };
        check(&opaque, BitmapFormat::Color16Bit, BitmapDataFormat::R5G6B5);
        check(&one_bit, BitmapFormat::Color16Bit, BitmapDataFormat::A1R5G5B5);
        check(&multi, BitmapFormat::Color16Bit, BitmapDataFormat::A4R4G4B4);
        check(&multi, BitmapFormat::Dxt1, BitmapDataFormat::Dxt1);
        check(&opaque, BitmapFormat::Dxt3, BitmapDataFormat::Dxt1);
        check(&one_bit, BitmapFormat::Dxt3, BitmapDataFormat::Dxt3);
        check(&opaque, BitmapFormat::Dxt5, BitmapDataFormat::Dxt1);
        check(&multi, BitmapFormat::Dxt5, BitmapDataFormat::Dxt5);
    }

    #[test]
    fn test_monochrome_selection() {
        let mono = |pixel| resolve_format(&solid(4, 4, pixel), &options(BitmapFormat::Monochrome));
        assert_eq!(mono(Pixel::gray(90, 90)), BitmapDataFormat::Ay8);
        assert_eq!(mono(Pixel::gray(90, 255)), BitmapDataFormat::Y8);
        assert_eq!(mono(Pixel::gray(255, 40)), BitmapDataFormat::A8);
        assert_eq!(mono(Pixel::gray(90, 40)), BitmapDataFormat::A8Y8);
    }

    #[test]
    fn test_palettized_height_map() {
        let data = single(BitmapType::TwoDTextures, solid(8, 8, Pixel::new(127, 127, 255, 255)));
        let options = EncodeOptions {
            format: BitmapFormat::Dxt5,
            usage: BitmapUsage::HeightMap,
            palettize: true,
            dither: DitherChannels::NONE,
        };
        let encoded = encode_bitmap_data(&data, &options).unwrap();
        let entry = encoded.entries[0];
        assert_eq!(entry.format, BitmapDataFormat::P8Bump);
        assert!(entry.flags.contains(BitmapDataFlags::PALETTIZED));
        assert!(!entry.flags.contains(BitmapDataFlags::COMPRESSED));
        assert_eq!(encoded.pixel_data.len(), 64);
    }

    #[test]
    fn test_dither_ignored_for_compressed() {
        let pixels = (0..64u32)
            .map(|i| Pixel::new((i * 4) as u8, (i * 3) as u8, 255 - i as u8, 128))
            .collect();
        let data = single(BitmapType::TwoDTextures, Bitmap::new(8, 8, pixels));

        let plain = encode_bitmap_data(&data, &options(BitmapFormat::Dxt5)).unwrap();
        let dithered = encode_bitmap_data(
            &data,
            &EncodeOptions {
                dither: "argb".parse().unwrap(),
                ..options(BitmapFormat::Dxt5)
            },
        )
        .unwrap();
        assert_eq!(dithered.entries, plain.entries);
        assert_eq!(dithered.pixel_data, plain.pixel_data);
    }

    #[test]
    fn test_flags() {
        let encoded = encode_bitmap_data(
            &single(BitmapType::InterfaceBitmaps, solid(12, 4, Pixel::default())),
            &options(BitmapFormat::Dxt1),
        )
        .unwrap();
        let flags = encoded.entries[0].flags;
        assert!(flags.contains(BitmapDataFlags::COMPRESSED));
        assert!(flags.contains(BitmapDataFlags::LINEAR));
        assert!(!flags.contains(BitmapDataFlags::POWER_OF_TWO_DIMENSIONS));
        assert_eq!(flags.0, BitmapDataFlags::COMPRESSED | BitmapDataFlags::LINEAR);

        let encoded = encode_bitmap_data(
            &single(BitmapType::TwoDTextures, solid(16, 2, Pixel::default())),
            &options(BitmapFormat::Color32Bit),
        )
        .unwrap();
        assert_eq!(
            encoded.entries[0].flags.0,
            BitmapDataFlags::POWER_OF_TWO_DIMENSIONS
        );
    }

    #[test]
    fn test_small_compressed_mipmaps_dropped() {
        let mut bitmap = solid(8, 8, Pixel::gray(50, 255));
        bitmap.push_level(4, 4, 1, vec![Pixel::gray(50, 255); 16]);
        bitmap.push_level(2, 2, 1, vec![Pixel::gray(50, 255); 4]);
        bitmap.push_level(1, 1, 1, vec![Pixel::gray(50, 255)]);

        let encoded = encode_bitmap_data(&single(BitmapType::TwoDTextures, bitmap), &options(BitmapFormat::Dxt1)).unwrap();
        let entry = encoded.entries[0];
        assert_eq!(entry.mipmap_count, 1);
        assert_eq!(encoded.pixel_data.len(), 4 * 8 + 8);
        assert_eq!(entry.pixel_data_size, 40);
    }

    #[test]
    fn test_entries_are_contiguous() {
        let data = GeneratedBitmapData {
            bitmap_type: BitmapType::TwoDTextures,
            bitmaps: vec![solid(4, 4, Pixel::default()), solid(2, 2, Pixel::default())],
            sequences: Vec::new(),
        };
        let encoded = encode_bitmap_data(&data, &options(BitmapFormat::Color16Bit)).unwrap();
        assert_eq!(encoded.entries[0].pixel_data_offset, 0);
        assert_eq!(encoded.entries[1].pixel_data_offset, 32);
        assert_eq!(encoded.pixel_data.len(), 40);
    }

    #[test]
    fn test_cube_map_faces() {
        let mut cube = solid(4, 4, Pixel::gray(200, 255));
        cube.pixels = vec![Pixel::gray(200, 255); 16 * 6];
        cube.faces = 6;
        cube.mipmaps = vec![Mipmap {
            first_pixel: 0,
            pixel_count: 96,
            width: 4,
            height: 4,
            depth: 1,
        }];
        let encoded = encode_bitmap_data(&single(BitmapType::CubeMaps, cube), &options(BitmapFormat::Dxt1)).unwrap();
        assert_eq!(encoded.entries[0].bitmap_type, BitmapDataType::CubeMap);
        assert_eq!(encoded.pixel_data.len(), 6 * 8);
    }

    #[test]
    fn test_dithered_16_bit_size() {
        let pixels: Vec<Pixel> = (0..64).map(|i| Pixel::gray(i as u8 * 3, 255)).collect();
        let options = EncodeOptions {
            format: BitmapFormat::Color16Bit,
            dither: "rgb".parse().unwrap(),
            ..Default::default()
        };
        let encoded = encode_bitmap_data(&single(BitmapType::TwoDTextures, Bitmap::new(8, 8, pixels)), &options).unwrap();
        assert_eq!(encoded.entries[0].format, BitmapDataFormat::R5G6B5);
        assert_eq!(encoded.pixel_data.len(), 128);
    }
}

//! Reading stored bitmap data back into pixels, for previews and conversion.

use image::{ImageBuffer, RgbaImage};

use crate::codec::dxt::{self, BlockFormat, BLOCK_LENGTH};
use crate::codec::PixelCodec;
use crate::encoder::{encode_bitmap_data, BitmapDataEntry, EncodeOptions};
use crate::error::{BitmapError, Result};
use crate::generated::{Bitmap, GeneratedBitmapData, Mipmap};
use crate::pixel::Pixel;
use crate::types::{BitmapDataFlags, BitmapDataFormat, BitmapDataType, BitmapType};

/// One face (cube maps) or slice (3D textures) of one mipmap level.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedImage {
    pub level: u32,
    pub layer: u32,
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<Pixel>,
}

/// Dimensions of `level`, including the number of stored faces or slices.
fn level_shape(width: u32, height: u32, depth: u32, level: u32, data_type: BitmapDataType) -> (u32, u32, u32) {
    let layers = match data_type {
        BitmapDataType::CubeMap => 6,
        BitmapDataType::Texture3D => (depth >> level).max(1),
        _ => 1,
    };
    ((width >> level).max(1), (height >> level).max(1), layers)
}

fn layer_size(width: u32, height: u32, format: BitmapDataFormat) -> Result<usize> {
    let bits = format
        .bits_per_pixel()
        .ok_or_else(|| BitmapError::Unsupported(format!("bitmap data format {}", u16::from(format))))?;
    let (w, h) = if format.is_compressed() {
        (
            (width as usize).next_multiple_of(BLOCK_LENGTH),
            (height as usize).next_multiple_of(BLOCK_LENGTH),
        )
    } else {
        (width as usize, height as usize)
    };
    Ok(w * h * bits / 8)
}

/// Bytes taken by a bitmap with `mipmap_count` levels after the base image.
/// Block-compressed levels are rounded up to whole blocks.
pub fn bitmap_data_size(
    width: u32,
    height: u32,
    depth: u32,
    mipmap_count: u32,
    format: BitmapDataFormat,
    data_type: BitmapDataType,
) -> Result<usize> {
    let mut size = 0;
    for level in 0..=mipmap_count {
        let (w, h, layers) = level_shape(width, height, depth, level, data_type);
        size += layer_size(w, h, format)? * layers as usize;
    }
    Ok(size)
}

fn decode_layer(data: &[u8], width: u32, height: u32, format: BitmapDataFormat) -> Result<Vec<Pixel>> {
    let count = width as usize * height as usize;
    if let Some(block_format) = BlockFormat::from_data_format(format) {
        let mut pixels = vec![Pixel::default(); count];
        dxt::decompress(data, width as usize, height as usize, block_format, &mut pixels)?;
        return Ok(pixels);
    }
    match PixelCodec::from_data_format(format) {
        Some(codec) => codec.decode_pixels(data, count),
        None => Err(BitmapError::Unsupported(format!(
            "bitmap data format {}",
            u16::from(format)
        ))),
    }
}

/// Decode every level and face of one entry. `pixel_data` is the whole buffer
/// the entry's offset points into.
pub fn decode_bitmap_data(entry: &BitmapDataEntry, pixel_data: &[u8]) -> Result<Vec<DecodedImage>> {
    let start = entry.pixel_data_offset as usize;
    let total = bitmap_data_size(
        entry.width,
        entry.height,
        entry.depth,
        entry.mipmap_count,
        entry.format,
        entry.bitmap_type,
    )?;
    let available = pixel_data.len().saturating_sub(start);
    if available < total {
        return Err(BitmapError::InsufficientData {
            what: "bitmap pixel data",
            expected: total,
            actual: available,
        });
    }

    let mut images = Vec::new();
    let mut cursor = start;
    for level in 0..=entry.mipmap_count {
        let (width, height, layers) =
            level_shape(entry.width, entry.height, entry.depth, level, entry.bitmap_type);
        let size = layer_size(width, height, entry.format)?;
        for layer in 0..layers {
            let pixels = decode_layer(&pixel_data[cursor..cursor + size], width, height, entry.format)?;
            cursor += size;
            images.push(DecodedImage {
                level,
                layer,
                width,
                height,
                pixels,
            });
        }
    }
    Ok(images)
}

pub fn to_rgba_image(width: u32, height: u32, pixels: &[Pixel]) -> Result<RgbaImage> {
    if pixels.len() < width as usize * height as usize {
        return Err(BitmapError::InsufficientData {
            what: "image pixels",
            expected: width as usize * height as usize,
            actual: pixels.len(),
        });
    }
    let mut img_buf = ImageBuffer::new(width, height);
    for (i, pixel) in img_buf.pixels_mut().enumerate() {
        *pixel = pixels[i].to_pixel();
    }
    Ok(img_buf)
}

pub fn from_rgba_image(image: &RgbaImage) -> Vec<Pixel> {
    image.pixels().map(|&p| Pixel::from_pixel(p)).collect()
}

/// Rebuild a [`Bitmap`] with its whole mip chain from stored data.
pub fn decode_to_bitmap(entry: &BitmapDataEntry, pixel_data: &[u8]) -> Result<Bitmap> {
    let images = decode_bitmap_data(entry, pixel_data)?;
    let mut bitmap = Bitmap::new(entry.width, entry.height, Vec::new());
    bitmap.mipmaps.clear();
    bitmap.faces = entry.bitmap_type.faces() as u32;
    bitmap.depth = entry.depth.max(1);
    bitmap.registration_point_x = entry.registration_point_x;
    bitmap.registration_point_y = entry.registration_point_y;

    for level in 0..=entry.mipmap_count {
        let first_pixel = bitmap.pixels.len();
        let mut shape = (0, 0, 0);
        for image in images.iter().filter(|i| i.level == level) {
            bitmap.pixels.extend_from_slice(&image.pixels);
            shape = (image.width, image.height, shape.2 + 1);
        }
        bitmap.mipmaps.push(Mipmap {
            first_pixel,
            pixel_count: bitmap.pixels.len() - first_pixel,
            width: shape.0,
            height: shape.1,
            depth: if entry.bitmap_type == BitmapDataType::Texture3D { shape.2 } else { 1 },
        });
    }
    Ok(bitmap)
}

/// Re-encode a stored bitmap with different options.
pub fn convert_bitmap(
    entry: &BitmapDataEntry,
    pixel_data: &[u8],
    options: &EncodeOptions,
) -> Result<(BitmapDataEntry, Vec<u8>)> {
    let bitmap_type = match entry.bitmap_type {
        BitmapDataType::CubeMap => BitmapType::CubeMaps,
        BitmapDataType::Texture3D => BitmapType::ThreeDTextures,
        _ if entry.flags.contains(BitmapDataFlags::LINEAR) => BitmapType::InterfaceBitmaps,
        _ => BitmapType::TwoDTextures,
    };
    let data = GeneratedBitmapData {
        bitmap_type,
        bitmaps: vec![decode_to_bitmap(entry, pixel_data)?],
        sequences: Vec::new(),
    };
    let encoded = encode_bitmap_data(&data, options)?;
    let converted = encoded
        .entries
        .first()
        .copied()
        .ok_or_else(|| BitmapError::Internal("conversion produced no bitmap".to_string()))?;
    Ok((converted, encoded.pixel_data))
}

/// Smallest uncompressed format that stores every pixel exactly.
pub fn most_efficient_format(pixels: &[Pixel]) -> BitmapDataFormat {
    const CANDIDATES: [BitmapDataFormat; 8] = [
        BitmapDataFormat::A8,
        BitmapDataFormat::Y8,
        BitmapDataFormat::Ay8,
        BitmapDataFormat::A8Y8,
        BitmapDataFormat::R5G6B5,
        BitmapDataFormat::A1R5G5B5,
        BitmapDataFormat::A4R4G4B4,
        BitmapDataFormat::X8R8G8B8,
    ];
    CANDIDATES
        .into_iter()
        .find(|&format| {
            PixelCodec::from_data_format(format)
                .is_some_and(|codec| pixels.iter().all(|&p| codec.decode(codec.encode(p)) == p))
        })
        .unwrap_or(BitmapDataFormat::A8R8G8B8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BitmapFormat;
    use image::Rgba;

    fn encode_one(bitmap: Bitmap, bitmap_type: BitmapType, format: BitmapFormat) -> (BitmapDataEntry, Vec<u8>) {
        let data = GeneratedBitmapData {
            bitmap_type,
            bitmaps: vec![bitmap],
            sequences: Vec::new(),
        };
        let options = EncodeOptions {
            format,
            ..Default::default()
        };
        let encoded = encode_bitmap_data(&data, &options).unwrap();
        (encoded.entries[0], encoded.pixel_data)
    }

    #[test]
    fn test_data_size() {
        let size = |w, h, d, m, f, t| bitmap_data_size(w, h, d, m, f, t).unwrap();
        assert_eq!(size(4, 4, 1, 0, BitmapDataFormat::A8R8G8B8, BitmapDataType::Texture2D), 64);
        assert_eq!(size(4, 4, 1, 2, BitmapDataFormat::A8R8G8B8, BitmapDataType::Texture2D), 84);
        assert_eq!(size(8, 8, 1, 1, BitmapDataFormat::Dxt1, BitmapDataType::Texture2D), 40);
        assert_eq!(size(2, 2, 1, 0, BitmapDataFormat::Dxt5, BitmapDataType::Texture2D), 16);
        assert_eq!(size(4, 4, 1, 0, BitmapDataFormat::R5G6B5, BitmapDataType::CubeMap), 192);
        assert_eq!(size(4, 4, 4, 1, BitmapDataFormat::Y8, BitmapDataType::Texture3D), 64 + 8);
        assert!(bitmap_data_size(4, 4, 1, 0, BitmapDataFormat::Unknown(99), BitmapDataType::Texture2D).is_err());
    }

    #[test]
    fn test_decode_32_bit_levels() {
        let mut bitmap = Bitmap::new(2, 2, vec![Pixel::new(1, 2, 3, 4); 4]);
        bitmap.push_level(1, 1, 1, vec![Pixel::new(9, 8, 7, 6)]);
        let (entry, data) = encode_one(bitmap, BitmapType::TwoDTextures, BitmapFormat::Color32Bit);

        let images = decode_bitmap_data(&entry, &data).unwrap();
        assert_eq!(images.len(), 2);
        assert_eq!(images[0].pixels, vec![Pixel::new(1, 2, 3, 4); 4]);
        assert_eq!((images[1].width, images[1].height), (1, 1));
        assert_eq!(images[1].pixels[0], Pixel::new(9, 8, 7, 6));
    }

    #[test]
    fn test_decode_dxt_solid() {
        let color = Pixel::new(0, 0xFF, 0, 0xFF);
        let bitmap = Bitmap::new(8, 4, vec![color; 32]);
        let (entry, data) = encode_one(bitmap, BitmapType::TwoDTextures, BitmapFormat::Dxt5);
        assert_eq!(entry.format, BitmapDataFormat::Dxt1);

        let images = decode_bitmap_data(&entry, &data).unwrap();
        assert!(images[0].pixels.iter().all(|&p| p == color));
    }

    #[test]
    fn test_truncated_data() {
        let (entry, data) = encode_one(
            Bitmap::new(4, 4, vec![Pixel::default(); 16]),
            BitmapType::TwoDTextures,
            BitmapFormat::Color32Bit,
        );
        let err = decode_bitmap_data(&entry, &data[..10]);
        assert!(matches!(err, Err(BitmapError::InsufficientData { .. })));
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn test_pixel_count_does_not_wrap() {
        let err = to_rgba_image(65536, 65536, &[Pixel::default()]);
        assert!(matches!(
            err,
            Err(BitmapError::InsufficientData { expected: 0x1_0000_0000, actual: 1, .. })
        ));
    }

    #[test]
    fn test_rgba_image() {
        let image = to_rgba_image(2, 1, &[Pixel::new(1, 2, 3, 4), Pixel::new(5, 6, 7, 8)]).unwrap();
        assert_eq!(image.get_pixel(1, 0), &Rgba([5, 6, 7, 8]));
        assert_eq!(from_rgba_image(&image)[0], Pixel::new(1, 2, 3, 4));
        assert!(to_rgba_image(2, 2, &[Pixel::default()]).is_err());
    }

    #[test]
    fn test_most_efficient_format() {
        assert_eq!(most_efficient_format(&[Pixel::gray(255, 30)]), BitmapDataFormat::A8);
        assert_eq!(most_efficient_format(&[Pixel::gray(30, 255)]), BitmapDataFormat::Y8);
        assert_eq!(most_efficient_format(&[Pixel::gray(30, 30)]), BitmapDataFormat::Ay8);
        assert_eq!(most_efficient_format(&[Pixel::gray(30, 90)]), BitmapDataFormat::A8Y8);
        assert_eq!(most_efficient_format(&[Pixel::new(0xFF, 0, 0, 0xFF)]), BitmapDataFormat::R5G6B5);
        assert_eq!(most_efficient_format(&[Pixel::new(1, 2, 3, 255)]), BitmapDataFormat::X8R8G8B8);
        assert_eq!(most_efficient_format(&[Pixel::new(1, 2, 3, 4)]), BitmapDataFormat::A8R8G8B8);
    }

    #[test]
    fn test_convert_to_16_bit() {
        let mut bitmap = Bitmap::new(4, 4, vec![Pixel::new(0xFF, 0, 0, 0xFF); 16]);
        bitmap.push_level(2, 2, 1, vec![Pixel::new(0xFF, 0, 0, 0xFF); 4]);
        let (entry, data) = encode_one(bitmap, BitmapType::TwoDTextures, BitmapFormat::Color32Bit);

        let options = EncodeOptions {
            format: BitmapFormat::Color16Bit,
            ..Default::default()
        };
        let (converted, pixels) = convert_bitmap(&entry, &data, &options).unwrap();
        assert_eq!(converted.format, BitmapDataFormat::R5G6B5);
        assert_eq!(converted.mipmap_count, 1);
        assert_eq!(pixels.len(), (16 + 4) * 2);

        let images = decode_bitmap_data(&converted, &pixels).unwrap();
        assert_eq!(images[1].pixels[0], Pixel::new(0xFF, 0, 0, 0xFF));
    }
}

pub mod dxt;

use byteorder::{ByteOrder, LE};

use crate::error::{BitmapError, Result};
use crate::pixel::Pixel;
use crate::types::BitmapDataFormat;

/// Per-pixel encoding of every uncompressed format.
///
/// Dithering and the plain encode path both quantize through [`PixelCodec::encode`]
/// and reconstruct through [`PixelCodec::decode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelCodec {
    A8,
    Y8,
    Ay8,
    A8Y8,
    R5G6B5,
    A1R5G5B5,
    A4R4G4B4,
    X8R8G8B8,
    A8R8G8B8,
    P8Bump,
}

impl PixelCodec {
    pub fn from_data_format(format: BitmapDataFormat) -> Option<Self> {
        match format {
            BitmapDataFormat::A8 => Some(PixelCodec::A8),
            BitmapDataFormat::Y8 => Some(PixelCodec::Y8),
            BitmapDataFormat::Ay8 => Some(PixelCodec::Ay8),
            BitmapDataFormat::A8Y8 => Some(PixelCodec::A8Y8),
            BitmapDataFormat::R5G6B5 => Some(PixelCodec::R5G6B5),
            BitmapDataFormat::A1R5G5B5 => Some(PixelCodec::A1R5G5B5),
            BitmapDataFormat::A4R4G4B4 => Some(PixelCodec::A4R4G4B4),
            BitmapDataFormat::X8R8G8B8 => Some(PixelCodec::X8R8G8B8),
            BitmapDataFormat::A8R8G8B8 => Some(PixelCodec::A8R8G8B8),
            BitmapDataFormat::P8Bump => Some(PixelCodec::P8Bump),
            _ => None,
        }
    }

    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelCodec::A8 | PixelCodec::Y8 | PixelCodec::Ay8 | PixelCodec::P8Bump => 1,
            PixelCodec::A8Y8 | PixelCodec::R5G6B5 | PixelCodec::A1R5G5B5 | PixelCodec::A4R4G4B4 => 2,
            PixelCodec::X8R8G8B8 | PixelCodec::A8R8G8B8 => 4,
        }
    }

    /// Whether error diffusion applies to this format.
    pub fn dithers(self) -> bool {
        matches!(
            self,
            PixelCodec::R5G6B5 | PixelCodec::A1R5G5B5 | PixelCodec::A4R4G4B4 | PixelCodec::P8Bump
        )
    }

    pub fn encode(self, pixel: Pixel) -> u32 {
        match self {
            PixelCodec::A8 | PixelCodec::Ay8 => pixel.alpha as u32,
            PixelCodec::Y8 => pixel.luminosity() as u32,
            PixelCodec::A8Y8 => pixel.to_a8y8() as u32,
            PixelCodec::R5G6B5 => pixel.to_16_bit(0, 5, 6, 5) as u32,
            PixelCodec::A1R5G5B5 => pixel.to_16_bit(1, 5, 5, 5) as u32,
            PixelCodec::A4R4G4B4 => pixel.to_16_bit(4, 4, 4, 4) as u32,
            PixelCodec::X8R8G8B8 => 0xFF00_0000 | argb(pixel),
            PixelCodec::A8R8G8B8 => argb(pixel),
            PixelCodec::P8Bump => pixel.to_p8() as u32,
        }
    }

    pub fn decode(self, value: u32) -> Pixel {
        match self {
            PixelCodec::A8 => Pixel::from_a8(value as u8),
            PixelCodec::Y8 => Pixel::from_y8(value as u8),
            PixelCodec::Ay8 => Pixel::from_ay8(value as u8),
            PixelCodec::A8Y8 => Pixel::from_a8y8(value as u16),
            PixelCodec::R5G6B5 => Pixel::from_16_bit(value as u16, 0, 5, 6, 5),
            PixelCodec::A1R5G5B5 => Pixel::from_16_bit(value as u16, 1, 5, 5, 5),
            PixelCodec::A4R4G4B4 => Pixel::from_16_bit(value as u16, 4, 4, 4, 4),
            PixelCodec::X8R8G8B8 => Pixel::from_channels((value | 0xFF00_0000).to_be_bytes()),
            PixelCodec::A8R8G8B8 => Pixel::from_channels(value.to_be_bytes()),
            PixelCodec::P8Bump => Pixel::from_p8(value as u8),
        }
    }

    /// Append an encoded value in its little-endian on-disk width.
    pub fn write(self, value: u32, out: &mut Vec<u8>) {
        match self.bytes_per_pixel() {
            1 => out.push(value as u8),
            2 => out.extend_from_slice(&(value as u16).to_le_bytes()),
            _ => out.extend_from_slice(&value.to_le_bytes()),
        }
    }

    pub fn read(self, bytes: &[u8]) -> u32 {
        match self.bytes_per_pixel() {
            1 => bytes[0] as u32,
            2 => LE::read_u16(bytes) as u32,
            _ => LE::read_u32(bytes),
        }
    }

    pub fn encode_pixels(self, pixels: &[Pixel], out: &mut Vec<u8>) {
        out.reserve(pixels.len() * self.bytes_per_pixel());
        for &pixel in pixels {
            self.write(self.encode(pixel), out);
        }
    }

    pub fn decode_pixels(self, data: &[u8], count: usize) -> Result<Vec<Pixel>> {
        let size = self.bytes_per_pixel();
        let expected = count * size;
        if data.len() < expected {
            return Err(BitmapError::InsufficientData {
                what: "pixel data",
                expected,
                actual: data.len(),
            });
        }
        Ok(data[..expected]
            .chunks_exact(size)
            .map(|chunk| self.decode(self.read(chunk)))
            .collect())
    }
}

fn argb(pixel: Pixel) -> u32 {
    u32::from_be_bytes(pixel.channels())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_32_bit_byte_order() {
        let mut out = Vec::new();
        PixelCodec::A8R8G8B8.encode_pixels(&[Pixel::new(0x11, 0x22, 0x33, 0x44)], &mut out);
        assert_eq!(out, vec![0x33, 0x22, 0x11, 0x44], "stored as B, G, R, A");

        let back = PixelCodec::A8R8G8B8.decode_pixels(&out, 1).unwrap();
        assert_eq!(back[0], Pixel::new(0x11, 0x22, 0x33, 0x44));

        let x8 = PixelCodec::X8R8G8B8.decode(0x0011_2233);
        assert_eq!(x8.alpha, 0xFF);
    }

    #[test]
    fn test_16_bit_little_endian() {
        let mut out = Vec::new();
        PixelCodec::R5G6B5.encode_pixels(&[Pixel::new(255, 0, 0, 255)], &mut out);
        assert_eq!(out, vec![0x00, 0xF8]);
    }

    #[test]
    fn test_short_buffer() {
        let err = PixelCodec::A8Y8.decode_pixels(&[0u8; 3], 2);
        assert!(matches!(err, Err(BitmapError::InsufficientData { expected: 4, .. })));
    }

    #[test]
    fn test_monochrome_formats() {
        let p = Pixel::new(0x40, 0x40, 0x40, 0x80);
        assert_eq!(PixelCodec::A8.encode(p), 0x80);
        assert_eq!(PixelCodec::Y8.encode(p), 0x40);
        assert_eq!(PixelCodec::A8Y8.encode(p), 0x8040);
        assert_eq!(PixelCodec::Ay8.decode(0x80), Pixel::gray(0x80, 0x80));
    }
}

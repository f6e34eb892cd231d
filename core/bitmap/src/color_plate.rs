//! Compressed copy of the source image kept alongside compiled bitmaps, so
//! they can be regenerated later without the original file.
//!
//! Layout: `[u32 BE decompressed size][payload]`. The decompressed bytes are
//! the pixels in the same B, G, R, A order as 32-bit bitmap data.

use byteorder::{BE, ReadBytesExt, WriteBytesExt};
use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};

use crate::codec::PixelCodec;
use crate::error::{BitmapError, Result};
use crate::pixel::Pixel;

const ZSTD_LEVEL: i32 = 19;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorPlateCompression {
    #[default]
    Deflate,
    Zstd,
}

impl std::str::FromStr for ColorPlateCompression {
    type Err = BitmapError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "deflate" | "zlib" => Ok(ColorPlateCompression::Deflate),
            "zstd" | "zstandard" => Ok(ColorPlateCompression::Zstd),
            other => Err(BitmapError::Unsupported(format!("color plate compression '{}'", other))),
        }
    }
}

pub fn encode_color_plate(pixels: &[Pixel], compression: ColorPlateCompression) -> Result<Vec<u8>> {
    let mut raw = Vec::with_capacity(pixels.len() * 4);
    PixelCodec::A8R8G8B8.encode_pixels(pixels, &mut raw);
    let size = u32::try_from(raw.len())
        .map_err(|_| BitmapError::Unsupported(format!("color plate too large ({} bytes)", raw.len())))?;

    let mut buf = Vec::new();
    buf.write_u32::<BE>(size)?;
    match compression {
        ColorPlateCompression::Deflate => {
            let mut encoder = ZlibEncoder::new(&mut buf, Compression::best());
            encoder.write_all(&raw)?;
            encoder.finish()?;
        }
        ColorPlateCompression::Zstd => buf.extend(zstd::bulk::compress(&raw, ZSTD_LEVEL)?),
    }
    Ok(buf)
}

/// Decompress a color plate of `width` x `height` pixels.
pub fn decode_color_plate(
    data: &[u8],
    width: u32,
    height: u32,
    compression: ColorPlateCompression,
) -> Result<Vec<Pixel>> {
    let mut cursor = std::io::Cursor::new(data);
    let size = cursor.read_u32::<BE>()? as usize;
    let expected = (width as usize) * (height as usize) * 4;
    if size != expected {
        return Err(BitmapError::ColorPlateSize {
            expected,
            actual: size,
        });
    }

    let payload = &data[4..];
    let raw = match compression {
        ColorPlateCompression::Deflate => {
            let mut decoder = ZlibDecoder::new(payload);
            let mut out = Vec::with_capacity(size);
            decoder.read_to_end(&mut out)?;
            out
        }
        ColorPlateCompression::Zstd => zstd::bulk::decompress(payload, size)?,
    };
    if raw.len() != size {
        return Err(BitmapError::ColorPlateSize {
            expected: size,
            actual: raw.len(),
        });
    }

    PixelCodec::A8R8G8B8.decode_pixels(&raw, size / 4)
}

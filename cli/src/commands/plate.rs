use anyhow::{Context, Result};
use bitmap::{
    ColorPlateCompression, decode_color_plate, encode_color_plate, from_rgba_image, to_rgba_image,
};
use clap::Subcommand;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use super::append_extension;

#[derive(Subcommand)]
pub enum PlateCommands {
    /// Compress an image into a color plate blob
    Pack {
        /// Input image
        input: PathBuf,
        /// Output blob (defaults to input + .plate)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Compression (deflate, zstd)
        #[arg(short, long, default_value = "deflate")]
        compression: ColorPlateCompression,
    },
    /// Restore a color plate blob into a PNG
    Unpack {
        /// Input blob, with its .json sidecar next to it
        input: PathBuf,
        /// Output PNG (defaults to input + .png)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// Dimensions and compression of a blob; the blob itself only records its byte size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlateInfo {
    pub width: u32,
    pub height: u32,
    pub compression: ColorPlateCompression,
}

fn sidecar(blob: &Path) -> PathBuf {
    append_extension(blob, "json")
}

/// Write a blob and the sidecar `unpack` reads back.
pub fn write_plate(path: &Path, blob: &[u8], info: &PlateInfo) -> Result<()> {
    fs::write(path, blob).with_context(|| format!("Failed to write {:?}", path))?;
    fs::write(sidecar(path), serde_json::to_string_pretty(info)?)?;
    Ok(())
}

pub fn handle(cmd: PlateCommands) -> Result<()> {
    match cmd {
        PlateCommands::Pack {
            input,
            output,
            compression,
        } => {
            let output = output.unwrap_or_else(|| input.with_extension("plate"));
            let info = pack(&input, &output, compression)?;
            println!(
                "Packed {}x{} color plate to {:?} ({:?})",
                info.width, info.height, output, info.compression
            );
        }
        PlateCommands::Unpack { input, output } => {
            let output = output.unwrap_or_else(|| input.with_extension("png"));
            unpack(&input, &output)?;
            println!("Unpacked color plate to {:?}", output);
        }
    }
    Ok(())
}

pub fn pack(input: &Path, output: &Path, compression: ColorPlateCompression) -> Result<PlateInfo> {
    let img = image::open(input)
        .with_context(|| format!("Failed to open image {:?}", input))?
        .to_rgba8();
    let blob = encode_color_plate(&from_rgba_image(&img), compression)?;

    let info = PlateInfo {
        width: img.width(),
        height: img.height(),
        compression,
    };
    write_plate(output, &blob, &info)?;
    Ok(info)
}

pub fn unpack(input: &Path, output: &Path) -> Result<()> {
    let info_path = sidecar(input);
    let info: PlateInfo = serde_json::from_str(
        &fs::read_to_string(&info_path)
            .with_context(|| format!("Missing color plate sidecar {:?}", info_path))?,
    )?;
    let blob = fs::read(input)?;

    let pixels = decode_color_plate(&blob, info.width, info.height, info.compression)?;
    to_rgba_image(info.width, info.height, &pixels)?.save(output)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn test_pack_unpack() -> Result<(), Box<dyn std::error::Error>> {
        let temp_dir = tempfile::tempdir()?;
        let input = temp_dir.path().join("plate.png");
        let mut img = RgbaImage::from_pixel(5, 3, Rgba([0, 0, 255, 255]));
        img.put_pixel(2, 1, Rgba([255, 255, 255, 64]));
        img.save(&input)?;

        for compression in [ColorPlateCompression::Deflate, ColorPlateCompression::Zstd] {
            let blob = temp_dir.path().join("plate.plate");
            let info = pack(&input, &blob, compression)?;
            assert_eq!((info.width, info.height), (5, 3));
            assert!(temp_dir.path().join("plate.plate.json").exists());

            let restored = temp_dir.path().join("restored.png");
            unpack(&blob, &restored)?;
            assert_eq!(image::open(&restored)?.to_rgba8(), img);
        }
        Ok(())
    }
}

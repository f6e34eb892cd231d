use anyhow::{Context, Result};
use bitmap::{BitmapDataType, decode_bitmap_data, to_rgba_image};
use clap::Args;
use std::fs;
use std::path::{Path, PathBuf};

use super::compile::CompileReport;

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Pixel data written by `compile` (.bitmap)
    pub data: PathBuf,
    /// Report written by `compile` (.json)
    pub json: PathBuf,
    /// Output directory (defaults to data name + _png)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

pub fn handle(args: DecodeArgs) -> Result<()> {
    let output = args.output.unwrap_or_else(|| {
        let stem = args.data.file_stem().unwrap_or_default().to_string_lossy();
        args.data.with_file_name(format!("{}_png", stem))
    });
    let written = decode_files(&args.data, &args.json, &output)?;
    println!("Decoded {} image(s) to {:?}", written.len(), output);
    Ok(())
}

/// Write one PNG per bitmap, mipmap level and face or slice.
pub fn decode_files(data_path: &Path, json_path: &Path, out_dir: &Path) -> Result<Vec<PathBuf>> {
    let report: CompileReport = serde_json::from_str(
        &fs::read_to_string(json_path).with_context(|| format!("Failed to read {:?}", json_path))?,
    )?;
    let data = fs::read(data_path).with_context(|| format!("Failed to read {:?}", data_path))?;
    fs::create_dir_all(out_dir)?;

    let mut written = Vec::new();
    for (index, entry) in report.entries.iter().enumerate() {
        let images = decode_bitmap_data(entry, &data)
            .with_context(|| format!("Failed to decode bitmap #{}", index))?;
        let layered = entry.bitmap_type != BitmapDataType::Texture2D;

        for image in images {
            let name = if layered {
                format!("bitmap_{}_mip{}_layer{}.png", index, image.level, image.layer)
            } else {
                format!("bitmap_{}_mip{}.png", index, image.level)
            };
            let path = out_dir.join(name);
            to_rgba_image(image.width, image.height, &image.pixels)?.save(&path)?;
            written.push(path);
        }
    }
    Ok(written)
}

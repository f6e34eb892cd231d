use anyhow::{Context, Result, bail};
use bitmap::{
    BitmapDataEntry, BitmapFormat, BitmapType, BitmapUsage, ColorPlateCompression, CompileOptions,
    DitherChannels, GroupSequence, MipmapScaleType, SpriteUsage, compile_image, encode_color_plate,
    from_rgba_image,
};
use clap::Args;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::error;
use walkdir::WalkDir;

use super::append_extension;
use super::plate::{PlateInfo, write_plate};

const IMAGE_EXTENSIONS: [&str; 5] = ["png", "tga", "tif", "tiff", "bmp"];

/// Compile flags. Anything given here overrides the `--options` file.
#[derive(Args, Debug, Clone, Default)]
pub struct OptionArgs {
    /// JSON file with compile options
    #[arg(long)]
    pub options: Option<PathBuf>,
    /// Bitmap type (2d, 3d, cubemaps, sprites, interface)
    #[arg(long = "type")]
    pub bitmap_type: Option<BitmapType>,
    /// Usage (default, alpha-blend, height-map, detail-map, light-map, vector-map)
    #[arg(long)]
    pub usage: Option<BitmapUsage>,
    /// Format (dxt1, dxt3, dxt5, 16-bit, 32-bit, monochrome)
    #[arg(short, long)]
    pub format: Option<BitmapFormat>,
    /// Maximum mipmap levels, 0 keeps only the base level
    #[arg(long)]
    pub mipmaps: Option<u32>,
    /// Mipmap scaling (linear, nearest-alpha, nearest)
    #[arg(long)]
    pub mipmap_scale: Option<MipmapScaleType>,
    /// Fade each mipmap level toward gray
    #[arg(long)]
    pub fade_factor: Option<f32>,
    #[arg(long)]
    pub sharpen: Option<f32>,
    #[arg(long)]
    pub blur: Option<f32>,
    /// Height scale for height-map usage
    #[arg(long)]
    pub bump_height: Option<f32>,
    #[arg(long)]
    pub palettize: bool,
    /// Dither channels (none, a, rgb, argb)
    #[arg(long)]
    pub dither: Option<DitherChannels>,
    /// Sprite usage (blend-add-subtract-max, multiply-min, double-multiply)
    #[arg(long)]
    pub sprite_usage: Option<SpriteUsage>,
    /// Sprite sheet edge length (power of two, 32 to 2048)
    #[arg(long)]
    pub sprite_budget: Option<u32>,
    /// Maximum number of sprite sheets, 0 for no limit
    #[arg(long)]
    pub sprite_budget_count: Option<u32>,
    #[arg(long)]
    pub sprite_spacing: Option<u32>,
    /// Color plate compression (deflate, zstd)
    #[arg(long)]
    pub plate_compression: Option<ColorPlateCompression>,
}

impl OptionArgs {
    pub fn resolve(&self) -> Result<CompileOptions> {
        let mut options = match &self.options {
            Some(path) => CompileOptions::from_json_file(path)
                .with_context(|| format!("Failed to load options from {:?}", path))?,
            None => CompileOptions::default(),
        };

        if let Some(v) = self.bitmap_type {
            options.bitmap_type = v;
        }
        if let Some(v) = self.usage {
            options.usage = v;
        }
        if let Some(v) = self.format {
            options.format = v;
        }
        if self.mipmaps.is_some() {
            options.max_mipmap_count = self.mipmaps;
        }
        if let Some(v) = self.mipmap_scale {
            options.mipmap_scale = v;
        }
        if self.fade_factor.is_some() {
            options.mipmap_fade_factor = self.fade_factor;
        }
        if self.sharpen.is_some() {
            options.sharpen = self.sharpen;
        }
        if self.blur.is_some() {
            options.blur = self.blur;
        }
        if let Some(v) = self.bump_height {
            options.bump_height = v;
        }
        if self.palettize {
            options.palettize = true;
        }
        if let Some(v) = self.dither {
            options.dither = v;
        }
        if let Some(v) = self.sprite_usage {
            options.sprite.usage = v;
        }
        if let Some(v) = self.sprite_budget {
            options.sprite.budget = v;
        }
        if let Some(v) = self.sprite_budget_count {
            options.sprite.budget_count = v;
        }
        if let Some(v) = self.sprite_spacing {
            options.sprite.spacing = v;
        }
        if let Some(v) = self.plate_compression {
            options.color_plate_compression = v;
        }
        Ok(options)
    }
}

#[derive(Args, Debug)]
pub struct CompileArgs {
    /// Input image (PNG, TGA, TIFF, BMP)
    pub input: PathBuf,
    /// Output path without extension (defaults to the input path)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
    #[command(flatten)]
    pub options: OptionArgs,
}

#[derive(Args, Debug)]
pub struct BatchArgs {
    /// Directory to search for images
    pub input: PathBuf,
    /// Output directory (defaults to next to each image)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
    #[command(flatten)]
    pub options: OptionArgs,
}

/// Color plate summary stored in the report. The blob itself is `<stem>.plate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColorPlateInfo {
    pub compression: ColorPlateCompression,
    pub compressed_size: usize,
}

/// Sidecar written next to the pixel data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompileReport {
    pub source: String,
    pub width: u32,
    pub height: u32,
    pub entries: Vec<BitmapDataEntry>,
    pub sequences: Vec<GroupSequence>,
    pub color_plate: ColorPlateInfo,
}

pub fn handle(args: CompileArgs) -> Result<()> {
    let options = args.options.resolve()?;
    let output = args
        .output
        .unwrap_or_else(|| args.input.with_extension(""));

    let report = compile_file(&args.input, &output, &options)?;
    println!(
        "Compiled {:?}: {} bitmap(s), {} sequence(s) -> {:?}",
        args.input,
        report.entries.len(),
        report.sequences.len(),
        append_extension(&output, "bitmap")
    );
    Ok(())
}

pub fn handle_batch(args: BatchArgs) -> Result<()> {
    let options = args.options.resolve()?;
    if !args.input.is_dir() {
        bail!("Input is not a directory: {:?}", args.input);
    }

    let tasks: Vec<PathBuf> = WalkDir::new(&args.input)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| is_image(p))
        .collect();

    println!("Found {} images to compile.", tasks.len());

    let failures: Vec<(PathBuf, anyhow::Error)> = tasks
        .par_iter()
        .filter_map(|path| {
            let stem = match &args.output {
                Some(out_dir) => {
                    let relative = path.strip_prefix(&args.input).unwrap_or(path);
                    out_dir.join(relative).with_extension("")
                }
                None => path.with_extension(""),
            };
            let result = match stem.parent() {
                Some(parent) => fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create directory {:?}", parent)),
                None => Ok(()),
            }
            .and_then(|_| compile_file(path, &stem, &options));
            result.err().map(|e| (path.clone(), e))
        })
        .collect();

    for (path, e) in &failures {
        error!("Failed to compile {:?}: {:#}", path, e);
    }
    println!(
        "Compiled {} of {} images.",
        tasks.len() - failures.len(),
        tasks.len()
    );
    if !failures.is_empty() {
        bail!("{} image(s) failed to compile", failures.len());
    }
    Ok(())
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Compile `input` into `<stem>.bitmap`, `<stem>.json` and the color plate
/// blob `<stem>.plate`, which `plate unpack` turns back into the source image.
pub fn compile_file(input: &Path, stem: &Path, options: &CompileOptions) -> Result<CompileReport> {
    let img = image::open(input)
        .with_context(|| format!("Failed to open image {:?}", input))?
        .to_rgba8();
    let pixels = from_rgba_image(&img);

    let compiled = compile_image(&pixels, img.width(), img.height(), options)
        .with_context(|| format!("Failed to compile {:?}", input))?;
    let plate = encode_color_plate(&pixels, options.color_plate_compression)?;
    let plate_info = PlateInfo {
        width: img.width(),
        height: img.height(),
        compression: options.color_plate_compression,
    };

    let report = CompileReport {
        source: input.to_string_lossy().into_owned(),
        width: img.width(),
        height: img.height(),
        entries: compiled.entries,
        sequences: compiled.sequences,
        color_plate: ColorPlateInfo {
            compression: options.color_plate_compression,
            compressed_size: plate.len(),
        },
    };

    fs::write(append_extension(stem, "bitmap"), &compiled.pixel_data)?;
    fs::write(
        append_extension(stem, "json"),
        serde_json::to_string_pretty(&report)?,
    )?;
    write_plate(&append_extension(stem, "plate"), &plate, &plate_info)?;
    Ok(report)
}

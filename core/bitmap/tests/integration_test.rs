use bitmap::{
    compile_image, decode_bitmap_data, decode_color_plate, encode_color_plate, from_rgba_image,
    scan_color_plate, to_rgba_image, BitmapDataFlags, BitmapDataFormat, BitmapFormat, BitmapType,
    ColorPlateCompression, CompileOptions, MarkerColors, Pixel, SpriteParameters,
};
use image::{Rgba, RgbaImage};
use std::fs;

const BLUE: Rgba<u8> = Rgba([0, 0, 255, 255]);
const MAGENTA: Rgba<u8> = Rgba([255, 0, 255, 255]);
const CYAN: Rgba<u8> = Rgba([0, 255, 255, 255]);

/// Color plate with a header, two sequences of 4x4 bitmaps.
fn color_plate() -> RgbaImage {
    let mut img = RgbaImage::from_pixel(16, 16, BLUE);
    img.put_pixel(1, 0, MAGENTA);
    img.put_pixel(2, 0, CYAN);
    for x in 0..16 {
        img.put_pixel(x, 1, MAGENTA);
        img.put_pixel(x, 8, MAGENTA);
    }
    let mut square = |x0: u32, y0: u32, color: Rgba<u8>| {
        for y in y0..y0 + 4 {
            for x in x0..x0 + 4 {
                img.put_pixel(x, y, color);
            }
        }
    };
    square(1, 3, Rgba([255, 0, 0, 255]));
    square(7, 3, Rgba([0, 255, 0, 255]));
    square(4, 10, Rgba([255, 255, 255, 128]));
    img
}

#[test]
fn test_compile_png_color_plate() -> Result<(), Box<dyn std::error::Error>> {
    let temp_dir = tempfile::tempdir()?;
    let img_path = temp_dir.path().join("plate.png");
    color_plate().save(&img_path)?;

    let img = image::open(&img_path)?.to_rgba8();
    let pixels = from_rgba_image(&img);
    let options = CompileOptions {
        format: BitmapFormat::Color32Bit,
        max_mipmap_count: Some(1),
        ..Default::default()
    };
    let compiled = compile_image(&pixels, img.width(), img.height(), &options)?;

    assert_eq!(compiled.entries.len(), 3);
    assert_eq!(compiled.sequences.len(), 2);
    assert_eq!(compiled.sequences[0].bitmap_count, 2);
    assert_eq!(compiled.sequences[1].first_bitmap_index, 2);

    let formats: Vec<BitmapDataFormat> = compiled.entries.iter().map(|e| e.format).collect();
    assert_eq!(
        formats,
        vec![
            BitmapDataFormat::X8R8G8B8,
            BitmapDataFormat::X8R8G8B8,
            BitmapDataFormat::A8R8G8B8
        ]
    );

    let data_path = temp_dir.path().join("plate.bitmap");
    fs::write(&data_path, &compiled.pixel_data)?;
    let data = fs::read(&data_path)?;

    let green = &compiled.entries[1];
    assert_eq!(green.mipmap_count, 1);
    assert!(green.flags.contains(BitmapDataFlags::POWER_OF_TWO_DIMENSIONS));
    let images = decode_bitmap_data(green, &data)?;
    assert_eq!(images.len(), 2);
    assert!(images[0].pixels.iter().all(|&p| p == Pixel::new(0, 255, 0, 255)));

    let preview = to_rgba_image(images[1].width, images[1].height, &images[1].pixels)?;
    let preview_path = temp_dir.path().join("green_mip1.png");
    preview.save(&preview_path)?;
    assert_eq!(image::open(&preview_path)?.to_rgba8().get_pixel(0, 0), &Rgba([0, 255, 0, 255]));
    Ok(())
}

#[test]
fn test_compile_dxt_and_16_bit() -> Result<(), Box<dyn std::error::Error>> {
    let pixels = from_rgba_image(&color_plate());
    for (format, expected) in [
        (BitmapFormat::Dxt5, BitmapDataFormat::Dxt5),
        (BitmapFormat::Color16Bit, BitmapDataFormat::A4R4G4B4),
    ] {
        let options = CompileOptions {
            format,
            dither: "argb".parse()?,
            ..Default::default()
        };
        let compiled = compile_image(&pixels, 16, 16, &options)?;
        let translucent = &compiled.entries[2];
        assert_eq!(translucent.format, expected);

        let images = decode_bitmap_data(translucent, &compiled.pixel_data)?;
        let alpha = images[0].pixels[5].alpha;
        assert!((alpha as i32 - 128).abs() <= 17, "{:?}: alpha {}", format, alpha);
    }
    Ok(())
}

#[test]
fn test_color_plate_blob_file() -> Result<(), Box<dyn std::error::Error>> {
    let temp_dir = tempfile::tempdir()?;
    let img = color_plate();
    let pixels = from_rgba_image(&img);

    for compression in [ColorPlateCompression::Deflate, ColorPlateCompression::Zstd] {
        let path = temp_dir.path().join(format!("plate_{:?}.bin", compression));
        fs::write(&path, encode_color_plate(&pixels, compression)?)?;

        let blob = fs::read(&path)?;
        let restored = decode_color_plate(&blob, img.width(), img.height(), compression)?;
        assert_eq!(restored, pixels);

        // regenerating from the blob gives the same bitmaps
        let from_blob = compile_image(&restored, 16, 16, &CompileOptions::default())?;
        let from_image = compile_image(&pixels, 16, 16, &CompileOptions::default())?;
        assert_eq!(from_blob.pixel_data, from_image.pixel_data);
    }
    Ok(())
}

#[test]
fn test_all_blue_plate_is_empty() -> Result<(), Box<dyn std::error::Error>> {
    let pixels = vec![Pixel::new(0, 0, 255, 255); 64 * 64];
    let data = scan_color_plate(&pixels, 64, 64, BitmapType::TwoDTextures, MarkerColors::default())?;
    assert!(data.bitmaps.is_empty());
    assert!(data.sequences.is_empty());
    Ok(())
}

#[test]
fn test_sprite_budget_exhaustion() -> Result<(), Box<dyn std::error::Error>> {
    // ten 64x64 sprites in a row, each with its own color
    let (w, h) = (10 * 66 + 2, 68);
    let mut img = RgbaImage::from_pixel(w, h, BLUE);
    for i in 0..10u32 {
        for y in 2..66 {
            for x in 0..64 {
                img.put_pixel(2 + i * 66 + x, y, Rgba([i as u8 * 20, 100, 50, 255]));
            }
        }
    }
    let pixels = from_rgba_image(&img);

    let limited = CompileOptions {
        bitmap_type: BitmapType::Sprites,
        sprite: SpriteParameters {
            budget: 64,
            budget_count: 1,
            ..Default::default()
        },
        ..Default::default()
    };
    assert!(compile_image(&pixels, w, h, &limited).is_err());

    let unlimited = CompileOptions {
        sprite: SpriteParameters {
            budget_count: 0,
            ..limited.sprite
        },
        ..limited.clone()
    };
    let compiled = compile_image(&pixels, w, h, &unlimited)?;
    assert!(compiled.entries.len() >= 10);
    assert!(compiled.entries.iter().all(|e| e.width <= 64 && e.height <= 64));
    Ok(())
}

use crate::pixel::Pixel;
use crate::types::BitmapType;

/// A window into the owning [`Bitmap`]'s pixel buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mipmap {
    pub first_pixel: usize,
    pub pixel_count: usize,
    pub width: u32,
    pub height: u32,
    pub depth: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Bitmap {
    pub width: u32,
    pub height: u32,
    /// Slices of a 3D texture, 1 otherwise.
    pub depth: u32,
    /// Faces stored per mipmap level: 6 for a consolidated cube map, 1 otherwise.
    pub faces: u32,
    pub color_plate_x: u32,
    pub color_plate_y: u32,
    pub registration_point_x: i32,
    pub registration_point_y: i32,
    pub pixels: Vec<Pixel>,
    /// Level 0 is the full-size image.
    pub mipmaps: Vec<Mipmap>,
}

impl Bitmap {
    /// A single-level 2D bitmap.
    pub fn new(width: u32, height: u32, pixels: Vec<Pixel>) -> Self {
        let pixel_count = pixels.len();
        Self {
            width,
            height,
            depth: 1,
            faces: 1,
            color_plate_x: 0,
            color_plate_y: 0,
            registration_point_x: 0,
            registration_point_y: 0,
            pixels,
            mipmaps: vec![Mipmap {
                first_pixel: 0,
                pixel_count,
                width,
                height,
                depth: 1,
            }],
        }
    }

    /// Number of levels after the base image.
    pub fn mipmap_count(&self) -> usize {
        self.mipmaps.len().saturating_sub(1)
    }

    pub fn level(&self, index: usize) -> &[Pixel] {
        let m = &self.mipmaps[index];
        &self.pixels[m.first_pixel..m.first_pixel + m.pixel_count]
    }

    pub fn level_mut(&mut self, index: usize) -> &mut [Pixel] {
        let m = self.mipmaps[index];
        &mut self.pixels[m.first_pixel..m.first_pixel + m.pixel_count]
    }

    /// Append a level after the current last one.
    pub fn push_level(&mut self, width: u32, height: u32, depth: u32, pixels: Vec<Pixel>) {
        self.mipmaps.push(Mipmap {
            first_pixel: self.pixels.len(),
            pixel_count: pixels.len(),
            width,
            height,
            depth,
        });
        self.pixels.extend(pixels);
    }

    /// Drop every level past `count` extra mipmaps.
    pub fn truncate_mipmaps(&mut self, count: usize) {
        if self.mipmaps.len() > count + 1 {
            self.mipmaps.truncate(count + 1);
            let end = self.mipmaps.last().map_or(0, |m| m.first_pixel + m.pixel_count);
            self.pixels.truncate(end);
        }
    }

    pub fn is_power_of_two(&self) -> bool {
        self.width.is_power_of_two() && self.height.is_power_of_two()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Sprite {
    /// Sheet the sprite was packed into.
    pub bitmap_index: usize,
    pub original_bitmap_index: usize,
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
    pub registration_point_x: i32,
    pub registration_point_y: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Sequence {
    pub y_start: u32,
    pub y_end: u32,
    pub first_bitmap: usize,
    pub bitmap_count: usize,
    pub sprites: Vec<Sprite>,
}

/// Scan, mipmap and pack result for one color plate.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GeneratedBitmapData {
    pub bitmap_type: BitmapType,
    pub bitmaps: Vec<Bitmap>,
    pub sequences: Vec<Sequence>,
}

impl GeneratedBitmapData {
    pub fn new(bitmap_type: BitmapType) -> Self {
        Self {
            bitmap_type,
            ..Default::default()
        }
    }

    /// Remove the last sequence if nothing landed in it.
    pub fn purge_empty_last_sequence(&mut self) {
        if self
            .sequences
            .last()
            .is_some_and(|s| s.bitmap_count == 0 && s.sprites.is_empty())
        {
            self.sequences.pop();
        }
    }
}

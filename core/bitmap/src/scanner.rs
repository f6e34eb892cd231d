//! Color plate decomposition.
//!
//! A color plate is an image whose first two rows form a header: pixel 0 is
//! the transparency color, pixel 1 the sequence divider, pixel 2 the spacing
//! color, the rest of row 0 is transparency and row 1 is all divider. Rows
//! filled with the divider color split the plate into sequences, and runs of
//! columns holding anything but background become bitmaps.
//!
//! Images without the header are read as a single bitmap, as an unrolled cube
//! map, or (when the first pixel is the transparency color) as bitmaps on a
//! blue background, each optionally followed by its own hand-made mipmaps.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{BitmapError, Result};
use crate::generated::{Bitmap, GeneratedBitmapData, Sequence};
use crate::pixel::Pixel;
use crate::types::BitmapType;

pub const TRANSPARENCY_COLOR: Pixel = Pixel::new(0, 0, 255, 255);
pub const SEQUENCE_DIVIDER_COLOR: Pixel = Pixel::new(255, 0, 255, 255);
pub const SPACING_COLOR: Pixel = Pixel::new(0, 255, 255, 255);

/// Reserved marker colors. A plate header overrides them for that plate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkerColors {
    pub transparency: Pixel,
    pub sequence_divider: Pixel,
    pub spacing: Option<Pixel>,
}

impl Default for MarkerColors {
    fn default() -> Self {
        Self {
            transparency: TRANSPARENCY_COLOR,
            sequence_divider: SEQUENCE_DIVIDER_COLOR,
            spacing: Some(SPACING_COLOR),
        }
    }
}

fn divide_by_two_round(value: u32) -> i32 {
    (value / 2 + (value & 1)) as i32
}

#[derive(Debug, Clone, Copy)]
struct Rect {
    x: u32,
    y: u32,
    width: u32,
    height: u32,
}

impl Rect {
    fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x && x < self.x + self.width && y >= self.y && y < self.y + self.height
    }
}

pub struct ColorPlateScanner<'a> {
    pixels: &'a [Pixel],
    width: u32,
    height: u32,
    bitmap_type: BitmapType,
    markers: MarkerColors,
    valid_color_plate: bool,
}

impl<'a> ColorPlateScanner<'a> {
    pub fn new(
        pixels: &'a [Pixel],
        width: u32,
        height: u32,
        bitmap_type: BitmapType,
        markers: MarkerColors,
    ) -> Result<Self> {
        let expected = width as usize * height as usize;
        if pixels.len() < expected {
            return Err(BitmapError::InsufficientData {
                what: "color plate",
                expected,
                actual: pixels.len(),
            });
        }
        Ok(Self {
            pixels,
            width,
            height,
            bitmap_type,
            markers,
            valid_color_plate: false,
        })
    }

    fn get(&self, x: u32, y: u32) -> Pixel {
        self.pixels[y as usize * self.width as usize + x as usize]
    }

    fn is_transparency(&self, p: Pixel) -> bool {
        p == self.markers.transparency
    }

    fn is_divider(&self, p: Pixel) -> bool {
        p == self.markers.sequence_divider
    }

    fn is_ignored(&self, p: Pixel) -> bool {
        self.is_transparency(p)
            || (self.valid_color_plate
                && (self.is_divider(p) || self.markers.spacing == Some(p)))
    }

    fn requires_power_of_two(&self) -> bool {
        self.bitmap_type.requires_power_of_two()
    }

    pub fn scan(mut self) -> Result<GeneratedBitmapData> {
        let mut data = GeneratedBitmapData::new(self.bitmap_type);
        if self.width == 0 || self.height == 0 {
            return Ok(data);
        }

        data.sequences = self.read_header();

        if self.valid_color_plate {
            self.read_color_plate(&mut data)?;
        } else if let Some(layout) = self.cube_layout() {
            self.read_unrolled_cube_map(&mut data, layout);
        } else if !self.is_transparency(self.get(0, 0)) {
            self.read_single_bitmap(&mut data)?;
        } else {
            self.read_non_color_plate(&mut data)?;
        }

        data.purge_empty_last_sequence();
        debug!(
            bitmaps = data.bitmaps.len(),
            sequences = data.sequences.len(),
            color_plate = self.valid_color_plate,
            "scanned color plate"
        );
        Ok(data)
    }

    /// Detect the header and split the plate into sequences.
    fn read_header(&mut self) -> Vec<Sequence> {
        let whole = vec![Sequence {
            y_start: 0,
            y_end: self.height,
            ..Default::default()
        }];
        if self.width < 4 || self.height < 2 {
            return whole;
        }

        let blue = self.get(0, 0);
        let magenta = self.get(1, 0);
        let cyan = self.get(2, 0);
        if blue == magenta || magenta == cyan {
            return whole;
        }
        if (3..self.width).any(|x| self.get(x, 0) != blue)
            || (0..self.width).any(|x| self.get(x, 1) != magenta)
        {
            return whole;
        }

        self.valid_color_plate = true;
        self.markers = MarkerColors {
            transparency: blue,
            sequence_divider: magenta,
            spacing: (cyan != blue).then_some(cyan),
        };

        let mut sequences = Vec::new();
        let mut start = 2;
        for y in 2..self.height {
            if (0..self.width).all(|x| self.get(x, y) == magenta) {
                sequences.push(Sequence {
                    y_start: start,
                    y_end: y,
                    ..Default::default()
                });
                start = y + 1;
            }
        }
        sequences.push(Sequence {
            y_start: start,
            y_end: self.height,
            ..Default::default()
        });
        sequences
    }

    fn read_color_plate(&self, data: &mut GeneratedBitmapData) -> Result<()> {
        for s in 0..data.sequences.len() {
            let (y_start, y_end) = (data.sequences[s].y_start, data.sequences[s].y_end);
            let first_bitmap = data.bitmaps.len();

            let mut open: Option<u32> = None;
            for x in 0..self.width {
                let has_content = (y_start..y_end).any(|y| {
                    let p = self.get(x, y);
                    !self.is_transparency(p) && !self.is_divider(p)
                });
                match (has_content, open) {
                    (true, None) => open = Some(x),
                    (false, Some(x_start)) => {
                        data.bitmaps.push(self.close_bitmap(x_start, x, y_start, y_end)?);
                        open = None;
                    }
                    _ => {}
                }
            }
            if let Some(x_start) = open {
                data.bitmaps.push(self.close_bitmap(x_start, self.width, y_start, y_end)?);
            }

            let sequence = &mut data.sequences[s];
            sequence.first_bitmap = first_bitmap;
            sequence.bitmap_count = data.bitmaps.len() - first_bitmap;
        }
        Ok(())
    }

    /// Crop a column range to its visible pixels. The registration point is the
    /// middle of the whole range, spacing columns included.
    fn close_bitmap(&self, x_start: u32, x_end: u32, y_start: u32, y_end: u32) -> Result<Bitmap> {
        let sprites = self.bitmap_type == BitmapType::Sprites;
        let mut bounds: Option<(u32, u32, u32, u32)> = None;
        for y in y_start..y_end {
            for x in x_start..x_end {
                let p = self.get(x, y);
                if self.is_ignored(p) || (sprites && p.alpha == 0) {
                    continue;
                }
                bounds = Some(match bounds {
                    None => (x, y, x, y),
                    Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
                });
            }
        }

        let Some((min_x, min_y, max_x, max_y)) = bounds else {
            return Err(BitmapError::InvalidBitmap(format!(
                "0x0 bitmap found at ({}, {})",
                x_start, y_start
            )));
        };
        let width = max_x - min_x + 1;
        let height = max_y - min_y + 1;
        if self.requires_power_of_two() && !(width.is_power_of_two() && height.is_power_of_two()) {
            return Err(BitmapError::InvalidBitmap(format!(
                "bitmap at ({}, {}) is {}x{}, which is not a power of two",
                min_x, min_y, width, height
            )));
        }

        let mut pixels = Vec::with_capacity(width as usize * height as usize);
        for y in min_y..=max_y {
            for x in min_x..=max_x {
                let p = self.get(x, y);
                pixels.push(if self.is_ignored(p) { Pixel::default() } else { p });
            }
        }

        let mut bitmap = Bitmap::new(width, height, pixels);
        bitmap.color_plate_x = min_x;
        bitmap.color_plate_y = min_y;
        bitmap.registration_point_x = divide_by_two_round(x_end + x_start) - min_x as i32;
        bitmap.registration_point_y = divide_by_two_round(y_start + y_end) - min_y as i32;
        Ok(bitmap)
    }

    fn cube_layout(&self) -> Option<CubeLayout> {
        if self.bitmap_type != BitmapType::CubeMaps {
            return None;
        }
        let (w, h) = (self.width, self.height);
        if w % 4 == 0 && w / 4 * 3 == h && (w / 4).is_power_of_two() {
            Some(CubeLayout::Cross(w / 4))
        } else if h * 6 == w && h.is_power_of_two() {
            Some(CubeLayout::Strip(h))
        } else {
            None
        }
    }

    fn read_unrolled_cube_map(&self, data: &mut GeneratedBitmapData, layout: CubeLayout) {
        let face_width = layout.face_width();
        for (left, top, rotation) in layout.faces() {
            let mut pixels = Vec::with_capacity(face_width as usize * face_width as usize);
            for ry in 0..face_width {
                for rx in 0..face_width {
                    let (x, y) = match rotation {
                        90 => (left + face_width - ry - 1, top + rx),
                        180 => (left + face_width - rx - 1, top + face_width - ry - 1),
                        270 => (left + ry, top + face_width - rx - 1),
                        _ => (left + rx, top + ry),
                    };
                    pixels.push(self.get(x, y));
                }
            }
            let mut bitmap = Bitmap::new(face_width, face_width, pixels);
            bitmap.color_plate_x = left;
            bitmap.color_plate_y = top;
            bitmap.registration_point_x = divide_by_two_round(face_width);
            bitmap.registration_point_y = divide_by_two_round(face_width);
            data.bitmaps.push(bitmap);
        }

        let sequence = &mut data.sequences[0];
        sequence.first_bitmap = 0;
        sequence.bitmap_count = data.bitmaps.len();
    }

    fn read_single_bitmap(&self, data: &mut GeneratedBitmapData) -> Result<()> {
        let (width, height) = (self.width, self.height);
        if self.requires_power_of_two() && !(width.is_power_of_two() && height.is_power_of_two()) {
            return Err(BitmapError::InvalidBitmap(format!(
                "{}x{} is not a power of two",
                width, height
            )));
        }

        let pixels = self.pixels[..width as usize * height as usize].to_vec();
        let mut bitmap = Bitmap::new(width, height, pixels);
        bitmap.registration_point_x = divide_by_two_round(width);
        bitmap.registration_point_y = divide_by_two_round(height);
        data.bitmaps.push(bitmap);

        let sequence = &mut data.sequences[0];
        sequence.first_bitmap = 0;
        sequence.bitmap_count = 1;
        Ok(())
    }

    fn read_non_color_plate(&self, data: &mut GeneratedBitmapData) -> Result<()> {
        let mut taken: Vec<Rect> = Vec::new();
        for y in 0..self.height {
            let mut x = 0;
            while x < self.width {
                if self.is_ignored(self.get(x, y)) {
                    x += 1;
                    continue;
                }
                if let Some(r) = taken.iter().find(|r| r.contains(x, y)) {
                    x = r.x + r.width;
                    continue;
                }

                let levels = self.read_region(x, y)?;
                let base = levels[0];
                let mut bitmap = Bitmap::new(base.width, base.height, self.copy_rect(base));
                for level in &levels[1..] {
                    bitmap.push_level(level.width, level.height, 1, self.copy_rect(*level));
                }
                bitmap.color_plate_x = base.x;
                bitmap.color_plate_y = base.y;
                bitmap.registration_point_x = divide_by_two_round(base.width);
                bitmap.registration_point_y = divide_by_two_round(base.height);
                data.bitmaps.push(bitmap);

                taken.extend(levels);
                x += base.width;
            }
        }

        let sequence = &mut data.sequences[0];
        sequence.first_bitmap = 0;
        sequence.bitmap_count = data.bitmaps.len();
        Ok(())
    }

    /// Measure a bitmap starting at (x, y) plus any mipmaps drawn right below it.
    fn read_region(&self, x: u32, y: u32) -> Result<Vec<Rect>> {
        let mut levels: Vec<Rect> = Vec::new();
        let mut top = y;

        loop {
            let mut x2 = x;
            while x2 < self.width && !self.is_ignored(self.get(x2, top)) {
                x2 += 1;
            }
            let mut y2 = top;
            while y2 < self.height && !self.is_ignored(self.get(x2 - 1, y2)) {
                y2 += 1;
            }
            let width = x2 - x;
            let height = y2 - top;

            match levels.last() {
                Some(parent) => {
                    let expected = ((parent.width / 2).max(1), (parent.height / 2).max(1));
                    if (width, height) != expected {
                        return Err(BitmapError::InvalidBitmap(format!(
                            "mipmap at ({}, {}) is {}x{}, expected {}x{}",
                            x, top, width, height, expected.0, expected.1
                        )));
                    }
                }
                None => {
                    if self.requires_power_of_two()
                        && !(width.is_power_of_two() && height.is_power_of_two())
                    {
                        return Err(BitmapError::InvalidBitmap(format!(
                            "bitmap at ({}, {}) is {}x{}, which is not a power of two",
                            x, top, width, height
                        )));
                    }
                }
            }

            if x2 < self.width && (top..y2).any(|yy| !self.is_ignored(self.get(x2, yy))) {
                return Err(BitmapError::InvalidBitmap(format!(
                    "bitmap at ({}, {}) is too close to another bitmap on its right",
                    x, top
                )));
            }

            levels.push(Rect {
                x,
                y: top,
                width,
                height,
            });

            if y2 >= self.height {
                break;
            }
            let has_mipmap = self.requires_power_of_two()
                && width > 1
                && height > 1
                && !self.is_ignored(self.get(x, y2));
            let check_from = if has_mipmap { x + width / 2 } else { x };
            if (check_from..x2).any(|xx| !self.is_ignored(self.get(xx, y2))) {
                return Err(BitmapError::InvalidBitmap(format!(
                    "bitmap at ({}, {}) is too close to another bitmap below it",
                    x, top
                )));
            }
            if !has_mipmap {
                break;
            }
            top = y2;
        }

        Ok(levels)
    }

    fn copy_rect(&self, rect: Rect) -> Vec<Pixel> {
        let mut pixels = Vec::with_capacity(rect.width as usize * rect.height as usize);
        for y in rect.y..rect.y + rect.height {
            for x in rect.x..rect.x + rect.width {
                pixels.push(self.get(x, y));
            }
        }
        pixels
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CubeLayout {
    /// 4:3 cross.
    Cross(u32),
    /// Six faces left to right.
    Strip(u32),
}

impl CubeLayout {
    fn face_width(self) -> u32 {
        match self {
            CubeLayout::Cross(w) | CubeLayout::Strip(w) => w,
        }
    }

    /// (left, top, clockwise rotation) of each face in storage order.
    fn faces(self) -> [(u32, u32, u32); 6] {
        match self {
            CubeLayout::Cross(f) => [
                (0, f, 90),
                (f, f, 180),
                (2 * f, f, 270),
                (3 * f, f, 0),
                (0, 0, 90),
                (0, 2 * f, 90),
            ],
            CubeLayout::Strip(f) => [
                (0, 0, 0),
                (f, 0, 0),
                (2 * f, 0, 0),
                (3 * f, 0, 0),
                (4 * f, 0, 0),
                (5 * f, 0, 0),
            ],
        }
    }
}

/// Decompose a flat pixel buffer into bitmaps and sequences.
pub fn scan_color_plate(
    pixels: &[Pixel],
    width: u32,
    height: u32,
    bitmap_type: BitmapType,
    markers: MarkerColors,
) -> Result<GeneratedBitmapData> {
    ColorPlateScanner::new(pixels, width, height, bitmap_type, markers)?.scan()
}

//! Sprite sheet packing.
//!
//! Every sprite is placed with `spacing` pixels of padding around it, scanning
//! candidate positions in either row or column order. Sprites of one sequence
//! are kept on one sheet when possible.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{BitmapError, Result};
use crate::generated::{Bitmap, GeneratedBitmapData, Sprite};
use crate::pixel::Pixel;
use crate::types::SpriteUsage;

/// Largest budget the legacy tag format can record.
const MAX_STORED_BUDGET: u32 = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpriteParameters {
    pub usage: SpriteUsage,
    /// Maximum sheet edge length.
    pub budget: u32,
    /// Maximum number of sheets, 0 for no limit.
    pub budget_count: u32,
    /// Padding between sprites and around sheet edges. 0 derives it from the mipmap count.
    pub spacing: u32,
}

impl Default for SpriteParameters {
    fn default() -> Self {
        Self {
            usage: SpriteUsage::default(),
            budget: 512,
            budget_count: 0,
            spacing: 0,
        }
    }
}

impl SpriteParameters {
    pub fn validate(&self) -> Result<()> {
        if !(32..=2048).contains(&self.budget) || !self.budget.is_power_of_two() {
            return Err(BitmapError::InvalidSpriteBudget(self.budget));
        }
        if self.budget > MAX_STORED_BUDGET {
            warn!(
                "Sprite budget {} cannot be stored in the tag and will not persist",
                self.budget
            );
        }
        Ok(())
    }

    /// Spacing actually used for a chain of `mipmaps` extra levels.
    pub fn effective_spacing(&self, mipmaps: u32) -> u32 {
        if self.spacing > 0 {
            self.spacing
        } else {
            1 << mipmaps
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct SheetSprite {
    x: u32,
    y: u32,
    width: u32,
    height: u32,
    spacing: u32,
    sequence: usize,
    sprite: usize,
}

impl SheetSprite {
    /// Whether a `width` x `height` rectangle at (x, y) touches this sprite or its padding.
    fn overlaps(&self, x: u32, y: u32, width: u32, height: u32) -> bool {
        x < self.x + self.width + self.spacing
            && x + width > self.x.saturating_sub(self.spacing)
            && y < self.y + self.height + self.spacing
            && y + height > self.y.saturating_sub(self.spacing)
    }
}

#[derive(Debug, Clone, Default)]
struct SpriteSheet {
    sprites: Vec<SheetSprite>,
}

impl SpriteSheet {
    fn place(&mut self, sprite: &SheetSprite, ordered_x: bool, max_length: u32) -> bool {
        let spacing = sprite.spacing;
        let (along_a, along_b) = if ordered_x {
            (sprite.width, sprite.height)
        } else {
            (sprite.height, sprite.width)
        };

        let mut a = spacing;
        while a + along_a + spacing <= max_length {
            let mut b = spacing;
            while b + along_b + spacing <= max_length {
                let (x, y) = if ordered_x { (a, b) } else { (b, a) };
                match self
                    .sprites
                    .iter()
                    .find(|s| s.overlaps(x, y, sprite.width, sprite.height))
                {
                    None => {
                        self.sprites.push(SheetSprite { x, y, ..*sprite });
                        return true;
                    }
                    // skip past whatever is in the way
                    Some(other) if ordered_x => b = other.y + other.height + other.spacing,
                    Some(other) => b = other.x + other.width + other.spacing,
                }
            }
            a += 1;
        }
        false
    }

    /// Power-of-two edge length that holds every sprite and its padding.
    fn length(&self) -> u32 {
        let extent = self
            .sprites
            .iter()
            .map(|s| (s.x + s.spacing + s.width).max(s.y + s.spacing + s.height))
            .max()
            .unwrap_or(0);
        if extent == 0 { 0 } else { extent.next_power_of_two() }
    }

    fn pixel_count(&self) -> u64 {
        let length = self.length() as u64;
        length * length
    }

    fn bake(&self, data: &GeneratedBitmapData, usage: SpriteUsage) -> (u32, Vec<Pixel>) {
        let length = self.length();
        let background = match usage {
            SpriteUsage::BlendAddSubtractMax => Pixel::new(0, 0, 0, 0),
            SpriteUsage::DoubleMultiply => Pixel::gray(127, 255),
            SpriteUsage::MultiplyMin => Pixel::gray(255, 255),
        };
        let mut sheet = vec![background; length as usize * length as usize];

        for s in &self.sprites {
            let original = data.sequences[s.sequence].sprites[s.sprite].original_bitmap_index;
            let source = data.bitmaps[original].level(0);
            for y in 0..s.height {
                for x in 0..s.width {
                    let incoming = source[x as usize + y as usize * s.width as usize];
                    let target = &mut sheet[(s.x + x + (s.y + y) * length) as usize];
                    *target = match usage {
                        SpriteUsage::MultiplyMin => target.alpha_blend(incoming),
                        _ => incoming,
                    };
                }
            }
        }
        (length, sheet)
    }
}

fn sheets_total_pixels(sheets: &[SpriteSheet]) -> u64 {
    sheets.iter().map(SpriteSheet::pixel_count).sum()
}

fn sheets_with_direction(
    sprites: &[SheetSprite],
    ordered_x: bool,
    keep_sequences_together: bool,
    max_sheets: Option<usize>,
    max_length: u32,
    sequence_count: usize,
) -> Option<Vec<SpriteSheet>> {
    let mut sheets: Vec<SpriteSheet> = Vec::new();
    let room = |sheets: &Vec<SpriteSheet>| max_sheets.is_none_or(|max| sheets.len() < max);

    if keep_sequences_together {
        let add_sequence = |sequence: usize, sheet: &mut SpriteSheet| {
            sprites
                .iter()
                .filter(|s| s.sequence == sequence)
                .all(|s| sheet.place(s, ordered_x, max_length))
        };
        for sequence in 0..sequence_count {
            if !sprites.iter().any(|s| s.sequence == sequence) {
                continue;
            }
            let mut added = false;
            for sheet in sheets.iter_mut() {
                let mut attempt = sheet.clone();
                if add_sequence(sequence, &mut attempt) {
                    *sheet = attempt;
                    added = true;
                    break;
                }
            }
            if !added {
                if !room(&sheets) {
                    return None;
                }
                let mut sheet = SpriteSheet::default();
                if !add_sequence(sequence, &mut sheet) {
                    return None;
                }
                sheets.push(sheet);
            }
        }
    } else {
        for sprite in sprites {
            if sheets.iter_mut().any(|sheet| sheet.place(sprite, ordered_x, max_length)) {
                continue;
            }
            if !room(&sheets) {
                return None;
            }
            let mut sheet = SpriteSheet::default();
            if !sheet.place(sprite, ordered_x, max_length) {
                return None;
            }
            sheets.push(sheet);
        }
    }

    Some(sheets)
}

/// Insert keeping `list` sorted by `key`, largest first. Ties keep insertion order.
fn insert_descending(list: &mut Vec<SheetSprite>, sprite: SheetSprite, key: fn(&SheetSprite) -> u32) {
    let position = list
        .iter()
        .position(|s| key(s) < key(&sprite))
        .unwrap_or(list.len());
    list.insert(position, sprite);
}

fn generate_sheets(
    data: &GeneratedBitmapData,
    keep_sequences_together: bool,
    max_length: u32,
    max_sheets: Option<usize>,
    spacing: u32,
) -> Option<Vec<SpriteSheet>> {
    let mut single_sheets: Vec<SpriteSheet> = Vec::new();
    let mut by_width: Vec<SheetSprite> = Vec::new();
    let mut by_height: Vec<SheetSprite> = Vec::new();

    for (se, sequence) in data.sequences.iter().enumerate() {
        for (sp, sprite) in sequence.sprites.iter().enumerate() {
            let bitmap = &data.bitmaps[sprite.original_bitmap_index];
            let (width, height) = (bitmap.width, bitmap.height);
            if width > max_length || height > max_length {
                return None;
            }

            // Only fits without padding: give it a sheet of its own, centred.
            if width + spacing * 2 > max_length || height + spacing * 2 > max_length {
                if keep_sequences_together && sequence.sprites.len() > 1 {
                    return None;
                }
                single_sheets.push(SpriteSheet {
                    sprites: vec![SheetSprite {
                        x: (max_length - width) / 2,
                        y: (max_length - height) / 2,
                        width,
                        height,
                        spacing: 0,
                        sequence: se,
                        sprite: sp,
                    }],
                });
                continue;
            }

            let reference = SheetSprite {
                x: 0,
                y: 0,
                width,
                height,
                spacing,
                sequence: se,
                sprite: sp,
            };
            insert_descending(&mut by_width, reference, |s| s.width);
            insert_descending(&mut by_height, reference, |s| s.height);
        }
    }

    if max_sheets.is_some_and(|max| single_sheets.len() > max) {
        return None;
    }
    let variable_sheets = max_sheets.map(|max| max - single_sheets.len());

    let mut sheets = Vec::new();
    if !by_width.is_empty() {
        if variable_sheets == Some(0) {
            return None;
        }
        let sequence_count = data.sequences.len();
        let attempt = |ordered_x: bool, length: u32| {
            let sprites = if ordered_x { &by_width } else { &by_height };
            sheets_with_direction(
                sprites,
                ordered_x,
                keep_sequences_together,
                variable_sheets,
                length,
                sequence_count,
            )
        };

        let (mut vertical, mut horizontal) = (None, None);
        if variable_sheets == Some(1) && max_sheets == Some(1) {
            // One sheet: shrink it as far as it goes.
            let mut length = max_length;
            loop {
                let v = attempt(false, length);
                let h = attempt(true, length);
                if v.is_none() && h.is_none() {
                    break;
                }
                for found in [&h, &v].into_iter().flatten() {
                    length = length.min(found[0].length());
                }
                vertical = v;
                horizontal = h;
                length /= 2;
                if length == 0 {
                    break;
                }
            }
        } else {
            vertical = attempt(false, max_length);
            horizontal = attempt(true, max_length);
        }

        sheets = match (vertical, horizontal) {
            (Some(v), Some(h)) => {
                if sheets_total_pixels(&v) < sheets_total_pixels(&h) {
                    v
                } else {
                    h
                }
            }
            (Some(v), None) => v,
            (None, Some(h)) => h,
            (None, None) => return None,
        };

        // Lone sprites lose their padding when that makes the sheet smaller.
        for sheet in sheets.iter_mut().filter(|s| s.sprites.len() == 1) {
            let before = sheet.length();
            let original = sheet.sprites[0];
            let s = &mut sheet.sprites[0];
            s.x -= original.spacing;
            s.y -= original.spacing;
            s.spacing = 0;
            if sheet.length() >= before {
                sheet.sprites[0] = original;
            }
        }
    }

    sheets.extend(single_sheets);
    Some(sheets)
}

/// Pack every sprite into sheets, replacing the bitmaps with the baked sheets.
/// Sprite sequences must span whole bitmap ranges on entry.
pub fn process_sprites(
    data: &mut GeneratedBitmapData,
    parameters: &SpriteParameters,
    spacing: u32,
) -> Result<()> {
    for sequence in &mut data.sequences {
        sequence.sprites = (sequence.first_bitmap..sequence.first_bitmap + sequence.bitmap_count)
            .map(|k| {
                let bitmap = &data.bitmaps[k];
                Sprite {
                    bitmap_index: k,
                    original_bitmap_index: k,
                    registration_point_x: bitmap.registration_point_x,
                    registration_point_y: bitmap.registration_point_y,
                    ..Default::default()
                }
            })
            .collect();
    }

    let max_length = parameters.budget;
    let max_sheets = match parameters.budget_count {
        0 => None,
        n => Some(n as usize),
    };

    let sheets = generate_sheets(data, true, max_length, max_sheets, spacing)
        .or_else(|| generate_sheets(data, false, max_length, max_sheets, spacing))
        .ok_or(BitmapError::SpriteBudgetExceeded {
            count: parameters.budget_count as usize,
            length: max_length,
        })?;

    let mut bitmaps = Vec::with_capacity(sheets.len());
    for (index, sheet) in sheets.iter().enumerate() {
        let (length, pixels) = sheet.bake(data, parameters.usage);
        bitmaps.push(Bitmap::new(length, length, pixels));
        for s in &sheet.sprites {
            let sprite = &mut data.sequences[s.sequence].sprites[s.sprite];
            sprite.bitmap_index = index;
            sprite.left = s.x;
            sprite.right = s.x + s.width;
            sprite.top = s.y;
            sprite.bottom = s.y + s.height;
        }
    }

    for sequence in &mut data.sequences {
        let mut used: Vec<usize> = sequence.sprites.iter().map(|s| s.bitmap_index).collect();
        used.sort_unstable();
        used.dedup();
        sequence.first_bitmap = used.first().copied().unwrap_or(0);
        sequence.bitmap_count = if sequence.sprites.len() == 1 { 1 } else { used.len() };
    }

    debug!(sheets = bitmaps.len(), "packed sprites");
    data.bitmaps = bitmaps;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generated::Sequence;
    use crate::types::BitmapType;

    fn sprite_data(sizes: &[(u32, u32)], per_sequence: usize) -> GeneratedBitmapData {
        let bitmaps: Vec<Bitmap> = sizes
            .iter()
            .enumerate()
            .map(|(i, &(w, h))| Bitmap::new(w, h, vec![Pixel::gray(i as u8 + 1, 255); w as usize * h as usize]))
            .collect();
        let sequences = (0..bitmaps.len())
            .step_by(per_sequence)
            .map(|first| Sequence {
                first_bitmap: first,
                bitmap_count: per_sequence.min(bitmaps.len() - first),
                ..Default::default()
            })
            .collect();
        GeneratedBitmapData {
            bitmap_type: BitmapType::Sprites,
            bitmaps,
            sequences,
        }
    }

    fn parameters(budget: u32, budget_count: u32) -> SpriteParameters {
        SpriteParameters {
            budget,
            budget_count,
            ..Default::default()
        }
    }

    #[test]
    fn test_budget_exhaustion() {
        let mut data = sprite_data(&[(64, 64); 10], 1);
        let err = process_sprites(&mut data, &parameters(64, 1), 4);
        assert!(matches!(err, Err(BitmapError::SpriteBudgetExceeded { count: 1, length: 64 })));

        let mut data = sprite_data(&[(64, 64); 10], 1);
        process_sprites(&mut data, &parameters(64, 0), 4).unwrap();
        assert!(data.bitmaps.len() >= 10);
        assert!(data.bitmaps.iter().all(|b| b.width <= 64 && b.height <= 64));
    }

    #[test]
    fn test_oversized_sprite_fails() {
        let mut data = sprite_data(&[(128, 8)], 1);
        assert!(process_sprites(&mut data, &parameters(64, 0), 1).is_err());
    }

    #[test]
    fn test_sprites_share_a_sheet() {
        let mut data = sprite_data(&[(8, 8), (8, 8), (4, 4)], 3);
        process_sprites(&mut data, &parameters(64, 1), 1).unwrap();

        assert_eq!(data.bitmaps.len(), 1);
        let sheet = &data.bitmaps[0];
        assert!(sheet.width.is_power_of_two() && sheet.width <= 64);

        let sprites = &data.sequences[0].sprites;
        assert_eq!(sprites.len(), 3);
        assert_eq!(data.sequences[0].bitmap_count, 1);
        for (i, a) in sprites.iter().enumerate() {
            assert!(a.left >= 1 && a.top >= 1, "sprites keep an edge margin");
            assert!(a.right + 1 <= sheet.width && a.bottom + 1 <= sheet.height);
            for b in &sprites[i + 1..] {
                let apart = a.right + 1 <= b.left
                    || b.right + 1 <= a.left
                    || a.bottom + 1 <= b.top
                    || b.bottom + 1 <= a.top;
                assert!(apart, "{:?} and {:?} overlap", a, b);
            }
        }

        // sprite pixels land where the rectangles say
        let first = sprites[0];
        let pixel = sheet.pixels[(first.left + first.top * sheet.width) as usize];
        assert_eq!(pixel, Pixel::gray(1, 255));
    }

    #[test]
    fn test_sequence_spanning_sheets() {
        let mut data = sprite_data(&[(32, 32), (32, 32), (32, 32)], 3);
        process_sprites(&mut data, &parameters(64, 0), 4).unwrap();
        let sequence = &data.sequences[0];
        let sheets: std::collections::BTreeSet<usize> =
            sequence.sprites.iter().map(|s| s.bitmap_index).collect();
        assert_eq!(sequence.bitmap_count, sheets.len());
        assert_eq!(sequence.first_bitmap, *sheets.iter().next().unwrap());
    }

    #[test]
    fn test_background_by_usage() {
        let mut data = sprite_data(&[(4, 4), (4, 4)], 2);
        let mut params = parameters(32, 0);
        params.usage = SpriteUsage::DoubleMultiply;
        process_sprites(&mut data, &params, 2).unwrap();
        let sheet = &data.bitmaps[0];
        assert_eq!(sheet.pixels.last().copied(), Some(Pixel::gray(127, 255)));
    }

    #[test]
    fn test_budget_validation() {
        assert!(parameters(64, 1).validate().is_ok());
        assert!(parameters(48, 1).validate().is_err());
        assert!(parameters(4096, 1).validate().is_err());
        assert_eq!(parameters(64, 1).effective_spacing(2), 4);
    }
}

//! S3TC block compression (DXT1, DXT3, DXT5).
//!
//! Blocks are 4x4 texels. Colors are stored as two RGB565 endpoints plus a
//! 2-bit index per texel; DXT3 prefixes an explicit 4-bit alpha per texel and
//! DXT5 an interpolated alpha block with 3-bit indices.

use byteorder::{ByteOrder, LE};

use crate::error::{BitmapError, Result};
use crate::pixel::Pixel;
use crate::types::BitmapDataFormat;

/// Texels per block edge.
pub const BLOCK_LENGTH: usize = 4;

/// 16 texels in RGBA byte order, row major.
pub type Block = [[u8; 4]; 16];

type Rgb = [u8; 3];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockFormat {
    Dxt1,
    Dxt3,
    Dxt5,
}

impl BlockFormat {
    pub fn from_data_format(format: BitmapDataFormat) -> Option<Self> {
        match format {
            BitmapDataFormat::Dxt1 => Some(BlockFormat::Dxt1),
            BitmapDataFormat::Dxt3 => Some(BlockFormat::Dxt3),
            BitmapDataFormat::Dxt5 => Some(BlockFormat::Dxt5),
            _ => None,
        }
    }

    pub fn block_size(self) -> usize {
        match self {
            BlockFormat::Dxt1 => 8,
            BlockFormat::Dxt3 | BlockFormat::Dxt5 => 16,
        }
    }

    /// Encoded size of a `width` x `height` image. Partial blocks count as whole ones.
    pub fn compressed_size(self, width: usize, height: usize) -> usize {
        width.div_ceil(BLOCK_LENGTH) * height.div_ceil(BLOCK_LENGTH) * self.block_size()
    }
}

/// Expand a 565 color, rounding to the nearest 8-bit value.
fn expand_565(value: u16) -> Rgb {
    let scale = |c: u32, max: u32| {
        let bias = (max + 1) / 2;
        let t = c * 255 + bias;
        ((t / (max + 1) + t) / (max + 1)) as u8
    };
    [
        scale(((value >> 11) & 0x1F) as u32, 31),
        scale(((value >> 5) & 0x3F) as u32, 63),
        scale((value & 0x1F) as u32, 31),
    ]
}

/// Quantize to 565. `quantize_565(expand_565(c)) == c` for every `c`.
fn quantize_565(rgb: Rgb) -> u16 {
    let red = (u16::from(rgb[0]) * 0x1F + 0x7E) / 0xFF;
    let green = (u16::from(rgb[1]) * 0x3F + 0x7E) / 0xFF;
    let blue = (u16::from(rgb[2]) * 0x1F + 0x7E) / 0xFF;
    (red << 11) | (green << 5) | blue
}

fn distance(a: Rgb, b: Rgb) -> u32 {
    a.iter()
        .zip(b.iter())
        .map(|(&x, &y)| {
            let d = x as i32 - y as i32;
            (d * d) as u32
        })
        .sum()
}

/// The four colors an endpoint pair decodes to. Index 3 of the three-color
/// mode is black; plain DXT1 decode keeps every texel opaque.
fn color_palette(c0: u16, c1: u16, four_color: bool) -> [[u8; 4]; 4] {
    let a = expand_565(c0);
    let b = expand_565(c1);
    let mix = |wa: u16, wb: u16, div: u16| -> [u8; 4] {
        let m = |i: usize| ((wa * a[i] as u16 + wb * b[i] as u16) / div) as u8;
        [m(0), m(1), m(2), 0xFF]
    };
    let first = [a[0], a[1], a[2], 0xFF];
    let second = [b[0], b[1], b[2], 0xFF];
    if four_color {
        [first, second, mix(2, 1, 3), mix(1, 2, 3)]
    } else {
        [first, second, mix(1, 1, 2), [0, 0, 0, 0xFF]]
    }
}

fn alpha_table(alpha0: u8, alpha1: u8) -> [u8; 8] {
    let mut table = [alpha0, alpha1, 0, 0, 0, 0, 0, 0xFF];
    let (a0, a1) = (u16::from(alpha0), u16::from(alpha1));
    if alpha0 > alpha1 {
        for i in 2..8u16 {
            table[i as usize] = (((8 - i) * a0 + (i - 1) * a1) / 7) as u8;
        }
    } else {
        for i in 2..6u16 {
            table[i as usize] = (((6 - i) * a0 + (i - 1) * a1) / 5) as u8;
        }
    }
    table
}

struct ColorFit {
    error: u32,
    c0: u16,
    c1: u16,
    indices: u32,
}

/// Best indices for an endpoint pair. Transparent texels always take index 3.
fn fit_colors(
    rgb: &[Rgb; 16],
    transparent: &[bool; 16],
    c0: u16,
    c1: u16,
    four_color: bool,
) -> ColorFit {
    let palette = color_palette(c0, c1, four_color);
    let usable = if four_color { 4 } else { 3 };
    let mut error = 0;
    let mut indices = 0u32;
    for i in 0..16 {
        let index = if transparent[i] {
            3
        } else {
            let (index, e) = palette[..usable]
                .iter()
                .enumerate()
                .map(|(index, p)| (index, distance(rgb[i], [p[0], p[1], p[2]])))
                .min_by_key(|&(_, e)| e)
                .unwrap_or((0, 0));
            error += e;
            index
        };
        indices |= (index as u32) << (2 * i);
    }
    ColorFit {
        error,
        c0,
        c1,
        indices,
    }
}

/// Encode the 8-byte color half of a block. With `allow_transparent` (DXT1),
/// texels with alpha below 128 use the transparent index.
fn encode_colors(block: &Block, allow_transparent: bool) -> [u8; 8] {
    let mut rgb = [[0u8; 3]; 16];
    let mut transparent = [false; 16];
    for (i, texel) in block.iter().enumerate() {
        rgb[i] = [texel[0], texel[1], texel[2]];
        transparent[i] = allow_transparent && texel[3] < 128;
    }
    let has_transparent = transparent.iter().any(|&t| t);

    let mut candidates: Vec<u16> = Vec::with_capacity(18);
    let mut low = [0xFFu8; 3];
    let mut high = [0u8; 3];
    for i in (0..16).filter(|&i| !transparent[i]) {
        let c = quantize_565(rgb[i]);
        if !candidates.contains(&c) {
            candidates.push(c);
        }
        for ch in 0..3 {
            low[ch] = low[ch].min(rgb[i][ch]);
            high[ch] = high[ch].max(rgb[i][ch]);
        }
    }

    let fit = match candidates.len() {
        0 => ColorFit {
            error: 0,
            c0: 0,
            c1: 0,
            indices: u32::MAX,
        },
        1 => fit_colors(&rgb, &transparent, candidates[0], candidates[0], false),
        _ => {
            for extreme in [quantize_565(low), quantize_565(high)] {
                if !candidates.contains(&extreme) {
                    candidates.push(extreme);
                }
            }
            let mut best: Option<ColorFit> = None;
            'search: for (n, &a) in candidates.iter().enumerate() {
                for &b in &candidates[n + 1..] {
                    let (lo, hi) = if a < b { (a, b) } else { (b, a) };
                    let mut tries = Vec::with_capacity(2);
                    // c0 > c1 selects four colors, c0 <= c1 three plus transparent
                    if !has_transparent {
                        tries.push(fit_colors(&rgb, &transparent, hi, lo, true));
                    }
                    if allow_transparent {
                        tries.push(fit_colors(&rgb, &transparent, lo, hi, false));
                    }
                    for fit in tries {
                        if best.as_ref().is_none_or(|b| fit.error < b.error) {
                            best = Some(fit);
                        }
                    }
                    if best.as_ref().is_some_and(|b| b.error == 0) {
                        break 'search;
                    }
                }
            }
            best.unwrap_or(ColorFit {
                error: 0,
                c0: candidates[0],
                c1: candidates[0],
                indices: 0,
            })
        }
    };

    let mut out = [0u8; 8];
    LE::write_u16(&mut out[0..2], fit.c0);
    LE::write_u16(&mut out[2..4], fit.c1);
    LE::write_u32(&mut out[4..8], fit.indices);
    out
}

fn encode_alpha_indices(table: &[u8; 8], alphas: &[u8; 16]) -> (u32, u64) {
    let mut error = 0u32;
    let mut indices = 0u64;
    for (i, &a) in alphas.iter().enumerate() {
        let (index, e) = table
            .iter()
            .enumerate()
            .map(|(index, &t)| (index, (t as i32 - a as i32).unsigned_abs().pow(2)))
            .min_by_key(|&(_, e)| e)
            .unwrap_or((0, 0));
        error += e;
        indices |= (index as u64) << (3 * i);
    }
    (error, indices)
}

/// Interpolated alpha block. Tries the 7-step and the 5-step (with explicit 0
/// and 255) modes and keeps whichever fits better.
fn encode_alpha_block(alphas: &[u8; 16]) -> [u8; 8] {
    let min = alphas.iter().copied().min().unwrap_or(0);
    let max = alphas.iter().copied().max().unwrap_or(0);
    let (seven0, seven1) = (max, min);
    let (error7, indices7) = encode_alpha_indices(&alpha_table(seven0, seven1), alphas);

    let inner = || alphas.iter().copied().filter(|&a| a != 0 && a != 0xFF);
    let five0 = inner().min().unwrap_or(0xFF);
    let five1 = inner().max().unwrap_or(five0);
    let (error5, indices5) = encode_alpha_indices(&alpha_table(five0, five1), alphas);

    let (a0, a1, indices) = if error5 < error7 {
        (five0, five1, indices5)
    } else {
        (seven0, seven1, indices7)
    };

    let mut out = [0u8; 8];
    out[0] = a0;
    out[1] = a1;
    LE::write_u48(&mut out[2..8], indices);
    out
}

pub fn encode_dxt1_block(block: &Block) -> [u8; 8] {
    encode_colors(block, true)
}

pub fn encode_dxt3_block(block: &Block) -> [u8; 16] {
    let mut alpha = 0u64;
    for (i, texel) in block.iter().enumerate() {
        let nibble = (u64::from(texel[3]) + 8) / 17;
        alpha |= nibble << (4 * i);
    }
    let mut out = [0u8; 16];
    LE::write_u64(&mut out[0..8], alpha);
    out[8..16].copy_from_slice(&encode_colors(block, false));
    out
}

pub fn encode_dxt5_block(block: &Block) -> [u8; 16] {
    let mut alphas = [0u8; 16];
    for (alpha, texel) in alphas.iter_mut().zip(block.iter()) {
        *alpha = texel[3];
    }
    let mut out = [0u8; 16];
    out[0..8].copy_from_slice(&encode_alpha_block(&alphas));
    out[8..16].copy_from_slice(&encode_colors(block, false));
    out
}

fn decode_colors(source: &[u8], dxt1: bool) -> Block {
    let c0 = LE::read_u16(&source[0..2]);
    let c1 = LE::read_u16(&source[2..4]);
    let indices = LE::read_u32(&source[4..8]);
    let palette = color_palette(c0, c1, !dxt1 || c0 > c1);
    let mut block = [[0u8; 4]; 16];
    for (i, texel) in block.iter_mut().enumerate() {
        *texel = palette[((indices >> (2 * i)) & 0b11) as usize];
    }
    block
}

/// `source` must hold at least 8 bytes.
pub fn decode_dxt1_block(source: &[u8]) -> Block {
    decode_colors(&source[..8], true)
}

/// `source` must hold at least 16 bytes.
pub fn decode_dxt3_block(source: &[u8]) -> Block {
    let alpha = LE::read_u64(&source[0..8]);
    let mut block = decode_colors(&source[8..16], false);
    for (i, texel) in block.iter_mut().enumerate() {
        texel[3] = ((alpha >> (4 * i)) & 0xF) as u8 * 17;
    }
    block
}

/// `source` must hold at least 16 bytes.
pub fn decode_dxt5_block(source: &[u8]) -> Block {
    let table = alpha_table(source[0], source[1]);
    let indices = LE::read_u48(&source[2..8]);
    let mut block = decode_colors(&source[8..16], false);
    for (i, texel) in block.iter_mut().enumerate() {
        texel[3] = table[((indices >> (3 * i)) & 0b111) as usize];
    }
    block
}

fn texel(pixel: Pixel) -> [u8; 4] {
    [pixel.red, pixel.green, pixel.blue, pixel.alpha]
}

/// Compress a `width` x `height` image. Blocks hanging past an edge repeat the edge texels.
pub fn compress(pixels: &[Pixel], width: usize, height: usize, format: BlockFormat) -> Vec<u8> {
    let mut out = Vec::with_capacity(format.compressed_size(width, height));
    if width == 0 || height == 0 {
        return out;
    }
    for by in (0..height).step_by(BLOCK_LENGTH) {
        for bx in (0..width).step_by(BLOCK_LENGTH) {
            let mut block = [[0u8; 4]; 16];
            for j in 0..BLOCK_LENGTH {
                let y = (by + j).min(height - 1);
                for i in 0..BLOCK_LENGTH {
                    let x = (bx + i).min(width - 1);
                    block[j * BLOCK_LENGTH + i] = texel(pixels[y * width + x]);
                }
            }
            match format {
                BlockFormat::Dxt1 => out.extend_from_slice(&encode_dxt1_block(&block)),
                BlockFormat::Dxt3 => out.extend_from_slice(&encode_dxt3_block(&block)),
                BlockFormat::Dxt5 => out.extend_from_slice(&encode_dxt5_block(&block)),
            }
        }
    }
    out
}

/// Decompress into `output`, which must hold `width * height` pixels. Texels
/// outside the image are dropped.
pub fn decompress(
    data: &[u8],
    width: usize,
    height: usize,
    format: BlockFormat,
    output: &mut [Pixel],
) -> Result<()> {
    let expected = format.compressed_size(width, height);
    if data.len() < expected {
        return Err(BitmapError::InsufficientData {
            what: "compressed blocks",
            expected,
            actual: data.len(),
        });
    }
    if output.len() < width * height {
        return Err(BitmapError::Internal(format!(
            "output buffer holds {} pixels, need {}",
            output.len(),
            width * height
        )));
    }

    let size = format.block_size();
    let mut blocks = data.chunks_exact(size);
    for by in (0..height).step_by(BLOCK_LENGTH) {
        for bx in (0..width).step_by(BLOCK_LENGTH) {
            let Some(source) = blocks.next() else {
                return Err(BitmapError::Internal("ran out of blocks".to_string()));
            };
            let block = match format {
                BlockFormat::Dxt1 => decode_dxt1_block(source),
                BlockFormat::Dxt3 => decode_dxt3_block(source),
                BlockFormat::Dxt5 => decode_dxt5_block(source),
            };
            for j in 0..BLOCK_LENGTH {
                let y = by + j;
                if y >= height {
                    break;
                }
                for i in 0..BLOCK_LENGTH {
                    let x = bx + i;
                    if x >= width {
                        break;
                    }
                    let t = block[j * BLOCK_LENGTH + i];
                    output[y * width + x] = Pixel::new(t[0], t[1], t[2], t[3]);
                }
            }
        }
    }
    Ok(())
}

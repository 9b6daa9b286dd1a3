// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use super::tiles::Tile;
use crate::{
    api::Crop,
    error::{Error, Result},
    headers::context::DecodeContext,
};

pub const SCALE_FACTORS: [usize; 4] = [1, 2, 4, 8];

/// Region of the decoded image that ends up in the output, and how it is
/// transformed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputGeometry {
    pub src_x: usize,
    pub src_y: usize,
    pub src_width: usize,
    pub src_height: usize,
    pub scale: usize,
    pub flip_horizontal: bool,
}

impl OutputGeometry {
    /// Validates the requested crop against a `width`x`height` image.
    pub fn new(
        crop: Option<Crop>,
        flip_horizontal: bool,
        width: usize,
        height: usize,
    ) -> Result<OutputGeometry> {
        let (x, y, size, scale) = match crop {
            None => {
                return Ok(OutputGeometry {
                    src_x: 0,
                    src_y: 0,
                    src_width: width,
                    src_height: height,
                    scale: 1,
                    flip_horizontal,
                });
            }
            Some(Crop::Region { x, y, size, scale }) => (x, y, size, scale),
            Some(Crop::Centered { output_size }) => {
                if output_size == 0 || output_size > width.min(height) {
                    return Err(Error::InvalidCenteredCrop(output_size, width, height));
                }
                let (mut size, mut scale) = (output_size, 1);
                while scale < 8 && size * 2 <= width && size * 2 <= height {
                    size *= 2;
                    scale *= 2;
                }
                let x = (width - size) / 2 / 8 * 8;
                let y = (height - size) / 2 / 8 * 8;
                (x, y, size, scale)
            }
        };
        if x % 8 != 0 || y % 8 != 0 || size % 8 != 0 {
            return Err(Error::CropNotAligned(x, y, size));
        }
        if size == 0 || x + size > width || y + size > height {
            return Err(Error::CropOutOfBounds(x, y, size, width, height));
        }
        if !SCALE_FACTORS.contains(&scale) || size % scale != 0 {
            return Err(Error::InvalidScale(scale, size));
        }
        Ok(OutputGeometry {
            src_x: x,
            src_y: y,
            src_width: size,
            src_height: size,
            scale,
            flip_horizontal,
        })
    }

    pub fn width(&self) -> usize {
        self.src_width / self.scale
    }

    pub fn height(&self) -> usize {
        self.src_height / self.scale
    }
}

/// A rectangle of output pixels produced by one worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
    /// RGB triples, row-major.
    pub pixels: Vec<u8>,
}

/// Restricts `tile` to the output region, downsamples it and mirrors it if
/// requested. Returns `None` if the tile is outside the region.
pub fn crop_tile(ctx: &DecodeContext, geometry: &OutputGeometry, tile: &Tile) -> Option<Fragment> {
    let (mcu_width, mcu_height) = (ctx.mcu_width(), ctx.mcu_height());
    let tile_x = (tile.mcu_index % ctx.mcus_x) * mcu_width;
    let tile_y = (tile.mcu_index / ctx.mcus_x) * mcu_height;
    let x0 = tile_x.max(geometry.src_x);
    let x1 = (tile_x + mcu_width).min(geometry.src_x + geometry.src_width);
    let y0 = tile_y.max(geometry.src_y);
    let y1 = (tile_y + mcu_height).min(geometry.src_y + geometry.src_height);
    if x0 >= x1 || y0 >= y1 {
        return None;
    }
    let scale = geometry.scale;
    let width = (x1 - x0) / scale;
    let height = (y1 - y0) / scale;
    let n = (scale * scale) as u32;
    let mut pixels = Vec::with_capacity(width * height * 3);
    for oy in 0..height {
        for ox in 0..width {
            let mut sum = [0u32; 3];
            for dy in 0..scale {
                let row = y0 - tile_y + oy * scale + dy;
                for dx in 0..scale {
                    let col = x0 - tile_x + ox * scale + dx;
                    let offset = (row * mcu_width + col) * 3;
                    for (s, &v) in sum.iter_mut().zip(&tile.pixels[offset..offset + 3]) {
                        *s += v as u32;
                    }
                }
            }
            pixels.extend(sum.map(|s| ((s + n / 2) / n) as u8));
        }
    }
    let mut x = (x0 - geometry.src_x) / scale;
    if geometry.flip_horizontal {
        x = geometry.width() - x - width;
        for row in pixels.chunks_exact_mut(width * 3) {
            flip_row(row);
        }
    }
    Some(Fragment {
        x,
        y: (y0 - geometry.src_y) / scale,
        width,
        height,
        pixels,
    })
}

fn flip_row(row: &mut [u8]) {
    let n = row.len() / 3;
    for i in 0..n / 2 {
        let j = n - 1 - i;
        for c in 0..3 {
            row.swap(i * 3 + c, j * 3 + c);
        }
    }
}

// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use super::{idct::dequantize_and_idct, ycbcr::ycbcr_to_rgb};
use crate::{
    BLOCK_DIM, BLOCK_SIZE,
    entropy_coding::scan::WorkerScan,
    error::Result,
    headers::context::{DecodeContext, MAX_COMPONENTS},
    reconcile::Reconciliation,
};

/// RGB pixels of one MCU, including any padding past the image edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tile {
    pub mcu_index: usize,
    /// `mcu_width * mcu_height` RGB triples, row-major.
    pub pixels: Vec<u8>,
}

/// Converts decoded MCUs to RGB tiles. Sample planes are reused between
/// MCUs.
pub struct TileRenderer<'a> {
    ctx: &'a DecodeContext,
    planes: Vec<Vec<u8>>,
}

impl<'a> TileRenderer<'a> {
    pub fn new(ctx: &'a DecodeContext) -> Self {
        let planes = ctx
            .components
            .iter()
            .map(|c| vec![0; c.blocks_per_mcu() * BLOCK_SIZE])
            .collect();
        TileRenderer { ctx, planes }
    }

    /// Renders local MCU `mcu` of `scan`, whose global index is
    /// `mcu_index`.
    pub fn render(
        &mut self,
        scan: &WorkerScan,
        reconciliation: &Reconciliation,
        mcu: usize,
        mcu_index: usize,
    ) -> Result<Tile> {
        let ctx = self.ctx;
        let blocks = scan.mcu_blocks(mcu);
        let mut block = 0;
        for (c, comp) in ctx.components.iter().enumerate() {
            let quant = ctx.quant_table(c)?;
            let plane_width = comp.h * BLOCK_DIM;
            for b in 0..comp.blocks_per_mcu() {
                let dc = reconciliation.corrected_dc(scan, mcu, block, c);
                let mut samples = [0u8; BLOCK_SIZE];
                dequantize_and_idct(&blocks[block], dc, quant, &mut samples);
                let (bx, by) = (b % comp.h, b / comp.h);
                for (y, row) in samples.chunks_exact(BLOCK_DIM).enumerate() {
                    let start = (by * BLOCK_DIM + y) * plane_width + bx * BLOCK_DIM;
                    self.planes[c][start..start + BLOCK_DIM].copy_from_slice(row);
                }
                block += 1;
            }
        }
        let (width, height) = (ctx.mcu_width(), ctx.mcu_height());
        let mut pixels = vec![0; width * height * 3];
        let gray = ctx.num_components() == 1;
        for y in 0..height {
            for x in 0..width {
                let mut sample = [0u8; MAX_COMPONENTS];
                for (c, comp) in ctx.components.iter().enumerate() {
                    let sx = x * comp.h / ctx.max_h;
                    let sy = y * comp.v / ctx.max_v;
                    sample[c] = self.planes[c][sy * comp.h * BLOCK_DIM + sx];
                }
                let rgb = if gray {
                    [sample[0]; 3]
                } else {
                    ycbcr_to_rgb(sample[0], sample[1], sample[2])
                };
                let offset = (y * width + x) * 3;
                pixels[offset..offset + 3].copy_from_slice(&rgb);
            }
        }
        Ok(Tile { mcu_index, pixels })
    }
}

/// Renders every MCU the worker of `scan` kept after reconciliation.
pub fn render_tiles(
    ctx: &DecodeContext,
    scan: &WorkerScan,
    reconciliation: &Reconciliation,
) -> Result<Vec<Tile>> {
    let part = &reconciliation.partitions[scan.worker_id];
    let mut renderer = TileRenderer::new(ctx);
    part.local_mcus()
        .zip(part.mcu_start_index..part.mcu_end_index)
        .map(|(mcu, index)| renderer.render(scan, reconciliation, mcu, index))
        .collect()
}

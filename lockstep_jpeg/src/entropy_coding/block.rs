// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use crate::{
    BLOCK_SIZE,
    bit_reader::BitReader,
    error::{Error, Result},
    headers::{
        context::{DecodeContext, QuantTable},
        huffman::HuffmanTable,
    },
};

pub type CoefficientBlock = [i16; BLOCK_SIZE];

/// Largest magnitude of a dequantized coefficient of 8-bit samples.
const MAX_DEQUANTIZED: i32 = 2048;

/// Tables used by one component of the scan.
#[derive(Debug, Clone, Copy)]
pub struct ComponentTables<'a> {
    pub dc: &'a HuffmanTable,
    pub ac: &'a HuffmanTable,
    pub quant: &'a QuantTable,
}

/// Tables of every scan component, plus the component of each data unit of
/// an MCU in coding order.
#[derive(Debug, Clone)]
pub struct ScanTables<'a> {
    pub components: Vec<ComponentTables<'a>>,
    pub block_components: Vec<usize>,
}

impl<'a> ScanTables<'a> {
    pub fn new(ctx: &'a DecodeContext) -> Result<ScanTables<'a>> {
        let components = (0..ctx.num_components())
            .map(|c| {
                Ok(ComponentTables {
                    dc: ctx.dc_table(c)?,
                    ac: ctx.ac_table(c)?,
                    quant: ctx.quant_table(c)?,
                })
            })
            .collect::<Result<_>>()?;
        Ok(ScanTables {
            components,
            block_components: ctx.mcu_layout().map(|(c, _)| c).collect(),
        })
    }

    pub fn blocks_per_mcu(&self) -> usize {
        self.block_components.len()
    }
}

/// Decodes one data unit. The DC difference is added to `pred`, which then
/// holds the DC value of the block; AC coefficients are stored in zig-zag
/// order in `block[1..]`. With `strict`, coefficients whose dequantized
/// magnitude no 8-bit image can produce are rejected.
pub fn decode_block(
    br: &mut BitReader,
    tables: &ComponentTables,
    pred: &mut i32,
    block: &mut CoefficientBlock,
    strict: bool,
) -> Result<()> {
    let size = tables.dc.decode(br)?;
    if size > 11 {
        return Err(Error::InvalidCoefficientSize(size));
    }
    let diff = br.receive_extend(size as u32)?;
    if strict && (diff * tables.quant[0] as i32).abs() > MAX_DEQUANTIZED + tables.quant[0] as i32 {
        return Err(Error::InvalidCoefficientSize(size));
    }
    *pred = pred.wrapping_add(diff);
    block.fill(0);
    let mut k = 1;
    while k < BLOCK_SIZE {
        let symbol = tables.ac.decode(br)?;
        let run = (symbol >> 4) as usize;
        let size = symbol & 0xf;
        if size == 0 {
            match run {
                0 => break,
                15 => {
                    k += 16;
                    if k > BLOCK_SIZE {
                        return Err(Error::InvalidRunLength(k));
                    }
                    continue;
                }
                _ => return Err(Error::InvalidAcSymbol(symbol)),
            }
        }
        k += run;
        if k >= BLOCK_SIZE {
            return Err(Error::InvalidRunLength(k));
        }
        if size > 10 {
            return Err(Error::InvalidCoefficientSize(size));
        }
        let value = br.receive_extend(size as u32)?;
        if strict && (value * tables.quant[k] as i32).abs() > MAX_DEQUANTIZED + tables.quant[k] as i32 {
            return Err(Error::InvalidCoefficientSize(size));
        }
        block[k] = value as i16;
        k += 1;
    }
    Ok(())
}

/// Decodes one MCU into `blocks` and `dc`, which hold one entry per data
/// unit. `preds` holds the DC predictor of each component.
pub fn decode_mcu(
    br: &mut BitReader,
    tables: &ScanTables,
    preds: &mut [i32],
    blocks: &mut [CoefficientBlock],
    dc: &mut [i32],
    strict: bool,
) -> Result<()> {
    for (i, &c) in tables.block_components.iter().enumerate() {
        decode_block(br, &tables.components[c], &mut preds[c], &mut blocks[i], strict)?;
        dc[i] = preds[c];
    }
    Ok(())
}

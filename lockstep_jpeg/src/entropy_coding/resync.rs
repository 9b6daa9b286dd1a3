// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use super::block::{ScanTables, decode_mcu};
use crate::{
    BLOCK_SIZE,
    bit_reader::{BitReader, Boundary},
    headers::{
        context::{DecodeContext, MAX_COMPONENTS},
        markers::is_restart,
    },
    util::tracing_wrappers::*,
};

/// Number of MCUs a candidate position must decode to be accepted.
pub const TRIAL_MCUS: usize = 4;

/// Returns whether `TRIAL_MCUS` MCUs decode cleanly from `br`. Reaching the
/// end of the data after at least one MCU also counts as success.
pub fn trial_decode(mut br: BitReader, tables: &ScanTables) -> bool {
    let blocks_per_mcu = tables.blocks_per_mcu();
    let mut preds = [0i32; MAX_COMPONENTS];
    let mut blocks = vec![[0i16; BLOCK_SIZE]; blocks_per_mcu];
    let mut dc = vec![0; blocks_per_mcu];
    let mut decoded = 0;
    while decoded < TRIAL_MCUS {
        match br.boundary() {
            Boundary::Data => {}
            Boundary::Marker(m) if is_restart(m) && decoded > 0 => {
                br.consume_marker();
                preds = [0; MAX_COMPONENTS];
                continue;
            }
            _ => return decoded > 0,
        }
        if decode_mcu(&mut br, tables, &mut preds, &mut blocks, &mut dc, true).is_err() {
            return false;
        }
        decoded += 1;
    }
    true
}

/// Scans bit by bit, from bit position `from` up to byte `end`, for the
/// first position from which [`trial_decode`] succeeds.
pub fn find_sync<'a>(
    data: &'a [u8],
    ctx: &DecodeContext,
    tables: &ScanTables,
    from: u64,
    end: usize,
) -> Option<BitReader<'a>> {
    let first = (from / 8) as usize;
    for p in first.max(ctx.entropy_start)..end.min(ctx.entropy_end) {
        // Stuffed zero bytes and marker codes never start an MCU.
        if p > ctx.entropy_start && data[p - 1] == 0xff {
            continue;
        }
        let first_bit = if p == first { (from % 8) as u32 } else { 0 };
        for bit in first_bit..8 {
            let br = BitReader::at_bit(data, p, bit, ctx.entropy_end);
            if trial_decode(br.clone(), tables) {
                trace!(p, bit, "found sync point");
                return Some(br);
            }
        }
    }
    None
}

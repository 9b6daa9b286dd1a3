// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use super::huffman::HuffmanTable;
use crate::{
    BLOCK_SIZE,
    error::{Error, Result},
};

pub const MAX_TABLES: usize = 4;
pub const MAX_COMPONENTS: usize = 3;

/// Quantization table in zig-zag order.
pub type QuantTable = [u16; BLOCK_SIZE];

/// A frame component together with the tables its scan selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Component {
    pub id: u8,
    /// Horizontal sampling factor.
    pub h: usize,
    /// Vertical sampling factor.
    pub v: usize,
    pub quant_table: usize,
    pub dc_table: usize,
    pub ac_table: usize,
}

impl Component {
    pub fn blocks_per_mcu(&self) -> usize {
        self.h * self.v
    }
}

/// How the entropy-coded data is split between workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionMode {
    /// Workers start at restart markers, so every start MCU is known exactly.
    RestartAligned,
    /// Workers other than the first locate an MCU boundary by trial decoding.
    ByteScan,
}

/// Everything a worker needs to decode its part of the scan. Built once by
/// the leader and read-only afterwards.
#[derive(Debug, Clone)]
pub struct DecodeContext {
    pub width: usize,
    pub height: usize,
    /// Components in scan order, which always equals frame order.
    pub components: Vec<Component>,
    pub quant_tables: [Option<QuantTable>; MAX_TABLES],
    pub dc_tables: [Option<HuffmanTable>; MAX_TABLES],
    pub ac_tables: [Option<HuffmanTable>; MAX_TABLES],
    /// MCUs between restart markers, 0 if restart markers are disabled.
    pub restart_interval: usize,
    pub spectral_start: u8,
    pub spectral_end: u8,
    pub approx_high: u8,
    pub approx_low: u8,
    pub max_h: usize,
    pub max_v: usize,
    pub mcus_x: usize,
    pub mcus_y: usize,
    /// First byte of entropy-coded data.
    pub entropy_start: usize,
    /// Offset of the marker terminating the entropy-coded data.
    pub entropy_end: usize,
    /// Number of restart markers found between `entropy_start` and
    /// `entropy_end`.
    pub restart_markers: usize,
    pub num_workers: usize,
    pub bytes_per_partition: usize,
    pub partition_mode: PartitionMode,
}

impl DecodeContext {
    pub fn num_components(&self) -> usize {
        self.components.len()
    }

    pub fn total_mcus(&self) -> usize {
        self.mcus_x * self.mcus_y
    }

    pub fn blocks_per_mcu(&self) -> usize {
        self.components.iter().map(Component::blocks_per_mcu).sum()
    }

    /// Width of an MCU in pixels.
    pub fn mcu_width(&self) -> usize {
        self.max_h * 8
    }

    /// Height of an MCU in pixels.
    pub fn mcu_height(&self) -> usize {
        self.max_v * 8
    }

    pub fn entropy_len(&self) -> usize {
        self.entropy_end - self.entropy_start
    }

    /// Number of restart segments in the scan; 1 without restart markers.
    pub fn restart_segments(&self) -> usize {
        if self.restart_interval == 0 {
            1
        } else {
            self.restart_markers + 1
        }
    }

    /// Component and block index within the component for each data unit
    /// of an MCU, in coding order.
    pub fn mcu_layout(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.components
            .iter()
            .enumerate()
            .flat_map(|(c, comp)| (0..comp.blocks_per_mcu()).map(move |b| (c, b)))
    }

    /// Index within an MCU of the last data unit of each component, whose
    /// DC value predicts the next MCU.
    pub fn last_blocks(&self) -> [usize; MAX_COMPONENTS] {
        let mut last = [0; MAX_COMPONENTS];
        for (i, (c, _)) in self.mcu_layout().enumerate() {
            last[c] = i;
        }
        last
    }

    pub fn quant_table(&self, c: usize) -> Result<&QuantTable> {
        let id = self.components[c].quant_table;
        self.quant_tables[id]
            .as_ref()
            .ok_or(Error::UndefinedQuantTable(id))
    }

    pub fn dc_table(&self, c: usize) -> Result<&HuffmanTable> {
        let id = self.components[c].dc_table;
        self.dc_tables[id]
            .as_ref()
            .ok_or(Error::UndefinedHuffmanTable(id, 0))
    }

    pub fn ac_table(&self, c: usize) -> Result<&HuffmanTable> {
        let id = self.components[c].ac_table;
        self.ac_tables[id]
            .as_ref()
            .ok_or(Error::UndefinedHuffmanTable(id, 1))
    }
}

// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use crate::partition::PartitionStrategy;

/// Number of workers used when none is requested.
pub const DEFAULT_WORKERS: usize = 16;

/// Largest supported worker pool.
pub const MAX_WORKERS: usize = 24;

/// Part of the image to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Crop {
    /// A `size`x`size` square at (`x`, `y`), downsampled by `scale`. The
    /// origin and size must be multiples of 8 and `scale` one of 1, 2, 4
    /// or 8 dividing `size`.
    Region {
        x: usize,
        y: usize,
        size: usize,
        scale: usize,
    },
    /// An `output_size`x`output_size` image taken from the center. The
    /// source square is the largest `output_size << k` (k ≤ 3) that fits,
    /// so the downsampling factor is picked automatically.
    Centered { output_size: usize },
}

#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct DecodeOptions {
    /// Size of the worker pool, between 1 and [`MAX_WORKERS`].
    pub num_workers: usize,
    /// How the entropy-coded data is split between workers.
    pub partition_strategy: PartitionStrategy,
    pub crop: Option<Crop>,
    /// Mirror the output left to right.
    pub flip_horizontal: bool,
    /// Fail decoding images with more than this number of pixels.
    pub pixel_limit: Option<usize>,
}

impl DecodeOptions {
    pub fn with_workers(num_workers: usize) -> Self {
        Self {
            num_workers,
            ..Self::default()
        }
    }
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            num_workers: DEFAULT_WORKERS,
            partition_strategy: PartitionStrategy::Auto,
            crop: None,
            flip_horizontal: false,
            pixel_limit: None,
        }
    }
}

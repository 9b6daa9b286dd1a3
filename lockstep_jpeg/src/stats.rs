// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use std::{iter::Sum, ops::Add};

use crate::render::crop::Fragment;

/// Per-channel sums of output pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelSums {
    pub r: u64,
    pub g: u64,
    pub b: u64,
}

impl ChannelSums {
    /// Sums a buffer of RGB triples.
    /// ```
    /// # use lockstep_jpeg::stats::ChannelSums;
    /// let sums = ChannelSums::from_rgb(&[1, 2, 3, 10, 20, 30]);
    /// assert_eq!((sums.r, sums.g, sums.b), (11, 22, 33));
    /// ```
    pub fn from_rgb(pixels: &[u8]) -> ChannelSums {
        let mut sums = ChannelSums::default();
        for px in pixels.chunks_exact(3) {
            sums.r += px[0] as u64;
            sums.g += px[1] as u64;
            sums.b += px[2] as u64;
        }
        sums
    }

    pub fn from_fragments<'a>(fragments: impl IntoIterator<Item = &'a Fragment>) -> ChannelSums {
        fragments
            .into_iter()
            .map(|f| ChannelSums::from_rgb(&f.pixels))
            .sum()
    }
}

impl Add for ChannelSums {
    type Output = ChannelSums;

    fn add(self, rhs: ChannelSums) -> ChannelSums {
        ChannelSums {
            r: self.r + rhs.r,
            g: self.g + rhs.g,
            b: self.b + rhs.b,
        }
    }
}

impl Sum for ChannelSums {
    fn sum<I: Iterator<Item = ChannelSums>>(iter: I) -> ChannelSums {
        iter.fold(ChannelSums::default(), Add::add)
    }
}

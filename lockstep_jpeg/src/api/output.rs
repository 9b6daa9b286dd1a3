// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use crate::{pipeline::PipelineOutput, stats::ChannelSums};

/// A decoded (and possibly cropped, scaled or mirrored) image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    pub width: usize,
    pub height: usize,
    /// RGB triples, row-major.
    pub pixels: Vec<u8>,
    pub channel_sums: ChannelSums,
}

impl DecodedImage {
    pub(super) fn from_pipeline(output: PipelineOutput) -> Self {
        let (width, height) = (output.geometry.width(), output.geometry.height());
        let mut pixels = vec![0; width * height * 3];
        for fragment in output.fragments {
            let row_len = fragment.width * 3;
            for (y, src) in fragment.pixels.chunks_exact(row_len).enumerate() {
                let start = ((fragment.y + y) * width + fragment.x) * 3;
                pixels[start..start + row_len].copy_from_slice(src);
            }
        }
        DecodedImage {
            width,
            height,
            pixels,
            channel_sums: output.sums,
        }
    }

    pub fn pixel(&self, x: usize, y: usize) -> [u8; 3] {
        let i = (y * self.width + x) * 3;
        [self.pixels[i], self.pixels[i + 1], self.pixels[i + 2]]
    }
}

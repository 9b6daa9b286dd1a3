// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use std::ops::Range;

use crate::headers::{
    context::{DecodeContext, PartitionMode},
    markers::is_restart,
};

/// Requested policy for splitting the entropy-coded data between workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PartitionStrategy {
    /// Align to restart markers when there is at least one restart segment
    /// per worker, otherwise scan for MCU boundaries.
    #[default]
    Auto,
    /// Align to restart markers whenever the image has them.
    RestartAligned,
    /// Always scan for MCU boundaries.
    ByteScan,
}

impl PartitionStrategy {
    /// Mode used for the scan described by `ctx`. Without restart markers
    /// only byte scan is possible.
    pub fn mode(self, ctx: &DecodeContext) -> PartitionMode {
        match self {
            _ if ctx.restart_interval == 0 => PartitionMode::ByteScan,
            PartitionStrategy::Auto if ctx.restart_segments() >= ctx.num_workers => {
                PartitionMode::RestartAligned
            }
            PartitionStrategy::RestartAligned => PartitionMode::RestartAligned,
            _ => PartitionMode::ByteScan,
        }
    }
}

/// Raw byte range of `worker`. Ranges of consecutive workers are contiguous
/// and may be empty for the last workers of small images.
pub fn byte_range(entropy: Range<usize>, bytes_per_partition: usize, worker: usize) -> Range<usize> {
    let start = entropy
        .start
        .saturating_add(worker.saturating_mul(bytes_per_partition))
        .min(entropy.end);
    let end = start.saturating_add(bytes_per_partition).min(entropy.end);
    start..end
}

pub fn partition_ranges(ctx: &DecodeContext) -> Vec<Range<usize>> {
    (0..ctx.num_workers)
        .map(|w| {
            byte_range(
                ctx.entropy_start..ctx.entropy_end,
                ctx.bytes_per_partition,
                w,
            )
        })
        .collect()
}

/// Finds the first restart segment starting inside `range`, returning its
/// index and its first byte.
pub fn first_owned_segment(
    data: &[u8],
    ctx: &DecodeContext,
    range: Range<usize>,
) -> Option<(usize, usize)> {
    if range.is_empty() {
        return None;
    }
    if range.start == ctx.entropy_start {
        return Some((0, ctx.entropy_start));
    }
    let mut segment = 0;
    let mut i = ctx.entropy_start;
    while i + 1 < ctx.entropy_end && i < range.end {
        if data[i] == 0xff && is_restart(data[i + 1]) {
            segment += 1;
            i += 2;
            if i >= range.start {
                return (i < range.end && i < ctx.entropy_end).then_some((segment, i));
            }
        } else {
            i += 1;
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use arbtest::arbtest;
    use lockstep_jpeg_test_utils::{EncoderOptions, encode, noise_image};
    use test_log::test;

    use super::*;
    use crate::headers::markers::parse;

    #[test]
    fn ranges_are_disjoint_and_cover_entropy_data() {
        arbtest(|u| {
            let start = u.int_in_range(0..=1000usize)?;
            let len = u.int_in_range(0..=5000usize)?;
            let workers = u.int_in_range(1..=24usize)?;
            let bpp = len.div_ceil(workers).max(1);
            let ranges: Vec<_> = (0..workers)
                .map(|w| byte_range(start..start + len, bpp, w))
                .collect();
            let mut expected_start = start;
            for r in ranges.iter() {
                assert_eq!(r.start, expected_start);
                assert!(r.start <= r.end);
                expected_start = r.end;
            }
            assert_eq!(expected_start, start + len);
            Ok(())
        });
    }

    #[test]
    fn last_ranges_can_be_empty() {
        assert_eq!(byte_range(10..13, 1, 2), 12..13);
        assert_eq!(byte_range(10..13, 1, 5), 13..13);
        assert_eq!(byte_range(10..13, 2, 1), 12..13);
    }

    #[test]
    fn mode_follows_restart_segments() {
        let (w, h) = (64, 16);
        let pixels = noise_image(w, h, 1, 2);
        let options = EncoderOptions {
            restart_interval: 4,
            ..Default::default()
        };
        // 16 MCUs, so 4 restart segments.
        let data = encode(&pixels, w, h, &options);
        let mut ctx = parse(&data, 4, PartitionStrategy::Auto).unwrap();
        assert_eq!(ctx.restart_segments(), 4);
        assert_eq!(ctx.partition_mode, PartitionMode::RestartAligned);
        ctx.num_workers = 5;
        assert_eq!(PartitionStrategy::Auto.mode(&ctx), PartitionMode::ByteScan);
        assert_eq!(
            PartitionStrategy::RestartAligned.mode(&ctx),
            PartitionMode::RestartAligned
        );
        assert_eq!(PartitionStrategy::ByteScan.mode(&ctx), PartitionMode::ByteScan);
        ctx.restart_interval = 0;
        assert_eq!(ctx.restart_segments(), 1);
        assert_eq!(
            PartitionStrategy::RestartAligned.mode(&ctx),
            PartitionMode::ByteScan
        );
    }

    #[test]
    fn owned_segments_follow_restart_markers() {
        let (w, h) = (64, 32);
        let pixels = noise_image(w, h, 1, 8);
        let options = EncoderOptions {
            restart_interval: 1,
            ..Default::default()
        };
        let data = encode(&pixels, w, h, &options);
        let ctx = parse(&data, 4, PartitionStrategy::Auto).unwrap();
        let owned: Vec<_> = partition_ranges(&ctx)
            .into_iter()
            .map(|r| first_owned_segment(&data, &ctx, r.clone()).map(|s| (s, r)))
            .collect();
        assert_eq!(owned[0].as_ref().unwrap().0, (0, ctx.entropy_start));
        let mut last_segment = 0;
        for (i, ((segment, byte), range)) in owned.into_iter().flatten().enumerate() {
            assert!(range.contains(&byte));
            if i > 0 {
                assert!(segment > last_segment);
                assert_eq!(data[byte - 2], 0xff);
                assert!(is_restart(data[byte - 1]));
            }
            last_segment = segment;
        }
    }
}

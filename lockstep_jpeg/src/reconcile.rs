// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use std::{
    borrow::{Borrow, Cow},
    collections::BTreeMap,
};

use crate::{
    entropy_coding::scan::{WorkerScan, extend_scan},
    error::{Error, Result},
    headers::context::{DecodeContext, MAX_COMPONENTS, PartitionMode},
    util::tracing_wrappers::*,
};

/// The MCUs a worker keeps after reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerPartition {
    pub worker_id: usize,
    pub byte_start: usize,
    pub byte_end: usize,
    /// Global index of the first kept MCU.
    pub mcu_start_index: usize,
    /// Global index one past the last kept MCU.
    pub mcu_end_index: usize,
    /// Number of leading decoded MCUs that belong to the previous worker.
    pub skip: usize,
    /// Local index of the first restart reset after `skip`; the DC offset
    /// applies to local MCUs before it.
    pub offset_until: usize,
}

impl WorkerPartition {
    pub fn num_mcus(&self) -> usize {
        self.mcu_end_index - self.mcu_start_index
    }

    /// Local indices of the kept MCUs.
    pub fn local_mcus(&self) -> std::ops::Range<usize> {
        self.skip..self.skip + self.num_mcus()
    }
}

/// Per worker, per component corrections for worker-local DC values.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DcOffsetTable {
    offsets: Vec<[i32; MAX_COMPONENTS]>,
}

impl DcOffsetTable {
    pub fn get(&self, worker: usize, component: usize) -> i32 {
        self.offsets[worker][component]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation {
    pub partitions: Vec<WorkerPartition>,
    pub offsets: DcOffsetTable,
    /// Chains the leader decoded further than their worker did, by worker.
    pub continued: BTreeMap<usize, WorkerScan>,
}

impl Reconciliation {
    /// The chain the worker of `scan` renders from: `scan` itself, or its
    /// continuation.
    pub fn scan_for<'s>(&'s self, scan: &'s WorkerScan) -> &'s WorkerScan {
        self.continued.get(&scan.worker_id).unwrap_or(scan)
    }

    /// True DC value of block `block` (of component `component`) in local
    /// MCU `mcu` of `scan`.
    pub fn corrected_dc(&self, scan: &WorkerScan, mcu: usize, block: usize, component: usize) -> i32 {
        let dc = scan.mcu_dc(mcu)[block];
        let part = &self.partitions[scan.worker_id];
        if mcu < part.offset_until {
            dc.wrapping_add(self.offsets.get(scan.worker_id, component))
        } else {
            dc
        }
    }
}

/// First pair of local indices at which `prev` (from its first kept MCU on)
/// and `scan` start an MCU at the same bit position.
fn first_shared_position(prev: &WorkerScan, prev_skip: usize, scan: &WorkerScan) -> Option<(usize, usize)> {
    let (mut a, mut b) = (prev_skip, 0);
    while a <= prev.num_mcus() && b < scan.num_mcus() {
        let (pa, pb) = (prev.position(a), scan.positions[b]);
        match pa.cmp(&pb) {
            std::cmp::Ordering::Equal => return Some((a, b)),
            std::cmp::Ordering::Less => a += 1,
            std::cmp::Ordering::Greater => b += 1,
        }
    }
    None
}

fn first_reset_after(scan: &WorkerScan, skip: usize) -> usize {
    scan.resets
        .iter()
        .copied()
        .find(|&r| r > skip)
        .unwrap_or(usize::MAX)
}

/// Keeps every MCU of `chain` from `part.skip` on.
fn keep_rest(part: &mut WorkerPartition, chain: &WorkerScan) {
    part.mcu_end_index = part.mcu_start_index + chain.num_mcus().saturating_sub(part.skip);
    part.offset_until = first_reset_after(chain, part.skip);
}

/// Assigns every decoded MCU to exactly one worker and computes the DC
/// offsets that turn worker-local DC values into true ones. Pure function of
/// its inputs.
///
/// In byte-scan mode a worker's chain is joined to the previous kept chain
/// at their first shared MCU position. When the two never meet, the
/// previous chain is decoded further until it reaches one of the worker's
/// MCU positions. A chain it passes without meeting is dropped, and the
/// last kept chain is continued to the end of the image if needed.
pub fn reconcile<S: Borrow<WorkerScan>>(
    data: &[u8],
    ctx: &DecodeContext,
    scans: &[S],
) -> Result<Reconciliation> {
    let scans: Vec<&WorkerScan> = scans.iter().map(Borrow::<WorkerScan>::borrow).collect();
    let mut chains: Vec<Cow<WorkerScan>> = scans.iter().map(|&s| Cow::Borrowed(s)).collect();
    let total = ctx.total_mcus();
    let last_blocks = ctx.last_blocks();
    let mut partitions: Vec<WorkerPartition> = scans
        .iter()
        .map(|s| WorkerPartition {
            worker_id: s.worker_id,
            byte_start: s.byte_start,
            byte_end: s.byte_end,
            mcu_start_index: 0,
            mcu_end_index: 0,
            skip: 0,
            offset_until: 0,
        })
        .collect();
    let mut offsets = vec![[0i32; MAX_COMPONENTS]; scans.len()];
    let mut prev: Option<usize> = None;
    for (w, &scan) in scans.iter().enumerate() {
        if scan.byte_start >= scan.byte_end {
            continue;
        }
        if let Some(g) = scan.first_mcu {
            if scan.num_mcus() == 0 {
                continue;
            }
            let expected = prev.map_or(0, |p| partitions[p].mcu_end_index);
            if g != expected {
                return Err(Error::MissingMcus(expected, g));
            }
            let part = &mut partitions[w];
            part.mcu_start_index = g;
            keep_rest(part, scan);
            prev = Some(w);
            continue;
        }
        if ctx.partition_mode == PartitionMode::RestartAligned
            || !scan.synced
            || scan.num_mcus() == 0
        {
            continue;
        }
        let Some(p) = prev else {
            return Err(Error::ResyncFailed {
                worker: w,
                previous: w,
            });
        };
        let mut shared = first_shared_position(&chains[p], partitions[p].skip, scan);
        if shared.is_none() {
            let prev_chain = &chains[p];
            if prev_chain.reached_end {
                trace!(worker = w, "previous worker already decoded to the end");
                break;
            }
            if let Some(error) = &prev_chain.stopped_by {
                return Err(error.clone());
            }
            let max_mcus = partitions[p].skip + total.saturating_sub(partitions[p].mcu_start_index);
            let continued = extend_scan(data, ctx, prev_chain, &scan.positions, max_mcus)?;
            debug!(
                worker = p,
                from = prev_chain.num_mcus(),
                to = continued.num_mcus(),
                next = w,
                "continued chain"
            );
            shared = first_shared_position(&continued, partitions[p].skip, scan);
            keep_rest(&mut partitions[p], &continued);
            chains[p] = Cow::Owned(continued);
        }
        let Some((a, b)) = shared else {
            if chains[p].reached_end {
                break;
            }
            trace!(worker = w, "chain never joined the previous one");
            continue;
        };
        let prev_chain: &WorkerScan = &chains[p];
        let prev_part = &mut partitions[p];
        prev_part.mcu_end_index = prev_part.mcu_start_index + (a - prev_part.skip);
        let start = prev_part.mcu_end_index;
        for c in 0..ctx.num_components() {
            let true_pred = if prev_chain.is_reset(a) {
                0
            } else if a < prev_part.offset_until {
                prev_chain
                    .local_predictor(a, last_blocks[c])
                    .wrapping_add(offsets[p][c])
            } else {
                prev_chain.local_predictor(a, last_blocks[c])
            };
            offsets[w][c] = true_pred.wrapping_sub(scan.local_predictor(b, last_blocks[c]));
        }
        let part = &mut partitions[w];
        part.skip = b;
        part.mcu_start_index = start;
        keep_rest(part, scan);
        trace!(worker = w, a, b, start, offsets = ?offsets[w], "reconciled boundary");
        prev = Some(w);
    }
    if let Some(p) = prev {
        let chain = &chains[p];
        if ctx.partition_mode == PartitionMode::ByteScan
            && partitions[p].mcu_end_index < total
            && !chain.reached_end
        {
            if let Some(error) = &chain.stopped_by {
                return Err(error.clone());
            }
            let max_mcus = partitions[p].skip + total.saturating_sub(partitions[p].mcu_start_index);
            let continued = extend_scan(data, ctx, chain, &[], max_mcus)?;
            debug!(worker = p, from = chain.num_mcus(), to = continued.num_mcus(), "continued chain to the end");
            keep_rest(&mut partitions[p], &continued);
            chains[p] = Cow::Owned(continued);
        }
    }
    let decoded = prev.map_or(0, |p| partitions[p].mcu_end_index);
    if decoded < total {
        return Err(Error::MissingMcus(decoded, total));
    }
    if decoded > total {
        return Err(Error::TrailingEntropyData);
    }
    // Workers that kept nothing get an empty range at the right place.
    let mut end = 0;
    for part in partitions.iter_mut() {
        if part.mcu_end_index > part.mcu_start_index {
            end = part.mcu_end_index;
        } else {
            part.mcu_start_index = end;
            part.mcu_end_index = end;
            part.skip = 0;
        }
    }
    debug!(
        ranges = ?partitions
            .iter()
            .map(|p| p.mcu_start_index..p.mcu_end_index)
            .collect::<Vec<_>>(),
        "reconciled partitions"
    );
    let continued = chains
        .into_iter()
        .enumerate()
        .filter_map(|(w, chain)| match chain {
            Cow::Owned(chain) => Some((w, chain)),
            Cow::Borrowed(_) => None,
        })
        .collect();
    Ok(Reconciliation {
        partitions,
        offsets: DcOffsetTable { offsets },
        continued,
    })
}

#[cfg(test)]
mod tests {
    use arbtest::arbtest;
    use lockstep_jpeg_test_utils::{EncoderOptions, encode, noise_image};
    use test_log::test;

    use super::*;
    use crate::{
        entropy_coding::scan::decode_worker_scan, headers::markers::parse,
        partition::PartitionStrategy,
    };

    fn gray_context(mcus: usize) -> (Vec<u8>, DecodeContext) {
        let pixels = vec![128; mcus * 64];
        let data = encode(&pixels, mcus * 8, 8, &EncoderOptions::default());
        let ctx = parse(&data, 2, PartitionStrategy::ByteScan).unwrap();
        (data, ctx)
    }

    fn scan(worker: usize, first: Option<usize>, positions: &[u64], end: u64, dc: &[i32]) -> WorkerScan {
        WorkerScan {
            worker_id: worker,
            byte_start: worker * 10,
            byte_end: worker * 10 + 10,
            first_mcu: first,
            positions: positions.to_vec(),
            end_position: end,
            blocks_per_mcu: 1,
            coefficients: vec![[0; 64]; dc.len()],
            dc: dc.to_vec(),
            synced: true,
            ..Default::default()
        }
    }

    /// Byte-scan worker scans of `data`, and the single-worker scan.
    fn byte_scans(data: &[u8], workers: usize) -> (DecodeContext, Vec<WorkerScan>, WorkerScan) {
        let ctx = parse(data, workers, PartitionStrategy::ByteScan).unwrap();
        let scans = (0..workers)
            .map(|w| decode_worker_scan(data, &ctx, w).unwrap())
            .collect();
        let single_ctx = parse(data, 1, PartitionStrategy::ByteScan).unwrap();
        let single = decode_worker_scan(data, &single_ctx, 0).unwrap();
        (ctx, scans, single)
    }

    /// Positions and true DC values of the kept MCUs, in image order.
    fn kept(ctx: &DecodeContext, scans: &[WorkerScan], rec: &Reconciliation) -> (Vec<u64>, Vec<i32>) {
        let mut positions = Vec::new();
        let mut dc = Vec::new();
        for scan in scans {
            let chain = rec.scan_for(scan);
            for mcu in rec.partitions[scan.worker_id].local_mcus() {
                positions.push(chain.positions[mcu]);
                for (block, (c, _)) in ctx.mcu_layout().enumerate() {
                    dc.push(rec.corrected_dc(chain, mcu, block, c));
                }
            }
        }
        (positions, dc)
    }

    /// The first `k` MCUs of `scan`, as if it had stopped there.
    fn truncated(scan: &WorkerScan, k: usize) -> WorkerScan {
        let mut t = scan.clone();
        t.end_position = t.positions[k];
        t.positions.truncate(k);
        t.coefficients.truncate(k * t.blocks_per_mcu);
        t.dc.truncate(k * t.blocks_per_mcu);
        t.resets.retain(|&r| r <= k);
        t.reached_end = false;
        t.stopped_by = None;
        t
    }

    #[test]
    fn offsets_continue_the_dc_chain() {
        let (data, ctx) = gray_context(6);
        let first = scan(0, Some(0), &[0, 10, 20, 30], 40, &[5, 7, 6, 9]);
        // The second worker decodes from position 20 with a zero predictor:
        // true values 6, 9, 11, 12 become -1, 2, 4, 5.
        let second = scan(1, None, &[20, 30, 40, 50], 60, &[-1, 2, 4, 5]);
        let scans = [first, second];
        let rec = reconcile(&data, &ctx, &scans).unwrap();
        assert_eq!(rec.partitions[0].local_mcus(), 0..2);
        assert_eq!(rec.partitions[1].local_mcus(), 0..4);
        assert_eq!(rec.partitions[1].mcu_start_index, 2);
        assert_eq!(rec.offsets.get(1, 0), 7);
        assert!(rec.continued.is_empty());
        let dc: Vec<_> = (0..4).map(|i| rec.corrected_dc(&scans[1], i, 0, 0)).collect();
        assert_eq!(dc, [6, 9, 11, 12]);
    }

    #[test]
    fn offset_stops_at_restart() {
        let (data, ctx) = gray_context(6);
        let first = scan(0, Some(0), &[0, 10, 20, 30], 40, &[5, 7, 6, 9]);
        let mut second = scan(1, None, &[5, 20, 30, 40, 50], 60, &[3, -1, 2, 4, 5]);
        second.resets = vec![3];
        let scans = [first, second];
        let rec = reconcile(&data, &ctx, &scans).unwrap();
        assert_eq!(rec.partitions[1].skip, 1);
        assert_eq!(rec.offsets.get(1, 0), 7 - 3);
        let dc: Vec<_> = (1..5).map(|i| rec.corrected_dc(&scans[1], i, 0, 0)).collect();
        assert_eq!(dc, [3, 6, 4, 5]);
    }

    #[test]
    fn error_after_the_previous_chain_is_reported() {
        let (data, ctx) = gray_context(6);
        let mut first = scan(0, Some(0), &[0, 10], 20, &[5, 7]);
        first.stopped_by = Some(Error::InvalidHuffmanCode(3));
        let second = scan(1, None, &[25, 30, 40, 50], 60, &[0, 0, 0, 0]);
        assert_eq!(
            reconcile(&data, &ctx, &[first, second]).unwrap_err(),
            Error::InvalidHuffmanCode(3)
        );
    }

    #[test]
    fn chain_without_predecessor_fails() {
        let (data, ctx) = gray_context(6);
        let mut first = scan(0, Some(0), &[], 0, &[]);
        first.byte_end = first.byte_start;
        let second = scan(1, None, &[25, 30, 40, 50], 60, &[0, 0, 0, 0]);
        let err = reconcile(&data, &ctx, &[first, second]).unwrap_err();
        assert_eq!(
            err,
            Error::ResyncFailed {
                worker: 1,
                previous: 1
            }
        );
        assert_eq!(err.kind(), crate::error::ErrorKind::PartitionResync);
    }

    #[test]
    fn missing_mcus() {
        let (data, ctx) = gray_context(6);
        let mut first = scan(0, Some(0), &[0, 10, 20, 30], 40, &[5, 7, 6, 9]);
        first.reached_end = true;
        assert_eq!(
            reconcile(&data, &ctx, &[first]).unwrap_err(),
            Error::MissingMcus(4, 6)
        );
    }

    #[test]
    fn previous_chain_is_continued_to_meet_the_next() {
        let (w, h) = (128, 64);
        let pixels = noise_image(w, h, 1, 24);
        let data = encode(&pixels, w, h, &EncoderOptions::default());
        let (ctx, mut scans, single) = byte_scans(&data, 3);
        // Cut the first chain well before the second one starts.
        let next = scans[1].positions[0];
        let meets = scans[0].positions.iter().position(|&p| p >= next).unwrap();
        scans[0] = truncated(&scans[0], meets / 2);
        let rec = reconcile(&data, &ctx, &scans).unwrap();
        assert!(rec.continued.contains_key(&0));
        assert!(rec.scan_for(&scans[0]).num_mcus() > meets / 2);
        assert_eq!(kept(&ctx, &scans, &rec), (single.positions, single.dc));
    }

    #[test]
    fn unjoined_chain_is_dropped() {
        let (w, h) = (96, 64);
        let pixels = noise_image(w, h, 1, 25);
        let data = encode(&pixels, w, h, &EncoderOptions::default());
        let (ctx, mut scans, single) = byte_scans(&data, 2);
        scans[0] = truncated(&scans[0], 3);
        // One bit off every true boundary, so never shared.
        for p in scans[1].positions.iter_mut() {
            *p += 1;
        }
        scans[1].end_position += 1;
        let rec = reconcile(&data, &ctx, &scans).unwrap();
        assert_eq!(rec.partitions[1].num_mcus(), 0);
        assert_eq!(rec.partitions[0].num_mcus(), ctx.total_mcus());
        assert_eq!(kept(&ctx, &scans, &rec), (single.positions, single.dc));
    }

    #[test]
    fn high_quality_gray_partitions() {
        let (w, h) = (64, 64);
        let pixels = noise_image(w, h, 1, 26);
        let options = EncoderOptions {
            quality: 100,
            ..Default::default()
        };
        let data = encode(&pixels, w, h, &options);
        for workers in [2, 5, 9, 16] {
            let (ctx, scans, single) = byte_scans(&data, workers);
            let rec = reconcile(&data, &ctx, &scans).unwrap();
            assert_eq!(
                kept(&ctx, &scans, &rec),
                (single.positions.clone(), single.dc.clone()),
                "{workers} workers"
            );
        }
    }

    #[test]
    fn byte_scan_chains_cover_the_image() {
        arbtest(|u| {
            let w = u.int_in_range(1..=12usize)? * 8;
            let h = u.int_in_range(1..=8usize)? * 8;
            let options = EncoderOptions {
                quality: u.int_in_range(50..=100u8)?,
                ..Default::default()
            };
            let workers = u.int_in_range(2..=24usize)?;
            let seed = u.arbitrary::<u64>()?;
            let data = encode(&noise_image(w, h, 1, seed), w, h, &options);
            let (ctx, scans, single) = byte_scans(&data, workers);
            let rec = reconcile(&data, &ctx, &scans).unwrap();
            assert_eq!(kept(&ctx, &scans, &rec), (single.positions, single.dc));
            Ok(())
        });
    }

    #[test]
    fn idempotent() {
        let (w, h) = (96, 64);
        let pixels = noise_image(w, h, 1, 11);
        let data = encode(&pixels, w, h, &EncoderOptions::default());
        let ctx = parse(&data, 5, PartitionStrategy::ByteScan).unwrap();
        let scans: Vec<_> = (0..5)
            .map(|i| decode_worker_scan(&data, &ctx, i).unwrap())
            .collect();
        let first = reconcile(&data, &ctx, &scans).unwrap();
        let second = reconcile(&data, &ctx, &scans).unwrap();
        assert_eq!(first, second);
        let kept: usize = first.partitions.iter().map(WorkerPartition::num_mcus).sum();
        assert_eq!(kept, ctx.total_mcus());
    }
}

// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use std::sync::OnceLock;

use super::barrier::{Phase, PhaseBarrier};
use crate::{
    api::DecodeOptions,
    entropy_coding::scan::{WorkerScan, decode_worker_scan},
    error::{Error, Result},
    headers::{context::DecodeContext, markers::parse},
    reconcile::{Reconciliation, reconcile},
    render::{
        crop::{Fragment, OutputGeometry, crop_tile},
        tiles::render_tiles,
    },
    stats::ChannelSums,
    util::tracing_wrappers::*,
};

pub const LEADER: usize = 0;

/// State shared by the workers of one decode. Every slot is written once,
/// by a single worker, and read by others only after the following barrier.
pub struct SharedState<'a> {
    pub data: &'a [u8],
    pub options: &'a DecodeOptions,
    pub barrier: PhaseBarrier,
    pub context: OnceLock<DecodeContext>,
    pub geometry: OnceLock<OutputGeometry>,
    pub scans: Vec<OnceLock<WorkerScan>>,
    pub reconciliation: OnceLock<Reconciliation>,
    pub partial_sums: Vec<OnceLock<ChannelSums>>,
    pub sums: OnceLock<ChannelSums>,
}

/// Reads a slot published before the last barrier.
fn published<T>(slot: &OnceLock<T>) -> Result<&T> {
    slot.get().ok_or(Error::Aborted)
}

impl<'a> SharedState<'a> {
    pub fn new(data: &'a [u8], options: &'a DecodeOptions) -> Self {
        let n = options.num_workers;
        SharedState {
            data,
            options,
            barrier: PhaseBarrier::new(n),
            context: OnceLock::new(),
            geometry: OnceLock::new(),
            scans: (0..n).map(|_| OnceLock::new()).collect(),
            reconciliation: OnceLock::new(),
            partial_sums: (0..n).map(|_| OnceLock::new()).collect(),
            sums: OnceLock::new(),
        }
    }

    fn parse_markers(&self) -> Result<()> {
        let ctx = parse(
            self.data,
            self.options.num_workers,
            self.options.partition_strategy,
        )?;
        if let Some(limit) = self.options.pixel_limit {
            if ctx.width * ctx.height > limit {
                return Err(Error::ImageTooLarge(ctx.width, ctx.height, limit));
            }
        }
        let geometry = OutputGeometry::new(
            self.options.crop,
            self.options.flip_horizontal,
            ctx.width,
            ctx.height,
        )?;
        let _ = self.geometry.set(geometry);
        let _ = self.context.set(ctx);
        Ok(())
    }

    fn reconcile_scans(&self, ctx: &DecodeContext) -> Result<()> {
        let scans = self
            .scans
            .iter()
            .map(published)
            .collect::<Result<Vec<_>>>()?;
        let _ = self.reconciliation.set(reconcile(self.data, ctx, &scans)?);
        Ok(())
    }

    fn aggregate_sums(&self) -> Result<()> {
        let total = self
            .partial_sums
            .iter()
            .map(|s| published(s).copied())
            .sum::<Result<ChannelSums>>()?;
        let _ = self.sums.set(total);
        Ok(())
    }

    pub fn sums(&self) -> Result<ChannelSums> {
        published(&self.sums).copied()
    }

    pub fn geometry(&self) -> Result<OutputGeometry> {
        published(&self.geometry).copied()
    }
}

/// Runs every phase of the decode as worker `id` and returns the output
/// fragments it produced.
pub fn run_worker(shared: &SharedState, id: usize) -> Result<Vec<Fragment>> {
    let barrier = &shared.barrier;
    let is_leader = id == LEADER;

    barrier.run_phase(Phase::MarkersParsed, id, || {
        if is_leader {
            shared.parse_markers()?;
        }
        Ok(())
    })?;
    let ctx = published(&shared.context)?;
    let geometry = published(&shared.geometry)?;

    barrier.run_phase(Phase::EntropyDecoded, id, || {
        let scan = decode_worker_scan(shared.data, ctx, id)?;
        let _ = shared.scans[id].set(scan);
        Ok(())
    })?;

    barrier.run_phase(Phase::DcReconciled, id, || {
        if is_leader {
            shared.reconcile_scans(ctx)?;
        }
        Ok(())
    })?;
    let reconciliation = published(&shared.reconciliation)?;
    let scan = reconciliation.scan_for(published(&shared.scans[id])?);

    let tiles = barrier.run_phase(Phase::Transformed, id, || {
        render_tiles(ctx, scan, reconciliation)
    })?;

    let fragments = barrier.run_phase(Phase::CropScaled, id, || {
        Ok(tiles
            .iter()
            .filter_map(|tile| crop_tile(ctx, geometry, tile))
            .collect::<Vec<_>>())
    })?;
    drop(tiles);

    barrier.run_phase(Phase::Reduced, id, || {
        let _ = shared.partial_sums[id].set(ChannelSums::from_fragments(&fragments));
        Ok(())
    })?;
    if is_leader {
        shared.aggregate_sums()?;
    }
    trace!(worker = id, fragments = fragments.len(), "worker done");
    Ok(fragments)
}

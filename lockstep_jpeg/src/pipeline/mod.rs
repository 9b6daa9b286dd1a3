// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! The decode pipeline: a fixed set of workers that move through the
//! phases in lockstep, separated by barriers.

pub mod barrier;
pub mod pool;
pub mod worker;

use crate::{
    api::DecodeOptions,
    error::Result,
    render::crop::{Fragment, OutputGeometry},
    stats::ChannelSums,
    util::tracing_wrappers::*,
};
use worker::{SharedState, run_worker};

/// Everything the workers produced for one image.
pub struct PipelineOutput {
    pub geometry: OutputGeometry,
    pub fragments: Vec<Fragment>,
    pub sums: ChannelSums,
}

/// Decodes `data` with `options.num_workers` workers. Either every phase
/// completes on every worker, or the first error any worker hit is returned
/// and no output is produced.
pub fn run(data: &[u8], options: &DecodeOptions) -> Result<PipelineOutput> {
    let shared = SharedState::new(data, options);
    let results = pool::run_workers(options.num_workers, |id| run_worker(&shared, id))?;
    if let Some(error) = shared.barrier.take_error() {
        debug!(%error, "decode failed");
        return Err(error);
    }
    let mut fragments = Vec::new();
    for result in results {
        fragments.extend(result?);
    }
    let geometry = shared.geometry()?;
    let sums = shared.sums()?;
    Ok(PipelineOutput {
        geometry,
        fragments,
        sums,
    })
}

// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use std::sync::{
    Barrier, Mutex, PoisonError,
    atomic::{AtomicUsize, Ordering},
};

use crate::{
    error::{Error, Result},
    util::tracing_wrappers::*,
};

/// Synchronization points between the phases of a decode, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    MarkersParsed,
    EntropyDecoded,
    DcReconciled,
    Transformed,
    CropScaled,
    Reduced,
}

impl Phase {
    pub const ALL: [Phase; 6] = [
        Phase::MarkersParsed,
        Phase::EntropyDecoded,
        Phase::DcReconciled,
        Phase::Transformed,
        Phase::CropScaled,
        Phase::Reduced,
    ];
}

const NOT_ABORTED: usize = usize::MAX;

/// All-to-all barrier shared by the workers of one decode, with a sticky
/// abort. Workers that fail still arrive at the barrier, so every worker
/// leaves the decode at the same phase.
///
/// An abort raised during a phase is reported by the barrier that ends
/// that phase and by no earlier one, so a worker that is still leaving the
/// previous barrier goes on to meet the others at the next one.
pub struct PhaseBarrier {
    barrier: Barrier,
    /// Index of the earliest phase in which a worker aborted.
    abort_phase: AtomicUsize,
    first_error: Mutex<Option<Error>>,
}

impl PhaseBarrier {
    pub fn new(num_workers: usize) -> PhaseBarrier {
        PhaseBarrier {
            barrier: Barrier::new(num_workers),
            abort_phase: AtomicUsize::new(NOT_ABORTED),
            first_error: Mutex::new(None),
        }
    }

    /// Records `error` if it is the first one and aborts the decode at the
    /// end of `phase`.
    pub fn abort(&self, phase: Phase, error: Error) {
        let mut first = self
            .first_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if first.is_none() {
            debug!(%error, ?phase, "aborting decode");
            *first = Some(error);
        }
        self.abort_phase.fetch_min(phase as usize, Ordering::AcqRel);
    }

    /// The phase at whose barrier the decode stops, if any worker aborted.
    pub fn aborted_at(&self) -> Option<Phase> {
        Phase::ALL
            .get(self.abort_phase.load(Ordering::Acquire))
            .copied()
    }

    /// Blocks until every worker reached the end of `phase`. Fails if any
    /// worker aborted during `phase` or earlier.
    #[cfg_attr(not(feature = "tracing"), allow(unused_variables))]
    pub fn wait(&self, phase: Phase, worker: usize) -> Result<()> {
        self.barrier.wait();
        trace!(worker, ?phase, "passed barrier");
        match self.aborted_at() {
            Some(aborted) if aborted <= phase => Err(Error::Aborted),
            _ => Ok(()),
        }
    }

    /// Runs `step` and then waits for `phase`. An error from `step` aborts
    /// every worker at this barrier.
    pub fn run_phase<T>(
        &self,
        phase: Phase,
        worker: usize,
        step: impl FnOnce() -> Result<T>,
    ) -> Result<T> {
        let result = step();
        if let Err(e) = &result {
            self.abort(phase, e.clone());
        }
        self.wait(phase, worker)?;
        result
    }

    /// The first error reported by any worker.
    pub fn take_error(&self) -> Option<Error> {
        self.first_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

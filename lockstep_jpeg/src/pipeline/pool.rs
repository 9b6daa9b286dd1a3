// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use crate::error::Result;
#[cfg(feature = "parallel")]
use crate::error::Error;

/// Runs `worker(id)` for every id in `0..num_workers`, each on its own
/// thread so that all of them can wait at the same barrier. Results are
/// returned in id order.
#[cfg(feature = "parallel")]
pub fn run_workers<T: Send>(num_workers: usize, worker: impl Fn(usize) -> T + Sync) -> Result<Vec<T>> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(num_workers)
        .thread_name(|i| format!("lockstep-worker-{i}"))
        .build()
        .map_err(|e| Error::WorkerPool(e.to_string()))?;
    Ok(pool.broadcast(|ctx| worker(ctx.index())))
}

#[cfg(not(feature = "parallel"))]
pub fn run_workers<T: Send>(num_workers: usize, worker: impl Fn(usize) -> T + Sync) -> Result<Vec<T>> {
    let worker = &worker;
    Ok(std::thread::scope(|s| {
        let handles: Vec<_> = (0..num_workers)
            .map(|id| s.spawn(move || worker(id)))
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().unwrap_or_else(|e| std::panic::resume_unwind(e)))
            .collect()
    }))
}

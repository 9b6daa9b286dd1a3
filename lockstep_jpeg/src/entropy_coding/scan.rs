// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use super::{
    block::{CoefficientBlock, ScanTables, decode_mcu},
    resync::find_sync,
};
use crate::{
    BLOCK_SIZE,
    bit_reader::{BitReader, Boundary},
    error::{Error, Result},
    headers::{
        context::{DecodeContext, MAX_COMPONENTS, PartitionMode},
        markers::{RST0, is_restart},
    },
    partition::{byte_range, first_owned_segment},
    util::tracing_wrappers::*,
};

/// Everything one worker decoded from the entropy-coded data.
///
/// DC values are worker-local: they accumulate differences starting from a
/// zero predictor at the first decoded MCU and at every restart marker.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkerScan {
    pub worker_id: usize,
    pub byte_start: usize,
    pub byte_end: usize,
    /// Global index of the first decoded MCU, when known without
    /// reconciliation.
    pub first_mcu: Option<usize>,
    /// Bit position at which each decoded MCU starts.
    pub positions: Vec<u64>,
    /// Bit position following the last decoded MCU and any restart marker
    /// consumed after it.
    pub end_position: u64,
    pub blocks_per_mcu: usize,
    /// Quantized coefficients in zig-zag order. The DC term lives in `dc`.
    pub coefficients: Vec<CoefficientBlock>,
    pub dc: Vec<i32>,
    /// Local MCU indices at which a restart marker reset the predictors.
    pub resets: Vec<usize>,
    /// Whether an MCU boundary was found in the worker's byte range.
    pub synced: bool,
    /// Whether decoding stopped at the end of the entropy-coded data.
    pub reached_end: bool,
    /// Error that stopped decoding inside the overlap with the next worker.
    pub stopped_by: Option<Error>,
}

impl WorkerScan {
    pub fn new(worker_id: usize, byte_start: usize, byte_end: usize, blocks_per_mcu: usize) -> Self {
        WorkerScan {
            worker_id,
            byte_start,
            byte_end,
            blocks_per_mcu,
            ..Default::default()
        }
    }

    pub fn num_mcus(&self) -> usize {
        self.positions.len()
    }

    /// Start position of local MCU `i`; `num_mcus()` maps to the end
    /// position.
    pub fn position(&self, i: usize) -> u64 {
        self.positions.get(i).copied().unwrap_or(self.end_position)
    }

    pub fn is_reset(&self, i: usize) -> bool {
        self.resets.binary_search(&i).is_ok()
    }

    /// Local DC predictor before local MCU `mcu` of the component whose
    /// last data unit within an MCU is `last_block`.
    pub fn local_predictor(&self, mcu: usize, last_block: usize) -> i32 {
        if mcu == 0 || self.is_reset(mcu) {
            0
        } else {
            self.mcu_dc(mcu - 1)[last_block]
        }
    }

    /// Forgets every decoded MCU, keeping the byte range.
    fn clear_chain(&mut self) {
        *self = WorkerScan::new(self.worker_id, self.byte_start, self.byte_end, self.blocks_per_mcu);
    }

    pub fn mcu_blocks(&self, i: usize) -> &[CoefficientBlock] {
        &self.coefficients[i * self.blocks_per_mcu..(i + 1) * self.blocks_per_mcu]
    }

    pub fn mcu_dc(&self, i: usize) -> &[i32] {
        &self.dc[i * self.blocks_per_mcu..(i + 1) * self.blocks_per_mcu]
    }

    fn push_mcu(
        &mut self,
        br: &mut BitReader,
        tables: &ScanTables,
        preds: &mut [i32],
    ) -> Result<()> {
        let start = br.position();
        let len = self.dc.len();
        self.coefficients
            .resize(len + self.blocks_per_mcu, [0; BLOCK_SIZE]);
        self.dc.resize(len + self.blocks_per_mcu, 0);
        if let Err(e) = decode_mcu(
            br,
            tables,
            preds,
            &mut self.coefficients[len..],
            &mut self.dc[len..],
            false,
        ) {
            self.coefficients.truncate(len);
            self.dc.truncate(len);
            return Err(e);
        }
        self.positions.push(start);
        Ok(())
    }
}

/// Whether only padding, and possibly one trailing restart marker, is left.
fn at_scan_end(br: &BitReader) -> bool {
    match br.boundary() {
        Boundary::End => true,
        Boundary::Marker(m) if is_restart(m) => {
            let mut br = br.clone();
            br.consume_marker();
            br.boundary() == Boundary::End
        }
        _ => false,
    }
}

/// Decodes the MCUs owned by `worker`.
pub fn decode_worker_scan(data: &[u8], ctx: &DecodeContext, worker: usize) -> Result<WorkerScan> {
    let tables = ScanTables::new(ctx)?;
    let range = byte_range(
        ctx.entropy_start..ctx.entropy_end,
        ctx.bytes_per_partition,
        worker,
    );
    let scan = WorkerScan::new(worker, range.start, range.end, tables.blocks_per_mcu());
    let scan = match ctx.partition_mode {
        PartitionMode::RestartAligned => decode_restart_aligned(data, ctx, &tables, scan)?,
        PartitionMode::ByteScan => decode_byte_scan(data, ctx, &tables, scan)?,
    };
    debug!(
        worker,
        byte_start = scan.byte_start,
        byte_end = scan.byte_end,
        first_mcu = ?scan.first_mcu,
        mcus = scan.num_mcus(),
        resets = scan.resets.len(),
        "decoded worker scan"
    );
    Ok(scan)
}

/// Decodes every restart segment starting inside the worker's byte range.
fn decode_restart_aligned(
    data: &[u8],
    ctx: &DecodeContext,
    tables: &ScanTables,
    mut scan: WorkerScan,
) -> Result<WorkerScan> {
    let Some((segment, start)) = first_owned_segment(data, ctx, scan.byte_start..scan.byte_end)
    else {
        return Ok(scan);
    };
    let interval = ctx.restart_interval;
    let total = ctx.total_mcus();
    let first = segment * interval;
    if first >= total {
        return Err(Error::TrailingEntropyData);
    }
    scan.first_mcu = Some(first);
    scan.synced = true;
    scan.resets.push(0);
    let mut br = BitReader::new(data, start, ctx.entropy_end);
    let mut preds = [0i32; MAX_COMPONENTS];
    let mut mcu = first;
    loop {
        if mcu == total {
            if !at_scan_end(&br) {
                return Err(Error::TrailingEntropyData);
            }
            scan.reached_end = true;
            break;
        }
        if mcu != first && mcu % interval == 0 {
            let expected = ((mcu / interval - 1) % 8) as u8;
            match br.consume_marker() {
                Some(m) if m == RST0 + expected => {}
                Some(found) => return Err(Error::RestartMismatch { expected, found }),
                None => return Err(Error::MissingRestartMarker(mcu)),
            }
            preds = [0; MAX_COMPONENTS];
            scan.resets.push(mcu - first);
            if br.byte_position() >= scan.byte_end {
                break;
            }
        }
        scan.push_mcu(&mut br, tables, &mut preds)?;
        mcu += 1;
    }
    scan.end_position = br.position();
    Ok(scan)
}

/// Why [`follow_chain`] returned.
enum ChainEnd {
    /// The next MCU would start at the limit or at a target.
    Stopped,
    /// The entropy-coded data or the image ended.
    ReachedEnd,
    /// The MCU starting at byte `at` failed to decode. The reader is left
    /// at its start.
    Failed { at: usize, error: Error },
}

/// Where [`follow_chain`] stops starting new MCUs.
struct ChainStop<'t> {
    /// Bit position at or past which no MCU is started.
    limit: u64,
    /// Number of MCUs after which only the end of the scan may follow.
    max_mcus: Option<usize>,
    /// Sorted bit positions at which another chain takes over.
    targets: &'t [u64],
}

/// Decodes MCUs from `br` into `scan` until `stop` or the data says
/// otherwise. Restart markers between MCUs are consumed and reset `preds`.
fn follow_chain(
    scan: &mut WorkerScan,
    br: &mut BitReader,
    tables: &ScanTables,
    preds: &mut [i32; MAX_COMPONENTS],
    stop: &ChainStop,
) -> Result<ChainEnd> {
    loop {
        if stop.max_mcus.is_some_and(|max| scan.num_mcus() >= max) {
            if !at_scan_end(br) {
                return Err(Error::TrailingEntropyData);
            }
            return Ok(ChainEnd::ReachedEnd);
        }
        match br.boundary() {
            Boundary::Marker(m) if is_restart(m) => {
                br.consume_marker();
                *preds = [0; MAX_COMPONENTS];
                scan.resets.push(scan.num_mcus());
                continue;
            }
            Boundary::Marker(_) | Boundary::End => return Ok(ChainEnd::ReachedEnd),
            Boundary::Data => {}
        }
        let position = br.position();
        if position >= stop.limit || stop.targets.binary_search(&position).is_ok() {
            return Ok(ChainEnd::Stopped);
        }
        let before = br.clone();
        if let Err(error) = scan.push_mcu(br, tables, preds) {
            let at = before.byte_position();
            *br = before;
            return Ok(ChainEnd::Failed { at, error });
        }
    }
}

/// Decodes from the first MCU boundary found in the worker's byte range
/// until one partition past its end, so that consecutive workers usually
/// share an MCU boundary.
///
/// A chain that fails inside the worker's own range started on a false
/// boundary, or ran into corrupt data. It is dropped and the search resumes
/// one bit after the position it started from. A later chain that reaches
/// any MCU position of a dropped one is dropped as well, since it would
/// fail the same way. A failure past the range is kept in `stopped_by` for
/// reconciliation.
fn decode_byte_scan(
    data: &[u8],
    ctx: &DecodeContext,
    tables: &ScanTables,
    mut scan: WorkerScan,
) -> Result<WorkerScan> {
    if scan.byte_start >= scan.byte_end {
        return Ok(scan);
    }
    let limit = if scan.byte_end >= ctx.entropy_end {
        u64::MAX
    } else {
        (scan.byte_end + ctx.bytes_per_partition).min(ctx.entropy_end) as u64 * 8
    };
    if scan.worker_id == 0 {
        scan.first_mcu = Some(0);
        scan.synced = true;
        let stop = ChainStop {
            limit,
            max_mcus: Some(ctx.total_mcus()),
            targets: &[],
        };
        let mut br = BitReader::new(data, ctx.entropy_start, ctx.entropy_end);
        match follow_chain(&mut scan, &mut br, tables, &mut [0; MAX_COMPONENTS], &stop)? {
            ChainEnd::Failed { error, .. } => return Err(error),
            ChainEnd::ReachedEnd => scan.reached_end = true,
            ChainEnd::Stopped => {}
        }
        scan.end_position = br.position();
        return Ok(scan);
    }

    // Sorted MCU positions of dropped chains.
    let mut dropped: Vec<u64> = Vec::new();
    let mut search_from = scan.byte_start as u64 * 8;
    while let Some(mut br) = find_sync(data, ctx, tables, search_from, scan.byte_end) {
        let candidate = br.position();
        scan.clear_chain();
        let stop = ChainStop {
            limit,
            max_mcus: None,
            targets: &dropped,
        };
        let broken = match follow_chain(&mut scan, &mut br, tables, &mut [0; MAX_COMPONENTS], &stop)? {
            ChainEnd::Failed { at, .. } if at < scan.byte_end => true,
            ChainEnd::Failed { error, .. } => {
                scan.stopped_by = Some(error);
                false
            }
            ChainEnd::ReachedEnd => {
                scan.reached_end = true;
                false
            }
            ChainEnd::Stopped => br.position() < limit,
        };
        if broken {
            trace!(worker = scan.worker_id, candidate, mcus = scan.num_mcus(), "dropping chain");
            dropped.extend_from_slice(&scan.positions);
            dropped.sort_unstable();
            dropped.dedup();
            search_from = candidate + 1;
            continue;
        }
        scan.synced = true;
        scan.end_position = br.position();
        return Ok(scan);
    }
    scan.clear_chain();
    Ok(scan)
}

/// Continues the chain of `scan` from its end position, as if the worker
/// had kept decoding. Stops before an MCU that would start at one of
/// `targets` or past the last of them, at the end of the data, or after
/// `max_mcus` local MCUs, where the image ends. Without targets the chain
/// runs to the end of the image.
pub fn extend_scan(
    data: &[u8],
    ctx: &DecodeContext,
    scan: &WorkerScan,
    targets: &[u64],
    max_mcus: usize,
) -> Result<WorkerScan> {
    let tables = ScanTables::new(ctx)?;
    let last_blocks = ctx.last_blocks();
    let mut preds = [0i32; MAX_COMPONENTS];
    for (c, pred) in preds.iter_mut().enumerate().take(ctx.num_components()) {
        *pred = scan.local_predictor(scan.num_mcus(), last_blocks[c]);
    }
    let mut scan = scan.clone();
    let end = scan.end_position;
    let mut br = BitReader::at_bit(data, (end / 8) as usize, (end % 8) as u32, ctx.entropy_end);
    let stop = ChainStop {
        limit: targets.last().map_or(u64::MAX, |&t| t + 1),
        max_mcus: Some(max_mcus),
        targets,
    };
    match follow_chain(&mut scan, &mut br, &tables, &mut preds, &stop)? {
        ChainEnd::Failed { error, .. } => return Err(error),
        ChainEnd::ReachedEnd => scan.reached_end = true,
        ChainEnd::Stopped => {}
    }
    scan.end_position = br.position();
    Ok(scan)
}

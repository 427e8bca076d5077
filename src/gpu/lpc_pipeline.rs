//! GPU build of the linearized point cloud.
//!
//! The build is two blocking submissions with a host scan between them:
//!
//! 1. sort: Morton assign, the bitonic network, reorder, mark heads, then a download
//!    of the head flags;
//! 2. host: exclusive scan of the flags, which fixes the unique voxel count;
//! 3. finalize: upload of the scan and uniforms, scatter, leaf init, internal nodes.
//!
//! Both recordings are built by plain functions so their command streams can be
//! inspected without a device.

use crate::error::{LpcError, Result};
use crate::gpu::buffers::BufferRole;
use crate::gpu::context::{GpuContext, Readbacks, cast_readback};
use crate::gpu::kernels::Kernel;
use crate::gpu::point_store::PointStore;
use crate::gpu::recorder::{PipelineStage, Recorder};
use crate::gpu::types::{BitonicParams, LpcUniforms};
use crate::lpc::LpcArrays;
use crate::lpc::bitonic;
use crate::lpc::scan::exclusive_scan;
use bytemuck::{bytes_of, cast_slice};
use std::time::{Duration, Instant};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LpcState {
    Idle,
    Sorting,
    AwaitingHostScan,
    Finalizing,
    Ready,
    /// The store held no points; nothing was recorded.
    Skipped,
    /// The last build returned an error; buffers are inconsistent until the next build.
    Failed,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LpcSummary {
    pub point_count: u32,
    pub unique_count: u32,
    pub internal_nodes: u32,
    pub bitonic_steps: usize,
    pub dispatches: usize,
    pub sort_time: Duration,
    pub scan_time: Duration,
    pub finalize_time: Duration,
}

impl LpcSummary {
    pub fn total_time(&self) -> Duration {
        self.sort_time + self.scan_time + self.finalize_time
    }
}

/// Record Morton assign through mark heads, ending with the head flag download.
pub fn record_sort_phase(rec: &mut Recorder, point_count: u32) -> Result<()> {
    use PipelineStage::{Compute, Transfer};

    if point_count == 0 {
        return Ok(());
    }
    rec.dispatch_items(Kernel::MortonAssign, point_count)?;
    rec.barrier(Compute, Compute);

    for step in bitonic::schedule(point_count) {
        let params = BitonicParams::new(step.j, step.k, point_count);
        rec.inline_update(BufferRole::BitonicParams, 0, bytes_of(&params))?;
        rec.barrier(Transfer, Compute);
        rec.dispatch_items(Kernel::BitonicSort, point_count)?;
        rec.barrier(Compute, Compute);
    }

    rec.dispatch_items(Kernel::Reorder, point_count)?;
    rec.barrier(Compute, Compute);
    rec.dispatch_items(Kernel::MarkHeads, point_count)?;
    rec.barrier(Compute, Transfer);
    rec.download(BufferRole::HeadFlags)
}

/// Record scatter through the internal node build for a finished host scan.
pub fn record_finalize_phase(
    rec: &mut Recorder,
    scanned: &[u32],
    uniforms: &LpcUniforms,
) -> Result<()> {
    use PipelineStage::{Compute, DrawIndirect, Transfer};

    let point_count = uniforms.point_count;
    if point_count == 0 {
        return Ok(());
    }
    let unique_count = uniforms.unique_count;

    rec.upload(BufferRole::ScannedIndices, cast_slice(scanned))?;
    rec.inline_update(BufferRole::LpcUniforms, 0, bytes_of(uniforms))?;
    rec.barrier(Transfer, Compute);
    rec.dispatch_items(Kernel::Scatter, point_count)?;
    rec.barrier(Compute, Compute);
    rec.dispatch_items(Kernel::InitLeaves, unique_count)?;
    rec.barrier(Compute, Compute);
    rec.dispatch_items(Kernel::BuildInternal, unique_count.saturating_sub(1))?;
    rec.barrier(Compute, DrawIndirect);
    Ok(())
}

/// Exclusive scan of the downloaded head flags.
///
/// Returns the scanned indices and `scanned[N-1] + flags[N-1]`, which is 0 for N = 0.
pub fn host_scan(flags: &[u32]) -> (Vec<u32>, u32) {
    exclusive_scan(flags)
}

fn downloaded<T: bytemuck::Pod>(readbacks: &Readbacks, role: BufferRole, len: usize) -> Result<Vec<T>> {
    let bytes = readbacks
        .get(&role)
        .ok_or_else(|| LpcError::Validation(format!("{role:?} was not downloaded")))?;
    let mut values = cast_readback::<T>(bytes);
    if values.len() < len {
        return Err(LpcError::Validation(format!(
            "{role:?} holds {} elements, expected {len}",
            values.len()
        )));
    }
    values.truncate(len);
    Ok(values)
}

#[derive(Debug)]
pub struct LpcPipeline {
    state: LpcState,
}

impl Default for LpcPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl LpcPipeline {
    pub fn new() -> Self {
        Self {
            state: LpcState::Idle,
        }
    }

    pub fn state(&self) -> LpcState {
        self.state
    }

    fn enter(&mut self, state: LpcState) {
        log::debug!("lpc build: {:?} -> {:?}", self.state, state);
        self.state = state;
    }

    /// Run the whole build, blocking until the tree is on the device.
    ///
    /// The store is borrowed mutably for the duration, so no culling frame can use
    /// the visible point buffer while it serves as reorder scratch. A failed build
    /// leaves the buffers inconsistent until the next successful one and the state
    /// at [`LpcState::Failed`].
    pub fn build(&mut self, ctx: &GpuContext, store: &mut PointStore) -> Result<LpcSummary> {
        let result = self.run_phases(ctx, store);
        self.settle(result)
    }

    fn settle<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            log::warn!("lpc build failed in {:?}: {e}", self.state);
            self.enter(LpcState::Failed);
        }
        result
    }

    fn run_phases(&mut self, ctx: &GpuContext, store: &mut PointStore) -> Result<LpcSummary> {
        let point_count = store.point_count();
        let Some(kernels) = store.kernels() else {
            self.enter(LpcState::Skipped);
            log::info!("lpc build skipped: no points");
            return Ok(LpcSummary::default());
        };
        let registry = store.registry();

        self.enter(LpcState::Sorting);
        let started = Instant::now();
        let mut sort = Recorder::for_registry(registry);
        record_sort_phase(&mut sort, point_count)?;
        let readbacks = ctx.submit_and_wait(&sort, kernels, registry)?;
        let sort_time = started.elapsed();

        self.enter(LpcState::AwaitingHostScan);
        let started = Instant::now();
        let flags: Vec<u32> = downloaded(&readbacks, BufferRole::HeadFlags, point_count as usize)?;
        let (scanned, unique_count) = host_scan(&flags);
        let uniforms = LpcUniforms::new(&store.bounds(), point_count, unique_count);
        let scan_time = started.elapsed();
        log::debug!("host scan: {unique_count} unique voxels in {point_count} points");

        self.enter(LpcState::Finalizing);
        let started = Instant::now();
        let mut finalize = Recorder::for_registry(registry);
        record_finalize_phase(&mut finalize, &scanned, &uniforms)?;
        ctx.submit_and_wait(&finalize, kernels, registry)?;
        let finalize_time = started.elapsed();

        self.enter(LpcState::Ready);
        let summary = LpcSummary {
            point_count,
            unique_count,
            internal_nodes: unique_count.saturating_sub(1),
            bitonic_steps: bitonic::step_count(point_count),
            dispatches: sort.dispatch_count() + finalize.dispatch_count(),
            sort_time,
            scan_time,
            finalize_time,
        };
        log::info!(
            "lpc build: {} points -> {} voxels, {} dispatches, sort {:?}, scan {:?}, finalize {:?}",
            summary.point_count,
            summary.unique_count,
            summary.dispatches,
            summary.sort_time,
            summary.scan_time,
            summary.finalize_time
        );
        Ok(summary)
    }

    /// Download every intermediate array of the last build.
    ///
    /// With aliased scratch the reordered points only survive until the next
    /// culling frame, so call this before culling when they matter.
    pub fn read_back(ctx: &GpuContext, store: &PointStore, summary: &LpcSummary) -> Result<LpcArrays> {
        let Some(kernels) = store.kernels() else {
            return Ok(LpcArrays::default());
        };
        let n = store.point_count() as usize;
        let u = summary.unique_count as usize;

        let mut rec = Recorder::for_registry(store.registry());
        for role in [
            BufferRole::MortonCodes,
            BufferRole::SortIndices,
            BufferRole::ReorderScratch,
            BufferRole::HeadFlags,
            BufferRole::ScannedIndices,
            BufferRole::UniqueCodes,
            BufferRole::VoxelStarts,
            BufferRole::Nodes,
        ] {
            rec.download(role)?;
        }
        let readbacks = ctx.submit_and_wait(&rec, kernels, store.registry())?;

        Ok(LpcArrays {
            sorted_codes: downloaded(&readbacks, BufferRole::MortonCodes, n)?,
            sort_indices: downloaded(&readbacks, BufferRole::SortIndices, n)?,
            sorted_points: downloaded(&readbacks, BufferRole::ReorderScratch, n)?,
            head_flags: downloaded(&readbacks, BufferRole::HeadFlags, n)?,
            scanned: downloaded(&readbacks, BufferRole::ScannedIndices, n)?,
            num_unique: summary.unique_count,
            unique_codes: downloaded(&readbacks, BufferRole::UniqueCodes, u)?,
            voxel_starts: downloaded(&readbacks, BufferRole::VoxelStarts, u)?,
            nodes: downloaded(&readbacks, BufferRole::Nodes, (2 * u).saturating_sub(1))?,
        })
    }
}

//! Remesh scheduling.
//!
//! Jobs are kept on a LIFO stack so the most recent edit is rebuilt first, and
//! at most [`MAX_REMESH_PER_FRAME`] jobs run per frame. The backlog carries over
//! between frames; only [`RemeshScheduler::drain_all`] empties it in one call.

use crate::collections::{GrowableStack, MAX_CAPACITY};
use crate::core::types::Result;
use crate::render::handles::RenderRecord;
use crate::voxel::chunk::{Chunk, ChunkKey};
use crate::voxel::registry::ChunkRegistry;

/// Hard cap on jobs processed per frame
pub const MAX_REMESH_PER_FRAME: usize = 5;

/// Initial capacity of the pending job stack
pub const DEFAULT_QUEUE_CAPACITY: usize = 32;

/// Builds render records from voxel data.
///
/// `neighbors` is indexed by [`Face`](crate::voxel::chunk::Face) slot and holds
/// only loaded chunks. Returning `Ok(None)` means the chunk has nothing to draw.
pub trait MeshBuilder {
    fn build_mesh(&mut self, chunk: &Chunk, neighbors: &[Option<&Chunk>; 6]) -> Result<Option<RenderRecord>>;
}

/// A pending rebuild: the target chunk plus the neighbors that were loaded
/// when it was queued
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemeshContext {
    target: ChunkKey,
    neighbors: [Option<ChunkKey>; 6],
}

impl RemeshContext {
    /// Snapshot `key` and its loaded neighbors. `None` if the chunk is not registered.
    pub fn capture(registry: &ChunkRegistry, key: ChunkKey) -> Option<Self> {
        if !registry.contains(key) {
            return None;
        }
        let neighbors = registry
            .neighbors(key)
            .map(|n| n.filter(|&n| registry.is_loaded(n)));
        Some(Self { target: key, neighbors })
    }

    pub fn target(&self) -> ChunkKey {
        self.target
    }

    /// Neighbors captured at enqueue time, by face slot
    pub fn neighbor_slots(&self) -> &[Option<ChunkKey>; 6] {
        &self.neighbors
    }

    /// Captured neighbors in face order
    pub fn neighbors(&self) -> impl Iterator<Item = ChunkKey> + '_ {
        self.neighbors.iter().flatten().copied()
    }
}

/// Outcome of a drain pass
#[derive(Debug, Default)]
pub struct DrainReport {
    /// Jobs popped from the queue
    pub jobs: usize,
    /// Meshes rebuilt (targets and neighbors)
    pub rebuilt: usize,
    /// Builds that returned an error
    pub failed: usize,
    /// Chunks skipped because they were unloaded after being queued
    pub skipped: usize,
    /// Records replaced by this pass, not yet retired. Whoever calls
    /// [`RemeshScheduler::drain`] hands them to the garbage collector;
    /// `World::remesh` does so itself and returns this empty.
    pub retired: Vec<RenderRecord>,
}

impl DrainReport {
    fn merge(&mut self, other: DrainReport) {
        self.jobs += other.jobs;
        self.rebuilt += other.rebuilt;
        self.failed += other.failed;
        self.skipped += other.skipped;
        self.retired.extend(other.retired);
    }
}

/// Rate-limited queue of remesh jobs
pub struct RemeshScheduler {
    pending: GrowableStack<RemeshContext>,
    /// Unique chunks rebuilt by the drain in progress
    batch: GrowableStack<ChunkKey>,
    per_frame: usize,
    /// Jobs accepted before `enqueue` starts refusing
    max_pending: usize,
    processed_total: u64,
}

impl RemeshScheduler {
    /// Create a scheduler. `per_frame` is clamped to `1..=MAX_REMESH_PER_FRAME`.
    pub fn new(per_frame: usize, capacity: usize) -> Result<Self> {
        Self::with_limit(per_frame, capacity, MAX_CAPACITY)
    }

    /// Create a scheduler that holds at most `max_pending` jobs (clamped to `1..=MAX_CAPACITY`)
    pub fn with_limit(per_frame: usize, capacity: usize, max_pending: usize) -> Result<Self> {
        Ok(Self {
            pending: GrowableStack::with_capacity(capacity)?,
            // Each job contributes its target and up to 6 neighbors
            batch: GrowableStack::with_capacity(MAX_REMESH_PER_FRAME * 7)?,
            per_frame: per_frame.clamp(1, MAX_REMESH_PER_FRAME),
            max_pending: max_pending.clamp(1, MAX_CAPACITY),
            processed_total: 0,
        })
    }

    /// Append a job. Does not deduplicate; see [`RemeshScheduler::request`].
    pub fn enqueue(&mut self, ctx: RemeshContext) -> bool {
        let target = ctx.target;
        if self.pending.len() >= self.max_pending || !self.pending.push(ctx) {
            log::warn!("Remesh queue full ({} jobs), rejected job for chunk {}", self.pending.len(), target);
            return false;
        }
        true
    }

    /// Queue a rebuild of `key` unless one is already outstanding.
    ///
    /// Returns `true` if a job was queued. The chunk must be loaded.
    pub fn request(&mut self, registry: &mut ChunkRegistry, key: ChunkKey) -> bool {
        match registry.get(key) {
            Some(chunk) if chunk.is_loaded() && !chunk.is_queued_for_remesh() => {}
            _ => return false,
        }
        let Some(ctx) = RemeshContext::capture(registry, key) else {
            return false;
        };
        if !self.enqueue(ctx) {
            return false;
        }
        if let Some(chunk) = registry.get_mut(key) {
            chunk.set_queued_for_remesh(true);
        }
        true
    }

    /// Drop any pending job for `key`, clearing its queued flag if the chunk is still registered
    pub fn cancel(&mut self, registry: &mut ChunkRegistry, key: ChunkKey) -> bool {
        let removed = self.pending.retain(|ctx| ctx.target != key);
        if let Some(chunk) = registry.get_mut(key) {
            chunk.set_queued_for_remesh(false);
        }
        removed > 0
    }

    /// Number of jobs to run this frame.
    ///
    /// Under CPU overload only one job runs on even frames.
    pub fn frame_budget(&self, frame_number: u64, overloaded: bool) -> usize {
        if overloaded && frame_number % 2 == 0 {
            1
        } else {
            self.per_frame
        }
    }

    /// Run up to `min(max_jobs, per-frame cap)` jobs, newest first.
    ///
    /// Targets and their still-loaded snapshot neighbors are collected into one
    /// batch, so a chunk shared by several jobs is rebuilt once.
    pub fn drain(
        &mut self,
        registry: &mut ChunkRegistry,
        builder: &mut dyn MeshBuilder,
        max_jobs: usize,
    ) -> DrainReport {
        let budget = max_jobs.min(self.per_frame);
        let mut report = DrainReport::default();
        let mut jobs = Vec::with_capacity(budget);

        self.batch.clear();
        for _ in 0..budget {
            let Some(ctx) = self.pending.pop() else {
                break;
            };
            report.jobs += 1;
            self.processed_total += 1;

            if registry.is_loaded(ctx.target) {
                self.batch.push_unique(ctx.target);
                for neighbor in ctx.neighbors() {
                    if registry.is_loaded(neighbor) {
                        self.batch.push_unique(neighbor);
                    } else {
                        report.skipped += 1;
                    }
                }
            } else {
                report.skipped += 1;
            }
            jobs.push(ctx);
        }

        for &key in self.batch.iter() {
            // A target uses its snapshot, anything else its current neighbors
            let neighbors = match jobs.iter().find(|job| job.target == key) {
                Some(job) => job.neighbors.map(|n| n.filter(|&n| registry.is_loaded(n))),
                None => registry.neighbors(key).map(|n| n.filter(|&n| registry.is_loaded(n))),
            };
            rebuild(registry, builder, key, &neighbors, &mut report);
        }
        self.batch.clear();

        for job in &jobs {
            if let Some(chunk) = registry.get_mut(job.target) {
                chunk.set_queued_for_remesh(false);
            }
        }

        if self.pending.is_empty() && self.pending.capacity() > self.pending.default_capacity() {
            let grown = self.pending.capacity();
            if self.pending.reset_capacity() {
                log::debug!(
                    "Remesh backlog cleared, queue shrunk from {} to {}",
                    grown,
                    self.pending.capacity()
                );
            }
        }

        if report.jobs > 0 {
            log::trace!(
                "Remesh drain: {} jobs, {} rebuilt, {} left",
                report.jobs,
                report.rebuilt,
                self.pending.len()
            );
        }
        report
    }

    /// Run every pending job regardless of the per-frame cap. Shutdown only.
    pub fn drain_all(&mut self, registry: &mut ChunkRegistry, builder: &mut dyn MeshBuilder) -> DrainReport {
        let mut report = DrainReport::default();
        while !self.pending.is_empty() {
            let batch = self.drain(registry, builder, MAX_REMESH_PER_FRAME);
            report.merge(batch);
        }
        log::debug!("Drained all remesh jobs: {} jobs, {} rebuilt", report.jobs, report.rebuilt);
        report
    }

    /// Jobs waiting to run
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Jobs that can still be queued before `enqueue` refuses
    pub fn room(&self) -> usize {
        self.max_pending.saturating_sub(self.pending.len())
    }

    pub fn max_pending(&self) -> usize {
        self.max_pending
    }

    /// Current capacity of the pending stack
    pub fn queue_capacity(&self) -> usize {
        self.pending.capacity()
    }

    pub fn per_frame(&self) -> usize {
        self.per_frame
    }

    /// Jobs run over the scheduler's lifetime
    pub fn processed_total(&self) -> u64 {
        self.processed_total
    }

    /// Whether a job for `key` is pending
    pub fn is_pending(&self, key: ChunkKey) -> bool {
        self.pending.iter().any(|ctx| ctx.target == key)
    }
}

fn rebuild(
    registry: &mut ChunkRegistry,
    builder: &mut dyn MeshBuilder,
    key: ChunkKey,
    neighbors: &[Option<ChunkKey>; 6],
    report: &mut DrainReport,
) {
    let built = {
        let Some(chunk) = registry.get(key) else {
            return;
        };
        let refs = neighbors.map(|n| n.and_then(|n| registry.get(n)));
        builder.build_mesh(chunk, &refs)
    };

    match built {
        Ok(record) => {
            if let Some(old) = registry.get_mut(key).and_then(|c| c.replace_render(record)) {
                report.retired.push(old);
            }
            report.rebuilt += 1;
        }
        Err(e) => {
            log::error!("Failed to build mesh for chunk {}: {}", key, e);
            report.failed += 1;
        }
    }
}

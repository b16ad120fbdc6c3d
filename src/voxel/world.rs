//! World - ties chunk streaming, population and remeshing together.
//!
//! Per tick the caller moves the observer ([`World::update_observer`]), then
//! once per frame calls [`World::remesh`] with the current frame slot. Records
//! replaced by remeshing or unloading go to the [`FrameGarbageCollector`] for
//! that slot; flushing the collector stays with the caller, who owns the fences.

use std::collections::HashSet;

use glam::{IVec3, Vec3};

use crate::core::config::StreamingConfig;
use crate::core::error::Error;
use crate::core::types::Result;
use crate::render::garbage::FrameGarbageCollector;
use crate::render::remesh::{DrainReport, MeshBuilder, RemeshScheduler};
use crate::streaming::source::{ChunkSource, LocalChunkSource};
use crate::voxel::chunk::{BlockId, ChunkCoord, ChunkKey};
use crate::voxel::registry::ChunkRegistry;

/// What a single load pass did
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Chunk containing the observer, if one has been set
    pub observer_chunk: Option<ChunkCoord>,
    /// Whether the region around the observer was re-acquired
    pub moved: bool,
    pub created: usize,
    pub existing: usize,
    pub populated: usize,
    pub failed: usize,
    /// Remesh jobs queued by this pass
    pub remesh_requested: usize,
}

/// Snapshot of world counters
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WorldStats {
    pub registered: usize,
    pub loaded: usize,
    pub failed: usize,
    pub meshed: usize,
    pub pending_remesh: usize,
    /// Chunks waiting for room in the remesh queue
    pub deferred_remesh: usize,
    pub created_total: u64,
    pub unloaded_total: u64,
    pub remesh_total: u64,
}

/// Streaming world around a single observer
pub struct World {
    config: StreamingConfig,
    registry: ChunkRegistry,
    source: Box<dyn ChunkSource>,
    scheduler: RemeshScheduler,
    observer_chunk: Option<ChunkCoord>,
    /// Chunks edited since the last call to `take_modified`
    modified_chunks: Vec<ChunkKey>,
    /// Loaded chunks that need a rebuild but found the remesh queue full
    deferred_remesh: HashSet<ChunkKey>,
}

impl World {
    /// Create a world pulling chunks from `source`
    pub fn new(config: StreamingConfig, source: Box<dyn ChunkSource>) -> Result<Self> {
        let config = config.validated();
        let scheduler = RemeshScheduler::with_limit(
            config.remesh_per_frame,
            config.remesh_queue_capacity,
            config.max_pending_remesh,
        )?;

        log::info!(
            "World created: {:?} source, load radius {}, {} remesh jobs per frame",
            source.kind(),
            config.load_radius,
            scheduler.per_frame()
        );
        Ok(Self {
            config,
            registry: ChunkRegistry::new(),
            source,
            scheduler,
            observer_chunk: None,
            modified_chunks: Vec::new(),
            deferred_remesh: HashSet::new(),
        })
    }

    /// Create a world backed by the procedural source described in `config`
    pub fn with_local_source(config: StreamingConfig) -> Result<Self> {
        let source = LocalChunkSource::new(config.seed, config.terrain.clone());
        Self::new(config, Box::new(source))
    }

    /// Load the spawn region around `center`
    pub fn spawn(&mut self, center: ChunkCoord) -> Result<TickReport> {
        log::info!("Spawning at chunk {} (radius {})", center, self.config.spawn_radius);
        let mut report = self.load_region(center, self.config.spawn_radius)?;
        report.observer_chunk = self.observer_chunk;
        Ok(report)
    }

    /// Move the observer. Re-acquires the load region when it enters a new chunk.
    pub fn update_observer(&mut self, pos: Vec3) -> Result<TickReport> {
        let chunk = ChunkCoord::from_world_pos(pos);
        if self.observer_chunk == Some(chunk) {
            return Ok(TickReport {
                observer_chunk: Some(chunk),
                ..Default::default()
            });
        }

        log::debug!("Observer entered chunk {}", chunk);
        let mut report = self.load_region(chunk, self.config.load_radius)?;
        self.observer_chunk = Some(chunk);
        report.observer_chunk = Some(chunk);
        report.moved = true;
        Ok(report)
    }

    /// Let the chunk source do per-frame work
    pub fn advance(&mut self, dt: f64) {
        self.source.tick(dt);
    }

    /// Acquire, populate and queue remeshing for everything within `radius` of `center`
    fn load_region(&mut self, center: ChunkCoord, radius: u32) -> Result<TickReport> {
        let acquired = self.registry.acquire(center, radius)?;
        let populate = self.registry.populate(self.source.as_mut(), &acquired.new);

        let mut report = TickReport {
            created: acquired.new.len(),
            existing: acquired.existing.len(),
            populated: populate.populated.len(),
            failed: populate.failed.len(),
            ..Default::default()
        };

        // Newly loaded chunks, then already-loaded neighbors whose meshes were
        // built without them
        let fresh: HashSet<ChunkKey> = populate.populated.iter().copied().collect();
        let mut stale = Vec::new();
        for &key in &populate.populated {
            if self.request_remesh(key) {
                report.remesh_requested += 1;
            }
            stale.extend(
                self.registry
                    .loaded_neighbors(key)
                    .into_iter()
                    .filter(|n| !fresh.contains(n)),
            );
        }
        for key in stale {
            if self.request_remesh(key) {
                report.remesh_requested += 1;
            }
        }

        if report.created > 0 {
            log::debug!(
                "Loaded region {} r={}: {} created, {} populated, {} failed, {} remesh queued",
                center,
                radius,
                report.created,
                report.populated,
                report.failed,
                report.remesh_requested
            );
        }
        Ok(report)
    }

    /// Queue a rebuild of `key`. With the queue full a loaded chunk is parked in
    /// the deferred set and queued by a later [`World::remesh`].
    fn request_remesh(&mut self, key: ChunkKey) -> bool {
        if self.scheduler.room() == 0 {
            let waiting = self
                .registry
                .get(key)
                .is_some_and(|c| c.is_loaded() && !c.is_queued_for_remesh());
            if waiting {
                self.deferred_remesh.insert(key);
            }
            return false;
        }

        let queued = self.scheduler.request(&mut self.registry, key);
        if queued {
            self.deferred_remesh.remove(&key);
        }
        queued
    }

    /// Move deferred chunks into the queue as far as room allows, lowest key first
    fn requeue_deferred(&mut self) {
        let room = self.scheduler.room();
        if room == 0 || self.deferred_remesh.is_empty() {
            return;
        }

        let mut keys: Vec<ChunkKey> = self.deferred_remesh.iter().copied().collect();
        keys.sort_unstable();
        let mut requeued = 0;
        for key in keys.into_iter().take(room) {
            self.deferred_remesh.remove(&key);
            if self.scheduler.request(&mut self.registry, key) {
                requeued += 1;
            }
        }
        log::debug!(
            "Requeued {} deferred remesh requests, {} still waiting",
            requeued,
            self.deferred_remesh.len()
        );
    }

    /// Edit the block at a world block position. Returns whether it changed.
    pub fn set_block(&mut self, pos: IVec3, block: BlockId) -> Result<bool> {
        let coord = ChunkCoord::from_block(pos);
        let key = ChunkKey::from_coord(coord)?;
        let chunk = self
            .registry
            .get_mut(key)
            .ok_or_else(|| Error::Streaming(format!("chunk {} is not registered", coord)))?;

        let local = pos - coord.block_origin();
        let changed = chunk.set_block(local.x as u32, local.y as u32, local.z as u32, block)?;
        if changed {
            if !self.modified_chunks.contains(&key) {
                self.modified_chunks.push(key);
            }
            self.request_remesh(key);
        }
        Ok(changed)
    }

    /// Block at a world block position, `None` if its chunk is not loaded
    pub fn block(&self, pos: IVec3) -> Option<BlockId> {
        let coord = ChunkCoord::from_block(pos);
        let local = pos - coord.block_origin();
        self.registry
            .get_at(coord)?
            .block(local.x as u32, local.y as u32, local.z as u32)
    }

    /// Run this frame's share of remesh jobs and retire replaced records into `frame_slot`.
    ///
    /// The returned report's `retired` list is empty; its records already sit in the collector.
    pub fn remesh(
        &mut self,
        builder: &mut dyn MeshBuilder,
        gc: &mut FrameGarbageCollector,
        frame_slot: usize,
        frame_number: u64,
        overloaded: bool,
    ) -> Result<DrainReport> {
        check_slot(gc, frame_slot)?;
        let budget = self.scheduler.frame_budget(frame_number, overloaded);
        let mut report = self.scheduler.drain(&mut self.registry, builder, budget);
        for record in std::mem::take(&mut report.retired) {
            gc.retire_record(frame_slot, record)?;
        }
        self.requeue_deferred();
        Ok(report)
    }

    /// Evict a chunk. Its render record is retired into `frame_slot`.
    ///
    /// Loaded neighbors are queued for remeshing since their faces toward the
    /// evicted chunk are now exposed.
    pub fn unload(&mut self, key: ChunkKey, gc: &mut FrameGarbageCollector, frame_slot: usize) -> Result<bool> {
        if !self.registry.contains(key) {
            return Ok(false);
        }
        check_slot(gc, frame_slot)?;

        self.scheduler.cancel(&mut self.registry, key);
        self.deferred_remesh.remove(&key);
        let neighbors = self.registry.loaded_neighbors(key);
        if let Some(chunk) = self.registry.get(key) {
            self.source.unload(chunk);
        }

        let Some(mut chunk) = self.registry.unload(key) else {
            return Ok(false);
        };
        if let Some(record) = chunk.take_render() {
            gc.retire_record(frame_slot, record)?;
        }
        self.modified_chunks.retain(|&k| k != key);

        for neighbor in neighbors {
            self.request_remesh(neighbor);
        }
        Ok(true)
    }

    /// Registered chunks whose Chebyshev distance from `center` exceeds `radius`
    pub fn chunks_beyond(&self, center: ChunkCoord, radius: u32) -> Vec<ChunkKey> {
        let r = radius as i64;
        self.registry
            .keys_in_order()
            .into_iter()
            .filter(|key| {
                let c = key.coord();
                let dx = (c.x as i64 - center.x as i64).abs();
                let dy = (c.y as i64 - center.y as i64).abs();
                let dz = (c.z as i64 - center.z as i64).abs();
                dx.max(dy).max(dz) > r
            })
            .collect()
    }

    /// Finish every pending remesh job and retire all render records.
    ///
    /// Deferred requests are dropped. Call before shutting the garbage collector down.
    pub fn shutdown(
        &mut self,
        builder: &mut dyn MeshBuilder,
        gc: &mut FrameGarbageCollector,
        frame_slot: usize,
    ) -> Result<DrainReport> {
        check_slot(gc, frame_slot)?;
        let mut report = self.scheduler.drain_all(&mut self.registry, builder);
        for record in std::mem::take(&mut report.retired) {
            gc.retire_record(frame_slot, record)?;
        }
        if !self.deferred_remesh.is_empty() {
            log::debug!("Dropping {} deferred remesh requests", self.deferred_remesh.len());
            self.deferred_remesh.clear();
        }

        let mut released = 0;
        for key in self.registry.keys_in_order() {
            if let Some(record) = self.registry.get_mut(key).and_then(|c| c.take_render()) {
                gc.retire_record(frame_slot, record)?;
                released += 1;
            }
        }
        log::info!(
            "World shut down: {} final remesh jobs, {} render records retired",
            report.jobs,
            released
        );
        Ok(report)
    }

    /// Take the chunks edited since the last call
    pub fn take_modified(&mut self) -> Vec<ChunkKey> {
        std::mem::take(&mut self.modified_chunks)
    }

    pub fn stats(&self) -> WorldStats {
        WorldStats {
            registered: self.registry.len(),
            loaded: self.registry.loaded_count(),
            failed: self.registry.failed_count(),
            meshed: self.registry.iter().filter(|c| c.render().is_some()).count(),
            pending_remesh: self.scheduler.len(),
            deferred_remesh: self.deferred_remesh.len(),
            created_total: self.registry.created_total(),
            unloaded_total: self.registry.unloaded_total(),
            remesh_total: self.scheduler.processed_total(),
        }
    }

    pub fn registry(&self) -> &ChunkRegistry {
        &self.registry
    }

    pub fn scheduler(&self) -> &RemeshScheduler {
        &self.scheduler
    }

    pub fn config(&self) -> &StreamingConfig {
        &self.config
    }

    pub fn observer_chunk(&self) -> Option<ChunkCoord> {
        self.observer_chunk
    }
}

/// Reject a slot before any record is taken out of a chunk
fn check_slot(gc: &FrameGarbageCollector, frame_slot: usize) -> Result<()> {
    if frame_slot >= gc.frames_in_flight() {
        return Err(Error::InvalidArgument(format!(
            "frame slot {} out of range (have {})",
            frame_slot,
            gc.frames_in_flight()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::TerrainParams;
    use crate::render::handles::{BufferHandle, GpuAllocation, MemoryHandle, RenderRecord, ResourceDestroyer};
    use crate::streaming::source::NetworkChunkSource;
    use crate::voxel::chunk::Chunk;

    #[derive(Default)]
    struct CountingBuilder {
        next: u64,
    }

    impl MeshBuilder for CountingBuilder {
        fn build_mesh(&mut self, chunk: &Chunk, _neighbors: &[Option<&Chunk>; 6]) -> Result<Option<RenderRecord>> {
            self.next += 1;
            Ok(Some(RenderRecord {
                key: chunk.key(),
                allocation: GpuAllocation::new(BufferHandle(self.next), MemoryHandle(self.next)),
                vertex_count: 1,
                generation: chunk.generation(),
            }))
        }
    }

    #[derive(Default)]
    struct CountingDestroyer {
        buffers: usize,
    }

    impl ResourceDestroyer for CountingDestroyer {
        fn destroy_buffer(&mut self, _buffer: BufferHandle) {
            self.buffers += 1;
        }

        fn free_memory(&mut self, _memory: MemoryHandle) {}
    }

    fn flat_config() -> StreamingConfig {
        crate::core::logging::init_for_tests();
        StreamingConfig {
            load_radius: 1,
            spawn_radius: 1,
            terrain: TerrainParams {
                height_scale: 0.0,
                base_height: 4.0,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn gc() -> FrameGarbageCollector {
        FrameGarbageCollector::new(3, 8, 32).unwrap()
    }

    #[test]
    fn test_spawn_loads_region() {
        let mut world = World::with_local_source(flat_config()).unwrap();
        let report = world.spawn(ChunkCoord::ZERO).unwrap();

        assert_eq!(report.created, 27);
        assert_eq!(report.populated, 27);
        assert_eq!(report.remesh_requested, 27);
        assert_eq!(world.stats().loaded, 27);
        assert_eq!(world.stats().pending_remesh, 27);
    }

    #[test]
    fn test_observer_reacquires_only_on_chunk_change() {
        let mut world = World::with_local_source(flat_config()).unwrap();

        let first = world.update_observer(Vec3::new(8.0, 8.0, 8.0)).unwrap();
        assert!(first.moved);
        assert_eq!(first.created, 27);

        let same = world.update_observer(Vec3::new(9.0, 9.0, 9.0)).unwrap();
        assert!(!same.moved);
        assert_eq!(same.created, 0);

        let next = world.update_observer(Vec3::new(24.0, 8.0, 8.0)).unwrap();
        assert!(next.moved);
        assert_eq!(next.observer_chunk, Some(ChunkCoord::new(1, 0, 0)));
        assert_eq!(next.created, 9);
        assert_eq!(next.existing, 18);
        assert_eq!(world.stats().registered, 36);
    }

    #[test]
    fn test_new_chunks_requeue_loaded_neighbors() {
        let mut world = World::with_local_source(flat_config()).unwrap();
        let mut builder = CountingBuilder::default();
        let mut gc = gc();

        world.update_observer(Vec3::splat(8.0)).unwrap();
        while !world.scheduler().is_empty() {
            world.remesh(&mut builder, &mut gc, 0, 1, false).unwrap();
        }

        // Moving one chunk along +X loads a new face; the old +X face layer is stale
        let report = world.update_observer(Vec3::new(24.0, 8.0, 8.0)).unwrap();
        assert_eq!(report.remesh_requested, 9 + 9);
    }

    #[test]
    fn test_remesh_retires_into_frame_slot() {
        let mut world = World::with_local_source(StreamingConfig {
            spawn_radius: 0,
            ..flat_config()
        })
        .unwrap();
        let mut builder = CountingBuilder::default();
        let mut gc = gc();
        let mut destroyer = CountingDestroyer::default();

        world.spawn(ChunkCoord::ZERO).unwrap();
        let report = world.remesh(&mut builder, &mut gc, 0, 1, false).unwrap();
        assert_eq!(report.rebuilt, 1);
        assert_eq!(gc.total_pending(), 0);

        // Edit queues a rebuild that retires the first record into slot 1
        assert!(world.set_block(IVec3::new(1, 10, 1), BlockId::STONE).unwrap());
        assert_eq!(world.block(IVec3::new(1, 10, 1)), Some(BlockId::STONE));
        let report = world.remesh(&mut builder, &mut gc, 1, 2, false).unwrap();
        assert_eq!(report.rebuilt, 1);
        // Handed to the collector, not left for the caller to retire again
        assert!(report.retired.is_empty());
        assert_eq!(gc.pending(1), 1);

        assert_eq!(gc.flush_garbage(1, false, &mut destroyer).unwrap(), 1);
        assert_eq!(destroyer.buffers, 1);
        assert_eq!(world.take_modified().len(), 1);
        assert!(world.take_modified().is_empty());
    }

    #[test]
    fn test_full_remesh_queue_defers_instead_of_dropping() {
        let mut world = World::with_local_source(StreamingConfig {
            max_pending_remesh: 8,
            ..flat_config()
        })
        .unwrap();
        let mut builder = CountingBuilder::default();
        let mut gc = gc();

        let report = world.spawn(ChunkCoord::ZERO).unwrap();
        assert_eq!(report.populated, 27);
        assert_eq!(report.remesh_requested, 8);
        assert_eq!(world.stats().pending_remesh, 8);
        assert_eq!(world.stats().deferred_remesh, 19);

        let mut frames = 0;
        while !world.scheduler().is_empty() || world.stats().deferred_remesh > 0 {
            world.remesh(&mut builder, &mut gc, 0, frames, false).unwrap();
            assert!(world.scheduler().len() <= 8);
            frames += 1;
            assert!(frames < 100, "remesh backlog never drained");
        }
        assert_eq!(world.stats().meshed, 27);
    }

    #[test]
    fn test_set_block_unregistered_chunk_fails() {
        let mut world = World::with_local_source(flat_config()).unwrap();
        assert!(world.set_block(IVec3::new(500, 0, 0), BlockId::STONE).is_err());
        assert_eq!(world.block(IVec3::new(500, 0, 0)), None);
    }

    #[test]
    fn test_unload_retires_record_and_requeues_neighbors() {
        let mut world = World::with_local_source(flat_config()).unwrap();
        let mut builder = CountingBuilder::default();
        let mut gc = gc();

        let mut destroyer = CountingDestroyer::default();

        world.spawn(ChunkCoord::ZERO).unwrap();
        while !world.scheduler().is_empty() {
            world.remesh(&mut builder, &mut gc, 0, 1, false).unwrap();
        }
        gc.flush_garbage(0, true, &mut destroyer).unwrap();
        assert_eq!(world.stats().meshed, 27);

        let target = ChunkKey::from_coord(ChunkCoord::ZERO).unwrap();
        assert!(world.unload(target, &mut gc, 2).unwrap());
        assert_eq!(gc.pending(2), 1);
        assert_eq!(world.scheduler().len(), 6);
        assert!(!world.registry().contains(target));

        // Unknown key is a no-op
        assert!(!world.unload(target, &mut gc, 2).unwrap());
        // Bad slot is rejected before anything changes
        let other = ChunkKey::from_coord(ChunkCoord::new(1, 0, 0)).unwrap();
        assert!(world.unload(other, &mut gc, 9).is_err());
        assert!(world.registry().contains(other));
    }

    #[test]
    fn test_shutdown_retires_everything() {
        let mut world = World::with_local_source(flat_config()).unwrap();
        let mut builder = CountingBuilder::default();
        let mut gc = gc();
        let mut destroyer = CountingDestroyer::default();

        world.spawn(ChunkCoord::ZERO).unwrap();
        world.remesh(&mut builder, &mut gc, 0, 1, false).unwrap();

        world.shutdown(&mut builder, &mut gc, 0).unwrap();
        assert!(world.scheduler().is_empty());
        assert_eq!(world.stats().meshed, 0);

        gc.shutdown(&mut destroyer);
        assert_eq!(destroyer.buffers as u64, builder.next);
    }

    #[test]
    fn test_chunks_beyond() {
        let mut world = World::with_local_source(flat_config()).unwrap();
        world.spawn(ChunkCoord::ZERO).unwrap();
        assert!(world.chunks_beyond(ChunkCoord::ZERO, 1).is_empty());
        assert_eq!(world.chunks_beyond(ChunkCoord::new(2, 0, 0), 1).len(), 9);
    }

    #[test]
    fn test_network_source_marks_chunks_failed() {
        let mut world = World::new(flat_config(), Box::new(NetworkChunkSource::new("example:1"))).unwrap();
        let report = world.spawn(ChunkCoord::ZERO).unwrap();
        assert_eq!(report.failed, 27);
        assert_eq!(report.remesh_requested, 0);
        assert_eq!(world.stats().failed, 27);
    }
}

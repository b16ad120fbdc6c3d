//! Headless streaming demo.
//!
//! Walks an observer along +X through a procedural world and runs the full
//! per-frame loop: observer update, chunk population, capped remeshing and
//! deferred destruction over a simulated ring of frames in flight. A slot's
//! garbage is only flushed when the slot comes around again, i.e. after the
//! frame that last used it has retired.
//!
//! Usage: `voxstream [--config <path>] [--frames <n>] [--speed <chunks per frame>]`

use std::collections::HashSet;
use std::time::Instant;

use glam::Vec3;

use voxstream::core::logging;
use voxstream::core::{Result, StreamingConfig};
use voxstream::render::{
    BufferHandle, FrameGarbageCollector, GpuAllocation, MemoryHandle, MeshBuilder, RenderRecord, ResourceDestroyer,
};
use voxstream::voxel::{BlockId, Chunk, Face, World, CHUNK_EDGE};

/// Remesh time above which the next frame runs in overload mode
const OVERLOAD_MS: f64 = 8.0;

/// Stands in for the graphics layer: issues handles for meshes and checks
/// that every handle is released exactly once.
#[derive(Default)]
struct HeadlessGpu {
    next_handle: u64,
    live_buffers: HashSet<u64>,
    live_memory: HashSet<u64>,
    faces_built: u64,
}

impl HeadlessGpu {
    fn allocate(&mut self) -> GpuAllocation {
        self.next_handle += 1;
        self.live_buffers.insert(self.next_handle);
        self.live_memory.insert(self.next_handle);
        GpuAllocation::new(BufferHandle(self.next_handle), MemoryHandle(self.next_handle))
    }
}

/// Exposed faces of the solid block at local (x, y, z)
fn exposed_faces(chunk: &Chunk, neighbors: &[Option<&Chunk>; 6], x: u32, y: u32, z: u32) -> u32 {
    let edge = CHUNK_EDGE as i32;
    let mut faces = 0;
    for face in Face::ALL {
        let o = face.offset();
        let (nx, ny, nz) = (x as i32 + o.x, y as i32 + o.y, z as i32 + o.z);
        let inside = (0..edge).contains(&nx) && (0..edge).contains(&ny) && (0..edge).contains(&nz);
        let other = if inside {
            chunk.block(nx as u32, ny as u32, nz as u32)
        } else {
            // Wrap into the neighbor; a missing neighbor counts as open
            neighbors[face.index()].and_then(|n| {
                n.block(nx.rem_euclid(edge) as u32, ny.rem_euclid(edge) as u32, nz.rem_euclid(edge) as u32)
            })
        };
        if !other.is_some_and(BlockId::is_solid) {
            faces += 1;
        }
    }
    faces
}

impl MeshBuilder for HeadlessGpu {
    fn build_mesh(&mut self, chunk: &Chunk, neighbors: &[Option<&Chunk>; 6]) -> Result<Option<RenderRecord>> {
        let mut faces = 0u32;
        for y in 0..CHUNK_EDGE {
            for z in 0..CHUNK_EDGE {
                for x in 0..CHUNK_EDGE {
                    if chunk.block(x, y, z).is_some_and(BlockId::is_solid) {
                        faces += exposed_faces(chunk, neighbors, x, y, z);
                    }
                }
            }
        }

        if faces == 0 {
            return Ok(None);
        }
        self.faces_built += faces as u64;
        Ok(Some(RenderRecord {
            key: chunk.key(),
            allocation: self.allocate(),
            vertex_count: faces * 6,
            generation: chunk.generation(),
        }))
    }
}

impl ResourceDestroyer for HeadlessGpu {
    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        if !self.live_buffers.remove(&buffer.0) {
            log::error!("Buffer {} destroyed twice or never allocated", buffer.0);
        }
    }

    fn free_memory(&mut self, memory: MemoryHandle) {
        if !self.live_memory.remove(&memory.0) {
            log::error!("Memory {} freed twice or never allocated", memory.0);
        }
    }
}

fn main() {
    logging::init();

    if let Err(e) = run() {
        log::error!("Demo failed: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let frames = parse_u64_arg(&args, "--frames").unwrap_or(600);
    let speed = parse_f32_arg(&args, "--speed").unwrap_or(0.05);

    let config = match parse_str_arg(&args, "--config") {
        Some(path) => StreamingConfig::load_or_create(path)?,
        None => StreamingConfig::default(),
    };
    let frames_in_flight = config.frames_in_flight as usize;

    println!("=== Voxstream headless demo ===");
    println!("Frames:      {} ({} in flight)", frames, frames_in_flight);
    println!("Speed:       {} chunks/frame", speed);
    println!("Load radius: {}", config.load_radius);
    println!();

    let mut gc = FrameGarbageCollector::new(
        frames_in_flight,
        config.garbage_slot_capacity,
        config.garbage_flush_per_frame,
    )?;
    let evict_radius = config.load_radius + 1;
    let mut world = World::with_local_source(config)?;
    let mut gpu = HeadlessGpu::default();

    let start = Vec3::new(8.0, 8.0, 8.0);
    world.spawn(voxstream::voxel::ChunkCoord::from_world_pos(start))?;

    let started = Instant::now();
    let mut overloaded = false;
    let mut evicted = 0usize;
    let mut slot = 0;

    for frame in 0..frames {
        slot = (frame % frames_in_flight as u64) as usize;

        // The frame that last used this slot has retired
        gc.flush_garbage(slot, false, &mut gpu)?;

        let pos = start + Vec3::X * (frame as f32 * speed * CHUNK_EDGE as f32);
        let tick = world.update_observer(pos)?;
        world.advance(1.0 / 60.0);

        if tick.moved {
            if let Some(center) = tick.observer_chunk {
                for key in world.chunks_beyond(center, evict_radius) {
                    if world.unload(key, &mut gc, slot)? {
                        evicted += 1;
                    }
                }
            }
        }

        let remesh_start = Instant::now();
        let drained = world.remesh(&mut gpu, &mut gc, slot, frame, overloaded)?;
        let remesh_ms = remesh_start.elapsed().as_secs_f64() * 1000.0;
        if remesh_ms > OVERLOAD_MS && !overloaded {
            log::debug!("Frame {} remesh took {:.1} ms, entering overload mode", frame, remesh_ms);
        }
        overloaded = remesh_ms > OVERLOAD_MS;

        if frame % 60 == 0 {
            let stats = world.stats();
            log::info!(
                "Frame {}: {} loaded, {} meshed, {} pending remesh ({} deferred), {} jobs this frame, {} garbage pending",
                frame,
                stats.loaded,
                stats.meshed,
                stats.pending_remesh,
                stats.deferred_remesh,
                drained.jobs,
                gc.total_pending()
            );
        }
    }

    let elapsed = started.elapsed();
    world.shutdown(&mut gpu, &mut gc, slot)?;
    let released = gc.shutdown(&mut gpu);
    let stats = world.stats();

    println!();
    println!("=== Done in {:.2}s ===", elapsed.as_secs_f64());
    println!("Chunks:   {} created, {} evicted", stats.created_total, evicted);
    println!("Remesh:   {} jobs, {} faces", stats.remesh_total, gpu.faces_built);
    println!("Handles:  {} issued, {} released at shutdown", gpu.next_handle, released);
    println!(
        "Leaked:   {} buffers, {} memory",
        gpu.live_buffers.len(),
        gpu.live_memory.len()
    );
    Ok(())
}

fn parse_f32_arg(args: &[String], flag: &str) -> Option<f32> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
}

fn parse_u64_arg(args: &[String], flag: &str) -> Option<u64> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
}

fn parse_str_arg(args: &[String], flag: &str) -> Option<String> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .cloned()
}

use criterion::{criterion_group, criterion_main, Criterion, black_box};

use voxstream::collections::GrowableStack;
use voxstream::core::Result;
use voxstream::math::packing::{pack_xyz, pack_xz, unpack_xyz, unpack_xz};
use voxstream::render::{BufferHandle, GpuAllocation, MemoryHandle, MeshBuilder, RemeshScheduler, RenderRecord};
use voxstream::streaming::shell;
use voxstream::streaming::{ChunkSource, SourceKind};
use voxstream::voxel::{BlockId, Chunk, ChunkCoord, ChunkRegistry, CHUNK_VOLUME};

struct AirSource;

impl ChunkSource for AirSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Local
    }

    fn populate(&mut self, chunk: &mut Chunk) -> Result<()> {
        chunk.fill(vec![BlockId::AIR; CHUNK_VOLUME])
    }
}

struct NullBuilder;

impl MeshBuilder for NullBuilder {
    fn build_mesh(&mut self, chunk: &Chunk, _neighbors: &[Option<&Chunk>; 6]) -> Result<Option<RenderRecord>> {
        Ok(Some(RenderRecord {
            key: chunk.key(),
            allocation: GpuAllocation::new(BufferHandle(1), MemoryHandle(1)),
            vertex_count: 0,
            generation: chunk.generation(),
        }))
    }
}

fn bench_pack_xz(c: &mut Criterion) {
    c.bench_function("pack_unpack_xz", |b| {
        b.iter(|| {
            let key = pack_xz(black_box(-123_456), black_box(987_654));
            black_box(unpack_xz(key));
        });
    });
}

fn bench_pack_xyz(c: &mut Criterion) {
    c.bench_function("pack_unpack_xyz", |b| {
        b.iter(|| {
            let key = pack_xyz(black_box(-5000), black_box(12), black_box(70_000), true);
            black_box(unpack_xyz(key));
        });
    });
}

fn bench_stack_push_pop(c: &mut Criterion) {
    c.bench_function("stack_push_pop_4096", |b| {
        b.iter(|| {
            let mut stack = GrowableStack::with_capacity(32).unwrap();
            for i in 0..4096u32 {
                stack.push(black_box(i));
            }
            while let Some(v) = stack.pop() {
                black_box(v);
            }
        });
    });
}

fn bench_shell_expand(c: &mut Criterion) {
    c.bench_function("shell_expand_r8", |b| {
        b.iter(|| black_box(shell::expand(black_box(ChunkCoord::new(10, 0, -10)), 8).unwrap()));
    });
}

fn bench_shell_expand_cached(c: &mut Criterion) {
    let mut cache = shell::ShellCache::new();
    c.bench_function("shell_expand_r8_cached", |b| {
        b.iter(|| black_box(cache.expand(black_box(ChunkCoord::new(10, 0, -10)), 8).unwrap()));
    });
}

fn bench_acquire_walk(c: &mut Criterion) {
    c.bench_function("acquire_r4_walk_16", |b| {
        b.iter(|| {
            let mut registry = ChunkRegistry::new();
            for x in 0..16 {
                black_box(registry.acquire(ChunkCoord::new(x, 0, 0), 4).unwrap());
            }
        });
    });
}

fn bench_remesh_drain(c: &mut Criterion) {
    c.bench_function("remesh_request_drain_125", |b| {
        b.iter(|| {
            let mut registry = ChunkRegistry::new();
            let acquired = registry.acquire(ChunkCoord::ZERO, 2).unwrap();
            registry.populate(&mut AirSource, &acquired.new);

            let mut scheduler = RemeshScheduler::new(5, 32).unwrap();
            for &key in &acquired.new {
                scheduler.request(&mut registry, key);
            }
            black_box(scheduler.drain_all(&mut registry, &mut NullBuilder));
        });
    });
}

criterion_group!(
    benches,
    bench_pack_xz,
    bench_pack_xyz,
    bench_stack_push_pop,
    bench_shell_expand,
    bench_shell_expand_cached,
    bench_acquire_walk,
    bench_remesh_drain,
);
criterion_main!(benches);

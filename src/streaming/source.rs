//! Chunk sources - suppliers of voxel data for newly created chunks

use std::collections::HashMap;

use noise::{Fbm, MultiFractal, NoiseFn, Perlin};

use crate::core::config::TerrainParams;
use crate::core::error::Error;
use crate::core::types::Result;
use crate::math::packing::{pack_xz, unpack_xz};
use crate::voxel::chunk::{local_index, BlockId, Chunk, CHUNK_EDGE, CHUNK_VOLUME};

/// Column heights kept before the cache is cleared
const MAX_CACHED_COLUMNS: usize = 1 << 16;

/// Kind of chunk source
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceKind {
    /// Procedural generation on this machine
    Local,
    /// Remote world server
    Network,
}

/// Supplier of voxel data.
///
/// `populate` receives a chunk that has never been populated and must fill it
/// with [`Chunk::fill`]. The registry guarantees it is called at most once per
/// chunk.
pub trait ChunkSource {
    fn kind(&self) -> SourceKind;

    fn populate(&mut self, chunk: &mut Chunk) -> Result<()>;

    /// Called before a chunk is removed from the registry
    fn unload(&mut self, _chunk: &Chunk) {}

    /// Per-frame housekeeping
    fn tick(&mut self, _dt: f64) {}
}

/// Procedural source driven by an fBm height field
pub struct LocalChunkSource {
    params: TerrainParams,
    noise: Fbm<Perlin>,
    /// Surface height per world column, keyed by packed (x, z)
    heights: HashMap<u64, i32>,
    generated: u64,
}

impl LocalChunkSource {
    pub fn new(seed: u32, params: TerrainParams) -> Self {
        let noise = Fbm::<Perlin>::new(seed)
            .set_octaves(params.octaves as usize)
            .set_persistence(params.persistence as f64)
            .set_lacunarity(params.lacunarity as f64);

        Self {
            params,
            noise,
            heights: HashMap::new(),
            generated: 0,
        }
    }

    pub fn params(&self) -> &TerrainParams {
        &self.params
    }

    /// Surface height of the world column at block (x, z)
    pub fn height_at(&mut self, x: i32, z: i32) -> i32 {
        let key = pack_xz(x, z);
        if let Some(&h) = self.heights.get(&key) {
            return h;
        }

        if self.heights.len() >= MAX_CACHED_COLUMNS {
            log::debug!("Column height cache full ({} entries), clearing", self.heights.len());
            self.heights.clear();
        }

        let h = self.sample_height(x, z);
        self.heights.insert(key, h);
        h
    }

    fn sample_height(&self, x: i32, z: i32) -> i32 {
        let nx = x as f64 / self.params.scale as f64;
        let nz = z as f64 / self.params.scale as f64;

        // Noise is in [-1, 1]; map to [0, height_scale] then offset
        let normalized = (self.noise.get([nx, nz]) + 1.0) / 2.0;
        let height = normalized * self.params.height_scale as f64 + self.params.base_height as f64;
        height.floor() as i32
    }

    /// Columns currently cached
    pub fn cached_columns(&self) -> impl Iterator<Item = (i32, i32)> + '_ {
        self.heights.keys().map(|&k| unpack_xz(k))
    }

    /// Chunks generated so far
    pub fn generated(&self) -> u64 {
        self.generated
    }

    fn block_for(&self, y: i32, surface: i32) -> BlockId {
        if y > surface {
            BlockId::AIR
        } else if y == surface {
            BlockId::GRASS
        } else if y >= surface - self.params.dirt_depth as i32 {
            BlockId::DIRT
        } else {
            BlockId::STONE
        }
    }
}

impl ChunkSource for LocalChunkSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Local
    }

    fn populate(&mut self, chunk: &mut Chunk) -> Result<()> {
        let origin = chunk.coord().block_origin();
        let mut voxels = Vec::new();
        voxels
            .try_reserve_exact(CHUNK_VOLUME)
            .map_err(|e| Error::Allocation(format!("voxel payload for {}: {}", chunk.key(), e)))?;
        voxels.resize(CHUNK_VOLUME, BlockId::AIR);

        for z in 0..CHUNK_EDGE {
            for x in 0..CHUNK_EDGE {
                let surface = self.height_at(origin.x + x as i32, origin.z + z as i32);
                for y in 0..CHUNK_EDGE {
                    voxels[local_index(x, y, z)] = self.block_for(origin.y + y as i32, surface);
                }
            }
        }

        chunk.fill(voxels)?;
        self.generated += 1;
        log::trace!("Generated chunk {}", chunk.key());
        Ok(())
    }
}

/// Remote source. Declared so worlds can be configured for it; not implemented.
pub struct NetworkChunkSource {
    endpoint: String,
}

impl NetworkChunkSource {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl ChunkSource for NetworkChunkSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Network
    }

    fn populate(&mut self, chunk: &mut Chunk) -> Result<()> {
        Err(Error::Unsupported(format!(
            "network chunk source ({}) cannot populate {}",
            self.endpoint,
            chunk.key()
        )))
    }
}

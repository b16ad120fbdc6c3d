//! Voxel data structures and the chunk world

pub mod chunk;
pub mod registry;
pub mod world;

pub use chunk::{BlockId, Chunk, ChunkCoord, ChunkKey, ChunkState, Face, CHUNK_EDGE, CHUNK_VOLUME};
pub use registry::{Acquired, ChunkRegistry, PopulateReport, MAX_ACQUIRE_RADIUS};
pub use world::{TickReport, World, WorldStats};

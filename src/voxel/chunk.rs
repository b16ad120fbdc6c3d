//! Chunk system for managing cubic regions of voxel space

use std::fmt;

use glam::{IVec3, Vec3};

use crate::core::error::Error;
use crate::core::types::Result;
use crate::math::packing;
use crate::render::handles::RenderRecord;

/// Number of blocks along each chunk edge
pub const CHUNK_EDGE: u32 = 16;

/// Number of blocks in a chunk
pub const CHUNK_VOLUME: usize = (CHUNK_EDGE * CHUNK_EDGE * CHUNK_EDGE) as usize;

/// One face of a chunk, in neighbor-slot order
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Face {
    NegX,
    PosX,
    PosY,
    NegY,
    PosZ,
    NegZ,
}

impl Face {
    /// All faces in neighbor-slot order
    pub const ALL: [Face; 6] = [Face::NegX, Face::PosX, Face::PosY, Face::NegY, Face::PosZ, Face::NegZ];

    /// Unit offset toward the neighbor on this face
    pub fn offset(self) -> IVec3 {
        match self {
            Face::NegX => IVec3::NEG_X,
            Face::PosX => IVec3::X,
            Face::PosY => IVec3::Y,
            Face::NegY => IVec3::NEG_Y,
            Face::PosZ => IVec3::Z,
            Face::NegZ => IVec3::NEG_Z,
        }
    }

    /// Slot index used by neighbor arrays
    pub fn index(self) -> usize {
        self as usize
    }
}

/// Integer coordinate identifying a chunk in the world grid
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct ChunkCoord {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl ChunkCoord {
    /// Origin chunk
    pub const ZERO: ChunkCoord = ChunkCoord { x: 0, y: 0, z: 0 };

    /// Create a new chunk coordinate
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Convert a world position (1 unit = 1 block) to the containing chunk
    pub fn from_world_pos(pos: Vec3) -> Self {
        let edge = CHUNK_EDGE as f32;
        Self {
            x: (pos.x / edge).floor() as i32,
            y: (pos.y / edge).floor() as i32,
            z: (pos.z / edge).floor() as i32,
        }
    }

    /// Convert a world block position to the containing chunk
    pub fn from_block(block: IVec3) -> Self {
        let edge = CHUNK_EDGE as i32;
        Self {
            x: block.x.div_euclid(edge),
            y: block.y.div_euclid(edge),
            z: block.z.div_euclid(edge),
        }
    }

    /// Block position of this chunk's minimum corner
    pub fn block_origin(&self) -> IVec3 {
        IVec3::new(self.x, self.y, self.z) * CHUNK_EDGE as i32
    }

    /// World-space origin (minimum corner) of this chunk
    pub fn world_origin(&self) -> Vec3 {
        self.block_origin().as_vec3()
    }

    /// Coordinate offset by `delta`, or `None` on i32 overflow
    pub fn checked_offset(&self, delta: IVec3) -> Option<Self> {
        Some(Self {
            x: self.x.checked_add(delta.x)?,
            y: self.y.checked_add(delta.y)?,
            z: self.z.checked_add(delta.z)?,
        })
    }

    /// Neighbor across `face`
    pub fn neighbor(&self, face: Face) -> Option<Self> {
        self.checked_offset(face.offset())
    }

    /// The 6 face-adjacent neighbors in [`Face::ALL`] order
    pub fn neighbors(&self) -> [Option<ChunkCoord>; 6] {
        Face::ALL.map(|face| self.neighbor(face))
    }
}

impl fmt::Display for ChunkCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// Packed identity of a chunk.
///
/// Holds the 3-axis packed coordinate with the loaded flag always clear, so two
/// keys compare equal exactly when they name the same chunk.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkKey(u64);

impl ChunkKey {
    /// Pack a coordinate, failing if any axis is outside the 21-bit range
    pub fn from_coord(coord: ChunkCoord) -> Result<Self> {
        let ChunkCoord { x, y, z } = coord;
        if !(packing::axis_in_range(x) && packing::axis_in_range(y) && packing::axis_in_range(z)) {
            return Err(Error::CoordinateOutOfRange { x, y, z });
        }
        Ok(Self(packing::pack_xyz(x, y, z, false)))
    }

    /// Recover a key from packed bits, ignoring the loaded flag
    pub fn from_packed(packed: u64) -> Self {
        Self(packing::set_loaded(packed, false))
    }

    /// Unpack the coordinate
    pub fn coord(&self) -> ChunkCoord {
        let (x, y, z, _) = packing::unpack_xyz(self.0);
        ChunkCoord::new(x, y, z)
    }

    /// Raw packed bits
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl TryFrom<ChunkCoord> for ChunkKey {
    type Error = Error;

    fn try_from(coord: ChunkCoord) -> Result<Self> {
        Self::from_coord(coord)
    }
}

impl fmt::Display for ChunkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.coord())
    }
}

/// Block type stored per voxel
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct BlockId(pub u16);

impl BlockId {
    pub const AIR: BlockId = BlockId(0);
    pub const STONE: BlockId = BlockId(1);
    pub const DIRT: BlockId = BlockId(2);
    pub const GRASS: BlockId = BlockId(3);

    /// Whether this block occludes its neighbors
    pub fn is_solid(self) -> bool {
        self != BlockId::AIR
    }
}

/// Lifecycle state of a chunk's voxel payload
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChunkState {
    /// Placeholder created by the registry, no voxel data yet
    Empty,
    /// Handed to a chunk source
    Loading,
    /// Voxel data present
    Loaded,
    /// The chunk source could not fill this chunk
    Failed,
}

/// Index of a local block position inside the voxel payload
pub fn local_index(x: u32, y: u32, z: u32) -> usize {
    (x + z * CHUNK_EDGE + y * CHUNK_EDGE * CHUNK_EDGE) as usize
}

/// A single chunk of voxel data
#[derive(Debug)]
pub struct Chunk {
    key: ChunkKey,
    /// Packed coordinate carrying the loaded flag
    packed: u64,
    state: ChunkState,
    voxels: Option<Box<[BlockId]>>,
    render: Option<RenderRecord>,
    queued_for_remesh: bool,
    /// Incremented on each voxel edit
    generation: u32,
    /// Whether this chunk has been edited since it was populated
    modified: bool,
}

impl Chunk {
    /// Create an empty placeholder for `key`
    pub fn new(key: ChunkKey) -> Self {
        Self {
            key,
            packed: key.raw(),
            state: ChunkState::Empty,
            voxels: None,
            render: None,
            queued_for_remesh: false,
            generation: 0,
            modified: false,
        }
    }

    pub fn key(&self) -> ChunkKey {
        self.key
    }

    pub fn coord(&self) -> ChunkCoord {
        self.key.coord()
    }

    pub fn state(&self) -> ChunkState {
        self.state
    }

    /// Packed coordinate with the loaded flag
    pub fn packed(&self) -> u64 {
        self.packed
    }

    /// Whether voxel data is available
    pub fn is_loaded(&self) -> bool {
        packing::is_loaded(self.packed)
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    /// Whether a remesh job for this chunk is outstanding
    pub fn is_queued_for_remesh(&self) -> bool {
        self.queued_for_remesh
    }

    pub(crate) fn set_queued_for_remesh(&mut self, queued: bool) {
        self.queued_for_remesh = queued;
    }

    /// Transition an empty chunk to loading. Fails for any other state.
    pub(crate) fn begin_loading(&mut self) -> bool {
        if self.state != ChunkState::Empty {
            return false;
        }
        self.state = ChunkState::Loading;
        true
    }

    /// Install the voxel payload produced by a chunk source
    pub fn fill(&mut self, voxels: Vec<BlockId>) -> Result<()> {
        if voxels.len() != CHUNK_VOLUME {
            return Err(Error::InvalidArgument(format!(
                "chunk {} payload has {} voxels, expected {}",
                self.key,
                voxels.len(),
                CHUNK_VOLUME
            )));
        }
        if self.voxels.is_some() {
            return Err(Error::Streaming(format!("chunk {} is already populated", self.key)));
        }

        self.voxels = Some(voxels.into_boxed_slice());
        self.state = ChunkState::Loaded;
        self.packed = packing::set_loaded(self.packed, true);
        Ok(())
    }

    pub(crate) fn mark_failed(&mut self) {
        self.voxels = None;
        self.state = ChunkState::Failed;
        self.packed = packing::set_loaded(self.packed, false);
    }

    /// Voxel payload, if loaded
    pub fn voxels(&self) -> Option<&[BlockId]> {
        self.voxels.as_deref()
    }

    /// Block at a local position, `None` if unloaded or out of bounds
    pub fn block(&self, x: u32, y: u32, z: u32) -> Option<BlockId> {
        if x >= CHUNK_EDGE || y >= CHUNK_EDGE || z >= CHUNK_EDGE {
            return None;
        }
        self.voxels.as_ref().map(|v| v[local_index(x, y, z)])
    }

    /// Edit a block. Returns whether the stored value changed.
    pub fn set_block(&mut self, x: u32, y: u32, z: u32, block: BlockId) -> Result<bool> {
        if x >= CHUNK_EDGE || y >= CHUNK_EDGE || z >= CHUNK_EDGE {
            return Err(Error::InvalidArgument(format!(
                "local position ({}, {}, {}) outside chunk",
                x, y, z
            )));
        }
        let key = self.key;
        let voxels = self
            .voxels
            .as_mut()
            .ok_or_else(|| Error::Streaming(format!("chunk {} is not loaded", key)))?;

        let slot = &mut voxels[local_index(x, y, z)];
        if *slot == block {
            return Ok(false);
        }
        *slot = block;
        self.generation = self.generation.wrapping_add(1);
        self.modified = true;
        Ok(true)
    }

    /// Number of non-air blocks
    pub fn solid_count(&self) -> usize {
        self.voxels
            .as_ref()
            .map_or(0, |v| v.iter().filter(|b| b.is_solid()).count())
    }

    /// Current render record, if a mesh has been built
    pub fn render(&self) -> Option<&RenderRecord> {
        self.render.as_ref()
    }

    /// Install a new render record, returning the one it replaces
    pub fn replace_render(&mut self, record: Option<RenderRecord>) -> Option<RenderRecord> {
        std::mem::replace(&mut self.render, record)
    }

    /// Detach the render record (on unload)
    pub fn take_render(&mut self) -> Option<RenderRecord> {
        self.render.take()
    }
}

//! GPU-side handles and per-chunk render records.
//!
//! The core never creates graphics objects. Handles are opaque integers issued
//! by the graphics layer, with `0` reserved as the null handle.

use crate::voxel::chunk::ChunkKey;

/// Opaque buffer handle issued by the graphics layer
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub u64);

impl BufferHandle {
    pub const NULL: BufferHandle = BufferHandle(0);

    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

/// Opaque device memory handle issued by the graphics layer
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct MemoryHandle(pub u64);

impl MemoryHandle {
    pub const NULL: MemoryHandle = MemoryHandle(0);

    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

/// A buffer and the memory bound to it, released together
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct GpuAllocation {
    pub buffer: BufferHandle,
    pub memory: MemoryHandle,
}

impl GpuAllocation {
    pub fn new(buffer: BufferHandle, memory: MemoryHandle) -> Self {
        Self { buffer, memory }
    }

    /// Both handles are null
    pub fn is_null(&self) -> bool {
        self.buffer.is_null() && self.memory.is_null()
    }
}

/// Mesh output for one chunk, owned by the chunk until replaced or unloaded
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderRecord {
    /// Chunk this mesh was built for
    pub key: ChunkKey,
    /// Vertex storage
    pub allocation: GpuAllocation,
    /// Number of vertices to draw
    pub vertex_count: u32,
    /// Chunk generation the mesh was built from
    pub generation: u32,
}

impl RenderRecord {
    /// Whether the mesh has no geometry to draw
    pub fn is_empty(&self) -> bool {
        self.vertex_count == 0
    }
}

/// Releases GPU objects on behalf of the garbage collector.
///
/// Implemented by the graphics layer. Never called with null handles.
pub trait ResourceDestroyer {
    fn destroy_buffer(&mut self, buffer: BufferHandle);
    fn free_memory(&mut self, memory: MemoryHandle);
}

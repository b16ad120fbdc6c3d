//! Mesh scheduling and GPU resource lifetime

pub mod handles;
pub mod remesh;
pub mod garbage;

pub use handles::{BufferHandle, GpuAllocation, MemoryHandle, RenderRecord, ResourceDestroyer};
pub use remesh::{DrainReport, MeshBuilder, RemeshContext, RemeshScheduler, MAX_REMESH_PER_FRAME};
pub use garbage::{FrameGarbageCollector, FLUSH_COUNT_PER_FRAME};

//! Dynamic chunk loading around the observer

pub mod shell;
pub mod source;

pub use source::{ChunkSource, LocalChunkSource, NetworkChunkSource, SourceKind};

//! Voxstream - chunk streaming, remesh scheduling and deferred GPU cleanup for voxel worlds

pub mod core;
pub mod math;
pub mod collections;
pub mod voxel;
pub mod streaming;
pub mod render;

//! Error types for the voxel streaming core

use thiserror::Error;

/// Main error type for the crate
#[derive(Debug, Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Config(#[from] serde_json::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Chunk coordinate ({x}, {y}, {z}) is outside the packable range")]
    CoordinateOutOfRange { x: i32, y: i32, z: i32 },

    #[error("Allocation failed: {0}")]
    Allocation(String),

    #[error("Streaming error: {0}")]
    Streaming(String),

    #[error("Unsupported: {0}")]
    Unsupported(String),

    #[error("Mesh error: {0}")]
    Mesh(String),
}

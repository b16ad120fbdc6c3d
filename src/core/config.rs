//! Streaming configuration loaded from JSON.
//!
//! Every field has a default, so a partial file (or `{}`) is valid. Values are
//! clamped into their supported ranges by [`StreamingConfig::validated`].

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::collections::MAX_CAPACITY;
use crate::core::types::Result;
use crate::render::garbage::{DEFAULT_SLOT_CAPACITY, FLUSH_COUNT_PER_FRAME};
use crate::render::remesh::{DEFAULT_QUEUE_CAPACITY, MAX_REMESH_PER_FRAME};
use crate::voxel::registry::MAX_ACQUIRE_RADIUS;

/// Upper bound on frames in flight
pub const MAX_FRAMES_IN_FLIGHT: u32 = 8;

/// Upper bound on the radius kept loaded around spawn
pub const MAX_SPAWN_RADIUS: u32 = 5;

/// Parameters controlling the local terrain height field
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerrainParams {
    pub scale: f32,        // Horizontal scale in blocks (larger = smoother)
    pub height_scale: f32, // Vertical scale (max height in blocks)
    pub base_height: f32,  // Height offset added to the noise
    pub octaves: u32,      // FBM octaves (detail levels)
    pub persistence: f32,  // FBM persistence (0.5 typical)
    pub lacunarity: f32,   // FBM lacunarity (2.0 typical)
    pub dirt_depth: u32,   // Blocks of dirt under the grass layer
}

impl Default for TerrainParams {
    fn default() -> Self {
        Self {
            scale: 96.0,
            height_scale: 48.0,
            base_height: -16.0,
            octaves: 4,
            persistence: 0.5,
            lacunarity: 2.0,
            dirt_depth: 3,
        }
    }
}

/// Configuration for the streaming core
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingConfig {
    /// Number of pipelined frame slots. Must not change while running.
    pub frames_in_flight: u32,
    /// Chunk radius kept loaded around the observer
    pub load_radius: u32,
    /// Chunk radius loaded around the spawn point at startup
    pub spawn_radius: u32,
    /// Remesh jobs drained per frame
    pub remesh_per_frame: usize,
    /// Initial capacity of the pending remesh stack
    pub remesh_queue_capacity: usize,
    /// Remesh jobs queued at once; further requests wait in the world's deferred set
    pub max_pending_remesh: usize,
    /// Initial capacity of each frame slot's destroy queue
    pub garbage_slot_capacity: usize,
    /// Pending destroys released per slot per flush
    pub garbage_flush_per_frame: usize,
    /// Seed for the local chunk source
    pub seed: u32,
    /// Terrain noise parameters
    pub terrain: TerrainParams,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            frames_in_flight: 3,
            load_radius: 4,
            spawn_radius: 2,
            remesh_per_frame: MAX_REMESH_PER_FRAME,
            remesh_queue_capacity: DEFAULT_QUEUE_CAPACITY,
            max_pending_remesh: MAX_CAPACITY,
            garbage_slot_capacity: DEFAULT_SLOT_CAPACITY,
            garbage_flush_per_frame: FLUSH_COUNT_PER_FRAME,
            seed: 12345,
            terrain: TerrainParams::default(),
        }
    }
}

impl StreamingConfig {
    /// Parse a config from a JSON string and clamp it
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        Ok(config.validated())
    }

    /// Load a config from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let config = Self::from_json(&text)?;
        log::info!("Loaded streaming config from {}", path.display());
        Ok(config)
    }

    /// Load a config, writing the defaults to `path` first if it does not exist
    pub fn load_or_create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            return Self::load(path);
        }

        let config = Self::default();
        config.save(path)?;
        log::info!("Created default streaming config at {}", path.display());
        Ok(config)
    }

    /// Write this config as pretty JSON, creating parent directories
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Clamp every field into its supported range, warning on each change
    pub fn validated(mut self) -> Self {
        self.frames_in_flight = clamp_logged("frames_in_flight", self.frames_in_flight, 1, MAX_FRAMES_IN_FLIGHT);
        self.load_radius = clamp_logged("load_radius", self.load_radius, 0, MAX_ACQUIRE_RADIUS);
        self.spawn_radius = clamp_logged("spawn_radius", self.spawn_radius, 0, MAX_SPAWN_RADIUS);
        self.remesh_per_frame = clamp_logged("remesh_per_frame", self.remesh_per_frame, 1, MAX_REMESH_PER_FRAME);
        self.remesh_queue_capacity = self.remesh_queue_capacity.max(1);
        self.max_pending_remesh = clamp_logged("max_pending_remesh", self.max_pending_remesh, 1, MAX_CAPACITY);
        self.garbage_slot_capacity = self.garbage_slot_capacity.max(1);
        self.garbage_flush_per_frame = self.garbage_flush_per_frame.max(1);
        self.terrain.octaves = self.terrain.octaves.clamp(1, 8);
        if self.terrain.scale <= 0.0 {
            log::warn!("terrain.scale must be positive, using default");
            self.terrain.scale = TerrainParams::default().scale;
        }
        self
    }
}

fn clamp_logged<T: PartialOrd + Copy + std::fmt::Display>(name: &str, value: T, min: T, max: T) -> T {
    let clamped = if value < min {
        min
    } else if value > max {
        max
    } else {
        value
    };
    if clamped != value {
        log::warn!("Config value {} = {} out of range, clamped to {}", name, value, clamped);
    }
    clamped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = StreamingConfig::default();
        assert_eq!(config.clone().validated(), config);
        assert_eq!(config.frames_in_flight, 3);
        assert_eq!(config.remesh_per_frame, MAX_REMESH_PER_FRAME);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = StreamingConfig::from_json(r#"{ "load_radius": 6 }"#).unwrap();
        assert_eq!(config.load_radius, 6);
        assert_eq!(config.frames_in_flight, 3);
        assert_eq!(config.terrain, TerrainParams::default());
    }

    #[test]
    fn test_out_of_range_values_clamped() {
        let config = StreamingConfig::from_json(
            r#"{ "frames_in_flight": 0, "load_radius": 1000, "remesh_per_frame": 99, "spawn_radius": 50 }"#,
        )
        .unwrap();
        assert_eq!(config.frames_in_flight, 1);
        assert_eq!(config.load_radius, MAX_ACQUIRE_RADIUS);
        assert_eq!(config.remesh_per_frame, MAX_REMESH_PER_FRAME);
        assert_eq!(config.spawn_radius, MAX_SPAWN_RADIUS);

        let config = StreamingConfig::from_json(r#"{ "max_pending_remesh": 0 }"#).unwrap();
        assert_eq!(config.max_pending_remesh, 1);
        let config = StreamingConfig::from_json(r#"{ "max_pending_remesh": 1000000 }"#).unwrap();
        assert_eq!(config.max_pending_remesh, MAX_CAPACITY);
    }

    #[test]
    fn test_invalid_json_is_config_error() {
        let err = StreamingConfig::from_json("{ not json").unwrap_err();
        assert!(matches!(err, crate::core::Error::Config(_)));
    }

    #[test]
    fn test_load_or_create_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config").join("streaming.json");

        let created = StreamingConfig::load_or_create(&path).unwrap();
        assert!(path.exists());
        assert_eq!(created, StreamingConfig::default());

        // Second call reads the file back
        let loaded = StreamingConfig::load_or_create(&path).unwrap();
        assert_eq!(loaded, created);
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = StreamingConfig::load(dir.path().join("missing.json")).unwrap_err();
        assert!(matches!(err, crate::core::Error::Io(_)));
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.json");

        let mut config = StreamingConfig::default();
        config.seed = 42;
        config.terrain.octaves = 6;
        config.save(&path).unwrap();

        assert_eq!(StreamingConfig::load(&path).unwrap(), config);
    }
}

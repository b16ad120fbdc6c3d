//! ChunkRegistry - owns every chunk currently known to the world.
//!
//! Chunks live in an arena keyed by [`ChunkKey`]. Other subsystems hold keys,
//! never references, and look chunks up when they need them.

use std::collections::HashMap;

use crate::core::error::Error;
use crate::core::types::Result;
use crate::streaming::shell::ShellCache;
use crate::streaming::source::ChunkSource;
use crate::voxel::chunk::{Chunk, ChunkCoord, ChunkKey, ChunkState, Face};

/// Largest radius accepted by [`ChunkRegistry::acquire`]
pub const MAX_ACQUIRE_RADIUS: u32 = 32;

/// Result of an acquire call, both lists in shell order
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Acquired {
    /// Placeholders created by this call
    pub new: Vec<ChunkKey>,
    /// Chunks that were already registered
    pub existing: Vec<ChunkKey>,
}

impl Acquired {
    /// Total number of positions covered
    pub fn len(&self) -> usize {
        self.new.len() + self.existing.len()
    }

    pub fn is_empty(&self) -> bool {
        self.new.is_empty() && self.existing.is_empty()
    }
}

/// Outcome of a populate pass
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PopulateReport {
    /// Chunks that now hold voxel data
    pub populated: Vec<ChunkKey>,
    /// Chunks the source could not fill
    pub failed: Vec<ChunkKey>,
    /// Keys that were unknown or already populated
    pub skipped: usize,
}

/// Owner of all registered chunks
pub struct ChunkRegistry {
    chunks: HashMap<ChunkKey, Chunk>,
    /// Sorted acquire offsets per radius
    shells: ShellCache,
    created_total: u64,
    unloaded_total: u64,
}

impl ChunkRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            chunks: HashMap::new(),
            shells: ShellCache::new(),
            created_total: 0,
            unloaded_total: 0,
        }
    }

    /// Resolve every position within `radius` of `center`.
    ///
    /// Positions already registered are returned in `existing`; the rest get
    /// empty placeholders and are returned in `new`. This is the only place
    /// chunks are created. Radii above [`MAX_ACQUIRE_RADIUS`] are clamped.
    ///
    /// On failure nothing is registered.
    pub fn acquire(&mut self, center: ChunkCoord, radius: u32) -> Result<Acquired> {
        let radius = if radius > MAX_ACQUIRE_RADIUS {
            log::warn!(
                "Acquire radius {} exceeds maximum, clamped to {}",
                radius,
                MAX_ACQUIRE_RADIUS
            );
            MAX_ACQUIRE_RADIUS
        } else {
            radius
        };

        let coords = self.shells.expand(center, radius).inspect_err(|e| {
            log::error!("Failed to expand acquire region around {}: {}", center, e);
        })?;

        let mut acquired = Acquired::default();
        for coord in coords {
            let key = ChunkKey::from_coord(coord)?;
            if self.chunks.contains_key(&key) {
                acquired.existing.push(key);
            } else {
                acquired.new.push(key);
            }
        }

        self.chunks.try_reserve(acquired.new.len()).map_err(|e| {
            log::error!("Failed to reserve {} chunk slots: {}", acquired.new.len(), e);
            Error::Allocation(format!("chunk registry growth: {}", e))
        })?;

        for &key in &acquired.new {
            self.chunks.insert(key, Chunk::new(key));
        }
        self.created_total += acquired.new.len() as u64;

        log::debug!(
            "Acquired radius {} around {}: {} new, {} existing",
            radius,
            center,
            acquired.new.len(),
            acquired.existing.len()
        );
        Ok(acquired)
    }

    /// Fill newly created chunks from `source`.
    ///
    /// Only empty placeholders are handed to the source, so each chunk is
    /// populated at most once. Chunks the source fails on are marked failed.
    pub fn populate(&mut self, source: &mut dyn ChunkSource, keys: &[ChunkKey]) -> PopulateReport {
        let mut report = PopulateReport::default();

        for &key in keys {
            let Some(chunk) = self.chunks.get_mut(&key) else {
                log::warn!("Populate requested for unknown chunk {}", key);
                report.skipped += 1;
                continue;
            };

            if !chunk.begin_loading() {
                log::warn!("Chunk {} already populated (state {:?}), skipping", key, chunk.state());
                report.skipped += 1;
                continue;
            }

            match source.populate(chunk) {
                Ok(()) if chunk.is_loaded() => report.populated.push(key),
                Ok(()) => {
                    log::error!("{:?} source returned without filling chunk {}", source.kind(), key);
                    chunk.mark_failed();
                    report.failed.push(key);
                }
                Err(e) => {
                    log::error!("{:?} source failed to populate chunk {}: {}", source.kind(), key, e);
                    chunk.mark_failed();
                    report.failed.push(key);
                }
            }
        }

        log::debug!(
            "Populated {} chunks ({} failed, {} skipped)",
            report.populated.len(),
            report.failed.len(),
            report.skipped
        );
        report
    }

    /// Remove a chunk, handing it back to the caller
    pub fn unload(&mut self, key: ChunkKey) -> Option<Chunk> {
        let chunk = self.chunks.remove(&key)?;
        self.unloaded_total += 1;
        log::trace!("Unloaded chunk {}", key);
        Some(chunk)
    }

    pub fn get(&self, key: ChunkKey) -> Option<&Chunk> {
        self.chunks.get(&key)
    }

    pub fn get_mut(&mut self, key: ChunkKey) -> Option<&mut Chunk> {
        self.chunks.get_mut(&key)
    }

    /// Look up a chunk by coordinate
    pub fn get_at(&self, coord: ChunkCoord) -> Option<&Chunk> {
        let key = ChunkKey::from_coord(coord).ok()?;
        self.chunks.get(&key)
    }

    pub fn contains(&self, key: ChunkKey) -> bool {
        self.chunks.contains_key(&key)
    }

    /// Whether the chunk is registered and holds voxel data
    pub fn is_loaded(&self, key: ChunkKey) -> bool {
        self.chunks.get(&key).is_some_and(Chunk::is_loaded)
    }

    /// Registered face neighbors in [`Face::ALL`] order
    pub fn neighbors(&self, key: ChunkKey) -> [Option<ChunkKey>; 6] {
        let coord = key.coord();
        Face::ALL.map(|face| {
            let neighbor = coord.neighbor(face)?;
            let key = ChunkKey::from_coord(neighbor).ok()?;
            self.chunks.contains_key(&key).then_some(key)
        })
    }

    /// Face neighbors that currently hold voxel data, in face order
    pub fn loaded_neighbors(&self, key: ChunkKey) -> Vec<ChunkKey> {
        self.neighbors(key)
            .into_iter()
            .flatten()
            .filter(|&n| self.is_loaded(n))
            .collect()
    }

    /// All registered keys, sorted
    pub fn keys_in_order(&self) -> Vec<ChunkKey> {
        let mut keys: Vec<ChunkKey> = self.chunks.keys().copied().collect();
        keys.sort_unstable();
        keys
    }

    pub fn iter(&self) -> impl Iterator<Item = &Chunk> {
        self.chunks.values()
    }

    /// Number of registered chunks
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Number of chunks holding voxel data
    pub fn loaded_count(&self) -> usize {
        self.chunks.values().filter(|c| c.is_loaded()).count()
    }

    /// Number of chunks whose population failed
    pub fn failed_count(&self) -> usize {
        self.chunks
            .values()
            .filter(|c| c.state() == ChunkState::Failed)
            .count()
    }

    /// Chunks created over the registry's lifetime
    pub fn created_total(&self) -> u64 {
        self.created_total
    }

    /// Chunks unloaded over the registry's lifetime
    pub fn unloaded_total(&self) -> u64 {
        self.unloaded_total
    }

    /// Distinct acquire radii whose shell order has been computed
    pub fn cached_shell_radii(&self) -> usize {
        self.shells.len()
    }
}

impl Default for ChunkRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ChunkRegistry {
    fn drop(&mut self) {
        log::debug!(
            "ChunkRegistry dropped: {} live, {} created, {} unloaded",
            self.chunks.len(),
            self.created_total,
            self.unloaded_total
        );
    }
}

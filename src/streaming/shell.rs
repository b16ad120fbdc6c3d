//! Point expansion around a center chunk.
//!
//! Produces every chunk coordinate inside the cube of the given radius, ordered
//! nearest shell first. Shell `n` holds the positions whose Chebyshev distance
//! from the center is exactly `n`; within a shell positions are ordered by
//! squared Euclidean distance, then by x, y, z. The order is deterministic for
//! a given radius and independent of the center.

use std::cmp::Ordering;
use std::collections::hash_map::Entry;
use std::collections::HashMap;

use glam::IVec3;

use crate::core::error::Error;
use crate::core::types::Result;
use crate::math::packing;
use crate::voxel::chunk::ChunkCoord;

/// Number of positions in the cube of `radius`
pub fn cube_len(radius: u32) -> usize {
    let side = 2 * radius as usize + 1;
    side.saturating_mul(side).saturating_mul(side)
}

/// Number of positions in shell `n` alone
pub fn shell_len(n: u32) -> usize {
    if n == 0 {
        1
    } else {
        cube_len(n) - cube_len(n - 1)
    }
}

/// Chebyshev distance from the origin, i.e. the shell an offset belongs to
pub fn shell_of(offset: IVec3) -> u32 {
    offset.abs().max_element() as u32
}

fn compare_offsets(a: &IVec3, b: &IVec3) -> Ordering {
    shell_of(*a)
        .cmp(&shell_of(*b))
        .then_with(|| a.length_squared().cmp(&b.length_squared()))
        .then_with(|| a.x.cmp(&b.x))
        .then_with(|| a.y.cmp(&b.y))
        .then_with(|| a.z.cmp(&b.z))
}

/// Offsets of every position in the cube of `radius`, in shell order
pub fn offsets(radius: u32) -> Result<Vec<IVec3>> {
    let len = cube_len(radius);
    let mut out = Vec::new();
    out.try_reserve_exact(len)
        .map_err(|e| Error::Allocation(format!("shell of radius {} ({} positions): {}", radius, len, e)))?;

    let r = radius as i32;
    for x in -r..=r {
        for y in -r..=r {
            for z in -r..=r {
                out.push(IVec3::new(x, y, z));
            }
        }
    }
    out.sort_unstable_by(compare_offsets);
    Ok(out)
}

/// Expand `center` into every chunk coordinate within `radius`, in shell order.
///
/// Fails without producing anything if a position would fall outside the
/// packable coordinate range or storage cannot be allocated.
pub fn expand(center: ChunkCoord, radius: u32) -> Result<Vec<ChunkCoord>> {
    check_range(center, radius)?;
    translate(center, &offsets(radius)?)
}

/// Sorted offsets kept per radius, so repeated expansions skip the sort
#[derive(Debug, Default)]
pub struct ShellCache {
    cached: HashMap<u32, Vec<IVec3>>,
}

impl ShellCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offsets for `radius`, computed on first use
    pub fn offsets(&mut self, radius: u32) -> Result<&[IVec3]> {
        let slot = match self.cached.entry(radius) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let sorted = offsets(radius)?;
                log::debug!("Cached shell offsets for radius {} ({} positions)", radius, sorted.len());
                entry.insert(sorted)
            }
        };
        Ok(slot.as_slice())
    }

    /// Same as [`expand`], reusing the cached offsets for `radius`
    pub fn expand(&mut self, center: ChunkCoord, radius: u32) -> Result<Vec<ChunkCoord>> {
        check_range(center, radius)?;
        translate(center, self.offsets(radius)?)
    }

    /// Number of radii cached
    pub fn len(&self) -> usize {
        self.cached.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cached.is_empty()
    }
}

/// Every position within `radius` of `center` must be packable
fn check_range(center: ChunkCoord, radius: u32) -> Result<()> {
    let r = i32::try_from(radius)
        .map_err(|_| Error::InvalidArgument(format!("expansion radius {} too large", radius)))?;
    let axis_fits = |c: i32| match (c.checked_sub(r), c.checked_add(r)) {
        (Some(lo), Some(hi)) => packing::axis_in_range(lo) && packing::axis_in_range(hi),
        _ => false,
    };
    if !(axis_fits(center.x) && axis_fits(center.y) && axis_fits(center.z)) {
        return Err(Error::CoordinateOutOfRange {
            x: center.x,
            y: center.y,
            z: center.z,
        });
    }
    Ok(())
}

fn translate(center: ChunkCoord, offsets: &[IVec3]) -> Result<Vec<ChunkCoord>> {
    let mut coords = Vec::new();
    coords
        .try_reserve_exact(offsets.len())
        .map_err(|e| Error::Allocation(format!("expanded coordinates: {}", e)))?;
    coords.extend(
        offsets
            .iter()
            .map(|o| ChunkCoord::new(center.x + o.x, center.y + o.y, center.z + o.z)),
    );
    Ok(coords)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_radius_zero_is_center() {
        let center = ChunkCoord::new(3, -2, 7);
        assert_eq!(expand(center, 0).unwrap(), vec![center]);
    }

    #[test]
    fn test_counts() {
        assert_eq!(cube_len(0), 1);
        assert_eq!(cube_len(1), 27);
        assert_eq!(cube_len(2), 125);
        assert_eq!(shell_len(1), 26);
        assert_eq!(shell_len(2), 98);

        for r in 0..4 {
            let coords = expand(ChunkCoord::ZERO, r).unwrap();
            assert_eq!(coords.len(), cube_len(r));
            let unique: HashSet<_> = coords.iter().copied().collect();
            assert_eq!(unique.len(), coords.len());
        }
    }

    #[test]
    fn test_shells_are_nearest_first() {
        let coords = expand(ChunkCoord::ZERO, 3).unwrap();
        let shells: Vec<u32> = coords
            .iter()
            .map(|c| shell_of(IVec3::new(c.x, c.y, c.z)))
            .collect();
        assert!(shells.windows(2).all(|w| w[0] <= w[1]));

        // Face neighbors come before edge and corner neighbors in shell 1
        let first_shell = &coords[1..27];
        let d2: Vec<i32> = first_shell
            .iter()
            .map(|c| IVec3::new(c.x, c.y, c.z).length_squared())
            .collect();
        assert!(d2[..6].iter().all(|&d| d == 1));
        assert!(d2[6..18].iter().all(|&d| d == 2));
        assert!(d2[18..].iter().all(|&d| d == 3));
    }

    #[test]
    fn test_order_is_translation_invariant() {
        let a = expand(ChunkCoord::ZERO, 2).unwrap();
        let b = expand(ChunkCoord::new(10, -4, 100), 2).unwrap();
        for (pa, pb) in a.iter().zip(&b) {
            assert_eq!((pb.x - 10, pb.y + 4, pb.z - 100), (pa.x, pa.y, pa.z));
        }
    }

    #[test]
    fn test_out_of_range_center_fails() {
        let edge = ChunkCoord::new(packing::AXIS_MAX, 0, 0);
        assert!(expand(edge, 0).is_ok());
        assert!(matches!(
            expand(edge, 1),
            Err(Error::CoordinateOutOfRange { .. })
        ));
        assert!(expand(ChunkCoord::new(0, i32::MIN, 0), 1).is_err());
    }

    #[test]
    fn test_cache_matches_uncached_expansion() {
        let mut cache = ShellCache::new();
        let center = ChunkCoord::new(-7, 3, 12);
        for r in 0..4 {
            assert_eq!(cache.expand(center, r).unwrap(), expand(center, r).unwrap());
        }
        assert_eq!(cache.len(), 4);

        // Another center reuses the cached radius
        let moved = cache.expand(ChunkCoord::new(1, 1, 1), 2).unwrap();
        assert_eq!(moved, expand(ChunkCoord::new(1, 1, 1), 2).unwrap());
        assert_eq!(cache.len(), 4);
        assert_eq!(cache.offsets(2).unwrap().len(), cube_len(2));
    }

    #[test]
    fn test_cache_rejects_out_of_range_without_caching() {
        let mut cache = ShellCache::new();
        let edge = ChunkCoord::new(packing::AXIS_MAX, 0, 0);
        assert!(cache.expand(edge, 1).is_err());
        assert!(cache.is_empty());
    }
}

//! Bit packing of chunk coordinates into 64-bit keys
//!
//! Two layouts are used:
//! - Column keys: `x` in the high 32 bits, `z` in the low 32 bits. Lossless for
//!   the full `i32` range.
//! - Chunk keys: `[63] loaded | [62..42] x | [41..21] y | [20..0] z`, each axis a
//!   21-bit two's complement value (-1_048_576 ..= 1_048_575).

/// Bits per axis in the 3-axis layout
pub const BITS_PER_AXIS: u32 = 21;

/// Mask for a single packed axis
pub const AXIS_MASK: u64 = (1 << BITS_PER_AXIS) - 1;

/// Flag bit marking a packed chunk as loaded
pub const LOADED_FLAG: u64 = 1 << 63;

/// Smallest axis value representable in the 3-axis layout
pub const AXIS_MIN: i32 = -(1 << (BITS_PER_AXIS - 1));

/// Largest axis value representable in the 3-axis layout
pub const AXIS_MAX: i32 = (1 << (BITS_PER_AXIS - 1)) - 1;

/// Pack signed x and z into one `u64` (x high, z low)
pub fn pack_xz(x: i32, z: i32) -> u64 {
    // Go through u32 so a negative value keeps its exact bit pattern
    ((x as u32 as u64) << 32) | (z as u32 as u64)
}

/// Unpack a column key produced by [`pack_xz`]
pub fn unpack_xz(key: u64) -> (i32, i32) {
    ((key >> 32) as u32 as i32, key as u32 as i32)
}

/// Check whether a value fits the 21-bit signed axis range
pub fn axis_in_range(v: i32) -> bool {
    (AXIS_MIN..=AXIS_MAX).contains(&v)
}

/// Pack three 21-bit signed axes plus the loaded flag.
///
/// Values outside [`AXIS_MIN`]..=[`AXIS_MAX`] are truncated to their low 21
/// bits; validate with [`axis_in_range`] first.
pub fn pack_xyz(x: i32, y: i32, z: i32, loaded: bool) -> u64 {
    let ux = (x as u32 as u64 & AXIS_MASK) << (BITS_PER_AXIS * 2);
    let uy = (y as u32 as u64 & AXIS_MASK) << BITS_PER_AXIS;
    let uz = z as u32 as u64 & AXIS_MASK;
    let flag = if loaded { LOADED_FLAG } else { 0 };
    flag | ux | uy | uz
}

/// Sign-extend a 21-bit field to i32
fn sign_extend(field: u64) -> i32 {
    let shift = 32 - BITS_PER_AXIS;
    ((field as u32) << shift) as i32 >> shift
}

/// Unpack a key produced by [`pack_xyz`] into `(x, y, z, loaded)`
pub fn unpack_xyz(key: u64) -> (i32, i32, i32, bool) {
    (
        sign_extend((key >> (BITS_PER_AXIS * 2)) & AXIS_MASK),
        sign_extend((key >> BITS_PER_AXIS) & AXIS_MASK),
        sign_extend(key & AXIS_MASK),
        is_loaded(key),
    )
}

/// Set or clear the loaded flag without touching the coordinate bits
pub fn set_loaded(key: u64, loaded: bool) -> u64 {
    if loaded {
        key | LOADED_FLAG
    } else {
        key & !LOADED_FLAG
    }
}

/// Read the loaded flag
pub fn is_loaded(key: u64) -> bool {
    key & LOADED_FLAG != 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_xz_roundtrip_boundaries() {
        let values = [i32::MIN, i32::MIN + 1, -1_000_000, -1, 0, 1, 1_000_000, i32::MAX - 1, i32::MAX];
        for &x in &values {
            for &z in &values {
                assert_eq!(unpack_xz(pack_xz(x, z)), (x, z), "Failed for ({}, {})", x, z);
            }
        }
    }

    #[test]
    fn test_xz_layout() {
        assert_eq!(pack_xz(0, 0), 0);
        assert_eq!(pack_xz(1, 0), 1 << 32);
        assert_eq!(pack_xz(0, 1), 1);
        // -1 in z must not bleed into the x half
        assert_eq!(pack_xz(0, -1), 0x0000_0000_ffff_ffff);
        assert_eq!(pack_xz(-1, 0), 0xffff_ffff_0000_0000);
    }

    #[test]
    fn test_xz_distinct_keys() {
        assert_ne!(pack_xz(1, 2), pack_xz(2, 1));
        assert_ne!(pack_xz(-1, 0), pack_xz(0, -1));
    }

    #[test]
    fn test_xyz_roundtrip() {
        let values = [AXIS_MIN, AXIS_MIN + 1, -4096, -17, -1, 0, 1, 17, 4096, AXIS_MAX - 1, AXIS_MAX];
        for &x in &values {
            for &y in &values {
                for &z in &values {
                    for loaded in [false, true] {
                        let key = pack_xyz(x, y, z, loaded);
                        assert_eq!(unpack_xyz(key), (x, y, z, loaded), "Failed for ({}, {}, {})", x, y, z);
                    }
                }
            }
        }
    }

    #[test]
    fn test_axis_range() {
        assert_eq!(AXIS_MIN, -1_048_576);
        assert_eq!(AXIS_MAX, 1_048_575);
        assert!(axis_in_range(AXIS_MIN));
        assert!(axis_in_range(AXIS_MAX));
        assert!(!axis_in_range(AXIS_MIN - 1));
        assert!(!axis_in_range(AXIS_MAX + 1));
    }

    #[test]
    fn test_flag_does_not_disturb_coordinates() {
        let key = pack_xyz(-5, 300, AXIS_MIN, false);
        assert!(!is_loaded(key));

        let loaded = set_loaded(key, true);
        assert!(is_loaded(loaded));
        assert_eq!(loaded & !LOADED_FLAG, key);
        assert_eq!(unpack_xyz(loaded), (-5, 300, AXIS_MIN, true));

        let cleared = set_loaded(loaded, false);
        assert_eq!(cleared, key);
        // Setting twice is idempotent
        assert_eq!(set_loaded(loaded, true), loaded);
    }

    #[test]
    fn test_xyz_layout() {
        assert_eq!(pack_xyz(0, 0, 1, false), 1);
        assert_eq!(pack_xyz(0, 1, 0, false), 1 << 21);
        assert_eq!(pack_xyz(1, 0, 0, false), 1 << 42);
        assert_eq!(pack_xyz(0, 0, 0, true), LOADED_FLAG);
        // Negative z stays inside its 21-bit field
        assert_eq!(pack_xyz(0, 0, -1, false), AXIS_MASK);
    }
}

//! Mathematical utilities

pub mod packing;

pub use packing::{pack_xz, unpack_xz, pack_xyz, unpack_xyz};

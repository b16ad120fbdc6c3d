//! Collection types backing the work queues

pub mod growable_stack;

pub use growable_stack::{GrowableStack, MAX_CAPACITY};

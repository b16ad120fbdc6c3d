//! Growable LIFO stack with a clamped logical capacity.
//!
//! Capacity is tracked separately from the backing `Vec` so the growth policy
//! is explicit: a full stack doubles on push up to [`MAX_CAPACITY`], and it
//! only ever shrinks through [`GrowableStack::resize`].

use crate::core::error::Error;
use crate::core::types::Result;

/// Hard upper bound on stack capacity
pub const MAX_CAPACITY: usize = 16384;

/// Capacity multiplier applied when a push finds the stack full
pub const GROWTH_FACTOR: usize = 2;

/// LIFO stack with `1 <= capacity <= MAX_CAPACITY` and `len <= capacity`.
#[derive(Debug)]
pub struct GrowableStack<T> {
    items: Vec<T>,
    capacity: usize,
    default_capacity: usize,
}

impl<T> GrowableStack<T> {
    /// Create a stack, clamping the requested capacity into `[1, MAX_CAPACITY]`.
    ///
    /// Fails only if the backing storage cannot be allocated.
    pub fn with_capacity(requested: usize) -> Result<Self> {
        let capacity = requested.clamp(1, MAX_CAPACITY);
        let mut items = Vec::new();
        items.try_reserve_exact(capacity).map_err(|e| {
            Error::Allocation(format!("stack storage for {} items: {}", capacity, e))
        })?;

        Ok(Self {
            items,
            capacity,
            default_capacity: capacity,
        })
    }

    /// Push an item, doubling capacity if full.
    ///
    /// Returns `false` and leaves the stack unchanged if it is already at
    /// [`MAX_CAPACITY`] or growth allocation fails.
    pub fn push(&mut self, item: T) -> bool {
        if self.items.len() == self.capacity {
            let grown = self.capacity.saturating_mul(GROWTH_FACTOR).min(MAX_CAPACITY);
            if grown == self.capacity {
                log::warn!("Stack is full at max capacity {}, push rejected", MAX_CAPACITY);
                return false;
            }
            if !self.resize(grown) {
                return false;
            }
        }

        self.items.push(item);
        true
    }

    /// Pop the most recently pushed item
    pub fn pop(&mut self) -> Option<T> {
        self.items.pop()
    }

    /// Peek at the most recently pushed item
    pub fn peek(&self) -> Option<&T> {
        self.items.last()
    }

    /// Set the capacity to exactly `new_capacity`, preserving order.
    ///
    /// Fails without mutation if `new_capacity` is zero, below the current
    /// length, above [`MAX_CAPACITY`], or the allocation fails. Resizing to
    /// the current capacity is a successful no-op.
    pub fn resize(&mut self, new_capacity: usize) -> bool {
        if new_capacity == 0 || new_capacity > MAX_CAPACITY {
            return false;
        }

        if new_capacity < self.items.len() {
            log::warn!(
                "Attempted to shrink a stack to {} below its length {}",
                new_capacity,
                self.items.len()
            );
            return false;
        }

        if new_capacity == self.capacity {
            return true;
        }

        if new_capacity > self.items.capacity() {
            let additional = new_capacity - self.items.len();
            if self.items.try_reserve_exact(additional).is_err() {
                log::error!("Failed to grow stack storage to {} items", new_capacity);
                return false;
            }
        } else {
            self.items.shrink_to(new_capacity);
        }

        self.capacity = new_capacity;
        true
    }

    /// Restore the capacity given at creation, if the current length allows it
    pub fn reset_capacity(&mut self) -> bool {
        self.resize(self.default_capacity.max(self.items.len()))
    }

    /// Number of items on the stack
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the stack holds no items
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Current logical capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Capacity requested at creation (after clamping)
    pub fn default_capacity(&self) -> usize {
        self.default_capacity
    }

    /// Whether the next push needs to grow the stack
    pub fn is_full(&self) -> bool {
        self.items.len() == self.capacity
    }

    /// Iterate items from bottom (oldest) to top (newest)
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    /// Remove all items, keeping the capacity
    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Pop every item in LIFO order
    pub fn drain(&mut self) -> impl Iterator<Item = T> + '_ {
        std::iter::from_fn(move || self.items.pop())
    }

    /// Keep only the items matching `keep`, preserving order. Returns the number removed.
    pub fn retain(&mut self, keep: impl FnMut(&T) -> bool) -> usize {
        let before = self.items.len();
        self.items.retain(keep);
        before - self.items.len()
    }
}

impl<T: PartialEq> GrowableStack<T> {
    /// Push only if no equal item is already on the stack (linear scan).
    pub fn push_unique(&mut self, item: T) -> bool {
        if self.contains(&item) {
            return false;
        }
        self.push(item)
    }

    /// Check whether an equal item is on the stack
    pub fn contains(&self, item: &T) -> bool {
        self.items.iter().any(|existing| existing == item)
    }
}

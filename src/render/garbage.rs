//! Frame-indexed deferred destruction of GPU resources.
//!
//! Each frame-in-flight slot owns a FIFO of buffer/memory pairs. Pushing is
//! always safe. Flushing a slot releases its oldest entries and must only
//! happen once the caller knows the GPU has finished that slot's previous
//! frame (fence wait). The collector does not track GPU completion itself.

use std::collections::VecDeque;

use crate::core::error::Error;
use crate::core::types::Result;
use crate::render::handles::{BufferHandle, GpuAllocation, MemoryHandle, RenderRecord, ResourceDestroyer};

/// Entries released per slot per non-final flush
pub const FLUSH_COUNT_PER_FRAME: usize = 32;

/// Initial capacity of each slot's queue
pub const DEFAULT_SLOT_CAPACITY: usize = 1024;

/// Destroy queue for one frame slot
struct GarbageSlot {
    queue: VecDeque<GpuAllocation>,
    capacity: usize,
}

impl GarbageSlot {
    fn new(capacity: usize) -> Result<Self> {
        let mut queue = VecDeque::new();
        queue
            .try_reserve_exact(capacity)
            .map_err(|e| Error::Allocation(format!("garbage slot of {} entries: {}", capacity, e)))?;
        Ok(Self { queue, capacity })
    }

    /// Double the capacity.
    ///
    /// # Panics
    ///
    /// If the allocation fails. A dropped entry would leak or be freed while
    /// still in use, so there is no safe way to continue.
    fn grow(&mut self) {
        let grown = self.capacity.saturating_mul(2);
        let additional = grown - self.queue.len();
        if let Err(e) = self.queue.try_reserve_exact(additional) {
            log::error!("Garbage queue growth to {} entries failed: {}", grown, e);
            panic!("failed to grow garbage queue to {} entries: {}", grown, e);
        }
        log::debug!("Garbage queue grown from {} to {} entries", self.capacity, grown);
        self.capacity = grown;
    }
}

/// Per-frame-slot deferred destruction queues
pub struct FrameGarbageCollector {
    slots: Vec<GarbageSlot>,
    flush_per_frame: usize,
    destroyed_total: u64,
}

impl FrameGarbageCollector {
    /// Create one queue per frame in flight
    pub fn new(frames_in_flight: usize, default_capacity: usize, flush_per_frame: usize) -> Result<Self> {
        if frames_in_flight == 0 {
            return Err(Error::InvalidArgument("frames_in_flight must be at least 1".into()));
        }

        let capacity = default_capacity.max(1);
        let slots = (0..frames_in_flight)
            .map(|_| GarbageSlot::new(capacity))
            .collect::<Result<Vec<_>>>()?;

        log::debug!(
            "Garbage collector created: {} slots of {} entries",
            frames_in_flight,
            capacity
        );
        Ok(Self {
            slots,
            flush_per_frame: flush_per_frame.max(1),
            destroyed_total: 0,
        })
    }

    fn slot_mut(&mut self, slot: usize) -> Result<&mut GarbageSlot> {
        let count = self.slots.len();
        self.slots
            .get_mut(slot)
            .ok_or_else(|| Error::InvalidArgument(format!("frame slot {} out of range (have {})", slot, count)))
    }

    /// Queue a buffer and its memory for release once `slot` is retired.
    ///
    /// # Panics
    ///
    /// If the slot queue needs to grow and the allocation fails.
    pub fn push_garbage(&mut self, slot: usize, buffer: BufferHandle, memory: MemoryHandle) -> Result<()> {
        let queue = self.slot_mut(slot)?;
        if queue.queue.len() == queue.capacity {
            queue.grow();
        }
        queue.queue.push_back(GpuAllocation::new(buffer, memory));
        Ok(())
    }

    /// Queue the handles of a replaced or unloaded render record
    pub fn retire_record(&mut self, slot: usize, record: RenderRecord) -> Result<()> {
        self.push_garbage(slot, record.allocation.buffer, record.allocation.memory)
    }

    /// Release the oldest entries of `slot`: a batch, or everything if `flush_all`.
    ///
    /// Returns the number of entries released. Null handles are skipped.
    pub fn flush_garbage(
        &mut self,
        slot: usize,
        flush_all: bool,
        destroyer: &mut dyn ResourceDestroyer,
    ) -> Result<usize> {
        let batch = self.flush_per_frame;
        let queue = self.slot_mut(slot)?;
        let count = if flush_all {
            queue.queue.len()
        } else {
            queue.queue.len().min(batch)
        };

        for entry in queue.queue.drain(..count) {
            if !entry.buffer.is_null() {
                destroyer.destroy_buffer(entry.buffer);
            }
            if !entry.memory.is_null() {
                destroyer.free_memory(entry.memory);
            }
        }

        self.destroyed_total += count as u64;
        if count > 0 {
            log::trace!("Flushed {} garbage entries from slot {}", count, slot);
        }
        Ok(count)
    }

    /// Release everything in every slot. Call once all GPU work has completed.
    pub fn shutdown(&mut self, destroyer: &mut dyn ResourceDestroyer) -> usize {
        let mut released = 0;
        for slot in 0..self.slots.len() {
            // Slot indices come from our own range
            released += self.flush_garbage(slot, true, destroyer).unwrap_or(0);
        }
        log::debug!(
            "Garbage collector shut down: {} released, {} total",
            released,
            self.destroyed_total
        );
        released
    }

    /// Entries waiting in `slot`, 0 for an unknown slot
    pub fn pending(&self, slot: usize) -> usize {
        self.slots.get(slot).map_or(0, |s| s.queue.len())
    }

    /// Entries waiting across all slots
    pub fn total_pending(&self) -> usize {
        self.slots.iter().map(|s| s.queue.len()).sum()
    }

    /// Current queue capacity of `slot`
    pub fn slot_capacity(&self, slot: usize) -> Option<usize> {
        self.slots.get(slot).map(|s| s.capacity)
    }

    pub fn frames_in_flight(&self) -> usize {
        self.slots.len()
    }

    pub fn flush_per_frame(&self) -> usize {
        self.flush_per_frame
    }

    /// Entries released over the collector's lifetime
    pub fn destroyed_total(&self) -> u64 {
        self.destroyed_total
    }
}

impl Drop for FrameGarbageCollector {
    fn drop(&mut self) {
        let pending = self.total_pending();
        if pending > 0 {
            log::warn!("Garbage collector dropped with {} entries never released", pending);
        }
    }
}

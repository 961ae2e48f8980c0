//! Fence-gated pool of command allocators.
//!
//! One pool exists per queue type. An allocator is owned by exactly one
//! recording context while it records; when the context finishes, the
//! allocator is released tagged with the fence of that submission and is not
//! reset or reissued before the queue has completed it.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::backend::{Api, CommandAllocator, Device};
use crate::error::Result;
use crate::fenced::FencedQueue;
use crate::types::{FenceValue, QueueType};

/// Command allocators of one queue type.
pub struct AllocatorPool<A: Api> {
    queue_type: QueueType,
    retired: FencedQueue<A::CommandAllocator>,
    created: AtomicUsize,
}

impl<A: Api> AllocatorPool<A> {
    pub fn new(queue_type: QueueType) -> Self {
        Self {
            queue_type,
            retired: FencedQueue::new(),
            created: AtomicUsize::new(0),
        }
    }

    pub fn queue_type(&self) -> QueueType {
        self.queue_type
    }

    /// Hand out an allocator that no in-flight submission uses.
    ///
    /// Reuses (and resets) a retired allocator whose fence is reached by
    /// `completed`, or creates a new one.
    pub fn acquire(&self, device: &A::Device, completed: FenceValue) -> Result<A::CommandAllocator> {
        if let Some((fence, mut allocator)) = self.retired.take_reached(completed) {
            allocator.reset()?;
            log::trace!(
                "AllocatorPool[{:?}]: reusing allocator retired at fence {} (completed {})",
                self.queue_type,
                fence,
                completed
            );
            return Ok(allocator);
        }

        let allocator = device.create_allocator(self.queue_type)?;
        let total = self.created.fetch_add(1, Ordering::Relaxed) + 1;
        log::debug!(
            "AllocatorPool[{:?}]: created allocator ({} total)",
            self.queue_type,
            total
        );
        Ok(allocator)
    }

    /// Return an allocator that backed a submission signaled by `fence`.
    pub fn release_after(&self, allocator: A::CommandAllocator, fence: FenceValue) {
        log::trace!(
            "AllocatorPool[{:?}]: allocator retired until fence {}",
            self.queue_type,
            fence
        );
        self.retired.release(allocator, fence);
    }

    /// Number of allocators ever created by this pool.
    pub fn created(&self) -> usize {
        self.created.load(Ordering::Relaxed)
    }

    /// Number of allocators parked in the pool.
    pub fn retired(&self) -> usize {
        self.retired.len()
    }

    /// Number of parked allocators that could be reissued now.
    pub fn available(&self, completed: FenceValue) -> usize {
        self.retired.reached_count(completed)
    }

    pub(crate) fn clear(&self) {
        self.retired.clear();
    }
}

impl<A: Api> std::fmt::Debug for AllocatorPool<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AllocatorPool")
            .field("queue_type", &self.queue_type)
            .field("created", &self.created())
            .field("retired", &self.retired)
            .finish()
    }
}

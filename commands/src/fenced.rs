//! Fence-gated recycling queue.
//!
//! Objects handed back after a submission (command allocators, upload pages)
//! may still be in use by the GPU. They are parked here together with the
//! fence of that submission and only handed out again once the queue's
//! completed value has passed it.

use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::types::FenceValue;

/// Thread-safe queue of objects waiting for a fence.
pub struct FencedQueue<T> {
    entries: Mutex<VecDeque<(FenceValue, T)>>,
}

impl<T> FencedQueue<T> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
        }
    }

    /// Park `item` until the GPU reaches `fence`.
    pub fn release(&self, item: T, fence: FenceValue) {
        self.entries.lock().push_back((fence, item));
    }

    /// Take the oldest item whose fence is reached by `completed`.
    ///
    /// Releases can arrive out of fence order from different threads, so the
    /// whole queue is searched, oldest first.
    pub fn take_reached(&self, completed: FenceValue) -> Option<(FenceValue, T)> {
        let mut entries = self.entries.lock();
        let index = entries
            .iter()
            .position(|(fence, _)| fence.is_reached(completed))?;
        entries.remove(index)
    }

    /// Number of parked items, reached or not.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Number of parked items that could be taken right now.
    pub fn reached_count(&self, completed: FenceValue) -> usize {
        self.entries
            .lock()
            .iter()
            .filter(|(fence, _)| fence.is_reached(completed))
            .count()
    }

    /// Drop every parked item.
    ///
    /// Only sound once the GPU is idle.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

impl<T> Default for FencedQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for FencedQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let entries = self.entries.lock();
        f.debug_struct("FencedQueue")
            .field("len", &entries.len())
            .field(
                "fences",
                &entries.iter().map(|(fence, _)| fence.get()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

//! Resource barrier batching and state tracking.
//!
//! Every recording context owns one [`BarrierBatch`]. Transition requests
//! update the resource's tracked state immediately and append a barrier to
//! the batch; the batch reaches the command list as a single
//! `resource_barrier` call when it fills up, when the caller asks for an
//! immediate flush, or right before the context submits.
//!
//! # Transition rules
//!
//! ```text
//! transitioning == Some(new)          -> EndSplit  {authoritative -> new}
//! authoritative == new, no open split -> nothing
//! otherwise                           -> [EndSplit of the open split]
//!                                        Full      {authoritative -> new}
//! ```

use std::sync::{Arc, Weak};

use crate::backend::CommandList;
use crate::resource::{GpuResource, ResourceId};
use crate::types::ResourceStates;

/// Default number of barriers buffered before an automatic flush.
pub const BARRIER_BATCH_CAPACITY: usize = 16;

/// How a barrier participates in a (possibly split) transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BarrierMode {
    /// Complete transition.
    Full,
    /// First half of a split transition.
    BeginSplit,
    /// Second half of a split transition.
    EndSplit,
}

/// A single state transition directive.
#[derive(Debug, Clone)]
pub struct ResourceBarrier {
    /// The transitioned resource; barriers never keep it alive.
    pub resource: Weak<GpuResource>,
    /// Id of the resource, valid even after it is dropped.
    pub resource_id: ResourceId,
    pub before: ResourceStates,
    pub after: ResourceStates,
    pub mode: BarrierMode,
}

impl ResourceBarrier {
    fn new(
        resource: &Arc<GpuResource>,
        before: ResourceStates,
        after: ResourceStates,
        mode: BarrierMode,
    ) -> Self {
        Self {
            resource: Arc::downgrade(resource),
            resource_id: resource.id(),
            before,
            after,
            mode,
        }
    }
}

/// Bounded, ordered buffer of pending barriers.
#[derive(Debug)]
pub struct BarrierBatch {
    barriers: Vec<ResourceBarrier>,
    capacity: usize,
    flush_count: u64,
}

impl BarrierBatch {
    /// Create an empty batch that flushes every `capacity` barriers.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            barriers: Vec::with_capacity(capacity),
            capacity,
            flush_count: 0,
        }
    }

    /// Number of barriers waiting to be flushed.
    pub fn len(&self) -> usize {
        self.barriers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.barriers.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Pending barriers in append order.
    pub fn pending(&self) -> &[ResourceBarrier] {
        &self.barriers
    }

    /// Number of batched calls issued since the batch was created.
    pub fn flush_count(&self) -> u64 {
        self.flush_count
    }

    /// Request that `resource` ends up in `new_state`.
    ///
    /// Returns the number of barriers appended (0, 1 or 2).
    pub(crate) fn transition<L: CommandList>(
        &mut self,
        list: &mut L,
        resource: &Arc<GpuResource>,
        new_state: ResourceStates,
        flush_immediate: bool,
    ) -> usize {
        let mut emitted: [Option<ResourceBarrier>; 2] = [None, None];
        {
            let mut tracked = resource.tracked();
            let open_split = tracked.transitioning;
            match open_split {
                Some(target) if target == new_state => {
                    emitted[0] = Some(ResourceBarrier::new(
                        resource,
                        tracked.authoritative,
                        new_state,
                        BarrierMode::EndSplit,
                    ));
                    tracked.transitioning = None;
                    tracked.authoritative = new_state;
                }
                None if tracked.authoritative == new_state => {}
                open_split => {
                    if let Some(target) = open_split {
                        emitted[0] = Some(ResourceBarrier::new(
                            resource,
                            tracked.authoritative,
                            target,
                            BarrierMode::EndSplit,
                        ));
                        tracked.transitioning = None;
                        tracked.authoritative = target;
                    }
                    if tracked.authoritative != new_state {
                        emitted[1] = Some(ResourceBarrier::new(
                            resource,
                            tracked.authoritative,
                            new_state,
                            BarrierMode::Full,
                        ));
                        tracked.authoritative = new_state;
                    }
                }
            }
        }

        let appended = self.append_all(list, emitted);
        if appended > 0 && (flush_immediate || self.barriers.len() >= self.capacity) {
            self.flush(list);
        }
        appended
    }

    /// Open a split transition of `resource` towards `new_state`.
    ///
    /// Any split already open on the resource is closed first. The
    /// authoritative state only changes once the split is ended by a
    /// matching [`transition`](Self::transition).
    pub(crate) fn begin_transition<L: CommandList>(
        &mut self,
        list: &mut L,
        resource: &Arc<GpuResource>,
        new_state: ResourceStates,
        flush_immediate: bool,
    ) -> usize {
        let mut emitted: [Option<ResourceBarrier>; 2] = [None, None];
        {
            let mut tracked = resource.tracked();
            if let Some(target) = tracked.transitioning.take() {
                emitted[0] = Some(ResourceBarrier::new(
                    resource,
                    tracked.authoritative,
                    target,
                    BarrierMode::EndSplit,
                ));
                tracked.authoritative = target;
            }
            if tracked.authoritative != new_state {
                emitted[1] = Some(ResourceBarrier::new(
                    resource,
                    tracked.authoritative,
                    new_state,
                    BarrierMode::BeginSplit,
                ));
                tracked.transitioning = Some(new_state);
            }
        }

        let appended = self.append_all(list, emitted);
        if appended > 0 && (flush_immediate || self.barriers.len() >= self.capacity) {
            self.flush(list);
        }
        appended
    }

    /// Issue every pending barrier as one batched call and clear the batch.
    ///
    /// Returns the number of barriers flushed.
    pub(crate) fn flush<L: CommandList>(&mut self, list: &mut L) -> usize {
        if self.barriers.is_empty() {
            return 0;
        }
        let count = self.barriers.len();
        list.resource_barrier(&self.barriers);
        self.barriers.clear();
        self.flush_count += 1;
        log::trace!("BarrierBatch: flushed {} barriers", count);
        count
    }

    /// Drop pending barriers without recording them.
    pub(crate) fn discard(&mut self) {
        if !self.barriers.is_empty() {
            log::trace!("BarrierBatch: discarding {} barriers", self.barriers.len());
        }
        self.barriers.clear();
    }

    fn append_all<L: CommandList>(
        &mut self,
        list: &mut L,
        emitted: [Option<ResourceBarrier>; 2],
    ) -> usize {
        let mut appended = 0;
        for barrier in emitted.into_iter().flatten() {
            if self.barriers.len() >= self.capacity {
                self.flush(list);
            }
            log::trace!(
                "BarrierBatch: {:?} {:?} {:?} -> {:?}",
                barrier.mode,
                barrier.resource_id,
                barrier.before,
                barrier.after
            );
            self.barriers.push(barrier);
            appended += 1;
        }
        appended
    }
}

impl Default for BarrierBatch {
    fn default() -> Self {
        Self::new(BARRIER_BATCH_CAPACITY)
    }
}

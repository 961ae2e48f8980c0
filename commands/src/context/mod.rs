//! Recording contexts and the pool that hands them out.
//!
//! A [`CommandContext`] pairs a command list with a command allocator and
//! carries the barrier batch, the bound pipeline and the dynamic arena of
//! one recording session. Contexts are created lazily by the
//! [`ContextManager`], cycle between idle and recording for the lifetime of
//! the manager, and are destroyed with it.
//!
//! # Lifecycle
//!
//! ```text
//! Uninitialized --initialize--> Idle --begin--> Recording --finish--> Finished
//!                                 ^                 |                    |
//!                                 |                 +--free / drop-------+
//!                                 +------------------ reset -------------+
//! ```
//!
//! # Example
//!
//! ```ignore
//! let manager = ContextManager::new(device, RecordingConfig::default())?;
//!
//! let mut ctx = manager.begin("shadow_pass")?;
//! ctx.transition_resource(&shadow_map, ResourceStates::DEPTH_WRITE, false)?;
//! // ...record draws through ctx.command_list_mut()...
//! ctx.transition_resource(&shadow_map, ResourceStates::PIXEL_SHADER_RESOURCE, false)?;
//! let fence = ctx.finish(false, false)?;
//! ```

mod inner;
mod manager;
mod upload;

use std::cell::Cell;
use std::marker::PhantomData;
use std::sync::Arc;

pub use manager::{ContextManager, PoolStats};
pub use upload::SubresourceData;

pub(crate) use inner::ContextInner;

use crate::arena::{DescriptorRange, DynamicAllocation};
use crate::backend::Api;
use crate::error::{ContextState, RecordingError, Result};
use crate::pipeline::PipelineState;
use crate::resource::GpuResource;
use crate::types::{FenceValue, QueueType, ResourceStates};

/// Stable handle of a pooled context.
///
/// Ids are assigned in creation order per queue type and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId {
    pub queue_type: QueueType,
    pub index: u32,
}

impl std::fmt::Display for ContextId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}#{}", self.queue_type, self.index)
    }
}

/// A recording context checked out of a [`ContextManager`].
///
/// The guard is `Send` so recording can move to a worker thread, but not
/// `Sync`: one thread records at a time. Finishing, freeing or dropping it
/// returns the context to its manager.
pub struct CommandContext<'a, A: Api> {
    manager: &'a ContextManager<A>,
    inner: Option<Box<ContextInner<A>>>,
    _not_sync: PhantomData<Cell<()>>,
}

impl<'a, A: Api> CommandContext<'a, A> {
    pub(crate) fn new(manager: &'a ContextManager<A>, inner: Box<ContextInner<A>>) -> Self {
        Self {
            manager,
            inner: Some(inner),
            _not_sync: PhantomData,
        }
    }

    fn inner(&self) -> &ContextInner<A> {
        // Only `drop` takes the box.
        match self.inner.as_deref() {
            Some(inner) => inner,
            None => unreachable!("command context used after release"),
        }
    }

    fn inner_mut(&mut self) -> &mut ContextInner<A> {
        match self.inner.as_deref_mut() {
            Some(inner) => inner,
            None => unreachable!("command context used after release"),
        }
    }

    pub fn id(&self) -> ContextId {
        self.inner().id()
    }

    pub fn queue_type(&self) -> QueueType {
        self.inner().queue_type()
    }

    pub fn label(&self) -> &str {
        self.inner().label()
    }

    pub fn state(&self) -> ContextState {
        self.inner().state()
    }

    /// Fence of the most recent submission from this context, in any session.
    pub fn last_fence(&self) -> FenceValue {
        self.inner().last_fence()
    }

    /// How many times the context has been begun.
    pub fn sessions(&self) -> u64 {
        self.inner().sessions()
    }

    /// Barriers recorded but not yet flushed to the command list.
    pub fn pending_barriers(&self) -> usize {
        self.inner().barriers().len()
    }

    /// Batched barrier calls issued over the context's lifetime.
    pub fn barrier_flush_count(&self) -> u64 {
        self.inner().barriers().flush_count()
    }

    /// Bytes of dynamic space used in the current session.
    pub fn dynamic_bytes_used(&self) -> u64 {
        self.inner().arena().used()
    }

    /// The currently bound pipeline, if it is still alive.
    pub fn pipeline_state(&self) -> Option<Arc<PipelineState>> {
        self.inner().pipeline()
    }

    /// The underlying command list.
    pub fn command_list(&self) -> Option<&A::CommandList> {
        self.inner().list()
    }

    /// The underlying command list, for recording backend commands.
    ///
    /// Pending barriers are not flushed; call
    /// [`flush_resource_barriers`](Self::flush_resource_barriers) first when
    /// the recorded work depends on them.
    pub fn command_list_mut(&mut self) -> Result<&mut A::CommandList> {
        self.inner_mut().list_mut()
    }

    /// Start a recording session. Fails if the context is already recording.
    pub fn begin(&mut self, label: &str) -> Result<()> {
        self.inner_mut().begin(label)
    }

    /// Request that `resource` ends up in `new_state`.
    ///
    /// The resource's tracked state changes immediately; the barrier is
    /// buffered and reaches the command list when the batch fills up, when
    /// `flush_immediate` is set, or at the next submission.
    pub fn transition_resource(
        &mut self,
        resource: &Arc<GpuResource>,
        new_state: ResourceStates,
        flush_immediate: bool,
    ) -> Result<()> {
        self.inner_mut()
            .transition(resource, new_state, flush_immediate)
            .map(|_| ())
    }

    /// Open a split transition of `resource` towards `new_state`.
    ///
    /// A later [`transition_resource`](Self::transition_resource) to the
    /// same state completes it.
    pub fn begin_resource_transition(
        &mut self,
        resource: &Arc<GpuResource>,
        new_state: ResourceStates,
        flush_immediate: bool,
    ) -> Result<()> {
        self.inner_mut()
            .begin_transition(resource, new_state, flush_immediate)
            .map(|_| ())
    }

    /// Record every pending barrier as one batched call.
    ///
    /// Returns the number of barriers flushed.
    pub fn flush_resource_barriers(&mut self) -> Result<usize> {
        self.inner_mut().flush_barriers()
    }

    /// Carve transient buffer space valid until the context is reset.
    pub fn allocate_dynamic_space(&mut self, size: u64, alignment: u64) -> Result<DynamicAllocation> {
        let manager = self.manager;
        let slot = manager.slot(self.queue_type())?;
        self.inner_mut()
            .allocate_dynamic(manager.device(), slot, size, alignment)
    }

    /// Copy CPU data into a block from
    /// [`allocate_dynamic_space`](Self::allocate_dynamic_space).
    pub fn write_dynamic(&self, allocation: &DynamicAllocation, bytes: &[u8]) -> Result<()> {
        self.inner().write_dynamic(allocation, bytes)
    }

    /// Reserve transient descriptor slots.
    pub fn allocate_dynamic_descriptors(&mut self, count: u32) -> Result<DescriptorRange> {
        self.inner_mut().allocate_descriptors(count)
    }

    /// Bind `pipeline`. The context keeps only a weak reference and rebinds it
    /// after every mid-stream flush while it is alive.
    pub fn set_pipeline_state(&mut self, pipeline: &Arc<PipelineState>) -> Result<()> {
        self.inner_mut().set_pipeline_state(pipeline)
    }

    /// Copy `num_bytes` between two buffers, after flushing pending barriers.
    pub fn copy_buffer_region(
        &mut self,
        dst: &GpuResource,
        dst_offset: u64,
        src: &GpuResource,
        src_offset: u64,
        num_bytes: u64,
    ) -> Result<()> {
        self.inner_mut()
            .copy_buffer_region(dst, dst_offset, src, src_offset, num_bytes)
    }

    /// Submit everything recorded so far and keep recording.
    ///
    /// With `wait`, blocks until the GPU reaches the returned fence.
    pub fn flush(&mut self, wait: bool) -> Result<FenceValue> {
        let manager = self.manager;
        let slot = manager.slot(self.queue_type())?;
        self.inner_mut().flush(slot, wait)
    }

    /// Submit the session and return the context to its manager.
    ///
    /// With `release_dynamic`, the dynamic page goes back to the pool now
    /// instead of staying with the context until its next reset.
    pub fn finish(mut self, wait: bool, release_dynamic: bool) -> Result<FenceValue> {
        let manager = self.manager;
        let slot = manager.slot(self.queue_type())?;
        self.inner_mut().finish(slot, wait, release_dynamic)
    }
}

impl<A: Api> Drop for CommandContext<'_, A> {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.take() {
            self.manager.reclaim(inner);
        }
    }
}

impl<A: Api> std::fmt::Debug for CommandContext<'_, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.inner.as_deref() {
            Some(inner) => inner.fmt(f),
            None => f.write_str("CommandContext(released)"),
        }
    }
}

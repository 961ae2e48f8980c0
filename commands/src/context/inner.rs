//! Pooled state of a recording context.

use std::sync::{Arc, Weak};

use crate::arena::{DescriptorRange, DynamicAllocation, DynamicArena};
use crate::backend::{Api, CommandList, Device, Queue};
use crate::barrier::BarrierBatch;
use crate::config::RecordingConfig;
use crate::error::{ContextState, RecordingError, Result};
use crate::pipeline::PipelineState;
use crate::resource::GpuResource;
use crate::types::{FenceValue, QueueType, ResourceStates};

use super::ContextId;
use super::manager::QueueSlot;

/// Everything a context keeps across Begin/Finish cycles.
///
/// Owned by the idle queue while pooled and by a
/// [`CommandContext`](super::CommandContext) while in use.
pub(crate) struct ContextInner<A: Api> {
    id: ContextId,
    label: String,
    state: ContextState,
    list: Option<A::CommandList>,
    allocator: Option<A::CommandAllocator>,
    barriers: BarrierBatch,
    pipeline: Option<Weak<PipelineState>>,
    arena: DynamicArena<A>,
    /// Last fence this context ever submitted.
    last_fence: FenceValue,
    /// Last fence submitted since the context was handed out.
    session_fence: Option<FenceValue>,
    sessions: u64,
}

impl<A: Api> ContextInner<A> {
    pub(crate) fn new(id: ContextId, config: &RecordingConfig) -> Self {
        Self {
            id,
            label: String::new(),
            state: ContextState::Uninitialized,
            list: None,
            allocator: None,
            barriers: BarrierBatch::new(config.barrier_batch_capacity),
            pipeline: None,
            arena: DynamicArena::new(config.dynamic_descriptor_count),
            last_fence: FenceValue::ZERO,
            session_fence: None,
            sessions: 0,
        }
    }

    pub(crate) fn id(&self) -> ContextId {
        self.id
    }

    pub(crate) fn queue_type(&self) -> QueueType {
        self.id.queue_type
    }

    pub(crate) fn label(&self) -> &str {
        &self.label
    }

    pub(crate) fn state(&self) -> ContextState {
        self.state
    }

    pub(crate) fn last_fence(&self) -> FenceValue {
        self.last_fence
    }

    pub(crate) fn sessions(&self) -> u64 {
        self.sessions
    }

    pub(crate) fn barriers(&self) -> &BarrierBatch {
        &self.barriers
    }

    pub(crate) fn arena(&self) -> &DynamicArena<A> {
        &self.arena
    }

    pub(crate) fn list(&self) -> Option<&A::CommandList> {
        self.list.as_ref()
    }

    pub(crate) fn list_mut(&mut self) -> Result<&mut A::CommandList> {
        self.ensure_recording()?;
        open_list(&mut self.list)
    }

    /// Make the context ready to begin.
    ///
    /// A fresh context creates its command list; a pooled one is reset.
    pub(crate) fn prepare(&mut self, device: &A::Device, slot: &QueueSlot<A>) -> Result<()> {
        if self.list.is_none() {
            self.initialize(device, slot)
        } else {
            self.reset(device, slot)
        }
    }

    fn initialize(&mut self, device: &A::Device, slot: &QueueSlot<A>) -> Result<()> {
        let mut allocator = slot
            .allocators
            .acquire(device, slot.queue.completed_value())?;
        let list = device.create_command_list(self.queue_type(), &mut allocator)?;
        self.list = Some(list);
        self.allocator = Some(allocator);
        self.state = ContextState::Idle;
        log::debug!("Context {}: initialized", self.id);
        Ok(())
    }

    fn reset(&mut self, device: &A::Device, slot: &QueueSlot<A>) -> Result<()> {
        debug_assert!(self.allocator.is_none(), "pooled context still owns an allocator");

        let completed = slot.queue.completed_value();
        self.barriers.discard();
        self.pipeline = None;
        self.arena.reset(&slot.pages, completed);

        let mut allocator = slot.allocators.acquire(device, completed)?;
        if let Some(list) = self.list.as_mut() {
            if let Err(err) = list.reset(&mut allocator) {
                slot.allocators.release_after(allocator, FenceValue::ZERO);
                return Err(err);
            }
        }
        self.allocator = Some(allocator);
        self.state = ContextState::Idle;
        log::debug!("Context {}: reset for reuse", self.id);
        Ok(())
    }

    pub(crate) fn begin(&mut self, label: &str) -> Result<()> {
        if self.state != ContextState::Idle {
            return Err(RecordingError::InvalidState {
                expected: ContextState::Idle,
                actual: self.state,
            });
        }
        self.label.clear();
        self.label.push_str(label);
        self.state = ContextState::Recording;
        self.sessions += 1;
        log::debug!("Context {}: begin '{}'", self.id, self.label);
        Ok(())
    }

    fn ensure_recording(&self) -> Result<()> {
        if self.state == ContextState::Recording {
            Ok(())
        } else {
            Err(RecordingError::InvalidState {
                expected: ContextState::Recording,
                actual: self.state,
            })
        }
    }

    pub(crate) fn transition(
        &mut self,
        resource: &Arc<GpuResource>,
        new_state: ResourceStates,
        flush_immediate: bool,
    ) -> Result<usize> {
        self.ensure_recording()?;
        self.queue_type().validate_state(new_state)?;
        let list = open_list(&mut self.list)?;
        Ok(self
            .barriers
            .transition(list, resource, new_state, flush_immediate))
    }

    pub(crate) fn begin_transition(
        &mut self,
        resource: &Arc<GpuResource>,
        new_state: ResourceStates,
        flush_immediate: bool,
    ) -> Result<usize> {
        self.ensure_recording()?;
        self.queue_type().validate_state(new_state)?;
        let list = open_list(&mut self.list)?;
        Ok(self
            .barriers
            .begin_transition(list, resource, new_state, flush_immediate))
    }

    pub(crate) fn flush_barriers(&mut self) -> Result<usize> {
        self.ensure_recording()?;
        let list = open_list(&mut self.list)?;
        Ok(self.barriers.flush(list))
    }

    pub(crate) fn set_pipeline_state(&mut self, pipeline: &Arc<PipelineState>) -> Result<()> {
        self.ensure_recording()?;
        if !pipeline.kind().is_bindable_on(self.queue_type()) {
            return Err(RecordingError::InvalidArgument(format!(
                "{:?} pipeline '{}' cannot be bound on a {:?} context",
                pipeline.kind(),
                pipeline.label(),
                self.queue_type()
            )));
        }
        let list = self.list_mut()?;
        list.set_pipeline_state(pipeline);
        self.pipeline = Some(Arc::downgrade(pipeline));
        Ok(())
    }

    /// Currently bound pipeline, if it is still alive.
    pub(crate) fn pipeline(&self) -> Option<Arc<PipelineState>> {
        self.pipeline.as_ref().and_then(Weak::upgrade)
    }

    pub(crate) fn copy_buffer_region(
        &mut self,
        dst: &GpuResource,
        dst_offset: u64,
        src: &GpuResource,
        src_offset: u64,
        num_bytes: u64,
    ) -> Result<()> {
        self.ensure_recording()?;
        check_buffer_range(dst, dst_offset, num_bytes)?;
        check_buffer_range(src, src_offset, num_bytes)?;
        // Pending transitions must land before the copy reads or writes.
        let list = open_list(&mut self.list)?;
        self.barriers.flush(list);
        list.copy_buffer_region(dst, dst_offset, src, src_offset, num_bytes);
        Ok(())
    }

    pub(crate) fn allocate_dynamic(
        &mut self,
        device: &A::Device,
        slot: &QueueSlot<A>,
        size: u64,
        alignment: u64,
    ) -> Result<DynamicAllocation> {
        self.ensure_recording()?;
        self.arena.allocate(
            &slot.pages,
            device,
            slot.queue.completed_value(),
            size,
            alignment,
        )
    }

    pub(crate) fn write_dynamic(&self, allocation: &DynamicAllocation, bytes: &[u8]) -> Result<()> {
        self.ensure_recording()?;
        self.arena.write(allocation, bytes)
    }

    pub(crate) fn allocate_descriptors(&mut self, count: u32) -> Result<DescriptorRange> {
        self.ensure_recording()?;
        self.arena.allocate_descriptors(count)
    }

    /// Flush barriers and submit everything recorded so far.
    fn submit(&mut self, slot: &QueueSlot<A>) -> Result<FenceValue> {
        let list = open_list(&mut self.list)?;
        self.barriers.flush(list);
        let fence = slot.queue.execute(list)?;
        self.last_fence = fence;
        self.session_fence = Some(fence);
        self.arena.mark_submitted(fence);
        log::debug!("Context {}: '{}' submitted, fence {}", self.id, self.label, fence);
        Ok(fence)
    }

    pub(crate) fn flush(&mut self, slot: &QueueSlot<A>, wait: bool) -> Result<FenceValue> {
        self.ensure_recording()?;
        let fence = self.submit(slot)?;

        let pipeline = self.pipeline();
        let (Some(list), Some(allocator)) = (self.list.as_mut(), self.allocator.as_mut()) else {
            return Err(RecordingError::Backend(format!(
                "context {} lost its command list",
                self.id
            )));
        };
        list.reset(allocator)?;
        if let Some(pipeline) = pipeline {
            list.set_pipeline_state(&pipeline);
        }

        if wait {
            slot.queue.wait(fence)?;
        }
        Ok(fence)
    }

    pub(crate) fn finish(
        &mut self,
        slot: &QueueSlot<A>,
        wait: bool,
        release_dynamic: bool,
    ) -> Result<FenceValue> {
        self.ensure_recording()?;
        let fence = self.submit(slot)?;

        self.state = ContextState::Finished;
        if let Some(allocator) = self.allocator.take() {
            slot.allocators.release_after(allocator, fence);
        }
        if release_dynamic {
            self.arena.release(&slot.pages, fence);
        }
        log::debug!("Context {}: '{}' finished at fence {}", self.id, self.label, fence);

        if wait {
            slot.queue.wait(fence)?;
        }
        Ok(fence)
    }

    /// Bring the context back to a poolable state.
    ///
    /// Unsubmitted commands are dropped and the allocator goes back to the
    /// pool tagged with the last fence of this session.
    pub(crate) fn retire(&mut self, slot: &QueueSlot<A>) {
        if self.state != ContextState::Finished && self.state != ContextState::Uninitialized {
            self.barriers.discard();
            if let Some(list) = self.list.as_mut() {
                if let Err(err) = list.close() {
                    log::warn!("Context {}: failed to close discarded list: {}", self.id, err);
                }
            }
            if let Some(allocator) = self.allocator.take() {
                let fence = self.session_fence.unwrap_or(FenceValue::ZERO);
                slot.allocators.release_after(allocator, fence);
            }
            if self.state == ContextState::Recording {
                log::debug!(
                    "Context {}: '{}' discarded without finishing",
                    self.id,
                    self.label
                );
            }
        }
        if self.list.is_some() {
            self.state = ContextState::Idle;
        }
        self.session_fence = None;
    }
}

impl<A: Api> std::fmt::Debug for ContextInner<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextInner")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("state", &self.state)
            .field("pending_barriers", &self.barriers.len())
            .field("arena", &self.arena)
            .field("last_fence", &self.last_fence)
            .finish()
    }
}

fn open_list<L>(list: &mut Option<L>) -> Result<&mut L> {
    list.as_mut().ok_or(RecordingError::InvalidState {
        expected: ContextState::Recording,
        actual: ContextState::Uninitialized,
    })
}

fn check_buffer_range(resource: &GpuResource, offset: u64, num_bytes: u64) -> Result<()> {
    let size = resource.buffer_size().ok_or_else(|| {
        RecordingError::InvalidArgument(format!("'{}' is not a buffer", resource.label()))
    })?;
    match offset.checked_add(num_bytes) {
        Some(end) if end <= size => Ok(()),
        _ => Err(RecordingError::InvalidArgument(format!(
            "range {}..+{} is out of bounds for '{}' ({} bytes)",
            offset,
            num_bytes,
            resource.label(),
            size
        ))),
    }
}

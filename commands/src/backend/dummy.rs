//! Dummy GPU backend for testing and development.
//!
//! This backend doesn't talk to a GPU. It keeps a simulated fence timeline
//! per queue and records every command a list receives so tests can inspect
//! exactly which barrier batches, copies and pipeline binds were submitted.
//!
//! By default every submission completes immediately. With
//! [`DummyDevice::with_manual_completion`] the timeline only advances through
//! [`DummyQueue::complete_up_to`] or a blocking [`Queue::wait`], which makes
//! in-flight GPU work observable.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::barrier::ResourceBarrier;
use crate::error::{RecordingError, Result};
use crate::pipeline::PipelineState;
use crate::resource::{GpuResource, ResourceId};
use crate::types::{FenceValue, QueueType, ResourceStates};

use super::{Api, CommandAllocator, CommandList, Device, Queue, TextureFootprint, UploadPage};

/// Dummy backend marker.
#[derive(Debug, Clone)]
pub struct DummyApi;

impl Api for DummyApi {
    type Device = DummyDevice;
    type Queue = DummyQueue;
    type CommandAllocator = DummyAllocator;
    type CommandList = DummyCommandList;
    type UploadPage = DummyUploadPage;
}

/// Base of the fake device address space handed to upload pages.
const DUMMY_ADDRESS_BASE: u64 = 0x1_0000_0000;

/// Dummy device.
#[derive(Debug)]
pub struct DummyDevice {
    queues: [bool; QueueType::COUNT],
    manual_completion: bool,
    lost: Arc<AtomicBool>,
    next_allocator_id: AtomicU64,
    next_address: AtomicU64,
    command_lists_created: AtomicUsize,
    upload_pages_created: AtomicUsize,
}

impl DummyDevice {
    /// Create a device exposing every queue type, completing work instantly.
    pub fn new() -> Self {
        Self {
            queues: [true; QueueType::COUNT],
            manual_completion: false,
            lost: Arc::new(AtomicBool::new(false)),
            next_allocator_id: AtomicU64::new(1),
            next_address: AtomicU64::new(DUMMY_ADDRESS_BASE),
            command_lists_created: AtomicUsize::new(0),
            upload_pages_created: AtomicUsize::new(0),
        }
    }

    /// Only expose the given queue types.
    pub fn with_queues(mut self, queue_types: &[QueueType]) -> Self {
        self.queues = [false; QueueType::COUNT];
        for queue_type in queue_types {
            self.queues[queue_type.index()] = true;
        }
        self
    }

    /// Leave submissions in flight until completed explicitly.
    pub fn with_manual_completion(mut self) -> Self {
        self.manual_completion = true;
        self
    }

    /// Simulate losing the device. Every later submission or wait fails.
    pub fn lose_device(&self) {
        log::trace!("DummyDevice: device lost");
        self.lost.store(true, Ordering::Release);
    }

    pub fn is_lost(&self) -> bool {
        self.lost.load(Ordering::Acquire)
    }

    pub fn command_lists_created(&self) -> usize {
        self.command_lists_created.load(Ordering::Relaxed)
    }

    pub fn upload_pages_created(&self) -> usize {
        self.upload_pages_created.load(Ordering::Relaxed)
    }

    fn check_lost(&self) -> Result<()> {
        if self.is_lost() {
            Err(RecordingError::DeviceLost)
        } else {
            Ok(())
        }
    }
}

impl Default for DummyDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl Device for DummyDevice {
    type A = DummyApi;

    fn name(&self) -> &str {
        "Dummy Device"
    }

    fn supports_queue(&self, queue_type: QueueType) -> bool {
        self.queues[queue_type.index()]
    }

    fn create_queue(&self, queue_type: QueueType) -> Result<DummyQueue> {
        self.check_lost()?;
        log::trace!("DummyDevice: creating {:?} queue", queue_type);
        Ok(DummyQueue {
            queue_type,
            auto_complete: !self.manual_completion,
            lost: Arc::clone(&self.lost),
            completed: AtomicU64::new(0),
            submissions: Mutex::new(Vec::new()),
            last_submitted: AtomicU64::new(0),
        })
    }

    fn create_allocator(&self, queue_type: QueueType) -> Result<DummyAllocator> {
        self.check_lost()?;
        let id = self.next_allocator_id.fetch_add(1, Ordering::Relaxed);
        log::trace!("DummyDevice: creating {:?} allocator {}", queue_type, id);
        Ok(DummyAllocator {
            id,
            queue_type,
            reset_count: 0,
        })
    }

    fn create_command_list(
        &self,
        queue_type: QueueType,
        allocator: &mut DummyAllocator,
    ) -> Result<DummyCommandList> {
        self.check_lost()?;
        self.command_lists_created.fetch_add(1, Ordering::Relaxed);
        let mut list = DummyCommandList::new(queue_type);
        list.reset(allocator)?;
        Ok(list)
    }

    fn create_upload_page(&self, size: u64) -> Result<DummyUploadPage> {
        self.check_lost()?;
        if size == 0 {
            return Err(RecordingError::InvalidArgument(
                "upload page size cannot be zero".to_string(),
            ));
        }
        self.upload_pages_created.fetch_add(1, Ordering::Relaxed);
        let address = self.next_address.fetch_add(size.next_multiple_of(65536), Ordering::Relaxed);
        let resource = Arc::new(GpuResource::buffer(
            format!("dummy_upload_{address:#x}"),
            size,
            ResourceStates::GENERIC_READ,
        ));
        log::trace!("DummyDevice: creating upload page of {} bytes", size);
        Ok(DummyUploadPage {
            resource,
            address,
            data: Mutex::new(vec![0u8; size as usize]),
        })
    }
}

/// Everything submitted in one `execute` call.
#[derive(Debug, Clone)]
pub struct DummySubmission {
    pub fence: FenceValue,
    /// Allocator the list was recording into.
    pub allocator_id: Option<u64>,
    pub commands: Vec<RecordedCommand>,
}

/// Dummy queue with a simulated fence timeline.
#[derive(Debug)]
pub struct DummyQueue {
    queue_type: QueueType,
    auto_complete: bool,
    lost: Arc<AtomicBool>,
    completed: AtomicU64,
    last_submitted: AtomicU64,
    submissions: Mutex<Vec<DummySubmission>>,
}

impl DummyQueue {
    /// Pretend the GPU finished everything up to `fence`.
    pub fn complete_up_to(&self, fence: FenceValue) {
        let target = fence.get().min(self.last_submitted.load(Ordering::Acquire));
        self.completed.fetch_max(target, Ordering::AcqRel);
    }

    /// Pretend the GPU finished everything submitted so far.
    pub fn complete_all(&self) {
        self.complete_up_to(self.last_submitted());
    }

    /// Snapshot of every submission so far.
    pub fn submissions(&self) -> Vec<DummySubmission> {
        self.submissions.lock().clone()
    }

    pub fn submission_count(&self) -> usize {
        self.submissions.lock().len()
    }

    fn check_lost(&self) -> Result<()> {
        if self.lost.load(Ordering::Acquire) {
            Err(RecordingError::DeviceLost)
        } else {
            Ok(())
        }
    }
}

impl Queue for DummyQueue {
    type A = DummyApi;

    fn queue_type(&self) -> QueueType {
        self.queue_type
    }

    fn execute(&self, list: &mut DummyCommandList) -> Result<FenceValue> {
        self.check_lost()?;
        list.close()?;

        // Holding the submission lock keeps fence values and submission order in step.
        let mut submissions = self.submissions.lock();
        let fence = FenceValue(self.last_submitted.load(Ordering::Acquire) + 1);
        submissions.push(DummySubmission {
            fence,
            allocator_id: list.allocator_id,
            commands: std::mem::take(&mut list.commands),
        });
        self.last_submitted.store(fence.get(), Ordering::Release);
        if self.auto_complete {
            self.completed.fetch_max(fence.get(), Ordering::AcqRel);
        }
        log::trace!(
            "DummyQueue[{:?}]: executed submission, fence {}",
            self.queue_type,
            fence
        );
        Ok(fence)
    }

    fn completed_value(&self) -> FenceValue {
        FenceValue(self.completed.load(Ordering::Acquire))
    }

    fn last_submitted(&self) -> FenceValue {
        FenceValue(self.last_submitted.load(Ordering::Acquire))
    }

    fn wait(&self, fence: FenceValue) -> Result<()> {
        self.check_lost()?;
        if fence > self.last_submitted() {
            return Err(RecordingError::InvalidArgument(format!(
                "fence {fence} was never submitted on the {:?} queue",
                self.queue_type
            )));
        }
        // The simulated GPU finishes the awaited work on demand.
        self.complete_up_to(fence);
        Ok(())
    }
}

/// Dummy command allocator.
#[derive(Debug)]
pub struct DummyAllocator {
    id: u64,
    queue_type: QueueType,
    reset_count: u32,
}

impl DummyAllocator {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn queue_type(&self) -> QueueType {
        self.queue_type
    }

    /// How many times the allocator's memory was reclaimed.
    pub fn reset_count(&self) -> u32 {
        self.reset_count
    }
}

impl CommandAllocator for DummyAllocator {
    type A = DummyApi;

    fn reset(&mut self) -> Result<()> {
        self.reset_count += 1;
        Ok(())
    }
}

/// A command as captured by [`DummyCommandList`].
#[derive(Debug, Clone)]
pub enum RecordedCommand {
    /// One batched synchronization call.
    Barriers(Vec<ResourceBarrier>),
    SetPipeline(String),
    CopyBuffer {
        dst: ResourceId,
        dst_offset: u64,
        src: ResourceId,
        src_offset: u64,
        num_bytes: u64,
    },
    CopyBufferToTexture {
        dst: ResourceId,
        subresource: u32,
        src: ResourceId,
        footprint: TextureFootprint,
    },
}

/// Dummy command list that records commands in memory.
#[derive(Debug)]
pub struct DummyCommandList {
    queue_type: QueueType,
    allocator_id: Option<u64>,
    open: bool,
    commands: Vec<RecordedCommand>,
}

impl DummyCommandList {
    /// Create an open list not yet bound to an allocator.
    pub fn new(queue_type: QueueType) -> Self {
        Self {
            queue_type,
            allocator_id: None,
            open: true,
            commands: Vec::new(),
        }
    }

    /// Commands recorded since the list was last reset or submitted.
    pub fn recorded(&self) -> &[RecordedCommand] {
        &self.commands
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Allocator the list currently records into.
    pub fn allocator_id(&self) -> Option<u64> {
        self.allocator_id
    }

    fn record(&mut self, command: RecordedCommand) {
        if !self.open {
            log::warn!("DummyCommandList: recording into a closed list: {:?}", command);
        }
        self.commands.push(command);
    }
}

impl CommandList for DummyCommandList {
    type A = DummyApi;

    fn queue_type(&self) -> QueueType {
        self.queue_type
    }

    fn reset(&mut self, allocator: &mut DummyAllocator) -> Result<()> {
        self.allocator_id = Some(allocator.id);
        self.commands.clear();
        self.open = true;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.open = false;
        Ok(())
    }

    fn resource_barrier(&mut self, barriers: &[ResourceBarrier]) {
        self.record(RecordedCommand::Barriers(barriers.to_vec()));
    }

    fn set_pipeline_state(&mut self, pipeline: &PipelineState) {
        self.record(RecordedCommand::SetPipeline(pipeline.label().to_string()));
    }

    fn copy_buffer_region(
        &mut self,
        dst: &GpuResource,
        dst_offset: u64,
        src: &GpuResource,
        src_offset: u64,
        num_bytes: u64,
    ) {
        self.record(RecordedCommand::CopyBuffer {
            dst: dst.id(),
            dst_offset,
            src: src.id(),
            src_offset,
            num_bytes,
        });
    }

    fn copy_buffer_to_texture(
        &mut self,
        dst: &GpuResource,
        subresource: u32,
        src: &GpuResource,
        footprint: &TextureFootprint,
    ) {
        self.record(RecordedCommand::CopyBufferToTexture {
            dst: dst.id(),
            subresource,
            src: src.id(),
            footprint: *footprint,
        });
    }
}

/// Heap-backed upload page.
#[derive(Debug)]
pub struct DummyUploadPage {
    resource: Arc<GpuResource>,
    address: u64,
    data: Mutex<Vec<u8>>,
}

impl DummyUploadPage {
    /// Read back bytes previously written to the page.
    pub fn read(&self, offset: u64, len: usize) -> Vec<u8> {
        let data = self.data.lock();
        let start = (offset as usize).min(data.len());
        let end = (start + len).min(data.len());
        data[start..end].to_vec()
    }
}

impl UploadPage for DummyUploadPage {
    type A = DummyApi;

    fn resource(&self) -> &Arc<GpuResource> {
        &self.resource
    }

    fn gpu_address(&self) -> u64 {
        self.address
    }

    fn write(&self, offset: u64, bytes: &[u8]) -> Result<()> {
        let mut data = self.data.lock();
        let end = offset
            .checked_add(bytes.len() as u64)
            .filter(|&end| end <= data.len() as u64)
            .ok_or_else(|| {
                RecordingError::InvalidArgument(format!(
                    "write of {} bytes at offset {} exceeds upload page of {} bytes",
                    bytes.len(),
                    offset,
                    data.len()
                ))
            })?;
        data[offset as usize..end as usize].copy_from_slice(bytes);
        Ok(())
    }
}

//! Native Vulkan backend implementation using ash.
//!
//! Mapping of the recording model onto Vulkan:
//!
//! - A command allocator is a `VkCommandPool`; the command buffers it hands to
//!   lists are recycled when the pool is reset.
//! - Queue fences are timeline semaphores, one per queue.
//! - `ResourceStates` map to image layouts, access masks and pipeline stages
//!   (see [`conversion`]). `COMMON` is the `GENERAL` layout.
//! - Split barriers have no Vulkan counterpart here: `BeginSplit` records
//!   nothing and `EndSplit` records the full barrier.
//! - Upload pages are host-visible buffers from gpu-allocator.
//! - Bundles (secondary command buffers) are not exposed.

pub mod conversion;
mod device;

use std::mem::ManuallyDrop;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use ash::vk;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme, Allocator, AllocatorCreateDesc};
use parking_lot::Mutex;

use crate::barrier::{BarrierMode, ResourceBarrier};
use crate::error::{RecordingError, Result};
use crate::pipeline::{PipelineKind, PipelineState, RawPipeline};
use crate::resource::{GpuResource, RawResource, ResourceKind};
use crate::types::{FenceValue, QueueType, ResourceStates};

use self::conversion::{state_access, state_layout, state_stages, vk_error};
use super::{Api, CommandAllocator, CommandList, Device, Queue, TextureFootprint, UploadPage};

/// Vulkan backend marker.
#[derive(Debug, Clone)]
pub struct VulkanApi;

impl Api for VulkanApi {
    type Device = VulkanDevice;
    type Queue = VulkanQueue;
    type CommandAllocator = VulkanCommandAllocator;
    type CommandList = VulkanCommandList;
    type UploadPage = VulkanUploadPage;
}

/// Objects every backend object keeps alive.
struct DeviceShared {
    _entry: ash::Entry,
    instance: ash::Instance,
    device: ash::Device,
    allocator: ManuallyDrop<Mutex<Allocator>>,
}

impl Drop for DeviceShared {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();
            // The allocator frees its memory blocks through the device.
            ManuallyDrop::drop(&mut self.allocator);
            self.device.destroy_device(None);
            self.instance.destroy_instance(None);
        }
    }
}

/// Vulkan logical device.
pub struct VulkanDevice {
    shared: Arc<DeviceShared>,
    name: String,
    families: [Option<u32>; QueueType::COUNT],
}

impl VulkanDevice {
    /// Pick the best GPU and create a headless logical device on it.
    pub fn new(validation: bool) -> Result<Self> {
        let entry = unsafe { ash::Entry::load() }
            .map_err(|e| RecordingError::Backend(format!("Failed to load Vulkan: {e}")))?;
        let instance = device::create_instance(&entry, validation)?;

        let (physical_device, name) = device::select_physical_device(&instance)?;
        let families = device::find_queue_families(&instance, physical_device)?;
        let device = device::create_logical_device(&instance, physical_device, &families)?;

        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.clone(),
            device: device.clone(),
            physical_device,
            debug_settings: Default::default(),
            buffer_device_address: false,
            allocation_sizes: gpu_allocator::AllocationSizes::default(),
        })
        .map_err(|e| RecordingError::Backend(format!("Failed to create memory allocator: {e}")))?;

        log::info!("VulkanDevice: '{}' with queue families {:?}", name, families);
        Ok(Self {
            shared: Arc::new(DeviceShared {
                _entry: entry,
                instance,
                device,
                allocator: ManuallyDrop::new(Mutex::new(allocator)),
            }),
            name,
            families,
        })
    }

    fn family(&self, queue_type: QueueType) -> Result<u32> {
        self.families[queue_type.index()].ok_or_else(|| {
            RecordingError::InvalidArgument(format!(
                "device '{}' has no {:?} queue",
                self.name, queue_type
            ))
        })
    }
}

impl std::fmt::Debug for VulkanDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulkanDevice")
            .field("name", &self.name)
            .field("families", &self.families)
            .finish()
    }
}

impl Device for VulkanDevice {
    type A = VulkanApi;

    fn name(&self) -> &str {
        &self.name
    }

    fn supports_queue(&self, queue_type: QueueType) -> bool {
        self.families[queue_type.index()].is_some()
    }

    fn create_queue(&self, queue_type: QueueType) -> Result<VulkanQueue> {
        let family = self.family(queue_type)?;
        let device = &self.shared.device;
        let queue = unsafe { device.get_device_queue(family, 0) };

        let mut type_info = vk::SemaphoreTypeCreateInfo::default()
            .semaphore_type(vk::SemaphoreType::TIMELINE)
            .initial_value(0);
        let create_info = vk::SemaphoreCreateInfo::default().push_next(&mut type_info);
        let timeline = unsafe { device.create_semaphore(&create_info, None) }
            .map_err(|e| vk_error("Failed to create timeline semaphore", e))?;

        Ok(VulkanQueue {
            shared: Arc::clone(&self.shared),
            queue_type,
            queue: Mutex::new(queue),
            timeline,
            last_submitted: AtomicU64::new(0),
            completed: AtomicU64::new(0),
        })
    }

    fn create_allocator(&self, queue_type: QueueType) -> Result<VulkanCommandAllocator> {
        let family = self.family(queue_type)?;
        let pool_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(family)
            .flags(vk::CommandPoolCreateFlags::TRANSIENT);
        let pool = unsafe { self.shared.device.create_command_pool(&pool_info, None) }
            .map_err(|e| vk_error("Failed to create command pool", e))?;

        Ok(VulkanCommandAllocator {
            shared: Arc::clone(&self.shared),
            pool,
            buffers: Vec::new(),
            next: 0,
        })
    }

    fn create_command_list(
        &self,
        queue_type: QueueType,
        allocator: &mut VulkanCommandAllocator,
    ) -> Result<VulkanCommandList> {
        let mut list = VulkanCommandList {
            shared: Arc::clone(&self.shared),
            queue_type,
            cmd: vk::CommandBuffer::null(),
            recording: false,
        };
        list.reset(allocator)?;
        Ok(list)
    }

    fn create_upload_page(&self, size: u64) -> Result<VulkanUploadPage> {
        let device = &self.shared.device;
        let buffer_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(vk::BufferUsageFlags::TRANSFER_SRC | vk::BufferUsageFlags::UNIFORM_BUFFER)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        let buffer = unsafe { device.create_buffer(&buffer_info, None) }
            .map_err(|e| vk_error("Failed to create upload buffer", e))?;

        let requirements = unsafe { device.get_buffer_memory_requirements(buffer) };
        let allocation = self
            .shared
            .allocator
            .lock()
            .allocate(&AllocationCreateDesc {
                name: "upload_page",
                requirements,
                location: gpu_allocator::MemoryLocation::CpuToGpu,
                linear: true,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            });
        let allocation = match allocation {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { device.destroy_buffer(buffer, None) };
                return Err(RecordingError::Backend(format!(
                    "Failed to allocate upload memory: {e}"
                )));
            }
        };

        if let Err(e) =
            unsafe { device.bind_buffer_memory(buffer, allocation.memory(), allocation.offset()) }
        {
            let _ = self.shared.allocator.lock().free(allocation);
            unsafe { device.destroy_buffer(buffer, None) };
            return Err(vk_error("Failed to bind upload memory", e));
        }

        let resource = Arc::new(GpuResource::new(
            "upload_page",
            ResourceKind::Buffer { size },
            RawResource::VulkanBuffer(buffer),
            ResourceStates::GENERIC_READ,
        ));
        Ok(VulkanUploadPage {
            shared: Arc::clone(&self.shared),
            buffer,
            resource,
            allocation: Some(allocation),
        })
    }
}

/// A Vulkan queue paired with its timeline semaphore.
pub struct VulkanQueue {
    shared: Arc<DeviceShared>,
    queue_type: QueueType,
    /// Submission to one `VkQueue` must be externally synchronized.
    queue: Mutex<vk::Queue>,
    timeline: vk::Semaphore,
    last_submitted: AtomicU64,
    completed: AtomicU64,
}

impl Queue for VulkanQueue {
    type A = VulkanApi;

    fn queue_type(&self) -> QueueType {
        self.queue_type
    }

    fn execute(&self, list: &mut VulkanCommandList) -> Result<FenceValue> {
        list.close()?;

        let queue = self.queue.lock();
        let value = self.last_submitted.load(Ordering::Acquire) + 1;
        let signal_values = [value];
        let signal_semaphores = [self.timeline];
        let command_buffers = [list.cmd];
        let mut timeline_info =
            vk::TimelineSemaphoreSubmitInfo::default().signal_semaphore_values(&signal_values);
        let submit_info = vk::SubmitInfo::default()
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores)
            .push_next(&mut timeline_info);

        unsafe {
            self.shared
                .device
                .queue_submit(*queue, &[submit_info], vk::Fence::null())
        }
        .map_err(|e| vk_error("Failed to submit command buffer", e))?;
        self.last_submitted.store(value, Ordering::Release);
        Ok(FenceValue(value))
    }

    fn completed_value(&self) -> FenceValue {
        match unsafe { self.shared.device.get_semaphore_counter_value(self.timeline) } {
            Ok(value) => {
                self.completed.fetch_max(value, Ordering::AcqRel);
                FenceValue(value)
            }
            Err(e) => {
                log::warn!("VulkanQueue[{:?}]: failed to query timeline: {:?}", self.queue_type, e);
                FenceValue(self.completed.load(Ordering::Acquire))
            }
        }
    }

    fn last_submitted(&self) -> FenceValue {
        FenceValue(self.last_submitted.load(Ordering::Acquire))
    }

    fn wait(&self, fence: FenceValue) -> Result<()> {
        if fence > self.last_submitted() {
            return Err(RecordingError::InvalidArgument(format!(
                "fence {fence} was never submitted on the {:?} queue",
                self.queue_type
            )));
        }
        let semaphores = [self.timeline];
        let values = [fence.get()];
        let wait_info = vk::SemaphoreWaitInfo::default()
            .semaphores(&semaphores)
            .values(&values);
        unsafe { self.shared.device.wait_semaphores(&wait_info, u64::MAX) }
            .map_err(|e| vk_error("Failed to wait for timeline", e))?;
        self.completed.fetch_max(fence.get(), Ordering::AcqRel);
        Ok(())
    }
}

impl Drop for VulkanQueue {
    fn drop(&mut self) {
        unsafe {
            let _ = self.shared.device.queue_wait_idle(*self.queue.lock());
            self.shared.device.destroy_semaphore(self.timeline, None);
        }
    }
}

impl std::fmt::Debug for VulkanQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulkanQueue")
            .field("queue_type", &self.queue_type)
            .field("last_submitted", &self.last_submitted)
            .finish()
    }
}

/// A command pool and the command buffers allocated from it.
pub struct VulkanCommandAllocator {
    shared: Arc<DeviceShared>,
    pool: vk::CommandPool,
    buffers: Vec<vk::CommandBuffer>,
    /// Buffers before this index are in use since the last reset.
    next: usize,
}

impl VulkanCommandAllocator {
    fn next_buffer(&mut self) -> Result<vk::CommandBuffer> {
        if self.next == self.buffers.len() {
            let alloc_info = vk::CommandBufferAllocateInfo::default()
                .command_pool(self.pool)
                .level(vk::CommandBufferLevel::PRIMARY)
                .command_buffer_count(1);
            let buffers = unsafe { self.shared.device.allocate_command_buffers(&alloc_info) }
                .map_err(|e| vk_error("Failed to allocate command buffer", e))?;
            self.buffers.extend(buffers);
        }
        let buffer = self.buffers[self.next];
        self.next += 1;
        Ok(buffer)
    }
}

impl CommandAllocator for VulkanCommandAllocator {
    type A = VulkanApi;

    fn reset(&mut self) -> Result<()> {
        unsafe {
            self.shared
                .device
                .reset_command_pool(self.pool, vk::CommandPoolResetFlags::empty())
        }
        .map_err(|e| vk_error("Failed to reset command pool", e))?;
        self.next = 0;
        Ok(())
    }
}

impl Drop for VulkanCommandAllocator {
    fn drop(&mut self) {
        unsafe { self.shared.device.destroy_command_pool(self.pool, None) };
    }
}

impl std::fmt::Debug for VulkanCommandAllocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulkanCommandAllocator")
            .field("buffers", &self.buffers.len())
            .field("in_use", &self.next)
            .finish()
    }
}

/// A primary command buffer recording into the current allocator.
pub struct VulkanCommandList {
    shared: Arc<DeviceShared>,
    queue_type: QueueType,
    cmd: vk::CommandBuffer,
    recording: bool,
}

impl VulkanCommandList {
    /// The command buffer currently being recorded.
    pub fn raw(&self) -> vk::CommandBuffer {
        self.cmd
    }
}

impl CommandList for VulkanCommandList {
    type A = VulkanApi;

    fn queue_type(&self) -> QueueType {
        self.queue_type
    }

    fn reset(&mut self, allocator: &mut VulkanCommandAllocator) -> Result<()> {
        self.close()?;
        let cmd = allocator.next_buffer()?;
        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe { self.shared.device.begin_command_buffer(cmd, &begin_info) }
            .map_err(|e| vk_error("Failed to begin command buffer", e))?;
        self.cmd = cmd;
        self.recording = true;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.recording {
            self.recording = false;
            unsafe { self.shared.device.end_command_buffer(self.cmd) }
                .map_err(|e| vk_error("Failed to end command buffer", e))?;
        }
        Ok(())
    }

    fn resource_barrier(&mut self, barriers: &[ResourceBarrier]) {
        let mut src_stages = vk::PipelineStageFlags::empty();
        let mut dst_stages = vk::PipelineStageFlags::empty();
        let mut buffer_barriers = Vec::new();
        let mut image_barriers = Vec::new();

        for barrier in barriers {
            if barrier.mode == BarrierMode::BeginSplit {
                continue;
            }
            let Some(resource) = barrier.resource.upgrade() else {
                log::warn!(
                    "VulkanCommandList: skipping barrier of dropped resource {:?}",
                    barrier.resource_id
                );
                continue;
            };

            src_stages |= state_stages(barrier.before, self.queue_type);
            dst_stages |= state_stages(barrier.after, self.queue_type);
            let src_access = state_access(barrier.before, self.queue_type);
            let dst_access = state_access(barrier.after, self.queue_type);

            match resource.raw() {
                RawResource::VulkanBuffer(buffer) => buffer_barriers.push(
                    vk::BufferMemoryBarrier::default()
                        .src_access_mask(src_access)
                        .dst_access_mask(dst_access)
                        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                        .buffer(buffer)
                        .offset(0)
                        .size(vk::WHOLE_SIZE),
                ),
                RawResource::VulkanImage { image, aspect } => image_barriers.push(
                    vk::ImageMemoryBarrier::default()
                        .old_layout(state_layout(barrier.before))
                        .new_layout(state_layout(barrier.after))
                        .src_access_mask(src_access)
                        .dst_access_mask(dst_access)
                        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                        .image(image)
                        .subresource_range(vk::ImageSubresourceRange {
                            aspect_mask: aspect,
                            base_mip_level: 0,
                            level_count: vk::REMAINING_MIP_LEVELS,
                            base_array_layer: 0,
                            layer_count: vk::REMAINING_ARRAY_LAYERS,
                        }),
                ),
                RawResource::Dummy => {
                    log::warn!(
                        "VulkanCommandList: '{}' has no Vulkan object, barrier skipped",
                        resource.label()
                    );
                }
            }
        }

        if buffer_barriers.is_empty() && image_barriers.is_empty() {
            return;
        }
        unsafe {
            self.shared.device.cmd_pipeline_barrier(
                self.cmd,
                src_stages,
                dst_stages,
                vk::DependencyFlags::empty(),
                &[],
                &buffer_barriers,
                &image_barriers,
            );
        }
    }

    fn set_pipeline_state(&mut self, pipeline: &PipelineState) {
        let RawPipeline::Vulkan(raw) = pipeline.raw() else {
            log::warn!(
                "VulkanCommandList: pipeline '{}' has no Vulkan object",
                pipeline.label()
            );
            return;
        };
        let bind_point = match pipeline.kind() {
            PipelineKind::Graphics => vk::PipelineBindPoint::GRAPHICS,
            PipelineKind::Compute => vk::PipelineBindPoint::COMPUTE,
        };
        unsafe {
            self.shared
                .device
                .cmd_bind_pipeline(self.cmd, bind_point, raw)
        };
    }

    fn copy_buffer_region(
        &mut self,
        dst: &GpuResource,
        dst_offset: u64,
        src: &GpuResource,
        src_offset: u64,
        num_bytes: u64,
    ) {
        let (RawResource::VulkanBuffer(dst_buffer), RawResource::VulkanBuffer(src_buffer)) =
            (dst.raw(), src.raw())
        else {
            log::warn!(
                "VulkanCommandList: copy '{}' -> '{}' needs two Vulkan buffers",
                src.label(),
                dst.label()
            );
            return;
        };
        let region = vk::BufferCopy {
            src_offset,
            dst_offset,
            size: num_bytes,
        };
        unsafe {
            self.shared
                .device
                .cmd_copy_buffer(self.cmd, src_buffer, dst_buffer, &[region])
        };
    }

    fn copy_buffer_to_texture(
        &mut self,
        dst: &GpuResource,
        subresource: u32,
        src: &GpuResource,
        footprint: &TextureFootprint,
    ) {
        let (
            RawResource::VulkanImage { image, aspect },
            RawResource::VulkanBuffer(buffer),
            ResourceKind::Texture { mip_levels, .. },
        ) = (dst.raw(), src.raw(), dst.kind())
        else {
            log::warn!(
                "VulkanCommandList: texture copy '{}' -> '{}' needs a Vulkan buffer and image",
                src.label(),
                dst.label()
            );
            return;
        };
        let mip_levels = mip_levels.max(1);
        let bytes_per_texel = u64::from(footprint.bytes_per_texel.max(1));
        let region = vk::BufferImageCopy {
            buffer_offset: footprint.offset,
            buffer_row_length: (footprint.row_pitch / bytes_per_texel) as u32,
            buffer_image_height: footprint.height,
            image_subresource: vk::ImageSubresourceLayers {
                aspect_mask: aspect,
                mip_level: subresource % mip_levels,
                base_array_layer: subresource / mip_levels,
                layer_count: 1,
            },
            image_offset: vk::Offset3D { x: 0, y: 0, z: 0 },
            image_extent: vk::Extent3D {
                width: footprint.width,
                height: footprint.height,
                depth: footprint.depth.max(1),
            },
        };
        unsafe {
            self.shared.device.cmd_copy_buffer_to_image(
                self.cmd,
                buffer,
                image,
                state_layout(ResourceStates::COPY_DEST),
                &[region],
            )
        };
    }
}

impl std::fmt::Debug for VulkanCommandList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulkanCommandList")
            .field("queue_type", &self.queue_type)
            .field("recording", &self.recording)
            .finish()
    }
}

/// A persistently mapped host-visible buffer.
pub struct VulkanUploadPage {
    shared: Arc<DeviceShared>,
    buffer: vk::Buffer,
    resource: Arc<GpuResource>,
    allocation: Option<Allocation>,
}

impl UploadPage for VulkanUploadPage {
    type A = VulkanApi;

    fn resource(&self) -> &Arc<GpuResource> {
        &self.resource
    }

    fn gpu_address(&self) -> u64 {
        // Buffer device addresses are not enabled.
        0
    }

    fn write(&self, offset: u64, data: &[u8]) -> Result<()> {
        let size = self.size();
        if offset
            .checked_add(data.len() as u64)
            .is_none_or(|end| end > size)
        {
            return Err(RecordingError::InvalidArgument(format!(
                "write of {} bytes at offset {} exceeds upload page of {} bytes",
                data.len(),
                offset,
                size
            )));
        }
        let mapped = self
            .allocation
            .as_ref()
            .and_then(|allocation| allocation.mapped_ptr())
            .ok_or_else(|| RecordingError::Backend("Upload page is not mapped".to_string()))?;
        // SAFETY: the range was bounds-checked against the mapped allocation.
        unsafe {
            std::ptr::copy_nonoverlapping(
                data.as_ptr(),
                (mapped.as_ptr() as *mut u8).add(offset as usize),
                data.len(),
            );
        }
        Ok(())
    }
}

impl Drop for VulkanUploadPage {
    fn drop(&mut self) {
        if let Some(allocation) = self.allocation.take() {
            if let Err(e) = self.shared.allocator.lock().free(allocation) {
                log::error!("VulkanUploadPage: failed to free memory: {}", e);
            }
        }
        unsafe { self.shared.device.destroy_buffer(self.buffer, None) };
    }
}

impl std::fmt::Debug for VulkanUploadPage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulkanUploadPage")
            .field("size", &self.size())
            .finish()
    }
}

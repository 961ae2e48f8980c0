//! GPU backend abstraction layer.
//!
//! The recording layer drives the device through a small family of traits
//! tied together by [`Api`]. Each backend supplies a device, queues, command
//! allocators, command lists and upload pages; the context pool and the
//! recording contexts are generic over the backend.
//!
//! # Available Backends
//!
//! - `dummy` (default): simulated GPU timeline for tests and tooling
//! - `vulkan-backend`: native Vulkan via ash and gpu-allocator
//!
//! # Contract
//!
//! - [`Queue::execute`] closes the list, submits it and returns a fence value
//!   strictly greater than every value it returned before.
//! - [`CommandAllocator::reset`] is only called once the fence of the last
//!   submission it backed has been reached.
//! - [`CommandList::reset`] reopens a list (open or closed) for recording into
//!   the given allocator.

#[cfg(feature = "dummy")]
pub mod dummy;

#[cfg(feature = "vulkan-backend")]
pub mod vulkan;

use std::sync::Arc;

use crate::barrier::ResourceBarrier;
use crate::error::Result;
use crate::pipeline::PipelineState;
use crate::resource::GpuResource;
use crate::types::{FenceValue, QueueType};

/// Ties the backend object types together.
pub trait Api: Clone + std::fmt::Debug + Sized + Send + Sync + 'static {
    type Device: Device<A = Self>;
    type Queue: Queue<A = Self>;
    type CommandAllocator: CommandAllocator<A = Self>;
    type CommandList: CommandList<A = Self>;
    type UploadPage: UploadPage<A = Self>;
}

/// Creates the objects the recording layer pools.
pub trait Device: Send + Sync {
    type A: Api;

    /// Human-readable device name.
    fn name(&self) -> &str;

    /// Whether the device exposes a queue of this type.
    fn supports_queue(&self, queue_type: QueueType) -> bool;

    /// Create the submission queue for `queue_type`.
    fn create_queue(&self, queue_type: QueueType) -> Result<<Self::A as Api>::Queue>;

    /// Create a fresh command allocator.
    fn create_allocator(
        &self,
        queue_type: QueueType,
    ) -> Result<<Self::A as Api>::CommandAllocator>;

    /// Create a command list already open for recording into `allocator`.
    fn create_command_list(
        &self,
        queue_type: QueueType,
        allocator: &mut <Self::A as Api>::CommandAllocator,
    ) -> Result<<Self::A as Api>::CommandList>;

    /// Create a CPU-writable, GPU-readable buffer of `size` bytes.
    fn create_upload_page(&self, size: u64) -> Result<<Self::A as Api>::UploadPage>;
}

/// A GPU queue with a monotonically increasing fence timeline.
pub trait Queue: Send + Sync {
    type A: Api;

    fn queue_type(&self) -> QueueType;

    /// Close `list`, submit it, and return the fence value of this submission.
    fn execute(&self, list: &mut <Self::A as Api>::CommandList) -> Result<FenceValue>;

    /// Highest fence value the GPU has completed.
    fn completed_value(&self) -> FenceValue;

    /// Fence value of the most recent submission.
    fn last_submitted(&self) -> FenceValue;

    /// Block until the GPU has reached `fence`.
    fn wait(&self, fence: FenceValue) -> Result<()>;

    /// Non-blocking completion check.
    fn is_complete(&self, fence: FenceValue) -> bool {
        fence.is_reached(self.completed_value())
    }
}

/// Backing memory for recorded commands.
pub trait CommandAllocator: Send {
    type A: Api;

    /// Reclaim all command memory.
    fn reset(&mut self) -> Result<()>;
}

/// An ordered recording of GPU operations.
pub trait CommandList: Send {
    type A: Api;

    fn queue_type(&self) -> QueueType;

    /// Reopen the list, recording into `allocator` from now on.
    fn reset(&mut self, allocator: &mut <Self::A as Api>::CommandAllocator) -> Result<()>;

    /// Stop recording. Closing an already closed list is a no-op.
    fn close(&mut self) -> Result<()>;

    /// Record one batched synchronization call.
    fn resource_barrier(&mut self, barriers: &[ResourceBarrier]);

    /// Bind a pipeline state object.
    fn set_pipeline_state(&mut self, pipeline: &PipelineState);

    /// Copy `num_bytes` between two buffers.
    fn copy_buffer_region(
        &mut self,
        dst: &GpuResource,
        dst_offset: u64,
        src: &GpuResource,
        src_offset: u64,
        num_bytes: u64,
    );

    /// Copy one texture subresource out of a buffer.
    fn copy_buffer_to_texture(
        &mut self,
        dst: &GpuResource,
        subresource: u32,
        src: &GpuResource,
        footprint: &TextureFootprint,
    );
}

/// A mapped buffer that dynamic allocations and uploads are carved from.
pub trait UploadPage: Send + Sync {
    type A: Api;

    /// The tracked buffer backing this page.
    fn resource(&self) -> &Arc<GpuResource>;

    /// Page size in bytes.
    fn size(&self) -> u64 {
        self.resource().buffer_size().unwrap_or(0)
    }

    /// Device address of the first byte, 0 if the backend has none.
    fn gpu_address(&self) -> u64;

    /// Copy CPU data into the page at `offset`.
    fn write(&self, offset: u64, data: &[u8]) -> Result<()>;
}

/// Layout of one texture subresource inside a staging buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureFootprint {
    /// Byte offset of the subresource in the buffer.
    pub offset: u64,
    /// Bytes between two rows.
    pub row_pitch: u64,
    /// Bytes per texel of the texture format.
    pub bytes_per_texel: u32,
    pub width: u32,
    pub height: u32,
    pub depth: u32,
}

impl TextureFootprint {
    /// Total bytes the subresource occupies in the buffer.
    pub fn byte_size(&self) -> u64 {
        self.row_pitch * u64::from(self.height) * u64::from(self.depth.max(1))
    }
}

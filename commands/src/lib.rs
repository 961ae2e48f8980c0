//! # RedLilium Commands
//!
//! Command recording layer for the RedLilium renderer.
//!
//! ## Overview
//!
//! This crate provides:
//! - [`ContextManager`] - Thread-safe pool of recording contexts per queue type
//! - [`CommandContext`] - A checked-out context: barriers, dynamic memory, submission
//! - [`AllocatorPool`] - Command allocators recycled once their fence completes
//! - [`BarrierBatch`] - Resource state tracking with batched barrier emission
//! - [`backend`] - Device abstraction with Dummy (testing) and Vulkan backends
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use redlilium_commands::{ContextManager, RecordingConfig, ResourceStates};
//! use redlilium_commands::backend::dummy::DummyDevice;
//!
//! let manager = ContextManager::new(Arc::new(DummyDevice::new()), RecordingConfig::default())?;
//! let mut ctx = manager.begin("upload")?;
//! ctx.transition_resource(&buffer, ResourceStates::COPY_DEST, false)?;
//! let fence = ctx.finish(true, false)?;
//! ```

pub mod allocator_pool;
pub mod arena;
pub mod backend;
pub mod barrier;
pub mod config;
pub mod context;
pub mod error;
pub mod fenced;
pub mod pipeline;
pub mod resource;
pub mod types;

// Re-export main types for convenience
pub use allocator_pool::AllocatorPool;
pub use arena::{DescriptorRange, DynamicAllocation, DynamicArena, UploadPagePool};
pub use backend::{Api, CommandAllocator, CommandList, Device, Queue, TextureFootprint, UploadPage};
pub use barrier::{BARRIER_BATCH_CAPACITY, BarrierBatch, BarrierMode, ResourceBarrier};
pub use config::RecordingConfig;
pub use context::{CommandContext, ContextId, ContextManager, PoolStats, SubresourceData};
pub use error::{ContextState, RecordingError, Result};
pub use fenced::FencedQueue;
pub use pipeline::{PipelineKind, PipelineState, RawPipeline};
pub use resource::{GpuResource, RawResource, ResourceId, ResourceKind};
pub use types::{FenceValue, QueueType, ResourceStates};

/// Commands library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the command recording subsystem.
pub fn init() {
    log::info!("RedLilium Commands v{} initialized", VERSION);
}

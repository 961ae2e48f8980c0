//! Recording configuration.

use crate::barrier::BARRIER_BATCH_CAPACITY;
use crate::error::{RecordingError, Result};

/// Default alignment of dynamic allocations (256 bytes).
///
/// Matches the minimum constant-buffer offset alignment of most GPUs.
pub const DEFAULT_DYNAMIC_ALIGNMENT: u64 = 256;

/// Default size of one dynamic upload page (64 KiB).
pub const DEFAULT_DYNAMIC_PAGE_SIZE: u64 = 64 * 1024;

/// Default number of transient descriptors per context.
pub const DEFAULT_DYNAMIC_DESCRIPTOR_COUNT: u32 = 256;

/// Tunables of a [`ContextManager`](crate::ContextManager).
///
/// # Example
///
/// ```ignore
/// let config = RecordingConfig::default()
///     .with_barrier_batch_capacity(32)
///     .with_dynamic_page_size(256 * 1024);
/// let manager = ContextManager::new(device, config)?;
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordingConfig {
    /// Barriers buffered before an automatic flush.
    pub barrier_batch_capacity: usize,
    /// Bytes of one dynamic upload page.
    pub dynamic_page_size: u64,
    /// Transient descriptor slots per context.
    pub dynamic_descriptor_count: u32,
}

impl RecordingConfig {
    pub fn new() -> Self {
        Self {
            barrier_batch_capacity: BARRIER_BATCH_CAPACITY,
            dynamic_page_size: DEFAULT_DYNAMIC_PAGE_SIZE,
            dynamic_descriptor_count: DEFAULT_DYNAMIC_DESCRIPTOR_COUNT,
        }
    }

    pub fn with_barrier_batch_capacity(mut self, capacity: usize) -> Self {
        self.barrier_batch_capacity = capacity;
        self
    }

    pub fn with_dynamic_page_size(mut self, size: u64) -> Self {
        self.dynamic_page_size = size;
        self
    }

    pub fn with_dynamic_descriptor_count(mut self, count: u32) -> Self {
        self.dynamic_descriptor_count = count;
        self
    }

    /// Reject configurations no context could work with.
    pub fn validate(&self) -> Result<()> {
        if self.barrier_batch_capacity == 0 {
            return Err(RecordingError::InvalidArgument(
                "barrier batch capacity cannot be zero".to_string(),
            ));
        }
        if self.dynamic_page_size < DEFAULT_DYNAMIC_ALIGNMENT {
            return Err(RecordingError::InvalidArgument(format!(
                "dynamic page size must be at least {DEFAULT_DYNAMIC_ALIGNMENT} bytes, got {}",
                self.dynamic_page_size
            )));
        }
        Ok(())
    }
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self::new()
    }
}

//! Per-context dynamic allocation.
//!
//! Each recording context owns a [`DynamicArena`]: a bump cursor over one
//! upload page for transient buffer data, plus a cursor over a fixed number of
//! transient descriptor slots. Pages come from a per-queue [`UploadPagePool`]
//! and go back to it tagged with the fence of the last submission that read
//! them, so a page is never rewritten while the GPU may still read it.
//! Descriptor slots only rewind once that fence is reached; until then the
//! next session continues after the slots already handed out.
//!
//! # Example
//!
//! ```ignore
//! let alloc = ctx.allocate_dynamic_space(64, 256)?;
//! ctx.write_dynamic(&alloc, bytes_of(&camera))?;
//! // bind alloc.gpu_address as a root constant buffer...
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::backend::{Api, Device, UploadPage};
use crate::error::{RecordingError, Result};
use crate::fenced::FencedQueue;
use crate::resource::GpuResource;
use crate::types::FenceValue;

/// A block carved out of a context's upload page.
#[derive(Debug, Clone)]
pub struct DynamicAllocation {
    /// Buffer the block lives in.
    pub resource: Arc<GpuResource>,
    /// Byte offset of the block inside `resource`.
    pub offset: u64,
    /// Size of the block in bytes.
    pub size: u64,
    /// Device address of the first byte.
    pub gpu_address: u64,
    /// Arena generation the block was carved in.
    generation: u64,
}

impl DynamicAllocation {
    /// End offset (offset + size).
    pub fn end(&self) -> u64 {
        self.offset + self.size
    }
}

/// A run of transient descriptor slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DescriptorRange {
    pub base: u32,
    pub count: u32,
}

/// Fence-gated pool of upload pages for one queue.
pub struct UploadPagePool<A: Api> {
    page_size: u64,
    retired: FencedQueue<A::UploadPage>,
    created: AtomicUsize,
}

impl<A: Api> UploadPagePool<A> {
    pub fn new(page_size: u64) -> Self {
        Self {
            page_size,
            retired: FencedQueue::new(),
            created: AtomicUsize::new(0),
        }
    }

    /// Size of pooled pages.
    pub fn page_size(&self) -> u64 {
        self.page_size
    }

    /// Take a pooled page the GPU is done with, or create one.
    pub fn acquire(&self, device: &A::Device, completed: FenceValue) -> Result<A::UploadPage> {
        if let Some((fence, page)) = self.retired.take_reached(completed) {
            log::trace!("UploadPagePool: reusing page retired at fence {}", fence);
            return Ok(page);
        }
        self.create(device, self.page_size)
    }

    /// Like [`acquire`](Self::acquire), but `size` may exceed the pooled page
    /// size, in which case a dedicated page is created.
    pub fn acquire_at_least(
        &self,
        device: &A::Device,
        completed: FenceValue,
        size: u64,
    ) -> Result<A::UploadPage> {
        if size <= self.page_size {
            self.acquire(device, completed)
        } else {
            self.create(device, size)
        }
    }

    /// Hand a page back; it is reissued once `fence` is reached.
    ///
    /// Dedicated pages of a non-standard size are dropped instead.
    pub fn release(&self, page: A::UploadPage, fence: FenceValue) {
        if page.size() != self.page_size {
            log::trace!(
                "UploadPagePool: dropping dedicated page of {} bytes",
                page.size()
            );
            return;
        }
        self.retired.release(page, fence);
    }

    /// Number of pages ever created through this pool.
    pub fn created(&self) -> usize {
        self.created.load(Ordering::Relaxed)
    }

    pub fn retired(&self) -> usize {
        self.retired.len()
    }

    pub(crate) fn clear(&self) {
        self.retired.clear();
    }

    fn create(&self, device: &A::Device, size: u64) -> Result<A::UploadPage> {
        let page = device.create_upload_page(size)?;
        self.created.fetch_add(1, Ordering::Relaxed);
        log::debug!("UploadPagePool: created page of {} bytes", size);
        Ok(page)
    }
}

impl<A: Api> std::fmt::Debug for UploadPagePool<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadPagePool")
            .field("page_size", &self.page_size)
            .field("created", &self.created())
            .field("retired", &self.retired)
            .finish()
    }
}

/// Bump allocator over one upload page and a descriptor range.
///
/// Not thread-safe; owned by a single context.
pub struct DynamicArena<A: Api> {
    page: Option<A::UploadPage>,
    cursor: u64,
    descriptor_cursor: u32,
    descriptor_capacity: u32,
    last_fence: FenceValue,
    /// Bumped whenever handed-out blocks stop being valid.
    generation: u64,
}

impl<A: Api> DynamicArena<A> {
    pub fn new(descriptor_capacity: u32) -> Self {
        Self {
            page: None,
            cursor: 0,
            descriptor_cursor: 0,
            descriptor_capacity,
            last_fence: FenceValue::ZERO,
            generation: 0,
        }
    }

    /// Bytes handed out since the last rewind.
    pub fn used(&self) -> u64 {
        self.cursor
    }

    pub fn has_page(&self) -> bool {
        self.page.is_some()
    }

    /// Descriptor slots handed out since the last rewind, including slots a
    /// previous session may still have in flight.
    pub fn descriptors_used(&self) -> u32 {
        self.descriptor_cursor
    }

    /// Fence of the last submission that may read the arena.
    pub fn last_fence(&self) -> FenceValue {
        self.last_fence
    }

    /// Carve `size` bytes aligned to `alignment` out of the current page.
    pub fn allocate(
        &mut self,
        pages: &UploadPagePool<A>,
        device: &A::Device,
        completed: FenceValue,
        size: u64,
        alignment: u64,
    ) -> Result<DynamicAllocation> {
        if size == 0 {
            return Err(RecordingError::InvalidArgument(
                "dynamic allocation size cannot be zero".to_string(),
            ));
        }
        if !alignment.is_power_of_two() {
            return Err(RecordingError::InvalidArgument(format!(
                "alignment must be a power of 2, got {alignment}"
            )));
        }

        let page = match self.page.take() {
            Some(page) => page,
            None => {
                self.cursor = 0;
                pages.acquire(device, completed)?
            }
        };
        let capacity = page.size();
        let aligned = align_up(self.cursor, alignment).min(capacity);
        let available = capacity - aligned;
        if size > available {
            self.page = Some(page);
            return Err(RecordingError::OutOfSpace {
                requested: size,
                available,
            });
        }

        let allocation = DynamicAllocation {
            resource: Arc::clone(page.resource()),
            offset: aligned,
            size,
            gpu_address: page.gpu_address() + aligned,
            generation: self.generation,
        };
        self.cursor = aligned + size;
        self.page = Some(page);
        log::trace!(
            "DynamicArena: allocated {} bytes at offset {} ({} used)",
            size,
            aligned,
            self.cursor
        );
        Ok(allocation)
    }

    /// Copy `bytes` into a block returned by [`allocate`](Self::allocate).
    ///
    /// Blocks from an earlier session are rejected, even when the page was
    /// rewound in place and still holds the same buffer.
    pub fn write(&self, allocation: &DynamicAllocation, bytes: &[u8]) -> Result<()> {
        if allocation.generation != self.generation {
            return Err(RecordingError::InvalidArgument(format!(
                "allocation from arena generation {} is stale (current {})",
                allocation.generation, self.generation
            )));
        }
        let page = self
            .page
            .as_ref()
            .filter(|page| page.resource().id() == allocation.resource.id())
            .ok_or_else(|| {
                RecordingError::InvalidArgument(
                    "allocation does not belong to this context's current page".to_string(),
                )
            })?;
        if bytes.len() as u64 > allocation.size {
            return Err(RecordingError::InvalidArgument(format!(
                "{} bytes do not fit a {} byte allocation",
                bytes.len(),
                allocation.size
            )));
        }
        page.write(allocation.offset, bytes)
    }

    /// Reserve `count` consecutive transient descriptor slots.
    pub fn allocate_descriptors(&mut self, count: u32) -> Result<DescriptorRange> {
        if count == 0 {
            return Err(RecordingError::InvalidArgument(
                "descriptor count cannot be zero".to_string(),
            ));
        }
        let available = self.descriptor_capacity - self.descriptor_cursor;
        if count > available {
            return Err(RecordingError::OutOfSpace {
                requested: u64::from(count),
                available: u64::from(available),
            });
        }
        let range = DescriptorRange {
            base: self.descriptor_cursor,
            count,
        };
        self.descriptor_cursor += count;
        Ok(range)
    }

    /// Record that a submission signaled by `fence` may read the arena.
    pub fn mark_submitted(&mut self, fence: FenceValue) {
        self.last_fence = fence;
    }

    /// Return the page to `pages` right away, tagged with `fence`.
    ///
    /// Descriptor slots stay reserved until the next reset observes `fence`.
    pub fn release(&mut self, pages: &UploadPagePool<A>, fence: FenceValue) {
        if let Some(page) = self.page.take() {
            pages.release(page, fence);
        }
        self.cursor = 0;
        self.last_fence = fence;
        self.generation += 1;
    }

    /// Prepare the arena for a new recording session.
    ///
    /// Rewinds in place if the GPU is done with the arena. Otherwise the page
    /// is retired (a fresh one is taken on the next allocation) and descriptor
    /// allocation continues after the slots still in flight.
    pub fn reset(&mut self, pages: &UploadPagePool<A>, completed: FenceValue) {
        if self.last_fence.is_reached(completed) {
            self.descriptor_cursor = 0;
        } else {
            if let Some(page) = self.page.take() {
                log::trace!(
                    "DynamicArena: retiring busy page until fence {} (completed {})",
                    self.last_fence,
                    completed
                );
                pages.release(page, self.last_fence);
            }
            log::trace!(
                "DynamicArena: {} descriptor slots in flight until fence {}",
                self.descriptor_cursor,
                self.last_fence
            );
        }
        self.cursor = 0;
        self.generation += 1;
    }
}

impl<A: Api> std::fmt::Debug for DynamicArena<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamicArena")
            .field("has_page", &self.page.is_some())
            .field("cursor", &self.cursor)
            .field("descriptor_cursor", &self.descriptor_cursor)
            .field("descriptor_capacity", &self.descriptor_capacity)
            .field("last_fence", &self.last_fence)
            .field("generation", &self.generation)
            .finish()
    }
}

/// Align a value up to the given alignment.
#[inline]
fn align_up(value: u64, alignment: u64) -> u64 {
    debug_assert!(alignment.is_power_of_two());
    (value + alignment - 1) & !(alignment - 1)
}

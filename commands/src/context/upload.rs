//! One-shot resource initialization through a staging page.
//!
//! Each helper opens a copy context (graphics if the device has no copy
//! queue), stages the data in a dedicated upload page, moves the destination
//! to `COPY_DEST`, records the copy, moves it back to `COMMON` and finishes
//! with a blocking wait. The destination can be used from any queue once the
//! helper returns.

use std::sync::Arc;

use crate::backend::{Api, CommandList, Queue, TextureFootprint, UploadPage};
use crate::error::{RecordingError, Result};
use crate::resource::{GpuResource, ResourceKind};
use crate::types::{FenceValue, QueueType, ResourceStates};

use super::{CommandContext, ContextManager};

/// Row pitch alignment of texture data in a staging buffer.
const TEXTURE_PITCH_ALIGNMENT: u64 = 256;

/// Placement alignment of each subresource in a staging buffer.
const TEXTURE_PLACEMENT_ALIGNMENT: u64 = 512;

/// CPU-side contents of one texture subresource.
#[derive(Debug, Clone, Copy)]
pub struct SubresourceData<'a> {
    pub data: &'a [u8],
    /// Bytes between two rows in `data`.
    pub row_pitch: u64,
}

impl<A: Api> ContextManager<A> {
    /// Fill `dest` with `data`, starting at `dest_offset`.
    pub fn initialize_buffer(
        &self,
        dest: &Arc<GpuResource>,
        data: &[u8],
        dest_offset: u64,
    ) -> Result<FenceValue> {
        if data.is_empty() {
            return Err(RecordingError::InvalidArgument(
                "cannot initialize a buffer from empty data".to_string(),
            ));
        }
        let num_bytes = data.len() as u64;
        check_buffer_fits(dest, dest_offset, num_bytes)?;

        self.staged_upload("initialize_buffer", num_bytes, |page, ctx| {
            page.write(0, data)?;
            ctx.transition_resource(dest, ResourceStates::COPY_DEST, true)?;
            ctx.copy_buffer_region(dest, dest_offset, page.resource(), 0, num_bytes)?;
            ctx.transition_resource(dest, ResourceStates::COMMON, true)
        })
    }

    /// Copy `num_bytes` of an existing upload buffer into `dest`.
    ///
    /// `None` copies everything from `src_offset` to the end of `src`.
    pub fn initialize_buffer_from(
        &self,
        dest: &Arc<GpuResource>,
        src: &Arc<GpuResource>,
        src_offset: u64,
        num_bytes: Option<u64>,
        dest_offset: u64,
    ) -> Result<FenceValue> {
        let src_size = src.buffer_size().ok_or_else(|| {
            RecordingError::InvalidArgument(format!("'{}' is not a buffer", src.label()))
        })?;
        let num_bytes = match num_bytes {
            Some(num_bytes) => num_bytes,
            None => src_size.checked_sub(src_offset).ok_or_else(|| {
                RecordingError::InvalidArgument(format!(
                    "offset {src_offset} is past the end of '{}'",
                    src.label()
                ))
            })?,
        };
        if num_bytes == 0 {
            return Err(RecordingError::InvalidArgument(
                "cannot initialize a buffer from an empty range".to_string(),
            ));
        }
        check_buffer_fits(src, src_offset, num_bytes)?;
        check_buffer_fits(dest, dest_offset, num_bytes)?;

        let queue_type = self.upload_queue_type();
        let mut ctx = self.begin_on(queue_type, "initialize_buffer_from")?;
        ctx.transition_resource(dest, ResourceStates::COPY_DEST, true)?;
        ctx.copy_buffer_region(dest, dest_offset, src, src_offset, num_bytes)?;
        ctx.transition_resource(dest, ResourceStates::COMMON, true)?;
        ctx.finish(true, false)
    }

    /// Upload the first `subresources.len()` subresources of `dest`.
    ///
    /// Subresources are ordered mip-major within each array layer.
    pub fn initialize_texture(
        &self,
        dest: &Arc<GpuResource>,
        bytes_per_texel: u32,
        subresources: &[SubresourceData<'_>],
    ) -> Result<FenceValue> {
        let footprints = texture_footprints(dest, bytes_per_texel, subresources)?;
        let staging_size = footprints
            .last()
            .map(|footprint| footprint.offset + footprint.byte_size())
            .unwrap_or(0);

        self.staged_upload("initialize_texture", staging_size, |page, ctx| {
            for (footprint, subresource) in footprints.iter().zip(subresources) {
                let row_bytes = u64::from(footprint.width) * u64::from(bytes_per_texel);
                for row in 0..u64::from(footprint.height) {
                    let start = (row * subresource.row_pitch) as usize;
                    let end = start + row_bytes as usize;
                    page.write(
                        footprint.offset + row * footprint.row_pitch,
                        &subresource.data[start..end],
                    )?;
                }
            }

            ctx.transition_resource(dest, ResourceStates::COPY_DEST, true)?;
            let list = ctx.command_list_mut()?;
            for (index, footprint) in footprints.iter().enumerate() {
                list.copy_buffer_to_texture(dest, index as u32, page.resource(), footprint);
            }
            ctx.transition_resource(dest, ResourceStates::COMMON, true)
        })
    }

    /// Queue the upload helpers submit on.
    fn upload_queue_type(&self) -> QueueType {
        if self.supports(QueueType::Copy) {
            QueueType::Copy
        } else {
            QueueType::Graphics
        }
    }

    /// Run `record` against a staging page of at least `size` bytes and a
    /// fresh upload context, then finish and wait.
    fn staged_upload<F>(&self, label: &str, size: u64, record: F) -> Result<FenceValue>
    where
        F: FnOnce(&A::UploadPage, &mut CommandContext<'_, A>) -> Result<()>,
    {
        let queue_type = self.upload_queue_type();
        let slot = self.slot(queue_type)?;
        let page = slot
            .pages
            .acquire_at_least(self.device(), slot.queue.completed_value(), size)?;

        let result = self.begin_on(queue_type, label).and_then(|mut ctx| {
            record(&page, &mut ctx)?;
            ctx.finish(true, false)
        });

        // On failure part of the upload may still be in flight.
        let fence = match &result {
            Ok(fence) => *fence,
            Err(_) => slot.queue.last_submitted(),
        };
        slot.pages.release(page, fence);
        log::debug!(
            "ContextManager: {} staged {} bytes on the {:?} queue",
            label,
            size,
            queue_type
        );
        result
    }
}

fn check_buffer_fits(resource: &GpuResource, offset: u64, num_bytes: u64) -> Result<()> {
    let size = resource.buffer_size().ok_or_else(|| {
        RecordingError::InvalidArgument(format!("'{}' is not a buffer", resource.label()))
    })?;
    match offset.checked_add(num_bytes) {
        Some(end) if end <= size => Ok(()),
        _ => Err(RecordingError::InvalidArgument(format!(
            "{} bytes at offset {} do not fit '{}' ({} bytes)",
            num_bytes,
            offset,
            resource.label(),
            size
        ))),
    }
}

/// Lay out `subresources` of `dest` in a staging buffer.
fn texture_footprints(
    dest: &GpuResource,
    bytes_per_texel: u32,
    subresources: &[SubresourceData<'_>],
) -> Result<Vec<TextureFootprint>> {
    let ResourceKind::Texture {
        width,
        height,
        mip_levels,
        ..
    } = dest.kind()
    else {
        return Err(RecordingError::InvalidArgument(format!(
            "'{}' is not a texture",
            dest.label()
        )));
    };
    if subresources.is_empty() || subresources.len() > dest.subresource_count() as usize {
        return Err(RecordingError::InvalidArgument(format!(
            "'{}' has {} subresources, got data for {}",
            dest.label(),
            dest.subresource_count(),
            subresources.len()
        )));
    }
    if bytes_per_texel == 0 {
        return Err(RecordingError::InvalidArgument(
            "bytes per texel cannot be zero".to_string(),
        ));
    }

    let mut footprints = Vec::with_capacity(subresources.len());
    let mut offset = 0u64;
    for (index, subresource) in subresources.iter().enumerate() {
        let mip = index as u32 % mip_levels.max(1);
        let mip_width = (width >> mip).max(1);
        let mip_height = (height >> mip).max(1);
        let row_bytes = u64::from(mip_width) * u64::from(bytes_per_texel);

        let Some(required) = subresource
            .row_pitch
            .checked_mul(u64::from(mip_height - 1))
            .and_then(|bytes| bytes.checked_add(row_bytes))
        else {
            return Err(RecordingError::InvalidArgument(format!(
                "subresource {index} of '{}' has a row pitch of {} that overflows its size",
                dest.label(),
                subresource.row_pitch
            )));
        };
        if subresource.row_pitch < row_bytes || (subresource.data.len() as u64) < required {
            return Err(RecordingError::InvalidArgument(format!(
                "subresource {index} of '{}' needs {required} bytes with a row pitch of at least {row_bytes}",
                dest.label()
            )));
        }

        offset = offset.next_multiple_of(TEXTURE_PLACEMENT_ALIGNMENT);
        let footprint = TextureFootprint {
            offset,
            row_pitch: row_bytes.next_multiple_of(TEXTURE_PITCH_ALIGNMENT),
            bytes_per_texel,
            width: mip_width,
            height: mip_height,
            depth: 1,
        };
        offset += footprint.byte_size();
        footprints.push(footprint);
    }
    Ok(footprints)
}

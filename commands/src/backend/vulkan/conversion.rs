//! Conversions from resource states to Vulkan synchronization scopes.

use ash::vk;

use crate::error::RecordingError;
use crate::types::{QueueType, ResourceStates};

/// Image layout a resource in `state` must be in.
///
/// `COMMON` and mixed states map to `GENERAL`.
pub fn state_layout(state: ResourceStates) -> vk::ImageLayout {
    let mut layout = None;
    for bit in state.iter() {
        let bit_layout = single_state_layout(bit);
        match layout {
            None => layout = Some(bit_layout),
            Some(current) if current == bit_layout => {}
            Some(_) => return vk::ImageLayout::GENERAL,
        }
    }
    layout.unwrap_or(vk::ImageLayout::GENERAL)
}

fn single_state_layout(state: ResourceStates) -> vk::ImageLayout {
    match state {
        ResourceStates::RENDER_TARGET => vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        ResourceStates::DEPTH_WRITE => vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        ResourceStates::DEPTH_READ => vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL,
        ResourceStates::NON_PIXEL_SHADER_RESOURCE | ResourceStates::PIXEL_SHADER_RESOURCE => {
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
        }
        ResourceStates::COPY_DEST | ResourceStates::RESOLVE_DEST => {
            vk::ImageLayout::TRANSFER_DST_OPTIMAL
        }
        ResourceStates::COPY_SOURCE | ResourceStates::RESOLVE_SOURCE => {
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL
        }
        ResourceStates::PRESENT => vk::ImageLayout::PRESENT_SRC_KHR,
        _ => vk::ImageLayout::GENERAL,
    }
}

/// Memory accesses a resource in `state` may perform.
pub fn state_access(state: ResourceStates, queue_type: QueueType) -> vk::AccessFlags {
    let mut access = vk::AccessFlags::empty();
    for bit in state.iter() {
        access |= match bit {
            ResourceStates::VERTEX_AND_CONSTANT_BUFFER => {
                vk::AccessFlags::VERTEX_ATTRIBUTE_READ | vk::AccessFlags::UNIFORM_READ
            }
            ResourceStates::INDEX_BUFFER => vk::AccessFlags::INDEX_READ,
            ResourceStates::RENDER_TARGET => {
                vk::AccessFlags::COLOR_ATTACHMENT_READ | vk::AccessFlags::COLOR_ATTACHMENT_WRITE
            }
            ResourceStates::UNORDERED_ACCESS | ResourceStates::STREAM_OUT => {
                vk::AccessFlags::SHADER_READ | vk::AccessFlags::SHADER_WRITE
            }
            ResourceStates::DEPTH_WRITE => {
                vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ
                    | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE
            }
            ResourceStates::DEPTH_READ => vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ,
            ResourceStates::NON_PIXEL_SHADER_RESOURCE | ResourceStates::PIXEL_SHADER_RESOURCE => {
                vk::AccessFlags::SHADER_READ
            }
            ResourceStates::INDIRECT_ARGUMENT => vk::AccessFlags::INDIRECT_COMMAND_READ,
            ResourceStates::COPY_DEST | ResourceStates::RESOLVE_DEST => {
                vk::AccessFlags::TRANSFER_WRITE
            }
            ResourceStates::COPY_SOURCE | ResourceStates::RESOLVE_SOURCE => {
                vk::AccessFlags::TRANSFER_READ
            }
            _ => vk::AccessFlags::empty(),
        };
    }
    access & supported_access(queue_type)
}

/// Pipeline stages that touch a resource in `state`.
///
/// Never empty: states with no specific stage (`COMMON`, `PRESENT`) wait on
/// or block all commands.
pub fn state_stages(state: ResourceStates, queue_type: QueueType) -> vk::PipelineStageFlags {
    let mut stages = vk::PipelineStageFlags::empty();
    for bit in state.iter() {
        stages |= match bit {
            ResourceStates::VERTEX_AND_CONSTANT_BUFFER => {
                vk::PipelineStageFlags::VERTEX_INPUT
                    | vk::PipelineStageFlags::VERTEX_SHADER
                    | vk::PipelineStageFlags::FRAGMENT_SHADER
                    | vk::PipelineStageFlags::COMPUTE_SHADER
            }
            ResourceStates::INDEX_BUFFER => vk::PipelineStageFlags::VERTEX_INPUT,
            ResourceStates::RENDER_TARGET => vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            ResourceStates::UNORDERED_ACCESS => {
                vk::PipelineStageFlags::VERTEX_SHADER
                    | vk::PipelineStageFlags::FRAGMENT_SHADER
                    | vk::PipelineStageFlags::COMPUTE_SHADER
            }
            ResourceStates::DEPTH_WRITE | ResourceStates::DEPTH_READ => {
                vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS
                    | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS
            }
            ResourceStates::NON_PIXEL_SHADER_RESOURCE => {
                vk::PipelineStageFlags::VERTEX_SHADER | vk::PipelineStageFlags::COMPUTE_SHADER
            }
            ResourceStates::PIXEL_SHADER_RESOURCE => vk::PipelineStageFlags::FRAGMENT_SHADER,
            ResourceStates::STREAM_OUT => vk::PipelineStageFlags::VERTEX_SHADER,
            ResourceStates::INDIRECT_ARGUMENT => vk::PipelineStageFlags::DRAW_INDIRECT,
            ResourceStates::COPY_DEST
            | ResourceStates::COPY_SOURCE
            | ResourceStates::RESOLVE_DEST
            | ResourceStates::RESOLVE_SOURCE => vk::PipelineStageFlags::TRANSFER,
            _ => vk::PipelineStageFlags::empty(),
        };
    }
    let stages = stages & supported_stages(queue_type);
    if stages.is_empty() {
        vk::PipelineStageFlags::ALL_COMMANDS
    } else {
        stages
    }
}

fn supported_stages(queue_type: QueueType) -> vk::PipelineStageFlags {
    match queue_type {
        QueueType::Graphics | QueueType::Bundle => vk::PipelineStageFlags::from_raw(!0),
        QueueType::Compute => {
            vk::PipelineStageFlags::COMPUTE_SHADER
                | vk::PipelineStageFlags::DRAW_INDIRECT
                | vk::PipelineStageFlags::TRANSFER
        }
        QueueType::Copy => vk::PipelineStageFlags::TRANSFER,
    }
}

fn supported_access(queue_type: QueueType) -> vk::AccessFlags {
    match queue_type {
        QueueType::Graphics | QueueType::Bundle => vk::AccessFlags::from_raw(!0),
        QueueType::Compute => {
            vk::AccessFlags::SHADER_READ
                | vk::AccessFlags::SHADER_WRITE
                | vk::AccessFlags::UNIFORM_READ
                | vk::AccessFlags::INDIRECT_COMMAND_READ
                | vk::AccessFlags::TRANSFER_READ
                | vk::AccessFlags::TRANSFER_WRITE
        }
        QueueType::Copy => vk::AccessFlags::TRANSFER_READ | vk::AccessFlags::TRANSFER_WRITE,
    }
}

/// Map a failed Vulkan call to a recording error.
pub fn vk_error(what: &str, result: vk::Result) -> RecordingError {
    match result {
        vk::Result::ERROR_DEVICE_LOST => RecordingError::DeviceLost,
        other => RecordingError::Backend(format!("{what}: {other:?}")),
    }
}

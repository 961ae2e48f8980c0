//! Headless Vulkan instance, physical device and logical device setup.

use std::ffi::CStr;

use ash::vk;

use crate::error::{RecordingError, Result};
use crate::types::QueueType;

/// Timeline semaphores are core in Vulkan 1.2.
const REQUIRED_API_VERSION: u32 = vk::make_api_version(0, 1, 2, 0);

/// Validation layer name.
const VALIDATION_LAYER_NAME: &CStr = c"VK_LAYER_KHRONOS_validation";

fn init_error(what: &str, result: vk::Result) -> RecordingError {
    RecordingError::Backend(format!("{what}: {result:?}"))
}

/// Create an instance without surface extensions.
pub fn create_instance(entry: &ash::Entry, validation: bool) -> Result<ash::Instance> {
    let validation_available = validation && check_validation_layer_support(entry);
    if validation && !validation_available {
        log::warn!("Validation layers requested but not available");
    }

    let app_info = vk::ApplicationInfo::default()
        .application_name(c"RedLilium")
        .application_version(vk::make_api_version(0, 0, 1, 0))
        .engine_name(c"RedLilium Engine")
        .engine_version(vk::make_api_version(0, 0, 1, 0))
        .api_version(REQUIRED_API_VERSION);

    let layer_names: Vec<*const std::ffi::c_char> = if validation_available {
        vec![VALIDATION_LAYER_NAME.as_ptr()]
    } else {
        vec![]
    };

    #[allow(unused_mut)]
    let mut extensions: Vec<*const std::ffi::c_char> = Vec::new();
    #[allow(unused_mut)]
    let mut create_flags = vk::InstanceCreateFlags::empty();

    #[cfg(target_os = "macos")]
    {
        extensions.push(ash::khr::portability_enumeration::NAME.as_ptr());
        create_flags |= vk::InstanceCreateFlags::ENUMERATE_PORTABILITY_KHR;
    }

    let create_info = vk::InstanceCreateInfo::default()
        .flags(create_flags)
        .application_info(&app_info)
        .enabled_extension_names(&extensions)
        .enabled_layer_names(&layer_names);

    unsafe { entry.create_instance(&create_info, None) }
        .map_err(|e| init_error("Failed to create Vulkan instance", e))
}

fn check_validation_layer_support(entry: &ash::Entry) -> bool {
    let Ok(available_layers) = (unsafe { entry.enumerate_instance_layer_properties() }) else {
        return false;
    };
    available_layers.iter().any(|layer| {
        let name = unsafe { CStr::from_ptr(layer.layer_name.as_ptr()) };
        name == VALIDATION_LAYER_NAME
    })
}

/// Select the best physical device supporting Vulkan 1.2.
///
/// Prefers discrete GPUs over integrated GPUs.
pub fn select_physical_device(instance: &ash::Instance) -> Result<(vk::PhysicalDevice, String)> {
    let devices = unsafe { instance.enumerate_physical_devices() }
        .map_err(|e| init_error("Failed to enumerate physical devices", e))?;

    let mut best = None;
    let mut best_score = 0;
    for device in devices {
        let properties = unsafe { instance.get_physical_device_properties(device) };
        if properties.api_version < REQUIRED_API_VERSION {
            continue;
        }

        let mut score = 1;
        if properties.device_type == vk::PhysicalDeviceType::DISCRETE_GPU {
            score += 1000;
        } else if properties.device_type == vk::PhysicalDeviceType::INTEGRATED_GPU {
            score += 100;
        }

        let name = unsafe { CStr::from_ptr(properties.device_name.as_ptr()) }
            .to_string_lossy()
            .into_owned();
        log::info!(
            "Found GPU: {} (type: {:?}, score: {})",
            name,
            properties.device_type,
            score
        );
        if score > best_score {
            best_score = score;
            best = Some((device, name));
        }
    }

    best.ok_or_else(|| RecordingError::Backend("No Vulkan 1.2 capable GPU found".to_string()))
}

/// Queue family used for each queue type, if any.
///
/// Compute and copy queues are only exposed when the device has a dedicated
/// family for them; otherwise that work goes through the graphics queue.
pub fn find_queue_families(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
) -> Result<[Option<u32>; QueueType::COUNT]> {
    let families = unsafe { instance.get_physical_device_queue_family_properties(physical_device) };

    let find = |required: vk::QueueFlags, excluded: vk::QueueFlags| {
        families
            .iter()
            .position(|family| {
                family.queue_count > 0
                    && family.queue_flags.contains(required)
                    && !family.queue_flags.intersects(excluded)
            })
            .map(|index| index as u32)
    };

    let graphics = find(vk::QueueFlags::GRAPHICS, vk::QueueFlags::empty()).ok_or_else(|| {
        RecordingError::Backend("No graphics queue family found".to_string())
    })?;
    let compute = find(vk::QueueFlags::COMPUTE, vk::QueueFlags::GRAPHICS);
    let copy = find(
        vk::QueueFlags::TRANSFER,
        vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE,
    );

    let mut result = [None; QueueType::COUNT];
    result[QueueType::Graphics.index()] = Some(graphics);
    result[QueueType::Compute.index()] = compute;
    result[QueueType::Copy.index()] = copy;
    Ok(result)
}

/// Create a logical device with one queue per used family and timeline
/// semaphores enabled.
pub fn create_logical_device(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    families: &[Option<u32>; QueueType::COUNT],
) -> Result<ash::Device> {
    let mut unique: Vec<u32> = families.iter().flatten().copied().collect();
    unique.sort_unstable();
    unique.dedup();

    let queue_priorities = [1.0f32];
    let queue_create_infos: Vec<vk::DeviceQueueCreateInfo> = unique
        .iter()
        .map(|&family| {
            vk::DeviceQueueCreateInfo::default()
                .queue_family_index(family)
                .queue_priorities(&queue_priorities)
        })
        .collect();

    let mut vulkan_12_features =
        vk::PhysicalDeviceVulkan12Features::default().timeline_semaphore(true);

    let create_info = vk::DeviceCreateInfo::default()
        .queue_create_infos(&queue_create_infos)
        .push_next(&mut vulkan_12_features);

    unsafe { instance.create_device(physical_device, &create_info, None) }
        .map_err(|e| init_error("Failed to create logical device", e))
}

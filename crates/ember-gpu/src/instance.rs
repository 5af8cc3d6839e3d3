//! Vulkan instance creation and physical device selection.

use crate::error::{GpuError, Result};
use crate::surface::SurfaceSupport;
use ash::vk;
use raw_window_handle::RawDisplayHandle;
use std::ffi::{c_char, CStr, CString};

/// Instance extensions needed to present to the given display.
///
/// Headless contexts pass `None` and get no surface extensions.
pub fn required_instance_extensions(display: Option<RawDisplayHandle>) -> Result<Vec<*const c_char>> {
    #[cfg_attr(not(target_os = "macos"), allow(unused_mut))]
    let mut extensions = match display {
        Some(display) => ash_window::enumerate_required_extensions(display)?.to_vec(),
        None => Vec::new(),
    };

    #[cfg(target_os = "macos")]
    {
        extensions.push(ash::khr::portability_enumeration::NAME.as_ptr());
        extensions.push(ash::khr::get_physical_device_properties2::NAME.as_ptr());
    }

    Ok(extensions)
}

/// Validation layers to enable in debug builds.
pub fn validation_layers() -> Vec<&'static CStr> {
    vec![c"VK_LAYER_KHRONOS_validation"]
}

/// Required device extensions.
pub fn required_device_extensions() -> Vec<&'static CStr> {
    vec![ash::khr::swapchain::NAME]
}

/// Create a Vulkan instance.
///
/// # Safety
/// The entry must be a valid Vulkan entry point.
pub unsafe fn create_instance(
    entry: &ash::Entry,
    app_name: &str,
    extension_names: &[*const c_char],
    enable_validation: bool,
) -> Result<ash::Instance> {
    let app_name = CString::new(app_name)?;
    let engine_name = CString::new("Ember")?;

    let app_info = vk::ApplicationInfo::default()
        .application_name(&app_name)
        .application_version(vk::make_api_version(0, 1, 0, 0))
        .engine_name(&engine_name)
        .engine_version(vk::make_api_version(0, 1, 0, 0))
        .api_version(vk::API_VERSION_1_1);

    let layers = if enable_validation {
        validation_layers()
    } else {
        vec![]
    };

    // Missing layers are dropped with a warning instead of failing instance creation
    let available_layers = unsafe { entry.enumerate_instance_layer_properties()? };
    let layers: Vec<&CStr> = layers
        .into_iter()
        .filter(|layer| {
            let found = available_layers
                .iter()
                .any(|props| props.layer_name_as_c_str().ok() == Some(*layer));
            if !found {
                tracing::warn!("Validation layer {:?} not available", layer);
            }
            found
        })
        .collect();

    let layer_names: Vec<*const c_char> = layers.iter().map(|l| l.as_ptr()).collect();

    // Required for MoltenVK on macOS
    #[cfg(target_os = "macos")]
    let create_flags = vk::InstanceCreateFlags::ENUMERATE_PORTABILITY_KHR;
    #[cfg(not(target_os = "macos"))]
    let create_flags = vk::InstanceCreateFlags::empty();

    let create_info = vk::InstanceCreateInfo::default()
        .application_info(&app_info)
        .enabled_extension_names(extension_names)
        .enabled_layer_names(&layer_names)
        .flags(create_flags);

    let instance = unsafe { entry.create_instance(&create_info, None)? };

    Ok(instance)
}

/// Queue family indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    /// Family used for graphics and transfer work
    pub graphics: u32,
    /// Family used for presentation (may equal `graphics`)
    pub present: u32,
}

impl QueueFamilyIndices {
    /// Whether graphics and present run on different families.
    pub const fn is_split(&self) -> bool {
        self.graphics != self.present
    }
}

/// Find graphics and present queue families.
///
/// Without a surface the graphics family doubles as the present family.
///
/// # Safety
/// The instance and physical device must be valid.
pub unsafe fn find_queue_families(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    surface: Option<&SurfaceSupport>,
) -> Option<QueueFamilyIndices> {
    let families =
        unsafe { instance.get_physical_device_queue_family_properties(physical_device) };

    let mut graphics = None;
    let mut present = None;

    for (i, family) in (0u32..).zip(families.iter()) {
        if family.queue_count > 0
            && family.queue_flags.contains(vk::QueueFlags::GRAPHICS)
            && graphics.is_none()
        {
            graphics = Some(i);
        }

        let can_present = surface.is_some_and(|surface| {
            family.queue_count > 0 && surface.supports_present(physical_device, i)
        });
        if can_present && present.is_none() {
            present = Some(i);
        }

        if graphics.is_some() && present.is_some() {
            break;
        }
    }

    let graphics = graphics?;
    let present = if surface.is_some() { present? } else { graphics };
    Some(QueueFamilyIndices { graphics, present })
}

/// Check that a device exposes every required extension.
unsafe fn supports_device_extensions(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
) -> bool {
    let Ok(available) =
        (unsafe { instance.enumerate_device_extension_properties(physical_device) })
    else {
        return false;
    };

    required_device_extensions().iter().all(|required| {
        available
            .iter()
            .any(|ext| ext.extension_name_as_c_str().ok() == Some(*required))
    })
}

/// Decide whether a physical device can run the renderer.
///
/// A device qualifies when it has graphics (and, with a surface, present)
/// queues, supports the swapchain extension, offers at least one surface
/// format and present mode, and supports anisotropic sampling.
unsafe fn is_device_suitable(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    surface: Option<&SurfaceSupport>,
) -> Option<QueueFamilyIndices> {
    let indices = unsafe { find_queue_families(instance, physical_device, surface) }?;

    if !unsafe { supports_device_extensions(instance, physical_device) } {
        return None;
    }

    if let Some(surface) = surface {
        let details = surface.capabilities(physical_device).ok()?;
        if details.formats.is_empty() || details.present_modes.is_empty() {
            return None;
        }
    }

    let features = unsafe { instance.get_physical_device_features(physical_device) };
    if features.sampler_anisotropy != vk::TRUE {
        return None;
    }

    Some(indices)
}

/// Select the best suitable physical device.
///
/// # Safety
/// The instance must be valid.
pub unsafe fn select_physical_device(
    instance: &ash::Instance,
    surface: Option<&SurfaceSupport>,
) -> Result<(vk::PhysicalDevice, QueueFamilyIndices)> {
    let devices = unsafe { instance.enumerate_physical_devices()? };

    if devices.is_empty() {
        return Err(GpuError::NoSuitableDevice);
    }

    let mut best = None;
    let mut best_score = -1i64;

    for device in devices {
        let Some(indices) = (unsafe { is_device_suitable(instance, device, surface) }) else {
            continue;
        };
        let score = unsafe { score_physical_device(instance, device) };
        if score > best_score {
            best_score = score;
            best = Some((device, indices));
        }
    }

    best.ok_or(GpuError::NoSuitableDevice)
}

/// Score a physical device for selection.
unsafe fn score_physical_device(instance: &ash::Instance, device: vk::PhysicalDevice) -> i64 {
    let properties = unsafe { instance.get_physical_device_properties(device) };

    let mut score = 0;

    // Prefer discrete GPUs
    match properties.device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => score += 1000,
        vk::PhysicalDeviceType::INTEGRATED_GPU => score += 100,
        vk::PhysicalDeviceType::VIRTUAL_GPU => score += 50,
        _ => {}
    }

    // Prefer more VRAM
    let memory = unsafe { instance.get_physical_device_memory_properties(device) };
    let vram_gb: u64 = memory
        .memory_heaps
        .iter()
        .take(memory.memory_heap_count as usize)
        .filter(|h| h.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
        .map(|h| h.size / (1024 * 1024 * 1024))
        .sum();
    score += i64::try_from(vram_gb).unwrap_or(0);

    score
}

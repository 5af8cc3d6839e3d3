//! GPU capability detection.

use ash::vk;
use std::ffi::CStr;

/// GPU vendor identification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GpuVendor {
    Nvidia,
    Amd,
    Intel,
    Apple,
    Other(u32),
}

impl GpuVendor {
    /// Identify vendor from PCI vendor ID.
    pub const fn from_vendor_id(id: u32) -> Self {
        match id {
            0x10DE => Self::Nvidia,
            0x1002 => Self::Amd,
            0x8086 => Self::Intel,
            0x106B => Self::Apple,
            other => Self::Other(other),
        }
    }
}

/// Detected GPU capabilities.
#[derive(Debug, Clone)]
pub struct GpuCapabilities {
    /// GPU vendor
    pub vendor: GpuVendor,
    /// Device name
    pub device_name: String,
    /// Physical device type
    pub device_type: vk::PhysicalDeviceType,
    /// Vulkan API version
    pub api_version: u32,
    /// Device-local memory in MB
    pub device_local_memory_mb: u64,

    /// Highest sample count usable for both color and depth attachments
    pub max_usable_samples: vk::SampleCountFlags,
    /// Minimum alignment of dynamic uniform buffer offsets
    pub min_uniform_buffer_offset_alignment: u64,
    /// Granularity of flushes on non-coherent memory
    pub non_coherent_atom_size: u64,
    /// Maximum sampler anisotropy
    pub max_sampler_anisotropy: f32,
    /// Whether anisotropic filtering is available
    pub supports_sampler_anisotropy: bool,
}

impl GpuCapabilities {
    /// Query capabilities from a physical device.
    ///
    /// # Safety
    /// The instance and physical device must be valid.
    pub unsafe fn query(instance: &ash::Instance, physical_device: vk::PhysicalDevice) -> Self {
        let properties = unsafe { instance.get_physical_device_properties(physical_device) };
        let features = unsafe { instance.get_physical_device_features(physical_device) };
        let memory_properties =
            unsafe { instance.get_physical_device_memory_properties(physical_device) };

        let device_name = unsafe { CStr::from_ptr(properties.device_name.as_ptr()) }
            .to_string_lossy()
            .into_owned();

        let device_local_memory_mb: u64 = memory_properties
            .memory_heaps
            .iter()
            .take(memory_properties.memory_heap_count as usize)
            .filter(|heap| heap.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
            .map(|heap| heap.size / (1024 * 1024))
            .sum();

        let limits = &properties.limits;

        Self {
            vendor: GpuVendor::from_vendor_id(properties.vendor_id),
            device_name,
            device_type: properties.device_type,
            api_version: properties.api_version,
            device_local_memory_mb,
            max_usable_samples: max_usable_sample_count(
                limits.framebuffer_color_sample_counts,
                limits.framebuffer_depth_sample_counts,
            ),
            min_uniform_buffer_offset_alignment: limits.min_uniform_buffer_offset_alignment,
            non_coherent_atom_size: limits.non_coherent_atom_size,
            max_sampler_anisotropy: limits.max_sampler_anisotropy,
            supports_sampler_anisotropy: features.sampler_anisotropy == vk::TRUE,
        }
    }

    /// Get a human-readable summary of capabilities.
    pub fn summary(&self) -> String {
        format!(
            "{} ({:?}) - Vulkan {}.{}.{} - {} MB VRAM - {:?} MSAA",
            self.device_name,
            self.vendor,
            vk::api_version_major(self.api_version),
            vk::api_version_minor(self.api_version),
            vk::api_version_patch(self.api_version),
            self.device_local_memory_mb,
            self.max_usable_samples,
        )
    }
}

/// Highest sample count supported by both the color and the depth
/// framebuffer limits, falling back to a single sample.
pub fn max_usable_sample_count(
    color: vk::SampleCountFlags,
    depth: vk::SampleCountFlags,
) -> vk::SampleCountFlags {
    let counts = color & depth;
    [
        vk::SampleCountFlags::TYPE_64,
        vk::SampleCountFlags::TYPE_32,
        vk::SampleCountFlags::TYPE_16,
        vk::SampleCountFlags::TYPE_8,
        vk::SampleCountFlags::TYPE_4,
        vk::SampleCountFlags::TYPE_2,
    ]
    .into_iter()
    .find(|&samples| counts.contains(samples))
    .unwrap_or(vk::SampleCountFlags::TYPE_1)
}

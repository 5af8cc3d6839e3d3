//! Format selection.

use crate::error::{GpuError, Result};
use ash::vk;

/// Depth formats in order of preference.
pub const DEPTH_FORMAT_CANDIDATES: [vk::Format; 3] = [
    vk::Format::D32_SFLOAT,
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D24_UNORM_S8_UINT,
];

/// Pick the first candidate whose tiling features include `features`.
///
/// `properties` looks up the format properties of one format, normally
/// through `vkGetPhysicalDeviceFormatProperties`.
pub fn select_supported_format(
    candidates: &[vk::Format],
    tiling: vk::ImageTiling,
    features: vk::FormatFeatureFlags,
    properties: impl Fn(vk::Format) -> vk::FormatProperties,
) -> Result<vk::Format> {
    candidates
        .iter()
        .copied()
        .find(|&format| {
            let props = properties(format);
            match tiling {
                vk::ImageTiling::LINEAR => props.linear_tiling_features.contains(features),
                vk::ImageTiling::OPTIMAL => props.optimal_tiling_features.contains(features),
                _ => false,
            }
        })
        .ok_or_else(|| GpuError::FormatNotSupported {
            candidates: candidates.to_vec(),
            features,
        })
}

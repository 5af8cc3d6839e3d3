//! GPU error types.

use ash::vk;
use thiserror::Error;

/// GPU-related errors.
#[derive(Error, Debug)]
pub enum GpuError {
    /// Vulkan error.
    #[error("Vulkan error: {0}")]
    Vulkan(#[from] vk::Result),

    /// Vulkan loader could not be found.
    #[error("Failed to load Vulkan: {0}")]
    Loading(String),

    /// No suitable GPU found.
    #[error("No suitable GPU found")]
    NoSuitableDevice,

    /// A name contained an interior NUL byte.
    #[error("Invalid name: {0}")]
    InvalidName(#[from] std::ffi::NulError),

    /// No memory type satisfies the requested filter and properties.
    #[error("No memory type matches filter {type_filter:#b} with properties {properties:?}")]
    MemoryTypeNotFound {
        /// Bitmask of acceptable memory type indices
        type_filter: u32,
        /// Properties the memory type must have
        properties: vk::MemoryPropertyFlags,
    },

    /// None of the candidate formats supports the requested features.
    #[error("No supported format among {candidates:?} for {features:?}")]
    FormatNotSupported {
        /// Formats that were tried, in order
        candidates: Vec<vk::Format>,
        /// Required format features
        features: vk::FormatFeatureFlags,
    },

    /// Layout transition is not in the supported table.
    #[error("Unsupported layout transition: {old:?} -> {new:?}")]
    UnsupportedLayoutTransition {
        /// Current layout
        old: vk::ImageLayout,
        /// Requested layout
        new: vk::ImageLayout,
    },

    /// Swapchain image or depth format changed across recreation.
    #[error("Swapchain format changed on recreation: {old:?} -> {new:?}")]
    SwapchainFormatMismatch {
        /// (color, depth) formats before recreation
        old: (vk::Format, vk::Format),
        /// (color, depth) formats after recreation
        new: (vk::Format, vk::Format),
    },

    /// Memory allocation failed.
    #[error("Memory allocation failed: {0}")]
    AllocationFailed(String),

    /// Surface creation failed.
    #[error("Surface creation failed: {0}")]
    SurfaceCreation(String),

    /// Swapchain creation failed.
    #[error("Swapchain creation failed: {0}")]
    SwapchainCreation(String),

    /// Shader file could not be read or is not SPIR-V.
    #[error("Failed to load shader {path}: {reason}")]
    ShaderLoad {
        /// Path of the shader binary
        path: String,
        /// What went wrong
        reason: String,
    },

    /// Shader module creation failed.
    #[error("Shader compilation failed: {0}")]
    ShaderCompilation(String),

    /// Pipeline creation failed.
    #[error("Pipeline creation failed: {0}")]
    PipelineCreation(String),

    /// Invalid state.
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, GpuError>;

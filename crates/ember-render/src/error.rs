//! Error types for the render crate.

use ash::vk;
use ember_gpu::GpuError;
use thiserror::Error;

/// Render error type.
#[derive(Error, Debug)]
pub enum RenderError {
    /// Device-level failure.
    #[error(transparent)]
    Gpu(#[from] GpuError),

    /// Image decoding failed.
    #[error("Image decoding failed: {0}")]
    Image(#[from] image::ImageError),

    /// Pixel data does not match the stated dimensions.
    #[error("Texture data is {actual} bytes, expected {expected} for {width}x{height} RGBA8")]
    TextureSize {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, RenderError>;

impl From<vk::Result> for RenderError {
    fn from(result: vk::Result) -> Self {
        Self::Gpu(GpuError::Vulkan(result))
    }
}

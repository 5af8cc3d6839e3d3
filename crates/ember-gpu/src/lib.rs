//! Vulkan abstraction layer for the Ember renderer.
//!
//! This crate provides:
//! - Vulkan instance, surface and device management
//! - GPU capability detection
//! - Memory allocation via gpu-allocator
//! - Command buffers, one-shot transfers and layout transitions
//! - Swapchain handling with per-slot synchronization
//! - Descriptor layouts, pools and writers
//! - Graphics pipelines and SPIR-V loading

pub mod capabilities;
pub mod command;
pub mod context;
pub mod descriptors;
pub mod error;
pub mod format;
pub mod instance;
pub mod memory;
pub mod pipeline;
pub mod shader;
pub mod surface;
pub mod swapchain;
pub mod sync;
pub mod transition;

pub use capabilities::{GpuCapabilities, GpuVendor};
pub use context::{GpuContext, GpuContextBuilder};
pub use descriptors::{DescriptorPool, DescriptorSetLayout, DescriptorWriter};
pub use error::{GpuError, Result};
pub use memory::{GpuAllocator, GpuBuffer, GpuImage};
pub use pipeline::{GraphicsPipeline, PipelineConfig, PipelineLayout};
pub use shader::ShaderStage;
pub use surface::{SurfaceCapabilities, SurfaceSupport};
pub use swapchain::{AcquireOutcome, PresentOutcome, SwapchainFormats, SwapchainManager};
pub use sync::{FrameSync, ImagesInFlight};

pub use ash::vk;

//! GPU context management.
//!
//! [`GpuContext`] is the device context every other GPU object borrows
//! from. It owns the instance, the optional presentation surface, the
//! logical device with its graphics and present queues, the shared
//! command pool and the memory allocator. Resources keep an
//! `Arc<GpuContext>` so the device always outlives them.

use crate::capabilities::GpuCapabilities;
use crate::command::{begin_command_buffer, end_command_buffer, submit_command_buffers, CommandPool};
use crate::error::{GpuError, Result};
use crate::format::{select_supported_format, DEPTH_FORMAT_CANDIDATES};
use crate::instance::{
    create_instance, required_device_extensions, required_instance_extensions,
    select_physical_device, QueueFamilyIndices,
};
use crate::memory::{find_memory_type, GpuAllocator, GpuBuffer, GpuImage};
use crate::surface::SurfaceSupport;
use crate::transition::image_barrier;
use ash::vk;
use parking_lot::Mutex;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle, RawDisplayHandle};
use std::ffi::c_char;
use std::sync::Arc;

/// Main GPU context holding Vulkan resources.
pub struct GpuContext {
    // Entry must be kept alive for the lifetime of the context
    #[allow(dead_code)]
    entry: ash::Entry,
    instance: ash::Instance,
    surface: Option<SurfaceSupport>,
    physical_device: vk::PhysicalDevice,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
    capabilities: GpuCapabilities,
    device: ash::Device,
    allocator: Mutex<GpuAllocator>,
    command_pool: CommandPool,

    queue_families: QueueFamilyIndices,
    graphics_queue: vk::Queue,
    present_queue: vk::Queue,
}

impl GpuContext {
    /// Get the Vulkan device handle.
    pub const fn device(&self) -> &ash::Device {
        &self.device
    }

    /// Get the Vulkan instance handle.
    pub const fn instance(&self) -> &ash::Instance {
        &self.instance
    }

    /// Get the physical device handle.
    pub const fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    /// Get GPU capabilities.
    pub const fn capabilities(&self) -> &GpuCapabilities {
        &self.capabilities
    }

    /// Get the presentation surface, if the context was built for a window.
    pub const fn surface(&self) -> Option<&SurfaceSupport> {
        self.surface.as_ref()
    }

    /// Get the queue family indices.
    pub const fn queue_families(&self) -> QueueFamilyIndices {
        self.queue_families
    }

    /// Get the graphics queue.
    pub const fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    /// Get the present queue.
    pub const fn present_queue(&self) -> vk::Queue {
        self.present_queue
    }

    /// Get the shared command pool.
    pub const fn command_pool(&self) -> &CommandPool {
        &self.command_pool
    }

    /// Get access to the GPU allocator.
    pub const fn allocator(&self) -> &Mutex<GpuAllocator> {
        &self.allocator
    }

    /// Highest MSAA sample count usable for color and depth attachments.
    pub const fn msaa_samples(&self) -> vk::SampleCountFlags {
        self.capabilities.max_usable_samples
    }

    /// Wait for device to be idle.
    #[cfg_attr(feature = "trace-spans", tracing::instrument(level = "trace", skip_all))]
    pub fn wait_idle(&self) -> Result<()> {
        unsafe {
            self.device.device_wait_idle()?;
        }
        Ok(())
    }

    /// Index of the first memory type allowed by `type_filter` that has
    /// every flag in `properties`.
    pub fn find_memory_type(
        &self,
        type_filter: u32,
        properties: vk::MemoryPropertyFlags,
    ) -> Result<u32> {
        find_memory_type(&self.memory_properties, type_filter, properties)
    }

    /// First format in `candidates` supporting `features` with `tiling`.
    pub fn find_supported_format(
        &self,
        candidates: &[vk::Format],
        tiling: vk::ImageTiling,
        features: vk::FormatFeatureFlags,
    ) -> Result<vk::Format> {
        select_supported_format(candidates, tiling, features, |format| unsafe {
            self.instance
                .get_physical_device_format_properties(self.physical_device, format)
        })
    }

    /// Preferred depth attachment format of this device.
    pub fn find_depth_format(&self) -> Result<vk::Format> {
        self.find_supported_format(
            &DEPTH_FORMAT_CANDIDATES,
            vk::ImageTiling::OPTIMAL,
            vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
        )
    }

    /// Create a buffer bound to memory with the requested properties.
    pub fn create_buffer(
        self: &Arc<Self>,
        name: &str,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        properties: vk::MemoryPropertyFlags,
    ) -> Result<GpuBuffer> {
        GpuBuffer::new(self, name, size, usage, properties)
    }

    /// Create an image bound to memory with the requested properties.
    pub fn create_image(
        self: &Arc<Self>,
        name: &str,
        create_info: &vk::ImageCreateInfo,
        properties: vk::MemoryPropertyFlags,
    ) -> Result<GpuImage> {
        GpuImage::new(self, name, create_info, properties)
    }

    /// Allocate a primary command buffer and begin recording it for
    /// one-time submission.
    pub fn begin_single_time_commands(&self) -> Result<vk::CommandBuffer> {
        unsafe {
            let cmd = self
                .command_pool
                .allocate_command_buffer(&self.device, vk::CommandBufferLevel::PRIMARY)?;
            begin_command_buffer(&self.device, cmd, vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)?;
            Ok(cmd)
        }
    }

    /// End, submit and wait for a buffer from
    /// [`begin_single_time_commands`](Self::begin_single_time_commands),
    /// then free it.
    pub fn end_single_time_commands(&self, cmd: vk::CommandBuffer) -> Result<()> {
        unsafe {
            end_command_buffer(&self.device, cmd)?;

            let cmd_buffers = [cmd];
            let submitted = submit_command_buffers(
                &self.device,
                self.graphics_queue,
                &cmd_buffers,
                &[],
                &[],
                &[],
                vk::Fence::null(),
            )
            .and_then(|()| {
                self.device
                    .queue_wait_idle(self.graphics_queue)
                    .map_err(GpuError::from)
            });

            self.command_pool
                .free_command_buffers(&self.device, &cmd_buffers);
            submitted?;
        }
        Ok(())
    }

    /// Record `f` into a one-time command buffer and wait for it to finish.
    pub fn execute_single_time_commands<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&ash::Device, vk::CommandBuffer),
    {
        let cmd = self.begin_single_time_commands()?;
        f(&self.device, cmd);
        self.end_single_time_commands(cmd)
    }

    /// Copy `size` bytes from the start of `src` to the start of `dst`.
    pub fn copy_buffer(&self, src: vk::Buffer, dst: vk::Buffer, size: vk::DeviceSize) -> Result<()> {
        self.execute_single_time_commands(|device, cmd| {
            let region = vk::BufferCopy::default().size(size);
            unsafe { device.cmd_copy_buffer(cmd, src, dst, &[region]) };
        })
    }

    /// Copy tightly packed pixels from `buffer` into the color aspect of
    /// `image`, which must be in `TRANSFER_DST_OPTIMAL` layout.
    pub fn copy_buffer_to_image(
        &self,
        buffer: vk::Buffer,
        image: vk::Image,
        width: u32,
        height: u32,
        layer_count: u32,
    ) -> Result<()> {
        self.execute_single_time_commands(|device, cmd| {
            let region = vk::BufferImageCopy::default()
                .buffer_offset(0)
                .buffer_row_length(0)
                .buffer_image_height(0)
                .image_subresource(
                    vk::ImageSubresourceLayers::default()
                        .aspect_mask(vk::ImageAspectFlags::COLOR)
                        .mip_level(0)
                        .base_array_layer(0)
                        .layer_count(layer_count),
                )
                .image_offset(vk::Offset3D::default())
                .image_extent(vk::Extent3D {
                    width,
                    height,
                    depth: 1,
                });
            unsafe {
                device.cmd_copy_buffer_to_image(
                    cmd,
                    buffer,
                    image,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    &[region],
                );
            }
        })
    }

    /// Move the first `mip_levels` levels and `layer_count` layers of
    /// `image` from `old` to `new` layout with a pipeline barrier.
    ///
    /// Unsupported transitions fail before anything is recorded.
    pub fn transition_image_layout(
        &self,
        image: vk::Image,
        format: vk::Format,
        old: vk::ImageLayout,
        new: vk::ImageLayout,
        mip_levels: u32,
        layer_count: u32,
    ) -> Result<()> {
        let (barrier, transition) = image_barrier(image, format, old, new, mip_levels, layer_count)?;

        self.execute_single_time_commands(|device, cmd| unsafe {
            device.cmd_pipeline_barrier(
                cmd,
                transition.src_stage,
                transition.dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[barrier],
            );
        })
    }
}

impl Drop for GpuContext {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();

            self.command_pool.destroy(&self.device);

            // Shutdown allocator BEFORE destroying device
            // This frees all VkDeviceMemory allocations
            self.allocator.lock().shutdown();

            self.device.destroy_device(None);
            if let Some(surface) = &self.surface {
                surface.destroy();
            }
            self.instance.destroy_instance(None);
        }
    }
}

/// Builder for creating a GPU context.
pub struct GpuContextBuilder {
    app_name: String,
    enable_validation: bool,
}

impl Default for GpuContextBuilder {
    fn default() -> Self {
        Self {
            app_name: "Ember".to_string(),
            enable_validation: cfg!(debug_assertions),
        }
    }
}

impl GpuContextBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the application name.
    #[must_use]
    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = name.into();
        self
    }

    /// Enable or disable validation layers.
    #[must_use]
    pub const fn validation(mut self, enable: bool) -> Self {
        self.enable_validation = enable;
        self
    }

    /// Build a context that can present to `window`.
    pub fn build<W>(self, window: &W) -> Result<Arc<GpuContext>>
    where
        W: HasDisplayHandle + HasWindowHandle,
    {
        let display = window
            .display_handle()
            .map_err(|e| GpuError::SurfaceCreation(format!("Failed to get display handle: {e}")))?
            .as_raw();

        self.build_with(Some(display), |entry, instance| {
            unsafe { SurfaceSupport::new(entry, instance, window) }.map(Some)
        })
    }

    /// Build a context without a surface, for offscreen work and tests.
    pub fn build_headless(self) -> Result<Arc<GpuContext>> {
        self.build_with(None, |_, _| Ok(None))
    }

    fn build_with<F>(self, display: Option<RawDisplayHandle>, make_surface: F) -> Result<Arc<GpuContext>>
    where
        F: FnOnce(&ash::Entry, &ash::Instance) -> Result<Option<SurfaceSupport>>,
    {
        // 1. Load Vulkan entry point
        let entry = unsafe { ash::Entry::load() }.map_err(|e| GpuError::Loading(e.to_string()))?;

        // 2. Create Vulkan instance
        let extensions = required_instance_extensions(display)?;
        let instance =
            unsafe { create_instance(&entry, &self.app_name, &extensions, self.enable_validation) }?;

        // 3. Create the surface
        let surface = make_surface(&entry, &instance)?;

        // 4. Select physical device
        let (physical_device, queue_families) =
            unsafe { select_physical_device(&instance, surface.as_ref()) }?;

        let capabilities = unsafe { GpuCapabilities::query(&instance, physical_device) };
        let memory_properties =
            unsafe { instance.get_physical_device_memory_properties(physical_device) };

        tracing::info!("Selected GPU: {}", capabilities.summary());

        // 5. Create logical device
        let (device, graphics_queue, present_queue) =
            unsafe { create_device(&instance, physical_device, queue_families)? };

        // 6. Command pool for per-frame and one-time command buffers
        let command_pool = unsafe {
            CommandPool::new(
                &device,
                queue_families.graphics,
                vk::CommandPoolCreateFlags::TRANSIENT
                    | vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
            )
        }?;

        // 7. Create GPU allocator
        let allocator = unsafe { GpuAllocator::new(&instance, &device, physical_device) }?;

        Ok(Arc::new(GpuContext {
            entry,
            instance,
            surface,
            physical_device,
            memory_properties,
            capabilities,
            device,
            allocator: Mutex::new(allocator),
            command_pool,
            queue_families,
            graphics_queue,
            present_queue,
        }))
    }
}

/// Create the logical device and retrieve queues.
///
/// # Safety
/// The instance and physical device must be valid.
unsafe fn create_device(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    queue_families: QueueFamilyIndices,
) -> Result<(ash::Device, vk::Queue, vk::Queue)> {
    let mut unique_families = vec![queue_families.graphics];
    if queue_families.is_split() {
        unique_families.push(queue_families.present);
    }

    let queue_priority = 1.0_f32;
    let queue_create_infos: Vec<vk::DeviceQueueCreateInfo> = unique_families
        .iter()
        .map(|&family| {
            vk::DeviceQueueCreateInfo::default()
                .queue_family_index(family)
                .queue_priorities(std::slice::from_ref(&queue_priority))
        })
        .collect();

    let extension_names: Vec<*const c_char> = required_device_extensions()
        .iter()
        .map(|ext| ext.as_ptr())
        .collect();

    let features = vk::PhysicalDeviceFeatures::default().sampler_anisotropy(true);

    let device_create_info = vk::DeviceCreateInfo::default()
        .queue_create_infos(&queue_create_infos)
        .enabled_extension_names(&extension_names)
        .enabled_features(&features);

    let device = unsafe { instance.create_device(physical_device, &device_create_info, None) }?;

    let graphics_queue = unsafe { device.get_device_queue(queue_families.graphics, 0) };
    let present_queue = unsafe { device.get_device_queue(queue_families.present, 0) };

    Ok((device, graphics_queue, present_queue))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[ignore = "Requires GPU hardware"]
    fn headless_context_has_queues() {
        let ctx = GpuContextBuilder::new()
            .validation(false)
            .build_headless()
            .unwrap();
        assert!(ctx.surface().is_none());
        assert_eq!(ctx.graphics_queue(), ctx.present_queue());
        assert!(ctx.capabilities().supports_sampler_anisotropy);
    }

    #[test]
    #[ignore = "Requires GPU hardware"]
    fn depth_format_is_a_candidate() {
        let ctx = GpuContextBuilder::new()
            .validation(false)
            .build_headless()
            .unwrap();
        let format = ctx.find_depth_format().unwrap();
        assert!(DEPTH_FORMAT_CANDIDATES.contains(&format));
    }

    #[test]
    #[ignore = "Requires GPU hardware"]
    fn unsupported_transition_records_nothing() {
        let ctx = GpuContextBuilder::new()
            .validation(false)
            .build_headless()
            .unwrap();
        let result = ctx.transition_image_layout(
            vk::Image::null(),
            vk::Format::R8G8B8A8_SRGB,
            vk::ImageLayout::PRESENT_SRC_KHR,
            vk::ImageLayout::GENERAL,
            1,
            1,
        );
        assert!(matches!(
            result,
            Err(GpuError::UnsupportedLayoutTransition { .. })
        ));
    }
}

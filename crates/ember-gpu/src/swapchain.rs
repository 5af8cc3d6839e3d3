//! Swapchain management.
//!
//! [`SwapchainManager`] owns the presentable images, the per-image MSAA
//! color and depth attachments, the main render pass, one framebuffer per
//! image and the per-slot synchronization objects. Slots are chosen by the
//! caller; the manager only guarantees that a slot's fence has signaled
//! before the slot is reused and that no image is rendered to while an
//! earlier frame still uses it.

use crate::context::GpuContext;
use crate::error::{GpuError, Result};
use crate::memory::GpuImage;
use crate::sync::{wait_for_fence, FrameSync, ImagesInFlight};
use ash::vk;
use ember_core::constants::MAX_FRAMES_IN_FLIGHT;
use std::sync::Arc;

/// Result of acquiring a swapchain image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// An image is ready to be rendered into.
    Image(u32),
    /// The swapchain is out of date or suboptimal and must be recreated.
    NeedsRecreate,
}

/// Result of presenting a swapchain image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentOutcome {
    /// The image was queued for presentation.
    Presented,
    /// The swapchain is out of date or suboptimal and must be recreated.
    NeedsRecreate,
}

/// Color and depth formats a swapchain was built with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapchainFormats {
    pub color: vk::Format,
    pub depth: vk::Format,
}

impl SwapchainFormats {
    /// Fail if a rebuilt swapchain would use different formats.
    ///
    /// Pipelines and the render pass are built against these formats, so
    /// a change cannot be absorbed by recreation.
    pub fn ensure_matches(&self, new: &Self) -> Result<()> {
        if self == new {
            Ok(())
        } else {
            Err(GpuError::SwapchainFormatMismatch {
                old: (self.color, self.depth),
                new: (new.color, new.depth),
            })
        }
    }
}

/// Resources rebuilt every time the swapchain is recreated.
struct SwapchainResources {
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    color_attachments: Vec<GpuImage>,
    depth_attachments: Vec<GpuImage>,
    framebuffers: Vec<vk::Framebuffer>,
    extent: vk::Extent2D,
}

impl SwapchainResources {
    /// # Safety
    /// None of the resources may still be in use by the GPU.
    unsafe fn destroy(self, device: &ash::Device, loader: &ash::khr::swapchain::Device) {
        unsafe {
            for framebuffer in self.framebuffers {
                device.destroy_framebuffer(framebuffer, None);
            }
            for view in self.image_views {
                device.destroy_image_view(view, None);
            }
        }
        drop(self.color_attachments);
        drop(self.depth_attachments);
        unsafe { loader.destroy_swapchain(self.swapchain, None) };
    }
}

/// Presentable image chain plus everything needed to render into it.
pub struct SwapchainManager {
    ctx: Arc<GpuContext>,
    loader: ash::khr::swapchain::Device,
    resources: Option<SwapchainResources>,
    render_pass: vk::RenderPass,
    formats: SwapchainFormats,
    samples: vk::SampleCountFlags,
    frames: Vec<FrameSync>,
    images_in_flight: ImagesInFlight,
    vsync: bool,
}

impl SwapchainManager {
    /// Create a swapchain for the context's surface with
    /// [`MAX_FRAMES_IN_FLIGHT`] frame slots.
    pub fn new(ctx: &Arc<GpuContext>, extent: vk::Extent2D, vsync: bool) -> Result<Self> {
        let surface = ctx
            .surface()
            .ok_or_else(|| GpuError::SwapchainCreation("context has no surface".to_string()))?;
        let caps = surface.capabilities(ctx.physical_device())?;

        let formats = SwapchainFormats {
            color: caps.recommended_format()?.format,
            depth: ctx.find_depth_format()?,
        };
        let samples = ctx.msaa_samples();
        let loader = ash::khr::swapchain::Device::new(ctx.instance(), ctx.device());
        let render_pass = unsafe { create_main_render_pass(ctx.device(), formats, samples)? };

        let mut frames = Vec::with_capacity(MAX_FRAMES_IN_FLIGHT);
        for _ in 0..MAX_FRAMES_IN_FLIGHT {
            frames.push(unsafe { FrameSync::new(ctx.device())? });
        }

        let mut manager = Self {
            ctx: Arc::clone(ctx),
            loader,
            resources: None,
            render_pass,
            formats,
            samples,
            frames,
            images_in_flight: ImagesInFlight::new(0),
            vsync,
        };

        let resources = manager.create_resources(extent, vk::SwapchainKHR::null())?;
        manager.images_in_flight.reset(resources.images.len());

        tracing::info!(
            "Swapchain created: {}x{} ({} images, {:?}, {:?} MSAA)",
            resources.extent.width,
            resources.extent.height,
            resources.images.len(),
            formats.color,
            samples
        );

        manager.resources = Some(resources);
        Ok(manager)
    }

    /// Rebuild the swapchain for a new extent.
    ///
    /// Waits for the device to go idle, builds the new chain with the old
    /// one as its predecessor and only then releases the old resources.
    /// A change of color or depth format is reported as
    /// [`GpuError::SwapchainFormatMismatch`].
    pub fn recreate(&mut self, extent: vk::Extent2D) -> Result<()> {
        self.ctx.wait_idle()?;

        let surface = self
            .ctx
            .surface()
            .ok_or_else(|| GpuError::SwapchainCreation("context has no surface".to_string()))?;
        let caps = surface.capabilities(self.ctx.physical_device())?;
        let formats = SwapchainFormats {
            color: caps.recommended_format()?.format,
            depth: self.ctx.find_depth_format()?,
        };
        self.formats.ensure_matches(&formats)?;

        let old = self.resources.take();
        let old_handle = old
            .as_ref()
            .map_or(vk::SwapchainKHR::null(), |r| r.swapchain);

        let created = self.create_resources(extent, old_handle);

        if let Some(old) = old {
            unsafe { old.destroy(self.ctx.device(), &self.loader) };
        }
        let resources = created?;

        for frame in &mut self.frames {
            unsafe { frame.renew_image_available(self.ctx.device())? };
        }
        self.images_in_flight.reset(resources.images.len());

        tracing::info!(
            "Swapchain recreated: {}x{} ({} images)",
            resources.extent.width,
            resources.extent.height,
            resources.images.len()
        );

        self.resources = Some(resources);
        Ok(())
    }

    fn create_resources(
        &self,
        desired: vk::Extent2D,
        old_swapchain: vk::SwapchainKHR,
    ) -> Result<SwapchainResources> {
        let ctx = &self.ctx;
        let device = ctx.device();
        let surface = ctx
            .surface()
            .ok_or_else(|| GpuError::SwapchainCreation("context has no surface".to_string()))?;
        let caps = surface.capabilities(ctx.physical_device())?;

        let surface_format = caps.recommended_format()?;
        let present_mode = caps.recommended_present_mode(self.vsync);
        let extent = calculate_extent(&caps.capabilities, desired.width, desired.height);
        let image_count = image_count(&caps.capabilities);

        tracing::debug!("Present mode: {:?}", present_mode);

        let families = ctx.queue_families();
        let family_indices = [families.graphics, families.present];
        let mut create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface.surface)
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .pre_transform(caps.capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(old_swapchain);

        create_info = if families.is_split() {
            create_info
                .image_sharing_mode(vk::SharingMode::CONCURRENT)
                .queue_family_indices(&family_indices)
        } else {
            create_info.image_sharing_mode(vk::SharingMode::EXCLUSIVE)
        };

        let swapchain = unsafe { self.loader.create_swapchain(&create_info, None) }
            .map_err(|e| GpuError::SwapchainCreation(e.to_string()))?;

        let mut resources = SwapchainResources {
            swapchain,
            images: Vec::new(),
            image_views: Vec::new(),
            color_attachments: Vec::new(),
            depth_attachments: Vec::new(),
            framebuffers: Vec::new(),
            extent,
        };

        // Partially built resources are torn down if any later step fails
        if let Err(e) = self.populate(&mut resources) {
            unsafe { resources.destroy(device, &self.loader) };
            return Err(e);
        }

        Ok(resources)
    }

    fn populate(&self, resources: &mut SwapchainResources) -> Result<()> {
        let ctx = &self.ctx;
        let device = ctx.device();

        resources.images = unsafe { self.loader.get_swapchain_images(resources.swapchain)? };

        for (i, &image) in resources.images.iter().enumerate() {
            let view_info = vk::ImageViewCreateInfo::default()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(self.formats.color)
                .components(vk::ComponentMapping::default())
                .subresource_range(
                    vk::ImageSubresourceRange::default()
                        .aspect_mask(vk::ImageAspectFlags::COLOR)
                        .base_mip_level(0)
                        .level_count(1)
                        .base_array_layer(0)
                        .layer_count(1),
                );
            resources
                .image_views
                .push(unsafe { device.create_image_view(&view_info, None)? });

            let mut color = ctx.create_image(
                &format!("msaa color {i}"),
                &attachment_image_info(
                    self.formats.color,
                    resources.extent,
                    self.samples,
                    vk::ImageUsageFlags::TRANSIENT_ATTACHMENT
                        | vk::ImageUsageFlags::COLOR_ATTACHMENT,
                ),
                vk::MemoryPropertyFlags::DEVICE_LOCAL,
            )?;
            color.create_view(vk::ImageAspectFlags::COLOR)?;
            resources.color_attachments.push(color);

            let mut depth = ctx.create_image(
                &format!("depth {i}"),
                &attachment_image_info(
                    self.formats.depth,
                    resources.extent,
                    self.samples,
                    vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
                ),
                vk::MemoryPropertyFlags::DEVICE_LOCAL,
            )?;
            depth.create_view(vk::ImageAspectFlags::DEPTH)?;
            resources.depth_attachments.push(depth);
        }

        for i in 0..resources.images.len() {
            let attachments = [
                resources.color_attachments[i].view(),
                resources.depth_attachments[i].view(),
                resources.image_views[i],
            ];
            let framebuffer_info = vk::FramebufferCreateInfo::default()
                .render_pass(self.render_pass)
                .attachments(&attachments)
                .width(resources.extent.width)
                .height(resources.extent.height)
                .layers(1);
            resources
                .framebuffers
                .push(unsafe { device.create_framebuffer(&framebuffer_info, None)? });
        }

        Ok(())
    }

    fn resources(&self) -> Result<&SwapchainResources> {
        self.resources
            .as_ref()
            .ok_or_else(|| GpuError::InvalidState("swapchain lost during recreation".to_string()))
    }

    /// Wait for `slot`'s previous frame to finish, then acquire an image.
    ///
    /// Blocks without timeout on both the fence and the acquire.
    #[cfg_attr(feature = "trace-spans", tracing::instrument(level = "trace", skip_all))]
    pub fn acquire_next_image(&self, slot: usize) -> Result<AcquireOutcome> {
        let frame = &self.frames[slot];
        let resources = self.resources()?;

        unsafe {
            wait_for_fence(self.ctx.device(), frame.in_flight, u64::MAX)?;

            match self.loader.acquire_next_image(
                resources.swapchain,
                u64::MAX,
                frame.image_available,
                vk::Fence::null(),
            ) {
                Ok((index, false)) => Ok(AcquireOutcome::Image(index)),
                Ok((_, true)) | Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                    Ok(AcquireOutcome::NeedsRecreate)
                }
                Err(e) => Err(GpuError::from(e)),
            }
        }
    }

    /// Submit `command_buffer` for `image_index` using `slot`'s sync
    /// objects, then present the image.
    #[cfg_attr(feature = "trace-spans", tracing::instrument(level = "trace", skip_all))]
    pub fn submit_and_present(
        &mut self,
        command_buffer: vk::CommandBuffer,
        image_index: u32,
        slot: usize,
    ) -> Result<PresentOutcome> {
        let device = self.ctx.device();
        let frame = &self.frames[slot];

        // More images than slots: another slot may still be rendering here
        if let Some(previous) = self.images_in_flight.claim(image_index, frame.in_flight) {
            unsafe { wait_for_fence(device, previous, u64::MAX)? };
        }

        let wait_semaphores = [frame.image_available];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signal_semaphores = [frame.render_finished];
        let command_buffers = [command_buffer];

        unsafe {
            device.reset_fences(&[frame.in_flight])?;
            crate::command::submit_command_buffers(
                device,
                self.ctx.graphics_queue(),
                &command_buffers,
                &wait_semaphores,
                &wait_stages,
                &signal_semaphores,
                frame.in_flight,
            )?;
        }

        let swapchains = [self.resources()?.swapchain];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&signal_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        match unsafe { self.loader.queue_present(self.ctx.present_queue(), &present_info) } {
            Ok(false) => Ok(PresentOutcome::Presented),
            Ok(true) | Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentOutcome::NeedsRecreate),
            Err(e) => Err(GpuError::from(e)),
        }
    }

    /// Get the device context.
    pub const fn context(&self) -> &Arc<GpuContext> {
        &self.ctx
    }

    /// Get the main render pass.
    pub const fn render_pass(&self) -> vk::RenderPass {
        self.render_pass
    }

    /// Get the framebuffer of a swapchain image.
    pub fn framebuffer(&self, image_index: u32) -> vk::Framebuffer {
        self.resources
            .as_ref()
            .and_then(|r| r.framebuffers.get(image_index as usize).copied())
            .unwrap_or_default()
    }

    /// Get the current extent.
    pub fn extent(&self) -> vk::Extent2D {
        self.resources
            .as_ref()
            .map_or_else(vk::Extent2D::default, |r| r.extent)
    }

    /// Width over height of the current extent.
    pub fn extent_aspect_ratio(&self) -> f32 {
        let extent = self.extent();
        extent.width as f32 / extent.height.max(1) as f32
    }

    /// Number of presentable images.
    pub fn image_count(&self) -> usize {
        self.resources.as_ref().map_or(0, |r| r.images.len())
    }

    /// Number of frame slots.
    pub fn frames_in_flight(&self) -> usize {
        self.frames.len()
    }

    /// Color and depth formats.
    pub const fn formats(&self) -> SwapchainFormats {
        self.formats
    }

    /// Sample count of the color and depth attachments.
    pub const fn msaa_samples(&self) -> vk::SampleCountFlags {
        self.samples
    }
}

impl Drop for SwapchainManager {
    fn drop(&mut self) {
        let device = self.ctx.device();
        unsafe {
            let _ = device.device_wait_idle();
            if let Some(resources) = self.resources.take() {
                resources.destroy(device, &self.loader);
            }
            device.destroy_render_pass(self.render_pass, None);
            for frame in &self.frames {
                frame.destroy(device);
            }
        }
    }
}

/// Create info for a per-image color or depth attachment.
fn attachment_image_info(
    format: vk::Format,
    extent: vk::Extent2D,
    samples: vk::SampleCountFlags,
    usage: vk::ImageUsageFlags,
) -> vk::ImageCreateInfo<'static> {
    vk::ImageCreateInfo::default()
        .image_type(vk::ImageType::TYPE_2D)
        .format(format)
        .extent(vk::Extent3D {
            width: extent.width,
            height: extent.height,
            depth: 1,
        })
        .mip_levels(1)
        .array_layers(1)
        .samples(samples)
        .tiling(vk::ImageTiling::OPTIMAL)
        .usage(usage)
        .sharing_mode(vk::SharingMode::EXCLUSIVE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
}

/// Attachments of the main render pass: MSAA color, MSAA depth and the
/// single-sample resolve target that is presented.
pub fn main_render_pass_attachments(
    formats: SwapchainFormats,
    samples: vk::SampleCountFlags,
) -> [vk::AttachmentDescription; 3] {
    let color = vk::AttachmentDescription::default()
        .format(formats.color)
        .samples(samples)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::STORE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);

    let depth = vk::AttachmentDescription::default()
        .format(formats.depth)
        .samples(samples)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::DONT_CARE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);

    let resolve = vk::AttachmentDescription::default()
        .format(formats.color)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(vk::AttachmentLoadOp::DONT_CARE)
        .store_op(vk::AttachmentStoreOp::STORE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(vk::ImageLayout::PRESENT_SRC_KHR);

    [color, depth, resolve]
}

/// Create the main render pass.
///
/// # Safety
/// The device must be valid.
unsafe fn create_main_render_pass(
    device: &ash::Device,
    formats: SwapchainFormats,
    samples: vk::SampleCountFlags,
) -> Result<vk::RenderPass> {
    let attachments = main_render_pass_attachments(formats, samples);

    let color_refs = [vk::AttachmentReference::default()
        .attachment(0)
        .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)];
    let depth_ref = vk::AttachmentReference::default()
        .attachment(1)
        .layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);
    let resolve_refs = [vk::AttachmentReference::default()
        .attachment(2)
        .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)];

    let subpasses = [vk::SubpassDescription::default()
        .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
        .color_attachments(&color_refs)
        .depth_stencil_attachment(&depth_ref)
        .resolve_attachments(&resolve_refs)];

    let stages = vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
        | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS;
    let dependencies = [vk::SubpassDependency::default()
        .src_subpass(vk::SUBPASS_EXTERNAL)
        .dst_subpass(0)
        .src_stage_mask(stages)
        .src_access_mask(vk::AccessFlags::empty())
        .dst_stage_mask(stages)
        .dst_access_mask(
            vk::AccessFlags::COLOR_ATTACHMENT_WRITE
                | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
        )];

    let create_info = vk::RenderPassCreateInfo::default()
        .attachments(&attachments)
        .subpasses(&subpasses)
        .dependencies(&dependencies);

    let render_pass = unsafe { device.create_render_pass(&create_info, None)? };
    Ok(render_pass)
}

/// Select the best surface format.
///
/// Prefers 8-bit BGRA sRGB, otherwise takes the first reported format.
pub fn select_surface_format(available: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    available
        .iter()
        .find(|format| {
            format.format == vk::Format::B8G8R8A8_SRGB
                && format.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .or_else(|| available.first())
        .copied()
}

/// Select the best present mode.
///
/// Mailbox when available and vsync is off, FIFO otherwise.
pub fn select_present_mode(available: &[vk::PresentModeKHR], vsync: bool) -> vk::PresentModeKHR {
    if !vsync && available.contains(&vk::PresentModeKHR::MAILBOX) {
        vk::PresentModeKHR::MAILBOX
    } else {
        // FIFO is always supported
        vk::PresentModeKHR::FIFO
    }
}

/// Calculate swapchain extent.
pub fn calculate_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    desired_width: u32,
    desired_height: u32,
) -> vk::Extent2D {
    if capabilities.current_extent.width == u32::MAX {
        vk::Extent2D {
            width: desired_width.clamp(
                capabilities.min_image_extent.width,
                capabilities.max_image_extent.width,
            ),
            height: desired_height.clamp(
                capabilities.min_image_extent.height,
                capabilities.max_image_extent.height,
            ),
        }
    } else {
        capabilities.current_extent
    }
}

/// Number of images to request: one above the minimum, capped by the
/// maximum when the surface reports one.
pub const fn image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let count = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 && count > capabilities.max_image_count {
        capabilities.max_image_count
    } else {
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn surface_format(format: vk::Format) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }
    }

    #[test]
    fn prefers_bgra_srgb() {
        let formats = [
            surface_format(vk::Format::R8G8B8A8_UNORM),
            surface_format(vk::Format::B8G8R8A8_SRGB),
        ];
        assert_eq!(
            select_surface_format(&formats).map(|f| f.format),
            Some(vk::Format::B8G8R8A8_SRGB)
        );
        assert_eq!(
            select_surface_format(&formats[..1]).map(|f| f.format),
            Some(vk::Format::R8G8B8A8_UNORM)
        );
        assert!(select_surface_format(&[]).is_none());
    }

    #[test]
    fn mailbox_unless_vsync() {
        let modes = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX];
        assert_eq!(select_present_mode(&modes, false), vk::PresentModeKHR::MAILBOX);
        assert_eq!(select_present_mode(&modes, true), vk::PresentModeKHR::FIFO);
        assert_eq!(
            select_present_mode(&[vk::PresentModeKHR::IMMEDIATE], false),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn extent_clamps_when_surface_defers() {
        let caps = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D {
                width: 1,
                height: 1,
            },
            max_image_extent: vk::Extent2D {
                width: 1920,
                height: 1080,
            },
            ..Default::default()
        };
        assert_eq!(
            calculate_extent(&caps, 4000, 720),
            vk::Extent2D {
                width: 1920,
                height: 720
            }
        );

        let fixed = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: 1280,
                height: 720,
            },
            ..caps
        };
        assert_eq!(calculate_extent(&fixed, 10, 10), fixed.current_extent);
    }

    #[test]
    fn image_count_respects_maximum() {
        let caps = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 0,
            ..Default::default()
        };
        assert_eq!(image_count(&caps), 3);
        let capped = vk::SurfaceCapabilitiesKHR {
            max_image_count: 2,
            ..caps
        };
        assert_eq!(image_count(&capped), 2);
    }

    #[test]
    fn format_change_is_fatal() {
        let old = SwapchainFormats {
            color: vk::Format::B8G8R8A8_SRGB,
            depth: vk::Format::D32_SFLOAT,
        };
        assert!(old.ensure_matches(&old).is_ok());

        let injected = SwapchainFormats {
            color: vk::Format::R8G8B8A8_UNORM,
            ..old
        };
        assert!(matches!(
            old.ensure_matches(&injected),
            Err(GpuError::SwapchainFormatMismatch { .. })
        ));

        let depth_changed = SwapchainFormats {
            depth: vk::Format::D24_UNORM_S8_UINT,
            ..old
        };
        assert!(old.ensure_matches(&depth_changed).is_err());
    }

    #[test]
    fn render_pass_attachment_layout() {
        let formats = SwapchainFormats {
            color: vk::Format::B8G8R8A8_SRGB,
            depth: vk::Format::D32_SFLOAT,
        };
        let [color, depth, resolve] =
            main_render_pass_attachments(formats, vk::SampleCountFlags::TYPE_4);

        assert_eq!(color.samples, vk::SampleCountFlags::TYPE_4);
        assert_eq!(color.final_layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
        assert_eq!(depth.format, vk::Format::D32_SFLOAT);
        assert_eq!(depth.store_op, vk::AttachmentStoreOp::DONT_CARE);
        assert_eq!(resolve.samples, vk::SampleCountFlags::TYPE_1);
        assert_eq!(resolve.final_layout, vk::ImageLayout::PRESENT_SRC_KHR);
        assert_eq!(resolve.load_op, vk::AttachmentLoadOp::DONT_CARE);
    }
}

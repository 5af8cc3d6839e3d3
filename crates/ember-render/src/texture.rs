//! Sampled RGBA8 textures.

use crate::error::{RenderError, Result};
use ash::vk;
use ember_gpu::{GpuBuffer, GpuContext, GpuImage};
use std::path::Path;
use std::sync::Arc;

/// An sRGB texture with its sampler.
pub struct Texture {
    ctx: Arc<GpuContext>,
    image: GpuImage,
    sampler: vk::Sampler,
    width: u32,
    height: u32,
}

impl Texture {
    /// Upload tightly packed RGBA8 pixels.
    pub fn from_rgba8(ctx: &Arc<GpuContext>, width: u32, height: u32, pixels: &[u8]) -> Result<Self> {
        let expected = width as usize * height as usize * 4;
        if pixels.len() != expected {
            return Err(RenderError::TextureSize {
                width,
                height,
                expected,
                actual: pixels.len(),
            });
        }

        // 1. Stage the pixels
        let staging = GpuBuffer::new(
            ctx,
            "texture staging",
            pixels.len() as vk::DeviceSize,
            vk::BufferUsageFlags::TRANSFER_SRC,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;
        staging.write_bytes(0, pixels)?;

        // 2. Create the image
        let format = vk::Format::R8G8B8A8_SRGB;
        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(format)
            .extent(vk::Extent3D {
                width,
                height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);
        let mut image = ctx.create_image("texture", &image_info, vk::MemoryPropertyFlags::DEVICE_LOCAL)?;

        // 3. Copy and make it shader-readable
        ctx.transition_image_layout(
            image.handle(),
            format,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            image_info.mip_levels,
            1,
        )?;
        ctx.copy_buffer_to_image(staging.handle(), image.handle(), width, height, 1)?;
        ctx.transition_image_layout(
            image.handle(),
            format,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            image_info.mip_levels,
            1,
        )?;

        // 4. View and sampler
        image.create_view(vk::ImageAspectFlags::COLOR)?;

        let capabilities = ctx.capabilities();
        let sampler_info = vk::SamplerCreateInfo::default()
            .mag_filter(vk::Filter::LINEAR)
            .min_filter(vk::Filter::LINEAR)
            .address_mode_u(vk::SamplerAddressMode::REPEAT)
            .address_mode_v(vk::SamplerAddressMode::REPEAT)
            .address_mode_w(vk::SamplerAddressMode::REPEAT)
            .anisotropy_enable(capabilities.supports_sampler_anisotropy)
            .max_anisotropy(capabilities.max_sampler_anisotropy)
            .border_color(vk::BorderColor::INT_OPAQUE_BLACK)
            .unnormalized_coordinates(false)
            .compare_enable(false)
            .compare_op(vk::CompareOp::ALWAYS)
            .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
            .mip_lod_bias(0.0)
            .min_lod(0.0)
            .max_lod(0.0);
        let sampler = unsafe { ctx.device().create_sampler(&sampler_info, None)? };

        Ok(Self {
            ctx: Arc::clone(ctx),
            image,
            sampler,
            width,
            height,
        })
    }

    /// A 1x1 texture of a single color.
    pub fn solid(ctx: &Arc<GpuContext>, rgba: [u8; 4]) -> Result<Self> {
        Self::from_rgba8(ctx, 1, 1, &rgba)
    }

    /// Decode an image file and upload it.
    pub fn from_file(ctx: &Arc<GpuContext>, path: impl AsRef<Path>) -> Result<Self> {
        let decoded = image::open(path.as_ref())?.into_rgba8();
        let (width, height) = decoded.dimensions();
        tracing::debug!("Loaded texture {} ({width}x{height})", path.as_ref().display());
        Self::from_rgba8(ctx, width, height, decoded.as_raw())
    }

    /// Descriptor info for a combined image sampler.
    pub fn descriptor_info(&self) -> vk::DescriptorImageInfo {
        vk::DescriptorImageInfo {
            sampler: self.sampler,
            image_view: self.image.view(),
            image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        }
    }

    pub const fn width(&self) -> u32 {
        self.width
    }

    pub const fn height(&self) -> u32 {
        self.height
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        unsafe { self.ctx.device().destroy_sampler(self.sampler, None) };
    }
}

/// Texture component attached to scene entities.
#[derive(Clone)]
pub struct TextureHandle(pub Arc<Texture>);

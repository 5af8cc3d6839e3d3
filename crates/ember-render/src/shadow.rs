//! Directional shadow map and the depth-only pass that fills it.
//!
//! The shadow map has a fixed resolution that does not follow the window,
//! so it is created once and never recreated with the swapchain. The pass
//! leaves the depth image in `DEPTH_STENCIL_READ_ONLY_OPTIMAL`, which is the
//! layout the main pass samples it in; the render pass dependencies are the
//! only ordering between the two passes.

use crate::error::Result;
use crate::frame::FrameInfo;
use crate::mesh::{MeshHandle, Vertex};
use ash::vk;
use bytemuck::{Pod, Zeroable};
use ember_core::settings::ShadowSettings;
use ember_gpu::shader::shader_path;
use ember_gpu::{GpuContext, GpuImage, GraphicsPipeline, PipelineConfig, PipelineLayout, ShaderStage};
use ember_scene::Transform;
use glam::Mat4;
use std::mem::size_of;
use std::path::Path;
use std::sync::Arc;

/// Depth format of the shadow map.
pub const SHADOW_MAP_FORMAT: vk::Format = vk::Format::D16_UNORM;

/// Depth image, sampler, render pass and framebuffer of the shadow map.
pub struct ShadowMap {
    ctx: Arc<GpuContext>,
    image: GpuImage,
    sampler: vk::Sampler,
    render_pass: vk::RenderPass,
    framebuffer: vk::Framebuffer,
    resolution: u32,
}

impl ShadowMap {
    pub fn new(ctx: &Arc<GpuContext>, resolution: u32) -> Result<Self> {
        let device = ctx.device();

        // 1. Depth image
        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(SHADOW_MAP_FORMAT)
            .extent(vk::Extent3D {
                width: resolution,
                height: resolution,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT | vk::ImageUsageFlags::SAMPLED)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);
        let mut image = ctx.create_image("shadow map", &image_info, vk::MemoryPropertyFlags::DEVICE_LOCAL)?;
        let view = image.create_view(vk::ImageAspectFlags::DEPTH)?;

        // 2. Sampler
        let sampler_info = vk::SamplerCreateInfo::default()
            .mag_filter(vk::Filter::LINEAR)
            .min_filter(vk::Filter::LINEAR)
            .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
            .address_mode_u(vk::SamplerAddressMode::CLAMP_TO_BORDER)
            .address_mode_v(vk::SamplerAddressMode::CLAMP_TO_BORDER)
            .address_mode_w(vk::SamplerAddressMode::CLAMP_TO_BORDER)
            .mip_lod_bias(0.0)
            .max_anisotropy(1.0)
            .min_lod(0.0)
            .max_lod(1.0)
            .border_color(vk::BorderColor::FLOAT_OPAQUE_WHITE);
        let sampler = unsafe { device.create_sampler(&sampler_info, None)? };

        // 3. Render pass
        let attachments = [shadow_attachment()];
        let depth_ref = vk::AttachmentReference::default()
            .attachment(0)
            .layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);
        let subpass = vk::SubpassDescription::default()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .depth_stencil_attachment(&depth_ref);
        let subpasses = [subpass];
        let dependencies = shadow_dependencies();
        let render_pass_info = vk::RenderPassCreateInfo::default()
            .attachments(&attachments)
            .subpasses(&subpasses)
            .dependencies(&dependencies);
        let render_pass = match unsafe { device.create_render_pass(&render_pass_info, None) } {
            Ok(render_pass) => render_pass,
            Err(e) => {
                unsafe { device.destroy_sampler(sampler, None) };
                return Err(e.into());
            }
        };

        // 4. Framebuffer
        let views = [view];
        let framebuffer_info = vk::FramebufferCreateInfo::default()
            .render_pass(render_pass)
            .attachments(&views)
            .width(resolution)
            .height(resolution)
            .layers(1);
        let framebuffer = match unsafe { device.create_framebuffer(&framebuffer_info, None) } {
            Ok(framebuffer) => framebuffer,
            Err(e) => {
                unsafe {
                    device.destroy_render_pass(render_pass, None);
                    device.destroy_sampler(sampler, None);
                }
                return Err(e.into());
            }
        };

        tracing::debug!("Created {resolution}x{resolution} shadow map");

        Ok(Self {
            ctx: Arc::clone(ctx),
            image,
            sampler,
            render_pass,
            framebuffer,
            resolution,
        })
    }

    /// Get the shadow render pass.
    pub const fn render_pass(&self) -> vk::RenderPass {
        self.render_pass
    }

    /// Get the shadow framebuffer.
    pub const fn framebuffer(&self) -> vk::Framebuffer {
        self.framebuffer
    }

    /// Get the resolution in texels.
    pub const fn resolution(&self) -> u32 {
        self.resolution
    }

    pub const fn extent(&self) -> vk::Extent2D {
        vk::Extent2D {
            width: self.resolution,
            height: self.resolution,
        }
    }

    /// Descriptor info for sampling the map after the shadow pass.
    pub fn descriptor_info(&self) -> vk::DescriptorImageInfo {
        vk::DescriptorImageInfo {
            sampler: self.sampler,
            image_view: self.image.view(),
            image_layout: vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL,
        }
    }
}

impl Drop for ShadowMap {
    fn drop(&mut self) {
        let device = self.ctx.device();
        unsafe {
            device.destroy_framebuffer(self.framebuffer, None);
            device.destroy_render_pass(self.render_pass, None);
            device.destroy_sampler(self.sampler, None);
        }
    }
}

/// The single depth attachment of the shadow pass.
pub fn shadow_attachment() -> vk::AttachmentDescription {
    vk::AttachmentDescription::default()
        .format(SHADOW_MAP_FORMAT)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::STORE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL)
}

/// Order depth writes after last frame's sampling, and sampling after
/// this frame's depth writes.
pub fn shadow_dependencies() -> [vk::SubpassDependency; 2] {
    [
        vk::SubpassDependency::default()
            .src_subpass(vk::SUBPASS_EXTERNAL)
            .dst_subpass(0)
            .src_stage_mask(vk::PipelineStageFlags::FRAGMENT_SHADER)
            .dst_stage_mask(vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS)
            .src_access_mask(vk::AccessFlags::SHADER_READ)
            .dst_access_mask(vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE)
            .dependency_flags(vk::DependencyFlags::BY_REGION),
        vk::SubpassDependency::default()
            .src_subpass(0)
            .dst_subpass(vk::SUBPASS_EXTERNAL)
            .src_stage_mask(vk::PipelineStageFlags::LATE_FRAGMENT_TESTS)
            .dst_stage_mask(vk::PipelineStageFlags::FRAGMENT_SHADER)
            .src_access_mask(vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE)
            .dst_access_mask(vk::AccessFlags::SHADER_READ)
            .dependency_flags(vk::DependencyFlags::BY_REGION),
    ]
}

/// Push constants of the shadow pipeline.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct ShadowPushConstants {
    /// `light_space * model`
    pub light_space_model: Mat4,
}

/// Light-space view-projection of the shadow-casting light.
pub fn light_space_matrix(settings: &ShadowSettings) -> Mat4 {
    settings.light_space_matrix()
}

/// Pipeline config of the depth-only shadow pipeline.
pub fn shadow_pipeline_config() -> PipelineConfig {
    let mut config = PipelineConfig {
        depth_compare_op: vk::CompareOp::LESS_OR_EQUAL,
        depth_bias_enable: true,
        color_attachment_count: 0,
        vertex_bindings: Vertex::binding_descriptions(),
        vertex_attributes: Vertex::attribute_descriptions(),
        ..PipelineConfig::default()
    };
    config.dynamic_states.push(vk::DynamicState::DEPTH_BIAS);
    config
}

/// Records the shadow pass.
pub struct ShadowSystem {
    ctx: Arc<GpuContext>,
    shadow_map: ShadowMap,
    pipeline: GraphicsPipeline,
    pipeline_layout: PipelineLayout,
    settings: ShadowSettings,
}

impl ShadowSystem {
    pub fn new(ctx: &Arc<GpuContext>, shader_dir: &Path, settings: &ShadowSettings) -> Result<Self> {
        let shadow_map = ShadowMap::new(ctx, settings.resolution)?;

        let push_range = vk::PushConstantRange::default()
            .stage_flags(vk::ShaderStageFlags::VERTEX)
            .offset(0)
            .size(size_of::<ShadowPushConstants>() as u32);
        let pipeline_layout = PipelineLayout::new(ctx, &[], &[push_range])?;

        let pipeline = GraphicsPipeline::new(
            ctx,
            &shader_path(shader_dir, "shadow", ShaderStage::Vertex),
            &shader_path(shader_dir, "shadow", ShaderStage::Fragment),
            &shadow_pipeline_config(),
            pipeline_layout.handle(),
            shadow_map.render_pass(),
        )?;

        Ok(Self {
            ctx: Arc::clone(ctx),
            shadow_map,
            pipeline,
            pipeline_layout,
            settings: settings.clone(),
        })
    }

    /// Get the shadow map the pass renders into.
    pub const fn shadow_map(&self) -> &ShadowMap {
        &self.shadow_map
    }

    /// Record the shadow pass for every entity with a mesh and return the
    /// light-space matrix used.
    #[cfg_attr(feature = "trace-spans", tracing::instrument(level = "trace", skip_all))]
    pub fn render(&self, frame: &FrameInfo<'_>) -> Mat4 {
        let device = self.ctx.device();
        let cmd = frame.command_buffer;
        let extent = self.shadow_map.extent();

        let clear_values = [vk::ClearValue {
            depth_stencil: vk::ClearDepthStencilValue {
                depth: 1.0,
                stencil: 0,
            },
        }];
        let begin_info = vk::RenderPassBeginInfo::default()
            .render_pass(self.shadow_map.render_pass())
            .framebuffer(self.shadow_map.framebuffer())
            .render_area(vk::Rect2D {
                offset: vk::Offset2D::default(),
                extent,
            })
            .clear_values(&clear_values);

        let light_space = light_space_matrix(&self.settings);
        let (viewport, scissor) = crate::renderer::full_viewport(extent);

        unsafe {
            device.cmd_begin_render_pass(cmd, &begin_info, vk::SubpassContents::INLINE);
            device.cmd_set_viewport(cmd, 0, &[viewport]);
            device.cmd_set_scissor(cmd, 0, &[scissor]);
            device.cmd_set_depth_bias(
                cmd,
                self.settings.depth_bias_constant,
                self.settings.depth_bias_clamp,
                self.settings.depth_bias_slope,
            );
        }
        self.pipeline.bind(cmd);

        let mut query = frame.scene.world().query::<(&Transform, &MeshHandle)>();
        for (_, (transform, mesh)) in query.iter() {
            let push = ShadowPushConstants {
                light_space_model: light_space * transform.mat4(),
            };
            unsafe {
                device.cmd_push_constants(
                    cmd,
                    self.pipeline_layout.handle(),
                    vk::ShaderStageFlags::VERTEX,
                    0,
                    bytemuck::bytes_of(&push),
                );
            }
            mesh.0.bind(device, cmd);
            mesh.0.draw(device, cmd);
        }

        unsafe { device.cmd_end_render_pass(cmd) };
        light_space
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec4;

    #[test]
    fn light_space_matrix_is_reproducible() {
        let settings = ShadowSettings::default();
        let first = light_space_matrix(&settings);
        for _ in 0..8 {
            let again = light_space_matrix(&settings);
            assert_eq!(first.to_cols_array().map(f32::to_bits), again.to_cols_array().map(f32::to_bits));
        }
    }

    #[test]
    fn light_target_projects_inside_the_volume() {
        let settings = ShadowSettings::default();
        let clip = light_space_matrix(&settings) * Vec4::new(0.0, 0.0, 0.0, 1.0);
        let ndc = clip.truncate() / clip.w;
        assert!(ndc.x.abs() < 1e-5 && ndc.y.abs() < 1e-5);
        assert!((0.0..=1.0).contains(&ndc.z));
    }

    #[test]
    fn different_light_gives_different_matrix() {
        let mut settings = ShadowSettings::default();
        let before = light_space_matrix(&settings);
        settings.light_position = [3.0, -2.0, -2.0];
        assert_ne!(before, light_space_matrix(&settings));
    }

    #[test]
    fn attachment_ends_readable_by_shaders() {
        let attachment = shadow_attachment();
        assert_eq!(attachment.format, SHADOW_MAP_FORMAT);
        assert_eq!(attachment.load_op, vk::AttachmentLoadOp::CLEAR);
        assert_eq!(attachment.store_op, vk::AttachmentStoreOp::STORE);
        assert_eq!(attachment.initial_layout, vk::ImageLayout::UNDEFINED);
        assert_eq!(attachment.final_layout, vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL);
    }

    #[test]
    fn dependencies_bracket_the_pass() {
        let [incoming, outgoing] = shadow_dependencies();
        assert_eq!(incoming.src_subpass, vk::SUBPASS_EXTERNAL);
        assert_eq!(incoming.dst_access_mask, vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE);
        assert_eq!(outgoing.dst_subpass, vk::SUBPASS_EXTERNAL);
        assert_eq!(outgoing.dst_stage_mask, vk::PipelineStageFlags::FRAGMENT_SHADER);
        assert!(incoming.dependency_flags.contains(vk::DependencyFlags::BY_REGION));
        assert!(outgoing.dependency_flags.contains(vk::DependencyFlags::BY_REGION));
    }

    #[test]
    fn pipeline_is_depth_only_with_dynamic_bias() {
        let config = shadow_pipeline_config();
        assert_eq!(config.color_attachment_count, 0);
        assert!(config.depth_bias_enable);
        assert_eq!(config.depth_compare_op, vk::CompareOp::LESS_OR_EQUAL);
        assert!(config.dynamic_states.contains(&vk::DynamicState::DEPTH_BIAS));
        assert_eq!(config.rasterization_samples, vk::SampleCountFlags::TYPE_1);
    }

    #[test]
    fn push_constants_fit_minimum_limit() {
        assert!(size_of::<ShadowPushConstants>() <= 128);
    }

    #[test]
    #[ignore = "Requires GPU hardware"]
    fn shadow_map_is_square() {
        let ctx = ember_gpu::GpuContextBuilder::new()
            .validation(false)
            .build_headless()
            .unwrap();
        let map = ShadowMap::new(&ctx, 512).unwrap();
        assert_eq!(map.extent(), vk::Extent2D { width: 512, height: 512 });
        assert_eq!(map.descriptor_info().image_layout, vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL);
    }
}

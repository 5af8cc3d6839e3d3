//! Main forward pass over scene meshes.

use crate::error::Result;
use crate::frame::FrameInfo;
use crate::mesh::{MeshHandle, Vertex};
use crate::texture::{Texture, TextureHandle};
use ash::vk;
use bytemuck::{Pod, Zeroable};
use ember_gpu::shader::shader_path;
use ember_gpu::{
    DescriptorSetLayout, DescriptorWriter, GpuContext, GraphicsPipeline, PipelineConfig, PipelineLayout,
    ShaderStage,
};
use ember_scene::{MaterialIndex, Transform};
use glam::Mat4;
use std::mem::size_of;
use std::path::Path;
use std::sync::Arc;

/// Descriptor set indices of the main pass.
pub mod sets {
    pub const GLOBAL: u32 = 0;
    pub const TEXTURE: u32 = 1;
    pub const SHADOW: u32 = 2;
}

/// Push constants of the main pass.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct MeshPushConstants {
    pub model: Mat4,
    /// Inverse-transpose of the model's upper 3x3, widened to a mat4
    pub normal: Mat4,
    pub light_space: Mat4,
    pub material_index: i32,
    _padding: [i32; 3],
}

impl MeshPushConstants {
    pub fn new(transform: &Transform, light_space: Mat4, material_index: i32) -> Self {
        Self {
            model: transform.mat4(),
            normal: Mat4::from_mat3(transform.normal_matrix()),
            light_space,
            material_index,
            _padding: [0; 3],
        }
    }
}

/// Layout with a single fragment-stage combined image sampler at binding 0.
fn sampler_set_layout(ctx: &Arc<GpuContext>) -> Result<DescriptorSetLayout> {
    Ok(DescriptorSetLayout::builder()
        .add_binding(
            0,
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            vk::ShaderStageFlags::FRAGMENT,
            1,
        )
        .build(ctx)?)
}

/// Draws every entity with a [`Transform`] and a [`MeshHandle`].
pub struct MeshRenderSystem {
    ctx: Arc<GpuContext>,
    pipeline: GraphicsPipeline,
    pipeline_layout: PipelineLayout,
    texture_layout: DescriptorSetLayout,
    shadow_layout: DescriptorSetLayout,
    default_texture: Texture,
}

impl MeshRenderSystem {
    pub fn new(
        ctx: &Arc<GpuContext>,
        render_pass: vk::RenderPass,
        global_layout: &DescriptorSetLayout,
        samples: vk::SampleCountFlags,
        shader_dir: &Path,
    ) -> Result<Self> {
        let texture_layout = sampler_set_layout(ctx)?;
        let shadow_layout = sampler_set_layout(ctx)?;

        let push_range = vk::PushConstantRange::default()
            .stage_flags(vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT)
            .offset(0)
            .size(size_of::<MeshPushConstants>() as u32);
        let pipeline_layout = PipelineLayout::new(
            ctx,
            &[
                global_layout.handle(),
                texture_layout.handle(),
                shadow_layout.handle(),
            ],
            &[push_range],
        )?;

        let config = PipelineConfig {
            rasterization_samples: samples,
            vertex_bindings: Vertex::binding_descriptions(),
            vertex_attributes: Vertex::attribute_descriptions(),
            ..PipelineConfig::default()
        };
        let pipeline = GraphicsPipeline::new(
            ctx,
            &shader_path(shader_dir, "mesh", ShaderStage::Vertex),
            &shader_path(shader_dir, "mesh", ShaderStage::Fragment),
            &config,
            pipeline_layout.handle(),
            render_pass,
        )?;

        let default_texture = Texture::solid(ctx, [255; 4])?;

        Ok(Self {
            ctx: Arc::clone(ctx),
            pipeline,
            pipeline_layout,
            texture_layout,
            shadow_layout,
            default_texture,
        })
    }

    /// Record the main pass. Must be called inside the swapchain render pass,
    /// after the shadow pass has been recorded into the same command buffer.
    ///
    /// Stops drawing at the first set the frame pool cannot provide.
    /// Descriptor errors other than pool exhaustion are returned.
    #[cfg_attr(feature = "trace-spans", tracing::instrument(level = "trace", skip_all))]
    pub fn render(
        &self,
        frame: &FrameInfo<'_>,
        shadow_info: vk::DescriptorImageInfo,
        light_space: Mat4,
    ) -> Result<()> {
        let device = self.ctx.device();
        let cmd = frame.command_buffer;
        let layout = self.pipeline_layout.handle();

        self.pipeline.bind(cmd);

        // 1. Global set
        unsafe {
            device.cmd_bind_descriptor_sets(
                cmd,
                vk::PipelineBindPoint::GRAPHICS,
                layout,
                sets::GLOBAL,
                &[frame.global_descriptor_set],
                &[],
            );
        }

        // 2. Shadow set, once per frame
        let Some(shadow_set) = DescriptorWriter::new(&self.shadow_layout, frame.frame_descriptor_pool)
            .write_image(0, shadow_info)
            .build()?
        else {
            tracing::warn!("Frame descriptor pool exhausted, skipping main pass");
            return Ok(());
        };
        unsafe {
            device.cmd_bind_descriptor_sets(
                cmd,
                vk::PipelineBindPoint::GRAPHICS,
                layout,
                sets::SHADOW,
                &[shadow_set],
                &[],
            );
        }

        // 3. Entities, each with a fresh texture set
        let world = frame.scene.world();
        let mut query = world.query::<(&Transform, &MeshHandle, Option<&TextureHandle>, Option<&MaterialIndex>)>();
        let drawable = while_allocated(query.iter(), |(_, (_, _, texture, _))| {
            let texture_info = texture.map_or_else(
                || self.default_texture.descriptor_info(),
                |handle| handle.0.descriptor_info(),
            );
            DescriptorWriter::new(&self.texture_layout, frame.frame_descriptor_pool)
                .write_image(0, texture_info)
                .build()
        })?;

        for ((_, (transform, mesh, _, material)), texture_set) in drawable {
            let push = MeshPushConstants::new(transform, light_space, material.map_or(0, |m| m.0));
            unsafe {
                device.cmd_bind_descriptor_sets(
                    cmd,
                    vk::PipelineBindPoint::GRAPHICS,
                    layout,
                    sets::TEXTURE,
                    &[texture_set],
                    &[],
                );
                device.cmd_push_constants(
                    cmd,
                    layout,
                    vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
                    0,
                    bytemuck::bytes_of(&push),
                );
            }
            mesh.0.bind(device, cmd);
            mesh.0.draw(device, cmd);
        }
        Ok(())
    }
}

/// Pair items with a set each, stopping at the first allocation the pool
/// cannot satisfy.
fn while_allocated<T, S>(
    items: impl IntoIterator<Item = T>,
    mut allocate: impl FnMut(&T) -> ember_gpu::Result<Option<S>>,
) -> ember_gpu::Result<Vec<(T, S)>> {
    let mut allocated = Vec::new();
    for item in items {
        match allocate(&item)? {
            Some(set) => allocated.push((item, set)),
            None => {
                tracing::warn!("Frame descriptor pool exhausted after {} meshes", allocated.len());
                break;
            }
        }
    }
    Ok(allocated)
}

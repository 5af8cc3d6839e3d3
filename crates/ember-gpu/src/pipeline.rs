//! Graphics pipeline creation.

use crate::context::GpuContext;
use crate::error::{GpuError, Result};
use crate::shader::{create_shader_module, load_spirv};
use ash::vk;
use std::path::Path;
use std::sync::Arc;

/// Fixed-function state of a graphics pipeline.
#[derive(Clone)]
pub struct PipelineConfig {
    pub topology: vk::PrimitiveTopology,
    pub polygon_mode: vk::PolygonMode,
    pub cull_mode: vk::CullModeFlags,
    pub front_face: vk::FrontFace,
    pub line_width: f32,
    pub depth_bias_enable: bool,
    pub rasterization_samples: vk::SampleCountFlags,
    pub color_blend_attachment: vk::PipelineColorBlendAttachmentState,
    /// Color attachments of the target subpass; zero for depth-only passes.
    pub color_attachment_count: u32,
    pub depth_test_enable: bool,
    pub depth_write_enable: bool,
    pub depth_compare_op: vk::CompareOp,
    pub dynamic_states: Vec<vk::DynamicState>,
    pub vertex_bindings: Vec<vk::VertexInputBindingDescription>,
    pub vertex_attributes: Vec<vk::VertexInputAttributeDescription>,
    pub subpass: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            polygon_mode: vk::PolygonMode::FILL,
            cull_mode: vk::CullModeFlags::NONE,
            front_face: vk::FrontFace::CLOCKWISE,
            line_width: 1.0,
            depth_bias_enable: false,
            rasterization_samples: vk::SampleCountFlags::TYPE_1,
            color_blend_attachment: vk::PipelineColorBlendAttachmentState::default()
                .blend_enable(false)
                .color_write_mask(vk::ColorComponentFlags::RGBA)
                .src_color_blend_factor(vk::BlendFactor::ONE)
                .dst_color_blend_factor(vk::BlendFactor::ZERO)
                .color_blend_op(vk::BlendOp::ADD)
                .src_alpha_blend_factor(vk::BlendFactor::ONE)
                .dst_alpha_blend_factor(vk::BlendFactor::ZERO)
                .alpha_blend_op(vk::BlendOp::ADD),
            color_attachment_count: 1,
            depth_test_enable: true,
            depth_write_enable: true,
            depth_compare_op: vk::CompareOp::LESS,
            dynamic_states: vec![vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR],
            vertex_bindings: Vec::new(),
            vertex_attributes: Vec::new(),
            subpass: 0,
        }
    }
}

impl PipelineConfig {
    /// Blend color by source alpha; alpha passes through.
    pub fn enable_alpha_blending(&mut self) {
        self.color_blend_attachment = self
            .color_blend_attachment
            .blend_enable(true)
            .src_color_blend_factor(vk::BlendFactor::SRC_ALPHA)
            .dst_color_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
            .color_blend_op(vk::BlendOp::ADD)
            .src_alpha_blend_factor(vk::BlendFactor::ONE)
            .dst_alpha_blend_factor(vk::BlendFactor::ZERO)
            .alpha_blend_op(vk::BlendOp::ADD);
    }
}

/// Pipeline layout wrapper.
pub struct PipelineLayout {
    ctx: Arc<GpuContext>,
    layout: vk::PipelineLayout,
}

impl PipelineLayout {
    /// Create a pipeline layout.
    pub fn new(
        ctx: &Arc<GpuContext>,
        set_layouts: &[vk::DescriptorSetLayout],
        push_constant_ranges: &[vk::PushConstantRange],
    ) -> Result<Self> {
        let layout_info = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(set_layouts)
            .push_constant_ranges(push_constant_ranges);

        let layout = unsafe { ctx.device().create_pipeline_layout(&layout_info, None) }
            .map_err(|e| GpuError::PipelineCreation(e.to_string()))?;

        Ok(Self {
            ctx: Arc::clone(ctx),
            layout,
        })
    }

    /// Get the raw layout handle.
    pub const fn handle(&self) -> vk::PipelineLayout {
        self.layout
    }
}

impl Drop for PipelineLayout {
    fn drop(&mut self) {
        unsafe { self.ctx.device().destroy_pipeline_layout(self.layout, None) };
    }
}

/// Graphics pipeline wrapper.
pub struct GraphicsPipeline {
    ctx: Arc<GpuContext>,
    pipeline: vk::Pipeline,
}

impl GraphicsPipeline {
    /// Create a graphics pipeline from compiled vertex and fragment shaders.
    pub fn new(
        ctx: &Arc<GpuContext>,
        vert_path: &Path,
        frag_path: &Path,
        config: &PipelineConfig,
        layout: vk::PipelineLayout,
        render_pass: vk::RenderPass,
    ) -> Result<Self> {
        let vert_code = load_spirv(vert_path)?;
        let frag_code = load_spirv(frag_path)?;
        let device = ctx.device();

        // 1. Shader modules, released once the pipeline exists
        let vert_module = unsafe { create_shader_module(device, &vert_code)? };
        let frag_module = match unsafe { create_shader_module(device, &frag_code) } {
            Ok(module) => module,
            Err(e) => {
                unsafe { device.destroy_shader_module(vert_module, None) };
                return Err(e);
            }
        };

        let shader_stages = [
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::VERTEX)
                .module(vert_module)
                .name(c"main"),
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::FRAGMENT)
                .module(frag_module)
                .name(c"main"),
        ];

        // 2. Fixed-function state
        let vertex_input = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&config.vertex_bindings)
            .vertex_attribute_descriptions(&config.vertex_attributes);

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(config.topology)
            .primitive_restart_enable(false);

        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(1)
            .scissor_count(1);

        let rasterization = vk::PipelineRasterizationStateCreateInfo::default()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(config.polygon_mode)
            .cull_mode(config.cull_mode)
            .front_face(config.front_face)
            .depth_bias_enable(config.depth_bias_enable)
            .line_width(config.line_width);

        let multisampling = vk::PipelineMultisampleStateCreateInfo::default()
            .rasterization_samples(config.rasterization_samples)
            .sample_shading_enable(false)
            .min_sample_shading(1.0);

        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(config.depth_test_enable)
            .depth_write_enable(config.depth_write_enable)
            .depth_compare_op(config.depth_compare_op)
            .depth_bounds_test_enable(false)
            .stencil_test_enable(false);

        let color_blend_attachments =
            vec![config.color_blend_attachment; config.color_attachment_count as usize];
        let color_blending = vk::PipelineColorBlendStateCreateInfo::default()
            .logic_op_enable(false)
            .logic_op(vk::LogicOp::COPY)
            .attachments(&color_blend_attachments);

        let dynamic_state =
            vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&config.dynamic_states);

        // 3. Pipeline
        let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization)
            .multisample_state(&multisampling)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blending)
            .dynamic_state(&dynamic_state)
            .layout(layout)
            .render_pass(render_pass)
            .subpass(config.subpass);

        let created = unsafe {
            device.create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
        };

        unsafe {
            device.destroy_shader_module(vert_module, None);
            device.destroy_shader_module(frag_module, None);
        }

        let pipelines =
            created.map_err(|(_pipelines, e)| GpuError::PipelineCreation(e.to_string()))?;
        let pipeline = pipelines
            .first()
            .copied()
            .ok_or_else(|| GpuError::PipelineCreation("no pipeline returned".to_string()))?;

        Ok(Self {
            ctx: Arc::clone(ctx),
            pipeline,
        })
    }

    /// Get the raw pipeline handle.
    pub const fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }

    /// Bind for graphics on `cmd`.
    pub fn bind(&self, cmd: vk::CommandBuffer) {
        unsafe {
            self.ctx
                .device()
                .cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, self.pipeline);
        }
    }
}

impl Drop for GraphicsPipeline {
    fn drop(&mut self) {
        unsafe { self.ctx.device().destroy_pipeline(self.pipeline, None) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.topology, vk::PrimitiveTopology::TRIANGLE_LIST);
        assert_eq!(config.cull_mode, vk::CullModeFlags::NONE);
        assert_eq!(config.front_face, vk::FrontFace::CLOCKWISE);
        assert_eq!(config.rasterization_samples, vk::SampleCountFlags::TYPE_1);
        assert_eq!(config.color_blend_attachment.blend_enable, vk::FALSE);
        assert_eq!(
            config.color_blend_attachment.color_write_mask,
            vk::ColorComponentFlags::RGBA
        );
        assert_eq!(config.color_attachment_count, 1);
        assert!(config.depth_test_enable && config.depth_write_enable);
        assert_eq!(config.depth_compare_op, vk::CompareOp::LESS);
        assert_eq!(
            config.dynamic_states,
            vec![vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR]
        );
        assert!(config.vertex_bindings.is_empty() && config.vertex_attributes.is_empty());
    }

    #[test]
    fn alpha_blending() {
        let mut config = PipelineConfig::default();
        config.enable_alpha_blending();
        let blend = config.color_blend_attachment;
        assert_eq!(blend.blend_enable, vk::TRUE);
        assert_eq!(blend.src_color_blend_factor, vk::BlendFactor::SRC_ALPHA);
        assert_eq!(
            blend.dst_color_blend_factor,
            vk::BlendFactor::ONE_MINUS_SRC_ALPHA
        );
        assert_eq!(blend.src_alpha_blend_factor, vk::BlendFactor::ONE);
        assert_eq!(blend.dst_alpha_blend_factor, vk::BlendFactor::ZERO);
    }
}

//! Per-frame resources and the fixed pass sequence.
//!
//! Every frame records, into the orchestrator's command buffer:
//! 1. the shadow pass into the offscreen shadow map
//! 2. the swapchain render pass with scene meshes, then application draws,
//!    then point lights far to near

use crate::app::EmberApp;
use crate::context::AppContext;
use anyhow::Context as _;
use ash::vk;
use ember_core::constants::MAX_FRAMES_IN_FLIGHT;
use ember_gpu::{DescriptorPool, DescriptorSetLayout, DescriptorWriter, GpuBuffer};
use ember_render::{FrameInfo, GlobalUbo, MeshRenderSystem, PointLightSystem, ShadowSystem};
use std::mem::size_of;

/// Sets each per-frame pool can hand out between resets.
pub const FRAME_POOL_MAX_SETS: u32 = 1000;

/// Descriptors of each type reserved in a per-frame pool.
const FRAME_POOL_DESCRIPTORS_PER_TYPE: u32 = 100;

/// Pool sizes of the long-lived pool holding one global set per slot.
pub fn global_pool_sizes() -> Vec<(vk::DescriptorType, u32)> {
    vec![(vk::DescriptorType::UNIFORM_BUFFER, MAX_FRAMES_IN_FLIGHT as u32)]
}

/// GPU resources and render systems owned by the framework.
pub struct RenderSystems {
    // Pipelines go first so they are destroyed before the layouts they use
    shadow: ShadowSystem,
    meshes: MeshRenderSystem,
    lights: PointLightSystem,
    frame_pools: Vec<DescriptorPool>,
    global_sets: Vec<vk::DescriptorSet>,
    global_pool: DescriptorPool,
    global_layout: DescriptorSetLayout,
    ubo_buffers: Vec<GpuBuffer>,
}

impl RenderSystems {
    pub fn new(ctx: &AppContext) -> anyhow::Result<Self> {
        let gpu = &ctx.gpu;

        // 1. Global UBO, one buffer per frame slot
        let ubo_buffers = (0..MAX_FRAMES_IN_FLIGHT)
            .map(|_| {
                GpuBuffer::new(
                    gpu,
                    "global ubo",
                    size_of::<GlobalUbo>() as vk::DeviceSize,
                    vk::BufferUsageFlags::UNIFORM_BUFFER,
                    vk::MemoryPropertyFlags::HOST_VISIBLE,
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        // 2. Global sets
        let global_layout = DescriptorSetLayout::builder()
            .add_binding(
                0,
                vk::DescriptorType::UNIFORM_BUFFER,
                vk::ShaderStageFlags::ALL_GRAPHICS,
                1,
            )
            .build(gpu)?;

        let global_pool = global_pool_sizes()
            .into_iter()
            .fold(DescriptorPool::builder(), |builder, (ty, count)| builder.pool_size(ty, count))
            .max_sets(MAX_FRAMES_IN_FLIGHT as u32)
            .build(gpu)?;

        let global_sets = ubo_buffers
            .iter()
            .map(|buffer| {
                DescriptorWriter::new(&global_layout, &global_pool)
                    .write_buffer(0, buffer.descriptor_info_whole())
                    .build()?
                    .context("Global descriptor pool exhausted")
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        // 3. Per-frame pools, reset at the start of their slot's frame
        let frame_pools = (0..MAX_FRAMES_IN_FLIGHT)
            .map(|_| {
                DescriptorPool::builder()
                    .max_sets(FRAME_POOL_MAX_SETS)
                    .pool_size(vk::DescriptorType::UNIFORM_BUFFER, FRAME_POOL_DESCRIPTORS_PER_TYPE)
                    .pool_size(
                        vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                        FRAME_POOL_DESCRIPTORS_PER_TYPE,
                    )
                    .pool_size(vk::DescriptorType::STORAGE_BUFFER, FRAME_POOL_DESCRIPTORS_PER_TYPE)
                    .flags(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET)
                    .build(gpu)
            })
            .collect::<Result<Vec<_>, _>>()?;

        // 4. Passes
        let render_pass = ctx.renderer.backend().render_pass();
        let samples = ctx.renderer.backend().msaa_samples();
        let shadow = ShadowSystem::new(gpu, &ctx.shader_dir, &ctx.settings.shadow)?;
        let meshes = MeshRenderSystem::new(gpu, render_pass, &global_layout, samples, &ctx.shader_dir)?;
        let lights = PointLightSystem::new(gpu, render_pass, &global_layout, samples, &ctx.shader_dir)?;

        tracing::info!(
            "Render systems ready: {} frame slots, {}x{} shadow map",
            MAX_FRAMES_IN_FLIGHT,
            ctx.settings.shadow.resolution,
            ctx.settings.shadow.resolution
        );

        Ok(Self {
            shadow,
            meshes,
            lights,
            frame_pools,
            global_sets,
            global_pool,
            global_layout,
            ubo_buffers,
        })
    }

    /// Record every pass of the current frame into `cmd`.
    #[cfg_attr(feature = "trace-spans", tracing::instrument(level = "trace", skip_all))]
    pub fn record<A: EmberApp>(
        &self,
        ctx: &mut AppContext,
        app: &mut A,
        cmd: vk::CommandBuffer,
        frame_time: f32,
    ) -> anyhow::Result<()> {
        let slot = ctx.renderer.frame_index();

        // 1. Slot-local descriptors from last time this slot ran are dead
        self.frame_pools[slot].reset()?;

        // 2. Camera and global UBO
        let aspect = ctx.renderer.aspect_ratio();
        ctx.camera.set_perspective_projection(
            ctx.settings.fov_y(),
            aspect,
            ctx.settings.near,
            ctx.settings.far,
        );

        let mut ubo = GlobalUbo {
            ambient_light_color: ctx.settings.ambient(),
            ..GlobalUbo::default()
        };
        ubo.set_camera(&ctx.camera);
        PointLightSystem::update(&ctx.scene, &mut ubo);
        self.ubo_buffers[slot].write(&[ubo])?;
        self.ubo_buffers[slot].flush_all()?;

        let frame = FrameInfo {
            frame_index: slot,
            frame_time,
            command_buffer: cmd,
            camera: &ctx.camera,
            global_descriptor_set: self.global_sets[slot],
            frame_descriptor_pool: &self.frame_pools[slot],
            scene: &ctx.scene,
        };

        // 3. Shadow pass, outside the swapchain render pass
        let light_space = self.shadow.render(&frame);

        // 4. Main pass
        ctx.renderer.begin_swapchain_render_pass(cmd);
        let result = self
            .meshes
            .render(&frame, self.shadow.shadow_map().descriptor_info(), light_space)
            .map_err(anyhow::Error::from)
            .and_then(|()| app.render(&ctx.gpu, &frame));
        if result.is_ok() {
            self.lights.render(&frame);
        }
        ctx.renderer.end_swapchain_render_pass(cmd);

        result
    }

    /// Get the layout of the global set (set 0).
    pub const fn global_layout(&self) -> &DescriptorSetLayout {
        &self.global_layout
    }

    /// Get the long-lived pool the global sets come from.
    pub const fn global_pool(&self) -> &DescriptorPool {
        &self.global_pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_global_set_per_slot() {
        let sizes = global_pool_sizes();
        assert_eq!(sizes.len(), 1);
        assert_eq!(sizes[0], (vk::DescriptorType::UNIFORM_BUFFER, MAX_FRAMES_IN_FLIGHT as u32));
    }
}

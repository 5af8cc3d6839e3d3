//! Point-light billboards.
//!
//! Lights are written into the global UBO before any pass is recorded and
//! drawn last, after opaque geometry, sorted far to near so that alpha
//! blending composes correctly.

use crate::error::Result;
use crate::frame::{FrameInfo, GlobalUbo, PointLightUniform};
use ash::vk;
use bytemuck::{Pod, Zeroable};
use ember_core::constants::MAX_LIGHTS;
use ember_gpu::shader::shader_path;
use ember_gpu::{DescriptorSetLayout, GpuContext, GraphicsPipeline, PipelineConfig, PipelineLayout, ShaderStage};
use ember_scene::{entity_id, Entity, PointLight, Scene, Tint, Transform};
use glam::{Vec3, Vec4};
use std::collections::BTreeMap;
use std::mem::size_of;
use std::path::Path;
use std::sync::Arc;

/// Push constants of one billboard.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct PointLightPushConstants {
    pub position: Vec4,
    pub color: Vec4,
    pub radius: f32,
    _padding: [f32; 3],
}

/// Order `lights` far to near from `camera`.
///
/// Keys are `(squared distance, entity id)`; squared distances are never
/// negative, so their bit patterns sort like the floats themselves.
pub fn back_to_front(camera: Vec3, lights: impl IntoIterator<Item = (Entity, Vec3)>) -> Vec<Entity> {
    let sorted: BTreeMap<(u32, u64), Entity> = lights
        .into_iter()
        .map(|(entity, position)| {
            let distance_sq = camera.distance_squared(position);
            ((distance_sq.to_bits(), entity_id(entity)), entity)
        })
        .collect();
    sorted.into_values().rev().collect()
}

pub struct PointLightSystem {
    ctx: Arc<GpuContext>,
    pipeline: GraphicsPipeline,
    pipeline_layout: PipelineLayout,
}

impl PointLightSystem {
    pub fn new(
        ctx: &Arc<GpuContext>,
        render_pass: vk::RenderPass,
        global_layout: &DescriptorSetLayout,
        samples: vk::SampleCountFlags,
        shader_dir: &Path,
    ) -> Result<Self> {
        let push_range = vk::PushConstantRange::default()
            .stage_flags(vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT)
            .offset(0)
            .size(size_of::<PointLightPushConstants>() as u32);
        let pipeline_layout = PipelineLayout::new(ctx, &[global_layout.handle()], &[push_range])?;

        let mut config = PipelineConfig {
            rasterization_samples: samples,
            ..PipelineConfig::default()
        };
        config.enable_alpha_blending();

        let pipeline = GraphicsPipeline::new(
            ctx,
            &shader_path(shader_dir, "point_light", ShaderStage::Vertex),
            &shader_path(shader_dir, "point_light", ShaderStage::Fragment),
            &config,
            pipeline_layout.handle(),
            render_pass,
        )?;

        Ok(Self {
            ctx: Arc::clone(ctx),
            pipeline,
            pipeline_layout,
        })
    }

    /// Write every point light in `scene` into `ubo`.
    ///
    /// # Panics
    /// If the scene holds more than [`MAX_LIGHTS`] point lights.
    pub fn update(scene: &Scene, ubo: &mut GlobalUbo) {
        let mut count = 0;
        let mut query = scene.world().query::<(&Transform, &PointLight, Option<&Tint>)>();
        for (_, (transform, light, tint)) in query.iter() {
            assert!(count < MAX_LIGHTS, "Point lights exceed maximum specified");
            let color = tint.map_or(Vec3::ONE, |t| t.0);
            ubo.point_lights[count] = PointLightUniform {
                position: transform.translation.extend(1.0),
                color: color.extend(light.intensity),
            };
            count += 1;
        }
        ubo.light_count = count as i32;
    }

    /// Draw the billboards far to near. Must be recorded after opaque
    /// geometry inside the swapchain render pass.
    #[cfg_attr(feature = "trace-spans", tracing::instrument(level = "trace", skip_all))]
    pub fn render(&self, frame: &FrameInfo<'_>) {
        let world = frame.scene.world();
        let lights: Vec<_> = world
            .query::<(&Transform, &PointLight)>()
            .iter()
            .map(|(entity, (transform, _))| (entity, transform.translation))
            .collect();
        if lights.is_empty() {
            return;
        }
        let order = back_to_front(frame.camera.position(), lights);

        let device = self.ctx.device();
        let cmd = frame.command_buffer;
        let layout = self.pipeline_layout.handle();

        self.pipeline.bind(cmd);
        unsafe {
            device.cmd_bind_descriptor_sets(
                cmd,
                vk::PipelineBindPoint::GRAPHICS,
                layout,
                0,
                &[frame.global_descriptor_set],
                &[],
            );
        }

        for entity in order {
            let Ok(mut light) = world.query_one::<(&Transform, &PointLight, Option<&Tint>)>(entity) else {
                continue;
            };
            let Some((transform, point_light, tint)) = light.get() else {
                continue;
            };
            let color = tint.map_or(Vec3::ONE, |t| t.0);
            let push = PointLightPushConstants {
                position: transform.translation.extend(1.0),
                color: color.extend(point_light.intensity),
                radius: transform.scale.x,
                _padding: [0.0; 3],
            };
            unsafe {
                device.cmd_push_constants(
                    cmd,
                    layout,
                    vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
                    0,
                    bytemuck::bytes_of(&push),
                );
                device.cmd_draw(cmd, 6, 1, 0, 0);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_scene::PointLightDesc;

    fn light_scene(positions: &[Vec3]) -> (Scene, Vec<Entity>) {
        let mut scene = Scene::new();
        let entities = positions
            .iter()
            .map(|&p| scene.spawn_point_light(p, PointLightDesc::default()))
            .collect();
        (scene, entities)
    }

    #[test]
    fn update_writes_lights_and_count() {
        let (mut scene, _) = light_scene(&[Vec3::X, Vec3::Y]);
        scene.spawn((Transform::default(),));
        let mut ubo = GlobalUbo::default();

        PointLightSystem::update(&scene, &mut ubo);

        assert_eq!(ubo.light_count, 2);
        let mut positions: Vec<_> = ubo.point_lights[..2].iter().map(|l| l.position).collect();
        positions.sort_by(|a, b| a.x.total_cmp(&b.x));
        assert_eq!(positions, vec![Vec4::new(0.0, 1.0, 0.0, 1.0), Vec4::new(1.0, 0.0, 0.0, 1.0)]);
        assert!(ubo.point_lights[..2].iter().all(|l| l.color == Vec4::new(1.0, 1.0, 1.0, 10.0)));
    }

    #[test]
    fn update_with_no_lights_clears_count() {
        let scene = Scene::new();
        let mut ubo = GlobalUbo {
            light_count: 4,
            ..GlobalUbo::default()
        };
        PointLightSystem::update(&scene, &mut ubo);
        assert_eq!(ubo.light_count, 0);
    }

    #[test]
    fn update_accepts_maximum_lights() {
        let positions: Vec<_> = (0..MAX_LIGHTS).map(|i| Vec3::splat(i as f32)).collect();
        let (scene, _) = light_scene(&positions);
        let mut ubo = GlobalUbo::default();
        PointLightSystem::update(&scene, &mut ubo);
        assert_eq!(ubo.light_count, MAX_LIGHTS as i32);
    }

    #[test]
    #[should_panic(expected = "exceed maximum")]
    fn update_rejects_too_many_lights() {
        let positions: Vec<_> = (0..=MAX_LIGHTS).map(|i| Vec3::splat(i as f32)).collect();
        let (scene, _) = light_scene(&positions);
        PointLightSystem::update(&scene, &mut GlobalUbo::default());
    }

    #[test]
    fn sorts_far_to_near() {
        let (_, entities) = light_scene(&[Vec3::ZERO; 3]);
        let lights = [
            (entities[0], Vec3::new(0.0, 0.0, 1.0)),
            (entities[1], Vec3::new(0.0, 0.0, 5.0)),
            (entities[2], Vec3::new(0.0, 0.0, 3.0)),
        ];
        let order = back_to_front(Vec3::ZERO, lights);
        assert_eq!(order, vec![entities[1], entities[2], entities[0]]);
    }

    #[test]
    fn equidistant_lights_are_all_kept() {
        let (_, entities) = light_scene(&[Vec3::ZERO; 4]);
        let lights = [
            (entities[0], Vec3::X),
            (entities[1], Vec3::NEG_X),
            (entities[2], Vec3::Y),
            (entities[3], Vec3::new(0.0, 0.0, 4.0)),
        ];
        let order = back_to_front(Vec3::ZERO, lights);

        assert_eq!(order.len(), 4);
        assert_eq!(order[0], entities[3]);
        // Ties fall back to descending entity id
        let mut tied = entities[..3].to_vec();
        tied.sort_by_key(|&e| std::cmp::Reverse(entity_id(e)));
        assert_eq!(order[1..], tied[..]);
    }

    #[test]
    fn push_constants_are_std430_sized() {
        assert_eq!(size_of::<PointLightPushConstants>(), 48);
    }
}

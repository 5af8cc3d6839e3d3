//! Per-frame data shared by the render systems.

use crate::camera::Camera;
use ash::vk;
use bytemuck::{Pod, Zeroable};
use ember_core::constants::MAX_LIGHTS;
use ember_gpu::DescriptorPool;
use ember_scene::Scene;
use glam::{Mat4, Vec4};

/// One point light as seen by shaders.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct PointLightUniform {
    /// World position; w is always 1
    pub position: Vec4,
    /// RGB color; w is intensity
    pub color: Vec4,
}

/// Global uniform buffer, bound at set 0 by every pass after the shadow
/// pass. Laid out for std140.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct GlobalUbo {
    pub projection: Mat4,
    pub view: Mat4,
    pub inverse_view: Mat4,
    pub ambient_light_color: Vec4,
    pub point_lights: [PointLightUniform; MAX_LIGHTS],
    pub light_count: i32,
    pub(crate) _padding: [i32; 3],
}

impl Default for GlobalUbo {
    fn default() -> Self {
        Self {
            projection: Mat4::IDENTITY,
            view: Mat4::IDENTITY,
            inverse_view: Mat4::IDENTITY,
            ambient_light_color: Vec4::new(1.0, 1.0, 1.0, 0.2),
            point_lights: [PointLightUniform::default(); MAX_LIGHTS],
            light_count: 0,
            _padding: [0; 3],
        }
    }
}

impl GlobalUbo {
    /// Copy the camera matrices in.
    pub fn set_camera(&mut self, camera: &Camera) {
        self.projection = camera.projection();
        self.view = camera.view();
        self.inverse_view = camera.inverse_view();
    }
}

/// Everything a render system needs while recording one frame.
pub struct FrameInfo<'a> {
    pub frame_index: usize,
    pub frame_time: f32,
    pub command_buffer: vk::CommandBuffer,
    pub camera: &'a Camera,
    pub global_descriptor_set: vk::DescriptorSet,
    /// Pool reset at the start of this slot's frame
    pub frame_descriptor_pool: &'a DescriptorPool,
    pub scene: &'a Scene,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::{align_of, offset_of, size_of};

    #[test]
    fn global_ubo_matches_std140_layout() {
        assert_eq!(offset_of!(GlobalUbo, view), 64);
        assert_eq!(offset_of!(GlobalUbo, inverse_view), 128);
        assert_eq!(offset_of!(GlobalUbo, ambient_light_color), 192);
        assert_eq!(offset_of!(GlobalUbo, point_lights), 208);
        assert_eq!(offset_of!(GlobalUbo, light_count), 208 + 32 * MAX_LIGHTS);
        assert_eq!(size_of::<GlobalUbo>() % 16, 0);
        assert_eq!(size_of::<PointLightUniform>(), 32);
        assert!(align_of::<GlobalUbo>() <= 16);
    }

    #[test]
    fn default_ambient_is_dim_white() {
        let ubo = GlobalUbo::default();
        assert_eq!(ubo.ambient_light_color, Vec4::new(1.0, 1.0, 1.0, 0.2));
        assert_eq!(ubo.light_count, 0);
    }
}

//! Camera and view management.
//!
//! Matrices follow Vulkan conventions: right-handed world with +Y down,
//! depth in `[0, 1]` and the camera looking down +Z.

use ember_core::Transform;
use glam::{Mat3, Mat4, Vec3, Vec4};

/// Camera for rendering.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    projection: Mat4,
    view: Mat4,
    inverse_view: Mat4,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            projection: Mat4::IDENTITY,
            view: Mat4::IDENTITY,
            inverse_view: Mat4::IDENTITY,
        }
    }
}

impl Camera {
    pub fn new() -> Self {
        Self::default()
    }

    /// Orthographic projection onto the given box.
    pub fn set_orthographic_projection(
        &mut self,
        left: f32,
        right: f32,
        top: f32,
        bottom: f32,
        near: f32,
        far: f32,
    ) {
        self.projection = Mat4::from_cols(
            Vec4::new(2.0 / (right - left), 0.0, 0.0, 0.0),
            Vec4::new(0.0, 2.0 / (bottom - top), 0.0, 0.0),
            Vec4::new(0.0, 0.0, 1.0 / (far - near), 0.0),
            Vec4::new(
                -(right + left) / (right - left),
                -(bottom + top) / (bottom - top),
                -near / (far - near),
                1.0,
            ),
        );
    }

    /// Perspective projection with vertical field of view `fov_y` radians.
    ///
    /// # Panics
    /// If `aspect` is zero.
    pub fn set_perspective_projection(&mut self, fov_y: f32, aspect: f32, near: f32, far: f32) {
        assert!(aspect.abs() > f32::EPSILON, "aspect ratio must be nonzero");
        self.projection = Mat4::perspective_lh(fov_y, aspect, near, far);
    }

    /// Look along `direction` from `position`.
    pub fn set_view_direction(&mut self, position: Vec3, direction: Vec3, up: Vec3) {
        let w = direction.normalize();
        let u = w.cross(up).normalize();
        let v = w.cross(u);
        self.set_basis(position, Mat3::from_cols(u, v, w));
    }

    /// Look at `target` from `position`.
    pub fn set_view_target(&mut self, position: Vec3, target: Vec3, up: Vec3) {
        self.set_view_direction(position, target - position, up);
    }

    /// Place the camera at `position` with Tait-Bryan angles applied in
    /// Y, X, Z order, matching [`Transform`].
    pub fn set_view_yxz(&mut self, position: Vec3, rotation: Vec3) {
        let orientation = Transform::default().with_rotation(rotation).mat4();
        self.set_basis(position, Mat3::from_mat4(orientation));
    }

    fn set_basis(&mut self, position: Vec3, basis: Mat3) {
        self.inverse_view = Mat4::from_cols(
            basis.x_axis.extend(0.0),
            basis.y_axis.extend(0.0),
            basis.z_axis.extend(0.0),
            position.extend(1.0),
        );

        let rotation = basis.transpose();
        self.view = Mat4::from_cols(
            rotation.x_axis.extend(0.0),
            rotation.y_axis.extend(0.0),
            rotation.z_axis.extend(0.0),
            (-(rotation * position)).extend(1.0),
        );
    }

    /// Get the projection matrix.
    pub const fn projection(&self) -> Mat4 {
        self.projection
    }

    /// Get the view matrix.
    pub const fn view(&self) -> Mat4 {
        self.view
    }

    /// Get the inverse view matrix.
    pub const fn inverse_view(&self) -> Mat4 {
        self.inverse_view
    }

    /// World-space camera position.
    pub fn position(&self) -> Vec3 {
        self.inverse_view.w_axis.truncate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn view_and_inverse_agree() {
        let mut camera = Camera::new();
        camera.set_view_yxz(Vec3::new(0.0, -1.5, -4.0), Vec3::new(0.3, -0.7, 0.1));

        let product = camera.view() * camera.inverse_view();
        assert!(product.abs_diff_eq(Mat4::IDENTITY, 1e-5));
        assert_relative_eq!(camera.position().y, -1.5);
        assert_relative_eq!(camera.position().z, -4.0);
    }

    #[test]
    fn unrotated_view_is_translation() {
        let mut camera = Camera::new();
        camera.set_view_yxz(Vec3::new(1.0, 2.0, 3.0), Vec3::ZERO);
        assert!(camera
            .view()
            .abs_diff_eq(Mat4::from_translation(Vec3::new(-1.0, -2.0, -3.0)), 1e-6));
    }

    #[test]
    fn view_target_looks_down_positive_z() {
        let mut camera = Camera::new();
        camera.set_view_target(Vec3::new(0.0, 0.0, -5.0), Vec3::ZERO, Vec3::NEG_Y);

        let target_in_view = camera.view().transform_point3(Vec3::ZERO);
        assert_relative_eq!(target_in_view.x, 0.0, epsilon = 1e-6);
        assert_relative_eq!(target_in_view.y, 0.0, epsilon = 1e-6);
        assert_relative_eq!(target_in_view.z, 5.0, epsilon = 1e-6);
    }

    #[test]
    fn perspective_maps_near_and_far_to_unit_depth() {
        let mut camera = Camera::new();
        camera.set_perspective_projection(50f32.to_radians(), 16.0 / 9.0, 0.1, 100.0);

        let near = camera.projection() * Vec4::new(0.0, 0.0, 0.1, 1.0);
        let far = camera.projection() * Vec4::new(0.0, 0.0, 100.0, 1.0);
        assert_relative_eq!(near.z / near.w, 0.0, epsilon = 1e-6);
        assert_relative_eq!(far.z / far.w, 1.0, epsilon = 1e-5);
    }

    #[test]
    fn orthographic_maps_box_to_clip_volume() {
        let mut camera = Camera::new();
        camera.set_orthographic_projection(-2.0, 2.0, -1.0, 1.0, 0.0, 10.0);

        let corner = camera.projection() * Vec4::new(2.0, 1.0, 10.0, 1.0);
        assert_relative_eq!(corner.x, 1.0);
        assert_relative_eq!(corner.y, 1.0);
        assert_relative_eq!(corner.z, 1.0);
    }

    #[test]
    #[should_panic(expected = "nonzero")]
    fn zero_aspect_panics() {
        Camera::new().set_perspective_projection(1.0, 0.0, 0.1, 10.0);
    }
}

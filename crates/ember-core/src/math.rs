//! Math utilities and helpers.

use glam::{Mat3, Mat4, Vec3, Vec4};

/// Translation, scale and Tait-Bryan rotation of an entity.
///
/// Rotation is applied in Y, X, Z order (yaw, pitch, roll), which keeps
/// the camera and the objects it looks at on the same convention.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    /// World-space position
    pub translation: Vec3,
    /// Per-axis scale
    pub scale: Vec3,
    /// Euler angles in radians
    pub rotation: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            translation: Vec3::ZERO,
            scale: Vec3::ONE,
            rotation: Vec3::ZERO,
        }
    }
}

/// Sines and cosines of the three rotation angles.
struct YxzAngles {
    c1: f32,
    s1: f32,
    c2: f32,
    s2: f32,
    c3: f32,
    s3: f32,
}

impl YxzAngles {
    fn new(rotation: Vec3) -> Self {
        let (s1, c1) = rotation.y.sin_cos();
        let (s2, c2) = rotation.x.sin_cos();
        let (s3, c3) = rotation.z.sin_cos();
        Self {
            c1,
            s1,
            c2,
            s2,
            c3,
            s3,
        }
    }

    /// Columns of `Ry * Rx * Rz`.
    fn columns(&self) -> [Vec3; 3] {
        let Self {
            c1,
            s1,
            c2,
            s2,
            c3,
            s3,
        } = *self;
        [
            Vec3::new(c1 * c3 + s1 * s2 * s3, c2 * s3, c1 * s2 * s3 - c3 * s1),
            Vec3::new(c3 * s1 * s2 - c1 * s3, c2 * c3, c1 * c3 * s2 + s1 * s3),
            Vec3::new(c2 * s1, -s2, c1 * c2),
        ]
    }
}

impl Transform {
    /// Create a transform at the given position.
    pub fn from_translation(translation: Vec3) -> Self {
        Self {
            translation,
            ..Self::default()
        }
    }

    /// Builder-style scale setter.
    #[must_use]
    pub const fn with_scale(mut self, scale: Vec3) -> Self {
        self.scale = scale;
        self
    }

    /// Builder-style rotation setter.
    #[must_use]
    pub const fn with_rotation(mut self, rotation: Vec3) -> Self {
        self.rotation = rotation;
        self
    }

    /// Model matrix: `translate * Ry * Rx * Rz * scale`.
    pub fn mat4(&self) -> Mat4 {
        let [x, y, z] = YxzAngles::new(self.rotation).columns();
        Mat4::from_cols(
            (x * self.scale.x).extend(0.0),
            (y * self.scale.y).extend(0.0),
            (z * self.scale.z).extend(0.0),
            Vec4::new(self.translation.x, self.translation.y, self.translation.z, 1.0),
        )
    }

    /// Matrix for transforming normals: rotation with inverse scale.
    pub fn normal_matrix(&self) -> Mat3 {
        let [x, y, z] = YxzAngles::new(self.rotation).columns();
        let inv_scale = self.scale.recip();
        Mat3::from_cols(x * inv_scale.x, y * inv_scale.y, z * inv_scale.z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn identity_transform() {
        let t = Transform::default();
        assert!(t.mat4().abs_diff_eq(Mat4::IDENTITY, 1e-6));
        assert!(t.normal_matrix().abs_diff_eq(Mat3::IDENTITY, 1e-6));
    }

    #[test]
    fn mat4_matches_composed_rotations() {
        let t = Transform::from_translation(Vec3::new(1.0, -2.0, 3.0))
            .with_scale(Vec3::new(2.0, 0.5, 1.5))
            .with_rotation(Vec3::new(0.3, -1.1, 0.7));

        let expected = Mat4::from_translation(t.translation)
            * Mat4::from_rotation_y(t.rotation.y)
            * Mat4::from_rotation_x(t.rotation.x)
            * Mat4::from_rotation_z(t.rotation.z)
            * Mat4::from_scale(t.scale);

        assert!(t.mat4().abs_diff_eq(expected, 1e-5));
    }

    #[test]
    fn normal_matrix_is_inverse_transpose() {
        let t = Transform::default()
            .with_scale(Vec3::new(3.0, 1.0, 0.25))
            .with_rotation(Vec3::new(-0.4, 0.9, 0.2));

        let expected = Mat3::from_mat4(t.mat4()).inverse().transpose();
        assert!(t.normal_matrix().abs_diff_eq(expected, 1e-4));
    }

    #[test]
    fn translation_ends_up_in_last_column() {
        let t = Transform::from_translation(Vec3::new(4.0, 5.0, 6.0));
        let p = t.mat4().transform_point3(Vec3::ZERO);
        assert_relative_eq!(p.x, 4.0);
        assert_relative_eq!(p.y, 5.0);
        assert_relative_eq!(p.z, 6.0);
    }
}

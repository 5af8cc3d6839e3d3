//! Serializable render settings.
//!
//! Defaults reproduce the stock look of the renderer: a 4096² shadow map
//! lit from (2, -2, -2) toward the origin, a near-black clear colour and a
//! dim white ambient term. Settings can be loaded from a TOML file; any
//! field left out keeps its default.

use crate::error::{Error, Result};
use glam::{Mat4, Vec3, Vec4};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Settings for the directional shadow pass.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShadowSettings {
    /// Width and height of the square shadow map in texels
    pub resolution: u32,
    /// Constant depth bias factor
    pub depth_bias_constant: f32,
    /// Depth bias clamp
    pub depth_bias_clamp: f32,
    /// Slope-scaled depth bias factor
    pub depth_bias_slope: f32,
    /// Position of the light
    pub light_position: [f32; 3],
    /// Point the light looks at
    pub light_target: [f32; 3],
    /// Up vector of the light view
    pub light_up: [f32; 3],
    /// Orthographic half-extent of the light volume on X and Y
    pub ortho_half_extent: f32,
    /// Near plane of the light volume
    pub near: f32,
    /// Far plane of the light volume
    pub far: f32,
}

impl Default for ShadowSettings {
    fn default() -> Self {
        Self {
            resolution: 4096,
            depth_bias_constant: 1.25,
            depth_bias_clamp: 0.0,
            depth_bias_slope: 1.75,
            light_position: [2.0, -2.0, -2.0],
            light_target: [0.0, 0.0, 0.0],
            light_up: [0.0, 1.0, 0.0],
            ortho_half_extent: 10.0,
            near: 0.1,
            far: 7.5,
        }
    }
}

impl ShadowSettings {
    /// Light-space (projection * view) matrix for these settings.
    ///
    /// Pure function of the settings: identical inputs always produce
    /// bit-identical matrices.
    pub fn light_space_matrix(&self) -> Mat4 {
        let e = self.ortho_half_extent;
        let projection = Mat4::orthographic_rh(-e, e, -e, e, self.near, self.far);
        let view = Mat4::look_at_rh(
            Vec3::from(self.light_position),
            Vec3::from(self.light_target),
            Vec3::from(self.light_up),
        );
        projection * view
    }

    /// Check that the settings describe a usable shadow volume.
    pub fn validate(&self) -> Result<()> {
        if self.resolution == 0 {
            return Err(Error::InvalidSetting {
                name: "shadow.resolution",
                reason: "must be nonzero".to_string(),
            });
        }
        if self.ortho_half_extent <= 0.0 {
            return Err(Error::InvalidSetting {
                name: "shadow.ortho_half_extent",
                reason: format!("must be positive, got {}", self.ortho_half_extent),
            });
        }
        if self.near >= self.far {
            return Err(Error::InvalidSetting {
                name: "shadow.near",
                reason: format!("near ({}) must be below far ({})", self.near, self.far),
            });
        }
        if Vec3::from(self.light_position) == Vec3::from(self.light_target) {
            return Err(Error::InvalidSetting {
                name: "shadow.light_position",
                reason: "light position and target coincide".to_string(),
            });
        }
        Ok(())
    }
}

/// Top-level render settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderSettings {
    /// Colour the swapchain pass clears to (RGBA)
    pub clear_color: [f32; 4],
    /// Ambient light colour (RGB) and intensity (A)
    pub ambient_light: [f32; 4],
    /// Vertical field of view in degrees
    pub fov_y_degrees: f32,
    /// Near clip plane of the camera
    pub near: f32,
    /// Far clip plane of the camera
    pub far: f32,
    /// Longest frame delta fed to the simulation, in seconds
    pub max_frame_time: f32,
    /// Shadow pass settings
    pub shadow: ShadowSettings,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            clear_color: [0.01, 0.01, 0.01, 1.0],
            ambient_light: [1.0, 1.0, 1.0, 0.2],
            fov_y_degrees: 50.0,
            near: 0.1,
            far: 100.0,
            max_frame_time: 0.1,
            shadow: ShadowSettings::default(),
        }
    }
}

impl RenderSettings {
    /// Load settings from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Parse and validate settings from TOML text.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let settings: Self = toml::from_str(contents).map_err(|e| Error::Parse(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Check every field for values the renderer cannot work with.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..180.0).contains(&self.fov_y_degrees) || self.fov_y_degrees == 0.0 {
            return Err(Error::InvalidSetting {
                name: "fov_y_degrees",
                reason: format!("must be in (0, 180), got {}", self.fov_y_degrees),
            });
        }
        if self.near <= 0.0 || self.near >= self.far {
            return Err(Error::InvalidSetting {
                name: "near",
                reason: format!("need 0 < near < far, got {}..{}", self.near, self.far),
            });
        }
        if self.max_frame_time <= 0.0 {
            return Err(Error::InvalidSetting {
                name: "max_frame_time",
                reason: "must be positive".to_string(),
            });
        }
        self.shadow.validate()
    }

    /// Ambient light as a vector.
    pub fn ambient(&self) -> Vec4 {
        Vec4::from(self.ambient_light)
    }

    /// Vertical field of view in radians.
    pub fn fov_y(&self) -> f32 {
        self.fov_y_degrees.to_radians()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn defaults_are_valid() {
        let settings = RenderSettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.shadow.resolution, 4096);
        assert_relative_eq!(settings.shadow.depth_bias_constant, 1.25);
        assert_relative_eq!(settings.shadow.depth_bias_slope, 1.75);
    }

    #[test]
    fn light_space_matrix_is_deterministic() {
        let shadow = ShadowSettings::default();
        let a = shadow.light_space_matrix();
        let b = shadow.light_space_matrix();
        assert_eq!(a.to_cols_array(), b.to_cols_array());
    }

    #[test]
    fn light_space_matrix_maps_target_into_volume() {
        let shadow = ShadowSettings::default();
        let clip = shadow.light_space_matrix() * Vec4::new(0.0, 0.0, 0.0, 1.0);
        // The origin sits ~3.46 units from the light, inside the 0.1..7.5 range.
        assert_relative_eq!(clip.x, 0.0, epsilon = 1e-5);
        assert_relative_eq!(clip.y, 0.0, epsilon = 1e-5);
        assert!(clip.z > 0.0 && clip.z < 1.0);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let settings = RenderSettings::from_toml(
            r"
            fov_y_degrees = 70.0

            [shadow]
            resolution = 2048
            ",
        )
        .unwrap();
        assert_relative_eq!(settings.fov_y_degrees, 70.0);
        assert_eq!(settings.shadow.resolution, 2048);
        assert_relative_eq!(settings.shadow.far, 7.5);
        assert_eq!(settings.clear_color, [0.01, 0.01, 0.01, 1.0]);
    }

    #[test]
    fn rejects_inverted_shadow_volume() {
        let result = RenderSettings::from_toml(
            r"
            [shadow]
            near = 8.0
            far = 1.0
            ",
        );
        assert!(matches!(
            result,
            Err(Error::InvalidSetting { name: "shadow.near", .. })
        ));
    }

    #[test]
    fn rejects_malformed_toml() {
        assert!(matches!(
            RenderSettings::from_toml("fov_y_degrees = ["),
            Err(Error::Parse(_))
        ));
    }
}

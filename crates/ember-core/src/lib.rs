//! Core types, math, and settings for the Ember renderer.
//!
//! This crate provides the foundational types used throughout the engine:
//! - Entity transforms with Tait-Bryan (YXZ) rotation
//! - Serializable render and shadow settings
//! - Engine-wide constants and error types

pub mod error;
pub mod math;
pub mod settings;

pub use error::{Error, Result};
pub use math::Transform;
pub use settings::{RenderSettings, ShadowSettings};

/// Engine-wide constants
pub mod constants {
    /// Number of frames the CPU may record ahead of the GPU
    pub const MAX_FRAMES_IN_FLIGHT: usize = 2;
    /// Maximum number of point lights in the global uniform buffer
    pub const MAX_LIGHTS: usize = 10;
}

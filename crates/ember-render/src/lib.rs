//! Frame orchestration and render passes for the Ember renderer.
//!
//! This crate provides:
//! - The frame orchestrator cycling command buffers across frames in flight
//! - Shadow map and depth-only shadow pass
//! - Main forward pass with per-entity texture descriptors
//! - Back-to-front point-light billboards
//! - Mesh and texture upload
//! - Camera and view management

pub mod camera;
pub mod error;
pub mod frame;
pub mod mesh;
pub mod mesh_system;
pub mod point_light;
pub mod renderer;
pub mod shadow;
pub mod texture;

pub use camera::Camera;
pub use error::{RenderError, Result};
pub use frame::{FrameInfo, GlobalUbo, PointLightUniform};
pub use mesh::{Mesh, MeshBuilder, MeshHandle, Vertex};
pub use mesh_system::{MeshPushConstants, MeshRenderSystem};
pub use point_light::{PointLightPushConstants, PointLightSystem};
pub use renderer::{FrameBackend, FrameState, Renderer};
pub use shadow::{ShadowMap, ShadowSystem};
pub use texture::{Texture, TextureHandle};

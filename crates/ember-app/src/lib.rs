//! Application framework for the Ember renderer.
//!
//! This crate provides a trait-based application framework that handles
//! common boilerplate like:
//! - Window creation and resize tracking
//! - GPU context, swapchain and frame orchestration
//! - Global uniform buffers and per-frame descriptor pools
//! - The shadow, main and point-light passes
//! - Event loop handling
//!
//! Applications fill the [`Scene`] and steer the [`Camera`]; everything
//! between acquiring a swapchain image and presenting it is done here.
//!
//! # Example
//!
//! ```no_run
//! use ember_app::{run_app, AppConfig, AppContext, EmberApp};
//!
//! struct MyApp;
//!
//! impl EmberApp for MyApp {
//!     fn init(ctx: &mut AppContext) -> anyhow::Result<Self> {
//!         Ok(MyApp)
//!     }
//!
//!     fn update(&mut self, ctx: &mut AppContext, dt: f32) {
//!         // Move the camera, animate the scene
//!     }
//! }
//!
//! fn main() -> anyhow::Result<()> {
//!     run_app::<MyApp>(AppConfig::default())
//! }
//! ```

mod app;
mod context;
mod runner;
mod systems;

pub use app::EmberApp;
pub use context::AppContext;
pub use runner::{run_app, AppConfig, FpsStats};
pub use systems::{global_pool_sizes, RenderSystems, FRAME_POOL_MAX_SETS};

// Re-export commonly used types for convenience
pub use ember_core::RenderSettings;
pub use ember_gpu::{GpuContext, GpuContextBuilder};
pub use ember_render::{Camera, FrameInfo, Mesh, MeshBuilder, MeshHandle, Texture, TextureHandle};
pub use ember_scene::{Scene, Transform};
pub use winit::event::WindowEvent;

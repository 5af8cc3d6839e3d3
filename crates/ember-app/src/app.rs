//! `EmberApp` trait definition.

use crate::context::AppContext;
use ember_gpu::GpuContext;
use ember_render::FrameInfo;
use std::sync::Arc;
use winit::event::WindowEvent;

/// Trait for Ember applications.
///
/// The framework owns the window, the GPU context, the frame orchestrator
/// and the render passes. An application populates [`AppContext::scene`],
/// positions [`AppContext::camera`] and reacts to events.
pub trait EmberApp: Sized {
    /// Initialize the application.
    ///
    /// Called once after the window, GPU context and render passes exist.
    fn init(ctx: &mut AppContext) -> anyhow::Result<Self>;

    /// Update application state.
    ///
    /// Called every frame before recording. `dt` is clamped to
    /// [`RenderSettings::max_frame_time`](ember_core::RenderSettings::max_frame_time).
    fn update(&mut self, ctx: &mut AppContext, dt: f32);

    /// Record extra draws into the main pass.
    ///
    /// Called inside the swapchain render pass after scene meshes and
    /// before the alpha-blended point lights.
    ///
    /// Default implementation records nothing.
    #[allow(unused_variables)]
    fn render(&mut self, gpu: &Arc<GpuContext>, frame: &FrameInfo<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    /// Handle a swapchain recreation.
    ///
    /// Called after the framework rebuilt the swapchain at the new size.
    ///
    /// Default implementation does nothing.
    #[allow(unused_variables)]
    fn on_resize(&mut self, ctx: &mut AppContext, width: u32, height: u32) -> anyhow::Result<()> {
        Ok(())
    }

    /// Handle window events.
    ///
    /// Return `true` if the event was handled and should not be processed
    /// further.
    ///
    /// Default implementation does nothing and returns `false`.
    #[allow(unused_variables)]
    fn on_event(&mut self, ctx: &mut AppContext, event: &WindowEvent) -> bool {
        false
    }

    /// Cleanup resources before shutdown.
    ///
    /// The GPU is idle when this is called.
    ///
    /// Default implementation does nothing.
    #[allow(unused_variables)]
    fn cleanup(&mut self, ctx: &mut AppContext) {}
}

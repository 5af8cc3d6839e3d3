//! Application context.

use ash::vk;
use ember_core::RenderSettings;
use ember_gpu::{GpuContext, SwapchainManager};
use ember_platform::WindowSurface;
use ember_render::{Camera, Renderer};
use ember_scene::Scene;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

/// Application context shared across all app methods.
pub struct AppContext {
    /// Scene drawn every frame.
    pub scene: Scene,
    /// Camera the main pass renders from. The framework sets its
    /// projection each frame; the application owns its view.
    pub camera: Camera,
    /// Settings the passes read their constants from.
    pub settings: RenderSettings,
    /// Directory holding the compiled SPIR-V shaders.
    pub shader_dir: PathBuf,
    /// Frame orchestrator.
    pub renderer: Renderer<SwapchainManager>,
    /// GPU context with device and queues.
    pub gpu: Arc<GpuContext>,
    /// The window.
    pub surface: WindowSurface,
    /// Total frames submitted.
    pub frame_count: u64,
    pub(crate) last_frame_time: Instant,
}

impl AppContext {
    pub(crate) fn new(
        surface: WindowSurface,
        gpu: Arc<GpuContext>,
        settings: RenderSettings,
        shader_dir: PathBuf,
        vsync: bool,
    ) -> anyhow::Result<Self> {
        let size = surface.window().inner_size();
        let extent = vk::Extent2D {
            width: size.width.max(1),
            height: size.height.max(1),
        };

        let swapchain = SwapchainManager::new(&gpu, extent, vsync)?;
        let mut renderer = Renderer::new(swapchain)?;
        renderer.set_clear_color(settings.clear_color);

        Ok(Self {
            scene: Scene::new(),
            camera: Camera::new(),
            settings,
            shader_dir,
            renderer,
            gpu,
            surface,
            frame_count: 0,
            last_frame_time: Instant::now(),
        })
    }

    /// Get the current swapchain extent.
    pub fn extent(&self) -> vk::Extent2D {
        self.renderer.backend().extent()
    }

    /// Get the aspect ratio (width / height).
    pub fn aspect_ratio(&self) -> f32 {
        self.renderer.aspect_ratio()
    }
}

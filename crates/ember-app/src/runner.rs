//! Application runner and event loop.

use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use ember_core::RenderSettings;
use ember_gpu::GpuContextBuilder;
use ember_platform::{PlatformError, WindowConfig, WindowSurface};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::WindowId;

use crate::app::EmberApp;
use crate::context::AppContext;
use crate::systems::RenderSystems;

/// Application configuration.
#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Window title.
    pub title: String,
    /// Initial window width.
    pub width: u32,
    /// Initial window height.
    pub height: u32,
    /// Target frames per second (None for unlimited).
    pub target_fps: Option<u32>,
    /// Enable vsync.
    pub vsync: bool,
    /// Enable Vulkan validation layers (default: debug builds only).
    pub validation: bool,
    /// Directory with the compiled `.vert.spv`/`.frag.spv` shaders
    /// (default: the ones built into `ember-shaders`).
    pub shader_dir: PathBuf,
    /// Render settings.
    pub settings: RenderSettings,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            title: "Ember".to_string(),
            width: 1280,
            height: 720,
            target_fps: None,
            vsync: true,
            validation: cfg!(debug_assertions),
            shader_dir: ember_shaders::shader_dir().to_path_buf(),
            settings: RenderSettings::default(),
        }
    }
}

impl AppConfig {
    /// Create a new config with the given title.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    /// Set the window dimensions.
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Set the target FPS.
    pub fn with_target_fps(mut self, fps: u32) -> Self {
        self.target_fps = Some(fps);
        self
    }

    /// Enable or disable vsync.
    pub fn with_vsync(mut self, vsync: bool) -> Self {
        self.vsync = vsync;
        self
    }

    /// Enable or disable validation layers.
    pub fn with_validation(mut self, validation: bool) -> Self {
        self.validation = validation;
        self
    }

    /// Set the shader directory.
    pub fn with_shader_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.shader_dir = dir.into();
        self
    }

    /// Set the render settings.
    pub fn with_settings(mut self, settings: RenderSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Frame budget implied by `target_fps`.
    pub fn target_frame_time(&self) -> Option<Duration> {
        self.target_fps
            .filter(|&fps| fps > 0)
            .map(|fps| Duration::from_nanos(1_000_000_000 / u64::from(fps)))
    }

    fn window_config(&self) -> WindowConfig {
        WindowConfig {
            title: self.title.clone(),
            width: self.width,
            height: self.height,
            ..WindowConfig::default()
        }
    }
}

/// Min/max/average frame rate over a run.
#[derive(Debug, Clone, Copy)]
pub struct FpsStats {
    min: f64,
    max: f64,
    sum: f64,
    samples: u64,
}

impl Default for FpsStats {
    fn default() -> Self {
        Self {
            min: f64::MAX,
            max: 0.0,
            sum: 0.0,
            samples: 0,
        }
    }
}

impl FpsStats {
    /// Record one frame that took `dt` seconds. Zero-length frames are
    /// ignored.
    pub fn record(&mut self, dt: f32) {
        if dt <= 0.0 {
            return;
        }
        let fps = 1.0 / f64::from(dt);
        self.min = self.min.min(fps);
        self.max = self.max.max(fps);
        self.sum += fps;
        self.samples += 1;
    }

    pub fn min(&self) -> Option<f64> {
        (self.samples > 0).then_some(self.min)
    }

    pub fn max(&self) -> Option<f64> {
        (self.samples > 0).then_some(self.max)
    }

    pub fn average(&self) -> Option<f64> {
        (self.samples > 0).then(|| self.sum / self.samples as f64)
    }

    pub const fn samples(&self) -> u64 {
        self.samples
    }
}

/// Run an EmberApp with the given configuration.
///
/// Initializes logging, creates the window, GPU context and render passes,
/// and runs the event loop until the window closes. A fatal frame error
/// stops the loop and is returned.
pub fn run_app<A: EmberApp + 'static>(config: AppConfig) -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    config.settings.validate()?;

    info!("{} starting...", config.title);

    let event_loop = EventLoop::new().map_err(|e| PlatformError::EventLoop(e.to_string()))?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut runner = AppRunner::<A> {
        config,
        state: None,
        fatal: None,
    };

    event_loop
        .run_app(&mut runner)
        .map_err(|e| PlatformError::EventLoop(e.to_string()))?;

    runner.fatal.map_or(Ok(()), Err)
}

/// Internal application runner that implements winit's ApplicationHandler.
struct AppRunner<A: EmberApp> {
    config: AppConfig,
    state: Option<AppState<A>>,
    fatal: Option<anyhow::Error>,
}

/// Internal application state. Fields drop in declaration order: the
/// application, then the passes, then the context they were built on.
struct AppState<A: EmberApp> {
    app: A,
    systems: RenderSystems,
    ctx: AppContext,
    target_frame_time: Option<Duration>,
    fps: FpsStats,
}

impl<A: EmberApp + 'static> ApplicationHandler for AppRunner<A> {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.state.is_some() {
            return;
        }

        info!("Creating application state...");

        match self.create_state(event_loop) {
            Ok(state) => {
                self.state = Some(state);
                info!("Application ready!");
            }
            Err(e) => {
                error!("Failed to initialize application: {e:#}");
                self.fatal = Some(e);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        let Some(state) = &mut self.state else {
            return;
        };

        // Let the app handle the event first
        if state.app.on_event(&mut state.ctx, &event) {
            return;
        }

        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested");
                self.shutdown(event_loop);
            }
            WindowEvent::RedrawRequested => {
                if let Err(e) = state.render_frame() {
                    error!("Render error: {e:#}");
                    self.fatal = Some(e);
                    self.shutdown(event_loop);
                }
            }
            WindowEvent::Resized(size) => {
                state.ctx.surface.notify_resized();
                if size.width > 0 && size.height > 0 {
                    event_loop.set_control_flow(ControlFlow::Poll);
                    state.ctx.surface.request_redraw();
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        let Some(state) = &self.state else {
            return;
        };

        // Minimized: only pump events until the window has an area again
        if state.ctx.renderer.is_recreate_pending() {
            event_loop.set_control_flow(ControlFlow::Wait);
        } else {
            event_loop.set_control_flow(ControlFlow::Poll);
            state.ctx.surface.request_redraw();
        }
    }
}

impl<A: EmberApp + 'static> AppRunner<A> {
    fn create_state(&self, event_loop: &ActiveEventLoop) -> anyhow::Result<AppState<A>> {
        let surface = WindowSurface::create(event_loop, &self.config.window_config())?;

        let gpu = GpuContextBuilder::new()
            .app_name(&self.config.title)
            .validation(self.config.validation)
            .build(&surface)?;

        info!("GPU: {}", gpu.capabilities().summary());

        let mut ctx = AppContext::new(
            surface,
            gpu,
            self.config.settings.clone(),
            self.config.shader_dir.clone(),
            self.config.vsync,
        )?;
        let systems = RenderSystems::new(&ctx)?;
        let app = A::init(&mut ctx)?;

        Ok(AppState {
            app,
            systems,
            ctx,
            target_frame_time: self.config.target_frame_time(),
            fps: FpsStats::default(),
        })
    }

    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        if let Some(mut state) = self.state.take() {
            state.cleanup();
        }
        event_loop.exit();
    }
}

impl<A: EmberApp> AppState<A> {
    fn render_frame(&mut self) -> anyhow::Result<()> {
        let frame_start = Instant::now();

        // Calculate delta time
        let raw_dt = frame_start
            .duration_since(self.ctx.last_frame_time)
            .as_secs_f32();
        self.ctx.last_frame_time = frame_start;
        self.fps.record(raw_dt);
        let dt = raw_dt.min(self.ctx.settings.max_frame_time);

        self.app.update(&mut self.ctx, dt);

        let recreations = self.ctx.renderer.recreation_count();
        if let Some(cmd) = self.ctx.renderer.begin_frame(&self.ctx.surface)? {
            self.systems.record(&mut self.ctx, &mut self.app, cmd, dt)?;
            self.ctx.renderer.end_frame(&self.ctx.surface)?;
            self.ctx.frame_count += 1;
        }

        if self.ctx.renderer.recreation_count() != recreations {
            let extent = self.ctx.extent();
            info!("Resized to {}x{}", extent.width, extent.height);
            self.app.on_resize(&mut self.ctx, extent.width, extent.height)?;
        }

        // Frame pacing
        if let Some(target) = self.target_frame_time {
            let elapsed = frame_start.elapsed();
            if elapsed < target {
                thread::sleep(target - elapsed);
            }
        }

        Ok(())
    }

    fn cleanup(&mut self) {
        if let (Some(min), Some(max), Some(avg)) = (self.fps.min(), self.fps.max(), self.fps.average()) {
            info!("FPS Statistics:");
            info!("  Min: {min:.1}");
            info!("  Max: {max:.1}");
            info!("  Avg: {avg:.1}");
            info!("  Total frames: {}", self.ctx.frame_count);
        }

        info!("Starting cleanup...");
        if let Err(e) = self.ctx.gpu.wait_idle() {
            error!("Failed to wait idle: {e}");
        }

        self.app.cleanup(&mut self.ctx);
        info!("Cleanup complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn config_builders() {
        let config = AppConfig::new("Test")
            .with_size(800, 600)
            .with_target_fps(60)
            .with_vsync(false)
            .with_validation(true)
            .with_shader_dir("assets/shaders");

        assert_eq!(config.title, "Test");
        assert_eq!((config.width, config.height), (800, 600));
        assert!(!config.vsync);
        assert!(config.validation);
        assert_eq!(config.shader_dir, PathBuf::from("assets/shaders"));
        assert_eq!(config.target_frame_time(), Some(Duration::from_nanos(16_666_666)));
    }

    #[test]
    fn unlimited_fps_has_no_frame_budget() {
        assert_eq!(AppConfig::default().target_frame_time(), None);
        assert_eq!(AppConfig::default().with_target_fps(0).target_frame_time(), None);
    }

    #[test]
    fn window_config_follows_app_config() {
        let window = AppConfig::new("Viewer").with_size(640, 480).window_config();
        assert_eq!(window.title, "Viewer");
        assert_eq!((window.width, window.height), (640, 480));
        assert!(window.resizable);
    }

    #[test]
    fn fps_stats() {
        let mut stats = FpsStats::default();
        assert_eq!(stats.average(), None);

        stats.record(0.5);
        stats.record(0.25);
        stats.record(0.0);

        assert_eq!(stats.samples(), 2);
        assert_relative_eq!(stats.min().unwrap(), 2.0);
        assert_relative_eq!(stats.max().unwrap(), 4.0);
        assert_relative_eq!(stats.average().unwrap(), 3.0);
    }
}

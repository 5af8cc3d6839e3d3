//! Platform abstraction for the Ember renderer.
//!
//! Provides window creation via winit and the [`SurfaceProvider`] contract
//! the frame orchestrator uses to learn the drawable size and whether the
//! window was resized since it last asked.

use raw_window_handle::{
    DisplayHandle, HandleError, HasDisplayHandle, HasWindowHandle, WindowHandle,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use winit::event_loop::ActiveEventLoop;
use winit::window::Window;

#[derive(Error, Debug)]
pub enum PlatformError {
    #[error("Window creation failed: {0}")]
    WindowCreation(String),
    #[error("Event loop error: {0}")]
    EventLoop(String),
}

pub type Result<T> = std::result::Result<T, PlatformError>;

/// Window configuration.
#[derive(Debug, Clone)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub resizable: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Ember".to_string(),
            width: 1280,
            height: 720,
            resizable: true,
        }
    }
}

/// Source of the drawable extent and resize notifications.
pub trait SurfaceProvider {
    /// Current drawable size in pixels. Zero while minimized.
    fn extent(&self) -> (u32, u32);

    /// Whether the window was resized since the last call. Clears the flag.
    fn take_resized(&self) -> bool;
}

/// A flag set from the event loop and cleared by the reader.
#[derive(Debug, Default)]
pub struct ResizeLatch(AtomicBool);

impl ResizeLatch {
    pub const fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    /// Record a resize.
    pub fn set(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Read and clear.
    pub fn take(&self) -> bool {
        self.0.swap(false, Ordering::AcqRel)
    }

    /// Read without clearing.
    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// A winit window acting as the render surface.
pub struct WindowSurface {
    window: Arc<Window>,
    resized: ResizeLatch,
}

impl WindowSurface {
    /// Create a window on `event_loop`.
    pub fn create(event_loop: &ActiveEventLoop, config: &WindowConfig) -> Result<Self> {
        let attributes = Window::default_attributes()
            .with_title(config.title.clone())
            .with_inner_size(winit::dpi::PhysicalSize::new(config.width, config.height))
            .with_resizable(config.resizable);

        let window = event_loop
            .create_window(attributes)
            .map_err(|e| PlatformError::WindowCreation(e.to_string()))?;

        tracing::info!(
            "Window created: {} ({}x{})",
            config.title,
            config.width,
            config.height
        );

        Ok(Self::new(Arc::new(window)))
    }

    /// Wrap an existing window.
    pub const fn new(window: Arc<Window>) -> Self {
        Self {
            window,
            resized: ResizeLatch::new(),
        }
    }

    /// Get the window.
    pub const fn window(&self) -> &Arc<Window> {
        &self.window
    }

    /// Record a resize event.
    pub fn notify_resized(&self) {
        self.resized.set();
    }

    /// Ask the window for another frame.
    pub fn request_redraw(&self) {
        self.window.request_redraw();
    }
}

impl SurfaceProvider for WindowSurface {
    fn extent(&self) -> (u32, u32) {
        let size = self.window.inner_size();
        (size.width, size.height)
    }

    fn take_resized(&self) -> bool {
        self.resized.take()
    }
}

impl HasWindowHandle for WindowSurface {
    fn window_handle(&self) -> std::result::Result<WindowHandle<'_>, HandleError> {
        self.window.window_handle()
    }
}

impl HasDisplayHandle for WindowSurface {
    fn display_handle(&self) -> std::result::Result<DisplayHandle<'_>, HandleError> {
        self.window.display_handle()
    }
}

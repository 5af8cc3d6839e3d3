//! Surface management for windowed rendering.
//!
//! Wraps the Vulkan surface and its extension loader, hiding the
//! raw-window-handle plumbing from application code.

use crate::error::{GpuError, Result};
use crate::swapchain::{select_present_mode, select_surface_format};
use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

/// A presentable surface and the loader used to query it.
pub struct SurfaceSupport {
    /// The Vulkan surface handle.
    pub surface: vk::SurfaceKHR,
    /// Surface extension loader.
    pub loader: ash::khr::surface::Instance,
}

impl SurfaceSupport {
    /// Create a surface for a window.
    ///
    /// # Safety
    /// The instance must have been created with the window's required
    /// extensions, and the window must outlive the surface.
    pub unsafe fn new<W>(entry: &ash::Entry, instance: &ash::Instance, window: &W) -> Result<Self>
    where
        W: HasDisplayHandle + HasWindowHandle,
    {
        let display = window
            .display_handle()
            .map_err(|e| GpuError::SurfaceCreation(format!("Failed to get display handle: {e}")))?;
        let window_handle = window
            .window_handle()
            .map_err(|e| GpuError::SurfaceCreation(format!("Failed to get window handle: {e}")))?;

        let surface = unsafe {
            ash_window::create_surface(
                entry,
                instance,
                display.as_raw(),
                window_handle.as_raw(),
                None,
            )
        }
        .map_err(|e| GpuError::SurfaceCreation(e.to_string()))?;

        let loader = ash::khr::surface::Instance::new(entry, instance);

        Ok(Self { surface, loader })
    }

    /// Whether a queue family of the device can present to this surface.
    pub fn supports_present(&self, physical_device: vk::PhysicalDevice, family: u32) -> bool {
        unsafe {
            self.loader
                .get_physical_device_surface_support(physical_device, family, self.surface)
        }
        .unwrap_or(false)
    }

    /// Query surface capabilities, formats and present modes.
    pub fn capabilities(&self, physical_device: vk::PhysicalDevice) -> Result<SurfaceCapabilities> {
        unsafe {
            let capabilities = self
                .loader
                .get_physical_device_surface_capabilities(physical_device, self.surface)?;

            let formats = self
                .loader
                .get_physical_device_surface_formats(physical_device, self.surface)?;

            let present_modes = self
                .loader
                .get_physical_device_surface_present_modes(physical_device, self.surface)?;

            Ok(SurfaceCapabilities {
                capabilities,
                formats,
                present_modes,
            })
        }
    }

    /// Destroy the surface.
    ///
    /// # Safety
    /// No swapchain may still reference the surface.
    pub unsafe fn destroy(&self) {
        unsafe { self.loader.destroy_surface(self.surface, None) };
    }
}

/// Surface capabilities query result.
pub struct SurfaceCapabilities {
    /// Raw surface capabilities.
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    /// Supported surface formats.
    pub formats: Vec<vk::SurfaceFormatKHR>,
    /// Supported present modes.
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SurfaceCapabilities {
    /// Get the recommended surface format.
    pub fn recommended_format(&self) -> Result<vk::SurfaceFormatKHR> {
        select_surface_format(&self.formats)
            .ok_or_else(|| GpuError::SwapchainCreation("surface reports no formats".to_string()))
    }

    /// Get the recommended present mode.
    pub fn recommended_present_mode(&self, vsync: bool) -> vk::PresentModeKHR {
        select_present_mode(&self.present_modes, vsync)
    }
}

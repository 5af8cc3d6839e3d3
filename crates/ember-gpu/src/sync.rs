//! Synchronization primitives.

use crate::error::Result;
use ash::vk;

/// Create a semaphore.
///
/// # Safety
/// The device must be valid.
pub unsafe fn create_semaphore(device: &ash::Device) -> Result<vk::Semaphore> {
    let create_info = vk::SemaphoreCreateInfo::default();
    let semaphore = unsafe { device.create_semaphore(&create_info, None)? };
    Ok(semaphore)
}

/// Create a fence.
///
/// # Safety
/// The device must be valid.
pub unsafe fn create_fence(device: &ash::Device, signaled: bool) -> Result<vk::Fence> {
    let flags = if signaled {
        vk::FenceCreateFlags::SIGNALED
    } else {
        vk::FenceCreateFlags::empty()
    };

    let create_info = vk::FenceCreateInfo::default().flags(flags);
    let fence = unsafe { device.create_fence(&create_info, None)? };
    Ok(fence)
}

/// Wait for a fence to be signaled.
///
/// # Safety
/// The device and fence must be valid.
#[cfg_attr(feature = "trace-spans", tracing::instrument(level = "trace", skip_all))]
pub unsafe fn wait_for_fence(device: &ash::Device, fence: vk::Fence, timeout_ns: u64) -> Result<()> {
    unsafe { device.wait_for_fences(&[fence], true, timeout_ns)? };
    Ok(())
}

/// Reset a fence to unsignaled state.
///
/// # Safety
/// The device and fence must be valid.
pub unsafe fn reset_fence(device: &ash::Device, fence: vk::Fence) -> Result<()> {
    unsafe { device.reset_fences(&[fence])? };
    Ok(())
}

/// Synchronization objects of one frame slot.
pub struct FrameSync {
    /// Semaphore signaled when image is available
    pub image_available: vk::Semaphore,
    /// Semaphore signaled when rendering is complete
    pub render_finished: vk::Semaphore,
    /// Fence to wait for frame completion (created signaled)
    pub in_flight: vk::Fence,
}

impl FrameSync {
    /// Create frame synchronization resources.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn new(device: &ash::Device) -> Result<Self> {
        unsafe {
            Ok(Self {
                image_available: create_semaphore(device)?,
                render_finished: create_semaphore(device)?,
                in_flight: create_fence(device, true)?,
            })
        }
    }

    /// Replace the image-available semaphore.
    ///
    /// An acquire that was never waited on leaves its semaphore signaled;
    /// swapping it out after a device idle wait gives the next acquire a
    /// clean semaphore.
    ///
    /// # Safety
    /// The device must be idle.
    pub unsafe fn renew_image_available(&mut self, device: &ash::Device) -> Result<()> {
        let fresh = unsafe { create_semaphore(device)? };
        unsafe { device.destroy_semaphore(self.image_available, None) };
        self.image_available = fresh;
        Ok(())
    }

    /// Destroy synchronization resources.
    ///
    /// # Safety
    /// The device must be valid and resources must not be in use.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        unsafe {
            device.destroy_semaphore(self.image_available, None);
            device.destroy_semaphore(self.render_finished, None);
            device.destroy_fence(self.in_flight, None);
        }
    }
}

/// Which frame fence last used each swapchain image.
///
/// Before rendering to an image, the fence of the frame that last used it
/// must be waited on. Entries start out empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagesInFlight {
    fences: Vec<vk::Fence>,
}

impl ImagesInFlight {
    /// Tracker for `image_count` swapchain images, all free.
    pub fn new(image_count: usize) -> Self {
        Self {
            fences: vec![vk::Fence::null(); image_count],
        }
    }

    /// Number of tracked images.
    pub fn len(&self) -> usize {
        self.fences.len()
    }

    /// Whether no images are tracked.
    pub fn is_empty(&self) -> bool {
        self.fences.is_empty()
    }

    /// Fence currently associated with `image`, if any.
    pub fn get(&self, image: u32) -> Option<vk::Fence> {
        self.fences
            .get(image as usize)
            .copied()
            .filter(|&fence| fence != vk::Fence::null())
    }

    /// Associate `fence` with `image`, returning the fence that held it
    /// before so the caller can wait on it.
    ///
    /// # Panics
    /// If `image` is out of range.
    pub fn claim(&mut self, image: u32, fence: vk::Fence) -> Option<vk::Fence> {
        let previous = std::mem::replace(&mut self.fences[image as usize], fence);
        (previous != vk::Fence::null()).then_some(previous)
    }

    /// Forget every association and resize for a new image count.
    pub fn reset(&mut self, image_count: usize) {
        self.fences.clear();
        self.fences.resize(image_count, vk::Fence::null());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    fn fence(raw: u64) -> vk::Fence {
        vk::Fence::from_raw(raw)
    }

    #[test]
    fn images_start_free() {
        let tracker = ImagesInFlight::new(3);
        assert_eq!(tracker.len(), 3);
        assert!((0..3).all(|i| tracker.get(i).is_none()));
    }

    #[test]
    fn claim_returns_previous_owner() {
        let mut tracker = ImagesInFlight::new(2);
        assert_eq!(tracker.claim(1, fence(10)), None);
        assert_eq!(tracker.get(1), Some(fence(10)));
        assert_eq!(tracker.claim(1, fence(20)), Some(fence(10)));
        assert_eq!(tracker.get(0), None);
    }

    #[test]
    fn reset_resizes_and_clears() {
        let mut tracker = ImagesInFlight::new(2);
        tracker.claim(0, fence(1));
        tracker.reset(4);
        assert_eq!(tracker.len(), 4);
        assert!((0..4).all(|i| tracker.get(i).is_none()));
    }
}

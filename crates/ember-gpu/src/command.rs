//! Command pool and recording helpers.
//!
//! The context owns one resettable, transient pool on the graphics family.
//! Frame command buffers and one-shot upload buffers both come from it.

use crate::error::{GpuError, Result};
use ash::vk;

/// Pool the context hands command buffers out of.
pub struct CommandPool {
    pool: vk::CommandPool,
}

impl CommandPool {
    /// # Safety
    /// The device must be valid and `queue_family` must exist on it.
    pub unsafe fn new(
        device: &ash::Device,
        queue_family: u32,
        flags: vk::CommandPoolCreateFlags,
    ) -> Result<Self> {
        let create_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(queue_family)
            .flags(flags);

        let pool = unsafe { device.create_command_pool(&create_info, None)? };
        Ok(Self { pool })
    }

    /// Allocate one command buffer.
    ///
    /// # Safety
    /// The device must be the one the pool was created on.
    pub unsafe fn allocate_command_buffer(
        &self,
        device: &ash::Device,
        level: vk::CommandBufferLevel,
    ) -> Result<vk::CommandBuffer> {
        unsafe { self.allocate_command_buffers(device, level, 1)? }
            .pop()
            .ok_or_else(|| GpuError::InvalidState("no command buffer allocated".to_string()))
    }

    /// Allocate `count` command buffers, one per frame slot for the renderer.
    ///
    /// # Safety
    /// The device must be the one the pool was created on.
    pub unsafe fn allocate_command_buffers(
        &self,
        device: &ash::Device,
        level: vk::CommandBufferLevel,
        count: u32,
    ) -> Result<Vec<vk::CommandBuffer>> {
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.pool)
            .level(level)
            .command_buffer_count(count);

        Ok(unsafe { device.allocate_command_buffers(&alloc_info)? })
    }

    /// Return command buffers to the pool.
    ///
    /// # Safety
    /// The buffers must come from this pool and must not be pending execution.
    pub unsafe fn free_command_buffers(&self, device: &ash::Device, buffers: &[vk::CommandBuffer]) {
        if !buffers.is_empty() {
            unsafe { device.free_command_buffers(self.pool, buffers) };
        }
    }

    /// # Safety
    /// No buffer from the pool may still be pending execution.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        unsafe { device.destroy_command_pool(self.pool, None) };
    }
}

/// Begin recording `cmd`.
///
/// # Safety
/// `cmd` must be in the initial state.
pub unsafe fn begin_command_buffer(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    flags: vk::CommandBufferUsageFlags,
) -> Result<()> {
    let begin_info = vk::CommandBufferBeginInfo::default().flags(flags);
    unsafe { device.begin_command_buffer(cmd, &begin_info)? };
    Ok(())
}

/// # Safety
/// `cmd` must be recording.
pub unsafe fn end_command_buffer(device: &ash::Device, cmd: vk::CommandBuffer) -> Result<()> {
    unsafe { device.end_command_buffer(cmd)? };
    Ok(())
}

/// Submit `command_buffers` in one batch.
///
/// Frame submits wait on image-available and signal render-finished plus
/// the slot fence. One-shot submits pass no semaphores and a null fence.
///
/// # Safety
/// All handles must be valid and `wait_stages` must match `wait_semaphores`.
#[cfg_attr(feature = "trace-spans", tracing::instrument(level = "trace", skip_all))]
pub unsafe fn submit_command_buffers(
    device: &ash::Device,
    queue: vk::Queue,
    command_buffers: &[vk::CommandBuffer],
    wait_semaphores: &[vk::Semaphore],
    wait_stages: &[vk::PipelineStageFlags],
    signal_semaphores: &[vk::Semaphore],
    fence: vk::Fence,
) -> Result<()> {
    debug_assert_eq!(wait_semaphores.len(), wait_stages.len());

    let submit_info = vk::SubmitInfo::default()
        .command_buffers(command_buffers)
        .wait_semaphores(wait_semaphores)
        .wait_dst_stage_mask(wait_stages)
        .signal_semaphores(signal_semaphores);

    unsafe { device.queue_submit(queue, &[submit_info], fence)? };
    Ok(())
}

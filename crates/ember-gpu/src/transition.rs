//! Image layout transitions.
//!
//! Only a closed set of transitions is supported. Anything else is
//! reported as [`GpuError::UnsupportedLayoutTransition`] before any
//! command is recorded.

use crate::error::{GpuError, Result};
use ash::vk;

/// Access masks and pipeline stages for one layout transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutTransition {
    pub src_access: vk::AccessFlags,
    pub dst_access: vk::AccessFlags,
    pub src_stage: vk::PipelineStageFlags,
    pub dst_stage: vk::PipelineStageFlags,
}

/// Look up the barrier parameters for `old -> new`.
pub fn layout_transition(old: vk::ImageLayout, new: vk::ImageLayout) -> Result<LayoutTransition> {
    use vk::ImageLayout as L;

    let transition = match (old, new) {
        (L::UNDEFINED, L::TRANSFER_DST_OPTIMAL | L::TRANSFER_SRC_OPTIMAL) => LayoutTransition {
            src_access: vk::AccessFlags::empty(),
            dst_access: vk::AccessFlags::TRANSFER_WRITE,
            src_stage: vk::PipelineStageFlags::TOP_OF_PIPE,
            dst_stage: vk::PipelineStageFlags::TRANSFER,
        },
        (L::TRANSFER_DST_OPTIMAL, L::SHADER_READ_ONLY_OPTIMAL) => LayoutTransition {
            src_access: vk::AccessFlags::TRANSFER_WRITE,
            dst_access: vk::AccessFlags::SHADER_READ,
            src_stage: vk::PipelineStageFlags::TRANSFER,
            dst_stage: vk::PipelineStageFlags::FRAGMENT_SHADER,
        },
        (L::UNDEFINED, L::DEPTH_STENCIL_ATTACHMENT_OPTIMAL) => LayoutTransition {
            src_access: vk::AccessFlags::empty(),
            dst_access: vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ
                | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            src_stage: vk::PipelineStageFlags::TOP_OF_PIPE,
            dst_stage: vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
        },
        _ => return Err(GpuError::UnsupportedLayoutTransition { old, new }),
    };

    Ok(transition)
}

/// Whether a depth format also carries a stencil component.
pub fn has_stencil_component(format: vk::Format) -> bool {
    matches!(
        format,
        vk::Format::D32_SFLOAT_S8_UINT | vk::Format::D24_UNORM_S8_UINT
    )
}

/// Aspect mask a barrier into `new_layout` must cover.
pub fn aspect_mask(format: vk::Format, new_layout: vk::ImageLayout) -> vk::ImageAspectFlags {
    if new_layout == vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL {
        if has_stencil_component(format) {
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        } else {
            vk::ImageAspectFlags::DEPTH
        }
    } else {
        vk::ImageAspectFlags::COLOR
    }
}

/// Build the image barrier and stage pair for a supported transition.
pub fn image_barrier(
    image: vk::Image,
    format: vk::Format,
    old: vk::ImageLayout,
    new: vk::ImageLayout,
    mip_levels: u32,
    layer_count: u32,
) -> Result<(vk::ImageMemoryBarrier<'static>, LayoutTransition)> {
    let transition = layout_transition(old, new)?;

    let barrier = vk::ImageMemoryBarrier::default()
        .old_layout(old)
        .new_layout(new)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(
            vk::ImageSubresourceRange::default()
                .aspect_mask(aspect_mask(format, new))
                .base_mip_level(0)
                .level_count(mip_levels)
                .base_array_layer(0)
                .layer_count(layer_count),
        )
        .src_access_mask(transition.src_access)
        .dst_access_mask(transition.dst_access);

    Ok((barrier, transition))
}

#[cfg(test)]
mod tests {
    use super::*;
    use vk::ImageLayout as L;

    #[test]
    fn upload_transitions() {
        let t = layout_transition(L::UNDEFINED, L::TRANSFER_DST_OPTIMAL).unwrap();
        assert_eq!(t.src_access, vk::AccessFlags::empty());
        assert_eq!(t.dst_access, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(t.src_stage, vk::PipelineStageFlags::TOP_OF_PIPE);
        assert_eq!(t.dst_stage, vk::PipelineStageFlags::TRANSFER);

        let src = layout_transition(L::UNDEFINED, L::TRANSFER_SRC_OPTIMAL).unwrap();
        assert_eq!(src, t);

        let t = layout_transition(L::TRANSFER_DST_OPTIMAL, L::SHADER_READ_ONLY_OPTIMAL).unwrap();
        assert_eq!(t.src_access, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(t.dst_access, vk::AccessFlags::SHADER_READ);
        assert_eq!(t.src_stage, vk::PipelineStageFlags::TRANSFER);
        assert_eq!(t.dst_stage, vk::PipelineStageFlags::FRAGMENT_SHADER);
    }

    #[test]
    fn depth_attachment_transition() {
        let t = layout_transition(L::UNDEFINED, L::DEPTH_STENCIL_ATTACHMENT_OPTIMAL).unwrap();
        assert_eq!(
            t.dst_access,
            vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ
                | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE
        );
        assert_eq!(t.dst_stage, vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS);
    }

    #[test]
    fn unknown_transition_is_rejected() {
        let err = layout_transition(L::SHADER_READ_ONLY_OPTIMAL, L::TRANSFER_DST_OPTIMAL);
        assert!(matches!(
            err,
            Err(GpuError::UnsupportedLayoutTransition {
                old: L::SHADER_READ_ONLY_OPTIMAL,
                new: L::TRANSFER_DST_OPTIMAL,
            })
        ));
        assert!(layout_transition(L::UNDEFINED, L::PRESENT_SRC_KHR).is_err());
    }

    #[test]
    fn aspect_masks() {
        let depth = L::DEPTH_STENCIL_ATTACHMENT_OPTIMAL;
        assert_eq!(
            aspect_mask(vk::Format::D32_SFLOAT, depth),
            vk::ImageAspectFlags::DEPTH
        );
        assert_eq!(
            aspect_mask(vk::Format::D24_UNORM_S8_UINT, depth),
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        );
        assert_eq!(
            aspect_mask(vk::Format::R8G8B8A8_SRGB, L::TRANSFER_DST_OPTIMAL),
            vk::ImageAspectFlags::COLOR
        );
    }

    #[test]
    fn barrier_covers_all_levels_and_layers() {
        let (barrier, _) = image_barrier(
            vk::Image::null(),
            vk::Format::R8G8B8A8_SRGB,
            L::UNDEFINED,
            L::TRANSFER_DST_OPTIMAL,
            4,
            6,
        )
        .unwrap();
        assert_eq!(barrier.subresource_range.base_mip_level, 0);
        assert_eq!(barrier.subresource_range.level_count, 4);
        assert_eq!(barrier.subresource_range.layer_count, 6);
        assert_eq!(barrier.src_queue_family_index, vk::QUEUE_FAMILY_IGNORED);
    }
}

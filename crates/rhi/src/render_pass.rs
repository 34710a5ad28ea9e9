//! Render pass management.
//!
//! A [`RenderPass`] here is always a single subpass with one color
//! attachment (a swapchain image) and one depth attachment. Two knobs
//! cover the engine's multi-pass needs:
//!
//! - [`ClearFlags`] decides which attachments are cleared on load. A pass
//!   that does not clear the color attachment loads the previous pass's
//!   output; depth is per-pass scratch and is never loaded.
//! - [`PassUsage`] decides the color attachment's final layout. The last
//!   pass of the frame transitions to `PRESENT_SRC_KHR`; earlier passes
//!   leave the image as `COLOR_ATTACHMENT_OPTIMAL` for the next pass.
//!
//! The attachment descriptions are pure functions so the load-op/layout
//! policy is testable without a device.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::RhiError;

/// Which attachments a pass clears at the start.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ClearFlags {
    pub color: bool,
    pub depth: bool,
    pub stencil: bool,
}

impl ClearFlags {
    /// Clear everything; the usual setting for the first pass of a frame.
    pub fn all() -> Self {
        Self {
            color: true,
            depth: true,
            stencil: true,
        }
    }

    /// Clear nothing; overlay passes load what the previous pass wrote.
    pub fn none() -> Self {
        Self::default()
    }
}

/// Where the color attachment goes after the pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PassUsage {
    /// Output feeds a later pass; final layout stays COLOR_ATTACHMENT_OPTIMAL.
    Intermediate,
    /// Last pass of the frame; final layout is PRESENT_SRC_KHR.
    Present,
}

/// Color attachment description for the given clear/usage policy.
///
/// A clearing pass starts from UNDEFINED (the contents are overwritten
/// anyway); a loading pass must start from the layout the previous pass
/// finished in.
pub fn color_attachment(
    format: vk::Format,
    clear: bool,
    usage: PassUsage,
) -> vk::AttachmentDescription {
    let (load_op, initial_layout) = if clear {
        (vk::AttachmentLoadOp::CLEAR, vk::ImageLayout::UNDEFINED)
    } else {
        (
            vk::AttachmentLoadOp::LOAD,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        )
    };

    let final_layout = match usage {
        PassUsage::Intermediate => vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        PassUsage::Present => vk::ImageLayout::PRESENT_SRC_KHR,
    };

    vk::AttachmentDescription::default()
        .format(format)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(load_op)
        .store_op(vk::AttachmentStoreOp::STORE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(initial_layout)
        .final_layout(final_layout)
}

/// Depth attachment description. Depth is never needed after a pass, so
/// the store op is always DONT_CARE; a non-clearing pass therefore has no
/// defined contents to load and gets DONT_CARE on load as well, which is
/// cheaper than LOAD on tiled GPUs.
pub fn depth_attachment(
    format: vk::Format,
    clear_depth: bool,
    clear_stencil: bool,
) -> vk::AttachmentDescription {
    let load_op = if clear_depth {
        vk::AttachmentLoadOp::CLEAR
    } else {
        vk::AttachmentLoadOp::DONT_CARE
    };

    let stencil_load_op = if clear_stencil {
        vk::AttachmentLoadOp::CLEAR
    } else {
        vk::AttachmentLoadOp::DONT_CARE
    };

    vk::AttachmentDescription::default()
        .format(format)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(load_op)
        .store_op(vk::AttachmentStoreOp::DONT_CARE)
        .stencil_load_op(stencil_load_op)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
}

/// RAII wrapper for a single-subpass color+depth render pass.
pub struct RenderPass {
    device: Arc<Device>,
    render_pass: vk::RenderPass,
    clear_flags: ClearFlags,
    color_format: vk::Format,
    usage: PassUsage,
}

impl RenderPass {
    pub fn new(
        device: Arc<Device>,
        color_format: vk::Format,
        depth_format: vk::Format,
        clear_flags: ClearFlags,
        usage: PassUsage,
    ) -> Result<Self, RhiError> {
        let attachments = [
            color_attachment(color_format, clear_flags.color, usage),
            depth_attachment(depth_format, clear_flags.depth, clear_flags.stencil),
        ];

        let color_ref = vk::AttachmentReference::default()
            .attachment(0)
            .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
        let depth_ref = vk::AttachmentReference::default()
            .attachment(1)
            .layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);

        let color_refs = [color_ref];
        let subpass = vk::SubpassDescription::default()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_refs)
            .depth_stencil_attachment(&depth_ref);

        // Order color/depth writes after whatever used the attachments
        // before this pass (the acquire, or the previous pass).
        let dependency = vk::SubpassDependency::default()
            .src_subpass(vk::SUBPASS_EXTERNAL)
            .dst_subpass(0)
            .src_stage_mask(
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
                    | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
            )
            .src_access_mask(vk::AccessFlags::empty())
            .dst_stage_mask(
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
                    | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
            )
            .dst_access_mask(
                vk::AccessFlags::COLOR_ATTACHMENT_WRITE
                    | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            );

        let subpasses = [subpass];
        let dependencies = [dependency];
        let create_info = vk::RenderPassCreateInfo::default()
            .attachments(&attachments)
            .subpasses(&subpasses)
            .dependencies(&dependencies);

        let render_pass = unsafe { device.handle().create_render_pass(&create_info, None)? };

        debug!(
            "Render pass created (color {:?}, depth {:?}, clear {:?}, {:?})",
            color_format, depth_format, clear_flags, usage
        );

        Ok(Self {
            device,
            render_pass,
            clear_flags,
            color_format,
            usage,
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::RenderPass {
        self.render_pass
    }

    #[inline]
    pub fn clear_flags(&self) -> ClearFlags {
        self.clear_flags
    }

    /// Color format this pass was built against; a swapchain recreation
    /// that changes format invalidates the pass.
    #[inline]
    pub fn color_format(&self) -> vk::Format {
        self.color_format
    }

    #[inline]
    pub fn usage(&self) -> PassUsage {
        self.usage
    }

    /// Clear values matching the attachment order. Vulkan ignores entries
    /// for attachments that are not cleared, but the array length must
    /// cover every cleared attachment index.
    pub fn clear_values(&self, color: [f32; 4]) -> Vec<vk::ClearValue> {
        vec![
            vk::ClearValue {
                color: vk::ClearColorValue { float32: color },
            },
            vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: 1.0,
                    stencil: 0,
                },
            },
        ]
    }
}

impl Drop for RenderPass {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_render_pass(self.render_pass, None);
        }
        debug!("Render pass destroyed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clearing_color_pass_starts_undefined() {
        let desc = color_attachment(vk::Format::B8G8R8A8_SRGB, true, PassUsage::Intermediate);
        assert_eq!(desc.load_op, vk::AttachmentLoadOp::CLEAR);
        assert_eq!(desc.initial_layout, vk::ImageLayout::UNDEFINED);
        assert_eq!(desc.store_op, vk::AttachmentStoreOp::STORE);
        assert_eq!(
            desc.final_layout,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL
        );
    }

    #[test]
    fn loading_color_pass_preserves_previous_output() {
        let desc = color_attachment(vk::Format::B8G8R8A8_SRGB, false, PassUsage::Present);
        assert_eq!(desc.load_op, vk::AttachmentLoadOp::LOAD);
        assert_eq!(
            desc.initial_layout,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL
        );
        assert_eq!(desc.final_layout, vk::ImageLayout::PRESENT_SRC_KHR);
    }

    #[test]
    fn present_usage_sets_present_final_layout() {
        let desc = color_attachment(vk::Format::B8G8R8A8_SRGB, true, PassUsage::Present);
        assert_eq!(desc.final_layout, vk::ImageLayout::PRESENT_SRC_KHR);
    }

    #[test]
    fn depth_attachment_never_stores() {
        let cleared = depth_attachment(vk::Format::D32_SFLOAT, true, false);
        assert_eq!(cleared.load_op, vk::AttachmentLoadOp::CLEAR);
        assert_eq!(cleared.store_op, vk::AttachmentStoreOp::DONT_CARE);
        assert_eq!(cleared.initial_layout, vk::ImageLayout::UNDEFINED);
    }

    #[test]
    fn non_clearing_pass_discards_depth() {
        // Depth is stored with DONT_CARE everywhere, so a later pass has
        // nothing defined to load back.
        let desc = depth_attachment(vk::Format::D32_SFLOAT, false, false);
        assert_eq!(desc.load_op, vk::AttachmentLoadOp::DONT_CARE);
        assert_eq!(desc.store_op, vk::AttachmentStoreOp::DONT_CARE);
        assert_eq!(desc.initial_layout, vk::ImageLayout::UNDEFINED);
    }

    #[test]
    fn stencil_clear_flag_sets_stencil_load_op() {
        let desc = depth_attachment(vk::Format::D24_UNORM_S8_UINT, true, true);
        assert_eq!(desc.stencil_load_op, vk::AttachmentLoadOp::CLEAR);

        let no_stencil = depth_attachment(vk::Format::D24_UNORM_S8_UINT, true, false);
        assert_eq!(no_stencil.stencil_load_op, vk::AttachmentLoadOp::DONT_CARE);
    }

    #[test]
    fn clear_flags_presets() {
        assert_eq!(
            ClearFlags::all(),
            ClearFlags {
                color: true,
                depth: true,
                stencil: true
            }
        );
        assert_eq!(ClearFlags::none(), ClearFlags::default());
    }
}

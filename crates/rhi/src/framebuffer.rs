//! Framebuffer management.
//!
//! A [`FramebufferSet`] holds one framebuffer per swapchain image, all
//! sharing a single depth view. The whole set is destroyed before a
//! swapchain recreation and rebuilt afterwards; the stored extent lets the
//! frame loop check that framebuffers still match the swapchain.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::RhiError;
use crate::render_pass::RenderPass;
use crate::swapchain::Swapchain;

/// One framebuffer per swapchain image, bound to a single render pass.
pub struct FramebufferSet {
    device: Arc<Device>,
    framebuffers: Vec<vk::Framebuffer>,
    extent: vk::Extent2D,
}

impl FramebufferSet {
    /// Builds framebuffers for every swapchain image view, attaching the
    /// shared `depth_view` as the second attachment.
    pub fn new(
        device: Arc<Device>,
        render_pass: &RenderPass,
        swapchain: &Swapchain,
        depth_view: vk::ImageView,
    ) -> Result<Self, RhiError> {
        let extent = swapchain.extent();
        let mut framebuffers = Vec::with_capacity(swapchain.image_views().len());

        for &color_view in swapchain.image_views() {
            let attachments = [color_view, depth_view];

            let create_info = vk::FramebufferCreateInfo::default()
                .render_pass(render_pass.handle())
                .attachments(&attachments)
                .width(extent.width)
                .height(extent.height)
                .layers(1);

            let framebuffer = unsafe {
                device
                    .handle()
                    .create_framebuffer(&create_info, None)
                    .map_err(|e| {
                        RhiError::SwapchainError(format!("Failed to create framebuffer: {:?}", e))
                    })?
            };

            framebuffers.push(framebuffer);
        }

        debug!(
            "Created {} framebuffers at {}x{}",
            framebuffers.len(),
            extent.width,
            extent.height
        );

        Ok(Self {
            device,
            framebuffers,
            extent,
        })
    }

    /// Framebuffer for the given swapchain image index.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    #[inline]
    pub fn get(&self, index: usize) -> vk::Framebuffer {
        self.framebuffers[index]
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.framebuffers.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.framebuffers.is_empty()
    }

    /// Extent the set was built for.
    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// True when the set still matches the swapchain's extent. A mismatch
    /// means the set must be rebuilt before recording.
    #[inline]
    pub fn matches_extent(&self, extent: vk::Extent2D) -> bool {
        self.extent.width == extent.width && self.extent.height == extent.height
    }
}

impl Drop for FramebufferSet {
    fn drop(&mut self) {
        for &framebuffer in &self.framebuffers {
            unsafe {
                self.device.handle().destroy_framebuffer(framebuffer, None);
            }
        }
        debug!("Destroyed {} framebuffers", self.framebuffers.len());
    }
}

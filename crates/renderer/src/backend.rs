//! Backend abstraction.
//!
//! The frontend talks to a [`RenderBackend`] and never to Vulkan types
//! directly, so a second backend can slot in behind [`BackendKind`]
//! without touching game code.

use cinder_platform::Window;
use cinder_rhi::{vk, RhiResult};

use crate::vulkan::VulkanBackend;

/// Geometry already resident on the GPU.
#[derive(Clone, Copy, Debug)]
pub struct GeometryBinding {
    pub vertex_buffer: vk::Buffer,
    pub index_buffer: vk::Buffer,
    pub index_count: u32,
}

/// Pipeline and descriptor state for one draw.
#[derive(Clone, Copy, Debug)]
pub struct MaterialBinding {
    pub pipeline: vk::Pipeline,
    pub layout: vk::PipelineLayout,
    pub descriptor_set: vk::DescriptorSet,
}

/// One draw call: what to draw, with what, and where.
#[derive(Clone, Copy, Debug)]
pub struct DrawSubmission {
    pub geometry: GeometryBinding,
    pub material: MaterialBinding,
    pub transform: glam::Mat4,
}

/// Everything the backend needs to render one frame.
#[derive(Clone, Debug, Default)]
pub struct RenderPacket {
    pub delta_time: f32,
    pub draws: Vec<DrawSubmission>,
}

/// A rendering strategy. Implementations own their device, swapchain and
/// per-frame state; the frontend drives them through this interface.
pub trait RenderBackend {
    /// Starts a frame. Returns `Ok(false)` when the frame was skipped for
    /// a recoverable reason (minimized window, swapchain out of date);
    /// `end_frame` must not be called for a skipped frame.
    fn begin_frame(&mut self, packet: &RenderPacket) -> RhiResult<bool>;

    /// Submits and presents the frame started by `begin_frame`.
    fn end_frame(&mut self) -> RhiResult<()>;

    /// Notifies the backend of a window size change. Cheap; the actual
    /// swapchain rebuild happens at the top of a later frame.
    fn resized(&mut self, width: u32, height: u32);

    /// Blocks until the GPU is idle. Called before teardown.
    fn shutdown(&mut self);
}

/// Available backend implementations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendKind {
    Vulkan,
}

pub fn create_backend(kind: BackendKind, window: &Window) -> RhiResult<Box<dyn RenderBackend>> {
    match kind {
        BackendKind::Vulkan => Ok(Box::new(VulkanBackend::new(window)?)),
    }
}

//! Rendering orchestration.
//!
//! This crate owns the frame loop:
//! - frame pacing and swapchain recovery ([`frame`])
//! - the backend abstraction the application draws through ([`backend`])
//! - the Vulkan backend itself ([`vulkan`])
//! - the frontend facade ([`frontend`])

pub mod backend;
pub mod depth_buffer;
pub mod frame;
pub mod frontend;
pub mod vulkan;

pub use backend::{
    BackendKind, DrawSubmission, GeometryBinding, MaterialBinding, RenderBackend, RenderPacket,
};
pub use frame::{AcquireOutcome, FrameAdmission, FramePacer, PresentOutcome};
pub use frontend::Renderer;

/// Maximum number of frames that can be in flight simultaneously.
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;

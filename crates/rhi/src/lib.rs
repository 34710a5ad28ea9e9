//! Vulkan hardware interface for the cinder renderer.
//!
//! Safe abstractions over `ash` covering:
//! - Instance creation with optional validation layers
//! - Physical device selection and logical device creation
//! - Swapchain management and recreation
//! - Render passes and framebuffers
//! - Command pools and command buffer recording
//! - Fences and semaphores

mod error;

pub mod command;
pub mod device;
pub mod framebuffer;
pub mod instance;
pub mod physical_device;
pub mod render_pass;
pub mod swapchain;
pub mod sync;

pub use error::{RhiError, RhiResult};

// Re-export ash types that users might need
pub use ash::vk;

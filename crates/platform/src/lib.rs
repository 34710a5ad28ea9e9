//! Platform layer: winit window management and the raw-handle bridge used
//! for Vulkan surface creation.

mod window;

pub use window::{Surface, Window, required_instance_extensions};

// Re-export the winit types callers need for the event loop.
pub use winit::event::WindowEvent;
pub use winit::event_loop::EventLoop;

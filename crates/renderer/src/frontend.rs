//! Renderer frontend.
//!
//! The thin layer the application talks to. It hides the backend choice
//! and turns the begin/end frame pair into a single `draw_frame` call
//! with a simple keep-going/stop answer.

use tracing::error;

use cinder_core::{Error, Result};
use cinder_platform::Window;

use crate::backend::{create_backend, BackendKind, RenderBackend, RenderPacket};

pub struct Renderer {
    backend: Box<dyn RenderBackend>,
}

impl Renderer {
    pub fn new(kind: BackendKind, window: &Window) -> Result<Self> {
        let backend = create_backend(kind, window)
            .map_err(|e| Error::Renderer(format!("Failed to create backend: {}", e)))?;
        Ok(Self { backend })
    }

    /// Renders one frame. Returns `true` while rendering can continue,
    /// including frames skipped for recoverable reasons (minimized window,
    /// swapchain rebuild). Returns `false` only on unrecoverable errors,
    /// after logging them; the caller should shut down.
    pub fn draw_frame(&mut self, packet: &RenderPacket) -> bool {
        match self.backend.begin_frame(packet) {
            Ok(true) => {}
            Ok(false) => return true,
            Err(e) => {
                error!("Frame begin failed: {}", e);
                return false;
            }
        }

        if let Err(e) = self.backend.end_frame() {
            error!("Frame submit failed: {}", e);
            return false;
        }
        true
    }

    /// Forwards a window size change to the backend. Safe to call with
    /// zero dimensions; rendering pauses until the window has area again.
    pub fn on_resized(&mut self, width: u32, height: u32) {
        self.backend.resized(width, height);
    }

    /// Idles the GPU ahead of teardown.
    pub fn shutdown(&mut self) {
        self.backend.shutdown();
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        self.backend.shutdown();
    }
}

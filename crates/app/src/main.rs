//! Cinder - Main Entry Point
//!
//! Opens a window, creates the Vulkan renderer behind the backend
//! abstraction, and drives the frame loop until the window closes or the
//! renderer reports an unrecoverable error.

use anyhow::Result;
use tracing::{error, info};
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::WindowId;

use cinder_core::FrameTimer;
use cinder_platform::Window;
use cinder_renderer::{BackendKind, RenderPacket, Renderer};

struct App {
    window: Option<Window>,
    renderer: Option<Renderer>,
    timer: FrameTimer,
}

impl App {
    fn new() -> Self {
        Self {
            window: None,
            renderer: None,
            timer: FrameTimer::new(),
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none() {
            match Window::new(event_loop, 1280, 720, "Cinder") {
                Ok(window) => match Renderer::new(BackendKind::Vulkan, &window) {
                    Ok(renderer) => {
                        info!("Initialization complete, entering main loop");
                        self.renderer = Some(renderer);
                        self.window = Some(window);
                    }
                    Err(e) => {
                        error!("Failed to create renderer: {}", e);
                        event_loop.exit();
                    }
                },
                Err(e) => {
                    error!("Failed to create window: {}", e);
                    event_loop.exit();
                }
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested, shutting down");
                if let Some(ref mut renderer) = self.renderer {
                    renderer.shutdown();
                }
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                // Zero sizes (minimized window) are forwarded too; the
                // renderer pauses until the window has area again.
                if let Some(ref mut renderer) = self.renderer {
                    renderer.on_resized(size.width, size.height);
                }
            }
            WindowEvent::RedrawRequested => {
                let delta_time = self.timer.tick();
                let packet = RenderPacket {
                    delta_time,
                    draws: Vec::new(),
                };

                if let Some(ref mut renderer) = self.renderer {
                    if !renderer.draw_frame(&packet) {
                        error!("Unrecoverable render error, shutting down");
                        event_loop.exit();
                    }
                }
            }
            WindowEvent::KeyboardInput { event, .. } => {
                if let PhysicalKey::Code(KeyCode::Escape) = event.physical_key {
                    if event.state.is_pressed() {
                        info!("Escape pressed, shutting down");
                        if let Some(ref mut renderer) = self.renderer {
                            renderer.shutdown();
                        }
                        event_loop.exit();
                    }
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(ref window) = self.window {
            window.request_redraw();
        }
    }
}

fn main() -> Result<()> {
    cinder_core::init_logging();
    info!("Starting Cinder");

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new();
    event_loop.run_app(&mut app)?;

    Ok(())
}

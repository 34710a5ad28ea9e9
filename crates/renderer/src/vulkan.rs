//! Vulkan rendering backend.
//!
//! Owns the whole GPU-facing object graph (instance, surface, device,
//! swapchain, render passes, framebuffers, per-frame command buffers and
//! sync objects) and drives it frame by frame. Frame pacing and the
//! resize/out-of-date protocol live in [`FramePacer`]; this type performs
//! the waits, rebuilds and submissions the pacer decides on.

use std::mem::ManuallyDrop;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use cinder_platform::{Surface, Window};
use cinder_rhi::command::{CommandBuffer, CommandPool};
use cinder_rhi::device::Device;
use cinder_rhi::framebuffer::FramebufferSet;
use cinder_rhi::instance::Instance;
use cinder_rhi::physical_device::{select_physical_device, DeviceRequirements};
use cinder_rhi::render_pass::{ClearFlags, PassUsage, RenderPass};
use cinder_rhi::swapchain::Swapchain;
use cinder_rhi::sync::{FrameSync, FENCE_WAIT_TIMEOUT_NS};
use cinder_rhi::{vk, RhiError, RhiResult};

use crate::backend::{RenderBackend, RenderPacket};
use crate::depth_buffer::DepthBuffer;
use crate::frame::{AcquireOutcome, FrameAdmission, FramePacer, PresentOutcome};
use crate::MAX_FRAMES_IN_FLIGHT;

const CLEAR_COLOR: [f32; 4] = [0.05, 0.05, 0.08, 1.0];

/// Command buffer and synchronization objects for one frame slot.
struct FrameResources {
    command_buffer: CommandBuffer,
    sync: FrameSync,
}

/// Vulkan implementation of [`RenderBackend`].
///
/// ManuallyDrop is used to ensure correct destruction order.
pub struct VulkanBackend {
    instance: ManuallyDrop<Instance>,
    surface: ManuallyDrop<Surface>,
    device: Arc<Device>,
    swapchain: ManuallyDrop<Swapchain>,
    depth_buffer: ManuallyDrop<DepthBuffer>,
    /// Clears and renders the scene, leaving the image as a color
    /// attachment for the UI pass.
    world_pass: ManuallyDrop<RenderPass>,
    /// Loads the world output and transitions the image for present.
    ui_pass: ManuallyDrop<RenderPass>,
    world_framebuffers: ManuallyDrop<FramebufferSet>,
    ui_framebuffers: ManuallyDrop<FramebufferSet>,
    command_pool: ManuallyDrop<CommandPool>,
    frames: Vec<FrameResources>,

    pacer: FramePacer,
    /// Swapchain image acquired by `begin_frame`, consumed by `end_frame`.
    current_image: Option<u32>,
}

impl VulkanBackend {
    pub fn new(window: &Window) -> RhiResult<Self> {
        let display_handle = window
            .raw_display_handle()
            .map_err(|e| RhiError::SurfaceError(e.to_string()))?;
        let surface_extensions = cinder_platform::required_instance_extensions(display_handle)
            .map_err(|e| RhiError::SurfaceError(e.to_string()))?;

        let instance = Instance::new(&surface_extensions, cfg!(debug_assertions))?;
        let surface = window
            .create_surface(instance.entry(), instance.handle())
            .map_err(|e| RhiError::SurfaceError(e.to_string()))?;

        let requirements = DeviceRequirements::default();
        let physical_device_info = select_physical_device(
            instance.handle(),
            surface.handle(),
            surface.loader(),
            &requirements,
        )?;
        info!(
            "Selected GPU: {} ({})",
            physical_device_info.device_name(),
            physical_device_info.device_type_name()
        );

        let device = Device::new(&instance, &physical_device_info, &requirements)?;

        let (width, height) = window.framebuffer_size();
        let swapchain = Swapchain::new(
            &instance,
            device.clone(),
            surface.handle(),
            surface.loader(),
            width,
            height,
        )?;
        let extent = swapchain.extent();

        let depth_buffer = DepthBuffer::new(
            device.clone(),
            extent.width,
            extent.height,
            device.depth_format(),
        )?;

        let world_pass = RenderPass::new(
            device.clone(),
            swapchain.format(),
            device.depth_format(),
            ClearFlags::all(),
            PassUsage::Intermediate,
        )?;
        let ui_pass = RenderPass::new(
            device.clone(),
            swapchain.format(),
            device.depth_format(),
            ClearFlags::none(),
            PassUsage::Present,
        )?;

        let world_framebuffers = FramebufferSet::new(
            device.clone(),
            &world_pass,
            &swapchain,
            depth_buffer.image_view(),
        )?;
        let ui_framebuffers = FramebufferSet::new(
            device.clone(),
            &ui_pass,
            &swapchain,
            depth_buffer.image_view(),
        )?;

        let graphics_family = device
            .queue_families()
            .graphics_family
            .ok_or(RhiError::NoSuitableDevice)?;
        let command_pool = CommandPool::new(device.clone(), graphics_family)?;

        let command_buffers =
            command_pool.allocate_command_buffers(MAX_FRAMES_IN_FLIGHT as u32)?;
        let mut frames = Vec::with_capacity(MAX_FRAMES_IN_FLIGHT);
        for command_buffer in command_buffers {
            frames.push(FrameResources {
                command_buffer,
                sync: FrameSync::new(device.clone())?,
            });
        }

        let pacer = FramePacer::new(
            MAX_FRAMES_IN_FLIGHT,
            swapchain.image_count() as usize,
            (extent.width, extent.height),
        );

        info!(
            "Vulkan backend initialized ({}x{}, {} swapchain images, {} frames in flight)",
            extent.width,
            extent.height,
            swapchain.image_count(),
            MAX_FRAMES_IN_FLIGHT
        );

        Ok(Self {
            instance: ManuallyDrop::new(instance),
            surface: ManuallyDrop::new(surface),
            device,
            swapchain: ManuallyDrop::new(swapchain),
            depth_buffer: ManuallyDrop::new(depth_buffer),
            world_pass: ManuallyDrop::new(world_pass),
            ui_pass: ManuallyDrop::new(ui_pass),
            world_framebuffers: ManuallyDrop::new(world_framebuffers),
            ui_framebuffers: ManuallyDrop::new(ui_framebuffers),
            command_pool: ManuallyDrop::new(command_pool),
            frames,
            pacer,
            current_image: None,
        })
    }

    /// Tears down and rebuilds everything derived from the surface size.
    ///
    /// Render passes only depend on the surface format, so they are rebuilt
    /// only when the format actually changed (monitor change, for example).
    /// Framebuffers reference the swapchain image views and are always
    /// rebuilt.
    fn rebuild_swapchain(&mut self, width: u32, height: u32) -> RhiResult<()> {
        debug!("Rebuilding swapchain at {}x{}", width, height);
        self.device.wait_idle()?;

        let old_format = self.swapchain.format();

        // Framebuffers reference the image views the recreate destroys.
        unsafe {
            ManuallyDrop::drop(&mut self.world_framebuffers);
            ManuallyDrop::drop(&mut self.ui_framebuffers);
        }

        self.swapchain.recreate(
            &self.instance,
            self.surface.handle(),
            self.surface.loader(),
            width,
            height,
        )?;
        let extent = self.swapchain.extent();

        let new_depth = DepthBuffer::new(
            self.device.clone(),
            extent.width,
            extent.height,
            self.device.depth_format(),
        )?;
        unsafe {
            ManuallyDrop::drop(&mut self.depth_buffer);
        }
        self.depth_buffer = ManuallyDrop::new(new_depth);

        if self.swapchain.format() != old_format {
            warn!(
                "Surface format changed ({:?} -> {:?}), rebuilding render passes",
                old_format,
                self.swapchain.format()
            );
            let new_world = RenderPass::new(
                self.device.clone(),
                self.swapchain.format(),
                self.device.depth_format(),
                ClearFlags::all(),
                PassUsage::Intermediate,
            )?;
            let new_ui = RenderPass::new(
                self.device.clone(),
                self.swapchain.format(),
                self.device.depth_format(),
                ClearFlags::none(),
                PassUsage::Present,
            )?;
            unsafe {
                ManuallyDrop::drop(&mut self.world_pass);
                ManuallyDrop::drop(&mut self.ui_pass);
            }
            self.world_pass = ManuallyDrop::new(new_world);
            self.ui_pass = ManuallyDrop::new(new_ui);
        }

        self.world_framebuffers = ManuallyDrop::new(FramebufferSet::new(
            self.device.clone(),
            &self.world_pass,
            &self.swapchain,
            self.depth_buffer.image_view(),
        )?);
        self.ui_framebuffers = ManuallyDrop::new(FramebufferSet::new(
            self.device.clone(),
            &self.ui_pass,
            &self.swapchain,
            self.depth_buffer.image_view(),
        )?);

        self.pacer.swapchain_rebuilt(
            self.swapchain.image_count() as usize,
            (extent.width, extent.height),
        );

        debug!(
            "Swapchain rebuilt (generation {})",
            self.pacer.generation()
        );
        Ok(())
    }

    fn record_world_pass(&self, slot: usize, image_index: usize, packet: &RenderPacket) {
        let cmd = &self.frames[slot].command_buffer;
        let extent = self.swapchain.extent();

        let clear_values = self.world_pass.clear_values(CLEAR_COLOR);
        cmd.begin_render_pass(
            &self.world_pass,
            self.world_framebuffers.get(image_index),
            extent,
            &clear_values,
        );
        cmd.set_viewport_and_scissor(extent);

        for draw in &packet.draws {
            cmd.bind_pipeline(draw.material.pipeline);
            cmd.bind_descriptor_set(draw.material.layout, draw.material.descriptor_set);
            cmd.bind_vertex_buffer(draw.geometry.vertex_buffer);
            cmd.bind_index_buffer(draw.geometry.index_buffer);

            let transform = draw.transform.to_cols_array();
            cmd.push_constants(
                draw.material.layout,
                vk::ShaderStageFlags::VERTEX,
                bytemuck::bytes_of(&transform),
            );
            cmd.draw_indexed(draw.geometry.index_count);
        }

        cmd.end_render_pass();
    }

    fn record_ui_pass(&self, slot: usize, image_index: usize) {
        let cmd = &self.frames[slot].command_buffer;

        // Loads the world output and transitions the image to present.
        // UI draws slot in here once there is a UI system to feed them.
        cmd.begin_render_pass(
            &self.ui_pass,
            self.ui_framebuffers.get(image_index),
            self.swapchain.extent(),
            &[],
        );
        cmd.end_render_pass();
    }
}

impl RenderBackend for VulkanBackend {
    fn begin_frame(&mut self, packet: &RenderPacket) -> RhiResult<bool> {
        match self.pacer.admit() {
            FrameAdmission::Skip => return Ok(false),
            FrameAdmission::Rebuild { width, height } => {
                self.rebuild_swapchain(width, height)?;
            }
            FrameAdmission::Render { .. } => {}
        }

        let slot = self.pacer.current_slot();
        self.frames[slot].sync.in_flight().wait(FENCE_WAIT_TIMEOUT_NS)?;

        let acquire = self
            .swapchain
            .acquire_next_image(self.frames[slot].sync.image_available().handle());
        let outcome = AcquireOutcome::from_vk(acquire)?;
        let image_index = match self.pacer.on_acquire(outcome) {
            Some(index) => index,
            // Out of date; the pacer rebuilds at the top of the next frame.
            None => return Ok(false),
        };

        // The image may still be owned by an earlier slot.
        if let Some(prior_slot) = self.pacer.image_acquired(image_index as usize, slot) {
            self.frames[prior_slot]
                .sync
                .in_flight()
                .wait(FENCE_WAIT_TIMEOUT_NS)?;
        }
        self.current_image = Some(image_index);

        // Recording against a stale framebuffer is a rebuild-sequencing
        // defect, not a runtime condition.
        debug_assert!(self.world_framebuffers.matches_extent(self.swapchain.extent()));
        debug_assert!(self.ui_framebuffers.matches_extent(self.swapchain.extent()));

        let cmd = &mut self.frames[slot].command_buffer;
        cmd.reset()?;
        cmd.begin()?;

        self.record_world_pass(slot, image_index as usize, packet);
        self.record_ui_pass(slot, image_index as usize);

        Ok(true)
    }

    fn end_frame(&mut self) -> RhiResult<()> {
        let image_index = match self.current_image.take() {
            Some(index) => index,
            None => {
                // Contract violation: begin_frame did not admit a frame.
                debug_assert!(false, "end_frame called without a begun frame");
                return Ok(());
            }
        };

        let slot = self.pacer.current_slot();
        self.frames[slot].command_buffer.end()?;

        let command_buffers = [self.frames[slot].command_buffer.handle()];
        let wait_semaphores = [self.frames[slot].sync.image_available().handle()];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signal_semaphores = [self.frames[slot].sync.render_finished().handle()];

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        // Reset only once we are certain to submit, so an abandoned frame
        // never leaves the fence unsignaled.
        self.frames[slot].sync.in_flight().reset()?;
        unsafe {
            self.device
                .submit_graphics(&[submit_info], self.frames[slot].sync.in_flight().handle())?;
        }

        let present = self.swapchain.present(
            self.device.present_queue(),
            image_index,
            self.frames[slot].sync.render_finished().handle(),
        );
        self.pacer.on_present(PresentOutcome::from_vk(present)?);

        self.pacer.advance();
        Ok(())
    }

    fn resized(&mut self, width: u32, height: u32) {
        debug!("Window resized to {}x{}", width, height);
        self.pacer.notify_resized(width, height);
    }

    fn shutdown(&mut self) {
        if let Err(e) = self.device.wait_idle() {
            error!("Failed to idle device during shutdown: {}", e);
        }
    }
}

impl Drop for VulkanBackend {
    fn drop(&mut self) {
        info!("Shutting down Vulkan backend");
        if let Err(e) = self.device.wait_idle() {
            error!("Failed to idle device during teardown: {}", e);
        }

        self.frames.clear();

        unsafe {
            ManuallyDrop::drop(&mut self.command_pool);
            ManuallyDrop::drop(&mut self.ui_framebuffers);
            ManuallyDrop::drop(&mut self.world_framebuffers);
            ManuallyDrop::drop(&mut self.ui_pass);
            ManuallyDrop::drop(&mut self.world_pass);
            ManuallyDrop::drop(&mut self.depth_buffer);
            ManuallyDrop::drop(&mut self.swapchain);
            ManuallyDrop::drop(&mut self.surface);
            ManuallyDrop::drop(&mut self.instance);
        }
    }
}

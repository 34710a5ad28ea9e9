//! Command pool and command buffer management.
//!
//! - [`CommandPool`] owns a VkCommandPool for one queue family
//! - [`CommandBuffer`] wraps a VkCommandBuffer with recording helpers and
//!   a debug-only state machine that catches begin/end misuse
//!
//! Command buffer handles are freed when their pool is destroyed; the
//! wrapper never frees individually.

use std::sync::Arc;

use ash::vk;
use tracing::info;

use crate::device::Device;
use crate::error::RhiResult;
use crate::render_pass::RenderPass;

/// Vulkan command pool wrapper.
///
/// Not thread-safe; create one pool per recording thread.
pub struct CommandPool {
    device: Arc<Device>,
    pool: vk::CommandPool,
    queue_family_index: u32,
}

impl CommandPool {
    /// Creates a pool for the given queue family with the
    /// `RESET_COMMAND_BUFFER` flag, so per-frame buffers can be reset
    /// individually.
    pub fn new(device: Arc<Device>, queue_family_index: u32) -> RhiResult<Self> {
        let create_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(queue_family_index)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);

        let pool = unsafe { device.handle().create_command_pool(&create_info, None)? };

        info!(
            "Command pool created for queue family {}",
            queue_family_index
        );

        Ok(Self {
            device,
            pool,
            queue_family_index,
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::CommandPool {
        self.pool
    }

    #[inline]
    pub fn queue_family_index(&self) -> u32 {
        self.queue_family_index
    }

    /// Allocates `count` primary command buffers.
    pub fn allocate_command_buffers(&self, count: u32) -> RhiResult<Vec<CommandBuffer>> {
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);

        let buffers = unsafe { self.device.handle().allocate_command_buffers(&alloc_info)? };

        Ok(buffers
            .into_iter()
            .map(|buffer| CommandBuffer {
                device: self.device.clone(),
                buffer,
                state: RecordingState::Ready,
            })
            .collect())
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_command_pool(self.pool, None);
        }
        info!(
            "Command pool destroyed for queue family {}",
            self.queue_family_index
        );
    }
}

/// Recording lifecycle of a command buffer. Mis-sequenced begin/end/reset
/// calls are programmer errors and are asserted in debug builds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordingState {
    /// Fresh or reset; ready for `begin`.
    Ready,
    /// Between `begin` and `end`.
    Recording,
    /// Ended; ready for submission.
    Executable,
}

/// Vulkan command buffer wrapper.
pub struct CommandBuffer {
    device: Arc<Device>,
    buffer: vk::CommandBuffer,
    state: RecordingState,
}

impl CommandBuffer {
    /// Returns the raw Vulkan command buffer handle.
    #[inline]
    pub fn handle(&self) -> vk::CommandBuffer {
        self.buffer
    }

    #[inline]
    pub fn state(&self) -> RecordingState {
        self.state
    }

    /// Begins recording for one-time submission.
    pub fn begin(&mut self) -> RhiResult<()> {
        debug_assert_eq!(
            self.state,
            RecordingState::Ready,
            "begin called on a command buffer that was not reset"
        );

        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

        unsafe {
            self.device
                .handle()
                .begin_command_buffer(self.buffer, &begin_info)?;
        }

        self.state = RecordingState::Recording;
        Ok(())
    }

    /// Ends recording; the buffer becomes submittable.
    pub fn end(&mut self) -> RhiResult<()> {
        debug_assert_eq!(
            self.state,
            RecordingState::Recording,
            "end called on a command buffer that is not recording"
        );

        unsafe {
            self.device.handle().end_command_buffer(self.buffer)?;
        }

        self.state = RecordingState::Executable;
        Ok(())
    }

    /// Resets the buffer so it can be re-recorded.
    pub fn reset(&mut self) -> RhiResult<()> {
        debug_assert_ne!(
            self.state,
            RecordingState::Recording,
            "reset called on a command buffer that is still recording"
        );

        unsafe {
            self.device
                .handle()
                .reset_command_buffer(self.buffer, vk::CommandBufferResetFlags::empty())?;
        }

        self.state = RecordingState::Ready;
        Ok(())
    }

    /// Begins a render pass over the given framebuffer with INLINE subpass
    /// contents.
    pub fn begin_render_pass(
        &self,
        render_pass: &RenderPass,
        framebuffer: vk::Framebuffer,
        extent: vk::Extent2D,
        clear_values: &[vk::ClearValue],
    ) {
        debug_assert_eq!(self.state, RecordingState::Recording);

        let begin_info = vk::RenderPassBeginInfo::default()
            .render_pass(render_pass.handle())
            .framebuffer(framebuffer)
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            })
            .clear_values(clear_values);

        unsafe {
            self.device.handle().cmd_begin_render_pass(
                self.buffer,
                &begin_info,
                vk::SubpassContents::INLINE,
            );
        }
    }

    pub fn end_render_pass(&self) {
        debug_assert_eq!(self.state, RecordingState::Recording);
        unsafe {
            self.device.handle().cmd_end_render_pass(self.buffer);
        }
    }

    /// Sets a full-extent viewport (flipped Y, so world space is y-up) and
    /// scissor.
    pub fn set_viewport_and_scissor(&self, extent: vk::Extent2D) {
        debug_assert_eq!(self.state, RecordingState::Recording);

        let viewport = vk::Viewport {
            x: 0.0,
            y: extent.height as f32,
            width: extent.width as f32,
            height: -(extent.height as f32),
            min_depth: 0.0,
            max_depth: 1.0,
        };
        let scissor = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        };

        unsafe {
            self.device
                .handle()
                .cmd_set_viewport(self.buffer, 0, &[viewport]);
            self.device
                .handle()
                .cmd_set_scissor(self.buffer, 0, &[scissor]);
        }
    }

    pub fn bind_pipeline(&self, pipeline: vk::Pipeline) {
        debug_assert_eq!(self.state, RecordingState::Recording);
        unsafe {
            self.device.handle().cmd_bind_pipeline(
                self.buffer,
                vk::PipelineBindPoint::GRAPHICS,
                pipeline,
            );
        }
    }

    pub fn bind_descriptor_set(
        &self,
        layout: vk::PipelineLayout,
        descriptor_set: vk::DescriptorSet,
    ) {
        debug_assert_eq!(self.state, RecordingState::Recording);
        unsafe {
            self.device.handle().cmd_bind_descriptor_sets(
                self.buffer,
                vk::PipelineBindPoint::GRAPHICS,
                layout,
                0,
                &[descriptor_set],
                &[],
            );
        }
    }

    pub fn bind_vertex_buffer(&self, buffer: vk::Buffer) {
        debug_assert_eq!(self.state, RecordingState::Recording);
        unsafe {
            self.device
                .handle()
                .cmd_bind_vertex_buffers(self.buffer, 0, &[buffer], &[0]);
        }
    }

    pub fn bind_index_buffer(&self, buffer: vk::Buffer) {
        debug_assert_eq!(self.state, RecordingState::Recording);
        unsafe {
            self.device.handle().cmd_bind_index_buffer(
                self.buffer,
                buffer,
                0,
                vk::IndexType::UINT32,
            );
        }
    }

    pub fn push_constants(&self, layout: vk::PipelineLayout, stages: vk::ShaderStageFlags, data: &[u8]) {
        debug_assert_eq!(self.state, RecordingState::Recording);
        unsafe {
            self.device
                .handle()
                .cmd_push_constants(self.buffer, layout, stages, 0, data);
        }
    }

    pub fn draw_indexed(&self, index_count: u32) {
        debug_assert_eq!(self.state, RecordingState::Recording);
        unsafe {
            self.device
                .handle()
                .cmd_draw_indexed(self.buffer, index_count, 1, 0, 0, 0);
        }
    }
}

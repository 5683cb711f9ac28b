//! The abstract render interface implemented by backends
//!
//! Every recording operation takes an optional command buffer. `None`
//! records into the backend's main command buffer, which is executed when
//! it is submitted.

use std::sync::Arc;

use crate::{
    Color, CommandBuffer, CommandBufferDesc, DrawOperation, FrameBufferType, GpuProgramType,
    Rect2, Rect2I, RenderApiCapabilities, RenderStats, TextureSurface, VertexDeclaration,
};

/// Maximum number of vertex buffer slots
pub const MAX_VERTEX_BUFFERS: u32 = 16;

/// Command buffer argument of [`RenderApi`] operations
pub type CommandBufferArg<'a, A> = Option<&'a mut <A as RenderApi>::CommandBuffer>;

pub trait RenderApi: Sized {
    type CommandBuffer: CommandBuffer;
    type GraphicsPipeline;
    type ComputePipeline;
    type Texture;
    type Buffer;
    type SamplerState;
    type RenderTarget;

    fn name(&self) -> &'static str;

    fn capabilities(&self) -> &RenderApiCapabilities;

    fn render_stats(&self) -> &Arc<RenderStats>;

    fn create_command_buffer(&self, desc: CommandBufferDesc) -> Self::CommandBuffer;

    /// Bind the programs and fixed-function state of a graphics pipeline
    fn set_graphics_pipeline(
        &mut self,
        pipeline: Option<&Self::GraphicsPipeline>,
        cb: CommandBufferArg<'_, Self>,
    );

    fn set_compute_pipeline(
        &mut self,
        pipeline: Option<&Self::ComputePipeline>,
        cb: CommandBufferArg<'_, Self>,
    );

    fn set_texture(
        &mut self,
        stage: GpuProgramType,
        slot: u32,
        texture: Option<&Self::Texture>,
        surface: TextureSurface,
        cb: CommandBufferArg<'_, Self>,
    );

    fn set_sampler_state(
        &mut self,
        stage: GpuProgramType,
        slot: u32,
        sampler: Option<&Self::SamplerState>,
        cb: CommandBufferArg<'_, Self>,
    );

    fn set_load_store_texture(
        &mut self,
        stage: GpuProgramType,
        slot: u32,
        texture: Option<&Self::Texture>,
        surface: TextureSurface,
        cb: CommandBufferArg<'_, Self>,
    );

    /// Bind a typed buffer, sampled or as load-store storage
    fn set_buffer(
        &mut self,
        stage: GpuProgramType,
        slot: u32,
        buffer: Option<&Self::Buffer>,
        load_store: bool,
        cb: CommandBufferArg<'_, Self>,
    );

    fn set_param_block_buffer(
        &mut self,
        stage: GpuProgramType,
        slot: u32,
        buffer: Option<&Self::Buffer>,
        cb: CommandBufferArg<'_, Self>,
    );

    /// Bind `buffers` to consecutive slots starting at `index`
    fn set_vertex_buffers(
        &mut self,
        index: u32,
        buffers: &[Option<Self::Buffer>],
        cb: CommandBufferArg<'_, Self>,
    );

    fn set_index_buffer(&mut self, buffer: Option<&Self::Buffer>, cb: CommandBufferArg<'_, Self>);

    fn set_vertex_declaration(
        &mut self,
        declaration: Option<&Arc<VertexDeclaration>>,
        cb: CommandBufferArg<'_, Self>,
    );

    fn set_draw_operation(&mut self, op: DrawOperation, cb: CommandBufferArg<'_, Self>);

    /// Set the viewport in normalized coordinates of the current target
    fn set_viewport(&mut self, area: Rect2, cb: CommandBufferArg<'_, Self>);

    fn set_scissor_rect(&mut self, rect: Rect2I, cb: CommandBufferArg<'_, Self>);

    fn set_stencil_ref(&mut self, value: u32, cb: CommandBufferArg<'_, Self>);

    /// Bind a render target, `None` restores the window's default framebuffer
    fn set_render_target(
        &mut self,
        target: Option<&Self::RenderTarget>,
        cb: CommandBufferArg<'_, Self>,
    );

    /// Clear the whole render target
    fn clear_render_target(
        &mut self,
        buffers: FrameBufferType,
        color: Color,
        depth: f32,
        stencil: u16,
        target_mask: u8,
        cb: CommandBufferArg<'_, Self>,
    );

    /// Clear the area covered by the current viewport
    fn clear_viewport(
        &mut self,
        buffers: FrameBufferType,
        color: Color,
        depth: f32,
        stencil: u16,
        target_mask: u8,
        cb: CommandBufferArg<'_, Self>,
    );

    fn draw(
        &mut self,
        vertex_offset: u32,
        vertex_count: u32,
        instance_count: u32,
        cb: CommandBufferArg<'_, Self>,
    );

    fn draw_indexed(
        &mut self,
        start_index: u32,
        index_count: u32,
        vertex_offset: u32,
        vertex_count: u32,
        instance_count: u32,
        cb: CommandBufferArg<'_, Self>,
    );

    fn dispatch_compute(
        &mut self,
        num_groups_x: u32,
        num_groups_y: u32,
        num_groups_z: u32,
        cb: CommandBufferArg<'_, Self>,
    );

    /// Present a window render target
    fn swap_buffers(&mut self, target: &Self::RenderTarget);

    fn begin_frame(&mut self, cb: CommandBufferArg<'_, Self>);

    fn end_frame(&mut self, cb: CommandBufferArg<'_, Self>);

    /// Append a secondary command buffer to a primary one
    fn add_commands(&mut self, primary: &mut Self::CommandBuffer, secondary: &Self::CommandBuffer);

    /// Execute a command buffer, `None` submits the main command buffer
    fn submit_command_buffer(&mut self, cb: CommandBufferArg<'_, Self>);
}

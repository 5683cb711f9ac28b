//! Device context the recorded commands execute against
//!
//! Holds everything GL keeps as global state on the render thread: bound
//! pipelines and buffers, the active render target, viewport and scissor,
//! tracked fixed-function values, the binding slots and the caches of
//! derived objects.

use std::rc::Rc;
use std::sync::Arc;

use bsf_rhi::{
    BlendStateDesc, Color, DepthStencilStateDesc, DrawOperation, FenceSource, FrameBufferType,
    GpuProgramType, IndexType, IntoRhiError, MAX_MULTIPLE_RENDER_TARGETS, MAX_VERTEX_BUFFERS,
    RasterizerStateDesc, Rect2, Rect2I, RenderApiCapabilities, RenderStats, TextureSurface,
    VertexDeclaration,
};
use glow::{Context, HasContext};
use smallvec::SmallVec;
use tracing::{debug, error, trace, warn};

use crate::{
    EvictionQueue, FixedFunctionState, FramebufferCache, GlComputePipelineState, GlFence,
    GlGpuBuffer, GlGraphicsPipelineState, GlLinkedProgram, GlRenderApiConfig, GlRenderTarget,
    GlSamplerState, GlTexture, GlVersion, InitResult, LinkStage, ProgramPipelineCache,
    RawFramebuffer, RawVertexArray, SlotAllocator, VertexArrayCache, apply_blend_state,
    apply_depth_stencil_state, apply_rasterizer_state, apply_stencil_ref, check_gl_error,
    create_framebuffer, create_vertex_array, gl_debug_message, gl_draw_mode, gl_image_format,
    gl_index_type, link_program,
};

/// Scissor rectangle as edges, in pixels from the top-left corner
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
struct ScissorRect {
    left: u32,
    top: u32,
    right: u32,
    bottom: u32,
}

impl ScissorRect {
    fn from_rect(rect: Rect2I) -> Self {
        let left = rect.x.max(0) as u32;
        let top = rect.y.max(0) as u32;
        Self {
            left,
            top,
            right: left.saturating_add(rect.width),
            bottom: top.saturating_add(rect.height),
        }
    }

    /// `glScissor` box for a target of `target_height` pixels, origin at the bottom
    fn gl_box(self, target_height: i32) -> [i32; 4] {
        let clamp = |v: u32| i32::try_from(v).unwrap_or(i32::MAX);
        [
            clamp(self.left),
            target_height.saturating_sub(clamp(self.bottom)),
            clamp(self.right.saturating_sub(self.left)),
            clamp(self.bottom.saturating_sub(self.top)),
        ]
    }
}

/// Render-thread GL state, passed to every recorded command
pub struct GlDevice {
    gl: Rc<Context>,
    version: GlVersion,
    config: GlRenderApiConfig,
    stats: Arc<RenderStats>,
    eviction: Rc<EvictionQueue>,

    slots: SlotAllocator,
    vaos: VertexArrayCache<RawVertexArray>,
    pipelines: ProgramPipelineCache<GlLinkedProgram>,
    framebuffers: FramebufferCache<RawFramebuffer>,
    fixed: FixedFunctionState,
    /// Binding target of each texture unit, zero when empty
    unit_targets: Vec<u32>,

    graphics_pipeline: Option<Rc<GlGraphicsPipelineState>>,
    compute_pipeline: Option<Rc<GlComputePipelineState>>,
    vertex_buffers: [Option<Rc<GlGpuBuffer>>; MAX_VERTEX_BUFFERS as usize],
    index_buffer: Option<Rc<GlGpuBuffer>>,
    declaration: Option<Arc<VertexDeclaration>>,
    draw_operation: DrawOperation,

    window: Rc<GlRenderTarget>,
    render_target: Rc<GlRenderTarget>,
    viewport: Rect2,
    viewport_px: Rect2I,
    scissor: ScissorRect,
    scissor_dirty: bool,
    scissor_enabled: bool,
    draw_in_progress: bool,
}

impl GlDevice {
    pub(crate) fn new(
        gl: Rc<Context>,
        version: GlVersion,
        config: GlRenderApiConfig,
        caps: &RenderApiCapabilities,
        stats: Arc<RenderStats>,
        eviction: Rc<EvictionQueue>,
        window: Rc<GlRenderTarget>,
    ) -> InitResult<Self> {
        let slots = SlotAllocator::new(caps)?;
        let log_misses = config.log_cache_misses;
        let viewport_px = Rect2::FULL.to_pixels(window.width(), window.height());

        Ok(Self {
            gl,
            version,
            config,
            stats,
            eviction,
            slots,
            vaos: VertexArrayCache::new(log_misses),
            pipelines: ProgramPipelineCache::new(log_misses),
            framebuffers: FramebufferCache::new(log_misses),
            fixed: FixedFunctionState::default(),
            unit_targets: vec![0; caps.num_combined_texture_units as usize],
            graphics_pipeline: None,
            compute_pipeline: None,
            vertex_buffers: std::array::from_fn(|_| None),
            index_buffer: None,
            declaration: None,
            draw_operation: DrawOperation::default(),
            render_target: Rc::clone(&window),
            window,
            viewport: Rect2::FULL,
            viewport_px,
            scissor: ScissorRect::default(),
            scissor_dirty: false,
            scissor_enabled: false,
            draw_in_progress: false,
        })
    }

    #[inline]
    pub fn gl(&self) -> &Rc<Context> {
        &self.gl
    }

    #[inline]
    pub fn version(&self) -> GlVersion {
        self.version
    }

    pub fn stats(&self) -> &Arc<RenderStats> {
        &self.stats
    }

    pub fn slots(&self) -> &SlotAllocator {
        &self.slots
    }

    /// Target draws and clears currently land in
    pub fn render_target(&self) -> &Rc<GlRenderTarget> {
        &self.render_target
    }

    /// The viewport of the active target, in pixels
    pub fn viewport_px(&self) -> Rect2I {
        self.viewport_px
    }

    pub fn is_scissor_enabled(&self) -> bool {
        self.scissor_enabled
    }

    pub fn is_draw_in_progress(&self) -> bool {
        self.draw_in_progress
    }

    fn check_errors(&self, operation: &str) {
        if self.config.check_gl_errors {
            check_gl_error(&self.gl, operation);
        }
    }

    fn marker(&self, message: &str) {
        if self.config.debug_markers {
            gl_debug_message(&self.gl, message);
        }
    }

    /// Destroy derived objects of resources dropped since the last call
    fn drain_evictions(&mut self) {
        if self.eviction.is_empty() {
            return;
        }

        let gl = &self.gl;
        self.eviction.drain(
            &mut self.vaos,
            &mut self.framebuffers,
            |vao| unsafe { gl.delete_vertex_array(vao) },
            |fbo| unsafe { gl.delete_framebuffer(fbo) },
        );
    }

    pub(crate) fn begin_frame(&mut self) {
        self.marker("begin frame");
        unsafe { self.gl.enable(glow::SCISSOR_TEST) };
    }

    pub(crate) fn end_frame(&mut self) {
        if self.draw_in_progress {
            warn!("Frame ended with a draw call in progress, closing it");
            self.end_draw();
        }

        unsafe { self.gl.disable(glow::SCISSOR_TEST) };
        self.drain_evictions();
        self.marker("end frame");
    }

    pub(crate) fn set_graphics_pipeline(&mut self, pipeline: Option<Rc<GlGraphicsPipelineState>>) {
        for stage in GpuProgramType::GRAPHICS {
            self.slots.reset_stage(stage);
        }

        match &pipeline {
            Some(pipeline) => self.apply_fixed_function(
                pipeline.blend_state(),
                pipeline.rasterizer_state(),
                pipeline.depth_stencil_state(),
            ),
            None => self.apply_fixed_function(
                &BlendStateDesc::default(),
                &RasterizerStateDesc::default(),
                &DepthStencilStateDesc::default(),
            ),
        }

        self.graphics_pipeline = pipeline;
        self.check_errors("set_graphics_pipeline");
    }

    fn apply_fixed_function(
        &mut self,
        blend: &BlendStateDesc,
        rasterizer: &RasterizerStateDesc,
        depth_stencil: &DepthStencilStateDesc,
    ) {
        apply_blend_state(&self.gl, blend, &mut self.fixed);
        apply_rasterizer_state(&self.gl, self.version, rasterizer, &mut self.fixed);
        apply_depth_stencil_state(&self.gl, depth_stencil, &mut self.fixed);
        self.set_scissor_test_enable(self.fixed.scissor_enable);
    }

    pub(crate) fn set_compute_pipeline(&mut self, pipeline: Option<Rc<GlComputePipelineState>>) {
        self.slots.reset_stage(GpuProgramType::Compute);
        self.compute_pipeline = pipeline;
    }

    pub(crate) fn set_texture(
        &mut self,
        stage: GpuProgramType,
        slot: u32,
        texture: Option<&Rc<GlTexture>>,
        surface: TextureSurface,
    ) {
        if matches!(stage, GpuProgramType::Hull | GpuProgramType::Domain) {
            error!("OpenGL cannot assign textures to {} programs", stage);
            return;
        }

        let unit = match texture {
            Some(_) => {
                let unit = self.slots.texture_unit(stage, slot);
                self.slots.commit_texture_unit(stage, unit, Some(slot));
                unit
            }
            None => match self.slots.release_texture_unit(stage, slot) {
                Some(unit) => unit,
                None => {
                    trace!("Texture slot {} of the {} stage is already empty", slot, stage);
                    return;
                }
            },
        };

        let Some(previous) = self.unit_targets.get(unit as usize).copied() else {
            error!("Texture unit {} is out of range", unit);
            return;
        };

        unsafe {
            self.gl.active_texture(glow::TEXTURE0 + unit);

            match texture {
                Some(texture) => {
                    if !covers_whole_texture(texture, surface) {
                        warn!(
                            "Texture views are not supported, binding all of {} for the {} stage",
                            texture.id(),
                            stage
                        );
                    }

                    if previous != 0 && previous != texture.target() {
                        self.gl.bind_texture(previous, None);
                    }
                    self.gl.bind_texture(texture.target(), Some(texture.raw()));
                    self.unit_targets[unit as usize] = texture.target();
                }
                None => {
                    if previous != 0 {
                        self.gl.bind_texture(previous, None);
                    }
                    self.unit_targets[unit as usize] = 0;
                }
            }
        }

        trace!("Bound texture slot {} of the {} stage to unit {}", slot, stage, unit);
        self.check_errors("set_texture");
    }

    pub(crate) fn set_sampler_state(
        &mut self,
        stage: GpuProgramType,
        slot: u32,
        sampler: Option<&Rc<GlSamplerState>>,
    ) {
        if matches!(stage, GpuProgramType::Hull | GpuProgramType::Domain) {
            error!("OpenGL cannot assign samplers to {} programs", stage);
            return;
        }

        let unit = self.slots.texture_unit(stage, slot);
        self.slots.commit_texture_unit(stage, unit, Some(slot));

        unsafe { self.gl.bind_sampler(unit, sampler.map(|s| s.raw())) };
        self.check_errors("set_sampler_state");
    }

    pub(crate) fn set_load_store_texture(
        &mut self,
        stage: GpuProgramType,
        slot: u32,
        texture: Option<&Rc<GlTexture>>,
        surface: TextureSurface,
    ) {
        if !self.version.load_store_support() {
            warn!("Load-store textures are not supported on {}", self.version);
            return;
        }

        if !matches!(stage, GpuProgramType::Fragment | GpuProgramType::Compute) {
            error!("OpenGL cannot assign load-store textures to {} programs", stage);
            return;
        }

        let unit = self.slots.image_unit(stage, slot);
        self.slots.commit_image_unit(stage, unit, texture.map(|_| slot));

        unsafe {
            match texture {
                Some(texture) => {
                    let layered = texture.desc().num_faces() > 1 && surface.num_faces != 1;
                    self.gl.bind_image_texture(
                        unit,
                        Some(texture.raw()),
                        surface.mip_level as i32,
                        layered,
                        surface.face as i32,
                        glow::READ_WRITE,
                        gl_image_format(texture.desc().format),
                    );
                }
                None => self.gl.bind_image_texture(
                    unit,
                    None,
                    0,
                    false,
                    0,
                    glow::READ_WRITE,
                    glow::RGBA8,
                ),
            }
        }

        self.check_errors("set_load_store_texture");
    }

    /// Bind a standard buffer to a shader storage binding
    ///
    /// Storage bindings are not remapped, `slot` is the GL binding point.
    pub(crate) fn set_buffer(&mut self, stage: GpuProgramType, slot: u32, buffer: Option<&Rc<GlGpuBuffer>>) {
        if !self.version.compute_support() {
            warn!("Storage buffers are not supported on {}", self.version);
            return;
        }

        trace!("Binding storage buffer slot {} of the {} stage", slot, stage);
        unsafe {
            self.gl
                .bind_buffer_base(glow::SHADER_STORAGE_BUFFER, slot, buffer.map(|b| b.raw()));
        }
        self.check_errors("set_buffer");
    }

    pub(crate) fn set_param_block_buffer(
        &mut self,
        stage: GpuProgramType,
        slot: u32,
        buffer: Option<&Rc<GlGpuBuffer>>,
    ) {
        let binding = self.slots.uniform_block_binding(stage, slot);
        unsafe {
            self.gl
                .bind_buffer_base(glow::UNIFORM_BUFFER, binding, buffer.map(|b| b.raw()));
        }
        self.check_errors("set_param_block_buffer");
    }

    pub(crate) fn set_vertex_buffers(&mut self, index: u32, buffers: &[Option<Rc<GlGpuBuffer>>]) {
        for (i, buffer) in buffers.iter().enumerate() {
            if let Some(entry) = self.vertex_buffers.get_mut(index as usize + i) {
                *entry = buffer.clone();
            }
        }
    }

    pub(crate) fn set_index_buffer(&mut self, buffer: Option<Rc<GlGpuBuffer>>) {
        self.index_buffer = buffer;
    }

    pub(crate) fn set_vertex_declaration(&mut self, declaration: Option<Arc<VertexDeclaration>>) {
        self.declaration = declaration;
    }

    pub(crate) fn set_draw_operation(&mut self, op: DrawOperation) {
        self.draw_operation = op;
    }

    pub(crate) fn set_stencil_ref(&mut self, value: u32) {
        apply_stencil_ref(&self.gl, value, &mut self.fixed);
    }

    /// Bind `target`, or the window when `None`
    pub(crate) fn set_render_target(&mut self, target: Option<Rc<GlRenderTarget>>) {
        self.drain_evictions();

        let target = target.unwrap_or_else(|| Rc::clone(&self.window));
        let gl = &self.gl;

        match target.framebuffer_parts() {
            Some((key, desc)) => {
                let fbo = self.framebuffers.get_framebuffer(key, |_| {
                    create_framebuffer(gl, desc).map_err(IntoRhiError::into_rhi_error)
                });
                match fbo {
                    Ok(fbo) => unsafe { gl.bind_framebuffer(glow::FRAMEBUFFER, Some(*fbo)) },
                    Err(e) => {
                        error!("Cannot bind render target: {}", e);
                        return;
                    }
                }
            }
            None => unsafe { gl.bind_framebuffer(glow::FRAMEBUFFER, None) },
        }

        if self.version.framebuffer_srgb_support() {
            unsafe {
                if target.hw_gamma() {
                    gl.enable(glow::FRAMEBUFFER_SRGB);
                } else {
                    gl.disable(glow::FRAMEBUFFER_SRGB);
                }
            }
        }

        self.render_target = target;
        self.apply_viewport();
        self.check_errors("set_render_target");
    }

    pub(crate) fn set_viewport(&mut self, area: Rect2) {
        self.viewport = area;
        self.apply_viewport();
    }

    fn apply_viewport(&mut self) {
        let target = &self.render_target;
        self.viewport_px = self.viewport.to_pixels(target.width(), target.height());

        let vp = self.viewport_px;
        unsafe {
            self.gl.viewport(vp.x, vp.y, vp.width as i32, vp.height as i32);

            // Clip to the viewport unless a scissor rect is active
            if !self.scissor_enabled {
                self.gl.enable(glow::SCISSOR_TEST);
                self.gl.scissor(vp.x, vp.y, vp.width as i32, vp.height as i32);
            }
        }
    }

    /// Store the scissor rect, applied on the next draw if scissoring is on
    pub(crate) fn set_scissor_rect(&mut self, rect: Rect2I) {
        self.scissor = ScissorRect::from_rect(rect);
        if self.scissor_enabled {
            self.scissor_dirty = true;
        }
    }

    fn set_scissor_test_enable(&mut self, enable: bool) {
        let height = self.render_target.height() as i32;

        unsafe {
            if enable {
                let s = self.scissor;
                if s.right < s.left || s.bottom < s.top {
                    warn!("Degenerate scissor rect {:?}", s);
                }

                let [x, y, width, height] = s.gl_box(height);
                self.gl.enable(glow::SCISSOR_TEST);
                self.gl.scissor(x, y, width, height);
            } else {
                // GL needs the scissor reset when the test is turned off
                let vp = self.viewport_px;
                self.gl.disable(glow::SCISSOR_TEST);
                self.gl.scissor(
                    vp.x,
                    height - (vp.y + vp.height as i32),
                    vp.width as i32,
                    vp.height as i32,
                );
            }
        }

        self.scissor_enabled = enable;
        self.scissor_dirty = false;
    }

    pub(crate) fn clear_render_target(
        &mut self,
        buffers: FrameBufferType,
        color: Color,
        depth: f32,
        stencil: u16,
        target_mask: u8,
    ) {
        let rect = Rect2I::new(0, 0, self.render_target.width(), self.render_target.height());
        self.clear_area(buffers, color, depth, stencil, rect, target_mask);
    }

    pub(crate) fn clear_viewport(
        &mut self,
        buffers: FrameBufferType,
        color: Color,
        depth: f32,
        stencil: u16,
        target_mask: u8,
    ) {
        let rect = self.viewport_px;
        self.clear_area(buffers, color, depth, stencil, rect, target_mask);
    }

    /// Clear `rect` of the active target with write masks forced on
    ///
    /// Scissor and write-mask state is restored afterwards.
    fn clear_area(
        &mut self,
        buffers: FrameBufferType,
        color: Color,
        depth: f32,
        stencil: u16,
        rect: Rect2I,
        target_mask: u8,
    ) {
        let target = Rc::clone(&self.render_target);
        let color_masked: [bool; MAX_MULTIPLE_RENDER_TARGETS] = std::array::from_fn(|i| {
            target.has_color_buffer(i) && self.fixed.is_color_masked(i)
        });

        let gl = Rc::clone(&self.gl);
        let scissor_was_enabled = unsafe { gl.is_enabled(glow::SCISSOR_TEST) };
        let old_scissor = self.scissor;
        if scissor_was_enabled {
            unsafe { gl.disable(glow::SCISSOR_TEST) };
        }

        let clear_entire = rect.is_empty()
            || (rect.x == 0
                && rect.y == 0
                && rect.width == target.width()
                && rect.height == target.height());

        if !clear_entire {
            self.set_scissor_rect(rect);
            self.set_scissor_test_enable(true);
        }

        unsafe {
            if buffers.contains(FrameBufferType::COLOR) {
                for (i, _) in color_masked.iter().enumerate().filter(|(_, masked)| **masked) {
                    gl.color_mask_draw_buffer(i as u32, true, true, true, true);
                }
            }
            if buffers.contains(FrameBufferType::DEPTH) && !self.fixed.depth_write {
                gl.depth_mask(true);
            }
            if buffers.contains(FrameBufferType::STENCIL) {
                gl.stencil_mask(0xFFFF_FFFF);
            }

            if target_mask == 0xFF {
                let mut flags = 0;
                if buffers.contains(FrameBufferType::COLOR) {
                    flags |= glow::COLOR_BUFFER_BIT;
                    gl.clear_color(color.r, color.g, color.b, color.a);
                }
                if buffers.contains(FrameBufferType::DEPTH) {
                    flags |= glow::DEPTH_BUFFER_BIT;
                    gl.clear_depth_f32(depth);
                }
                if buffers.contains(FrameBufferType::STENCIL) {
                    flags |= glow::STENCIL_BUFFER_BIT;
                    gl.clear_stencil(stencil as i32);
                }
                gl.clear(flags);
            } else {
                if buffers.contains(FrameBufferType::COLOR) {
                    let values = [color.r, color.g, color.b, color.a];
                    for i in 0..MAX_MULTIPLE_RENDER_TARGETS {
                        if target.has_color_buffer(i) && (1u32 << i) & target_mask as u32 != 0 {
                            gl.clear_buffer_f32_slice(glow::COLOR, i as u32, &values);
                        }
                    }
                }

                let clear_depth = buffers.contains(FrameBufferType::DEPTH);
                let clear_stencil = buffers.contains(FrameBufferType::STENCIL);
                if clear_depth && clear_stencil {
                    gl.clear_buffer_depth_stencil(glow::DEPTH_STENCIL, 0, depth, stencil as i32);
                } else if clear_depth {
                    gl.clear_buffer_f32_slice(glow::DEPTH, 0, &[depth]);
                } else if clear_stencil {
                    gl.clear_buffer_i32_slice(glow::STENCIL, 0, &[stencil as i32]);
                }
            }
        }

        if !clear_entire {
            self.set_scissor_test_enable(false);
        }

        if scissor_was_enabled {
            unsafe { gl.enable(glow::SCISSOR_TEST) };
            self.scissor = old_scissor;
        }

        unsafe {
            if buffers.contains(FrameBufferType::DEPTH) && !self.fixed.depth_write {
                gl.depth_mask(false);
            }
            if buffers.contains(FrameBufferType::COLOR) {
                for (i, _) in color_masked.iter().enumerate().filter(|(_, masked)| **masked) {
                    let [r, g, b, a] = self.fixed.color_write[i];
                    gl.color_mask_draw_buffer(i as u32, r, g, b, a);
                }
            }
            if buffers.contains(FrameBufferType::STENCIL) {
                gl.stencil_mask(self.fixed.stencil_write_mask);
            }
        }

        self.check_errors("clear");
    }

    fn draw_mode(&self) -> u32 {
        let adjacency = self
            .graphics_pipeline
            .as_ref()
            .and_then(|pipeline| pipeline.program(GpuProgramType::Geometry))
            .is_some_and(|program| program.requires_adjacency());
        gl_draw_mode(self.draw_operation, adjacency)
    }

    /// Bind the linked program and VAO for a draw
    ///
    /// Returns false when the draw has to be skipped.
    fn begin_draw(&mut self) -> bool {
        if self.draw_in_progress {
            error!("Calling begin_draw without finishing the previous draw call");
            return false;
        }

        self.drain_evictions();

        let Some(pipeline) = self.graphics_pipeline.clone() else {
            warn!("Cannot render without a set vertex shader.");
            return false;
        };
        let Some(vertex_program) = pipeline.program(GpuProgramType::Vertex).cloned() else {
            warn!("Cannot render without a set vertex shader.");
            return false;
        };

        let Some(declaration) = self.declaration.clone() else {
            warn!("Cannot render without a set vertex declaration.");
            return false;
        };

        self.draw_in_progress = true;

        if self.scissor_dirty {
            self.set_scissor_test_enable(true);
        }

        let gl = &self.gl;
        let slots = &self.slots;

        let linked = self.pipelines.get_pipeline(pipeline.pipeline_key(), |_| {
            let stages: SmallVec<[LinkStage<'_>; 5]> = GpuProgramType::GRAPHICS
                .iter()
                .filter_map(|stage| pipeline.program(*stage))
                .map(|program| program.link_stage())
                .collect();
            link_program(gl, &stages, |stage, block| slots.uniform_block_binding(stage, block))
                .map_err(IntoRhiError::into_rhi_error)
        });

        match linked {
            Ok(linked) => unsafe {
                gl.use_program(Some(linked.raw()));
                assign_units(gl, slots, linked);
            },
            Err(e) => {
                error!("Cannot draw, failed to link the pipeline: {}", e);
                self.draw_in_progress = false;
                return false;
            }
        }

        let bound: SmallVec<[_; MAX_VERTEX_BUFFERS as usize]> = self
            .vertex_buffers
            .iter()
            .map(|buffer| buffer.as_ref().map(|b| b.id()))
            .collect();
        let vertex_buffers = &self.vertex_buffers;

        let vao = self.vaos.get_vao(vertex_program.id(), &declaration, &bound, |_| {
            create_vertex_array(gl, &declaration, vertex_program.vertex_inputs(), vertex_buffers)
        });

        match vao {
            Ok(vao) => unsafe { gl.bind_vertex_array(Some(*vao)) },
            Err(e) => {
                error!("Cannot draw without a vertex array: {}", e);
                self.draw_in_progress = false;
                return false;
            }
        }

        true
    }

    fn end_draw(&mut self) {
        if !self.draw_in_progress {
            return;
        }

        if self.version.load_store_support() {
            unsafe { self.gl.memory_barrier(glow::ALL_BARRIER_BITS) };
        }
        self.draw_in_progress = false;
    }

    pub(crate) fn draw(&mut self, vertex_offset: u32, vertex_count: u32, instance_count: u32) {
        let mode = self.draw_mode();
        if !self.begin_draw() {
            return;
        }

        unsafe {
            if instance_count <= 1 {
                self.gl.draw_arrays(mode, vertex_offset as i32, vertex_count as i32);
            } else {
                self.gl.draw_arrays_instanced(
                    mode,
                    vertex_offset as i32,
                    vertex_count as i32,
                    instance_count as i32,
                );
            }
        }

        self.check_errors("draw");
        self.end_draw();
    }

    pub(crate) fn draw_indexed(
        &mut self,
        start_index: u32,
        index_count: u32,
        vertex_offset: u32,
        instance_count: u32,
    ) {
        let Some(index_buffer) = self.index_buffer.clone() else {
            warn!("Cannot draw indexed because index buffer is not set.");
            return;
        };
        let Some(index_type) = index_buffer.index_type() else {
            warn!("{} has no index type", index_buffer.id());
            return;
        };

        let Some(offset) = index_byte_offset(index_type, start_index) else {
            error!("Start index {} is out of range for {:?} indices", start_index, index_type);
            return;
        };

        let mode = self.draw_mode();
        if !self.begin_draw() {
            return;
        }

        unsafe {
            self.gl
                .bind_buffer(glow::ELEMENT_ARRAY_BUFFER, Some(index_buffer.raw()));

            if instance_count <= 1 {
                self.gl.draw_elements_base_vertex(
                    mode,
                    index_count as i32,
                    gl_index_type(index_type),
                    offset,
                    vertex_offset as i32,
                );
            } else {
                self.gl.draw_elements_instanced_base_vertex(
                    mode,
                    index_count as i32,
                    gl_index_type(index_type),
                    offset,
                    instance_count as i32,
                    vertex_offset as i32,
                );
            }
        }

        self.check_errors("draw_indexed");
        self.end_draw();
    }

    pub(crate) fn dispatch_compute(&mut self, groups_x: u32, groups_y: u32, groups_z: u32) {
        let Some(pipeline) = self.compute_pipeline.clone() else {
            warn!("Cannot dispatch compute without a set compute program.");
            return;
        };

        if !self.version.compute_support() {
            warn!("Compute programs are not supported on {}", self.version);
            return;
        }

        let Some(linked) = pipeline.program().linked() else {
            error!("Compute program {} was never linked", pipeline.program().id());
            return;
        };

        unsafe {
            self.gl.use_program(Some(linked.raw()));
            assign_units(&self.gl, &self.slots, linked);
            self.gl.dispatch_compute(groups_x, groups_y, groups_z);
            self.gl.memory_barrier(glow::ALL_BARRIER_BITS);
        }

        self.check_errors("dispatch_compute");
    }
}

/// Point the sampler and image uniforms of `linked` at their units
///
/// The program must be current.
unsafe fn assign_units(gl: &Context, slots: &SlotAllocator, linked: &GlLinkedProgram) {
    unsafe {
        for uniform in linked.textures() {
            let unit = slots.texture_unit(uniform.stage, uniform.slot);
            gl.uniform_1_i32(Some(&uniform.location), unit as i32);
        }
        for uniform in linked.images() {
            let unit = slots.image_unit(uniform.stage, uniform.slot);
            gl.uniform_1_i32(Some(&uniform.location), unit as i32);
        }
    }
}

/// Byte offset of `start_index` into the index buffer, `None` past `i32::MAX`
fn index_byte_offset(index_type: IndexType, start_index: u32) -> Option<i32> {
    index_type
        .size()
        .checked_mul(start_index)
        .and_then(|offset| i32::try_from(offset).ok())
}

/// Whether `surface` selects every mip and face of `texture`
fn covers_whole_texture(texture: &GlTexture, surface: TextureSurface) -> bool {
    let desc = texture.desc();
    let all_mips = surface.num_mip_levels == 0 || surface.num_mip_levels > desc.num_mips;
    let all_faces = surface.num_faces == 0 || surface.num_faces >= desc.num_faces();
    surface.mip_level == 0 && surface.face == 0 && all_mips && all_faces
}

impl FenceSource for GlDevice {
    type Fence = GlFence;

    fn insert_fence(&mut self) -> Option<GlFence> {
        GlFence::insert(&self.gl)
    }
}

impl Drop for GlDevice {
    fn drop(&mut self) {
        let gl = &self.gl;
        self.vaos.clear(|vao| unsafe { gl.delete_vertex_array(vao) });
        self.framebuffers
            .clear(|fbo| unsafe { gl.delete_framebuffer(fbo) });
        self.pipelines.clear(|linked| linked.destroy(gl));
        debug!("Destroyed device caches");
    }
}

impl std::fmt::Debug for GlDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlDevice")
            .field("version", &self.version)
            .field("vaos", &self.vaos.len())
            .field("pipelines", &self.pipelines.len())
            .field("framebuffers", &self.framebuffers.len())
            .field("draw_in_progress", &self.draw_in_progress)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scissor_edges_saturate() {
        let scissor = ScissorRect::from_rect(Rect2I::new(100, 0, u32::MAX, 10));
        assert_eq!(scissor.left, 100);
        assert_eq!(scissor.right, u32::MAX);
        assert_eq!(scissor.bottom, 10);
        assert_eq!(scissor.gl_box(600), [100, 590, i32::MAX, 10]);
    }

    #[test]
    fn scissor_box_flips_to_bottom_origin() {
        let scissor = ScissorRect::from_rect(Rect2I::new(10, 20, 30, 40));
        assert_eq!(scissor.gl_box(100), [10, 40, 30, 40]);
    }

    #[test]
    fn index_offsets_reject_overflow() {
        assert_eq!(index_byte_offset(IndexType::U16, 6), Some(12));
        assert_eq!(index_byte_offset(IndexType::U32, (1 << 29) - 1), Some(i32::MAX - 3));
        assert_eq!(index_byte_offset(IndexType::U32, 1 << 29), None);
        assert_eq!(index_byte_offset(IndexType::U32, u32::MAX), None);
    }

    #[test]
    fn scissor_clamps_negative_origin() {
        let scissor = ScissorRect::from_rect(Rect2I::new(-20, -5, 64, 32));
        assert_eq!(
            scissor,
            ScissorRect {
                left: 0,
                top: 0,
                right: 64,
                bottom: 32,
            }
        );
    }
}

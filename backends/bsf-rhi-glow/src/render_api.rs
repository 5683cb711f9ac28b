//! The OpenGL render API
//!
//! Every operation records a command; commands run against the [`GlDevice`]
//! when their buffer is submitted. Render statistics are counted when a
//! command is recorded.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use bsf_rhi::{
    Color, CommandBuffer, CommandBufferArg, CommandBufferDesc, DrawOperation, FrameBufferType,
    GpuBufferDesc, GpuInfo, GpuProgramDesc, GpuProgramType, MAX_VERTEX_BUFFERS, QueueType, Rect2,
    Rect2I, RenderApi, RenderApiCapabilities, RenderStat, RenderStats, RhiError, RhiResult,
    SamplerStateDesc, TextureDesc, TextureSurface, VertexDeclaration, logging,
};
use glow::{Context, HasContext};
use smallvec::SmallVec;
use tracing::{debug, error, info, trace};

use crate::{
    EvictionQueue, GlCommandBuffer, GlComputePipelineState, GlDevice, GlGpuBuffer,
    GlGraphicsPipelineState, GlLimits, GlQueryFactory, GlRenderApiConfig, GlRenderTarget,
    GlSamplerState, GlTexture, GlVersion, GlslGpuProgram, GraphicsPipelineDesc, InitResult,
    PLUGIN_NAME, RenderTextureDesc, build_capabilities,
};

/// The main command buffer, shared with queries that record into it
pub type MainCommandBuffer = Rc<RefCell<GlCommandBuffer<GlDevice>>>;

/// Called after the main command buffer is submitted by a present
pub type PresentHandler = Box<dyn FnMut(&GlRenderTarget)>;

/// OpenGL implementation of [`RenderApi`]
///
/// Takes ownership of a current GL context. The host keeps owning the
/// window and presents through a [`PresentHandler`].
pub struct GlRenderApi {
    gl: Rc<Context>,
    version: GlVersion,
    config: GlRenderApiConfig,
    limits: GlLimits,
    caps: RenderApiCapabilities,
    gpu_info: GpuInfo,
    stats: Arc<RenderStats>,
    eviction: Rc<EvictionQueue>,
    window: Rc<GlRenderTarget>,
    main: MainCommandBuffer,
    device: GlDevice,
    present: Option<PresentHandler>,
}

impl GlRenderApi {
    /// Initialize the render API on a current GL context
    ///
    /// Fails on OpenGL versions below 4.1 and OpenGL ES below 3.1.
    pub fn new(gl: Context, config: GlRenderApiConfig) -> InitResult<Self> {
        let gl = Rc::new(gl);

        let version = GlVersion::read(&gl);
        version.ensure_supported()?;

        let limits = GlLimits::query(&gl, version);
        let caps = build_capabilities(version, &limits);
        let gpu_info = crate::gpu_info(&limits);

        // The window starts out as the default framebuffer at its current size
        let mut viewport = [0i32; 4];
        unsafe { gl.get_parameter_i32_slice(glow::VIEWPORT, &mut viewport) };
        let window = Rc::new(GlRenderTarget::window(
            viewport[2].max(0) as u32,
            viewport[3].max(0) as u32,
            false,
        ));

        unsafe {
            gl.front_face(if config.clockwise_front_faces {
                glow::CW
            } else {
                glow::CCW
            });

            if config.seamless_cube_maps && version.seamless_cubemap_support() {
                gl.enable(glow::TEXTURE_CUBE_MAP_SEAMLESS);
            }
        }

        let stats = Arc::new(RenderStats::new());
        let eviction = EvictionQueue::new();
        let device = GlDevice::new(
            Rc::clone(&gl),
            version,
            config.clone(),
            &caps,
            Arc::clone(&stats),
            Rc::clone(&eviction),
            Rc::clone(&window),
        )?;

        info!("Using {} ({})", version, limits.version);
        logging::log_render_api_init(PLUGIN_NAME, &caps);

        Ok(Self {
            gl,
            version,
            config,
            limits,
            caps,
            gpu_info,
            stats,
            eviction,
            window,
            main: Rc::new(RefCell::new(GlCommandBuffer::new(main_desc()))),
            device,
            present: None,
        })
    }

    #[inline]
    pub fn gl(&self) -> &Rc<Context> {
        &self.gl
    }

    pub fn version(&self) -> GlVersion {
        self.version
    }

    pub fn config(&self) -> &GlRenderApiConfig {
        &self.config
    }

    pub fn limits(&self) -> &GlLimits {
        &self.limits
    }

    pub fn gpu_info(&self) -> &GpuInfo {
        &self.gpu_info
    }

    pub fn device(&self) -> &GlDevice {
        &self.device
    }

    /// The window's default framebuffer, resize it when the window changes size
    pub fn window_target(&self) -> &Rc<GlRenderTarget> {
        &self.window
    }

    pub fn main_command_buffer(&self) -> &MainCommandBuffer {
        &self.main
    }

    /// Hook the host's buffer swap into [`RenderApi::swap_buffers`]
    pub fn set_present_handler(&mut self, handler: impl FnMut(&GlRenderTarget) + 'static) {
        self.present = Some(Box::new(handler));
    }

    /// Factory for queries recorded into the main command buffer
    pub fn query_factory(&self) -> GlQueryFactory {
        GlQueryFactory::new(Rc::clone(&self.gl), self.version, Rc::clone(&self.main))
    }

    pub fn create_buffer(
        &self,
        desc: GpuBufferDesc,
        initial_data: Option<&[u8]>,
    ) -> InitResult<Rc<GlGpuBuffer>> {
        GlGpuBuffer::new(
            Rc::clone(&self.gl),
            desc,
            initial_data,
            self.version.is_es,
            Arc::clone(&self.stats),
            Rc::clone(&self.eviction),
        )
        .map(Rc::new)
    }

    pub fn create_texture(&self, desc: TextureDesc) -> InitResult<Rc<GlTexture>> {
        GlTexture::new(
            Rc::clone(&self.gl),
            desc,
            Arc::clone(&self.stats),
            Rc::clone(&self.eviction),
        )
        .map(Rc::new)
    }

    pub fn create_sampler_state(&self, desc: SamplerStateDesc) -> InitResult<Rc<GlSamplerState>> {
        GlSamplerState::new(
            Rc::clone(&self.gl),
            desc,
            self.version,
            self.limits.max_anisotropy,
            Arc::clone(&self.stats),
        )
        .map(Rc::new)
    }

    /// Compile a program for one stage
    ///
    /// Compute programs are linked right away, graphics stages on first draw.
    pub fn create_gpu_program(&self, desc: GpuProgramDesc) -> InitResult<Rc<GlslGpuProgram>> {
        let slots = self.device.slots();
        GlslGpuProgram::new(
            Rc::clone(&self.gl),
            desc,
            self.version,
            |stage, block| slots.uniform_block_binding(stage, block),
            Arc::clone(&self.stats),
        )
        .map(Rc::new)
    }

    pub fn create_graphics_pipeline(
        &self,
        desc: GraphicsPipelineDesc,
    ) -> RhiResult<Rc<GlGraphicsPipelineState>> {
        GlGraphicsPipelineState::new(desc).map(Rc::new)
    }

    pub fn create_compute_pipeline(
        &self,
        program: Rc<GlslGpuProgram>,
    ) -> RhiResult<Rc<GlComputePipelineState>> {
        GlComputePipelineState::new(program).map(Rc::new)
    }

    /// Render target over texture surfaces
    pub fn create_render_texture(&self, desc: RenderTextureDesc) -> RhiResult<Rc<GlRenderTarget>> {
        let max = self.caps.num_multi_render_targets as usize;
        if let Some(index) = desc.color_surfaces.iter().skip(max).position(Option::is_some) {
            return Err(RhiError::invalid_parameters(format!(
                "color surface {} exceeds the {} supported render targets",
                max + index,
                max
            )));
        }

        GlRenderTarget::texture(desc).map(Rc::new)
    }

    /// Run `f` on `cb`, or on the main command buffer for `None`
    fn with_buffer<R>(
        &self,
        cb: CommandBufferArg<'_, Self>,
        f: impl FnOnce(&mut GlCommandBuffer<GlDevice>) -> R,
    ) -> R {
        match cb {
            Some(cb) => f(cb),
            None => f(&mut *self.main.borrow_mut()),
        }
    }

    fn record(&self, cb: CommandBufferArg<'_, Self>, command: impl Fn(&mut GlDevice) + 'static) {
        self.with_buffer(cb, |cb| cb.queue_command(command));
    }
}

fn main_desc() -> CommandBufferDesc {
    CommandBufferDesc::primary(QueueType::Graphics)
}

impl RenderApi for GlRenderApi {
    type CommandBuffer = GlCommandBuffer<GlDevice>;
    type GraphicsPipeline = Rc<GlGraphicsPipelineState>;
    type ComputePipeline = Rc<GlComputePipelineState>;
    type Texture = Rc<GlTexture>;
    type Buffer = Rc<GlGpuBuffer>;
    type SamplerState = Rc<GlSamplerState>;
    type RenderTarget = Rc<GlRenderTarget>;

    fn name(&self) -> &'static str {
        PLUGIN_NAME
    }

    fn capabilities(&self) -> &RenderApiCapabilities {
        &self.caps
    }

    fn render_stats(&self) -> &Arc<RenderStats> {
        &self.stats
    }

    fn create_command_buffer(&self, desc: CommandBufferDesc) -> Self::CommandBuffer {
        GlCommandBuffer::new(desc)
    }

    fn set_graphics_pipeline(
        &mut self,
        pipeline: Option<&Self::GraphicsPipeline>,
        cb: CommandBufferArg<'_, Self>,
    ) {
        let pipeline = pipeline.cloned();
        self.record(cb, move |device| device.set_graphics_pipeline(pipeline.clone()));
        self.stats.increment(RenderStat::PipelineStateChanges);
    }

    fn set_compute_pipeline(
        &mut self,
        pipeline: Option<&Self::ComputePipeline>,
        cb: CommandBufferArg<'_, Self>,
    ) {
        let pipeline = pipeline.cloned();
        self.record(cb, move |device| device.set_compute_pipeline(pipeline.clone()));
        self.stats.increment(RenderStat::PipelineStateChanges);
    }

    fn set_texture(
        &mut self,
        stage: GpuProgramType,
        slot: u32,
        texture: Option<&Self::Texture>,
        surface: TextureSurface,
        cb: CommandBufferArg<'_, Self>,
    ) {
        let texture = texture.cloned();
        self.record(cb, move |device| {
            device.set_texture(stage, slot, texture.as_ref(), surface)
        });
        self.stats.increment(RenderStat::GpuParamBinds);
    }

    fn set_sampler_state(
        &mut self,
        stage: GpuProgramType,
        slot: u32,
        sampler: Option<&Self::SamplerState>,
        cb: CommandBufferArg<'_, Self>,
    ) {
        let sampler = sampler.cloned();
        self.record(cb, move |device| {
            device.set_sampler_state(stage, slot, sampler.as_ref())
        });
        self.stats.increment(RenderStat::GpuParamBinds);
    }

    fn set_load_store_texture(
        &mut self,
        stage: GpuProgramType,
        slot: u32,
        texture: Option<&Self::Texture>,
        surface: TextureSurface,
        cb: CommandBufferArg<'_, Self>,
    ) {
        let texture = texture.cloned();
        self.record(cb, move |device| {
            device.set_load_store_texture(stage, slot, texture.as_ref(), surface)
        });
        self.stats.increment(RenderStat::GpuParamBinds);
    }

    fn set_buffer(
        &mut self,
        stage: GpuProgramType,
        slot: u32,
        buffer: Option<&Self::Buffer>,
        load_store: bool,
        cb: CommandBufferArg<'_, Self>,
    ) {
        // Sampled and load-store buffers both bind as storage buffers
        trace!(
            "Recording {} buffer bind at slot {} of the {} stage",
            if load_store { "load-store" } else { "sampled" },
            slot,
            stage
        );

        let buffer = buffer.cloned();
        self.record(cb, move |device| device.set_buffer(stage, slot, buffer.as_ref()));
        self.stats.increment(RenderStat::GpuParamBinds);
    }

    fn set_param_block_buffer(
        &mut self,
        stage: GpuProgramType,
        slot: u32,
        buffer: Option<&Self::Buffer>,
        cb: CommandBufferArg<'_, Self>,
    ) {
        let buffer = buffer.cloned();
        self.record(cb, move |device| {
            device.set_param_block_buffer(stage, slot, buffer.as_ref())
        });
        self.stats.increment(RenderStat::GpuParamBinds);
    }

    fn set_vertex_buffers(
        &mut self,
        index: u32,
        buffers: &[Option<Self::Buffer>],
        cb: CommandBufferArg<'_, Self>,
    ) {
        let last = index as usize + buffers.len();
        if last > MAX_VERTEX_BUFFERS as usize {
            error!(
                "Provided vertex buffer slot range is invalid: {} to {}.",
                index, last
            );
            return;
        }

        let buffers: SmallVec<[Option<Rc<GlGpuBuffer>>; 4]> = buffers.iter().cloned().collect();
        self.record(cb, move |device| device.set_vertex_buffers(index, &buffers));
        self.stats.increment(RenderStat::VertexBufferBinds);
    }

    fn set_index_buffer(&mut self, buffer: Option<&Self::Buffer>, cb: CommandBufferArg<'_, Self>) {
        let buffer = buffer.cloned();
        self.record(cb, move |device| device.set_index_buffer(buffer.clone()));
        self.stats.increment(RenderStat::IndexBufferBinds);
    }

    fn set_vertex_declaration(
        &mut self,
        declaration: Option<&Arc<VertexDeclaration>>,
        cb: CommandBufferArg<'_, Self>,
    ) {
        let declaration = declaration.cloned();
        self.record(cb, move |device| {
            device.set_vertex_declaration(declaration.clone())
        });
    }

    fn set_draw_operation(&mut self, op: DrawOperation, cb: CommandBufferArg<'_, Self>) {
        self.with_buffer(cb, |cb| {
            cb.set_draw_operation(op);
            cb.queue_command(move |device: &mut GlDevice| device.set_draw_operation(op));
        });
    }

    fn set_viewport(&mut self, area: Rect2, cb: CommandBufferArg<'_, Self>) {
        self.record(cb, move |device| device.set_viewport(area));
    }

    fn set_scissor_rect(&mut self, rect: Rect2I, cb: CommandBufferArg<'_, Self>) {
        self.record(cb, move |device| device.set_scissor_rect(rect));
    }

    fn set_stencil_ref(&mut self, value: u32, cb: CommandBufferArg<'_, Self>) {
        self.record(cb, move |device| device.set_stencil_ref(value));
    }

    fn set_render_target(
        &mut self,
        target: Option<&Self::RenderTarget>,
        cb: CommandBufferArg<'_, Self>,
    ) {
        let target = target.cloned();
        self.record(cb, move |device| device.set_render_target(target.clone()));
        self.stats.increment(RenderStat::RenderTargetChanges);
    }

    fn clear_render_target(
        &mut self,
        buffers: FrameBufferType,
        color: Color,
        depth: f32,
        stencil: u16,
        target_mask: u8,
        cb: CommandBufferArg<'_, Self>,
    ) {
        self.record(cb, move |device| {
            device.clear_render_target(buffers, color, depth, stencil, target_mask)
        });
        self.stats.increment(RenderStat::Clears);
    }

    fn clear_viewport(
        &mut self,
        buffers: FrameBufferType,
        color: Color,
        depth: f32,
        stencil: u16,
        target_mask: u8,
        cb: CommandBufferArg<'_, Self>,
    ) {
        self.record(cb, move |device| {
            device.clear_viewport(buffers, color, depth, stencil, target_mask)
        });
        self.stats.increment(RenderStat::Clears);
    }

    fn draw(
        &mut self,
        vertex_offset: u32,
        vertex_count: u32,
        instance_count: u32,
        cb: CommandBufferArg<'_, Self>,
    ) {
        let primitives = self.with_buffer(cb, |cb| {
            cb.queue_command(move |device: &mut GlDevice| {
                device.draw(vertex_offset, vertex_count, instance_count)
            });
            cb.draw_operation().primitive_count(vertex_count)
        });

        self.stats.increment(RenderStat::DrawCalls);
        self.stats.add(RenderStat::Vertices, vertex_count as u64);
        self.stats.add(RenderStat::Primitives, primitives as u64);
    }

    fn draw_indexed(
        &mut self,
        start_index: u32,
        index_count: u32,
        vertex_offset: u32,
        vertex_count: u32,
        instance_count: u32,
        cb: CommandBufferArg<'_, Self>,
    ) {
        let primitives = self.with_buffer(cb, |cb| {
            cb.queue_command(move |device: &mut GlDevice| {
                device.draw_indexed(start_index, index_count, vertex_offset, instance_count)
            });
            cb.draw_operation().primitive_count(index_count)
        });

        self.stats.increment(RenderStat::DrawCalls);
        self.stats.add(RenderStat::Vertices, vertex_count as u64);
        self.stats.add(RenderStat::Primitives, primitives as u64);
    }

    fn dispatch_compute(
        &mut self,
        num_groups_x: u32,
        num_groups_y: u32,
        num_groups_z: u32,
        cb: CommandBufferArg<'_, Self>,
    ) {
        self.record(cb, move |device| {
            device.dispatch_compute(num_groups_x, num_groups_y, num_groups_z)
        });
        self.stats.increment(RenderStat::ComputeCalls);
    }

    fn swap_buffers(&mut self, target: &Self::RenderTarget) {
        if !target.is_window() {
            debug!("Ignoring swap_buffers on a render texture");
            return;
        }

        self.submit_command_buffer(None);

        match self.present.as_mut() {
            Some(present) => present(target),
            None => unsafe { self.gl.flush() },
        }

        self.stats.increment(RenderStat::Presents);
        logging::log_frame_stats(&self.stats.snapshot());
    }

    fn begin_frame(&mut self, cb: CommandBufferArg<'_, Self>) {
        self.record(cb, |device| device.begin_frame());
    }

    fn end_frame(&mut self, cb: CommandBufferArg<'_, Self>) {
        self.record(cb, |device| device.end_frame());
    }

    fn add_commands(&mut self, primary: &mut Self::CommandBuffer, secondary: &Self::CommandBuffer) {
        primary.append_secondary(secondary);
    }

    fn submit_command_buffer(&mut self, cb: CommandBufferArg<'_, Self>) {
        match cb {
            Some(cb) => cb.execute_commands(&mut self.device),
            None => {
                // Work recorded from here on lands in a fresh main buffer
                let mut main = self.main.replace(GlCommandBuffer::new(main_desc()));
                main.execute_commands(&mut self.device);
            }
        }
    }
}

impl std::fmt::Debug for GlRenderApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlRenderApi")
            .field("version", &self.version)
            .field("config", &self.config)
            .field("device", &self.device)
            .finish_non_exhaustive()
    }
}

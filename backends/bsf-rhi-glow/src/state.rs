//! Pipeline state objects and fixed-function state application

use std::rc::Rc;

use bsf_rhi::{
    BlendFactor, BlendOperation, BlendStateDesc, CompareFunction, CullingMode,
    DepthStencilStateDesc, DrawOperation, GpuProgramType, MAX_MULTIPLE_RENDER_TARGETS,
    PolygonMode, RasterizerStateDesc, RhiError, RhiResult, StencilOperation,
};
use glow::{Context, HasContext};
use tracing::warn;

use crate::{GlVersion, GlslGpuProgram, PipelineKey};

/// Programs and fixed-function descriptions of a graphics pipeline
///
/// Missing states fall back to their defaults.
#[derive(Debug, Clone, Default)]
pub struct GraphicsPipelineDesc {
    pub vertex_program: Option<Rc<GlslGpuProgram>>,
    pub fragment_program: Option<Rc<GlslGpuProgram>>,
    pub geometry_program: Option<Rc<GlslGpuProgram>>,
    pub hull_program: Option<Rc<GlslGpuProgram>>,
    pub domain_program: Option<Rc<GlslGpuProgram>>,
    pub blend_state: Option<BlendStateDesc>,
    pub rasterizer_state: Option<RasterizerStateDesc>,
    pub depth_stencil_state: Option<DepthStencilStateDesc>,
}

/// Immutable graphics pipeline
#[derive(Debug)]
pub struct GlGraphicsPipelineState {
    programs: [Option<Rc<GlslGpuProgram>>; 5],
    blend: BlendStateDesc,
    rasterizer: RasterizerStateDesc,
    depth_stencil: DepthStencilStateDesc,
}

impl GlGraphicsPipelineState {
    /// Fails when a program is bound to the wrong stage
    pub fn new(desc: GraphicsPipelineDesc) -> RhiResult<Self> {
        let programs = [
            desc.vertex_program,
            desc.fragment_program,
            desc.geometry_program,
            desc.hull_program,
            desc.domain_program,
        ];

        for (stage, program) in GpuProgramType::GRAPHICS.iter().zip(&programs) {
            if let Some(program) = program {
                if program.program_type() != *stage {
                    return Err(RhiError::invalid_parameters(format!(
                        "a {} program cannot be used as the {} program of a pipeline",
                        program.program_type(),
                        stage
                    )));
                }
            }
        }

        Ok(Self {
            programs,
            blend: desc.blend_state.unwrap_or_default(),
            rasterizer: desc.rasterizer_state.unwrap_or_default(),
            depth_stencil: desc.depth_stencil_state.unwrap_or_default(),
        })
    }

    pub fn program(&self, stage: GpuProgramType) -> Option<&Rc<GlslGpuProgram>> {
        self.programs.get(stage.index()).and_then(Option::as_ref)
    }

    /// Key of the linked program for the stage programs
    pub fn pipeline_key(&self) -> PipelineKey {
        PipelineKey(self.programs.each_ref().map(|p| p.as_ref().map(|p| p.id())))
    }

    pub fn blend_state(&self) -> &BlendStateDesc {
        &self.blend
    }

    pub fn rasterizer_state(&self) -> &RasterizerStateDesc {
        &self.rasterizer
    }

    pub fn depth_stencil_state(&self) -> &DepthStencilStateDesc {
        &self.depth_stencil
    }
}

/// Compute pipeline wrapping a single linked compute program
#[derive(Debug)]
pub struct GlComputePipelineState {
    program: Rc<GlslGpuProgram>,
}

impl GlComputePipelineState {
    pub fn new(program: Rc<GlslGpuProgram>) -> RhiResult<Self> {
        if program.program_type() != GpuProgramType::Compute {
            return Err(RhiError::invalid_parameters(format!(
                "a {} program cannot be used as a compute pipeline",
                program.program_type()
            )));
        }
        Ok(Self { program })
    }

    pub fn program(&self) -> &Rc<GlslGpuProgram> {
        &self.program
    }
}

/// Fixed-function values tracked after a pipeline is applied
///
/// Clears and stencil reference changes need them to restore state.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct FixedFunctionState {
    /// RGBA write flags per render target
    pub color_write: [[bool; 4]; MAX_MULTIPLE_RENDER_TARGETS],
    pub depth_write: bool,
    pub stencil_ref: u32,
    pub stencil_read_mask: u32,
    pub stencil_write_mask: u32,
    pub stencil_compare_front: CompareFunction,
    pub stencil_compare_back: CompareFunction,
    /// Scissor test requested by the rasterizer state
    pub scissor_enable: bool,
}

impl Default for FixedFunctionState {
    fn default() -> Self {
        Self {
            color_write: [[true; 4]; MAX_MULTIPLE_RENDER_TARGETS],
            depth_write: true,
            stencil_ref: 0,
            stencil_read_mask: 0xFFFF_FFFF,
            stencil_write_mask: 0xFFFF_FFFF,
            stencil_compare_front: CompareFunction::AlwaysPass,
            stencil_compare_back: CompareFunction::AlwaysPass,
            scissor_enable: false,
        }
    }
}

impl FixedFunctionState {
    /// Whether any channel of `target` is masked off
    pub fn is_color_masked(&self, target: usize) -> bool {
        self.color_write
            .get(target)
            .is_some_and(|mask| mask.iter().any(|write| !write))
    }
}

/// Blend equations and write masks of every render target
pub fn apply_blend_state(gl: &Context, blend: &BlendStateDesc, tracked: &mut FixedFunctionState) {
    unsafe {
        if blend.alpha_to_coverage_enable {
            gl.enable(glow::SAMPLE_ALPHA_TO_COVERAGE);
        } else {
            gl.disable(glow::SAMPLE_ALPHA_TO_COVERAGE);
        }

        for i in 0..MAX_MULTIPLE_RENDER_TARGETS {
            let rt = if blend.independant_blend_enable {
                &blend.render_targets[i]
            } else {
                &blend.render_targets[0]
            };
            let target = i as u32;

            let (src, dst, src_alpha, dst_alpha) = if rt.blend_enable {
                (rt.src_blend, rt.dst_blend, rt.src_blend_alpha, rt.dst_blend_alpha)
            } else {
                (BlendFactor::One, BlendFactor::Zero, BlendFactor::One, BlendFactor::Zero)
            };

            if is_passthrough_blend(src, dst, src_alpha, dst_alpha) {
                gl.disable_draw_buffer(glow::BLEND, target);
            } else {
                gl.enable_draw_buffer(glow::BLEND, target);
                gl.blend_func_separate_draw_buffer(
                    target,
                    gl_blend_factor(src),
                    gl_blend_factor(dst),
                    gl_blend_factor(src_alpha),
                    gl_blend_factor(dst_alpha),
                );
            }

            let (op, op_alpha) = if rt.blend_enable {
                (rt.blend_op, rt.blend_op_alpha)
            } else {
                (BlendOperation::Add, BlendOperation::Add)
            };
            gl.blend_equation_separate_draw_buffer(
                target,
                gl_blend_equation(op),
                gl_blend_equation(op_alpha),
            );

            let mask = color_write_mask(rt.render_target_write_mask);
            gl.color_mask_draw_buffer(target, mask[0], mask[1], mask[2], mask[3]);
            tracked.color_write[i] = mask;
        }
    }
}

/// Depth bias, culling, fill mode and the rasterizer toggles
pub fn apply_rasterizer_state(
    gl: &Context,
    version: GlVersion,
    rasterizer: &RasterizerStateDesc,
    tracked: &mut FixedFunctionState,
) {
    unsafe {
        let offset_modes: &[u32] = if version.is_es {
            &[glow::POLYGON_OFFSET_FILL]
        } else {
            &[
                glow::POLYGON_OFFSET_FILL,
                glow::POLYGON_OFFSET_POINT,
                glow::POLYGON_OFFSET_LINE,
            ]
        };

        if rasterizer.depth_bias != 0.0 || rasterizer.slope_scaled_depth_bias != 0.0 {
            for mode in offset_modes {
                gl.enable(*mode);
            }
            gl.polygon_offset(
                rasterizer.slope_scaled_depth_bias,
                scaled_depth_bias(rasterizer.depth_bias),
            );
        } else {
            for mode in offset_modes {
                gl.disable(*mode);
            }
        }

        match gl_cull_face(rasterizer.cull_mode) {
            Some(face) => {
                gl.enable(glow::CULL_FACE);
                gl.cull_face(face);
            }
            None => gl.disable(glow::CULL_FACE),
        }

        if version.polygon_mode_support() {
            gl.polygon_mode(glow::FRONT_AND_BACK, gl_polygon_mode(rasterizer.polygon_mode));
        } else if rasterizer.polygon_mode == PolygonMode::Wireframe {
            warn!("Wireframe rendering is not supported on {}", version);
        }

        if !version.is_es {
            if rasterizer.multisample_enable {
                gl.enable(glow::MULTISAMPLE);
            } else {
                gl.disable(glow::MULTISAMPLE);
            }

            if rasterizer.antialiased_line_enable {
                gl.enable(glow::LINE_SMOOTH);
            } else {
                gl.disable(glow::LINE_SMOOTH);
            }
        }

        // Without depth clipping fragments are clamped instead
        if version.depth_clamp_support() {
            if rasterizer.depth_clip_enable {
                gl.disable(glow::DEPTH_CLAMP);
            } else {
                gl.enable(glow::DEPTH_CLAMP);
            }
        }
    }

    tracked.scissor_enable = rasterizer.scissor_enable;
}

/// Stencil and depth test configuration
pub fn apply_depth_stencil_state(
    gl: &Context,
    depth_stencil: &DepthStencilStateDesc,
    tracked: &mut FixedFunctionState,
) {
    let read_mask = depth_stencil.stencil_read_mask as u32;
    let write_mask = depth_stencil.stencil_write_mask as u32;

    unsafe {
        if depth_stencil.stencil_enable {
            gl.enable(glow::STENCIL_TEST);
        } else {
            gl.disable(glow::STENCIL_TEST);
        }

        for (face, ops) in [
            (glow::FRONT, &depth_stencil.front),
            (glow::BACK, &depth_stencil.back),
        ] {
            gl.stencil_op_separate(
                face,
                gl_stencil_op(ops.fail_op),
                gl_stencil_op(ops.depth_fail_op),
                gl_stencil_op(ops.pass_op),
            );
            gl.stencil_func_separate(
                face,
                gl_compare_function(ops.compare_func),
                tracked.stencil_ref as i32,
                read_mask,
            );
        }
        gl.stencil_mask(write_mask);

        if depth_stencil.depth_read_enable {
            gl.enable(glow::DEPTH_TEST);
        } else {
            gl.disable(glow::DEPTH_TEST);
        }
        gl.depth_mask(depth_stencil.depth_write_enable);
        gl.depth_func(gl_compare_function(depth_stencil.depth_comparison_func));
    }

    tracked.stencil_read_mask = read_mask;
    tracked.stencil_write_mask = write_mask;
    tracked.stencil_compare_front = depth_stencil.front.compare_func;
    tracked.stencil_compare_back = depth_stencil.back.compare_func;
    tracked.depth_write = depth_stencil.depth_write_enable;
}

/// Re-issue both stencil functions with a new reference value
pub fn apply_stencil_ref(gl: &Context, value: u32, tracked: &mut FixedFunctionState) {
    tracked.stencil_ref = value;
    unsafe {
        gl.stencil_func_separate(
            glow::FRONT,
            gl_compare_function(tracked.stencil_compare_front),
            value as i32,
            tracked.stencil_read_mask,
        );
        gl.stencil_func_separate(
            glow::BACK,
            gl_compare_function(tracked.stencil_compare_back),
            value as i32,
            tracked.stencil_read_mask,
        );
    }
}

fn is_passthrough_blend(
    src: BlendFactor,
    dst: BlendFactor,
    src_alpha: BlendFactor,
    dst_alpha: BlendFactor,
) -> bool {
    src == BlendFactor::One
        && dst == BlendFactor::Zero
        && src_alpha == BlendFactor::One
        && dst_alpha == BlendFactor::Zero
}

/// Unpack a write mask, red in the lowest bit
pub fn color_write_mask(mask: u8) -> [bool; 4] {
    [mask & 0x1 != 0, mask & 0x2 != 0, mask & 0x4 != 0, mask & 0x8 != 0]
}

/// Constant bias in depth-buffer units, assuming a 24-bit depth buffer
pub fn scaled_depth_bias(constant_bias: f32) -> f32 {
    -constant_bias * ((1u32 << 24) - 1) as f32
}

pub fn gl_compare_function(func: CompareFunction) -> u32 {
    match func {
        CompareFunction::AlwaysFail => glow::NEVER,
        CompareFunction::AlwaysPass => glow::ALWAYS,
        CompareFunction::Less => glow::LESS,
        CompareFunction::LessEqual => glow::LEQUAL,
        CompareFunction::Equal => glow::EQUAL,
        CompareFunction::NotEqual => glow::NOTEQUAL,
        CompareFunction::GreaterEqual => glow::GEQUAL,
        CompareFunction::Greater => glow::GREATER,
    }
}

pub fn gl_blend_factor(factor: BlendFactor) -> u32 {
    match factor {
        BlendFactor::One => glow::ONE,
        BlendFactor::Zero => glow::ZERO,
        BlendFactor::DestColor => glow::DST_COLOR,
        BlendFactor::SourceColor => glow::SRC_COLOR,
        BlendFactor::InvDestColor => glow::ONE_MINUS_DST_COLOR,
        BlendFactor::InvSourceColor => glow::ONE_MINUS_SRC_COLOR,
        BlendFactor::DestAlpha => glow::DST_ALPHA,
        BlendFactor::SourceAlpha => glow::SRC_ALPHA,
        BlendFactor::InvDestAlpha => glow::ONE_MINUS_DST_ALPHA,
        BlendFactor::InvSourceAlpha => glow::ONE_MINUS_SRC_ALPHA,
    }
}

pub fn gl_blend_equation(op: BlendOperation) -> u32 {
    match op {
        BlendOperation::Add => glow::FUNC_ADD,
        BlendOperation::Subtract => glow::FUNC_SUBTRACT,
        BlendOperation::ReverseSubtract => glow::FUNC_REVERSE_SUBTRACT,
        BlendOperation::Min => glow::MIN,
        BlendOperation::Max => glow::MAX,
    }
}

pub fn gl_stencil_op(op: StencilOperation) -> u32 {
    match op {
        StencilOperation::Keep => glow::KEEP,
        StencilOperation::Zero => glow::ZERO,
        StencilOperation::Replace => glow::REPLACE,
        StencilOperation::Increment => glow::INCR,
        StencilOperation::Decrement => glow::DECR,
        StencilOperation::IncrementWrap => glow::INCR_WRAP,
        StencilOperation::DecrementWrap => glow::DECR_WRAP,
        StencilOperation::Invert => glow::INVERT,
    }
}

/// Face to cull, front faces being clockwise
pub fn gl_cull_face(mode: CullingMode) -> Option<u32> {
    match mode {
        CullingMode::None => None,
        CullingMode::Clockwise => Some(glow::FRONT),
        CullingMode::CounterClockwise => Some(glow::BACK),
    }
}

pub fn gl_polygon_mode(mode: PolygonMode) -> u32 {
    match mode {
        PolygonMode::Wireframe => glow::LINE,
        PolygonMode::Solid => glow::FILL,
    }
}

/// Primitive mode for a draw, using the adjacency variant when requested
///
/// Fans have no adjacency form.
pub fn gl_draw_mode(op: DrawOperation, adjacency: bool) -> u32 {
    match (op, adjacency) {
        (DrawOperation::PointList, _) => glow::POINTS,
        (DrawOperation::LineList, false) => glow::LINES,
        (DrawOperation::LineList, true) => glow::LINES_ADJACENCY,
        (DrawOperation::LineStrip, false) => glow::LINE_STRIP,
        (DrawOperation::LineStrip, true) => glow::LINE_STRIP_ADJACENCY,
        (DrawOperation::TriangleList, false) => glow::TRIANGLES,
        (DrawOperation::TriangleList, true) => glow::TRIANGLES_ADJACENCY,
        (DrawOperation::TriangleStrip, false) => glow::TRIANGLE_STRIP,
        (DrawOperation::TriangleStrip, true) => glow::TRIANGLE_STRIP_ADJACENCY,
        (DrawOperation::TriangleFan, _) => glow::TRIANGLE_FAN,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adjacency_modes() {
        assert_eq!(gl_draw_mode(DrawOperation::TriangleList, false), glow::TRIANGLES);
        assert_eq!(
            gl_draw_mode(DrawOperation::TriangleList, true),
            glow::TRIANGLES_ADJACENCY
        );
        assert_eq!(gl_draw_mode(DrawOperation::TriangleFan, true), glow::TRIANGLE_FAN);
        assert_eq!(gl_draw_mode(DrawOperation::PointList, true), glow::POINTS);
    }

    #[test]
    fn clockwise_culling_removes_front_faces() {
        assert_eq!(gl_cull_face(CullingMode::Clockwise), Some(glow::FRONT));
        assert_eq!(gl_cull_face(CullingMode::CounterClockwise), Some(glow::BACK));
        assert_eq!(gl_cull_face(CullingMode::None), None);
    }

    #[test]
    fn write_mask_bits() {
        assert_eq!(color_write_mask(0xF), [true; 4]);
        assert_eq!(color_write_mask(0x1), [true, false, false, false]);
        assert_eq!(color_write_mask(0x8), [false, false, false, true]);
    }

    #[test]
    fn masked_targets_are_detected() {
        let mut tracked = FixedFunctionState::default();
        assert!(!tracked.is_color_masked(0));
        tracked.color_write[2] = color_write_mask(0x7);
        assert!(tracked.is_color_masked(2));
        assert!(!tracked.is_color_masked(MAX_MULTIPLE_RENDER_TARGETS));
    }

    #[test]
    fn depth_bias_scales_to_24_bits() {
        assert_eq!(scaled_depth_bias(0.0), 0.0);
        assert_eq!(scaled_depth_bias(1.0), -16_777_215.0);
    }

    #[test]
    fn passthrough_blending_is_detected() {
        assert!(is_passthrough_blend(
            BlendFactor::One,
            BlendFactor::Zero,
            BlendFactor::One,
            BlendFactor::Zero
        ));
        assert!(!is_passthrough_blend(
            BlendFactor::SourceAlpha,
            BlendFactor::InvSourceAlpha,
            BlendFactor::One,
            BlendFactor::Zero
        ));
    }
}

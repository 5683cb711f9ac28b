//! GLSL programs and linked program objects

use std::rc::Rc;
use std::sync::Arc;

use bsf_rhi::{
    GpuParamDesc, GpuProgramDesc, GpuProgramType, ProgramId, RenderStat, RenderStats,
    VertexInputAttribute,
};
use glow::{Context, HasContext};
use smallvec::SmallVec;
use tracing::{debug, warn};

use crate::{GlVersion, GlslVersion, InitError, InitResult, RawProgram, RawShader, RawUniformLocation};

/// Sampler or image uniform of a linked program, set to a unit before use
#[derive(Debug, Clone)]
pub struct UnitUniform {
    pub stage: GpuProgramType,
    /// Logical slot the engine binds through
    pub slot: u32,
    pub location: RawUniformLocation,
}

/// A linked GL program with the uniforms it needs per draw
#[derive(Debug)]
pub struct GlLinkedProgram {
    raw: RawProgram,
    textures: SmallVec<[UnitUniform; 8]>,
    images: SmallVec<[UnitUniform; 4]>,
}

impl GlLinkedProgram {
    #[inline]
    pub fn raw(&self) -> RawProgram {
        self.raw
    }

    /// Sampler uniforms, set to texture units before drawing
    pub fn textures(&self) -> &[UnitUniform] {
        &self.textures
    }

    /// Image uniforms, set to image units before drawing
    pub fn images(&self) -> &[UnitUniform] {
        &self.images
    }

    pub(crate) fn destroy(self, gl: &Context) {
        unsafe { gl.delete_program(self.raw) };
    }
}

/// Compiled stage ready to be attached to a program
pub(crate) struct LinkStage<'a> {
    pub stage: GpuProgramType,
    pub shader: RawShader,
    pub params: &'a GpuParamDesc,
}

/// Link `stages` into one program and resolve its resource uniforms
///
/// Uniform blocks are bound once here through `block_binding`, which maps a
/// stage's logical block slot to a global binding point.
pub(crate) fn link_program(
    gl: &Context,
    stages: &[LinkStage<'_>],
    block_binding: impl Fn(GpuProgramType, u32) -> u32,
) -> InitResult<GlLinkedProgram> {
    unsafe {
        let raw = gl.create_program().map_err(InitError::LinkProgram)?;
        for stage in stages {
            gl.attach_shader(raw, stage.shader);
        }
        gl.link_program(raw);

        for stage in stages {
            gl.detach_shader(raw, stage.shader);
        }

        if !gl.get_program_link_status(raw) {
            let error = gl.get_program_info_log(raw);
            gl.delete_program(raw);
            return Err(InitError::LinkProgram(error));
        }

        let mut linked = GlLinkedProgram {
            raw,
            textures: SmallVec::new(),
            images: SmallVec::new(),
        };

        for stage in stages {
            for block in &stage.params.param_blocks {
                match gl.get_uniform_block_index(raw, &block.name) {
                    Some(index) => {
                        gl.uniform_block_binding(raw, index, block_binding(stage.stage, block.slot))
                    }
                    None => debug!(
                        "Uniform block {} of the {} program is not active",
                        block.name, stage.stage
                    ),
                }
            }

            // Tessellation stages own no texture units
            let owns_textures =
                !matches!(stage.stage, GpuProgramType::Hull | GpuProgramType::Domain);

            for texture in stage.params.textures.iter().filter(|_| owns_textures) {
                if let Some(location) = gl.get_uniform_location(raw, &texture.name) {
                    linked.textures.push(UnitUniform {
                        stage: stage.stage,
                        slot: texture.slot,
                        location,
                    });
                }
            }

            for image in &stage.params.load_store_textures {
                if let Some(location) = gl.get_uniform_location(raw, &image.name) {
                    linked.images.push(UnitUniform {
                        stage: stage.stage,
                        slot: image.slot,
                        location,
                    });
                }
            }
        }

        Ok(linked)
    }
}

/// GL shader type of a program stage
pub fn gl_shader_type(program_type: GpuProgramType) -> u32 {
    match program_type {
        GpuProgramType::Vertex => glow::VERTEX_SHADER,
        GpuProgramType::Fragment => glow::FRAGMENT_SHADER,
        GpuProgramType::Geometry => glow::GEOMETRY_SHADER,
        GpuProgramType::Hull => glow::TESS_CONTROL_SHADER,
        GpuProgramType::Domain => glow::TESS_EVALUATION_SHADER,
        GpuProgramType::Compute => glow::COMPUTE_SHADER,
    }
}

fn stage_supported(version: GlVersion, program_type: GpuProgramType) -> bool {
    match program_type {
        GpuProgramType::Vertex | GpuProgramType::Fragment => true,
        GpuProgramType::Geometry => version.geometry_support(),
        GpuProgramType::Hull | GpuProgramType::Domain => version.tessellation_support(),
        GpuProgramType::Compute => version.compute_support(),
    }
}

/// A compiled GLSL program for one stage
///
/// Graphics stages are linked together on first use. Compute programs are
/// linked on creation since they never combine with other stages.
pub struct GlslGpuProgram {
    gl: Rc<Context>,
    id: ProgramId,
    program_type: GpuProgramType,
    shader: RawShader,
    requires_adjacency: bool,
    vertex_inputs: Vec<VertexInputAttribute>,
    params: GpuParamDesc,
    linked: Option<GlLinkedProgram>,
    stats: Arc<RenderStats>,
}

impl GlslGpuProgram {
    pub(crate) fn new(
        gl: Rc<Context>,
        desc: GpuProgramDesc,
        version: GlVersion,
        block_binding: impl Fn(GpuProgramType, u32) -> u32,
        stats: Arc<RenderStats>,
    ) -> InitResult<Self> {
        if !stage_supported(version, desc.program_type) {
            return Err(InitError::UnsupportedVersion(format!(
                "{} programs are not available on {}",
                desc.program_type, version
            )));
        }

        if desc.entry_point != "main" {
            warn!(
                "GLSL programs always start at main, ignoring entry point {}",
                desc.entry_point
            );
        }

        let source = GlslVersion::for_gl_version(version).apply(&desc.source);

        let shader = unsafe {
            let shader = gl
                .create_shader(gl_shader_type(desc.program_type))
                .map_err(InitError::CreateShader)?;
            gl.shader_source(shader, &source);
            gl.compile_shader(shader);

            if !gl.get_shader_compile_status(shader) {
                let error = gl.get_shader_info_log(shader);
                gl.delete_shader(shader);
                return Err(InitError::CompileShader(format!(
                    "{} program: {}",
                    desc.program_type, error
                )));
            }
            shader
        };

        let linked = if desc.program_type == GpuProgramType::Compute {
            let stage = LinkStage {
                stage: GpuProgramType::Compute,
                shader,
                params: &desc.params,
            };
            match link_program(&gl, &[stage], block_binding) {
                Ok(linked) => Some(linked),
                Err(e) => {
                    unsafe { gl.delete_shader(shader) };
                    return Err(e);
                }
            }
        } else {
            None
        };

        let id = ProgramId::next();
        debug!("Compiled {} program {}", desc.program_type, id);
        stats.increment(RenderStat::ObjectsCreated);

        Ok(Self {
            gl,
            id,
            program_type: desc.program_type,
            shader,
            requires_adjacency: desc.requires_adjacency,
            vertex_inputs: desc.vertex_inputs,
            params: desc.params,
            linked,
            stats,
        })
    }

    #[inline]
    pub fn id(&self) -> ProgramId {
        self.id
    }

    #[inline]
    pub fn program_type(&self) -> GpuProgramType {
        self.program_type
    }

    #[inline]
    pub fn shader(&self) -> RawShader {
        self.shader
    }

    /// Geometry programs reading adjacency primitives
    #[inline]
    pub fn requires_adjacency(&self) -> bool {
        self.requires_adjacency
    }

    pub fn vertex_inputs(&self) -> &[VertexInputAttribute] {
        &self.vertex_inputs
    }

    pub fn params(&self) -> &GpuParamDesc {
        &self.params
    }

    /// The standalone linked program of a compute program
    pub fn linked(&self) -> Option<&GlLinkedProgram> {
        self.linked.as_ref()
    }

    pub(crate) fn link_stage(&self) -> LinkStage<'_> {
        LinkStage {
            stage: self.program_type,
            shader: self.shader,
            params: &self.params,
        }
    }
}

impl Drop for GlslGpuProgram {
    fn drop(&mut self) {
        if let Some(linked) = self.linked.take() {
            linked.destroy(&self.gl);
        }
        unsafe { self.gl.delete_shader(self.shader) };
        self.stats.increment(RenderStat::ObjectsDestroyed);
    }
}

impl std::fmt::Debug for GlslGpuProgram {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlslGpuProgram")
            .field("id", &self.id)
            .field("program_type", &self.program_type)
            .field("requires_adjacency", &self.requires_adjacency)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tessellation_maps_to_control_and_evaluation() {
        assert_eq!(gl_shader_type(GpuProgramType::Hull), glow::TESS_CONTROL_SHADER);
        assert_eq!(gl_shader_type(GpuProgramType::Domain), glow::TESS_EVALUATION_SHADER);
    }

    #[test]
    fn stages_follow_version_support() {
        let gl41 = GlVersion::new(4, 1, false);
        assert!(stage_supported(gl41, GpuProgramType::Geometry));
        assert!(stage_supported(gl41, GpuProgramType::Hull));
        assert!(!stage_supported(gl41, GpuProgramType::Compute));

        let es31 = GlVersion::new(3, 1, true);
        assert!(stage_supported(es31, GpuProgramType::Compute));
        assert!(!stage_supported(es31, GpuProgramType::Geometry));
    }
}

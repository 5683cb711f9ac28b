//! Device limits and capability reporting

use bsf_rhi::{
    GpuInfo, GpuProgramType, GpuVendor, MAX_MULTIPLE_RENDER_TARGETS, MAX_VERTEX_BUFFERS,
    RenderApiCapabilities, RenderFeatures,
};
use glow::{Context, HasContext};

use crate::GlVersion;

/// Raw limits read from `glGetIntegerv`
///
/// Stage limits the context cannot report stay at zero.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GlLimits {
    pub vendor: String,
    pub renderer: String,
    pub version: String,

    pub max_fragment_texture_units: u32,
    pub max_vertex_texture_units: u32,
    pub max_geometry_texture_units: u32,
    pub max_compute_texture_units: u32,
    pub max_combined_texture_units: u32,

    pub max_vertex_uniform_blocks: u32,
    pub max_fragment_uniform_blocks: u32,
    pub max_geometry_uniform_blocks: u32,
    pub max_tess_control_uniform_blocks: u32,
    pub max_tess_evaluation_uniform_blocks: u32,
    pub max_compute_uniform_blocks: u32,
    pub max_combined_uniform_blocks: u32,

    pub max_fragment_image_uniforms: u32,
    pub max_compute_image_uniforms: u32,
    pub max_combined_image_uniforms: u32,

    pub max_vertex_attribs: u32,
    pub max_draw_buffers: u32,
    /// Zero when anisotropic filtering is unavailable
    pub max_anisotropy: u32,

    pub has_anisotropy_extension: bool,
    pub has_s3tc_extension: bool,
    pub has_astc_extension: bool,
}

impl GlLimits {
    /// Read the limits of the current context
    pub fn query(gl: &Context, version: GlVersion) -> Self {
        let get = |pname: u32| unsafe { gl.get_parameter_i32(pname).max(0) as u32 };

        let mut limits = unsafe {
            Self {
                vendor: gl.get_parameter_string(glow::VENDOR),
                renderer: gl.get_parameter_string(glow::RENDERER),
                version: gl.get_parameter_string(glow::VERSION),
                ..Default::default()
            }
        };

        limits.max_fragment_texture_units = get(glow::MAX_TEXTURE_IMAGE_UNITS);
        limits.max_vertex_texture_units = get(glow::MAX_VERTEX_TEXTURE_IMAGE_UNITS);
        limits.max_combined_texture_units = get(glow::MAX_COMBINED_TEXTURE_IMAGE_UNITS);
        limits.max_vertex_uniform_blocks = get(glow::MAX_VERTEX_UNIFORM_BLOCKS);
        limits.max_fragment_uniform_blocks = get(glow::MAX_FRAGMENT_UNIFORM_BLOCKS);
        limits.max_combined_uniform_blocks = get(glow::MAX_COMBINED_UNIFORM_BLOCKS);
        limits.max_vertex_attribs = get(glow::MAX_VERTEX_ATTRIBS);
        limits.max_draw_buffers = get(glow::MAX_DRAW_BUFFERS);

        if version.geometry_support() {
            limits.max_geometry_texture_units = get(glow::MAX_GEOMETRY_TEXTURE_IMAGE_UNITS);
            limits.max_geometry_uniform_blocks = get(glow::MAX_GEOMETRY_UNIFORM_BLOCKS);
        }

        if version.tessellation_support() {
            limits.max_tess_control_uniform_blocks = get(glow::MAX_TESS_CONTROL_UNIFORM_BLOCKS);
            limits.max_tess_evaluation_uniform_blocks =
                get(glow::MAX_TESS_EVALUATION_UNIFORM_BLOCKS);
        }

        if version.compute_support() {
            limits.max_compute_texture_units = get(glow::MAX_COMPUTE_TEXTURE_IMAGE_UNITS);
            limits.max_compute_uniform_blocks = get(glow::MAX_COMPUTE_UNIFORM_BLOCKS);
            limits.max_compute_image_uniforms = get(glow::MAX_COMPUTE_IMAGE_UNIFORMS);
        }

        if version.load_store_support() {
            limits.max_fragment_image_uniforms = get(glow::MAX_FRAGMENT_IMAGE_UNIFORMS);
            limits.max_combined_image_uniforms = get(glow::MAX_IMAGE_UNITS);
        }

        #[cfg(feature = "gl_extensions_support")]
        {
            let extensions = gl.supported_extensions();
            limits.has_anisotropy_extension = extensions.contains("GL_EXT_texture_filter_anisotropic")
                || extensions.contains("GL_ARB_texture_filter_anisotropic");
            limits.has_s3tc_extension = extensions.contains("GL_EXT_texture_compression_s3tc");
            limits.has_astc_extension = extensions.contains("GL_KHR_texture_compression_astc_ldr");
        }

        if anisotropy_support(version, &limits) {
            let max = unsafe { gl.get_parameter_f32(glow::MAX_TEXTURE_MAX_ANISOTROPY) };
            limits.max_anisotropy = max.max(1.0) as u32;
        }

        limits
    }
}

fn anisotropy_support(version: GlVersion, limits: &GlLimits) -> bool {
    limits.has_anisotropy_extension || (!version.is_es && (version.major, version.minor) >= (4, 6))
}

/// Translate raw limits into the engine's capability description
pub fn build_capabilities(version: GlVersion, limits: &GlLimits) -> RenderApiCapabilities {
    let mut caps = RenderApiCapabilities {
        render_api_name: crate::PLUGIN_NAME.to_owned(),
        device_name: limits.renderer.clone(),
        vendor: limits.vendor.clone(),
        gpu_vendor: GpuVendor::from_vendor_string(&limits.vendor),
        driver_version: limits.version.clone(),
        ..Default::default()
    };

    let stage = |s: GpuProgramType| s.index();

    // Tessellation stages never own textures
    caps.num_texture_units_per_stage[stage(GpuProgramType::Fragment)] =
        limits.max_fragment_texture_units;
    caps.num_texture_units_per_stage[stage(GpuProgramType::Vertex)] =
        limits.max_vertex_texture_units;
    caps.num_texture_units_per_stage[stage(GpuProgramType::Geometry)] =
        limits.max_geometry_texture_units;
    caps.num_texture_units_per_stage[stage(GpuProgramType::Compute)] =
        limits.max_compute_texture_units;
    caps.num_combined_texture_units = limits.max_combined_texture_units;

    caps.num_gpu_param_block_buffers_per_stage[stage(GpuProgramType::Vertex)] =
        limits.max_vertex_uniform_blocks;
    caps.num_gpu_param_block_buffers_per_stage[stage(GpuProgramType::Fragment)] =
        limits.max_fragment_uniform_blocks;
    caps.num_gpu_param_block_buffers_per_stage[stage(GpuProgramType::Geometry)] =
        limits.max_geometry_uniform_blocks;
    caps.num_gpu_param_block_buffers_per_stage[stage(GpuProgramType::Hull)] =
        limits.max_tess_control_uniform_blocks;
    caps.num_gpu_param_block_buffers_per_stage[stage(GpuProgramType::Domain)] =
        limits.max_tess_evaluation_uniform_blocks;
    caps.num_gpu_param_block_buffers_per_stage[stage(GpuProgramType::Compute)] =
        limits.max_compute_uniform_blocks;
    caps.num_combined_param_block_buffers = limits.max_combined_uniform_blocks;

    caps.num_load_store_texture_units_per_stage[stage(GpuProgramType::Fragment)] =
        limits.max_fragment_image_uniforms;
    caps.num_load_store_texture_units_per_stage[stage(GpuProgramType::Compute)] =
        limits.max_compute_image_uniforms;
    caps.num_combined_load_store_texture_units = limits.max_combined_image_uniforms;

    caps.max_bound_vertex_buffers = limits.max_vertex_attribs.min(MAX_VERTEX_BUFFERS);
    caps.num_multi_render_targets = limits
        .max_draw_buffers
        .min(MAX_MULTIPLE_RENDER_TARGETS as u32);

    let mut features = RenderFeatures::empty();
    features.set(RenderFeatures::COMPUTE_PROGRAM, version.compute_support());
    features.set(RenderFeatures::GEOMETRY_PROGRAM, version.geometry_support());
    features.set(
        RenderFeatures::TESSELLATION_PROGRAM,
        version.tessellation_support(),
    );
    features.set(RenderFeatures::LOAD_STORE, version.load_store_support());
    features.set(RenderFeatures::TEXTURE_VIEWS, version.texture_view_support());
    features.set(RenderFeatures::TIMER_QUERIES, version.timer_query_support());
    features.set(
        RenderFeatures::SEAMLESS_CUBEMAP,
        version.is_es || version.seamless_cubemap_support(),
    );
    features.set(
        RenderFeatures::TEXTURE_COMPRESSION_BC,
        !version.is_es || limits.has_s3tc_extension,
    );
    // ETC2 is core in ES 3.0 and GL 4.3
    features.set(
        RenderFeatures::TEXTURE_COMPRESSION_ETC2,
        version.is_es || version.texture_view_support(),
    );
    features.set(
        RenderFeatures::TEXTURE_COMPRESSION_ASTC,
        limits.has_astc_extension || (version.is_es && version.geometry_support()),
    );
    features.set(
        RenderFeatures::ANISOTROPIC_FILTERING,
        anisotropy_support(version, limits),
    );
    caps.features = features;

    caps
}

/// A single-GPU description, GL exposes nothing else
pub fn gpu_info(limits: &GlLimits) -> GpuInfo {
    GpuInfo {
        gpu_names: vec![limits.renderer.clone()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn desktop_limits() -> GlLimits {
        GlLimits {
            vendor: "NVIDIA Corporation".into(),
            renderer: "GeForce RTX 3070/PCIe/SSE2".into(),
            version: "4.6.0 NVIDIA 535.54".into(),
            max_fragment_texture_units: 32,
            max_vertex_texture_units: 32,
            max_geometry_texture_units: 32,
            max_compute_texture_units: 32,
            max_combined_texture_units: 192,
            max_vertex_uniform_blocks: 14,
            max_fragment_uniform_blocks: 14,
            max_geometry_uniform_blocks: 14,
            max_tess_control_uniform_blocks: 14,
            max_tess_evaluation_uniform_blocks: 14,
            max_compute_uniform_blocks: 14,
            max_combined_uniform_blocks: 84,
            max_fragment_image_uniforms: 8,
            max_compute_image_uniforms: 8,
            max_combined_image_uniforms: 8,
            max_vertex_attribs: 16,
            max_draw_buffers: 8,
            ..Default::default()
        }
    }

    #[test]
    fn tessellation_stages_have_no_texture_units() {
        let caps = build_capabilities(GlVersion::new(4, 6, false), &desktop_limits());
        assert_eq!(caps.texture_units(GpuProgramType::Hull), 0);
        assert_eq!(caps.texture_units(GpuProgramType::Domain), 0);
        assert_eq!(caps.texture_units(GpuProgramType::Fragment), 32);
        assert_eq!(caps.param_block_buffers(GpuProgramType::Hull), 14);
        assert!(caps.validate_unit_partition().is_ok());
    }

    #[test]
    fn load_store_units_only_for_fragment_and_compute() {
        let caps = build_capabilities(GlVersion::new(4, 6, false), &desktop_limits());
        assert_eq!(caps.load_store_texture_units(GpuProgramType::Vertex), 0);
        assert_eq!(caps.load_store_texture_units(GpuProgramType::Fragment), 8);
        assert_eq!(caps.load_store_texture_units(GpuProgramType::Compute), 8);
    }

    #[test]
    fn features_follow_version() {
        let caps = build_capabilities(GlVersion::new(4, 1, false), &desktop_limits());
        assert!(!caps.has(RenderFeatures::COMPUTE_PROGRAM));
        assert!(caps.has(RenderFeatures::TESSELLATION_PROGRAM | RenderFeatures::TIMER_QUERIES));

        let caps = build_capabilities(GlVersion::new(3, 1, true), &desktop_limits());
        assert!(caps.has(RenderFeatures::COMPUTE_PROGRAM));
        assert!(!caps.has(RenderFeatures::TIMER_QUERIES));
    }

    #[test]
    fn identity_strings_are_reported() {
        let limits = desktop_limits();
        let caps = build_capabilities(GlVersion::new(4, 6, false), &limits);
        assert_eq!(caps.gpu_vendor, GpuVendor::Nvidia);
        assert_eq!(caps.render_api_name, crate::PLUGIN_NAME);
        assert_eq!(gpu_info(&limits).gpu_names, vec![limits.renderer.clone()]);
        assert_eq!(caps.num_multi_render_targets, 8);
    }
}

//! Sampler states built on GL sampler objects

use std::rc::Rc;
use std::sync::Arc;

use bsf_rhi::{
    CompareFunction, FilterOptions, RenderStat, RenderStats, SamplerStateDesc,
    TextureAddressingMode,
};
use glow::{Context, HasContext};

use crate::{GlVersion, InitError, InitResult, RawSampler, gl_compare_function};

/// Immutable sampler, bound to texture units alongside textures
pub struct GlSamplerState {
    gl: Rc<Context>,
    raw: RawSampler,
    desc: SamplerStateDesc,
    stats: Arc<RenderStats>,
}

impl GlSamplerState {
    /// Create the sampler object
    ///
    /// `max_anisotropy` is the device limit, zero when unsupported.
    pub(crate) fn new(
        gl: Rc<Context>,
        desc: SamplerStateDesc,
        version: GlVersion,
        max_anisotropy: u32,
        stats: Arc<RenderStats>,
    ) -> InitResult<Self> {
        let raw = unsafe { gl.create_sampler() }.map_err(InitError::CreateSampler)?;

        unsafe {
            gl.sampler_parameter_i32(
                raw,
                glow::TEXTURE_MIN_FILTER,
                gl_min_filter(desc.min_filter, desc.mip_filter) as i32,
            );
            gl.sampler_parameter_i32(
                raw,
                glow::TEXTURE_MAG_FILTER,
                gl_mag_filter(desc.mag_filter) as i32,
            );

            gl.sampler_parameter_i32(raw, glow::TEXTURE_WRAP_S, gl_address_mode(desc.address_u) as i32);
            gl.sampler_parameter_i32(raw, glow::TEXTURE_WRAP_T, gl_address_mode(desc.address_v) as i32);
            gl.sampler_parameter_i32(raw, glow::TEXTURE_WRAP_R, gl_address_mode(desc.address_w) as i32);

            gl.sampler_parameter_f32(raw, glow::TEXTURE_MIN_LOD, desc.mip_min);
            gl.sampler_parameter_f32(raw, glow::TEXTURE_MAX_LOD, desc.mip_max);

            // ES has neither LOD bias nor border colors on 3.1
            if !version.is_es {
                gl.sampler_parameter_f32(raw, glow::TEXTURE_LOD_BIAS, desc.mip_lod_bias);

                let border = desc.border_color;
                gl.sampler_parameter_f32_slice(
                    raw,
                    glow::TEXTURE_BORDER_COLOR,
                    &[border.r, border.g, border.b, border.a],
                );
            }

            match compare_mode(desc.comparison_func) {
                Some(func) => {
                    gl.sampler_parameter_i32(
                        raw,
                        glow::TEXTURE_COMPARE_MODE,
                        glow::COMPARE_REF_TO_TEXTURE as i32,
                    );
                    gl.sampler_parameter_i32(raw, glow::TEXTURE_COMPARE_FUNC, func as i32);
                }
                None => {
                    gl.sampler_parameter_i32(raw, glow::TEXTURE_COMPARE_MODE, glow::NONE as i32)
                }
            }

            if max_anisotropy > 0 {
                gl.sampler_parameter_f32(
                    raw,
                    glow::TEXTURE_MAX_ANISOTROPY,
                    clamp_anisotropy(desc.max_anisotropy, max_anisotropy) as f32,
                );
            }
        }

        stats.increment(RenderStat::ObjectsCreated);

        Ok(Self {
            gl,
            raw,
            desc,
            stats,
        })
    }

    #[inline]
    pub fn raw(&self) -> RawSampler {
        self.raw
    }

    #[inline]
    pub fn desc(&self) -> &SamplerStateDesc {
        &self.desc
    }
}

impl Drop for GlSamplerState {
    fn drop(&mut self) {
        unsafe { self.gl.delete_sampler(self.raw) };
        self.stats.increment(RenderStat::ObjectsDestroyed);
    }
}

impl std::fmt::Debug for GlSamplerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlSamplerState")
            .field("desc", &self.desc)
            .finish_non_exhaustive()
    }
}

/// Minification filter combined with the mip filter
pub fn gl_min_filter(min: FilterOptions, mip: FilterOptions) -> u32 {
    let linear_min = matches!(min, FilterOptions::Linear | FilterOptions::Anisotropic);
    match (linear_min, mip) {
        (true, FilterOptions::Linear | FilterOptions::Anisotropic) => glow::LINEAR_MIPMAP_LINEAR,
        (true, FilterOptions::Point) => glow::LINEAR_MIPMAP_NEAREST,
        (true, FilterOptions::None) => glow::LINEAR,
        (false, FilterOptions::Linear | FilterOptions::Anisotropic) => glow::NEAREST_MIPMAP_LINEAR,
        (false, FilterOptions::Point) => glow::NEAREST_MIPMAP_NEAREST,
        (false, FilterOptions::None) => glow::NEAREST,
    }
}

/// Magnification filter, anisotropic magnifies linearly
pub fn gl_mag_filter(mag: FilterOptions) -> u32 {
    match mag {
        FilterOptions::Point | FilterOptions::None => glow::NEAREST,
        FilterOptions::Linear | FilterOptions::Anisotropic => glow::LINEAR,
    }
}

pub fn gl_address_mode(mode: TextureAddressingMode) -> u32 {
    match mode {
        TextureAddressingMode::Wrap => glow::REPEAT,
        TextureAddressingMode::Mirror => glow::MIRRORED_REPEAT,
        TextureAddressingMode::Clamp => glow::CLAMP_TO_EDGE,
        TextureAddressingMode::Border => glow::CLAMP_TO_BORDER,
    }
}

/// Depth comparison function, `None` when comparison is off
///
/// A function that always passes compares nothing, so it disables comparison.
fn compare_mode(func: Option<CompareFunction>) -> Option<u32> {
    match func {
        None | Some(CompareFunction::AlwaysPass) => None,
        Some(func) => Some(gl_compare_function(func)),
    }
}

fn clamp_anisotropy(requested: u32, supported: u32) -> u32 {
    requested.min(supported.max(1)).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn min_and_mip_filters_combine() {
        assert_eq!(
            gl_min_filter(FilterOptions::Linear, FilterOptions::Linear),
            glow::LINEAR_MIPMAP_LINEAR
        );
        assert_eq!(
            gl_min_filter(FilterOptions::Anisotropic, FilterOptions::Point),
            glow::LINEAR_MIPMAP_NEAREST
        );
        assert_eq!(
            gl_min_filter(FilterOptions::Point, FilterOptions::None),
            glow::NEAREST
        );
        assert_eq!(
            gl_min_filter(FilterOptions::None, FilterOptions::Linear),
            glow::NEAREST_MIPMAP_LINEAR
        );
        assert_eq!(gl_mag_filter(FilterOptions::Anisotropic), glow::LINEAR);
        assert_eq!(gl_mag_filter(FilterOptions::None), glow::NEAREST);
    }

    #[test]
    fn always_pass_disables_comparison() {
        assert_eq!(compare_mode(None), None);
        assert_eq!(compare_mode(Some(CompareFunction::AlwaysPass)), None);
        assert_eq!(
            compare_mode(Some(CompareFunction::LessEqual)),
            Some(glow::LEQUAL)
        );
    }

    #[test]
    fn anisotropy_is_clamped_to_device_limit() {
        assert_eq!(clamp_anisotropy(16, 8), 8);
        assert_eq!(clamp_anisotropy(0, 16), 1);
        assert_eq!(clamp_anisotropy(4, 16), 4);
    }

    #[test]
    fn border_mode_clamps_to_border() {
        assert_eq!(
            gl_address_mode(TextureAddressingMode::Border),
            glow::CLAMP_TO_BORDER
        );
        assert_eq!(gl_address_mode(TextureAddressingMode::Mirror), glow::MIRRORED_REPEAT);
    }
}

//! Textures backed by GL texture objects

use std::rc::Rc;
use std::sync::Arc;

use bsf_rhi::{PixelFormat, RenderStat, RenderStats, TextureDesc, TextureId, TextureType};
use glow::{Context, HasContext};
use tracing::debug;

use crate::{EvictionQueue, InitError, InitResult, RawTexture, RenderError, RenderResult};

/// Internal format, pixel format and component type of a [`PixelFormat`]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct GlPixelFormat {
    pub internal_format: u32,
    pub format: u32,
    pub ty: u32,
}

impl GlPixelFormat {
    const fn new(internal_format: u32, format: u32, ty: u32) -> Self {
        Self {
            internal_format,
            format,
            ty,
        }
    }
}

/// Map an engine pixel format to GL, `hw_gamma` selects the sRGB variant
pub fn gl_pixel_format(format: PixelFormat, hw_gamma: bool) -> GlPixelFormat {
    match format {
        PixelFormat::R8 => GlPixelFormat::new(glow::R8, glow::RED, glow::UNSIGNED_BYTE),
        PixelFormat::RG8 => GlPixelFormat::new(glow::RG8, glow::RG, glow::UNSIGNED_BYTE),
        PixelFormat::RGBA8 | PixelFormat::BGRA8 => {
            let internal = if hw_gamma {
                glow::SRGB8_ALPHA8
            } else {
                glow::RGBA8
            };
            let layout = if format == PixelFormat::BGRA8 {
                glow::BGRA
            } else {
                glow::RGBA
            };
            GlPixelFormat::new(internal, layout, glow::UNSIGNED_BYTE)
        }
        PixelFormat::R16F => GlPixelFormat::new(glow::R16F, glow::RED, glow::HALF_FLOAT),
        PixelFormat::RG16F => GlPixelFormat::new(glow::RG16F, glow::RG, glow::HALF_FLOAT),
        PixelFormat::RGBA16F => GlPixelFormat::new(glow::RGBA16F, glow::RGBA, glow::HALF_FLOAT),
        PixelFormat::R32F => GlPixelFormat::new(glow::R32F, glow::RED, glow::FLOAT),
        PixelFormat::RG32F => GlPixelFormat::new(glow::RG32F, glow::RG, glow::FLOAT),
        PixelFormat::RGBA32F => GlPixelFormat::new(glow::RGBA32F, glow::RGBA, glow::FLOAT),
        PixelFormat::R32U => {
            GlPixelFormat::new(glow::R32UI, glow::RED_INTEGER, glow::UNSIGNED_INT)
        }
        PixelFormat::RG11B10F => GlPixelFormat::new(
            glow::R11F_G11F_B10F,
            glow::RGB,
            glow::UNSIGNED_INT_10F_11F_11F_REV,
        ),
        PixelFormat::D32 => {
            GlPixelFormat::new(glow::DEPTH_COMPONENT32F, glow::DEPTH_COMPONENT, glow::FLOAT)
        }
        PixelFormat::D24S8 => GlPixelFormat::new(
            glow::DEPTH24_STENCIL8,
            glow::DEPTH_STENCIL,
            glow::UNSIGNED_INT_24_8,
        ),
        PixelFormat::D32S8X24 => GlPixelFormat::new(
            glow::DEPTH32F_STENCIL8,
            glow::DEPTH_STENCIL,
            glow::FLOAT_32_UNSIGNED_INT_24_8_REV,
        ),
        PixelFormat::D16 => GlPixelFormat::new(
            glow::DEPTH_COMPONENT16,
            glow::DEPTH_COMPONENT,
            glow::UNSIGNED_SHORT,
        ),
    }
}

/// Format used when binding the texture as a load-store image
///
/// Images cannot be sRGB, so the linear variant is used regardless of gamma.
pub fn gl_image_format(format: PixelFormat) -> u32 {
    gl_pixel_format(format, false).internal_format
}

/// Binding target for a texture description
pub fn gl_texture_target(desc: &TextureDesc) -> u32 {
    let array = desc.num_array_slices > 1;
    let multisample = desc.num_samples > 1;

    match desc.texture_type {
        TextureType::Texture2D => match (multisample, array) {
            (true, true) => glow::TEXTURE_2D_MULTISAMPLE_ARRAY,
            (true, false) => glow::TEXTURE_2D_MULTISAMPLE,
            (false, true) => glow::TEXTURE_2D_ARRAY,
            (false, false) => glow::TEXTURE_2D,
        },
        TextureType::Texture3D => glow::TEXTURE_3D,
        TextureType::TextureCube => {
            if array {
                glow::TEXTURE_CUBE_MAP_ARRAY
            } else {
                glow::TEXTURE_CUBE_MAP
            }
        }
    }
}

/// Binding query matching a texture target
fn binding_parameter(target: u32) -> u32 {
    match target {
        glow::TEXTURE_2D_MULTISAMPLE_ARRAY => glow::TEXTURE_BINDING_2D_MULTISAMPLE_ARRAY,
        glow::TEXTURE_2D_MULTISAMPLE => glow::TEXTURE_BINDING_2D_MULTISAMPLE,
        glow::TEXTURE_2D_ARRAY => glow::TEXTURE_BINDING_2D_ARRAY,
        glow::TEXTURE_3D => glow::TEXTURE_BINDING_3D,
        glow::TEXTURE_CUBE_MAP => glow::TEXTURE_BINDING_CUBE_MAP,
        glow::TEXTURE_CUBE_MAP_ARRAY => glow::TEXTURE_BINDING_CUBE_MAP_ARRAY,
        _ => glow::TEXTURE_BINDING_2D,
    }
}

/// Size of a mip level, never below one texel
#[inline]
pub fn mip_extent(size: u32, mip_level: u32) -> u32 {
    size.checked_shr(mip_level).unwrap_or(0).max(1)
}

/// Texture of any supported type with a unique [`TextureId`]
pub struct GlTexture {
    gl: Rc<Context>,
    raw: RawTexture,
    id: TextureId,
    desc: TextureDesc,
    target: u32,
    format: GlPixelFormat,
    stats: Arc<RenderStats>,
    eviction: Rc<EvictionQueue>,
}

impl GlTexture {
    pub(crate) fn new(
        gl: Rc<Context>,
        desc: TextureDesc,
        stats: Arc<RenderStats>,
        eviction: Rc<EvictionQueue>,
    ) -> InitResult<Self> {
        if desc.width == 0 || desc.height == 0 || desc.depth == 0 {
            return Err(InitError::CreateTexture(format!(
                "invalid texture size {}x{}x{}",
                desc.width, desc.height, desc.depth
            )));
        }

        if desc.num_samples > 1
            && (desc.texture_type != TextureType::Texture2D || desc.num_array_slices > 1)
        {
            return Err(InitError::CreateTexture(
                "only single 2D textures can be multisampled".to_string(),
            ));
        }

        let target = gl_texture_target(&desc);
        let format = gl_pixel_format(desc.format, desc.hw_gamma);
        let raw = unsafe { gl.create_texture() }.map_err(InitError::CreateTexture)?;

        unsafe {
            // Leave whatever the device bound to this target alone
            let previous = gl.get_parameter_texture(binding_parameter(target));
            gl.bind_texture(target, Some(raw));
            allocate_storage(&gl, target, &desc, format);
            gl.bind_texture(target, previous);
        }

        let id = TextureId::next();
        debug!(
            "Created {:?} texture {} ({}x{}x{}, {} mips, {:?})",
            desc.texture_type, id, desc.width, desc.height, desc.depth, desc.num_mips, desc.format
        );
        stats.increment(RenderStat::ObjectsCreated);

        Ok(Self {
            gl,
            raw,
            id,
            desc,
            target,
            format,
            stats,
            eviction,
        })
    }

    #[inline]
    pub fn id(&self) -> TextureId {
        self.id
    }

    #[inline]
    pub fn desc(&self) -> &TextureDesc {
        &self.desc
    }

    #[inline]
    pub fn raw(&self) -> RawTexture {
        self.raw
    }

    #[inline]
    pub fn target(&self) -> u32 {
        self.target
    }

    #[inline]
    pub fn format(&self) -> GlPixelFormat {
        self.format
    }

    /// Upload a whole mip level of one face (or array slice)
    ///
    /// For 3D textures the face must be zero and `data` covers every slice.
    pub fn write(&self, mip_level: u32, face: u32, data: &[u8]) -> RenderResult<()> {
        if self.desc.num_samples > 1 {
            return Err(RenderError::InvalidUsage(
                "multisampled textures cannot be written from the CPU".to_string(),
            ));
        }

        if mip_level > self.desc.num_mips {
            return Err(RenderError::OutOfBounds(format!(
                "mip level {} of texture {} with {} mips",
                mip_level, self.id, self.desc.num_mips
            )));
        }

        if face >= self.desc.num_faces() {
            return Err(RenderError::OutOfBounds(format!(
                "face {} of texture {} with {} faces",
                face,
                self.id,
                self.desc.num_faces()
            )));
        }

        let width = mip_extent(self.desc.width, mip_level);
        let height = mip_extent(self.desc.height, mip_level);
        let depth = match self.desc.texture_type {
            TextureType::Texture3D => mip_extent(self.desc.depth, mip_level),
            _ => 1,
        };

        let expected = width as usize * height as usize * depth as usize
            * self.desc.format.size() as usize;
        if data.len() < expected {
            return Err(RenderError::OutOfBounds(format!(
                "{} bytes provided for a {}x{}x{} surface of {} bytes",
                data.len(),
                width,
                height,
                depth,
                expected
            )));
        }

        let gl = &self.gl;
        let pixels = glow::PixelUnpackData::Slice(Some(&data[..expected]));
        unsafe {
            let previous = gl.get_parameter_texture(binding_parameter(self.target));
            gl.bind_texture(self.target, Some(self.raw));
            gl.pixel_store_i32(glow::UNPACK_ALIGNMENT, 1);

            match self.target {
                glow::TEXTURE_2D => gl.tex_sub_image_2d(
                    glow::TEXTURE_2D,
                    mip_level as i32,
                    0,
                    0,
                    width as i32,
                    height as i32,
                    self.format.format,
                    self.format.ty,
                    pixels,
                ),
                glow::TEXTURE_CUBE_MAP => gl.tex_sub_image_2d(
                    glow::TEXTURE_CUBE_MAP_POSITIVE_X + face,
                    mip_level as i32,
                    0,
                    0,
                    width as i32,
                    height as i32,
                    self.format.format,
                    self.format.ty,
                    pixels,
                ),
                glow::TEXTURE_3D => gl.tex_sub_image_3d(
                    glow::TEXTURE_3D,
                    mip_level as i32,
                    0,
                    0,
                    0,
                    width as i32,
                    height as i32,
                    depth as i32,
                    self.format.format,
                    self.format.ty,
                    pixels,
                ),
                // Arrays and cube arrays address the face as a layer
                target => gl.tex_sub_image_3d(
                    target,
                    mip_level as i32,
                    0,
                    0,
                    face as i32,
                    width as i32,
                    height as i32,
                    1,
                    self.format.format,
                    self.format.ty,
                    pixels,
                ),
            }

            gl.pixel_store_i32(glow::UNPACK_ALIGNMENT, 4);
            gl.bind_texture(self.target, previous);
        }

        self.stats.increment(RenderStat::ResourceWrites);
        Ok(())
    }
}

unsafe fn allocate_storage(gl: &Context, target: u32, desc: &TextureDesc, format: GlPixelFormat) {
    let internal = format.internal_format as i32;
    let layers = desc.num_array_slices.max(1) as i32;

    unsafe {
        match target {
            glow::TEXTURE_2D_MULTISAMPLE => {
                gl.tex_image_2d_multisample(
                    target,
                    desc.num_samples as i32,
                    internal,
                    desc.width as i32,
                    desc.height as i32,
                    true,
                );
                return;
            }
            _ => {}
        }

        gl.tex_parameter_i32(target, glow::TEXTURE_BASE_LEVEL, 0);
        gl.tex_parameter_i32(target, glow::TEXTURE_MAX_LEVEL, desc.num_mips as i32);

        for mip in 0..=desc.num_mips {
            let width = mip_extent(desc.width, mip) as i32;
            let height = mip_extent(desc.height, mip) as i32;
            let level = mip as i32;
            let empty = glow::PixelUnpackData::Slice(None);

            match target {
                glow::TEXTURE_2D => gl.tex_image_2d(
                    target, level, internal, width, height, 0, format.format, format.ty, empty,
                ),
                glow::TEXTURE_CUBE_MAP => {
                    for face in 0..6 {
                        gl.tex_image_2d(
                            glow::TEXTURE_CUBE_MAP_POSITIVE_X + face,
                            level,
                            internal,
                            width,
                            height,
                            0,
                            format.format,
                            format.ty,
                            glow::PixelUnpackData::Slice(None),
                        );
                    }
                }
                glow::TEXTURE_3D => gl.tex_image_3d(
                    target,
                    level,
                    internal,
                    width,
                    height,
                    mip_extent(desc.depth, mip) as i32,
                    0,
                    format.format,
                    format.ty,
                    empty,
                ),
                glow::TEXTURE_CUBE_MAP_ARRAY => gl.tex_image_3d(
                    target,
                    level,
                    internal,
                    width,
                    height,
                    layers * 6,
                    0,
                    format.format,
                    format.ty,
                    empty,
                ),
                _ => gl.tex_image_3d(
                    target, level, internal, width, height, layers, 0, format.format, format.ty,
                    empty,
                ),
            }
        }
    }
}

impl Drop for GlTexture {
    fn drop(&mut self) {
        // Framebuffers using the texture are evicted on the next drain
        self.eviction.push_texture(self.id);
        unsafe { self.gl.delete_texture(self.raw) };
        self.stats.increment(RenderStat::ObjectsDestroyed);
    }
}

impl std::fmt::Debug for GlTexture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlTexture")
            .field("id", &self.id)
            .field("desc", &self.desc)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn targets_cover_arrays_and_multisampling() {
        let mut desc = TextureDesc::default();
        assert_eq!(gl_texture_target(&desc), glow::TEXTURE_2D);

        desc.num_array_slices = 4;
        assert_eq!(gl_texture_target(&desc), glow::TEXTURE_2D_ARRAY);

        desc.num_samples = 4;
        assert_eq!(gl_texture_target(&desc), glow::TEXTURE_2D_MULTISAMPLE_ARRAY);

        let cube = TextureDesc {
            texture_type: TextureType::TextureCube,
            ..Default::default()
        };
        assert_eq!(gl_texture_target(&cube), glow::TEXTURE_CUBE_MAP);
    }

    #[test]
    fn gamma_selects_srgb_storage() {
        assert_eq!(
            gl_pixel_format(PixelFormat::RGBA8, true).internal_format,
            glow::SRGB8_ALPHA8
        );
        assert_eq!(gl_image_format(PixelFormat::RGBA8), glow::RGBA8);
        assert_eq!(gl_pixel_format(PixelFormat::BGRA8, false).format, glow::BGRA);
        assert_eq!(
            gl_pixel_format(PixelFormat::D24S8, false).format,
            glow::DEPTH_STENCIL
        );
    }

    #[test]
    fn mip_extents_clamp_to_one() {
        assert_eq!(mip_extent(256, 0), 256);
        assert_eq!(mip_extent(256, 3), 32);
        assert_eq!(mip_extent(256, 12), 1);
        assert_eq!(mip_extent(5, 40), 1);
    }
}

//! Render targets: the window's default framebuffer or texture attachments

use std::cell::Cell;
use std::rc::Rc;

use bsf_rhi::{MAX_MULTIPLE_RENDER_TARGETS, RhiError, RhiResult};
use glow::{Context, HasContext};
use smallvec::SmallVec;
use tracing::debug;

use crate::{
    AttachmentSurface, FramebufferKey, GlTexture, InitError, InitResult, RawFramebuffer,
    mip_extent,
};

/// A texture surface to render into
#[derive(Debug, Clone)]
pub struct RenderSurfaceDesc {
    pub texture: Rc<GlTexture>,
    pub mip_level: u32,
    /// First face or array slice
    pub face: u32,
    /// More than one attaches the faces as layers
    pub num_faces: u32,
}

impl RenderSurfaceDesc {
    pub fn new(texture: Rc<GlTexture>) -> Self {
        Self {
            texture,
            mip_level: 0,
            face: 0,
            num_faces: 1,
        }
    }

    fn attachment(&self) -> AttachmentSurface {
        AttachmentSurface {
            texture: self.texture.id(),
            mip_level: self.mip_level,
            face: self.face,
            num_faces: self.num_faces,
        }
    }

    fn extent(&self) -> (u32, u32) {
        let desc = self.texture.desc();
        (
            mip_extent(desc.width, self.mip_level),
            mip_extent(desc.height, self.mip_level),
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct RenderTextureDesc {
    pub color_surfaces: [Option<RenderSurfaceDesc>; MAX_MULTIPLE_RENDER_TARGETS],
    pub depth_stencil_surface: Option<RenderSurfaceDesc>,
}

#[derive(Debug)]
enum TargetKind {
    Window,
    Texture {
        desc: RenderTextureDesc,
        key: FramebufferKey,
    },
}

/// Where draws and clears land
#[derive(Debug)]
pub struct GlRenderTarget {
    width: Cell<u32>,
    height: Cell<u32>,
    hw_gamma: bool,
    kind: TargetKind,
}

impl GlRenderTarget {
    /// The default framebuffer of the window owning the context
    pub fn window(width: u32, height: u32, hw_gamma: bool) -> Self {
        Self {
            width: Cell::new(width),
            height: Cell::new(height),
            hw_gamma,
            kind: TargetKind::Window,
        }
    }

    /// A framebuffer over texture surfaces
    ///
    /// Every surface must have the same size at its mip level.
    pub fn texture(desc: RenderTextureDesc) -> RhiResult<Self> {
        let mut extent = None;
        let mut check = |surface: &RenderSurfaceDesc| -> RhiResult<()> {
            let size = surface.extent();
            match extent {
                None => extent = Some(size),
                Some(expected) if expected != size => {
                    return Err(RhiError::invalid_parameters(format!(
                        "render surface of texture {} is {}x{}, expected {}x{}",
                        surface.texture.id(),
                        size.0,
                        size.1,
                        expected.0,
                        expected.1
                    )));
                }
                Some(_) => {}
            }

            let tex = surface.texture.desc();
            if surface.mip_level > tex.num_mips {
                return Err(RhiError::invalid_parameters(format!(
                    "mip level {} is out of range for texture {}",
                    surface.mip_level,
                    surface.texture.id()
                )));
            }
            if surface.face + surface.num_faces.max(1) > tex.num_faces() {
                return Err(RhiError::invalid_parameters(format!(
                    "faces {}..{} are out of range for texture {}",
                    surface.face,
                    surface.face + surface.num_faces.max(1),
                    surface.texture.id()
                )));
            }
            Ok(())
        };

        for surface in desc.color_surfaces.iter().flatten() {
            if surface.texture.desc().format.is_depth() {
                return Err(RhiError::invalid_parameters(
                    "depth textures cannot be bound as color surfaces",
                ));
            }
            check(surface)?;
        }

        if let Some(surface) = &desc.depth_stencil_surface {
            if !surface.texture.desc().format.is_depth() {
                return Err(RhiError::invalid_parameters(
                    "the depth-stencil surface needs a depth format",
                ));
            }
            check(surface)?;
        }

        let Some((width, height)) = extent else {
            return Err(RhiError::invalid_parameters(
                "a render texture needs at least one surface",
            ));
        };

        let hw_gamma = desc
            .color_surfaces
            .iter()
            .flatten()
            .next()
            .is_some_and(|surface| surface.texture.desc().hw_gamma);

        let key = FramebufferKey {
            colors: desc
                .color_surfaces
                .iter()
                .map(|surface| surface.as_ref().map(RenderSurfaceDesc::attachment))
                .collect(),
            depth_stencil: desc
                .depth_stencil_surface
                .as_ref()
                .map(RenderSurfaceDesc::attachment),
        };

        Ok(Self {
            width: Cell::new(width),
            height: Cell::new(height),
            hw_gamma,
            kind: TargetKind::Texture { desc, key },
        })
    }

    pub fn width(&self) -> u32 {
        self.width.get()
    }

    pub fn height(&self) -> u32 {
        self.height.get()
    }

    /// Whether writes are converted to sRGB
    pub fn hw_gamma(&self) -> bool {
        self.hw_gamma
    }

    pub fn is_window(&self) -> bool {
        matches!(self.kind, TargetKind::Window)
    }

    /// Track a window resize, texture targets keep their size
    pub fn resize(&self, width: u32, height: u32) {
        if self.is_window() {
            self.width.set(width);
            self.height.set(height);
        }
    }

    /// Framebuffer cache key, `None` for the window
    pub fn framebuffer_key(&self) -> Option<&FramebufferKey> {
        match &self.kind {
            TargetKind::Window => None,
            TargetKind::Texture { key, .. } => Some(key),
        }
    }

    /// Whether color attachment `index` is backed by a texture
    pub fn has_color_buffer(&self, index: usize) -> bool {
        match &self.kind {
            TargetKind::Window => index == 0,
            TargetKind::Texture { desc, .. } => {
                desc.color_surfaces.get(index).is_some_and(Option::is_some)
            }
        }
    }

    /// Surfaces of a render texture together with their cache key
    pub(crate) fn framebuffer_parts(&self) -> Option<(&FramebufferKey, &RenderTextureDesc)> {
        match &self.kind {
            TargetKind::Window => None,
            TargetKind::Texture { desc, key } => Some((key, desc)),
        }
    }
}

/// Create a complete framebuffer over the surfaces of `desc`
pub(crate) fn create_framebuffer(gl: &Context, desc: &RenderTextureDesc) -> InitResult<RawFramebuffer> {
    unsafe {
        let raw = gl.create_framebuffer().map_err(InitError::CreateFramebuffer)?;
        gl.bind_framebuffer(glow::FRAMEBUFFER, Some(raw));

        let mut draw_buffers: SmallVec<[u32; MAX_MULTIPLE_RENDER_TARGETS]> = SmallVec::new();
        for (i, surface) in desc.color_surfaces.iter().enumerate() {
            let attachment = glow::COLOR_ATTACHMENT0 + i as u32;
            match surface {
                Some(surface) => {
                    attach_surface(gl, attachment, surface);
                    draw_buffers.push(attachment);
                }
                None => draw_buffers.push(glow::NONE),
            }
        }

        // Trailing unused slots need no draw buffer entry
        while draw_buffers.last() == Some(&glow::NONE) {
            draw_buffers.pop();
        }
        if draw_buffers.is_empty() {
            gl.draw_buffers(&[glow::NONE]);
            gl.read_buffer(glow::NONE);
        } else {
            gl.draw_buffers(&draw_buffers);
        }

        if let Some(surface) = &desc.depth_stencil_surface {
            let attachment = if surface.texture.desc().format.has_stencil() {
                glow::DEPTH_STENCIL_ATTACHMENT
            } else {
                glow::DEPTH_ATTACHMENT
            };
            attach_surface(gl, attachment, surface);
        }

        let status = gl.check_framebuffer_status(glow::FRAMEBUFFER);
        gl.bind_framebuffer(glow::FRAMEBUFFER, None);

        if status != glow::FRAMEBUFFER_COMPLETE {
            gl.delete_framebuffer(raw);
            return Err(InitError::CreateFramebuffer(format!(
                "framebuffer incomplete (0x{:04X})",
                status
            )));
        }

        debug!(
            "Created framebuffer with {} color attachments",
            desc.color_surfaces.iter().flatten().count()
        );
        Ok(raw)
    }
}

unsafe fn attach_surface(gl: &Context, attachment: u32, surface: &RenderSurfaceDesc) {
    let texture = &surface.texture;
    let level = surface.mip_level as i32;

    unsafe {
        if surface.num_faces != 1 {
            gl.framebuffer_texture(glow::FRAMEBUFFER, attachment, Some(texture.raw()), level);
            return;
        }

        match texture.target() {
            glow::TEXTURE_2D | glow::TEXTURE_2D_MULTISAMPLE => gl.framebuffer_texture_2d(
                glow::FRAMEBUFFER,
                attachment,
                texture.target(),
                Some(texture.raw()),
                level,
            ),
            glow::TEXTURE_CUBE_MAP => gl.framebuffer_texture_2d(
                glow::FRAMEBUFFER,
                attachment,
                glow::TEXTURE_CUBE_MAP_POSITIVE_X + surface.face,
                Some(texture.raw()),
                level,
            ),
            // Arrays, cube arrays and 3D textures attach a single layer
            _ => gl.framebuffer_texture_layer(
                glow::FRAMEBUFFER,
                attachment,
                Some(texture.raw()),
                level,
                surface.face as i32,
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_targets_resize() {
        let target = GlRenderTarget::window(1280, 720, true);
        assert!(target.is_window());
        assert!(target.hw_gamma());
        assert!(target.framebuffer_key().is_none());
        assert!(target.has_color_buffer(0));
        assert!(!target.has_color_buffer(1));

        target.resize(1920, 1080);
        assert_eq!((target.width(), target.height()), (1920, 1080));
    }

    #[test]
    fn render_texture_needs_a_surface() {
        assert!(GlRenderTarget::texture(RenderTextureDesc::default()).is_err());
    }
}

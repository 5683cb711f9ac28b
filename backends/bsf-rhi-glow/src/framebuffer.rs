//! Framebuffer objects keyed by their attachments

use bsf_rhi::{MAX_MULTIPLE_RENDER_TARGETS, RhiResult, TextureId};
use smallvec::SmallVec;
use tracing::debug;

use crate::DependencyCache;

/// A single texture surface attached to a framebuffer
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct AttachmentSurface {
    pub texture: TextureId,
    pub mip_level: u32,
    /// First face or array slice
    pub face: u32,
    /// Zero or more than one attaches the whole layered texture
    pub num_faces: u32,
}

impl AttachmentSurface {
    pub const fn new(texture: TextureId, mip_level: u32, face: u32) -> Self {
        Self {
            texture,
            mip_level,
            face,
            num_faces: 1,
        }
    }

    pub const fn is_layered(&self) -> bool {
        self.num_faces != 1
    }
}

/// Ordered colour attachments plus the depth-stencil attachment
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct FramebufferKey {
    pub colors: SmallVec<[Option<AttachmentSurface>; MAX_MULTIPLE_RENDER_TARGETS]>,
    pub depth_stencil: Option<AttachmentSurface>,
}

impl FramebufferKey {
    fn textures(&self) -> impl Iterator<Item = TextureId> + '_ {
        self.colors
            .iter()
            .flatten()
            .chain(self.depth_stencil.iter())
            .map(|surface| surface.texture)
    }

    pub fn num_color_attachments(&self) -> usize {
        self.colors.iter().flatten().count()
    }
}

/// Cache of framebuffer objects, evicted when an attached texture is destroyed
pub struct FramebufferCache<V> {
    cache: DependencyCache<FramebufferKey, TextureId, V>,
    log_misses: bool,
}

impl<V> FramebufferCache<V> {
    pub fn new(log_misses: bool) -> Self {
        Self {
            cache: DependencyCache::new(),
            log_misses,
        }
    }

    pub fn get_framebuffer(
        &mut self,
        key: &FramebufferKey,
        create: impl FnOnce(&FramebufferKey) -> RhiResult<V>,
    ) -> RhiResult<&V> {
        let dependencies: SmallVec<[TextureId; 9]> = key.textures().collect();
        let log_misses = self.log_misses;

        self.cache
            .get_or_insert_with(key.clone(), dependencies, |key| {
                if log_misses {
                    debug!(
                        "Creating framebuffer with {} color attachments",
                        key.num_color_attachments()
                    );
                }
                create(key)
            })
    }

    /// Destroy every framebuffer `texture` is attached to
    pub fn notify_texture_destroyed(&mut self, texture: TextureId, destroy: impl FnMut(V)) -> usize {
        self.cache.evict_dependency(&texture, destroy)
    }

    pub fn num_users(&self, texture: TextureId) -> usize {
        self.cache.num_dependents(&texture)
    }

    pub fn clear(&mut self, destroy: impl FnMut(V)) {
        self.cache.clear(destroy);
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

//! Destruction notices from dropped resources
//!
//! Buffers and textures can be dropped anywhere on the render thread,
//! including while a command buffer holding them is being recorded. They
//! only leave their id here; the device drains the queue before the next
//! draw or render-target change and evicts the derived objects then.

use std::cell::RefCell;
use std::rc::Rc;

use bsf_rhi::{BufferId, TextureId};
use tracing::debug;

use crate::{FramebufferCache, VertexArrayCache};

#[derive(Debug, Default)]
pub struct EvictionQueue {
    buffers: RefCell<Vec<BufferId>>,
    textures: RefCell<Vec<TextureId>>,
}

impl EvictionQueue {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub fn push_buffer(&self, buffer: BufferId) {
        self.buffers.borrow_mut().push(buffer);
    }

    pub fn push_texture(&self, texture: TextureId) {
        self.textures.borrow_mut().push(texture);
    }

    pub fn take_buffers(&self) -> Vec<BufferId> {
        std::mem::take(&mut *self.buffers.borrow_mut())
    }

    pub fn take_textures(&self) -> Vec<TextureId> {
        std::mem::take(&mut *self.textures.borrow_mut())
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.borrow().is_empty() && self.textures.borrow().is_empty()
    }

    /// Evict the VAOs and framebuffers of every queued id
    ///
    /// Returns the number of evicted VAOs and framebuffers.
    pub fn drain<V, F>(
        &self,
        vaos: &mut VertexArrayCache<V>,
        framebuffers: &mut FramebufferCache<F>,
        mut destroy_vao: impl FnMut(V),
        mut destroy_framebuffer: impl FnMut(F),
    ) -> (usize, usize) {
        let mut evicted_vaos = 0;
        for buffer in self.take_buffers() {
            let evicted = vaos.notify_buffer_destroyed(buffer, &mut destroy_vao);
            if evicted > 0 {
                debug!("Evicted {} VAOs using {}", evicted, buffer);
            }
            evicted_vaos += evicted;
        }

        let mut evicted_framebuffers = 0;
        for texture in self.take_textures() {
            let evicted = framebuffers.notify_texture_destroyed(texture, &mut destroy_framebuffer);
            if evicted > 0 {
                debug!("Evicted {} framebuffers using {}", evicted, texture);
            }
            evicted_framebuffers += evicted;
        }

        (evicted_vaos, evicted_framebuffers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AttachmentSurface, FramebufferKey};
    use bsf_rhi::{
        ProgramId, VertexDeclaration, VertexElement, VertexElementSemantic, VertexElementType,
    };

    #[test]
    fn take_drains_pending_ids() {
        let queue = EvictionQueue::new();
        let buffer = BufferId::next();
        queue.push_buffer(buffer);
        queue.push_texture(TextureId::next());
        assert!(!queue.is_empty());

        assert_eq!(queue.take_buffers(), vec![buffer]);
        assert_eq!(queue.take_textures().len(), 1);
        assert!(queue.is_empty());
    }

    #[test]
    fn drain_evicts_objects_of_dropped_resources() {
        let queue = EvictionQueue::new();
        let mut vaos = VertexArrayCache::new(false);
        let mut framebuffers = FramebufferCache::new(false);

        let decl = VertexDeclaration::new(vec![VertexElement::new(
            0,
            0,
            VertexElementType::Float3,
            VertexElementSemantic::Position,
            0,
        )]);
        let dropped = BufferId::next();
        let kept = BufferId::next();
        vaos.get_vao(ProgramId(1), &decl, &[Some(dropped)], |_| Ok(10u32)).unwrap();
        vaos.get_vao(ProgramId(1), &decl, &[Some(kept)], |_| Ok(11u32)).unwrap();

        let texture = TextureId::next();
        let key = FramebufferKey {
            colors: [Some(AttachmentSurface::new(texture, 0, 0))].into_iter().collect(),
            depth_stencil: None,
        };
        framebuffers.get_framebuffer(&key, |_| Ok(20u32)).unwrap();

        queue.push_buffer(dropped);
        queue.push_texture(texture);

        let mut destroyed = Vec::new();
        let mut destroyed_fbos = Vec::new();
        let evicted = queue.drain(
            &mut vaos,
            &mut framebuffers,
            |vao| destroyed.push(vao),
            |fbo| destroyed_fbos.push(fbo),
        );

        assert_eq!(evicted, (1, 1));
        assert_eq!(destroyed, vec![10]);
        assert_eq!(destroyed_fbos, vec![20]);
        assert_eq!(vaos.num_users(dropped), 0);
        assert_eq!(vaos.len(), 1);
        assert!(framebuffers.is_empty());
        assert!(queue.is_empty());

        // Nothing left to evict on the next drain
        assert_eq!(queue.drain(&mut vaos, &mut framebuffers, |_| {}, |_| {}), (0, 0));
    }
}

//! VAO and framebuffer caches keyed by the resources they are built from

use bsf_rhi::{
    BufferId, ProgramId, RhiResult, TextureId, VertexDeclaration, VertexElement,
    VertexElementSemantic, VertexElementType,
};
use bsf_rhi_glow::{AttachmentSurface, FramebufferCache, FramebufferKey, VertexArrayCache};
use pretty_assertions::assert_eq;
use smallvec::smallvec;

fn two_stream_declaration() -> VertexDeclaration {
    VertexDeclaration::new(vec![
        VertexElement::new(0, 0, VertexElementType::Float3, VertexElementSemantic::Position, 0),
        VertexElement::new(1, 0, VertexElementType::Float2, VertexElementSemantic::TexCoord, 0),
    ])
}

fn created(value: u32) -> impl FnOnce(&bsf_rhi_glow::VertexArrayKey) -> RhiResult<u32> {
    move |_| Ok(value)
}

#[test]
fn vao_is_created_once_per_program_and_buffers() {
    let mut cache = VertexArrayCache::new(false);
    let decl = two_stream_declaration();
    let program = ProgramId(1);
    let buffers = [Some(BufferId(10)), Some(BufferId(11))];

    assert_eq!(*cache.get_vao(program, &decl, &buffers, created(1)).unwrap(), 1);
    assert_eq!(*cache.get_vao(program, &decl, &buffers, created(2)).unwrap(), 1);

    let swapped = [Some(BufferId(11)), Some(BufferId(10))];
    assert_eq!(*cache.get_vao(program, &decl, &swapped, created(3)).unwrap(), 3);
    assert_eq!(cache.len(), 2);
}

#[test]
fn unused_trailing_streams_do_not_split_the_key() {
    let mut cache = VertexArrayCache::new(false);
    let decl = two_stream_declaration();
    let program = ProgramId(2);

    let bound = [Some(BufferId(20)), Some(BufferId(21)), None];
    let extra = [Some(BufferId(20)), Some(BufferId(21)), Some(BufferId(99))];

    cache.get_vao(program, &decl, &bound, created(1)).unwrap();
    assert_eq!(*cache.get_vao(program, &decl, &extra, created(2)).unwrap(), 1);
    assert_eq!(cache.num_users(BufferId(99)), 0);
}

#[test]
fn missing_stream_buffer_is_an_error() {
    let mut cache = VertexArrayCache::new(false);
    let decl = two_stream_declaration();

    let result = cache.get_vao(ProgramId(3), &decl, &[Some(BufferId(30)), None], created(1));
    assert!(result.is_err());
    assert!(cache.is_empty());
}

#[test]
fn destroying_a_buffer_evicts_its_vaos() {
    let mut cache = VertexArrayCache::new(false);
    let decl = two_stream_declaration();
    let shared = BufferId(40);

    cache
        .get_vao(ProgramId(4), &decl, &[Some(shared), Some(BufferId(41))], created(1))
        .unwrap();
    cache
        .get_vao(ProgramId(5), &decl, &[Some(shared), Some(BufferId(42))], created(2))
        .unwrap();
    cache
        .get_vao(ProgramId(6), &decl, &[Some(BufferId(43)), Some(BufferId(41))], created(3))
        .unwrap();
    assert_eq!(cache.num_users(shared), 2);

    let mut destroyed = Vec::new();
    assert_eq!(cache.notify_buffer_destroyed(shared, |vao| destroyed.push(vao)), 2);
    destroyed.sort();
    assert_eq!(destroyed, vec![1, 2]);

    assert_eq!(cache.len(), 1);
    assert_eq!(cache.num_users(BufferId(41)), 1);
    assert_eq!(cache.num_users(BufferId(42)), 0);

    // Evicting again finds nothing
    assert_eq!(cache.notify_buffer_destroyed(shared, |_| {}), 0);
}

fn framebuffer_key(colors: &[u32], depth: Option<u32>) -> FramebufferKey {
    FramebufferKey {
        colors: colors
            .iter()
            .map(|&id| Some(AttachmentSurface::new(TextureId(id), 0, 0)))
            .collect(),
        depth_stencil: depth.map(|id| AttachmentSurface::new(TextureId(id), 0, 0)),
    }
}

#[test]
fn framebuffers_are_shared_between_equal_targets() {
    let mut cache = FramebufferCache::new(false);
    let key = framebuffer_key(&[1, 2], Some(3));

    assert_eq!(*cache.get_framebuffer(&key, |_| Ok(7u32)).unwrap(), 7);
    assert_eq!(*cache.get_framebuffer(&key.clone(), |_| Ok(8u32)).unwrap(), 7);
    assert_eq!(cache.len(), 1);
    assert_eq!(key.num_color_attachments(), 2);
}

#[test]
fn attachment_order_and_mips_distinguish_framebuffers() {
    let mut cache = FramebufferCache::new(false);

    cache
        .get_framebuffer(&framebuffer_key(&[1, 2], None), |_| Ok(1u32))
        .unwrap();
    cache
        .get_framebuffer(&framebuffer_key(&[2, 1], None), |_| Ok(2u32))
        .unwrap();

    let mip = FramebufferKey {
        colors: smallvec![Some(AttachmentSurface::new(TextureId(1), 1, 0)), None],
        depth_stencil: None,
    };
    cache.get_framebuffer(&mip, |_| Ok(3u32)).unwrap();

    assert_eq!(cache.len(), 3);
    assert_eq!(cache.num_users(TextureId(1)), 3);
}

#[test]
fn destroying_a_depth_texture_evicts_its_framebuffers() {
    let mut cache = FramebufferCache::new(false);
    cache
        .get_framebuffer(&framebuffer_key(&[1], Some(9)), |_| Ok(1u32))
        .unwrap();
    cache
        .get_framebuffer(&framebuffer_key(&[2], Some(9)), |_| Ok(2u32))
        .unwrap();
    cache
        .get_framebuffer(&framebuffer_key(&[1], None), |_| Ok(3u32))
        .unwrap();

    let mut destroyed = Vec::new();
    assert_eq!(cache.notify_texture_destroyed(TextureId(9), |fb| destroyed.push(fb)), 2);
    destroyed.sort();
    assert_eq!(destroyed, vec![1, 2]);

    assert_eq!(cache.len(), 1);
    assert_eq!(cache.num_users(TextureId(1)), 1);
    assert_eq!(cache.num_users(TextureId(2)), 0);
}

#[test]
fn failed_creation_is_not_cached() {
    let mut cache: FramebufferCache<u32> = FramebufferCache::new(false);
    let key = framebuffer_key(&[5], None);

    let failed = cache.get_framebuffer(&key, |_| {
        Err(bsf_rhi::RhiError::rendering_api("framebuffer incomplete"))
    });
    assert!(failed.is_err());
    assert!(cache.is_empty());
    assert_eq!(cache.num_users(TextureId(5)), 0);

    assert_eq!(*cache.get_framebuffer(&key, |_| Ok(4)).unwrap(), 4);
}

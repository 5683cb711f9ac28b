//! Vertex array objects keyed by program and bound vertex buffers

use std::rc::Rc;

use bsf_rhi::{
    BufferId, IntoRhiError, ProgramId, RhiError, RhiResult, VertexDeclaration, VertexElementType,
    VertexInputAttribute,
};
use glow::{Context, HasContext};
use smallvec::SmallVec;
use tracing::debug;

use crate::{DependencyCache, GlGpuBuffer, InitError, RawVertexArray};

/// Identity of a VAO: the vertex program and the buffers of every used stream
///
/// Hashing and equality only look at identities.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VertexArrayKey {
    pub program: ProgramId,
    pub buffers: SmallVec<[BufferId; 4]>,
}

/// A declaration element matched to a program input
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ResolvedAttribute {
    pub location: u32,
    pub stream: u16,
    pub offset: u32,
    pub stride: u32,
    pub element_type: VertexElementType,
    pub instance_step_rate: u32,
}

/// Match declaration elements to program inputs by semantic and semantic index
///
/// Elements the program does not read are skipped.
pub fn resolve_vertex_attributes(
    declaration: &VertexDeclaration,
    inputs: &[VertexInputAttribute],
) -> SmallVec<[ResolvedAttribute; 8]> {
    declaration
        .elements()
        .iter()
        .filter_map(|element| {
            let input = inputs.iter().find(|input| {
                input.semantic == element.semantic && input.semantic_idx == element.semantic_idx
            })?;

            Some(ResolvedAttribute {
                location: input.location,
                stream: element.stream_idx,
                offset: element.offset,
                stride: declaration.vertex_size(element.stream_idx),
                element_type: element.element_type,
                instance_step_rate: element.instance_step_rate,
            })
        })
        .collect()
}

/// Build the key for the streams `declaration` reads from `bound_buffers`
///
/// Every stream up to the highest one in the declaration must have a buffer.
pub fn vertex_array_key(
    program: ProgramId,
    declaration: &VertexDeclaration,
    bound_buffers: &[Option<BufferId>],
) -> RhiResult<VertexArrayKey> {
    let used_streams = declaration.used_stream_count();

    let mut buffers = SmallVec::with_capacity(used_streams);
    for stream in 0..used_streams {
        match bound_buffers.get(stream).copied().flatten() {
            Some(buffer) => buffers.push(buffer),
            None => {
                return Err(RhiError::invalid_state(format!(
                    "Cannot draw with a vertex declaration that reads stream {} without a vertex buffer bound to it",
                    stream
                )));
            }
        }
    }

    Ok(VertexArrayKey { program, buffers })
}

/// Cache of VAOs, evicted when any of their buffers is destroyed
pub struct VertexArrayCache<V> {
    cache: DependencyCache<VertexArrayKey, BufferId, V>,
    log_misses: bool,
}

impl<V> VertexArrayCache<V> {
    pub fn new(log_misses: bool) -> Self {
        Self {
            cache: DependencyCache::new(),
            log_misses,
        }
    }

    /// Find or create the VAO for `program` reading `bound_buffers` through `declaration`
    ///
    /// `create` receives the key and is only called on a miss.
    pub fn get_vao(
        &mut self,
        program: ProgramId,
        declaration: &VertexDeclaration,
        bound_buffers: &[Option<BufferId>],
        create: impl FnOnce(&VertexArrayKey) -> RhiResult<V>,
    ) -> RhiResult<&V> {
        let key = vertex_array_key(program, declaration, bound_buffers)?;
        let dependencies = key.buffers.clone();
        let log_misses = self.log_misses;

        self.cache.get_or_insert_with(key, dependencies, |key| {
            if log_misses {
                debug!(
                    "Creating VAO for {} with {} vertex streams",
                    key.program,
                    key.buffers.len()
                );
            }
            create(key)
        })
    }

    /// Destroy every VAO referencing `buffer`
    pub fn notify_buffer_destroyed(&mut self, buffer: BufferId, destroy: impl FnMut(V)) -> usize {
        self.cache.evict_dependency(&buffer, destroy)
    }

    /// Number of VAOs using `buffer`
    pub fn num_users(&self, buffer: BufferId) -> usize {
        self.cache.num_dependents(&buffer)
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

/// GL component type of a vertex element
pub fn gl_vertex_type(element_type: VertexElementType) -> u32 {
    use VertexElementType::*;
    match element_type {
        Float1 | Float2 | Float3 | Float4 => glow::FLOAT,
        Color | UByte4 | UByte4Norm => glow::UNSIGNED_BYTE,
        Short1 | Short2 | Short4 => glow::SHORT,
        UShort1 | UShort2 | UShort4 => glow::UNSIGNED_SHORT,
        Int1 | Int2 | Int3 | Int4 => glow::INT,
        UInt1 | UInt2 | UInt3 | UInt4 => glow::UNSIGNED_INT,
    }
}

/// Create a VAO reading `buffers` through the attributes `inputs` consumes
///
/// The VAO is left bound.
pub(crate) fn create_vertex_array(
    gl: &Context,
    declaration: &VertexDeclaration,
    inputs: &[VertexInputAttribute],
    buffers: &[Option<Rc<GlGpuBuffer>>],
) -> RhiResult<RawVertexArray> {
    unsafe {
        let vao = gl
            .create_vertex_array()
            .map_err(|e| InitError::CreateVertexArray(e).into_rhi_error())?;
        gl.bind_vertex_array(Some(vao));

        for attribute in resolve_vertex_attributes(declaration, inputs) {
            let Some(buffer) = buffers.get(attribute.stream as usize).and_then(Option::as_ref)
            else {
                continue;
            };

            gl.bind_buffer(glow::ARRAY_BUFFER, Some(buffer.raw()));
            gl.enable_vertex_attrib_array(attribute.location);

            let size = attribute.element_type.component_count() as i32;
            let ty = gl_vertex_type(attribute.element_type);
            if attribute.element_type.is_integer() {
                gl.vertex_attrib_pointer_i32(
                    attribute.location,
                    size,
                    ty,
                    attribute.stride as i32,
                    attribute.offset as i32,
                );
            } else {
                gl.vertex_attrib_pointer_f32(
                    attribute.location,
                    size,
                    ty,
                    attribute.element_type.is_normalized(),
                    attribute.stride as i32,
                    attribute.offset as i32,
                );
            }

            if attribute.instance_step_rate > 0 {
                gl.vertex_attrib_divisor(attribute.location, attribute.instance_step_rate);
            }
        }

        gl.bind_buffer(glow::ARRAY_BUFFER, None);
        Ok(vao)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bsf_rhi::{VertexElement, VertexElementSemantic};

    fn declaration() -> VertexDeclaration {
        VertexDeclaration::new(vec![
            VertexElement::new(0, 0, VertexElementType::Float3, VertexElementSemantic::Position, 0),
            VertexElement::new(0, 12, VertexElementType::Float2, VertexElementSemantic::TexCoord, 0),
            VertexElement::new(1, 0, VertexElementType::Color, VertexElementSemantic::Color, 0)
                .with_instance_step_rate(1),
        ])
    }

    #[test]
    fn attributes_match_by_semantic() {
        let inputs = [
            VertexInputAttribute {
                semantic: VertexElementSemantic::Color,
                semantic_idx: 0,
                location: 2,
            },
            VertexInputAttribute {
                semantic: VertexElementSemantic::Position,
                semantic_idx: 0,
                location: 0,
            },
        ];

        let resolved = resolve_vertex_attributes(&declaration(), &inputs);
        assert_eq!(resolved.len(), 2);
        assert_eq!(resolved[0].location, 0);
        assert_eq!(resolved[0].stride, 20);
        assert_eq!(resolved[1].location, 2);
        assert_eq!(resolved[1].stream, 1);
        assert_eq!(resolved[1].instance_step_rate, 1);
    }

    #[test]
    fn key_requires_every_used_stream() {
        let program = ProgramId::next();
        let buffer = BufferId::next();
        assert!(vertex_array_key(program, &declaration(), &[Some(buffer)]).is_err());
        assert!(vertex_array_key(program, &declaration(), &[Some(buffer), None]).is_err());

        let key = vertex_array_key(program, &declaration(), &[Some(buffer), Some(buffer), None])
            .unwrap();
        assert_eq!(key.buffers.len(), 2);
    }

    #[test]
    fn colors_are_normalized_bytes() {
        assert_eq!(gl_vertex_type(VertexElementType::Color), glow::UNSIGNED_BYTE);
        assert!(VertexElementType::Color.is_normalized());
        assert_eq!(gl_vertex_type(VertexElementType::UShort2), glow::UNSIGNED_SHORT);
    }
}

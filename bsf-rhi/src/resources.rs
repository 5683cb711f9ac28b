//! Resource descriptions shared by backends

use bitflags::bitflags;

use crate::{GpuProgramType, VertexInputAttribute};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TextureType {
    #[default]
    Texture2D,
    Texture3D,
    TextureCube,
}

/// Pixel formats supported by the backends
///
/// Only the formats engine render paths actually use are listed.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PixelFormat {
    R8,
    RG8,
    RGBA8,
    BGRA8,
    R16F,
    RG16F,
    RGBA16F,
    R32F,
    RG32F,
    RGBA32F,
    R32U,
    RG11B10F,
    D32,
    D24S8,
    D32S8X24,
    D16,
}

impl PixelFormat {
    pub const fn is_depth(self) -> bool {
        matches!(
            self,
            PixelFormat::D32 | PixelFormat::D24S8 | PixelFormat::D32S8X24 | PixelFormat::D16
        )
    }

    pub const fn has_stencil(self) -> bool {
        matches!(self, PixelFormat::D24S8 | PixelFormat::D32S8X24)
    }

    /// Bytes per pixel
    pub const fn size(self) -> u32 {
        match self {
            PixelFormat::R8 => 1,
            PixelFormat::RG8 | PixelFormat::R16F | PixelFormat::D16 => 2,
            PixelFormat::RGBA8
            | PixelFormat::BGRA8
            | PixelFormat::RG16F
            | PixelFormat::R32F
            | PixelFormat::R32U
            | PixelFormat::RG11B10F
            | PixelFormat::D32
            | PixelFormat::D24S8 => 4,
            PixelFormat::RGBA16F | PixelFormat::RG32F | PixelFormat::D32S8X24 => 8,
            PixelFormat::RGBA32F => 16,
        }
    }
}

bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct TextureUsage: u32 {
        const STATIC = 1 << 0;
        const DYNAMIC = 1 << 1;
        const RENDER_TARGET = 1 << 2;
        const DEPTH_STENCIL = 1 << 3;
        const LOAD_STORE = 1 << 4;
        const CPU_READABLE = 1 << 5;
    }
}

impl Default for TextureUsage {
    fn default() -> Self {
        TextureUsage::STATIC
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TextureDesc {
    pub texture_type: TextureType,
    pub format: PixelFormat,
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    /// Mip levels beyond the top level
    pub num_mips: u32,
    /// Greater than one for texture arrays
    pub num_array_slices: u32,
    pub num_samples: u32,
    pub hw_gamma: bool,
    pub usage: TextureUsage,
}

impl Default for TextureDesc {
    fn default() -> Self {
        Self {
            texture_type: TextureType::Texture2D,
            format: PixelFormat::RGBA8,
            width: 1,
            height: 1,
            depth: 1,
            num_mips: 0,
            num_array_slices: 1,
            num_samples: 0,
            hw_gamma: false,
            usage: TextureUsage::STATIC,
        }
    }
}

impl TextureDesc {
    /// Faces per array slice times array slices
    pub fn num_faces(&self) -> u32 {
        let per_slice = match self.texture_type {
            TextureType::TextureCube => 6,
            _ => 1,
        };
        per_slice * self.num_array_slices.max(1)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum GpuBufferType {
    Vertex,
    Index,
    /// Uniform block storage
    ParamBlock,
    /// Typed buffer sampled through a buffer texture
    Standard,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BufferUsage {
    #[default]
    Static,
    Dynamic,
    Stream,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GpuBufferDesc {
    pub buffer_type: GpuBufferType,
    pub size: u32,
    pub usage: BufferUsage,
    /// Element format for `Standard` buffers
    pub format: Option<PixelFormat>,
    /// Index width for `Index` buffers
    pub index_type: Option<crate::IndexType>,
}

impl GpuBufferDesc {
    pub fn vertex(size: u32, usage: BufferUsage) -> Self {
        Self {
            buffer_type: GpuBufferType::Vertex,
            size,
            usage,
            format: None,
            index_type: None,
        }
    }

    pub fn index(index_type: crate::IndexType, num_indices: u32, usage: BufferUsage) -> Self {
        Self {
            buffer_type: GpuBufferType::Index,
            size: index_type.size() * num_indices,
            usage,
            format: None,
            index_type: Some(index_type),
        }
    }

    pub fn param_block(size: u32, usage: BufferUsage) -> Self {
        Self {
            buffer_type: GpuBufferType::ParamBlock,
            size,
            usage,
            format: None,
            index_type: None,
        }
    }

    pub fn standard(format: PixelFormat, num_elements: u32, usage: BufferUsage) -> Self {
        Self {
            buffer_type: GpuBufferType::Standard,
            size: format.size() * num_elements,
            usage,
            format: Some(format),
            index_type: None,
        }
    }
}

/// A named program parameter bound through a logical slot
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GpuParamObjectDesc {
    /// Name of the uniform or block in the program source
    pub name: String,
    /// Logical slot the engine binds the resource to
    pub slot: u32,
}

impl GpuParamObjectDesc {
    pub fn new(name: impl Into<String>, slot: u32) -> Self {
        Self {
            name: name.into(),
            slot,
        }
    }
}

/// Resources a program reads, grouped by binding kind
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GpuParamDesc {
    pub textures: Vec<GpuParamObjectDesc>,
    pub load_store_textures: Vec<GpuParamObjectDesc>,
    pub buffers: Vec<GpuParamObjectDesc>,
    pub param_blocks: Vec<GpuParamObjectDesc>,
}

impl GpuParamDesc {
    pub fn is_empty(&self) -> bool {
        self.textures.is_empty()
            && self.load_store_textures.is_empty()
            && self.buffers.is_empty()
            && self.param_blocks.is_empty()
    }
}

/// Source and stage of a GPU program
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GpuProgramDesc {
    pub program_type: GpuProgramType,
    pub source: String,
    pub entry_point: String,
    /// Geometry programs reading adjacency primitives
    pub requires_adjacency: bool,
    /// Inputs of a vertex program, matched against vertex declarations
    pub vertex_inputs: Vec<VertexInputAttribute>,
    pub params: GpuParamDesc,
}

impl GpuProgramDesc {
    pub fn new(program_type: GpuProgramType, source: impl Into<String>) -> Self {
        Self {
            program_type,
            source: source.into(),
            entry_point: "main".to_owned(),
            requires_adjacency: false,
            vertex_inputs: Vec::new(),
            params: GpuParamDesc::default(),
        }
    }

    pub fn with_vertex_inputs(mut self, inputs: Vec<VertexInputAttribute>) -> Self {
        self.vertex_inputs = inputs;
        self
    }

    pub fn with_params(mut self, params: GpuParamDesc) -> Self {
        self.params = params;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::IndexType;

    #[test]
    fn cube_faces_include_array_slices() {
        let desc = TextureDesc {
            texture_type: TextureType::TextureCube,
            num_array_slices: 2,
            ..Default::default()
        };
        assert_eq!(desc.num_faces(), 12);
    }

    #[test]
    fn index_buffer_size_follows_index_type() {
        let desc = GpuBufferDesc::index(IndexType::U16, 300, BufferUsage::Static);
        assert_eq!(desc.size, 600);
        assert_eq!(desc.index_type, Some(IndexType::U16));
    }

    #[test]
    fn depth_formats() {
        assert!(PixelFormat::D24S8.is_depth());
        assert!(PixelFormat::D24S8.has_stencil());
        assert!(!PixelFormat::D32.has_stencil());
        assert!(!PixelFormat::RGBA16F.is_depth());
    }
}

//! Vertex declarations and program input descriptions

use std::sync::atomic::{AtomicU32, Ordering};

/// Data type of a single vertex element
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum VertexElementType {
    Float1,
    Float2,
    Float3,
    Float4,
    /// Four normalized unsigned bytes, RGBA order
    Color,
    Short1,
    Short2,
    Short4,
    UShort1,
    UShort2,
    UShort4,
    Int1,
    Int2,
    Int3,
    Int4,
    UInt1,
    UInt2,
    UInt3,
    UInt4,
    UByte4,
    UByte4Norm,
}

impl VertexElementType {
    /// Size of the element in bytes
    pub const fn size(self) -> u32 {
        use VertexElementType::*;
        match self {
            Float1 | Int1 | UInt1 => 4,
            Float2 | Int2 | UInt2 => 8,
            Float3 | Int3 | UInt3 => 12,
            Float4 | Int4 | UInt4 => 16,
            Color | UByte4 | UByte4Norm => 4,
            Short1 | UShort1 => 2,
            Short2 | UShort2 => 4,
            Short4 | UShort4 => 8,
        }
    }

    pub const fn component_count(self) -> u32 {
        use VertexElementType::*;
        match self {
            Float1 | Short1 | UShort1 | Int1 | UInt1 => 1,
            Float2 | Short2 | UShort2 | Int2 | UInt2 => 2,
            Float3 | Int3 | UInt3 => 3,
            Float4 | Short4 | UShort4 | Int4 | UInt4 | Color | UByte4 | UByte4Norm => 4,
        }
    }

    /// Whether the element is read as an integer (not converted to float) by the program
    pub const fn is_integer(self) -> bool {
        use VertexElementType::*;
        matches!(
            self,
            Short1
                | Short2
                | Short4
                | UShort1
                | UShort2
                | UShort4
                | Int1
                | Int2
                | Int3
                | Int4
                | UInt1
                | UInt2
                | UInt3
                | UInt4
                | UByte4
        )
    }

    pub const fn is_normalized(self) -> bool {
        matches!(
            self,
            VertexElementType::Color | VertexElementType::UByte4Norm
        )
    }
}

/// Meaning of a vertex element, used to match it with program inputs
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum VertexElementSemantic {
    Position,
    BlendWeights,
    BlendIndices,
    Normal,
    Color,
    TexCoord,
    Binormal,
    Tangent,
    PositionTransformed,
    PointSize,
}

/// A single element of a vertex declaration
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VertexElement {
    pub stream_idx: u16,
    /// Byte offset from the start of the vertex in its stream
    pub offset: u32,
    pub element_type: VertexElementType,
    pub semantic: VertexElementSemantic,
    pub semantic_idx: u16,
    /// Zero for per-vertex data, otherwise instances per step
    pub instance_step_rate: u32,
}

impl VertexElement {
    pub const fn new(
        stream_idx: u16,
        offset: u32,
        element_type: VertexElementType,
        semantic: VertexElementSemantic,
        semantic_idx: u16,
    ) -> Self {
        Self {
            stream_idx,
            offset,
            element_type,
            semantic,
            semantic_idx,
            instance_step_rate: 0,
        }
    }

    pub const fn with_instance_step_rate(mut self, rate: u32) -> Self {
        self.instance_step_rate = rate;
        self
    }

    #[inline]
    pub const fn size(&self) -> u32 {
        self.element_type.size()
    }
}

/// Identity of a vertex declaration
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VertexDeclarationId(pub u32);

/// Ordered list of vertex elements spread over one or more streams
#[derive(Debug, Clone, PartialEq)]
pub struct VertexDeclaration {
    id: VertexDeclarationId,
    elements: Vec<VertexElement>,
}

impl VertexDeclaration {
    pub fn new(elements: Vec<VertexElement>) -> Self {
        static NEXT: AtomicU32 = AtomicU32::new(1);
        Self {
            id: VertexDeclarationId(NEXT.fetch_add(1, Ordering::Relaxed)),
            elements,
        }
    }

    #[inline]
    pub fn id(&self) -> VertexDeclarationId {
        self.id
    }

    #[inline]
    pub fn elements(&self) -> &[VertexElement] {
        &self.elements
    }

    /// Highest stream index referenced, `None` for an empty declaration
    pub fn max_stream_index(&self) -> Option<u16> {
        self.elements.iter().map(|e| e.stream_idx).max()
    }

    /// Number of vertex buffer slots a draw with this declaration reads
    pub fn used_stream_count(&self) -> usize {
        self.max_stream_index().map_or(0, |idx| idx as usize + 1)
    }

    /// Stride of a vertex in `stream`
    pub fn vertex_size(&self, stream: u16) -> u32 {
        self.elements
            .iter()
            .filter(|e| e.stream_idx == stream)
            .map(|e| e.offset + e.size())
            .max()
            .unwrap_or(0)
    }

    pub fn find_element(
        &self,
        semantic: VertexElementSemantic,
        semantic_idx: u16,
    ) -> Option<&VertexElement> {
        self.elements
            .iter()
            .find(|e| e.semantic == semantic && e.semantic_idx == semantic_idx)
    }
}

/// Vertex input declared by a vertex program
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VertexInputAttribute {
    pub semantic: VertexElementSemantic,
    pub semantic_idx: u16,
    /// Attribute location in the program
    pub location: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use VertexElementSemantic as Sem;
    use VertexElementType as Ty;

    fn declaration() -> VertexDeclaration {
        VertexDeclaration::new(vec![
            VertexElement::new(0, 0, Ty::Float3, Sem::Position, 0),
            VertexElement::new(0, 12, Ty::Float2, Sem::TexCoord, 0),
            VertexElement::new(2, 0, Ty::Color, Sem::Color, 0).with_instance_step_rate(1),
        ])
    }

    #[test]
    fn used_streams_follow_highest_index() {
        let decl = declaration();
        assert_eq!(decl.max_stream_index(), Some(2));
        assert_eq!(decl.used_stream_count(), 3);
        assert_eq!(VertexDeclaration::new(Vec::new()).used_stream_count(), 0);
    }

    #[test]
    fn vertex_size_per_stream() {
        let decl = declaration();
        assert_eq!(decl.vertex_size(0), 20);
        assert_eq!(decl.vertex_size(1), 0);
        assert_eq!(decl.vertex_size(2), 4);
    }

    #[test]
    fn declarations_get_distinct_ids() {
        assert_ne!(declaration().id(), declaration().id());
    }

    #[test]
    fn element_type_classification() {
        assert!(Ty::UInt2.is_integer());
        assert!(!Ty::Color.is_integer());
        assert!(Ty::Color.is_normalized());
        assert_eq!(Ty::Short4.component_count(), 4);
    }
}

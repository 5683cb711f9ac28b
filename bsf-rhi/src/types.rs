//! Shared enums, identifiers and small value types used across backends

use std::sync::atomic::{AtomicU32, Ordering};

use bitflags::bitflags;

/// Programmable pipeline stage a GPU program or binding belongs to
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum GpuProgramType {
    Vertex,
    Fragment,
    Geometry,
    Hull,
    Domain,
    Compute,
}

impl GpuProgramType {
    /// Number of stages, usable as an array length
    pub const COUNT: usize = 6;

    /// All stages in index order
    pub const ALL: [GpuProgramType; Self::COUNT] = [
        GpuProgramType::Vertex,
        GpuProgramType::Fragment,
        GpuProgramType::Geometry,
        GpuProgramType::Hull,
        GpuProgramType::Domain,
        GpuProgramType::Compute,
    ];

    /// The five stages that make up a graphics pipeline
    pub const GRAPHICS: [GpuProgramType; 5] = [
        GpuProgramType::Vertex,
        GpuProgramType::Fragment,
        GpuProgramType::Geometry,
        GpuProgramType::Hull,
        GpuProgramType::Domain,
    ];

    /// Dense index of the stage
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            GpuProgramType::Vertex => "vertex",
            GpuProgramType::Fragment => "fragment",
            GpuProgramType::Geometry => "geometry",
            GpuProgramType::Hull => "hull",
            GpuProgramType::Domain => "domain",
            GpuProgramType::Compute => "compute",
        }
    }
}

impl std::fmt::Display for GpuProgramType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Kind of queue a command buffer is recorded for
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub enum QueueType {
    #[default]
    Graphics,
    Compute,
    Upload,
}

/// Primitive topology used by draw calls
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub enum DrawOperation {
    PointList,
    LineList,
    LineStrip,
    #[default]
    TriangleList,
    TriangleStrip,
    TriangleFan,
}

impl DrawOperation {
    /// Number of primitives produced by `vertex_count` vertices
    pub fn primitive_count(self, vertex_count: u32) -> u32 {
        match self {
            DrawOperation::PointList => vertex_count,
            DrawOperation::LineList => vertex_count / 2,
            DrawOperation::LineStrip => vertex_count.saturating_sub(1),
            DrawOperation::TriangleList => vertex_count / 3,
            DrawOperation::TriangleStrip | DrawOperation::TriangleFan => {
                vertex_count.saturating_sub(2)
            }
        }
    }
}

/// Width of the indices stored in an index buffer
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum IndexType {
    U16,
    U32,
}

impl IndexType {
    pub const fn size(self) -> u32 {
        match self {
            IndexType::U16 => 2,
            IndexType::U32 => 4,
        }
    }
}

bitflags! {
    /// Surfaces affected by a clear operation
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct FrameBufferType: u32 {
        const COLOR = 0x1;
        const DEPTH = 0x2;
        const STENCIL = 0x4;
    }
}

/// Linear RGBA color
#[derive(Debug, Copy, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const BLACK: Color = Color::new(0.0, 0.0, 0.0, 1.0);
    pub const WHITE: Color = Color::new(1.0, 1.0, 1.0, 1.0);
    pub const TRANSPARENT: Color = Color::new(0.0, 0.0, 0.0, 0.0);

    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }
}

/// Rectangle in normalized `[0, 1]` coordinates
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Rect2 {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect2 {
    pub const FULL: Rect2 = Rect2 {
        x: 0.0,
        y: 0.0,
        width: 1.0,
        height: 1.0,
    };

    /// Scale to pixel coordinates of a `width` x `height` surface
    pub fn to_pixels(self, width: u32, height: u32) -> Rect2I {
        Rect2I {
            x: (self.x * width as f32) as i32,
            y: (self.y * height as f32) as i32,
            width: (self.width * width as f32) as u32,
            height: (self.height * height as f32) as u32,
        }
    }
}

impl Default for Rect2 {
    fn default() -> Self {
        Self::FULL
    }
}

/// Rectangle in pixel coordinates
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub struct Rect2I {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect2I {
    pub const fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub const fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Sub-resource of a texture selected for binding
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub struct TextureSurface {
    pub mip_level: u32,
    /// Zero means "all remaining levels"
    pub num_mip_levels: u32,
    pub face: u32,
    /// Zero means "all remaining faces"
    pub num_faces: u32,
}

impl TextureSurface {
    /// The whole texture
    pub const COMPLETE: TextureSurface = TextureSurface {
        mip_level: 0,
        num_mip_levels: 0,
        face: 0,
        num_faces: 0,
    };

    pub const fn single(mip_level: u32, face: u32) -> Self {
        Self {
            mip_level,
            num_mip_levels: 1,
            face,
            num_faces: 1,
        }
    }
}

macro_rules! resource_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u32);

        impl $name {
            /// Allocate a process-unique identifier
            pub fn next() -> Self {
                static NEXT: AtomicU32 = AtomicU32::new(1);
                Self(NEXT.fetch_add(1, Ordering::Relaxed))
            }

            #[inline]
            pub const fn get(self) -> u32 {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}#{}", stringify!($name), self.0)
            }
        }
    };
}

resource_id!(
    /// Identity of a GPU program, stable for the program's lifetime
    ProgramId
);
resource_id!(
    /// Identity of a GPU buffer, never reused within a process
    BufferId
);
resource_id!(
    /// Identity of a texture, never reused within a process
    TextureId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitive_counts_follow_topology() {
        assert_eq!(DrawOperation::TriangleList.primitive_count(9), 3);
        assert_eq!(DrawOperation::TriangleStrip.primitive_count(5), 3);
        assert_eq!(DrawOperation::TriangleFan.primitive_count(1), 0);
        assert_eq!(DrawOperation::LineStrip.primitive_count(0), 0);
        assert_eq!(DrawOperation::PointList.primitive_count(7), 7);
    }

    #[test]
    fn resource_ids_are_unique() {
        let a = BufferId::next();
        let b = BufferId::next();
        assert_ne!(a, b);
        assert!(b.get() > a.get());
    }

    #[test]
    fn normalized_rect_scales_to_pixels() {
        let rect = Rect2 {
            x: 0.5,
            y: 0.25,
            width: 0.5,
            height: 0.5,
        };
        assert_eq!(rect.to_pixels(800, 600), Rect2I::new(400, 150, 400, 300));
    }
}

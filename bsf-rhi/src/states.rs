//! Fixed-function pipeline state descriptions

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BlendFactor {
    One,
    Zero,
    DestColor,
    SourceColor,
    InvDestColor,
    InvSourceColor,
    DestAlpha,
    SourceAlpha,
    InvDestAlpha,
    InvSourceAlpha,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BlendOperation {
    Add,
    Subtract,
    ReverseSubtract,
    Min,
    Max,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CompareFunction {
    AlwaysFail,
    AlwaysPass,
    Less,
    LessEqual,
    Equal,
    NotEqual,
    GreaterEqual,
    Greater,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CullingMode {
    None,
    Clockwise,
    #[default]
    CounterClockwise,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PolygonMode {
    Wireframe,
    #[default]
    Solid,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum StencilOperation {
    Keep,
    Zero,
    Replace,
    Increment,
    Decrement,
    IncrementWrap,
    DecrementWrap,
    Invert,
}

/// Blend settings of a single render target
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RenderTargetBlendStateDesc {
    pub blend_enable: bool,
    pub src_blend: BlendFactor,
    pub dst_blend: BlendFactor,
    pub blend_op: BlendOperation,
    pub src_blend_alpha: BlendFactor,
    pub dst_blend_alpha: BlendFactor,
    pub blend_op_alpha: BlendOperation,
    /// One bit per channel, RGBA from the lowest bit
    pub render_target_write_mask: u8,
}

impl Default for RenderTargetBlendStateDesc {
    fn default() -> Self {
        Self {
            blend_enable: false,
            src_blend: BlendFactor::One,
            dst_blend: BlendFactor::Zero,
            blend_op: BlendOperation::Add,
            src_blend_alpha: BlendFactor::One,
            dst_blend_alpha: BlendFactor::Zero,
            blend_op_alpha: BlendOperation::Add,
            render_target_write_mask: 0xF,
        }
    }
}

/// Maximum number of simultaneously bound color targets
pub const MAX_MULTIPLE_RENDER_TARGETS: usize = 8;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BlendStateDesc {
    pub alpha_to_coverage_enable: bool,
    /// When false only the first render target's settings are used
    pub independant_blend_enable: bool,
    pub render_targets: [RenderTargetBlendStateDesc; MAX_MULTIPLE_RENDER_TARGETS],
}

#[derive(Debug, Copy, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RasterizerStateDesc {
    pub polygon_mode: PolygonMode,
    pub cull_mode: CullingMode,
    pub depth_bias: f32,
    pub slope_scaled_depth_bias: f32,
    pub depth_clip_enable: bool,
    pub scissor_enable: bool,
    pub multisample_enable: bool,
    pub antialiased_line_enable: bool,
}

impl Default for RasterizerStateDesc {
    fn default() -> Self {
        Self {
            polygon_mode: PolygonMode::Solid,
            cull_mode: CullingMode::CounterClockwise,
            depth_bias: 0.0,
            slope_scaled_depth_bias: 0.0,
            depth_clip_enable: true,
            scissor_enable: false,
            multisample_enable: true,
            antialiased_line_enable: false,
        }
    }
}

/// Stencil operations for one face
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StencilFaceDesc {
    pub fail_op: StencilOperation,
    pub depth_fail_op: StencilOperation,
    pub pass_op: StencilOperation,
    pub compare_func: CompareFunction,
}

impl Default for StencilFaceDesc {
    fn default() -> Self {
        Self {
            fail_op: StencilOperation::Keep,
            depth_fail_op: StencilOperation::Keep,
            pass_op: StencilOperation::Keep,
            compare_func: CompareFunction::AlwaysPass,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DepthStencilStateDesc {
    pub depth_read_enable: bool,
    pub depth_write_enable: bool,
    pub depth_comparison_func: CompareFunction,
    pub stencil_enable: bool,
    pub stencil_read_mask: u8,
    pub stencil_write_mask: u8,
    pub front: StencilFaceDesc,
    pub back: StencilFaceDesc,
}

impl Default for DepthStencilStateDesc {
    fn default() -> Self {
        Self {
            depth_read_enable: true,
            depth_write_enable: true,
            depth_comparison_func: CompareFunction::Less,
            stencil_enable: false,
            stencil_read_mask: 0xFF,
            stencil_write_mask: 0xFF,
            front: StencilFaceDesc::default(),
            back: StencilFaceDesc::default(),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FilterOptions {
    None,
    Point,
    #[default]
    Linear,
    Anisotropic,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TextureAddressingMode {
    #[default]
    Wrap,
    Mirror,
    Clamp,
    Border,
}

#[derive(Debug, Copy, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SamplerStateDesc {
    pub min_filter: FilterOptions,
    pub mag_filter: FilterOptions,
    /// `None` disables mipmapping
    pub mip_filter: FilterOptions,
    pub address_u: TextureAddressingMode,
    pub address_v: TextureAddressingMode,
    pub address_w: TextureAddressingMode,
    pub max_anisotropy: u32,
    pub mip_min: f32,
    pub mip_max: f32,
    pub mip_lod_bias: f32,
    pub border_color: crate::Color,
    /// Enables depth comparison sampling when set
    pub comparison_func: Option<CompareFunction>,
}

impl Default for SamplerStateDesc {
    fn default() -> Self {
        Self {
            min_filter: FilterOptions::Linear,
            mag_filter: FilterOptions::Linear,
            mip_filter: FilterOptions::Point,
            address_u: TextureAddressingMode::Wrap,
            address_v: TextureAddressingMode::Wrap,
            address_w: TextureAddressingMode::Wrap,
            max_anisotropy: 0,
            mip_min: -f32::MAX,
            mip_max: f32::MAX,
            mip_lod_bias: 0.0,
            border_color: crate::Color::WHITE,
            comparison_func: None,
        }
    }
}

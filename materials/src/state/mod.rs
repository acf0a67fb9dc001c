//! Fixed-function state blocks.
//!
//! Each block is a flat record of enumerated fields. Documents name blocks
//! per category and materials refer to them by id; [`StateRegistry`] owns
//! the parsed, inheritance-resolved blocks.

mod parser;
mod registry;

use bitflags::bitflags;

pub use parser::StateBlock;
pub use registry::{
    BLEND_STATES, DEPTH_STENCIL_STATES, RASTERIZER_STATES, RENDER_TARGET_STATES, StateRegistry,
    VERTEX_FORMATS,
};

/// Enumerations spelled by name in documents.
pub trait Enumerated: Sized + Copy {
    fn from_name(name: &str) -> Option<Self>;
    fn name(self) -> &'static str;
}

macro_rules! enumerated {
    (
        $(#[$meta:meta])*
        pub enum $name:ident { $( $(#[$vmeta:meta])* $variant:ident = $text:literal ),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name { $( $(#[$vmeta])* $variant ),+ }

        impl Enumerated for $name {
            fn from_name(name: &str) -> Option<Self> {
                match name {
                    $( $text => Some(Self::$variant), )+
                    _ => None,
                }
            }

            fn name(self) -> &'static str {
                match self {
                    $( Self::$variant => $text, )+
                }
            }
        }
    };
}

enumerated! {
    #[derive(Default)]
    pub enum FillMode {
        #[default]
        Solid = "Solid",
        Wireframe = "Wireframe",
    }
}

enumerated! {
    #[derive(Default)]
    pub enum CullMode {
        None = "None",
        Front = "Front",
        #[default]
        Back = "Back",
    }
}

enumerated! {
    #[derive(Default)]
    pub enum DepthWriteMask {
        Zero = "Zero",
        #[default]
        All = "All",
    }
}

enumerated! {
    pub enum ComparisonFunc {
        Never = "Never",
        Less = "Less",
        Equal = "Equal",
        LessEqual = "LessEqual",
        Greater = "Greater",
        NotEqual = "NotEqual",
        GreaterEqual = "GreaterEqual",
        Always = "Always",
    }
}

enumerated! {
    #[derive(Default)]
    pub enum StencilOp {
        #[default]
        Keep = "Keep",
        Zero = "Zero",
        Replace = "Replace",
        IncrSat = "IncrSat",
        DecrSat = "DecrSat",
        Invert = "Invert",
        Incr = "Incr",
        Decr = "Decr",
    }
}

enumerated! {
    pub enum BlendFactor {
        Zero = "Zero",
        One = "One",
        SrcColor = "SrcColor",
        InvSrcColor = "InvSrcColor",
        SrcAlpha = "SrcAlpha",
        InvSrcAlpha = "InvSrcAlpha",
        DestAlpha = "DestAlpha",
        InvDestAlpha = "InvDestAlpha",
        DestColor = "DestColor",
        InvDestColor = "InvDestColor",
        SrcAlphaSat = "SrcAlphaSat",
        BlendFactor = "BlendFactor",
        InvBlendFactor = "InvBlendFactor",
        Src1Color = "Src1Color",
        InvSrc1Color = "InvSrc1Color",
        Src1Alpha = "Src1Alpha",
        InvSrc1Alpha = "InvSrc1Alpha",
    }
}

enumerated! {
    #[derive(Default)]
    pub enum BlendOp {
        #[default]
        Add = "Add",
        Subtract = "Subtract",
        RevSubtract = "RevSubtract",
        Min = "Min",
        Max = "Max",
    }
}

enumerated! {
    #[derive(Default)]
    pub enum LogicOp {
        Clear = "Clear",
        Set = "Set",
        Copy = "Copy",
        CopyInverted = "CopyInverted",
        #[default]
        Noop = "Noop",
        Invert = "Invert",
        And = "And",
        Nand = "Nand",
        Or = "Or",
        Nor = "Nor",
        Xor = "Xor",
        Equiv = "Equiv",
        AndReverse = "AndReverse",
        AndInverted = "AndInverted",
        OrReverse = "OrReverse",
        OrInverted = "OrInverted",
    }
}

enumerated! {
    /// Texture and vertex attribute formats.
    #[derive(Default)]
    pub enum Format {
        #[default]
        Unknown = "UNKNOWN",
        R8G8B8A8Unorm = "R8G8B8A8_UNORM",
        R8G8B8A8UnormSrgb = "R8G8B8A8_UNORM_SRGB",
        B8G8R8A8Unorm = "B8G8R8A8_UNORM",
        R16G16B16A16Float = "R16G16B16A16_FLOAT",
        R32G32B32A32Float = "R32G32B32A32_FLOAT",
        R10G10B10A2Unorm = "R10G10B10A2_UNORM",
        R11G11B10Float = "R11G11B10_FLOAT",
        D32Float = "D32_FLOAT",
        D24UnormS8Uint = "D24_UNORM_S8_UINT",
        D16Unorm = "D16_UNORM",
        R32G32B32Float = "R32G32B32_FLOAT",
        R32G32Float = "R32G32_FLOAT",
        R32Float = "R32_FLOAT",
    }
}

impl Format {
    /// Size of one element in bytes.
    pub fn byte_size(self) -> u32 {
        match self {
            Self::Unknown => 0,
            Self::D16Unorm => 2,
            Self::R8G8B8A8Unorm
            | Self::R8G8B8A8UnormSrgb
            | Self::B8G8R8A8Unorm
            | Self::R10G10B10A2Unorm
            | Self::R11G11B10Float
            | Self::D32Float
            | Self::D24UnormS8Uint
            | Self::R32Float => 4,
            Self::R16G16B16A16Float | Self::R32G32Float => 8,
            Self::R32G32B32Float => 12,
            Self::R32G32B32A32Float => 16,
        }
    }

    pub fn is_depth(self) -> bool {
        matches!(self, Self::D32Float | Self::D24UnormS8Uint | Self::D16Unorm)
    }
}

bitflags! {
    /// Per-target color write mask.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ColorWriteMask: u8 {
        const RED = 1 << 0;
        const GREEN = 1 << 1;
        const BLUE = 1 << 2;
        const ALPHA = 1 << 3;
        const ALL = Self::RED.bits() | Self::GREEN.bits() | Self::BLUE.bits() | Self::ALPHA.bits();
    }
}

impl ColorWriteMask {
    /// Parse one channel name (`Red`, `Green`, `Blue`, `Alpha`, `All`, `None`).
    pub fn from_channel_name(name: &str) -> Option<Self> {
        match name {
            "Red" => Some(Self::RED),
            "Green" => Some(Self::GREEN),
            "Blue" => Some(Self::BLUE),
            "Alpha" => Some(Self::ALPHA),
            "All" => Some(Self::ALL),
            "None" => Some(Self::empty()),
            _ => None,
        }
    }
}

impl Default for ColorWriteMask {
    fn default() -> Self {
        Self::ALL
    }
}

/// Rasterizer state.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterizerState {
    pub fill_mode: FillMode,
    pub cull_mode: CullMode,
    pub front_counter_clockwise: bool,
    pub depth_bias: i32,
    pub depth_bias_clamp: f32,
    pub slope_scaled_depth_bias: f32,
    pub depth_clip_enable: bool,
    pub multisample_enable: bool,
    pub antialiased_line_enable: bool,
    pub forced_sample_count: u32,
    pub conservative_raster: bool,
}

impl Default for RasterizerState {
    fn default() -> Self {
        Self {
            fill_mode: FillMode::Solid,
            cull_mode: CullMode::Back,
            front_counter_clockwise: false,
            depth_bias: 0,
            depth_bias_clamp: 0.0,
            slope_scaled_depth_bias: 0.0,
            depth_clip_enable: true,
            multisample_enable: false,
            antialiased_line_enable: false,
            forced_sample_count: 0,
            conservative_raster: false,
        }
    }
}

/// Stencil operations for one face.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StencilFace {
    pub fail_op: StencilOp,
    pub depth_fail_op: StencilOp,
    pub pass_op: StencilOp,
    pub func: ComparisonFunc,
}

impl Default for StencilFace {
    fn default() -> Self {
        Self {
            fail_op: StencilOp::Keep,
            depth_fail_op: StencilOp::Keep,
            pass_op: StencilOp::Keep,
            func: ComparisonFunc::Always,
        }
    }
}

/// Depth-stencil state.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DepthStencilState {
    pub depth_enable: bool,
    pub depth_write_mask: DepthWriteMask,
    pub depth_func: ComparisonFunc,
    pub stencil_enable: bool,
    pub stencil_read_mask: u8,
    pub stencil_write_mask: u8,
    pub front_face: StencilFace,
    pub back_face: StencilFace,
}

impl Default for DepthStencilState {
    fn default() -> Self {
        Self {
            depth_enable: true,
            depth_write_mask: DepthWriteMask::All,
            depth_func: ComparisonFunc::Less,
            stencil_enable: false,
            stencil_read_mask: 0xFF,
            stencil_write_mask: 0xFF,
            front_face: StencilFace::default(),
            back_face: StencilFace::default(),
        }
    }
}

/// Blend configuration of one render target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderTargetBlend {
    pub blend_enable: bool,
    pub logic_op_enable: bool,
    pub src_blend: BlendFactor,
    pub dest_blend: BlendFactor,
    pub blend_op: BlendOp,
    pub src_blend_alpha: BlendFactor,
    pub dest_blend_alpha: BlendFactor,
    pub blend_op_alpha: BlendOp,
    pub logic_op: LogicOp,
    pub write_mask: ColorWriteMask,
}

impl Default for RenderTargetBlend {
    fn default() -> Self {
        Self {
            blend_enable: false,
            logic_op_enable: false,
            src_blend: BlendFactor::One,
            dest_blend: BlendFactor::Zero,
            blend_op: BlendOp::Add,
            src_blend_alpha: BlendFactor::One,
            dest_blend_alpha: BlendFactor::Zero,
            blend_op_alpha: BlendOp::Add,
            logic_op: LogicOp::Noop,
            write_mask: ColorWriteMask::ALL,
        }
    }
}

/// Number of render targets a blend state configures.
pub const MAX_RENDER_TARGETS: usize = 8;

/// Blend state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct BlendState {
    pub alpha_to_coverage_enable: bool,
    pub independent_blend_enable: bool,
    pub render_targets: [RenderTargetBlend; MAX_RENDER_TARGETS],
}

/// Render target formats and sampling.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RenderTargetState {
    pub rtv_formats: Vec<Format>,
    pub dsv_format: Format,
    pub sample_count: u32,
    pub sample_quality: u32,
}

impl Default for RenderTargetState {
    fn default() -> Self {
        Self {
            rtv_formats: Vec::new(),
            dsv_format: Format::Unknown,
            sample_count: 1,
            sample_quality: 0,
        }
    }
}

/// One attribute of a vertex format.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VertexElement {
    pub semantic: String,
    pub semantic_index: u32,
    pub format: Format,
    pub offset: u32,
    pub input_slot: u32,
}

/// Vertex input layout.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct VertexFormat {
    pub stride: u32,
    pub elements: Vec<VertexElement>,
}

/// Id under which [`VertexFormat::fallback`] is reported.
pub const FALLBACK_VERTEX_FORMAT: &str = "<fallback>";

impl VertexFormat {
    /// Layout used by materials that declare no vertex format:
    /// `POSITION` (3 floats) then `COLOR` (4 floats).
    pub fn fallback() -> Self {
        Self {
            stride: 28,
            elements: vec![
                VertexElement {
                    semantic: "POSITION".into(),
                    semantic_index: 0,
                    format: Format::R32G32B32Float,
                    offset: 0,
                    input_slot: 0,
                },
                VertexElement {
                    semantic: "COLOR".into(),
                    semantic_index: 0,
                    format: Format::R32G32B32A32Float,
                    offset: 12,
                    input_slot: 0,
                },
            ],
        }
    }

    /// End of the furthest element, the stride of a tightly packed layout.
    pub fn packed_size(&self) -> u32 {
        self.elements
            .iter()
            .map(|e| e.offset + e.format.byte_size())
            .max()
            .unwrap_or(0)
    }
}

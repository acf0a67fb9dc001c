//! Shader stages, compiled bytecode and the compiler/reflector seams.
//!
//! The material system never compiles shader source itself. It asks a
//! [`ShaderCompiler`] for bytecode and a [`ShaderReflector`] for the resource
//! bindings that bytecode uses. With the `naga-shaders` feature (enabled by
//! default) [`NagaShaderCompiler`] and [`SpirvReflector`] provide both on
//! top of naga, targeting SPIR-V.

#[cfg(feature = "naga-shaders")]
pub mod naga_compiler;
pub mod reflection;
pub mod reflection_cache;

use std::fmt;
use std::sync::Arc;

#[cfg(feature = "naga-shaders")]
pub use naga_compiler::NagaShaderCompiler;
#[cfg(feature = "naga-shaders")]
pub use reflection::SpirvReflector;
pub use reflection::{BindingKind, ResourceBinding, ShaderReflector};
pub use reflection_cache::{ReflectionCache, ReflectionStats};

/// Pipeline stage a shader runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ShaderStage {
    Vertex,
    Pixel,
    Domain,
    Hull,
    Geometry,
    Compute,
}

impl ShaderStage {
    /// All stages, in pipeline order.
    pub const ALL: [ShaderStage; 6] = [
        ShaderStage::Vertex,
        ShaderStage::Hull,
        ShaderStage::Domain,
        ShaderStage::Geometry,
        ShaderStage::Pixel,
        ShaderStage::Compute,
    ];

    /// Parse a stage name as written in material documents.
    ///
    /// `fragment` is accepted as an alias for `pixel`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "vertex" => Some(Self::Vertex),
            "pixel" | "fragment" => Some(Self::Pixel),
            "domain" => Some(Self::Domain),
            "hull" => Some(Self::Hull),
            "geometry" => Some(Self::Geometry),
            "compute" => Some(Self::Compute),
            _ => None,
        }
    }

    /// Canonical document name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Vertex => "vertex",
            Self::Pixel => "pixel",
            Self::Domain => "domain",
            Self::Hull => "hull",
            Self::Geometry => "geometry",
            Self::Compute => "compute",
        }
    }

    /// Target-profile prefix (`vs` in `vs_5_1`).
    pub fn profile_prefix(self) -> &'static str {
        match self {
            Self::Vertex => "vs",
            Self::Pixel => "ps",
            Self::Domain => "ds",
            Self::Hull => "hs",
            Self::Geometry => "gs",
            Self::Compute => "cs",
        }
    }

    /// Stage whose profile prefix starts `profile`.
    pub fn from_profile(profile: &str) -> Option<Self> {
        let prefix = profile.split('_').next()?;
        Self::ALL
            .into_iter()
            .find(|stage| stage.profile_prefix() == prefix)
    }

    /// Check a target profile against `<prefix>_<major>_<minor>` for this stage.
    pub fn accepts_profile(self, profile: &str) -> bool {
        let mut parts = profile.split('_');
        let (Some(prefix), Some(major), Some(minor), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return false;
        };
        let is_number = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
        prefix == self.profile_prefix() && is_number(major) && is_number(minor)
    }

    /// Stable tag folded into pipeline keys.
    pub fn tag(self) -> u64 {
        match self {
            Self::Vertex => 0,
            Self::Pixel => 1,
            Self::Domain => 2,
            Self::Hull => 3,
            Self::Geometry => 4,
            Self::Compute => 5,
        }
    }

    /// Visibility bit for this stage.
    pub fn flag(self) -> ShaderStageFlags {
        match self {
            Self::Vertex => ShaderStageFlags::VERTEX,
            Self::Pixel => ShaderStageFlags::PIXEL,
            Self::Domain => ShaderStageFlags::DOMAIN,
            Self::Hull => ShaderStageFlags::HULL,
            Self::Geometry => ShaderStageFlags::GEOMETRY,
            Self::Compute => ShaderStageFlags::COMPUTE,
        }
    }
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

bitflags::bitflags! {
    /// Shader stages that can access a binding.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ShaderStageFlags: u32 {
        /// Vertex shader stage.
        const VERTEX = 1 << 0;
        /// Pixel (fragment) shader stage.
        const PIXEL = 1 << 1;
        /// Domain (tessellation evaluation) stage.
        const DOMAIN = 1 << 2;
        /// Hull (tessellation control) stage.
        const HULL = 1 << 3;
        /// Geometry shader stage.
        const GEOMETRY = 1 << 4;
        /// Compute shader stage.
        const COMPUTE = 1 << 5;
        /// Every graphics stage.
        const ALL_GRAPHICS = Self::VERTEX.bits()
            | Self::PIXEL.bits()
            | Self::DOMAIN.bits()
            | Self::HULL.bits()
            | Self::GEOMETRY.bits();
    }
}

/// Compiled shader code for one stage.
///
/// The byte buffer is shared, so clones are cheap.
#[derive(Clone, PartialEq, Eq)]
pub struct ShaderBytecode {
    pub stage: ShaderStage,
    pub entry_point: String,
    pub bytes: Arc<[u8]>,
}

impl ShaderBytecode {
    /// Wrap compiled bytes.
    pub fn new(stage: ShaderStage, entry_point: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            stage,
            entry_point: entry_point.into(),
            bytes: bytes.into(),
        }
    }

    /// Size of the bytecode in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// True for an empty module.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for ShaderBytecode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShaderBytecode")
            .field("stage", &self.stage)
            .field("entry_point", &self.entry_point)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Turns shader source into bytecode.
///
/// `path` is a source-relative file path, `profile` a target profile such
/// as `ps_6_0`, and `defines` a sorted list of `NAME` or `NAME=VALUE`
/// entries. Failures carry the compiler's message.
pub trait ShaderCompiler: Send + Sync {
    fn compile(
        &self,
        path: &str,
        entry_point: &str,
        profile: &str,
        defines: &[String],
    ) -> Result<ShaderBytecode, String>;
}

//! Error types for the material system.

use thiserror::Error;

/// How an error must be treated by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    /// An invariant violation; the operation that raised it is abandoned.
    Fatal,
    /// A content problem returned to the caller, who decides whether to
    /// continue with a degraded material set.
    Reported,
}

/// Errors produced while loading, parsing and compiling materials.
#[derive(Debug, Error)]
pub enum MaterialError {
    #[error("file not found: {0}")]
    FileNotFound(String),

    #[error("I/O error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("JSON parse error in {path}: {message}")]
    Json { path: String, message: String },

    #[error("invalid document {path}: {reason}")]
    InvalidDocument { path: String, reason: String },

    #[error("include cycle detected: {}", .chain.join(" -> "))]
    IncludeCycle { chain: Vec<String> },

    #[error("schema violation: {0}")]
    Schema(String),

    #[error("duplicate id '{id}' in {category}")]
    DuplicateId { id: String, category: String },

    #[error("{context}: missing required field '{field}'")]
    MissingField { context: String, field: String },

    #[error("invalid parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("unknown type '{ty}' for parameter '{name}'")]
    UnknownParameterType { name: String, ty: String },

    #[error("material '{material}': unknown shader stage '{stage}'")]
    UnknownShaderStage { material: String, stage: String },

    #[error("material '{material}' pass '{pass}': {stage} stage declared more than once")]
    DuplicateShaderStage {
        material: String,
        pass: String,
        stage: String,
    },

    #[error("material '{material}': shader file not found: {path}")]
    ShaderFileNotFound { material: String, path: String },

    #[error("material '{material}': profile '{profile}' is not valid for the {stage} stage")]
    InvalidProfile {
        material: String,
        stage: String,
        profile: String,
    },

    #[error("material '{material}': unknown {stage} shader id '{id}'")]
    UnknownShader {
        material: String,
        stage: String,
        id: String,
    },

    #[error("material '{material}': {reason}")]
    AmbiguousPass { material: String, reason: String },

    #[error("material '{material}' has no pass named '{pass}'")]
    UnknownPass { material: String, pass: String },

    #[error("unknown material '{0}'")]
    UnknownMaterial(String),

    #[error("{category} state '{id}' referenced by {referrer} is not defined")]
    MissingStateBlock {
        category: String,
        id: String,
        referrer: String,
    },

    #[error("render pass '{0}' is not defined")]
    UnknownRenderPass(String),

    #[error("invalid value '{value}' for {category} field '{field}'")]
    InvalidStateValue {
        category: String,
        field: String,
        value: String,
    },

    #[error("{category} inheritance cycle: {}", .chain.join(" -> "))]
    StateInheritanceCycle { category: String, chain: Vec<String> },

    #[error("material '{material}' pass '{pass}' {stage} stage failed to compile: {message}")]
    ShaderCompilation {
        material: String,
        pass: String,
        stage: String,
        message: String,
    },

    #[error("reflection failed for shader '{identity}': {message}")]
    Reflection { identity: String, message: String },

    #[error("duplicate binding '{name}': {existing} conflicts with {incoming}")]
    DuplicateBinding {
        name: String,
        existing: String,
        incoming: String,
    },

    #[error("binding layout needs {words} words, limit is {limit}")]
    LayoutTooLarge { words: u32, limit: u32 },

    #[error("binding layout hash {hash:#018x} maps to two different layouts")]
    LayoutCollision { hash: u64 },

    #[error(
        "pipeline hash collision {hash:#018x}: cached for {existing_material}/{existing_pass}, \
         stored for {material}/{pass}"
    )]
    HashCollision {
        hash: u64,
        existing_material: String,
        existing_pass: String,
        material: String,
        pass: String,
    },

    #[error("refusing to cache material '{material}' pass '{pass}' under the invalid hash")]
    InvalidPipelineHash { material: String, pass: String },

    #[error("material '{material}' pass '{pass}' has no vertex shader")]
    MissingVertexShader { material: String, pass: String },

    #[error("material '{material}' pass '{pass}' mixes compute and graphics stages")]
    MixedComputeStages { material: String, pass: String },

    #[error("backend error: {0}")]
    Backend(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl MaterialError {
    /// Classify the error into the fatal or reported tier.
    pub fn severity(&self) -> Severity {
        match self {
            Self::DuplicateBinding { .. }
            | Self::HashCollision { .. }
            | Self::LayoutCollision { .. }
            | Self::InvalidPipelineHash { .. }
            | Self::UnknownShaderStage { .. }
            | Self::DuplicateShaderStage { .. }
            | Self::InvalidProfile { .. }
            | Self::ShaderFileNotFound { .. }
            | Self::UnknownParameterType { .. }
            | Self::MissingStateBlock { .. }
            | Self::UnknownRenderPass(_)
            | Self::MissingVertexShader { .. }
            | Self::MixedComputeStages { .. }
            | Self::LayoutTooLarge { .. }
            | Self::StateInheritanceCycle { .. }
            | Self::InvalidStateValue { .. } => Severity::Fatal,
            _ => Severity::Reported,
        }
    }

    /// Shorthand for `severity() == Severity::Fatal`.
    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }

    /// Build an I/O error, mapping `NotFound` to [`MaterialError::FileNotFound`].
    pub fn io(path: impl Into<String>, err: std::io::Error) -> Self {
        let path = path.into();
        if err.kind() == std::io::ErrorKind::NotFound {
            Self::FileNotFound(path)
        } else {
            Self::Io { path, source: err }
        }
    }
}

impl From<toml::de::Error> for MaterialError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(err.to_string())
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, MaterialError>;

/// A failed load, carrying every error collected before giving up.
#[derive(Debug, Error)]
#[error("{}", summarize(.errors))]
pub struct LoadFailure {
    pub errors: Vec<MaterialError>,
}

impl LoadFailure {
    /// Wrap a single error.
    pub fn single(error: MaterialError) -> Self {
        Self {
            errors: vec![error],
        }
    }

    /// True if any collected error is fatal.
    pub fn has_fatal(&self) -> bool {
        self.errors.iter().any(MaterialError::is_fatal)
    }
}

impl From<MaterialError> for LoadFailure {
    fn from(error: MaterialError) -> Self {
        Self::single(error)
    }
}

fn summarize(errors: &[MaterialError]) -> String {
    match errors {
        [] => "load failed".to_string(),
        [only] => format!("load failed: {only}"),
        [first, rest @ ..] => format!("load failed: {first} (and {} more)", rest.len()),
    }
}

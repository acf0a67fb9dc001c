//! Typed material and render pass definitions.
//!
//! Definitions are produced once by [`parser`] from the merged document and
//! are immutable afterwards. Passes reference state blocks and shaders by
//! id; nothing is resolved or compiled here.

pub mod parser;

use serde_json::Value;

use crate::error::{MaterialError, Result};
use crate::shader::{BindingKind, ResourceBinding, ShaderStage, ShaderStageFlags};

pub use parser::{ParseContext, parse_material, parse_render_pass};

/// Declared type of a material parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParameterType {
    Float,
    Int,
    Bool,
    Float4,
}

impl ParameterType {
    /// Parse a type name as written in material documents.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "float" => Some(Self::Float),
            "int" => Some(Self::Int),
            "bool" => Some(Self::Bool),
            "float4" => Some(Self::Float4),
            _ => None,
        }
    }

    /// Document name of the type.
    pub fn name(self) -> &'static str {
        match self {
            Self::Float => "float",
            Self::Int => "int",
            Self::Bool => "bool",
            Self::Float4 => "float4",
        }
    }

    /// Whether `value` is an exact match for this type.
    ///
    /// No coercion: `float4` needs exactly four numbers, `int` an integer.
    pub fn accepts(self, value: &Value) -> bool {
        match self {
            Self::Float => value.is_number(),
            Self::Int => value.is_i64() || value.is_u64(),
            Self::Bool => value.is_boolean(),
            Self::Float4 => value
                .as_array()
                .is_some_and(|items| items.len() == 4 && items.iter().all(Value::is_number)),
        }
    }

    /// Convert a JSON default, if it matches.
    pub fn value_from_json(self, value: &Value) -> Option<ParameterValue> {
        if !self.accepts(value) {
            return None;
        }
        Some(match self {
            Self::Float => ParameterValue::Float(value.as_f64()? as f32),
            Self::Int => ParameterValue::Int(value.as_i64()?),
            Self::Bool => ParameterValue::Bool(value.as_bool()?),
            Self::Float4 => {
                let items = value.as_array()?;
                let mut out = [0.0f32; 4];
                for (slot, item) in out.iter_mut().zip(items) {
                    *slot = item.as_f64()? as f32;
                }
                ParameterValue::Float4(out)
            }
        })
    }
}

/// A typed parameter value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParameterValue {
    Float(f32),
    Int(i64),
    Bool(bool),
    Float4([f32; 4]),
}

/// A named material parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub ty: ParameterType,
    pub default: Option<ParameterValue>,
}

/// A reference from a pass to one shader stage.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShaderReference {
    pub stage: ShaderStage,
    /// Declared shader id, or a derived identity for inline declarations.
    pub id: String,
    /// Source-relative path of the shader file.
    pub file_path: String,
    pub entry_point: String,
    pub target_profile: String,
    /// Sorted, deduplicated `NAME` / `NAME=VALUE` entries.
    pub defines: Vec<String>,
}

impl ShaderReference {
    /// Identity of the compiled artifact: file, entry point, profile and
    /// defines. Used to key reflection invalidation.
    pub fn identity(&self) -> String {
        derive_shader_identity(
            &self.file_path,
            &self.entry_point,
            &self.target_profile,
            &self.defines,
        )
    }
}

/// `file#entry@profile`, plus `[D1,D2]` when defines are present.
pub(crate) fn derive_shader_identity(
    file: &str,
    entry: &str,
    profile: &str,
    defines: &[String],
) -> String {
    if defines.is_empty() {
        format!("{file}#{entry}@{profile}")
    } else {
        format!("{file}#{entry}@{profile}[{}]", defines.join(","))
    }
}

/// State block ids a pass refers to. `None` means "use the default block".
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct StateReferences {
    pub rasterizer: Option<String>,
    pub depth_stencil: Option<String>,
    pub blend: Option<String>,
    pub render_target: Option<String>,
}

impl StateReferences {
    /// Fill every unset reference from `defaults`.
    pub fn or(self, defaults: &StateReferences) -> Self {
        Self {
            rasterizer: self.rasterizer.or_else(|| defaults.rasterizer.clone()),
            depth_stencil: self.depth_stencil.or_else(|| defaults.depth_stencil.clone()),
            blend: self.blend.or_else(|| defaults.blend.clone()),
            render_target: self.render_target.or_else(|| defaults.render_target.clone()),
        }
    }
}

/// Primitive assembly topology.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum PrimitiveTopology {
    Point,
    Line,
    #[default]
    Triangle,
    Patch,
}

impl PrimitiveTopology {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "point" => Some(Self::Point),
            "line" => Some(Self::Line),
            "triangle" => Some(Self::Triangle),
            "patch" => Some(Self::Patch),
            _ => None,
        }
    }
}

/// One named sub-configuration of a material.
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialPass {
    /// Pass name; only optional for single-pass materials.
    pub name: Option<String>,
    /// One reference per stage, in declaration order.
    pub shaders: Vec<ShaderReference>,
    pub states: StateReferences,
    pub parameters: Vec<Parameter>,
    pub topology: PrimitiveTopology,
    /// Explicitly declared bindings, merged with the reflected ones.
    pub bindings: Vec<ResourceBinding>,
}

impl MaterialPass {
    /// Reference for `stage`, if the pass declares it.
    pub fn shader(&self, stage: ShaderStage) -> Option<&ShaderReference> {
        self.shaders.iter().find(|s| s.stage == stage)
    }

    /// Union of the declared stages.
    pub fn stage_flags(&self) -> ShaderStageFlags {
        self.shaders
            .iter()
            .fold(ShaderStageFlags::empty(), |flags, s| flags | s.stage.flag())
    }

    /// True if this pass is a compute-only pass.
    pub fn is_compute(&self) -> bool {
        !self.shaders.is_empty() && self.shaders.iter().all(|s| s.stage == ShaderStage::Compute)
    }

    /// Display name for diagnostics.
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or("<default>")
    }

    /// Parameter by name.
    pub fn parameter(&self, name: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.name == name)
    }
}

/// A parsed material.
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialDefinition {
    pub id: String,
    pub passes: Vec<MaterialPass>,
    pub vertex_format_id: Option<String>,
    pub enabled: bool,
    pub version_hash: String,
}

impl MaterialDefinition {
    /// Pass with the given name.
    pub fn pass(&self, name: &str) -> Option<&MaterialPass> {
        self.passes.iter().find(|p| p.name.as_deref() == Some(name))
    }

    /// True if a pass with the given name exists.
    pub fn has_pass(&self, name: &str) -> bool {
        self.pass(name).is_some()
    }

    /// Names of all named passes.
    pub fn pass_names(&self) -> impl Iterator<Item = &str> {
        self.passes.iter().filter_map(|p| p.name.as_deref())
    }

    /// Resolve a pass request.
    ///
    /// A name selects that pass. Without a name, the sole pass is used;
    /// asking a multi-pass material for its unnamed pass is an error.
    pub fn resolve_pass(&self, name: Option<&str>) -> Result<&MaterialPass> {
        match name {
            Some(name) => self.pass(name).ok_or_else(|| MaterialError::UnknownPass {
                material: self.id.clone(),
                pass: name.to_string(),
            }),
            None => match self.passes.as_slice() {
                [only] => Ok(only),
                [] => Err(MaterialError::UnknownPass {
                    material: self.id.clone(),
                    pass: "<default>".into(),
                }),
                _ => Err(MaterialError::AmbiguousPass {
                    material: self.id.clone(),
                    reason: format!(
                        "{} passes defined and no pass name given",
                        self.passes.len()
                    ),
                }),
            },
        }
    }
}

/// A parsed render pass declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderPassDefinition {
    pub name: String,
    pub queue: String,
    /// Render-target state block providing the target formats.
    pub render_target: Option<String>,
}

/// Parse an explicit binding declaration `{name, kind, slot?}`.
pub(crate) fn parse_binding(value: &Value, stages: ShaderStageFlags) -> Result<ResourceBinding> {
    let name = value.get("name").and_then(Value::as_str).ok_or_else(|| {
        MaterialError::MissingField {
            context: "binding".into(),
            field: "name".into(),
        }
    })?;
    let kind_name = value.get("kind").and_then(Value::as_str).unwrap_or_default();
    let kind = BindingKind::from_name(kind_name).ok_or_else(|| MaterialError::InvalidStateValue {
        category: "binding".into(),
        field: "kind".into(),
        value: kind_name.to_string(),
    })?;

    let mut binding = ResourceBinding::new(name, kind).with_stages(stages);
    if let Some(slot) = value.get("slot") {
        let slot = slot
            .as_u64()
            .and_then(|slot| u32::try_from(slot).ok())
            .ok_or_else(|| MaterialError::InvalidStateValue {
                category: "binding".into(),
                field: "slot".into(),
                value: slot.to_string(),
            })?;
        binding.slot = Some(slot);
    }
    Ok(binding)
}

//! JSON → definition parsing.
//!
//! Problems in the document content are returned as errors. Violations of
//! the shader declaration rules (unknown or repeated stage, missing file,
//! bad profile, unknown parameter type) are fatal; missing required fields
//! are reported. Every error is logged once here.

use std::collections::HashSet;

use serde_json::{Map, Value};

use super::{
    MaterialDefinition, MaterialPass, Parameter, ParameterType, PrimitiveTopology,
    RenderPassDefinition, ShaderReference, StateReferences, derive_shader_identity,
    parse_binding,
};
use crate::document::Document;
use crate::document::validator::{check_parameter, default_value};
use crate::error::{MaterialError, Result};
use crate::shader::{ShaderStage, ShaderStageFlags};
use crate::source::{DocumentSource, path};

/// Default queue for render passes that do not name one.
pub const DEFAULT_QUEUE: &str = "geometry";
/// Default shader entry point.
pub const DEFAULT_ENTRY_POINT: &str = "main";

/// Document-wide inputs shared by every material parse.
pub struct ParseContext<'a> {
    source: &'a dyn DocumentSource,
    shader_root: String,
    shader_library: Option<&'a Map<String, Value>>,
    global_defines: Vec<String>,
}

impl<'a> ParseContext<'a> {
    /// Context resolving shader files under `shader_root` in `source`.
    pub fn new(source: &'a dyn DocumentSource, shader_root: impl Into<String>) -> Self {
        Self {
            source,
            shader_root: shader_root.into(),
            shader_library: None,
            global_defines: Vec::new(),
        }
    }

    /// Take named shaders and global defines from a merged document.
    pub fn with_document(mut self, document: &'a Document) -> Self {
        self.shader_library = document.shaders();
        self.global_defines = document.defines().map(defines_from_object).unwrap_or_default();
        self
    }

    /// Global defines applied to every shader.
    pub fn global_defines(&self) -> &[String] {
        &self.global_defines
    }
}

/// Parse one material object.
pub fn parse_material(json: &Value, ctx: &ParseContext<'_>) -> Result<MaterialDefinition> {
    parse_material_inner(json, ctx).inspect_err(|error| log::error!("{error}"))
}

/// Parse one render pass object `{name, queue?, states?: {renderTarget}}`.
pub fn parse_render_pass(json: &Value) -> Result<RenderPassDefinition> {
    let result = (|| {
        let name = required_str(json, "name", "render pass")?;
        let queue = json
            .get("queue")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_QUEUE)
            .to_string();
        let render_target = json
            .get("states")
            .and_then(|s| s.get("renderTarget"))
            .and_then(Value::as_str)
            .map(str::to_string);
        Ok(RenderPassDefinition {
            name: name.to_string(),
            queue,
            render_target,
        })
    })();
    result.inspect_err(|error| log::error!("{error}"))
}

fn parse_material_inner(json: &Value, ctx: &ParseContext<'_>) -> Result<MaterialDefinition> {
    let id = required_str(json, "id", "material")?.to_string();

    let enabled = json.get("enabled").and_then(Value::as_bool).unwrap_or(true);
    let version_hash = json
        .get("versionHash")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let vertex_format_id = json
        .get("vertexFormat")
        .and_then(Value::as_str)
        .map(str::to_string);
    let topology = parse_topology(json.get("primitiveTopology"), &id)?.unwrap_or_default();
    let states = parse_state_refs(json.get("states"));
    let parameters = parse_parameters(json.get("parameters"))?;

    let passes = match json.get("passes") {
        Some(Value::Array(items)) => {
            if items.is_empty() {
                return Err(MaterialError::MissingField {
                    context: format!("material '{id}'"),
                    field: "passes".into(),
                });
            }
            let mut passes = Vec::with_capacity(items.len());
            for item in items {
                let name = item.get("name").and_then(Value::as_str).map(str::to_string);
                let label = name.clone().unwrap_or_else(|| "<default>".into());
                let shaders_json = item
                    .get("shaders")
                    .or_else(|| json.get("shaders"))
                    .ok_or_else(|| MaterialError::MissingField {
                        context: format!("material '{id}' pass '{label}'"),
                        field: "shaders".into(),
                    })?;
                let shaders = parse_shaders(shaders_json, &id, &label, ctx)?;
                let pass_topology = parse_topology(
                    item.get("primitiveTopology").or_else(|| item.get("topology")),
                    &id,
                )?
                .unwrap_or(topology);
                let pass_parameters =
                    merge_parameters(parse_parameters(item.get("parameters"))?, &parameters);
                let bindings = parse_bindings(item.get("bindings"), &shaders)?;

                passes.push(MaterialPass {
                    name,
                    shaders,
                    states: parse_state_refs(item.get("states")).or(&states),
                    parameters: pass_parameters,
                    topology: pass_topology,
                    bindings,
                });
            }
            check_pass_names(&id, &passes)?;
            passes
        }
        Some(_) => {
            return Err(MaterialError::InvalidDocument {
                path: format!("material '{id}'"),
                reason: "'passes' must be an array".into(),
            });
        }
        None => {
            let name = json.get("pass").and_then(Value::as_str).map(str::to_string);
            let label = name.clone().unwrap_or_else(|| "<default>".into());
            let shaders_json = json.get("shaders").ok_or_else(|| MaterialError::MissingField {
                context: format!("material '{id}'"),
                field: "shaders".into(),
            })?;
            let shaders = parse_shaders(shaders_json, &id, &label, ctx)?;
            let bindings = parse_bindings(json.get("bindings"), &shaders)?;
            vec![MaterialPass {
                name,
                shaders,
                states,
                parameters,
                topology,
                bindings,
            }]
        }
    };

    Ok(MaterialDefinition {
        id,
        passes,
        vertex_format_id,
        enabled,
        version_hash,
    })
}

/// Multi-pass materials need a unique name on every pass.
fn check_pass_names(material: &str, passes: &[MaterialPass]) -> Result<()> {
    if passes.len() < 2 {
        return Ok(());
    }
    let mut seen = HashSet::new();
    for (index, pass) in passes.iter().enumerate() {
        let Some(name) = &pass.name else {
            return Err(MaterialError::AmbiguousPass {
                material: material.to_string(),
                reason: format!("pass #{index} of a multi-pass material has no name"),
            });
        };
        if !seen.insert(name.as_str()) {
            return Err(MaterialError::AmbiguousPass {
                material: material.to_string(),
                reason: format!("pass name '{name}' is used more than once"),
            });
        }
    }
    Ok(())
}

/// Parse a `shaders` section: `{stage: decl}` or `[{stage, ...decl}]`.
fn parse_shaders(
    value: &Value,
    material: &str,
    pass: &str,
    ctx: &ParseContext<'_>,
) -> Result<Vec<ShaderReference>> {
    let entries: Vec<(&str, &Value)> = match value {
        Value::Object(map) => map.iter().map(|(k, v)| (k.as_str(), v)).collect(),
        Value::Array(items) => items
            .iter()
            .map(|item| {
                let stage = item.get("stage").and_then(Value::as_str).ok_or_else(|| {
                    MaterialError::MissingField {
                        context: format!("material '{material}' shader"),
                        field: "stage".into(),
                    }
                })?;
                Ok((stage, item))
            })
            .collect::<Result<_>>()?,
        _ => {
            return Err(MaterialError::InvalidDocument {
                path: format!("material '{material}'"),
                reason: "'shaders' must be an object or an array".into(),
            });
        }
    };

    let mut shaders: Vec<ShaderReference> = Vec::with_capacity(entries.len());
    for (stage_name, decl) in entries {
        let stage =
            ShaderStage::from_name(stage_name).ok_or_else(|| MaterialError::UnknownShaderStage {
                material: material.to_string(),
                stage: stage_name.to_string(),
            })?;
        if shaders.iter().any(|s| s.stage == stage) {
            return Err(MaterialError::DuplicateShaderStage {
                material: material.to_string(),
                pass: pass.to_string(),
                stage: stage.name().to_string(),
            });
        }
        shaders.push(parse_shader_reference(stage, stage_name, decl, material, ctx)?);
    }
    Ok(shaders)
}

fn parse_shader_reference(
    stage: ShaderStage,
    stage_key: &str,
    decl: &Value,
    material: &str,
    ctx: &ParseContext<'_>,
) -> Result<ShaderReference> {
    // A string names an entry of the top-level `shaders` library.
    let (declared_id, decl) = match decl {
        Value::String(id) => {
            let found = ctx
                .shader_library
                .and_then(|library| {
                    library
                        .get(stage_key)
                        .or_else(|| library.get(stage.name()))
                })
                .and_then(|entries| library_entry(entries, id));
            match found {
                Some(entry) => (Some(id.clone()), entry),
                None => {
                    return Err(MaterialError::UnknownShader {
                        material: material.to_string(),
                        stage: stage.name().to_string(),
                        id: id.clone(),
                    });
                }
            }
        }
        other => (
            other.get("id").and_then(Value::as_str).map(str::to_string),
            other,
        ),
    };

    let context = format!("material '{material}' {stage} shader");
    let file = required_str(decl, "file", &context)?;
    let profile = required_str(decl, "profile", &context)?;
    let entry_point = decl
        .get("entry")
        .or_else(|| decl.get("entryPoint"))
        .and_then(Value::as_str)
        .unwrap_or(DEFAULT_ENTRY_POINT);

    let file_path = path::join(&ctx.shader_root, file)?;
    if !ctx.source.exists(&file_path) {
        return Err(MaterialError::ShaderFileNotFound {
            material: material.to_string(),
            path: ctx.source.describe(&file_path),
        });
    }

    if !stage.accepts_profile(profile) {
        return Err(MaterialError::InvalidProfile {
            material: material.to_string(),
            stage: stage.name().to_string(),
            profile: profile.to_string(),
        });
    }

    let mut defines = match decl.get("defines") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        Some(Value::Object(map)) => defines_from_object(map),
        _ => Vec::new(),
    };
    defines.extend(ctx.global_defines.iter().cloned());
    defines.sort();
    defines.dedup();

    let id = declared_id
        .unwrap_or_else(|| derive_shader_identity(&file_path, entry_point, profile, &defines));

    Ok(ShaderReference {
        stage,
        id,
        file_path,
        entry_point: entry_point.to_string(),
        target_profile: profile.to_string(),
        defines,
    })
}

/// Find `id` in a library category, keyed-object or array-of-`{id}` form.
fn library_entry<'v>(entries: &'v Value, id: &str) -> Option<&'v Value> {
    match entries {
        Value::Object(map) => map.get(id),
        Value::Array(items) => items
            .iter()
            .find(|item| item.get("id").and_then(Value::as_str) == Some(id)),
        _ => None,
    }
}

fn parse_parameters(value: Option<&Value>) -> Result<Vec<Parameter>> {
    let Some(items) = value.and_then(Value::as_array) else {
        return Ok(Vec::new());
    };
    items.iter().map(parse_parameter).collect()
}

fn parse_parameter(value: &Value) -> Result<Parameter> {
    check_parameter(value)?;
    let name = required_str(value, "name", "parameter")?;
    // check_parameter guarantees a known type and a matching default.
    let ty = value
        .get("type")
        .and_then(Value::as_str)
        .and_then(ParameterType::from_name)
        .ok_or_else(|| MaterialError::InvalidParameter {
            name: name.to_string(),
            reason: "missing 'type'".into(),
        })?;
    let default = default_value(value).and_then(|v| ty.value_from_json(v));
    Ok(Parameter {
        name: name.to_string(),
        ty,
        default,
    })
}

/// Pass parameters first, then material parameters the pass does not shadow.
fn merge_parameters(mut own: Vec<Parameter>, inherited: &[Parameter]) -> Vec<Parameter> {
    for parameter in inherited {
        if !own.iter().any(|p| p.name == parameter.name) {
            own.push(parameter.clone());
        }
    }
    own
}

fn parse_bindings(
    value: Option<&Value>,
    shaders: &[ShaderReference],
) -> Result<Vec<crate::shader::ResourceBinding>> {
    let Some(items) = value.and_then(Value::as_array) else {
        return Ok(Vec::new());
    };
    let stages = shaders
        .iter()
        .fold(ShaderStageFlags::empty(), |flags, s| flags | s.stage.flag());
    items.iter().map(|item| parse_binding(item, stages)).collect()
}

fn parse_state_refs(value: Option<&Value>) -> StateReferences {
    let get = |key: &str| {
        value
            .and_then(|v| v.get(key))
            .and_then(Value::as_str)
            .map(str::to_string)
    };
    StateReferences {
        rasterizer: get("rasterizer"),
        depth_stencil: get("depthStencil"),
        blend: get("blend"),
        render_target: get("renderTarget"),
    }
}

fn parse_topology(value: Option<&Value>, material: &str) -> Result<Option<PrimitiveTopology>> {
    let Some(value) = value else {
        return Ok(None);
    };
    let name = value.as_str().unwrap_or_default();
    PrimitiveTopology::from_name(name)
        .map(Some)
        .ok_or_else(|| MaterialError::InvalidStateValue {
            category: format!("material '{material}'"),
            field: "primitiveTopology".into(),
            value: value.to_string(),
        })
}

/// `{NAME: value}` → `NAME=value`; `true`, `null` and `""` give a bare `NAME`,
/// `false` drops the define.
pub(crate) fn defines_from_object(map: &Map<String, Value>) -> Vec<String> {
    let mut defines: Vec<String> = map
        .iter()
        .filter_map(|(name, value)| match value {
            Value::Bool(false) => None,
            Value::Bool(true) | Value::Null => Some(name.clone()),
            Value::String(s) if s.is_empty() => Some(name.clone()),
            Value::String(s) => Some(format!("{name}={s}")),
            other => Some(format!("{name}={other}")),
        })
        .collect();
    defines.sort();
    defines
}

fn required_str<'v>(value: &'v Value, field: &str, context: &str) -> Result<&'v str> {
    value
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| MaterialError::MissingField {
            context: context.to_string(),
            field: field.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::ParameterValue;
    use crate::source::MemorySource;
    use rstest::rstest;
    use serde_json::json;

    fn source() -> MemorySource {
        let source = MemorySource::new();
        source.insert_str("shaders/lit.wgsl", "// lit");
        source.insert_str("shaders/shadow.wgsl", "// shadow");
        source
    }

    fn parse(source: &MemorySource, value: Value) -> Result<MaterialDefinition> {
        let ctx = ParseContext::new(source, "shaders");
        parse_material(&value, &ctx)
    }

    fn lit_shaders() -> Value {
        json!({
            "vertex": {"file": "lit.wgsl", "profile": "vs_6_0", "entry": "vs_main"},
            "pixel": {"file": "lit.wgsl", "profile": "ps_6_0", "entry": "ps_main"}
        })
    }

    #[test]
    fn test_single_pass_material() {
        let source = source();
        let material = parse(
            &source,
            json!({
                "id": "m1",
                "pass": "forward",
                "vertexFormat": "pos_color",
                "primitiveTopology": "Line",
                "versionHash": "abc",
                "shaders": lit_shaders(),
                "states": {"rasterizer": "solid", "depthStencil": "depth_less", "blend": "opaque"},
                "parameters": [{"name": "tint", "type": "float4", "default": [1, 0, 0, 1]}]
            }),
        )
        .unwrap();

        assert_eq!(material.id, "m1");
        assert!(material.enabled);
        assert_eq!(material.version_hash, "abc");
        assert_eq!(material.vertex_format_id.as_deref(), Some("pos_color"));

        let pass = material.pass("forward").unwrap();
        assert_eq!(pass.topology, PrimitiveTopology::Line);
        assert_eq!(pass.shaders.len(), 2);
        assert_eq!(pass.shaders[0].stage, ShaderStage::Vertex);
        assert_eq!(pass.shaders[0].file_path, "shaders/lit.wgsl");
        assert_eq!(pass.shaders[0].entry_point, "vs_main");
        assert_eq!(pass.shaders[1].id, "shaders/lit.wgsl#ps_main@ps_6_0");
        assert_eq!(pass.states.blend.as_deref(), Some("opaque"));
        assert_eq!(
            pass.parameter("tint").unwrap().default,
            Some(ParameterValue::Float4([1.0, 0.0, 0.0, 1.0]))
        );
    }

    #[test]
    fn test_multi_pass_inherits_material_states() {
        let source = source();
        let material = parse(
            &source,
            json!({
                "id": "m1",
                "states": {"rasterizer": "solid", "blend": "opaque"},
                "parameters": [{"name": "roughness", "type": "float", "default": 0.5}],
                "passes": [
                    {"name": "forward", "shaders": lit_shaders(), "states": {"blend": "alpha"}},
                    {
                        "name": "shadow",
                        "shaders": {"vertex": {"file": "shadow.wgsl", "profile": "vs_6_0"}},
                        "parameters": [{"name": "roughness", "type": "float", "default": 1.0}],
                        "topology": "Triangle"
                    }
                ]
            }),
        )
        .unwrap();

        let forward = material.pass("forward").unwrap();
        assert_eq!(forward.states.rasterizer.as_deref(), Some("solid"));
        assert_eq!(forward.states.blend.as_deref(), Some("alpha"));
        assert_eq!(
            forward.parameter("roughness").unwrap().default,
            Some(ParameterValue::Float(0.5))
        );

        let shadow = material.pass("shadow").unwrap();
        assert_eq!(shadow.states.blend.as_deref(), Some("opaque"));
        assert_eq!(shadow.shaders[0].entry_point, "main");
        assert_eq!(
            shadow.parameter("roughness").unwrap().default,
            Some(ParameterValue::Float(1.0))
        );
        assert_eq!(shadow.parameters.len(), 1);
    }

    #[test]
    fn test_missing_id_is_reported() {
        let source = source();
        let error = parse(&source, json!({"shaders": lit_shaders()})).unwrap_err();
        assert!(matches!(error, MaterialError::MissingField { ref field, .. } if field == "id"));
        assert!(!error.is_fatal());
    }

    #[test]
    fn test_duplicate_stage_via_alias_is_fatal() {
        let source = source();
        let error = parse(
            &source,
            json!({
                "id": "m1",
                "shaders": {
                    "vertex": {"file": "lit.wgsl", "profile": "vs_6_0"},
                    "pixel": {"file": "lit.wgsl", "profile": "ps_6_0"},
                    "fragment": {"file": "lit.wgsl", "profile": "ps_6_0"}
                }
            }),
        )
        .unwrap_err();
        assert!(matches!(error, MaterialError::DuplicateShaderStage { .. }));
        assert!(error.is_fatal());
    }

    #[test]
    fn test_duplicate_stage_in_array_form_is_fatal() {
        let source = source();
        let error = parse(
            &source,
            json!({
                "id": "m1",
                "shaders": [
                    {"stage": "vertex", "file": "lit.wgsl", "profile": "vs_6_0"},
                    {"stage": "vertex", "file": "shadow.wgsl", "profile": "vs_6_0"}
                ]
            }),
        )
        .unwrap_err();
        assert!(matches!(error, MaterialError::DuplicateShaderStage { .. }));
    }

    #[rstest]
    #[case::unknown_stage(
        json!({"tessellation": {"file": "lit.wgsl", "profile": "vs_6_0"}}),
        "UnknownShaderStage"
    )]
    #[case::missing_file(
        json!({"vertex": {"file": "missing.wgsl", "profile": "vs_6_0"}}),
        "ShaderFileNotFound"
    )]
    #[case::wrong_profile_prefix(
        json!({"vertex": {"file": "lit.wgsl", "profile": "ps_6_0"}}),
        "InvalidProfile"
    )]
    #[case::malformed_profile(
        json!({"vertex": {"file": "lit.wgsl", "profile": "vs6"}}),
        "InvalidProfile"
    )]
    fn test_fatal_shader_errors(#[case] shaders: Value, #[case] expected: &str) {
        let source = source();
        let error = parse(&source, json!({"id": "m1", "shaders": shaders})).unwrap_err();
        assert!(error.is_fatal(), "{error} should be fatal");
        assert!(format!("{error:?}").starts_with(expected), "got {error:?}");
    }

    #[test]
    fn test_unknown_parameter_type_is_fatal() {
        let source = source();
        let error = parse(
            &source,
            json!({
                "id": "m1",
                "shaders": lit_shaders(),
                "parameters": [{"name": "m", "type": "float3x3"}]
            }),
        )
        .unwrap_err();
        assert!(matches!(error, MaterialError::UnknownParameterType { .. }));
        assert!(error.is_fatal());
    }

    #[test]
    fn test_float4_arity_is_rejected() {
        let source = source();
        let error = parse(
            &source,
            json!({
                "id": "m1",
                "shaders": lit_shaders(),
                "parameters": [{"name": "tint", "type": "float4", "default": [1, 0, 0]}]
            }),
        )
        .unwrap_err();
        assert!(matches!(error, MaterialError::InvalidParameter { .. }));
    }

    #[rstest]
    #[case::unnamed(json!([
        {"name": "forward", "shaders": {"vertex": {"file": "lit.wgsl", "profile": "vs_6_0"}}},
        {"shaders": {"vertex": {"file": "lit.wgsl", "profile": "vs_6_0"}}}
    ]))]
    #[case::repeated(json!([
        {"name": "forward", "shaders": {"vertex": {"file": "lit.wgsl", "profile": "vs_6_0"}}},
        {"name": "forward", "shaders": {"vertex": {"file": "shadow.wgsl", "profile": "vs_6_0"}}}
    ]))]
    fn test_multi_pass_names_must_be_unique(#[case] passes: Value) {
        let source = source();
        let error = parse(&source, json!({"id": "m1", "passes": passes})).unwrap_err();
        assert!(matches!(error, MaterialError::AmbiguousPass { .. }));
    }

    #[test]
    fn test_library_shaders_and_global_defines() {
        let source = source();
        let document = Document::from_object(
            json!({
                "materials": [],
                "renderPasses": [],
                "defines": {"QUALITY": 2, "SHADOWS": true, "DEBUG": false},
                "shaders": {
                    "vertex": {"lit_vs": {"file": "lit.wgsl", "profile": "vs_6_0", "entry": "vs_main"}},
                    "pixel": [{"id": "lit_ps", "file": "lit.wgsl", "profile": "ps_6_0", "defines": ["ALPHA_TEST"]}]
                }
            })
            .as_object()
            .cloned()
            .unwrap(),
        );
        let ctx = ParseContext::new(&source, "shaders").with_document(&document);
        assert_eq!(ctx.global_defines(), ["QUALITY=2", "SHADOWS"]);

        let material = parse_material(
            &json!({"id": "m1", "shaders": {"vertex": "lit_vs", "pixel": "lit_ps"}}),
            &ctx,
        )
        .unwrap();
        let pass = &material.passes[0];
        assert_eq!(pass.shaders[0].id, "lit_vs");
        assert_eq!(pass.shaders[0].entry_point, "vs_main");
        assert_eq!(pass.shaders[1].id, "lit_ps");
        assert_eq!(
            pass.shaders[1].defines,
            ["ALPHA_TEST", "QUALITY=2", "SHADOWS"]
        );

        let error = parse_material(
            &json!({"id": "m2", "shaders": {"vertex": "missing_vs"}}),
            &ctx,
        )
        .unwrap_err();
        assert!(matches!(error, MaterialError::UnknownShader { .. }));
    }

    #[test]
    fn test_render_pass() {
        let pass = parse_render_pass(&json!({
            "name": "forward",
            "queue": "opaque",
            "states": {"renderTarget": "hdr_target"}
        }))
        .unwrap();
        assert_eq!(pass.name, "forward");
        assert_eq!(pass.queue, "opaque");
        assert_eq!(pass.render_target.as_deref(), Some("hdr_target"));

        let defaulted = parse_render_pass(&json!({"name": "ui"})).unwrap();
        assert_eq!(defaulted.queue, DEFAULT_QUEUE);
        assert!(parse_render_pass(&json!({"queue": "opaque"})).is_err());
    }

    #[test]
    fn test_explicit_bindings_take_pass_stages() {
        let source = source();
        let material = parse(
            &source,
            json!({
                "id": "m1",
                "shaders": lit_shaders(),
                "bindings": [{"name": "shadow_map", "kind": "srv", "slot": 9}]
            }),
        )
        .unwrap();
        let binding = &material.passes[0].bindings[0];
        assert_eq!(binding.slot, Some(9));
        assert_eq!(
            binding.stages,
            ShaderStageFlags::VERTEX | ShaderStageFlags::PIXEL
        );
    }
}

//! Structural validation of merged documents.
//!
//! Every check is a pure function over the document. Problems are logged
//! with `log::error!` as they are found and also returned, so the caller
//! can decide whether to continue.

use std::collections::HashSet;

use serde_json::Value;

use super::{
    DEFINES_KEY, Document, INCLUDES_KEY, MATERIALS_KEY, RENDER_PASSES_KEY, SHADERS_KEY,
    STATES_KEY,
};
use crate::definition::ParameterType;
use crate::error::MaterialError;

/// A declared id that appeared more than once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateId {
    pub id: String,
    /// Where the repeat was found, e.g. `materials` or `states.blendStates`.
    pub category: String,
}

impl From<DuplicateId> for MaterialError {
    fn from(dup: DuplicateId) -> Self {
        MaterialError::DuplicateId {
            id: dup.id,
            category: dup.category,
        }
    }
}

/// Everything [`validate_document`] found.
#[derive(Debug, Default)]
pub struct ValidationReport {
    /// Schema and parameter problems.
    pub errors: Vec<MaterialError>,
    /// Repeated ids (non-fatal on their own).
    pub duplicates: Vec<DuplicateId>,
}

impl ValidationReport {
    /// True when nothing at all was found.
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty() && self.duplicates.is_empty()
    }
}

/// Check that the required top-level sections exist with the right shape.
///
/// `materials` and `renderPasses` must be arrays. `states`, `shaders` and
/// `defines` must be objects and `includes` an array when present.
pub fn validate_schema(document: &Document) -> bool {
    schema_errors(document).is_empty()
}

/// Check one parameter declaration: a known type and a matching default.
pub fn validate_parameter(parameter: &Value) -> bool {
    match check_parameter(parameter) {
        Ok(()) => true,
        Err(error) => {
            log::error!("{error}");
            false
        }
    }
}

/// Collect every declared id repeated across materials, render passes and
/// all state and shader categories.
///
/// Ids share one global namespace. The first occurrence wins; each later
/// occurrence is reported with the category it appeared in.
pub fn find_duplicate_ids(document: &Document) -> Vec<DuplicateId> {
    let mut seen = HashSet::new();
    let mut duplicates = Vec::new();

    let mut visit = |id: &str, category: &str| {
        if !seen.insert(id.to_string()) {
            log::error!("Duplicate id '{}' in {}", id, category);
            duplicates.push(DuplicateId {
                id: id.to_string(),
                category: category.to_string(),
            });
        }
    };

    for material in document.materials() {
        if let Some(id) = material.get("id").and_then(Value::as_str) {
            visit(id, MATERIALS_KEY);
        }
    }
    for pass in document.render_passes() {
        if let Some(name) = pass.get("name").and_then(Value::as_str) {
            visit(name, RENDER_PASSES_KEY);
        }
    }
    for (section, categories) in [
        (STATES_KEY, document.states()),
        (SHADERS_KEY, document.shaders()),
    ] {
        let Some(categories) = categories else {
            continue;
        };
        for (category, entries) in categories {
            let label = format!("{section}.{category}");
            for id in declared_ids(entries) {
                visit(id, &label);
            }
        }
    }

    duplicates
}

/// Run every check and collect the results.
pub fn validate_document(document: &Document) -> ValidationReport {
    let mut errors = schema_errors(document);

    for material in document.materials() {
        for parameter in material_parameters(material) {
            if let Err(error) = check_parameter(parameter) {
                log::error!("{error}");
                errors.push(error);
            }
        }
    }

    ValidationReport {
        errors,
        duplicates: find_duplicate_ids(document),
    }
}

/// Parameter check shared by the validator and the definition parser.
pub(crate) fn check_parameter(parameter: &Value) -> Result<(), MaterialError> {
    let name = parameter
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or("<unnamed>");

    let Some(ty) = parameter.get("type").and_then(Value::as_str) else {
        return Err(MaterialError::InvalidParameter {
            name: name.to_string(),
            reason: "missing 'type'".into(),
        });
    };
    let Some(ty) = ParameterType::from_name(ty) else {
        return Err(MaterialError::UnknownParameterType {
            name: name.to_string(),
            ty: ty.to_string(),
        });
    };

    match default_value(parameter) {
        Some(value) if !ty.accepts(value) => Err(MaterialError::InvalidParameter {
            name: name.to_string(),
            reason: format!("default {value} does not match type {}", ty.name()),
        }),
        _ => Ok(()),
    }
}

/// The declared default, under either of its accepted keys.
pub(crate) fn default_value(parameter: &Value) -> Option<&Value> {
    parameter
        .get("default")
        .or_else(|| parameter.get("defaultValue"))
}

fn schema_errors(document: &Document) -> Vec<MaterialError> {
    let mut errors = Vec::new();
    let root = document.root();

    for key in [MATERIALS_KEY, RENDER_PASSES_KEY] {
        match root.get(key) {
            Some(Value::Array(_)) => {}
            Some(_) => errors.push(MaterialError::Schema(format!("'{key}' must be an array"))),
            None => errors.push(MaterialError::Schema(format!(
                "missing required section '{key}'"
            ))),
        }
    }
    for key in [STATES_KEY, SHADERS_KEY, DEFINES_KEY] {
        if root.get(key).is_some_and(|v| !v.is_object()) {
            errors.push(MaterialError::Schema(format!("'{key}' must be an object")));
        }
    }
    if root.get(INCLUDES_KEY).is_some_and(|v| !v.is_array()) {
        errors.push(MaterialError::Schema(format!(
            "'{INCLUDES_KEY}' must be an array"
        )));
    }

    for error in &errors {
        log::error!("{error}");
    }
    errors
}

/// Parameters declared at material level and inside every pass.
fn material_parameters(material: &Value) -> impl Iterator<Item = &Value> {
    let top = material
        .get("parameters")
        .and_then(Value::as_array)
        .into_iter()
        .flatten();
    let passes = material
        .get("passes")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|pass| pass.get("parameters").and_then(Value::as_array))
        .flatten();
    top.chain(passes)
}

/// Ids declared in one category, in either the keyed-object or the
/// array-of-`{id}` form.
fn declared_ids(entries: &Value) -> Vec<&str> {
    match entries {
        Value::Object(map) => map.keys().map(String::as_str).collect(),
        Value::Array(items) => items
            .iter()
            .filter_map(|item| item.get("id").and_then(Value::as_str))
            .collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn document(value: Value) -> Document {
        Document::from_object(value.as_object().cloned().unwrap())
    }

    #[test]
    fn test_schema_accepts_minimal_document() {
        let doc = document(json!({"materials": [], "renderPasses": []}));
        assert!(validate_schema(&doc));
    }

    #[rstest]
    #[case::missing_materials(json!({"renderPasses": []}))]
    #[case::missing_render_passes(json!({"materials": []}))]
    #[case::materials_not_array(json!({"materials": {}, "renderPasses": []}))]
    #[case::states_not_object(json!({"materials": [], "renderPasses": [], "states": []}))]
    #[case::defines_not_object(json!({"materials": [], "renderPasses": [], "defines": 1}))]
    #[case::includes_not_array(json!({"materials": [], "renderPasses": [], "includes": "a.json"}))]
    fn test_schema_rejects(#[case] value: Value) {
        assert!(!validate_schema(&document(value)));
    }

    #[rstest]
    #[case::float(json!({"name": "roughness", "type": "float", "default": 0.5}))]
    #[case::float_from_int(json!({"name": "roughness", "type": "float", "default": 1}))]
    #[case::int(json!({"name": "layers", "type": "int", "default": 3}))]
    #[case::bool(json!({"name": "masked", "type": "bool", "defaultValue": true}))]
    #[case::float4(json!({"name": "tint", "type": "float4", "default": [1, 0, 0, 1]}))]
    #[case::no_default(json!({"name": "tint", "type": "float4"}))]
    fn test_parameter_accepted(#[case] parameter: Value) {
        assert!(validate_parameter(&parameter));
    }

    #[rstest]
    #[case::float4_three_elements(json!({"name": "tint", "type": "float4", "default": [1, 0, 0]}))]
    #[case::float4_five_elements(json!({"name": "tint", "type": "float4", "default": [1, 0, 0, 1, 1]}))]
    #[case::float4_non_numeric(json!({"name": "tint", "type": "float4", "default": [1, 0, "x", 1]}))]
    #[case::int_fractional(json!({"name": "layers", "type": "int", "default": 1.5}))]
    #[case::bool_number(json!({"name": "masked", "type": "bool", "default": 1}))]
    #[case::float_string(json!({"name": "roughness", "type": "float", "default": "0.5"}))]
    #[case::unknown_type(json!({"name": "m", "type": "matrix4", "default": 0}))]
    #[case::missing_type(json!({"name": "m"}))]
    fn test_parameter_rejected(#[case] parameter: Value) {
        assert!(!validate_parameter(&parameter));
    }

    #[test]
    fn test_duplicate_ids_across_categories() {
        let doc = document(json!({
            "materials": [{"id": "m1"}, {"id": "shared"}],
            "renderPasses": [{"name": "forward"}],
            "states": {
                "blendStates": {"opaque": {}, "shared": {}},
                "rasterizerStates": [{"id": "m1"}]
            },
            "shaders": {"vertex": {"forward": {}}}
        }));

        let duplicates = find_duplicate_ids(&doc);
        assert_eq!(
            duplicates,
            vec![
                DuplicateId {
                    id: "shared".into(),
                    category: "states.blendStates".into()
                },
                DuplicateId {
                    id: "m1".into(),
                    category: "states.rasterizerStates".into()
                },
                DuplicateId {
                    id: "forward".into(),
                    category: "shaders.vertex".into()
                },
            ]
        );
    }

    #[test]
    fn test_validate_document_collects_parameter_errors() {
        let doc = document(json!({
            "materials": [{
                "id": "m1",
                "parameters": [{"name": "tint", "type": "float4", "default": [1, 0, 0]}],
                "passes": [{
                    "name": "forward",
                    "parameters": [{"name": "gloss", "type": "glossy"}]
                }]
            }],
            "renderPasses": []
        }));

        let report = validate_document(&doc);
        assert_eq!(report.errors.len(), 2);
        assert!(matches!(
            report.errors[0],
            MaterialError::InvalidParameter { .. }
        ));
        assert!(matches!(
            report.errors[1],
            MaterialError::UnknownParameterType { .. }
        ));
        assert!(report.duplicates.is_empty());
        assert!(!report.is_clean());
    }
}

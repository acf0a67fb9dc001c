//! Root document loading with recursive includes.
//!
//! Every file may list other files under `includes`, relative to its own
//! directory. Includes are loaded depth first and merged before the
//! including file, so a file's array entries always come after those of its
//! dependencies. A file reached twice through different branches (a
//! diamond) is merged once. A file reached again while it is still being
//! loaded is a cycle and fails the whole load.

use std::collections::HashSet;

use kiln_core::profiling::profile_function;
use serde_json::{Map, Value};

use super::{Document, INCLUDES_KEY};
use crate::error::{LoadFailure, MaterialError, Result};
use crate::source::{DocumentSource, path};

/// Loads a root document and everything it includes.
pub struct DocumentLoader<'a> {
    source: &'a dyn DocumentSource,
    /// Files currently being loaded, outermost first.
    stack: Vec<String>,
    /// Files whose content is already in `document`.
    merged: HashSet<String>,
    document: Document,
}

impl<'a> DocumentLoader<'a> {
    /// Create a loader reading from `source`.
    pub fn new(source: &'a dyn DocumentSource) -> Self {
        Self {
            source,
            stack: Vec::new(),
            merged: HashSet::new(),
            document: Document::new(),
        }
    }

    /// Load `root` and its includes into one merged document.
    ///
    /// Fails fast: the first missing file, parse error or cycle aborts the
    /// load and no partial document is returned.
    pub fn load(mut self, root: &str) -> std::result::Result<Document, LoadFailure> {
        profile_function!();

        match self.load_file(root) {
            Ok(()) => {
                log::debug!(
                    "Loaded document '{}' ({} file(s) merged)",
                    root,
                    self.document.files().len()
                );
                Ok(self.document)
            }
            Err(error) => {
                log::error!("Failed to load '{}': {}", root, error);
                Err(LoadFailure::single(error))
            }
        }
    }

    fn load_file(&mut self, file: &str) -> Result<()> {
        let canonical = path::normalize(file)?;

        if let Some(first) = self.stack.iter().position(|p| *p == canonical) {
            let mut chain = self.stack[first..].to_vec();
            chain.push(canonical);
            return Err(MaterialError::IncludeCycle { chain });
        }

        if self.merged.contains(&canonical) {
            log::trace!("Skipping '{}', already merged", canonical);
            return Ok(());
        }

        let mut content = self.parse_file(&canonical)?;
        let includes = take_includes(&mut content, &canonical, self.source)?;

        self.stack.push(canonical.clone());
        for include in &includes {
            self.load_file(include)?;
        }
        self.stack.pop();

        self.merged.insert(canonical.clone());
        self.document.merge_file(canonical, content);
        Ok(())
    }

    fn parse_file(&self, canonical: &str) -> Result<Map<String, Value>> {
        let bytes = self.source.read(canonical)?;
        let value: Value =
            serde_json::from_slice(&bytes).map_err(|e| MaterialError::Json {
                path: self.source.describe(canonical),
                message: e.to_string(),
            })?;

        match value {
            Value::Object(map) => Ok(map),
            _ => Err(MaterialError::InvalidDocument {
                path: self.source.describe(canonical),
                reason: "root must be a JSON object".into(),
            }),
        }
    }
}

/// Remove the `includes` key and resolve its entries against `file`.
fn take_includes(
    content: &mut Map<String, Value>,
    file: &str,
    source: &dyn DocumentSource,
) -> Result<Vec<String>> {
    let Some(includes) = content.remove(INCLUDES_KEY) else {
        return Ok(Vec::new());
    };

    let Value::Array(entries) = includes else {
        return Err(MaterialError::InvalidDocument {
            path: source.describe(file),
            reason: "'includes' must be an array".into(),
        });
    };

    entries
        .iter()
        .map(|entry| match entry {
            Value::String(include) => path::resolve_include(file, include),
            other => Err(MaterialError::InvalidDocument {
                path: source.describe(file),
                reason: format!("include entries must be strings, found {other}"),
            }),
        })
        .collect()
}

/// Merge `source` into `target`.
///
/// - keys absent from `target` are copied
/// - two arrays concatenate, `target` entries first
/// - two objects union by key, `source` winning on conflict
/// - any other combination: `source` wins
///
/// `includes` keys are never copied.
pub fn merge_objects(target: &mut Map<String, Value>, source: Map<String, Value>) {
    for (key, value) in source {
        if key == INCLUDES_KEY {
            continue;
        }
        match (target.get_mut(&key), value) {
            (Some(Value::Array(existing)), Value::Array(incoming)) => {
                existing.extend(incoming);
            }
            (Some(Value::Object(existing)), Value::Object(incoming)) => {
                for (k, v) in incoming {
                    existing.insert(k, v);
                }
            }
            (_, value) => {
                target.insert(key, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemorySource;
    use serde_json::json;

    fn source_with(files: &[(&str, Value)]) -> MemorySource {
        let source = MemorySource::new();
        for (path, value) in files {
            source.insert_str(path, &value.to_string());
        }
        source
    }

    fn material_ids(document: &Document) -> Vec<String> {
        document
            .materials()
            .iter()
            .filter_map(|m| m.get("id").and_then(Value::as_str))
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn test_single_file() {
        let source = source_with(&[(
            "root.json",
            json!({"materials": [{"id": "m1"}], "renderPasses": []}),
        )]);
        let document = DocumentLoader::new(&source).load("root.json").unwrap();
        assert_eq!(material_ids(&document), ["m1"]);
        assert_eq!(document.files(), ["root.json"]);
    }

    #[test]
    fn test_includes_merge_before_including_file() {
        let source = source_with(&[
            (
                "root.json",
                json!({"includes": ["lib/a.json"], "materials": [{"id": "root"}]}),
            ),
            ("lib/a.json", json!({"materials": [{"id": "a"}]})),
        ]);
        let document = DocumentLoader::new(&source).load("root.json").unwrap();
        assert_eq!(material_ids(&document), ["a", "root"]);
        assert!(document.get(INCLUDES_KEY).is_none());
    }

    #[test]
    fn test_direct_cycle() {
        let source = source_with(&[
            ("a.json", json!({"includes": ["b.json"]})),
            ("b.json", json!({"includes": ["a.json"]})),
        ]);
        let failure = DocumentLoader::new(&source).load("a.json").unwrap_err();
        match &failure.errors[..] {
            [MaterialError::IncludeCycle { chain }] => {
                assert_eq!(chain, &["a.json", "b.json", "a.json"]);
            }
            other => panic!("expected a cycle, got {other:?}"),
        }
    }

    #[test]
    fn test_self_include_is_cycle() {
        let source = source_with(&[("a.json", json!({"includes": ["./a.json"]}))]);
        let failure = DocumentLoader::new(&source).load("a.json").unwrap_err();
        assert!(matches!(
            &failure.errors[..],
            [MaterialError::IncludeCycle { chain }] if chain == &["a.json", "a.json"]
        ));
    }

    #[test]
    fn test_missing_include_fails_whole_load() {
        let source = source_with(&[(
            "root.json",
            json!({"includes": ["missing.json"], "materials": []}),
        )]);
        let failure = DocumentLoader::new(&source).load("root.json").unwrap_err();
        assert!(matches!(
            &failure.errors[..],
            [MaterialError::FileNotFound(p)] if p == "missing.json"
        ));
    }

    #[test]
    fn test_parse_error_is_reported() {
        let source = MemorySource::new();
        source.insert_str("root.json", "{ \"materials\": [ }");
        let failure = DocumentLoader::new(&source).load("root.json").unwrap_err();
        assert!(matches!(&failure.errors[..], [MaterialError::Json { .. }]));
    }

    #[test]
    fn test_non_string_include_is_rejected() {
        let source = source_with(&[("root.json", json!({"includes": [42]}))]);
        let failure = DocumentLoader::new(&source).load("root.json").unwrap_err();
        assert!(matches!(
            &failure.errors[..],
            [MaterialError::InvalidDocument { .. }]
        ));
    }

    #[test]
    fn test_merge_rules() {
        let mut target = json!({
            "materials": [{"id": "a"}],
            "states": {"blendStates": {"opaque": {}}},
            "defines": {"QUALITY": 1},
            "version": 1
        })
        .as_object()
        .cloned()
        .unwrap();
        let source = json!({
            "materials": [{"id": "b"}],
            "states": {"rasterizerStates": {"solid": {}}},
            "defines": [1, 2],
            "version": 2,
            "includes": ["ignored.json"]
        })
        .as_object()
        .cloned()
        .unwrap();

        merge_objects(&mut target, source);

        assert_eq!(target["materials"], json!([{"id": "a"}, {"id": "b"}]));
        assert_eq!(
            target["states"],
            json!({"blendStates": {"opaque": {}}, "rasterizerStates": {"solid": {}}})
        );
        assert_eq!(target["defines"], json!([1, 2]));
        assert_eq!(target["version"], json!(2));
        assert!(!target.contains_key(INCLUDES_KEY));
    }

    #[test]
    fn test_object_merge_is_shallow() {
        let mut target = json!({"states": {"blendStates": {"opaque": {"a": 1}}}})
            .as_object()
            .cloned()
            .unwrap();
        let source = json!({"states": {"blendStates": {"alpha": {"b": 2}}}})
            .as_object()
            .cloned()
            .unwrap();

        merge_objects(&mut target, source);

        // The nested object is replaced wholesale, not merged.
        assert_eq!(target["states"], json!({"blendStates": {"alpha": {"b": 2}}}));
    }
}

//! Merged material documents.
//!
//! A [`Document`] is the result of loading a root JSON file together with
//! everything it (transitively) includes. See [`loader`] for the include and
//! merge rules and [`validator`] for the structural checks run before parsing.

pub mod loader;
pub mod validator;

use serde_json::{Map, Value};

pub use loader::{DocumentLoader, merge_objects};
pub use validator::{
    DuplicateId, ValidationReport, find_duplicate_ids, validate_document, validate_parameter,
    validate_schema,
};

/// Top-level key holding the material array.
pub const MATERIALS_KEY: &str = "materials";
/// Top-level key holding the render pass array.
pub const RENDER_PASSES_KEY: &str = "renderPasses";
/// Top-level key holding named state blocks, grouped by category.
pub const STATES_KEY: &str = "states";
/// Top-level key holding named shader declarations, grouped by stage.
pub const SHADERS_KEY: &str = "shaders";
/// Top-level key holding global shader defines.
pub const DEFINES_KEY: &str = "defines";
/// Per-file key listing other files to merge; never present after loading.
pub const INCLUDES_KEY: &str = "includes";

/// A merged JSON document plus the files it was assembled from.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    root: Map<String, Value>,
    files: Vec<String>,
}

impl Document {
    /// Create an empty document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an already-merged JSON object (no include processing).
    pub fn from_object(root: Map<String, Value>) -> Self {
        Self {
            root,
            files: Vec::new(),
        }
    }

    /// The merged root object.
    pub fn root(&self) -> &Map<String, Value> {
        &self.root
    }

    /// Look up a top-level key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.root.get(key)
    }

    /// Canonical paths of every merged file, in merge order.
    pub fn files(&self) -> &[String] {
        &self.files
    }

    /// Material objects, or an empty slice if the section is missing.
    pub fn materials(&self) -> &[Value] {
        self.array(MATERIALS_KEY)
    }

    /// Render pass objects, or an empty slice if the section is missing.
    pub fn render_passes(&self) -> &[Value] {
        self.array(RENDER_PASSES_KEY)
    }

    /// The `states` section, if present and an object.
    pub fn states(&self) -> Option<&Map<String, Value>> {
        self.root.get(STATES_KEY).and_then(Value::as_object)
    }

    /// The `shaders` section, if present and an object.
    pub fn shaders(&self) -> Option<&Map<String, Value>> {
        self.root.get(SHADERS_KEY).and_then(Value::as_object)
    }

    /// The `defines` section, if present and an object.
    pub fn defines(&self) -> Option<&Map<String, Value>> {
        self.root.get(DEFINES_KEY).and_then(Value::as_object)
    }

    /// Serialize the merged document as pretty-printed JSON.
    pub fn to_pretty_string(&self) -> String {
        serde_json::to_string_pretty(&self.root).unwrap_or_default()
    }

    fn array(&self, key: &str) -> &[Value] {
        self.root
            .get(key)
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub(crate) fn merge_file(&mut self, path: String, content: Map<String, Value>) {
        merge_objects(&mut self.root, content);
        self.files.push(path);
    }
}

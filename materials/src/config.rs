//! Material system configuration loaded from TOML.
//!
//! ```toml
//! shader_root = "shaders"
//! duplicate_ids = "reject"
//! skip_invalid_materials = true
//! fallback_material = "debug_magenta"
//! ```

use std::path::Path;

use serde::Deserialize;

use crate::error::{MaterialError, Result};

/// What to do when two entries of the merged document share an id.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicateIdPolicy {
    /// Log a warning; the first definition wins.
    #[default]
    Warn,
    /// Fail the load.
    Reject,
}

/// Options of a [`MaterialSystem`](crate::MaterialSystem).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MaterialSystemConfig {
    /// Directory shader `file` entries are relative to, inside the source.
    pub shader_root: String,
    pub duplicate_ids: DuplicateIdPolicy,
    /// Drop materials with reported (non-fatal) errors instead of failing the load.
    pub skip_invalid_materials: bool,
    /// Material handed out for unknown ids by `material_or_fallback`.
    pub fallback_material: Option<String>,
    /// Whether shader change notifications invalidate caches.
    pub hot_reload: bool,
    /// Run schema and duplicate validation before parsing.
    pub validate_on_load: bool,
}

impl Default for MaterialSystemConfig {
    fn default() -> Self {
        Self {
            shader_root: ".".into(),
            duplicate_ids: DuplicateIdPolicy::Warn,
            skip_invalid_materials: false,
            fallback_material: None,
            hot_reload: true,
            validate_on_load: true,
        }
    }
}

impl MaterialSystemConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Load a config file from disk.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| MaterialError::io(path.display().to_string(), e))?;
        let config = Self::from_toml_str(&text)?;
        log::info!("Loaded material system config from {}", path.display());
        Ok(config)
    }

    pub fn with_shader_root(mut self, root: impl Into<String>) -> Self {
        self.shader_root = root.into();
        self
    }

    pub fn with_duplicate_ids(mut self, policy: DuplicateIdPolicy) -> Self {
        self.duplicate_ids = policy;
        self
    }

    pub fn with_skip_invalid_materials(mut self, skip: bool) -> Self {
        self.skip_invalid_materials = skip;
        self
    }

    pub fn with_fallback_material(mut self, id: impl Into<String>) -> Self {
        self.fallback_material = Some(id.into());
        self
    }

    pub fn with_hot_reload(mut self, enabled: bool) -> Self {
        self.hot_reload = enabled;
        self
    }

    pub fn with_validate_on_load(mut self, enabled: bool) -> Self {
        self.validate_on_load = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_is_default() {
        assert_eq!(
            MaterialSystemConfig::from_toml_str("").unwrap(),
            MaterialSystemConfig::default()
        );
    }

    #[test]
    fn test_parse() {
        let config = MaterialSystemConfig::from_toml_str(
            r#"
            shader_root = "shaders"
            duplicate_ids = "reject"
            skip_invalid_materials = true
            fallback_material = "debug_magenta"
            hot_reload = false
            "#,
        )
        .unwrap();
        assert_eq!(config.shader_root, "shaders");
        assert_eq!(config.duplicate_ids, DuplicateIdPolicy::Reject);
        assert!(config.skip_invalid_materials);
        assert_eq!(config.fallback_material.as_deref(), Some("debug_magenta"));
        assert!(!config.hot_reload);
        assert!(config.validate_on_load);
    }

    #[test]
    fn test_invalid_toml() {
        let error = MaterialSystemConfig::from_toml_str("duplicate_ids = \"explode\"").unwrap_err();
        assert!(matches!(error, MaterialError::Config(_)));
    }

    #[test]
    fn test_missing_file() {
        let error = MaterialSystemConfig::from_file(Path::new("/nonexistent/kiln.toml")).unwrap_err();
        assert!(matches!(error, MaterialError::FileNotFound(_)));
    }
}

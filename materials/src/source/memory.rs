use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::DocumentSource;
use super::path::normalize;
use crate::error::{MaterialError, Result};

/// In-memory document source for tests and embedded material sets.
///
/// Cloning shares the underlying storage, so files can be replaced after
/// the source has been handed to a [`MaterialSystem`](crate::MaterialSystem)
/// (which is how hot-reload tests edit shaders).
///
/// # Example
///
/// ```
/// use kiln_materials::{DocumentSource, MemorySource};
///
/// let source = MemorySource::new();
/// source.insert_str("materials/root.json", r#"{"materials": [], "renderPasses": []}"#);
/// assert!(source.exists("materials/root.json"));
/// ```
#[derive(Clone, Default)]
pub struct MemorySource {
    files: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl MemorySource {
    /// Create an empty in-memory source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a file, replacing any existing file at the same path.
    ///
    /// The path is normalized first; a path that cannot be normalized is
    /// stored verbatim and will never be found.
    pub fn insert(&self, path: &str, data: Vec<u8>) {
        let key = normalize(path).unwrap_or_else(|_| path.to_string());
        self.files.write().insert(key, data);
    }

    /// Insert a UTF-8 text file.
    pub fn insert_str(&self, path: &str, text: &str) {
        self.insert(path, text.as_bytes().to_vec());
    }

    /// Remove a file, returning its data if it existed.
    pub fn remove(&self, path: &str) -> Option<Vec<u8>> {
        let key = normalize(path).ok()?;
        self.files.write().remove(&key)
    }

    /// Number of stored files.
    pub fn len(&self) -> usize {
        self.files.read().len()
    }

    /// True if no files are stored.
    pub fn is_empty(&self) -> bool {
        self.files.read().is_empty()
    }
}

impl DocumentSource for MemorySource {
    fn read(&self, path: &str) -> Result<Vec<u8>> {
        let key = normalize(path)?;
        self.files
            .read()
            .get(&key)
            .cloned()
            .ok_or(MaterialError::FileNotFound(key))
    }

    fn exists(&self, path: &str) -> bool {
        match normalize(path) {
            Ok(key) => self.files.read().contains_key(&key),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_read() {
        let source = MemorySource::new();
        source.insert_str("shaders/lit.wgsl", "fn main() {}");
        assert_eq!(source.read("shaders/lit.wgsl").unwrap(), b"fn main() {}");
        assert_eq!(
            source.read_to_string("./shaders//lit.wgsl").unwrap(),
            "fn main() {}"
        );
    }

    #[test]
    fn test_missing_file() {
        let source = MemorySource::new();
        assert!(matches!(
            source.read("missing.json"),
            Err(MaterialError::FileNotFound(p)) if p == "missing.json"
        ));
        assert!(!source.exists("missing.json"));
    }

    #[test]
    fn test_clones_share_storage() {
        let source = MemorySource::new();
        let clone = source.clone();
        clone.insert_str("a.json", "{}");
        assert!(source.exists("a.json"));
        assert_eq!(source.remove("a.json"), Some(b"{}".to_vec()));
        assert!(clone.is_empty());
    }
}

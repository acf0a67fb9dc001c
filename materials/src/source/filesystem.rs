use std::path::{Path, PathBuf};

use super::DocumentSource;
use super::path::normalize;
use crate::error::{MaterialError, Result};

/// Document source that reads material files from disk.
///
/// Source paths are joined onto the root directory after normalization, so
/// `..` can never climb above the root.
///
/// # Example
///
/// ```ignore
/// let source = FileSystemSource::new("./assets");
///
/// // Reads ./assets/materials/root.json
/// let bytes = source.read("materials/root.json")?;
/// ```
#[derive(Debug, Clone)]
pub struct FileSystemSource {
    root: PathBuf,
}

impl FileSystemSource {
    /// Create a source rooted at the given directory.
    ///
    /// The directory does not need to exist yet; it is checked at read time.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a source path to a full filesystem path.
    pub fn resolve(&self, path: &str) -> Result<PathBuf> {
        Ok(self.root.join(normalize(path)?))
    }

    /// Map an absolute filesystem path back to a source path, if it lies
    /// under the root.
    pub fn to_source_path(&self, local_path: &Path) -> Option<String> {
        let relative = local_path.strip_prefix(&self.root).ok()?;
        normalize(&relative.to_string_lossy()).ok()
    }
}

impl DocumentSource for FileSystemSource {
    fn read(&self, path: &str) -> Result<Vec<u8>> {
        let full_path = self.resolve(path)?;
        std::fs::read(&full_path).map_err(|e| MaterialError::io(full_path.display().to_string(), e))
    }

    fn exists(&self, path: &str) -> bool {
        self.resolve(path).map(|p| p.is_file()).unwrap_or(false)
    }

    fn describe(&self, path: &str) -> String {
        match self.resolve(path) {
            Ok(full) => full.display().to_string(),
            Err(_) => path.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("kiln-fs-{}-{name}", std::process::id()));
        std::fs::create_dir_all(dir.join("materials")).unwrap();
        dir
    }

    #[test]
    fn test_read_and_exists() {
        let dir = scratch_dir("read");
        std::fs::write(dir.join("materials/root.json"), b"{}").unwrap();

        let source = FileSystemSource::new(&dir);
        assert!(source.exists("materials/root.json"));
        assert!(!source.exists("materials/other.json"));
        assert_eq!(source.read("materials/./root.json").unwrap(), b"{}");

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let dir = scratch_dir("missing");
        let source = FileSystemSource::new(&dir);
        assert!(matches!(
            source.read("materials/nope.json"),
            Err(MaterialError::FileNotFound(_))
        ));
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_to_source_path() {
        let source = FileSystemSource::new("/assets");
        assert_eq!(
            source.to_source_path(Path::new("/assets/shaders/lit.wgsl")),
            Some("shaders/lit.wgsl".to_string())
        );
        assert_eq!(source.to_source_path(Path::new("/elsewhere/lit.wgsl")), None);
    }
}

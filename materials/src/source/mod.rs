//! Where material documents and shader sources come from.
//!
//! All paths handed to a [`DocumentSource`] are source-relative, use forward
//! slashes, and are normalized with [`path::normalize`] before lookup. Two
//! spellings of the same file therefore compare equal, which is what include
//! cycle detection and hot-reload matching rely on.

pub mod filesystem;
pub mod memory;
pub mod path;

pub use filesystem::FileSystemSource;
pub use memory::MemorySource;

use crate::error::{MaterialError, Result};

/// A read-only store of material and shader files.
pub trait DocumentSource: Send + Sync {
    /// Read the entire contents of a file.
    fn read(&self, path: &str) -> Result<Vec<u8>>;

    /// Check whether a file exists.
    fn exists(&self, path: &str) -> bool;

    /// Read a file as UTF-8 text.
    fn read_to_string(&self, path: &str) -> Result<String> {
        let bytes = self.read(path)?;
        String::from_utf8(bytes).map_err(|e| MaterialError::InvalidDocument {
            path: self.describe(path),
            reason: format!("not valid UTF-8: {e}"),
        })
    }

    /// Human-readable location of a file, used in diagnostics.
    fn describe(&self, path: &str) -> String {
        path.to_string()
    }
}

use crate::error::{MaterialError, Result};

/// Normalize a source-relative path.
///
/// - Replaces backslashes with forward slashes
/// - Collapses redundant separators (`a///b` → `a/b`)
/// - Drops `.` segments
/// - Resolves `..` against the preceding segment
/// - Strips leading and trailing slashes
///
/// Returns `Err(MaterialError::InvalidPath)` if the path is empty or `..`
/// climbs above the source root.
pub fn normalize(path: &str) -> Result<String> {
    let replaced = path.replace('\\', "/");
    let mut segments: Vec<&str> = Vec::new();

    for segment in replaced.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                if segments.pop().is_none() {
                    return Err(MaterialError::InvalidPath {
                        path: path.to_string(),
                        reason: "escapes the source root".into(),
                    });
                }
            }
            _ => segments.push(segment),
        }
    }

    if segments.is_empty() {
        return Err(MaterialError::InvalidPath {
            path: path.to_string(),
            reason: "empty path".into(),
        });
    }

    Ok(segments.join("/"))
}

/// Directory part of a normalized path (empty for top-level files).
pub fn parent(path: &str) -> &str {
    match path.rfind('/') {
        Some(pos) => &path[..pos],
        None => "",
    }
}

/// Resolve `relative` against the directory `base_dir` and normalize.
///
/// A leading `/` makes `relative` root-relative.
pub fn join(base_dir: &str, relative: &str) -> Result<String> {
    if relative.starts_with('/') || base_dir.is_empty() {
        return normalize(relative);
    }
    normalize(&format!("{base_dir}/{relative}"))
}

/// Resolve a path found inside `including_file` against that file's directory.
pub fn resolve_include(including_file: &str, include: &str) -> Result<String> {
    join(parent(including_file), include)
}

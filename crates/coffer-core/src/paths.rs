//! Path-to-key normalization for the metadata index.
//!
//! Index keys are forward-slash-joined relative paths; `"."` names the
//! root. Absolute paths are rejected at the CLI boundary, so this module
//! only has to strip `.` components and join what remains.

use std::path::{Component, Path};

/// Convert a relative filesystem path into its metadata-index key.
///
/// `"./dir/file"` and `"dir/file"` both map to `"dir/file"`; a bare `"."`
/// maps to itself (the index root).
pub fn path_key(path: &Path) -> String {
    let parts: Vec<String> = path
        .components()
        .filter(|c| !matches!(c, Component::CurDir))
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if parts.is_empty() {
        ".".to_string()
    } else {
        parts.join("/")
    }
}

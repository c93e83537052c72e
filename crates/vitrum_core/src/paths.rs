//! Workspace-relative path handling.
//!
//! Every path that crosses a trust boundary (HTTP clients, peers) is
//! sanitized here before touching the filesystem.

use std::path::{Path, PathBuf};

use crate::error::{Result, VitrumError};

/// Validate and normalize a caller-supplied workspace-relative path.
///
/// Rejects empty, absolute, and traversal (`..`) paths; normalizes
/// backslashes to forward slashes and strips any leading `/`.
pub fn sanitize_rel_path(raw: &str) -> Result<String> {
    let normalized = raw.replace('\\', "/");
    let trimmed = normalized.trim_start_matches('/');
    if trimmed.is_empty() {
        return Err(VitrumError::BadRequest("empty path".to_string()));
    }
    if Path::new(trimmed).is_absolute() {
        return Err(VitrumError::BadRequest(format!("absolute path: {raw}")));
    }
    let has_traversal = trimmed
        .split('/')
        .any(|segment| segment == ".." || segment.is_empty() || segment == ".");
    if has_traversal {
        return Err(VitrumError::BadRequest(format!("invalid path: {raw}")));
    }
    Ok(trimmed.to_string())
}

/// Join a sanitized relative path onto the workspace root.
pub fn to_abs(root: &Path, rel: &str) -> PathBuf {
    let mut abs = root.to_path_buf();
    for segment in rel.split('/') {
        abs.push(segment);
    }
    abs
}

/// Turn free text into a filename-safe slug.
pub fn slug(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last_dash = true;
    for c in text.chars() {
        if c.is_alphanumeric() {
            out.extend(c.to_lowercase());
            last_dash = false;
        } else if !last_dash {
            out.push('-');
            last_dash = true;
        }
    }
    let trimmed = out.trim_end_matches('-');
    if trimmed.is_empty() {
        "untitled".to_string()
    } else {
        trimmed.to_string()
    }
}

//! YAML front-matter parsing and manipulation.
//!
//! Documents carry an optional leading `---`-delimited YAML block. Parsing
//! keeps the mapping in an [`IndexMap`] so that key order survives a
//! parse/serialize round trip; the field-level updater below relies on this
//! to rewrite a single key without reordering its siblings.

use std::fs;
use std::path::Path;

use indexmap::IndexMap;
use serde_yaml::Value;

use crate::error::{Result, VitrumError};

/// An ordered front-matter mapping.
pub type Frontmatter = IndexMap<String, Value>;

/// A markdown file split into front-matter and body.
#[derive(Debug, Clone, Default)]
pub struct FileParts {
    /// The parsed front-matter, empty when the file has none.
    pub frontmatter: Frontmatter,
    /// The body after the closing front-matter fence.
    pub content: String,
}

/// Split raw file text into front-matter and content.
///
/// A file without a leading `---` fence (or with an unterminated one) yields
/// empty front-matter and the full text as content. A fence whose YAML does
/// not parse yields [`VitrumError::MalformedFrontmatter`].
pub fn parse(raw: &str) -> Result<FileParts> {
    let Some((frontmatter_str, content)) = split_fences(raw) else {
        return Ok(FileParts {
            frontmatter: Frontmatter::new(),
            content: raw.to_string(),
        });
    };

    if frontmatter_str.trim().is_empty() {
        return Ok(FileParts {
            frontmatter: Frontmatter::new(),
            content: content.to_string(),
        });
    }

    let frontmatter: Frontmatter = serde_yaml::from_str(frontmatter_str)
        .map_err(|_| VitrumError::MalformedFrontmatter(Path::new("").to_path_buf()))?;

    Ok(FileParts {
        frontmatter,
        content: content.to_string(),
    })
}

/// Serialize front-matter and content back to file text.
///
/// Empty front-matter produces no fence at all.
pub fn serialize(frontmatter: &Frontmatter, content: &str) -> Result<String> {
    if frontmatter.is_empty() {
        return Ok(content.to_string());
    }
    let yaml = serde_yaml::to_string(frontmatter)?;
    Ok(format!("---\n{yaml}---\n{content}"))
}

/// Extract only the body from raw file text, stripping any front-matter.
pub fn body(raw: &str) -> &str {
    match split_fences(raw) {
        Some((_, content)) => content,
        None => raw,
    }
}

/// Locate the fenced block. Returns `(frontmatter, content)` slices, or
/// `None` when there is no complete leading fence.
fn split_fences(raw: &str) -> Option<(&str, &str)> {
    if !raw.starts_with("---\n") && !raw.starts_with("---\r\n") {
        return None;
    }
    let rest = &raw[4..];
    let end = rest.find("\n---\n").map(|i| (i, 5)).or_else(|| {
        rest.find("\n---\r\n").map(|i| (i, 6))
    })?;
    let (idx, fence_len) = end;
    Some((&rest[..idx], &rest[idx + fence_len..]))
}

/// Get a string-valued key.
pub fn get_str<'a>(frontmatter: &'a Frontmatter, key: &str) -> Option<&'a str> {
    frontmatter.get(key).and_then(|v| v.as_str())
}

/// Get a sequence-valued key as strings, empty when absent or mistyped.
pub fn get_string_list(frontmatter: &Frontmatter, key: &str) -> Vec<String> {
    match frontmatter.get(key) {
        Some(Value::Sequence(seq)) => seq
            .iter()
            .filter_map(|v| v.as_str().map(String::from))
            .collect(),
        _ => Vec::new(),
    }
}

/// Rewrite one file's front-matter through a closure, preserving the body
/// and the relative order of keys the closure does not touch.
///
/// All sync-service metadata writes go through here so that user-authored
/// keys survive untouched.
pub fn update_file_fields<F>(path: &Path, mutate: F) -> Result<()>
where
    F: FnOnce(&mut Frontmatter),
{
    let raw = fs::read_to_string(path).map_err(|e| VitrumError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;
    let mut parts = parse(&raw)?;
    mutate(&mut parts.frontmatter);
    let updated = serialize(&parts.frontmatter, &parts.content)?;
    fs::write(path, updated).map_err(|e| VitrumError::FileWrite {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Rewrite one file wholesale: new front-matter, new body.
pub fn write_file(path: &Path, frontmatter: &Frontmatter, content: &str) -> Result<()> {
    let raw = serialize(frontmatter, content)?;
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, raw).map_err(|e| VitrumError::FileWrite {
        path: path.to_path_buf(),
        source: e,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_frontmatter() {
        let raw = "---\ntitle: Test\ntags:\n  - a\n---\nBody here";
        let parts = parse(raw).unwrap();
        assert_eq!(get_str(&parts.frontmatter, "title"), Some("Test"));
        assert_eq!(get_string_list(&parts.frontmatter, "tags"), vec!["a"]);
        assert_eq!(parts.content, "Body here");
    }

    #[test]
    fn test_parse_no_frontmatter() {
        let parts = parse("Just body content").unwrap();
        assert!(parts.frontmatter.is_empty());
        assert_eq!(parts.content, "Just body content");
    }

    #[test]
    fn test_parse_unterminated_fence_is_all_body() {
        let raw = "---\ntitle: Oops\nno closing fence";
        let parts = parse(raw).unwrap();
        assert!(parts.frontmatter.is_empty());
        assert_eq!(parts.content, raw);
    }

    #[test]
    fn test_parse_invalid_yaml_is_error() {
        let raw = "---\ntitle: [unclosed\n---\nbody";
        assert!(matches!(
            parse(raw),
            Err(VitrumError::MalformedFrontmatter(_))
        ));
    }

    #[test]
    fn test_serialize_empty_frontmatter_has_no_fence() {
        let out = serialize(&Frontmatter::new(), "plain body").unwrap();
        assert_eq!(out, "plain body");
    }

    #[test]
    fn test_round_trip_preserves_key_order() {
        let raw = "---\nzebra: 1\ntitle: T\nalpha: 2\n---\nbody";
        let parts = parse(raw).unwrap();
        let out = serialize(&parts.frontmatter, &parts.content).unwrap();
        let reparsed = parse(&out).unwrap();
        let keys: Vec<_> = reparsed.frontmatter.keys().cloned().collect();
        assert_eq!(keys, vec!["zebra", "title", "alpha"]);
        assert_eq!(reparsed.content, "body");
    }

    #[test]
    fn test_body_extraction() {
        assert_eq!(body("---\nt: 1\n---\nthe body"), "the body");
        assert_eq!(body("no fence"), "no fence");
    }

    #[test]
    fn test_update_file_fields_preserves_siblings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("note.md");
        fs::write(&path, "---\ntitle: Keep\ncustom: yes\n---\nbody text\n").unwrap();

        update_file_fields(&path, |fm| {
            fm.insert("status".into(), Value::String("active".into()));
        })
        .unwrap();

        let parts = parse(&fs::read_to_string(&path).unwrap()).unwrap();
        let keys: Vec<_> = parts.frontmatter.keys().cloned().collect();
        assert_eq!(keys, vec!["title", "custom", "status"]);
        assert_eq!(parts.content, "body text\n");
    }
}

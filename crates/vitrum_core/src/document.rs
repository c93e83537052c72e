//! The document record and the file parser that produces it.
//!
//! A [`Document`] is the canonical in-memory record for one markdown file
//! under the workspace root. Parsing is tolerant: a missing front-matter
//! fence is fine, and every derived field (title, type, excerpt, links) has
//! a deterministic fallback chain.

use std::fs;
use std::path::Path;
use std::sync::OnceLock;

use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Result, VitrumError};
use crate::frontmatter::{self, Frontmatter};

/// Maximum excerpt length in characters.
const EXCERPT_MAX_CHARS: usize = 200;

/// The canonical record for one file under the workspace root.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    /// Workspace-relative path, forward-slash normalized, ends in `.md`.
    pub path: String,
    /// Resolved display title.
    pub title: String,
    /// Document type, inferred from front-matter or path.
    #[serde(rename = "type")]
    pub doc_type: DocType,
    /// Optional free-form status string (`active`, `blocked`, ...).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Ordered tags from front-matter.
    pub tags: Vec<String>,
    /// Creation timestamp: front-matter `created`, else file birth time.
    pub created: DateTime<Utc>,
    /// Last modification timestamp (file mtime).
    pub updated: DateTime<Utc>,
    /// Up to 200 chars of cleaned content.
    pub excerpt: String,
    /// The full front-matter mapping, order preserved.
    pub frontmatter: Frontmatter,
    /// The body after the front-matter fence.
    pub content: String,
    /// Deduplicated outgoing wiki-link targets, raw and unresolved.
    pub links: Vec<String>,
    /// Inbound references, recomputed by the index after every mutation.
    pub backlinks: Vec<String>,
}

/// Document type, chosen by front-matter `type` else the first path segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DocType {
    /// Actionable item.
    Task,
    /// Long-lived reference note.
    Knowledge,
    /// Unsorted capture, including documents received from peers.
    Inbox,
    /// Time-bound note.
    Reminder,
    /// Project working file.
    Project,
    /// Tag index page.
    Tag,
    /// Anything else.
    Other,
}

impl DocType {
    /// Parse a type label from front-matter or a path segment.
    ///
    /// `tag-index` aliases to [`DocType::Tag`]; unknown labels map to `None`
    /// so the caller can fall through to the next inference step.
    pub fn parse(label: &str) -> Option<DocType> {
        match label.trim().to_ascii_lowercase().as_str() {
            "task" | "tasks" => Some(DocType::Task),
            "knowledge" => Some(DocType::Knowledge),
            "inbox" => Some(DocType::Inbox),
            "reminder" | "reminders" => Some(DocType::Reminder),
            "project" | "projects" => Some(DocType::Project),
            "tag" | "tag-index" | "tags" => Some(DocType::Tag),
            _ => None,
        }
    }

    /// The kebab-case label used on the wire and in front-matter.
    pub fn label(&self) -> &'static str {
        match self {
            DocType::Task => "task",
            DocType::Knowledge => "knowledge",
            DocType::Inbox => "inbox",
            DocType::Reminder => "reminder",
            DocType::Project => "project",
            DocType::Tag => "tag",
            DocType::Other => "other",
        }
    }
}

/// Parse one file into a [`Document`].
///
/// `abs` must live under `root`. Errors are either `FileRead` (unreadable)
/// or `MalformedFrontmatter`; both are recoverable by the index, which logs
/// and skips the file.
pub fn parse_document(abs: &Path, root: &Path) -> Result<Document> {
    let raw = fs::read_to_string(abs).map_err(|e| VitrumError::FileRead {
        path: abs.to_path_buf(),
        source: e,
    })?;

    let rel = relative_path(abs, root)?;
    let parts = frontmatter::parse(&raw)
        .map_err(|_| VitrumError::MalformedFrontmatter(abs.to_path_buf()))?;

    let meta = fs::metadata(abs).map_err(|e| VitrumError::FileRead {
        path: abs.to_path_buf(),
        source: e,
    })?;
    let updated: DateTime<Utc> = meta.modified().map(Into::into).unwrap_or_else(|_| Utc::now());
    let created = frontmatter::get_str(&parts.frontmatter, "created")
        .and_then(parse_timestamp)
        .or_else(|| meta.created().ok().map(Into::into))
        .unwrap_or(updated);

    let title = resolve_title(&parts.frontmatter, &parts.content, &rel);
    let doc_type = resolve_type(&parts.frontmatter, &rel);
    let status = frontmatter::get_str(&parts.frontmatter, "status").map(String::from);
    let tags = frontmatter::get_string_list(&parts.frontmatter, "tags");
    let links = extract_wiki_links(&parts.content);
    let excerpt = derive_excerpt(&parts.content);

    Ok(Document {
        path: rel,
        title,
        doc_type,
        status,
        tags,
        created,
        updated,
        excerpt,
        frontmatter: parts.frontmatter,
        content: parts.content,
        links,
        backlinks: Vec::new(),
    })
}

/// Workspace-relative, forward-slash-normalized path.
fn relative_path(abs: &Path, root: &Path) -> Result<String> {
    let rel = abs.strip_prefix(root).map_err(|_| {
        VitrumError::Internal(format!("{abs:?} is outside workspace root {root:?}"))
    })?;
    let mut out = String::new();
    for component in rel.components() {
        if !out.is_empty() {
            out.push('/');
        }
        out.push_str(&component.as_os_str().to_string_lossy());
    }
    Ok(out)
}

/// Title resolution: front-matter `title`, first `# ` heading, filename stem.
fn resolve_title(fm: &Frontmatter, content: &str, rel: &str) -> String {
    if let Some(title) = frontmatter::get_str(fm, "title")
        && !title.trim().is_empty()
    {
        return title.trim().to_string();
    }
    for line in content.lines() {
        if let Some(heading) = line.strip_prefix("# ")
            && !heading.trim().is_empty()
        {
            return heading.trim().to_string();
        }
    }
    title_from_stem(rel)
}

/// Filename stem with separators replaced and words title-cased.
fn title_from_stem(rel: &str) -> String {
    let stem = file_stem(rel);
    stem.replace(['-', '_'], " ")
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// The filename without directories or the `.md` extension.
pub fn file_stem(rel: &str) -> &str {
    let name = rel.rsplit('/').next().unwrap_or(rel);
    name.strip_suffix(".md").unwrap_or(name)
}

fn resolve_type(fm: &Frontmatter, rel: &str) -> DocType {
    if let Some(label) = frontmatter::get_str(fm, "type")
        && let Some(doc_type) = DocType::parse(label)
    {
        return doc_type;
    }
    match rel.split('/').next() {
        Some(segment) if segment != rel => DocType::parse(segment).unwrap_or(DocType::Other),
        _ => DocType::Other,
    }
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

fn wiki_link_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[\[([^\[\]]+)\]\]").expect("valid wiki-link regex"))
}

/// Extract `[[target]]` and `[[target|alias]]` targets, trimmed and
/// deduplicated preserving first-seen order. Alias text is discarded.
pub fn extract_wiki_links(content: &str) -> Vec<String> {
    let mut links = Vec::new();
    for cap in wiki_link_re().captures_iter(content) {
        let inner = &cap[1];
        let target = inner.split('|').next().unwrap_or(inner).trim();
        if !target.is_empty() && !links.iter().any(|l| l == target) {
            links.push(target.to_string());
        }
    }
    links
}

fn fence_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?ms)^```.*?^```[ \t]*$").expect("valid fence regex"))
}

fn md_link_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[([^\]]*)\]\([^)]*\)").expect("valid link regex"))
}

/// Deterministic excerpt derivation: strip fenced code, headings, link
/// syntax, and emphasis markers, collapse whitespace, truncate on a word
/// boundary at 200 chars with a trailing ellipsis when cut.
pub fn derive_excerpt(content: &str) -> String {
    let without_fences = fence_re().replace_all(content, "");

    let mut kept = String::with_capacity(without_fences.len());
    for line in without_fences.lines() {
        if line.trim_start().starts_with('#') {
            continue;
        }
        kept.push_str(line);
        kept.push('\n');
    }

    // [[target|alias]] renders as its alias, [[target]] as its target.
    let kept = wiki_link_re().replace_all(&kept, |cap: &regex::Captures| {
        let inner = &cap[1];
        inner.split('|').next_back().unwrap_or(inner).to_string()
    });
    let kept = md_link_re().replace_all(&kept, "$1");
    let kept = kept.replace(['*', '_', '`'], "");

    let collapsed = kept.split_whitespace().collect::<Vec<_>>().join(" ");
    truncate_on_word(&collapsed, EXCERPT_MAX_CHARS)
}

fn truncate_on_word(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    let cut = match cut.rfind(' ') {
        Some(idx) if idx > 0 => &cut[..idx],
        _ => cut.as_str(),
    };
    format!("{}…", cut.trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_doc(dir: &Path, rel: &str, raw: &str) -> std::path::PathBuf {
        let path = dir.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, raw).unwrap();
        path
    }

    #[test]
    fn test_title_from_frontmatter() {
        let dir = tempfile::tempdir().unwrap();
        let abs = write_doc(dir.path(), "knowledge/a.md", "---\ntitle: Hi\n---\n# Other\n");
        let doc = parse_document(&abs, dir.path()).unwrap();
        assert_eq!(doc.title, "Hi");
    }

    #[test]
    fn test_title_from_heading_then_stem() {
        let dir = tempfile::tempdir().unwrap();
        let abs = write_doc(dir.path(), "knowledge/b.md", "# Heading Title\nbody");
        let doc = parse_document(&abs, dir.path()).unwrap();
        assert_eq!(doc.title, "Heading Title");

        let abs = write_doc(dir.path(), "knowledge/my-note-file.md", "no heading");
        let doc = parse_document(&abs, dir.path()).unwrap();
        assert_eq!(doc.title, "My Note File");
    }

    #[test]
    fn test_type_from_frontmatter_overrides_path() {
        let dir = tempfile::tempdir().unwrap();
        let abs = write_doc(dir.path(), "knowledge/t.md", "---\ntype: task\n---\nx");
        let doc = parse_document(&abs, dir.path()).unwrap();
        assert_eq!(doc.doc_type, DocType::Task);
    }

    #[test]
    fn test_type_from_path_segment() {
        let dir = tempfile::tempdir().unwrap();
        let abs = write_doc(dir.path(), "tasks/do-it.md", "x");
        let doc = parse_document(&abs, dir.path()).unwrap();
        assert_eq!(doc.doc_type, DocType::Task);

        let abs = write_doc(dir.path(), "misc/x.md", "x");
        let doc = parse_document(&abs, dir.path()).unwrap();
        assert_eq!(doc.doc_type, DocType::Other);

        // A root-level file has no path segment to infer from.
        let abs = write_doc(dir.path(), "rootfile.md", "x");
        let doc = parse_document(&abs, dir.path()).unwrap();
        assert_eq!(doc.doc_type, DocType::Other);
    }

    #[test]
    fn test_tag_index_alias() {
        assert_eq!(DocType::parse("tag-index"), Some(DocType::Tag));
    }

    #[test]
    fn test_wiki_link_extraction() {
        let links = extract_wiki_links("see [[b]] and [[c|alias]] and [[b]] again");
        assert_eq!(links, vec!["b", "c"]);
    }

    #[test]
    fn test_wiki_link_trimming() {
        let links = extract_wiki_links("[[  spaced  ]]");
        assert_eq!(links, vec!["spaced"]);
    }

    #[test]
    fn test_excerpt_strips_markup() {
        let content = "# Title\n\nSome *bold* text with a [link](http://x) and `code`.\n\n```\nfenced\n```\nmore";
        let excerpt = derive_excerpt(content);
        assert_eq!(excerpt, "Some bold text with a link and code. more");
    }

    #[test]
    fn test_excerpt_truncates_on_word_boundary() {
        let content = "word ".repeat(100);
        let excerpt = derive_excerpt(&content);
        assert!(excerpt.chars().count() <= EXCERPT_MAX_CHARS + 1);
        assert!(excerpt.ends_with('…'));
        assert!(!excerpt.contains("wor…"));
    }

    #[test]
    fn test_created_from_frontmatter_date() {
        let dir = tempfile::tempdir().unwrap();
        let abs = write_doc(
            dir.path(),
            "knowledge/dated.md",
            "---\ncreated: 2024-03-01\n---\nx",
        );
        let doc = parse_document(&abs, dir.path()).unwrap();
        assert_eq!(doc.created.format("%Y-%m-%d").to_string(), "2024-03-01");
    }

    #[test]
    fn test_status_and_tags() {
        let dir = tempfile::tempdir().unwrap();
        let abs = write_doc(
            dir.path(),
            "tasks/s.md",
            "---\nstatus: active\ntags:\n  - rust\n  - notes\n---\nx",
        );
        let doc = parse_document(&abs, dir.path()).unwrap();
        assert_eq!(doc.status.as_deref(), Some("active"));
        assert_eq!(doc.tags, vec!["rust", "notes"]);
    }
}

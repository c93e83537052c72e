//! The in-memory document index.
//!
//! Owns the authoritative `path -> Document` mapping, resolves wiki-links,
//! maintains backlinks, and answers search and graph queries. The map is an
//! [`IndexMap`] so iteration order — and with it link-resolution tie-breaks
//! and backlink ordering — is stable for a given build.
//!
//! Mutation discipline: the file watcher's drain task is the only writer
//! (plus the explicit reindex request); everything else reads.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use log::{debug, warn};
use serde::Serialize;
use walkdir::WalkDir;

use crate::document::{self, DocType, Document};
use crate::error::Result;
use crate::search::{self, SearchFilter, SearchHit};

/// Directory names that are never scanned.
const EXCLUDED_DIRS: &[&str] = &["node_modules", "scratchpad", "dist", "build", ".git"];

/// Root subtree with special ingestion rules.
const PROJECTS_DIR: &str = "projects";

/// Files ingested from each immediate subdirectory of `projects/`.
const PROJECT_DOC_NAMES: &[&str] = &["CLAUDE.md", "README.md"];

/// The authoritative document store.
#[derive(Debug, Default)]
pub struct DocumentIndex {
    root: PathBuf,
    docs: IndexMap<String, Document>,
    built_at: Option<DateTime<Utc>>,
}

/// A node in the link graph.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphNode {
    /// Document path.
    pub id: String,
    /// Document title.
    pub label: String,
    /// Document type label.
    #[serde(rename = "type")]
    pub doc_type: DocType,
    /// Status, when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Outgoing plus incoming link count.
    pub link_count: usize,
}

/// A resolved edge in the link graph.
#[derive(Debug, Clone, Serialize)]
pub struct GraphEdge {
    /// Path of the linking document.
    pub source: String,
    /// Path of the resolved target document.
    pub target: String,
}

/// The full link graph.
#[derive(Debug, Clone, Serialize)]
pub struct Graph {
    /// All nodes in scope.
    pub nodes: Vec<GraphNode>,
    /// All resolved edges between nodes in scope.
    pub links: Vec<GraphEdge>,
}

/// Aggregate counts for the status endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexStats {
    /// Total indexed documents.
    pub document_count: usize,
    /// Documents per type label.
    pub by_type: IndexMap<String, usize>,
    /// Tag histogram.
    pub tags: IndexMap<String, usize>,
    /// When the last full build finished.
    pub built_at: Option<DateTime<Utc>>,
    /// Workspace root.
    pub root: String,
}

impl DocumentIndex {
    /// Build an index over the workspace root.
    ///
    /// Single-file parse failures are logged and skipped; they never fail
    /// the build.
    pub fn build(root: &Path) -> Result<DocumentIndex> {
        let mut index = DocumentIndex {
            root: root.to_path_buf(),
            docs: IndexMap::new(),
            built_at: None,
        };
        index.rebuild()?;
        Ok(index)
    }

    /// Re-scan the workspace from scratch.
    pub fn rebuild(&mut self) -> Result<()> {
        let mut docs = IndexMap::new();
        for abs in scan_workspace(&self.root) {
            match document::parse_document(&abs, &self.root) {
                Ok(doc) => {
                    docs.insert(doc.path.clone(), doc);
                }
                Err(e) => {
                    warn!("skipping {abs:?}: {e}");
                }
            }
        }
        self.docs = docs;
        self.rebuild_backlinks();
        self.built_at = Some(Utc::now());
        debug!("indexed {} documents under {:?}", self.docs.len(), self.root);
        Ok(())
    }

    /// Workspace root this index was built over.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Number of indexed documents.
    pub fn len(&self) -> usize {
        self.docs.len()
    }

    /// True when nothing is indexed.
    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// Look up one document by workspace-relative path.
    pub fn get(&self, path: &str) -> Option<&Document> {
        self.docs.get(path)
    }

    /// True when the path is currently indexed.
    pub fn contains(&self, path: &str) -> bool {
        self.docs.contains_key(path)
    }

    /// Iterate documents in stable index order.
    pub fn documents(&self) -> impl Iterator<Item = &Document> {
        self.docs.values()
    }

    /// Reparse one file and refresh the derived structures.
    ///
    /// A parse failure keeps the previous record (if any) and is reported
    /// to the caller for logging.
    pub fn update_document(&mut self, rel_path: &str) -> Result<()> {
        let abs = self.root.join(rel_path);
        let doc = document::parse_document(&abs, &self.root)?;
        self.docs.insert(doc.path.clone(), doc);
        self.rebuild_backlinks();
        Ok(())
    }

    /// Drop one document and refresh the derived structures.
    pub fn remove_document(&mut self, rel_path: &str) -> Option<Document> {
        let removed = self.docs.shift_remove(rel_path);
        if removed.is_some() {
            self.rebuild_backlinks();
        }
        removed
    }

    /// Resolve a raw wiki-link target to a document path.
    ///
    /// Ordered: exact key, key with `.md` appended, first filename-stem
    /// match (case-insensitive), first title match (case-insensitive).
    /// Ties break by index iteration order.
    pub fn resolve_link(&self, raw: &str) -> Option<&str> {
        if self.docs.contains_key(raw) {
            return self.docs.get_key_value(raw).map(|(k, _)| k.as_str());
        }
        let with_ext = format!("{raw}.md");
        if let Some((key, _)) = self.docs.get_key_value(with_ext.as_str()) {
            return Some(key.as_str());
        }
        let lowered = raw.to_lowercase();
        if let Some((key, _)) = self
            .docs
            .iter()
            .find(|(path, _)| document::file_stem(path).to_lowercase() == lowered)
        {
            return Some(key.as_str());
        }
        self.docs
            .iter()
            .find(|(_, doc)| doc.title.to_lowercase() == lowered)
            .map(|(key, _)| key.as_str())
    }

    /// Recompute every document's backlinks from the primary link data.
    ///
    /// Runs after every mutation; at note-workspace scale a full rebuild is
    /// cheap and keeps the derived invariants trivial.
    fn rebuild_backlinks(&mut self) {
        let mut incoming: HashMap<String, Vec<String>> = HashMap::new();
        for (source, doc) in &self.docs {
            for raw in &doc.links {
                if let Some(target) = self.resolve_link(raw) {
                    let entry = incoming.entry(target.to_string()).or_default();
                    if !entry.iter().any(|p| p == source) {
                        entry.push(source.clone());
                    }
                }
            }
        }
        for (path, doc) in self.docs.iter_mut() {
            doc.backlinks = incoming.remove(path).unwrap_or_default();
        }
    }

    /// Ranked fuzzy search with optional post-filters.
    pub fn search(&self, query: &str, filter: &SearchFilter) -> Vec<SearchHit> {
        search::search(self.docs.values(), query, filter)
    }

    /// The full link graph, optionally restricted to a folder prefix.
    pub fn graph(&self, folder: Option<&str>) -> Graph {
        let in_scope = |path: &str| match folder {
            Some(prefix) => path.starts_with(prefix),
            None => true,
        };

        let nodes: Vec<GraphNode> = self
            .docs
            .values()
            .filter(|doc| in_scope(&doc.path))
            .map(|doc| self.node_for(doc))
            .collect();

        let mut links = Vec::new();
        for doc in self.docs.values() {
            if !in_scope(&doc.path) {
                continue;
            }
            for raw in &doc.links {
                if let Some(target) = self.resolve_link(raw)
                    && in_scope(target)
                {
                    links.push(GraphEdge {
                        source: doc.path.clone(),
                        target: target.to_string(),
                    });
                }
            }
        }

        Graph { nodes, links }
    }

    /// The center document plus its resolved outgoing targets and incoming
    /// backlink sources, with the induced edges.
    pub fn neighbors(&self, path: &str) -> Option<Graph> {
        let center = self.docs.get(path)?;

        let mut in_scope: Vec<&str> = vec![path];
        for raw in &center.links {
            if let Some(target) = self.resolve_link(raw)
                && !in_scope.contains(&target)
            {
                in_scope.push(target);
            }
        }
        for source in &center.backlinks {
            if !in_scope.iter().any(|p| p == source) {
                in_scope.push(source);
            }
        }

        let nodes: Vec<GraphNode> = in_scope
            .iter()
            .filter_map(|p| self.docs.get(*p))
            .map(|doc| self.node_for(doc))
            .collect();

        let mut links = Vec::new();
        for p in &in_scope {
            let Some(doc) = self.docs.get(*p) else { continue };
            for raw in &doc.links {
                if let Some(target) = self.resolve_link(raw)
                    && in_scope.iter().any(|q| *q == target)
                {
                    links.push(GraphEdge {
                        source: doc.path.clone(),
                        target: target.to_string(),
                    });
                }
            }
        }

        Some(Graph { nodes, links })
    }

    fn node_for(&self, doc: &Document) -> GraphNode {
        GraphNode {
            id: doc.path.clone(),
            label: doc.title.clone(),
            doc_type: doc.doc_type,
            status: doc.status.clone(),
            link_count: doc.links.len() + doc.backlinks.len(),
        }
    }

    /// Aggregate counts for the status endpoint.
    pub fn stats(&self) -> IndexStats {
        let mut by_type: IndexMap<String, usize> = IndexMap::new();
        let mut tags: IndexMap<String, usize> = IndexMap::new();
        for doc in self.docs.values() {
            *by_type.entry(doc.doc_type.label().to_string()).or_default() += 1;
            for tag in &doc.tags {
                *tags.entry(tag.clone()).or_default() += 1;
            }
        }
        IndexStats {
            document_count: self.docs.len(),
            by_type,
            tags,
            built_at: self.built_at,
            root: self.root.to_string_lossy().to_string(),
        }
    }
}

/// Collect the markdown files a build ingests, in sorted order.
///
/// Hidden entries and [`EXCLUDED_DIRS`] are skipped everywhere. The root
/// `projects/` subtree is special: its own `*.md` files and each immediate
/// subdirectory's `CLAUDE.md`/`README.md` are ingested, deeper markdown is
/// ignored.
fn scan_workspace(root: &Path) -> Vec<PathBuf> {
    WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            let name = entry.file_name().to_string_lossy();
            if entry.depth() > 0 && name.starts_with('.') {
                return false;
            }
            !(entry.file_type().is_dir() && EXCLUDED_DIRS.contains(&name.as_ref()))
        })
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            entry.file_type().is_file()
                && entry.path().extension().is_some_and(|ext| ext == "md")
                && ingestible(entry.path(), root)
        })
        .map(|entry| entry.into_path())
        .collect()
}

fn ingestible(abs: &Path, root: &Path) -> bool {
    let Ok(rel) = abs.strip_prefix(root) else {
        return false;
    };
    let components: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .collect();
    if components.first().map(String::as_str) != Some(PROJECTS_DIR) {
        return true;
    }
    match components.len() {
        // projects/note.md
        2 => true,
        // projects/<sub>/CLAUDE.md or README.md only
        3 => PROJECT_DOC_NAMES.contains(&components[2].as_str()),
        _ => false,
    }
}

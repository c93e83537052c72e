//! Wire types for the federation protocol.
//!
//! Everything a peer can say to another peer, plus the client-facing
//! fan-out shapes. Field names are camelCase on the wire.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::document::DocType;
use crate::frontmatter::Frontmatter;

/// Answer to a `hello` probe.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerHelloResponse {
    /// Always true in a successful answer.
    pub online: bool,
    /// Responder's opaque instance id.
    pub instance_id: String,
    /// Responder's display name.
    pub display_name: String,
    /// Path prefixes the responder shares.
    #[serde(default)]
    pub shared_folders: Vec<String>,
    /// Tags the responder shares.
    #[serde(default)]
    pub shared_tags: Vec<String>,
    /// Documents currently indexed by the responder.
    pub document_count: usize,
    /// Seconds the responder has been up.
    pub uptime: u64,
    /// Protocol version.
    pub api_version: String,
}

/// One ranked item in a peer search answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerSearchItem {
    /// Workspace-relative path on the answering peer.
    pub path: String,
    /// Document title.
    pub title: String,
    /// Document type label.
    #[serde(rename = "type")]
    pub doc_type: DocType,
    /// Document tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Normalized distance, lower is better.
    pub score: f64,
    /// Short cleaned excerpt.
    pub snippet: String,
}

/// Answer to a peer-facing search, restricted to shared subtrees.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerSearchResponse {
    /// Answering instance id.
    pub instance_id: String,
    /// Answering display name.
    pub display_name: String,
    /// Number of results.
    pub count: usize,
    /// Ranked results.
    pub results: Vec<PeerSearchItem>,
}

/// Metadata for one shared file in a listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerFileMeta {
    /// Workspace-relative path.
    pub path: String,
    /// Document title.
    pub title: String,
    /// Document type label.
    #[serde(rename = "type")]
    pub doc_type: DocType,
    /// Document tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Last modification timestamp, RFC 3339.
    pub updated: String,
    /// Short cleaned excerpt.
    pub excerpt: String,
}

/// Answer to a shared file listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerFilesResponse {
    /// Answering instance id.
    pub instance_id: String,
    /// Answering display name.
    pub display_name: String,
    /// Number of files.
    pub count: usize,
    /// File metadata.
    pub files: Vec<PeerFileMeta>,
}

/// Checksum-only answer for one shared file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChecksumResponse {
    /// `sha256:<hex>` of the file body.
    pub checksum: String,
    /// Last modification timestamp, RFC 3339.
    pub updated: String,
}

/// Full-document answer for one shared file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerDocumentResponse {
    /// Workspace-relative path on the answering peer.
    pub path: String,
    /// Document title.
    pub title: String,
    /// Front-matter mapping, order preserved.
    pub frontmatter: Frontmatter,
    /// Body after the front-matter fence.
    pub content: String,
    /// `sha256:<hex>` of the body.
    pub checksum: String,
    /// Last modification timestamp, RFC 3339.
    pub updated: String,
}

/// A document pushed from one peer to another.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomingDocument {
    /// Sender's instance id.
    pub from: String,
    /// Sender's display name.
    pub from_name: String,
    /// Document title.
    pub title: String,
    /// Body content.
    pub content: String,
    /// Document tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Path of the document on the sender.
    pub source_path: String,
    /// Optional note from the sender, rendered as a leading block-quote.
    #[serde(default)]
    pub message: Option<String>,
}

/// An advisory note sent back to a document's origin.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SharedResponse {
    /// Responder's instance id.
    pub from: String,
    /// Responder's display name.
    pub from_name: String,
    /// Path of the shared document being responded to.
    pub path: String,
    /// The note itself.
    pub comment: String,
}

/// Fan-out search answer for local clients.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CrossSearchResponse {
    /// The query string.
    pub query: String,
    /// Merged results across peers, ascending by score.
    pub results: Vec<CrossSearchItem>,
    /// Online peers the fan-out targeted.
    pub total_peers_queried: usize,
    /// Peers that answered within budget.
    pub total_peers_responded: usize,
    /// Per-peer result counts and latencies.
    pub peer_results: IndexMap<String, PeerResultStat>,
}

/// One merged cross-search result with its source peer attached.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CrossSearchItem {
    /// Answering peer's display name.
    pub peer: String,
    /// Answering peer's `host:port`.
    pub peer_host: String,
    /// The ranked item.
    #[serde(flatten)]
    pub item: PeerSearchItem,
}

/// Per-peer fan-out accounting.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerResultStat {
    /// Results contributed by the peer (0 on failure or timeout).
    pub count: usize,
    /// Round-trip time in milliseconds.
    pub took: u64,
}

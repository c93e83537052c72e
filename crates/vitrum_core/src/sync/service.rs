//! The sync service: adoption, origin polling, and conflict resolution.
//!
//! Adoption copies a peer's document into the local workspace and plants a
//! `federation` block in its front-matter. From then on the service tracks
//! divergence in both directions: the watcher reports local edits, a 60 s
//! poll watches the origin checksum, and the state machine in
//! [`super::meta`] decides what each observation means. All metadata writes
//! go through the field-level front-matter updater, so user keys survive.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::bus::{BusEvent, LiveReloadBus};
use crate::checksum::checksum;
use crate::error::{Result, VitrumError};
use crate::frontmatter;
use crate::index::DocumentIndex;
use crate::paths::{sanitize_rel_path, slug, to_abs};
use crate::peers::{PeerClient, PeerRegistry, PeerState, TRANSFER_BUDGET};
use crate::protocol::{IncomingDocument, SharedResponse};
use crate::sync::meta::{
    transition, FederationMeta, ResolveAction, SyncStatus, SyncTrigger,
};

/// Seconds between origin checksum polls.
pub const ORIGIN_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Folder receiving pushed documents.
const INBOX_DIR: &str = "inbox";

/// Request to adopt a peer's document.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdoptRequest {
    /// Origin peer's instance id.
    pub peer_id: String,
    /// Origin host, either `host` or `host:port`.
    pub peer_host: String,
    /// Origin port when not part of `peer_host`.
    #[serde(default)]
    pub peer_port: Option<u16>,
    /// Origin transport scheme, defaults to http.
    #[serde(default)]
    pub peer_protocol: Option<String>,
    /// Origin display name.
    #[serde(default)]
    pub peer_name: Option<String>,
    /// Path of the document on the origin.
    pub source_path: String,
    /// Local destination, defaults to `source_path`.
    #[serde(default)]
    pub target_path: Option<String>,
}

/// Successful adoption answer.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdoptResponse {
    /// Where the document landed locally.
    pub local_path: String,
    /// Checksum both sides now agree on.
    pub checksum: String,
}

/// Two-way conflict diff with metadata hints.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictDiff {
    /// Current local body.
    pub local_content: String,
    /// Current origin body.
    pub origin_content: String,
    /// Adoption-time base body. Not retained by this engine; always empty,
    /// and merge UIs fall back to a two-way merge.
    pub base_content: String,
    /// Checksum of the local body.
    pub local_checksum: String,
    /// Checksum of the origin body.
    pub origin_checksum: String,
}

/// Request to resolve a divergent document.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveRequest {
    /// Workspace-relative path of the adopted document.
    pub path: String,
    /// What to do.
    pub action: ResolveAction,
    /// Replacement body for `merge`.
    #[serde(default)]
    pub merged_content: Option<String>,
    /// Optional note sent back to the origin on `reject`.
    #[serde(default)]
    pub comment: Option<String>,
}

/// Resolution answer.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveResponse {
    /// The resolved document.
    pub path: String,
    /// Status after resolution.
    pub status: SyncStatus,
}

/// Tracks adopted documents against their origins.
pub struct SyncService {
    root: PathBuf,
    index: Arc<RwLock<DocumentIndex>>,
    registry: Arc<PeerRegistry>,
    client: PeerClient,
    bus: LiveReloadBus,
}

impl SyncService {
    /// Wire up the service.
    pub fn new(
        root: PathBuf,
        index: Arc<RwLock<DocumentIndex>>,
        registry: Arc<PeerRegistry>,
        client: PeerClient,
        bus: LiveReloadBus,
    ) -> SyncService {
        SyncService {
            root,
            index,
            registry,
            client,
            bus,
        }
    }

    /// Adopt a document from a peer.
    ///
    /// Fetches the document (10 s budget), writes it locally with a fresh
    /// `federation` block, and leaves index absorption to the watcher.
    pub async fn adopt(&self, request: AdoptRequest) -> Result<AdoptResponse> {
        let source_path = sanitize_rel_path(&request.source_path)?;
        let local_rel = match &request.target_path {
            Some(target) => sanitize_rel_path(target)?,
            None => source_path.clone(),
        };

        let (host_port, base_url) = peer_endpoint(
            &request.peer_host,
            request.peer_port,
            request.peer_protocol.as_deref(),
        );
        let fetched = self
            .client
            .fetch_document(&base_url, &source_path, TRANSFER_BUDGET)
            .await?;

        let now = Utc::now();
        let meta = FederationMeta {
            origin_peer: request.peer_id.clone(),
            origin_name: request
                .peer_name
                .clone()
                .unwrap_or_else(|| request.peer_host.clone()),
            origin_host: host_port,
            origin_path: source_path,
            adopted_at: now,
            origin_checksum: fetched.checksum.clone(),
            local_checksum: fetched.checksum.clone(),
            sync_status: SyncStatus::Synced,
            last_sync_check: now,
        };

        let mut fm = fetched.frontmatter.clone();
        meta.apply_to(&mut fm);

        let abs = to_abs(&self.root, &local_rel);
        frontmatter::write_file(&abs, &fm, &fetched.content)?;
        info!("adopted {} from {} as {local_rel}", meta.origin_path, meta.origin_name);

        Ok(AdoptResponse {
            local_path: local_rel,
            checksum: fetched.checksum,
        })
    }

    /// Deliver a document pushed by a peer into `inbox/`.
    pub async fn receive(&self, incoming: IncomingDocument) -> Result<String> {
        let now = Utc::now();
        let stamp = now.format("%Y-%m-%dT%H-%M-%S");
        let rel = format!(
            "{INBOX_DIR}/{stamp}-from-{}-{}.md",
            slug(&incoming.from_name),
            slug(&incoming.title)
        );

        let mut fm = frontmatter::Frontmatter::new();
        let mut set = |key: &str, value: serde_yaml::Value| {
            fm.insert(key.to_string(), value);
        };
        set("title", serde_yaml::Value::String(incoming.title.clone()));
        set("type", serde_yaml::Value::String("inbox".to_string()));
        set("source", serde_yaml::Value::String("peer".to_string()));
        set("from", serde_yaml::Value::String(incoming.from_name.clone()));
        set("from-instance", serde_yaml::Value::String(incoming.from.clone()));
        set(
            "original-path",
            serde_yaml::Value::String(incoming.source_path.clone()),
        );
        set(
            "received-at",
            serde_yaml::Value::String(now.to_rfc3339()),
        );
        if !incoming.tags.is_empty() {
            set(
                "tags",
                serde_yaml::Value::Sequence(
                    incoming
                        .tags
                        .iter()
                        .map(|t| serde_yaml::Value::String(t.clone()))
                        .collect(),
                ),
            );
        }

        let content = match incoming.message.as_deref().filter(|m| !m.is_empty()) {
            Some(message) => format!("> {message}\n\n{}", incoming.content),
            None => incoming.content.clone(),
        };

        let abs = to_abs(&self.root, &rel);
        frontmatter::write_file(&abs, &fm, &content)?;
        info!("received document from {} into {rel}", incoming.from_name);

        self.bus
            .emit(BusEvent::PeerDocumentReceived { path: rel.clone() });
        Ok(rel)
    }

    /// Push one local document to a peer's inbox.
    pub async fn send_document(
        &self,
        peer_host: &str,
        raw_path: &str,
        message: Option<String>,
    ) -> Result<serde_json::Value> {
        let rel = sanitize_rel_path(raw_path)?;
        let (title, tags, content) = {
            let index = self.index.read().await;
            let doc = index
                .get(&rel)
                .ok_or_else(|| VitrumError::NotFound(rel.clone()))?;
            (doc.title.clone(), doc.tags.clone(), doc.content.clone())
        };

        let peer = self
            .registry
            .find(peer_host)
            .await
            .ok_or_else(|| VitrumError::NotFound(format!("unknown peer {peer_host}")))?;
        if peer.status != PeerState::Online {
            return Err(VitrumError::PeerOffline(peer_host.to_string()));
        }

        let self_config = self.registry.self_config().await;
        let outgoing = IncomingDocument {
            from: self_config.instance_id,
            from_name: self_config.display_name,
            title,
            content,
            tags,
            source_path: rel.clone(),
            message,
        };
        let reply = self.client.push_document(&peer.base_url(), &outgoing).await?;
        info!("sent {rel} to {peer_host}");
        Ok(reply)
    }

    /// Record an advisory note from a peer as an inbox entry.
    pub async fn receive_response(&self, response: SharedResponse) -> Result<String> {
        let incoming = IncomingDocument {
            from: response.from,
            from_name: response.from_name.clone(),
            title: format!("Response on {}", response.path),
            content: String::new(),
            tags: Vec::new(),
            source_path: response.path,
            message: Some(response.comment),
        };
        self.receive(incoming).await
    }

    /// Classify a local edit reported by the watcher.
    ///
    /// Unadopted and rejected documents are untouched. A changed body
    /// updates `local-checksum` on disk and may move the state machine.
    pub async fn handle_local_change(&self, rel_path: &str) -> Result<()> {
        let (mut meta, content) = {
            let index = self.index.read().await;
            let Some(doc) = index.get(rel_path) else {
                return Ok(());
            };
            match FederationMeta::from_frontmatter(&doc.frontmatter) {
                Some(meta) => (meta, doc.content.clone()),
                None => return Ok(()),
            }
        };
        if meta.sync_status == SyncStatus::Rejected {
            return Ok(());
        }

        let current = checksum(&content);
        if current == meta.local_checksum {
            return Ok(());
        }

        let old_status = meta.sync_status;
        let new_status =
            transition(old_status, SyncTrigger::LocalEdit).unwrap_or(old_status);
        meta.local_checksum = current;
        meta.sync_status = new_status;
        meta.last_sync_check = Utc::now();

        self.write_meta(rel_path, &meta)?;
        debug!("local edit on {rel_path}: {old_status} -> {new_status}");

        if new_status != old_status {
            self.bus.emit(BusEvent::SyncStatusChanged {
                path: rel_path.to_string(),
                old_status,
                new_status,
                peer: Some(meta.origin_name.clone()),
            });
        }
        Ok(())
    }

    /// Origin polling loop. Runs until the service is dropped.
    pub async fn run(&self) {
        let mut interval = tokio::time::interval(ORIGIN_POLL_INTERVAL);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            self.poll_origins().await;
        }
    }

    /// One polling pass over every tracked document.
    pub async fn poll_origins(&self) {
        for (path, meta) in self.adopted_documents().await {
            if meta.sync_status == SyncStatus::Rejected {
                continue;
            }
            if let Err(e) = self.poll_one(&path, meta).await {
                warn!("origin poll for {path} failed: {e}");
            }
        }
    }

    async fn poll_one(&self, rel_path: &str, mut meta: FederationMeta) -> Result<()> {
        let Some(peer) = self.registry.find(&meta.origin_host).await else {
            debug!("origin {} not configured, skipping {rel_path}", meta.origin_host);
            return Ok(());
        };
        if peer.status != PeerState::Online {
            return Ok(());
        }

        let remote = self
            .client
            .fetch_checksum(&peer.base_url(), &meta.origin_path)
            .await?;

        if remote.checksum != meta.origin_checksum {
            let old_status = meta.sync_status;
            let new_status =
                transition(old_status, SyncTrigger::OriginChanged).unwrap_or(old_status);
            meta.origin_checksum = remote.checksum;
            meta.sync_status = new_status;
            meta.last_sync_check = Utc::now();
            self.write_meta(rel_path, &meta)?;
            debug!("origin changed for {rel_path}: {old_status} -> {new_status}");

            if new_status != old_status {
                self.bus.emit(BusEvent::SyncStatusChanged {
                    path: rel_path.to_string(),
                    old_status,
                    new_status,
                    peer: Some(meta.origin_name.clone()),
                });
            }
        } else {
            meta.last_sync_check = Utc::now();
            self.write_meta(rel_path, &meta)?;
        }
        Ok(())
    }

    /// Two-way diff between the local body and a fresh origin fetch.
    pub async fn conflict_diff(&self, rel_path: &str) -> Result<ConflictDiff> {
        let (meta, local_content) = self.tracked_document(rel_path).await?;
        let base_url = self.origin_base_url(&meta).await;
        let fetched = self
            .client
            .fetch_document(&base_url, &meta.origin_path, TRANSFER_BUDGET)
            .await?;

        Ok(ConflictDiff {
            local_checksum: checksum(&local_content),
            origin_checksum: fetched.checksum,
            local_content,
            origin_content: fetched.content,
            base_content: String::new(),
        })
    }

    /// Resolve a divergent document.
    pub async fn resolve(&self, request: ResolveRequest) -> Result<ResolveResponse> {
        let rel_path = sanitize_rel_path(&request.path)?;
        let (meta, _) = self.tracked_document(&rel_path).await?;
        let old_status = meta.sync_status;

        let Some(new_status) =
            transition(old_status, SyncTrigger::Resolve(request.action))
        else {
            return Err(VitrumError::BadRequest(format!(
                "cannot {} a document in state {old_status}",
                match request.action {
                    ResolveAction::AcceptOrigin => "accept-origin",
                    ResolveAction::KeepLocal => "keep-local",
                    ResolveAction::Merge => "merge",
                    ResolveAction::Reject => "reject",
                }
            )));
        };

        let mut meta = meta;
        let now = Utc::now();
        match request.action {
            ResolveAction::AcceptOrigin => {
                let base_url = self.origin_base_url(&meta).await;
                let fetched = self
                    .client
                    .fetch_document(&base_url, &meta.origin_path, TRANSFER_BUDGET)
                    .await?;
                meta.origin_checksum = fetched.checksum.clone();
                meta.local_checksum = fetched.checksum;
                meta.sync_status = new_status;
                meta.last_sync_check = now;
                self.rewrite_body(&rel_path, &meta, &fetched.content)?;
            }
            ResolveAction::KeepLocal => {
                meta.sync_status = new_status;
                meta.last_sync_check = now;
                self.write_meta(&rel_path, &meta)?;
            }
            ResolveAction::Merge => {
                let merged = request.merged_content.ok_or_else(|| {
                    VitrumError::BadRequest("merge requires mergedContent".to_string())
                })?;
                meta.local_checksum = checksum(&merged);
                meta.sync_status = new_status;
                meta.last_sync_check = now;
                self.rewrite_body(&rel_path, &meta, &merged)?;
            }
            ResolveAction::Reject => {
                meta.sync_status = new_status;
                meta.last_sync_check = now;
                self.write_meta(&rel_path, &meta)?;
                if let Some(comment) = request.comment.as_deref().filter(|c| !c.is_empty()) {
                    self.send_rejection_note(&meta, comment).await;
                }
            }
        }

        info!("resolved {rel_path} ({old_status} -> {new_status})");
        self.bus.emit(BusEvent::SyncStatusChanged {
            path: rel_path.clone(),
            old_status,
            new_status,
            peer: Some(meta.origin_name.clone()),
        });

        Ok(ResolveResponse {
            path: rel_path,
            status: new_status,
        })
    }

    /// Every adopted document currently in the index.
    pub async fn adopted_documents(&self) -> Vec<(String, FederationMeta)> {
        let index = self.index.read().await;
        index
            .documents()
            .filter_map(|doc| {
                FederationMeta::from_frontmatter(&doc.frontmatter)
                    .map(|meta| (doc.path.clone(), meta))
            })
            .collect()
    }

    /// Look up an adopted document, or fail with the matching error kind.
    async fn tracked_document(&self, rel_path: &str) -> Result<(FederationMeta, String)> {
        let index = self.index.read().await;
        let doc = index
            .get(rel_path)
            .ok_or_else(|| VitrumError::NotFound(rel_path.to_string()))?;
        let meta = FederationMeta::from_frontmatter(&doc.frontmatter).ok_or_else(|| {
            VitrumError::BadRequest(format!("{rel_path} is not an adopted document"))
        })?;
        Ok((meta, doc.content.clone()))
    }

    /// Base URL of an origin peer, falling back to plain http when the
    /// peer is no longer configured.
    async fn origin_base_url(&self, meta: &FederationMeta) -> String {
        match self.registry.find(&meta.origin_host).await {
            Some(peer) => peer.base_url(),
            None => format!("http://{}", meta.origin_host),
        }
    }

    /// Rewrite only the federation block, preserving body and sibling keys.
    fn write_meta(&self, rel_path: &str, meta: &FederationMeta) -> Result<()> {
        let abs = to_abs(&self.root, rel_path);
        frontmatter::update_file_fields(&abs, |fm| meta.apply_to(fm))
    }

    /// Rewrite the body and the federation block together.
    fn rewrite_body(&self, rel_path: &str, meta: &FederationMeta, content: &str) -> Result<()> {
        let abs = to_abs(&self.root, rel_path);
        let raw = std::fs::read_to_string(&abs).map_err(|e| VitrumError::FileRead {
            path: abs.clone(),
            source: e,
        })?;
        let mut parts = frontmatter::parse(&raw)?;
        meta.apply_to(&mut parts.frontmatter);
        let updated = frontmatter::serialize(&parts.frontmatter, content)?;
        std::fs::write(&abs, updated).map_err(|e| VitrumError::FileWrite {
            path: abs,
            source: e,
        })
    }

    async fn send_rejection_note(&self, meta: &FederationMeta, comment: &str) {
        let self_config = self.registry.self_config().await;
        let note = SharedResponse {
            from: self_config.instance_id,
            from_name: self_config.display_name,
            path: meta.origin_path.clone(),
            comment: comment.to_string(),
        };
        let base_url = self.origin_base_url(meta).await;
        // Best-effort: a failed note never fails the rejection.
        if let Err(e) = self.client.respond(&base_url, &note).await {
            warn!("rejection note to {} failed: {e}", meta.origin_host);
        }
    }
}

/// Normalize `(host, port?, protocol?)` into a `host:port` key and base URL.
fn peer_endpoint(host: &str, port: Option<u16>, protocol: Option<&str>) -> (String, String) {
    let host_port = match port {
        Some(port) if !host.contains(':') => format!("{host}:{port}"),
        _ => host.to_string(),
    };
    let scheme = match protocol {
        Some("https") => "https",
        _ => "http",
    };
    (host_port.clone(), format!("{scheme}://{host_port}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peer_endpoint_normalization() {
        let (key, url) = peer_endpoint("10.0.0.2", Some(3847), None);
        assert_eq!(key, "10.0.0.2:3847");
        assert_eq!(url, "http://10.0.0.2:3847");

        let (key, url) = peer_endpoint("10.0.0.2:4000", Some(3847), Some("https"));
        assert_eq!(key, "10.0.0.2:4000");
        assert_eq!(url, "https://10.0.0.2:4000");
    }

    #[test]
    fn test_inbox_filename_shape() {
        let name = format!(
            "{INBOX_DIR}/2026-01-02T03-04-05-from-{}-{}.md",
            slug("My Laptop"),
            slug("A Great Note")
        );
        assert_eq!(name, "inbox/2026-01-02T03-04-05-from-my-laptop-a-great-note.md");
    }
}

//! The federation query surface.
//!
//! Two families live here. Peer-facing answers are computed from the local
//! index, restricted to the shared subtrees from the peer config. The
//! client-facing fan-out calls those same endpoints on every online peer
//! concurrently, with all-settled semantics: one hung peer never fails the
//! whole answer, it just contributes zero results.

use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use indexmap::IndexMap;
use log::debug;
use tokio::sync::RwLock;

use crate::checksum::checksum;
use crate::document::{DocType, Document};
use crate::error::{Result, VitrumError};
use crate::index::DocumentIndex;
use crate::paths::sanitize_rel_path;
use crate::peers::{PeerClient, PeerLiveStatus, PeerRegistry, PeerState};
use crate::protocol::{
    ChecksumResponse, CrossSearchItem, CrossSearchResponse, PeerDocumentResponse, PeerFileMeta,
    PeerFilesResponse, PeerHelloResponse, PeerResultStat, PeerSearchItem, PeerSearchResponse,
};
use crate::search::SearchFilter;

/// Default and maximum result count for peer-facing search.
pub const DEFAULT_SEARCH_LIMIT: usize = 20;

/// Answers peer queries from the local index and fans client queries out
/// across the federation.
pub struct FederationService {
    index: Arc<RwLock<DocumentIndex>>,
    registry: Arc<PeerRegistry>,
    client: PeerClient,
}

impl FederationService {
    /// Wire up the service.
    pub fn new(
        index: Arc<RwLock<DocumentIndex>>,
        registry: Arc<PeerRegistry>,
        client: PeerClient,
    ) -> FederationService {
        FederationService {
            index,
            registry,
            client,
        }
    }

    /// The hello answer peers receive from this instance.
    pub async fn hello(&self) -> PeerHelloResponse {
        let document_count = self.index.read().await.len();
        self.registry.hello_response(document_count).await
    }

    /// Peer-facing search, restricted to shared subtrees.
    pub async fn shared_search(
        &self,
        query: &str,
        filter: &SearchFilter,
        limit: usize,
    ) -> PeerSearchResponse {
        let self_config = self.registry.self_config().await;
        let shared = self_config.shared_folders.clone();

        let index = self.index.read().await;
        let results: Vec<PeerSearchItem> = index
            .search(query, filter)
            .into_iter()
            .filter(|hit| is_under(&shared, &hit.document.path))
            .take(limit)
            .map(|hit| search_item(&hit.document, hit.score))
            .collect();

        PeerSearchResponse {
            instance_id: self_config.instance_id,
            display_name: self_config.display_name,
            count: results.len(),
            results,
        }
    }

    /// Peer-facing shared file listing.
    pub async fn shared_files(
        &self,
        folder: Option<&str>,
        tag: Option<&str>,
    ) -> PeerFilesResponse {
        let self_config = self.registry.self_config().await;
        let shared = self_config.shared_folders.clone();

        let index = self.index.read().await;
        let files: Vec<PeerFileMeta> = index
            .documents()
            .filter(|doc| is_under(&shared, &doc.path))
            .filter(|doc| folder.map(|f| doc.path.starts_with(f)).unwrap_or(true))
            .filter(|doc| {
                tag.map(|t| doc.tags.iter().any(|dt| dt == t)).unwrap_or(true)
            })
            .map(file_meta)
            .collect();

        PeerFilesResponse {
            instance_id: self_config.instance_id,
            display_name: self_config.display_name,
            count: files.len(),
            files,
        }
    }

    /// Peer-facing checksum answer for one shared document.
    pub async fn shared_checksum(&self, raw_path: &str) -> Result<ChecksumResponse> {
        let doc = self.shared_document_record(raw_path).await?;
        Ok(ChecksumResponse {
            checksum: checksum(&doc.content),
            updated: doc.updated.to_rfc3339(),
        })
    }

    /// Peer-facing full-document answer for one shared document.
    pub async fn shared_document(&self, raw_path: &str) -> Result<PeerDocumentResponse> {
        let doc = self.shared_document_record(raw_path).await?;
        Ok(PeerDocumentResponse {
            checksum: checksum(&doc.content),
            updated: doc.updated.to_rfc3339(),
            path: doc.path,
            title: doc.title,
            frontmatter: doc.frontmatter,
            content: doc.content,
        })
    }

    async fn shared_document_record(&self, raw_path: &str) -> Result<Document> {
        let rel = sanitize_rel_path(raw_path)?;
        if !self.registry.is_shared(&rel).await {
            return Err(VitrumError::Forbidden(rel));
        }
        let index = self.index.read().await;
        index
            .get(&rel)
            .cloned()
            .ok_or(VitrumError::NotFound(rel))
    }

    /// Fan a search out across every online peer and merge the answers.
    ///
    /// Peers that fail or exceed their 5 s budget contribute zero results
    /// but still appear in `peerResults` with their latency.
    pub async fn cross_search(
        &self,
        query: &str,
        doc_type: Option<&str>,
        tag: Option<&str>,
        limit: usize,
    ) -> CrossSearchResponse {
        let peers = self.registry.online_peers().await;
        let total_peers_queried = peers.len();

        let calls = peers.iter().map(|peer| {
            let client = self.client.clone();
            let base_url = peer.base_url();
            async move {
                let started = Instant::now();
                let outcome = client.search(&base_url, query, doc_type, tag, limit).await;
                (started.elapsed().as_millis() as u64, outcome)
            }
        });
        let settled = join_all(calls).await;

        let mut results: Vec<CrossSearchItem> = Vec::new();
        let mut peer_results: IndexMap<String, PeerResultStat> = IndexMap::new();
        let mut total_peers_responded = 0;

        for (peer, (took, outcome)) in peers.iter().zip(settled) {
            let label = peer_label(peer);
            match outcome {
                Ok(answer) => {
                    total_peers_responded += 1;
                    peer_results.insert(
                        label,
                        PeerResultStat {
                            count: answer.results.len(),
                            took,
                        },
                    );
                    results.extend(answer.results.into_iter().map(|item| CrossSearchItem {
                        peer: answer.display_name.clone(),
                        peer_host: peer.host_port(),
                        item,
                    }));
                }
                Err(e) => {
                    debug!("cross-search peer {} failed: {e}", peer.host_port());
                    peer_results.insert(label, PeerResultStat { count: 0, took });
                }
            }
        }

        results.sort_by(|a, b| {
            a.item
                .score
                .partial_cmp(&b.item.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        results.truncate(limit);

        CrossSearchResponse {
            query: query.to_string(),
            results,
            total_peers_queried,
            total_peers_responded,
            peer_results,
        }
    }

    /// Proxy a shared-files listing to one peer. 5 s budget.
    pub async fn cross_files(
        &self,
        peer_host: &str,
        folder: Option<&str>,
        tag: Option<&str>,
    ) -> Result<PeerFilesResponse> {
        let peer = self.online_peer(peer_host).await?;
        self.client.list_files(&peer.base_url(), folder, tag).await
    }

    /// Proxy a full-document fetch to one peer. 5 s budget.
    pub async fn cross_file(&self, peer_host: &str, path: &str) -> Result<PeerDocumentResponse> {
        let peer = self.online_peer(peer_host).await?;
        self.client
            .fetch_document(&peer.base_url(), path, crate::peers::QUERY_BUDGET)
            .await
    }

    async fn online_peer(&self, peer_host: &str) -> Result<PeerLiveStatus> {
        let peer = self
            .registry
            .find(peer_host)
            .await
            .ok_or_else(|| VitrumError::NotFound(format!("unknown peer {peer_host}")))?;
        if peer.status != PeerState::Online {
            return Err(VitrumError::PeerOffline(peer_host.to_string()));
        }
        Ok(peer)
    }
}

fn is_under(shared_folders: &[String], path: &str) -> bool {
    shared_folders
        .iter()
        .any(|prefix| path.starts_with(prefix.as_str()))
}

fn peer_label(peer: &PeerLiveStatus) -> String {
    peer.display_name.clone().unwrap_or_else(|| peer.name.clone())
}

fn search_item(doc: &Document, score: f64) -> PeerSearchItem {
    PeerSearchItem {
        path: doc.path.clone(),
        title: doc.title.clone(),
        doc_type: doc.doc_type,
        tags: doc.tags.clone(),
        score,
        snippet: doc.excerpt.clone(),
    }
}

fn file_meta(doc: &Document) -> PeerFileMeta {
    PeerFileMeta {
        path: doc.path.clone(),
        title: doc.title.clone(),
        doc_type: doc.doc_type,
        tags: doc.tags.clone(),
        updated: doc.updated.to_rfc3339(),
        excerpt: doc.excerpt.clone(),
    }
}

/// Parse an optional `type` query parameter.
pub fn parse_type_filter(label: Option<&str>) -> Result<Option<DocType>> {
    match label {
        None => Ok(None),
        Some(raw) => DocType::parse(raw)
            .map(Some)
            .ok_or_else(|| VitrumError::BadRequest(format!("unknown type '{raw}'"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_under() {
        let shared = vec!["knowledge/".to_string(), "tasks/".to_string()];
        assert!(is_under(&shared, "knowledge/a.md"));
        assert!(is_under(&shared, "tasks/t.md"));
        assert!(!is_under(&shared, "private/a.md"));
    }

    #[test]
    fn test_parse_type_filter() {
        assert_eq!(parse_type_filter(None).unwrap(), None);
        assert_eq!(
            parse_type_filter(Some("task")).unwrap(),
            Some(DocType::Task)
        );
        assert!(parse_type_filter(Some("bogus")).is_err());
    }
}

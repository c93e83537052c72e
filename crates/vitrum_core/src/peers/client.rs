//! Outbound HTTP calls to peer instances.
//!
//! Every call carries its own hard budget via [`tokio::time::timeout`]; an
//! exceeded budget surfaces as [`VitrumError::PeerTimeout`] and leaves no
//! partial state. Non-2xx answers surface as `PeerUpstream`.

use std::time::Duration;

use reqwest::Response;
use serde::de::DeserializeOwned;

use crate::error::{Result, VitrumError};
use crate::protocol::{
    ChecksumResponse, IncomingDocument, PeerDocumentResponse, PeerFilesResponse,
    PeerHelloResponse, PeerSearchResponse, SharedResponse,
};

/// Budget for liveness probes.
pub const HELLO_BUDGET: Duration = Duration::from_secs(3);
/// Budget for per-peer search and listing calls.
pub const QUERY_BUDGET: Duration = Duration::from_secs(5);
/// Budget for origin checksum polls.
pub const CHECKSUM_BUDGET: Duration = Duration::from_secs(5);
/// Budget for full-document transfers (adoption, diff, push).
pub const TRANSFER_BUDGET: Duration = Duration::from_secs(10);

/// HTTP client for peer-to-peer calls.
#[derive(Debug, Clone)]
pub struct PeerClient {
    http: reqwest::Client,
}

impl PeerClient {
    /// Build a client. Connection pooling is shared across all peers.
    pub fn new() -> PeerClient {
        PeerClient {
            http: reqwest::Client::new(),
        }
    }

    /// Probe a peer for liveness and identity. 3 s budget.
    pub async fn hello(&self, base_url: &str) -> Result<PeerHelloResponse> {
        let url = format!("{base_url}/api/federation/hello");
        self.get_json(&url, HELLO_BUDGET).await
    }

    /// Search a peer's shared subtrees. 5 s budget.
    pub async fn search(
        &self,
        base_url: &str,
        query: &str,
        doc_type: Option<&str>,
        tag: Option<&str>,
        limit: usize,
    ) -> Result<PeerSearchResponse> {
        let url = format!("{base_url}/api/federation/search");
        let mut params: Vec<(&str, String)> = vec![
            ("q", query.to_string()),
            ("limit", limit.to_string()),
        ];
        if let Some(t) = doc_type {
            params.push(("type", t.to_string()));
        }
        if let Some(t) = tag {
            params.push(("tag", t.to_string()));
        }
        let request = self.http.get(&url).query(&params);
        self.send_json(request, QUERY_BUDGET).await
    }

    /// List a peer's shared files. 5 s budget.
    pub async fn list_files(
        &self,
        base_url: &str,
        folder: Option<&str>,
        tag: Option<&str>,
    ) -> Result<PeerFilesResponse> {
        let url = format!("{base_url}/api/federation/files");
        let mut params: Vec<(&str, String)> = Vec::new();
        if let Some(f) = folder {
            params.push(("folder", f.to_string()));
        }
        if let Some(t) = tag {
            params.push(("tag", t.to_string()));
        }
        let request = self.http.get(&url).query(&params);
        self.send_json(request, QUERY_BUDGET).await
    }

    /// Fetch one shared document in full. Budget picked by the caller's
    /// use case (transfer vs proxy).
    pub async fn fetch_document(
        &self,
        base_url: &str,
        path: &str,
        budget: Duration,
    ) -> Result<PeerDocumentResponse> {
        let url = format!("{base_url}/api/federation/files/{path}");
        self.get_json(&url, budget).await
    }

    /// Fetch only the checksum of one shared document. 5 s budget.
    pub async fn fetch_checksum(&self, base_url: &str, path: &str) -> Result<ChecksumResponse> {
        let url = format!("{base_url}/api/federation/files/{path}");
        let request = self.http.get(&url).query(&[("checksumOnly", "true")]);
        self.send_json(request, CHECKSUM_BUDGET).await
    }

    /// Push a document to a peer's inbox. 10 s budget.
    pub async fn push_document(
        &self,
        base_url: &str,
        document: &IncomingDocument,
    ) -> Result<serde_json::Value> {
        let url = format!("{base_url}/api/federation/shared");
        let request = self.http.post(&url).json(document);
        self.send_json(request, TRANSFER_BUDGET).await
    }

    /// Send an advisory note to a document's origin. 5 s budget; callers
    /// treat failures as best-effort.
    pub async fn respond(&self, base_url: &str, response: &SharedResponse) -> Result<()> {
        let url = format!("{base_url}/api/federation/shared/respond");
        let request = self.http.post(&url).json(response);
        let reply = self.send(request, QUERY_BUDGET).await?;
        Self::check_status(&reply)?;
        Ok(())
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str, budget: Duration) -> Result<T> {
        self.send_json(self.http.get(url), budget).await
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        budget: Duration,
    ) -> Result<T> {
        let response = self.send(request, budget).await?;
        Self::check_status(&response)?;
        let parsed = tokio::time::timeout(budget, response.json::<T>())
            .await
            .map_err(|_| VitrumError::PeerTimeout {
                secs: budget.as_secs(),
            })??;
        Ok(parsed)
    }

    async fn send(&self, request: reqwest::RequestBuilder, budget: Duration) -> Result<Response> {
        let response = tokio::time::timeout(budget, request.send())
            .await
            .map_err(|_| VitrumError::PeerTimeout {
                secs: budget.as_secs(),
            })??;
        Ok(response)
    }

    fn check_status(response: &Response) -> Result<()> {
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(VitrumError::PeerUpstream {
                status: status.as_u16(),
            })
        }
    }
}

impl Default for PeerClient {
    fn default() -> Self {
        Self::new()
    }
}

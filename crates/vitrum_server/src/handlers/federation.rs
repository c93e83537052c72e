//! Federation endpoints.
//!
//! Peer-facing routes (`hello`, `search`, `files`, `shared`,
//! `shared/respond`) answer from the local index restricted to shared
//! subtrees. Client-facing routes fan out to peers (`cross-*`) or drive
//! the sync service (`adopt`, `send`, `shared/diff`, `shared/resolve`).

use axum::extract::{Path, Query, State};
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;
use serde_json::json;
use vitrum_core::federation::{parse_type_filter, DEFAULT_SEARCH_LIMIT};
use vitrum_core::peers::PeerLiveStatus;
use vitrum_core::protocol::{
    CrossSearchResponse, IncomingDocument, PeerDocumentResponse, PeerFilesResponse,
    PeerHelloResponse, PeerSearchResponse, SharedResponse,
};
use vitrum_core::search::SearchFilter;
use vitrum_core::sync::{AdoptRequest, AdoptResponse, ConflictDiff, ResolveRequest, ResolveResponse};
use vitrum_core::VitrumError;

use crate::error::ApiResult;
use crate::state::AppState;

/// Routes in this module, nested under `/api/federation`.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/peers", get(peers))
        .route("/hello", get(hello))
        .route("/search", get(shared_search))
        .route("/files", get(shared_files))
        .route("/files/{*path}", get(shared_file))
        .route("/cross-search", get(cross_search))
        .route("/cross-files", get(cross_files))
        .route("/cross-file/{*path}", get(cross_file))
        .route("/adopt", post(adopt))
        .route("/send", post(send))
        .route("/shared", post(receive_shared))
        .route("/shared/diff", get(shared_diff))
        .route("/shared/resolve", post(shared_resolve))
        .route("/shared/respond", post(shared_respond))
}

/// GET /api/federation/peers - current peer status table.
async fn peers(State(state): State<AppState>) -> Json<Vec<PeerLiveStatus>> {
    Json(state.engine.registry.snapshot().await)
}

/// GET /api/federation/hello - identity probe answered for peers.
async fn hello(State(state): State<AppState>) -> Json<PeerHelloResponse> {
    Json(state.engine.federation.hello().await)
}

#[derive(Debug, Deserialize)]
struct SearchParams {
    q: Option<String>,
    #[serde(rename = "type")]
    doc_type: Option<String>,
    tag: Option<String>,
    limit: Option<usize>,
}

/// GET /api/federation/search - peer-facing search over shared subtrees.
async fn shared_search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> ApiResult<Json<PeerSearchResponse>> {
    let query = require_query(&params.q)?;
    let filter = SearchFilter {
        doc_type: parse_type_filter(params.doc_type.as_deref())?,
        tag: params.tag.clone(),
    };
    let limit = params.limit.unwrap_or(DEFAULT_SEARCH_LIMIT);
    Ok(Json(
        state
            .engine
            .federation
            .shared_search(query, &filter, limit)
            .await,
    ))
}

#[derive(Debug, Deserialize)]
struct FilesParams {
    folder: Option<String>,
    tag: Option<String>,
}

/// GET /api/federation/files - peer-facing shared file listing.
async fn shared_files(
    State(state): State<AppState>,
    Query(params): Query<FilesParams>,
) -> Json<PeerFilesResponse> {
    Json(
        state
            .engine
            .federation
            .shared_files(params.folder.as_deref(), params.tag.as_deref())
            .await,
    )
}

#[derive(Debug, Deserialize)]
struct SharedFileParams {
    #[serde(rename = "checksumOnly")]
    checksum_only: Option<String>,
}

/// GET /api/federation/files/{path} - one shared document, full or
/// checksum-only. 403 outside shared subtrees.
async fn shared_file(
    State(state): State<AppState>,
    Path(path): Path<String>,
    Query(params): Query<SharedFileParams>,
) -> ApiResult<Json<serde_json::Value>> {
    let checksum_only = params
        .checksum_only
        .as_deref()
        .is_some_and(|v| v == "true" || v == "1");
    if checksum_only {
        let answer = state.engine.federation.shared_checksum(&path).await?;
        Ok(Json(serde_json::to_value(answer).map_err(VitrumError::Json)?))
    } else {
        let answer = state.engine.federation.shared_document(&path).await?;
        Ok(Json(serde_json::to_value(answer).map_err(VitrumError::Json)?))
    }
}

/// GET /api/federation/cross-search - fan a search out to online peers.
async fn cross_search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> ApiResult<Json<CrossSearchResponse>> {
    let query = require_query(&params.q)?;
    let limit = params.limit.unwrap_or(DEFAULT_SEARCH_LIMIT);
    Ok(Json(
        state
            .engine
            .federation
            .cross_search(
                query,
                params.doc_type.as_deref(),
                params.tag.as_deref(),
                limit,
            )
            .await,
    ))
}

#[derive(Debug, Deserialize)]
struct CrossFilesParams {
    peer: Option<String>,
    folder: Option<String>,
    tag: Option<String>,
}

/// GET /api/federation/cross-files - proxy a listing to one peer.
async fn cross_files(
    State(state): State<AppState>,
    Query(params): Query<CrossFilesParams>,
) -> ApiResult<Json<PeerFilesResponse>> {
    let peer = params
        .peer
        .as_deref()
        .ok_or_else(|| VitrumError::BadRequest("missing 'peer' parameter".to_string()))?;
    Ok(Json(
        state
            .engine
            .federation
            .cross_files(peer, params.folder.as_deref(), params.tag.as_deref())
            .await?,
    ))
}

#[derive(Debug, Deserialize)]
struct CrossFileParams {
    peer: Option<String>,
}

/// GET /api/federation/cross-file/{path} - proxy a document fetch to one
/// peer. 404 when the peer is unknown or offline, 504 on timeout.
async fn cross_file(
    State(state): State<AppState>,
    Path(path): Path<String>,
    Query(params): Query<CrossFileParams>,
) -> ApiResult<Json<PeerDocumentResponse>> {
    let peer = params
        .peer
        .as_deref()
        .ok_or_else(|| VitrumError::BadRequest("missing 'peer' parameter".to_string()))?;
    Ok(Json(state.engine.federation.cross_file(peer, &path).await?))
}

/// POST /api/federation/adopt - copy a peer's document into the workspace.
async fn adopt(
    State(state): State<AppState>,
    Json(request): Json<AdoptRequest>,
) -> ApiResult<Json<AdoptResponse>> {
    Ok(Json(state.engine.sync.adopt(request).await?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendRequest {
    peer_host: String,
    path: String,
    #[serde(default)]
    message: Option<String>,
}

/// POST /api/federation/send - push a local document to a peer's inbox.
async fn send(
    State(state): State<AppState>,
    Json(request): Json<SendRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let reply = state
        .engine
        .sync
        .send_document(&request.peer_host, &request.path, request.message)
        .await?;
    Ok(Json(json!({ "status": "sent", "peer": request.peer_host, "reply": reply })))
}

/// POST /api/federation/shared - peer-facing: accept a pushed document.
async fn receive_shared(
    State(state): State<AppState>,
    Json(incoming): Json<IncomingDocument>,
) -> ApiResult<Json<serde_json::Value>> {
    let path = state.engine.sync.receive(incoming).await?;
    Ok(Json(json!({ "status": "received", "path": path })))
}

#[derive(Debug, Deserialize)]
struct DiffParams {
    path: Option<String>,
}

/// GET /api/federation/shared/diff - two-way conflict diff.
async fn shared_diff(
    State(state): State<AppState>,
    Query(params): Query<DiffParams>,
) -> ApiResult<Json<ConflictDiff>> {
    let path = params
        .path
        .as_deref()
        .ok_or_else(|| VitrumError::BadRequest("missing 'path' parameter".to_string()))?;
    Ok(Json(state.engine.sync.conflict_diff(path).await?))
}

/// POST /api/federation/shared/resolve - resolve a divergent document.
async fn shared_resolve(
    State(state): State<AppState>,
    Json(request): Json<ResolveRequest>,
) -> ApiResult<Json<ResolveResponse>> {
    Ok(Json(state.engine.sync.resolve(request).await?))
}

/// POST /api/federation/shared/respond - peer-facing: record an advisory
/// note in the inbox.
async fn shared_respond(
    State(state): State<AppState>,
    Json(response): Json<SharedResponse>,
) -> ApiResult<Json<serde_json::Value>> {
    let path = state.engine.sync.receive_response(response).await?;
    Ok(Json(json!({ "status": "received", "path": path })))
}

fn require_query(q: &Option<String>) -> Result<&str, VitrumError> {
    q.as_deref()
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .ok_or_else(|| VitrumError::BadRequest("missing query parameter 'q'".to_string()))
}

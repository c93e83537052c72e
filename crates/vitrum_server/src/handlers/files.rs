//! Workspace document endpoints: listing, reading, writing, search, graph,
//! and engine status.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};
use serde_json::json;
use vitrum_core::document::{DocType, Document};
use vitrum_core::federation::parse_type_filter;
use vitrum_core::frontmatter::Frontmatter;
use vitrum_core::search::SearchFilter;
use vitrum_core::VitrumError;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Default search result cap.
const DEFAULT_LIMIT: usize = 20;

/// Routes in this module.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/files", get(list_files))
        .route("/files/{*path}", get(get_file).put(put_file))
        .route("/search", get(search))
        .route("/graph", get(graph))
        .route("/graph/neighbors/{*path}", get(neighbors))
        .route("/status", get(status))
        .route("/status/reindex", post(reindex))
        .route("/health", get(health))
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    #[serde(rename = "type")]
    doc_type: Option<String>,
    tag: Option<String>,
    folder: Option<String>,
}

/// Listing and search projection of a document.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FileSummary {
    path: String,
    title: String,
    #[serde(rename = "type")]
    doc_type: DocType,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<String>,
    tags: Vec<String>,
    created: String,
    updated: String,
    excerpt: String,
}

impl From<&Document> for FileSummary {
    fn from(doc: &Document) -> Self {
        FileSummary {
            path: doc.path.clone(),
            title: doc.title.clone(),
            doc_type: doc.doc_type,
            status: doc.status.clone(),
            tags: doc.tags.clone(),
            created: doc.created.to_rfc3339(),
            updated: doc.updated.to_rfc3339(),
            excerpt: doc.excerpt.clone(),
        }
    }
}

/// GET /api/files - list documents with optional filters.
async fn list_files(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Vec<FileSummary>>> {
    let doc_type = parse_type_filter(query.doc_type.as_deref())?;
    let index = state.engine.index.read().await;
    let files: Vec<FileSummary> = index
        .documents()
        .filter(|doc| doc_type.map(|t| doc.doc_type == t).unwrap_or(true))
        .filter(|doc| {
            query
                .tag
                .as_ref()
                .map(|t| doc.tags.iter().any(|dt| dt == t))
                .unwrap_or(true)
        })
        .filter(|doc| {
            query
                .folder
                .as_ref()
                .map(|f| doc.path.starts_with(f.as_str()))
                .unwrap_or(true)
        })
        .map(FileSummary::from)
        .collect();
    Ok(Json(files))
}

/// GET /api/files/{path} - one document with its resolved backlinks.
async fn get_file(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> ApiResult<Json<Document>> {
    let index = state.engine.index.read().await;
    let doc = index
        .get(&path)
        .cloned()
        .ok_or(VitrumError::NotFound(path))?;
    Ok(Json(doc))
}

#[derive(Debug, Deserialize)]
struct PutFileRequest {
    #[serde(default)]
    frontmatter: Option<Frontmatter>,
    content: String,
}

/// PUT /api/files/{path} - replace an indexed document on disk.
///
/// Unknown paths are a no-op; the watcher absorbs the write.
async fn put_file(
    State(state): State<AppState>,
    Path(path): Path<String>,
    Json(body): Json<PutFileRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let updated = state
        .engine
        .write_document(&path, body.frontmatter, &body.content)
        .await?;
    Ok(Json(json!({ "path": path, "updated": updated })))
}

#[derive(Debug, Deserialize)]
struct SearchParams {
    q: Option<String>,
    #[serde(rename = "type")]
    doc_type: Option<String>,
    tag: Option<String>,
    limit: Option<usize>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchResultItem {
    #[serde(flatten)]
    summary: FileSummary,
    score: f64,
}

/// GET /api/search - ranked fuzzy search.
async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> ApiResult<Json<serde_json::Value>> {
    let query = params
        .q
        .as_deref()
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .ok_or_else(|| VitrumError::BadRequest("missing query parameter 'q'".to_string()))?;
    let filter = SearchFilter {
        doc_type: parse_type_filter(params.doc_type.as_deref())?,
        tag: params.tag.clone(),
    };
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT);

    let index = state.engine.index.read().await;
    let results: Vec<SearchResultItem> = index
        .search(query, &filter)
        .into_iter()
        .take(limit)
        .map(|hit| SearchResultItem {
            summary: FileSummary::from(&hit.document),
            score: hit.score,
        })
        .collect();

    Ok(Json(json!({
        "query": query,
        "count": results.len(),
        "results": results,
    })))
}

#[derive(Debug, Deserialize)]
struct GraphQuery {
    folder: Option<String>,
}

/// GET /api/graph - the full link graph.
async fn graph(
    State(state): State<AppState>,
    Query(query): Query<GraphQuery>,
) -> Json<vitrum_core::index::Graph> {
    let index = state.engine.index.read().await;
    Json(index.graph(query.folder.as_deref()))
}

/// GET /api/graph/neighbors/{path} - one document's neighborhood.
async fn neighbors(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> ApiResult<Json<vitrum_core::index::Graph>> {
    let index = state.engine.index.read().await;
    let graph = index
        .neighbors(&path)
        .ok_or(VitrumError::NotFound(path))?;
    Ok(Json(graph))
}

/// GET /api/status - engine status.
async fn status(State(state): State<AppState>) -> Json<serde_json::Value> {
    let stats = state.engine.index.read().await.stats();
    let peers = state.engine.registry.snapshot().await;
    let online = peers
        .iter()
        .filter(|p| p.status == vitrum_core::peers::PeerState::Online)
        .count();
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime": state.started.elapsed().as_secs(),
        "index": stats,
        "peers": { "configured": peers.len(), "online": online },
        "subscribers": state.engine.bus.subscriber_count(),
    }))
}

/// POST /api/status/reindex - full rebuild.
async fn reindex(State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    let stats = state.engine.reindex().await.map_err(ApiError::from)?;
    Ok(Json(json!({ "status": "ok", "index": stats })))
}

/// GET /api/health - liveness probe.
async fn health() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({ "status": "ok" })))
}

//! Project working-file endpoints.
//!
//! Projects live under `<root>/projects/<name>/` and hold arbitrary files,
//! most of which the index deliberately ignores. These endpoints expose
//! them raw for project-aware tooling.

use std::fs;
use std::path::Path as FsPath;

use axum::extract::{Path, State};
use axum::response::Json;
use axum::routing::get;
use axum::Router;
use serde::{Deserialize, Serialize};
use serde_json::json;
use vitrum_core::paths::{sanitize_rel_path, to_abs};
use vitrum_core::VitrumError;

use crate::error::ApiResult;
use crate::state::AppState;

/// Routes in this module, nested under `/api/projects`.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_projects))
        .route("/{name}/tree", get(project_tree))
        .route(
            "/{name}/file/{*path}",
            get(get_project_file).put(put_project_file),
        )
}

/// One entry in a project file tree.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TreeNode {
    name: String,
    path: String,
    kind: NodeKind,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    children: Vec<TreeNode>,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "lowercase")]
enum NodeKind {
    Dir,
    File,
}

/// GET /api/projects - the project names.
async fn list_projects(State(state): State<AppState>) -> ApiResult<Json<Vec<String>>> {
    let projects_dir = state.engine.root().join("projects");
    let mut names = Vec::new();
    if projects_dir.is_dir() {
        for entry in fs::read_dir(&projects_dir).map_err(VitrumError::Io)? {
            let entry = entry.map_err(VitrumError::Io)?;
            let name = entry.file_name().to_string_lossy().to_string();
            if entry.file_type().map(|t| t.is_dir()).unwrap_or(false) && !name.starts_with('.') {
                names.push(name);
            }
        }
    }
    names.sort();
    Ok(Json(names))
}

/// GET /api/projects/{name}/tree - recursive file listing.
async fn project_tree(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<TreeNode>> {
    let name = sanitize_rel_path(&name)?;
    let project_dir = state.engine.root().join("projects").join(&name);
    if !project_dir.is_dir() {
        return Err(VitrumError::NotFound(format!("project {name}")).into());
    }
    let tree = build_tree(&project_dir, &name, "")?;
    Ok(Json(tree))
}

fn build_tree(dir: &FsPath, name: &str, rel: &str) -> Result<TreeNode, VitrumError> {
    let mut children = Vec::new();
    let mut entries: Vec<_> = fs::read_dir(dir)
        .map_err(VitrumError::Io)?
        .filter_map(|e| e.ok())
        .collect();
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let child_name = entry.file_name().to_string_lossy().to_string();
        if child_name.starts_with('.') {
            continue;
        }
        let child_rel = if rel.is_empty() {
            child_name.clone()
        } else {
            format!("{rel}/{child_name}")
        };
        let file_type = entry.file_type().map_err(VitrumError::Io)?;
        if file_type.is_dir() {
            children.push(build_tree(&entry.path(), &child_name, &child_rel)?);
        } else {
            children.push(TreeNode {
                name: child_name,
                path: child_rel,
                kind: NodeKind::File,
                children: Vec::new(),
            });
        }
    }

    Ok(TreeNode {
        name: name.to_string(),
        path: rel.to_string(),
        kind: NodeKind::Dir,
        children,
    })
}

/// GET /api/projects/{name}/file/{path} - raw file content.
async fn get_project_file(
    State(state): State<AppState>,
    Path((name, path)): Path<(String, String)>,
) -> ApiResult<Json<serde_json::Value>> {
    let abs = project_file_path(&state, &name, &path)?;
    let content = fs::read_to_string(&abs).map_err(|_| {
        VitrumError::NotFound(format!("projects/{name}/{path}"))
    })?;
    Ok(Json(json!({ "path": path, "content": content })))
}

#[derive(Debug, Deserialize)]
struct PutProjectFileRequest {
    content: String,
}

/// PUT /api/projects/{name}/file/{path} - write raw file content.
async fn put_project_file(
    State(state): State<AppState>,
    Path((name, path)): Path<(String, String)>,
    Json(body): Json<PutProjectFileRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let abs = project_file_path(&state, &name, &path)?;
    if let Some(parent) = abs.parent() {
        fs::create_dir_all(parent).map_err(VitrumError::Io)?;
    }
    fs::write(&abs, &body.content).map_err(|e| VitrumError::FileWrite {
        path: abs.clone(),
        source: e,
    })?;
    Ok(Json(json!({ "path": path, "updated": true })))
}

fn project_file_path(
    state: &AppState,
    name: &str,
    path: &str,
) -> Result<std::path::PathBuf, VitrumError> {
    let name = sanitize_rel_path(name)?;
    let rel = sanitize_rel_path(path)?;
    Ok(to_abs(
        &state.engine.root().join("projects").join(name),
        &rel,
    ))
}

//! Router-level tests against a fixture workspace.

use std::fs;
use std::path::Path;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::Value;
use tower::util::ServiceExt;
use vitrum_core::Engine;
use vitrum_server::{app, AppState};

fn write(root: &Path, rel: &str, raw: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, raw).unwrap();
}

async fn fixture() -> (tempfile::TempDir, axum::Router) {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "knowledge/rust.md",
        "---\ntitle: Rust Notes\ntags:\n  - rust\n---\nsee [[tasks/learn.md]]",
    );
    write(
        dir.path(),
        "tasks/learn.md",
        "---\ntitle: Learn Rust\ntype: task\nstatus: active\n---\npractice",
    );
    write(dir.path(), "projects/alpha/README.md", "# Alpha");
    write(dir.path(), "projects/alpha/src/notes.txt", "scratch");

    let engine = Engine::bootstrap(dir.path().to_path_buf()).await.unwrap();
    let router = app(AppState::new(engine));
    (dir, router)
}

async fn get_json(router: &axum::Router, uri: &str) -> (StatusCode, Value) {
    let response = router
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), 1 << 20)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn test_health_and_status() {
    let (_dir, router) = fixture().await;

    let (status, body) = get_json(&router, "/api/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, body) = get_json(&router, "/api/status").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["index"]["documentCount"], 3);
    assert_eq!(body["peers"]["configured"], 0);
}

#[tokio::test]
async fn test_list_and_filter_files() {
    let (_dir, router) = fixture().await;

    let (status, body) = get_json(&router, "/api/files").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 3);

    let (_, body) = get_json(&router, "/api/files?type=task").await;
    let files = body.as_array().unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0]["path"], "tasks/learn.md");
    assert_eq!(files[0]["status"], "active");

    let (_, body) = get_json(&router, "/api/files?tag=rust").await;
    assert_eq!(body.as_array().unwrap().len(), 1);

    let (status, _) = get_json(&router, "/api/files?type=bogus").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_get_file_with_backlinks() {
    let (_dir, router) = fixture().await;

    let (status, body) = get_json(&router, "/api/files/tasks/learn.md").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["title"], "Learn Rust");
    assert_eq!(body["backlinks"][0], "knowledge/rust.md");

    let (status, body) = get_json(&router, "/api/files/nope/missing.md").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not-found");
}

#[tokio::test]
async fn test_search_endpoint() {
    let (_dir, router) = fixture().await;

    let (status, body) = get_json(&router, "/api/search?q=rust").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["count"].as_u64().unwrap() >= 1);
    let results = body["results"].as_array().unwrap();
    assert!(results[0]["score"].as_f64().unwrap() <= 1.0);

    let (status, body) = get_json(&router, "/api/search").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "bad-request");
}

#[tokio::test]
async fn test_graph_endpoints() {
    let (_dir, router) = fixture().await;

    let (status, body) = get_json(&router, "/api/graph").await;
    assert_eq!(status, StatusCode::OK);
    let links = body["links"].as_array().unwrap();
    assert!(links.iter().any(|l| {
        l["source"] == "knowledge/rust.md" && l["target"] == "tasks/learn.md"
    }));

    let (status, body) = get_json(&router, "/api/graph/neighbors/tasks/learn.md").await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<&str> = body["nodes"]
        .as_array()
        .unwrap()
        .iter()
        .map(|n| n["id"].as_str().unwrap())
        .collect();
    assert!(ids.contains(&"tasks/learn.md"));
    assert!(ids.contains(&"knowledge/rust.md"));
}

#[tokio::test]
async fn test_projects_surface() {
    let (_dir, router) = fixture().await;

    let (status, body) = get_json(&router, "/api/projects").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap(), &[Value::String("alpha".into())]);

    let (status, body) = get_json(&router, "/api/projects/alpha/tree").await;
    assert_eq!(status, StatusCode::OK);
    let children = body["children"].as_array().unwrap();
    assert!(children.iter().any(|c| c["name"] == "README.md"));
    assert!(children.iter().any(|c| c["name"] == "src"));

    let (status, body) = get_json(&router, "/api/projects/alpha/file/src/notes.txt").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["content"], "scratch");

    let (status, _) = get_json(&router, "/api/projects/nope/tree").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_federation_hello_and_shared_guard() {
    let (_dir, router) = fixture().await;

    let (status, body) = get_json(&router, "/api/federation/hello").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["online"], true);
    assert_eq!(body["apiVersion"], "1");
    assert_eq!(body["documentCount"], 3);

    // knowledge/ is shared by the synthesized config; tasks/ is not.
    let (status, body) = get_json(&router, "/api/federation/files/knowledge/rust.md").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["path"], "knowledge/rust.md");
    assert!(body["checksum"].as_str().unwrap().starts_with("sha256:"));

    let (status, body) =
        get_json(&router, "/api/federation/files/knowledge/rust.md?checksumOnly=true").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["checksum"].as_str().unwrap().starts_with("sha256:"));
    assert!(body.get("content").is_none());

    let (status, body) = get_json(&router, "/api/federation/files/tasks/learn.md").await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "forbidden");
}

#[tokio::test]
async fn test_federation_shared_search_scope() {
    let (_dir, router) = fixture().await;

    let (status, body) = get_json(&router, "/api/federation/search?q=rust").await;
    assert_eq!(status, StatusCode::OK);
    let results = body["results"].as_array().unwrap();
    assert!(!results.is_empty());
    assert!(results
        .iter()
        .all(|r| r["path"].as_str().unwrap().starts_with("knowledge/")));
}

#[tokio::test]
async fn test_cross_search_without_peers() {
    let (_dir, router) = fixture().await;

    let (status, body) = get_json(&router, "/api/federation/cross-search?q=rust").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["totalPeersQueried"], 0);
    assert_eq!(body["totalPeersResponded"], 0);
    assert_eq!(body["results"].as_array().unwrap().len(), 0);
}

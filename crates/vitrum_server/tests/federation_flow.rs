//! Two-instance federation test: probe, adopt, diverge, resolve.
//!
//! Spins up a full origin instance (engine + router on an ephemeral port)
//! and drives a second engine against it through the real peer client.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use vitrum_core::checksum::checksum;
use vitrum_core::frontmatter;
use vitrum_core::peers::PeerState;
use vitrum_core::sync::{AdoptRequest, FederationMeta, ResolveAction, ResolveRequest, SyncStatus};
use vitrum_core::Engine;
use vitrum_server::{app, AppState};

fn write(root: &Path, rel: &str, raw: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, raw).unwrap();
}

async fn wait_for(what: &str, mut check: impl AsyncFnMut() -> bool) {
    for _ in 0..100 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    panic!("timed out waiting for {what}");
}

/// Boot an engine plus HTTP surface; return the engine and its port.
async fn serve_instance(root: &Path) -> (Arc<Engine>, u16) {
    let engine = Engine::bootstrap(root.to_path_buf()).await.unwrap();
    let router = app(AppState::new(engine.clone()));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    (engine, port)
}

fn meta_of(root: &Path, rel: &str) -> FederationMeta {
    let raw = fs::read_to_string(root.join(rel)).unwrap();
    let parts = frontmatter::parse(&raw).unwrap();
    FederationMeta::from_frontmatter(&parts.frontmatter).expect("federation block present")
}

#[tokio::test(flavor = "multi_thread")]
async fn test_adopt_diverge_and_resolve() {
    // Origin instance A shares knowledge/.
    let dir_a = tempfile::tempdir().unwrap();
    write(dir_a.path(), "knowledge/x.md", "hello");
    let (engine_a, port_a) = serve_instance(dir_a.path()).await;
    let id_a = engine_a.registry.self_config().await.instance_id;

    // Instance B is configured to peer with A.
    let dir_b = tempfile::tempdir().unwrap();
    write(
        dir_b.path(),
        ".vitrum-peers.json",
        &format!(
            r#"{{"self":{{"instanceId":"b-instance","displayName":"b","sharedFolders":["knowledge/"]}},
                "peers":[{{"name":"a","host":"127.0.0.1","port":{port_a},"protocol":"http"}}]}}"#
        ),
    );
    let engine_b = Engine::bootstrap(dir_b.path().to_path_buf()).await.unwrap();

    // Probe A until it is online.
    wait_for("peer A online", async || {
        engine_b.registry.probe_cycle().await;
        engine_b
            .registry
            .find(&format!("127.0.0.1:{port_a}"))
            .await
            .is_some_and(|p| p.status == PeerState::Online)
    })
    .await;

    // Adopt knowledge/x.md from A.
    let adoption = engine_b
        .sync
        .adopt(AdoptRequest {
            peer_id: id_a.clone(),
            peer_host: format!("127.0.0.1:{port_a}"),
            peer_port: None,
            peer_protocol: None,
            peer_name: Some("a".to_string()),
            source_path: "knowledge/x.md".to_string(),
            target_path: None,
        })
        .await
        .unwrap();

    assert_eq!(adoption.local_path, "knowledge/x.md");
    assert_eq!(adoption.checksum, checksum("hello"));

    let local_raw = fs::read_to_string(dir_b.path().join("knowledge/x.md")).unwrap();
    assert_eq!(frontmatter::body(&local_raw), "hello");
    let meta = meta_of(dir_b.path(), "knowledge/x.md");
    assert_eq!(meta.sync_status, SyncStatus::Synced);
    assert_eq!(meta.origin_checksum, checksum("hello"));
    assert_eq!(meta.local_checksum, checksum("hello"));
    assert_eq!(meta.origin_path, "knowledge/x.md");

    // Wait for B's watcher to absorb the adopted file.
    wait_for("adopted file indexed", async || {
        engine_b.index.read().await.contains("knowledge/x.md")
    })
    .await;

    // Local edit on B: synced -> local-modified.
    let parts = frontmatter::parse(&local_raw).unwrap();
    let edited = frontmatter::serialize(&parts.frontmatter, "hello world").unwrap();
    fs::write(dir_b.path().join("knowledge/x.md"), edited).unwrap();

    wait_for("local-modified", async || {
        engine_b
            .sync
            .adopted_documents()
            .await
            .iter()
            .any(|(path, meta)| {
                path == "knowledge/x.md" && meta.sync_status == SyncStatus::LocalModified
            })
    })
    .await;
    let meta = meta_of(dir_b.path(), "knowledge/x.md");
    assert_eq!(meta.local_checksum, checksum("hello world"));
    assert_eq!(meta.origin_checksum, checksum("hello"));

    // Origin changes on A: the next poll flips B into conflict.
    write(dir_a.path(), "knowledge/x.md", "hello there");
    wait_for("origin reindexed", async || {
        engine_a
            .index
            .read()
            .await
            .get("knowledge/x.md")
            .is_some_and(|doc| doc.content == "hello there")
    })
    .await;

    wait_for("conflict", async || {
        engine_b.sync.poll_origins().await;
        meta_of(dir_b.path(), "knowledge/x.md").sync_status == SyncStatus::Conflict
    })
    .await;
    let meta = meta_of(dir_b.path(), "knowledge/x.md");
    assert_eq!(meta.origin_checksum, checksum("hello there"));

    // The diff shows both sides; no base is retained.
    let diff = engine_b.sync.conflict_diff("knowledge/x.md").await.unwrap();
    assert_eq!(diff.local_content, "hello world");
    assert_eq!(diff.origin_content, "hello there");
    assert_eq!(diff.base_content, "");

    // Resolve by accepting the origin.
    let resolved = engine_b
        .sync
        .resolve(ResolveRequest {
            path: "knowledge/x.md".to_string(),
            action: ResolveAction::AcceptOrigin,
            merged_content: None,
            comment: None,
        })
        .await
        .unwrap();
    assert_eq!(resolved.status, SyncStatus::Synced);

    let raw = fs::read_to_string(dir_b.path().join("knowledge/x.md")).unwrap();
    assert_eq!(frontmatter::body(&raw), "hello there");
    let meta = meta_of(dir_b.path(), "knowledge/x.md");
    assert_eq!(meta.sync_status, SyncStatus::Synced);
    assert_eq!(meta.local_checksum, checksum("hello there"));
    assert_eq!(meta.origin_checksum, checksum("hello there"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_cross_search_and_shared_guards() {
    let dir_a = tempfile::tempdir().unwrap();
    write(
        dir_a.path(),
        "knowledge/rust.md",
        "---\ntitle: Rust Notes\ntags:\n  - rust\n---\nlearning rust",
    );
    write(dir_a.path(), "private/secret.md", "---\ntitle: Secret\n---\nrust secrets");
    let (_engine_a, port_a) = serve_instance(dir_a.path()).await;

    let dir_b = tempfile::tempdir().unwrap();
    write(
        dir_b.path(),
        ".vitrum-peers.json",
        &format!(
            r#"{{"self":{{"instanceId":"b2","displayName":"b2","sharedFolders":["knowledge/"]}},
                "peers":[{{"name":"a","host":"127.0.0.1","port":{port_a},"protocol":"http"}}]}}"#
        ),
    );
    let engine_b = Engine::bootstrap(dir_b.path().to_path_buf()).await.unwrap();

    wait_for("peer A online", async || {
        engine_b.registry.probe_cycle().await;
        !engine_b.registry.online_peers().await.is_empty()
    })
    .await;

    // Fan-out search reaches A but only its shared subtree.
    let answer = engine_b.federation.cross_search("rust", None, None, 20).await;
    assert_eq!(answer.total_peers_queried, 1);
    assert_eq!(answer.total_peers_responded, 1);
    assert!(!answer.results.is_empty());
    assert!(answer.results.iter().all(|r| r.item.path.starts_with("knowledge/")));
    assert!(
        answer
            .results
            .windows(2)
            .all(|pair| pair[0].item.score <= pair[1].item.score)
    );

    // Direct fetch of a non-shared path is refused by the origin.
    let err = engine_b
        .federation
        .cross_file(&format!("127.0.0.1:{port_a}"), "private/secret.md")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "peer-upstream-error");

    // Fetching through an unknown peer is not-found.
    let err = engine_b
        .federation
        .cross_file("10.9.9.9:1", "knowledge/rust.md")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "not-found");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_send_lands_in_peer_inbox() {
    let dir_a = tempfile::tempdir().unwrap();
    let (engine_a, port_a) = serve_instance(dir_a.path()).await;

    let dir_b = tempfile::tempdir().unwrap();
    write(
        dir_b.path(),
        ".vitrum-peers.json",
        &format!(
            r#"{{"self":{{"instanceId":"b3","displayName":"Bee Three","sharedFolders":["knowledge/"]}},
                "peers":[{{"name":"a","host":"127.0.0.1","port":{port_a},"protocol":"http"}}]}}"#
        ),
    );
    write(
        dir_b.path(),
        "knowledge/tip.md",
        "---\ntitle: A Tip\ntags:\n  - share\n---\nuseful content",
    );
    let engine_b = Engine::bootstrap(dir_b.path().to_path_buf()).await.unwrap();

    wait_for("peer A online", async || {
        engine_b.registry.probe_cycle().await;
        !engine_b.registry.online_peers().await.is_empty()
    })
    .await;

    engine_b
        .sync
        .send_document(
            &format!("127.0.0.1:{port_a}"),
            "knowledge/tip.md",
            Some("thought of you".to_string()),
        )
        .await
        .unwrap();

    // The document lands under inbox/ on A with the sender recorded.
    let inbox = dir_a.path().join("inbox");
    let entries: Vec<_> = fs::read_dir(&inbox).unwrap().filter_map(|e| e.ok()).collect();
    assert_eq!(entries.len(), 1);
    let name = entries[0].file_name().to_string_lossy().to_string();
    assert!(name.contains("-from-bee-three-a-tip"), "got {name}");

    let raw = fs::read_to_string(entries[0].path()).unwrap();
    let parts = frontmatter::parse(&raw).unwrap();
    assert_eq!(
        frontmatter::get_str(&parts.frontmatter, "type"),
        Some("inbox")
    );
    assert_eq!(
        frontmatter::get_str(&parts.frontmatter, "source"),
        Some("peer")
    );
    assert_eq!(
        frontmatter::get_str(&parts.frontmatter, "original-path"),
        Some("knowledge/tip.md")
    );
    assert!(parts.content.starts_with("> thought of you\n\nuseful content"));

    // The origin announced the delivery on its bus... which its own
    // watcher also reports; either way the file is indexed eventually.
    wait_for("inbox file indexed on A", async || {
        engine_a
            .index
            .read()
            .await
            .documents()
            .any(|doc| doc.path.starts_with("inbox/"))
    })
    .await;
}

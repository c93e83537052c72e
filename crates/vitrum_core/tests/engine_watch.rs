//! Engine-level tests: build, watch, and live-reload over a real
//! filesystem.

use std::fs;
use std::path::Path;
use std::time::Duration;

use vitrum_core::bus::BusEvent;
use vitrum_core::Engine;

fn write(root: &Path, rel: &str, raw: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, raw).unwrap();
}

/// Poll until `check` passes or the budget runs out.
async fn wait_for(what: &str, mut check: impl AsyncFnMut() -> bool) {
    for _ in 0..100 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    panic!("timed out waiting for {what}");
}

#[tokio::test]
async fn test_bootstrap_indexes_existing_files() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "knowledge/a.md", "# A\nsee [[b]]");
    write(dir.path(), "knowledge/b.md", "# B");

    let engine = Engine::bootstrap(dir.path().to_path_buf()).await.unwrap();
    let index = engine.index.read().await;
    assert_eq!(index.len(), 2);
    assert_eq!(
        index.get("knowledge/b.md").unwrap().backlinks,
        vec!["knowledge/a.md"]
    );
}

#[tokio::test]
async fn test_watcher_feeds_index_and_bus() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "knowledge/a.md", "# A");

    let engine = Engine::bootstrap(dir.path().to_path_buf()).await.unwrap();
    let mut events = engine.bus.subscribe();

    // Add
    write(dir.path(), "knowledge/new.md", "# New\nlinks [[a]]");
    wait_for("new file to be indexed", async || {
        engine.index.read().await.contains("knowledge/new.md")
    })
    .await;
    let emission = tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("bus event within budget")
        .unwrap();
    assert!(matches!(emission.event, BusEvent::Update { ref path } if path == "knowledge/new.md"));

    // The new link shows up as a backlink on the target.
    wait_for("backlink recompute", async || {
        engine
            .index
            .read()
            .await
            .get("knowledge/a.md")
            .is_some_and(|doc| doc.backlinks.contains(&"knowledge/new.md".to_string()))
    })
    .await;

    // Change
    write(dir.path(), "knowledge/new.md", "# New Title");
    wait_for("title update", async || {
        engine
            .index
            .read()
            .await
            .get("knowledge/new.md")
            .is_some_and(|doc| doc.title == "New Title")
    })
    .await;

    // Remove
    fs::remove_file(dir.path().join("knowledge/new.md")).unwrap();
    wait_for("removal", async || {
        !engine.index.read().await.contains("knowledge/new.md")
    })
    .await;
}

#[tokio::test]
async fn test_reindex_emits_reload() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "knowledge/a.md", "# A");

    let engine = Engine::bootstrap(dir.path().to_path_buf()).await.unwrap();
    let mut events = engine.bus.subscribe();

    let stats = engine.reindex().await.unwrap();
    assert_eq!(stats.document_count, 1);

    let emission = tokio::time::timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("reload within budget")
        .unwrap();
    assert!(matches!(emission.event, BusEvent::Reload));
}

#[tokio::test]
async fn test_write_document_is_noop_for_unknown_path() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "knowledge/a.md", "# A");

    let engine = Engine::bootstrap(dir.path().to_path_buf()).await.unwrap();
    let updated = engine
        .write_document("knowledge/missing.md", None, "body")
        .await
        .unwrap();
    assert!(!updated);
    assert!(!dir.path().join("knowledge/missing.md").exists());

    let updated = engine
        .write_document("knowledge/a.md", None, "replaced body")
        .await
        .unwrap();
    assert!(updated);
    let raw = fs::read_to_string(dir.path().join("knowledge/a.md")).unwrap();
    assert_eq!(raw, "replaced body");
}

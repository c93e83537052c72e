//! Debounced workspace observation.
//!
//! Watches the workspace root recursively and forwards markdown changes
//! into a channel drained by the engine. The debouncer tracks each file
//! independently, so a burst of writes to one path coalesces into a single
//! event without delaying events for other paths. Classification into
//! add/change/remove happens in the drain task, which is the only writer
//! of the index.

use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{debug, error};
use notify_debouncer_full::{
    new_debouncer,
    notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher},
    DebounceEventResult, Debouncer, FileIdMap,
};
use tokio::sync::mpsc::UnboundedSender;

use crate::error::Result;

/// Debounce window per path.
const DEBOUNCE_WINDOW: Duration = Duration::from_millis(100);

/// Keeps the underlying notify watcher alive.
pub struct WorkspaceWatcher {
    _debouncer: Debouncer<RecommendedWatcher, FileIdMap>,
}

/// Start watching `root`, sending debounced markdown paths into `tx`.
///
/// Only `*.md` files below non-hidden paths generate events. The watcher
/// itself does not classify; the drain side decides add/change/remove by
/// consulting the index and the filesystem.
pub fn watch(root: &Path, tx: UnboundedSender<PathBuf>) -> Result<WorkspaceWatcher> {
    let watch_root = root.to_path_buf();
    let mut debouncer = new_debouncer(
        DEBOUNCE_WINDOW,
        None,
        move |result: DebounceEventResult| match result {
            Ok(events) => {
                let mut batch: Vec<PathBuf> = Vec::new();
                for event in events.iter() {
                    if !matches!(
                        event.event.kind,
                        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
                    ) {
                        continue;
                    }
                    for path in &event.paths {
                        if is_watchable(path, &watch_root) && !batch.contains(path) {
                            batch.push(path.clone());
                        }
                    }
                }
                for path in batch {
                    debug!("fs event: {path:?}");
                    if tx.send(path).is_err() {
                        // Engine is shutting down; nothing to deliver to.
                        return;
                    }
                }
            }
            Err(errors) => {
                error!("watcher errors: {errors:?}");
            }
        },
    )?;

    debouncer
        .watcher()
        .watch(root, RecursiveMode::Recursive)?;

    Ok(WorkspaceWatcher {
        _debouncer: debouncer,
    })
}

/// Markdown file below non-hidden path components.
fn is_watchable(path: &Path, root: &Path) -> bool {
    if path.extension().is_none_or(|ext| ext != "md") {
        return false;
    }
    let rel = match path.strip_prefix(root) {
        Ok(rel) => rel,
        Err(_) => return false,
    };
    !rel.components().any(|c| {
        c.as_os_str()
            .to_string_lossy()
            .starts_with('.')
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_watchable_filter() {
        let root = Path::new("/w");
        assert!(is_watchable(Path::new("/w/knowledge/a.md"), root));
        assert!(!is_watchable(Path::new("/w/knowledge/a.txt"), root));
        assert!(!is_watchable(Path::new("/w/.hidden/a.md"), root));
        assert!(!is_watchable(Path::new("/w/x/.secret.md"), root));
        assert!(!is_watchable(Path::new("/elsewhere/a.md"), root));
    }

    #[tokio::test]
    async fn test_watcher_reports_markdown_writes() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let _watcher = watch(dir.path(), tx).unwrap();

        // Give the backend a beat to arm, then write.
        tokio::time::sleep(Duration::from_millis(50)).await;
        std::fs::create_dir_all(dir.path().join("knowledge")).unwrap();
        std::fs::write(dir.path().join("knowledge/a.md"), "# A").unwrap();

        let received = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("debounced event within budget")
            .expect("channel open");
        assert!(received.ends_with("knowledge/a.md"));
    }
}

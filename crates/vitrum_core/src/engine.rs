//! The engine: wiring and background loops.
//!
//! Bootstraps the index, bus, registry, sync, and federation services over
//! one workspace root, starts the watcher drain task (the index's only
//! writer), the peer probe loop, and the origin poll loop, and exposes the
//! operations the transport layer calls.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{info, warn};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
use tokio::sync::RwLock;

use crate::bus::{BusEvent, LiveReloadBus};
use crate::error::{Result, VitrumError};
use crate::federation::FederationService;
use crate::frontmatter::{self, Frontmatter};
use crate::index::{DocumentIndex, IndexStats};
use crate::paths::{sanitize_rel_path, to_abs};
use crate::peers::{PeerClient, PeerRegistry};
use crate::sync::SyncService;
use crate::watcher::{self, WorkspaceWatcher};

/// One running Vitrum engine.
pub struct Engine {
    root: PathBuf,
    /// The document index. Read freely; written only by the drain task and
    /// the explicit reindex request.
    pub index: Arc<RwLock<DocumentIndex>>,
    /// Fan-out channel for client sessions.
    pub bus: LiveReloadBus,
    /// Peer liveness table.
    pub registry: Arc<PeerRegistry>,
    /// Adoption and origin tracking.
    pub sync: Arc<SyncService>,
    /// Peer-facing answers and cross-peer fan-out.
    pub federation: Arc<FederationService>,
    // Kept alive for the engine's lifetime; the mutex makes the engine
    // shareable across handler threads.
    _watcher: std::sync::Mutex<WorkspaceWatcher>,
}

impl Engine {
    /// Build every component over `root` and start the background loops.
    pub async fn bootstrap(root: PathBuf) -> Result<Arc<Engine>> {
        let index = Arc::new(RwLock::new(DocumentIndex::build(&root)?));
        let bus = LiveReloadBus::new();
        let client = PeerClient::new();
        let registry = Arc::new(PeerRegistry::new(&root, client.clone(), bus.clone())?);
        let sync = Arc::new(SyncService::new(
            root.clone(),
            index.clone(),
            registry.clone(),
            client.clone(),
            bus.clone(),
        ));
        let federation = Arc::new(FederationService::new(
            index.clone(),
            registry.clone(),
            client,
        ));

        let (tx, rx) = unbounded_channel();
        let watcher = watcher::watch(&root, tx)?;

        let engine = Arc::new(Engine {
            root: root.clone(),
            index,
            bus,
            registry: registry.clone(),
            sync: sync.clone(),
            federation,
            _watcher: std::sync::Mutex::new(watcher),
        });

        tokio::spawn(drain_events(engine.clone(), rx));
        tokio::spawn(async move { registry.run().await });
        tokio::spawn(async move { sync.run().await });

        info!(
            "engine up over {:?} ({} documents)",
            root,
            engine.index.read().await.len()
        );
        Ok(engine)
    }

    /// Workspace root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Rebuild the index from scratch and tell clients to refetch.
    pub async fn reindex(&self) -> Result<IndexStats> {
        let stats = {
            let mut index = self.index.write().await;
            index.rebuild()?;
            index.stats()
        };
        self.bus.emit(BusEvent::Reload);
        Ok(stats)
    }

    /// Replace an indexed document's front-matter and content on disk.
    ///
    /// A path the index does not know is a no-op, reported as `false`. The
    /// watcher absorbs the write; nothing mutates the index here.
    pub async fn write_document(
        &self,
        raw_path: &str,
        new_frontmatter: Option<Frontmatter>,
        content: &str,
    ) -> Result<bool> {
        let rel = sanitize_rel_path(raw_path)?;
        let existing = {
            let index = self.index.read().await;
            match index.get(&rel) {
                Some(doc) => doc.frontmatter.clone(),
                None => return Ok(false),
            }
        };
        let fm = new_frontmatter.unwrap_or(existing);
        frontmatter::write_file(&to_abs(&self.root, &rel), &fm, content)?;
        Ok(true)
    }
}

/// The single index writer: classify each debounced path and apply it.
async fn drain_events(engine: Arc<Engine>, mut rx: UnboundedReceiver<PathBuf>) {
    while let Some(abs) = rx.recv().await {
        if let Err(e) = apply_fs_event(&engine, &abs).await {
            warn!("watcher event for {abs:?} dropped: {e}");
        }
    }
}

async fn apply_fs_event(engine: &Engine, abs: &Path) -> Result<()> {
    let rel = abs
        .strip_prefix(&engine.root)
        .map_err(|_| VitrumError::Internal(format!("event outside root: {abs:?}")))?
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");

    if abs.exists() {
        {
            let mut index = engine.index.write().await;
            index.update_document(&rel)?;
        }
        engine.bus.emit(BusEvent::Update { path: rel.clone() });
        // A local edit may move an adopted document's sync state.
        engine.sync.handle_local_change(&rel).await?;
    } else {
        let removed = {
            let mut index = engine.index.write().await;
            index.remove_document(&rel)
        };
        if removed.is_some() {
            engine.bus.emit(BusEvent::Remove { path: rel });
        }
    }
    Ok(())
}

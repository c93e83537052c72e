//! Peer liveness tracking.
//!
//! The registry owns the runtime status table for every configured peer,
//! probes each on a timer, and applies exponential-style backoff: after
//! three consecutive failures a peer is only re-probed once 120 s have
//! passed since the last attempt. Config edits are hot-reloaded by watching
//! the file's mtime at probe time.

use std::path::PathBuf;
use std::time::{Duration, Instant, SystemTime};

use chrono::{DateTime, Utc};
use futures::future::join_all;
use indexmap::IndexMap;
use log::{debug, info, warn};
use serde::Serialize;
use tokio::sync::RwLock;

use crate::bus::{BusEvent, LiveReloadBus};
use crate::error::Result;
use crate::peers::client::PeerClient;
use crate::peers::config::{PeerConfig, PeerEntry, PeerProtocol, SelfConfig};
use crate::protocol::PeerHelloResponse;

/// Seconds between probe cycles.
pub const PROBE_INTERVAL: Duration = Duration::from_secs(30);
/// Failures before a peer enters backoff.
const BACKOFF_THRESHOLD: u32 = 3;
/// Minimum gap between probes of a backed-off peer.
const BACKOFF_WINDOW: chrono::Duration = chrono::Duration::seconds(120);

/// Liveness state of one peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PeerState {
    /// Last probe succeeded.
    Online,
    /// Last probe failed.
    Offline,
    /// Never probed since configuration.
    Unknown,
}

/// Runtime status for one configured peer.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerLiveStatus {
    /// Configured display name.
    pub name: String,
    /// Configured host.
    pub host: String,
    /// Configured port.
    pub port: u16,
    /// Configured transport scheme.
    pub protocol: PeerProtocol,
    /// Current liveness state.
    pub status: PeerState,
    /// Instance id reported by the last successful hello.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<String>,
    /// Display name reported by the peer itself.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Shared folders reported by the peer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shared_folders: Option<Vec<String>>,
    /// Shared tags reported by the peer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shared_tags: Option<Vec<String>>,
    /// Document count reported by the peer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_count: Option<usize>,
    /// Time of the last probe attempt, success or failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<DateTime<Utc>>,
    /// Round-trip of the last successful probe, in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    /// Probe failures since the last success.
    pub consecutive_failures: u32,
}

impl PeerLiveStatus {
    fn fresh(entry: &PeerEntry) -> PeerLiveStatus {
        PeerLiveStatus {
            name: entry.name.clone(),
            host: entry.host.clone(),
            port: entry.port,
            protocol: entry.protocol,
            status: PeerState::Unknown,
            instance_id: None,
            display_name: None,
            shared_folders: None,
            shared_tags: None,
            document_count: None,
            last_seen: None,
            latency_ms: None,
            consecutive_failures: 0,
        }
    }

    /// The `host:port` key for this peer.
    pub fn host_port(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Base URL for API calls against this peer.
    pub fn base_url(&self) -> String {
        format!("{}://{}:{}", self.protocol.scheme(), self.host, self.port)
    }

    /// Whether this peer is due for a probe under the backoff policy.
    pub fn due_for_probe(&self, now: DateTime<Utc>) -> bool {
        if self.consecutive_failures < BACKOFF_THRESHOLD {
            return true;
        }
        match self.last_seen {
            Some(last) => now - last >= BACKOFF_WINDOW,
            None => true,
        }
    }
}

/// Loads peer config, probes peers, and tracks their liveness.
pub struct PeerRegistry {
    workspace_root: PathBuf,
    config: RwLock<PeerConfig>,
    config_mtime: RwLock<Option<SystemTime>>,
    statuses: RwLock<IndexMap<String, PeerLiveStatus>>,
    client: PeerClient,
    bus: LiveReloadBus,
    started: Instant,
}

impl PeerRegistry {
    /// Load (or synthesize) the peer config and seed the status table.
    pub fn new(
        workspace_root: &std::path::Path,
        client: PeerClient,
        bus: LiveReloadBus,
    ) -> Result<PeerRegistry> {
        let config = PeerConfig::load_or_init(workspace_root)?;
        let mtime = PeerConfig::mtime(workspace_root);
        let statuses = config
            .peers
            .iter()
            .map(|entry| (entry.host_port(), PeerLiveStatus::fresh(entry)))
            .collect();
        Ok(PeerRegistry {
            workspace_root: workspace_root.to_path_buf(),
            config: RwLock::new(config),
            config_mtime: RwLock::new(mtime),
            statuses: RwLock::new(statuses),
            client,
            bus,
            started: Instant::now(),
        })
    }

    /// This instance's identity and sharing policy.
    pub async fn self_config(&self) -> SelfConfig {
        self.config.read().await.self_config.clone()
    }

    /// True when `rel_path` falls under a shared folder prefix.
    pub async fn is_shared(&self, rel_path: &str) -> bool {
        self.config.read().await.is_shared(rel_path)
    }

    /// Seconds since the registry started; reported in hello answers.
    pub fn uptime_secs(&self) -> u64 {
        self.started.elapsed().as_secs()
    }

    /// The hello answer this instance gives to peers.
    pub async fn hello_response(&self, document_count: usize) -> PeerHelloResponse {
        let self_config = self.self_config().await;
        PeerHelloResponse {
            online: true,
            instance_id: self_config.instance_id,
            display_name: self_config.display_name,
            shared_folders: self_config.shared_folders,
            shared_tags: self_config.shared_tags,
            document_count,
            uptime: self.uptime_secs(),
            api_version: "1".to_string(),
        }
    }

    /// Current status of every configured peer, in config order.
    pub async fn snapshot(&self) -> Vec<PeerLiveStatus> {
        self.statuses.read().await.values().cloned().collect()
    }

    /// Look up one peer by its `host:port` key.
    pub async fn find(&self, host_port: &str) -> Option<PeerLiveStatus> {
        self.statuses.read().await.get(host_port).cloned()
    }

    /// Peers currently online.
    pub async fn online_peers(&self) -> Vec<PeerLiveStatus> {
        self.statuses
            .read()
            .await
            .values()
            .filter(|s| s.status == PeerState::Online)
            .cloned()
            .collect()
    }

    /// Probe loop. Runs until the registry is dropped.
    pub async fn run(&self) {
        let mut interval = tokio::time::interval(PROBE_INTERVAL);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            self.probe_cycle().await;
        }
    }

    /// One probe cycle: hot-reload config, then probe every due peer.
    pub async fn probe_cycle(&self) {
        if let Err(e) = self.reload_config_if_changed().await {
            warn!("peer config reload failed: {e}");
        }

        let now = Utc::now();
        let due: Vec<PeerLiveStatus> = self
            .statuses
            .read()
            .await
            .values()
            .filter(|s| s.due_for_probe(now))
            .cloned()
            .collect();

        let probes = due.iter().map(|peer| self.probe(peer.clone()));
        join_all(probes).await;
    }

    /// Reconcile the status table against the config file when its mtime
    /// advances. New peers start `unknown`, removed peers are dropped,
    /// existing peers keep their state.
    async fn reload_config_if_changed(&self) -> Result<()> {
        let current = PeerConfig::mtime(&self.workspace_root);
        {
            let recorded = self.config_mtime.read().await;
            if current == *recorded {
                return Ok(());
            }
        }

        let fresh = PeerConfig::load_or_init(&self.workspace_root)?;
        info!("peer config changed, reconciling {} peers", fresh.peers.len());

        {
            let mut statuses = self.statuses.write().await;
            let keys: Vec<String> = fresh.peers.iter().map(|p| p.host_port()).collect();
            statuses.retain(|key, _| keys.iter().any(|k| k == key));
            for entry in &fresh.peers {
                statuses
                    .entry(entry.host_port())
                    .and_modify(|status| {
                        status.name = entry.name.clone();
                        status.protocol = entry.protocol;
                    })
                    .or_insert_with(|| PeerLiveStatus::fresh(entry));
            }
        }

        *self.config.write().await = fresh;
        *self.config_mtime.write().await = current;
        Ok(())
    }

    /// Probe one peer and record the outcome.
    async fn probe(&self, peer: PeerLiveStatus) {
        let key = peer.host_port();
        let start = Instant::now();
        let outcome = self.client.hello(&peer.base_url()).await;
        let latency = start.elapsed().as_millis() as u64;

        let mut statuses = self.statuses.write().await;
        let Some(status) = statuses.get_mut(&key) else {
            // Peer was removed from config while the probe was in flight.
            return;
        };
        let was_online = status.status == PeerState::Online;

        match outcome {
            Ok(hello) => {
                status.status = PeerState::Online;
                status.instance_id = Some(hello.instance_id);
                status.display_name = Some(hello.display_name);
                status.shared_folders = Some(hello.shared_folders);
                status.shared_tags = Some(hello.shared_tags);
                status.document_count = Some(hello.document_count);
                status.latency_ms = Some(latency);
                status.last_seen = Some(Utc::now());
                status.consecutive_failures = 0;
                debug!("peer {key} online ({latency}ms)");
                if !was_online {
                    self.bus.emit(BusEvent::PeerOnline {
                        peer: status.name.clone(),
                        host: key.clone(),
                    });
                }
            }
            Err(e) => {
                status.status = PeerState::Offline;
                status.consecutive_failures += 1;
                status.last_seen = Some(Utc::now());
                debug!(
                    "peer {key} offline (failure #{}): {e}",
                    status.consecutive_failures
                );
                if was_online {
                    self.bus.emit(BusEvent::PeerOffline {
                        peer: status.name.clone(),
                        host: key.clone(),
                    });
                }
            }
        }
    }
}

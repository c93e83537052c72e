//! On-disk peer configuration.
//!
//! Lives at `<workspaceRoot>/.vitrum-peers.json` and is owned by the user:
//! the engine only writes it once, on first run, to synthesize an instance
//! identity. Edits are picked up by the registry's mtime polling.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, VitrumError};

/// Config file name under the workspace root.
pub const PEERS_FILE: &str = ".vitrum-peers.json";

/// Process-wide peer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerConfig {
    /// This instance's identity and sharing policy.
    #[serde(rename = "self")]
    pub self_config: SelfConfig,
    /// Configured remote peers.
    #[serde(default)]
    pub peers: Vec<PeerEntry>,
}

/// Identity and sharing policy for this instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelfConfig {
    /// Opaque instance id, generated once on first run and persisted.
    pub instance_id: String,
    /// Human-readable name shown to peers.
    pub display_name: String,
    /// Path prefixes peers may search and fetch from.
    #[serde(default)]
    pub shared_folders: Vec<String>,
    /// Tags peers may filter shared listings by.
    #[serde(default)]
    pub shared_tags: Vec<String>,
}

/// One configured remote peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerEntry {
    /// Display name for this peer.
    pub name: String,
    /// Hostname or address on the trusted overlay network.
    pub host: String,
    /// Port the peer's engine listens on.
    pub port: u16,
    /// Transport scheme.
    #[serde(default)]
    pub protocol: PeerProtocol,
}

/// Transport scheme for peer calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeerProtocol {
    /// Plain HTTP (the overlay network is the trust boundary).
    #[default]
    Http,
    /// HTTPS for peers that terminate TLS themselves.
    Https,
}

impl PeerProtocol {
    /// URL scheme string.
    pub fn scheme(&self) -> &'static str {
        match self {
            PeerProtocol::Http => "http",
            PeerProtocol::Https => "https",
        }
    }
}

impl PeerEntry {
    /// The `host:port` key used across the status table and sync metadata.
    pub fn host_port(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Base URL for API calls against this peer.
    pub fn base_url(&self) -> String {
        format!("{}://{}:{}", self.protocol.scheme(), self.host, self.port)
    }
}

impl PeerConfig {
    /// Path of the config file under a workspace root.
    pub fn path_for(workspace_root: &Path) -> PathBuf {
        workspace_root.join(PEERS_FILE)
    }

    /// Load the config, synthesizing and persisting a fresh one when the
    /// file does not exist yet.
    pub fn load_or_init(workspace_root: &Path) -> Result<PeerConfig> {
        let path = Self::path_for(workspace_root);
        if path.exists() {
            return Self::load(&path);
        }
        let config = PeerConfig {
            self_config: SelfConfig {
                instance_id: Uuid::new_v4().to_string(),
                display_name: hostname_or_default(),
                shared_folders: vec!["knowledge/".to_string()],
                shared_tags: Vec::new(),
            },
            peers: Vec::new(),
        };
        config.save(&path)?;
        Ok(config)
    }

    /// Load the config from an explicit path.
    pub fn load(path: &Path) -> Result<PeerConfig> {
        let raw = fs::read_to_string(path).map_err(|e| VitrumError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        serde_json::from_str(&raw)
            .map_err(|e| VitrumError::PeerConfig(format!("{}: {e}", path.display())))
    }

    /// Persist the config.
    pub fn save(&self, path: &Path) -> Result<()> {
        let raw = serde_json::to_string_pretty(self)?;
        fs::write(path, raw).map_err(|e| VitrumError::FileWrite {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Current mtime of the config file, used for hot-reload detection.
    pub fn mtime(workspace_root: &Path) -> Option<SystemTime> {
        fs::metadata(Self::path_for(workspace_root))
            .and_then(|m| m.modified())
            .ok()
    }

    /// True when `rel_path` falls under any shared folder prefix.
    pub fn is_shared(&self, rel_path: &str) -> bool {
        self.self_config
            .shared_folders
            .iter()
            .any(|prefix| rel_path.starts_with(prefix.as_str()))
    }
}

fn hostname_or_default() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "vitrum".to_string())
}

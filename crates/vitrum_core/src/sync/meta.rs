//! Federation metadata carried in adopted documents.
//!
//! An adopted document records its origin and sync state in a strongly
//! typed `federation` block inside the front-matter. The block is written
//! through the field-level updater, so user-authored keys around it are
//! never disturbed.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::frontmatter::Frontmatter;

/// Front-matter key holding the federation block.
pub const FEDERATION_KEY: &str = "federation";

/// Relationship between an adopted document and its origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncStatus {
    /// Local and origin agree.
    Synced,
    /// The local copy diverged from the last known origin state.
    LocalModified,
    /// The origin diverged from the adopted state.
    OriginModified,
    /// Both sides diverged; user resolution required.
    Conflict,
    /// The user rejected the document. Terminal: no further polling, no
    /// further local-change classification.
    Rejected,
}

impl SyncStatus {
    /// Kebab-case label used in front-matter and on the wire.
    pub fn label(&self) -> &'static str {
        match self {
            SyncStatus::Synced => "synced",
            SyncStatus::LocalModified => "local-modified",
            SyncStatus::OriginModified => "origin-modified",
            SyncStatus::Conflict => "conflict",
            SyncStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// What the user asked the resolver to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResolveAction {
    /// Refetch the origin and overwrite the local body.
    AcceptOrigin,
    /// Keep the local body; future origin divergence is tracked anew.
    KeepLocal,
    /// Write caller-provided merged content.
    Merge,
    /// Stop tracking this document entirely.
    Reject,
}

impl FromStr for ResolveAction {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "accept-origin" | "accept_origin" | "origin" => Ok(ResolveAction::AcceptOrigin),
            "keep-local" | "keep_local" | "local" => Ok(ResolveAction::KeepLocal),
            "merge" => Ok(ResolveAction::Merge),
            "reject" => Ok(ResolveAction::Reject),
            _ => Err(()),
        }
    }
}

/// Something that may move a document's sync status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncTrigger {
    /// The watcher saw the local body change.
    LocalEdit,
    /// An origin poll saw the origin checksum change.
    OriginChanged,
    /// The user resolved.
    Resolve(ResolveAction),
}

/// The sync state machine. Returns the new status, or `None` when the
/// combination is not a listed transition (a no-op).
///
/// `Rejected` is terminal: nothing moves a document out of it short of a
/// fresh adoption.
pub fn transition(current: SyncStatus, trigger: SyncTrigger) -> Option<SyncStatus> {
    use ResolveAction::*;
    use SyncStatus::*;
    use SyncTrigger::*;

    match (current, trigger) {
        (Rejected, _) => None,
        (Synced, LocalEdit) => Some(LocalModified),
        (Synced, OriginChanged) => Some(OriginModified),
        (LocalModified, OriginChanged) => Some(Conflict),
        (OriginModified, LocalEdit) => Some(Conflict),
        (Conflict, Resolve(AcceptOrigin)) => Some(Synced),
        (Conflict, Resolve(KeepLocal)) => Some(Synced),
        (Conflict, Resolve(Merge)) => Some(Synced),
        (_, Resolve(Reject)) => Some(Rejected),
        _ => None,
    }
}

/// The strongly typed `federation` front-matter block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct FederationMeta {
    /// Opaque instance id of the origin peer.
    pub origin_peer: String,
    /// Display name of the origin peer at adoption time.
    pub origin_name: String,
    /// `host:port` of the origin peer.
    pub origin_host: String,
    /// Path of the document on the origin.
    pub origin_path: String,
    /// When the document was adopted.
    pub adopted_at: DateTime<Utc>,
    /// Last known checksum of the origin body.
    pub origin_checksum: String,
    /// Checksum of the local body as of the last classification.
    pub local_checksum: String,
    /// Current sync state.
    pub sync_status: SyncStatus,
    /// When the origin was last polled or the state last classified.
    pub last_sync_check: DateTime<Utc>,
}

impl FederationMeta {
    /// Read the federation block out of a front-matter mapping.
    ///
    /// A missing key is `None`; a present but malformed block is also
    /// `None` (the document is then treated as unadopted).
    pub fn from_frontmatter(frontmatter: &Frontmatter) -> Option<FederationMeta> {
        let value = frontmatter.get(FEDERATION_KEY)?;
        serde_yaml::from_value(value.clone()).ok()
    }

    /// Serialize this block into a front-matter value.
    pub fn to_value(&self) -> serde_yaml::Value {
        serde_yaml::to_value(self).expect("federation meta serializes")
    }

    /// Write this block into a front-matter mapping.
    pub fn apply_to(&self, frontmatter: &mut Frontmatter) {
        frontmatter.insert(FEDERATION_KEY.to_string(), self.to_value());
    }
}

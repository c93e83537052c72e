use std::path::PathBuf;

use thiserror::Error;

/// Unified error type for Vitrum engine operations.
///
/// Transport layers map these onto their own status codes; the engine itself
/// only distinguishes the kinds below.
#[derive(Debug, Error)]
pub enum VitrumError {
    /// General error for any kind of I/O issue not otherwise documented here.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A file could not be read.
    ///
    /// Can occur due to:
    /// - insufficient permissions
    /// - locking/concurrent access
    /// - the file disappearing between discovery and read
    #[error("Failed to read file '{path}': {source}")]
    FileRead {
        /// Path to the file that failed to be read
        path: PathBuf,
        /// std::io error that caused this error
        source: std::io::Error,
    },

    /// A file could not be written.
    #[error("Failed to write file '{path}': {source}")]
    FileWrite {
        /// Path to the file that failed to be written
        path: PathBuf,
        /// std::io error that caused this error
        source: std::io::Error,
    },

    /// The leading `---` front-matter block exists but is not valid YAML.
    ///
    /// During index builds this is logged and the file is skipped; it never
    /// fails a whole build.
    #[error("Malformed frontmatter in '{0}'")]
    MalformedFrontmatter(PathBuf),

    /// An error that occurred while serializing or deserializing YAML.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// An error that occurred while serializing or deserializing JSON.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Missing or invalid request parameters.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// No such document, path, or peer.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A peer asked for a path outside the shared subtrees.
    #[error("Forbidden: '{0}' is not inside a shared folder")]
    Forbidden(String),

    /// The selected peer is not currently online.
    #[error("Peer '{0}' is offline")]
    PeerOffline(String),

    /// An outbound peer call exceeded its per-call budget.
    #[error("Peer call timed out after {secs}s")]
    PeerTimeout {
        /// Budget that was exceeded, in seconds
        secs: u64,
    },

    /// A peer answered with a non-2xx status.
    #[error("Peer returned status {status}")]
    PeerUpstream {
        /// HTTP status code the peer returned
        status: u16,
    },

    /// Transport-level failure talking to a peer.
    #[error("Peer request failed: {0}")]
    PeerRequest(#[from] reqwest::Error),

    /// Filesystem watcher failure.
    #[error("Watcher error: {0}")]
    Watch(#[from] notify::Error),

    /// Peer configuration file could not be loaded or synthesized.
    #[error("Peer config error: {0}")]
    PeerConfig(String),

    /// Anything unexpected. Surfaced opaquely.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for Vitrum engine operations.
pub type Result<T> = std::result::Result<T, VitrumError>;

impl VitrumError {
    /// Stable kind label used by transports and structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            VitrumError::Io(_) => "internal",
            VitrumError::FileRead { .. } => "unreadable",
            VitrumError::FileWrite { .. } => "internal",
            VitrumError::MalformedFrontmatter(_) => "malformed-frontmatter",
            VitrumError::Yaml(_) => "internal",
            VitrumError::Json(_) => "internal",
            VitrumError::BadRequest(_) => "bad-request",
            VitrumError::NotFound(_) => "not-found",
            VitrumError::Forbidden(_) => "forbidden",
            VitrumError::PeerOffline(_) => "peer-offline",
            VitrumError::PeerTimeout { .. } => "peer-timeout",
            VitrumError::PeerUpstream { .. } => "peer-upstream-error",
            VitrumError::PeerRequest(_) => "peer-upstream-error",
            VitrumError::Watch(_) => "internal",
            VitrumError::PeerConfig(_) => "internal",
            VitrumError::Internal(_) => "internal",
        }
    }
}

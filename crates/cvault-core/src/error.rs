//! Error taxonomy for an archive run.
//!
//! Artifact-level errors stay inside their node, node-level errors stay inside
//! the run. Only the variants reported by [`ArchiveError::is_run_fatal`] stop
//! a run.

use std::path::PathBuf;
use std::time::Duration;

use crate::retry::ErrorKind;
use crate::storage;

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    /// The authenticated session is no longer accepted by the remote.
    #[error("session expired")]
    AuthExpired,

    /// Re-authentication failed or was attempted too many times.
    #[error("authentication unavailable: {0}")]
    AuthUnavailable(String),

    /// The page did not settle (answer panels expanded) within the bounded wait.
    #[error("render of {url} did not settle within {waited:?}")]
    RenderTimeout { url: String, waited: Duration },

    /// Zero-byte or corrupt capture (screenshot or document).
    #[error("capture failed: {0}")]
    Capture(String),

    /// Rendering collaborator reported a failure other than timeout/expiry.
    #[error("render failed: {0}")]
    Render(String),

    /// Retryable network failure (timeout, reset, 5xx, throttling).
    #[error("transient network failure: {0}")]
    NetworkTransient(String),

    /// Non-retryable HTTP status.
    #[error("GET {url} returned HTTP {status}")]
    Http { url: String, status: u32 },

    /// A single node of the remote tree could not be parsed.
    #[error("unparsable {node}: {reason}")]
    StructuralParse { node: String, reason: String },

    /// Local filesystem failure for one node (path too long, permission denied).
    #[error("filesystem error at {}: {source}", path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// No space left on the archive volume.
    #[error("disk full while writing {}", path.display())]
    DiskFull { path: PathBuf },

    /// A fetch task ended without an outcome (panicked or was aborted).
    #[error("fetch worker stopped: {0}")]
    Worker(String),

    /// No assessment types could be selected for the run.
    #[error("type selection: {0}")]
    Selection(String),

    /// The progress ledger cannot be read or written safely.
    #[error("progress ledger {}: {reason}", path.display())]
    Ledger { path: PathBuf, reason: String },
}

impl ArchiveError {
    /// Wraps an I/O error for `path`, promoting out-of-space conditions to [`ArchiveError::DiskFull`].
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if storage::is_disk_full(&source) {
            ArchiveError::DiskFull { path }
        } else {
            ArchiveError::Filesystem { path, source }
        }
    }

    pub fn structural(node: impl Into<String>, reason: impl Into<String>) -> Self {
        ArchiveError::StructuralParse {
            node: node.into(),
            reason: reason.into(),
        }
    }

    /// True for conditions that end the whole run (after draining and flushing).
    pub fn is_run_fatal(&self) -> bool {
        matches!(
            self,
            ArchiveError::DiskFull { .. }
                | ArchiveError::Ledger { .. }
                | ArchiveError::AuthUnavailable(_)
        )
    }

    /// Retry classification used by the backoff policy.
    pub fn retry_kind(&self) -> ErrorKind {
        match self {
            ArchiveError::RenderTimeout { .. } => ErrorKind::Timeout,
            ArchiveError::NetworkTransient(_) => ErrorKind::Connection,
            ArchiveError::Capture(_) | ArchiveError::Render(_) => ErrorKind::Connection,
            ArchiveError::Http { status, .. } => crate::retry::classify_http_status(*status),
            _ => ErrorKind::Other,
        }
    }
}

//! Transfer error type for retry classification.

use std::fmt;

/// Error returned by a single image transfer (curl failure, HTTP error, or storage failure).
/// Kept separate from `ArchiveError` so retries are decided before the error leaves the fetcher.
#[derive(Debug)]
pub enum TransferError {
    /// Curl reported an error (timeout, connection, etc.).
    Curl(curl::Error),
    /// HTTP response had a non-2xx status.
    Http(u32),
    /// The server rejected the session (401) or redirected to a login page.
    Unauthorized,
    /// Transfer finished with an empty body.
    Empty,
    /// Disk/storage write failed (e.g. disk full, permission denied). Not retried.
    Storage(std::io::Error),
}

impl fmt::Display for TransferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferError::Curl(e) => write!(f, "{}", e),
            TransferError::Http(code) => write!(f, "HTTP {}", code),
            TransferError::Unauthorized => write!(f, "session rejected"),
            TransferError::Empty => write!(f, "empty response body"),
            TransferError::Storage(e) => write!(f, "storage: {}", e),
        }
    }
}

impl std::error::Error for TransferError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TransferError::Curl(e) => Some(e),
            TransferError::Storage(e) => Some(e),
            TransferError::Http(_) | TransferError::Unauthorized | TransferError::Empty => None,
        }
    }
}

//! Typed capture errors.
//!
//! Kept as a concrete enum (rather than anyhow) so the engine can classify
//! a failure before deciding what to do with it: a recoverable error ends
//! one resource, a fatal one ends the session.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CaptureError {
    /// Input failed scheme validation. Surfaced before any network
    /// activity; no session is created for it.
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// Connection, DNS, or timeout failure on a single fetch.
    #[error("network failure fetching {url}")]
    Network {
        url: String,
        #[source]
        source: Option<reqwest::Error>,
    },

    /// Non-2xx response.
    #[error("HTTP {status} fetching {url}")]
    Http { url: String, status: u16 },

    /// The mapped path would land outside the capture directory.
    #[error("path {path:?} escapes the capture directory")]
    PathTraversal { path: String },

    /// Filesystem failure (directory creation, open, write).
    #[error("filesystem error at {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The session store is unreachable or rejected a write.
    #[error("session store unavailable")]
    Storage(#[from] StoreError),
}

impl CaptureError {
    /// Whether the engine may swallow this failure for a secondary
    /// resource and keep the session going. Fatal kinds end the session no
    /// matter where they occur; any kind is fatal on the root page.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            CaptureError::Network { .. }
                | CaptureError::Http { .. }
                | CaptureError::PathTraversal { .. }
                | CaptureError::Io { .. }
        )
    }
}

/// Persistence-layer error. Wrapped into [`CaptureError::Storage`] at the
/// engine boundary.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error")]
    Db(#[from] sqlx::Error),

    #[error("cannot resolve state directory")]
    StateDir(#[from] xdg::BaseDirectoriesError),

    #[error("cannot prepare database directory at {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn per_resource_kinds_are_recoverable() {
        let network = CaptureError::Network {
            url: "https://example.com/a.css".into(),
            source: None,
        };
        let http = CaptureError::Http {
            url: "https://example.com/a.css".into(),
            status: 404,
        };
        let traversal = CaptureError::PathTraversal {
            path: "../../etc/passwd".into(),
        };
        assert!(network.is_recoverable());
        assert!(http.is_recoverable());
        assert!(traversal.is_recoverable());
    }

    #[test]
    fn session_kinds_are_fatal() {
        let invalid = CaptureError::InvalidUrl("ftp://example.com".into());
        let storage = CaptureError::Storage(StoreError::Db(sqlx::Error::PoolClosed));
        assert!(!invalid.is_recoverable());
        assert!(!storage.is_recoverable());
    }
}

//! Error types for rc2fa core
//!
//! Separates the two failure classes a cycle can see:
//! - Fatal setup errors (store, directory) that abort the cycle
//! - Delivery errors (transport) that are isolated per recipient

use std::path::PathBuf;

/// Main checker error type
///
/// Every variant is fatal for the running cycle. Delivery failures never
/// surface here; they are folded into the cycle outcome instead.
#[derive(Debug, thiserror::Error)]
pub enum CheckerError {
    /// Tracking store could not be opened or committed
    #[error("tracking store error: {0}")]
    Store(#[from] StoreError),

    /// Directory query failed
    #[error("directory query failed: {0}")]
    Directory(#[from] DirectoryError),
}

impl CheckerError {
    /// Check if error happened before any notification was attempted
    #[inline]
    #[must_use]
    pub fn is_setup_failure(&self) -> bool {
        matches!(
            self,
            Self::Directory(_)
                | Self::Store(
                    StoreError::Open { .. }
                        | StoreError::Corrupt { .. }
                        | StoreError::UnsupportedVersion { .. }
                )
        )
    }
}

/// Tracking store errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Store file exists but could not be read
    #[error("failed to open store at {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Store file content is not a valid tracking snapshot
    #[error("store at {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Snapshot version is not understood by this build
    #[error("unsupported store format version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    /// Writing the new snapshot failed
    #[error("failed to commit store to {path}: {source}")]
    Commit {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Encoding the snapshot failed
    #[error("failed to encode store snapshot: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Directory query errors
#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    /// Connecting to the directory database failed
    #[error("connection failed: {0}")]
    Connection(String),

    /// Query execution failed
    #[error("query failed: {0}")]
    Query(#[from] mongodb::error::Error),
}

/// Notification delivery errors
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// HTTP request could not be sent or returned an error status
    #[error("webhook request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Webhook answered with a non-success status
    #[error("webhook rejected message with status {status}")]
    Rejected { status: u16 },
}

/// Message construction errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MessageError {
    /// Channel is empty or whitespace
    #[error("message channel must not be empty")]
    EmptyChannel,

    /// Direct message target has no username
    #[error("direct message requires a username")]
    EmptyUsername,

    /// Attachment title is empty
    #[error("attachment title must not be empty")]
    EmptyTitle,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checker_error_display() {
        let err = CheckerError::from(DirectoryError::Connection("refused".into()));
        assert_eq!(
            err.to_string(),
            "directory query failed: connection failed: refused"
        );

        let err = CheckerError::from(StoreError::UnsupportedVersion {
            found: 7,
            expected: 1,
        });
        assert!(err.to_string().contains("unsupported store format version 7"));
    }

    #[test]
    fn setup_failures() {
        let open = CheckerError::Store(StoreError::Open {
            path: PathBuf::from("storage.db"),
            source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        });
        assert!(open.is_setup_failure());

        let commit = CheckerError::Store(StoreError::Commit {
            path: PathBuf::from("storage.db"),
            source: std::io::Error::from(std::io::ErrorKind::Other),
        });
        assert!(!commit.is_setup_failure());

        let dir = CheckerError::Directory(DirectoryError::Connection("refused".into()));
        assert!(dir.is_setup_failure());
    }

    #[test]
    fn transport_rejection_display() {
        let err = TransportError::Rejected { status: 502 };
        assert_eq!(err.to_string(), "webhook rejected message with status 502");
    }
}

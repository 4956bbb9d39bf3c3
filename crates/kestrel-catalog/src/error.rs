//! Error types for the catalog subsystem.

use thiserror::Error;

/// Errors that can occur while loading a rule catalog.
#[derive(Error, Debug)]
pub enum CatalogError {
    /// Catalog file does not exist
    #[error("catalog not found at {path}")]
    NotFound {
        /// Expected catalog path
        path: String,
    },

    /// Failed to read the catalog file
    #[error("failed to read catalog from {path}: {source}")]
    LoadError {
        /// Path to the catalog file
        path: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Catalog document is not valid JSON
    #[error("failed to parse catalog JSON from {origin}: {source}")]
    ParseError {
        /// File path or remote source name
        origin: String,
        /// JSON parse error
        #[source]
        source: serde_json::Error,
    },

    /// Catalog document parsed but has the wrong shape
    #[error("malformed catalog from {origin}: {reason}")]
    Malformed {
        /// File path or remote source name
        origin: String,
        /// What is wrong with the document
        reason: String,
    },

    /// A single rule is unusable (unknown transform, extraction or pre-check kind)
    #[error("invalid rule {site}: {reason}")]
    InvalidRule {
        /// Site name of the offending rule
        site: String,
        /// Reason for rejection
        reason: String,
    },
}

impl CatalogError {
    pub(crate) fn invalid_rule(site: &str, reason: impl Into<String>) -> Self {
        Self::InvalidRule {
            site: site.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<CatalogError> for kestrel_core::KestrelError {
    fn from(err: CatalogError) -> Self {
        Self::Catalog(err.to_string())
    }
}

/// Errors raised while refreshing a catalog from its remote source.
///
/// These never abort a run: the synchronizer turns them into
/// [`SyncOutcome::FetchFailed`](crate::sync::SyncOutcome::FetchFailed) and the
/// local catalog stays in place.
#[derive(Error, Debug)]
pub enum SyncError {
    /// HTTP client could not be constructed
    #[error("failed to build HTTP client: {0}")]
    Client(String),

    /// Request to the remote source failed
    #[error("failed to fetch {url}: {source}")]
    Fetch {
        /// Remote URL
        url: String,
        /// Transport error
        #[source]
        source: reqwest::Error,
    },

    /// Remote source answered with a non-success status
    #[error("remote source {url} returned HTTP {status}")]
    Status {
        /// Remote URL
        url: String,
        /// HTTP status code
        status: u16,
    },

    /// Remote payload is not a catalog document
    #[error("remote payload rejected: {0}")]
    Payload(#[from] CatalogError),

    /// Replacing the local file failed
    #[error("failed to persist catalog to {path}: {source}")]
    Persist {
        /// Local catalog path
        path: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },
}

/// Result type for catalog operations.
pub type Result<T> = std::result::Result<T, CatalogError>;

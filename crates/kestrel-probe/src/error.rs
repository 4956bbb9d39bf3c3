//! Error types for the probe engine.
//!
//! Per-site failures ([`ProbeError::Transport`], [`ProbeError::Authentication`],
//! [`ProbeError::Template`]) never escape a probe: the executor folds them
//! into an `ERROR` result. The remaining variants stop a session from starting.

use crate::result::ErrorKind;
use kestrel_catalog::CatalogError;
use thiserror::Error;

/// Errors raised by the probe engine.
#[derive(Error, Debug)]
pub enum ProbeError {
    /// The HTTP exchange failed (connect, TLS, timeout, redirect loop, body read)
    #[error("request to {url} failed: {reason}")]
    Transport {
        /// Request URL
        url: String,
        /// Failure description
        reason: String,
    },

    /// The pre-check handshake did not produce credentials
    #[error("pre-check for {site} failed: {source}")]
    Authentication {
        /// Site name
        site: String,
        /// Handshake failure
        #[source]
        source: AuthenticationError,
    },

    /// Substituting the identifier produced an unusable request
    #[error("cannot build request for {site}: {reason}")]
    Template {
        /// Site name
        site: String,
        /// What was wrong
        reason: String,
    },

    /// HTTP client could not be constructed
    #[error("failed to build HTTP client: {0}")]
    Client(String),

    /// Catalog could not be loaded
    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// Site filter expression could not be parsed
    #[error("invalid filter: {0}")]
    Filter(#[from] FilterError),

    /// A blocking task (catalog load) panicked or was cancelled
    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// Writing a response dump failed
    #[error("failed to dump response to {path}: {source}")]
    Dump {
        /// Destination path
        path: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },
}

impl ProbeError {
    /// Diagnostic category for per-site failures.
    #[must_use]
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Transport { .. } => Some(ErrorKind::Transport),
            Self::Authentication { .. } => Some(ErrorKind::Authentication),
            Self::Template { .. } => Some(ErrorKind::Template),
            _ => None,
        }
    }
}

impl From<ProbeError> for kestrel_core::KestrelError {
    fn from(err: ProbeError) -> Self {
        match err {
            ProbeError::Catalog(e) => e.into(),
            ProbeError::Filter(e) => Self::Validation(e.to_string()),
            ProbeError::Client(reason) => Self::Network(reason),
            ProbeError::Dump { source, .. } => Self::Io(source),
            err @ (ProbeError::Transport { .. } | ProbeError::Authentication { .. }) => {
                Self::Network(err.to_string())
            }
            err @ ProbeError::Template { .. } => Self::Validation(err.to_string()),
            err @ ProbeError::Task(_) => Self::Internal(err.to_string()),
        }
    }
}

/// Why a pre-check handshake failed.
#[derive(Error, Debug)]
pub enum AuthenticationError {
    /// The named credential is not configured
    #[error("credential {name} is not configured")]
    MissingCredential {
        /// Credential name
        name: String,
    },

    /// The handshake request failed
    #[error("handshake request failed: {0}")]
    Transport(String),

    /// The handshake answered with a non-success status
    #[error("handshake returned HTTP {status}")]
    Status {
        /// HTTP status code
        status: u16,
    },

    /// The token was not where the directive said it would be
    #[error("token not found in handshake response ({source_kind})")]
    TokenNotFound {
        /// Token source kind (`json`, `header`, `cookie`, `regex`)
        source_kind: &'static str,
    },

    /// A header produced by the handshake is not valid HTTP
    #[error("invalid header {name}: {reason}")]
    InvalidHeader {
        /// Header name
        name: String,
        /// Reason
        reason: String,
    },

    /// The session was cancelled during the handshake
    #[error("cancelled")]
    Cancelled,
}

/// Errors parsing a site filter expression.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FilterError {
    /// Expression is syntactically invalid
    #[error("syntax error at offset {position}: {reason}")]
    Syntax {
        /// Byte offset into the expression
        position: usize,
        /// What was expected
        reason: String,
    },

    /// Property name is not recognised
    #[error("unknown property '{0}'")]
    UnknownProperty(String),

    /// Ordering comparison against a non-numeric value
    #[error("operator {operator} needs a numeric value, got '{value}'")]
    NotNumeric {
        /// Operator used
        operator: String,
        /// Offending value
        value: String,
    },
}

/// Result type for probe operations.
pub type Result<T> = std::result::Result<T, ProbeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        let err = ProbeError::Authentication {
            site: "Instagram".to_string(),
            source: AuthenticationError::MissingCredential {
                name: "INSTAGRAM_SESSION_ID".to_string(),
            },
        };
        assert_eq!(err.kind(), Some(ErrorKind::Authentication));
        assert!(err.to_string().contains("INSTAGRAM_SESSION_ID"));

        assert_eq!(ProbeError::Client("tls".to_string()).kind(), None);
    }

    #[test]
    fn test_into_core_error() {
        let err: kestrel_core::KestrelError =
            ProbeError::Filter(FilterError::UnknownProperty("colour".to_string())).into();
        assert!(matches!(err, kestrel_core::KestrelError::Validation(_)));
    }

    #[test]
    fn test_per_site_errors_keep_their_category() {
        let err: kestrel_core::KestrelError = ProbeError::Transport {
            url: "https://example.com/octocat".to_string(),
            reason: "timed out".to_string(),
        }
        .into();
        assert!(matches!(err, kestrel_core::KestrelError::Network(_)));

        let err: kestrel_core::KestrelError = ProbeError::Authentication {
            site: "Instagram".to_string(),
            source: AuthenticationError::Status { status: 401 },
        }
        .into();
        assert!(matches!(err, kestrel_core::KestrelError::Network(_)));

        let err: kestrel_core::KestrelError = ProbeError::Template {
            site: "Broken".to_string(),
            reason: "invalid URL".to_string(),
        }
        .into();
        assert!(matches!(err, kestrel_core::KestrelError::Validation(_)));
    }
}

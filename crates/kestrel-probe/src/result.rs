//! Probe outcomes and session reports.

use kestrel_catalog::{FieldType, SiteRule};
use kestrel_core::{SessionId, TargetIdentifier, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Classification of one site for one identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProbeStatus {
    /// The existence predicate held and the absence predicate did not veto
    Found,
    /// A response was received and did not indicate an account
    NotFound,
    /// No usable response: transport, authentication or template failure
    Error,
}

impl fmt::Display for ProbeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Found => "FOUND",
            Self::NotFound => "NOT_FOUND",
            Self::Error => "ERROR",
        };
        f.write_str(label)
    }
}

/// Diagnostic category of an `ERROR` result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Network, TLS, timeout or redirect failure
    Transport,
    /// Pre-check handshake failure
    Authentication,
    /// The substituted request could not be built
    Template,
}

/// Why a probe ended in `ERROR`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeFailure {
    /// Failure category
    pub kind: ErrorKind,
    /// Human-readable diagnostic
    pub message: String,
}

/// One extracted metadata value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataField {
    /// Field name from the directive
    pub name: String,
    /// Extracted value
    pub value: String,
    /// Display type from the directive
    #[serde(rename = "type")]
    pub field_type: FieldType,
}

/// Outcome of probing one site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeResult {
    /// Site name
    pub site_name: String,
    /// Site category
    pub category: String,
    /// URL reported to the user (the pretty URL when the rule has one)
    pub resolved_url: String,
    /// Classification
    pub status: ProbeStatus,
    /// HTTP status of the main response, when one was received
    pub http_status: Option<u16>,
    /// Extracted fields sorted by name; empty unless `status` is `FOUND`
    pub metadata: Vec<MetadataField>,
    /// Failure details for `ERROR` results
    pub error: Option<ProbeFailure>,
    /// When the probe finished
    pub timestamp: Timestamp,
}

impl ProbeResult {
    /// Result for a response that was classified.
    #[must_use]
    pub fn classified(
        rule: &SiteRule,
        resolved_url: String,
        status: ProbeStatus,
        http_status: u16,
        metadata: Vec<MetadataField>,
    ) -> Self {
        Self {
            site_name: rule.name.clone(),
            category: rule.category.clone(),
            resolved_url,
            status,
            http_status: Some(http_status),
            metadata,
            error: None,
            timestamp: Timestamp::now(),
        }
    }

    /// `ERROR` result with a diagnostic.
    #[must_use]
    pub fn failed(
        rule: &SiteRule,
        resolved_url: String,
        kind: ErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            site_name: rule.name.clone(),
            category: rule.category.clone(),
            resolved_url,
            status: ProbeStatus::Error,
            http_status: None,
            metadata: Vec::new(),
            error: Some(ProbeFailure {
                kind,
                message: message.into(),
            }),
            timestamp: Timestamp::now(),
        }
    }

    /// Whether the account was found.
    #[must_use]
    pub fn is_found(&self) -> bool {
        self.status == ProbeStatus::Found
    }
}

/// Everything a finished (or cancelled) session produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionReport {
    /// Session identifier
    pub session_id: SessionId,
    /// Identifier that was searched
    pub target: TargetIdentifier,
    /// Number of rules scheduled
    pub total: usize,
    /// Results in completion order
    pub results: Vec<ProbeResult>,
    /// Wall-clock duration of the session
    pub elapsed: Duration,
    /// The session was cancelled before every probe finished
    pub cancelled: bool,
    /// When the session started
    pub started_at: Timestamp,
}

impl SessionReport {
    /// Results with status `FOUND`.
    pub fn found(&self) -> impl Iterator<Item = &ProbeResult> {
        self.results.iter().filter(|r| r.is_found())
    }

    /// Number of results with the given status.
    #[must_use]
    pub fn count(&self, status: ProbeStatus) -> usize {
        self.results.iter().filter(|r| r.status == status).count()
    }

    /// Whether every scheduled rule produced a result.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        !self.cancelled && self.results.len() == self.total
    }
}

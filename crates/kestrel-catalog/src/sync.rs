//! Catalog synchronization against a remote source.
//!
//! The synchronizer compares content hashes of the local file and the
//! freshly fetched remote document and only rewrites the file when they
//! differ. A failed fetch never touches the local file, and replacement goes
//! through a sibling temp file plus `rename` so readers never observe a
//! partial write.

use crate::{
    catalog::sites_array,
    error::{CatalogError, SyncError},
    hash::content_hash,
};
use kestrel_core::{CatalogConfig, ProbeConfig, SearchKind};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// A named remote catalog document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteSource {
    /// Label used in logs and reports
    pub name: String,
    /// URL of the JSON document
    pub url: String,
}

impl RemoteSource {
    /// Create a remote source.
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }
}

/// What a sync did to the local file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOutcome {
    /// No usable local catalog existed; the remote one was written
    Fetched,
    /// Local and remote differed; the local file was replaced
    Updated,
    /// Hashes matched; the local file was left as is
    UpToDate,
    /// The remote could not be fetched or parsed (or the write failed); the
    /// local file is untouched
    FetchFailed,
}

/// Result of synchronizing one catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncReport {
    /// Remote source name
    pub source: String,
    /// Local catalog path
    pub local_path: PathBuf,
    /// What happened
    pub outcome: SyncOutcome,
    /// Hash of the local document before the sync, if it was readable
    pub local_hash: Option<String>,
    /// Hash of the fetched remote document
    pub remote_hash: Option<String>,
    /// The local file existed but could not be parsed and was replaced
    pub recovered_from_corrupt_local: bool,
    /// Diagnostic for [`SyncOutcome::FetchFailed`]
    pub error: Option<String>,
}

enum LocalState {
    Missing,
    Corrupt(String),
    Present(String),
}

/// Keeps local catalog files current with their remote sources.
#[derive(Clone)]
pub struct CatalogSynchronizer {
    client: reqwest::Client,
}

impl CatalogSynchronizer {
    /// Create a synchronizer with the given request timeout and optional proxy.
    ///
    /// TLS certificate verification is disabled, matching the probe client.
    pub fn new(timeout: Duration, proxy: Option<&str>) -> Result<Self, SyncError> {
        let mut builder = reqwest::Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(true)
            .user_agent(concat!("kestrel/", env!("CARGO_PKG_VERSION")));

        if let Some(proxy) = proxy.filter(|p| !p.is_empty()) {
            let proxy = reqwest::Proxy::all(proxy)
                .map_err(|e| SyncError::Client(format!("invalid proxy '{proxy}': {e}")))?;
            builder = builder.proxy(proxy);
        }

        let client = builder
            .build()
            .map_err(|e| SyncError::Client(e.to_string()))?;

        Ok(Self { client })
    }

    /// Create a synchronizer using the probe timeout and proxy settings.
    pub fn from_config(probe: &ProbeConfig) -> Result<Self, SyncError> {
        Self::new(Duration::from_secs(probe.timeout_secs), probe.proxy.as_deref())
    }

    /// Use an existing HTTP client.
    #[must_use]
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Bring the catalog at `local_path` in line with `remote`.
    ///
    /// Never fails: every problem is folded into the returned report.
    pub async fn sync(&self, local_path: &Path, remote: &RemoteSource) -> SyncReport {
        let local = read_local(local_path).await;

        let mut report = SyncReport {
            source: remote.name.clone(),
            local_path: local_path.to_path_buf(),
            outcome: SyncOutcome::FetchFailed,
            local_hash: match &local {
                LocalState::Present(hash) => Some(hash.clone()),
                _ => None,
            },
            remote_hash: None,
            recovered_from_corrupt_local: false,
            error: None,
        };

        let (body, remote_hash) = match self.fetch(remote).await {
            Ok(fetched) => fetched,
            Err(e) => {
                warn!(source = %remote.name, url = %remote.url, error = %e, "could not fetch remote catalog");
                report.error = Some(e.to_string());
                return report;
            }
        };
        report.remote_hash = Some(remote_hash.clone());

        let outcome = match local {
            LocalState::Present(local_hash) if local_hash == remote_hash => {
                debug!(source = %remote.name, hash = %local_hash, "catalog up to date");
                report.outcome = SyncOutcome::UpToDate;
                return report;
            }
            LocalState::Present(_) => SyncOutcome::Updated,
            LocalState::Missing => SyncOutcome::Fetched,
            LocalState::Corrupt(reason) => {
                warn!(
                    path = %local_path.display(),
                    reason = %reason,
                    "local catalog is unreadable, replacing it with the remote copy"
                );
                report.recovered_from_corrupt_local = true;
                SyncOutcome::Fetched
            }
        };

        if let Err(e) = persist_atomic(local_path, &body).await {
            warn!(path = %local_path.display(), error = %e, "could not persist fetched catalog");
            report.error = Some(e.to_string());
            return report;
        }

        info!(
            source = %remote.name,
            path = %local_path.display(),
            outcome = ?outcome,
            hash = %remote_hash,
            "catalog synchronized"
        );
        report.outcome = outcome;
        report
    }

    /// Sync every configured catalog that has a remote URL.
    ///
    /// Returns no reports when `auto_update` is off.
    pub async fn sync_all(&self, config: &CatalogConfig) -> Vec<SyncReport> {
        if !config.auto_update {
            info!("catalog auto-update disabled, skipping sync");
            return Vec::new();
        }

        let mut targets = Vec::new();
        for kind in [SearchKind::Username, SearchKind::Email] {
            let source = config.source(kind);
            if let Some(url) = &source.remote_url {
                targets.push((source.local_path.clone(), RemoteSource::new(kind.display_name(), url)));
            }
        }
        if let Some(source) = &config.metadata {
            if let Some(url) = &source.remote_url {
                targets.push((source.local_path.clone(), RemoteSource::new("metadata", url)));
            }
        }

        let mut reports = Vec::with_capacity(targets.len());
        for (path, remote) in &targets {
            reports.push(self.sync(path, remote).await);
        }
        reports
    }

    /// Fetch and validate the remote document; returns the raw body and its hash.
    async fn fetch(&self, remote: &RemoteSource) -> Result<(String, String), SyncError> {
        let response = self
            .client
            .get(&remote.url)
            .send()
            .await
            .map_err(|source| SyncError::Fetch {
                url: remote.url.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::Status {
                url: remote.url.clone(),
                status: status.as_u16(),
            });
        }

        let body = response.text().await.map_err(|source| SyncError::Fetch {
            url: remote.url.clone(),
            source,
        })?;

        let document: Value =
            serde_json::from_str(&body).map_err(|source| CatalogError::ParseError {
                origin: remote.name.clone(),
                source,
            })?;
        sites_array(&remote.name, &document)?;

        Ok((body, content_hash(&document)))
    }
}

async fn read_local(path: &Path) -> LocalState {
    let contents = match tokio::fs::read_to_string(path).await {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return LocalState::Missing,
        Err(e) => return LocalState::Corrupt(e.to_string()),
    };

    match serde_json::from_str::<Value>(&contents) {
        Ok(document) => match sites_array("local", &document) {
            Ok(_) => LocalState::Present(content_hash(&document)),
            Err(e) => LocalState::Corrupt(e.to_string()),
        },
        Err(e) => LocalState::Corrupt(e.to_string()),
    }
}

/// Write `contents` next to `path` and rename it into place.
async fn persist_atomic(path: &Path, contents: &str) -> Result<(), SyncError> {
    let persist_err = |source| SyncError::Persist {
        path: path.display().to_string(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(persist_err)?;
    }

    let file_name = path
        .file_name()
        .map_or_else(|| "catalog".into(), |n| n.to_string_lossy().into_owned());
    let temp_path = path.with_file_name(format!(".{file_name}.{}.tmp", std::process::id()));

    tokio::fs::write(&temp_path, contents)
        .await
        .map_err(persist_err)?;

    if let Err(e) = tokio::fs::rename(&temp_path, path).await {
        let _ = tokio::fs::remove_file(&temp_path).await;
        return Err(persist_err(e));
    }

    Ok(())
}

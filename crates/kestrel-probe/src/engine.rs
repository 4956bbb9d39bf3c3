//! Search orchestration.
//!
//! Ties the pieces together for one search: optional catalog refresh,
//! catalog load, rule selection, executor setup and the session itself.

use crate::dump::DirectorySink;
use crate::error::ProbeError;
use crate::executor::ProbeExecutor;
use crate::filter::SiteFilter;
use crate::progress::ProgressObserver;
use crate::result::SessionReport;
use crate::session::ProbeSession;
use kestrel_catalog::{load_for_kind, Catalog, CatalogSynchronizer, SyncReport};
use kestrel_core::{KestrelConfig, SearchKind, TargetIdentifier};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Entry point for running searches against the configured catalogs.
pub struct ProbeEngine {
    config: Arc<KestrelConfig>,
}

impl ProbeEngine {
    /// Create an engine over a runtime configuration.
    #[must_use]
    pub fn new(config: KestrelConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    /// Runtime configuration.
    #[must_use]
    pub fn config(&self) -> &KestrelConfig {
        &self.config
    }

    /// Refresh every catalog with a remote source.
    ///
    /// Sync problems never stop a search; they are logged and reported.
    pub async fn sync_catalogs(&self) -> Vec<SyncReport> {
        let synchronizer = match CatalogSynchronizer::from_config(&self.config.probe) {
            Ok(synchronizer) => synchronizer,
            Err(e) => {
                warn!(error = %e, "cannot synchronize catalogs");
                return Vec::new();
            }
        };
        synchronizer.sync_all(&self.config.catalog).await
    }

    /// Load the catalog for a search kind from its local file.
    ///
    /// File reads and rule compilation run on the blocking pool.
    pub async fn load_catalog(&self, kind: SearchKind) -> Result<Catalog, ProbeError> {
        let config = Arc::clone(&self.config);
        let catalog = tokio::task::spawn_blocking(move || load_for_kind(&config.catalog, kind)).await??;
        Ok(catalog)
    }

    /// Search for `target` across the rules of `kind` selected by `filter`.
    ///
    /// Catalog sync runs first when `auto_update` is set. Cancelling `cancel`
    /// stops the session and returns the results gathered so far.
    pub async fn run(
        &self,
        target: &TargetIdentifier,
        kind: SearchKind,
        filter: &SiteFilter,
        observer: &dyn ProgressObserver,
        cancel: CancellationToken,
    ) -> Result<SessionReport, ProbeError> {
        if self.config.catalog.auto_update {
            self.sync_catalogs().await;
        }

        let catalog = self.load_catalog(kind).await?;
        let rules = filter.select(catalog.rules(), self.config.probe.exclude_nsfw);
        info!(
            kind = %kind,
            catalog = catalog.len(),
            selected = rules.len(),
            "selected site rules"
        );

        let mut executor = ProbeExecutor::new(Arc::clone(&self.config))?;
        if self.config.probe.dump {
            let sink = DirectorySink::for_target(&self.config.probe.dump_dir, target.as_str());
            info!(path = %sink.root().display(), "dumping found responses");
            executor = executor.with_sink(Arc::new(sink));
        }

        let session = ProbeSession::new(target.clone(), rules, self.config.probe.concurrency)
            .with_cancellation(cancel);

        Ok(session.run(&executor, observer).await)
    }
}

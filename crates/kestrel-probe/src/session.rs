//! Bounded-concurrency probe sessions.
//!
//! Every rule is scheduled up front; a semaphore admits at most
//! `concurrency` probes into flight and each probe holds its permit until it
//! resolves. Results are collected in completion order and progress is
//! reported after every resolution.

use crate::executor::ProbeExecutor;
use crate::progress::{ProgressEvent, ProgressObserver};
use crate::result::{ErrorKind, ProbeResult, SessionReport};
use futures::stream::{FuturesUnordered, StreamExt};
use kestrel_catalog::SiteRule;
use kestrel_core::{SessionId, TargetIdentifier, Timestamp};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Results gathered by [`drive`].
#[derive(Debug)]
pub struct DriveOutcome {
    /// Results in completion order
    pub results: Vec<ProbeResult>,
    /// Cancellation stopped the drain early
    pub cancelled: bool,
}

/// Run `probe` for every rule with at most `limit` in flight.
///
/// `probe` is only invoked once the rule holds an admission permit, so the
/// future it returns runs entirely inside the bound. On cancellation the
/// pending probes are dropped (releasing their permits) and the results
/// gathered so far are returned.
pub async fn drive<F, Fut>(
    rules: &[Arc<SiteRule>],
    limit: usize,
    probe: F,
    observer: &dyn ProgressObserver,
    cancel: &CancellationToken,
) -> DriveOutcome
where
    F: Fn(Arc<SiteRule>) -> Fut,
    Fut: Future<Output = ProbeResult>,
{
    let total = rules.len();
    let gate = Semaphore::new(limit.max(1));
    let completed = AtomicUsize::new(0);
    let probe = &probe;
    let gate = &gate;

    let mut pending: FuturesUnordered<_> = rules
        .iter()
        .map(|rule| {
            let rule = Arc::clone(rule);
            async move {
                let Ok(_permit) = gate.acquire().await else {
                    return ProbeResult::failed(
                        &rule,
                        rule.uri_template.clone(),
                        ErrorKind::Transport,
                        "admission gate closed",
                    );
                };
                probe(rule).await
            }
        })
        .collect();

    let mut results = Vec::with_capacity(total);
    let mut cancelled = false;

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                cancelled = true;
                break;
            }
            next = pending.next() => {
                let Some(result) = next else { break };
                let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                observer.on_progress(ProgressEvent {
                    completed: done,
                    total,
                    result: &result,
                });
                results.push(result);
            }
        }
    }

    if cancelled {
        warn!(
            completed = results.len(),
            total,
            "session cancelled, returning partial results"
        );
    }

    DriveOutcome { results, cancelled }
}

/// One search for one identifier over a filtered rule set.
pub struct ProbeSession {
    id: SessionId,
    target: TargetIdentifier,
    rules: Vec<Arc<SiteRule>>,
    concurrency: usize,
    cancel: CancellationToken,
}

impl ProbeSession {
    /// Create a session probing `rules` for `target`.
    #[must_use]
    pub fn new(target: TargetIdentifier, rules: Vec<Arc<SiteRule>>, concurrency: usize) -> Self {
        Self {
            id: SessionId::generate(),
            target,
            rules,
            concurrency: concurrency.max(1),
            cancel: CancellationToken::new(),
        }
    }

    /// Use an externally owned cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Token that cancels this session.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Session identifier.
    #[must_use]
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Identifier being searched.
    #[must_use]
    pub fn target(&self) -> &TargetIdentifier {
        &self.target
    }

    /// Number of rules scheduled.
    #[must_use]
    pub fn total(&self) -> usize {
        self.rules.len()
    }

    /// Run every probe and drain the results.
    pub async fn run(self, executor: &ProbeExecutor, observer: &dyn ProgressObserver) -> SessionReport {
        let started_at = Timestamp::now();
        let clock = Instant::now();
        let identifier = self.target.as_str();

        info!(
            session = %self.id,
            target = %self.target,
            sites = self.rules.len(),
            concurrency = self.concurrency,
            "starting probe session"
        );

        let cancel = &self.cancel;
        let outcome = drive(
            &self.rules,
            self.concurrency,
            |rule| async move { executor.probe(&rule, identifier, cancel).await },
            observer,
            cancel,
        )
        .await;

        let report = SessionReport {
            session_id: self.id.clone(),
            target: self.target.clone(),
            total: self.rules.len(),
            results: outcome.results,
            elapsed: clock.elapsed(),
            cancelled: outcome.cancelled,
            started_at,
        };

        info!(
            session = %report.session_id,
            found = report.count(crate::result::ProbeStatus::Found),
            not_found = report.count(crate::result::ProbeStatus::NotFound),
            errors = report.count(crate::result::ProbeStatus::Error),
            elapsed_secs = report.elapsed.as_secs_f64(),
            "probe session finished"
        );
        debug!(session = %report.session_id, cancelled = report.cancelled, "session drained");

        report
    }
}

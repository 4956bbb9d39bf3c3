//! Probe execution for a single site rule.
//!
//! A probe is a short state sequence: transform the identifier, build the
//! request, authenticate if the rule asks for it, send, classify, extract.
//! Every failure along the way becomes an `ERROR` result; nothing is raised
//! to the scheduler.

use crate::dump::ResponseSink;
use crate::error::ProbeError;
use crate::extractor::extract;
use crate::http::{self, ClientSettings};
use crate::precheck::authenticate;
use crate::result::{ErrorKind, ProbeResult, ProbeStatus};
use crate::template::{substitute, RequestPlan};
use crate::user_agent::session_user_agent;
use kestrel_catalog::{transform, SiteRule};
use kestrel_core::KestrelConfig;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Classify a response against a rule's predicates.
///
/// `FOUND` iff the existence predicate holds and the absence predicate does
/// not veto; an absence predicate with nothing declared never vetoes.
#[must_use]
pub fn classify(rule: &SiteRule, status: u16, body: &str) -> ProbeStatus {
    if rule.existence.holds(status, body) && !rule.absence.vetoes(status, body) {
        ProbeStatus::Found
    } else {
        ProbeStatus::NotFound
    }
}

/// Runs probes for one session.
///
/// Holds the session HTTP client (and with it the session User-Agent), the
/// runtime configuration for pre-check credentials, and an optional dump sink.
#[derive(Clone)]
pub struct ProbeExecutor {
    client: reqwest::Client,
    config: Arc<KestrelConfig>,
    sink: Option<Arc<dyn ResponseSink>>,
    user_agent: String,
}

impl ProbeExecutor {
    /// Create an executor from configuration, picking the session User-Agent.
    pub fn new(config: Arc<KestrelConfig>) -> Result<Self, ProbeError> {
        let user_agent = session_user_agent(config.probe.user_agent.as_deref());
        let client = http::build_client(&ClientSettings {
            timeout: Duration::from_secs(config.probe.timeout_secs),
            proxy: config.probe.proxy.clone(),
            user_agent: user_agent.clone(),
        })?;

        debug!(user_agent = %user_agent, "created probe executor");

        Ok(Self {
            client,
            config,
            sink: None,
            user_agent,
        })
    }

    /// Persist bodies of found accounts to `sink`.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn ResponseSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// User-Agent used for every request of this executor.
    #[must_use]
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// Probe one rule for `identifier`.
    ///
    /// Both the pre-check and the main request race `cancel`.
    pub async fn probe(
        &self,
        rule: &SiteRule,
        identifier: &str,
        cancel: &CancellationToken,
    ) -> ProbeResult {
        let account = transform(identifier, rule.input_operation);

        let plan = match RequestPlan::build(rule, &account) {
            Ok(plan) => plan,
            Err(e) => {
                let url = substitute(
                    rule.uri_pretty.as_deref().unwrap_or(&rule.uri_template),
                    &account,
                );
                return self.finish(ProbeResult::failed(rule, url, ErrorKind::Template, e.to_string()));
            }
        };

        let mut headers = plan.headers;
        if let Some(pre_check) = &rule.pre_check {
            let outcome = tokio::select! {
                () = cancel.cancelled() => Err(crate::error::AuthenticationError::Cancelled),
                outcome = authenticate(&self.client, pre_check, headers, &account, &self.config) => outcome,
            };

            headers = match outcome {
                Ok(authenticated) => authenticated,
                Err(source) => {
                    let err = ProbeError::Authentication {
                        site: rule.name.clone(),
                        source,
                    };
                    return self.finish(ProbeResult::failed(
                        rule,
                        plan.display_url,
                        ErrorKind::Authentication,
                        err.to_string(),
                    ));
                }
            };
        }

        let response = tokio::select! {
            () = cancel.cancelled() => Err("cancelled".to_string()),
            sent = http::send(&self.client, plan.method, &plan.url, headers, plan.body) => {
                sent.map_err(|e| transport_reason(&e))
            }
        };

        let response = match response {
            Ok(response) => response,
            Err(reason) => {
                let err = ProbeError::Transport {
                    url: plan.url,
                    reason,
                };
                return self.finish(ProbeResult::failed(
                    rule,
                    plan.display_url,
                    ErrorKind::Transport,
                    err.to_string(),
                ));
            }
        };

        let status = classify(rule, response.status_code(), &response.body);
        let metadata = if status == ProbeStatus::Found && rule.has_metadata() {
            extract(&rule.metadata, &response)
        } else {
            Vec::new()
        };

        if status == ProbeStatus::Found {
            if let Some(sink) = &self.sink {
                match sink.store(rule, &response).await {
                    Ok(path) => debug!(site = %rule.name, path = %path.display(), "dumped response"),
                    Err(e) => warn!(site = %rule.name, error = %e, "could not dump response"),
                }
            }
        }

        self.finish(ProbeResult::classified(
            rule,
            plan.display_url,
            status,
            response.status_code(),
            metadata,
        ))
    }

    fn finish(&self, result: ProbeResult) -> ProbeResult {
        let verbose = self.config.probe.verbose;
        match result.status {
            ProbeStatus::Found => info!(
                site = %result.site_name,
                url = %result.resolved_url,
                fields = result.metadata.len(),
                "account found"
            ),
            ProbeStatus::NotFound if verbose => info!(
                site = %result.site_name,
                url = %result.resolved_url,
                http_status = ?result.http_status,
                "account not found"
            ),
            ProbeStatus::Error if verbose => info!(
                site = %result.site_name,
                url = %result.resolved_url,
                error = ?result.error,
                "probe failed"
            ),
            status => debug!(
                site = %result.site_name,
                status = %status,
                error = ?result.error,
                "probe finished"
            ),
        }
        result
    }
}

fn transport_reason(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        "timed out".to_string()
    } else if err.is_redirect() {
        format!("too many redirects: {err}")
    } else if err.is_connect() {
        format!("connection failed: {err}")
    } else {
        err.to_string()
    }
}

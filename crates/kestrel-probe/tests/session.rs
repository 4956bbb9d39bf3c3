use kestrel_catalog::{Catalog, SiteRule};
use kestrel_core::{KestrelConfig, SearchKind, TargetIdentifier};
use kestrel_probe::{
    drive, NoopObserver, ProbeEngine, ProbeExecutor, ProbeResult, ProbeSession, ProbeStatus,
    ProgressEvent, SiteFilter,
};
use rand::Rng;
use serde_json::json;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn catalog(count: usize, base: &str) -> Catalog {
    let sites: Vec<_> = (0..count)
        .map(|i| {
            json!({
                "name": format!("site-{i:02}"),
                "cat": if i % 2 == 0 { "social" } else { "coding" },
                "uri_check": format!("{base}/site-{i:02}/{{account}}"),
                "e_code": 200,
                "e_string": "profile-card",
                "m_code": 404
            })
        })
        .collect();
    Catalog::from_document("test", &json!({ "sites": sites })).expect("parse catalog")
}

fn not_found(rule: &SiteRule) -> ProbeResult {
    ProbeResult::classified(rule, rule.uri_template.clone(), ProbeStatus::NotFound, 404, Vec::new())
}

#[tokio::test]
async fn concurrency_never_exceeds_limit() {
    let catalog = catalog(40, "https://example.com");
    let in_flight = AtomicUsize::new(0);
    let peak = AtomicUsize::new(0);

    let outcome = drive(
        catalog.rules(),
        4,
        |rule| {
            let in_flight = &in_flight;
            let peak = &peak;
            async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                let jitter = rand::thread_rng().gen_range(1..15);
                tokio::time::sleep(Duration::from_millis(jitter)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                not_found(&rule)
            }
        },
        &NoopObserver,
        &CancellationToken::new(),
    )
    .await;

    assert!(!outcome.cancelled);
    assert_eq!(outcome.results.len(), 40);
    let peak = peak.load(Ordering::SeqCst);
    assert!(peak <= 4, "peak concurrency {peak} exceeded the limit");
    assert!(peak >= 2, "probes never overlapped");
}

#[tokio::test]
async fn zero_limit_still_makes_progress() {
    let catalog = catalog(3, "https://example.com");
    let outcome = drive(
        catalog.rules(),
        0,
        |rule| async move { not_found(&rule) },
        &NoopObserver,
        &CancellationToken::new(),
    )
    .await;
    assert_eq!(outcome.results.len(), 3);
}

#[tokio::test]
async fn progress_is_monotonic_and_reaches_total_once() {
    let catalog = catalog(25, "https://example.com");
    let seen = Mutex::new(Vec::new());
    let observer = |event: ProgressEvent<'_>| {
        assert_eq!(event.total, 25);
        seen.lock().expect("lock").push(event.completed);
    };

    let outcome = drive(
        catalog.rules(),
        8,
        |rule| async move {
            let jitter = rand::thread_rng().gen_range(0..20);
            tokio::time::sleep(Duration::from_millis(jitter)).await;
            not_found(&rule)
        },
        &observer,
        &CancellationToken::new(),
    )
    .await;

    let seen = seen.into_inner().expect("lock");
    assert_eq!(seen, (1..=25).collect::<Vec<_>>());
    assert_eq!(seen.iter().filter(|&&c| c == 25).count(), 1);
    assert_eq!(outcome.results.len(), 25);
}

#[tokio::test]
async fn cancellation_returns_partial_results() {
    let catalog = catalog(10, "https://example.com");
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        trigger.cancel();
    });

    let outcome = drive(
        catalog.rules(),
        10,
        |rule| async move {
            // Even-numbered sites answer quickly, the rest hang.
            let fast = rule.category == "social";
            let delay = if fast { 10 } else { 60_000 };
            tokio::time::sleep(Duration::from_millis(delay)).await;
            not_found(&rule)
        },
        &NoopObserver,
        &cancel,
    )
    .await;

    assert!(outcome.cancelled);
    assert_eq!(outcome.results.len(), 5);
    assert!(outcome.results.iter().all(|r| r.category == "social"));
}

#[tokio::test]
async fn session_yields_one_result_per_rule() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/site-0[0-4]/octocat$"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<div>profile-card</div>"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/site-(0[5-9]|1[0-1])/octocat$"))
        .respond_with(ResponseTemplate::new(404).set_body_string("missing"))
        .mount(&server)
        .await;

    let catalog = catalog(12, &server.uri());
    let mut config = KestrelConfig::default();
    config.probe.timeout_secs = 5;
    let executor = ProbeExecutor::new(Arc::new(config)).expect("build executor");

    let session = ProbeSession::new(
        TargetIdentifier::new("octocat").expect("valid identifier"),
        catalog.rules().to_vec(),
        3,
    );
    assert_eq!(session.total(), 12);

    let report = session.run(&executor, &NoopObserver).await;

    assert!(report.is_complete());
    assert_eq!(report.results.len(), 12);
    let names: HashSet<&str> = report.results.iter().map(|r| r.site_name.as_str()).collect();
    assert_eq!(names.len(), 12);
    assert_eq!(report.count(ProbeStatus::Found), 5);
    assert_eq!(report.count(ProbeStatus::NotFound), 7);
    assert_eq!(report.count(ProbeStatus::Error), 0);
}

#[tokio::test]
async fn session_cancelled_before_start_reports_nothing() {
    let catalog = catalog(4, "https://example.com");
    let executor = ProbeExecutor::new(Arc::new(KestrelConfig::default())).expect("build executor");
    let session = ProbeSession::new(
        TargetIdentifier::new("octocat").expect("valid identifier"),
        catalog.rules().to_vec(),
        2,
    );
    session.cancellation_token().cancel();

    let report = session.run(&executor, &NoopObserver).await;

    assert!(report.cancelled);
    assert!(report.results.is_empty());
    assert!(!report.is_complete());
}

#[tokio::test]
async fn engine_runs_filtered_search_from_local_catalog() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/site-\d+/octocat$"))
        .respond_with(ResponseTemplate::new(200).set_body_string("profile-card"))
        .mount(&server)
        .await;

    let temp_dir = TempDir::new().expect("create temp dir");
    let catalog_path = temp_dir.path().join("wmn-data.json");
    let sites: Vec<_> = (0..6)
        .map(|i| {
            json!({
                "name": format!("site-{i}"),
                "cat": if i == 5 { "xx NSFW xx" } else if i % 2 == 0 { "social" } else { "coding" },
                "uri_check": format!("{}/site-{i}/{{account}}", server.uri()),
                "e_code": 200,
                "e_string": "profile-card"
            })
        })
        .collect();
    std::fs::write(&catalog_path, json!({ "sites": sites }).to_string()).expect("write catalog");

    let mut config = KestrelConfig::default();
    config.catalog.auto_update = false;
    config.catalog.username.local_path = catalog_path;
    config.catalog.metadata = None;
    config.probe.timeout_secs = 5;
    config.probe.exclude_nsfw = true;

    let engine = ProbeEngine::new(config);
    let target = TargetIdentifier::new("octocat").expect("valid identifier");

    let report = engine
        .run(
            &target,
            SearchKind::Username,
            &SiteFilter::Category("coding".to_string()),
            &NoopObserver,
            CancellationToken::new(),
        )
        .await
        .expect("run search");
    assert_eq!(report.total, 2);
    assert_eq!(report.count(ProbeStatus::Found), 2);

    let report = engine
        .run(
            &target,
            SearchKind::Username,
            &SiteFilter::All,
            &NoopObserver,
            CancellationToken::new(),
        )
        .await
        .expect("run search");
    assert_eq!(report.total, 5, "NSFW rule should be excluded");
}

#[tokio::test]
async fn engine_reports_missing_catalog() {
    let temp_dir = TempDir::new().expect("create temp dir");
    let mut config = KestrelConfig::default();
    config.catalog.auto_update = false;
    config.catalog.email.local_path = temp_dir.path().join("absent.json");

    let result = ProbeEngine::new(config)
        .run(
            &TargetIdentifier::new("jane@example.com").expect("valid identifier"),
            SearchKind::Email,
            &SiteFilter::All,
            &NoopObserver,
            CancellationToken::new(),
        )
        .await;

    assert!(result.is_err());
}

#[tokio::test(flavor = "current_thread")]
async fn engine_loads_catalog_on_blocking_pool() {
    let temp_dir = TempDir::new().expect("create temp dir");
    let catalog_path = temp_dir.path().join("wmn-data.json");
    std::fs::write(
        &catalog_path,
        json!({ "sites": [{
            "name": "GitHub",
            "cat": "coding",
            "uri_check": "https://api.github.com/users/{account}",
            "e_code": 200,
            "e_string": "login"
        }] })
        .to_string(),
    )
    .expect("write catalog");

    let mut config = KestrelConfig::default();
    config.catalog.auto_update = false;
    config.catalog.username.local_path = catalog_path;
    config.catalog.metadata = None;
    let engine = ProbeEngine::new(config);

    let catalog = engine
        .load_catalog(SearchKind::Username)
        .await
        .expect("load catalog");

    assert_eq!(catalog.len(), 1);
    assert!(catalog.get("GitHub").is_some());
}

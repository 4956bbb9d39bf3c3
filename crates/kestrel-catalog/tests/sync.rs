use kestrel_catalog::{content_hash, CatalogLoader, CatalogSynchronizer, RemoteSource, SyncOutcome};
use serde_json::Value;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const REMOTE: &str = r#"{"sites":[{"name":"GitHub","uri_check":"https://api.github.com/users/{account}","e_code":200,"e_string":"login","m_code":404,"m_string":"Not Found","cat":"coding"}]}"#;

// Same document as REMOTE, different key order and whitespace.
const LOCAL_EQUIVALENT: &str = r#"{
  "sites": [
    {
      "cat": "coding",
      "e_code": 200,
      "e_string": "login",
      "m_code": 404,
      "m_string": "Not Found",
      "name": "GitHub",
      "uri_check": "https://api.github.com/users/{account}"
    }
  ]
}
"#;

const LOCAL_STALE: &str = r#"{"sites":[{"name":"GitHub","uri_check":"https://github.com/{account}","e_code":200,"e_string":"login","cat":"coding"}]}"#;

async fn remote_serving(status: u16, body: &str) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/wmn-data.json"))
        .respond_with(ResponseTemplate::new(status).set_body_string(body))
        .mount(&server)
        .await;
    server
}

fn remote_source(server: &MockServer) -> RemoteSource {
    RemoteSource::new("username", format!("{}/wmn-data.json", server.uri()))
}

fn synchronizer() -> CatalogSynchronizer {
    CatalogSynchronizer::new(Duration::from_secs(5), None).expect("build synchronizer")
}

fn local_file(dir: &TempDir, contents: Option<&str>) -> PathBuf {
    let path = dir.path().join("wmn-data.json");
    if let Some(contents) = contents {
        std::fs::write(&path, contents).expect("write local catalog");
    }
    path
}

fn hash_of(text: &str) -> String {
    content_hash(&serde_json::from_str::<Value>(text).expect("parse JSON"))
}

#[tokio::test]
async fn fetches_when_no_local_catalog() {
    let server = remote_serving(200, REMOTE).await;
    let temp_dir = TempDir::new().expect("create temp dir");
    let path = local_file(&temp_dir, None);

    let report = synchronizer().sync(&path, &remote_source(&server)).await;

    assert_eq!(report.outcome, SyncOutcome::Fetched);
    assert!(!report.recovered_from_corrupt_local);
    assert_eq!(std::fs::read_to_string(&path).expect("read local"), REMOTE);

    let catalog = CatalogLoader::new(&path)
        .expect("create loader")
        .load()
        .expect("load synced catalog");
    assert_eq!(catalog.len(), 1);
}

#[tokio::test]
async fn up_to_date_leaves_bytes_untouched() {
    let server = remote_serving(200, REMOTE).await;
    let temp_dir = TempDir::new().expect("create temp dir");
    let path = local_file(&temp_dir, Some(LOCAL_EQUIVALENT));

    let report = synchronizer().sync(&path, &remote_source(&server)).await;

    assert_eq!(report.outcome, SyncOutcome::UpToDate);
    assert_eq!(report.local_hash, report.remote_hash);
    assert_eq!(
        std::fs::read_to_string(&path).expect("read local"),
        LOCAL_EQUIVALENT
    );
}

#[tokio::test]
async fn updates_stale_local_catalog() {
    let server = remote_serving(200, REMOTE).await;
    let temp_dir = TempDir::new().expect("create temp dir");
    let path = local_file(&temp_dir, Some(LOCAL_STALE));

    let report = synchronizer().sync(&path, &remote_source(&server)).await;

    assert_eq!(report.outcome, SyncOutcome::Updated);
    assert_eq!(report.local_hash.as_deref(), Some(hash_of(LOCAL_STALE).as_str()));

    let after = std::fs::read_to_string(&path).expect("read local");
    assert_eq!(hash_of(&after), hash_of(REMOTE));
    assert_eq!(report.remote_hash.as_deref(), Some(hash_of(REMOTE).as_str()));
}

#[tokio::test]
async fn fetch_failure_keeps_local_catalog() {
    let temp_dir = TempDir::new().expect("create temp dir");
    let path = local_file(&temp_dir, Some(LOCAL_STALE));

    for (status, body) in [(503, "unavailable"), (200, "<html>not json</html>"), (200, r#"{"entries": []}"#)] {
        let server = remote_serving(status, body).await;
        let report = synchronizer().sync(&path, &remote_source(&server)).await;

        assert_eq!(report.outcome, SyncOutcome::FetchFailed, "status {status} body {body}");
        assert!(report.error.is_some());
        assert_eq!(std::fs::read_to_string(&path).expect("read local"), LOCAL_STALE);
    }
}

#[tokio::test]
async fn unreachable_remote_is_fetch_failed() {
    let temp_dir = TempDir::new().expect("create temp dir");
    let path = local_file(&temp_dir, None);
    let remote = RemoteSource::new("username", "http://127.0.0.1:9/wmn-data.json");

    let report = synchronizer().sync(&path, &remote).await;

    assert_eq!(report.outcome, SyncOutcome::FetchFailed);
    assert!(!path.exists());
}

#[tokio::test]
async fn corrupt_local_catalog_is_replaced() {
    let server = remote_serving(200, REMOTE).await;
    let temp_dir = TempDir::new().expect("create temp dir");
    let path = local_file(&temp_dir, Some("{\"sites\": [ {\"name\": "));

    let report = synchronizer().sync(&path, &remote_source(&server)).await;

    assert_eq!(report.outcome, SyncOutcome::Fetched);
    assert!(report.recovered_from_corrupt_local);
    assert!(report.local_hash.is_none());
    assert_eq!(std::fs::read_to_string(&path).expect("read local"), REMOTE);
}

//! Persistence of raw response bodies for found accounts.

use crate::error::ProbeError;
use crate::http::ProbeResponse;
use async_trait::async_trait;
use kestrel_catalog::SiteRule;
use std::path::{Path, PathBuf};

/// Destination for bodies of `FOUND` responses.
#[async_trait]
pub trait ResponseSink: Send + Sync {
    /// Store the response for `rule`; returns where it went.
    async fn store(&self, rule: &SiteRule, response: &ProbeResponse) -> Result<PathBuf, ProbeError>;
}

/// Writes one file per site into a directory.
///
/// JSON responses are pretty-printed into `<site>.json`, HTML into
/// `<site>.html`, anything else into `<site>.txt`. Spaces in site names
/// become underscores.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    root: PathBuf,
}

impl DirectorySink {
    /// Sink writing into `root` (created on first write).
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Sink for one target under a base directory: `<base>/dump_<target>`.
    pub fn for_target(base: &Path, target: &str) -> Self {
        Self::new(base.join(format!("dump_{}", file_stem(target))))
    }

    /// Directory receiving the files.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl ResponseSink for DirectorySink {
    async fn store(&self, rule: &SiteRule, response: &ProbeResponse) -> Result<PathBuf, ProbeError> {
        let (extension, contents) = match response.json.as_ref() {
            Some(json) if response.is_json() => (
                "json",
                serde_json::to_string_pretty(json).unwrap_or_else(|_| response.body.clone()),
            ),
            _ if response.is_html() => ("html", response.body.clone()),
            _ => ("txt", response.body.clone()),
        };

        let path = self.root.join(format!("{}.{extension}", file_stem(&rule.name)));
        let dump_err = |source| ProbeError::Dump {
            path: path.display().to_string(),
            source,
        };

        tokio::fs::create_dir_all(&self.root).await.map_err(dump_err)?;
        tokio::fs::write(&path, contents).await.map_err(dump_err)?;
        Ok(path)
    }
}

/// A file-name-safe stem.
fn file_stem(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            ' ' | '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c => c,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use kestrel_catalog::{SiteRecord, SiteRule};
    use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
    use reqwest::StatusCode;
    use tempfile::TempDir;

    fn rule(name: &str) -> SiteRule {
        let record: SiteRecord = serde_json::from_value(serde_json::json!({
            "name": name,
            "cat": "social",
            "uri_check": "https://example.com/{account}",
            "e_code": 200
        }))
        .expect("site record");
        SiteRule::try_from(record).expect("valid rule")
    }

    fn response(content_type: &'static str, body: &str) -> ProbeResponse {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        ProbeResponse {
            url: "https://example.com/octocat".to_string(),
            status: StatusCode::OK,
            headers,
            body: body.to_string(),
            json: serde_json::from_str(body).ok(),
        }
    }

    #[tokio::test]
    async fn test_extension_by_content_type() {
        let temp_dir = TempDir::new().expect("create temp dir");
        let sink = DirectorySink::for_target(temp_dir.path(), "octocat");

        let html = sink
            .store(&rule("Hacker News"), &response("text/html; charset=utf-8", "<p>hi</p>"))
            .await
            .expect("store html");
        assert!(html.ends_with("dump_octocat/Hacker_News.html"));

        let json = sink
            .store(&rule("GitHub"), &response("application/json", r#"{"login":"octocat"}"#))
            .await
            .expect("store json");
        let written = std::fs::read_to_string(&json).expect("read json dump");
        assert!(written.contains("\n  \"login\": \"octocat\""));

        let text = sink
            .store(&rule("Plain"), &response("text/plain", "hello"))
            .await
            .expect("store text");
        assert_eq!(text.extension().and_then(|e| e.to_str()), Some("txt"));
    }

    #[test]
    fn test_file_stem() {
        assert_eq!(file_stem("Hacker News"), "Hacker_News");
        assert_eq!(file_stem("a/b:c"), "a_b_c");
    }
}

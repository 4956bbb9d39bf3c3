//! HTTP transport for probes.
//!
//! Every probe request goes through one session client: per-request
//! timeout, optional proxy, TLS verification disabled, at most ten
//! redirects, and a session-wide User-Agent.

use crate::error::ProbeError;
use encoding_rs::Encoding;
use reqwest::header::{HeaderMap, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// Maximum number of redirects followed per request.
pub const MAX_REDIRECTS: usize = 10;

/// Transport settings of a session client.
#[derive(Debug, Clone)]
pub struct ClientSettings {
    /// Per-request timeout
    pub timeout: Duration,
    /// Upstream proxy URL
    pub proxy: Option<String>,
    /// User-Agent sent with every request
    pub user_agent: String,
}

/// Build the session client.
pub fn build_client(settings: &ClientSettings) -> Result<reqwest::Client, ProbeError> {
    let mut builder = reqwest::Client::builder()
        .timeout(settings.timeout)
        .danger_accept_invalid_certs(true)
        .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
        .user_agent(settings.user_agent.as_str());

    if let Some(proxy) = settings.proxy.as_deref().filter(|p| !p.is_empty()) {
        let proxy = reqwest::Proxy::all(proxy)
            .map_err(|e| ProbeError::Client(format!("invalid proxy '{proxy}': {e}")))?;
        builder = builder.proxy(proxy);
    }

    builder
        .build()
        .map_err(|e| ProbeError::Client(e.to_string()))
}

/// A fully read response.
#[derive(Debug, Clone)]
pub struct ProbeResponse {
    /// Final URL after redirects
    pub url: String,
    /// Status code
    pub status: StatusCode,
    /// Response headers
    pub headers: HeaderMap,
    /// Decoded body text
    pub body: String,
    /// Parsed body when the response declares a JSON content type
    pub json: Option<Value>,
}

impl ProbeResponse {
    /// Numeric status code.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        self.status.as_u16()
    }

    /// The `Content-Type` header, if present and readable.
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
    }

    /// Whether the response declares a JSON body.
    #[must_use]
    pub fn is_json(&self) -> bool {
        self.content_type().is_some_and(is_json_content_type)
    }

    /// Whether the response declares an HTML body.
    #[must_use]
    pub fn is_html(&self) -> bool {
        self.content_type()
            .is_some_and(|ct| ct.to_ascii_lowercase().contains("text/html"))
    }

    /// Parsed JSON body, falling back to parsing the text when the
    /// content type did not announce JSON.
    #[must_use]
    pub fn json_value(&self) -> Option<Value> {
        self.json
            .clone()
            .or_else(|| serde_json::from_str(&self.body).ok())
    }

    /// Read a response to completion.
    pub async fn read(response: reqwest::Response) -> Result<Self, reqwest::Error> {
        let url = response.url().to_string();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response.bytes().await?;

        let content_type = headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok());
        let body = decode_body(&bytes, content_type);
        let json = content_type
            .filter(|ct| is_json_content_type(ct))
            .and_then(|_| serde_json::from_str(&body).ok());

        Ok(Self {
            url,
            status,
            headers,
            body,
            json,
        })
    }
}

fn is_json_content_type(content_type: &str) -> bool {
    let lower = content_type.to_ascii_lowercase();
    lower.contains("application/json") || lower.contains("+json")
}

/// Send one request and read the whole response.
pub async fn send(
    client: &reqwest::Client,
    method: Method,
    url: &str,
    headers: HeaderMap,
    body: Option<String>,
) -> Result<ProbeResponse, reqwest::Error> {
    let mut request = client.request(method, url).headers(headers);
    if let Some(body) = body {
        request = request.body(body);
    }

    ProbeResponse::read(request.send().await?).await
}

/// Decode a body: byte-order mark, then the declared charset, then UTF-8,
/// then a statistical guess.
///
/// A declared charset the bytes do not decode under is treated as absent.
#[must_use]
pub fn decode_body(bytes: &[u8], content_type: Option<&str>) -> String {
    if let Some((encoding, bom_len)) = Encoding::for_bom(bytes) {
        return encoding
            .decode_without_bom_handling(&bytes[bom_len..])
            .0
            .into_owned();
    }

    if let Some(encoding) = content_type
        .and_then(declared_charset)
        .and_then(|label| Encoding::for_label(label.as_bytes()))
    {
        if let Some(text) = encoding.decode_without_bom_handling_and_without_replacement(bytes) {
            return text.into_owned();
        }
        debug!(charset = encoding.name(), "body does not decode under declared charset");
    }

    if let Ok(text) = std::str::from_utf8(bytes) {
        return text.to_string();
    }

    let mut detector = chardetng::EncodingDetector::new();
    detector.feed(bytes, true);
    detector
        .guess(None, false)
        .decode_without_bom_handling(bytes)
        .0
        .into_owned()
}

fn declared_charset(content_type: &str) -> Option<&str> {
    content_type.split(';').skip(1).find_map(|param| {
        let (key, value) = param.split_once('=')?;
        key.trim()
            .eq_ignore_ascii_case("charset")
            .then(|| value.trim().trim_matches('"'))
            .filter(|v| !v.is_empty())
    })
}

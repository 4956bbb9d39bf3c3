//! Pre-check authentication.
//!
//! A pre-check turns the rule's base headers into authenticated headers or
//! fails. Failure is terminal for the probe: the executor reports `ERROR`
//! and never sends the main request.

use crate::error::AuthenticationError;
use crate::http::{self, ProbeResponse};
use crate::template::{header_map, substitute};
use kestrel_catalog::{PreCheck, TokenRequest, TokenSource};
use kestrel_core::KestrelConfig;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, COOKIE, SET_COOKIE};
use tracing::debug;

/// Run `pre_check` and return the headers the main request should carry.
///
/// `identifier` is the transformed identifier, substituted into handshake
/// URLs, bodies and headers.
pub async fn authenticate(
    client: &reqwest::Client,
    pre_check: &PreCheck,
    base_headers: HeaderMap,
    identifier: &str,
    config: &KestrelConfig,
) -> Result<HeaderMap, AuthenticationError> {
    match pre_check {
        PreCheck::Credential {
            credential,
            header,
            template,
        } => {
            let value = lookup_credential(config, credential).ok_or_else(|| {
                AuthenticationError::MissingCredential {
                    name: credential.clone(),
                }
            })?;
            let mut headers = base_headers;
            set_header(&mut headers, header, &template.replace("{credential}", value))?;
            Ok(headers)
        }
        PreCheck::TokenRequest(request) => {
            token_handshake(client, request, base_headers, identifier).await
        }
    }
}

fn lookup_credential<'a>(config: &'a KestrelConfig, name: &str) -> Option<&'a str> {
    config
        .credential(name)
        .or_else(|| config.credential(&name.to_ascii_uppercase()))
        .filter(|value| !value.is_empty())
}

async fn token_handshake(
    client: &reqwest::Client,
    request: &TokenRequest,
    base_headers: HeaderMap,
    identifier: &str,
) -> Result<HeaderMap, AuthenticationError> {
    let url = substitute(&request.url, identifier);
    let handshake_headers =
        header_map(&request.headers, identifier).map_err(|reason| AuthenticationError::InvalidHeader {
            name: "handshake".to_string(),
            reason,
        })?;
    let body = request.body.as_deref().map(|b| substitute(b, identifier));

    let response = http::send(client, request.method.clone(), &url, handshake_headers, body)
        .await
        .map_err(|e| AuthenticationError::Transport(e.to_string()))?;

    if !response.status.is_success() {
        return Err(AuthenticationError::Status {
            status: response.status_code(),
        });
    }

    let token = locate_token(&request.source, &response).ok_or(AuthenticationError::TokenNotFound {
        source_kind: source_kind(&request.source),
    })?;

    debug!(url = %url, source = source_kind(&request.source), "pre-check token obtained");

    let mut headers = base_headers;
    set_header(&mut headers, &request.header, &request.template.replace("{token}", &token))?;
    for pair in response_cookies(&response) {
        merge_cookie(&mut headers, &pair)?;
    }
    Ok(headers)
}

fn source_kind(source: &TokenSource) -> &'static str {
    match source {
        TokenSource::Json(_) => "json",
        TokenSource::Header(_) => "header",
        TokenSource::Cookie(_) => "cookie",
        TokenSource::Regex(_) => "regex",
    }
}

fn locate_token(source: &TokenSource, response: &ProbeResponse) -> Option<String> {
    let token = match source {
        TokenSource::Json(path) => path.lookup_text(&response.json_value()?),
        TokenSource::Header(name) => response
            .headers
            .get(name.as_str())
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        TokenSource::Cookie(name) => response_cookies(response)
            .into_iter()
            .find_map(|pair| {
                pair.split_once('=')
                    .filter(|(key, _)| *key == name.as_str())
                    .map(|(_, value)| value.to_string())
            }),
        TokenSource::Regex(pattern) => pattern.captures(&response.body).and_then(|caps| {
            caps.get(1)
                .or_else(|| caps.get(0))
                .map(|m| m.as_str().to_string())
        }),
    };

    token.filter(|t| !t.trim().is_empty())
}

/// `name=value` pairs from every `Set-Cookie` header.
fn response_cookies(response: &ProbeResponse) -> Vec<String> {
    response
        .headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|cookie| cookie.split(';').next())
        .map(str::trim)
        .filter(|pair| pair.contains('='))
        .map(str::to_string)
        .collect()
}

fn set_header(headers: &mut HeaderMap, name: &str, value: &str) -> Result<(), AuthenticationError> {
    let header_name =
        HeaderName::from_bytes(name.trim().as_bytes()).map_err(|e| AuthenticationError::InvalidHeader {
            name: name.to_string(),
            reason: e.to_string(),
        })?;

    if header_name == COOKIE {
        return merge_cookie(headers, value);
    }

    let header_value = HeaderValue::from_str(value).map_err(|e| AuthenticationError::InvalidHeader {
        name: name.to_string(),
        reason: e.to_string(),
    })?;
    headers.insert(header_name, header_value);
    Ok(())
}

/// Append cookie pairs to the `Cookie` header, keeping existing ones.
fn merge_cookie(headers: &mut HeaderMap, pairs: &str) -> Result<(), AuthenticationError> {
    let merged = match headers.get(COOKIE).and_then(|v| v.to_str().ok()) {
        Some(existing) if !existing.trim().is_empty() => format!("{existing}; {pairs}"),
        _ => pairs.to_string(),
    };

    let value = HeaderValue::from_str(&merged).map_err(|e| AuthenticationError::InvalidHeader {
        name: COOKIE.to_string(),
        reason: e.to_string(),
    })?;
    headers.insert(COOKIE, value);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use kestrel_catalog::JsonPath;
    use regex::Regex;
    use reqwest::StatusCode;

    fn response(headers: &[(&str, &str)], body: &str) -> ProbeResponse {
        let mut map = HeaderMap::new();
        for (name, value) in headers {
            map.append(
                HeaderName::from_bytes(name.as_bytes()).expect("header name"),
                HeaderValue::from_str(value).expect("header value"),
            );
        }
        ProbeResponse {
            url: "https://auth.example.com".to_string(),
            status: StatusCode::OK,
            headers: map,
            body: body.to_string(),
            json: serde_json::from_str(body).ok(),
        }
    }

    #[test]
    fn test_locate_token_sources() {
        let resp = response(
            &[
                ("x-csrf-token", "csrf-123"),
                ("set-cookie", "guest_id=v1%3A42; Path=/; Secure"),
                ("set-cookie", "ct0=abc; Path=/"),
            ],
            r#"{"guest_token": "gt-789", "nested": {"list": [{"t": "deep"}]}}"#,
        );

        let cases = [
            (TokenSource::Json(JsonPath::parse("guest_token").expect("path")), "gt-789"),
            (TokenSource::Json(JsonPath::parse("nested.list[0].t").expect("path")), "deep"),
            (TokenSource::Header("x-csrf-token".to_string()), "csrf-123"),
            (TokenSource::Cookie("ct0".to_string()), "abc"),
            (
                TokenSource::Regex(Regex::new(r#""guest_token":\s*"([^"]+)""#).expect("regex")),
                "gt-789",
            ),
        ];

        for (source, expected) in cases {
            assert_eq!(locate_token(&source, &resp).as_deref(), Some(expected));
        }

        assert!(locate_token(&TokenSource::Header("x-missing".to_string()), &resp).is_none());
        assert!(locate_token(&TokenSource::Cookie("sid".to_string()), &resp).is_none());
    }

    #[test]
    fn test_merge_cookie_keeps_existing() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("lang=en"));
        merge_cookie(&mut headers, "ct0=abc").expect("merge cookie");
        assert_eq!(headers[COOKIE], "lang=en; ct0=abc");
    }

    #[tokio::test]
    async fn test_credential_pre_check() {
        let mut config = KestrelConfig::default();
        config
            .credentials
            .insert("INSTAGRAM_SESSION_ID".to_string(), "s3ss10n".to_string());
        let client = reqwest::Client::new();

        let pre_check = PreCheck::Credential {
            credential: "instagram_session_id".to_string(),
            header: "Cookie".to_string(),
            template: "sessionid={credential}".to_string(),
        };
        let headers = authenticate(&client, &pre_check, HeaderMap::new(), "octo", &config)
            .await
            .expect("credential present");
        assert_eq!(headers[COOKIE], "sessionid=s3ss10n");

        let missing = authenticate(&client, &pre_check, HeaderMap::new(), "octo", &KestrelConfig::default()).await;
        assert!(matches!(missing, Err(AuthenticationError::MissingCredential { .. })));
    }

    #[test]
    fn test_response_cookies() {
        let resp = response(&[("set-cookie", "a=1; HttpOnly"), ("set-cookie", "flag")], "");
        assert_eq!(response_cookies(&resp), vec!["a=1".to_string()]);
    }
}

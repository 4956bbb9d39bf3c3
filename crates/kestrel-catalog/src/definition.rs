//! Site rule types.
//!
//! A catalog document is parsed into loosely typed [`SiteRecord`]s which are
//! then validated into immutable [`SiteRule`]s. Validation is per rule so
//! one bad entry never takes the rest of the catalog down with it.

use crate::error::{CatalogError, Result};
use crate::extraction::{JsonPath, MetadataRecord, MetadataRule};
use crate::transform::InputOperation;
use regex::Regex;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Placeholder substituted with the (transformed) identifier.
pub const ACCOUNT_PLACEHOLDER: &str = "{account}";

/// Category the WhatsMyName lists use for adult sites.
pub const NSFW_CATEGORY: &str = "xx NSFW xx";

/// A two-part response test: body substring and exact status.
///
/// An unset sub-test is the explicit "always true" sentinel. Catalog
/// documents spell "unset" as a missing key, `null`, `""` or `0`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Predicate {
    body: Option<String>,
    status: Option<u16>,
}

impl Predicate {
    /// Build a predicate, normalising empty strings and zero status to unset.
    #[must_use]
    pub fn new(body: Option<String>, status: Option<u16>) -> Self {
        Self {
            body: body.filter(|b| !b.is_empty()),
            status: status.filter(|s| *s != 0),
        }
    }

    /// Body substring sub-test, if declared.
    #[must_use]
    pub fn body(&self) -> Option<&str> {
        self.body.as_deref()
    }

    /// Status sub-test, if declared.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        self.status
    }

    /// Whether at least one sub-test is declared.
    #[must_use]
    pub fn is_declared(&self) -> bool {
        self.body.is_some() || self.status.is_some()
    }

    /// Every sub-test holds (unset sub-tests hold trivially).
    #[must_use]
    pub fn holds(&self, status: u16, body: &str) -> bool {
        self.body.as_deref().map_or(true, |needle| body.contains(needle))
            && self.status.map_or(true, |code| code == status)
    }

    /// Some declared sub-test matches. An undeclared predicate never vetoes.
    #[must_use]
    pub fn vetoes(&self, status: u16, body: &str) -> bool {
        self.body.as_deref().is_some_and(|needle| body.contains(needle))
            || self.status.is_some_and(|code| code == status)
    }
}

/// Where a token-request handshake finds its token.
#[derive(Debug, Clone)]
pub enum TokenSource {
    /// Path into the JSON response body
    Json(JsonPath),
    /// Response header value
    Header(String),
    /// Value of a cookie set by the response
    Cookie(String),
    /// First capture group of a pattern over the response body
    Regex(Regex),
}

/// A handshake that produces a token from a prior HTTP request.
#[derive(Debug, Clone)]
pub struct TokenRequest {
    /// Handshake method
    pub method: Method,
    /// Handshake URL (may contain `{account}`)
    pub url: String,
    /// Optional request body
    pub body: Option<String>,
    /// Extra handshake headers
    pub headers: BTreeMap<String, String>,
    /// Where to find the token
    pub source: TokenSource,
    /// Header of the main request that receives the token
    pub header: String,
    /// Header value template containing `{token}`
    pub template: String,
}

/// Authentication directive run before the main request.
#[derive(Debug, Clone)]
pub enum PreCheck {
    /// Place a named runtime credential into a header
    Credential {
        /// Credential name looked up in the runtime configuration
        credential: String,
        /// Header receiving the value
        header: String,
        /// Header value template containing `{credential}`
        template: String,
    },
    /// Obtain a token through a prior HTTP request
    TokenRequest(TokenRequest),
}

impl PreCheck {
    /// Short name of the directive kind.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Credential { .. } => "credential",
            Self::TokenRequest(_) => "token-request",
        }
    }
}

/// Pre-check directive as it appears in a catalog document.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
enum PreCheckRecord {
    Credential {
        credential: String,
        #[serde(default = "default_credential_header")]
        header: String,
        #[serde(default = "default_credential_template")]
        template: String,
    },
    TokenRequest {
        #[serde(default)]
        method: Option<String>,
        url: String,
        #[serde(default)]
        body: Option<String>,
        #[serde(default)]
        headers: BTreeMap<String, String>,
        source: String,
        #[serde(default)]
        path: Option<String>,
        #[serde(default = "default_token_header")]
        header: String,
        #[serde(default = "default_token_template")]
        template: String,
    },
}

fn default_credential_header() -> String {
    "Cookie".to_string()
}

fn default_credential_template() -> String {
    "{credential}".to_string()
}

fn default_token_header() -> String {
    "Authorization".to_string()
}

fn default_token_template() -> String {
    "Bearer {token}".to_string()
}

/// A site rule exactly as it appears in a catalog document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteRecord {
    /// Human-readable site name, unique within a catalog
    pub name: String,

    /// Category label
    #[serde(default, alias = "category")]
    pub cat: String,

    /// HTTP method; defaults to POST when a body is present, GET otherwise
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,

    /// URL template containing `{account}`
    pub uri_check: String,

    /// Human-facing profile URL template
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri_pretty: Option<String>,

    /// Request body template
    #[serde(default, alias = "post_body", skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,

    /// Extra request headers (values may contain `{account}`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<BTreeMap<String, String>>,

    /// Existence body substring
    #[serde(default)]
    pub e_string: Option<String>,

    /// Existence status
    #[serde(default)]
    pub e_code: Option<u16>,

    /// Absence body substring
    #[serde(default)]
    pub m_string: Option<String>,

    /// Absence status
    #[serde(default)]
    pub m_code: Option<u16>,

    /// Extraction directives
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Vec<MetadataRecord>>,

    /// Pre-check directive (`false` and `null` mean none)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_check: Option<Value>,

    /// Identifier transform name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_operation: Option<String>,
}

/// A validated, immutable site rule.
#[derive(Debug, Clone)]
pub struct SiteRule {
    /// Site name
    pub name: String,
    /// Category label
    pub category: String,
    /// HTTP method of the main request
    pub method: Method,
    /// URL template containing `{account}`
    pub uri_template: String,
    /// Human-facing URL template reported instead of the probe URL
    pub uri_pretty: Option<String>,
    /// Request body template
    pub body_template: Option<String>,
    /// Extra request header templates
    pub headers: BTreeMap<String, String>,
    /// Existence predicate (all declared sub-tests must hold)
    pub existence: Predicate,
    /// Absence predicate (any declared sub-test vetoes)
    pub absence: Predicate,
    /// Extraction directives, in catalog order
    pub metadata: Vec<MetadataRule>,
    /// Optional authentication step
    pub pre_check: Option<PreCheck>,
    /// Optional identifier transform
    pub input_operation: Option<InputOperation>,
}

impl SiteRule {
    /// Get the site name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the category label.
    #[must_use]
    pub fn category(&self) -> &str {
        &self.category
    }

    /// Whether the rule belongs to the adult category.
    #[must_use]
    pub fn is_nsfw(&self) -> bool {
        self.category.eq_ignore_ascii_case(NSFW_CATEGORY)
    }

    /// Whether the rule declares extraction directives.
    #[must_use]
    pub fn has_metadata(&self) -> bool {
        !self.metadata.is_empty()
    }
}

impl TryFrom<SiteRecord> for SiteRule {
    type Error = CatalogError;

    fn try_from(record: SiteRecord) -> Result<Self> {
        let site = record.name.trim().to_string();
        if site.is_empty() {
            return Err(CatalogError::invalid_rule("<unnamed>", "site name cannot be empty"));
        }

        if record.uri_check.trim().is_empty() {
            return Err(CatalogError::invalid_rule(&site, "uri_check cannot be empty"));
        }

        let body_template = record.data.filter(|d| !d.is_empty());
        let method = match record.method.as_deref().map(str::trim) {
            Some(m) if !m.is_empty() => parse_method(&site, m)?,
            _ if body_template.is_some() => Method::POST,
            _ => Method::GET,
        };

        let existence = Predicate::new(record.e_string, record.e_code);
        if !existence.is_declared() {
            return Err(CatalogError::invalid_rule(
                &site,
                "existence predicate declares neither e_string nor e_code",
            ));
        }
        let absence = Predicate::new(record.m_string, record.m_code);

        let metadata = record
            .metadata
            .unwrap_or_default()
            .iter()
            .map(|directive| directive.compile(&site))
            .collect::<Result<Vec<_>>>()?;

        let pre_check = match record.pre_check {
            None | Some(Value::Null | Value::Bool(false)) => None,
            Some(value) => Some(parse_pre_check(&site, value)?),
        };

        let input_operation = match record.input_operation.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(name) => Some(
                name.parse::<InputOperation>()
                    .map_err(|reason| CatalogError::invalid_rule(&site, reason))?,
            ),
        };

        Ok(Self {
            category: record.cat.trim().to_string(),
            method,
            uri_template: record.uri_check,
            uri_pretty: record.uri_pretty.filter(|u| !u.is_empty()),
            body_template,
            headers: record.headers.unwrap_or_default(),
            existence,
            absence,
            metadata,
            pre_check,
            input_operation,
            name: site,
        })
    }
}

fn parse_method(site: &str, method: &str) -> Result<Method> {
    Method::from_bytes(method.to_ascii_uppercase().as_bytes())
        .map_err(|_| CatalogError::invalid_rule(site, format!("invalid HTTP method '{method}'")))
}

fn parse_pre_check(site: &str, value: Value) -> Result<PreCheck> {
    let record: PreCheckRecord = serde_json::from_value(value)
        .map_err(|e| CatalogError::invalid_rule(site, format!("invalid pre_check: {e}")))?;

    match record {
        PreCheckRecord::Credential {
            credential,
            header,
            template,
        } => {
            if credential.trim().is_empty() {
                return Err(CatalogError::invalid_rule(
                    site,
                    "credential pre_check must name a credential",
                ));
            }
            Ok(PreCheck::Credential {
                credential,
                header,
                template,
            })
        }
        PreCheckRecord::TokenRequest {
            method,
            url,
            body,
            headers,
            source,
            path,
            header,
            template,
        } => {
            let path = path.unwrap_or_default();
            let source = match source.to_ascii_lowercase().as_str() {
                "json" => TokenSource::Json(
                    JsonPath::parse(&path).map_err(|reason| CatalogError::invalid_rule(site, reason))?,
                ),
                "header" if !path.is_empty() => TokenSource::Header(path),
                "cookie" if !path.is_empty() => TokenSource::Cookie(path),
                "regex" => TokenSource::Regex(Regex::new(&path).map_err(|e| {
                    CatalogError::invalid_rule(site, format!("invalid token regex '{path}': {e}"))
                })?),
                "header" | "cookie" => {
                    return Err(CatalogError::invalid_rule(
                        site,
                        format!("token source '{source}' needs a path"),
                    ))
                }
                other => {
                    return Err(CatalogError::invalid_rule(
                        site,
                        format!("unknown token source '{other}'"),
                    ))
                }
            };

            if !template.contains("{token}") {
                return Err(CatalogError::invalid_rule(
                    site,
                    "token-request template must contain {token}",
                ));
            }

            Ok(PreCheck::TokenRequest(TokenRequest {
                method: match method.as_deref() {
                    Some(m) if !m.trim().is_empty() => parse_method(site, m.trim())?,
                    _ => Method::GET,
                },
                url,
                body,
                headers,
                source,
                header,
                template,
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> SiteRecord {
        serde_json::from_value(value).expect("deserialize site record")
    }

    fn github() -> Value {
        json!({
            "name": "GitHub",
            "uri_check": "https://api.github.com/users/{account}",
            "uri_pretty": "https://github.com/{account}",
            "e_code": 200,
            "e_string": "\"login\":",
            "m_code": 404,
            "m_string": "Not Found",
            "cat": "coding"
        })
    }

    #[test]
    fn test_predicate_sentinels() {
        let unset = Predicate::new(Some(String::new()), Some(0));
        assert!(!unset.is_declared());
        assert!(unset.holds(500, "anything"));
        assert!(!unset.vetoes(500, "anything"));
    }

    #[test]
    fn test_predicate_holds_and_vetoes() {
        let existence = Predicate::new(Some("profile".to_string()), Some(200));
        assert!(existence.holds(200, "<div>profile</div>"));
        assert!(!existence.holds(404, "<div>profile</div>"));
        assert!(!existence.holds(200, "<div>nothing</div>"));

        let absence = Predicate::new(Some("not found".to_string()), Some(404));
        assert!(absence.vetoes(200, "page not found"));
        assert!(absence.vetoes(404, "profile"));
        assert!(!absence.vetoes(200, "profile"));

        let status_only = Predicate::new(None, Some(404));
        assert!(!status_only.vetoes(200, "not found"));
        assert!(status_only.vetoes(404, ""));
    }

    #[test]
    fn test_site_rule_from_record() {
        let rule = SiteRule::try_from(record(github())).expect("valid rule");
        assert_eq!(rule.name(), "GitHub");
        assert_eq!(rule.category(), "coding");
        assert_eq!(rule.method, Method::GET);
        assert_eq!(rule.existence.status(), Some(200));
        assert_eq!(rule.absence.body(), Some("Not Found"));
        assert!(rule.pre_check.is_none());
        assert!(!rule.has_metadata());
        assert!(!rule.is_nsfw());
    }

    #[test]
    fn test_body_implies_post() {
        let mut value = github();
        value["post_body"] = json!("{\"email\":\"{account}\"}");
        let rule = SiteRule::try_from(record(value)).expect("valid rule");
        assert_eq!(rule.method, Method::POST);
        assert!(rule.body_template.is_some());

        let mut value = github();
        value["data"] = json!("q={account}");
        value["method"] = json!("put");
        let rule = SiteRule::try_from(record(value)).expect("valid rule");
        assert_eq!(rule.method, Method::PUT);
    }

    #[test]
    fn test_rejects_unknown_input_operation() {
        let mut value = github();
        value["input_operation"] = json!("reverse");
        let err = SiteRule::try_from(record(value)).expect_err("unknown transform");
        assert!(err.to_string().contains("reverse"));
    }

    #[test]
    fn test_rejects_undeclared_existence() {
        let value = json!({"name": "Blank", "uri_check": "https://x/{account}", "e_code": 0, "e_string": ""});
        assert!(SiteRule::try_from(record(value)).is_err());
    }

    #[test]
    fn test_pre_check_parsing() {
        let mut value = github();
        value["pre_check"] = json!(false);
        assert!(SiteRule::try_from(record(value)).expect("valid").pre_check.is_none());

        let mut value = github();
        value["pre_check"] = json!({
            "kind": "credential",
            "credential": "INSTAGRAM_SESSION_ID",
            "template": "sessionid={credential}"
        });
        let rule = SiteRule::try_from(record(value)).expect("valid rule");
        match rule.pre_check {
            Some(PreCheck::Credential { header, .. }) => assert_eq!(header, "Cookie"),
            other => panic!("expected credential pre-check, got {other:?}"),
        }

        let mut value = github();
        value["pre_check"] = json!({
            "kind": "token-request",
            "url": "https://auth.example.com/guest",
            "method": "POST",
            "source": "json",
            "path": "guest_token",
            "header": "x-guest-token",
            "template": "{token}"
        });
        let rule = SiteRule::try_from(record(value)).expect("valid rule");
        let pre_check = rule.pre_check.expect("pre-check present");
        assert_eq!(pre_check.kind(), "token-request");
    }

    #[test]
    fn test_pre_check_rejections() {
        for directive in [
            json!({"kind": "oauth-dance"}),
            json!({"kind": "token-request", "url": "https://x", "source": "smoke-signal"}),
            json!({"kind": "token-request", "url": "https://x", "source": "header"}),
            json!({"kind": "token-request", "url": "https://x", "source": "json", "path": "t", "template": "Bearer"}),
            json!({"kind": "credential", "credential": " "}),
        ] {
            let mut value = github();
            value["pre_check"] = directive.clone();
            assert!(
                SiteRule::try_from(record(value)).is_err(),
                "Should fail for: {directive}"
            );
        }
    }

    #[test]
    fn test_nsfw_category() {
        let mut value = github();
        value["cat"] = json!("xx NSFW xx");
        assert!(SiteRule::try_from(record(value)).expect("valid").is_nsfw());
    }
}

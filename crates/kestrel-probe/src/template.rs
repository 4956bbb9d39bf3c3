//! Identifier substitution into rule templates.

use crate::error::ProbeError;
use kestrel_catalog::{SiteRule, ACCOUNT_PLACEHOLDER};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, Url};

/// Replace every `{account}` in `template`.
#[must_use]
pub fn substitute(template: &str, identifier: &str) -> String {
    template.replace(ACCOUNT_PLACEHOLDER, identifier)
}

/// The concrete main request for one rule and identifier.
#[derive(Debug, Clone)]
pub struct RequestPlan {
    /// HTTP method
    pub method: Method,
    /// Request URL
    pub url: String,
    /// URL reported in the result
    pub display_url: String,
    /// Request body
    pub body: Option<String>,
    /// Request headers from the rule
    pub headers: HeaderMap,
}

impl RequestPlan {
    /// Substitute `identifier` (already transformed) into the rule.
    ///
    /// # Errors
    /// Returns [`ProbeError::Template`] when the URL does not parse or a
    /// header name or value is not valid HTTP.
    pub fn build(rule: &SiteRule, identifier: &str) -> Result<Self, ProbeError> {
        let url = substitute(&rule.uri_template, identifier);
        Url::parse(&url).map_err(|e| ProbeError::Template {
            site: rule.name.clone(),
            reason: format!("invalid URL '{url}': {e}"),
        })?;

        let display_url = rule
            .uri_pretty
            .as_deref()
            .map_or_else(|| url.clone(), |pretty| substitute(pretty, identifier));

        let headers = header_map(&rule.headers, identifier).map_err(|reason| {
            ProbeError::Template {
                site: rule.name.clone(),
                reason,
            }
        })?;

        Ok(Self {
            method: rule.method.clone(),
            body: rule
                .body_template
                .as_deref()
                .map(|body| substitute(body, identifier)),
            url,
            display_url,
            headers,
        })
    }
}

/// Build a header map from templated name/value pairs.
pub(crate) fn header_map<'a, I>(pairs: I, identifier: &str) -> Result<HeaderMap, String>
where
    I: IntoIterator<Item = (&'a String, &'a String)>,
{
    let mut headers = HeaderMap::new();
    for (name, value) in pairs {
        let header_name = HeaderName::from_bytes(name.trim().as_bytes())
            .map_err(|_| format!("invalid header name '{name}'"))?;
        let header_value = HeaderValue::from_str(&substitute(value, identifier))
            .map_err(|_| format!("invalid value for header '{name}'"))?;
        headers.insert(header_name, header_value);
    }
    Ok(headers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kestrel_catalog::{SiteRecord, SiteRule};
    use serde_json::json;

    fn rule(extra: serde_json::Value) -> SiteRule {
        let mut value = json!({
            "name": "Example",
            "cat": "social",
            "uri_check": "https://api.example.com/users/{account}",
            "e_code": 200
        });
        if let (Some(base), Some(extra)) = (value.as_object_mut(), extra.as_object()) {
            base.extend(extra.clone());
        }
        let record: SiteRecord = serde_json::from_value(value).expect("site record");
        SiteRule::try_from(record).expect("valid rule")
    }

    #[test]
    fn test_substitute_all_occurrences() {
        assert_eq!(
            substitute("https://{account}.example.com/{account}", "octo"),
            "https://octo.example.com/octo"
        );
    }

    #[test]
    fn test_plan_uses_pretty_url() {
        let plan = RequestPlan::build(
            &rule(json!({"uri_pretty": "https://example.com/@{account}"})),
            "octo",
        )
        .expect("plan");
        assert_eq!(plan.url, "https://api.example.com/users/octo");
        assert_eq!(plan.display_url, "https://example.com/@octo");
        assert_eq!(plan.method, Method::GET);
    }

    #[test]
    fn test_plan_substitutes_body_and_headers() {
        let plan = RequestPlan::build(
            &rule(json!({
                "post_body": "{\"email\":\"{account}\"}",
                "headers": {"Content-Type": "application/json", "X-Lookup": "{account}"}
            })),
            "jane@example.com",
        )
        .expect("plan");
        assert_eq!(plan.method, Method::POST);
        assert_eq!(plan.body.as_deref(), Some("{\"email\":\"jane@example.com\"}"));
        assert_eq!(plan.headers["x-lookup"], "jane@example.com");
    }

    #[test]
    fn test_plan_template_errors() {
        let bad_url = RequestPlan::build(&rule(json!({"uri_check": "not a url/{account}"})), "octo");
        assert!(matches!(bad_url, Err(ProbeError::Template { .. })));

        let bad_header = RequestPlan::build(&rule(json!({"headers": {"X-Id": "{account}"}})), "a\nb");
        assert!(matches!(bad_header, Err(ProbeError::Template { .. })));
    }
}

//! Identifier transforms applied before a rule's templates are filled in.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A named, pure rewrite of the target identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InputOperation {
    /// Remove one leading `@`
    StripAtPrefix,
    /// Keep the text before the first `@`
    EmailLocalPart,
    /// Keep the text after the first `@`
    EmailDomain,
    /// Lowercase the whole identifier
    Lowercase,
    /// Remove `.`, `-` and `_`
    StripSeparators,
    /// Percent-encode for use inside a URL
    UrlEncode,
}

impl InputOperation {
    /// Apply the operation to `identifier`.
    ///
    /// Operations that need an `@` leave identifiers without one unchanged.
    #[must_use]
    pub fn apply(self, identifier: &str) -> String {
        match self {
            Self::StripAtPrefix => identifier
                .strip_prefix('@')
                .unwrap_or(identifier)
                .to_string(),
            Self::EmailLocalPart => identifier
                .split_once('@')
                .map_or(identifier, |(local, _)| local)
                .to_string(),
            Self::EmailDomain => identifier
                .split_once('@')
                .map_or(identifier, |(_, domain)| domain)
                .to_string(),
            Self::Lowercase => identifier.to_lowercase(),
            Self::StripSeparators => identifier
                .chars()
                .filter(|c| !matches!(c, '.' | '-' | '_'))
                .collect(),
            Self::UrlEncode => urlencoding::encode(identifier).into_owned(),
        }
    }

    /// The operation's catalog name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StripAtPrefix => "strip-at-prefix",
            Self::EmailLocalPart => "email-local-part",
            Self::EmailDomain => "email-domain",
            Self::Lowercase => "lowercase",
            Self::StripSeparators => "strip-separators",
            Self::UrlEncode => "url-encode",
        }
    }
}

impl FromStr for InputOperation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Catalogs in the wild mix kebab and snake case.
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "strip-at-prefix" | "strip-at" => Ok(Self::StripAtPrefix),
            "email-local-part" | "local-part" => Ok(Self::EmailLocalPart),
            "email-domain" | "domain" => Ok(Self::EmailDomain),
            "lowercase" | "lower" => Ok(Self::Lowercase),
            "strip-separators" => Ok(Self::StripSeparators),
            "url-encode" | "urlencode" => Ok(Self::UrlEncode),
            _ => Err(format!("unknown input operation '{s}'")),
        }
    }
}

impl fmt::Display for InputOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Apply an optional operation; `None` passes the identifier through.
#[must_use]
pub fn transform(identifier: &str, operation: Option<InputOperation>) -> String {
    operation.map_or_else(|| identifier.to_string(), |op| op.apply(identifier))
}

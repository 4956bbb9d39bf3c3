//! Metadata extraction directives.
//!
//! A directive names an output field, a display type and an expression in
//! one of three dialects: a dotted JSON path, a CSS selector, or a regular
//! expression. Directives are compiled once at catalog load so a bad selector
//! or pattern rejects the rule instead of failing every probe.

use crate::error::{CatalogError, Result};
use regex::Regex;
use scraper::Selector;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Display type of an extracted field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// Free text
    #[default]
    String,
    /// A place name
    Location,
    /// An image URL
    Image,
    /// A link
    Url,
    /// A date in whatever format the site uses
    Date,
}

impl FieldType {
    /// Parse a type name, case-insensitively.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "string" | "text" => Some(Self::String),
            "location" => Some(Self::Location),
            "image" => Some(Self::Image),
            "url" | "link" => Some(Self::Url),
            "date" | "datetime" => Some(Self::Date),
            _ => None,
        }
    }

    /// Get a lowercase display name.
    #[must_use]
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Location => "location",
            Self::Image => "image",
            Self::Url => "url",
            Self::Date => "date",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// One step of a [`JsonPath`].
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Key(String),
    Index(usize),
}

/// Dotted path into a JSON document, e.g. `user.profile.links[0].href`.
///
/// Purely numeric segments (`items.0.name`) also index into arrays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonPath {
    raw: String,
    segments: Vec<Segment>,
}

impl JsonPath {
    /// Parse a path expression.
    ///
    /// # Errors
    /// Returns the reason when the path is empty or has unbalanced brackets.
    pub fn parse(raw: &str) -> std::result::Result<Self, String> {
        let trimmed = raw.trim().trim_start_matches("$.");
        if trimmed.is_empty() {
            return Err("JSON path cannot be empty".to_string());
        }

        let mut segments = Vec::new();
        for part in trimmed.split('.') {
            if part.is_empty() {
                return Err(format!("empty segment in JSON path '{raw}'"));
            }

            let (key, mut rest) = match part.find('[') {
                Some(pos) => part.split_at(pos),
                None => (part, ""),
            };

            if !key.is_empty() {
                match key.parse::<usize>() {
                    Ok(index) => segments.push(Segment::Index(index)),
                    Err(_) => segments.push(Segment::Key(key.to_string())),
                }
            }

            while !rest.is_empty() {
                let close = rest
                    .find(']')
                    .ok_or_else(|| format!("unclosed '[' in JSON path '{raw}'"))?;
                let index = rest[1..close]
                    .parse::<usize>()
                    .map_err(|_| format!("non-numeric index in JSON path '{raw}'"))?;
                segments.push(Segment::Index(index));
                rest = &rest[close + 1..];
                if !rest.is_empty() && !rest.starts_with('[') {
                    return Err(format!("unexpected text after ']' in JSON path '{raw}'"));
                }
            }
        }

        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    /// Walk the path through `value`.
    #[must_use]
    pub fn lookup<'a>(&self, value: &'a Value) -> Option<&'a Value> {
        self.segments
            .iter()
            .try_fold(value, |current, segment| match segment {
                Segment::Key(key) => current.get(key.as_str()),
                Segment::Index(index) => current.get(*index),
            })
    }

    /// Resolve the path and render the value as text.
    ///
    /// Nulls and missing values resolve to `None`; strings are returned
    /// without quotes and other values in compact JSON form.
    #[must_use]
    pub fn lookup_text(&self, value: &Value) -> Option<String> {
        match self.lookup(value)? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// The path as written in the catalog.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for JsonPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

/// A compiled extraction expression.
#[derive(Debug, Clone)]
pub enum Extraction {
    /// Path over the parsed JSON body
    Json(JsonPath),
    /// CSS selector over the HTML body; text content unless an attribute is named
    Html {
        /// Compiled selector
        selector: Selector,
        /// Attribute to read instead of the text content
        attribute: Option<String>,
    },
    /// First capture group (or whole match) over the raw body
    Regex(Regex),
}

impl Extraction {
    /// Short name of the dialect, as used in catalog documents.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Json(_) => "json",
            Self::Html { .. } => "html",
            Self::Regex(_) => "regex",
        }
    }
}

/// A compiled metadata directive attached to a site rule.
#[derive(Debug, Clone)]
pub struct MetadataRule {
    /// Output field name
    pub name: String,
    /// Display type of the field
    pub field_type: FieldType,
    /// Compiled expression
    pub extraction: Extraction,
}

/// Metadata directive as it appears in a catalog document.
///
/// ```json
/// { "name": "bio", "type": "String", "schema": "JSON", "path": "user.biography" }
/// { "name": "avatar", "type": "Image", "schema": "HTML", "path": "img.avatar", "attribute": "src" }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataRecord {
    /// Output field name
    #[serde(alias = "key")]
    pub name: String,

    /// Display type
    #[serde(rename = "type", default)]
    pub field_type: Option<String>,

    /// Extraction dialect: `json`, `html` or `regex`
    #[serde(alias = "kind")]
    pub schema: String,

    /// Expression in the chosen dialect
    #[serde(alias = "selector", alias = "pattern", alias = "expression")]
    pub path: String,

    /// HTML attribute to read (html dialect only)
    #[serde(default)]
    pub attribute: Option<String>,
}

impl MetadataRecord {
    /// Compile the directive for the rule named `site`.
    ///
    /// # Errors
    /// Returns [`CatalogError::InvalidRule`] for unknown dialects or types and
    /// for expressions that do not compile.
    pub fn compile(&self, site: &str) -> Result<MetadataRule> {
        let field_type = match self.field_type.as_deref() {
            None | Some("") => FieldType::default(),
            Some(name) => FieldType::parse(name).ok_or_else(|| {
                CatalogError::invalid_rule(
                    site,
                    format!("unknown metadata type '{name}' for field {}", self.name),
                )
            })?,
        };

        let extraction = match self.schema.to_ascii_lowercase().as_str() {
            "json" => Extraction::Json(
                JsonPath::parse(&self.path).map_err(|reason| CatalogError::invalid_rule(site, reason))?,
            ),
            "html" | "css" => {
                let (selector, inline_attribute) = split_attribute(&self.path);
                let compiled = Selector::parse(selector).map_err(|e| {
                    CatalogError::invalid_rule(
                        site,
                        format!("invalid CSS selector '{selector}': {e}"),
                    )
                })?;
                Extraction::Html {
                    selector: compiled,
                    attribute: self
                        .attribute
                        .clone()
                        .filter(|a| !a.is_empty())
                        .or(inline_attribute),
                }
            }
            "regex" => Extraction::Regex(Regex::new(&self.path).map_err(|e| {
                CatalogError::invalid_rule(site, format!("invalid regex '{}': {e}", self.path))
            })?),
            other => {
                return Err(CatalogError::invalid_rule(
                    site,
                    format!("unknown metadata schema '{other}' for field {}", self.name),
                ))
            }
        };

        Ok(MetadataRule {
            name: self.name.clone(),
            field_type,
            extraction,
        })
    }
}

/// Split a trailing `@attr` off a selector (`img.avatar@src`).
fn split_attribute(selector: &str) -> (&str, Option<String>) {
    match selector.rsplit_once('@') {
        Some((head, attr))
            if !head.is_empty()
                && !attr.is_empty()
                && attr
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') =>
        {
            (head.trim_end(), Some(attr.to_string()))
        }
        _ => (selector, None),
    }
}

//! Immutable, content-addressed rule catalog snapshots.

use crate::{
    definition::{SiteRecord, SiteRule},
    error::{CatalogError, Result},
    hash::content_hash,
    overlay::MetadataOverlay,
};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, warn};

/// A loaded rule catalog.
///
/// Catalogs are never mutated after load. Sessions share them through
/// `Arc<Catalog>`; a sync replaces the file on disk, and the next load
/// produces a new snapshot.
#[derive(Debug)]
pub struct Catalog {
    origin: String,
    rules: Vec<Arc<SiteRule>>,
    index: HashMap<String, usize>,
    content_hash: String,
    rejected: Vec<CatalogError>,
}

impl Catalog {
    /// Build a catalog from a parsed `{ "sites": [...] }` document.
    ///
    /// Entries that fail validation are excluded and kept in
    /// [`rejected`](Self::rejected); later entries reusing a site name are
    /// rejected as duplicates.
    ///
    /// # Errors
    /// Returns [`CatalogError::Malformed`] when the document has no `sites` array.
    pub fn from_document(origin: impl Into<String>, document: &Value) -> Result<Self> {
        let origin = origin.into();
        let sites = sites_array(&origin, document)?;

        let mut rules = Vec::with_capacity(sites.len());
        let mut index = HashMap::with_capacity(sites.len());
        let mut rejected = Vec::new();

        for (position, entry) in sites.iter().enumerate() {
            match parse_entry(position, entry) {
                Ok(rule) if index.contains_key(&rule.name) => {
                    rejected.push(CatalogError::invalid_rule(&rule.name, "duplicate site name"));
                }
                Ok(rule) => {
                    index.insert(rule.name.clone(), rules.len());
                    rules.push(Arc::new(rule));
                }
                Err(e) => rejected.push(e),
            }
        }

        for err in &rejected {
            warn!(origin = %origin, error = %err, "excluding invalid site rule");
        }

        debug!(
            origin = %origin,
            accepted = rules.len(),
            rejected = rejected.len(),
            "built catalog"
        );

        Ok(Self {
            content_hash: content_hash(document),
            origin,
            rules,
            index,
            rejected,
        })
    }

    /// Parse and build a catalog from JSON text.
    pub fn from_json_str(origin: impl Into<String>, text: &str) -> Result<Self> {
        let origin = origin.into();
        let document: Value =
            serde_json::from_str(text).map_err(|source| CatalogError::ParseError {
                origin: origin.clone(),
                source,
            })?;
        Self::from_document(origin, &document)
    }

    /// Where the catalog was loaded from.
    #[must_use]
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// All accepted rules in document order.
    #[must_use]
    pub fn rules(&self) -> &[Arc<SiteRule>] {
        &self.rules
    }

    /// Number of accepted rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether no rule was accepted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Look up a rule by exact site name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<SiteRule>> {
        self.index.get(name).map(|&i| Arc::clone(&self.rules[i]))
    }

    /// Rules whose category matches `category`, ignoring case.
    #[must_use]
    pub fn by_category(&self, category: &str) -> Vec<Arc<SiteRule>> {
        self.rules
            .iter()
            .filter(|rule| rule.category.eq_ignore_ascii_case(category))
            .cloned()
            .collect()
    }

    /// Distinct category labels.
    #[must_use]
    pub fn categories(&self) -> BTreeSet<&str> {
        self.rules.iter().map(|rule| rule.category.as_str()).collect()
    }

    /// SHA-256 hex digest of the canonical source document.
    #[must_use]
    pub fn content_hash(&self) -> &str {
        &self.content_hash
    }

    /// Rules excluded at load, with the reason for each.
    #[must_use]
    pub fn rejected(&self) -> &[CatalogError] {
        &self.rejected
    }

    /// Overlay extraction directives and transforms from a metadata catalog.
    ///
    /// A rule keeps its own directives and transform when it declares them;
    /// the overlay only fills in what is missing.
    #[must_use]
    pub fn with_metadata(mut self, overlay: &MetadataOverlay) -> Self {
        let mut merged = 0usize;
        for rule in &mut self.rules {
            let Some(entry) = overlay.get(&rule.name) else {
                continue;
            };

            let adds_metadata = rule.metadata.is_empty() && !entry.metadata.is_empty();
            let adds_operation = rule.input_operation.is_none() && entry.input_operation.is_some();
            if !adds_metadata && !adds_operation {
                continue;
            }

            let mut updated = SiteRule::clone(rule);
            if adds_metadata {
                updated.metadata.clone_from(&entry.metadata);
            }
            if adds_operation {
                updated.input_operation = entry.input_operation;
            }
            *rule = Arc::new(updated);
            merged += 1;
        }

        debug!(origin = %self.origin, merged, "applied metadata overlay");
        self
    }
}

/// Extract the `sites` array of a catalog document.
pub(crate) fn sites_array<'a>(origin: &str, document: &'a Value) -> Result<&'a Vec<Value>> {
    document
        .get("sites")
        .and_then(Value::as_array)
        .ok_or_else(|| CatalogError::Malformed {
            origin: origin.to_string(),
            reason: "document has no \"sites\" array".to_string(),
        })
}

fn parse_entry(position: usize, entry: &Value) -> Result<SiteRule> {
    let label = entry
        .get("name")
        .and_then(Value::as_str)
        .map_or_else(|| format!("<entry {position}>"), str::to_string);

    let record: SiteRecord = serde_json::from_value(entry.clone())
        .map_err(|e| CatalogError::invalid_rule(&label, e.to_string()))?;
    SiteRule::try_from(record)
}

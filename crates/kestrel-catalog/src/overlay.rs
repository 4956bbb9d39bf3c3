//! Metadata overlay catalogs.
//!
//! The username list carries no extraction directives. A separate document
//! with the same `{ "sites": [...] }` shape, keyed by site name, supplies
//! them (and optionally an input transform).

use crate::{
    catalog::sites_array,
    error::{CatalogError, Result},
    extraction::{MetadataRecord, MetadataRule},
    transform::InputOperation,
};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use tracing::warn;

#[derive(Debug, Deserialize)]
struct OverlayRecord {
    name: String,
    #[serde(default)]
    metadata: Vec<MetadataRecord>,
    #[serde(default)]
    input_operation: Option<String>,
}

/// Overlay data for one site.
#[derive(Debug, Clone, Default)]
pub struct OverlayEntry {
    /// Compiled extraction directives
    pub metadata: Vec<MetadataRule>,
    /// Identifier transform
    pub input_operation: Option<InputOperation>,
}

/// Overlay entries indexed by site name.
#[derive(Debug, Default)]
pub struct MetadataOverlay {
    entries: HashMap<String, OverlayEntry>,
    rejected: Vec<CatalogError>,
}

impl MetadataOverlay {
    /// Build an overlay from a parsed document.
    ///
    /// # Errors
    /// Returns [`CatalogError::Malformed`] when the document has no `sites` array.
    pub fn from_document(origin: &str, document: &Value) -> Result<Self> {
        let mut overlay = Self::default();

        for entry in sites_array(origin, document)? {
            match compile_entry(entry) {
                Ok((name, compiled)) => {
                    overlay.entries.insert(name, compiled);
                }
                Err(e) => {
                    warn!(origin = %origin, error = %e, "excluding invalid metadata entry");
                    overlay.rejected.push(e);
                }
            }
        }

        Ok(overlay)
    }

    /// Overlay entry for a site.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&OverlayEntry> {
        self.entries.get(name)
    }

    /// Number of sites with overlay data.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the overlay is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries excluded at load.
    #[must_use]
    pub fn rejected(&self) -> &[CatalogError] {
        &self.rejected
    }
}

fn compile_entry(entry: &Value) -> Result<(String, OverlayEntry)> {
    let label = entry
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or("<unnamed>")
        .to_string();

    let record: OverlayRecord = serde_json::from_value(entry.clone())
        .map_err(|e| CatalogError::invalid_rule(&label, e.to_string()))?;

    let metadata = record
        .metadata
        .iter()
        .map(|directive| directive.compile(&record.name))
        .collect::<Result<Vec<_>>>()?;

    let input_operation = match record.input_operation.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(name) => Some(
            name.parse::<InputOperation>()
                .map_err(|reason| CatalogError::invalid_rule(&record.name, reason))?,
        ),
    };

    Ok((
        record.name,
        OverlayEntry {
            metadata,
            input_operation,
        },
    ))
}

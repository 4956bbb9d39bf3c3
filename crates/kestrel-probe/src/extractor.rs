//! Metadata extraction from positive responses.

use crate::http::ProbeResponse;
use crate::result::MetadataField;
use kestrel_catalog::{Extraction, MetadataRule};
use scraper::Html;
use serde_json::Value;

/// Apply `rules` to `response`.
///
/// Directives that match nothing contribute no field. The output is sorted
/// by field name and is empty, never absent, when nothing matched.
#[must_use]
pub fn extract(rules: &[MetadataRule], response: &ProbeResponse) -> Vec<MetadataField> {
    let mut json: Option<Option<Value>> = None;
    let mut document: Option<Html> = None;
    let mut fields = Vec::new();

    for rule in rules {
        let value = match &rule.extraction {
            Extraction::Json(path) => json
                .get_or_insert_with(|| response.json_value())
                .as_ref()
                .and_then(|doc| path.lookup_text(doc)),
            Extraction::Html {
                selector,
                attribute,
            } => {
                let document = document.get_or_insert_with(|| Html::parse_document(&response.body));
                document.select(selector).next().and_then(|element| match attribute {
                    Some(attr) => element.value().attr(attr).map(str::to_string),
                    None => Some(element.text().collect::<String>()),
                })
            }
            Extraction::Regex(pattern) => pattern.captures(&response.body).and_then(|caps| {
                caps.get(1)
                    .or_else(|| caps.get(0))
                    .map(|m| m.as_str().to_string())
            }),
        };

        if let Some(value) = value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) {
            fields.push(MetadataField {
                name: rule.name.clone(),
                value,
                field_type: rule.field_type,
            });
        }
    }

    fields.sort_by(|a, b| a.name.cmp(&b.name));
    fields
}

//! Kestrel Catalog - Site rule catalogs and their synchronization.
//!
//! This crate owns the declarative rule data the probe engine evaluates:
//! parsing WhatsMyName-style JSON documents into validated site rules,
//! overlaying metadata directives, and keeping local files current with a
//! remote source via content-hash comparison.
//!
//! # Architecture
//!
//! - **Definitions** ([`definition`]): raw records, validated rules, predicates, pre-checks
//! - **Extraction** ([`extraction`]): compiled metadata directives (JSON path, CSS, regex)
//! - **Transforms** ([`transform`]): named identifier rewrites
//! - **Catalog** ([`catalog`]): immutable snapshot with lookups and a content hash
//! - **Loader** ([`loader`]): local file loading and overlay application
//! - **Sync** ([`sync`]): remote refresh with atomic replacement
//!
//! # Example
//!
//! ```rust
//! use kestrel_catalog::Catalog;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let catalog = Catalog::from_json_str(
//!     "inline",
//!     r#"{"sites": [{"name": "GitHub", "cat": "coding",
//!        "uri_check": "https://api.github.com/users/{account}",
//!        "e_code": 200, "e_string": "login", "m_code": 404, "m_string": "Not Found"}]}"#,
//! )?;
//!
//! assert_eq!(catalog.len(), 1);
//! assert_eq!(catalog.by_category("coding").len(), 1);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod catalog;
pub mod definition;
pub mod error;
pub mod extraction;
pub mod hash;
pub mod loader;
pub mod overlay;
pub mod sync;
pub mod transform;

// Re-export commonly used types
pub use catalog::Catalog;
pub use definition::{
    PreCheck, Predicate, SiteRecord, SiteRule, TokenRequest, TokenSource, ACCOUNT_PLACEHOLDER,
    NSFW_CATEGORY,
};
pub use error::{CatalogError, Result, SyncError};
pub use extraction::{Extraction, FieldType, JsonPath, MetadataRecord, MetadataRule};
pub use hash::content_hash;
pub use loader::{load_for_kind, CatalogLoader};
pub use overlay::{MetadataOverlay, OverlayEntry};
pub use sync::{CatalogSynchronizer, RemoteSource, SyncOutcome, SyncReport};
pub use transform::{transform, InputOperation};

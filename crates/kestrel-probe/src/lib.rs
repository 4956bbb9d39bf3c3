//! Kestrel Probe - Account existence probing across a site rule catalog.
//!
//! Given an identifier (a username or an email address), this crate fires
//! one HTTP probe per selected site rule, with a bounded number in flight,
//! and classifies each response as `FOUND`, `NOT_FOUND` or `ERROR`. Found
//! accounts may have profile metadata extracted from the response.
//!
//! # Architecture
//!
//! - **Templates** ([`template`]): identifier substitution into URL, body and headers
//! - **HTTP** ([`http`]): session client, response capture and charset decoding
//! - **Pre-checks** ([`precheck`]): credential injection and token handshakes
//! - **Executor** ([`executor`]): one probe, from transform to classification
//! - **Extractor** ([`extractor`]): metadata from JSON, HTML and regex directives
//! - **Session** ([`session`]): bounded concurrency, progress, cancellation
//! - **Engine** ([`engine`]): catalog sync, load, selection and session setup
//!
//! # Example
//!
//! ```rust
//! use kestrel_catalog::Catalog;
//! use kestrel_probe::{classify, ProbeStatus, SiteFilter};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let catalog = Catalog::from_json_str(
//!     "inline",
//!     r#"{"sites": [{"name": "GitHub", "cat": "coding",
//!        "uri_check": "https://api.github.com/users/{account}",
//!        "e_code": 200, "e_string": "login", "m_code": 404, "m_string": "Not Found"}]}"#,
//! )?;
//!
//! let filter = SiteFilter::expression("cat = coding")?;
//! let rules = filter.select(catalog.rules(), false);
//! assert_eq!(rules.len(), 1);
//!
//! assert_eq!(classify(&rules[0], 200, r#"{"login": "octocat"}"#), ProbeStatus::Found);
//! assert_eq!(classify(&rules[0], 404, "Not Found"), ProbeStatus::NotFound);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod dump;
pub mod engine;
pub mod error;
pub mod executor;
pub mod extractor;
pub mod filter;
pub mod http;
pub mod precheck;
pub mod progress;
pub mod result;
pub mod session;
pub mod template;
pub mod user_agent;

// Re-export commonly used types
pub use dump::{DirectorySink, ResponseSink};
pub use engine::ProbeEngine;
pub use error::{AuthenticationError, FilterError, ProbeError, Result};
pub use executor::{classify, ProbeExecutor};
pub use extractor::extract;
pub use filter::{Condition, FilterExpr, Operator, Property, SiteFilter};
pub use http::{ClientSettings, ProbeResponse};
pub use progress::{NoopObserver, ProgressEvent, ProgressObserver};
pub use result::{ErrorKind, MetadataField, ProbeFailure, ProbeResult, ProbeStatus, SessionReport};
pub use session::{drive, DriveOutcome, ProbeSession};
pub use template::RequestPlan;
pub use tokio_util::sync::CancellationToken;

//! Kestrel Core - Foundation crate for the Kestrel account probe engine.
//!
//! This crate provides shared types, error handling and configuration
//! management that the catalog and probe crates depend on.
//!
//! # Modules
//!
//! - [`error`] - Central error types using thiserror
//! - [`config`] - TOML-based configuration with XDG paths
//! - [`types`] - Shared newtypes and enums (`TargetIdentifier`, `SearchKind`, `SessionId`, `Timestamp`)
//!
//! # Example
//!
//! ```rust
//! use kestrel_core::{KestrelConfig, SearchKind, TargetIdentifier};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = KestrelConfig::default();
//! assert_eq!(config.probe.concurrency, 30);
//!
//! let target = TargetIdentifier::new("octocat")?;
//! assert_eq!(target.kind(), SearchKind::Username);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod config;
pub mod error;
pub mod types;

// Re-export commonly used types
pub use config::{CatalogConfig, CatalogSource, KestrelConfig, ProbeConfig};
pub use error::{ConfigError, ConfigResult, KestrelError, Result};
pub use types::{SearchKind, SessionId, TargetIdentifier, Timestamp};

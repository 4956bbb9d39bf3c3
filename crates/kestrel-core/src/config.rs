//! Configuration management for Kestrel.
//!
//! Provides TOML-based configuration with XDG-compliant paths and
//! environment variable overrides.

use crate::error::{ConfigError, ConfigResult};
use crate::types::SearchKind;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

/// Prefix of environment variables that provide pre-check credentials.
pub const CREDENTIAL_ENV_PREFIX: &str = "KESTREL_CREDENTIAL_";

/// Main configuration.
///
/// This is loaded from `~/.config/kestrel/config.toml` (or platform equivalent).
/// If the file doesn't exist, default values are used.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KestrelConfig {
    /// Probe behavior settings
    pub probe: ProbeConfig,
    /// Rule catalog locations and update policy
    pub catalog: CatalogConfig,
    /// Named credentials consumed by pre-check directives (never written to disk)
    #[serde(skip)]
    pub credentials: HashMap<String, String>,
}

impl KestrelConfig {
    /// Load configuration from disk, falling back to defaults if not found.
    ///
    /// # Errors
    /// Returns error if:
    /// - Config directory cannot be determined
    /// - File exists but cannot be read
    /// - File contents are not valid TOML
    pub fn load() -> ConfigResult<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            tracing::debug!("Loading config from {}", config_path.display());
            let contents = fs::read_to_string(&config_path)?;
            let config: Self = toml::from_str(&contents)?;
            config.validate()?;
            Ok(config)
        } else {
            tracing::debug!("Config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Load configuration with environment variable overrides.
    ///
    /// Supports the following environment variables:
    /// - `KESTREL_TIMEOUT_SECS`: Override the per-request timeout
    /// - `KESTREL_CONCURRENCY`: Override the concurrency limit
    /// - `KESTREL_PROXY`: Route probes through an upstream proxy
    /// - `KESTREL_NO_UPDATE`: Skip catalog synchronization (true/false)
    /// - `KESTREL_CREDENTIAL_<NAME>`: Provide the pre-check credential `<NAME>`
    pub fn load_with_env() -> ConfigResult<Self> {
        let mut config = Self::load()?;
        config.apply_env(std::env::vars());
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from an iterator of `(name, value)` pairs.
    pub fn apply_env<I>(&mut self, vars: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, val) in vars {
            match key.as_str() {
                "KESTREL_TIMEOUT_SECS" => {
                    if let Ok(secs) = val.parse() {
                        self.probe.timeout_secs = secs;
                        tracing::debug!("Override probe.timeout_secs from env: {}", secs);
                    }
                }
                "KESTREL_CONCURRENCY" => {
                    if let Ok(limit) = val.parse() {
                        self.probe.concurrency = limit;
                        tracing::debug!("Override probe.concurrency from env: {}", limit);
                    }
                }
                "KESTREL_PROXY" => {
                    tracing::debug!("Override probe.proxy from env");
                    self.probe.proxy = if val.is_empty() { None } else { Some(val) };
                }
                "KESTREL_NO_UPDATE" => {
                    if let Ok(no_update) = val.parse::<bool>() {
                        self.catalog.auto_update = !no_update;
                        tracing::debug!("Override catalog.auto_update from env: {}", !no_update);
                    }
                }
                _ => {
                    if let Some(name) = key.strip_prefix(CREDENTIAL_ENV_PREFIX) {
                        if !name.is_empty() && !val.is_empty() {
                            self.credentials.insert(name.to_string(), val);
                        }
                    }
                }
            }
        }
    }

    /// Look up a named pre-check credential.
    #[must_use]
    pub fn credential(&self, name: &str) -> Option<&str> {
        self.credentials.get(name).map(String::as_str)
    }

    /// Check that values are usable.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.probe.concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                field: "probe.concurrency".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        if self.probe.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "probe.timeout_secs".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(())
    }

    /// Save configuration to disk.
    ///
    /// Creates the config directory if it doesn't exist.
    pub fn save(&self) -> ConfigResult<()> {
        let config_path = Self::config_path()?;
        let config_dir = config_path
            .parent()
            .ok_or_else(|| ConfigError::InvalidValue {
                field: "config_path".to_string(),
                reason: "no parent directory".to_string(),
            })?;

        fs::create_dir_all(config_dir)?;
        tracing::debug!("Saving config to {}", config_path.display());

        let contents = toml::to_string_pretty(self)?;
        fs::write(config_path, contents)?;
        Ok(())
    }

    /// Get the path to the configuration file.
    ///
    /// Uses XDG base directories: `~/.config/kestrel/config.toml`
    pub fn config_path() -> ConfigResult<PathBuf> {
        let dirs = ProjectDirs::from("com", "kestrel", "kestrel").ok_or(ConfigError::NoConfigDir)?;
        Ok(dirs.config_dir().join("config.toml"))
    }

    /// Get the data directory path.
    ///
    /// Uses XDG base directories: `~/.local/share/kestrel`
    pub fn data_dir() -> ConfigResult<PathBuf> {
        let dirs = ProjectDirs::from("com", "kestrel", "kestrel").ok_or(ConfigError::NoConfigDir)?;
        Ok(dirs.data_dir().to_path_buf())
    }
}

/// Probe behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[allow(clippy::struct_excessive_bools)]
pub struct ProbeConfig {
    /// Maximum number of probes in flight at once
    pub concurrency: usize,
    /// Per-request timeout in seconds (pre-check and main request)
    pub timeout_secs: u64,
    /// Optional upstream proxy URL (http, https or socks5)
    pub proxy: Option<String>,
    /// Report individual site outcomes instead of only counting them
    pub verbose: bool,
    /// Persist response bodies of found accounts
    pub dump: bool,
    /// Directory that receives dumped bodies
    pub dump_dir: PathBuf,
    /// Drop rules in the NSFW category before probing
    pub exclude_nsfw: bool,
    /// Fixed User-Agent; a random one is picked per session when unset
    pub user_agent: Option<String>,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            concurrency: 30,
            timeout_secs: 30,
            proxy: None,
            verbose: false,
            dump: false,
            dump_dir: PathBuf::from("results"),
            exclude_nsfw: false,
            user_agent: None,
        }
    }
}

/// Where one catalog lives locally and, optionally, remotely.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogSource {
    /// Local catalog file
    pub local_path: PathBuf,
    /// Remote document kept in sync with the local file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_url: Option<String>,
}

/// Rule catalog settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Synchronize catalogs with their remote sources before a run
    pub auto_update: bool,
    /// Username catalog
    pub username: CatalogSource,
    /// Email catalog
    pub email: CatalogSource,
    /// Metadata overlay applied to the username catalog
    pub metadata: Option<CatalogSource>,
}

impl CatalogConfig {
    /// Get the catalog source for a search kind.
    #[must_use]
    pub fn source(&self, kind: SearchKind) -> &CatalogSource {
        match kind {
            SearchKind::Username => &self.username,
            SearchKind::Email => &self.email,
        }
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            auto_update: true,
            username: CatalogSource {
                local_path: PathBuf::from("data/wmn-data.json"),
                remote_url: Some(
                    "https://raw.githubusercontent.com/WebBreacher/WhatsMyName/main/wmn-data.json"
                        .to_string(),
                ),
            },
            email: CatalogSource {
                local_path: PathBuf::from("data/email-data.json"),
                remote_url: None,
            },
            metadata: Some(CatalogSource {
                local_path: PathBuf::from("data/wmn-metadata.json"),
                remote_url: None,
            }),
        }
    }
}

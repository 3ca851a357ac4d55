//! Resolver configuration (config.toml)
//!
//! Holds HTTP and paging settings, extra dual-catalog pairs, and the
//! registered repositories as read from the repository store.
//!
//! ```toml
//! [http]
//! timeout_secs = 30
//!
//! [paging]
//! v2_page_size = 100
//!
//! [[repository]]
//! name = "PSGallery"
//! url = "https://www.powershellgallery.com/api/v2"
//! priority = 50
//! trusted = false
//! ```

use crate::repository::{
    DualCatalog, Protocol, RepositoryDescriptor, DEFAULT_PRIORITY, MAX_PRIORITY,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Validation error
    #[error("Invalid config: {0}")]
    Validation(String),
}

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ResolverConfig {
    /// HTTP client settings
    #[serde(default)]
    pub http: HttpConfig,

    /// Pagination settings for remote feeds
    #[serde(default)]
    pub paging: PagingConfig,

    /// Additional module/script catalog pairs
    #[serde(default, rename = "dual_catalog", skip_serializing_if = "Vec::is_empty")]
    pub dual_catalogs: Vec<DualCatalog>,

    /// Registered repositories
    #[serde(default, rename = "repository", skip_serializing_if = "Vec::is_empty")]
    pub repositories: Vec<RepositoryEntry>,
}

/// HTTP client settings, applied once when a client is built
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HttpConfig {
    /// Whole-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// User-Agent header
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Largest accepted response body
    #[serde(default = "default_max_response_bytes")]
    pub max_response_bytes: u64,

    /// Extra headers sent with every request
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_user_agent() -> String {
    format!("scriptpm/{}", env!("CARGO_PKG_VERSION"))
}

fn default_max_response_bytes() -> u64 {
    50 * 1024 * 1024
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            user_agent: default_user_agent(),
            max_response_bytes: default_max_response_bytes(),
            headers: BTreeMap::new(),
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Pagination settings
///
/// The thresholds are tuned against observed server behaviour rather than a
/// protocol guarantee, so they stay configurable.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PagingConfig {
    /// Records requested per V2 page (`$top`)
    #[serde(default = "default_page_size")]
    pub v2_page_size: usize,

    /// A V2 page with at least this many records signals another page
    #[serde(default = "default_page_size")]
    pub v2_full_page_threshold: usize,

    /// Records requested per V3 search page (`take`)
    #[serde(default = "default_page_size")]
    pub v3_page_size: usize,

    /// Upper bound on pages fetched for one search
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,
}

fn default_page_size() -> usize {
    100
}

fn default_max_pages() -> usize {
    100
}

impl Default for PagingConfig {
    fn default() -> Self {
        Self {
            v2_page_size: default_page_size(),
            v2_full_page_threshold: default_page_size(),
            v3_page_size: default_page_size(),
            max_pages: default_max_pages(),
        }
    }
}

/// Repository as recorded in the config file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RepositoryEntry {
    pub name: String,
    pub url: String,

    #[serde(default = "default_priority")]
    pub priority: u8,

    #[serde(default)]
    pub trusted: bool,

    /// Protocol override; derived from the URL when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<Protocol>,
}

fn default_priority() -> u8 {
    DEFAULT_PRIORITY
}

impl RepositoryEntry {
    pub fn to_descriptor(&self) -> RepositoryDescriptor {
        let descriptor = RepositoryDescriptor::new(&self.name, &self.url, self.priority)
            .with_trusted(self.trusted);
        match self.protocol {
            Some(protocol) => descriptor.with_protocol(protocol),
            None => descriptor,
        }
    }
}

impl ResolverConfig {
    /// Parse and validate a config file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_str(&content)
    }

    /// Parse and validate config text
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let config: ResolverConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if it exists, otherwise fall back to defaults
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::from_file(path)
        } else {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            Ok(Self::default())
        }
    }

    /// Default config location (`<config dir>/scriptpm/config.toml`)
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("scriptpm").join("config.toml"))
    }

    /// Validate the config
    pub fn validate(&self) -> Result<(), ConfigError> {
        let paging = &self.paging;
        if paging.v2_page_size == 0
            || paging.v3_page_size == 0
            || paging.max_pages == 0
            || paging.v2_full_page_threshold == 0
        {
            return Err(ConfigError::Validation(
                "page sizes, v2_full_page_threshold and max_pages must be greater than zero"
                    .to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for repo in &self.repositories {
            if repo.name.trim().is_empty() {
                return Err(ConfigError::Validation("repository name cannot be empty".to_string()));
            }
            if repo.url.trim().is_empty() {
                return Err(ConfigError::Validation(format!(
                    "repository '{}' has an empty url",
                    repo.name
                )));
            }
            if repo.priority > MAX_PRIORITY {
                return Err(ConfigError::Validation(format!(
                    "repository '{}' has priority {}, expected 0..={}",
                    repo.name, repo.priority, MAX_PRIORITY
                )));
            }
            if !seen.insert(repo.name.to_ascii_lowercase()) {
                return Err(ConfigError::Validation(format!(
                    "repository '{}' is registered more than once",
                    repo.name
                )));
            }
        }

        Ok(())
    }

    /// Registered repositories as descriptors
    pub fn descriptors(&self) -> Vec<RepositoryDescriptor> {
        self.repositories.iter().map(RepositoryEntry::to_descriptor).collect()
    }

    /// Well-known dual catalogs plus the configured ones
    pub fn all_dual_catalogs(&self) -> Vec<DualCatalog> {
        let mut catalogs = DualCatalog::well_known();
        catalogs.extend(self.dual_catalogs.iter().cloned());
        catalogs
    }
}

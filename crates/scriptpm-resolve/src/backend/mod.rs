//! Repository backends
//!
//! One [`RepositoryBackend`] per protocol: a local directory catalog, a
//! NuGet v2 OData feed and a NuGet v3 JSON feed. The variant is chosen once
//! from the descriptor's protocol when the backend is built.

pub mod http;
pub mod local;
pub mod nuspec;
pub mod v2;
pub mod v3;
pub mod v3_api;

pub use http::{HttpTransport, ReqwestTransport, RequestOptions};
pub use local::LocalBackend;
pub use v2::V2Backend;
pub use v3::V3Backend;

use crate::cancel::CancellationToken;
use crate::config::{PagingConfig, ResolverConfig};
use crate::diagnostics::DiagnosticKind;
use crate::repository::{Protocol, RepositoryDescriptor};
use crate::resource::PackageEntry;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur while querying a repository
#[derive(Debug, Error)]
pub enum BackendError {
    /// HTTP request failed before a response arrived
    #[error("HTTP request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Non-success HTTP status
    #[error("HTTP {status} for URL: {url}")]
    HttpStatus { status: u16, url: String },

    /// Response body lacked the expected structure
    #[error("Malformed response from {url}: {reason}")]
    MalformedResponse { url: String, reason: String },

    /// Response body larger than allowed
    #[error("Response from {url} exceeds {max} bytes")]
    ContentTooLarge { url: String, max: u64 },

    /// Local catalog could not be read
    #[error("IO error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Repository URL could not be used
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Configured header cannot be sent
    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    /// No backend exists for the repository's protocol
    #[error("Repository {name} uses unsupported protocol {protocol}")]
    UnsupportedProtocol { name: String, protocol: Protocol },

    /// Cancellation was requested
    #[error("Operation cancelled")]
    Cancelled,
}

impl BackendError {
    pub fn malformed(url: &str, reason: impl Into<String>) -> Self {
        BackendError::MalformedResponse {
            url: url.to_string(),
            reason: reason.into(),
        }
    }

    /// Diagnostic category used when this error is downgraded to a soft failure
    pub fn diagnostic_kind(&self) -> DiagnosticKind {
        match self {
            BackendError::Transport { .. }
            | BackendError::HttpStatus { .. }
            | BackendError::ContentTooLarge { .. }
            | BackendError::Cancelled => DiagnosticKind::Transport,
            BackendError::MalformedResponse { .. } => DiagnosticKind::MalformedResponse,
            BackendError::Io { .. }
            | BackendError::InvalidUrl(_)
            | BackendError::InvalidHeader(_)
            | BackendError::UnsupportedProtocol { .. } => DiagnosticKind::UnsupportedRepository,
        }
    }
}

/// Search capability every repository protocol provides
///
/// Implementations check `cancel` before each request they issue.
pub trait RepositoryBackend {
    /// Every version of exactly `name` known to the repository
    fn search_by_exact_name(
        &self,
        name: &str,
        include_prerelease: bool,
        cancel: &CancellationToken,
    ) -> Result<Vec<PackageEntry>, BackendError>;

    /// Latest version of every package the backend considers a match for
    /// `pattern`
    ///
    /// Backends may over-return; callers re-filter names.
    fn search_by_wildcard_name(
        &self,
        pattern: &str,
        include_prerelease: bool,
        cancel: &CancellationToken,
    ) -> Result<Vec<PackageEntry>, BackendError>;

    /// Latest version of every package carrying any of `tags`
    ///
    /// Defaults to a full wildcard search; callers apply the tag filter.
    fn search_by_tags(
        &self,
        _tags: &[String],
        include_prerelease: bool,
        cancel: &CancellationToken,
    ) -> Result<Vec<PackageEntry>, BackendError> {
        self.search_by_wildcard_name("*", include_prerelease, cancel)
    }
}

/// Source of backends for repository descriptors
pub trait BackendProvider {
    fn backend_for(
        &mut self,
        descriptor: &RepositoryDescriptor,
    ) -> Result<Arc<dyn RepositoryBackend>, BackendError>;
}

/// Builds backends and keeps them across resolution calls
///
/// Keyed by name, URL and protocol, so a changed descriptor gets a fresh
/// backend (and with it a fresh V3 service-index cache).
pub struct BackendRegistry {
    transport: Arc<dyn HttpTransport>,
    paging: PagingConfig,
    backends: HashMap<(String, String, Protocol), Arc<dyn RepositoryBackend>>,
}

impl BackendRegistry {
    pub fn new(transport: Arc<dyn HttpTransport>, paging: PagingConfig) -> Self {
        Self {
            transport,
            paging,
            backends: HashMap::new(),
        }
    }

    /// Registry using a reqwest client built from `config`
    pub fn from_config(config: &ResolverConfig) -> Result<Self, BackendError> {
        let transport = ReqwestTransport::new(&config.http)?;
        Ok(Self::new(Arc::new(transport), config.paging))
    }

    fn build(
        &self,
        descriptor: &RepositoryDescriptor,
    ) -> Result<Arc<dyn RepositoryBackend>, BackendError> {
        let backend: Arc<dyn RepositoryBackend> = match descriptor.protocol {
            Protocol::Local => Arc::new(LocalBackend::from_url(&descriptor.url)?),
            Protocol::V2 => Arc::new(V2Backend::new(
                &descriptor.url,
                Arc::clone(&self.transport),
                self.paging,
            )?),
            Protocol::V3 => Arc::new(V3Backend::new(
                &descriptor.url,
                Arc::clone(&self.transport),
                self.paging,
            )?),
            Protocol::Container => {
                return Err(BackendError::UnsupportedProtocol {
                    name: descriptor.name.clone(),
                    protocol: descriptor.protocol,
                })
            }
        };
        Ok(backend)
    }
}

impl BackendProvider for BackendRegistry {
    fn backend_for(
        &mut self,
        descriptor: &RepositoryDescriptor,
    ) -> Result<Arc<dyn RepositoryBackend>, BackendError> {
        let key = (
            descriptor.name.to_ascii_lowercase(),
            descriptor.url.clone(),
            descriptor.protocol,
        );

        if let Some(backend) = self.backends.get(&key) {
            return Ok(Arc::clone(backend));
        }

        tracing::debug!(
            repository = %descriptor.name,
            url = %descriptor.url,
            protocol = %descriptor.protocol,
            "Creating backend"
        );
        let backend = self.build(descriptor)?;
        self.backends.insert(key, Arc::clone(&backend));
        Ok(backend)
    }
}

/// Drop prerelease entries unless they were asked for
pub(crate) fn retain_prerelease(entries: &mut Vec<PackageEntry>, include_prerelease: bool) {
    if !include_prerelease {
        entries.retain(|e| !e.version.is_prerelease());
    }
}

/// Keep only the latest entry per case-insensitive name, sorted by name
pub(crate) fn latest_per_name(entries: Vec<PackageEntry>) -> Vec<PackageEntry> {
    let mut latest: HashMap<String, PackageEntry> = HashMap::new();
    for entry in entries {
        let key = entry.name.to_ascii_lowercase();
        match latest.get(&key) {
            Some(existing) if existing.version >= entry.version => {}
            _ => {
                latest.insert(key, entry);
            }
        }
    }

    let mut result: Vec<PackageEntry> = latest.into_values().collect();
    result.sort_by(|a, b| a.name.to_ascii_lowercase().cmp(&b.name.to_ascii_lowercase()));
    result
}

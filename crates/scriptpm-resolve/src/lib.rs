//! Script Package Manager Resolution Library
//!
//! This crate finds modules and scripts across registered repositories:
//! - Version parsing and constraint matching (NuGet notation)
//! - Repository backends for local directories, NuGet v2 and v3 feeds
//! - Wildcard name matching and tag filtering
//! - Priority-ordered, streaming resolution with soft failures
//! - Transitive dependency expansion
//! - Resolver configuration (config.toml)

pub mod backend;
pub mod cancel;
pub mod config;
pub mod dependency;
pub mod diagnostics;
pub mod name_match;
pub mod repository;
pub mod resolver;
pub mod resource;
pub mod select;
pub mod tags;
pub mod version;

pub use backend::{
    BackendError, BackendProvider, BackendRegistry, HttpTransport, LocalBackend, RepositoryBackend,
    RequestOptions, ReqwestTransport, V2Backend, V3Backend,
};
pub use cancel::CancellationToken;
pub use config::{ConfigError, HttpConfig, PagingConfig, RepositoryEntry, ResolverConfig};
pub use dependency::DependencyExpander;
pub use diagnostics::{Diagnostic, DiagnosticKind};
pub use name_match::{has_wildcard, NamePattern};
pub use repository::{DualCatalog, Protocol, RepositoryDescriptor};
pub use resolver::{Resolution, ResolutionStream, ResolveError, ResolveRequest, Resolver};
pub use resource::{
    DependencyRef, KindFilter, PackageEntry, ResourceIdentity, ResourceKind, ResourceRecord,
};
pub use select::{select_all, select_latest};
pub use tags::{has_any_required_tag, TagFilter};
pub use version::{Version, VersionConstraint, VersionError, VersionRange};

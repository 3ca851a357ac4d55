//! Repository descriptors and search order
//!
//! Descriptors come from the repository store and are read-only here. The
//! resolver turns them into an ordered list of catalogs to probe, adding a
//! script sub-catalog after each dual-catalog repository when scripts are
//! wanted.

use crate::resource::{KindFilter, ResourceKind};
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

/// Priority given to repositories that do not set one (lowest)
pub const DEFAULT_PRIORITY: u8 = 50;

/// Highest number accepted as a priority; 0 is searched first
pub const MAX_PRIORITY: u8 = 50;

/// Well-known repositories whose scripts live at a separate endpoint
pub const WELL_KNOWN_DUAL_CATALOGS: &[(&str, &str)] = &[(
    "https://www.powershellgallery.com/api/v2",
    "https://www.powershellgallery.com/api/v2/items/psscript",
)];

/// Wire protocol spoken by a repository
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// Directory of package archives
    Local,

    /// NuGet v2 OData feed
    V2,

    /// NuGet v3 JSON feed (service index)
    V3,

    /// Container-registry-backed feed
    Container,
}

impl Protocol {
    /// Derive the protocol from a repository URL
    ///
    /// `file://` URLs and plain paths are local, a service index
    /// (`.../index.json`) is V3, `oci://` is a container registry and any
    /// other http(s) URL is V2.
    pub fn detect(url: &str) -> Protocol {
        let Ok(parsed) = Url::parse(url.trim()) else {
            return Protocol::Local;
        };

        match parsed.scheme() {
            "http" | "https" => {
                let path = parsed.path().trim_end_matches('/').to_ascii_lowercase();
                if path.ends_with("index.json") {
                    Protocol::V3
                } else {
                    Protocol::V2
                }
            }
            "oci" => Protocol::Container,
            // file:// and Windows drive letters parsed as schemes
            _ => Protocol::Local,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Protocol::Local => "local",
            Protocol::V2 => "v2",
            Protocol::V3 => "v3",
            Protocol::Container => "container",
        };
        f.write_str(label)
    }
}

/// A registered repository
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepositoryDescriptor {
    pub name: String,
    pub url: String,
    /// 0 is searched first, 50 last
    pub priority: u8,
    pub trusted: bool,
    pub protocol: Protocol,
}

impl RepositoryDescriptor {
    /// Create a descriptor, deriving the protocol from the URL
    pub fn new(name: impl Into<String>, url: impl Into<String>, priority: u8) -> Self {
        let url = url.into();
        Self {
            name: name.into(),
            protocol: Protocol::detect(&url),
            url,
            priority,
            trusted: false,
        }
    }

    pub fn with_protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn with_trusted(mut self, trusted: bool) -> Self {
        self.trusted = trusted;
        self
    }

    pub fn is_local(&self) -> bool {
        self.protocol == Protocol::Local
    }
}

/// Sort repositories into search order: priority, then name
pub fn sort_by_priority(repositories: &mut [RepositoryDescriptor]) {
    repositories.sort_by(|a, b| {
        a.priority
            .cmp(&b.priority)
            .then_with(|| a.name.to_ascii_lowercase().cmp(&b.name.to_ascii_lowercase()))
    });
}

/// Module catalog URL paired with its separate script catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DualCatalog {
    pub module_url: String,
    pub script_url: String,
}

impl DualCatalog {
    /// The built-in well-known pairs
    pub fn well_known() -> Vec<DualCatalog> {
        WELL_KNOWN_DUAL_CATALOGS
            .iter()
            .map(|(module_url, script_url)| DualCatalog {
                module_url: module_url.to_string(),
                script_url: script_url.to_string(),
            })
            .collect()
    }
}

/// Role of a catalog within its repository
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogRole {
    /// The repository's own endpoint
    Primary,

    /// Synthesized script sub-catalog of a dual-catalog repository
    Scripts,
}

/// One physical endpoint to probe, in search order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogTarget {
    /// Endpoint descriptor; for script sub-catalogs the URL is the script catalog
    pub descriptor: RepositoryDescriptor,

    /// Repository name reported on records and diagnostics
    pub repository: String,

    pub role: CatalogRole,

    /// A script sub-catalog follows this target
    pub has_script_sibling: bool,
}

impl CatalogTarget {
    /// Kind imposed by the catalog itself
    pub fn forced_kind(&self) -> Option<ResourceKind> {
        match self.role {
            CatalogRole::Primary => None,
            CatalogRole::Scripts => Some(ResourceKind::Script),
        }
    }

    /// Label for logs and diagnostics
    pub fn label(&self) -> String {
        match self.role {
            CatalogRole::Primary => self.repository.clone(),
            CatalogRole::Scripts => format!("{} (scripts)", self.repository),
        }
    }
}

/// Build the ordered list of catalogs to probe
///
/// Repositories are sorted by priority then name. A dual-catalog repository
/// is followed immediately by its script catalog when `kind` admits scripts.
pub fn plan_catalogs(
    repositories: &[RepositoryDescriptor],
    kind: KindFilter,
    dual_catalogs: &[DualCatalog],
) -> Vec<CatalogTarget> {
    let mut ordered = repositories.to_vec();
    sort_by_priority(&mut ordered);

    let mut targets = Vec::with_capacity(ordered.len());
    for descriptor in ordered {
        let script_url = if kind.admits_scripts() {
            dual_catalogs
                .iter()
                .find(|dual| same_url(&dual.module_url, &descriptor.url))
                .map(|dual| dual.script_url.clone())
        } else {
            None
        };

        let repository = descriptor.name.clone();
        targets.push(CatalogTarget {
            descriptor: descriptor.clone(),
            repository: repository.clone(),
            role: CatalogRole::Primary,
            has_script_sibling: script_url.is_some(),
        });

        if let Some(script_url) = script_url {
            targets.push(CatalogTarget {
                descriptor: RepositoryDescriptor {
                    url: script_url,
                    ..descriptor
                },
                repository,
                role: CatalogRole::Scripts,
                has_script_sibling: false,
            });
        }
    }

    targets
}

fn same_url(a: &str, b: &str) -> bool {
    a.trim().trim_end_matches('/').eq_ignore_ascii_case(b.trim().trim_end_matches('/'))
}

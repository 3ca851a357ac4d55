//! Resource records produced by resolution
//!
//! Backends return [`PackageEntry`] values (raw catalog metadata). The
//! resolver stamps each one with its repository and kind to build the
//! immutable [`ResourceRecord`] handed to callers.

use crate::version::{Version, VersionConstraint};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Tag marking a package as a script in gallery metadata
pub const SCRIPT_TAG: &str = "PSScript";

/// Tag marking a package as a module in gallery metadata
pub const MODULE_TAG: &str = "PSModule";

/// Kind of distributable resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    /// Library module
    Module,

    /// Standalone script
    Script,
}

impl ResourceKind {
    /// Infer the kind from an explicit item type or the marker tags
    ///
    /// An explicit item type wins. Otherwise a `PSScript` tag makes a script
    /// unless `PSModule` is also present, and everything else is a module.
    pub fn infer(item_type: Option<ResourceKind>, tags: &[String]) -> ResourceKind {
        if let Some(kind) = item_type {
            return kind;
        }
        let has = |marker: &str| tags.iter().any(|t| t.eq_ignore_ascii_case(marker));
        if has(SCRIPT_TAG) && !has(MODULE_TAG) {
            ResourceKind::Script
        } else {
            ResourceKind::Module
        }
    }

    /// Parse the `ItemType` property used by gallery feeds
    pub fn from_item_type(s: &str) -> Option<ResourceKind> {
        match s.trim().to_ascii_lowercase().as_str() {
            "module" => Some(ResourceKind::Module),
            "script" => Some(ResourceKind::Script),
            _ => None,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::Module => write!(f, "Module"),
            ResourceKind::Script => write!(f, "Script"),
        }
    }
}

/// Which resource kinds a request accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KindFilter {
    #[default]
    Any,
    Module,
    Script,
}

impl KindFilter {
    /// Check whether a resource kind passes this filter
    pub fn admits(&self, kind: ResourceKind) -> bool {
        match self {
            KindFilter::Any => true,
            KindFilter::Module => kind == ResourceKind::Module,
            KindFilter::Script => kind == ResourceKind::Script,
        }
    }

    /// True when scripts may appear in the result
    pub fn admits_scripts(&self) -> bool {
        self.admits(ResourceKind::Script)
    }
}

/// Dependency declared by a resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DependencyRef {
    /// Dependency name
    pub name: String,

    /// Acceptable versions
    #[serde(serialize_with = "serialize_display")]
    pub version_range: VersionConstraint,
}

impl DependencyRef {
    pub fn new(name: impl Into<String>, version_range: VersionConstraint) -> Self {
        Self {
            name: name.into(),
            version_range,
        }
    }
}

/// Raw catalog metadata for one package version, as read from a backend
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PackageEntry {
    pub name: String,
    pub version: Version,
    pub tags: Vec<String>,
    pub dependencies: Vec<DependencyRef>,
    pub authors: Option<String>,
    pub description: Option<String>,
    pub project_uri: Option<String>,
    pub license_uri: Option<String>,
    pub published: Option<String>,
    /// Explicit kind reported by the feed (V2 `ItemType`)
    pub item_type: Option<ResourceKind>,
    /// Download location of the package archive, when the feed reports one
    pub package_content: Option<String>,
}

impl PackageEntry {
    /// Create an entry carrying only a name and version
    pub fn new(name: impl Into<String>, version: Version) -> Self {
        Self {
            name: name.into(),
            version,
            ..Default::default()
        }
    }
}

/// Name and version of a resolved resource
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ResourceIdentity {
    pub name: String,
    #[serde(serialize_with = "serialize_display")]
    pub version: Version,
    pub is_prerelease: bool,
    pub prerelease_label: String,
}

impl ResourceIdentity {
    pub fn new(name: impl Into<String>, version: Version) -> Self {
        Self {
            name: name.into(),
            is_prerelease: version.is_prerelease(),
            prerelease_label: version.prerelease_label().to_string(),
            version,
        }
    }

    /// Case-insensitive key used for de-duplication
    pub fn key(&self) -> (String, Version) {
        (self.name.to_ascii_lowercase(), self.version.clone())
    }
}

impl fmt::Display for ResourceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.version)
    }
}

/// A resolved resource, the unit emitted by resolution
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceRecord {
    pub identity: ResourceIdentity,
    pub repository: String,
    pub kind: ResourceKind,
    pub tags: Vec<String>,
    pub dependencies: Vec<DependencyRef>,
    pub authors: Option<String>,
    pub description: Option<String>,
    pub project_uri: Option<String>,
    pub license_uri: Option<String>,
    pub published: Option<String>,
    pub package_content: Option<String>,
}

impl ResourceRecord {
    /// Build a record from backend metadata
    ///
    /// `forced_kind` is set when the catalog itself determines the kind (a
    /// script-only sub-catalog).
    pub fn from_entry(
        entry: PackageEntry,
        repository: &str,
        forced_kind: Option<ResourceKind>,
    ) -> Self {
        let kind = forced_kind.unwrap_or_else(|| ResourceKind::infer(entry.item_type, &entry.tags));
        ResourceRecord {
            identity: ResourceIdentity::new(entry.name, entry.version),
            repository: repository.to_string(),
            kind,
            tags: entry.tags,
            dependencies: entry.dependencies,
            authors: entry.authors,
            description: entry.description,
            project_uri: entry.project_uri,
            license_uri: entry.license_uri,
            published: entry.published,
            package_content: entry.package_content,
        }
    }

    pub fn name(&self) -> &str {
        &self.identity.name
    }

    pub fn version(&self) -> &Version {
        &self.identity.version
    }
}

fn serialize_display<T: fmt::Display, S: Serializer>(value: &T, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_inference() {
        let tags = vec!["PSScript".to_string(), "utility".to_string()];
        assert_eq!(ResourceKind::infer(None, &tags), ResourceKind::Script);
        assert_eq!(ResourceKind::infer(None, &[]), ResourceKind::Module);
        let both = vec!["PSModule".to_string(), "psscript".to_string()];
        assert_eq!(ResourceKind::infer(None, &both), ResourceKind::Module);
        assert_eq!(
            ResourceKind::infer(Some(ResourceKind::Module), &tags),
            ResourceKind::Module
        );
        assert_eq!(ResourceKind::from_item_type("Script"), Some(ResourceKind::Script));
        assert_eq!(ResourceKind::from_item_type("Package"), None);
    }

    #[test]
    fn test_kind_filter() {
        assert!(KindFilter::Any.admits(ResourceKind::Script));
        assert!(KindFilter::Module.admits(ResourceKind::Module));
        assert!(!KindFilter::Module.admits_scripts());
        assert!(KindFilter::Script.admits_scripts());
    }

    #[test]
    fn test_record_from_entry() {
        let mut entry = PackageEntry::new("Foo", Version::prerelease(1, 0, 0, "beta1"));
        entry.tags = vec!["PSModule".to_string()];

        let record = ResourceRecord::from_entry(entry, "Gallery", None);
        assert_eq!(record.name(), "Foo");
        assert_eq!(record.repository, "Gallery");
        assert_eq!(record.kind, ResourceKind::Module);
        assert!(record.identity.is_prerelease);
        assert_eq!(record.identity.prerelease_label, "beta1");
        assert_eq!(record.identity.to_string(), "Foo@1.0.0-beta1");
    }

    #[test]
    fn test_identity_key_is_case_insensitive() {
        let a = ResourceIdentity::new("Foo", Version::new(1, 0, 0));
        let b = ResourceIdentity::new("FOO", Version::parse("1.0").unwrap());
        assert_eq!(a.key(), b.key());
    }
}

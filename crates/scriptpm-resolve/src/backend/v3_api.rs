//! NuGet v3 API types
//!
//! Documents served by a v3 feed: the service index, registration index and
//! pages, and search query results. Unknown fields are ignored.

use serde::{Deserialize, Serialize};

/// Service index
///
/// Response from GET {feed}/index.json
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceIndex {
    /// Protocol version of the index
    #[serde(default)]
    pub version: String,

    /// Advertised resources
    #[serde(default)]
    pub resources: Vec<ServiceResource>,
}

/// Resource advertised by the service index
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceResource {
    /// Resource URL
    #[serde(rename = "@id")]
    pub id: String,

    /// Resource type, e.g. `RegistrationsBaseUrl/3.6.0`
    #[serde(rename = "@type")]
    pub resource_type: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

/// Registration index for one package
///
/// Response from GET {registrations}/{id}/index.json
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationIndex {
    /// Number of pages
    #[serde(default)]
    pub count: usize,

    /// Pages, possibly without their leaves
    #[serde(default)]
    pub items: Vec<RegistrationPage>,
}

/// Page of registration leaves
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationPage {
    /// Page URL, fetched when `items` is not inlined
    #[serde(rename = "@id")]
    pub id: String,

    /// Number of leaves on the page
    #[serde(default)]
    pub count: usize,

    /// Inlined leaves
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<RegistrationLeaf>>,

    /// Lowest version on the page
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lower: Option<String>,

    /// Highest version on the page
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upper: Option<String>,
}

/// One package version in a registration page
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationLeaf {
    /// Package metadata
    pub catalog_entry: CatalogEntry,

    /// Download URL of the package archive
    #[serde(skip_serializing_if = "Option::is_none")]
    pub package_content: Option<String>,
}

/// Package metadata for one version
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    /// Package id
    pub id: String,

    /// Version string
    pub version: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub authors: Option<StringOrList>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<StringOrList>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub license_url: Option<String>,

    /// Publish time
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published: Option<String>,

    /// False for unlisted versions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub listed: Option<bool>,

    /// Dependencies per target framework
    #[serde(default)]
    pub dependency_groups: Vec<DependencyGroup>,
}

/// Dependencies declared for one target framework
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyGroup {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_framework: Option<String>,

    #[serde(default)]
    pub dependencies: Vec<PackageDependency>,
}

/// Declared dependency
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageDependency {
    /// Dependency id
    pub id: String,

    /// Version range in NuGet notation
    #[serde(default)]
    pub range: String,
}

/// Search query response
///
/// Response from GET {search}?q=...
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    /// Total matches across all pages
    #[serde(default)]
    pub total_hits: u64,

    /// Results on this page
    #[serde(default)]
    pub data: Vec<SearchResult>,
}

/// Latest version of one package in a search response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub id: String,

    /// Latest version matching the query
    pub version: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub authors: Option<StringOrList>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<StringOrList>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub license_url: Option<String>,
}

/// Field that feeds send either as one string or as a list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StringOrList {
    One(String),
    Many(Vec<String>),
}

impl StringOrList {
    /// Values as a list; a single string is split on spaces and commas
    pub fn to_list(&self) -> Vec<String> {
        match self {
            StringOrList::One(s) => super::nuspec::split_tags(s),
            StringOrList::Many(items) => items
                .iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        }
    }

    /// Values joined for display
    pub fn joined(&self) -> String {
        match self {
            StringOrList::One(s) => s.trim().to_string(),
            StringOrList::Many(items) => items.join(", "),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_index() {
        let json = r#"{
            "version": "3.0.0",
            "resources": [
                {"@id": "https://api.example/registration/", "@type": "RegistrationsBaseUrl/3.6.0"},
                {"@id": "https://api.example/query", "@type": "SearchQueryService",
                 "comment": "legacy"}
            ]
        }"#;
        let index: ServiceIndex = serde_json::from_str(json).unwrap();
        assert_eq!(index.resources.len(), 2);
        assert_eq!(index.resources[0].resource_type, "RegistrationsBaseUrl/3.6.0");
    }

    #[test]
    fn test_catalog_entry_shapes() {
        let json = r#"{
            "id": "Foo",
            "version": "1.0.0",
            "authors": ["Ann", "Bob"],
            "tags": "PSModule Azure",
            "listed": false,
            "dependencyGroups": [
                {"targetFramework": "net45", "dependencies": [{"id": "Bar", "range": "[1.0.0, )"}]},
                {}
            ]
        }"#;
        let entry: CatalogEntry = serde_json::from_str(json).unwrap();
        assert_eq!(entry.authors.unwrap().joined(), "Ann, Bob");
        assert_eq!(entry.tags.unwrap().to_list(), vec!["PSModule", "Azure"]);
        assert_eq!(entry.listed, Some(false));
        assert_eq!(entry.dependency_groups.len(), 2);
        assert!(entry.dependency_groups[1].dependencies.is_empty());
    }

    #[test]
    fn test_page_without_items() {
        let json = r#"{"count": 1, "items": [
            {"@id": "https://api.example/reg/foo/page/0.json", "count": 64}
        ]}"#;
        let index: RegistrationIndex = serde_json::from_str(json).unwrap();
        assert!(index.items[0].items.is_none());
        assert_eq!(index.items[0].count, 64);
    }
}

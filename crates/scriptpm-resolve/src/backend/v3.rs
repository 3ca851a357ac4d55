//! NuGet v3 (JSON) feed backend
//!
//! The repository URL points at the service index. The registration and
//! search endpoints are looked up from it once per backend and cached.

use super::http::{parse_http_url, HttpTransport, RequestOptions};
use super::nuspec::{dependency_ref, push_unique};
use super::v3_api::{
    CatalogEntry, RegistrationIndex, RegistrationLeaf, RegistrationPage, SearchResponse,
    SearchResult, ServiceIndex, ServiceResource,
};
use super::{latest_per_name, retain_prerelease, BackendError, RepositoryBackend};
use crate::cancel::CancellationToken;
use crate::config::PagingConfig;
use crate::name_match::NamePattern;
use crate::resource::PackageEntry;
use crate::version::Version;
use once_cell::sync::OnceCell;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use url::Url;

const JSON_MIME: &str = "application/json";

/// Resource type family of the registration endpoint
const REGISTRATION_FAMILY: &str = "RegistrationsBaseUrl";

/// Resource type family of the search endpoint
const SEARCH_FAMILY: &str = "SearchQueryService";

/// Endpoints discovered from the service index
#[derive(Debug, Clone, PartialEq, Eq)]
struct ServiceEndpoints {
    /// Registration base URL, always ending in `/`
    registration_base: String,
    search: Option<String>,
}

/// Backend for a v3 feed
pub struct V3Backend {
    index_url: Url,
    transport: Arc<dyn HttpTransport>,
    paging: PagingConfig,
    endpoints: OnceCell<ServiceEndpoints>,
}

impl V3Backend {
    pub fn new(
        url: &str,
        transport: Arc<dyn HttpTransport>,
        paging: PagingConfig,
    ) -> Result<Self, BackendError> {
        Ok(Self {
            index_url: parse_http_url(url)?,
            transport,
            paging,
            endpoints: OnceCell::new(),
        })
    }

    fn get_json<T: DeserializeOwned>(
        &self,
        url: &Url,
        cancel: &CancellationToken,
    ) -> Result<T, BackendError> {
        if cancel.is_cancelled() {
            return Err(BackendError::Cancelled);
        }
        let body = self
            .transport
            .get(url, &RequestOptions::accept(JSON_MIME), cancel)?;
        serde_json::from_str(&body)
            .map_err(|e| BackendError::malformed(url.as_str(), e.to_string()))
    }

    /// Service endpoints, fetching the index on first use
    fn endpoints(&self, cancel: &CancellationToken) -> Result<&ServiceEndpoints, BackendError> {
        self.endpoints.get_or_try_init(|| {
            let index: ServiceIndex = self.get_json(&self.index_url, cancel)?;

            let registration = highest_versioned(&index.resources, REGISTRATION_FAMILY)
                .ok_or_else(|| {
                    BackendError::malformed(
                        self.index_url.as_str(),
                        "service index has no versioned registration resource",
                    )
                })?;
            let search = highest_versioned(&index.resources, SEARCH_FAMILY);

            let mut registration_base = registration.id.clone();
            if !registration_base.ends_with('/') {
                registration_base.push('/');
            }

            tracing::debug!(
                index = %self.index_url,
                registration = %registration_base,
                search = ?search.map(|r| r.id.as_str()),
                "Discovered v3 endpoints"
            );

            Ok(ServiceEndpoints {
                registration_base,
                search: search.map(|r| r.id.clone()),
            })
        })
    }

    /// Leaves of a registration page, fetching the page if not inlined
    fn page_leaves(
        &self,
        page: RegistrationPage,
        cancel: &CancellationToken,
    ) -> Result<Vec<RegistrationLeaf>, BackendError> {
        let count = page.count;
        let leaves = match page.items {
            Some(items) => items,
            None => {
                let url = parse_http_url(&page.id)?;
                let fetched: RegistrationPage = self.get_json(&url, cancel)?;
                fetched.items.unwrap_or_default()
            }
        };

        let limit = if count == 0 { leaves.len() } else { count };
        Ok(leaves.into_iter().take(limit).collect())
    }

    /// Run a paged search query
    fn search(
        &self,
        query: &str,
        include_prerelease: bool,
        cancel: &CancellationToken,
    ) -> Result<Vec<PackageEntry>, BackendError> {
        let endpoints = self.endpoints(cancel)?;
        let Some(search) = endpoints.search.as_deref() else {
            return Err(BackendError::malformed(
                self.index_url.as_str(),
                "service index has no versioned search resource",
            ));
        };

        let mut entries = Vec::new();
        let mut skip = 0;

        for page in 0..self.paging.max_pages {
            let mut url = parse_http_url(search)?;
            url.query_pairs_mut()
                .append_pair("q", query)
                .append_pair("skip", &skip.to_string())
                .append_pair("take", &self.paging.v3_page_size.to_string())
                .append_pair("prerelease", if include_prerelease { "true" } else { "false" })
                .append_pair("semVerLevel", "2.0.0");

            let response: SearchResponse = self.get_json(&url, cancel)?;
            let received = response.data.len();
            skip += received;
            entries.extend(response.data.into_iter().filter_map(search_entry));

            if received == 0 || skip as u64 >= response.total_hits {
                break;
            }
            if page + 1 == self.paging.max_pages {
                tracing::warn!(
                    search = %search,
                    pages = self.paging.max_pages,
                    "Stopped paging at the configured page limit"
                );
            }
        }

        retain_prerelease(&mut entries, include_prerelease);
        Ok(latest_per_name(entries))
    }
}

impl RepositoryBackend for V3Backend {
    fn search_by_exact_name(
        &self,
        name: &str,
        include_prerelease: bool,
        cancel: &CancellationToken,
    ) -> Result<Vec<PackageEntry>, BackendError> {
        let endpoints = self.endpoints(cancel)?;
        let url = parse_http_url(&format!(
            "{}{}/index.json",
            endpoints.registration_base,
            name.to_ascii_lowercase()
        ))?;

        let index: RegistrationIndex = match self.get_json(&url, cancel) {
            Ok(index) => index,
            // Unknown packages have no registration
            Err(BackendError::HttpStatus { status: 404, .. }) => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut entries = Vec::new();
        for page in index.items {
            for leaf in self.page_leaves(page, cancel)? {
                if let Some(entry) = registration_entry(leaf) {
                    entries.push(entry);
                }
            }
        }

        entries.retain(|e| e.name.eq_ignore_ascii_case(name));
        retain_prerelease(&mut entries, include_prerelease);
        Ok(entries)
    }

    fn search_by_wildcard_name(
        &self,
        pattern: &str,
        include_prerelease: bool,
        cancel: &CancellationToken,
    ) -> Result<Vec<PackageEntry>, BackendError> {
        let query = NamePattern::new(pattern).literal_segments().join(" ");
        self.search(&query, include_prerelease, cancel)
    }

    fn search_by_tags(
        &self,
        tags: &[String],
        include_prerelease: bool,
        cancel: &CancellationToken,
    ) -> Result<Vec<PackageEntry>, BackendError> {
        let query = tags
            .iter()
            .map(|t| format!("tags:{}", t))
            .collect::<Vec<_>>()
            .join(" ");
        self.search(&query, include_prerelease, cancel)
    }
}

/// Highest-versioned resource of a type family
///
/// Types look like `RegistrationsBaseUrl/3.6.0`. Bare or non-numeric
/// variants (`RegistrationsBaseUrl`, `RegistrationsBaseUrl/Versioned`) are
/// skipped.
fn highest_versioned<'a>(
    resources: &'a [ServiceResource],
    family: &str,
) -> Option<&'a ServiceResource> {
    resources
        .iter()
        .filter_map(|resource| {
            let (name, version) = resource.resource_type.split_once('/')?;
            if !name.eq_ignore_ascii_case(family) {
                return None;
            }
            let version = Version::parse(version).ok()?;
            Some((version, resource))
        })
        .max_by(|a, b| a.0.cmp(&b.0))
        .map(|(_, resource)| resource)
}

fn parse_version(id: &str, raw: &str) -> Option<Version> {
    match Version::parse(raw) {
        Ok(version) => Some(version),
        Err(e) => {
            tracing::warn!(
                package = id,
                version = raw,
                error = %e,
                "Skipping entry with invalid version"
            );
            None
        }
    }
}

fn registration_entry(leaf: RegistrationLeaf) -> Option<PackageEntry> {
    let CatalogEntry {
        id,
        version,
        authors,
        description,
        tags,
        project_url,
        license_url,
        published,
        listed,
        dependency_groups,
    } = leaf.catalog_entry;

    if listed == Some(false) {
        tracing::debug!(package = %id, version = %version, "Skipping unlisted version");
        return None;
    }
    let version = parse_version(&id, &version)?;

    let mut dependencies = Vec::new();
    for dep in dependency_groups.into_iter().flat_map(|g| g.dependencies) {
        if let Some(dep) = dependency_ref(&dep.id, &dep.range) {
            push_unique(&mut dependencies, dep);
        }
    }

    Some(PackageEntry {
        name: id,
        version,
        tags: tags.map(|t| t.to_list()).unwrap_or_default(),
        dependencies,
        authors: authors.map(|a| a.joined()),
        description,
        project_uri: project_url,
        license_uri: license_url,
        published,
        item_type: None,
        package_content: leaf.package_content,
    })
}

fn search_entry(result: SearchResult) -> Option<PackageEntry> {
    let version = parse_version(&result.id, &result.version)?;
    Some(PackageEntry {
        name: result.id,
        version,
        tags: result.tags.map(|t| t.to_list()).unwrap_or_default(),
        authors: result.authors.map(|a| a.joined()),
        description: result.description,
        project_uri: result.project_url,
        license_uri: result.license_url,
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    const INDEX: &str = r#"{
        "version": "3.0.0",
        "resources": [
            {"@id": "https://api.example/reg-old/", "@type": "RegistrationsBaseUrl"},
            {"@id": "https://api.example/reg-a/", "@type": "RegistrationsBaseUrl/3.0.0-beta"},
            {"@id": "https://api.example/reg-b", "@type": "RegistrationsBaseUrl/3.6.0"},
            {"@id": "https://api.example/reg-c/", "@type": "RegistrationsBaseUrl/Versioned"},
            {"@id": "https://api.example/query", "@type": "SearchQueryService/3.5.0"}
        ]
    }"#;

    /// Answers by URL prefix, 404 for anything unrouted
    struct RoutedTransport {
        routes: Vec<(&'static str, String)>,
        requests: RefCell<Vec<String>>,
    }

    impl HttpTransport for RoutedTransport {
        fn get(
            &self,
            url: &Url,
            _options: &RequestOptions,
            _cancel: &CancellationToken,
        ) -> Result<String, BackendError> {
            self.requests.borrow_mut().push(url.to_string());
            self.routes
                .iter()
                .find(|(prefix, _)| url.as_str().starts_with(prefix))
                .map(|(_, body)| body.clone())
                .ok_or_else(|| BackendError::HttpStatus {
                    status: 404,
                    url: url.to_string(),
                })
        }
    }

    fn backend(routes: Vec<(&'static str, String)>) -> (V3Backend, Arc<RoutedTransport>) {
        let transport = Arc::new(RoutedTransport {
            routes,
            requests: RefCell::new(Vec::new()),
        });
        let backend = V3Backend::new(
            "https://api.example/v3/index.json",
            Arc::clone(&transport) as Arc<dyn HttpTransport>,
            PagingConfig::default(),
        )
        .unwrap();
        (backend, transport)
    }

    fn leaf(id: &str, version: &str, listed: bool) -> String {
        format!(
            r#"{{"catalogEntry": {{"id": "{id}", "version": "{version}", "listed": {listed},
                "dependencyGroups": [{{"dependencies": [{{"id": "Bar", "range": "[1.0.0, )"}}]}}]}},
               "packageContent": "https://api.example/flat/{id}.{version}.nupkg"}}"#,
            id = id,
            version = version,
            listed = listed
        )
    }

    #[test]
    fn test_highest_versioned_skips_unversioned() {
        let index: ServiceIndex = serde_json::from_str(INDEX).unwrap();
        let registration = highest_versioned(&index.resources, REGISTRATION_FAMILY).unwrap();
        assert_eq!(registration.id, "https://api.example/reg-b");
        assert!(highest_versioned(&index.resources, "PackagePublish").is_none());
    }

    #[test]
    fn test_exact_search_with_inline_and_remote_pages() {
        let registration = format!(
            r#"{{"count": 2, "items": [
                {{"@id": "https://api.example/reg-b/foo/page/1.json", "count": 2,
                  "items": [{}, {}]}},
                {{"@id": "https://api.example/reg-b/foo/page/2.json", "count": 1}}
            ]}}"#,
            leaf("Foo", "1.0.0", true),
            leaf("Foo", "1.1.0", false)
        );
        let remote_page = format!(
            r#"{{"@id": "https://api.example/reg-b/foo/page/2.json", "count": 1, "items": [{}]}}"#,
            leaf("Foo", "2.0.0-rc1", true)
        );
        let (backend, transport) = backend(vec![
            ("https://api.example/v3/index.json", INDEX.to_string()),
            ("https://api.example/reg-b/foo/index.json", registration),
            ("https://api.example/reg-b/foo/page/2.json", remote_page),
        ]);
        let cancel = CancellationToken::new();

        let stable = backend.search_by_exact_name("Foo", false, &cancel).unwrap();
        assert_eq!(stable.len(), 1);
        assert_eq!(stable[0].version, Version::new(1, 0, 0));
        assert_eq!(stable[0].dependencies[0].name, "Bar");
        assert!(stable[0].package_content.is_some());

        let all = backend.search_by_exact_name("FOO", true, &cancel).unwrap();
        assert_eq!(all.len(), 2);

        // Service index fetched once
        let index_requests = transport
            .requests
            .borrow()
            .iter()
            .filter(|u| u.ends_with("/v3/index.json"))
            .count();
        assert_eq!(index_requests, 1);
    }

    #[test]
    fn test_unknown_package_is_empty() {
        let (backend, _) = backend(vec![("https://api.example/v3/index.json", INDEX.to_string())]);
        let entries = backend
            .search_by_exact_name("Missing", true, &CancellationToken::new())
            .unwrap();
        assert!(entries.is_empty());
    }

    #[test]
    fn test_index_without_registration_is_malformed() {
        let (backend, _) = backend(vec![(
            "https://api.example/v3/index.json",
            r#"{"version": "3.0.0", "resources": []}"#.to_string(),
        )]);
        let result = backend.search_by_exact_name("Foo", true, &CancellationToken::new());
        assert!(matches!(result, Err(BackendError::MalformedResponse { .. })));
    }

    #[test]
    fn test_wildcard_search_pages_until_total_hits() {
        let page = |ids: &[&str]| {
            let data: Vec<String> = ids
                .iter()
                .map(|id| {
                    format!(r#"{{"id": "{}", "version": "1.0.0", "tags": ["PSModule"]}}"#, id)
                })
                .collect();
            format!(r#"{{"totalHits": 3, "data": [{}]}}"#, data.join(","))
        };
        let (backend, transport) = backend(vec![
            ("https://api.example/v3/index.json", INDEX.to_string()),
            ("https://api.example/query?q=Foo&skip=0", page(&["FooA", "FooB"])),
            ("https://api.example/query?q=Foo&skip=2", page(&["FooC"])),
        ]);

        let entries = backend
            .search_by_wildcard_name("Foo*", false, &CancellationToken::new())
            .unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].tags, vec!["PSModule"]);
        assert_eq!(transport.requests.borrow().len(), 3);
    }
}

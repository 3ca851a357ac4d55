//! NuGet v2 (OData) feed backend
//!
//! Exact lookups go through `FindPackagesById()`, wildcard and tag lookups
//! through `Search()`. Both answer with Atom XML, one `<entry>` per package
//! version with its metadata under `<m:properties>`.

use super::http::{parse_http_url, HttpTransport, RequestOptions};
use super::nuspec::{attribute, dependency_ref, local_name, push_unique, split_tags};
use super::{latest_per_name, retain_prerelease, BackendError, RepositoryBackend};
use crate::cancel::CancellationToken;
use crate::config::PagingConfig;
use crate::resource::{DependencyRef, PackageEntry, ResourceKind};
use crate::version::Version;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::sync::Arc;
use url::Url;

const ATOM_MIME: &str = "application/atom+xml";

/// Backend for an OData v2 feed
pub struct V2Backend {
    /// Feed root without a trailing slash
    base: String,
    transport: Arc<dyn HttpTransport>,
    paging: PagingConfig,
}

impl V2Backend {
    pub fn new(
        url: &str,
        transport: Arc<dyn HttpTransport>,
        paging: PagingConfig,
    ) -> Result<Self, BackendError> {
        let base = parse_http_url(url)?;
        Ok(Self {
            base: base.as_str().trim_end_matches('/').to_string(),
            transport,
            paging,
        })
    }

    fn endpoint(&self, function: &str) -> Result<Url, BackendError> {
        let raw = format!("{}/{}", self.base, function);
        Url::parse(&raw).map_err(|e| BackendError::InvalidUrl(format!("{}: {}", raw, e)))
    }

    /// `FindPackagesById()` URL for one page
    fn find_by_id_url(
        &self,
        name: &str,
        include_prerelease: bool,
        skip: usize,
    ) -> Result<Url, BackendError> {
        let mut url = self.endpoint("FindPackagesById()")?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("id", &odata_literal(name));
            if !include_prerelease {
                query.append_pair("$filter", "IsPrerelease eq false");
            }
            query.append_pair("$skip", &skip.to_string());
            query.append_pair("$top", &self.paging.v2_page_size.to_string());
            query.append_pair("$inlinecount", "allpages");
        }
        Ok(url)
    }

    /// `Search()` URL for one page
    fn search_url(
        &self,
        filter: &str,
        search_term: &str,
        include_prerelease: bool,
        skip: usize,
    ) -> Result<Url, BackendError> {
        let mut url = self.endpoint("Search()")?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("$filter", filter);
            query.append_pair("searchTerm", &odata_literal(search_term));
            query.append_pair("targetFramework", "''");
            let value = if include_prerelease { "true" } else { "false" };
            query.append_pair("includePrerelease", value);
            query.append_pair("$skip", &skip.to_string());
            query.append_pair("$top", &self.paging.v2_page_size.to_string());
            query.append_pair("$inlinecount", "allpages");
        }
        Ok(url)
    }

    /// Fetch pages until the feed is exhausted
    ///
    /// `m:count` bounds the loop when the server reports it; otherwise a
    /// page holding at least the full-page threshold signals another page.
    fn fetch_pages(
        &self,
        page_url: impl Fn(usize) -> Result<Url, BackendError>,
        cancel: &CancellationToken,
    ) -> Result<Vec<PackageEntry>, BackendError> {
        let mut entries = Vec::new();
        let mut skip = 0;

        for page in 0..self.paging.max_pages {
            if cancel.is_cancelled() {
                return Err(BackendError::Cancelled);
            }

            let url = page_url(skip)?;
            let body = self
                .transport
                .get(&url, &RequestOptions::accept(ATOM_MIME), cancel)?;
            let feed = parse_feed(&body, url.as_str())?;

            let received = feed.entry_count;
            skip += received;
            entries.extend(feed.entries);

            let more = match feed.total {
                Some(total) => (skip as u64) < total,
                None => received >= self.paging.v2_full_page_threshold,
            };
            if !more || received == 0 {
                return Ok(entries);
            }

            if page + 1 == self.paging.max_pages {
                tracing::warn!(
                    base = %self.base,
                    pages = self.paging.max_pages,
                    "Stopped paging at the configured page limit"
                );
            }
        }

        Ok(entries)
    }
}

impl RepositoryBackend for V2Backend {
    fn search_by_exact_name(
        &self,
        name: &str,
        include_prerelease: bool,
        cancel: &CancellationToken,
    ) -> Result<Vec<PackageEntry>, BackendError> {
        let mut entries = self.fetch_pages(
            |skip| self.find_by_id_url(name, include_prerelease, skip),
            cancel,
        )?;
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
        let mut clauses = vec![latest_clause(include_prerelease).to_string()];
        clauses.extend(name_clauses(pattern));
        let filter = clauses.join(" and ");

        let mut entries = self.fetch_pages(
            |skip| self.search_url(&filter, "", include_prerelease, skip),
            cancel,
        )?;
        retain_prerelease(&mut entries, include_prerelease);
        Ok(latest_per_name(entries))
    }

    fn search_by_tags(
        &self,
        tags: &[String],
        include_prerelease: bool,
        cancel: &CancellationToken,
    ) -> Result<Vec<PackageEntry>, BackendError> {
        let term = tags
            .iter()
            .map(|t| format!("tag:{}", t))
            .collect::<Vec<_>>()
            .join(" ");
        let filter = latest_clause(include_prerelease);

        let mut entries = self.fetch_pages(
            |skip| self.search_url(filter, &term, include_prerelease, skip),
            cancel,
        )?;
        retain_prerelease(&mut entries, include_prerelease);
        Ok(latest_per_name(entries))
    }
}

fn latest_clause(include_prerelease: bool) -> &'static str {
    if include_prerelease {
        "IsAbsoluteLatestVersion"
    } else {
        "IsLatestVersion"
    }
}

/// Quote a string as an OData literal
fn odata_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// OData clauses narrowing `Id` to the literal parts of a wildcard pattern
///
/// The server only narrows the result; names are matched exactly afterwards.
fn name_clauses(pattern: &str) -> Vec<String> {
    let parts: Vec<&str> = pattern.split('*').collect();
    let last = parts.len() - 1;

    parts
        .iter()
        .enumerate()
        .filter(|(_, part)| !part.is_empty())
        .map(|(i, part)| {
            let literal = odata_literal(&part.to_ascii_lowercase());
            if last == 0 {
                format!("tolower(Id) eq {}", literal)
            } else if i == 0 {
                format!("startswith(tolower(Id),{})", literal)
            } else if i == last {
                format!("endswith(tolower(Id),{})", literal)
            } else {
                format!("substringof({},tolower(Id))", literal)
            }
        })
        .collect()
}

/// Parse the `Dependencies` property: `Id:Range:Framework|Id:Range:Framework`
pub(crate) fn parse_dependencies(raw: &str) -> Vec<DependencyRef> {
    let mut dependencies = Vec::new();
    for spec in raw.split('|') {
        let mut fields = spec.splitn(3, ':');
        let name = fields.next().unwrap_or_default();
        let range = fields.next().unwrap_or_default();
        if let Some(dep) = dependency_ref(name, range) {
            push_unique(&mut dependencies, dep);
        }
    }
    dependencies
}

/// One page of an OData feed
#[derive(Debug, Default)]
struct FeedPage {
    entries: Vec<PackageEntry>,
    /// `<entry>` elements on the page, including skipped ones
    entry_count: usize,
    /// `m:count`, when the server reported it
    total: Option<u64>,
}

/// Properties collected for one `<entry>`
#[derive(Debug, Default)]
struct EntryFields {
    id: Option<String>,
    title: Option<String>,
    version: Option<String>,
    normalized_version: Option<String>,
    tags: Option<String>,
    dependencies: Option<String>,
    authors: Option<String>,
    description: Option<String>,
    project_url: Option<String>,
    license_url: Option<String>,
    published: Option<String>,
    item_type: Option<String>,
    content: Option<String>,
}

impl EntryFields {
    fn set(&mut self, path: &[String], text: &str) {
        let [.., parent, field] = path else {
            return;
        };

        let slot = match (parent.as_str(), field.as_str()) {
            ("properties", "Id") => &mut self.id,
            ("properties", "Version") => &mut self.version,
            ("properties", "NormalizedVersion") => &mut self.normalized_version,
            ("properties", "Tags") => &mut self.tags,
            ("properties", "Dependencies") => &mut self.dependencies,
            ("properties", "Authors") => &mut self.authors,
            ("properties", "Description") => &mut self.description,
            ("properties", "ProjectUrl") => &mut self.project_url,
            ("properties", "LicenseUrl") => &mut self.license_url,
            ("properties", "Published") => &mut self.published,
            ("properties", "ItemType") => &mut self.item_type,
            ("entry", "title") => &mut self.title,
            ("author", "name") if self.authors.is_none() => &mut self.authors,
            _ => return,
        };
        *slot = Some(text.to_string());
    }

    /// Build the entry; `Ok(None)` when the version cannot be used
    fn into_entry(self, url: &str) -> Result<Option<PackageEntry>, BackendError> {
        let name = self
            .id
            .or(self.title)
            .ok_or_else(|| BackendError::malformed(url, "entry without Id"))?;
        let raw_version = self
            .version
            .or(self.normalized_version)
            .ok_or_else(|| {
                BackendError::malformed(url, format!("entry {} without Version", name))
            })?;

        let version = match Version::parse(&raw_version) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(
                    package = %name,
                    version = %raw_version,
                    error = %e,
                    "Skipping entry with invalid version"
                );
                return Ok(None);
            }
        };

        Ok(Some(PackageEntry {
            name,
            version,
            tags: self.tags.as_deref().map(split_tags).unwrap_or_default(),
            dependencies: self
                .dependencies
                .as_deref()
                .map(parse_dependencies)
                .unwrap_or_default(),
            authors: self.authors,
            description: self.description,
            project_uri: self.project_url,
            license_uri: self.license_url,
            published: self.published,
            item_type: self.item_type.as_deref().and_then(ResourceKind::from_item_type),
            package_content: self.content,
        }))
    }
}

/// Parse one Atom feed page
fn parse_feed(xml: &str, url: &str) -> Result<FeedPage, BackendError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut page = FeedPage::default();
    let mut path: Vec<String> = Vec::new();
    let mut current: Option<EntryFields> = None;
    let mut saw_feed = false;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| BackendError::malformed(url, format!("invalid XML: {}", e)))?;

        match event {
            Event::Start(ref e) => {
                let name = local_name(e);
                match name.as_str() {
                    "feed" if path.is_empty() => saw_feed = true,
                    "entry" => current = Some(EntryFields::default()),
                    "content" => {
                        if let Some(fields) = current.as_mut() {
                            fields.content = attribute(e, "src");
                        }
                    }
                    _ => {}
                }
                path.push(name);
            }
            Event::Empty(ref e) => {
                if local_name(e) == "content" {
                    if let Some(fields) = current.as_mut() {
                        fields.content = attribute(e, "src");
                    }
                }
            }
            Event::Text(ref e) => {
                let text = e.unescape().map_err(|err| {
                    BackendError::malformed(url, format!("invalid XML text: {}", err))
                })?;
                let text = text.trim();
                if text.is_empty() {
                    continue;
                }

                if let Some(fields) = current.as_mut() {
                    fields.set(&path, text);
                } else if path.last().map(String::as_str) == Some("count") {
                    page.total = text.parse().ok();
                }
            }
            Event::End(_) => {
                if path.pop().as_deref() == Some("entry") {
                    if let Some(fields) = current.take() {
                        page.entry_count += 1;
                        if let Some(entry) = fields.into_entry(url)? {
                            page.entries.push(entry);
                        }
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !saw_feed {
        return Err(BackendError::malformed(url, "missing <feed> root element"));
    }

    tracing::debug!(url, entries = page.entry_count, total = ?page.total, "Parsed feed page");
    Ok(page)
}

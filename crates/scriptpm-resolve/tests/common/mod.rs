//! Shared fixtures: in-memory backends and a scripted HTTP transport

#![allow(dead_code)]

use scriptpm_resolve::{
    BackendError, BackendProvider, CancellationToken, DependencyRef, HttpTransport, PackageEntry,
    RepositoryBackend, RepositoryDescriptor, RequestOptions, Version, VersionConstraint,
};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;
use url::Url;

/// Call log shared between fakes and the test
pub type CallLog = Rc<RefCell<Vec<String>>>;

pub fn call_log() -> CallLog {
    Rc::new(RefCell::new(Vec::new()))
}

pub fn entry(name: &str, version: &str) -> PackageEntry {
    PackageEntry::new(name, Version::parse(version).unwrap())
}

pub fn with_tags(mut entry: PackageEntry, tags: &[&str]) -> PackageEntry {
    entry.tags = tags.iter().map(|t| t.to_string()).collect();
    entry
}

pub fn with_deps(mut entry: PackageEntry, deps: &[(&str, &str)]) -> PackageEntry {
    entry.dependencies = deps
        .iter()
        .map(|(name, range)| {
            DependencyRef::new(*name, VersionConstraint::parse_dependency_range(range).unwrap())
        })
        .collect();
    entry
}

/// In-memory repository
///
/// Wildcard searches over-return: every package comes back (latest version
/// only), like a loose remote search.
pub struct FakeBackend {
    label: String,
    entries: Vec<PackageEntry>,
    failure: Option<u16>,
    calls: CallLog,
}

impl FakeBackend {
    pub fn new(label: &str, entries: Vec<PackageEntry>, calls: &CallLog) -> Self {
        Self {
            label: label.to_string(),
            entries,
            failure: None,
            calls: Rc::clone(calls),
        }
    }

    /// Every search fails with this HTTP status
    pub fn failing(label: &str, status: u16, calls: &CallLog) -> Self {
        Self {
            failure: Some(status),
            ..Self::new(label, Vec::new(), calls)
        }
    }

    fn record(&self, call: String) -> Result<(), BackendError> {
        self.calls.borrow_mut().push(call);
        match self.failure {
            Some(status) => Err(BackendError::HttpStatus {
                status,
                url: format!("https://{}.test/", self.label.to_ascii_lowercase()),
            }),
            None => Ok(()),
        }
    }

    fn latest(
        &self,
        include_prerelease: bool,
        keep: impl Fn(&PackageEntry) -> bool,
    ) -> Vec<PackageEntry> {
        let mut latest: Vec<PackageEntry> = Vec::new();
        for entry in self
            .entries
            .iter()
            .filter(|e| include_prerelease || !e.version.is_prerelease())
            .filter(|e| keep(*e))
        {
            match latest
                .iter_mut()
                .find(|l| l.name.eq_ignore_ascii_case(&entry.name))
            {
                Some(existing) if existing.version >= entry.version => {}
                Some(existing) => *existing = entry.clone(),
                None => latest.push(entry.clone()),
            }
        }
        latest
    }
}

impl RepositoryBackend for FakeBackend {
    fn search_by_exact_name(
        &self,
        name: &str,
        include_prerelease: bool,
        _cancel: &CancellationToken,
    ) -> Result<Vec<PackageEntry>, BackendError> {
        self.record(format!("{}:exact:{}", self.label, name))?;
        Ok(self
            .entries
            .iter()
            .filter(|e| e.name.eq_ignore_ascii_case(name))
            .filter(|e| include_prerelease || !e.version.is_prerelease())
            .cloned()
            .collect())
    }

    fn search_by_wildcard_name(
        &self,
        pattern: &str,
        include_prerelease: bool,
        _cancel: &CancellationToken,
    ) -> Result<Vec<PackageEntry>, BackendError> {
        self.record(format!("{}:wildcard:{}", self.label, pattern))?;
        Ok(self.latest(include_prerelease, |_| true))
    }

    fn search_by_tags(
        &self,
        tags: &[String],
        include_prerelease: bool,
        _cancel: &CancellationToken,
    ) -> Result<Vec<PackageEntry>, BackendError> {
        self.record(format!("{}:tags:{}", self.label, tags.join(",")))?;
        Ok(self.latest(include_prerelease, |e| {
            e.tags
                .iter()
                .any(|t| tags.iter().any(|r| r.eq_ignore_ascii_case(t)))
        }))
    }
}

/// Hands out fake backends by repository URL
pub struct FakeProvider {
    backends: HashMap<String, Arc<FakeBackend>>,
    pub requested: CallLog,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self {
            backends: HashMap::new(),
            requested: call_log(),
        }
    }

    pub fn with(mut self, url: &str, backend: FakeBackend) -> Self {
        self.backends.insert(url.to_string(), Arc::new(backend));
        self
    }
}

impl BackendProvider for FakeProvider {
    fn backend_for(
        &mut self,
        descriptor: &RepositoryDescriptor,
    ) -> Result<Arc<dyn RepositoryBackend>, BackendError> {
        self.requested.borrow_mut().push(descriptor.url.clone());
        match self.backends.get(&descriptor.url) {
            Some(backend) => Ok(Arc::clone(backend) as Arc<dyn RepositoryBackend>),
            None => Err(BackendError::UnsupportedProtocol {
                name: descriptor.name.clone(),
                protocol: descriptor.protocol,
            }),
        }
    }
}

/// HTTP transport answering from canned bodies by URL prefix
///
/// Unrouted URLs get a 404.
pub struct ScriptedTransport {
    routes: Vec<(String, String)>,
    pub requests: RefCell<Vec<String>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self {
            routes: Vec::new(),
            requests: RefCell::new(Vec::new()),
        }
    }

    pub fn route(mut self, prefix: &str, body: impl Into<String>) -> Self {
        self.routes.push((prefix.to_string(), body.into()));
        self
    }
}

impl HttpTransport for ScriptedTransport {
    fn get(
        &self,
        url: &Url,
        _options: &RequestOptions,
        cancel: &CancellationToken,
    ) -> Result<String, BackendError> {
        if cancel.is_cancelled() {
            return Err(BackendError::Cancelled);
        }
        self.requests.borrow_mut().push(url.to_string());
        self.routes
            .iter()
            .find(|(prefix, _)| url.as_str().starts_with(prefix.as_str()))
            .map(|(_, body)| body.clone())
            .ok_or_else(|| BackendError::HttpStatus {
                status: 404,
                url: url.to_string(),
            })
    }
}

/// Atom feed holding `(id, version, tags)` entries
pub fn odata_feed(entries: &[(&str, &str, &str)]) -> String {
    let mut xml = String::from(
        r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom"
      xmlns:d="http://schemas.microsoft.com/ado/2007/08/dataservices"
      xmlns:m="http://schemas.microsoft.com/ado/2007/08/dataservices/metadata">"#,
    );
    xml.push_str(&format!("<m:count>{}</m:count>", entries.len()));
    for (id, version, tags) in entries {
        xml.push_str(&format!(
            "<entry><title>{id}</title><m:properties><d:Id>{id}</d:Id>\
             <d:Version>{version}</d:Version><d:Tags>{tags}</d:Tags></m:properties></entry>",
            id = id,
            version = version,
            tags = tags
        ));
    }
    xml.push_str("</feed>");
    xml
}

//! Transitive dependency expansion
//!
//! Dependencies are looked up in the repository that supplied the parent.
//! Traversal is depth-first: a dependency is appended, then its own
//! dependencies follow it. Every `(name, version)` pair is expanded at most
//! once per resolution, which also ends cycles.

use crate::backend::{BackendError, RepositoryBackend};
use crate::cancel::CancellationToken;
use crate::diagnostics::{Diagnostic, DiagnosticKind};
use crate::resource::{DependencyRef, PackageEntry, ResourceRecord};
use crate::select::select_latest;
use crate::version::Version;
use std::collections::{HashMap, HashSet};

/// Identity key shared with the resolver's emission set
pub type SeenKey = (String, Version);

/// Expands dependencies against one repository
pub struct DependencyExpander<'a> {
    backend: &'a dyn RepositoryBackend,
    repository: &'a str,
    include_prerelease: bool,
    cancel: &'a CancellationToken,

    /// All versions fetched per lowercase dependency name, `None` when the
    /// lookup failed
    fetched: HashMap<String, Option<Vec<PackageEntry>>>,

    diagnostics: Vec<Diagnostic>,
}

impl<'a> DependencyExpander<'a> {
    pub fn new(
        backend: &'a dyn RepositoryBackend,
        repository: &'a str,
        include_prerelease: bool,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            backend,
            repository,
            include_prerelease,
            cancel,
            fetched: HashMap::new(),
            diagnostics: Vec::new(),
        }
    }

    /// Resolve the dependency tree of `parent`
    ///
    /// Returns newly resolved records in traversal order. Records whose key
    /// is already in `seen` are neither returned nor expanded again; every
    /// returned record's key is added to `seen`.
    pub fn expand(
        &mut self,
        parent: &ResourceRecord,
        seen: &mut HashSet<SeenKey>,
    ) -> Vec<ResourceRecord> {
        let mut resolved = Vec::new();
        self.visit(parent.name(), &parent.dependencies, seen, &mut resolved);
        resolved
    }

    /// Diagnostics recorded so far
    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }

    fn visit(
        &mut self,
        parent: &str,
        dependencies: &[DependencyRef],
        seen: &mut HashSet<SeenKey>,
        resolved: &mut Vec<ResourceRecord>,
    ) {
        for dependency in dependencies {
            if self.cancel.is_cancelled() {
                return;
            }

            let entry = match self.select(dependency) {
                Selection::Found(entry) => entry,
                // Already reported by the failed lookup, or cancelled
                Selection::Unavailable => continue,
                Selection::Missing => {
                    self.diagnostics.push(
                        Diagnostic::new(
                            DiagnosticKind::DependencyNotFound,
                            format!(
                                "no version satisfying {} (required by {})",
                                dependency.version_range, parent
                            ),
                        )
                        .with_repository(self.repository)
                        .with_name(&dependency.name),
                    );
                    continue;
                }
            };

            let record = ResourceRecord::from_entry(entry, self.repository, None);
            if !seen.insert(record.identity.key()) {
                continue;
            }

            tracing::debug!(
                dependency = %record.identity,
                parent,
                repository = self.repository,
                "Resolved dependency"
            );

            let children = record.dependencies.clone();
            let name = record.name().to_string();
            resolved.push(record);
            self.visit(&name, &children, seen, resolved);
        }
    }

    /// Latest version of `dependency` within its declared range
    fn select(&mut self, dependency: &DependencyRef) -> Selection {
        let include_prerelease = self.include_prerelease;
        let Some(versions) = self.versions_of(&dependency.name) else {
            return Selection::Unavailable;
        };
        match select_latest(versions, &dependency.version_range, include_prerelease) {
            Some(entry) => Selection::Found(entry.clone()),
            None => Selection::Missing,
        }
    }

    /// Every version of `name`, fetched once per expander
    ///
    /// `None` when the lookup failed or was cancelled. A failure is recorded
    /// as a diagnostic the first time only.
    fn versions_of(&mut self, name: &str) -> Option<&[PackageEntry]> {
        let key = name.to_ascii_lowercase();
        if !self.fetched.contains_key(&key) {
            let versions = match self
                .backend
                .search_by_exact_name(name, self.include_prerelease, self.cancel)
            {
                Ok(versions) => Some(versions),
                Err(BackendError::Cancelled) => return None,
                Err(e) => {
                    tracing::warn!(
                        dependency = name,
                        repository = self.repository,
                        error = %e,
                        "Dependency lookup failed"
                    );
                    self.diagnostics.push(
                        Diagnostic::new(e.diagnostic_kind(), e.to_string())
                            .with_repository(self.repository)
                            .with_name(name),
                    );
                    None
                }
            };
            self.fetched.insert(key.clone(), versions);
        }
        self.fetched.get(&key)?.as_deref()
    }
}

/// Outcome of looking up one dependency
enum Selection {
    Found(PackageEntry),
    /// Versions were listed but none satisfies the range
    Missing,
    Unavailable,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::VersionConstraint;
    use std::cell::RefCell;

    /// In-memory backend counting exact lookups
    struct MemoryBackend {
        entries: Vec<PackageEntry>,
        lookups: RefCell<Vec<String>>,
    }

    impl RepositoryBackend for MemoryBackend {
        fn search_by_exact_name(
            &self,
            name: &str,
            include_prerelease: bool,
            _cancel: &CancellationToken,
        ) -> Result<Vec<PackageEntry>, BackendError> {
            self.lookups.borrow_mut().push(name.to_string());
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
            _pattern: &str,
            _include_prerelease: bool,
            _cancel: &CancellationToken,
        ) -> Result<Vec<PackageEntry>, BackendError> {
            Ok(Vec::new())
        }
    }

    /// Backend whose every lookup fails
    struct UnreachableBackend {
        lookups: RefCell<Vec<String>>,
    }

    impl RepositoryBackend for UnreachableBackend {
        fn search_by_exact_name(
            &self,
            name: &str,
            _include_prerelease: bool,
            _cancel: &CancellationToken,
        ) -> Result<Vec<PackageEntry>, BackendError> {
            self.lookups.borrow_mut().push(name.to_string());
            Err(BackendError::HttpStatus {
                status: 503,
                url: "https://repo.test/".to_string(),
            })
        }

        fn search_by_wildcard_name(
            &self,
            _pattern: &str,
            _include_prerelease: bool,
            _cancel: &CancellationToken,
        ) -> Result<Vec<PackageEntry>, BackendError> {
            Ok(Vec::new())
        }
    }

    fn entry(name: &str, version: &str, deps: &[(&str, &str)]) -> PackageEntry {
        let mut entry = PackageEntry::new(name, Version::parse(version).unwrap());
        entry.dependencies = deps
            .iter()
            .map(|(n, r)| {
                DependencyRef::new(*n, VersionConstraint::parse_dependency_range(r).unwrap())
            })
            .collect();
        entry
    }

    fn root(entry: PackageEntry, seen: &mut HashSet<SeenKey>) -> ResourceRecord {
        let record = ResourceRecord::from_entry(entry, "Repo", None);
        seen.insert(record.identity.key());
        record
    }

    #[test]
    fn test_selects_latest_satisfying_version() {
        let backend = MemoryBackend {
            entries: vec![entry("Bar", "1.0.0", &[]), entry("Bar", "2.0.0", &[])],
            lookups: RefCell::new(Vec::new()),
        };
        let cancel = CancellationToken::new();
        let mut seen = HashSet::new();
        let foo = root(entry("Foo", "1.0.0", &[("Bar", ">=1.0")]), &mut seen);

        let mut expander = DependencyExpander::new(&backend, "Repo", false, &cancel);
        let records = expander.expand(&foo, &mut seen);

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].identity.to_string(), "Bar@2.0.0");
        assert!(expander.take_diagnostics().is_empty());
    }

    #[test]
    fn test_depth_first_order() {
        let backend = MemoryBackend {
            entries: vec![
                entry("A", "1.0.0", &[("C", "1.0")]),
                entry("B", "1.0.0", &[]),
                entry("C", "1.0.0", &[]),
            ],
            lookups: RefCell::new(Vec::new()),
        };
        let cancel = CancellationToken::new();
        let mut seen = HashSet::new();
        let top = root(entry("Top", "1.0.0", &[("A", "1.0"), ("B", "1.0")]), &mut seen);

        let mut expander = DependencyExpander::new(&backend, "Repo", false, &cancel);
        let names: Vec<String> = expander
            .expand(&top, &mut seen)
            .iter()
            .map(|r| r.name().to_string())
            .collect();
        assert_eq!(names, vec!["A", "C", "B"]);
    }

    #[test]
    fn test_cycle_terminates() {
        let backend = MemoryBackend {
            entries: vec![
                entry("A", "1.0.0", &[("B", "1.0")]),
                entry("B", "1.0.0", &[("A", "1.0")]),
            ],
            lookups: RefCell::new(Vec::new()),
        };
        let cancel = CancellationToken::new();
        let mut seen = HashSet::new();
        let a = root(entry("A", "1.0.0", &[("B", "1.0")]), &mut seen);

        let mut expander = DependencyExpander::new(&backend, "Repo", false, &cancel);
        let records = expander.expand(&a, &mut seen);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name(), "B");
    }

    #[test]
    fn test_missing_dependency_is_soft() {
        let backend = MemoryBackend {
            entries: vec![entry("Bar", "1.0.0", &[])],
            lookups: RefCell::new(Vec::new()),
        };
        let cancel = CancellationToken::new();
        let mut seen = HashSet::new();
        let foo = root(
            entry("Foo", "1.0.0", &[("Bar", "[2.0, 3.0)"), ("Missing", "1.0")]),
            &mut seen,
        );

        let mut expander = DependencyExpander::new(&backend, "Repo", false, &cancel);
        assert!(expander.expand(&foo, &mut seen).is_empty());

        let diagnostics = expander.take_diagnostics();
        assert_eq!(diagnostics.len(), 2);
        assert!(diagnostics
            .iter()
            .all(|d| d.kind == DiagnosticKind::DependencyNotFound));
    }

    #[test]
    fn test_failed_lookup_reported_once() {
        let backend = UnreachableBackend {
            lookups: RefCell::new(Vec::new()),
        };
        let cancel = CancellationToken::new();
        let mut seen = HashSet::new();
        let foo = root(entry("Foo", "1.0.0", &[("Bar", "1.0")]), &mut seen);
        let baz = root(entry("Baz", "1.0.0", &[("bar", "2.0")]), &mut seen);

        let mut expander = DependencyExpander::new(&backend, "Repo", false, &cancel);
        assert!(expander.expand(&foo, &mut seen).is_empty());
        assert!(expander.expand(&baz, &mut seen).is_empty());

        let diagnostics = expander.take_diagnostics();
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].kind, DiagnosticKind::Transport);
        assert_eq!(diagnostics[0].name.as_deref(), Some("Bar"));
        assert_eq!(backend.lookups.borrow().len(), 1);
    }

    #[test]
    fn test_versions_fetched_once_per_name() {
        let backend = MemoryBackend {
            entries: vec![
                entry("A", "1.0.0", &[("Shared", "1.0")]),
                entry("B", "1.0.0", &[("shared", "1.0")]),
                entry("Shared", "1.0.0", &[]),
            ],
            lookups: RefCell::new(Vec::new()),
        };
        let cancel = CancellationToken::new();
        let mut seen = HashSet::new();
        let top = root(entry("Top", "1.0.0", &[("A", "1.0"), ("B", "1.0")]), &mut seen);

        let mut expander = DependencyExpander::new(&backend, "Repo", false, &cancel);
        expander.expand(&top, &mut seen);

        let lookups = backend.lookups.borrow();
        let shared = lookups.iter().filter(|n| n.eq_ignore_ascii_case("shared")).count();
        assert_eq!(shared, 1);
    }
}

//! Multi-repository resolution
//!
//! A [`Resolver`] walks the registered repositories in priority order and
//! yields matching records as a lazy [`ResolutionStream`]. A requested name
//! stops being searched once a repository satisfies it. Failures inside the
//! repository loop never end resolution; they become diagnostics.

use crate::backend::{BackendError, BackendProvider, BackendRegistry, RepositoryBackend};
use crate::cancel::CancellationToken;
use crate::config::ResolverConfig;
use crate::dependency::{DependencyExpander, SeenKey};
use crate::diagnostics::{Diagnostic, DiagnosticKind};
use crate::name_match::NamePattern;
use crate::repository::{
    plan_catalogs, CatalogRole, CatalogTarget, DualCatalog, RepositoryDescriptor,
};
use crate::resource::{KindFilter, PackageEntry, ResourceRecord};
use crate::select::{select_all, select_latest};
use crate::tags::TagFilter;
use crate::version::VersionConstraint;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use thiserror::Error;

/// Precondition failures; the only errors that end a resolution call
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// No names were requested
    #[error("At least one name is required")]
    EmptyNameList,

    /// A requested name was blank
    #[error("Names cannot be empty")]
    EmptyName,

    /// No repositories are registered
    #[error("No repositories are registered")]
    NoRepositories,
}

/// What to resolve
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolveRequest {
    /// Exact names or `*` patterns
    pub names: Vec<String>,

    /// Version constraint text; `None` means latest
    pub version: Option<String>,

    pub include_prerelease: bool,

    /// Records must carry at least one of these tags
    pub tags: Vec<String>,

    pub kind: KindFilter,

    /// Repository name patterns; empty means every repository
    pub repositories: Vec<String>,

    /// Also resolve declared dependencies
    pub include_dependencies: bool,
}

impl ResolveRequest {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_prerelease(mut self, include: bool) -> Self {
        self.include_prerelease = include;
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_kind(mut self, kind: KindFilter) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_repositories<I, S>(mut self, repositories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.repositories = repositories.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_dependencies(mut self, include: bool) -> Self {
        self.include_dependencies = include;
        self
    }

    fn validate(&self) -> Result<(), ResolveError> {
        if self.names.is_empty() {
            return Err(ResolveError::EmptyNameList);
        }
        if self.names.iter().any(|n| n.trim().is_empty()) {
            return Err(ResolveError::EmptyName);
        }
        Ok(())
    }

    /// An explicit `*` version asks for every version
    fn wants_all_versions(&self) -> bool {
        self.version.as_deref().map(str::trim) == Some("*")
    }
}

/// Records and diagnostics of a completed resolution
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    pub records: Vec<ResourceRecord>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Resolves requests against registered repositories
pub struct Resolver {
    repositories: Vec<RepositoryDescriptor>,
    provider: Box<dyn BackendProvider>,
    dual_catalogs: Vec<DualCatalog>,
}

impl Resolver {
    /// Create a resolver over `repositories`, using the well-known dual catalogs
    pub fn new(
        repositories: Vec<RepositoryDescriptor>,
        provider: Box<dyn BackendProvider>,
    ) -> Self {
        Self {
            repositories,
            provider,
            dual_catalogs: DualCatalog::well_known(),
        }
    }

    /// Resolver over the configured repositories with HTTP backends
    pub fn from_config(config: &ResolverConfig) -> Result<Self, BackendError> {
        let registry = BackendRegistry::from_config(config)?;
        Ok(Self::new(config.descriptors(), Box::new(registry))
            .with_dual_catalogs(config.all_dual_catalogs()))
    }

    pub fn with_dual_catalogs(mut self, dual_catalogs: Vec<DualCatalog>) -> Self {
        self.dual_catalogs = dual_catalogs;
        self
    }

    pub fn repositories(&self) -> &[RepositoryDescriptor] {
        &self.repositories
    }

    /// Start resolving `request`
    ///
    /// Nothing is fetched until the stream is polled. A version constraint
    /// that cannot be parsed yields an empty stream with a diagnostic.
    pub fn resolve(
        &mut self,
        request: &ResolveRequest,
        cancel: CancellationToken,
    ) -> Result<ResolutionStream<'_>, ResolveError> {
        request.validate()?;
        if self.repositories.is_empty() {
            return Err(ResolveError::NoRepositories);
        }

        let mut diagnostics = Vec::new();
        let repositories =
            filter_repositories(&self.repositories, &request.repositories, &mut diagnostics);
        let targets = plan_catalogs(&repositories, request.kind, &self.dual_catalogs);

        let constraint = match request.version.as_deref() {
            None => Some(VersionConstraint::All),
            Some(raw) => match VersionConstraint::parse(raw) {
                Ok(constraint) => Some(constraint),
                Err(e) => {
                    tracing::warn!(version = raw, error = %e, "Invalid version constraint");
                    diagnostics.push(Diagnostic::new(
                        DiagnosticKind::ConstraintParse,
                        e.to_string(),
                    ));
                    None
                }
            },
        };

        let mut names: Vec<NameState> = Vec::new();
        for raw in &request.names {
            let raw = raw.trim();
            if !names.iter().any(|n| n.raw.eq_ignore_ascii_case(raw)) {
                names.push(NameState::new(raw));
            }
        }

        tracing::debug!(
            names = ?request.names,
            targets = targets.len(),
            "Starting resolution"
        );

        Ok(ResolutionStream {
            provider: self.provider.as_mut(),
            options: SearchOptions {
                constraint: constraint.clone().unwrap_or_default(),
                all_versions: request.wants_all_versions(),
                include_prerelease: request.include_prerelease,
                tags: TagFilter::new(&request.tags),
                kind: request.kind,
                include_dependencies: request.include_dependencies,
            },
            targets,
            target_index: 0,
            current: None,
            names,
            seen: HashSet::new(),
            buffer: VecDeque::new(),
            diagnostics,
            cancel,
            // A bad constraint ends the request before any search
            finished: constraint.is_none(),
        })
    }

    /// Resolve `request` to completion
    pub fn resolve_all(
        &mut self,
        request: &ResolveRequest,
        cancel: CancellationToken,
    ) -> Result<Resolution, ResolveError> {
        let mut stream = self.resolve(request, cancel)?;
        let records: Vec<ResourceRecord> = stream.by_ref().collect();
        Ok(Resolution {
            records,
            diagnostics: stream.take_diagnostics(),
        })
    }
}

/// Keep repositories whose name matches any pattern; no patterns keeps all
fn filter_repositories(
    repositories: &[RepositoryDescriptor],
    patterns: &[String],
    diagnostics: &mut Vec<Diagnostic>,
) -> Vec<RepositoryDescriptor> {
    if patterns.is_empty() {
        return repositories.to_vec();
    }

    let patterns: Vec<NamePattern> = patterns.iter().map(|p| NamePattern::new(p.trim())).collect();
    for pattern in &patterns {
        if !repositories.iter().any(|r| pattern.matches(&r.name)) {
            diagnostics.push(
                Diagnostic::new(DiagnosticKind::NotFound, "no registered repository matches")
                    .with_repository(pattern.as_str()),
            );
        }
    }

    repositories
        .iter()
        .filter(|r| patterns.iter().any(|p| p.matches(&r.name)))
        .cloned()
        .collect()
}

/// Request settings shared by every search in one resolution
#[derive(Debug, Clone)]
struct SearchOptions {
    constraint: VersionConstraint,
    all_versions: bool,
    include_prerelease: bool,
    tags: TagFilter,
    kind: KindFilter,
    include_dependencies: bool,
}

impl SearchOptions {
    /// Wildcard results carry only the latest version per name
    fn needs_full_versions(&self, tag_search: bool) -> bool {
        !self.constraint.is_all()
            || self.all_versions
            || self.include_dependencies
            || (!self.tags.is_empty() && !tag_search)
    }

    fn selects_all(&self) -> bool {
        self.all_versions || self.constraint.is_range()
    }
}

/// Progress of one requested name
#[derive(Debug)]
struct NameState {
    raw: String,
    pattern: NamePattern,
    satisfied: bool,
    /// Matches were selected but all lacked a required tag
    tag_rejected: bool,
    /// Matched in the current target
    found_here: bool,
    /// Matched in the module catalog whose script catalog is next
    found_in_parent: bool,
}

impl NameState {
    fn new(raw: &str) -> Self {
        Self {
            raw: raw.to_string(),
            pattern: NamePattern::new(raw),
            satisfied: false,
            tag_rejected: false,
            found_here: false,
            found_in_parent: false,
        }
    }

    fn is_wildcard(&self) -> bool {
        self.pattern.is_wildcard()
    }
}

/// Target being searched and the names still to visit in it
struct TargetCursor {
    target: CatalogTarget,
    backend: Arc<dyn RepositoryBackend>,
    /// Indices into the name list, fixed when the target starts
    pending: Vec<usize>,
    position: usize,
}

/// Lazy, finite stream of resolved records
///
/// Each call to `next` does at most the work needed for one
/// (repository, name) pair before yielding. Diagnostics accumulate and can
/// be read at any point.
pub struct ResolutionStream<'r> {
    provider: &'r mut dyn BackendProvider,
    options: SearchOptions,
    targets: Vec<CatalogTarget>,
    target_index: usize,
    current: Option<TargetCursor>,
    names: Vec<NameState>,
    seen: HashSet<SeenKey>,
    buffer: VecDeque<ResourceRecord>,
    diagnostics: Vec<Diagnostic>,
    cancel: CancellationToken,
    finished: bool,
}

impl<'r> ResolutionStream<'r> {
    /// Diagnostics recorded so far
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Take the diagnostics recorded so far
    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }

    fn step(&mut self) {
        if self.cancel.is_cancelled() {
            tracing::info!("Resolution cancelled");
            self.current = None;
            self.finished = true;
            return;
        }

        let Some(mut cursor) = self.current.take() else {
            self.start_target();
            return;
        };

        match cursor.pending.get(cursor.position).copied() {
            Some(index) => {
                cursor.position += 1;
                self.search_name(&cursor, index);
                self.current = Some(cursor);
            }
            None => {
                self.finish_target(&cursor.target);
                self.target_index += 1;
            }
        }
    }

    fn start_target(&mut self) {
        let pending: Vec<usize> = self
            .names
            .iter()
            .enumerate()
            .filter(|(_, n)| !n.satisfied)
            .map(|(i, _)| i)
            .collect();

        let Some(target) = self.targets.get(self.target_index).cloned() else {
            self.finish();
            return;
        };
        if pending.is_empty() {
            tracing::debug!("Every name satisfied, skipping remaining repositories");
            self.finish();
            return;
        }

        for name in &mut self.names {
            name.found_here = false;
        }

        match self.provider.backend_for(&target.descriptor) {
            Ok(backend) => {
                tracing::debug!(
                    repository = %target.label(),
                    pending = pending.len(),
                    "Searching repository"
                );
                self.current = Some(TargetCursor {
                    target,
                    backend,
                    pending,
                    position: 0,
                });
            }
            Err(e) => {
                tracing::warn!(repository = %target.label(), error = %e, "Skipping repository");
                self.diagnostics.push(
                    Diagnostic::new(e.diagnostic_kind(), e.to_string())
                        .with_repository(target.label()),
                );
                self.finish_target(&target);
                self.target_index += 1;
            }
        }
    }

    /// Update the pending set once every name has been tried in `target`
    fn finish_target(&mut self, target: &CatalogTarget) {
        for name in self.names.iter_mut().filter(|n| !n.satisfied) {
            let satisfied = match target.role {
                // Wildcards always wait for the script catalog
                CatalogRole::Primary if target.has_script_sibling && name.is_wildcard() => {
                    name.found_in_parent = name.found_here;
                    false
                }
                CatalogRole::Primary => name.found_here,
                CatalogRole::Scripts => {
                    let satisfied = name.found_here || (name.is_wildcard() && name.found_in_parent);
                    name.found_in_parent = false;
                    satisfied
                }
            };

            if satisfied {
                tracing::info!(name = %name.raw, repository = %target.repository, "Name satisfied");
                name.satisfied = true;
            }
        }
    }

    /// Report names nothing satisfied and stop
    fn finish(&mut self) {
        self.finished = true;
        for name in self.names.iter().filter(|n| !n.satisfied) {
            let diagnostic = if name.tag_rejected {
                Diagnostic::new(
                    DiagnosticKind::TagMismatch,
                    format!("no match carries any of the tags {:?}", self.options.tags.required()),
                )
            } else {
                Diagnostic::new(DiagnosticKind::NotFound, "no match in any repository")
            };
            tracing::info!(name = %name.raw, kind = %diagnostic.kind, "Name not resolved");
            self.diagnostics.push(diagnostic.with_name(&name.raw));
        }
    }

    fn search_name(&mut self, cursor: &TargetCursor, index: usize) {
        let target = &cursor.target;
        let backend = cursor.backend.as_ref();
        let raw = self.names[index].raw.clone();
        let wildcard = self.names[index].is_wildcard();
        let tag_search = raw == "*" && !self.options.tags.is_empty();
        let include_prerelease = self.options.include_prerelease;

        let result = if tag_search {
            backend.search_by_tags(self.options.tags.required(), include_prerelease, &self.cancel)
        } else if wildcard {
            backend.search_by_wildcard_name(&raw, include_prerelease, &self.cancel)
        } else {
            backend.search_by_exact_name(&raw, include_prerelease, &self.cancel)
        };

        let entries = match result {
            Ok(entries) => entries,
            Err(e) => {
                self.record_backend_error(target, &raw, e);
                return;
            }
        };

        let mut candidates = self.to_candidates(entries, target, index);
        if wildcard && self.options.needs_full_versions(tag_search) {
            candidates = self.refetch_versions(backend, target, index, &candidates);
        }

        let selected = self.select(&candidates);
        let accepted: Vec<ResourceRecord> = selected
            .iter()
            .filter(|r| self.options.tags.accepts(&r.tags))
            .cloned()
            .collect();

        tracing::debug!(
            name = %raw,
            repository = %target.label(),
            candidates = candidates.len(),
            selected = selected.len(),
            accepted = accepted.len(),
            "Searched name"
        );

        let state = &mut self.names[index];
        if accepted.is_empty() {
            if !selected.is_empty() {
                state.tag_rejected = true;
            }
            return;
        }
        state.found_here = true;

        for record in accepted {
            self.emit(record, backend, target);
        }
    }

    /// Stamp entries and keep those matching the name and kind filters
    fn to_candidates(
        &self,
        entries: Vec<PackageEntry>,
        target: &CatalogTarget,
        index: usize,
    ) -> Vec<ResourceRecord> {
        let pattern = &self.names[index].pattern;
        entries
            .into_iter()
            .filter(|e| pattern.matches(&e.name))
            .map(|e| ResourceRecord::from_entry(e, &target.repository, target.forced_kind()))
            .filter(|r| self.options.kind.admits(r.kind))
            .collect()
    }

    /// Replace latest-only wildcard hits with every version of each name
    fn refetch_versions(
        &mut self,
        backend: &dyn RepositoryBackend,
        target: &CatalogTarget,
        index: usize,
        latest: &[ResourceRecord],
    ) -> Vec<ResourceRecord> {
        let mut names: Vec<&str> = Vec::new();
        for record in latest {
            if !names.iter().any(|n| n.eq_ignore_ascii_case(record.name())) {
                names.push(record.name());
            }
        }

        let mut candidates = Vec::new();
        for name in names {
            if self.cancel.is_cancelled() {
                break;
            }
            let found =
                backend.search_by_exact_name(name, self.options.include_prerelease, &self.cancel);
            match found {
                Ok(entries) => candidates.extend(self.to_candidates(entries, target, index)),
                Err(e) => self.record_backend_error(target, name, e),
            }
        }
        candidates
    }

    /// Apply the version constraint per distinct name, latest first
    fn select(&self, candidates: &[ResourceRecord]) -> Vec<ResourceRecord> {
        let mut groups: Vec<Vec<ResourceRecord>> = Vec::new();
        for record in candidates {
            match groups
                .iter_mut()
                .find(|g| g[0].name().eq_ignore_ascii_case(record.name()))
            {
                Some(group) => group.push(record.clone()),
                None => groups.push(vec![record.clone()]),
            }
        }

        let options = &self.options;
        let mut selected = Vec::new();
        for group in &groups {
            if options.selects_all() {
                selected.extend(
                    select_all(group, &options.constraint, options.include_prerelease)
                        .into_iter()
                        .cloned(),
                );
            } else if let Some(latest) =
                select_latest(group, &options.constraint, options.include_prerelease)
            {
                selected.push(latest.clone());
            }
        }
        selected
    }

    /// Queue a record, then its dependencies when requested
    fn emit(
        &mut self,
        record: ResourceRecord,
        backend: &dyn RepositoryBackend,
        target: &CatalogTarget,
    ) {
        if !self.seen.insert(record.identity.key()) {
            return;
        }

        let expand = self.options.include_dependencies && !record.dependencies.is_empty();
        if !expand {
            self.buffer.push_back(record);
            return;
        }

        let mut expander = DependencyExpander::new(
            backend,
            &target.repository,
            self.options.include_prerelease,
            &self.cancel,
        );
        let dependencies = expander.expand(&record, &mut self.seen);
        let diagnostics = expander.take_diagnostics();

        self.buffer.push_back(record);
        self.buffer.extend(dependencies);
        self.diagnostics.extend(diagnostics);
    }

    fn record_backend_error(&mut self, target: &CatalogTarget, name: &str, error: BackendError) {
        if matches!(error, BackendError::Cancelled) {
            return;
        }
        tracing::warn!(
            repository = %target.label(),
            name,
            error = %error,
            "Repository search failed"
        );
        self.diagnostics.push(
            Diagnostic::new(error.diagnostic_kind(), error.to_string())
                .with_repository(target.label())
                .with_name(name),
        );
    }
}

impl<'r> Iterator for ResolutionStream<'r> {
    type Item = ResourceRecord;

    fn next(&mut self) -> Option<ResourceRecord> {
        loop {
            if let Some(record) = self.buffer.pop_front() {
                return Some(record);
            }
            if self.finished {
                return None;
            }
            self.step();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_validation() {
        assert_eq!(
            ResolveRequest::new(Vec::<String>::new()).validate(),
            Err(ResolveError::EmptyNameList)
        );
        assert_eq!(
            ResolveRequest::new(["Foo", " "]).validate(),
            Err(ResolveError::EmptyName)
        );
        assert!(ResolveRequest::new(["Foo*"]).validate().is_ok());
    }

    #[test]
    fn test_all_versions_flag() {
        assert!(ResolveRequest::new(["Foo"]).with_version(" * ").wants_all_versions());
        assert!(!ResolveRequest::new(["Foo"]).wants_all_versions());
        assert!(!ResolveRequest::new(["Foo"]).with_version("1.0").wants_all_versions());
    }

    #[test]
    fn test_repository_filter() {
        let repos = vec![
            RepositoryDescriptor::new("PSGallery", "https://www.powershellgallery.com/api/v2", 50),
            RepositoryDescriptor::new("Internal", "/srv/packages", 10),
        ];
        let mut diagnostics = Vec::new();

        let wanted = ["ps*".to_string(), "Nope".to_string()];
        let kept = filter_repositories(&repos, &wanted, &mut diagnostics);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].name, "PSGallery");
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].repository.as_deref(), Some("Nope"));

        assert_eq!(filter_repositories(&repos, &[], &mut diagnostics).len(), 2);
    }
}

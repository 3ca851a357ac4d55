//! `scriptpm find`

use crate::output::StyledOutput;
use anyhow::Context;
use scriptpm_resolve::{CancellationToken, KindFilter, ResolveRequest, Resolver, ResolverConfig};
use std::path::Path;

/// Parsed `find` arguments
#[derive(Debug, Clone, Default)]
pub struct FindArgs {
    pub names: Vec<String>,
    pub version: Option<String>,
    pub prerelease: bool,
    pub tags: Vec<String>,
    pub kind: KindFilter,
    pub repositories: Vec<String>,
    pub include_dependencies: bool,
    pub json: bool,
}

impl FindArgs {
    fn to_request(&self) -> ResolveRequest {
        let mut request = ResolveRequest::new(self.names.iter().cloned())
            .with_prerelease(self.prerelease)
            .with_tags(self.tags.iter().cloned())
            .with_kind(self.kind)
            .with_repositories(self.repositories.iter().cloned())
            .with_dependencies(self.include_dependencies);
        if let Some(ref version) = self.version {
            request = request.with_version(version.clone());
        }
        request
    }
}

/// Run a search, printing records as they arrive
///
/// Returns whether anything was found.
pub fn execute(
    args: &FindArgs,
    config_path: Option<&Path>,
    out: &mut StyledOutput,
) -> anyhow::Result<bool> {
    let config = load_config(config_path)?;
    let mut resolver = Resolver::from_config(&config).context("Failed to set up repositories")?;

    let request = args.to_request();
    let mut stream = resolver.resolve(&request, CancellationToken::new())?;

    let mut found = 0usize;
    for record in stream.by_ref() {
        if args.json {
            out.record_json(&record)?;
        } else {
            out.record(&record);
        }
        found += 1;
    }
    out.flush();

    for diagnostic in stream.diagnostics() {
        out.diagnostic(diagnostic);
    }

    tracing::debug!(found, "Find finished");
    Ok(found > 0)
}

fn load_config(path: Option<&Path>) -> anyhow::Result<ResolverConfig> {
    match path {
        Some(path) => ResolverConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display())),
        None => match ResolverConfig::default_path() {
            Some(path) => Ok(ResolverConfig::load_or_default(&path)?),
            None => Ok(ResolverConfig::default()),
        },
    }
}

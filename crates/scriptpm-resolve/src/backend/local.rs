//! Local directory catalog
//!
//! A local repository is a flat directory of `.nupkg` archives and/or loose
//! `.nuspec` manifests. Every search rescans the directory; entries that
//! cannot be read are skipped with a warning.

use super::nuspec::{parse_nuspec, NuspecError};
use super::{latest_per_name, retain_prerelease, BackendError, RepositoryBackend};
use crate::cancel::CancellationToken;
use crate::name_match::NamePattern;
use crate::resource::PackageEntry;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

/// Reasons a single catalog entry is skipped
#[derive(Debug, Error)]
enum EntryError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid archive: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("archive has no .nuspec at its root")]
    MissingManifest,

    #[error("invalid manifest: {0}")]
    Manifest(#[from] NuspecError),
}

/// Backend reading a directory on the local filesystem
#[derive(Debug, Clone)]
pub struct LocalBackend {
    root: PathBuf,
}

impl LocalBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create from a repository URL: a `file://` URL or a plain path
    pub fn from_url(url: &str) -> Result<Self, BackendError> {
        let url = url.trim();
        if url.get(..7).is_some_and(|scheme| scheme.eq_ignore_ascii_case("file://")) {
            let parsed = Url::parse(url)
                .map_err(|e| BackendError::InvalidUrl(format!("{}: {}", url, e)))?;
            let path = parsed
                .to_file_path()
                .map_err(|_| BackendError::InvalidUrl(format!("{}: not a local path", url)))?;
            return Ok(Self::new(path));
        }
        Ok(Self::new(url))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Read every catalog entry in the directory
    ///
    /// File names are not trusted to carry the package id, so callers filter
    /// on the parsed manifest.
    fn scan(&self, cancel: &CancellationToken) -> Result<Vec<PackageEntry>, BackendError> {
        let io_error = |source| BackendError::Io {
            path: self.root.clone(),
            source,
        };

        let mut paths = Vec::new();
        for dir_entry in std::fs::read_dir(&self.root).map_err(io_error)? {
            let path = match dir_entry {
                Ok(entry) => entry.path(),
                Err(e) => {
                    tracing::warn!(
                        root = %self.root.display(),
                        error = %e,
                        "Skipping unreadable directory entry"
                    );
                    continue;
                }
            };
            if path.is_file() && catalog_file_kind(&path).is_some() {
                paths.push(path);
            }
        }
        // Directory order is platform-dependent
        paths.sort();

        let mut entries = Vec::with_capacity(paths.len());
        for path in paths {
            if cancel.is_cancelled() {
                return Err(BackendError::Cancelled);
            }
            match read_entry(&path) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Skipping catalog entry");
                }
            }
        }

        tracing::debug!(
            root = %self.root.display(),
            count = entries.len(),
            "Scanned local catalog"
        );
        Ok(entries)
    }
}

impl RepositoryBackend for LocalBackend {
    fn search_by_exact_name(
        &self,
        name: &str,
        include_prerelease: bool,
        cancel: &CancellationToken,
    ) -> Result<Vec<PackageEntry>, BackendError> {
        let mut entries = self.scan(cancel)?;
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
        let pattern = NamePattern::new(pattern);
        let mut entries = self.scan(cancel)?;
        entries.retain(|e| pattern.matches(&e.name));
        retain_prerelease(&mut entries, include_prerelease);
        Ok(latest_per_name(entries))
    }

    fn search_by_tags(
        &self,
        tags: &[String],
        include_prerelease: bool,
        cancel: &CancellationToken,
    ) -> Result<Vec<PackageEntry>, BackendError> {
        let mut entries = self.scan(cancel)?;
        entries.retain(|e| crate::tags::has_any_required_tag(&e.tags, tags));
        retain_prerelease(&mut entries, include_prerelease);
        Ok(latest_per_name(entries))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CatalogFile {
    Archive,
    Manifest,
}

fn catalog_file_kind(path: &Path) -> Option<CatalogFile> {
    let ext = path.extension()?.to_string_lossy().to_ascii_lowercase();
    match ext.as_str() {
        "nupkg" => Some(CatalogFile::Archive),
        "nuspec" => Some(CatalogFile::Manifest),
        _ => None,
    }
}

fn read_entry(path: &Path) -> Result<PackageEntry, EntryError> {
    let xml = match catalog_file_kind(path) {
        Some(CatalogFile::Archive) => read_archive_manifest(path)?,
        _ => std::fs::read_to_string(path)?,
    };
    let mut entry = parse_nuspec(&xml)?;
    entry.package_content = Some(path.display().to_string());
    Ok(entry)
}

/// Read the manifest stored at the root of a package archive
fn read_archive_manifest(path: &Path) -> Result<String, EntryError> {
    let file = File::open(path)?;
    let mut archive = zip::ZipArchive::new(file)?;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let name = entry.name().to_ascii_lowercase();
        if entry.is_dir() || name.contains('/') || !name.ends_with(".nuspec") {
            continue;
        }
        let mut xml = String::new();
        entry.read_to_string(&mut xml)?;
        return Ok(xml);
    }

    Err(EntryError::MissingManifest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::Version;
    use tempfile::TempDir;

    fn nuspec(name: &str, version: &str) -> String {
        format!(
            "<package><metadata><id>{}</id><version>{}</version>\
             <tags>PSModule</tags></metadata></package>",
            name, version
        )
    }

    #[test]
    fn test_from_url() {
        let backend = LocalBackend::from_url("/srv/packages").unwrap();
        assert_eq!(backend.root(), Path::new("/srv/packages"));

        let backend = LocalBackend::from_url("file:///srv/packages").unwrap();
        assert_eq!(backend.root(), Path::new("/srv/packages"));
    }

    #[test]
    fn test_exact_search_over_loose_manifests() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("Foo.1.0.0.nuspec"), nuspec("Foo", "1.0.0")).unwrap();
        std::fs::write(
            dir.path().join("Foo.2.0.0-beta.nuspec"),
            nuspec("Foo", "2.0.0-beta"),
        )
        .unwrap();
        std::fs::write(dir.path().join("FooBar.1.0.0.nuspec"), nuspec("FooBar", "1.0.0")).unwrap();

        let backend = LocalBackend::new(dir.path());
        let cancel = CancellationToken::new();

        let stable = backend.search_by_exact_name("foo", false, &cancel).unwrap();
        assert_eq!(stable.len(), 1);
        assert_eq!(stable[0].version, Version::new(1, 0, 0));

        let all = backend.search_by_exact_name("Foo", true, &cancel).unwrap();
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn test_exact_search_reads_id_from_manifest() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("custom-build.nuspec"), nuspec("Foo", "1.0.0")).unwrap();
        std::fs::write(dir.path().join("Foo.2.0.0.nuspec"), nuspec("Other", "2.0.0")).unwrap();

        let backend = LocalBackend::new(dir.path());
        let cancel = CancellationToken::new();

        let exact = backend.search_by_exact_name("Foo", false, &cancel).unwrap();
        assert_eq!(exact.len(), 1);
        assert_eq!(exact[0].name, "Foo");
        assert!(exact[0]
            .package_content
            .as_deref()
            .is_some_and(|p| p.ends_with("custom-build.nuspec")));

        let wildcard = backend.search_by_wildcard_name("F*", false, &cancel).unwrap();
        assert_eq!(wildcard.len(), 1);
        assert_eq!(wildcard[0].name, "Foo");
    }

    #[test]
    fn test_broken_entries_are_skipped() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("Foo.1.0.0.nuspec"), nuspec("Foo", "1.0.0")).unwrap();
        std::fs::write(dir.path().join("Foo.9.9.9.nuspec"), "<package>").unwrap();
        std::fs::write(dir.path().join("Foo.9.9.9.nupkg"), b"not a zip").unwrap();

        let backend = LocalBackend::new(dir.path());
        let entries = backend
            .search_by_exact_name("Foo", true, &CancellationToken::new())
            .unwrap();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_missing_root_is_io_error() {
        let backend = LocalBackend::new("/definitely/not/here");
        let result = backend.search_by_wildcard_name("*", false, &CancellationToken::new());
        assert!(matches!(result, Err(BackendError::Io { .. })));
    }

    #[test]
    fn test_cancelled_scan() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("Foo.nuspec"), nuspec("Foo", "1.0.0")).unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = LocalBackend::new(dir.path()).search_by_exact_name("Foo", false, &cancel);
        assert!(matches!(result, Err(BackendError::Cancelled)));
    }
}

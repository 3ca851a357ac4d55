//! Version selection
//!
//! Picks the latest or every satisfying version from a candidate list.
//! Ordering is descending, with a release ranked above any prerelease of the
//! same numeric version.

use crate::resource::{PackageEntry, ResourceRecord};
use crate::version::{Version, VersionConstraint};

/// Anything that carries a version and can be selected
pub trait Versioned {
    fn version(&self) -> &Version;
}

impl Versioned for Version {
    fn version(&self) -> &Version {
        self
    }
}

impl Versioned for PackageEntry {
    fn version(&self) -> &Version {
        &self.version
    }
}

impl Versioned for ResourceRecord {
    fn version(&self) -> &Version {
        &self.identity.version
    }
}

/// Select the latest candidate satisfying `constraint`
pub fn select_latest<'a, T: Versioned>(
    candidates: &'a [T],
    constraint: &VersionConstraint,
    include_prerelease: bool,
) -> Option<&'a T> {
    satisfying(candidates, constraint, include_prerelease)
        .into_iter()
        .next()
}

/// Select every candidate satisfying `constraint`, latest first
///
/// Candidates reporting the same version are collapsed to the first one seen.
pub fn select_all<'a, T: Versioned>(
    candidates: &'a [T],
    constraint: &VersionConstraint,
    include_prerelease: bool,
) -> Vec<&'a T> {
    satisfying(candidates, constraint, include_prerelease)
}

fn satisfying<'a, T: Versioned>(
    candidates: &'a [T],
    constraint: &VersionConstraint,
    include_prerelease: bool,
) -> Vec<&'a T> {
    let mut selected: Vec<&T> = candidates
        .iter()
        .filter(|c| include_prerelease || !c.version().is_prerelease())
        .filter(|c| constraint.satisfies(c.version()))
        .collect();

    // Stable sort keeps backend order among duplicates
    selected.sort_by(|a, b| b.version().cmp(a.version()));
    selected.dedup_by(|a, b| a.version() == b.version());
    selected
}

#[cfg(test)]
mod tests {
    use super::*;

    fn versions(list: &[&str]) -> Vec<Version> {
        list.iter().map(|s| Version::parse(s).unwrap()).collect()
    }

    #[test]
    fn test_select_latest_release() {
        let candidates = versions(&["1.0.0", "2.0.0", "1.5.0"]);
        let latest = select_latest(&candidates, &VersionConstraint::All, false).unwrap();
        assert_eq!(latest.to_string(), "2.0.0");
    }

    #[test]
    fn test_prerelease_excluded_unless_requested() {
        let candidates = versions(&["1.0.0", "2.0.0-beta1"]);

        let latest = select_latest(&candidates, &VersionConstraint::All, false).unwrap();
        assert_eq!(latest.to_string(), "1.0.0");

        let latest = select_latest(&candidates, &VersionConstraint::All, true).unwrap();
        assert_eq!(latest.to_string(), "2.0.0-beta1");
    }

    #[test]
    fn test_release_beats_prerelease_of_same_core() {
        let candidates = versions(&["2.0.0-rc1", "2.0.0", "2.0.0-beta"]);
        let all = select_all(&candidates, &VersionConstraint::All, true);
        let shown: Vec<String> = all.iter().map(|v| v.to_string()).collect();
        assert_eq!(shown, vec!["2.0.0", "2.0.0-rc1", "2.0.0-beta"]);
    }

    #[test]
    fn test_select_all_in_range() {
        let candidates = versions(&["0.9.0", "1.0.0", "1.5.0", "2.0.0", "2.1.0"]);
        let range = VersionConstraint::parse("[1.0.0, 2.0.0)").unwrap();
        let all = select_all(&candidates, &range, false);
        let shown: Vec<String> = all.iter().map(|v| v.to_string()).collect();
        assert_eq!(shown, vec!["1.5.0", "1.0.0"]);
    }

    #[test]
    fn test_duplicate_versions_collapse() {
        let candidates = versions(&["1.0", "1.0.0", "1.0.0.0"]);
        assert_eq!(select_all(&candidates, &VersionConstraint::All, false).len(), 1);
    }

    #[test]
    fn test_nothing_satisfies() {
        let candidates = versions(&["1.0.0"]);
        let c = VersionConstraint::parse("[2.0,)").unwrap();
        assert!(select_latest(&candidates, &c, true).is_none());
        assert!(select_all(&candidates, &c, true).is_empty());
    }
}

//! Package versions and version constraints
//!
//! Versions follow the gallery scheme: up to four numeric components with an
//! optional `-label` prerelease suffix. Constraints are either an exact
//! version, an interval, or "any version".

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use thiserror::Error;

/// Errors that can occur while parsing versions and constraints
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionError {
    /// Invalid version format
    #[error("Invalid version format: {0}")]
    InvalidVersion(String),

    /// Invalid constraint format
    #[error("Invalid version constraint: {0}")]
    InvalidConstraint(String),

    /// Range whose bounds admit no version
    #[error("Version range {0} cannot be satisfied by any version")]
    EmptyRange(String),
}

/// Package version (MAJOR.MINOR.PATCH[.REVISION][-PRERELEASE][+BUILD])
///
/// Missing numeric components are zero, so `1.0`, `1.0.0` and `1.0.0.0` are
/// the same version. Build metadata is kept for display but ignored when
/// comparing.
#[derive(Debug, Clone)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub revision: u64,
    pub prerelease: Option<String>,
    pub build: Option<String>,
}

impl Version {
    /// Parse a version string
    pub fn parse(s: &str) -> Result<Self, VersionError> {
        let s = s.trim();
        let s = s
            .strip_prefix('v')
            .or_else(|| s.strip_prefix('V'))
            .unwrap_or(s);

        if s.is_empty() {
            return Err(VersionError::InvalidVersion("empty version".to_string()));
        }

        // Split by + to separate build metadata
        let (version_part, build) = match s.split_once('+') {
            Some((v, b)) => (v, Some(b.to_string())),
            None => (s, None),
        };

        // Split by the first - to separate prerelease
        let (core_version, prerelease) = match version_part.split_once('-') {
            Some((v, p)) => {
                if p.is_empty()
                    || !p
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
                {
                    return Err(VersionError::InvalidVersion(format!(
                        "Invalid prerelease label in '{}'",
                        s
                    )));
                }
                (v, Some(p.to_string()))
            }
            None => (version_part, None),
        };

        let parts: Vec<&str> = core_version.split('.').collect();
        if parts.is_empty() || parts.len() > 4 {
            return Err(VersionError::InvalidVersion(format!(
                "Expected 1 to 4 numeric components, got '{}'",
                s
            )));
        }

        let mut numbers = [0u64; 4];
        for (slot, part) in numbers.iter_mut().zip(&parts) {
            if part.is_empty() || !part.chars().all(|c| c.is_ascii_digit()) {
                return Err(VersionError::InvalidVersion(format!(
                    "Invalid version component '{}' in '{}'",
                    part, s
                )));
            }
            *slot = part.parse().map_err(|_| {
                VersionError::InvalidVersion(format!("Version component out of range: {}", part))
            })?;
        }

        Ok(Version {
            major: numbers[0],
            minor: numbers[1],
            patch: numbers[2],
            revision: numbers[3],
            prerelease,
            build,
        })
    }

    /// Create a new release version
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Version {
            major,
            minor,
            patch,
            revision: 0,
            prerelease: None,
            build: None,
        }
    }

    /// Create a new prerelease version
    pub fn prerelease(major: u64, minor: u64, patch: u64, label: &str) -> Self {
        Version {
            prerelease: Some(label.to_string()),
            ..Version::new(major, minor, patch)
        }
    }

    /// Check if this is a prerelease version
    pub fn is_prerelease(&self) -> bool {
        self.prerelease.is_some()
    }

    /// Prerelease label, empty for release versions
    pub fn prerelease_label(&self) -> &str {
        self.prerelease.as_deref().unwrap_or("")
    }

    /// Numeric part without prerelease or build suffix
    pub fn release(&self) -> Version {
        Version {
            major: self.major,
            minor: self.minor,
            patch: self.patch,
            revision: self.revision,
            prerelease: None,
            build: None,
        }
    }

    fn numbers(&self) -> [u64; 4] {
        [self.major, self.minor, self.patch, self.revision]
    }
}

impl Default for Version {
    fn default() -> Self {
        Version::new(0, 0, 0)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if self.revision != 0 {
            write!(f, ".{}", self.revision)?;
        }
        if let Some(ref pre) = self.prerelease {
            write!(f, "-{}", pre)?;
        }
        if let Some(ref build) = self.build {
            write!(f, "+{}", build)?;
        }
        Ok(())
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl Hash for Version {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.numbers().hash(state);
        self.prerelease
            .as_ref()
            .map(|p| p.to_ascii_lowercase())
            .hash(state);
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.numbers().cmp(&other.numbers()) {
            Ordering::Equal => {}
            ord => return ord,
        }

        // A release sorts above every prerelease of the same numeric core
        match (&self.prerelease, &other.prerelease) {
            (None, None) => Ordering::Equal,
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (Some(a), Some(b)) => a.to_ascii_lowercase().cmp(&b.to_ascii_lowercase()),
        }
    }
}

/// Interval of versions with optional, independently inclusive bounds
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionRange {
    pub min: Option<Version>,
    pub min_inclusive: bool,
    pub max: Option<Version>,
    pub max_inclusive: bool,
}

impl VersionRange {
    /// Create a range, rejecting bounds that no version can satisfy
    pub fn new(
        min: Option<Version>,
        min_inclusive: bool,
        max: Option<Version>,
        max_inclusive: bool,
    ) -> Result<Self, VersionError> {
        let range = VersionRange {
            min_inclusive: min_inclusive && min.is_some(),
            max_inclusive: max_inclusive && max.is_some(),
            min,
            max,
        };

        if let (Some(lo), Some(hi)) = (&range.min, &range.max) {
            let empty = match lo.cmp(hi) {
                Ordering::Greater => true,
                Ordering::Equal => !(range.min_inclusive && range.max_inclusive),
                Ordering::Less => false,
            };
            if empty {
                return Err(VersionError::EmptyRange(range.to_string()));
            }
        }

        Ok(range)
    }

    /// Range with only an inclusive lower bound
    pub fn at_least(min: Version) -> Self {
        VersionRange {
            min: Some(min),
            min_inclusive: true,
            max: None,
            max_inclusive: false,
        }
    }

    /// Check whether a version falls inside this range
    pub fn contains(&self, version: &Version) -> bool {
        let above_min = match &self.min {
            Some(min) if self.min_inclusive => version >= min,
            Some(min) => version > min,
            None => true,
        };
        let below_max = match &self.max {
            Some(max) if self.max_inclusive => version <= max,
            Some(max) => version < max,
            None => true,
        };
        above_min && below_max
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(if self.min_inclusive { "[" } else { "(" })?;
        if let Some(ref min) = self.min {
            write!(f, "{}", min)?;
        }
        f.write_str(", ")?;
        if let Some(ref max) = self.max {
            write!(f, "{}", max)?;
        }
        f.write_str(if self.max_inclusive { "]" } else { ")" })
    }
}

/// Version constraint attached to a request or a declared dependency
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum VersionConstraint {
    /// Any version (empty string or `*`)
    #[default]
    All,

    /// Exactly one version (`1.2.3` or `[1.2.3]`)
    Exact(Version),

    /// Interval (`[1.0, 2.0)`, `>=1.0`, `3.*`)
    Range(VersionRange),
}

impl VersionConstraint {
    /// Parse a user-supplied version string
    ///
    /// A bare version is an exact match. Use
    /// [`VersionConstraint::parse_dependency_range`] for dependency
    /// declarations, where a bare version is a lower bound.
    pub fn parse(s: &str) -> Result<Self, VersionError> {
        let s = s.trim();

        if s.is_empty() || s == "*" {
            return Ok(VersionConstraint::All);
        }

        if s.starts_with('[') || s.starts_with('(') {
            return Self::parse_interval(s);
        }

        if let Some(constraint) = Self::parse_operator(s)? {
            return Ok(constraint);
        }

        if s.contains('*') {
            return Self::parse_wildcard(s);
        }

        let version = Version::parse(s).map_err(|e| Self::constraint_error(s, e))?;
        Ok(VersionConstraint::Exact(version))
    }

    /// Parse a version range as declared in package metadata
    ///
    /// Follows the NuGet convention that a bare version means "this version
    /// or newer".
    pub fn parse_dependency_range(s: &str) -> Result<Self, VersionError> {
        let s = s.trim();
        let bare = !s.is_empty()
            && !s.starts_with(&['[', '(', '>', '<', '='][..])
            && !s.contains('*');

        if bare {
            let version = Version::parse(s).map_err(|e| Self::constraint_error(s, e))?;
            return Ok(VersionConstraint::Range(VersionRange::at_least(version)));
        }

        Self::parse(s)
    }

    /// Check if a version satisfies this constraint
    pub fn satisfies(&self, version: &Version) -> bool {
        match self {
            VersionConstraint::All => true,
            VersionConstraint::Exact(v) => version == v,
            VersionConstraint::Range(range) => range.contains(version),
        }
    }

    /// True for interval constraints, which select every satisfying version
    pub fn is_range(&self) -> bool {
        matches!(self, VersionConstraint::Range(_))
    }

    /// True when no version was specified
    pub fn is_all(&self) -> bool {
        matches!(self, VersionConstraint::All)
    }

    /// Parse bracketed interval notation
    fn parse_interval(s: &str) -> Result<Self, VersionError> {
        let min_inclusive = s.starts_with('[');
        let max_inclusive = match s.chars().last() {
            Some(']') => true,
            Some(')') => false,
            _ => {
                return Err(VersionError::InvalidConstraint(format!(
                    "Unterminated interval: {}",
                    s
                )))
            }
        };

        if s.len() < 2 {
            return Err(VersionError::InvalidConstraint(format!(
                "Invalid interval: {}",
                s
            )));
        }
        let inner = &s[1..s.len() - 1];

        let Some((lo, hi)) = inner.split_once(',') else {
            // [1.2.3] pins a single version
            if !(min_inclusive && max_inclusive) {
                return Err(VersionError::InvalidConstraint(format!(
                    "Single-version interval must use square brackets: {}",
                    s
                )));
            }
            let version = Version::parse(inner).map_err(|e| Self::constraint_error(s, e))?;
            return Ok(VersionConstraint::Exact(version));
        };

        if hi.contains(',') {
            return Err(VersionError::InvalidConstraint(format!(
                "Interval has more than two bounds: {}",
                s
            )));
        }

        let bound = |text: &str| -> Result<Option<Version>, VersionError> {
            let text = text.trim();
            if text.is_empty() {
                Ok(None)
            } else {
                Version::parse(text)
                    .map(Some)
                    .map_err(|e| Self::constraint_error(s, e))
            }
        };

        let min = bound(lo)?;
        let max = bound(hi)?;
        if min.is_none() && max.is_none() {
            return Ok(VersionConstraint::All);
        }

        let range = VersionRange::new(min, min_inclusive, max, max_inclusive)?;
        Ok(VersionConstraint::Range(range))
    }

    /// Parse comparison operators (>=1.2.3, <2.0, =1.0)
    fn parse_operator(s: &str) -> Result<Option<Self>, VersionError> {
        let parse = |rest: &str| Version::parse(rest).map_err(|e| Self::constraint_error(s, e));

        let constraint = if let Some(rest) = s.strip_prefix(">=") {
            VersionConstraint::Range(VersionRange::new(Some(parse(rest)?), true, None, false)?)
        } else if let Some(rest) = s.strip_prefix("<=") {
            VersionConstraint::Range(VersionRange::new(None, false, Some(parse(rest)?), true)?)
        } else if let Some(rest) = s.strip_prefix('>') {
            VersionConstraint::Range(VersionRange::new(Some(parse(rest)?), false, None, false)?)
        } else if let Some(rest) = s.strip_prefix('<') {
            VersionConstraint::Range(VersionRange::new(None, false, Some(parse(rest)?), false)?)
        } else if let Some(rest) = s.strip_prefix('=') {
            VersionConstraint::Exact(parse(rest)?)
        } else {
            return Ok(None);
        };

        Ok(Some(constraint))
    }

    /// Parse a trailing wildcard (3.*, 3.1.*, 3.1.2.*)
    ///
    /// The result covers every version sharing the prefix and stops,
    /// exclusive, at the next increment of the last fixed component.
    fn parse_wildcard(s: &str) -> Result<Self, VersionError> {
        let invalid = || VersionError::InvalidConstraint(format!("Invalid wildcard: {}", s));

        let prefix = s.strip_suffix(".*").ok_or_else(invalid)?;
        let parts: Vec<&str> = prefix.split('.').collect();
        if parts.is_empty() || parts.len() > 3 {
            return Err(invalid());
        }

        let mut numbers = Vec::with_capacity(parts.len());
        for part in &parts {
            if part.is_empty() || !part.chars().all(|c| c.is_ascii_digit()) {
                return Err(invalid());
            }
            numbers.push(part.parse::<u64>().map_err(|_| invalid())?);
        }

        let mut lower = [0u64; 4];
        lower[..numbers.len()].copy_from_slice(&numbers);
        let mut upper = lower;
        let last = numbers.len() - 1;
        upper[last] = upper[last].checked_add(1).ok_or_else(invalid)?;

        let to_version = |n: [u64; 4]| Version {
            major: n[0],
            minor: n[1],
            patch: n[2],
            revision: n[3],
            prerelease: None,
            build: None,
        };

        let range = VersionRange::new(
            Some(to_version(lower)),
            true,
            Some(to_version(upper)),
            false,
        )?;
        Ok(VersionConstraint::Range(range))
    }

    fn constraint_error(s: &str, err: VersionError) -> VersionError {
        match err {
            VersionError::InvalidVersion(reason) => {
                VersionError::InvalidConstraint(format!("{} ({})", s, reason))
            }
            other => other,
        }
    }
}

impl fmt::Display for VersionConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionConstraint::All => write!(f, "*"),
            VersionConstraint::Exact(v) => write!(f, "{}", v),
            VersionConstraint::Range(range) => write!(f, "{}", range),
        }
    }
}

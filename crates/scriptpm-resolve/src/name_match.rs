//! Case-insensitive wildcard name matching
//!
//! Remote backends answer wildcard searches loosely (substring or token
//! matches), so every wildcard result is re-checked here before selection.
//! Only `*` is special; every other character matches literally.

use glob::{MatchOptions, Pattern};

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: false,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

/// Check whether a requested name contains a wildcard
pub fn has_wildcard(name: &str) -> bool {
    name.contains('*')
}

/// Compiled name pattern
#[derive(Debug, Clone)]
pub struct NamePattern {
    raw: String,
    pattern: Option<Pattern>,
}

impl NamePattern {
    pub fn new(raw: &str) -> Self {
        // glob reads `**` as a recursive wildcard, so a run of stars becomes one
        let mut collapsed = String::with_capacity(raw.len());
        for c in raw.chars() {
            if c == '*' && collapsed.ends_with('*') {
                continue;
            }
            collapsed.push(c);
        }

        // Escape everything between the stars so `[`, `?` and friends stay literal
        let escaped = collapsed
            .split('*')
            .map(Pattern::escape)
            .collect::<Vec<_>>()
            .join("*");

        Self {
            raw: raw.to_string(),
            pattern: Pattern::new(&escaped).ok(),
        }
    }

    /// Check whether a candidate name matches this pattern
    pub fn matches(&self, candidate: &str) -> bool {
        match &self.pattern {
            Some(pattern) => pattern.matches_with(candidate, MATCH_OPTIONS),
            None => candidate.eq_ignore_ascii_case(&self.raw),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn is_wildcard(&self) -> bool {
        has_wildcard(&self.raw)
    }

    /// Non-empty literal runs between the wildcards, in order
    pub fn literal_segments(&self) -> Vec<&str> {
        self.raw.split('*').filter(|s| !s.is_empty()).collect()
    }
}

/// Check whether `candidate` matches `pattern`, ignoring case
pub fn matches(candidate: &str, pattern: &str) -> bool {
    NamePattern::new(pattern).matches(candidate)
}

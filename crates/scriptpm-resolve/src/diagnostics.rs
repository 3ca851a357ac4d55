//! Soft failures collected during resolution
//!
//! Nothing that goes wrong inside the repository loop stops resolution.
//! Each problem becomes a [`Diagnostic`] returned next to the records.

use serde::Serialize;
use std::fmt;

/// Category of a soft failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// The requested version string could not be parsed
    ConstraintParse,

    /// Network, timeout or HTTP status failure
    Transport,

    /// Response body did not have the expected structure
    MalformedResponse,

    /// A requested name matched nothing in any repository
    NotFound,

    /// Matches were found but none carried a required tag
    TagMismatch,

    /// A declared dependency could not be resolved
    DependencyNotFound,

    /// Repository could not be searched (unsupported protocol, bad URL, unreadable catalog)
    UnsupportedRepository,
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DiagnosticKind::ConstraintParse => "invalid version",
            DiagnosticKind::Transport => "transport error",
            DiagnosticKind::MalformedResponse => "malformed response",
            DiagnosticKind::NotFound => "not found",
            DiagnosticKind::TagMismatch => "tag mismatch",
            DiagnosticKind::DependencyNotFound => "dependency not found",
            DiagnosticKind::UnsupportedRepository => "repository unavailable",
        };
        f.write_str(label)
    }
}

/// A human-readable soft failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub repository: Option<String>,
    pub name: Option<String>,
    pub message: String,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            repository: None,
            name: None,
            message: message.into(),
        }
    }

    pub fn with_repository(mut self, repository: impl Into<String>) -> Self {
        self.repository = Some(repository.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(ref repository) = self.repository {
            write!(f, " [{}]", repository)?;
        }
        if let Some(ref name) = self.name {
            write!(f, " {}", name)?;
        }
        write!(f, ": {}", self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let d = Diagnostic::new(DiagnosticKind::Transport, "HTTP 503")
            .with_repository("Gallery")
            .with_name("Foo");
        assert_eq!(d.to_string(), "transport error [Gallery] Foo: HTTP 503");

        let d = Diagnostic::new(DiagnosticKind::NotFound, "no match");
        assert_eq!(d.to_string(), "not found: no match");
    }
}

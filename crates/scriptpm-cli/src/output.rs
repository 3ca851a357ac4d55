//! Colored terminal output.
//!
//! Uses `termcolor`; respects `NO_COLOR` and the `--color` flag. Records go
//! to stdout, diagnostics to stderr.

use scriptpm_resolve::{Diagnostic, DiagnosticKind, ResourceRecord};
use std::io::Write;
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

/// Resolve `ColorChoice` from CLI flag and environment.
///
/// Priority: `NO_COLOR` env > `--color` flag > auto-detect TTY.
pub fn resolve_color_choice(flag: Option<&str>) -> ColorChoice {
    if std::env::var_os("NO_COLOR").is_some() {
        return ColorChoice::Never;
    }
    match flag {
        Some("always") => ColorChoice::Always,
        Some("never") => ColorChoice::Never,
        _ => ColorChoice::Auto,
    }
}

/// Styled output writer for terminal.
pub struct StyledOutput {
    stdout: StandardStream,
    stderr: StandardStream,
}

impl StyledOutput {
    pub fn new(choice: ColorChoice) -> Self {
        Self {
            stdout: StandardStream::stdout(choice),
            stderr: StandardStream::stderr(choice),
        }
    }

    fn write_styled(&mut self, text: &str, color: Option<Color>, bold: bool) {
        let mut spec = ColorSpec::new();
        spec.set_fg(color).set_bold(bold);
        let _ = self.stdout.set_color(&spec);
        let _ = write!(self.stdout, "{}", text);
        let _ = self.stdout.reset();
    }

    /// One record: `name version repository kind`
    pub fn record(&mut self, record: &ResourceRecord) {
        self.write_styled(record.name(), None, true);
        let _ = write!(self.stdout, " ");
        let version_color = if record.identity.is_prerelease {
            Color::Yellow
        } else {
            Color::Green
        };
        self.write_styled(&record.version().to_string(), Some(version_color), false);
        let _ = write!(self.stdout, " ");
        self.write_styled(&record.repository, Some(Color::Cyan), false);
        let _ = writeln!(self.stdout, " {}", record.kind);
    }

    /// One record as a JSON line
    pub fn record_json(&mut self, record: &ResourceRecord) -> anyhow::Result<()> {
        let line = serde_json::to_string(record)?;
        writeln!(self.stdout, "{}", line)?;
        Ok(())
    }

    /// Diagnostic on stderr, colored by severity
    pub fn diagnostic(&mut self, diagnostic: &Diagnostic) {
        let color = match diagnostic.kind {
            DiagnosticKind::NotFound
            | DiagnosticKind::TagMismatch
            | DiagnosticKind::DependencyNotFound => Color::Yellow,
            _ => Color::Red,
        };

        let mut spec = ColorSpec::new();
        spec.set_fg(Some(color)).set_bold(true);
        let _ = self.stderr.set_color(&spec);
        let _ = write!(self.stderr, "warning");
        let _ = self.stderr.reset();
        let _ = writeln!(self.stderr, ": {}", diagnostic);
    }

    pub fn flush(&mut self) {
        let _ = self.stdout.flush();
    }
}

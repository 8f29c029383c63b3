//! Shared colored output utilities for CLI commands.
//!
//! Uses `termcolor` for cross-platform colored terminal output.
//! Respects `NO_COLOR` environment variable and `--color` flag.

use origin_pm::Severity;
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
    /// Create a new styled output with the given color choice.
    pub fn new(choice: ColorChoice) -> Self {
        Self {
            stdout: StandardStream::stdout(choice),
            stderr: StandardStream::stderr(choice),
        }
    }

    /// Write a line to stdout with a specific color and weight.
    fn writeln_styled(&mut self, text: &str, color: Option<Color>, bold: bool) {
        let mut spec = ColorSpec::new();
        spec.set_fg(color).set_bold(bold);
        let _ = self.stdout.set_color(&spec);
        let _ = writeln!(self.stdout, "{}", text);
        let _ = self.stdout.reset();
    }

    /// Green bold line.
    pub fn success(&mut self, text: &str) {
        self.writeln_styled(text, Some(Color::Green), true);
    }

    /// Cyan line.
    pub fn info(&mut self, text: &str) {
        self.writeln_styled(text, Some(Color::Cyan), false);
    }

    /// Yellow bold line.
    pub fn warning(&mut self, text: &str) {
        self.writeln_styled(text, Some(Color::Yellow), true);
    }

    /// Plain line (no color).
    pub fn plain(&mut self, text: &str) {
        let _ = writeln!(self.stdout, "{}", text);
    }

    /// Audit report line colored by severity.
    pub fn severity_line(&mut self, severity: Severity, text: &str) {
        match severity {
            Severity::Crit => self.writeln_styled(text, Some(Color::Red), true),
            Severity::Warn => self.warning(text),
            Severity::Info => self.info(text),
        }
    }

    /// Flush both streams.
    pub fn flush(&mut self) {
        let _ = self.stdout.flush();
        let _ = self.stderr.flush();
    }

    /// Red bold line on stderr.
    pub fn error(&mut self, text: &str) {
        let mut spec = ColorSpec::new();
        spec.set_fg(Some(Color::Red)).set_bold(true);
        let _ = self.stderr.set_color(&spec);
        let _ = writeln!(self.stderr, "{}", text);
        let _ = self.stderr.reset();
    }
}

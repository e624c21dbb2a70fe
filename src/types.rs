//! Diagnostic types produced by validation

use serde::{Deserialize, Serialize};

/// Diagnostics of one validation request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationResult {
    /// Whether the requested intervals are free of errors
    pub valid: bool,
    /// Diagnostics (errors and warnings), ordered by start offset
    pub diagnostics: Vec<Diagnostic>,
}

impl ValidationResult {
    /// Build a result; `valid` is derived from the diagnostics
    #[must_use]
    pub fn from_diagnostics(diagnostics: Vec<Diagnostic>) -> Self {
        let valid = !diagnostics.iter().any(Diagnostic::is_error);
        Self { valid, diagnostics }
    }

    /// Check if there are any errors
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }

    /// Check if there are any warnings
    #[must_use]
    pub fn has_warnings(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_warning)
    }

    /// Get only error diagnostics
    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.is_error())
    }

    /// Get only warning diagnostics
    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.is_warning())
    }
}

/// A diagnostic attached to a span of a document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostic {
    pub message: String,
    pub severity: DiagnosticSeverity,
    /// Start byte offset in the document
    pub start: usize,
    /// End byte offset in the document (exclusive)
    pub end: usize,
    /// Line of `start` (1-based)
    pub line: usize,
    /// Column of `start` (1-based, UTF-16 units)
    pub column: usize,
    /// Line of `end` (1-based)
    pub end_line: usize,
    /// Column of `end` (1-based, UTF-16 units)
    pub end_column: usize,
    /// Name of the rule that produced the diagnostic
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl Diagnostic {
    /// Create a diagnostic over `[start, end)`
    ///
    /// Line and column fields are left at `0` until the validation
    /// pipeline resolves them against the document.
    #[must_use]
    pub fn new(
        severity: DiagnosticSeverity,
        message: impl Into<String>,
        start: usize,
        end: usize,
    ) -> Self {
        Self {
            message: message.into(),
            severity,
            start,
            end,
            line: 0,
            column: 0,
            end_line: 0,
            end_column: 0,
            code: None,
        }
    }

    #[must_use]
    pub fn error(message: impl Into<String>, start: usize, end: usize) -> Self {
        Self::new(DiagnosticSeverity::Error, message, start, end)
    }

    #[must_use]
    pub fn warning(message: impl Into<String>, start: usize, end: usize) -> Self {
        Self::new(DiagnosticSeverity::Warning, message, start, end)
    }

    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Get the length of the diagnostic span
    #[must_use]
    pub fn length(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    #[must_use]
    pub fn is_error(&self) -> bool {
        self.severity == DiagnosticSeverity::Error
    }

    #[must_use]
    pub fn is_warning(&self) -> bool {
        self.severity == DiagnosticSeverity::Warning
    }
}

/// Severity level of a diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum DiagnosticSeverity {
    Error,
    Warning,
    Information,
    Hint,
}

impl std::fmt::Display for DiagnosticSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Error => "Error",
            Self::Warning => "Warning",
            Self::Information => "Information",
            Self::Hint => "Hint",
        };
        f.write_str(name)
    }
}

use crate::span::Span;
use serde::Serialize;
use std::fmt;

/// Diagnostic severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DiagnosticLevel {
    Error,
    Warning,
}

/// A build message anchored to a file and source range
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub level: DiagnosticLevel,
    pub file: String,
    pub span: Span,
    pub code: String,
    pub message: String,
}

impl Diagnostic {
    pub fn error(
        file: impl Into<String>,
        span: Span,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            level: DiagnosticLevel::Error,
            file: file.into(),
            span,
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn warning(
        file: impl Into<String>,
        span: Span,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            level: DiagnosticLevel::Warning,
            file: file.into(),
            span,
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.level == DiagnosticLevel::Error
    }

    /// Message text including its code, e.g. `BB1: Multiple plugins handled asset x`.
    pub fn text(&self) -> String {
        format!("{}: {}", self.code, self.message)
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.level {
            DiagnosticLevel::Error => "error",
            DiagnosticLevel::Warning => "warning",
        };
        write!(
            f,
            "{}({},{}): {} {}",
            self.file,
            self.span.line,
            self.span.column,
            level,
            self.text()
        )
    }
}

/// Message codes the engine itself reports.
pub mod codes {
    pub const MULTIPLE_RESOLVERS: &str = "BB1";
    pub const DYNAMIC_ASSET: &str = "BB2";
    pub const RESOLVER_FAILED: &str = "BB3";
    pub const MISSING_SOURCE: &str = "KB1";
}

/// Accumulated build messages with running error/warning counts.
///
/// Messages of a file are dropped with [`CompilationResult::clear_file`]
/// before that file is checked again, so a message never outlives the
/// source text that produced it.
#[derive(Debug, Default, Clone, Serialize)]
pub struct CompilationResult {
    errors: usize,
    warnings: usize,
    messages: Vec<Diagnostic>,
}

impl CompilationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, diagnostic: Diagnostic) {
        match diagnostic.level {
            DiagnosticLevel::Error => self.errors += 1,
            DiagnosticLevel::Warning => self.warnings += 1,
        }
        self.messages.push(diagnostic);
    }

    pub fn clear_file(&mut self, file: &str) {
        self.retain_files(|name| name != file);
    }

    /// Drop the messages of every file `keep` rejects
    pub fn retain_files(&mut self, keep: impl Fn(&str) -> bool) {
        let mut errors = 0;
        let mut warnings = 0;
        self.messages.retain(|m| {
            if keep(&m.file) {
                return true;
            }
            match m.level {
                DiagnosticLevel::Error => errors += 1,
                DiagnosticLevel::Warning => warnings += 1,
            }
            false
        });
        self.errors -= errors;
        self.warnings -= warnings;
    }

    pub fn has_errors(&self) -> bool {
        self.errors > 0
    }

    pub fn error_count(&self) -> usize {
        self.errors
    }

    pub fn warning_count(&self) -> usize {
        self.warnings
    }

    pub fn messages(&self) -> &[Diagnostic] {
        &self.messages
    }

    pub fn messages_for<'a>(&'a self, file: &'a str) -> impl Iterator<Item = &'a Diagnostic> + 'a {
        self.messages.iter().filter(move |m| m.file == file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostic_creation() {
        let span = Span::new(0, 5, 1, 1);
        let diag = Diagnostic::error("a.ts", span, "BB1", "Test error");

        assert_eq!(diag.level, DiagnosticLevel::Error);
        assert_eq!(diag.text(), "BB1: Test error");
        assert_eq!(diag.to_string(), "a.ts(1,1): error BB1: Test error");
    }

    #[test]
    fn test_counts() {
        let mut result = CompilationResult::new();
        let span = Span::new(0, 5, 1, 1);

        result.add(Diagnostic::error("a.ts", span, "X1", "Error 1"));
        result.add(Diagnostic::warning("a.ts", span, "X2", "Warning 1"));
        result.add(Diagnostic::error("b.ts", span, "X1", "Error 2"));

        assert_eq!(result.error_count(), 2);
        assert_eq!(result.warning_count(), 1);
        assert!(result.has_errors());
        assert_eq!(result.messages().len(), 3);
    }

    #[test]
    fn test_clear_file_drops_only_that_file() {
        let mut result = CompilationResult::new();
        let span = Span::dummy();

        result.add(Diagnostic::error("a.ts", span, "X1", "Error 1"));
        result.add(Diagnostic::warning("a.ts", span, "X2", "Warning 1"));
        result.add(Diagnostic::warning("b.ts", span, "X2", "Warning 2"));

        result.clear_file("a.ts");

        assert_eq!(result.error_count(), 0);
        assert_eq!(result.warning_count(), 1);
        assert!(!result.has_errors());
        assert_eq!(result.messages_for("b.ts").count(), 1);
        assert_eq!(result.messages_for("a.ts").count(), 0);
    }

    #[test]
    fn test_retain_files_keeps_counts_in_step() {
        let mut result = CompilationResult::new();
        let span = Span::dummy();

        result.add(Diagnostic::error("gone.ts", span, "X1", "Error 1"));
        result.add(Diagnostic::warning("app.ts", span, "X2", "Warning 1"));

        result.retain_files(|file| file == "app.ts");

        assert_eq!(result.error_count(), 0);
        assert_eq!(result.warning_count(), 1);
        assert_eq!(result.messages().len(), 1);
    }
}

// Parser error types with helpful error messages
// Provides line/column info, a source excerpt, and suggestions for common .travis.yml mistakes

use std::fmt;

/// Detailed parse error with location and context
#[derive(Debug, Clone)]
pub struct ParseError {
    /// Error message
    pub message: String,
    /// Line number (1-indexed, 0 when unknown)
    pub line: usize,
    /// Column number (1-indexed, 0 when unknown)
    pub column: usize,
    /// Surrounding context (a few lines around the error)
    pub context: String,
    /// Optional suggestion for fixing the error
    pub suggestion: Option<String>,
    /// The kind of error
    pub kind: ParseErrorKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// YAML syntax error
    YamlSyntax,
    /// Invalid schema (wrong types, missing fields)
    InvalidSchema,
    /// IO error (file not found, etc.)
    IoError,
}

impl ParseError {
    pub fn new(message: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            message: message.into(),
            line,
            column,
            context: String::new(),
            suggestion: None,
            kind: ParseErrorKind::InvalidSchema,
        }
    }

    pub fn io_error(message: impl Into<String>) -> Self {
        Self::new(message, 0, 0).with_kind(ParseErrorKind::IoError)
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn with_kind(mut self, kind: ParseErrorKind) -> Self {
        self.kind = kind;
        self
    }

    /// Create context from source content
    pub fn with_source_context(mut self, source: &str, context_lines: usize) -> Self {
        if self.line == 0 {
            return self;
        }
        let lines: Vec<&str> = source.lines().collect();
        let start = self.line.saturating_sub(context_lines + 1);
        let end = (self.line + context_lines).min(lines.len());

        let mut context = String::new();
        for (i, line) in lines.iter().enumerate().take(end).skip(start) {
            let line_num = i + 1;
            let prefix = if line_num == self.line { ">" } else { " " };
            context.push_str(&format!("{} {:4} | {}\n", prefix, line_num, line));

            if line_num == self.line && self.column > 0 {
                let indicator = " ".repeat(self.column - 1) + "^";
                context.push_str(&format!("       | {}\n", indicator));
            }
        }

        self.context = context;
        self
    }

    /// Create from serde_yaml error
    pub fn from_yaml_error(err: &serde_yaml::Error, source: &str) -> Self {
        let (line, column) = err
            .location()
            .map(|loc| (loc.line(), loc.column()))
            .unwrap_or((0, 0));

        let kind = if err.to_string().contains("invalid type")
            || err.to_string().contains("unknown field")
            || err.to_string().contains("expected a")
        {
            ParseErrorKind::InvalidSchema
        } else {
            ParseErrorKind::YamlSyntax
        };

        let mut error = ParseError::new(format_yaml_error_message(err), line, column)
            .with_kind(kind)
            .with_source_context(source, 2);
        error.suggestion = suggest_yaml_fix(err, source, line);
        error
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "error: {}", self.message)?;
        if self.line > 0 {
            writeln!(f, "  --> line {}:{}", self.line, self.column)?;
        }

        if !self.context.is_empty() {
            writeln!(f)?;
            write!(f, "{}", self.context)?;
        }

        if let Some(suggestion) = &self.suggestion {
            writeln!(f)?;
            writeln!(f, "help: {}", suggestion)?;
        }

        Ok(())
    }
}

impl std::error::Error for ParseError {}

/// Format serde_yaml error message into something more readable
fn format_yaml_error_message(err: &serde_yaml::Error) -> String {
    let msg = err.to_string();

    if msg.contains("unknown field") {
        if let Some(field) = extract_between(&msg, "unknown field `", "`") {
            return format!("unknown field '{}'", field);
        }
    }

    if msg.contains("invalid type") {
        if let (Some(found), Some(expected)) = (
            extract_between(&msg, "invalid type: ", ", expected"),
            extract_between(&msg, "expected ", " at"),
        ) {
            return format!("expected {}, but found {}", expected, found);
        }
    }

    // Drop the trailing location, it is printed separately
    match msg.find(" at line ") {
        Some(pos) => msg[..pos].to_string(),
        None => msg,
    }
}

fn extract_between(msg: &str, prefix: &str, suffix: &str) -> Option<String> {
    let start = msg.find(prefix)? + prefix.len();
    let end = msg[start..].find(suffix)? + start;
    Some(msg[start..end].to_string())
}

/// Suggest fixes for common YAML errors
fn suggest_yaml_fix(err: &serde_yaml::Error, source: &str, line: usize) -> Option<String> {
    let msg = err.to_string();
    let error_line = source
        .lines()
        .nth(line.saturating_sub(1))
        .unwrap_or_default();

    if error_line.starts_with('\t') || error_line.contains("\t-") {
        return Some(
            "YAML does not allow tabs for indentation. Replace tabs with spaces.".to_string(),
        );
    }

    if msg.contains("expected one of `global`, `matrix`") {
        return Some("`env:` as a mapping only takes `global:` and `matrix:` lists".to_string());
    }

    if msg.contains("mapping values are not allowed") && error_line.contains("if [[") {
        return Some(
            "quote commands that contain `: ` so YAML does not read them as a mapping"
                .to_string(),
        );
    }

    if msg.contains("expected a string or") {
        return Some(
            "phase commands, `python` and `env` entries must be strings or lists of strings"
                .to_string(),
        );
    }

    None
}

/// Result type for parser operations
pub type ParseResult<T> = Result<T, ParseError>;

/// How serious a validation finding is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// The configuration cannot be run
    Error,
    /// The configuration runs, but part of it is ignored or suspicious
    Warning,
}

/// Validation finding for semantic checks
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub message: String,
    pub path: String,
    pub suggestion: Option<String>,
    pub severity: Severity,
}

impl ValidationError {
    pub fn new(message: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            path: path.into(),
            suggestion: None,
            severity: Severity::Error,
        }
    }

    pub fn warning(message: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            ..Self::new(message, path)
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self.severity {
            Severity::Error => "validation error",
            Severity::Warning => "warning",
        };
        write!(f, "{} at '{}': {}", label, self.path, self.message)?;
        if let Some(suggestion) = &self.suggestion {
            write!(f, " ({})", suggestion)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_display() {
        let err = ParseError::new("expected a sequence, but found a mapping", 4, 3)
            .with_context("   3 | python:\n>  4 |   version: 2.7\n")
            .with_suggestion("list interpreter versions with `- 2.7`");

        let output = format!("{}", err);
        assert!(output.contains("expected a sequence"));
        assert!(output.contains("line 4:3"));
        assert!(output.contains("help:"));
    }

    #[test]
    fn test_parse_error_with_source_context() {
        let source = "language: python\npython:\n  - 2.7\nenv:\n  - A=1\n";

        let err = ParseError::new("bad entry", 3, 5).with_source_context(source, 1);

        assert!(err.context.contains(">    3 |   - 2.7"));
        assert!(err.context.contains("python:"));
        assert!(err.context.contains("env:"));
        assert!(err.context.contains("^"));
    }

    #[test]
    fn test_io_error_has_no_location() {
        let err = ParseError::io_error("failed to read file: missing");
        let output = err.to_string();
        assert_eq!(err.kind, ParseErrorKind::IoError);
        assert!(!output.contains("-->"));
    }

    #[test]
    fn test_from_yaml_error_on_bad_python_entry() {
        let source = "python:\n  - version: 2.7\n";
        let yaml_err =
            serde_yaml::from_str::<crate::parser::models::TravisConfig>(source).unwrap_err();
        let err = ParseError::from_yaml_error(&yaml_err, source);
        assert!(err.message.contains("string or number"));
        assert!(err.suggestion.is_some());
    }

    #[test]
    fn test_extract_between() {
        let msg = "unknown field `globals` at line 10";
        assert_eq!(
            extract_between(msg, "unknown field `", "`"),
            Some("globals".to_string())
        );
    }

    #[test]
    fn test_validation_warning_display() {
        let warning = ValidationError::warning("key is ignored", "after_success")
            .with_suggestion("after_* hooks are not run");
        assert!(!warning.is_error());
        assert_eq!(
            warning.to_string(),
            "warning at 'after_success': key is ignored (after_* hooks are not run)"
        );
    }
}

use std::path::PathBuf;

use colored::Colorize;
use thiserror::Error;

use self::lexer::Span;

pub mod ast;
pub mod intern;
pub mod lexer;
pub mod parser;

#[derive(Debug)]
pub struct SourceFile {
    pub contents: String,
    pub origin: SourceFileOrigin,
}

impl SourceFile {
    pub fn new_in_memory(contents: impl Into<String>) -> Self {
        Self {
            contents: contents.into(),
            origin: SourceFileOrigin::Memory,
        }
    }

    pub fn value_of_span(&self, span: Span) -> &str {
        &self.contents[span.start..span.end]
    }

    /// 1-based line number of a byte position
    pub fn row_for_position(&self, position: usize) -> usize {
        self.contents[..position.min(self.contents.len())]
            .bytes()
            .filter(|b| *b == b'\n')
            .count()
            + 1
    }

    /// 1-based column number of a byte position
    pub fn column_for_position(&self, position: usize) -> usize {
        let position = position.min(self.contents.len());
        let line_start = self.contents[..position]
            .rfind('\n')
            .map(|i| i + 1)
            .unwrap_or(0);

        self.contents[line_start..position].chars().count() + 1
    }

    /// Prints the line containing the span to stderr with a caret marker
    /// underneath the offending region
    pub fn highlight_span(&self, span: Span) {
        let start = span.start.min(self.contents.len());
        let line_start = self.contents[..start]
            .rfind('\n')
            .map(|i| i + 1)
            .unwrap_or(0);
        let line_end = self.contents[line_start..]
            .find('\n')
            .map(|i| line_start + i)
            .unwrap_or(self.contents.len());

        let line = &self.contents[line_start..line_end];
        let offset = self.contents[line_start..start].chars().count();
        let width = self
            .value_of_span(Span::new(start, span.end.min(line_end)))
            .chars()
            .count()
            .max(1);

        eprintln!("  {line}");
        eprintln!("  {}{}", " ".repeat(offset), "^".repeat(width).red());
    }
}

#[derive(Debug)]
pub enum SourceFileOrigin {
    Memory,
    File(PathBuf),
}

impl core::fmt::Display for SourceFileOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceFileOrigin::Memory => f.write_str("<memory>"),
            SourceFileOrigin::File(path) => f.write_fmt(format_args!("{}", path.display())),
        }
    }
}

/// A lexing or parsing failure. The first one encountered aborts the whole
/// parse; there is no recovery.
#[derive(Debug, Clone, Error)]
#[error("line {line}, column {column}: {message}")]
pub struct SyntaxError {
    pub message: String,
    pub line: usize,
    pub column: usize,
    pub span: Span,
}

impl SyntaxError {
    pub fn new(source: &SourceFile, span: Span, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            line: source.row_for_position(span.start),
            column: source.column_for_position(span.start),
            span,
        }
    }
}

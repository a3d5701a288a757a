use thiserror::Error;

use crate::frontend::{SourceFile, lexer::Span};

pub mod analyze;
pub mod ir;
pub mod optimize;
pub mod ty;

/// A rule violation found while checking a parsed program. Like syntax
/// errors, the first one encountered aborts the pipeline.
#[derive(Debug, Clone, Error)]
#[error("line {line}, column {column}: {message}")]
pub struct SemanticError {
    pub message: String,
    pub line: usize,
    pub column: usize,
    pub span: Span,
}

impl SemanticError {
    pub fn new(source: &SourceFile, span: Span, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            line: source.row_for_position(span.start),
            column: source.column_for_position(span.start),
            span,
        }
    }
}

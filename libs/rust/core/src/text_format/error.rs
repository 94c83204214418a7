//! Text-format parse errors

use std::fmt;
use thiserror::Error;

/// 1-based line/column of a token in the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub fn locate(source: &str, offset: usize) -> Self {
        let offset = offset.min(source.len());
        let before = source.get(..offset).unwrap_or(source);
        let line = before.matches('\n').count() + 1;
        let line_start = before.rfind('\n').map(|i| i + 1).unwrap_or(0);
        let column = before[line_start..].chars().count() + 1;
        Self { line, column }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    #[error("{position}: expected {expected}, found {found}")]
    UnexpectedToken {
        position: Position,
        expected: String,
        found: String,
    },

    #[error("unexpected end of input, expected {expected}")]
    UnexpectedEof { expected: String },

    #[error("{position}: invalid input `{text}`")]
    InvalidToken { position: Position, text: String },

    #[error("{position}: message `{message}` has no field named `{field}`")]
    UnknownField {
        position: Position,
        message: &'static str,
        field: String,
    },

    #[error("{position}: non-repeated field `{field}` of `{message}` is set more than once")]
    DuplicateField {
        position: Position,
        message: &'static str,
        field: &'static str,
    },

    #[error("{position}: field `{field}` of `{message}` is in the same oneof as `{other}`, which is already set")]
    OneofConflict {
        position: Position,
        message: &'static str,
        field: &'static str,
        other: &'static str,
    },

    #[error("{position}: invalid value for `{field}`: {reason}")]
    InvalidValue {
        position: Position,
        field: &'static str,
        reason: String,
    },

    #[error("{position}: invalid string literal: {reason}")]
    InvalidString { position: Position, reason: String },
}

impl ParseError {
    pub fn position(&self) -> Option<Position> {
        match self {
            ParseError::UnexpectedEof { .. } => None,
            ParseError::UnexpectedToken { position, .. }
            | ParseError::InvalidToken { position, .. }
            | ParseError::UnknownField { position, .. }
            | ParseError::DuplicateField { position, .. }
            | ParseError::OneofConflict { position, .. }
            | ParseError::InvalidValue { position, .. }
            | ParseError::InvalidString { position, .. } => Some(*position),
        }
    }
}

pub type ParseResult<T> = Result<T, ParseError>;

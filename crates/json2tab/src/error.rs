//! Error types for parsing and for the surrounding tooling.

use std::io;
use std::path::PathBuf;

/// An error raised while tokenizing or structurally validating JSON input.
///
/// Carries the source position at which the parser stopped. Truncated and
/// malformed input are recoverable conditions for the callers in this crate:
/// they stop the current pass, keep whatever was produced so far and warn.
/// I/O failures on the underlying reader are not recoverable.
#[derive(Debug, thiserror::Error)]
#[error("{kind} at line {line}, column {column}")]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum ParseErrorKind {
    #[error("invalid character {0:?}")]
    InvalidChar(char),
    #[error("unexpected end of input")]
    UnexpectedEof,
    #[error("invalid UTF-8 in input")]
    InvalidUtf8,
    #[error("{0}")]
    Syntax(String),
    #[error("failed to read input")]
    Io(#[source] io::Error),
}

impl ParseError {
    /// Whether the surrounding pass may keep its partial results and
    /// continue to the flush stage.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        !matches!(self.kind, ParseErrorKind::Io(_))
    }

    /// True when the input simply ended mid-value or mid-structure.
    #[must_use]
    pub fn is_truncation(&self) -> bool {
        matches!(self.kind, ParseErrorKind::UnexpectedEof)
    }
}

/// Top-level error type for schema discovery, flattening and mapping
/// persistence.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("input file {path:?} does not end in .json or .json.gz")]
    BadExtension { path: PathBuf },

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("failed to write CSV for table {table:?}")]
    Csv {
        table: String,
        #[source]
        source: csv::Error,
    },

    #[error("failed to parse mapping file {path:?}")]
    MappingFormat {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("mapping file names table {table:?}, which is not a top-level key of the input")]
    UnknownMappingTable { table: String },

    #[error("identifier {identifier:?} is missing from table {table:?} in the mapping file")]
    MissingIdentifier { identifier: String, table: String },

    #[error("no columns mapped for table {table:?}")]
    UnmappedTable { table: String },

    #[error("writer for table {table:?} stopped unexpectedly")]
    WriterStopped { table: String },
}

//! Events emitted by the streaming parser.
//!
//! [`ParseEvent`] enumerates parser outputs, each carrying the path to the
//! value within the current top-level document. [`PathComponent`] is one
//! step of such a path: an object key or an array index.

use std::fmt;

/// A component in the path to a JSON value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathComponent {
    Key(String),
    Index(usize),
}

impl fmt::Display for PathComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathComponent::Key(k) => f.write_str(k),
            PathComponent::Index(i) => write!(f, "{i}"),
        }
    }
}

impl From<&str> for PathComponent {
    fn from(s: &str) -> Self {
        Self::Key(s.to_string())
    }
}

impl From<usize> for PathComponent {
    fn from(i: usize) -> Self {
        Self::Index(i)
    }
}

/// Render a path as a dotted string, with array indices in decimal.
///
/// `[Key("a"), Index(0), Key("b")]` renders as `a.0.b`; the empty path
/// renders as the empty string.
#[must_use]
pub fn join_dotted(path: &[PathComponent]) -> String {
    use fmt::Write as _;

    let mut out = String::new();
    for (i, component) in path.iter().enumerate() {
        if i > 0 {
            out.push('.');
        }
        let _ = write!(out, "{component}");
    }
    out
}

/// An event generated by the streaming JSON parser.
///
/// The `path` locates the value within the current top-level document. For
/// scalars it includes the final key or index; for containers it is the
/// container's own location; for [`ParseEvent::MapKey`] it is the location
/// of the object the key belongs to. Number values carry the raw input
/// lexeme rather than a parsed float so the textual form survives into the
/// output.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseEvent {
    MapKey { path: Vec<PathComponent>, key: String },
    StartMap { path: Vec<PathComponent> },
    EndMap { path: Vec<PathComponent> },
    StartArray { path: Vec<PathComponent> },
    EndArray { path: Vec<PathComponent> },
    String { path: Vec<PathComponent>, value: String },
    Number { path: Vec<PathComponent>, value: String },
    Boolean { path: Vec<PathComponent>, value: bool },
    Null { path: Vec<PathComponent> },
}

impl ParseEvent {
    #[must_use]
    pub fn path(&self) -> &[PathComponent] {
        match self {
            ParseEvent::MapKey { path, .. }
            | ParseEvent::StartMap { path }
            | ParseEvent::EndMap { path }
            | ParseEvent::StartArray { path }
            | ParseEvent::EndArray { path }
            | ParseEvent::String { path, .. }
            | ParseEvent::Number { path, .. }
            | ParseEvent::Boolean { path, .. }
            | ParseEvent::Null { path } => path,
        }
    }
}

//! Flatten streams of top-level JSON objects into per-table CSV files.
//!
//! The input is a concatenation of JSON objects (optionally
//! gzip-compressed). Each selected top-level key becomes a table: one CSV
//! file whose columns are the union of all dotted leaf paths observed under
//! that key, with array elements addressed by decimal index (`items.1.k`).
//! Selected identifier keys are replicated into every table's rows.
//!
//! Processing happens in two stages over the same bytes:
//!
//! 1. [`Mapping::discover`] fixes the table set and the per-table column
//!    layout, counting records along the way.
//! 2. [`flatten`] materializes one row per table per object and streams the
//!    rows to per-table writer workers in chunks.
//!
//! ```no_run
//! use json2tab::{FileSet, Input, Mapping, flatten};
//!
//! # fn main() -> Result<(), json2tab::Error> {
//! let input = Input::new("data/records.json")?;
//! let identifiers = vec!["id".to_string()];
//! let mut mapping = Mapping::discover(&input, &[], &identifiers, |_| {})?;
//! mapping.drop_empty(identifiers.len());
//! let files = FileSet::create(&mapping, "out", input.stem(), false)?;
//! flatten(&input, &mapping, &identifiers, files, 500, |_| {})?;
//! # Ok(())
//! # }
//! ```

mod buffer;
mod error;
mod escape;
mod event;
mod flatten;
mod input;
mod parser;
mod rows;
mod schema;
mod sink;
mod stream;

pub use error::{Error, ParseError, ParseErrorKind};
pub use event::{ParseEvent, PathComponent, join_dotted};
pub use flatten::{FlattenStats, flatten};
pub use input::Input;
pub use parser::{Poll, StreamingParser};
pub use rows::{Row, RowBuffer};
pub use schema::Mapping;
pub use sink::{FileSet, TableSink};
pub use stream::{EventKind, EventStream, TokenEvent};

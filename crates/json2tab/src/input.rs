//! Input file handling.
//!
//! The input is a file of whitespace-separated top-level JSON objects,
//! plain (`.json`) or gzip-compressed (`.json.gz`). Schema discovery runs
//! two passes over the same bytes, so [`Input::events`] opens a fresh
//! reader each time rather than seeking; that keeps gzip sources cheap to
//! restart.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use tracing::warn;

use crate::error::Error;
use crate::stream::{EventKind, EventStream};

/// A validated input file path.
#[derive(Debug, Clone)]
pub struct Input {
    path: PathBuf,
    gzip: bool,
}

impl Input {
    /// Validate the extension and wrap the path.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BadExtension`] unless the path ends in `.json` or
    /// `.json.gz`.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, Error> {
        let path = path.into();
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
        if name.ends_with(".json.gz") {
            Ok(Self { path, gzip: true })
        } else if name.ends_with(".json") {
            Ok(Self { path, gzip: false })
        } else {
            Err(Error::BadExtension { path })
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name without the `.json` or `.json.gz` extension, used to name
    /// the output files.
    #[must_use]
    pub fn stem(&self) -> &str {
        let name = self
            .path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        name.strip_suffix(".json.gz")
            .or_else(|| name.strip_suffix(".json"))
            .unwrap_or(name)
    }

    /// Open a fresh reader over the decompressed bytes.
    ///
    /// # Errors
    ///
    /// Fails when the file cannot be opened.
    pub fn open(&self) -> Result<Box<dyn Read + Send>, Error> {
        let file = File::open(&self.path)?;
        if self.gzip {
            Ok(Box::new(GzDecoder::new(BufReader::new(file))))
        } else {
            Ok(Box::new(file))
        }
    }

    /// Open a fresh event stream from the start of the input.
    ///
    /// # Errors
    ///
    /// Fails when the file cannot be opened.
    pub fn events(&self) -> Result<EventStream<Box<dyn Read + Send>>, Error> {
        Ok(EventStream::new(self.open()?))
    }

    /// The top-level keys of the first object in the file, in order.
    ///
    /// A truncated or malformed first object yields the keys seen so far
    /// with a warning; the callers validate selections against this list.
    ///
    /// # Errors
    ///
    /// Fails when the file cannot be opened or read.
    pub fn top_keys(&self) -> Result<Vec<String>, Error> {
        let mut keys = Vec::new();
        for item in self.events()? {
            let event = match item {
                Ok(event) => event,
                Err(err) if err.is_recoverable() => {
                    warn!(error = %err, "input ended while reading the first object");
                    break;
                }
                Err(err) => return Err(err.into()),
            };
            if event.prefix.is_empty() && event.kind == EventKind::MapKey {
                if let Some(key) = event.value {
                    keys.push(key);
                }
            } else if event.is_record_end() {
                break;
            }
        }
        Ok(keys)
    }
}

//! CSV output sinks, one per table.
//!
//! A path ending in `.gz` gets a gzip-wrapped writer, anything else a plain
//! file. Each sink is owned by exactly one writer worker during flattening;
//! [`TableSink::finish`] flushes the CSV buffer and finalizes the gzip
//! trailer where applicable.

use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use flate2::Compression;
use flate2::write::GzEncoder;
use indexmap::IndexMap;

use crate::error::Error;
use crate::rows::Row;
use crate::schema::Mapping;

enum SinkWriter {
    Plain(File),
    Gzip(GzEncoder<File>),
}

impl Write for SinkWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            SinkWriter::Plain(w) => w.write(buf),
            SinkWriter::Gzip(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            SinkWriter::Plain(w) => w.flush(),
            SinkWriter::Gzip(w) => w.flush(),
        }
    }
}

/// A CSV writer bound to one table's output file.
pub struct TableSink {
    table: String,
    path: PathBuf,
    writer: csv::Writer<SinkWriter>,
}

impl TableSink {
    /// Create the output file, gzip-wrapped when `path` ends in `.gz`.
    ///
    /// # Errors
    ///
    /// Fails when the file cannot be created.
    pub fn create(table: impl Into<String>, path: impl Into<PathBuf>) -> Result<Self, Error> {
        let table = table.into();
        let path = path.into();
        let file = File::create(&path)?;
        let writer = if path.extension().is_some_and(|ext| ext == "gz") {
            SinkWriter::Gzip(GzEncoder::new(file, Compression::default()))
        } else {
            SinkWriter::Plain(file)
        };
        Ok(Self {
            table,
            path,
            writer: csv::Writer::from_writer(writer),
        })
    }

    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the header row.
    ///
    /// # Errors
    ///
    /// Fails on CSV or I/O errors.
    pub fn write_header<'a>(
        &mut self,
        columns: impl IntoIterator<Item = &'a String>,
    ) -> Result<(), Error> {
        self.writer
            .write_record(columns.into_iter().map(String::as_str))
            .map_err(|source| Error::Csv {
                table: self.table.clone(),
                source,
            })
    }

    /// Write a batch of rows; missing cells become empty fields.
    ///
    /// # Errors
    ///
    /// Fails on CSV or I/O errors.
    pub fn write_rows(&mut self, rows: impl IntoIterator<Item = Row>) -> Result<(), Error> {
        for row in rows {
            self.writer
                .write_record(row.iter().map(|cell| cell.as_deref().unwrap_or("")))
                .map_err(|source| Error::Csv {
                    table: self.table.clone(),
                    source,
                })?;
        }
        Ok(())
    }

    /// Flush buffered output and finalize the file.
    ///
    /// # Errors
    ///
    /// Fails on I/O errors while flushing or writing the gzip trailer.
    pub fn finish(mut self) -> Result<(), Error> {
        self.writer.flush()?;
        let inner = self
            .writer
            .into_inner()
            .map_err(|err| io::Error::other(err.to_string()))?;
        match inner {
            SinkWriter::Plain(mut file) => file.flush()?,
            SinkWriter::Gzip(encoder) => {
                encoder.finish()?.flush()?;
            }
        }
        Ok(())
    }
}

/// The set of open output files for one run, keyed by table name and in
/// mapping order.
pub struct FileSet {
    sinks: IndexMap<String, TableSink>,
}

impl FileSet {
    /// Create one sink per mapped table, named
    /// `<stem>_<table>.csv[.gz]` inside `out_dir`.
    ///
    /// # Errors
    ///
    /// Fails when any output file cannot be created.
    pub fn create(
        mapping: &Mapping,
        out_dir: impl AsRef<Path>,
        stem: &str,
        compress: bool,
    ) -> Result<Self, Error> {
        let out_dir = out_dir.as_ref();
        let extension = if compress { "csv.gz" } else { "csv" };
        let mut sinks = IndexMap::new();
        for table in mapping.table_names() {
            let path = out_dir.join(format!("{stem}_{table}.{extension}"));
            sinks.insert(table.to_string(), TableSink::create(table, path)?);
        }
        Ok(Self { sinks })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.sinks.values().map(TableSink::path)
    }
}

impl IntoIterator for FileSet {
    type Item = (String, TableSink);
    type IntoIter = indexmap::map::IntoIter<String, TableSink>;

    fn into_iter(self) -> Self::IntoIter {
        self.sinks.into_iter()
    }
}

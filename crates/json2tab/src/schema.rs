//! Two-pass schema discovery and mapping persistence.
//!
//! A [`Mapping`] fixes, for every selected table, the ordered set of CSV
//! columns before any row is written. Pass 1 reads the first top-level
//! object to establish the table set; pass 2 reads the whole input to union
//! the dotted leaf paths per table and to count records. Identifier columns
//! are inserted ahead of the data columns, in the user's order. The mapping
//! is frozen once built.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::Error;
use crate::input::Input;
use crate::stream::EventKind;

/// On-disk form of a mapping: `{ table: [column, ...], ... }`.
#[derive(Debug, Serialize, Deserialize)]
#[serde(transparent)]
struct MappingDoc {
    tables: IndexMap<String, IndexSet<String>>,
}

/// Frozen table-to-columns mapping plus the record count from pass 2.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mapping {
    tables: IndexMap<String, IndexSet<String>>,
    record_count: u64,
}

impl Mapping {
    /// Build a mapping from the input in two passes.
    ///
    /// An empty `selection` selects every non-identifier top-level key of
    /// the first object. `progress` is called with the running record count
    /// during pass 2.
    ///
    /// Truncated or malformed input stops the affected pass with a warning
    /// and keeps the partial result.
    ///
    /// # Errors
    ///
    /// Fails only on I/O errors opening or reading the input.
    pub fn discover(
        input: &Input,
        selection: &[String],
        identifiers: &[String],
        mut progress: impl FnMut(u64),
    ) -> Result<Self, Error> {
        let mut tables: IndexMap<String, IndexSet<String>> = IndexMap::new();

        // Pass 1: table set from the first object's top-level keys.
        for item in input.events()? {
            let event = match item {
                Ok(event) => event,
                Err(err) if err.is_recoverable() => {
                    warn!(error = %err, "input ended during table discovery");
                    break;
                }
                Err(err) => return Err(err.into()),
            };
            if event.prefix.is_empty() && event.kind == EventKind::MapKey {
                let Some(key) = event.value else { continue };
                if identifiers.contains(&key) {
                    continue;
                }
                if selection.is_empty() || selection.contains(&key) {
                    tables.entry(key).or_default();
                }
            } else if event.is_record_end() {
                break;
            }
        }

        // Identifier columns lead every table.
        for columns in tables.values_mut() {
            for identifier in identifiers {
                columns.insert(identifier.clone());
            }
        }

        // Pass 2: union of dotted leaf paths per table, plus record count.
        let mut record_count = 0;
        for item in input.events()? {
            let event = match item {
                Ok(event) => event,
                Err(err) if err.is_recoverable() => {
                    warn!(error = %err, "input ended during column discovery");
                    break;
                }
                Err(err) => return Err(err.into()),
            };
            if event.is_value_scalar() {
                if identifiers.contains(&event.base_prefix) {
                    continue;
                }
                if let Some(columns) = tables.get_mut(&event.base_prefix) {
                    columns.insert(event.prefix);
                }
            } else if event.is_record_end() {
                record_count += 1;
                progress(record_count);
            }
        }

        Ok(Self {
            tables,
            record_count,
        })
    }

    /// Load a previously saved mapping document.
    ///
    /// Every table in the document must be a top-level key of the current
    /// input, and every configured identifier must appear in every table's
    /// columns.
    ///
    /// # Errors
    ///
    /// Fails on unreadable or malformed documents and on validation
    /// mismatches against `top_keys` or `identifiers`.
    pub fn load(
        path: impl AsRef<Path>,
        top_keys: &[String],
        identifiers: &[String],
    ) -> Result<Self, Error> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let doc: MappingDoc =
            serde_json::from_reader(BufReader::new(file)).map_err(|source| {
                Error::MappingFormat {
                    path: path.to_path_buf(),
                    source,
                }
            })?;

        for (table, columns) in &doc.tables {
            if !top_keys.contains(table) {
                return Err(Error::UnknownMappingTable {
                    table: table.clone(),
                });
            }
            for identifier in identifiers {
                if !columns.contains(identifier) {
                    return Err(Error::MissingIdentifier {
                        identifier: identifier.clone(),
                        table: table.clone(),
                    });
                }
            }
        }

        Ok(Self {
            tables: doc.tables,
            record_count: 0,
        })
    }

    /// Write the mapping document.
    ///
    /// # Errors
    ///
    /// Fails when the file cannot be created or written.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Error> {
        let file = File::create(path.as_ref())?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, &self.tables)
            .map_err(std::io::Error::other)?;
        writer.flush()?;
        Ok(())
    }

    /// Remove tables that gathered no data columns, returning their names.
    pub fn drop_empty(&mut self, identifier_count: usize) -> Vec<String> {
        let empty: Vec<String> = self
            .tables
            .iter()
            .filter(|(_, columns)| columns.len() == identifier_count)
            .map(|(table, _)| table.clone())
            .collect();
        for table in &empty {
            self.tables.shift_remove(table);
        }
        empty
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// Total top-level objects counted during pass 2; zero for mappings
    /// loaded from a file.
    #[must_use]
    pub fn record_count(&self) -> u64 {
        self.record_count
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &IndexSet<String>)> {
        self.tables.iter().map(|(table, columns)| (table.as_str(), columns))
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    #[must_use]
    pub fn columns(&self, table: &str) -> Option<&IndexSet<String>> {
        self.tables.get(table)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::Mapping;
    use crate::input::Input;

    fn write_input(dir: &tempfile::TempDir, name: &str, content: &str) -> Input {
        let path = dir.path().join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
        Input::new(path).unwrap()
    }

    fn columns_of(mapping: &Mapping, table: &str) -> Vec<String> {
        mapping
            .columns(table)
            .unwrap()
            .iter()
            .cloned()
            .collect()
    }

    #[test]
    fn union_across_objects() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_input(
            &dir,
            "in.json",
            r#"{"site":{"name":"S"},"id":"1"} {"site":{"name":"T","lat":"2"},"id":"2"}"#,
        );
        let ids = vec!["id".to_string()];
        let mapping = Mapping::discover(&input, &[], &ids, |_| {}).unwrap();
        assert_eq!(
            columns_of(&mapping, "site"),
            vec!["id", "site.name", "site.lat"]
        );
        assert_eq!(mapping.record_count(), 2);
    }

    #[test]
    fn selection_restricts_tables() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_input(&dir, "in.json", r#"{"a":{"x":1},"b":{"y":2},"id":"1"}"#);
        let selection = vec!["a".to_string()];
        let ids = vec!["id".to_string()];
        let mapping = Mapping::discover(&input, &selection, &ids, |_| {}).unwrap();
        assert_eq!(mapping.table_names().collect::<Vec<_>>(), vec!["a"]);
    }

    #[test]
    fn empty_selection_takes_all_non_identifier_keys() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_input(&dir, "in.json", r#"{"a":{"x":1},"b":{"y":2},"id":"1"}"#);
        let ids = vec!["id".to_string()];
        let mapping = Mapping::discover(&input, &[], &ids, |_| {}).unwrap();
        assert_eq!(mapping.table_names().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn scalar_table_gets_single_column() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_input(&dir, "in.json", r#"{"a":"plain","id":"1"}"#);
        let ids = vec!["id".to_string()];
        let mapping = Mapping::discover(&input, &[], &ids, |_| {}).unwrap();
        assert_eq!(columns_of(&mapping, "a"), vec!["id", "a"]);
    }

    #[test]
    fn drop_empty_removes_dataless_tables() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_input(&dir, "in.json", r#"{"a":{"x":1},"b":null,"id":"1"}"#);
        let ids = vec!["id".to_string()];
        let mut mapping = Mapping::discover(&input, &[], &ids, |_| {}).unwrap();
        assert_eq!(mapping.drop_empty(ids.len()), vec!["b"]);
        assert_eq!(mapping.table_names().collect::<Vec<_>>(), vec!["a"]);
    }

    #[test]
    fn discovery_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_input(
            &dir,
            "in.json",
            r#"{"a":["x","y"],"id":"1"} {"a":["x","y","z"],"id":"2"}"#,
        );
        let ids = vec!["id".to_string()];
        let first = Mapping::discover(&input, &[], &ids, |_| {}).unwrap();
        let second = Mapping::discover(&input, &[], &ids, |_| {}).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_input(
            &dir,
            "in.json",
            r#"{"site":{"name":"S","loc":{"lat":"1"}},"id":"7"}"#,
        );
        let ids = vec!["id".to_string()];
        let mapping = Mapping::discover(&input, &[], &ids, |_| {}).unwrap();

        let doc = dir.path().join("in_mappings.json");
        mapping.save(&doc).unwrap();
        let loaded = Mapping::load(&doc, &["site".to_string(), "id".to_string()], &ids).unwrap();
        assert_eq!(
            columns_of(&loaded, "site"),
            vec!["id", "site.name", "site.loc.lat"]
        );
    }

    #[test]
    fn load_rejects_unknown_table() {
        let dir = tempfile::tempdir().unwrap();
        let doc = dir.path().join("m.json");
        std::fs::write(&doc, r#"{"ghost":["id","ghost.x"]}"#).unwrap();
        let err = Mapping::load(&doc, &["site".to_string()], &["id".to_string()]).unwrap_err();
        assert!(matches!(
            err,
            crate::error::Error::UnknownMappingTable { .. }
        ));
    }

    #[test]
    fn load_rejects_missing_identifier() {
        let dir = tempfile::tempdir().unwrap();
        let doc = dir.path().join("m.json");
        std::fs::write(&doc, r#"{"site":["site.name"]}"#).unwrap();
        let err = Mapping::load(&doc, &["site".to_string()], &["id".to_string()]).unwrap_err();
        assert!(matches!(err, crate::error::Error::MissingIdentifier { .. }));
    }

    #[test]
    fn truncated_input_keeps_partial_mapping() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_input(
            &dir,
            "in.json",
            r#"{"a":{"x":1},"id":"1"} {"a":{"x":2},"y":"#,
        );
        let ids = vec!["id".to_string()];
        let mapping = Mapping::discover(&input, &[], &ids, |_| {}).unwrap();
        assert_eq!(columns_of(&mapping, "a"), vec!["id", "a.x"]);
        assert_eq!(mapping.record_count(), 1);
    }
}

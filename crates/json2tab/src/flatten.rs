//! The flatten pass: one row per table per top-level object.
//!
//! The producer drives the event stream on the calling thread, filling one
//! partial row per table and snapshotting all of them into the row buffer
//! at each object boundary. Once the buffer holds `chunk_size` rows, each
//! table's queue is handed to that table's writer worker over a bounded
//! channel; the handoff transfers ownership, so no rows are shared across
//! threads. Per-table row order on disk equals input order.
//!
//! A second scalar arriving for an already-filled cell is a structural
//! violation: the record is dropped with a diagnostic and processing
//! resumes at the next object boundary. Truncated or malformed input stops
//! the producer with a warning; everything buffered so far is still
//! written. Writer I/O errors are fatal.

use std::collections::VecDeque;
use std::mem;
use std::thread;

use crossbeam_channel::{Sender, bounded};
use indexmap::{IndexMap, IndexSet};
use tracing::warn;

use crate::error::Error;
use crate::input::Input;
use crate::rows::{Row, RowBuffer};
use crate::schema::Mapping;
use crate::sink::FileSet;

/// Outcome of a completed flatten pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlattenStats {
    /// Top-level objects consumed.
    pub records: u64,
    /// Records dropped after a structural violation.
    pub dropped_records: u64,
}

struct TableState<'m> {
    columns: &'m IndexSet<String>,
    /// Column position of each configured identifier, in identifier order.
    identifier_cells: Vec<Option<usize>>,
    partial: Row,
    sender: Sender<VecDeque<Row>>,
}

fn dispatch(states: &IndexMap<String, TableState<'_>>, buffer: &mut RowBuffer) -> Result<(), String> {
    for (table, state) in states {
        let rows = buffer.take(table);
        if rows.is_empty() {
            continue;
        }
        if state.sender.send(rows).is_err() {
            return Err(table.clone());
        }
    }
    Ok(())
}

/// Flatten the input into the given sinks using a frozen mapping.
///
/// `files` must contain one sink per mapped table. `progress` is called
/// with the running record count at every object boundary.
///
/// # Errors
///
/// Fails on writer I/O errors, on I/O errors reading the input and on a
/// sink without a mapped table. Truncated or malformed JSON is not an
/// error; the pass warns and keeps what it produced.
pub fn flatten(
    input: &Input,
    mapping: &Mapping,
    identifiers: &[String],
    files: FileSet,
    chunk_size: usize,
    mut progress: impl FnMut(u64),
) -> Result<FlattenStats, Error> {
    thread::scope(|scope| -> Result<FlattenStats, Error> {
        let mut workers = Vec::with_capacity(files.len());
        let mut states: IndexMap<String, TableState<'_>> = IndexMap::new();

        for (table, mut sink) in files {
            let Some(columns) = mapping.columns(&table) else {
                return Err(Error::UnmappedTable { table });
            };
            sink.write_header(columns)?;

            let (sender, receiver) = bounded::<VecDeque<Row>>(1);
            let handle = scope.spawn(move || -> Result<(), Error> {
                for rows in receiver {
                    sink.write_rows(rows)?;
                }
                sink.finish()
            });
            workers.push((table.clone(), handle));

            let identifier_cells = identifiers
                .iter()
                .map(|id| columns.get_index_of(id.as_str()))
                .collect();
            states.insert(
                table,
                TableState {
                    columns,
                    identifier_cells,
                    partial: vec![None; columns.len()],
                    sender,
                },
            );
        }

        let mut buffer = RowBuffer::new(states.keys().map(String::as_str));
        let mut id_values: Vec<Option<String>> = vec![None; identifiers.len()];
        let mut stats = FlattenStats::default();
        let mut poisoned = false;
        let mut produce_error: Option<Error> = None;

        match input.events() {
            Err(err) => produce_error = Some(err),
            Ok(mut events) => {
                for item in &mut events {
                    let event = match item {
                        Ok(event) => event,
                        Err(err) if err.is_recoverable() => {
                            warn!(error = %err, "stopping early on unreadable input");
                            break;
                        }
                        Err(err) => {
                            produce_error = Some(err.into());
                            break;
                        }
                    };

                    if event.is_value_scalar() {
                        let Some(value) = event.value else { continue };
                        let base_prefix = event.base_prefix;
                        let prefix = event.prefix;

                        if let Some(idx) =
                            identifiers.iter().position(|id| *id == base_prefix)
                        {
                            if id_values[idx].is_none() {
                                id_values[idx] = Some(value);
                            }
                            continue;
                        }
                        if poisoned {
                            continue;
                        }
                        if let Some(state) = states.get_mut(base_prefix.as_str()) {
                            if let Some(col) = state.columns.get_index_of(prefix.as_str()) {
                                if state.partial[col].is_some() {
                                    warn!(
                                        table = %base_prefix,
                                        column = %prefix,
                                        record = stats.records + 1,
                                        "duplicate value for column, dropping record"
                                    );
                                    poisoned = true;
                                } else {
                                    state.partial[col] = Some(value);
                                }
                            }
                        }
                    } else if event.is_record_end() {
                        stats.records += 1;
                        progress(stats.records);

                        if poisoned {
                            stats.dropped_records += 1;
                            for state in states.values_mut() {
                                state.partial.iter_mut().for_each(|cell| *cell = None);
                            }
                            poisoned = false;
                        } else {
                            for (table, state) in &mut states {
                                for (idx, col) in state.identifier_cells.iter().enumerate() {
                                    if let Some(col) = *col {
                                        state.partial[col] = id_values[idx].clone();
                                    }
                                }
                                let columns = state.columns.len();
                                let row = mem::replace(&mut state.partial, vec![None; columns]);
                                buffer.append(table, row);
                            }
                        }
                        id_values.iter_mut().for_each(|value| *value = None);

                        if buffer.size() >= chunk_size {
                            if let Err(table) = dispatch(&states, &mut buffer) {
                                produce_error = Some(Error::WriterStopped { table });
                                break;
                            }
                        }
                    }
                }
            }
        }

        if produce_error.is_none() && buffer.size() > 0 {
            if let Err(table) = dispatch(&states, &mut buffer) {
                produce_error = Some(Error::WriterStopped { table });
            }
        }

        // Closing the senders lets every worker drain and finalize its file,
        // on the error path as well.
        drop(states);

        let mut worker_error: Option<Error> = None;
        for (table, handle) in workers {
            match handle.join() {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    worker_error.get_or_insert(err);
                }
                Err(_) => {
                    worker_error.get_or_insert(Error::WriterStopped { table });
                }
            }
        }

        // A failed send means its worker already exited, so the join error
        // carries the root cause; report it ahead of the producer's marker.
        if let Some(err) = worker_error {
            return Err(err);
        }
        if let Some(err) = produce_error {
            return Err(err);
        }
        Ok(stats)
    })
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::flatten;
    use crate::input::Input;
    use crate::schema::Mapping;
    use crate::sink::FileSet;

    fn run(
        dir: &tempfile::TempDir,
        content: &str,
        identifiers: &[&str],
        chunk_size: usize,
    ) -> super::FlattenStats {
        let path = dir.path().join("in.json");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
        let input = Input::new(path).unwrap();

        let identifiers: Vec<String> = identifiers.iter().map(ToString::to_string).collect();
        let mut mapping = Mapping::discover(&input, &[], &identifiers, |_| {}).unwrap();
        mapping.drop_empty(identifiers.len());
        let files = FileSet::create(&mapping, dir.path(), input.stem(), false).unwrap();
        flatten(&input, &mapping, &identifiers, files, chunk_size, |_| {}).unwrap()
    }

    fn read_csv(dir: &tempfile::TempDir, name: &str) -> Vec<Vec<String>> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_path(dir.path().join(name))
            .unwrap();
        reader
            .records()
            .map(|rec| rec.unwrap().iter().map(ToString::to_string).collect())
            .collect()
    }

    #[test]
    fn chunked_flush_preserves_row_order() {
        let dir = tempfile::tempdir().unwrap();
        let content = (1..=5)
            .map(|i| format!(r#"{{"a":{{"x":{i}}},"id":"{i}"}}"#))
            .collect::<Vec<_>>()
            .join(" ");
        let stats = run(&dir, &content, &["id"], 2);
        assert_eq!(stats.records, 5);

        let rows = read_csv(&dir, "in_a.csv");
        assert_eq!(rows[0], vec!["id", "a.x"]);
        for (i, row) in rows[1..].iter().enumerate() {
            let expected = (i + 1).to_string();
            assert_eq!(row, &vec![expected.clone(), expected]);
        }
        assert_eq!(rows.len(), 6);
    }

    #[test]
    fn duplicate_leaf_drops_the_record() {
        let dir = tempfile::tempdir().unwrap();
        // The second object repeats key "x" inside "a".
        let content = concat!(
            r#"{"a":{"x":1},"id":"1"} "#,
            r#"{"a":{"x":2,"x":3},"id":"2"} "#,
            r#"{"a":{"x":4},"id":"3"}"#
        );
        let stats = run(&dir, content, &["id"], 100);
        assert_eq!(stats.records, 3);
        assert_eq!(stats.dropped_records, 1);

        let rows = read_csv(&dir, "in_a.csv");
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1], vec!["1", "1"]);
        assert_eq!(rows[2], vec!["3", "4"]);
    }

    #[test]
    fn truncated_input_keeps_complete_records() {
        let dir = tempfile::tempdir().unwrap();
        let content = r#"{"a":{"x":1},"id":"1"} {"a":{"x":2},"id":"2"} {"a":{"x"#;
        let stats = run(&dir, content, &["id"], 100);
        assert_eq!(stats.records, 2);

        let rows = read_csv(&dir, "in_a.csv");
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[2], vec!["2", "2"]);
    }
}

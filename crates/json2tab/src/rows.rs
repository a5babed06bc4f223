//! Per-table row buffering between the flattener and the writers.

use std::collections::VecDeque;
use std::mem;

use indexmap::IndexMap;

/// One output row. Missing cells become empty CSV fields.
pub type Row = Vec<Option<String>>;

/// FIFO of pending rows per table, with an aggregate size used to decide
/// when to flush a chunk.
#[derive(Debug, Default)]
pub struct RowBuffer {
    collector: IndexMap<String, VecDeque<Row>>,
    size: usize,
}

impl RowBuffer {
    /// Create a buffer with one queue per table, preserving table order.
    pub fn new<'a>(tables: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            collector: tables
                .into_iter()
                .map(|table| (table.to_string(), VecDeque::new()))
                .collect(),
            size: 0,
        }
    }

    /// Append a row to its table's queue. Rows for unknown tables are
    /// ignored.
    pub fn append(&mut self, table: &str, row: Row) {
        if let Some(queue) = self.collector.get_mut(table) {
            queue.push_back(row);
            self.size += 1;
        }
    }

    /// Hand over the queued rows for one table, leaving it empty.
    pub fn take(&mut self, table: &str) -> VecDeque<Row> {
        match self.collector.get_mut(table) {
            Some(queue) => {
                self.size -= queue.len();
                mem::take(queue)
            }
            None => VecDeque::new(),
        }
    }

    pub fn tables(&self) -> impl Iterator<Item = &str> {
        self.collector.keys().map(String::as_str)
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn reset(&mut self) {
        for queue in self.collector.values_mut() {
            queue.clear();
        }
        self.size = 0;
    }
}

use std::collections::BTreeMap;

use serde::Serialize;

use crate::value::Value;

/// An in-memory tabular dataset: a stable column header plus rows of cells.
///
/// Invariant: every row holds exactly `columns.len()` cells. Rows pushed
/// short are padded with [`Value::Empty`]; rows pushed long are truncated.
/// All transformations in the engine take `&Table` and build a new table —
/// no stage mutates its input.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Table {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    /// Append a row, padding or truncating to the column count.
    pub fn push_row(&mut self, mut row: Vec<Value>) {
        row.resize(self.columns.len(), Value::Empty);
        self.rows.push(row);
    }

    /// Cell at (row, column index). Out-of-range reads yield `Empty`
    /// rather than panicking; the engine treats absent data as empty.
    pub fn value_at(&self, row: usize, col: usize) -> &Value {
        static EMPTY: Value = Value::Empty;
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .unwrap_or(&EMPTY)
    }

    /// Cell at (row, column name); `None` when the column does not exist.
    pub fn value(&self, row: usize, column: &str) -> Option<&Value> {
        let col = self.column_index(column)?;
        Some(self.value_at(row, col))
    }

    pub fn set_value(&mut self, row: usize, col: usize, value: Value) {
        if let Some(cell) = self.rows.get_mut(row).and_then(|r| r.get_mut(col)) {
            *cell = value;
        }
    }

    /// Append a column. Values are padded/truncated to the row count.
    pub fn add_column(&mut self, name: impl Into<String>, mut values: Vec<Value>) {
        values.resize(self.rows.len(), Value::Empty);
        self.columns.push(name.into());
        for (row, value) in self.rows.iter_mut().zip(values) {
            row.push(value);
        }
    }

    /// New table keeping only rows whose mask entry is `true`.
    pub fn filtered(&self, keep: &[bool]) -> Table {
        let rows = self
            .rows
            .iter()
            .enumerate()
            .filter(|(i, _)| keep.get(*i).copied().unwrap_or(false))
            .map(|(_, r)| r.clone())
            .collect();
        Table {
            columns: self.columns.clone(),
            rows,
        }
    }

    /// A row as a name → value map (for previews and JSON output).
    pub fn row_entries(&self, row: usize) -> BTreeMap<String, Value> {
        self.columns
            .iter()
            .enumerate()
            .map(|(col, name)| (name.clone(), self.value_at(row, col).clone()))
            .collect()
    }
}

use tallygrid_core::{Table, Value};

/// Reserved column holding the composite key.
pub const KEY_COLUMN: &str = "__KEY__";
/// Separator between key segments.
pub const KEY_DELIMITER: &str = " | ";

/// Attach a composite key column built from `key_columns`.
///
/// Each segment is the trimmed string form of the named column; a column
/// absent from the table contributes an empty segment. Total function:
/// never fails, never drops rows.
pub fn build_key(table: &Table, key_columns: &[String]) -> Table {
    let indices: Vec<Option<usize>> = key_columns
        .iter()
        .map(|c| table.column_index(c))
        .collect();

    let mut keys = Vec::with_capacity(table.row_count());
    for row in 0..table.row_count() {
        let segments: Vec<String> = indices
            .iter()
            .map(|idx| match idx {
                Some(col) => table.value_at(row, *col).trimmed_text(),
                None => String::new(),
            })
            .collect();
        keys.push(Value::Text(segments.join(KEY_DELIMITER)));
    }

    let mut out = table.clone();
    out.add_column(KEY_COLUMN, keys);
    out
}

/// Key for a single row, without materializing a keyed table. Used by the
/// preview path, which scans bounded prefixes of the raw datasets.
pub fn row_key(table: &Table, row: usize, key_columns: &[String]) -> String {
    key_columns
        .iter()
        .map(|c| {
            table
                .value(row, c)
                .map(Value::trimmed_text)
                .unwrap_or_default()
        })
        .collect::<Vec<_>>()
        .join(KEY_DELIMITER)
}

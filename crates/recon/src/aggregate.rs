use std::collections::{BTreeMap, BTreeSet};

use tallygrid_core::{Table, Value};

use crate::config::FilterPredicate;
use crate::filter::apply_filters;
use crate::model::SYSTEM_TOTAL;

/// Aggregation result: the grouped table plus the pivot categories that
/// were discovered (empty without a pivot column).
#[derive(Debug)]
pub struct AggregateOutput {
    pub table: Table,
    pub pivot_values: Vec<String>,
}

/// Filter, coerce and group a keyed table.
///
/// Without a pivot column, rows group by key and each value column is
/// summed; keys with no rows left after filtering are absent from the
/// output, not zero-filled — "no data" stays distinct from "zero data".
///
/// With a pivot column, its distinct non-empty trimmed values become one
/// summed column each (always in ascending lexical order, whatever the row
/// order was), plus a total column over all of them. Unparseable or missing
/// numeric cells count as 0.
pub fn aggregate(
    table: &Table,
    key_column: &str,
    value_columns: &[String],
    pivot_column: Option<&str>,
    filters: &[FilterPredicate],
) -> AggregateOutput {
    let filtered = apply_filters(table, filters);

    let Some(key_idx) = filtered.column_index(key_column) else {
        return AggregateOutput {
            table: Table::new(vec![key_column.to_string()]),
            pivot_values: Vec::new(),
        };
    };

    let pivot_idx = pivot_column.and_then(|c| filtered.column_index(c));

    // Discover pivot categories whenever the pivot column exists, even if
    // no value column is configured to pivot over.
    let mut pivot_values: Vec<String> = Vec::new();
    if let Some(pivot_idx) = pivot_idx {
        let distinct: BTreeSet<String> = (0..filtered.row_count())
            .map(|row| filtered.value_at(row, pivot_idx).trimmed_text())
            .filter(|v| !v.is_empty())
            .collect();
        pivot_values = distinct.into_iter().collect();
    }

    let value_indices: Vec<Option<usize>> = value_columns
        .iter()
        .map(|c| filtered.column_index(c))
        .collect();

    if let (Some(pivot_idx), Some(first_value)) = (pivot_idx, value_columns.first()) {
        let value_idx = filtered.column_index(first_value);
        return pivoted(&filtered, key_idx, value_idx, pivot_idx, key_column, pivot_values);
    }

    if value_indices.iter().any(Option::is_some) {
        return grouped(&filtered, key_idx, value_columns, &value_indices, key_column, pivot_values);
    }

    // No value columns: distinct keys only.
    let keys: BTreeSet<String> = (0..filtered.row_count())
        .map(|row| filtered.value_at(row, key_idx).to_text())
        .collect();
    let mut out = Table::new(vec![key_column.to_string()]);
    for key in keys {
        out.push_row(vec![Value::Text(key)]);
    }
    AggregateOutput { table: out, pivot_values }
}

fn grouped(
    filtered: &Table,
    key_idx: usize,
    value_columns: &[String],
    value_indices: &[Option<usize>],
    key_column: &str,
    pivot_values: Vec<String>,
) -> AggregateOutput {
    let kept: Vec<(usize, &String)> = value_indices
        .iter()
        .zip(value_columns)
        .filter_map(|(idx, name)| idx.map(|i| (i, name)))
        .collect();

    let mut sums: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    for row in 0..filtered.row_count() {
        let key = filtered.value_at(row, key_idx).to_text();
        let entry = sums.entry(key).or_insert_with(|| vec![0.0; kept.len()]);
        for (slot, (col, _)) in kept.iter().enumerate() {
            entry[slot] += filtered.value_at(row, *col).to_number().unwrap_or(0.0);
        }
    }

    let mut columns = vec![key_column.to_string()];
    columns.extend(kept.iter().map(|(_, name)| (*name).clone()));
    let mut out = Table::new(columns);
    for (key, totals) in sums {
        let mut row = vec![Value::Text(key)];
        row.extend(totals.into_iter().map(Value::Number));
        out.push_row(row);
    }
    AggregateOutput { table: out, pivot_values }
}

fn pivoted(
    filtered: &Table,
    key_idx: usize,
    value_idx: Option<usize>,
    pivot_idx: usize,
    key_column: &str,
    pivot_values: Vec<String>,
) -> AggregateOutput {
    // key -> category -> sum; keys whose rows all carry an empty category
    // still appear, with every category (and the total) at 0.
    let mut sums: BTreeMap<String, BTreeMap<String, f64>> = BTreeMap::new();
    for row in 0..filtered.row_count() {
        let key = filtered.value_at(row, key_idx).to_text();
        let entry = sums.entry(key).or_default();
        let category = filtered.value_at(row, pivot_idx).trimmed_text();
        if category.is_empty() {
            continue;
        }
        let amount = value_idx
            .map(|col| filtered.value_at(row, col).to_number().unwrap_or(0.0))
            .unwrap_or(0.0);
        *entry.entry(category).or_insert(0.0) += amount;
    }

    let mut columns = vec![key_column.to_string()];
    columns.extend(pivot_values.iter().cloned());
    columns.push(SYSTEM_TOTAL.to_string());

    let mut out = Table::new(columns);
    for (key, categories) in sums {
        let mut row = vec![Value::Text(key)];
        let mut total = 0.0;
        for category in &pivot_values {
            let amount = categories.get(category).copied().unwrap_or(0.0);
            total += amount;
            row.push(Value::Number(amount));
        }
        row.push(Value::Number(total));
        out.push_row(row);
    }
    AggregateOutput { table: out, pivot_values }
}

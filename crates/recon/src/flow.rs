use std::collections::{BTreeMap, BTreeSet};

use tallygrid_core::{Table, Value};

use crate::config::{FilterPredicate, FlowPivotConfig};
use crate::filter::apply_filters;
use crate::model::MANUAL_QUANTITY;

/// Flow-pivot result: per-key category sums plus the netted quantity.
#[derive(Debug)]
pub struct FlowOutput {
    pub table: Table,
    pub outbound_columns: Vec<String>,
    pub inbound_columns: Vec<String>,
}

/// Pivot the manual side into outbound/inbound categories and net them.
///
/// Only rows whose category is configured participate; anything else is
/// dropped from this computation entirely rather than counting as zero.
/// Every configured category gets a column even when it never occurs, and
/// `manual_quantity = Σ outbound − Σ inbound` per key. A side with no
/// configured categories contributes 0 to the net.
pub fn aggregate_flow(
    table: &Table,
    key_column: &str,
    value_column: &str,
    config: &FlowPivotConfig,
    filters: &[FilterPredicate],
) -> FlowOutput {
    let outbound: BTreeSet<&str> = config.outbound_values.iter().map(String::as_str).collect();
    let inbound: BTreeSet<&str> = config.inbound_values.iter().map(String::as_str).collect();

    // Configured categories, ascending lexical, as in the categorical pivot.
    let categories: Vec<String> = outbound
        .iter()
        .chain(inbound.iter())
        .map(|c| (*c).to_string())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let filtered = apply_filters(table, filters);
    let key_idx = filtered.column_index(key_column);
    let pivot_idx = filtered.column_index(&config.pivot_column);
    let value_idx = filtered.column_index(value_column);

    let mut columns = vec![key_column.to_string()];
    columns.extend(categories.iter().cloned());
    columns.push(MANUAL_QUANTITY.to_string());
    let mut out = Table::new(columns);

    let (Some(key_idx), Some(pivot_idx)) = (key_idx, pivot_idx) else {
        return FlowOutput {
            table: out,
            outbound_columns: config.outbound_values.clone(),
            inbound_columns: config.inbound_values.clone(),
        };
    };

    let mut sums: BTreeMap<String, BTreeMap<String, f64>> = BTreeMap::new();
    for row in 0..filtered.row_count() {
        let category = filtered.value_at(row, pivot_idx).trimmed_text();
        if !outbound.contains(category.as_str()) && !inbound.contains(category.as_str()) {
            continue;
        }
        let key = filtered.value_at(row, key_idx).to_text();
        let amount = value_idx
            .map(|col| filtered.value_at(row, col).to_number().unwrap_or(0.0))
            .unwrap_or(0.0);
        *sums.entry(key).or_default().entry(category).or_insert(0.0) += amount;
    }

    for (key, per_category) in sums {
        let mut row = vec![Value::Text(key)];
        let mut net = 0.0;
        for category in &categories {
            let amount = per_category.get(category).copied().unwrap_or(0.0);
            if outbound.contains(category.as_str()) {
                net += amount;
            } else {
                net -= amount;
            }
            row.push(Value::Number(amount));
        }
        row.push(Value::Number(net));
        out.push_row(row);
    }

    FlowOutput {
        table: out,
        outbound_columns: config.outbound_values.clone(),
        inbound_columns: config.inbound_values.clone(),
    }
}

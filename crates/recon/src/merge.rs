use std::collections::{BTreeMap, BTreeSet, HashMap};

use tallygrid_core::{Table, Value};

use crate::classify::classify;
use crate::formula::DiffFormula;
use crate::model::{
    ReconWarning, Summary, DIFFERENCE_COLUMN, MANUAL_QUANTITY, MANUAL_QUANTITY_ALIAS,
    STATUS_COLUMN, SYSTEM_TOTAL, SYSTEM_TOTAL_ALIAS,
};

#[derive(Debug)]
pub struct MergeOutput {
    pub table: Table,
    pub summary: Summary,
    pub warnings: Vec<ReconWarning>,
}

/// Outer-join two aggregated tables on key and classify every key.
///
/// The designated value columns are renamed to the canonical
/// `manual_quantity` / `system_total`; a key missing on one side gets 0
/// for that side, never null, so the difference arithmetic needs no
/// null handling. Result columns follow the canonical order: key, pivot
/// categories (ascending lexical), system total, manual quantity,
/// difference, status.
pub fn merge(
    manual: &Table,
    system: &Table,
    key_column: &str,
    manual_value_column: &str,
    system_value_column: &str,
    formula: Option<&DiffFormula>,
    pivot_values: &[String],
) -> MergeOutput {
    let manual_by_key = side_totals(manual, key_column, manual_value_column);
    let system_by_key = side_totals(system, key_column, system_value_column);
    let categories_by_key = category_totals(system, key_column, pivot_values);

    // The ascending order is part of the output contract, not an accident
    // of how the categories were discovered.
    let mut categories: Vec<String> = pivot_values.to_vec();
    categories.sort();

    let keys: BTreeSet<&String> = manual_by_key.keys().chain(system_by_key.keys()).collect();

    let mut columns = vec![key_column.to_string()];
    columns.extend(categories.iter().cloned());
    columns.push(SYSTEM_TOTAL.to_string());
    columns.push(MANUAL_QUANTITY.to_string());
    columns.push(DIFFERENCE_COLUMN.to_string());
    columns.push(STATUS_COLUMN.to_string());
    let mut table = Table::new(columns);

    let mut summary = Summary::default();
    let mut fallback_rows = 0usize;
    let mut fallback_reason: Option<String> = None;
    let empty_categories = Vec::new();

    for key in keys {
        let manual_qty = manual_by_key.get(key).copied();
        let system_total = system_by_key.get(key).copied();
        let category_values = categories_by_key.get(key).unwrap_or(&empty_categories);

        let default_diff = manual_qty.unwrap_or(0.0) - system_total.unwrap_or(0.0);
        let difference = match formula {
            None => default_diff,
            Some(formula) => {
                let mut variables: HashMap<String, f64> = HashMap::new();
                variables.insert(MANUAL_QUANTITY.to_string(), manual_qty.unwrap_or(0.0));
                variables.insert(SYSTEM_TOTAL.to_string(), system_total.unwrap_or(0.0));
                variables.insert(MANUAL_QUANTITY_ALIAS.to_string(), manual_qty.unwrap_or(0.0));
                variables.insert(SYSTEM_TOTAL_ALIAS.to_string(), system_total.unwrap_or(0.0));
                for (slot, category) in categories.iter().enumerate() {
                    let amount = category_values.get(slot).copied().unwrap_or(0.0);
                    variables.insert(category.clone(), amount);
                }
                match formula.eval(&variables) {
                    Ok(diff) => diff,
                    Err(err) => {
                        fallback_rows += 1;
                        fallback_reason.get_or_insert_with(|| err.to_string());
                        default_diff
                    }
                }
            }
        };

        let status = classify(manual_qty, system_total, difference);
        summary.record(status);

        let mut row = vec![Value::Text(key.clone())];
        row.extend(category_values.iter().map(|v| Value::Number(*v)));
        // a key with no system row has no category values either
        while row.len() < 1 + categories.len() {
            row.push(Value::Number(0.0));
        }
        row.push(Value::Number(system_total.unwrap_or(0.0)));
        row.push(Value::Number(manual_qty.unwrap_or(0.0)));
        row.push(Value::Number(difference));
        row.push(Value::Text(status.to_string()));
        table.push_row(row);
    }

    let mut warnings = Vec::new();
    if fallback_rows > 0 {
        warnings.push(ReconWarning::FormulaFallback {
            rows: fallback_rows,
            reason: fallback_reason.unwrap_or_default(),
        });
    }

    MergeOutput {
        table,
        summary,
        warnings,
    }
}

/// Key → summed value column. A side whose value column is missing still
/// contributes its keys, each with total 0.
fn side_totals(table: &Table, key_column: &str, value_column: &str) -> BTreeMap<String, f64> {
    let mut totals = BTreeMap::new();
    let Some(key_idx) = table.column_index(key_column) else {
        return totals;
    };
    let value_idx = table.column_index(value_column);

    for row in 0..table.row_count() {
        let key = table.value_at(row, key_idx).to_text();
        let amount = value_idx
            .map(|col| table.value_at(row, col).to_number().unwrap_or(0.0))
            .unwrap_or(0.0);
        *totals.entry(key).or_insert(0.0) += amount;
    }
    totals
}

/// Key → pivot category values, aligned with the sorted category list.
fn category_totals(
    table: &Table,
    key_column: &str,
    pivot_values: &[String],
) -> BTreeMap<String, Vec<f64>> {
    let mut categories: Vec<String> = pivot_values.to_vec();
    categories.sort();

    let mut by_key = BTreeMap::new();
    let Some(key_idx) = table.column_index(key_column) else {
        return by_key;
    };
    let indices: Vec<Option<usize>> = categories.iter().map(|c| table.column_index(c)).collect();

    for row in 0..table.row_count() {
        let key = table.value_at(row, key_idx).to_text();
        let values: Vec<f64> = indices
            .iter()
            .map(|idx| {
                idx.map(|col| table.value_at(row, col).to_number().unwrap_or(0.0))
                    .unwrap_or(0.0)
            })
            .collect();
        by_key.entry(key).or_insert(values);
    }
    by_key
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::KEY_COLUMN;
    use crate::model::Status;

    fn manual_side(rows: &[(&str, f64)]) -> Table {
        let mut t = Table::new(vec![KEY_COLUMN.into(), "数量".into()]);
        for (key, qty) in rows {
            t.push_row(vec![(*key).into(), Value::Number(*qty)]);
        }
        t
    }

    fn system_side(rows: &[(&str, f64)]) -> Table {
        let mut t = Table::new(vec![KEY_COLUMN.into(), "qty".into()]);
        for (key, qty) in rows {
            t.push_row(vec![(*key).into(), Value::Number(*qty)]);
        }
        t
    }

    fn row_for(out: &MergeOutput, key: &str) -> usize {
        (0..out.table.row_count())
            .find(|r| out.table.value_at(*r, 0).to_text() == key)
            .expect("key missing from merge output")
    }

    fn status_of(out: &MergeOutput, key: &str) -> String {
        let row = row_for(out, key);
        out.table.value(row, STATUS_COLUMN).unwrap().to_text()
    }

    #[test]
    fn matched_key_has_zero_difference() {
        let out = merge(
            &manual_side(&[("A001 | SKU1", 100.0)]),
            &system_side(&[("A001 | SKU1", 100.0)]),
            KEY_COLUMN,
            "数量",
            "qty",
            None,
            &[],
        );
        assert_eq!(out.table.row_count(), 1);
        assert_eq!(out.table.value(0, MANUAL_QUANTITY), Some(&Value::Number(100.0)));
        assert_eq!(out.table.value(0, SYSTEM_TOTAL), Some(&Value::Number(100.0)));
        assert_eq!(out.table.value(0, DIFFERENCE_COLUMN), Some(&Value::Number(0.0)));
        assert_eq!(status_of(&out, "A001 | SKU1"), Status::Match.as_str());
        assert_eq!(out.summary.matched, 1);
    }

    #[test]
    fn every_key_from_either_side_appears_once() {
        let out = merge(
            &manual_side(&[("K1", 10.0), ("K2", 20.0)]),
            &system_side(&[("K2", 20.0), ("K3", 30.0)]),
            KEY_COLUMN,
            "数量",
            "qty",
            None,
            &[],
        );
        assert_eq!(out.table.row_count(), 3);
        assert_eq!(out.summary.total_keys, 3);
        // missing sides default to 0, never null
        let k1 = row_for(&out, "K1");
        assert_eq!(out.table.value(k1, SYSTEM_TOTAL), Some(&Value::Number(0.0)));
        let k3 = row_for(&out, "K3");
        assert_eq!(out.table.value(k3, MANUAL_QUANTITY), Some(&Value::Number(0.0)));
        assert_eq!(status_of(&out, "K1"), Status::ManualOnly.as_str());
        assert_eq!(status_of(&out, "K3"), Status::SystemOnly.as_str());
    }

    #[test]
    fn system_only_regardless_of_difference() {
        let out = merge(
            &manual_side(&[]),
            &system_side(&[("K9", 300.0)]),
            KEY_COLUMN,
            "数量",
            "qty",
            None,
            &[],
        );
        assert_eq!(status_of(&out, "K9"), Status::SystemOnly.as_str());
        assert_eq!(
            out.table.value(0, DIFFERENCE_COLUMN),
            Some(&Value::Number(-300.0))
        );
    }

    #[test]
    fn canonical_column_order() {
        let mut system = Table::new(vec![
            KEY_COLUMN.into(),
            "已关闭".into(),
            "已发货".into(),
            SYSTEM_TOTAL.into(),
        ]);
        system.push_row(vec![
            "K1".into(),
            Value::Number(50.0),
            Value::Number(100.0),
            Value::Number(150.0),
        ]);
        let out = merge(
            &manual_side(&[("K1", 200.0)]),
            &system,
            KEY_COLUMN,
            "数量",
            SYSTEM_TOTAL,
            None,
            &["已关闭".into(), "已发货".into()],
        );
        assert_eq!(
            out.table.columns(),
            &[
                KEY_COLUMN.to_string(),
                "已关闭".into(),
                "已发货".into(),
                SYSTEM_TOTAL.into(),
                MANUAL_QUANTITY.into(),
                DIFFERENCE_COLUMN.into(),
                STATUS_COLUMN.into(),
            ]
        );
        assert_eq!(status_of(&out, "K1"), Status::Differ.as_str());
        assert_eq!(out.table.value(0, DIFFERENCE_COLUMN), Some(&Value::Number(50.0)));
    }

    #[test]
    fn formula_uses_pivot_category_variables() {
        let mut system = Table::new(vec![
            KEY_COLUMN.into(),
            "已关闭".into(),
            "已发货".into(),
            SYSTEM_TOTAL.into(),
        ]);
        system.push_row(vec![
            "K1".into(),
            Value::Number(50.0),
            Value::Number(100.0),
            Value::Number(150.0),
        ]);
        let pivot_values = vec!["已关闭".to_string(), "已发货".to_string()];
        let variables = vec![
            MANUAL_QUANTITY.to_string(),
            SYSTEM_TOTAL.to_string(),
            MANUAL_QUANTITY_ALIAS.to_string(),
            SYSTEM_TOTAL_ALIAS.to_string(),
            "已关闭".to_string(),
            "已发货".to_string(),
        ];
        let formula =
            DiffFormula::parse("手工数量 - (系统总计 - 已关闭)", &variables).unwrap();
        let out = merge(
            &manual_side(&[("K1", 200.0)]),
            &system,
            KEY_COLUMN,
            "数量",
            SYSTEM_TOTAL,
            Some(&formula),
            &pivot_values,
        );
        assert_eq!(out.table.value(0, DIFFERENCE_COLUMN), Some(&Value::Number(100.0)));
        assert!(out.warnings.is_empty());
    }

    #[test]
    fn formula_failure_falls_back_to_default_difference() {
        let variables = vec![MANUAL_QUANTITY.to_string(), SYSTEM_TOTAL.to_string()];
        // divides by a zero system total on the manual-only key
        let formula = DiffFormula::parse("manual_quantity / system_total", &variables).unwrap();
        let out = merge(
            &manual_side(&[("K1", 10.0)]),
            &system_side(&[]),
            KEY_COLUMN,
            "数量",
            "qty",
            Some(&formula),
            &[],
        );
        assert_eq!(out.table.value(0, DIFFERENCE_COLUMN), Some(&Value::Number(10.0)));
        assert_eq!(
            out.warnings,
            vec![ReconWarning::FormulaFallback {
                rows: 1,
                reason: "division by zero".into(),
            }]
        );
    }

    #[test]
    fn missing_value_column_keeps_keys_with_zero_totals() {
        let mut manual = Table::new(vec![KEY_COLUMN.into()]);
        manual.push_row(vec!["K1".into()]);
        let out = merge(
            &manual,
            &system_side(&[("K1", 40.0)]),
            KEY_COLUMN,
            "数量",
            "qty",
            None,
            &[],
        );
        assert_eq!(out.table.value(0, MANUAL_QUANTITY), Some(&Value::Number(0.0)));
        assert_eq!(status_of(&out, "K1"), Status::SystemOnly.as_str());
    }
}

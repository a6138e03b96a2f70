use tallygrid_core::Table;

use crate::config::{FilterOp, FilterPredicate};

/// Apply predicates conjunctively, in list order, producing a filtered
/// copy of the table.
///
/// A predicate naming a column the table does not have is skipped
/// (always-true) so templates stay usable across slightly different
/// schemas.
pub fn apply_filters(table: &Table, predicates: &[FilterPredicate]) -> Table {
    if predicates.is_empty() {
        return table.clone();
    }
    let mut keep = vec![true; table.row_count()];
    for pred in predicates {
        let Some(col) = table.column_index(&pred.column) else {
            continue;
        };
        apply_predicate(table, col, pred, &mut keep);
    }
    table.filtered(&keep)
}

/// Split a list-style value into trimmed, non-empty candidates. Full-width
/// and half-width commas/semicolons all delimit.
pub(crate) fn split_candidates(value: &str) -> Vec<String> {
    value
        .replace(['；', '，', ';'], ",")
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn apply_predicate(table: &Table, col: usize, pred: &FilterPredicate, keep: &mut [bool]) {
    match pred.operator {
        FilterOp::Equals => retain_text(table, col, keep, |text| text == pred.value),
        FilterOp::NotEquals => retain_text(table, col, keep, |text| text != pred.value),
        FilterOp::Contains => {
            let candidates = split_candidates(&pred.value);
            if candidates.is_empty() {
                return;
            }
            retain_text(table, col, keep, |text| {
                candidates.iter().any(|c| text.contains(c.as_str()))
            });
        }
        FilterOp::NotContains => {
            let candidates = split_candidates(&pred.value);
            if candidates.is_empty() {
                return;
            }
            retain_text(table, col, keep, |text| {
                candidates.iter().all(|c| !text.contains(c.as_str()))
            });
        }
        // An empty candidate list matches nothing here: in_list empties the
        // result, not_in_list keeps everything.
        FilterOp::InList => {
            let candidates = split_candidates(&pred.value);
            retain_text(table, col, keep, |text| candidates.iter().any(|c| c == text));
        }
        FilterOp::NotInList => {
            let candidates = split_candidates(&pred.value);
            retain_text(table, col, keep, |text| candidates.iter().all(|c| c != text));
        }
        FilterOp::Greater => {
            let Ok(threshold) = pred.value.trim().parse::<f64>() else {
                return;
            };
            retain_number(table, col, keep, |n| n > threshold);
        }
        FilterOp::Less => {
            let Ok(threshold) = pred.value.trim().parse::<f64>() else {
                return;
            };
            retain_number(table, col, keep, |n| n < threshold);
        }
    }
}

fn retain_text(table: &Table, col: usize, keep: &mut [bool], pass: impl Fn(&str) -> bool) {
    for (row, kept) in keep.iter_mut().enumerate() {
        if *kept && !pass(&table.value_at(row, col).to_text()) {
            *kept = false;
        }
    }
}

/// Numeric comparisons exclude rows whose column does not parse, whichever
/// direction the comparison points.
fn retain_number(table: &Table, col: usize, keep: &mut [bool], pass: impl Fn(f64) -> bool) {
    for (row, kept) in keep.iter_mut().enumerate() {
        if *kept {
            match table.value_at(row, col).to_number() {
                Some(n) if pass(n) => {}
                _ => *kept = false,
            }
        }
    }
}

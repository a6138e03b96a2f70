use std::collections::{BTreeMap, HashSet};

use tallygrid_core::Table;

use crate::key::row_key;
use crate::model::{PreviewRow, Status};

/// How far past `limit` the lookup maps scan on each side.
const LOOKUP_FACTOR: usize = 5;

/// Sample up to `limit` key matches between the two raw datasets.
///
/// Builds a bounded key→row lookup per side, then reports whether a
/// counterpart exists for a prefix of each dataset: manual-side rows first,
/// system-only rows appended until the limit. Keys are deduplicated and
/// empty keys skipped. This is a quick wiring check for a template, not a
/// reconciliation — quantities are neither aggregated nor compared.
pub fn sample_matches(
    manual: &Table,
    system: &Table,
    manual_key_columns: &[String],
    system_key_columns: &[String],
    limit: usize,
) -> Vec<PreviewRow> {
    let manual_lookup = key_lookup(manual, manual_key_columns, limit * LOOKUP_FACTOR);
    let system_lookup = key_lookup(system, system_key_columns, limit * LOOKUP_FACTOR);

    let mut preview = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    for row in 0..manual.row_count().min(limit) {
        let key = row_key(manual, row, manual_key_columns);
        if key.is_empty() || !seen.insert(key.clone()) {
            continue;
        }
        let system_row = system_lookup.get(&key).map(|r| system.row_entries(*r));
        let status = if system_row.is_some() {
            Status::Match
        } else {
            Status::ManualOnly
        };
        preview.push(PreviewRow {
            key,
            status,
            manual: Some(manual.row_entries(row)),
            system: system_row,
        });
    }

    for row in 0..system.row_count().min(limit) {
        if preview.len() >= limit {
            break;
        }
        let key = row_key(system, row, system_key_columns);
        if key.is_empty() || !seen.insert(key.clone()) {
            continue;
        }
        let manual_row = manual_lookup.get(&key).map(|r| manual.row_entries(*r));
        let status = if manual_row.is_some() {
            Status::Match
        } else {
            Status::SystemOnly
        };
        preview.push(PreviewRow {
            key,
            status,
            manual: manual_row,
            system: Some(system.row_entries(row)),
        });
    }

    preview.truncate(limit);
    preview
}

/// Key → first row carrying it, over a bounded prefix of the table.
fn key_lookup(table: &Table, key_columns: &[String], scan: usize) -> BTreeMap<String, usize> {
    let mut lookup = BTreeMap::new();
    for row in 0..table.row_count().min(scan) {
        let key = row_key(table, row, key_columns);
        if key.is_empty() {
            continue;
        }
        lookup.entry(key).or_insert(row);
    }
    lookup
}

#[cfg(test)]
mod tests {
    use super::*;
    use tallygrid_core::Value;

    fn table(rows: &[(&str, f64)]) -> Table {
        let mut t = Table::new(vec!["单号".into(), "数量".into()]);
        for (order, qty) in rows {
            t.push_row(vec![(*order).into(), Value::Number(*qty)]);
        }
        t
    }

    fn keys() -> Vec<String> {
        vec!["单号".to_string()]
    }

    #[test]
    fn manual_rows_come_first_then_system_only() {
        let manual = table(&[("A1", 1.0), ("A2", 2.0)]);
        let system = table(&[("A2", 2.0), ("A9", 9.0)]);
        let preview = sample_matches(&manual, &system, &keys(), &keys(), 10);

        assert_eq!(preview.len(), 3);
        assert_eq!(preview[0].key, "A1");
        assert_eq!(preview[0].status, Status::ManualOnly);
        assert!(preview[0].system.is_none());

        assert_eq!(preview[1].key, "A2");
        assert_eq!(preview[1].status, Status::Match);
        assert!(preview[1].system.is_some());

        assert_eq!(preview[2].key, "A9");
        assert_eq!(preview[2].status, Status::SystemOnly);
        assert!(preview[2].manual.is_none());
    }

    #[test]
    fn duplicate_keys_appear_once() {
        let manual = table(&[("A1", 1.0), ("A1", 1.0), ("A1", 1.0)]);
        let system = table(&[]);
        let preview = sample_matches(&manual, &system, &keys(), &keys(), 10);
        assert_eq!(preview.len(), 1);
    }

    #[test]
    fn empty_keys_are_skipped() {
        let manual = table(&[("  ", 1.0), ("A1", 1.0)]);
        let system = table(&[]);
        let preview = sample_matches(&manual, &system, &keys(), &keys(), 10);
        assert_eq!(preview.len(), 1);
        assert_eq!(preview[0].key, "A1");
    }

    #[test]
    fn limit_bounds_the_preview() {
        let manual = table(&[("A1", 1.0), ("A2", 2.0), ("A3", 3.0)]);
        let system = table(&[("B1", 1.0), ("B2", 2.0)]);
        let preview = sample_matches(&manual, &system, &keys(), &keys(), 2);
        assert_eq!(preview.len(), 2);
        assert_eq!(preview[0].key, "A1");
        assert_eq!(preview[1].key, "A2");
    }

    #[test]
    fn lookup_scans_past_the_emission_prefix() {
        // counterpart sits beyond row `limit` on the system side but inside
        // the limit*5 lookup window
        let manual = table(&[("A7", 7.0)]);
        let system = table(&[
            ("B1", 1.0),
            ("B2", 2.0),
            ("B3", 3.0),
            ("A7", 7.0),
        ]);
        let preview = sample_matches(&manual, &system, &keys(), &keys(), 1);
        assert_eq!(preview.len(), 1);
        assert_eq!(preview[0].status, Status::Match);
    }
}

use regex::Regex;
use tallygrid_core::{Table, Value};

use crate::config::{CleanMode, CleanRule};
use crate::model::ReconWarning;

/// Apply regex cleaning rules in list order, producing a cleaned copy.
///
/// Rules targeting a missing column or carrying an empty pattern are
/// no-ops. A rule whose pattern fails to compile is skipped with a warning
/// and the remaining rules still apply. Cleaned cells become text, whatever
/// they were before — matching takes place on string forms.
pub fn apply_clean_rules(table: &Table, rules: &[CleanRule]) -> (Table, Vec<ReconWarning>) {
    let mut out = table.clone();
    let mut warnings = Vec::new();

    for rule in rules {
        if rule.pattern.is_empty() {
            continue;
        }
        let Some(col) = out.column_index(&rule.column) else {
            continue;
        };
        let re = match Regex::new(&rule.pattern) {
            Ok(re) => re,
            Err(err) => {
                warnings.push(ReconWarning::CleanRuleSkipped {
                    column: rule.column.clone(),
                    pattern: rule.pattern.clone(),
                    reason: err.to_string(),
                });
                continue;
            }
        };

        for row in 0..out.row_count() {
            let text = out.value_at(row, col).to_text();
            let cleaned = match rule.mode {
                CleanMode::DeleteMatch => re.replace_all(&text, "").trim().to_string(),
                CleanMode::KeepMatch => re
                    .find(&text)
                    .map(|m| m.as_str().to_string())
                    .unwrap_or_default(),
                CleanMode::Replace => re
                    .replace_all(&text, rule.replacement.as_str())
                    .into_owned(),
            };
            out.set_value(row, col, Value::Text(cleaned));
        }
    }

    (out, warnings)
}

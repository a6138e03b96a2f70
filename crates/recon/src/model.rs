use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use tallygrid_core::{Table, Value};

// ---------------------------------------------------------------------------
// Canonical column names
// ---------------------------------------------------------------------------

/// Canonical name of the manual-side quantity in merged output.
pub const MANUAL_QUANTITY: &str = "manual_quantity";
/// Canonical name of the system-side total in merged output.
pub const SYSTEM_TOTAL: &str = "system_total";
pub const DIFFERENCE_COLUMN: &str = "difference";
pub const STATUS_COLUMN: &str = "status";

/// Legacy spreadsheet aliases accepted in difference formulas.
pub const MANUAL_QUANTITY_ALIAS: &str = "手工数量";
pub const SYSTEM_TOTAL_ALIAS: &str = "系统总计";

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Classification of one reconciled key. Computed once at merge time,
/// immutable thereafter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Match,
    Differ,
    SystemOnly,
    ManualOnly,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Match => "match",
            Self::Differ => "differ",
            Self::SystemOnly => "system_only",
            Self::ManualOnly => "manual_only",
        }
    }

    /// Spreadsheet marker used in human-facing summaries.
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Match => "✓",
            Self::Differ => "↕",
            Self::SystemOnly | Self::ManualOnly => "✗",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Summary + Output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize)]
pub struct Summary {
    pub total_keys: usize,
    pub matched: usize,
    pub differing: usize,
    pub manual_only: usize,
    pub system_only: usize,
}

impl Summary {
    pub fn record(&mut self, status: Status) {
        self.total_keys += 1;
        match status {
            Status::Match => self.matched += 1,
            Status::Differ => self.differing += 1,
            Status::ManualOnly => self.manual_only += 1,
            Status::SystemOnly => self.system_only += 1,
        }
    }

    pub fn all_matched(&self) -> bool {
        self.differing == 0 && self.manual_only == 0 && self.system_only == 0
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunMeta {
    pub config_name: String,
    pub engine_version: String,
    pub run_at: String,
}

/// Full output of one reconciliation run. `table` holds the result in the
/// canonical column order: key, pivot categories (ascending), system
/// total, manual quantity, difference, status.
#[derive(Debug, Clone, Serialize)]
pub struct ReconResult {
    pub meta: RunMeta,
    pub summary: Summary,
    pub pivot_values: Vec<String>,
    pub warnings: Vec<ReconWarning>,
    pub table: Table,
}

// ---------------------------------------------------------------------------
// Warnings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Manual,
    System,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Manual => write!(f, "manual"),
            Self::System => write!(f, "system"),
        }
    }
}

/// A degradation the engine absorbed instead of failing the run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ReconWarning {
    /// A cleaning rule had an invalid pattern and was skipped.
    CleanRuleSkipped {
        column: String,
        pattern: String,
        reason: String,
    },
    /// A configured column is absent from the dataset.
    ColumnMissing { side: Side, column: String },
    /// The difference formula failed to parse; the default difference
    /// applies to every row.
    FormulaRejected { formula: String, reason: String },
    /// The difference formula failed to evaluate on some rows, which fell
    /// back to the default difference.
    FormulaFallback { rows: usize, reason: String },
    /// No key columns configured; the run produced an empty result.
    NoKeyColumns,
}

impl fmt::Display for ReconWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CleanRuleSkipped { column, pattern, reason } => {
                write!(f, "clean rule on '{column}' skipped: invalid pattern '{pattern}' ({reason})")
            }
            Self::ColumnMissing { side, column } => {
                write!(f, "{side} column '{column}' not found in dataset")
            }
            Self::FormulaRejected { formula, reason } => {
                write!(f, "difference formula '{formula}' rejected ({reason}); using default difference")
            }
            Self::FormulaFallback { rows, reason } => {
                write!(f, "difference formula fell back to default on {rows} row(s) ({reason})")
            }
            Self::NoKeyColumns => write!(f, "no key columns configured; result is empty"),
        }
    }
}

// ---------------------------------------------------------------------------
// Preview
// ---------------------------------------------------------------------------

/// One sample match from the preview contract: a key plus the first row
/// carrying it on each side.
#[derive(Debug, Clone, Serialize)]
pub struct PreviewRow {
    pub key: String,
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manual: Option<BTreeMap<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<BTreeMap<String, Value>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_are_stable() {
        // exporters key colors off these strings
        assert_eq!(Status::Match.to_string(), "match");
        assert_eq!(Status::Differ.to_string(), "differ");
        assert_eq!(Status::SystemOnly.to_string(), "system_only");
        assert_eq!(Status::ManualOnly.to_string(), "manual_only");
        assert_eq!(serde_json::to_string(&Status::SystemOnly).unwrap(), "\"system_only\"");
    }

    #[test]
    fn status_symbols() {
        assert_eq!(Status::Match.symbol(), "✓");
        assert_eq!(Status::Differ.symbol(), "↕");
        assert_eq!(Status::ManualOnly.symbol(), "✗");
    }

    #[test]
    fn summary_tallies_statuses() {
        let mut summary = Summary::default();
        summary.record(Status::Match);
        summary.record(Status::Match);
        summary.record(Status::Differ);
        summary.record(Status::SystemOnly);
        assert_eq!(summary.total_keys, 4);
        assert_eq!(summary.matched, 2);
        assert_eq!(summary.differing, 1);
        assert_eq!(summary.system_only, 1);
        assert!(!summary.all_matched());
        assert!(Summary::default().all_matched());
    }

    #[test]
    fn warnings_serialize_with_kind_tags() {
        let warning = ReconWarning::ColumnMissing {
            side: Side::System,
            column: "状态".into(),
        };
        let json = serde_json::to_value(&warning).unwrap();
        assert_eq!(json["kind"], "column_missing");
        assert_eq!(json["side"], "system");
        assert_eq!(json["column"], "状态");
    }
}

use tallygrid_core::{Table, Value};

use crate::aggregate::aggregate;
use crate::clean::apply_clean_rules;
use crate::config::{FlowPivotConfig, ReconConfig};
use crate::error::ReconError;
use crate::flow::aggregate_flow;
use crate::formula::DiffFormula;
use crate::key::{build_key, KEY_COLUMN};
use crate::merge::merge;
use crate::model::{
    ReconResult, ReconWarning, RunMeta, Side, Summary, DIFFERENCE_COLUMN, MANUAL_QUANTITY,
    MANUAL_QUANTITY_ALIAS, STATUS_COLUMN, SYSTEM_TOTAL, SYSTEM_TOTAL_ALIAS,
};

/// Run one reconciliation: clean (manual side) → key → aggregate/pivot →
/// merge → classify.
///
/// Infallible by design: configuration gaps degrade to empty or partial
/// output, data problems coerce to 0, formula problems fall back to the
/// default difference — all reported through `warnings`. The surrounding
/// tooling stays responsive no matter how stale the template is.
pub fn run(config: &ReconConfig, manual: &Table, system: &Table) -> ReconResult {
    let mut warnings = Vec::new();

    if config.key_mappings.is_empty() {
        warnings.push(ReconWarning::NoKeyColumns);
        return empty_result(config, warnings);
    }

    let manual_key_columns: Vec<String> =
        config.key_mappings.iter().map(|m| m.manual.clone()).collect();
    let system_key_columns: Vec<String> =
        config.key_mappings.iter().map(|m| m.system.clone()).collect();

    report_missing_columns(config, manual, system, &mut warnings);

    // Cleaning runs before keys are built so cleaned text participates in
    // matching; the system side is never cleaned.
    let (manual_cleaned, mut clean_warnings) = apply_clean_rules(manual, &config.clean_rules);
    warnings.append(&mut clean_warnings);

    let manual_keyed = build_key(&manual_cleaned, &manual_key_columns);
    let system_keyed = build_key(system, &system_key_columns);

    // Manual side: flow pivot nets outbound minus inbound when configured.
    let (manual_agg, manual_value_name) = match active_flow(config, &manual_keyed, &mut warnings) {
        Some(flow_cfg) => {
            let out = aggregate_flow(
                &manual_keyed,
                KEY_COLUMN,
                &config.value_mapping.manual,
                flow_cfg,
                &config.manual_filters,
            );
            (out.table, MANUAL_QUANTITY.to_string())
        }
        None => {
            let value_columns = single_column(&config.value_mapping.manual);
            let out = aggregate(
                &manual_keyed,
                KEY_COLUMN,
                &value_columns,
                None,
                &config.manual_filters,
            );
            (out.table, config.value_mapping.manual.clone())
        }
    };

    // System side: categorical pivot when configured.
    let pivot_column = config
        .pivot
        .as_ref()
        .map(|p| p.system_column.as_str())
        .filter(|c| !c.trim().is_empty());
    let value_columns = single_column(&config.value_mapping.system);
    let system_out = aggregate(
        &system_keyed,
        KEY_COLUMN,
        &value_columns,
        pivot_column,
        &config.system_filters,
    );
    let system_value_name = if system_out.table.has_column(SYSTEM_TOTAL) {
        SYSTEM_TOTAL.to_string()
    } else {
        config.value_mapping.system.clone()
    };

    let formula = parse_formula(
        &config.difference_formula,
        &system_out.pivot_values,
        &mut warnings,
    );

    let merged = merge(
        &manual_agg,
        &system_out.table,
        KEY_COLUMN,
        &manual_value_name,
        &system_value_name,
        formula.as_ref(),
        &system_out.pivot_values,
    );
    warnings.extend(merged.warnings);

    ReconResult {
        meta: meta_for(config),
        summary: merged.summary,
        pivot_values: system_out.pivot_values,
        warnings,
        table: merged.table,
    }
}

fn meta_for(config: &ReconConfig) -> RunMeta {
    RunMeta {
        config_name: config.name.clone(),
        engine_version: env!("CARGO_PKG_VERSION").to_string(),
        run_at: chrono::Utc::now().to_rfc3339(),
    }
}

fn empty_result(config: &ReconConfig, warnings: Vec<ReconWarning>) -> ReconResult {
    let table = Table::new(vec![
        KEY_COLUMN.to_string(),
        SYSTEM_TOTAL.to_string(),
        MANUAL_QUANTITY.to_string(),
        DIFFERENCE_COLUMN.to_string(),
        STATUS_COLUMN.to_string(),
    ]);
    ReconResult {
        meta: meta_for(config),
        summary: Summary::default(),
        pivot_values: Vec::new(),
        warnings,
        table,
    }
}

fn single_column(name: &str) -> Vec<String> {
    if name.trim().is_empty() {
        Vec::new()
    } else {
        vec![name.to_string()]
    }
}

/// The flow pivot participates only when it names a column present in the
/// manual data and lists at least one category.
fn active_flow<'a>(
    config: &'a ReconConfig,
    manual: &Table,
    warnings: &mut Vec<ReconWarning>,
) -> Option<&'a FlowPivotConfig> {
    let flow = config.manual_pivot.as_ref()?;
    if flow.pivot_column.trim().is_empty() || !flow.has_values() {
        return None;
    }
    if !manual.has_column(&flow.pivot_column) {
        warnings.push(ReconWarning::ColumnMissing {
            side: Side::Manual,
            column: flow.pivot_column.clone(),
        });
        return None;
    }
    Some(flow)
}

fn report_missing_columns(
    config: &ReconConfig,
    manual: &Table,
    system: &Table,
    warnings: &mut Vec<ReconWarning>,
) {
    let manual_value = &config.value_mapping.manual;
    if !manual_value.trim().is_empty() && !manual.has_column(manual_value) {
        warnings.push(ReconWarning::ColumnMissing {
            side: Side::Manual,
            column: manual_value.clone(),
        });
    }
    let system_value = &config.value_mapping.system;
    if !system_value.trim().is_empty() && !system.has_column(system_value) {
        warnings.push(ReconWarning::ColumnMissing {
            side: Side::System,
            column: system_value.clone(),
        });
    }
    if let Some(pivot) = &config.pivot {
        if !pivot.system_column.trim().is_empty() && !system.has_column(&pivot.system_column) {
            warnings.push(ReconWarning::ColumnMissing {
                side: Side::System,
                column: pivot.system_column.clone(),
            });
        }
    }
}

fn parse_formula(
    source: &str,
    pivot_values: &[String],
    warnings: &mut Vec<ReconWarning>,
) -> Option<DiffFormula> {
    let source = source.trim();
    if source.is_empty() {
        return None;
    }
    let mut variables: Vec<String> = vec![
        MANUAL_QUANTITY.to_string(),
        SYSTEM_TOTAL.to_string(),
        MANUAL_QUANTITY_ALIAS.to_string(),
        SYSTEM_TOTAL_ALIAS.to_string(),
    ];
    variables.extend(pivot_values.iter().cloned());

    match DiffFormula::parse(source, &variables) {
        Ok(formula) => Some(formula),
        Err(err) => {
            warnings.push(ReconWarning::FormulaRejected {
                formula: source.to_string(),
                reason: err.to_string(),
            });
            None
        }
    }
}

/// Load CSV text into a table. Numeric-looking cells become numbers, empty
/// cells stay empty, everything else is text. This is the boundary helper
/// for the CLI and tests; workbook readers live outside this crate.
pub fn load_csv_table(csv_data: &str) -> Result<Table, ReconError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(csv_data.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| ReconError::Csv(e.to_string()))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut table = Table::new(headers);
    for record in reader.records() {
        let record = record.map_err(|e| ReconError::Csv(e.to_string()))?;
        table.push_row(record.iter().map(parse_cell).collect());
    }
    Ok(table)
}

fn parse_cell(raw: &str) -> Value {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Value::Empty;
    }
    match trimmed.parse::<f64>() {
        Ok(n) => Value::Number(n),
        Err(_) => Value::Text(raw.to_string()),
    }
}

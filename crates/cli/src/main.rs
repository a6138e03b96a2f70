// TallyGrid CLI - headless reconciliation runs

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tallygrid_core::Table;
use tallygrid_recon::config::{suggest_key_mappings, suggest_value_mapping};
use tallygrid_recon::preview::sample_matches;
use tallygrid_recon::{load_csv_table, run, ReconConfig, ReconResult, Status};

// =============================================================================
// Exit codes — part of the shell contract; scripts rely on them.
// =============================================================================

/// Success: run completed and every key matched.
pub const EXIT_SUCCESS: u8 = 0;
/// Runtime error: unreadable file, bad CSV, serialization failure.
pub const EXIT_RUNTIME: u8 = 1;
/// Usage/config error: bad arguments or an invalid template.
pub const EXIT_USAGE: u8 = 2;
/// The run completed but found differing or one-sided keys.
pub const EXIT_DIFFERENCES: u8 = 3;

#[derive(Debug)]
struct CliError {
    code: u8,
    message: String,
    hint: Option<String>,
}

impl CliError {
    fn runtime(msg: impl Into<String>) -> Self {
        Self {
            code: EXIT_RUNTIME,
            message: msg.into(),
            hint: None,
        }
    }

    fn usage(msg: impl Into<String>) -> Self {
        Self {
            code: EXIT_USAGE,
            message: msg.into(),
            hint: None,
        }
    }
}

// =============================================================================
// Arguments
// =============================================================================

#[derive(Parser)]
#[command(name = "tgrid")]
#[command(about = "Two-sided tabular reconciliation (headless)")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a reconciliation from a TOML template and two CSV files
    #[command(after_help = "\
Examples:
  tgrid run recon.toml --manual asn.csv --system wms.csv
  tgrid run recon.toml --manual asn.csv --system wms.csv --json
  tgrid run recon.toml --manual asn.csv --system wms.csv --csv result.csv")]
    Run {
        /// Path to the reconciliation template
        config: PathBuf,

        /// Manual-side dataset (CSV)
        #[arg(long)]
        manual: PathBuf,

        /// System-side dataset (CSV)
        #[arg(long)]
        system: PathBuf,

        /// Output the full result as JSON to stdout instead of the summary
        #[arg(long)]
        json: bool,

        /// Write the full result as JSON to a file
        #[arg(long)]
        output: Option<PathBuf>,

        /// Write the result table as CSV to a file
        #[arg(long)]
        csv: Option<PathBuf>,
    },

    /// Validate a template without running
    #[command(after_help = "\
Examples:
  tgrid validate recon.toml
  tgrid validate recon.toml --manual asn.csv --system wms.csv")]
    Validate {
        /// Path to the reconciliation template
        config: PathBuf,

        /// Check column references against this manual-side CSV
        #[arg(long)]
        manual: Option<PathBuf>,

        /// Check column references against this system-side CSV
        #[arg(long)]
        system: Option<PathBuf>,
    },

    /// Print sample key matches between both datasets as JSON
    Preview {
        /// Path to the reconciliation template
        config: PathBuf,

        /// Manual-side dataset (CSV)
        #[arg(long)]
        manual: PathBuf,

        /// System-side dataset (CSV)
        #[arg(long)]
        system: PathBuf,

        /// Maximum sample rows
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match dispatch(cli.command) {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(err) => {
            eprintln!("error: {}", err.message);
            if let Some(hint) = err.hint {
                eprintln!("hint: {hint}");
            }
            ExitCode::from(err.code)
        }
    }
}

fn dispatch(command: Commands) -> Result<(), CliError> {
    match command {
        Commands::Run {
            config,
            manual,
            system,
            json,
            output,
            csv,
        } => cmd_run(config, manual, system, json, output, csv),
        Commands::Validate {
            config,
            manual,
            system,
        } => cmd_validate(config, manual, system),
        Commands::Preview {
            config,
            manual,
            system,
            limit,
        } => cmd_preview(config, manual, system, limit),
    }
}

// =============================================================================
// Commands
// =============================================================================

fn cmd_run(
    config_path: PathBuf,
    manual_path: PathBuf,
    system_path: PathBuf,
    json_output: bool,
    output_file: Option<PathBuf>,
    csv_file: Option<PathBuf>,
) -> Result<(), CliError> {
    let config = read_config(&config_path)?;
    let manual = read_table(&manual_path)?;
    let system = read_table(&system_path)?;

    let result = run(&config, &manual, &system);

    if let Some(path) = &output_file {
        let json = serde_json::to_string_pretty(&result)
            .map_err(|e| CliError::runtime(format!("JSON serialization error: {e}")))?;
        std::fs::write(path, json)
            .map_err(|e| CliError::runtime(format!("cannot write {}: {e}", path.display())))?;
        eprintln!("wrote {}", path.display());
    }

    if let Some(path) = &csv_file {
        write_table_csv(&result.table, path)?;
        eprintln!("wrote {}", path.display());
    }

    if json_output {
        let json = serde_json::to_string_pretty(&result)
            .map_err(|e| CliError::runtime(format!("JSON serialization error: {e}")))?;
        println!("{json}");
    }

    print_summary(&result);

    if result.summary.all_matched() {
        Ok(())
    } else {
        Err(CliError {
            code: EXIT_DIFFERENCES,
            message: "differences found".into(),
            hint: None,
        })
    }
}

fn print_summary(result: &ReconResult) {
    for warning in &result.warnings {
        eprintln!("warning: {warning}");
    }
    let s = &result.summary;
    eprintln!(
        "{} keys — {} {} matched, {} {} differing, {} {} manual-only, {} {} system-only",
        s.total_keys,
        Status::Match.symbol(),
        s.matched,
        Status::Differ.symbol(),
        s.differing,
        Status::ManualOnly.symbol(),
        s.manual_only,
        Status::SystemOnly.symbol(),
        s.system_only,
    );
}

fn cmd_validate(
    config_path: PathBuf,
    manual_path: Option<PathBuf>,
    system_path: Option<PathBuf>,
) -> Result<(), CliError> {
    let config = read_config(&config_path)?;

    eprintln!(
        "valid: '{}' with {} key mapping(s), {} manual filter(s), {} system filter(s), {} clean rule(s)",
        config.name,
        config.key_mappings.len(),
        config.manual_filters.len(),
        config.system_filters.len(),
        config.clean_rules.len(),
    );

    let (Some(manual_path), Some(system_path)) = (manual_path, system_path) else {
        return Ok(());
    };
    let manual = read_table(&manual_path)?;
    let system = read_table(&system_path)?;

    let mut missing = Vec::new();
    for mapping in &config.key_mappings {
        if !manual.has_column(&mapping.manual) {
            missing.push(format!("manual key column '{}'", mapping.manual));
        }
        if !system.has_column(&mapping.system) {
            missing.push(format!("system key column '{}'", mapping.system));
        }
    }
    if !config.value_mapping.manual.is_empty() && !manual.has_column(&config.value_mapping.manual) {
        missing.push(format!("manual value column '{}'", config.value_mapping.manual));
    }
    if !config.value_mapping.system.is_empty() && !system.has_column(&config.value_mapping.system) {
        missing.push(format!("system value column '{}'", config.value_mapping.system));
    }

    if missing.is_empty() {
        eprintln!("all mapped columns present in both datasets");
        return Ok(());
    }

    for entry in &missing {
        eprintln!("missing: {entry}");
    }

    // Suggest mappings from the default column aliases.
    let suggestions = suggest_key_mappings(manual.columns(), system.columns());
    for suggestion in &suggestions {
        eprintln!("suggest key mapping: {} -> {}", suggestion.manual, suggestion.system);
    }
    if let Some(values) = suggest_value_mapping(manual.columns(), system.columns()) {
        eprintln!("suggest value mapping: {} -> {}", values.manual, values.system);
    }

    Err(CliError::usage("template references missing columns"))
}

fn cmd_preview(
    config_path: PathBuf,
    manual_path: PathBuf,
    system_path: PathBuf,
    limit: usize,
) -> Result<(), CliError> {
    let config = read_config(&config_path)?;
    let manual = read_table(&manual_path)?;
    let system = read_table(&system_path)?;

    let manual_keys: Vec<String> = config.key_mappings.iter().map(|m| m.manual.clone()).collect();
    let system_keys: Vec<String> = config.key_mappings.iter().map(|m| m.system.clone()).collect();

    let preview = sample_matches(&manual, &system, &manual_keys, &system_keys, limit);
    let json = serde_json::to_string_pretty(&preview)
        .map_err(|e| CliError::runtime(format!("JSON serialization error: {e}")))?;
    println!("{json}");
    Ok(())
}

// =============================================================================
// IO helpers
// =============================================================================

fn read_config(path: &Path) -> Result<ReconConfig, CliError> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| CliError::runtime(format!("cannot read {}: {e}", path.display())))?;
    ReconConfig::from_toml(&text).map_err(|e| CliError::usage(e.to_string()))
}

fn read_table(path: &Path) -> Result<Table, CliError> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| CliError::runtime(format!("cannot read {}: {e}", path.display())))?;
    load_csv_table(&text).map_err(|e| CliError::runtime(e.to_string()))
}

fn write_table_csv(table: &Table, path: &Path) -> Result<(), CliError> {
    let mut writer = csv::Writer::from_path(path)
        .map_err(|e| CliError::runtime(format!("cannot write {}: {e}", path.display())))?;
    writer
        .write_record(table.columns())
        .map_err(|e| CliError::runtime(e.to_string()))?;
    for row in 0..table.row_count() {
        let record: Vec<String> = (0..table.columns().len())
            .map(|col| table.value_at(row, col).to_text())
            .collect();
        writer
            .write_record(&record)
            .map_err(|e| CliError::runtime(e.to_string()))?;
    }
    writer.flush().map_err(|e| CliError::runtime(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(dir: &tempfile::TempDir, name: &str, contents: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    const CONFIG: &str = r#"
name = "cli test"

[[key_mappings]]
manual = "订单号"
system = "order_no"

[value_mapping]
manual = "数量"
system = "qty"
"#;

    #[test]
    fn run_writes_result_csv() {
        let dir = tempfile::tempdir().unwrap();
        let config = write_file(&dir, "recon.toml", CONFIG);
        let manual = write_file(&dir, "manual.csv", "订单号,数量\nA001,100\n");
        let system = write_file(&dir, "system.csv", "order_no,qty\nA001,100\n");
        let out = dir.path().join("result.csv");

        cmd_run(config, manual, system, false, None, Some(out.clone())).unwrap();

        let written = std::fs::read_to_string(&out).unwrap();
        let mut lines = written.lines();
        assert_eq!(
            lines.next().unwrap(),
            "__KEY__,system_total,manual_quantity,difference,status"
        );
        assert_eq!(lines.next().unwrap(), "A001,100,100,0,match");
    }

    #[test]
    fn run_exits_nonzero_on_differences() {
        let dir = tempfile::tempdir().unwrap();
        let config = write_file(&dir, "recon.toml", CONFIG);
        let manual = write_file(&dir, "manual.csv", "订单号,数量\nA001,100\n");
        let system = write_file(&dir, "system.csv", "order_no,qty\nA001,80\n");

        let err = cmd_run(config, manual, system, false, None, None).unwrap_err();
        assert_eq!(err.code, EXIT_DIFFERENCES);
    }

    #[test]
    fn invalid_config_is_a_usage_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = write_file(&dir, "recon.toml", "name = \"no keys\"");
        let err = cmd_validate(config, None, None).unwrap_err();
        assert_eq!(err.code, EXIT_USAGE);
    }

    #[test]
    fn validate_flags_missing_columns() {
        let dir = tempfile::tempdir().unwrap();
        let config = write_file(&dir, "recon.toml", CONFIG);
        let manual = write_file(&dir, "manual.csv", "到货单号,数量\nA001,100\n");
        let system = write_file(&dir, "system.csv", "order_no,qty\nA001,100\n");

        let err = cmd_validate(config, Some(manual), Some(system)).unwrap_err();
        assert_eq!(err.code, EXIT_USAGE);
    }
}

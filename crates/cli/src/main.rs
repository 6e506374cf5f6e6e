// SpendGrid CLI - headless purchase register cleanup

mod exit_codes;
mod pipeline;
mod rollup;

use std::collections::BTreeMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{ArgAction, Parser, Subcommand};
use log::warn;
use serde::Serialize;
use spendgrid_io::FileFormat;
use spendgrid_spend::abc::{AbcClass, ClassTotals, SpendGroup};
use spendgrid_spend::amount::clean_amount;
use spendgrid_spend::model::FieldSummary;
use spendgrid_spend::normalize::{harmonizable_fields, is_master_like_column};
use spendgrid_spend::{
    classify_abc, harmonize, AbcCutoffs, HarmonizeOptions, MappingEntry, SpendError, Table,
};

use exit_codes::{spend_exit_code, EXIT_IO, EXIT_PARSE, EXIT_SUCCESS, EXIT_USAGE};

#[derive(Parser)]
#[command(name = "sgrid")]
#[command(about = "Procurement spend cleanup: fuzzy name harmonization and ABC classification")]
#[command(long_version = long_version())]
#[command(version)]
#[command(subcommand_required = false)]
struct Cli {
    /// More log output on stderr (-v info, -vv debug). RUST_LOG overrides.
    #[arg(long, short = 'v', action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Fuzzy-harmonize text columns (adds <COL>__H and <COL>__CHANGED)
    #[command(after_help = "\
Values are compared after lower-casing, stripping punctuation and collapsing
whitespace. Each cluster is rewritten to its most frequent raw spelling.

Examples:
  sgrid harmonize register.csv --column 'Vendor Name'
  sgrid harmonize register.xlsx -c Vendor,Plant -o clean.xlsx
  sgrid harmonize register.csv -c Vendor --threshold 0.88 --mapping vendors.csv
  sgrid harmonize register.csv -c Vendor -o clean.csv --json | jq .columns")]
    Harmonize {
        /// Input file (csv, tsv, xlsx, xls, ods)
        input: PathBuf,

        /// Column(s) to harmonize. Repeatable; comma-separated accepted.
        #[arg(long, short = 'c', required = true, value_delimiter = ',')]
        column: Vec<String>,

        /// Minimum similarity for two values to merge (0..1)
        #[arg(long, default_value_t = 0.92)]
        threshold: f64,

        /// Values shorter than this never fuzzy-match
        #[arg(long, default_value_t = 3)]
        min_len: usize,

        /// Ceiling on distinct values entering clustering
        #[arg(long, default_value_t = 2000)]
        max_uniques: usize,

        /// Sheet name for workbook inputs (default: first sheet)
        #[arg(long)]
        sheet: Option<String>,

        /// Output file (omit for CSV on stdout)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,

        /// Write the raw -> canonical audit table to this file
        #[arg(long)]
        mapping: Option<PathBuf>,

        /// Print a JSON summary to stdout instead of the table
        #[arg(long)]
        json: bool,
    },

    /// Classify rows into A/B/C by cumulative spend of their group (adds ABC_Class)
    #[command(after_help = "\
Groups are ranked by total spend. A group is A while the cumulative share is
within --a-cut, B within --b-cut, else C.

Examples:
  sgrid abc register.csv --group Material_No --spend Amount
  sgrid abc clean.csv -g _supplier_h -s _spend --a-cut 0.7 --b-cut 0.9 -o abc.csv
  sgrid abc clean.csv -g _supplier_h -s _spend --json")]
    Abc {
        /// Input file (csv, tsv, xlsx, xls, ods)
        input: PathBuf,

        /// Grouping column
        #[arg(long, short = 'g')]
        group: String,

        /// Spend column (thousands separators and currency symbols are stripped)
        #[arg(long, short = 's')]
        spend: String,

        /// Cumulative share cutoff for class A
        #[arg(long, default_value_t = 0.80)]
        a_cut: f64,

        /// Cumulative share cutoff for class B
        #[arg(long, default_value_t = 0.95)]
        b_cut: f64,

        /// Sheet name for workbook inputs (default: first sheet)
        #[arg(long)]
        sheet: Option<String>,

        /// Output file (omit for CSV on stdout)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,

        /// Print the ranked groups as JSON to stdout instead of the table
        #[arg(long)]
        json: bool,
    },

    /// Run a pipeline from a TOML config file
    #[command(after_help = "\
Paths in the config are relative to the config file's directory.

Examples:
  sgrid run pipeline.toml
  sgrid run pipeline.toml -o clean.xlsx
  sgrid run pipeline.toml --input april.csv -o april_clean.csv --mappings audit/
  sgrid run pipeline.toml -o clean.csv --json")]
    Run {
        /// Path to the pipeline .toml config
        config: PathBuf,

        /// Input file (overrides `input` in the config)
        #[arg(long, short = 'i')]
        input: Option<PathBuf>,

        /// Output file (overrides `output.file`; omit both for CSV on stdout)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,

        /// Directory for per-column mapping tables (overrides `output.mappings`)
        #[arg(long)]
        mappings: Option<PathBuf>,

        /// Print the run summary as JSON to stdout
        #[arg(long)]
        json: bool,
    },

    /// Validate a pipeline config without running it
    #[command(after_help = "\
Examples:
  sgrid validate pipeline.toml")]
    Validate {
        /// Path to the pipeline .toml config
        config: PathBuf,
    },

    /// Spend rollup by a column, or a monthly trend
    #[command(after_help = "\
Works on pipeline output: spend is read from --spend (default _spend) and
dates from _date_iso. Rows without a date are kept by --from/--to.

Examples:
  sgrid rollup clean.csv --by _supplier_h --top 10
  sgrid rollup clean.csv --by _plant_h --where '_capexopex=CAPEX'
  sgrid rollup clean.csv --by _department_h --from 2025-04-01 --to 2025-06-30 --json
  sgrid rollup clean.csv --trend")]
    Rollup {
        /// Input file (csv, tsv, xlsx, xls, ods)
        input: PathBuf,

        /// Column to group by
        #[arg(long, required_unless_present = "trend")]
        by: Option<String>,

        /// Spend column
        #[arg(long, default_value = "_spend")]
        spend: String,

        /// Keep the N biggest groups (0 = all)
        #[arg(long, default_value_t = 10)]
        top: usize,

        /// Filter rows: 'COLUMN=V1,V2'. Repeatable.
        #[arg(long, value_name = "EXPR")]
        r#where: Vec<String>,

        /// Earliest date (YYYY-MM-DD, inclusive)
        #[arg(long)]
        from: Option<String>,

        /// Latest date (YYYY-MM-DD, inclusive)
        #[arg(long)]
        to: Option<String>,

        /// Spend per month instead of per group
        #[arg(long)]
        trend: bool,

        /// Sheet name for workbook inputs (default: first sheet)
        #[arg(long)]
        sheet: Option<String>,

        /// Output JSON to stdout instead of a text table
        #[arg(long)]
        json: bool,
    },

    /// List columns suitable for fuzzy harmonization
    #[command(after_help = "\
ID/code/number columns and mostly-numeric columns are left out.

Examples:
  sgrid fields register.xlsx
  sgrid fields register.csv --json")]
    Fields {
        /// Input file (csv, tsv, xlsx, xls, ods)
        input: PathBuf,

        /// Sheet name for workbook inputs (default: first sheet)
        #[arg(long)]
        sheet: Option<String>,

        /// Output JSON array to stdout
        #[arg(long)]
        json: bool,
    },
}

fn long_version() -> &'static str {
    if cfg!(debug_assertions) {
        concat!(
            env!("CARGO_PKG_VERSION"),
            "\nengine:  spendgrid-spend ", env!("CARGO_PKG_VERSION"),
            "\nbuild:   debug",
        )
    } else {
        concat!(
            env!("CARGO_PKG_VERSION"),
            "\nengine:  spendgrid-spend ", env!("CARGO_PKG_VERSION"),
            "\nbuild:   release",
        )
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        None => {
            eprintln!("Usage: sgrid <command> [options]");
            eprintln!("       sgrid --help for more information");
            Ok(())
        }
        Some(Commands::Harmonize {
            input,
            column,
            threshold,
            min_len,
            max_uniques,
            sheet,
            output,
            mapping,
            json,
        }) => {
            let options = HarmonizeOptions { threshold, min_len, max_uniques };
            cmd_harmonize(input, column, options, sheet, output, mapping, json)
        }
        Some(Commands::Abc {
            input,
            group,
            spend,
            a_cut,
            b_cut,
            sheet,
            output,
            json,
        }) => cmd_abc(input, group, spend, AbcCutoffs { a_cut, b_cut }, sheet, output, json),
        Some(Commands::Run { config, input, output, mappings, json }) => {
            pipeline::cmd_run(config, input, output, mappings, json)
        }
        Some(Commands::Validate { config }) => pipeline::cmd_validate(config),
        Some(Commands::Rollup {
            input,
            by,
            spend,
            top,
            r#where: where_clauses,
            from,
            to,
            trend,
            sheet,
            json,
        }) => rollup::cmd_rollup(rollup::RollupArgs {
            input,
            sheet,
            by,
            spend,
            top,
            where_clauses,
            from,
            to,
            trend,
            json,
        }),
        Some(Commands::Fields { input, sheet, json }) => cmd_fields(input, sheet, json),
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn args(msg: impl Into<String>) -> Self {
        Self { code: EXIT_USAGE, message: msg.into(), hint: None }
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self { code: EXIT_IO, message: msg.into(), hint: None }
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        Self { code: EXIT_PARSE, message: msg.into(), hint: None }
    }

    /// Engine error with its registry exit code. Missing columns get the
    /// table's headers as a hint.
    pub fn spend(err: SpendError, table: Option<&Table>) -> Self {
        let hint = match (&err, table) {
            (SpendError::MissingColumn { .. }, Some(t)) => {
                Some(format!("available columns: {}", t.headers.join(", ")))
            }
            _ => None,
        };
        Self { code: spend_exit_code(&err), message: err.to_string(), hint }
    }

    /// Add a hint to an existing error.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

// ============================================================================
// Shared file helpers
// ============================================================================

pub(crate) fn load_table(path: &Path, sheet: Option<&str>) -> Result<Table, CliError> {
    if !path.exists() {
        return Err(CliError::io(format!("{}: no such file", path.display())));
    }
    let format = FileFormat::from_path(path).map_err(CliError::args)?;
    let table = match (format, sheet) {
        (FileFormat::Workbook, Some(name)) => spendgrid_io::xlsx::import(path, Some(name)),
        (_, Some(_)) => {
            return Err(CliError::args("--sheet only applies to workbook inputs"));
        }
        _ => spendgrid_io::import(path),
    }
    .map_err(CliError::parse)?;

    if table.headers.is_empty() {
        return Err(CliError::parse(format!("{}: no header row", path.display())));
    }
    Ok(table)
}

/// Write to `output`, or CSV on stdout when there is none.
pub(crate) fn write_table(table: &Table, output: Option<&Path>) -> Result<(), CliError> {
    match output {
        Some(path) => {
            spendgrid_io::export(table, path).map_err(CliError::io)?;
            eprintln!("wrote {}", path.display());
            Ok(())
        }
        None => {
            let stdout = io::stdout();
            spendgrid_io::csv::write_csv(table, stdout.lock()).map_err(CliError::io)
        }
    }
}

pub(crate) fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| CliError::io(format!("JSON serialization error: {e}")))?;
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    writeln!(handle, "{}", json).map_err(|e| CliError::io(e.to_string()))
}

/// Audit rows as a table: one row per distinct raw value.
pub(crate) fn mapping_table(column: &str, entries: &[MappingEntry]) -> Table {
    Table {
        headers: vec![
            "column".to_string(),
            "raw".to_string(),
            "normalized".to_string(),
            "canonical".to_string(),
        ],
        rows: entries
            .iter()
            .map(|m| {
                vec![
                    column.to_string(),
                    m.raw.clone(),
                    m.normalized.clone(),
                    m.canonical.clone(),
                ]
            })
            .collect(),
    }
}

fn flag(value: bool) -> String {
    if value { "true" } else { "false" }.to_string()
}

// ============================================================================
// harmonize
// ============================================================================

#[derive(Serialize)]
struct HarmonizeReport {
    rows: usize,
    columns: Vec<FieldSummary>,
}

fn cmd_harmonize(
    input: PathBuf,
    columns: Vec<String>,
    options: HarmonizeOptions,
    sheet: Option<String>,
    output: Option<PathBuf>,
    mapping: Option<PathBuf>,
    json: bool,
) -> Result<(), CliError> {
    options.validate().map_err(|e| CliError::spend(e, None))?;
    let mut table = load_table(&input, sheet.as_deref())?;

    let mut report = HarmonizeReport { rows: table.len(), columns: Vec::new() };
    let mut audit = mapping_table("", &[]);

    for column in &columns {
        let idx = table
            .require_column(column)
            .map_err(|e| CliError::spend(e, Some(&table)))?;
        let header = table.headers[idx].clone();
        let out_col = format!("{}__H", header);
        let changed_col = format!("{}__CHANGED", header);

        let raw: Vec<String> = table
            .column(idx)
            .into_iter()
            .map(|v| v.unwrap_or("").to_string())
            .collect();

        if is_master_like_column(&header) {
            warn!("'{}' looks like an ID/code column, copied without harmonizing", header);
            let n = raw.len();
            table.set_column(&out_col, raw).map_err(|e| CliError::spend(e, None))?;
            table
                .set_column(&changed_col, vec![flag(false); n])
                .map_err(|e| CliError::spend(e, None))?;
            continue;
        }

        let values: Vec<Option<&str>> = raw.iter().map(|v| Some(v.as_str())).collect();
        let result = harmonize(&values, &options).map_err(|e| CliError::spend(e, None))?;

        eprintln!(
            "{}: {} distinct -> {} clusters, {} rows changed",
            header, result.stats.distinct, result.stats.clusters, result.stats.changed_rows
        );
        if result.stats.passed_through > 0 {
            eprintln!(
                "  {} values beyond --max-uniques kept as-is",
                result.stats.passed_through
            );
        }

        audit.rows.extend(mapping_table(&header, &result.mapping).rows);

        report.columns.push(FieldSummary {
            column: header.clone(),
            output: out_col.clone(),
            distinct: result.stats.distinct,
            clusters: result.stats.clusters,
            changed_rows: result.stats.changed_rows,
            passed_through: result.stats.passed_through,
        });

        let changed = result.changed.iter().map(|c| flag(*c)).collect();
        table
            .set_column(&out_col, result.canonical)
            .map_err(|e| CliError::spend(e, None))?;
        table
            .set_column(&changed_col, changed)
            .map_err(|e| CliError::spend(e, None))?;
    }

    if let Some(path) = mapping {
        spendgrid_io::export(&audit, &path).map_err(CliError::io)?;
        eprintln!("wrote {}", path.display());
    }

    if json {
        if let Some(path) = output.as_deref() {
            write_table(&table, Some(path))?;
        }
        print_json(&report)
    } else {
        write_table(&table, output.as_deref())
    }
}

// ============================================================================
// abc
// ============================================================================

#[derive(Serialize)]
struct AbcReport<'a> {
    rows: usize,
    total: f64,
    by_class: &'a BTreeMap<AbcClass, ClassTotals>,
    groups: &'a [SpendGroup],
}

fn cmd_abc(
    input: PathBuf,
    group: String,
    spend: String,
    cutoffs: AbcCutoffs,
    sheet: Option<String>,
    output: Option<PathBuf>,
    json: bool,
) -> Result<(), CliError> {
    cutoffs.validate().map_err(|e| CliError::spend(e, None))?;
    let mut table = load_table(&input, sheet.as_deref())?;

    let group_idx = table
        .require_column(&group)
        .map_err(|e| CliError::spend(e, Some(&table)))?;
    let spend_idx = table
        .require_column(&spend)
        .map_err(|e| CliError::spend(e, Some(&table)))?;

    let keys = table.column(group_idx);
    let amounts = table.column(spend_idx);
    let rows: Vec<(Option<&str>, Option<f64>)> = keys
        .into_iter()
        .zip(amounts)
        .map(|(k, a)| (k.map(str::trim), a.and_then(clean_amount)))
        .collect();

    let result = classify_abc(&rows, &cutoffs).map_err(|e| CliError::spend(e, None))?;

    let mut line = format!(
        "abc: {} groups, total spend {:.2}",
        result.groups.len(),
        result.total
    );
    for (class, totals) in &result.by_class {
        line.push_str(&format!(
            "; {} {} groups {:.2}",
            class, totals.groups, totals.spend
        ));
    }
    eprintln!("{}", line);

    let labels = result.classes.iter().map(|c| c.to_string()).collect();
    table
        .set_column("ABC_Class", labels)
        .map_err(|e| CliError::spend(e, None))?;

    if json {
        if let Some(path) = output.as_deref() {
            write_table(&table, Some(path))?;
        }
        print_json(&AbcReport {
            rows: table.len(),
            total: result.total,
            by_class: &result.by_class,
            groups: &result.groups,
        })
    } else {
        write_table(&table, output.as_deref())
    }
}

// ============================================================================
// fields
// ============================================================================

fn cmd_fields(input: PathBuf, sheet: Option<String>, json: bool) -> Result<(), CliError> {
    let table = load_table(&input, sheet.as_deref())?;
    let fields = harmonizable_fields(&table);

    if json {
        return print_json(&fields);
    }

    let stdout = io::stdout();
    let mut handle = stdout.lock();
    for name in &fields {
        writeln!(handle, "{}", name).map_err(|e| CliError::io(e.to_string()))?;
    }
    eprintln!("{} of {} columns can be harmonized", fields.len(), table.headers.len());
    Ok(())
}

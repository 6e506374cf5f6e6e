//! `sgrid run` / `sgrid validate`: config-driven pipeline runs.

use std::path::{Path, PathBuf};

use spendgrid_io::FileFormat;
use spendgrid_spend::{PipelineConfig, PipelineOutput, RunSummary, Table};

use crate::{load_table, mapping_table, print_json, write_table, CliError};

fn read_config(config_path: &Path) -> Result<PipelineConfig, CliError> {
    let config_str = std::fs::read_to_string(config_path)
        .map_err(|e| CliError::io(format!("cannot read config {}: {e}", config_path.display())))?;
    PipelineConfig::from_toml(&config_str).map_err(|e| CliError::spend(e, None))
}

pub fn cmd_run(
    config_path: PathBuf,
    input: Option<PathBuf>,
    output: Option<PathBuf>,
    mappings: Option<PathBuf>,
    json: bool,
) -> Result<(), CliError> {
    let config = read_config(&config_path)?;

    // Resolve file paths relative to config file's directory
    let base_dir = config_path.parent().unwrap_or_else(|| Path::new("."));

    let input_path = match (input, &config.input) {
        (Some(path), _) => path,
        (None, Some(file)) => base_dir.join(file),
        (None, None) => {
            return Err(CliError::args("no input file")
                .with_hint("pass --input or set `input` in the config"));
        }
    };
    let output_path = output.or_else(|| config.output.file.as_ref().map(|f| base_dir.join(f)));
    let mappings_dir =
        mappings.or_else(|| config.output.mappings.as_ref().map(|d| base_dir.join(d)));

    let table = load_table(&input_path, None)?;
    let result =
        spendgrid_spend::run(&config, &table).map_err(|e| CliError::spend(e, Some(&table)))?;

    write_outputs(&result, output_path.as_deref(), json)?;
    if let Some(dir) = mappings_dir {
        write_mappings(&result, &dir)?;
    }

    if json {
        print_json(&result.summary)?;
    }
    print_summary(&result.summary);
    Ok(())
}

/// Workbook outputs carry one extra sheet per mapping table.
fn write_outputs(result: &PipelineOutput, output: Option<&Path>, json: bool) -> Result<(), CliError> {
    let Some(path) = output else {
        if json {
            eprintln!("note: no output file given, harmonized table not written");
            return Ok(());
        }
        return write_table(&result.table, None);
    };

    if FileFormat::from_path(path).map_err(CliError::args)? != FileFormat::Workbook {
        return write_table(&result.table, Some(path));
    }

    let audits: Vec<(String, Table)> = result
        .mappings
        .iter()
        .map(|(column, entries)| (format!("map{}", column), mapping_table(column, entries)))
        .collect();
    let mut sheets: Vec<(&str, &Table)> = vec![("Data", &result.table)];
    sheets.extend(audits.iter().map(|(name, table)| (name.as_str(), table)));

    spendgrid_io::xlsx::export(&sheets, path).map_err(CliError::io)?;
    eprintln!("wrote {}", path.display());
    Ok(())
}

fn write_mappings(result: &PipelineOutput, dir: &Path) -> Result<(), CliError> {
    std::fs::create_dir_all(dir)
        .map_err(|e| CliError::io(format!("cannot create {}: {e}", dir.display())))?;
    for (column, entries) in &result.mappings {
        let path = dir.join(format!("mapping{}.csv", column));
        spendgrid_io::csv::export(&mapping_table(column, entries), &path).map_err(CliError::io)?;
    }
    eprintln!("wrote {} mapping table(s) to {}", result.mappings.len(), dir.display());
    Ok(())
}

// Human summary to stderr
fn print_summary(s: &RunSummary) {
    eprintln!(
        "pipeline '{}': {} rows in, {} out, total spend {:.2} ({} without spend, {} missing FX)",
        s.name, s.rows_in, s.rows_out, s.total_spend, s.spend_missing, s.missing_fx,
    );
    if s.rows_dropped > 0 {
        eprintln!("  dropped {} incomplete rows", s.rows_dropped);
    }
    for f in &s.fields {
        eprintln!(
            "  {}: {} distinct -> {} clusters, {} rows changed",
            f.output, f.distinct, f.clusters, f.changed_rows,
        );
    }
    eprintln!(
        "  dates: {} parsed, {} reformatted; {} rows harmonized overall",
        s.dates_parsed, s.dates_changed, s.any_harmonized,
    );
    if let Some(ref abc) = s.abc {
        let parts: Vec<String> = abc
            .iter()
            .map(|(class, t)| format!("{} {} groups {:.2}", class, t.groups, t.spend))
            .collect();
        eprintln!("  abc: {}", parts.join(", "));
    }
    for w in &s.warnings {
        eprintln!("warning: {}", w);
    }
}

pub fn cmd_validate(config_path: PathBuf) -> Result<(), CliError> {
    let config = read_config(&config_path)?;

    let fields: Vec<&str> = config
        .harmonize
        .selected(&config.columns)
        .iter()
        .map(|f| f.name())
        .collect();
    let abc = match config.abc {
        Some(ref abc) => format!(", abc by '{}'", abc.group),
        None => String::new(),
    };
    eprintln!(
        "valid: pipeline '{}' on amount '{}', harmonizing [{}]{}",
        config.name,
        config.columns.amount,
        fields.join(", "),
        abc,
    );
    Ok(())
}

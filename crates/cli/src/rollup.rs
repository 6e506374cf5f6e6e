//! `sgrid rollup`: spend by column or by month over harmonized output.

use std::io::{self, Write};
use std::path::PathBuf;

use chrono::NaiveDate;
use serde::Serialize;
use spendgrid_spend::analytics::{
    filter_rows, kpis, monthly_trend, spend_by, DateRange, Kpis, RollupRow, RowFilter,
};

use crate::{load_table, print_json, CliError};

const SUPPLIER_COLUMN: &str = "_supplier_h";

pub struct RollupArgs {
    pub input: PathBuf,
    pub sheet: Option<String>,
    pub by: Option<String>,
    pub spend: String,
    pub top: usize,
    pub where_clauses: Vec<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub trend: bool,
    pub json: bool,
}

#[derive(Serialize)]
struct RollupReport {
    kpis: Kpis,
    rows: Vec<RollupRow>,
}

fn parse_date(flag: &str, value: Option<&str>) -> Result<Option<NaiveDate>, CliError> {
    value
        .map(|v| {
            NaiveDate::parse_from_str(v.trim(), "%Y-%m-%d").map_err(|_| {
                CliError::args(format!("invalid {flag} date: \"{v}\""))
                    .with_hint("use YYYY-MM-DD")
            })
        })
        .transpose()
}

pub fn cmd_rollup(args: RollupArgs) -> Result<(), CliError> {
    let filters = args
        .where_clauses
        .iter()
        .map(|expr| {
            RowFilter::parse(expr).ok_or_else(|| {
                CliError::args(format!("invalid --where expression: \"{expr}\""))
                    .with_hint("expected COLUMN=VALUE or COLUMN=V1,V2")
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let range = DateRange {
        from: parse_date("--from", args.from.as_deref())?,
        to: parse_date("--to", args.to.as_deref())?,
    };
    if let (Some(from), Some(to)) = (range.from, range.to) {
        if from > to {
            return Err(CliError::args(format!("--from {from} is after --to {to}")));
        }
    }

    let table = load_table(&args.input, args.sheet.as_deref())?;
    let filtered = filter_rows(&table, &filters, &range);
    if filtered.len() < table.len() {
        eprintln!("{} of {} rows after filters", filtered.len(), table.len());
    }

    if args.trend {
        let points = monthly_trend(&filtered, &args.spend)
            .map_err(|e| CliError::spend(e, Some(&filtered)))?;
        if args.json {
            return print_json(&points);
        }
        let stdout = io::stdout();
        let mut out = stdout.lock();
        for p in &points {
            writeln!(out, "{}  {:>16.2}  {:>6}", p.month, p.spend, p.transactions)
                .map_err(|e| CliError::io(e.to_string()))?;
        }
        return Ok(());
    }

    let by = args
        .by
        .ok_or_else(|| CliError::args("--by is required unless --trend is given"))?;
    let rows = spend_by(&filtered, &by, &args.spend, args.top)
        .map_err(|e| CliError::spend(e, Some(&filtered)))?;
    let supplier = filtered.column_index(SUPPLIER_COLUMN).map(|_| SUPPLIER_COLUMN);
    let totals = kpis(&filtered, &args.spend, supplier)
        .map_err(|e| CliError::spend(e, Some(&filtered)))?;

    if args.json {
        return print_json(&RollupReport { kpis: totals, rows });
    }

    let width = rows
        .iter()
        .map(|r| r.key.chars().count())
        .max()
        .unwrap_or(0)
        .max(by.chars().count())
        .min(48);
    let stdout = io::stdout();
    let mut out = stdout.lock();
    writeln!(out, "{:<width$}  {:>16}  {:>6}  {:>6}", by, "spend", "txns", "share")
        .map_err(|e| CliError::io(e.to_string()))?;
    for r in &rows {
        let key: String = r.key.chars().take(width).collect();
        writeln!(
            out,
            "{:<width$}  {:>16.2}  {:>6}  {:>5.1}%",
            key,
            r.spend,
            r.transactions,
            r.share * 100.0
        )
        .map_err(|e| CliError::io(e.to_string()))?;
    }

    match totals.suppliers {
        Some(n) => eprintln!(
            "total spend {:.2} across {} transactions, {} suppliers",
            totals.total_spend, totals.transactions, n
        ),
        None => eprintln!(
            "total spend {:.2} across {} transactions",
            totals.total_spend, totals.transactions
        ),
    }
    Ok(())
}

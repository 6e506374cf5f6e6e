//! Filters and rollups over a harmonized table.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use log::warn;
use serde::{Deserialize, Serialize};

use crate::amount::clean_amount;
use crate::error::SpendError;
use crate::model::Table;

pub const DATE_COLUMN: &str = "_date_iso";
pub const SPEND_COLUMN: &str = "_spend";
pub const UNKNOWN: &str = "Unknown";

// ---------------------------------------------------------------------------
// Filters
// ---------------------------------------------------------------------------

/// Keep rows whose `column` value is one of `values`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RowFilter {
    pub column: String,
    pub values: Vec<String>,
}

impl RowFilter {
    /// Parse `COLUMN=V1,V2` (as given on the command line).
    pub fn parse(expr: &str) -> Option<Self> {
        let (column, values) = expr.split_once('=')?;
        let column = column.trim();
        if column.is_empty() {
            return None;
        }
        Some(Self {
            column: column.to_string(),
            values: values.split(',').map(|v| v.trim().to_string()).collect(),
        })
    }
}

/// Inclusive date range; either end may be open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateRange {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl DateRange {
    pub fn is_open(&self) -> bool {
        self.from.is_none() && self.to.is_none()
    }

    fn contains(&self, date: NaiveDate) -> bool {
        self.from.map_or(true, |f| date >= f) && self.to.map_or(true, |t| date <= t)
    }
}

/// Apply list filters and a date range. Rows without a parseable
/// `_date_iso` pass the range. Filters on absent columns are skipped.
pub fn filter_rows(table: &Table, filters: &[RowFilter], range: &DateRange) -> Table {
    let mut active: Vec<(usize, &RowFilter)> = Vec::new();
    for f in filters {
        match table.column_index(&f.column) {
            Some(idx) => active.push((idx, f)),
            None => warn!("filter: column '{}' not found, filter skipped", f.column),
        }
    }
    let date_idx = if range.is_open() {
        None
    } else {
        table.column_index(DATE_COLUMN)
    };

    let rows = table
        .rows
        .iter()
        .enumerate()
        .filter(|(r, _)| {
            active.iter().all(|(idx, f)| {
                let value = table.cell(*r, *idx).map(str::trim).unwrap_or(UNKNOWN);
                f.values.iter().any(|v| v == value)
            })
        })
        .filter(|(r, _)| {
            let Some(idx) = date_idx else { return true };
            match table
                .cell(*r, idx)
                .and_then(|d| NaiveDate::parse_from_str(d.trim(), "%Y-%m-%d").ok())
            {
                Some(d) => range.contains(d),
                None => true,
            }
        })
        .map(|(_, row)| row.clone())
        .collect();

    Table {
        headers: table.headers.clone(),
        rows,
    }
}

// ---------------------------------------------------------------------------
// Rollups
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RollupRow {
    pub key: String,
    pub spend: f64,
    pub transactions: usize,
    pub share: f64,
}

fn spend_values(table: &Table, spend_column: &str) -> Result<Vec<Option<f64>>, SpendError> {
    let idx = table.require_column(spend_column)?;
    Ok(table
        .column(idx)
        .into_iter()
        .map(|v| v.and_then(clean_amount))
        .collect())
}

/// Spend and transaction count per value of `column`, biggest first
/// (ties by key). Null keys roll up under "Unknown"; `top_n = 0` keeps all.
pub fn spend_by(
    table: &Table,
    column: &str,
    spend_column: &str,
    top_n: usize,
) -> Result<Vec<RollupRow>, SpendError> {
    let key_idx = table.require_column(column)?;
    let spend = spend_values(table, spend_column)?;

    let mut sums: BTreeMap<&str, (f64, usize)> = BTreeMap::new();
    for (r, amount) in spend.iter().enumerate() {
        let key = table.cell(r, key_idx).map(str::trim).unwrap_or(UNKNOWN);
        let entry = sums.entry(key).or_insert((0.0, 0));
        entry.0 += amount.unwrap_or(0.0);
        entry.1 += 1;
    }
    let total: f64 = sums.values().map(|(s, _)| s).sum();

    let mut rows: Vec<RollupRow> = sums
        .into_iter()
        .map(|(key, (spend, transactions))| RollupRow {
            key: key.to_string(),
            spend,
            transactions,
            share: if total > 0.0 { spend / total } else { 0.0 },
        })
        .collect();
    rows.sort_by(|a, b| b.spend.total_cmp(&a.spend));
    if top_n > 0 {
        rows.truncate(top_n);
    }
    Ok(rows)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Kpis {
    pub total_spend: f64,
    pub transactions: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suppliers: Option<usize>,
}

pub fn kpis(
    table: &Table,
    spend_column: &str,
    supplier_column: Option<&str>,
) -> Result<Kpis, SpendError> {
    let spend = spend_values(table, spend_column)?;
    let suppliers = match supplier_column {
        Some(col) => {
            let idx = table.require_column(col)?;
            let distinct: BTreeSet<&str> = table.column(idx).into_iter().flatten().collect();
            Some(distinct.len())
        }
        None => None,
    };
    Ok(Kpis {
        total_spend: spend.iter().flatten().sum(),
        transactions: table.len(),
        suppliers,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthPoint {
    pub month: String,
    pub spend: f64,
    pub transactions: usize,
}

/// Spend per `YYYY-MM`, oldest first. Undated rows are left out.
pub fn monthly_trend(table: &Table, spend_column: &str) -> Result<Vec<MonthPoint>, SpendError> {
    let date_idx = table.require_column(DATE_COLUMN)?;
    let spend = spend_values(table, spend_column)?;

    let mut months: BTreeMap<String, (f64, usize)> = BTreeMap::new();
    for (r, amount) in spend.iter().enumerate() {
        let Some(date) = table
            .cell(r, date_idx)
            .and_then(|d| NaiveDate::parse_from_str(d.trim(), "%Y-%m-%d").ok())
        else {
            continue;
        };
        let entry = months
            .entry(date.format("%Y-%m").to_string())
            .or_insert((0.0, 0));
        entry.0 += amount.unwrap_or(0.0);
        entry.1 += 1;
    }

    Ok(months
        .into_iter()
        .map(|(month, (spend, transactions))| MonthPoint {
            month,
            spend,
            transactions,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> Table {
        let rows = [
            ["Acme", "Pune", "100", "2025-01-05"],
            ["Globex", "Pune", "50", "2025-01-20"],
            ["Acme", "Delhi", "30", "2025-02-01"],
            ["", "Delhi", "20", ""],
            ["Initech", "Pune", "", "2025-03-15"],
        ];
        Table {
            headers: vec![
                "_supplier_h".into(),
                "_plant_h".into(),
                "_spend".into(),
                "_date_iso".into(),
            ],
            rows: rows
                .iter()
                .map(|r| r.iter().map(|c| c.to_string()).collect())
                .collect(),
        }
    }

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn parse_where_expression() {
        let f = RowFilter::parse("Plant = Pune, Delhi").unwrap();
        assert_eq!(f.column, "Plant");
        assert_eq!(f.values, vec!["Pune", "Delhi"]);
        assert!(RowFilter::parse("Plant").is_none());
        assert!(RowFilter::parse("=x").is_none());
    }

    #[test]
    fn list_filter() {
        let filters = vec![RowFilter {
            column: "_plant_h".into(),
            values: vec!["Delhi".into()],
        }];
        let out = filter_rows(&table(), &filters, &DateRange::default());
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn null_matches_unknown() {
        let filters = vec![RowFilter {
            column: "_supplier_h".into(),
            values: vec!["Unknown".into()],
        }];
        let out = filter_rows(&table(), &filters, &DateRange::default());
        assert_eq!(out.len(), 1);
        assert_eq!(out.rows[0][2], "20");
    }

    #[test]
    fn missing_filter_column_is_skipped() {
        let filters = vec![RowFilter {
            column: "ABC_Class".into(),
            values: vec!["A".into()],
        }];
        assert_eq!(filter_rows(&table(), &filters, &DateRange::default()).len(), 5);
    }

    #[test]
    fn date_range_keeps_undated_rows() {
        let range = DateRange {
            from: Some(ymd(2025, 1, 10)),
            to: Some(ymd(2025, 2, 1)),
        };
        let out = filter_rows(&table(), &[], &range);
        let spends: Vec<&str> = out.rows.iter().map(|r| r[2].as_str()).collect();
        assert_eq!(spends, vec!["50", "30", "20"]);
    }

    #[test]
    fn rollup_by_supplier() {
        let rows = spend_by(&table(), "_supplier_h", "_spend", 0).unwrap();
        assert_eq!(rows[0].key, "Acme");
        assert_eq!(rows[0].spend, 130.0);
        assert_eq!(rows[0].transactions, 2);
        assert!((rows[0].share - 0.65).abs() < 1e-9);
        assert_eq!(rows.last().unwrap().key, "Initech");
        assert!(rows.iter().any(|r| r.key == UNKNOWN));
    }

    #[test]
    fn rollup_top_n_and_missing_column() {
        assert_eq!(spend_by(&table(), "_plant_h", "_spend", 1).unwrap().len(), 1);
        assert!(matches!(
            spend_by(&table(), "Nope", "_spend", 0),
            Err(SpendError::MissingColumn { .. })
        ));
    }

    #[test]
    fn headline_kpis() {
        let k = kpis(&table(), "_spend", Some("_supplier_h")).unwrap();
        assert_eq!(k.total_spend, 200.0);
        assert_eq!(k.transactions, 5);
        assert_eq!(k.suppliers, Some(3));
    }

    #[test]
    fn trend_by_month() {
        let trend = monthly_trend(&table(), "_spend").unwrap();
        let months: Vec<&str> = trend.iter().map(|p| p.month.as_str()).collect();
        assert_eq!(months, vec!["2025-01", "2025-02", "2025-03"]);
        assert_eq!(trend[0].spend, 150.0);
        assert_eq!(trend[2].spend, 0.0);
        assert_eq!(trend[2].transactions, 1);
    }
}

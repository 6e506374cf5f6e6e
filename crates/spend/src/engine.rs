use std::collections::BTreeMap;

use log::{debug, warn};

use crate::abc::classify_abc;
use crate::amount::{clean_amount, format_amount};
use crate::analytics::{SPEND_COLUMN, UNKNOWN};
use crate::config::{HarmonizeField, PipelineConfig};
use crate::currency::{convert_column, Conversion};
use crate::dates::{standardize_date, to_iso};
use crate::error::SpendError;
use crate::harmonize::{harmonize, MappingEntry};
use crate::model::{flag, FieldSummary, PipelineOutput, RunSummary, Table};
use crate::normalize::{is_master_like_column, normalize_description};
use crate::taxonomy::{generate_taxonomy, infer_l1, KeywordClusterer};

pub const AMOUNT_CLEAN_COLUMN: &str = "_amount_clean";
pub const DESC_COLUMN: &str = "_desc_h";
pub const ABC_COLUMN: &str = "ABC_Class";

/// Run the harmonization pipeline over a loaded table.
///
/// Source columns are kept as they are; every derived value lands in an
/// appended `_`-prefixed column (plus `L1`..`L4`, `TaxonomyPath` and
/// `ABC_Class` when those steps are enabled).
pub fn run(config: &PipelineConfig, input: &Table) -> Result<PipelineOutput, SpendError> {
    config.validate()?;

    let cols = &config.columns;
    let n = input.len();
    let mut table = input.clone();
    let mut summary = RunSummary {
        name: config.name.clone(),
        rows_in: n,
        ..Default::default()
    };
    let mut mappings: BTreeMap<String, Vec<MappingEntry>> = BTreeMap::new();

    // Amount
    let amount_idx = table.require_column(&cols.amount)?;
    let amounts: Vec<Option<f64>> = table
        .column(amount_idx)
        .into_iter()
        .map(|v| v.and_then(clean_amount))
        .collect();
    table.set_column(AMOUNT_CLEAN_COLUMN, amounts.iter().map(|a| render(*a)).collect())?;

    // Dates
    let date_idx = optional_index(&table, cols.date.as_deref())?;
    let mut date_ok = vec![false; n];
    let mut date_changed = vec![false; n];
    let mut iso_dates = vec![String::new(); n];
    if let Some(idx) = date_idx {
        for r in 0..n {
            let raw = table.cell(r, idx).unwrap_or("").trim();
            let iso = standardize_date(raw, config.dates.day_first)
                .map(to_iso)
                .unwrap_or_default();
            date_ok[r] = !iso.is_empty();
            date_changed[r] = raw != iso;
            iso_dates[r] = iso;
        }
        summary.dates_parsed = date_ok.iter().filter(|d| **d).count();
        summary.dates_changed = date_changed.iter().filter(|d| **d).count();
    }
    table.set_column("_date_iso", iso_dates)?;
    table.set_column("_date_changed", date_changed.iter().map(|c| flag(*c)).collect())?;

    // Description (light cleanup only)
    let desc_idx = optional_index(&table, cols.description.as_deref())?;
    let (desc_h, desc_changed): (Vec<String>, Vec<bool>) = match desc_idx {
        Some(idx) => (0..n)
            .map(|r| {
                let raw = table.cell(r, idx).unwrap_or("");
                if config.harmonize.description {
                    let clean = normalize_description(raw);
                    let changed = clean != raw.trim();
                    (clean, changed)
                } else {
                    (raw.to_string(), false)
                }
            })
            .unzip(),
        None => (vec![String::new(); n], vec![false; n]),
    };
    let desc_missing: Vec<bool> = desc_h.iter().map(|d| d.trim().is_empty()).collect();
    table.set_column(DESC_COLUMN, desc_h)?;
    table.set_column("_desc_changed", desc_changed.iter().map(|c| flag(*c)).collect())?;

    let mut any_changed: Vec<bool> = date_changed
        .iter()
        .zip(&desc_changed)
        .map(|(a, b)| *a || *b)
        .collect();

    // Supplier / department / plant
    let selected = config.harmonize.selected(cols);
    let options = config.harmonize.options();
    let mut supplier_missing: Option<Vec<bool>> = None;
    for field in HarmonizeField::ALL {
        let out_col = format!("_{}_h", field.name());
        let source = cols.field(field);
        let idx = optional_index(&table, source)?;

        let (values, changed) = match (idx, source) {
            (Some(idx), Some(source)) => {
                let column = table.column(idx);
                let pass_through = || -> (Vec<String>, Vec<bool>) {
                    let values = column.iter().map(|v| v.unwrap_or("").to_string()).collect();
                    (values, vec![false; n])
                };
                if !selected.contains(&field) {
                    pass_through()
                } else if is_master_like_column(source) {
                    let msg = format!(
                        "'{source}' looks like a master/ID column; {field} passed through unharmonized"
                    );
                    warn!("{msg}");
                    summary.warnings.push(msg);
                    pass_through()
                } else {
                    let h = harmonize(&column, &options)?;
                    if h.stats.passed_through > 0 {
                        summary.warnings.push(format!(
                            "{field}: {} of {} distinct values exceeded max_uniques and were not clustered",
                            h.stats.passed_through, h.stats.distinct
                        ));
                    }
                    summary.fields.push(FieldSummary {
                        column: source.to_string(),
                        output: out_col.clone(),
                        distinct: h.stats.distinct,
                        clusters: h.stats.clusters,
                        changed_rows: h.stats.changed_rows,
                        passed_through: h.stats.passed_through,
                    });
                    mappings.insert(out_col.clone(), h.mapping);
                    (h.canonical, h.changed)
                }
            }
            _ => (vec![UNKNOWN.to_string(); n], vec![false; n]),
        };

        for (any, c) in any_changed.iter_mut().zip(&changed) {
            *any |= *c;
        }
        if field == HarmonizeField::Supplier && idx.is_some() {
            supplier_missing = Some(values.iter().map(|v| v.trim().is_empty()).collect());
        }
        table.set_column(&out_col, values)?;
        table.set_column(
            &format!("_{}_changed", field.name()),
            changed.into_iter().map(flag).collect(),
        )?;
    }

    // CAPEX/OPEX pass-through
    let capex_idx = optional_index(&table, cols.capexopex.as_deref())?;
    let capex: Vec<String> = match capex_idx {
        Some(idx) => table
            .column(idx)
            .into_iter()
            .map(|v| v.map(str::trim).unwrap_or("").to_string())
            .collect(),
        None => vec![UNKNOWN.to_string(); n],
    };
    table.set_column("_capexopex", capex)?;

    // Currency
    let currency_idx = optional_index(&table, cols.currency.as_deref())?;
    let conversions: Vec<Conversion> = match &config.currency {
        Some(currency) => {
            let fx = currency.fx_table()?;
            let sources = currency_idx.map(|idx| table.column(idx));
            convert_column(
                &fx,
                &amounts,
                sources.as_deref(),
                &currency.target,
                &currency.default_source,
            )
        }
        None => amounts
            .iter()
            .map(|a| Conversion {
                spend: *a,
                source: "INR".to_string(),
                target: "INR".to_string(),
                rate: Some(1.0),
                missing_fx: false,
            })
            .collect(),
    };
    let spend: Vec<Option<f64>> = conversions.iter().map(|c| c.spend).collect();
    table.set_column(SPEND_COLUMN, spend.iter().map(|s| render(*s)).collect())?;
    table.set_column(
        "_currency_source_used",
        conversions.iter().map(|c| c.source.clone()).collect(),
    )?;
    table.set_column(
        "_currency_target",
        conversions.iter().map(|c| c.target.clone()).collect(),
    )?;
    table.set_column(
        "_fx_rate_used",
        conversions.iter().map(|c| render(c.rate)).collect(),
    )?;
    table.set_column(
        "_missing_fx",
        conversions.iter().map(|c| flag(c.missing_fx)).collect(),
    )?;
    table.set_column("_any_harmonized", any_changed.iter().map(|c| flag(*c)).collect())?;

    // Drop incomplete rows
    let keep: Vec<bool> = (0..n)
        .map(|r| {
            !config.rows.drop_missing
                || (spend[r].is_some()
                    && (date_idx.is_none() || date_ok[r])
                    && supplier_missing.as_ref().map_or(true, |m| !m[r])
                    && (desc_idx.is_none() || !desc_missing[r]))
        })
        .collect();
    table.retain_rows(&keep);
    let kept = |values: &[bool]| -> usize {
        values.iter().zip(&keep).filter(|(v, k)| **v && **k).count()
    };
    let spend: Vec<Option<f64>> = spend
        .into_iter()
        .zip(&keep)
        .filter_map(|(s, k)| k.then_some(s))
        .collect();

    summary.rows_out = table.len();
    summary.rows_dropped = n - table.len();
    summary.total_spend = spend.iter().flatten().sum();
    summary.spend_missing = spend.iter().filter(|s| s.is_none()).count();
    summary.missing_fx = kept(&conversions.iter().map(|c| c.missing_fx).collect::<Vec<_>>());
    summary.any_harmonized = kept(&any_changed);
    if summary.rows_dropped > 0 {
        debug!("pipeline: dropped {} incomplete rows", summary.rows_dropped);
    }

    // Taxonomy
    if config.taxonomy.generate {
        let idx = table.require_column(DESC_COLUMN)?;
        let labels = generate_taxonomy(
            &table.column(idx),
            &KeywordClusterer,
            config.taxonomy.l2,
            config.taxonomy.l3,
        )?;
        table.set_column("L1", labels.iter().map(|l| l.l1.clone()).collect())?;
        table.set_column("L2", labels.iter().map(|l| l.l2.clone()).collect())?;
        table.set_column("L3", labels.iter().map(|l| l.l3.clone()).collect())?;
        table.set_column("L4", labels.iter().map(|l| l.l4.clone()).collect())?;
        table.set_column("TaxonomyPath", labels.iter().map(|l| l.path()).collect())?;
    } else if config.taxonomy.l1 {
        let idx = table.require_column(DESC_COLUMN)?;
        let l1: Vec<String> = table
            .column(idx)
            .into_iter()
            .map(|d| infer_l1(d.unwrap_or("")).to_string())
            .collect();
        table.set_column("L1", l1)?;
    }

    // ABC
    if let Some(abc) = &config.abc {
        let idx = table.require_column(&abc.group)?;
        let rows: Vec<(Option<&str>, Option<f64>)> = table
            .column(idx)
            .into_iter()
            .zip(spend.iter().copied())
            .collect();
        let result = classify_abc(&rows, &abc.cutoffs)?;
        let classes: Vec<String> = result.classes.iter().map(|c| c.to_string()).collect();
        summary.abc = Some(result.by_class);
        table.set_column(ABC_COLUMN, classes)?;
    }

    debug!(
        "pipeline '{}': {} rows in, {} out, {} harmonized, total spend {:.2}",
        config.name, summary.rows_in, summary.rows_out, summary.any_harmonized, summary.total_spend
    );

    Ok(PipelineOutput {
        table,
        summary,
        mappings,
    })
}

fn optional_index(table: &Table, name: Option<&str>) -> Result<Option<usize>, SpendError> {
    name.map(|n| table.require_column(n)).transpose()
}

fn render(value: Option<f64>) -> String {
    value.map(format_amount).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn register() -> Table {
        let rows = [
            ["ACME Corp", "Acme Corp.", "Pune", "1,000", "USD", "05/01/2025", "Ball  valve"],
            ["Acme Corp", "Acme Corp", "Pune", "500", "", "2025-01-20", "Gate valve"],
            ["acme corp", "Globex", "Delhi", "n/a", "INR", "soon", "Pump repair"],
            ["Globex", "Globex", "Delhi", "250", "JPY", "", ""],
        ];
        Table {
            headers: [
                "Vendor Name",
                "Dept",
                "Plant",
                "Amount",
                "Currency",
                "Invoice Date",
                "Item",
            ]
            .iter()
            .map(|h| h.to_string())
            .collect(),
            rows: rows
                .iter()
                .map(|r| r.iter().map(|c| c.to_string()).collect())
                .collect(),
        }
    }

    const CONFIG: &str = r#"
name = "unit"

[columns]
amount = "Amount"
date = "Invoice Date"
supplier = "Vendor Name"
department = "Dept"
description = "Item"
currency = "Currency"

[harmonize]
fields = ["supplier"]

[currency]
target = "INR"
"#;

    fn column<'a>(table: &'a Table, name: &str) -> Vec<&'a str> {
        let idx = table.column_index(name).unwrap();
        table.rows.iter().map(|r| r[idx].as_str()).collect()
    }

    #[test]
    fn appends_derived_columns() {
        let config = PipelineConfig::from_toml(CONFIG).unwrap();
        let out = run(&config, &register()).unwrap();
        let t = &out.table;

        assert_eq!(&t.headers[..7], &register().headers[..]);
        assert_eq!(column(t, "_amount_clean"), vec!["1000", "500", "", "250"]);
        assert_eq!(column(t, "_date_iso"), vec!["2025-01-05", "2025-01-20", "", ""]);
        assert_eq!(column(t, "_date_changed"), vec!["true", "false", "true", "false"]);
        assert_eq!(column(t, "_desc_h"), vec!["Ball valve", "Gate valve", "Pump repair", ""]);
        assert_eq!(column(t, "_desc_changed"), vec!["true", "false", "false", "false"]);
        assert_eq!(column(t, "_capexopex"), vec!["Unknown"; 4]);
        assert_eq!(column(t, "_plant_h"), vec!["Unknown"; 4]);
    }

    #[test]
    fn harmonizes_selected_fields_only() {
        let config = PipelineConfig::from_toml(CONFIG).unwrap();
        let out = run(&config, &register()).unwrap();
        let t = &out.table;

        assert_eq!(
            column(t, "_supplier_h"),
            vec!["ACME Corp", "ACME Corp", "ACME Corp", "Globex"]
        );
        assert_eq!(column(t, "_supplier_changed"), vec!["false", "true", "true", "false"]);
        // mapped but not selected: passed through
        assert_eq!(column(t, "_department_h"), vec!["Acme Corp.", "Acme Corp", "Globex", "Globex"]);
        assert_eq!(column(t, "_department_changed"), vec!["false"; 4]);
        assert_eq!(column(t, "_any_harmonized"), vec!["true", "true", "true", "false"]);

        assert_eq!(out.mappings.len(), 1);
        assert_eq!(out.mappings["_supplier_h"].len(), 4);
        assert_eq!(out.summary.fields[0].changed_rows, 2);
        assert_eq!(out.summary.any_harmonized, 3);
    }

    #[test]
    fn converts_currency() {
        let config = PipelineConfig::from_toml(CONFIG).unwrap();
        let out = run(&config, &register()).unwrap();
        let t = &out.table;

        assert_eq!(column(t, "_spend"), vec!["83000", "500", "", ""]);
        assert_eq!(column(t, "_currency_source_used"), vec!["USD", "INR", "INR", "JPY"]);
        assert_eq!(column(t, "_fx_rate_used"), vec!["83", "1", "1", ""]);
        assert_eq!(column(t, "_missing_fx"), vec!["false", "false", "false", "true"]);
        assert_eq!(out.summary.total_spend, 83500.0);
        assert_eq!(out.summary.spend_missing, 2);
        assert_eq!(out.summary.missing_fx, 1);
    }

    #[test]
    fn without_currency_spend_is_amount() {
        let input = "name = \"plain\"\n[columns]\namount = \"Amount\"\n";
        let config = PipelineConfig::from_toml(input).unwrap();
        let out = run(&config, &register()).unwrap();
        assert_eq!(column(&out.table, "_spend"), vec!["1000", "500", "", "250"]);
        assert_eq!(column(&out.table, "_currency_target"), vec!["INR"; 4]);
        assert!(out.mappings.is_empty());
    }

    #[test]
    fn drops_incomplete_rows() {
        let input = format!("{CONFIG}\n[rows]\ndrop_missing = true\n");
        let config = PipelineConfig::from_toml(&input).unwrap();
        let out = run(&config, &register()).unwrap();
        assert_eq!(out.table.len(), 2);
        assert_eq!(out.summary.rows_dropped, 2);
        assert_eq!(out.summary.any_harmonized, 2);
        assert_eq!(out.summary.missing_fx, 0);
    }

    #[test]
    fn master_like_column_passes_through() {
        let mut table = register();
        table.headers[0] = "Vendor Code".into();
        let input = CONFIG.replace("supplier = \"Vendor Name\"", "supplier = \"Vendor Code\"");
        let config = PipelineConfig::from_toml(&input).unwrap();
        let out = run(&config, &table).unwrap();
        assert_eq!(
            column(&out.table, "_supplier_h"),
            vec!["ACME Corp", "Acme Corp", "acme corp", "Globex"]
        );
        assert_eq!(out.summary.warnings.len(), 1);
        assert!(out.mappings.is_empty());
    }

    #[test]
    fn abc_and_l1() {
        let input = r#"
name = "abc"

[columns]
amount = "Amount"
department = "Dept"
description = "Item"

[harmonize]
fields = []

[abc]
group = "_department_h"

[taxonomy]
l1 = true
"#;
        let config = PipelineConfig::from_toml(input).unwrap();
        let out = run(&config, &register()).unwrap();
        // 1000 / 500 / 250 across three departments: 0.57, 0.86, 1.0
        assert_eq!(column(&out.table, "ABC_Class"), vec!["A", "B", "C", "C"]);
        assert_eq!(
            column(&out.table, "L1"),
            vec!["Material", "Material", "Service", "Material"]
        );
        let abc = out.summary.abc.unwrap();
        assert_eq!(abc[&crate::abc::AbcClass::A].spend, 1000.0);
        assert_eq!(abc[&crate::abc::AbcClass::C].rows, 2);
    }

    #[test]
    fn generated_taxonomy_columns() {
        let input = format!("{CONFIG}\n[taxonomy]\ngenerate = true\n");
        let config = PipelineConfig::from_toml(&input).unwrap();
        let out = run(&config, &register()).unwrap();
        let paths = column(&out.table, "TaxonomyPath");
        assert_eq!(paths.len(), 4);
        assert!(paths.iter().all(|p| p.split(" > ").count() == 4));
        assert_eq!(column(&out.table, "L1")[2], "Service");
    }

    #[test]
    fn missing_mapped_column_fails() {
        let input = CONFIG.replace("date = \"Invoice Date\"", "date = \"Posting Date\"");
        let config = PipelineConfig::from_toml(&input).unwrap();
        assert_eq!(
            run(&config, &register()).unwrap_err(),
            SpendError::MissingColumn {
                column: "Posting Date".into()
            }
        );
    }
}

use std::path::PathBuf;

use spendgrid_spend::abc::AbcClass;
use spendgrid_spend::analytics::{filter_rows, kpis, monthly_trend, spend_by, DateRange, RowFilter};
use spendgrid_spend::{
    classify_abc, harmonize, run, AbcCutoffs, HarmonizeOptions, PipelineConfig, PipelineOutput,
    Table,
};

fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

fn load_register() -> Table {
    let path = fixtures_dir().join("purchase_register.csv");
    let data = std::fs::read_to_string(&path)
        .unwrap_or_else(|e| panic!("cannot read {}: {e}", path.display()));
    Table::from_csv(&data).unwrap()
}

fn load_and_run(config_toml: &str) -> PipelineOutput {
    let config = PipelineConfig::from_toml(config_toml).unwrap();
    run(&config, &load_register()).unwrap()
}

fn fixture_config() -> String {
    std::fs::read_to_string(fixtures_dir().join("pipeline.toml")).unwrap()
}

fn column<'a>(table: &'a Table, name: &str) -> Vec<&'a str> {
    let idx = table
        .column_index(name)
        .unwrap_or_else(|| panic!("missing column {name}"));
    table.rows.iter().map(|r| r[idx].as_str()).collect()
}

// -------------------------------------------------------------------------
// Pipeline
// -------------------------------------------------------------------------

#[test]
fn pipeline_harmonizes_suppliers() {
    let out = load_and_run(&fixture_config());
    let t = &out.table;

    assert_eq!(t.len(), 10);
    assert_eq!(
        column(t, "_supplier_h"),
        vec![
            "Tata Steel Ltd",
            "Tata Steel Ltd",
            "Tata Steel Ltd",
            "Siemens India",
            "Siemens India",
            "Siemens India",
            "Blue Dart Express",
            "Blue Dart",
            "Acme Tools",
            "Acme Tools",
        ]
    );
    let changed = column(t, "_supplier_changed");
    assert_eq!(changed.iter().filter(|c| **c == "true").count(), 4);

    // Source columns are untouched
    assert_eq!(column(t, "Vendor Name")[1], "TATA STEEL LTD.");
    assert_eq!(column(t, "Vendor Code")[0], "V100");
}

#[test]
fn pipeline_harmonizes_department_and_plant() {
    let out = load_and_run(&fixture_config());
    let t = &out.table;

    assert_eq!(column(t, "_department_h")[1], "Maintenance");
    // "Maint." is too far from "Maintenance" to merge
    assert_eq!(column(t, "_department_h")[2], "Maint.");
    assert_eq!(column(t, "_plant_h")[1], "Pune Plant");
    assert_eq!(column(t, "_plant_h")[5], "Chennai");

    let outputs: Vec<&str> = out.summary.fields.iter().map(|f| f.output.as_str()).collect();
    assert_eq!(outputs, vec!["_supplier_h", "_department_h", "_plant_h"]);
    assert_eq!(out.mappings.len(), 3);
}

#[test]
fn pipeline_mapping_is_sorted_audit() {
    let out = load_and_run(&fixture_config());
    let mapping = &out.mappings["_supplier_h"];

    assert_eq!(mapping.len(), 9);
    assert_eq!(mapping[0].canonical, "Acme Tools");
    for pair in mapping.windows(2) {
        let a = (&pair[0].canonical, &pair[0].raw);
        let b = (&pair[1].canonical, &pair[1].raw);
        assert!(a < b, "{a:?} !< {b:?}");
    }
    let typo = mapping.iter().find(|m| m.raw == "Tata Stee Ltd").unwrap();
    assert_eq!(typo.normalized, "tata stee ltd");
    assert_eq!(typo.canonical, "Tata Steel Ltd");
}

#[test]
fn pipeline_dates_and_amounts() {
    let out = load_and_run(&fixture_config());
    let t = &out.table;

    assert_eq!(
        column(t, "_date_iso"),
        vec![
            "2025-04-03",
            "2025-04-10",
            "2025-04-12",
            "2025-04-15",
            "2025-04-20",
            "2025-05-01",
            "2025-05-02",
            "2025-05-05",
            "",
            "2025-05-10",
        ]
    );
    assert_eq!(out.summary.dates_parsed, 9);
    assert_eq!(column(t, "_amount_clean")[0], "120000");
    assert_eq!(column(t, "_amount_clean")[7], "");
    assert_eq!(column(t, "_desc_h")[0], "Steel pipe seamless 2in");
}

#[test]
fn pipeline_currency_conversion() {
    let out = load_and_run(&fixture_config());
    let t = &out.table;

    assert_eq!(column(t, "_spend")[3], "124500");
    assert_eq!(column(t, "_spend")[8], "45000");
    assert_eq!(column(t, "_currency_source_used")[2], "INR");
    assert_eq!(column(t, "_missing_fx")[9], "true");
    assert_eq!(out.summary.total_spend, 511500.0);
    assert_eq!(out.summary.spend_missing, 2);
    assert_eq!(out.summary.missing_fx, 1);
}

#[test]
fn pipeline_abc_and_l1() {
    let out = load_and_run(&fixture_config());
    let t = &out.table;

    assert_eq!(
        column(t, "ABC_Class"),
        vec!["A", "A", "A", "B", "B", "B", "C", "C", "C", "C"]
    );
    let abc = out.summary.abc.as_ref().unwrap();
    assert_eq!(abc[&AbcClass::A].spend, 245000.0);
    assert_eq!(abc[&AbcClass::B].groups, 1);

    let l1 = column(t, "L1");
    assert_eq!(l1[0], "Material");
    assert_eq!(l1[4], "Service");
    assert_eq!(l1[5], "Service");
    assert_eq!(l1[6], "Service");
}

#[test]
fn pipeline_any_harmonized() {
    let out = load_and_run(&fixture_config());
    assert_eq!(out.summary.any_harmonized, 9);
    assert_eq!(column(&out.table, "_any_harmonized")[8], "false");
}

#[test]
fn pipeline_drop_missing() {
    let toml = format!("{}\n[rows]\ndrop_missing = true\n", fixture_config());
    let out = load_and_run(&toml);

    assert_eq!(out.summary.rows_in, 10);
    assert_eq!(out.summary.rows_out, 7);
    assert_eq!(out.summary.rows_dropped, 3);
    assert_eq!(out.summary.spend_missing, 0);
    let po: Vec<&str> = column(&out.table, "PO No");
    assert!(!po.contains(&"PO-1008"));
    assert!(!po.contains(&"PO-1009"));
    assert!(!po.contains(&"PO-1010"));
}

#[test]
fn pipeline_with_generated_taxonomy() {
    let toml = fixture_config().replace("l1 = true", "generate = true\nl2 = 3");
    let out = load_and_run(&toml);
    let paths = column(&out.table, "TaxonomyPath");
    assert!(paths.iter().all(|p| p.split(" > ").count() == 4));
    assert!(paths[4].starts_with("Service > "));
    assert!(paths[0].starts_with("Material > "));
}

// -------------------------------------------------------------------------
// Analytics on pipeline output
// -------------------------------------------------------------------------

#[test]
fn rollup_top_suppliers() {
    let out = load_and_run(&fixture_config());
    let rows = spend_by(&out.table, "_supplier_h", "_spend", 2).unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].key, "Tata Steel Ltd");
    assert_eq!(rows[0].spend, 245000.0);
    assert_eq!(rows[0].transactions, 3);
    assert_eq!(rows[1].key, "Siemens India");
    assert_eq!(rows[1].spend, 209500.0);
}

#[test]
fn filtered_kpis_and_trend() {
    let out = load_and_run(&fixture_config());

    let k = kpis(&out.table, "_spend", Some("_supplier_h")).unwrap();
    assert_eq!(k.total_spend, 511500.0);
    assert_eq!(k.suppliers, Some(5));

    let trend = monthly_trend(&out.table, "_spend").unwrap();
    assert_eq!(trend.len(), 2);
    assert_eq!(trend[0].month, "2025-04");
    assert_eq!(trend[0].spend, 394500.0);
    assert_eq!(trend[1].spend, 72000.0);
    assert_eq!(trend[1].transactions, 4);

    let capex = filter_rows(
        &out.table,
        &[RowFilter::parse("_capexopex=CAPEX").unwrap()],
        &DateRange::default(),
    );
    assert_eq!(capex.len(), 1);
    assert_eq!(column(&capex, "_spend"), vec!["124500"]);
}

// -------------------------------------------------------------------------
// Library entry points on fixture columns
// -------------------------------------------------------------------------

#[test]
fn abc_by_material_number() {
    let out = load_and_run(&fixture_config());
    let t = &out.table;
    let material = t.column(t.column_index("Material_No").unwrap());
    let spend: Vec<Option<f64>> = column(t, "_spend")
        .iter()
        .map(|s| s.parse::<f64>().ok())
        .collect();
    let rows: Vec<(Option<&str>, Option<f64>)> = material.into_iter().zip(spend).collect();

    let result = classify_abc(&rows, &AbcCutoffs::default()).unwrap();
    assert_eq!(result.total, 511500.0);
    assert_eq!(result.groups[0].key.as_deref(), Some("M-01"));
    assert_eq!(result.groups[0].total, 200000.0);
    // rows of one material share its class
    assert_eq!(result.classes[0], result.classes[1]);
    assert_eq!(result.classes[7], result.classes[6]);
}

#[test]
fn harmonize_vendor_column_directly() {
    let t = load_register();
    let vendors = t.column(t.column_index("Vendor Name").unwrap());
    let h = harmonize(&vendors, &HarmonizeOptions::default()).unwrap();
    assert_eq!(h.stats.distinct, 7);
    assert_eq!(h.stats.clusters, 5);
    assert_eq!(h.stats.changed_rows, 4);
}

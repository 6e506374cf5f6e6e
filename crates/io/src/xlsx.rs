// Excel import (xlsx, xlsm, xlsb, xls, ods) and export (xlsx only)
//
// Import reads one sheet as a table of display strings; the first row holds
// the headers. Export writes one worksheet per table with a bold, frozen
// header row. Numeric-looking cells are written as numbers so spend columns
// sum in Excel.

use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader, Sheets};
use log::debug;
use rust_xlsxwriter::{Format, Workbook as XlsxWorkbook};
use spendgrid_spend::Table;

use crate::table_from_records;

/// Excel's sheet-name length limit.
const MAX_SHEET_NAME: usize = 31;

/// Import one sheet of a workbook. `None` reads the first sheet.
pub fn import(path: &Path, sheet: Option<&str>) -> Result<Table, String> {
    let mut workbook: Sheets<_> = open_workbook_auto(path)
        .map_err(|e| format!("Failed to open Excel file: {}", e))?;

    let sheet_names: Vec<String> = workbook.sheet_names().to_vec();
    let name = match sheet {
        Some(wanted) => sheet_names
            .iter()
            .find(|n| n.as_str() == wanted)
            .cloned()
            .ok_or_else(|| {
                format!(
                    "Sheet '{}' not found (available: {})",
                    wanted,
                    sheet_names.join(", ")
                )
            })?,
        None => sheet_names
            .first()
            .cloned()
            .ok_or_else(|| "Excel file contains no sheets".to_string())?,
    };

    let range = workbook
        .worksheet_range(&name)
        .map_err(|e| format!("Failed to read sheet '{}': {}", name, e))?;

    let records: Vec<Vec<String>> = range
        .rows()
        .map(|row| row.iter().map(cell_to_string).collect())
        .collect();

    let table = table_from_records(records);
    debug!(
        "xlsx: sheet '{}' {} rows x {} columns",
        name,
        table.len(),
        table.headers.len()
    );
    Ok(table)
}

/// Display string for a calamine cell.
///
/// Dates come through as Excel serial numbers; the date standardizer
/// understands those.
fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Float(n) => format_float(*n),
        Data::Int(n) => n.to_string(),
        Data::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
        Data::Error(e) => format!("#{:?}", e),
        Data::DateTime(dt) => format_float(dt.as_f64()),
        Data::DateTimeIso(s) => s.clone(),
        Data::DurationIso(s) => s.clone(),
    }
}

// Integers without decimals
fn format_float(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

/// True when a cell should be written as an Excel number.
///
/// Codes with leading zeros ("00123") and signed or exponent forms stay text.
fn as_number(value: &str) -> Option<f64> {
    let v = value.trim();
    if v.is_empty() || v != value {
        return None;
    }
    if !v.chars().all(|c| c.is_ascii_digit() || c == '.' || c == '-') {
        return None;
    }
    let digits = v.trim_start_matches('-');
    if digits.len() > 1 && digits.starts_with('0') && !digits.starts_with("0.") {
        return None;
    }
    v.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Clamp to Excel's sheet-name rules.
fn sheet_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '[' | ']' | ':' | '*' | '?' | '/' | '\\' => '_',
            c => c,
        })
        .take(MAX_SHEET_NAME)
        .collect();
    let cleaned = cleaned.trim_matches('\'').to_string();
    if cleaned.is_empty() {
        "Sheet".to_string()
    } else {
        cleaned
    }
}

/// Write named tables to an .xlsx file, one worksheet each, in order.
pub fn export(sheets: &[(&str, &Table)], path: &Path) -> Result<(), String> {
    let mut xlsx_workbook = XlsxWorkbook::new();
    let header_format = Format::new().set_bold();

    for (name, table) in sheets {
        let name = sheet_name(name);
        let worksheet = xlsx_workbook
            .add_worksheet()
            .set_name(&name)
            .map_err(|e| format!("Failed to create sheet '{}': {}", name, e))?;

        for (col, header) in table.headers.iter().enumerate() {
            worksheet
                .write_string_with_format(0, col as u16, header, &header_format)
                .map_err(|e| format!("Failed to write header: {}", e))?;
        }

        for (r, row) in table.rows.iter().enumerate() {
            let xl_row = (r + 1) as u32;
            for (col, value) in row.iter().enumerate() {
                if value.is_empty() {
                    continue;
                }
                let written = match as_number(value) {
                    Some(n) => worksheet.write_number(xl_row, col as u16, n),
                    None => worksheet.write_string(xl_row, col as u16, value),
                };
                written.map_err(|e| format!("Failed to write cell: {}", e))?;
            }
        }

        worksheet
            .set_freeze_panes(1, 0)
            .map_err(|e| format!("Failed to freeze header: {}", e))?;
    }

    xlsx_workbook
        .save(path)
        .map_err(|e| format!("Failed to save XLSX file: {}", e))?;
    debug!("xlsx: wrote {} sheet(s) to {}", sheets.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn register() -> Table {
        Table {
            headers: vec!["PO No".into(), "Vendor".into(), "Amount".into(), "Material_No".into()],
            rows: vec![
                vec!["PO-1".into(), "Acme Corp".into(), "120000".into(), "00123".into()],
                vec!["PO-2".into(), "Globex".into(), "4500.5".into(), "".into()],
            ],
        }
    }

    #[test]
    fn test_number_detection() {
        assert_eq!(as_number("120000"), Some(120000.0));
        assert_eq!(as_number("-12.5"), Some(-12.5));
        assert_eq!(as_number("0.25"), Some(0.25));
        assert_eq!(as_number("0"), Some(0.0));
        assert_eq!(as_number("00123"), None);
        assert_eq!(as_number("1,200"), None);
        assert_eq!(as_number("1e5"), None);
        assert_eq!(as_number(" 12"), None);
        assert_eq!(as_number("PO-1"), None);
    }

    #[test]
    fn test_sheet_name_rules() {
        assert_eq!(sheet_name("map/_supplier_h"), "map__supplier_h");
        assert_eq!(sheet_name(""), "Sheet");
        assert_eq!(sheet_name(&"x".repeat(40)).len(), 31);
    }

    #[test]
    fn test_float_formatting() {
        assert_eq!(format_float(45778.0), "45778");
        assert_eq!(format_float(12.5), "12.5");
    }

    #[test]
    fn test_export_then_import() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.xlsx");
        let table = register();

        export(&[("Data", &table)], &path).unwrap();
        let back = import(&path, None).unwrap();

        assert_eq!(back.headers, table.headers);
        assert_eq!(back.rows[0], vec!["PO-1", "Acme Corp", "120000", "00123"]);
        assert_eq!(back.rows[1], vec!["PO-2", "Globex", "4500.5", ""]);
    }

    #[test]
    fn test_import_named_sheet() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("multi.xlsx");
        let mapping = Table {
            headers: vec!["raw".into(), "canonical".into()],
            rows: vec![vec!["ACME CORP.".into(), "Acme Corp".into()]],
        };

        export(&[("Data", &register()), ("map_supplier", &mapping)], &path).unwrap();

        let back = import(&path, Some("map_supplier")).unwrap();
        assert_eq!(back, mapping);

        let err = import(&path, Some("Nope")).unwrap_err();
        assert!(err.contains("available: Data, map_supplier"), "{err}");
    }
}

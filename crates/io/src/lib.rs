// Purchase register file I/O

pub mod csv;
pub mod xlsx;

use std::path::Path;

use spendgrid_spend::Table;

/// File formats recognized by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    /// Comma-separated (delimiter sniffed on import)
    Csv,
    /// Tab-separated
    Tsv,
    /// Excel or OpenDocument workbook
    Workbook,
}

impl FileFormat {
    pub fn from_path(path: &Path) -> Result<Self, String> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "csv" | "txt" => Ok(Self::Csv),
            "tsv" | "tab" => Ok(Self::Tsv),
            "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => Ok(Self::Workbook),
            "" => Err(format!("{}: file has no extension", path.display())),
            other => Err(format!("{}: unsupported file type '.{}'", path.display(), other)),
        }
    }
}

/// Read a purchase register. The first row is the header row.
pub fn import(path: &Path) -> Result<Table, String> {
    match FileFormat::from_path(path)? {
        FileFormat::Csv => csv::import(path),
        FileFormat::Tsv => csv::import_tsv(path),
        FileFormat::Workbook => xlsx::import(path, None),
    }
}

/// Write a table. Workbooks are written as .xlsx whatever the extension.
pub fn export(table: &Table, path: &Path) -> Result<(), String> {
    match FileFormat::from_path(path)? {
        FileFormat::Csv => csv::export(table, path),
        FileFormat::Tsv => csv::export_tsv(table, path),
        FileFormat::Workbook => xlsx::export(&[("Data", table)], path),
    }
}

/// Build a table from raw records, the first of which holds the headers.
///
/// Blank headers become `Unnamed: <index>`. Rows are padded to the widest
/// record so every row has one cell per header.
pub(crate) fn table_from_records(mut records: Vec<Vec<String>>) -> Table {
    if records.is_empty() {
        return Table::default();
    }
    let width = records.iter().map(Vec::len).max().unwrap_or(0);
    let header_row = records.remove(0);

    let headers: Vec<String> = (0..width)
        .map(|i| match header_row.get(i).map(|h| h.trim()) {
            Some(h) if !h.is_empty() => h.to_string(),
            _ => format!("Unnamed: {}", i),
        })
        .collect();

    let rows = records
        .into_iter()
        .filter(|r| r.iter().any(|c| !c.trim().is_empty()))
        .map(|mut r| {
            r.resize(width, String::new());
            r
        })
        .collect();

    Table { headers, rows }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(FileFormat::from_path(Path::new("a.CSV")).unwrap(), FileFormat::Csv);
        assert_eq!(FileFormat::from_path(Path::new("a.tsv")).unwrap(), FileFormat::Tsv);
        assert_eq!(FileFormat::from_path(Path::new("a.xlsx")).unwrap(), FileFormat::Workbook);
        assert_eq!(FileFormat::from_path(Path::new("a.ods")).unwrap(), FileFormat::Workbook);
        assert!(FileFormat::from_path(Path::new("a.pdf")).unwrap_err().contains("unsupported"));
        assert!(FileFormat::from_path(Path::new("register")).is_err());
    }

    #[test]
    fn test_records_padded_and_headers_named() {
        let table = table_from_records(vec![
            rec(&[" Vendor ", "", "Amount"]),
            rec(&["Acme", "x"]),
            rec(&["", "", "", ""]),
            rec(&["Globex", "y", "10", "extra"]),
        ]);
        assert_eq!(table.headers, vec!["Vendor", "Unnamed: 1", "Amount", "Unnamed: 3"]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows[0], rec(&["Acme", "x", "", ""]));
        assert_eq!(table.rows[1][3], "extra");
    }

    #[test]
    fn test_empty_records() {
        assert_eq!(table_from_records(Vec::new()), Table::default());
        let only_header = table_from_records(vec![rec(&["A", "B"])]);
        assert_eq!(only_header.headers, vec!["A", "B"]);
        assert!(only_header.is_empty());
    }
}

// CSV/TSV import/export

use std::io::{Read, Write};
use std::path::Path;

use log::{debug, warn};
use spendgrid_spend::Table;

use crate::table_from_records;

pub fn import(path: &Path) -> Result<Table, String> {
    let content = read_file_as_utf8(path)?;
    let delimiter = sniff_delimiter(&content);
    debug!("csv: {} sniffed delimiter {:?}", path.display(), delimiter as char);
    import_from_string(&content, delimiter)
}

pub fn import_tsv(path: &Path) -> Result<Table, String> {
    let content = read_file_as_utf8(path)?;
    import_from_string(&content, b'\t')
}

/// Detect the most likely field delimiter by checking consistency across the first few lines.
///
/// For each candidate (tab, semicolon, comma, pipe), count fields per line. The delimiter
/// that produces the most consistent field count (>1 field) wins.
fn sniff_delimiter(content: &str) -> u8 {
    let candidates: &[u8] = &[b'\t', b';', b',', b'|'];
    let sample_lines: Vec<&str> = content.lines().take(10).collect();

    if sample_lines.is_empty() {
        return b',';
    }

    let mut best = b',';
    let mut best_score = 0u64;

    for &delim in candidates {
        let counts: Vec<usize> = sample_lines
            .iter()
            .map(|line| {
                csv::ReaderBuilder::new()
                    .delimiter(delim)
                    .has_headers(false)
                    .flexible(true)
                    .from_reader(line.as_bytes())
                    .records()
                    .next()
                    .and_then(|r| r.ok())
                    .map(|r| r.len())
                    .unwrap_or(1)
            })
            .collect();

        // Header line must split into >1 field
        if counts.first().copied().unwrap_or(0) <= 1 {
            continue;
        }

        // Lines agreeing with the header's field count, weighted by that count
        let target = counts[0];
        let consistent = counts.iter().filter(|&&c| c == target).count() as u64;
        let score = consistent * target as u64;

        if score > best_score {
            best_score = score;
            best = delim;
        }
    }

    best
}

/// Read file and convert to UTF-8 if needed.
///
/// ERP exports are often Windows-1252; a leading UTF-8 byte-order mark is dropped.
pub fn read_file_as_utf8(path: &Path) -> Result<String, String> {
    let mut file = std::fs::File::open(path)
        .map_err(|e| format!("{}: {}", path.display(), e))?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)
        .map_err(|e| format!("{}: {}", path.display(), e))?;

    let text = match String::from_utf8(bytes) {
        Ok(s) => s,
        Err(e) => {
            let bytes = e.into_bytes();
            warn!("{}: not valid UTF-8, decoding as Windows-1252", path.display());
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(&bytes);
            decoded.into_owned()
        }
    };

    Ok(match text.strip_prefix('\u{feff}') {
        Some(rest) => rest.to_string(),
        None => text,
    })
}

pub fn import_from_string(content: &str, delimiter: u8) -> Result<Table, String> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(content.as_bytes());

    let mut records = Vec::new();
    for (line, result) in reader.records().enumerate() {
        let record = result.map_err(|e| format!("line {}: {}", line + 1, e))?;
        records.push(record.iter().map(|f| f.to_string()).collect::<Vec<_>>());
    }

    let table = table_from_records(records);
    debug!("csv: {} rows x {} columns", table.len(), table.headers.len());
    Ok(table)
}

pub fn export(table: &Table, path: &Path) -> Result<(), String> {
    export_with_delimiter(table, path, b',')
}

pub fn export_tsv(table: &Table, path: &Path) -> Result<(), String> {
    export_with_delimiter(table, path, b'\t')
}

fn export_with_delimiter(table: &Table, path: &Path, delimiter: u8) -> Result<(), String> {
    let file = std::fs::File::create(path)
        .map_err(|e| format!("{}: {}", path.display(), e))?;
    write_delimited(table, file, delimiter)
}

/// Write a table as CSV to any writer (e.g. stdout).
pub fn write_csv<W: Write>(table: &Table, writer: W) -> Result<(), String> {
    write_delimited(table, writer, b',')
}

fn write_delimited<W: Write>(table: &Table, writer: W, delimiter: u8) -> Result<(), String> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_writer(writer);

    writer.write_record(&table.headers).map_err(|e| e.to_string())?;
    for row in &table.rows {
        writer.write_record(row).map_err(|e| e.to_string())?;
    }

    writer.flush().map_err(|e| e.to_string())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_sniff_semicolon_delimiter() {
        let content = "Vendor;Amount;Plant\nAcme;30;Pune\nGlobex;25;Chennai\n";
        assert_eq!(sniff_delimiter(content), b';');
    }

    #[test]
    fn test_sniff_comma_delimiter() {
        let content = "Vendor,Amount,Plant\nAcme,30,Pune\nGlobex,25,Chennai\n";
        assert_eq!(sniff_delimiter(content), b',');
    }

    #[test]
    fn test_sniff_tab_delimiter() {
        let content = "Vendor\tAmount\tPlant\nAcme\t30\tPune\nGlobex\t25\tChennai\n";
        assert_eq!(sniff_delimiter(content), b'\t');
    }

    #[test]
    fn test_sniff_pipe_delimiter() {
        let content = "Vendor|Amount|Plant\nAcme|30|Pune\nGlobex|25|Chennai\n";
        assert_eq!(sniff_delimiter(content), b'|');
    }

    #[test]
    fn test_sniff_semicolon_with_commas_in_values() {
        // Indian amounts carry thousands commas inside quoted fields
        let content = "Vendor;Amount;Plant\n\"Tata Steel, Ltd\";\"1,20,000\";Pune\nGlobex;\"4,500\";Chennai\n";
        assert_eq!(sniff_delimiter(content), b';');
    }

    #[test]
    fn test_semicolon_csv_import() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("register.csv");
        fs::write(&path, "Vendor;Amount;Plant\nAcme;30;Pune\nGlobex;25;Chennai\n").unwrap();

        let table = import(&path).unwrap();
        assert_eq!(table.headers, vec!["Vendor", "Amount", "Plant"]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows[0], vec!["Acme", "30", "Pune"]);
        assert_eq!(table.rows[1][2], "Chennai");
    }

    #[test]
    fn test_windows_1252_fallback_and_bom() {
        let dir = tempdir().unwrap();

        let latin = dir.path().join("latin.csv");
        fs::write(&latin, b"Vendor,Amount\nNestl\xe9 India,10\n").unwrap();
        let table = import(&latin).unwrap();
        assert_eq!(table.rows[0][0], "Nestl\u{e9} India");

        let bom = dir.path().join("bom.csv");
        fs::write(&bom, "\u{feff}Vendor,Amount\nAcme,10\n").unwrap();
        let table = import(&bom).unwrap();
        assert_eq!(table.headers[0], "Vendor");
    }

    #[test]
    fn test_missing_file_names_path() {
        let err = import(Path::new("/nonexistent/register.csv")).unwrap_err();
        assert!(err.contains("register.csv"), "{err}");
    }

    #[test]
    fn test_write_csv_quotes_commas() {
        let table = Table {
            headers: vec!["Vendor".into(), "Amount".into()],
            rows: vec![vec!["Tata Steel, Ltd".into(), "1,20,000".into()]],
        };
        let mut buf = Vec::new();
        write_csv(&table, &mut buf).unwrap();
        assert_eq!(
            String::from_utf8(buf).unwrap(),
            "Vendor,Amount\n\"Tata Steel, Ltd\",\"1,20,000\"\n"
        );
    }

    #[test]
    fn test_tsv_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.tsv");

        let table = Table {
            headers: vec!["Vendor".into(), "_spend".into()],
            rows: vec![
                vec!["Acme, Inc".into(), "42".into()],
                vec!["Globex".into(), "".into()],
            ],
        };
        export_tsv(&table, &path).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("Vendor\t_spend\n"));

        let back = import_tsv(&path).unwrap();
        assert_eq!(back, table);
    }
}

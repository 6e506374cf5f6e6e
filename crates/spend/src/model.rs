use std::collections::BTreeMap;

use serde::Serialize;

use crate::abc::{AbcClass, ClassTotals};
use crate::error::SpendError;
use crate::harmonize::MappingEntry;

// ---------------------------------------------------------------------------
// Table
// ---------------------------------------------------------------------------

/// A loaded sheet: ordered headers plus string cells. An empty (or
/// whitespace-only) cell is null.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(headers: Vec<String>) -> Self {
        Self {
            headers,
            rows: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Index of a header. Exact match first, then case-insensitive and trimmed.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name).or_else(|| {
            let wanted = name.trim().to_lowercase();
            self.headers
                .iter()
                .position(|h| h.trim().to_lowercase() == wanted)
        })
    }

    pub fn require_column(&self, name: &str) -> Result<usize, SpendError> {
        self.column_index(name)
            .ok_or_else(|| SpendError::MissingColumn {
                column: name.to_string(),
            })
    }

    /// Cell at (row, column); null cells are `None`.
    pub fn cell(&self, row: usize, col: usize) -> Option<&str> {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .map(|s| s.as_str())
            .filter(|s| !s.trim().is_empty())
    }

    /// Values of one column, null cells as `None`. Short rows read as null.
    pub fn column(&self, col: usize) -> Vec<Option<&str>> {
        (0..self.rows.len()).map(|r| self.cell(r, col)).collect()
    }

    /// Append a column, or overwrite it when the header already exists.
    pub fn set_column(&mut self, name: &str, values: Vec<String>) -> Result<(), SpendError> {
        if values.len() != self.rows.len() {
            return Err(SpendError::LengthMismatch {
                expected: self.rows.len(),
                found: values.len(),
            });
        }
        let width = self.headers.len();
        let idx = match self.headers.iter().position(|h| h == name) {
            Some(idx) => idx,
            None => {
                self.headers.push(name.to_string());
                width
            }
        };
        for (row, value) in self.rows.iter_mut().zip(values) {
            if row.len() <= idx {
                row.resize(idx + 1, String::new());
            }
            row[idx] = value;
        }
        Ok(())
    }

    /// Parse comma-separated text whose first record is the header row.
    /// Short records are padded, long ones keep their extra cells.
    pub fn from_csv(data: &str) -> Result<Self, SpendError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(data.as_bytes());

        let headers: Vec<String> = reader
            .headers()
            .map_err(|e| SpendError::Csv(e.to_string()))?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();
        let mut table = Self::new(headers);
        for record in reader.records() {
            let record = record.map_err(|e| SpendError::Csv(e.to_string()))?;
            let mut row: Vec<String> = record.iter().map(|c| c.to_string()).collect();
            if row.len() < table.headers.len() {
                row.resize(table.headers.len(), String::new());
            }
            table.rows.push(row);
        }
        Ok(table)
    }

    /// Keep rows whose mask entry is true. Rows past the mask are kept.
    pub fn retain_rows(&mut self, keep: &[bool]) {
        let mut i = 0;
        self.rows.retain(|_| {
            let k = keep.get(i).copied().unwrap_or(true);
            i += 1;
            k
        });
    }
}

pub(crate) fn flag(value: bool) -> String {
    if value { "true" } else { "false" }.to_string()
}

// ---------------------------------------------------------------------------
// Run summary
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize)]
pub struct FieldSummary {
    pub column: String,
    pub output: String,
    pub distinct: usize,
    pub clusters: usize,
    pub changed_rows: usize,
    pub passed_through: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub name: String,
    pub rows_in: usize,
    pub rows_out: usize,
    pub rows_dropped: usize,
    pub total_spend: f64,
    pub spend_missing: usize,
    pub dates_parsed: usize,
    pub dates_changed: usize,
    pub missing_fx: usize,
    pub any_harmonized: usize,
    pub fields: Vec<FieldSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub abc: Option<BTreeMap<AbcClass, ClassTotals>>,
    pub warnings: Vec<String>,
}

/// Everything a pipeline run produces.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub table: Table,
    pub summary: RunSummary,
    /// Harmonization audit per output column.
    pub mappings: BTreeMap<String, Vec<MappingEntry>>,
}

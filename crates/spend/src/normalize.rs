//! Comparison keys and light text cleanup.

use crate::model::Table;

/// Comparison key for fuzzy matching.
///
/// Lower-cases, replaces every character outside `[a-z0-9]` and whitespace
/// with a space, collapses whitespace runs and trims. Non-ASCII letters fold
/// to spaces, so the result is always ASCII.
pub fn normalize_text(raw: &str) -> String {
    let lowered = raw.trim().to_lowercase();
    let mut out = String::with_capacity(lowered.len());
    let mut pending_space = false;

    for ch in lowered.chars() {
        if ch.is_ascii_lowercase() || ch.is_ascii_digit() {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            out.push(ch);
        } else {
            pending_space = true;
        }
    }

    out
}

/// Light description cleanup: trim and collapse internal whitespace.
/// No case folding and no fuzzy grouping.
pub fn normalize_description(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

const MASTER_TOKENS: &[&str] = &[
    "id", "code", "no", "nr", "num", "number", "key", "sku", "gstin",
];

/// True when a column name looks like master data (IDs, codes, numbers).
///
/// Such columns are never fuzzy-harmonized: merging "V-1001" into "V-1007"
/// would corrupt keys.
pub fn is_master_like_column(name: &str) -> bool {
    split_name_tokens(name)
        .iter()
        .any(|t| MASTER_TOKENS.contains(&t.as_str()))
}

/// Split a column name on non-alphanumerics and lower→upper camel boundaries.
fn split_name_tokens(name: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut prev_lower = false;

    for ch in name.chars() {
        if !ch.is_alphanumeric() {
            if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
            prev_lower = false;
            continue;
        }
        if ch.is_uppercase() && prev_lower && !current.is_empty() {
            tokens.push(std::mem::take(&mut current));
        }
        prev_lower = ch.is_lowercase();
        current.extend(ch.to_lowercase());
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

/// Columns worth offering for fuzzy harmonization: text columns that are not
/// master-like and whose non-empty values are mostly non-numeric.
pub fn harmonizable_fields(table: &Table) -> Vec<String> {
    table
        .headers
        .iter()
        .enumerate()
        .filter(|(_, h)| !h.starts_with('_') && !is_master_like_column(h))
        .filter(|(idx, _)| {
            let mut filled = 0usize;
            let mut numeric = 0usize;
            for row in &table.rows {
                let v = row.get(*idx).map(|s| s.trim()).unwrap_or("");
                if v.is_empty() {
                    continue;
                }
                filled += 1;
                if crate::amount::clean_amount(v).is_some()
                    && v.chars().all(|c| !c.is_alphabetic())
                {
                    numeric += 1;
                }
            }
            filled > 0 && numeric * 2 < filled
        })
        .map(|(_, h)| h.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_punctuation_and_case() {
        assert_eq!(normalize_text("ACME CORP."), "acme corp");
        assert_eq!(normalize_text("  Acme   Corp "), "acme corp");
        assert_eq!(normalize_text("Acme-Corp (India) Pvt. Ltd"), "acme corp india pvt ltd");
    }

    #[test]
    fn normalize_empty_and_symbols() {
        assert_eq!(normalize_text(""), "");
        assert_eq!(normalize_text("   "), "");
        assert_eq!(normalize_text("&&--//"), "");
    }

    #[test]
    fn normalize_folds_non_ascii_to_space() {
        assert_eq!(normalize_text("Café Noir"), "caf noir");
    }

    #[test]
    fn description_light_cleanup() {
        assert_eq!(normalize_description("  Ball   Valve  2\" SS "), "Ball Valve 2\" SS");
        assert_eq!(normalize_description(""), "");
    }

    #[test]
    fn master_like_columns() {
        assert!(is_master_like_column("Supplier_ID"));
        assert!(is_master_like_column("Vendor Code"));
        assert!(is_master_like_column("Material No"));
        assert!(is_master_like_column("materialNumber"));
        assert!(is_master_like_column("GSTIN"));
        assert!(!is_master_like_column("Supplier Name"));
        assert!(!is_master_like_column("Department"));
        assert!(!is_master_like_column("Notes"));
    }

    #[test]
    fn harmonizable_fields_skip_numeric_and_ids() {
        let table = Table {
            headers: vec!["Vendor".into(), "Vendor Code".into(), "Amount".into(), "Plant".into()],
            rows: vec![
                vec!["Acme".into(), "V1".into(), "1,200".into(), "Pune".into()],
                vec!["Globex".into(), "V2".into(), "300".into(), "".into()],
            ],
        };
        assert_eq!(harmonizable_fields(&table), vec!["Vendor", "Plant"]);
    }
}

//! FX conversion against a table of rates quoted in one base currency.

use std::collections::BTreeMap;

use log::warn;
use serde::Serialize;

use crate::error::SpendError;

const DEFAULT_RATES: &[(&str, f64)] = &[
    ("INR", 1.0),
    ("USD", 83.0),
    ("EUR", 90.0),
    ("GBP", 105.0),
    ("AED", 22.6),
    ("SGD", 61.5),
];

/// Currency code → units of the base currency per one unit of the code.
#[derive(Debug, Clone, PartialEq)]
pub struct FxTable {
    pub base: String,
    pub rates: BTreeMap<String, f64>,
}

impl Default for FxTable {
    fn default() -> Self {
        Self {
            base: "INR".to_string(),
            rates: DEFAULT_RATES
                .iter()
                .map(|(code, rate)| (code.to_string(), *rate))
                .collect(),
        }
    }
}

/// Result of converting one amount.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Conversion {
    pub spend: Option<f64>,
    pub source: String,
    pub target: String,
    pub rate: Option<f64>,
    pub missing_fx: bool,
}

impl FxTable {
    /// Parse `CODE=rate` lines. Blank lines and `#` comments are skipped.
    /// The base currency is always present at rate 1.
    pub fn parse(text: &str) -> Result<Self, SpendError> {
        let mut table = Self {
            base: "INR".to_string(),
            rates: BTreeMap::new(),
        };
        for (idx, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let bad = || SpendError::FxParse {
                line: idx + 1,
                value: line.to_string(),
            };
            let (code, rate) = line.split_once('=').ok_or_else(bad)?;
            let code = normalize_code(code);
            let rate: f64 = rate.trim().parse().map_err(|_| bad())?;
            if code.is_empty() || !rate.is_finite() || rate <= 0.0 {
                return Err(bad());
            }
            table.rates.insert(code, rate);
        }
        table.rates.entry(table.base.clone()).or_insert(1.0);
        Ok(table)
    }

    /// Build from an already-keyed map (config files), validating each rate.
    pub fn from_rates(rates: &BTreeMap<String, f64>) -> Result<Self, SpendError> {
        let mut table = Self::default();
        for (code, rate) in rates {
            if !rate.is_finite() || *rate <= 0.0 {
                return Err(SpendError::ConfigValidation(format!(
                    "fx rate for '{code}' must be a positive number, got {rate}"
                )));
            }
            table.rates.insert(normalize_code(code), *rate);
        }
        Ok(table)
    }

    pub fn rate(&self, code: &str) -> Option<f64> {
        self.rates.get(&normalize_code(code)).copied()
    }

    /// Convert `amount` from `source` (or `default_source` when blank) into
    /// `target`. A missing rate on either side yields no spend and
    /// `missing_fx = true`.
    pub fn convert(
        &self,
        amount: Option<f64>,
        source: Option<&str>,
        target: &str,
        default_source: &str,
    ) -> Conversion {
        let source = match source.map(normalize_code) {
            Some(code) if !code.is_empty() => code,
            _ => normalize_code(default_source),
        };
        let target = normalize_code(target);

        let rate = match (self.rates.get(&source), self.rates.get(&target)) {
            (Some(src), Some(tgt)) => Some(src / tgt),
            _ => None,
        };
        Conversion {
            spend: rate.and_then(|r| amount.map(|a| a * r)),
            missing_fx: rate.is_none(),
            source,
            target,
            rate,
        }
    }
}

fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

/// Convert a column of amounts, logging one warning per unknown currency.
pub fn convert_column(
    fx: &FxTable,
    amounts: &[Option<f64>],
    sources: Option<&[Option<&str>]>,
    target: &str,
    default_source: &str,
) -> Vec<Conversion> {
    let mut warned: Vec<String> = Vec::new();
    amounts
        .iter()
        .enumerate()
        .map(|(i, amount)| {
            let source = sources.and_then(|s| s.get(i).copied().flatten());
            let conv = fx.convert(*amount, source, target, default_source);
            if conv.missing_fx && !warned.contains(&conv.source) {
                warn!(
                    "fx: no rate for {} -> {}, spend left empty",
                    conv.source, conv.target
                );
                warned.push(conv.source.clone());
            }
            conv
        })
        .collect()
}

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::abc::AbcCutoffs;
use crate::currency::FxTable;
use crate::error::SpendError;
use crate::harmonize::HarmonizeOptions;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    pub name: String,
    /// Input file, relative to the config file's directory.
    #[serde(default)]
    pub input: Option<String>,
    pub columns: ColumnMapping,
    #[serde(default)]
    pub harmonize: HarmonizeConfig,
    #[serde(default)]
    pub dates: DatesConfig,
    #[serde(default)]
    pub currency: Option<CurrencyConfig>,
    #[serde(default)]
    pub abc: Option<AbcConfig>,
    #[serde(default)]
    pub taxonomy: TaxonomyConfig,
    #[serde(default)]
    pub rows: RowsConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

// ---------------------------------------------------------------------------
// Column mapping
// ---------------------------------------------------------------------------

/// Source headers for each role. Only `amount` is required.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ColumnMapping {
    pub amount: String,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub supplier: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub plant: Option<String>,
    #[serde(default)]
    pub capexopex: Option<String>,
    #[serde(default)]
    pub currency: Option<String>,
}

impl ColumnMapping {
    pub fn field(&self, field: HarmonizeField) -> Option<&str> {
        match field {
            HarmonizeField::Supplier => self.supplier.as_deref(),
            HarmonizeField::Department => self.department.as_deref(),
            HarmonizeField::Plant => self.plant.as_deref(),
        }
    }
}

// ---------------------------------------------------------------------------
// Steps
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HarmonizeField {
    Supplier,
    Department,
    Plant,
}

impl HarmonizeField {
    pub const ALL: [HarmonizeField; 3] = [Self::Supplier, Self::Department, Self::Plant];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Supplier => "supplier",
            Self::Department => "department",
            Self::Plant => "plant",
        }
    }
}

impl std::fmt::Display for HarmonizeField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HarmonizeConfig {
    /// Fields to fuzzy-harmonize. Defaults to every mapped field.
    #[serde(default)]
    pub fields: Option<Vec<HarmonizeField>>,
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    #[serde(default = "default_min_len")]
    pub min_len: usize,
    #[serde(default = "default_max_uniques")]
    pub max_uniques: usize,
    /// Whitespace cleanup of the description column.
    #[serde(default = "default_true")]
    pub description: bool,
}

fn default_threshold() -> f64 {
    HarmonizeOptions::default().threshold
}

fn default_min_len() -> usize {
    HarmonizeOptions::default().min_len
}

fn default_max_uniques() -> usize {
    HarmonizeOptions::default().max_uniques
}

fn default_true() -> bool {
    true
}

impl Default for HarmonizeConfig {
    fn default() -> Self {
        Self {
            fields: None,
            threshold: default_threshold(),
            min_len: default_min_len(),
            max_uniques: default_max_uniques(),
            description: true,
        }
    }
}

impl HarmonizeConfig {
    pub fn options(&self) -> HarmonizeOptions {
        HarmonizeOptions {
            threshold: self.threshold,
            min_len: self.min_len,
            max_uniques: self.max_uniques,
        }
    }

    /// Fields to harmonize given the column mapping, in a fixed order.
    pub fn selected(&self, columns: &ColumnMapping) -> Vec<HarmonizeField> {
        match &self.fields {
            Some(fields) => {
                let mut out = fields.clone();
                out.sort();
                out.dedup();
                out
            }
            None => HarmonizeField::ALL
                .into_iter()
                .filter(|f| columns.field(*f).is_some())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatesConfig {
    #[serde(default = "default_true")]
    pub day_first: bool,
}

impl Default for DatesConfig {
    fn default() -> Self {
        Self { day_first: true }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CurrencyConfig {
    #[serde(default = "default_currency")]
    pub target: String,
    #[serde(default = "default_currency")]
    pub default_source: String,
    /// Overrides and additions to the built-in rate table.
    #[serde(default)]
    pub rates: BTreeMap<String, f64>,
}

fn default_currency() -> String {
    "INR".to_string()
}

impl CurrencyConfig {
    pub fn fx_table(&self) -> Result<FxTable, SpendError> {
        FxTable::from_rates(&self.rates)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AbcConfig {
    /// Output column to group by, e.g. `_supplier_h` or `Material_No`.
    pub group: String,
    #[serde(flatten)]
    pub cutoffs: AbcCutoffs,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TaxonomyConfig {
    /// Add a Material/Service `L1` column.
    #[serde(default)]
    pub l1: bool,
    /// Add clustered `L1`..`L4` and `TaxonomyPath` columns.
    #[serde(default)]
    pub generate: bool,
    #[serde(default = "default_l2")]
    pub l2: usize,
    #[serde(default = "default_l3")]
    pub l3: usize,
}

fn default_l2() -> usize {
    10
}

fn default_l3() -> usize {
    4
}

impl Default for TaxonomyConfig {
    fn default() -> Self {
        Self {
            l1: false,
            generate: false,
            l2: default_l2(),
            l3: default_l3(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RowsConfig {
    /// Drop rows missing spend, or a mapped date, supplier or description.
    #[serde(default)]
    pub drop_missing: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub file: Option<String>,
    /// Directory for per-field mapping CSVs.
    #[serde(default)]
    pub mappings: Option<String>,
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl PipelineConfig {
    pub fn from_toml(input: &str) -> Result<Self, SpendError> {
        let config: PipelineConfig =
            toml::from_str(input).map_err(|e| SpendError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), SpendError> {
        if self.columns.amount.trim().is_empty() {
            return Err(SpendError::ConfigValidation(
                "columns.amount must name a column".into(),
            ));
        }

        self.harmonize.options().validate()?;

        // Every harmonized field must be mapped to a source column
        if let Some(fields) = &self.harmonize.fields {
            for field in fields {
                if self.columns.field(*field).is_none() {
                    return Err(SpendError::ConfigValidation(format!(
                        "harmonize.fields lists '{field}' but columns.{field} is not mapped"
                    )));
                }
            }
        }

        if let Some(currency) = &self.currency {
            let fx = currency.fx_table()?;
            for (what, code) in [
                ("target", &currency.target),
                ("default_source", &currency.default_source),
            ] {
                if fx.rate(code).is_none() {
                    return Err(SpendError::ConfigValidation(format!(
                        "currency.{what} '{code}' has no fx rate"
                    )));
                }
            }
        }

        if let Some(abc) = &self.abc {
            if abc.group.trim().is_empty() {
                return Err(SpendError::ConfigValidation(
                    "abc.group must name a column".into(),
                ));
            }
            abc.cutoffs.validate()?;
        }

        if (self.taxonomy.l1 || self.taxonomy.generate) && self.columns.description.is_none() {
            return Err(SpendError::ConfigValidation(
                "taxonomy needs columns.description".into(),
            ));
        }
        if self.taxonomy.generate && (self.taxonomy.l2 == 0 || self.taxonomy.l3 == 0) {
            return Err(SpendError::ConfigValidation(
                "taxonomy.l2 and taxonomy.l3 must be at least 1".into(),
            ));
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

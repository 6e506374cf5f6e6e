use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum SpendError {
    /// TOML parse / deserialization error.
    ConfigParse(String),
    /// Config validation error (bad step, unknown field, etc.).
    ConfigValidation(String),
    /// Similarity threshold outside [0, 1].
    InvalidThreshold(f64),
    /// Minimum comparable length below 1.
    InvalidMinLength(usize),
    /// Unique-value ceiling of zero.
    InvalidMaxUniques,
    /// ABC cutoffs violate 0 < a_cut < b_cut <= 1.
    InvalidCutoffs { a_cut: f64, b_cut: f64 },
    /// Malformed FX table line.
    FxParse { line: usize, value: String },
    /// Missing required column in input data.
    MissingColumn { column: String },
    /// Parallel inputs of different lengths.
    LengthMismatch { expected: usize, found: usize },
    /// External classifier failure (LLM or clustering backend).
    Classifier(String),
    /// Malformed CSV input.
    Csv(String),
}

impl fmt::Display for SpendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigParse(msg) => write!(f, "config parse error: {msg}"),
            Self::ConfigValidation(msg) => write!(f, "config validation error: {msg}"),
            Self::InvalidThreshold(t) => {
                write!(f, "similarity threshold must be within [0, 1], got {t}")
            }
            Self::InvalidMinLength(n) => write!(f, "min_len must be at least 1, got {n}"),
            Self::InvalidMaxUniques => write!(f, "max_uniques must be at least 1"),
            Self::InvalidCutoffs { a_cut, b_cut } => write!(
                f,
                "ABC cutoffs must satisfy 0 < a_cut < b_cut <= 1, got a_cut={a_cut} b_cut={b_cut}"
            ),
            Self::FxParse { line, value } => {
                write!(f, "fx table line {line}: expected CODE=rate, got '{value}'")
            }
            Self::MissingColumn { column } => write!(f, "missing column '{column}'"),
            Self::LengthMismatch { expected, found } => {
                write!(f, "column length mismatch: expected {expected} values, found {found}")
            }
            Self::Classifier(msg) => write!(f, "classifier error: {msg}"),
            Self::Csv(msg) => write!(f, "CSV error: {msg}"),
        }
    }
}

impl std::error::Error for SpendError {}

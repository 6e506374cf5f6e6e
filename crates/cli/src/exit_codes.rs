//! CLI Exit Code Registry
//!
//! This is the single source of truth for all CLI exit codes.
//! Exit codes are part of the shell contract: scripts rely on them.
//!
//! | Code | Meaning                                                  |
//! |------|----------------------------------------------------------|
//! | 0    | Success                                                  |
//! | 1    | General error (unspecified)                              |
//! | 2    | Usage error (bad args, unknown column)                   |
//! | 3    | IO error (cannot read input, cannot write output)        |
//! | 4    | Parse error (malformed input file, FX table, date)       |
//! | 5    | Invalid pipeline config                                  |
//! | 6    | Contract violation (threshold, min_len, cutoffs)         |
//!
//! # Adding New Exit Codes
//!
//! 1. Add the constant
//! 2. Document what triggers it
//! 3. Update the table above
//! 4. Wire it into `spend_exit_code` if a `SpendError` can trigger it

use spendgrid_spend::SpendError;

/// Success - command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// General error - unspecified failure.
/// Avoid using this; prefer a specific error code.
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments, unknown column names.
pub const EXIT_USAGE: u8 = 2;

/// Input file unreadable or output unwritable.
pub const EXIT_IO: u8 = 3;

/// Malformed input content.
pub const EXIT_PARSE: u8 = 4;

/// Pipeline config failed to parse or validate.
pub const EXIT_INVALID_CONFIG: u8 = 5;

/// Harmonizer or classifier parameters out of range.
pub const EXIT_CONTRACT: u8 = 6;

/// Map a SpendError to its exit code.
pub fn spend_exit_code(err: &SpendError) -> u8 {
    match err {
        SpendError::ConfigParse(_) | SpendError::ConfigValidation(_) => EXIT_INVALID_CONFIG,
        SpendError::InvalidThreshold(_)
        | SpendError::InvalidMinLength(_)
        | SpendError::InvalidMaxUniques
        | SpendError::InvalidCutoffs { .. } => EXIT_CONTRACT,
        SpendError::FxParse { .. } | SpendError::Csv(_) => EXIT_PARSE,
        SpendError::MissingColumn { .. } => EXIT_USAGE,
        SpendError::LengthMismatch { .. } | SpendError::Classifier(_) => EXIT_ERROR,
    }
}

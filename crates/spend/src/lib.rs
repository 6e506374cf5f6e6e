//! `spendgrid-spend`: procurement spend harmonization engine.
//!
//! Pure engine crate: receives pre-loaded tables and columns, returns
//! harmonized columns, ABC classes and rollups. No CLI or IO dependencies.

pub mod abc;
pub mod amount;
pub mod analytics;
pub mod config;
pub mod currency;
pub mod dates;
pub mod engine;
pub mod error;
pub mod harmonize;
pub mod model;
pub mod normalize;
pub mod similarity;
pub mod taxonomy;

pub use abc::{classify_abc, AbcClass, AbcCutoffs, AbcResult};
pub use config::PipelineConfig;
pub use engine::run;
pub use error::SpendError;
pub use harmonize::{harmonize, HarmonizeOptions, Harmonized, MappingEntry};
pub use model::{PipelineOutput, RunSummary, Table};

//! `tallygrid-recon` — Two-sided tabular reconciliation engine.
//!
//! Pure engine crate: receives pre-loaded tables, returns a classified
//! result table. No UI or storage dependencies.

pub mod aggregate;
pub mod classify;
pub mod clean;
pub mod config;
pub mod engine;
pub mod error;
pub mod filter;
pub mod flow;
pub mod formula;
pub mod key;
pub mod merge;
pub mod model;
pub mod preview;

pub use config::ReconConfig;
pub use engine::{load_csv_table, run};
pub use error::ReconError;
pub use model::{ReconResult, Status, Summary};

//! `tallygrid-core` — Core types shared across the workspace.
//!
//! A [`Table`] is an in-memory tabular dataset: an ordered column header
//! plus rows of scalar [`Value`]s. Everything downstream (filtering,
//! aggregation, merging) consumes tables by reference and produces new
//! tables.

pub mod table;
pub mod value;

pub use table::Table;
pub use value::Value;

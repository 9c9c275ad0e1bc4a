//! catalog-ingest: bulk ingestion for an online course catalog
//!
//! Loads courses, course runs, degrees, course editors and geo/value data
//! from CSV files and spreadsheet tabs into a catalog store, keeping draft
//! and official records in step and propagating changes to the authoring
//! and marketing systems.

pub mod cli;
pub mod core;
pub mod ingest;
pub mod logging;
pub mod schema;
pub mod sync;

//! Ingestion of CCLF claim-line feed deliveries.
//!
//! A run walks a landing directory, groups deliveries by ACO and performance
//! year, checks each CCLF8/CCLF9 archive against the counts and lengths its
//! CCLF0 declares, loads the records into a [`store::Store`], and moves
//! finished files to a pending-deletion directory.

pub mod archive;
pub mod config;
pub mod discover;
pub mod error;
pub mod import;
pub mod pipeline;
pub mod retention;
pub mod store;
pub mod validate;

#[cfg(test)]
pub(crate) mod testutil;

pub use config::PipelineConfig;
pub use error::ImportError;
pub use pipeline::{import_directory, ImportSummary};

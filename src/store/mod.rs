//! Persistence seam for imported CCLF data.
//!
//! The importer only talks to [`Store`]. Two backends ship with the crate:
//! [`ParquetStore`] writes hive-partitioned Parquet tables, [`MemoryStore`]
//! keeps everything in process for tests and dry runs.

pub mod memory;
pub mod parquet_store;
pub mod rows;
pub mod table;

use std::{io, path::PathBuf};

pub use memory::MemoryStore;
pub use parquet_store::ParquetStore;
pub use rows::{CclfBeneficiary, CclfBeneficiaryXref, CclfFileRow, NewCclfFile};

pub type FileId = u64;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error on {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Arrow(#[from] ::arrow::error::ArrowError),

    #[error(transparent)]
    Parquet(#[from] ::parquet::errors::ParquetError),

    #[error(transparent)]
    Pattern(#[from] glob::PatternError),

    #[error(transparent)]
    Glob(#[from] glob::GlobError),

    #[error("column {column} of table {table} is missing or has an unexpected type")]
    Schema {
        table: &'static str,
        column: &'static str,
    },

    #[error("no open file record with id {0}")]
    UnknownFile(FileId),

    #[error("write rejected: {0}")]
    Rejected(String),
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Where imported files and their rows end up.
///
/// Every row references a file id returned by `create_file` in the same
/// import. `commit` and `rollback` bracket one file's rows; backends that
/// write eagerly can leave them as no-ops.
pub trait Store: Send + Sync {
    fn create_file(&self, file: &NewCclfFile) -> Result<FileId, StoreError>;

    fn create_beneficiary(&self, row: &CclfBeneficiary) -> Result<(), StoreError>;

    fn create_xref(&self, row: &CclfBeneficiaryXref) -> Result<(), StoreError>;

    fn commit(&self, _file_id: FileId) -> Result<(), StoreError> {
        Ok(())
    }

    fn rollback(&self, _file_id: FileId) -> Result<(), StoreError> {
        Ok(())
    }
}

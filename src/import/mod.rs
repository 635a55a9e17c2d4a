//! Loading validated CCLF8/CCLF9 archives into a [`Store`].

pub mod layout;

use tracing::{error, info, instrument, warn};

use crate::archive::CclfArchive;
use crate::discover::{FileKind, FileMetadata};
use crate::error::ImportError;
use crate::store::{FileId, NewCclfFile, Store};

pub use layout::{Layout, Record};

impl FileKind {
    /// Record layout for dependent kinds; the header has none.
    pub fn layout(&self) -> Option<Layout> {
        match self {
            FileKind::Header => None,
            FileKind::Beneficiary => Some(Layout::Beneficiary),
            FileKind::Xref => Some(Layout::Xref),
        }
    }
}

/// Import one dependent file: create its file record, then one row per
/// non-blank line, all referencing that record.
///
/// Any failing row aborts the file and asks the store to roll it back.
/// Returns the number of rows written.
#[instrument(level = "info", skip_all, fields(file = %file.name, kind = %file.kind))]
pub fn import_file<S: Store + ?Sized>(file: &FileMetadata, store: &S) -> Result<u64, ImportError> {
    let layout = file.kind.layout().ok_or_else(|| ImportError::UnexpectedKind {
        file: file.name.clone(),
        kind: file.kind.tag(),
    })?;
    info!("importing file");

    let mut archive = CclfArchive::open(&file.path, &file.name)?;
    if archive.is_empty() {
        let err = ImportError::EmptyArchive {
            archive: file.name.clone(),
        };
        error!(error = %err);
        return Err(err);
    }

    let new_file = NewCclfFile {
        cclf_num: file.kind.number(),
        name: file.name.clone(),
        aco_cms_id: file.aco_id.clone(),
        timestamp: file.timestamp,
        performance_year: file.performance_year,
    };
    let file_id = store.create_file(&new_file).map_err(|source| {
        let err = ImportError::Persistence {
            file: file.name.clone(),
            action: "create file record",
            source,
        };
        error!(error = %err);
        err
    })?;

    let mut line_no = 0u64;
    let result = archive.for_each_record(|line| {
        line_no += 1;
        let record = layout.parse(file_id, line, file.kind.tag(), line_no)?;
        write_record(store, &record).map_err(|source| ImportError::Persistence {
            file: file.name.clone(),
            action: match record {
                Record::Beneficiary(_) => "create CCLF8 beneficiary record",
                Record::Xref(_) => "create CCLF9 cross reference record",
            },
            source,
        })
    });

    let rows = match result {
        Ok(rows) => rows,
        Err(err) => {
            error!(error = %err, line = line_no, "import aborted");
            abandon(store, file_id);
            return Err(err);
        }
    };

    store.commit(file_id).map_err(|source| {
        let err = ImportError::Persistence {
            file: file.name.clone(),
            action: "commit file",
            source,
        };
        error!(error = %err);
        abandon(store, file_id);
        err
    })?;

    info!(file_id, rows, "successfully imported file");
    Ok(rows)
}

fn write_record<S: Store + ?Sized>(store: &S, record: &Record) -> Result<(), crate::store::StoreError> {
    match record {
        Record::Beneficiary(row) => store.create_beneficiary(row),
        Record::Xref(row) => store.create_xref(row),
    }
}

fn abandon<S: Store + ?Sized>(store: &S, file_id: FileId) {
    if let Err(e) = store.rollback(file_id) {
        warn!(file_id, error = %e, "rollback failed");
    }
}

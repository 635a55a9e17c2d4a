use std::{
    collections::HashMap,
    fs,
    path::PathBuf,
    sync::{
        atomic::{AtomicU64, Ordering},
        Mutex, PoisonError,
    },
};
use tracing::{debug, info, warn};

use super::rows::{CclfBeneficiary, CclfBeneficiaryXref, CclfFileRow, NewCclfFile};
use super::table::Table;
use super::{FileId, Store, StoreError};

#[derive(Default)]
struct PendingFile {
    file: Option<CclfFileRow>,
    beneficiaries: Vec<CclfBeneficiary>,
    xrefs: Vec<CclfBeneficiaryXref>,
}

/// Store backed by three Parquet tables under one directory.
///
/// A file's rows are held in memory until `commit`, which writes the row
/// tables first and the file record last. If any of those writes fails the
/// ones already made are deleted, so a file is on disk in full or not at all.
pub struct ParquetStore {
    files: Table<CclfFileRow>,
    beneficiaries: Table<CclfBeneficiary>,
    xrefs: Table<CclfBeneficiaryXref>,
    next_id: AtomicU64,
    pending: Mutex<HashMap<FileId, PendingFile>>,
}

impl ParquetStore {
    /// Open (or create) a store at `base_dir`. File ids continue after the
    /// highest id found in any of the three tables.
    pub fn open(base_dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let base_dir = base_dir.into();
        let files: Table<CclfFileRow> = Table::open(&base_dir)?;
        let beneficiaries: Table<CclfBeneficiary> = Table::open(&base_dir)?;
        let xrefs: Table<CclfBeneficiaryXref> = Table::open(&base_dir)?;

        let last_id = files
            .scan()?
            .iter()
            .map(|f| f.id)
            .chain(beneficiaries.scan()?.iter().map(|b| b.file_id))
            .chain(xrefs.scan()?.iter().map(|x| x.file_id))
            .max()
            .unwrap_or(0);
        info!(dir = %base_dir.display(), last_id, "opened parquet store");

        Ok(Self {
            files,
            beneficiaries,
            xrefs,
            next_id: AtomicU64::new(last_id + 1),
            pending: Mutex::new(HashMap::new()),
        })
    }

    pub fn files(&self) -> Result<Vec<CclfFileRow>, StoreError> {
        self.files.scan()
    }

    pub fn beneficiaries(&self) -> Result<Vec<CclfBeneficiary>, StoreError> {
        self.beneficiaries.scan()
    }

    pub fn xrefs(&self) -> Result<Vec<CclfBeneficiaryXref>, StoreError> {
        self.xrefs.scan()
    }

    fn with_pending<T>(
        &self,
        file_id: FileId,
        f: impl FnOnce(&mut PendingFile) -> T,
    ) -> Result<T, StoreError> {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        pending
            .get_mut(&file_id)
            .map(f)
            .ok_or(StoreError::UnknownFile(file_id))
    }
}

impl Store for ParquetStore {
    fn create_file(&self, file: &NewCclfFile) -> Result<FileId, StoreError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let pending = PendingFile {
            file: Some(CclfFileRow::new(id, file)),
            ..Default::default()
        };
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, pending);
        debug!(id, name = %file.name, "opened file record");
        Ok(id)
    }

    fn create_beneficiary(&self, row: &CclfBeneficiary) -> Result<(), StoreError> {
        self.with_pending(row.file_id, |p| p.beneficiaries.push(row.clone()))
    }

    fn create_xref(&self, row: &CclfBeneficiaryXref) -> Result<(), StoreError> {
        self.with_pending(row.file_id, |p| p.xrefs.push(row.clone()))
    }

    fn commit(&self, file_id: FileId) -> Result<(), StoreError> {
        let pending = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&file_id)
            .ok_or(StoreError::UnknownFile(file_id))?;

        let key = format!("{:010}", file_id);
        let mut written = Vec::new();
        let result = self
            .beneficiaries
            .append(&key, &pending.beneficiaries)
            .and_then(|path| {
                written.extend(path);
                self.xrefs.append(&key, &pending.xrefs)
            })
            .and_then(|path| {
                written.extend(path);
                match &pending.file {
                    Some(file) => self.files.append(&key, std::slice::from_ref(file)),
                    None => Ok(None),
                }
            });
        if let Err(err) = result {
            warn!(
                file_id,
                error = %err,
                written = written.len(),
                "commit failed, removing partial write"
            );
            for path in &written {
                if let Err(e) = fs::remove_file(path) {
                    warn!(file = %path.display(), error = %e, "could not remove partial write");
                }
            }
            return Err(err);
        }

        info!(
            file_id,
            beneficiaries = pending.beneficiaries.len(),
            xrefs = pending.xrefs.len(),
            "committed file"
        );
        Ok(())
    }

    fn rollback(&self, file_id: FileId) -> Result<(), StoreError> {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&file_id);
        debug!(file_id, "rolled back file");
        Ok(())
    }
}

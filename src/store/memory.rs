use std::sync::{
    atomic::{AtomicU64, AtomicUsize, Ordering},
    Mutex, MutexGuard, PoisonError,
};

use super::rows::{CclfBeneficiary, CclfBeneficiaryXref, CclfFileRow, NewCclfFile};
use super::{FileId, Store, StoreError};

#[derive(Default)]
struct Tables {
    files: Vec<CclfFileRow>,
    beneficiaries: Vec<CclfBeneficiary>,
    xrefs: Vec<CclfBeneficiaryXref>,
}

/// In-process store. Writes land immediately; `rollback` removes a file and
/// every row pointing at it.
pub struct MemoryStore {
    tables: Mutex<Tables>,
    next_id: AtomicU64,
    row_writes: AtomicUsize,
    reject_rows_after: Option<usize>,
    reject_files: bool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(Tables::default()),
            next_id: AtomicU64::new(1),
            row_writes: AtomicUsize::new(0),
            reject_rows_after: None,
            reject_files: false,
        }
    }

    /// Accept `n` row writes, then reject every later one.
    pub fn reject_rows_after(mut self, n: usize) -> Self {
        self.reject_rows_after = Some(n);
        self
    }

    /// Reject every `create_file` call.
    pub fn reject_files(mut self) -> Self {
        self.reject_files = true;
        self
    }

    pub fn files(&self) -> Vec<CclfFileRow> {
        self.lock().files.clone()
    }

    pub fn beneficiaries(&self) -> Vec<CclfBeneficiary> {
        self.lock().beneficiaries.clone()
    }

    pub fn xrefs(&self) -> Vec<CclfBeneficiaryXref> {
        self.lock().xrefs.clone()
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_row(&self, file_id: FileId) -> Result<(), StoreError> {
        let written = self.row_writes.fetch_add(1, Ordering::SeqCst);
        if self.reject_rows_after.is_some_and(|n| written >= n) {
            return Err(StoreError::Rejected(format!("row #{} refused", written + 1)));
        }
        if !self.lock().files.iter().any(|f| f.id == file_id) {
            return Err(StoreError::UnknownFile(file_id));
        }
        Ok(())
    }
}

impl Store for MemoryStore {
    fn create_file(&self, file: &NewCclfFile) -> Result<FileId, StoreError> {
        if self.reject_files {
            return Err(StoreError::Rejected(format!("file {} refused", file.name)));
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.lock().files.push(CclfFileRow::new(id, file));
        Ok(id)
    }

    fn create_beneficiary(&self, row: &CclfBeneficiary) -> Result<(), StoreError> {
        self.check_row(row.file_id)?;
        self.lock().beneficiaries.push(row.clone());
        Ok(())
    }

    fn create_xref(&self, row: &CclfBeneficiaryXref) -> Result<(), StoreError> {
        self.check_row(row.file_id)?;
        self.lock().xrefs.push(row.clone());
        Ok(())
    }

    fn rollback(&self, file_id: FileId) -> Result<(), StoreError> {
        let mut tables = self.lock();
        tables.files.retain(|f| f.id != file_id);
        tables.beneficiaries.retain(|r| r.file_id != file_id);
        tables.xrefs.retain(|r| r.file_id != file_id);
        Ok(())
    }
}

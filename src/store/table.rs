use arrow::{
    array::ArrayRef,
    datatypes::Schema as ArrowSchema,
    record_batch::RecordBatch,
};
use chrono::Utc;
use glob::glob;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use std::{
    fs::{self, File},
    io::BufWriter,
    marker::PhantomData,
    path::{Path, PathBuf},
    sync::Arc,
};

use super::StoreError;

/// A row type that can live in a [`Table`].
pub trait TableRow: Sized {
    /// Directory name of the table under the store root.
    const TABLE: &'static str;
    /// Arrow schema for this row type
    fn schema() -> ArrowSchema;
    /// Column arrays for a slice of rows, in schema order
    fn to_arrays(rows: &[Self]) -> Vec<ArrayRef>;
    /// Rebuild rows from a batch read back from disk
    fn from_batch(batch: &RecordBatch) -> Result<Vec<Self>, StoreError>;
}

/// Hive-partitioned Parquet table: `<base>/<table>/date=YYYYMMDD/<key>---<ts>.parquet`.
///
/// Each `append` writes one file through a `.tmp` sibling and a rename, so
/// readers never see a half-written batch.
pub struct Table<R: TableRow> {
    dir: PathBuf,
    schema: Arc<ArrowSchema>,
    _marker: PhantomData<R>,
}

impl<R: TableRow> Table<R> {
    pub fn open(base_dir: &Path) -> Result<Self, StoreError> {
        let dir = base_dir.join(R::TABLE);
        fs::create_dir_all(&dir).map_err(|e| StoreError::io(&dir, e))?;
        Ok(Self {
            dir,
            schema: Arc::new(R::schema()),
            _marker: PhantomData,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write `rows` as a single Parquet file tagged with `key` and return its
    /// path. Empty input writes nothing.
    pub fn append(&self, key: &str, rows: &[R]) -> Result<Option<PathBuf>, StoreError> {
        if rows.is_empty() {
            return Ok(None);
        }

        let now = Utc::now();
        let partition = format!("date={}", now.date_naive().format("%Y%m%d"));
        let dir = self.dir.join(partition);
        fs::create_dir_all(&dir).map_err(|e| StoreError::io(&dir, e))?;

        let fname = format!("{}---{}.parquet", key, now.timestamp_micros());
        let tmp = dir.join(format!("{}.tmp", fname));
        let final_path = dir.join(&fname);

        if let Err(e) = self.write_batch(&tmp, rows) {
            let _ = fs::remove_file(&tmp);
            return Err(e);
        }
        fs::rename(&tmp, &final_path).map_err(|e| StoreError::io(&final_path, e))?;
        Ok(Some(final_path))
    }

    fn write_batch(&self, path: &Path, rows: &[R]) -> Result<(), StoreError> {
        let file = File::create(path).map_err(|e| StoreError::io(path, e))?;
        let mut writer = ArrowWriter::try_new(BufWriter::new(file), self.schema.clone(), None)?;
        let batch = RecordBatch::try_new(self.schema.clone(), R::to_arrays(rows))?;
        writer.write(&batch)?;
        writer.close()?;
        Ok(())
    }

    /// Read every committed row in the table.
    pub fn scan(&self) -> Result<Vec<R>, StoreError> {
        let mut rows = Vec::new();
        for entry in glob(&format!("{}/*/*.parquet", self.dir.display()))? {
            let path = entry?;
            let file = File::open(&path).map_err(|e| StoreError::io(&path, e))?;
            let reader = ParquetRecordBatchReaderBuilder::try_new(file)?
                .with_batch_size(1024)
                .build()?;
            for batch in reader {
                rows.extend(R::from_batch(&batch?)?);
            }
        }
        Ok(rows)
    }
}

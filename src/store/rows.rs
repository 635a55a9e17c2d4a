use arrow::{
    array::{
        Array, ArrayRef, StringArray, TimestampMicrosecondArray, UInt16Array, UInt64Array,
        UInt8Array,
    },
    datatypes::{DataType as ArrowDataType, Field, Schema as ArrowSchema, TimeUnit},
    record_batch::RecordBatch,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;

use super::table::TableRow;
use super::{FileId, StoreError};

/// A CCLF archive about to be recorded; the store assigns its id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewCclfFile {
    pub cclf_num: u8,
    pub name: String,
    pub aco_cms_id: String,
    pub timestamp: DateTime<Utc>,
    pub performance_year: u16,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CclfFileRow {
    pub id: FileId,
    pub cclf_num: u8,
    pub name: String,
    pub aco_cms_id: String,
    pub timestamp: DateTime<Utc>,
    pub performance_year: u16,
}

impl CclfFileRow {
    pub fn new(id: FileId, file: &NewCclfFile) -> Self {
        Self {
            id,
            cclf_num: file.cclf_num,
            name: file.name.clone(),
            aco_cms_id: file.aco_cms_id.clone(),
            timestamp: file.timestamp,
            performance_year: file.performance_year,
        }
    }
}

/// One CCLF8 record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CclfBeneficiary {
    pub file_id: FileId,
    pub mbi: String,
    pub hicn: String,
}

/// One CCLF9 record. Fields are kept exactly as delivered, padding included.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CclfBeneficiaryXref {
    pub file_id: FileId,
    pub xref_indicator: String,
    pub current_num: String,
    pub prev_num: String,
    pub prevs_efct_dt: String,
    pub prevs_obslt_dt: String,
}

fn column<'a, A: Array + 'static>(
    batch: &'a RecordBatch,
    table: &'static str,
    name: &'static str,
) -> Result<&'a A, StoreError> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<A>())
        .ok_or(StoreError::Schema {
            table,
            column: name,
        })
}

fn utf8(name: &str) -> Field {
    Field::new(name, ArrowDataType::Utf8, false)
}

impl TableRow for CclfFileRow {
    const TABLE: &'static str = "cclf_files";

    fn schema() -> ArrowSchema {
        ArrowSchema::new(vec![
            Field::new("id", ArrowDataType::UInt64, false),
            Field::new("cclf_num", ArrowDataType::UInt8, false),
            utf8("name"),
            utf8("aco_cms_id"),
            Field::new(
                "timestamp",
                ArrowDataType::Timestamp(TimeUnit::Microsecond, None),
                false,
            ),
            Field::new("performance_year", ArrowDataType::UInt16, false),
        ])
    }

    fn to_arrays(rows: &[Self]) -> Vec<ArrayRef> {
        vec![
            Arc::new(UInt64Array::from_iter_values(rows.iter().map(|r| r.id))),
            Arc::new(UInt8Array::from_iter_values(rows.iter().map(|r| r.cclf_num))),
            Arc::new(StringArray::from_iter_values(rows.iter().map(|r| &r.name))),
            Arc::new(StringArray::from_iter_values(
                rows.iter().map(|r| &r.aco_cms_id),
            )),
            Arc::new(TimestampMicrosecondArray::from_iter_values(
                rows.iter().map(|r| r.timestamp.timestamp_micros()),
            )),
            Arc::new(UInt16Array::from_iter_values(
                rows.iter().map(|r| r.performance_year),
            )),
        ]
    }

    fn from_batch(batch: &RecordBatch) -> Result<Vec<Self>, StoreError> {
        let ids = column::<UInt64Array>(batch, Self::TABLE, "id")?;
        let nums = column::<UInt8Array>(batch, Self::TABLE, "cclf_num")?;
        let names = column::<StringArray>(batch, Self::TABLE, "name")?;
        let acos = column::<StringArray>(batch, Self::TABLE, "aco_cms_id")?;
        let stamps = column::<TimestampMicrosecondArray>(batch, Self::TABLE, "timestamp")?;
        let years = column::<UInt16Array>(batch, Self::TABLE, "performance_year")?;

        (0..batch.num_rows())
            .map(|i| {
                let timestamp = DateTime::<Utc>::from_timestamp_micros(stamps.value(i)).ok_or(
                    StoreError::Schema {
                        table: Self::TABLE,
                        column: "timestamp",
                    },
                )?;
                Ok(CclfFileRow {
                    id: ids.value(i),
                    cclf_num: nums.value(i),
                    name: names.value(i).to_string(),
                    aco_cms_id: acos.value(i).to_string(),
                    timestamp,
                    performance_year: years.value(i),
                })
            })
            .collect()
    }
}

impl TableRow for CclfBeneficiary {
    const TABLE: &'static str = "cclf_beneficiaries";

    fn schema() -> ArrowSchema {
        ArrowSchema::new(vec![
            Field::new("file_id", ArrowDataType::UInt64, false),
            utf8("mbi"),
            utf8("hicn"),
        ])
    }

    fn to_arrays(rows: &[Self]) -> Vec<ArrayRef> {
        vec![
            Arc::new(UInt64Array::from_iter_values(rows.iter().map(|r| r.file_id))),
            Arc::new(StringArray::from_iter_values(rows.iter().map(|r| &r.mbi))),
            Arc::new(StringArray::from_iter_values(rows.iter().map(|r| &r.hicn))),
        ]
    }

    fn from_batch(batch: &RecordBatch) -> Result<Vec<Self>, StoreError> {
        let ids = column::<UInt64Array>(batch, Self::TABLE, "file_id")?;
        let mbis = column::<StringArray>(batch, Self::TABLE, "mbi")?;
        let hicns = column::<StringArray>(batch, Self::TABLE, "hicn")?;
        Ok((0..batch.num_rows())
            .map(|i| CclfBeneficiary {
                file_id: ids.value(i),
                mbi: mbis.value(i).to_string(),
                hicn: hicns.value(i).to_string(),
            })
            .collect())
    }
}

impl TableRow for CclfBeneficiaryXref {
    const TABLE: &'static str = "cclf_beneficiary_xrefs";

    fn schema() -> ArrowSchema {
        ArrowSchema::new(vec![
            Field::new("file_id", ArrowDataType::UInt64, false),
            utf8("xref_indicator"),
            utf8("current_num"),
            utf8("prev_num"),
            utf8("prevs_efct_dt"),
            utf8("prevs_obslt_dt"),
        ])
    }

    fn to_arrays(rows: &[Self]) -> Vec<ArrayRef> {
        vec![
            Arc::new(UInt64Array::from_iter_values(rows.iter().map(|r| r.file_id))),
            Arc::new(StringArray::from_iter_values(
                rows.iter().map(|r| &r.xref_indicator),
            )),
            Arc::new(StringArray::from_iter_values(
                rows.iter().map(|r| &r.current_num),
            )),
            Arc::new(StringArray::from_iter_values(rows.iter().map(|r| &r.prev_num))),
            Arc::new(StringArray::from_iter_values(
                rows.iter().map(|r| &r.prevs_efct_dt),
            )),
            Arc::new(StringArray::from_iter_values(
                rows.iter().map(|r| &r.prevs_obslt_dt),
            )),
        ]
    }

    fn from_batch(batch: &RecordBatch) -> Result<Vec<Self>, StoreError> {
        let t = Self::TABLE;
        let ids = column::<UInt64Array>(batch, t, "file_id")?;
        let indicators = column::<StringArray>(batch, t, "xref_indicator")?;
        let current = column::<StringArray>(batch, t, "current_num")?;
        let prev = column::<StringArray>(batch, t, "prev_num")?;
        let efct = column::<StringArray>(batch, t, "prevs_efct_dt")?;
        let obslt = column::<StringArray>(batch, t, "prevs_obslt_dt")?;
        Ok((0..batch.num_rows())
            .map(|i| CclfBeneficiaryXref {
                file_id: ids.value(i),
                xref_indicator: indicators.value(i).to_string(),
                current_num: current.value(i).to_string(),
                prev_num: prev.value(i).to_string(),
                prevs_efct_dt: efct.value(i).to_string(),
                prevs_obslt_dt: obslt.value(i).to_string(),
            })
            .collect())
    }
}

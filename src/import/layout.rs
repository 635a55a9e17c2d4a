//! Fixed-width record layouts of the dependent CCLF files.

use crate::error::ImportError;
use crate::store::{CclfBeneficiary, CclfBeneficiaryXref, FileId};

const MBI: (usize, usize) = (0, 11);
const HICN: (usize, usize) = (11, 22);

const XREF_INDICATOR: (usize, usize) = (0, 1);
const CURRENT_NUM: (usize, usize) = (1, 12);
const PREV_NUM: (usize, usize) = (12, 23);
const PREV_EFCT_DT: (usize, usize) = (23, 33);
const PREV_OBSLT_DT: (usize, usize) = (33, 43);

/// A parsed data record, ready for the store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Record {
    Beneficiary(CclfBeneficiary),
    Xref(CclfBeneficiaryXref),
}

/// Layout of one dependent file kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Layout {
    /// CCLF8: MBI then HICN, both trimmed.
    Beneficiary,
    /// CCLF9: indicator, current and previous ids, effective and obsolete
    /// dates, kept as delivered.
    Xref,
}

impl Layout {
    /// Shortest line this layout can be read from.
    pub fn min_len(&self) -> usize {
        match self {
            Layout::Beneficiary => HICN.1,
            Layout::Xref => PREV_OBSLT_DT.1,
        }
    }

    /// Parse `line`, the `line_no`-th record of `file`.
    pub fn parse(
        &self,
        file_id: FileId,
        line: &[u8],
        file: &str,
        line_no: u64,
    ) -> Result<Record, ImportError> {
        if line.len() < self.min_len() {
            return Err(ImportError::RecordTooShort {
                file: file.to_string(),
                line: line_no,
                needed: self.min_len(),
                actual: line.len(),
            });
        }

        Ok(match self {
            Layout::Beneficiary => Record::Beneficiary(CclfBeneficiary {
                file_id,
                mbi: trimmed(line, MBI),
                hicn: trimmed(line, HICN),
            }),
            Layout::Xref => Record::Xref(CclfBeneficiaryXref {
                file_id,
                xref_indicator: raw(line, XREF_INDICATOR),
                current_num: raw(line, CURRENT_NUM),
                prev_num: raw(line, PREV_NUM),
                prevs_efct_dt: raw(line, PREV_EFCT_DT),
                prevs_obslt_dt: raw(line, PREV_OBSLT_DT),
            }),
        })
    }
}

fn raw(line: &[u8], (start, end): (usize, usize)) -> String {
    String::from_utf8_lossy(&line[start..end]).into_owned()
}

fn trimmed(line: &[u8], (start, end): (usize, usize)) -> String {
    String::from_utf8_lossy(line[start..end].trim_ascii()).into_owned()
}

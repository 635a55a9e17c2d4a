use std::collections::HashMap;
use tracing::{error, info, instrument};

use crate::archive::CclfArchive;
use crate::discover::{FileKind, FileMetadata};
use crate::error::ImportError;

const FILE_NUM: (usize, usize) = (0, 7);
const TOTAL_RECORDS: (usize, usize) = (52, 63);
const RECORD_LENGTH: (usize, usize) = (64, 69);

/// Limits a CCLF0 declares for one dependent file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RecordRule {
    pub total_record_count: u64,
    pub max_record_length: usize,
}

/// Rules for both dependent kinds; a group cannot be imported without both.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HeaderRules {
    pub beneficiary: RecordRule,
    pub xref: RecordRule,
}

impl HeaderRules {
    pub fn rule(&self, kind: FileKind) -> Option<RecordRule> {
        match kind {
            FileKind::Beneficiary => Some(self.beneficiary),
            FileKind::Xref => Some(self.xref),
            FileKind::Header => None,
        }
    }
}

/// Read a group's CCLF0 archive and pull out the record rules it declares.
#[instrument(level = "info", skip_all, fields(file = header.map(|h| h.name.as_str()).unwrap_or("<none>")))]
pub fn import_header(header: Option<&FileMetadata>) -> Result<HeaderRules, ImportError> {
    let Some(header) = header else {
        error!("file CCLF0 not found");
        return Err(ImportError::HeaderMissing);
    };
    info!("importing CCLF0 file");

    let parse_err = |detail: String| ImportError::HeaderParse {
        header: header.name.clone(),
        detail,
    };

    let mut archive =
        CclfArchive::open(&header.path, &header.name).map_err(|e| parse_err(e.to_string()))?;

    let mut rules: HashMap<FileKind, RecordRule> = HashMap::new();
    let scanned = archive.for_each_record(|line| {
        let tag = String::from_utf8_lossy(field(line, FILE_NUM).trim_ascii()).into_owned();
        let kind = match FileKind::from_tag(&tag) {
            Some(kind @ (FileKind::Beneficiary | FileKind::Xref)) => kind,
            _ => return Ok(()),
        };

        let total_record_count = parse_number(line, TOTAL_RECORDS)
            .map_err(|detail| parse_err(format!("{kind} record count: {detail}")))?;
        let max_record_length = parse_number(line, RECORD_LENGTH)
            .map_err(|detail| parse_err(format!("{kind} record length: {detail}")))?;
        if max_record_length == 0 {
            return Err(parse_err(format!("{kind} record length must be positive")));
        }

        rules.insert(
            kind,
            RecordRule {
                total_record_count,
                max_record_length: max_record_length as usize,
            },
        );
        Ok(())
    });
    match scanned {
        Ok(_) => {}
        Err(err @ ImportError::HeaderParse { .. }) => {
            error!(error = %err);
            return Err(err);
        }
        Err(other) => {
            let err = parse_err(other.to_string());
            error!(error = %err);
            return Err(err);
        }
    }

    let mut take = |kind: FileKind| {
        rules.remove(&kind).ok_or_else(|| {
            let err = ImportError::IncompleteRuleSet {
                header: header.name.clone(),
                missing: kind.tag(),
            };
            error!(error = %err);
            err
        })
    };
    let beneficiary = take(FileKind::Beneficiary)?;
    let xref = take(FileKind::Xref)?;

    info!("successfully imported CCLF0 file");
    Ok(HeaderRules { beneficiary, xref })
}

/// Bytes `start..end` of `line`, clamped to what the line actually holds.
fn field(line: &[u8], (start, end): (usize, usize)) -> &[u8] {
    let end = end.min(line.len());
    line.get(start..end).unwrap_or_default()
}

fn parse_number(line: &[u8], range: (usize, usize)) -> Result<u64, String> {
    if line.len() < range.1 {
        return Err(format!(
            "record is {} bytes, field ends at byte {}",
            line.len(),
            range.1
        ));
    }
    let raw = String::from_utf8_lossy(field(line, range).trim_ascii()).into_owned();
    raw.parse::<u64>().map_err(|e| format!("{raw:?}: {e}"))
}

use tracing::{error, info, instrument};

use super::header::HeaderRules;
use crate::archive::CclfArchive;
use crate::discover::{FileKind, FileMetadata};
use crate::error::ImportError;

/// Check a CCLF8/CCLF9 archive against the limits its CCLF0 declared.
///
/// Every line must trim to between 1 and `max_record_length` bytes
/// and the file may hold at most `total_record_count` records. Fewer records
/// than declared is accepted.
#[instrument(level = "info", skip_all, fields(kind = %kind, file = file.map(|f| f.name.as_str()).unwrap_or("<none>")))]
pub fn validate(
    file: Option<&FileMetadata>,
    kind: FileKind,
    rules: &HeaderRules,
) -> Result<(), ImportError> {
    let Some(file) = file else {
        error!("file not found");
        return Err(ImportError::FileNotFound(kind.tag()));
    };
    let rule = rules.rule(file.kind).ok_or_else(|| ImportError::UnexpectedKind {
        file: file.name.clone(),
        kind: file.kind.tag(),
    })?;
    info!("validating file");

    let mut archive = CclfArchive::open(&file.path, &file.name)?;
    let mut count = 0u64;
    let result = archive.for_each_line(|line| {
        let length = line.trim_ascii().len();
        if length == 0 || length > rule.max_record_length {
            return Err(ImportError::RecordLength {
                file: file.kind.tag().to_string(),
                expected: rule.max_record_length,
                actual: length,
            });
        }
        count += 1;
        if count > rule.total_record_count {
            return Err(ImportError::RecordCountExceeded {
                file: file.kind.tag().to_string(),
                expected: rule.total_record_count,
                actual: count,
            });
        }
        Ok(())
    });

    if let Err(err) = result {
        error!(error = %err);
        return Err(err);
    }
    info!(records = count, "successfully validated file");
    Ok(())
}

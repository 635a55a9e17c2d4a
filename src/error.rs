use std::{io, path::PathBuf};

use crate::pipeline::ImportSummary;
use crate::store::StoreError;

/// Every way a stage of the CCLF pipeline can fail.
///
/// The orchestrator turns stage errors into counter increments; only
/// `DirectoryRead` and `NoFilesFound` stop a run before any group is touched.
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("invalid filename for file: {name}")]
    Classification { name: String },

    #[error("could not walk directory {}", dir.display())]
    DirectoryRead {
        dir: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("failed to find any CCLF files in directory {} ({skipped} skipped)", dir.display())]
    NoFilesFound { dir: PathBuf, skipped: usize },

    #[error("file CCLF0 not found")]
    HeaderMissing,

    #[error("could not parse CCLF0 file {header}: {detail}")]
    HeaderParse { header: String, detail: String },

    #[error("failed to parse {missing} from CCLF0 file {header}")]
    IncompleteRuleSet { header: String, missing: &'static str },

    #[error(
        "incorrect record length for file {file}, expected record length: {expected}, actual record length: {actual}"
    )]
    RecordLength {
        file: String,
        expected: usize,
        actual: usize,
    },

    #[error(
        "maximum record count reached for file {file}, expected record count: {expected}, actual record count: {actual}"
    )]
    RecordCountExceeded {
        file: String,
        expected: u64,
        actual: u64,
    },

    #[error("record {line} of {file} is {actual} bytes, layout needs {needed}")]
    RecordTooShort {
        file: String,
        line: u64,
        needed: usize,
        actual: usize,
    },

    #[error("could not {action} for {file}")]
    Persistence {
        file: String,
        action: &'static str,
        #[source]
        source: StoreError,
    },

    #[error("could not read archive {archive}")]
    ArchiveRead {
        archive: String,
        #[source]
        source: io::Error,
    },

    #[error("no files found in archive {archive}")]
    EmptyArchive { archive: String },

    #[error("{0} file not found")]
    FileNotFound(&'static str),

    #[error("{file} is a {kind} file and cannot be validated as a dependent file")]
    UnexpectedKind { file: String, kind: &'static str },

    #[error(
        "one or more files failed to import correctly (success: {}, failure: {}, skipped: {})",
        summary.success, summary.failure, summary.skipped
    )]
    BatchImport { summary: ImportSummary },
}

impl ImportError {
    pub(crate) fn archive(archive: &str, source: impl Into<io::Error>) -> Self {
        ImportError::ArchiveRead {
            archive: archive.to_string(),
            source: source.into(),
        }
    }
}

//! Moving processed files out of the landing directory.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
};
use tracing::{debug, error, info, instrument};

use crate::discover::FileMetadata;

pub const DEFAULT_RETENTION_HOURS: i64 = 8;

/// How long an un-imported file may sit in the landing directory.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    pub threshold_hours: i64,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            threshold_hours: DEFAULT_RETENTION_HOURS,
        }
    }
}

impl RetentionPolicy {
    /// Whole hours since delivery must exceed the threshold.
    pub fn is_expired(&self, delivered_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        (now - delivered_at).num_hours() > self.threshold_hours
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Imported files moved to the pending deletion dir.
    pub moved_imported: usize,
    /// Un-imported files moved because they outlived the threshold.
    pub moved_expired: usize,
    /// Un-imported files left for a later run.
    pub retained: usize,
    /// Files no longer in the landing directory.
    pub missing: usize,
    /// Files whose move failed.
    pub failed: usize,
}

/// Relocate `files` into `pending_deletion_dir`.
///
/// Files in `imported` always move. Anything else moves only once
/// `policy` says it has expired. Failures are logged and counted, never
/// returned.
#[instrument(level = "info", skip_all, fields(dest = %pending_deletion_dir.display()))]
pub fn sweep<'a>(
    files: impl IntoIterator<Item = &'a FileMetadata>,
    imported: &HashSet<PathBuf>,
    pending_deletion_dir: &Path,
    policy: RetentionPolicy,
    now: DateTime<Utc>,
) -> SweepReport {
    let mut report = SweepReport::default();

    for file in files {
        debug!(file = %file.name, "cleaning up file");
        if !file.path.exists() {
            debug!(file = %file.name, "already gone from landing dir");
            report.missing += 1;
            continue;
        }

        let was_imported = imported.contains(&file.path);
        if !was_imported && !policy.is_expired(file.delivered_at, now) {
            report.retained += 1;
            continue;
        }

        let dest = pending_deletion_dir.join(file.file_name());
        match fs::rename(&file.path, &dest) {
            Ok(()) if was_imported => {
                info!(file = %file.name, "successfully ingested, moved to the pending deletion dir");
                report.moved_imported += 1;
            }
            Ok(()) => {
                info!(file = %file.name, "never ingested, moved to the pending deletion dir");
                report.moved_expired += 1;
            }
            Err(e) => {
                error!(file = %file.name, error = %e, "file failed to cleanup properly");
                report.failed += 1;
            }
        }
    }

    report
}

/// Delete every entry directly inside `dir`. Returns how many were removed.
#[instrument(level = "info", fields(dir = %dir.display()))]
pub fn purge_directory(dir: &Path) -> std::io::Result<usize> {
    info!("preparing to delete directory contents");
    let mut deleted = 0;
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        debug!(file = %path.display(), "deleting");
        if path.is_dir() {
            fs::remove_dir_all(&path)?;
        } else {
            fs::remove_file(&path)?;
        }
        deleted += 1;
    }
    info!(deleted, "successfully deleted all files from dir");
    Ok(deleted)
}

use chrono::{DateTime, Utc};
use std::{
    collections::BTreeMap,
    fmt, fs, io,
    path::Path,
    time::SystemTime,
};
use tracing::{debug, error, info, instrument, warn};
use walkdir::WalkDir;

use super::filename::{parse_filename, FileKind, FileMetadata};
use crate::error::ImportError;

/// Files belonging to the same ACO and performance year are imported together.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupKey {
    pub aco_id: String,
    pub performance_year: u16,
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.aco_id, self.performance_year)
    }
}

#[derive(Clone, Debug, Default)]
pub struct FileGroup {
    pub header: Option<FileMetadata>,
    pub beneficiary: Option<FileMetadata>,
    pub xref: Option<FileMetadata>,
    /// Older deliveries of a kind that a newer file replaced. Never imported
    /// in this run; retention decides when they leave the landing directory.
    pub superseded: Vec<FileMetadata>,
}

impl FileGroup {
    pub fn get(&self, kind: FileKind) -> Option<&FileMetadata> {
        match kind {
            FileKind::Header => self.header.as_ref(),
            FileKind::Beneficiary => self.beneficiary.as_ref(),
            FileKind::Xref => self.xref.as_ref(),
        }
    }

    /// Add a file, keeping the latest delivery of each kind.
    pub fn insert(&mut self, file: FileMetadata) {
        let slot = match file.kind {
            FileKind::Header => &mut self.header,
            FileKind::Beneficiary => &mut self.beneficiary,
            FileKind::Xref => &mut self.xref,
        };
        match slot.take() {
            Some(current) if current.timestamp > file.timestamp => {
                warn!(kept = %current.name, dropped = %file.name, "duplicate delivery for kind");
                *slot = Some(current);
                self.superseded.push(file);
            }
            Some(current) => {
                warn!(kept = %file.name, dropped = %current.name, "duplicate delivery for kind");
                *slot = Some(file);
                self.superseded.push(current);
            }
            None => *slot = Some(file),
        }
    }

    /// Every file in the group, processed or not.
    pub fn files(&self) -> impl Iterator<Item = &FileMetadata> {
        self.header
            .iter()
            .chain(self.beneficiary.iter())
            .chain(self.xref.iter())
            .chain(self.superseded.iter())
    }
}

/// Result of sorting a landing directory.
#[derive(Debug, Default)]
pub struct SortedFiles {
    pub groups: BTreeMap<GroupKey, FileGroup>,
    /// Entries whose names did not classify.
    pub skipped: usize,
}

/// Walk `landing_dir`, classify every file and group the recognised ones.
///
/// Unrecognised files are moved into `pending_deletion_dir` and counted as
/// skipped. The pending-deletion directory is never descended into.
#[instrument(level = "info", skip_all, fields(dir = %landing_dir.display()))]
pub fn sort_files(landing_dir: &Path, pending_deletion_dir: &Path) -> Result<SortedFiles, ImportError> {
    let mut sorted = SortedFiles::default();

    let walker = WalkDir::new(landing_dir)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.path() != pending_deletion_dir);

    // Collect first so relocations don't race the directory iterator.
    let mut entries = Vec::new();
    for entry in walker {
        let entry = entry.map_err(|source| ImportError::DirectoryRead {
            dir: landing_dir.to_path_buf(),
            source,
        })?;
        if entry.file_type().is_dir() {
            continue;
        }
        let modified = entry
            .metadata()
            .map_err(|source| ImportError::DirectoryRead {
                dir: landing_dir.to_path_buf(),
                source,
            })?
            .modified();
        let modified = delivered_at(entry.path(), modified);
        entries.push((entry.into_path(), modified));
    }

    for (path, modified) in entries {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let parsed = match parse_filename(&file_name) {
            Ok(parsed) => parsed,
            Err(err) => {
                // An unknown file in this directory is not a blocker.
                warn!(file = %path.display(), error = %err, "unknown file found");
                sorted.skipped += 1;
                quarantine(&path, &pending_deletion_dir.join(&file_name));
                continue;
            }
        };

        let metadata = parsed.into_metadata(path, modified);
        debug!(file = %metadata.name, kind = %metadata.kind, "classified");
        let key = GroupKey {
            aco_id: metadata.aco_id.clone(),
            performance_year: metadata.performance_year,
        };
        sorted.groups.entry(key).or_default().insert(metadata);
    }

    if sorted.groups.is_empty() {
        let err = ImportError::NoFilesFound {
            dir: landing_dir.to_path_buf(),
            skipped: sorted.skipped,
        };
        error!(error = %err);
        return Err(err);
    }

    info!(
        groups = sorted.groups.len(),
        skipped = sorted.skipped,
        "sorted landing directory"
    );
    Ok(sorted)
}

/// Modification time as the delivery time. Without one the file is treated
/// as delivered now, which restarts its retention clock on every run.
fn delivered_at(path: &Path, modified: io::Result<SystemTime>) -> DateTime<Utc> {
    match modified {
        Ok(time) => DateTime::<Utc>::from(time),
        Err(e) => {
            warn!(
                file = %path.display(),
                error = %e,
                "no modification time, retention clock starts now"
            );
            Utc::now()
        }
    }
}

fn quarantine(from: &Path, to: &Path) {
    match fs::rename(from, to) {
        Ok(()) => info!(file = %from.display(), "moved unknown file to pending deletion dir"),
        Err(e) => error!(
            file = %from.display(),
            error = %e,
            "error moving unknown file to pending deletion dir"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{init_logging, touch};
    use tempfile::tempdir;

    #[test]
    fn groups_by_aco_and_year() {
        init_logging();
        let landing = tempdir().unwrap();
        let pending = tempdir().unwrap();
        for name in [
            "T.A0001.ACO.ZC0Y18.D181120.T1000000",
            "T.A0001.ACO.ZC8Y18.D181120.T1000009",
            "T.A0001.ACO.ZC9Y18.D181120.T1000010",
            "T.A0001.ACO.ZC8Y19.D190120.T1000009",
            "P.A0002.ACO.ZC0Y18.D181120.T1000000",
        ] {
            touch(landing.path(), name);
        }

        let sorted = sort_files(landing.path(), pending.path()).unwrap();
        assert_eq!(sorted.skipped, 0);
        assert_eq!(sorted.groups.len(), 3);

        let key = GroupKey {
            aco_id: "A0001".into(),
            performance_year: 18,
        };
        let group = &sorted.groups[&key];
        assert!(group.header.is_some());
        assert!(group.beneficiary.is_some());
        assert!(group.xref.is_some());
        assert_eq!(key.to_string(), "A0001_18");
    }

    #[test]
    fn walks_nested_directories() {
        let landing = tempdir().unwrap();
        let pending = tempdir().unwrap();
        let nested = landing.path().join("2018").join("nov");
        fs::create_dir_all(&nested).unwrap();
        touch(&nested, "T.A0001.ACO.ZC8Y18.D181120.T1000009");

        let sorted = sort_files(landing.path(), pending.path()).unwrap();
        assert_eq!(sorted.groups.len(), 1);
    }

    #[test]
    fn unknown_files_are_moved_and_skipped() {
        let landing = tempdir().unwrap();
        let pending = tempdir().unwrap();
        touch(landing.path(), "T.A0001.ACO.ZC8Y18.D181120.T1000009");
        touch(landing.path(), "README.md");

        let sorted = sort_files(landing.path(), pending.path()).unwrap();
        assert_eq!(sorted.skipped, 1);
        assert!(!landing.path().join("README.md").exists());
        assert!(pending.path().join("README.md").exists());
    }

    #[test]
    fn only_unknown_files_is_fatal() {
        let landing = tempdir().unwrap();
        let pending = tempdir().unwrap();
        touch(landing.path(), "garbage.zip");

        match sort_files(landing.path(), pending.path()) {
            Err(ImportError::NoFilesFound { skipped, .. }) => assert_eq!(skipped, 1),
            other => panic!("expected NoFilesFound, got {other:?}"),
        }
        assert!(pending.path().join("garbage.zip").exists());
    }

    #[test]
    fn missing_root_is_a_directory_error() {
        let root = tempdir().unwrap();
        let missing = root.path().join("nope");
        let err = sort_files(&missing, root.path()).unwrap_err();
        assert!(matches!(err, ImportError::DirectoryRead { .. }));
    }

    #[test]
    fn nested_pending_dir_is_not_walked() {
        let landing = tempdir().unwrap();
        let pending = landing.path().join("pending");
        fs::create_dir_all(&pending).unwrap();
        touch(&pending, "already-moved.txt");
        touch(landing.path(), "T.A0001.ACO.ZC8Y18.D181120.T1000009");

        let sorted = sort_files(landing.path(), &pending).unwrap();
        assert_eq!(sorted.skipped, 0);
    }

    #[test]
    fn missing_mtime_falls_back_to_now() {
        init_logging();
        let before = Utc::now();
        let unsupported = Err(io::Error::new(io::ErrorKind::Unsupported, "no mtime"));
        let at = delivered_at(Path::new("x"), unsupported);
        assert!(at >= before && at <= Utc::now());

        let epoch = delivered_at(Path::new("x"), Ok(SystemTime::UNIX_EPOCH));
        assert_eq!(epoch.timestamp(), 0);
    }

    #[test]
    fn latest_duplicate_wins() {
        let landing = tempdir().unwrap();
        let pending = tempdir().unwrap();
        touch(landing.path(), "T.A0001.ACO.ZC8Y18.D181120.T1000009");
        touch(landing.path(), "T.A0001.ACO.ZC8Y18.D181121.T1000009");

        let sorted = sort_files(landing.path(), pending.path()).unwrap();
        let group = sorted.groups.values().next().unwrap();
        assert_eq!(
            group.beneficiary.as_ref().unwrap().name,
            "T.A0001.ACO.ZC8Y18.D181121.T1000009"
        );
        assert_eq!(group.superseded.len(), 1);
        assert_eq!(group.files().count(), 2);
    }
}

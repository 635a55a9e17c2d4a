//! Runs a landing directory through discovery, validation, import and
//! retention.

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::Serialize;
use std::{collections::HashSet, path::PathBuf};
use tracing::{error, info, info_span, warn};

use crate::config::PipelineConfig;
use crate::discover::{sort_files, FileGroup, FileKind, GroupKey};
use crate::error::ImportError;
use crate::import::import_file;
use crate::retention::sweep;
use crate::store::Store;
use crate::validate::{import_header, validate, HeaderRules};

/// Stage counters for one run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub success: usize,
    pub failure: usize,
    pub skipped: usize,
}

/// What happened to one file of a group.
#[derive(Debug)]
pub enum StageOutcome {
    Imported,
    Failed(ImportError),
    /// Not attempted because the group's header failed.
    Skipped,
}

impl StageOutcome {
    pub fn is_imported(&self) -> bool {
        matches!(self, StageOutcome::Imported)
    }

    fn tally(&self, summary: &mut ImportSummary) {
        match self {
            StageOutcome::Imported => summary.success += 1,
            StageOutcome::Failed(_) => summary.failure += 1,
            StageOutcome::Skipped => summary.skipped += 1,
        }
    }
}

#[derive(Debug)]
pub struct GroupReport {
    pub key: GroupKey,
    pub header: StageOutcome,
    pub beneficiary: StageOutcome,
    pub xref: StageOutcome,
    /// Paths that are done with and may leave the landing directory.
    pub imported: Vec<PathBuf>,
}

impl GroupReport {
    pub fn tally(&self, summary: &mut ImportSummary) {
        self.header.tally(summary);
        self.beneficiary.tally(summary);
        self.xref.tally(summary);
    }
}

/// Import one group: CCLF0 first, then CCLF8 and CCLF9 independently.
pub fn import_group<S: Store + ?Sized>(key: &GroupKey, group: &FileGroup, store: &S) -> GroupReport {
    let _span = info_span!("group", key = %key).entered();

    let rules = match import_header(group.header.as_ref()) {
        Ok(rules) => rules,
        Err(err) => {
            error!(
                error = %err,
                header = ?group.header.as_ref().map(|f| &f.name),
                beneficiary = ?group.beneficiary.as_ref().map(|f| &f.name),
                xref = ?group.xref.as_ref().map(|f| &f.name),
                "failed to import CCLF0 file, skipping CCLF8 and CCLF9"
            );
            return GroupReport {
                key: key.clone(),
                header: StageOutcome::Failed(err),
                beneficiary: StageOutcome::Skipped,
                xref: StageOutcome::Skipped,
                imported: Vec::new(),
            };
        }
    };

    let beneficiary = import_dependent(group, FileKind::Beneficiary, &rules, store);
    let xref = import_dependent(group, FileKind::Xref, &rules, store);

    let mut imported = Vec::new();
    for (kind, outcome) in [(FileKind::Beneficiary, &beneficiary), (FileKind::Xref, &xref)] {
        if let (true, Some(file)) = (outcome.is_imported(), group.get(kind)) {
            imported.push(file.path.clone());
        }
    }
    // The header is finished with only once both of its dependents are.
    if beneficiary.is_imported() && xref.is_imported() {
        if let Some(header) = &group.header {
            imported.push(header.path.clone());
        }
    }

    GroupReport {
        key: key.clone(),
        header: StageOutcome::Imported,
        beneficiary,
        xref,
        imported,
    }
}

fn import_dependent<S: Store + ?Sized>(
    group: &FileGroup,
    kind: FileKind,
    rules: &HeaderRules,
    store: &S,
) -> StageOutcome {
    let file = group.get(kind);
    let result = validate(file, kind, rules).and_then(|()| match file {
        Some(file) => import_file(file, store).map(|_| ()),
        None => Err(ImportError::FileNotFound(kind.tag())),
    });
    match result {
        Ok(()) => StageOutcome::Imported,
        Err(err) => {
            error!(kind = %kind, file = ?file.map(|f| &f.name), error = %err, "failed to import file");
            StageOutcome::Failed(err)
        }
    }
}

/// Import everything in the configured landing directory, then sweep.
///
/// Counts are returned on success and inside [`ImportError::BatchImport`]
/// when any stage failed. The sweep runs either way.
pub fn import_directory<S: Store + ?Sized>(
    config: &PipelineConfig,
    store: &S,
) -> Result<ImportSummary, ImportError> {
    import_directory_at(config, store, Utc::now())
}

/// [`import_directory`] with an explicit clock for the retention check.
pub fn import_directory_at<S: Store + ?Sized>(
    config: &PipelineConfig,
    store: &S,
    now: DateTime<Utc>,
) -> Result<ImportSummary, ImportError> {
    let _span = info_span!("import_directory", dir = %config.landing_dir.display()).entered();

    let sorted = sort_files(&config.landing_dir, &config.pending_deletion_dir)?;

    let reports: Vec<GroupReport> = sorted
        .groups
        .par_iter()
        .map(|(key, group)| import_group(key, group, store))
        .collect();

    let mut summary = ImportSummary {
        skipped: sorted.skipped,
        ..Default::default()
    };
    let mut imported = HashSet::new();
    for report in reports {
        report.tally(&mut summary);
        imported.extend(report.imported);
    }

    let swept = sweep(
        sorted.groups.values().flat_map(|g| g.files()),
        &imported,
        &config.pending_deletion_dir,
        config.retention,
        now,
    );
    info!(?swept, "cleanup finished");

    info!(
        success = summary.success,
        failure = summary.failure,
        skipped = summary.skipped,
        "import finished"
    );
    if summary.failure > 0 {
        let err = ImportError::BatchImport { summary };
        warn!(error = %err);
        return Err(err);
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, ParquetStore};
    use crate::testutil::{bene_line, header_line, init_logging, touch, write_zip, xref_line};
    use chrono::Duration;
    use std::{fs, path::Path};
    use tempfile::{tempdir, TempDir};

    const HEADER: &str = "T.A0001.ACO.ZC0Y21.D210101.T1200000";
    const BENE: &str = "T.A0001.ACO.ZC8Y21.D210101.T1200001";
    const XREF: &str = "T.A0001.ACO.ZC9Y21.D210101.T1200002";

    struct Dirs {
        _root: TempDir,
        config: PipelineConfig,
    }

    fn dirs() -> Dirs {
        init_logging();
        let root = tempdir().unwrap();
        let landing = root.path().join("landing");
        let pending = root.path().join("pending");
        fs::create_dir_all(&landing).unwrap();
        let config = PipelineConfig::new(landing, pending);
        config.prepare().unwrap();
        Dirs {
            _root: root,
            config,
        }
    }

    fn write_header(dir: &Path, name: &str, body: &str) {
        write_zip(&dir.join(name), &[("CCLF0", body)]);
    }

    fn standard_header() -> String {
        format!(
            "{}\n{}\n",
            header_line("CCLF8", 2, 25),
            header_line("CCLF9", 1, 43)
        )
    }

    fn bene_body(n: usize) -> String {
        (0..n)
            .map(|i| bene_line(&format!("1AA0AA0AA{:02}", i), &format!("12345678{:02}", i)) + "\n")
            .collect()
    }

    fn xref_body() -> String {
        format!("{}\n", xref_line("M", "1AA0AA0AA00", "1AA0AA0AA01"))
    }

    fn write_complete_group(dir: &Path, names: [&str; 3]) {
        write_header(dir, names[0], &standard_header());
        write_zip(&dir.join(names[1]), &[("CCLF8", &bene_body(2))]);
        write_zip(&dir.join(names[2]), &[("CCLF9", &xref_body())]);
    }

    fn pending_names(config: &PipelineConfig) -> Vec<String> {
        let mut names: Vec<_> = fs::read_dir(&config.pending_deletion_dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn complete_group_imports_and_moves_everything() {
        let d = dirs();
        write_complete_group(&d.config.landing_dir, [HEADER, BENE, XREF]);
        let store = MemoryStore::new();

        let summary = import_directory(&d.config, &store).unwrap();
        assert_eq!(
            summary,
            ImportSummary {
                success: 3,
                failure: 0,
                skipped: 0
            }
        );
        assert_eq!(pending_names(&d.config), vec![HEADER, BENE, XREF]);
        assert_eq!(fs::read_dir(&d.config.landing_dir).unwrap().count(), 0);
        assert_eq!(store.files().len(), 2);
        assert_eq!(store.beneficiaries().len(), 2);
        assert_eq!(store.xrefs().len(), 1);
    }

    #[test]
    fn group_without_header_fails_once_and_skips_two() {
        let d = dirs();
        write_zip(&d.config.landing_dir.join(BENE), &[("CCLF8", &bene_body(2))]);
        write_zip(&d.config.landing_dir.join(XREF), &[("CCLF9", &xref_body())]);
        let store = MemoryStore::new();

        match import_directory(&d.config, &store) {
            Err(ImportError::BatchImport { summary }) => assert_eq!(
                summary,
                ImportSummary {
                    success: 0,
                    failure: 1,
                    skipped: 2
                }
            ),
            other => panic!("expected BatchImport, got {other:?}"),
        }
        assert!(store.files().is_empty());
        assert!(d.config.landing_dir.join(BENE).exists());
        assert!(d.config.landing_dir.join(XREF).exists());
    }

    #[test]
    fn lone_unknown_file_is_skipped_and_moved() {
        let d = dirs();
        touch(&d.config.landing_dir, "mystery.zip");

        match import_directory(&d.config, &MemoryStore::new()) {
            Err(ImportError::NoFilesFound { skipped, .. }) => assert_eq!(skipped, 1),
            other => panic!("expected NoFilesFound, got {other:?}"),
        }
        assert_eq!(pending_names(&d.config), vec!["mystery.zip"]);
    }

    #[test]
    fn unknown_file_beside_a_group_counts_as_skipped() {
        let d = dirs();
        write_complete_group(&d.config.landing_dir, [HEADER, BENE, XREF]);
        touch(&d.config.landing_dir, "mystery.zip");

        let summary = import_directory(&d.config, &MemoryStore::new()).unwrap();
        assert_eq!(summary.success, 3);
        assert_eq!(summary.skipped, 1);
        assert_eq!(pending_names(&d.config).len(), 4);
    }

    #[test]
    fn incomplete_header_imports_nothing() {
        let d = dirs();
        write_header(
            &d.config.landing_dir,
            HEADER,
            &format!("{}\n", header_line("CCLF8", 2, 25)),
        );
        write_zip(&d.config.landing_dir.join(BENE), &[("CCLF8", &bene_body(2))]);
        write_zip(&d.config.landing_dir.join(XREF), &[("CCLF9", &xref_body())]);
        let store = MemoryStore::new();

        let err = import_directory(&d.config, &store).unwrap_err();
        assert!(matches!(
            err,
            ImportError::BatchImport {
                summary: ImportSummary {
                    success: 0,
                    failure: 1,
                    skipped: 2
                }
            }
        ));
        assert!(store.files().is_empty());
    }

    #[test]
    fn failing_dependent_does_not_block_its_sibling() {
        let d = dirs();
        write_header(&d.config.landing_dir, HEADER, &standard_header());
        write_zip(&d.config.landing_dir.join(BENE), &[("CCLF8", &bene_body(3))]);
        write_zip(&d.config.landing_dir.join(XREF), &[("CCLF9", &xref_body())]);
        let store = MemoryStore::new();

        let err = import_directory(&d.config, &store).unwrap_err();
        assert!(matches!(
            err,
            ImportError::BatchImport {
                summary: ImportSummary {
                    success: 2,
                    failure: 1,
                    skipped: 0
                }
            }
        ));
        assert!(store.beneficiaries().is_empty());
        assert_eq!(store.xrefs().len(), 1);
        // Only the imported xref leaves; the header waits for its CCLF8.
        assert_eq!(pending_names(&d.config), vec![XREF]);
        assert!(d.config.landing_dir.join(HEADER).exists());
        assert!(d.config.landing_dir.join(BENE).exists());
    }

    #[test]
    fn over_length_middle_record_imports_no_rows() {
        let d = dirs();
        let header = format!(
            "{}\n{}\n",
            header_line("CCLF8", 3, 25),
            header_line("CCLF9", 1, 43)
        );
        write_header(&d.config.landing_dir, HEADER, &header);
        let bene = format!(
            "{}\n{}EXTRA\n{}\n",
            bene_line("1AA0AA0AA00", "123456789A"),
            bene_line("1AA0AA0AA01", "123456789B"),
            bene_line("1AA0AA0AA02", "123456789C")
        );
        write_zip(&d.config.landing_dir.join(BENE), &[("CCLF8", &bene)]);
        write_zip(&d.config.landing_dir.join(XREF), &[("CCLF9", &xref_body())]);
        let store = MemoryStore::new();

        let err = import_directory(&d.config, &store).unwrap_err();
        assert!(matches!(
            err,
            ImportError::BatchImport {
                summary: ImportSummary {
                    success: 2,
                    failure: 1,
                    skipped: 0
                }
            }
        ));
        assert!(store.beneficiaries().is_empty());
        assert_eq!(store.files().len(), 1);
        assert!(d.config.landing_dir.join(BENE).exists());
    }

    #[test]
    fn missing_dependent_counts_as_failure() {
        let d = dirs();
        write_header(&d.config.landing_dir, HEADER, &standard_header());
        write_zip(&d.config.landing_dir.join(BENE), &[("CCLF8", &bene_body(2))]);

        let err = import_directory(&d.config, &MemoryStore::new()).unwrap_err();
        assert!(matches!(
            err,
            ImportError::BatchImport {
                summary: ImportSummary {
                    success: 2,
                    failure: 1,
                    skipped: 0
                }
            }
        ));
    }

    #[test]
    fn groups_are_independent() {
        let d = dirs();
        write_complete_group(&d.config.landing_dir, [HEADER, BENE, XREF]);
        write_complete_group(
            &d.config.landing_dir,
            [
                "P.A0002.ACO.ZC0Y21.D210101.T1200000",
                "P.A0002.ACO.ZC8Y21.D210101.T1200001",
                "P.A0002.ACO.ZC9Y21.D210101.T1200002",
            ],
        );
        write_zip(
            &d.config.landing_dir.join("P.A0003.ACO.ZC8Y21.D210101.T1200001"),
            &[("CCLF8", &bene_body(1))],
        );
        let store = MemoryStore::new();

        let err = import_directory(&d.config, &store).unwrap_err();
        assert!(matches!(
            err,
            ImportError::BatchImport {
                summary: ImportSummary {
                    success: 6,
                    failure: 1,
                    skipped: 2
                }
            }
        ));
        assert_eq!(store.files().len(), 4);
        let ids: HashSet<_> = store.files().iter().map(|f| f.id).collect();
        assert_eq!(ids.len(), 4);
    }

    #[test]
    fn stale_failures_are_swept_later() {
        let d = dirs();
        write_zip(&d.config.landing_dir.join(BENE), &[("CCLF8", &bene_body(2))]);

        let later = Utc::now() + Duration::hours(9);
        let err = import_directory_at(&d.config, &MemoryStore::new(), later).unwrap_err();
        assert!(matches!(err, ImportError::BatchImport { .. }));
        assert_eq!(pending_names(&d.config), vec![BENE]);
    }

    #[test]
    fn end_to_end_into_parquet() {
        let d = dirs();
        write_complete_group(&d.config.landing_dir, [HEADER, BENE, XREF]);
        let store = ParquetStore::open(d._root.path().join("store")).unwrap();

        import_directory(&d.config, &store).unwrap();

        let files = store.files().unwrap();
        assert_eq!(files.len(), 2);
        let bene_file = files.iter().find(|f| f.cclf_num == 8).unwrap();
        let benes = store.beneficiaries().unwrap();
        assert_eq!(benes.len(), 2);
        assert!(benes.iter().all(|b| b.file_id == bene_file.id));
        assert_eq!(store.xrefs().unwrap()[0].current_num, "1AA0AA0AA00");
    }
}

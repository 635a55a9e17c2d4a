use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf};

use crate::retention::RetentionPolicy;

/// Where files arrive, where they go when done, and how long failures wait.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub landing_dir: PathBuf,
    pub pending_deletion_dir: PathBuf,
    #[serde(default)]
    pub retention: RetentionPolicy,
}

impl PipelineConfig {
    pub fn new(landing_dir: impl Into<PathBuf>, pending_deletion_dir: impl Into<PathBuf>) -> Self {
        Self {
            landing_dir: landing_dir.into(),
            pending_deletion_dir: pending_deletion_dir.into(),
            retention: RetentionPolicy::default(),
        }
    }

    pub fn with_retention_hours(mut self, hours: i64) -> Self {
        self.retention.threshold_hours = hours;
        self
    }

    /// Create the pending deletion directory if it does not exist yet.
    pub fn prepare(&self) -> Result<()> {
        fs::create_dir_all(&self.pending_deletion_dir).with_context(|| {
            format!(
                "creating pending deletion directory {}",
                self.pending_deletion_dir.display()
            )
        })
    }
}

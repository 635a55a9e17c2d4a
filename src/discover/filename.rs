use chrono::{DateTime, NaiveDateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::{fmt, path::PathBuf};

use crate::error::ImportError;

// P.A****.ACO.ZC*Y**.Dyymmdd.Thhmmsst
// T = test, P = prod; A**** = ACO id; ZC* = CCLF file number; Y** = performance year
static FILENAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(T|P)\.([A-Z]\d{4})\.ACO\.ZC(0|8|9)Y(\d{2})\.(D\d{6}\.T\d{6})\d")
        .expect("filename pattern is valid")
});

const TIMESTAMP_FORMAT: &str = "D%y%m%d.T%H%M%S";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Test,
    Production,
}

/// CCLF file number carried in the `ZC` segment of the filename.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum FileKind {
    /// CCLF0, the summary file declaring counts and lengths for the others.
    Header,
    /// CCLF8, beneficiary demographics.
    Beneficiary,
    /// CCLF9, beneficiary identifier cross references.
    Xref,
}

impl FileKind {
    pub fn number(&self) -> u8 {
        match self {
            FileKind::Header => 0,
            FileKind::Beneficiary => 8,
            FileKind::Xref => 9,
        }
    }

    pub fn from_number(n: u8) -> Option<Self> {
        match n {
            0 => Some(FileKind::Header),
            8 => Some(FileKind::Beneficiary),
            9 => Some(FileKind::Xref),
            _ => None,
        }
    }

    /// Tag used for this kind in the first columns of a CCLF0 record.
    pub fn tag(&self) -> &'static str {
        match self {
            FileKind::Header => "CCLF0",
            FileKind::Beneficiary => "CCLF8",
            FileKind::Xref => "CCLF9",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "CCLF0" => Some(FileKind::Header),
            "CCLF8" => Some(FileKind::Beneficiary),
            "CCLF9" => Some(FileKind::Xref),
            _ => None,
        }
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Everything the filename and filesystem tell us about one delivered file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileMetadata {
    /// The part of the filename matching the naming convention.
    pub name: String,
    pub environment: Environment,
    pub aco_id: String,
    pub kind: FileKind,
    /// Two-digit performance year, as written in the filename.
    pub performance_year: u16,
    pub timestamp: DateTime<Utc>,
    pub path: PathBuf,
    /// Last modification time seen on disk; stands in for the delivery time.
    pub delivered_at: DateTime<Utc>,
}

impl FileMetadata {
    /// Name of the file on disk, which is what relocation preserves.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.name.clone())
    }
}

/// Fields parsed from a filename, before the filesystem has been consulted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsedName {
    pub name: String,
    pub environment: Environment,
    pub aco_id: String,
    pub kind: FileKind,
    pub performance_year: u16,
    pub timestamp: DateTime<Utc>,
}

impl ParsedName {
    pub fn into_metadata(self, path: PathBuf, delivered_at: DateTime<Utc>) -> FileMetadata {
        FileMetadata {
            name: self.name,
            environment: self.environment,
            aco_id: self.aco_id,
            kind: self.kind,
            performance_year: self.performance_year,
            timestamp: self.timestamp,
            path,
            delivered_at,
        }
    }
}

/// Classify a bare filename against the CCLF naming convention.
pub fn parse_filename(filename: &str) -> Result<ParsedName, ImportError> {
    let invalid = || ImportError::Classification {
        name: filename.to_string(),
    };
    let caps = FILENAME_RE.captures(filename).ok_or_else(invalid)?;

    let environment = match &caps[1] {
        "T" => Environment::Test,
        _ => Environment::Production,
    };
    let kind = caps[3]
        .parse::<u8>()
        .ok()
        .and_then(FileKind::from_number)
        .ok_or_else(invalid)?;
    let performance_year = caps[4].parse::<u16>().map_err(|_| invalid())?;

    let timestamp = NaiveDateTime::parse_from_str(&caps[5], TIMESTAMP_FORMAT)
        .map_err(|_| invalid())?
        .and_utc();
    if timestamp.timestamp() == 0 {
        return Err(invalid());
    }

    Ok(ParsedName {
        name: caps[0].to_string(),
        environment,
        aco_id: caps[2].to_string(),
        kind,
        performance_year,
        timestamp,
    })
}

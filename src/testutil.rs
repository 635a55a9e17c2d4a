//! Fixtures shared by the unit tests.

use chrono::Utc;
use std::{
    fs::{self, File},
    io::Write,
    path::{Path, PathBuf},
};
use tracing_subscriber::{fmt, EnvFilter};
use zip::{write::SimpleFileOptions, CompressionMethod, ZipWriter};

use crate::discover::{parse_filename, FileMetadata};

pub fn init_logging() {
    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
        )
        .with_test_writer()
        .try_init();
}

/// Write a zip at `path` with one member per `(name, contents)` pair.
pub fn write_zip(path: &Path, members: &[(&str, &str)]) {
    let mut zip = ZipWriter::new(File::create(path).unwrap());
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    for (name, contents) in members {
        zip.start_file(*name, options).unwrap();
        zip.write_all(contents.as_bytes()).unwrap();
    }
    zip.finish().unwrap();
}

pub fn touch(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, b"").unwrap();
    path
}

/// Metadata for a conventionally named file, delivered just now.
pub fn metadata_for(path: &Path) -> FileMetadata {
    let name = path.file_name().unwrap().to_string_lossy();
    parse_filename(&name)
        .unwrap()
        .into_metadata(path.to_path_buf(), Utc::now())
}

/// A CCLF0 rule line: tag at 0..7, count at 52..63, length at 64..69.
pub fn header_line(tag: &str, count: u64, length: usize) -> String {
    format!("{:<7}{:<45}{:>11} {:>5}", tag, "", count, length)
}

/// A 25-byte CCLF8 record.
pub fn bene_line(mbi: &str, hicn: &str) -> String {
    format!("{:<11}{:<11}XYZ", mbi, hicn)
}

/// A 43-byte CCLF9 record.
pub fn xref_line(indicator: &str, current: &str, previous: &str) -> String {
    format!(
        "{:1}{:<11}{:<11}{}{}",
        indicator, current, previous, "2018-01-01", "2018-06-30"
    )
}

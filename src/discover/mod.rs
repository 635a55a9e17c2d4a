//! Discovery of CCLF deliveries in a landing directory.

pub mod filename;
pub mod group;

pub use filename::{parse_filename, Environment, FileKind, FileMetadata, ParsedName};
pub use group::{sort_files, FileGroup, GroupKey, SortedFiles};

//! CCLF0 rule extraction and the record checks it drives.

pub mod header;
pub mod records;

pub use header::{import_header, HeaderRules, RecordRule};
pub use records::validate;

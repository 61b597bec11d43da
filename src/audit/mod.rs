//! Read-only checks over an input directory
//!
//! These run over the same inputs as a thumbnail batch but never write
//! anything: a strict truncation scan, and duplicate detection by average
//! hash with owners looked up in a CSV record store.

pub mod duplicates;
pub mod records;
pub mod truncated;

pub use duplicates::{average_hash, find_duplicates, AverageHash, DuplicateGroup, DuplicateMember};
pub use records::OwnerRecords;
pub use truncated::{scan_truncated, ScanFinding};

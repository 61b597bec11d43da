//! Owner lookup from a CSV record store

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use crate::error::{Result, ThumbError};

/// One row of the record store; other columns are ignored
#[derive(Debug, Deserialize)]
struct SubmissionRecord {
    file_name: String,
    name: String,
}

/// Maps output file names to the person who submitted them
#[derive(Debug, Clone, Default)]
pub struct OwnerRecords {
    owners: HashMap<String, String>,
}

impl OwnerRecords {
    /// Load a CSV with `file_name` and `name` columns; later rows win
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut reader = csv::Reader::from_path(path).map_err(|e| {
            ThumbError::config(format!("Failed to open record store {:?}: {}", path, e))
        })?;

        let mut owners = HashMap::new();
        for record in reader.deserialize() {
            let record: SubmissionRecord = record?;
            owners.insert(record.file_name, record.name);
        }

        debug!("Loaded {} owner records from {:?}", owners.len(), path);
        Ok(Self { owners })
    }

    pub fn owner(&self, file_name: &str) -> Option<&str> {
        self.owners.get(file_name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }
}

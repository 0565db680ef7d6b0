//! Run manifest: revision, generation time and per-artifact hashes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// File name of the manifest in the output directory.
pub const MANIFEST_FILE_NAME: &str = "Manifest.json";

/// Rewritten in full on every successful run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Manifest {
    pub revision: u32,
    pub generated_at: DateTime<Utc>,
    /// Artifact file name to lowercase hex SHA-256 of its bytes.
    pub hash: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_development: bool,
}

impl Manifest {
    pub fn new(revision: u32, generated_at: DateTime<Utc>, is_development: bool) -> Self {
        Self {
            revision,
            generated_at,
            hash: BTreeMap::new(),
            is_development,
        }
    }

    pub fn record(&mut self, file_name: impl Into<String>, hash: impl Into<String>) {
        self.hash.insert(file_name.into(), hash.into());
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

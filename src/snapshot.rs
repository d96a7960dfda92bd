//! Snapshot data model.
//!
//! A snapshot is the immutable result of one full scan of the configured
//! root: a grand total, a per-extension breakdown and one record per folder
//! that directly holds at least one byte of file content.

use std::collections::BTreeMap;

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

/// Per-directory summary of direct (non-recursive) file content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderRecord {
    /// Path relative to the scan root, `"."` for the root itself.
    #[serde(rename = "path")]
    pub relative_path: String,
    pub size: u64,
    /// Every non-directory entry listed, including ones whose size could not be read.
    #[serde(rename = "items")]
    pub item_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub timestamp: DateTime<Utc>,
    pub total_size: u64,
    pub file_types: BTreeMap<String, u64>,
    pub folders: Vec<FolderRecord>,
}

impl Snapshot {
    /// An empty snapshot stamped with the current time.
    pub fn empty_now() -> Self {
        Snapshot {
            timestamp: now_millis(),
            total_size: 0,
            file_types: BTreeMap::new(),
            folders: Vec::new(),
        }
    }

    /// File types sorted by size, largest first. Ties fall back to name.
    pub fn file_types_by_size(&self) -> Vec<(&str, u64)> {
        let mut types: Vec<(&str, u64)> = self
            .file_types
            .iter()
            .map(|(ext, size)| (ext.as_str(), *size))
            .collect();
        types.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        types
    }

    pub fn folder(&self, relative_path: &str) -> Option<&FolderRecord> {
        self.folders.iter().find(|f| f.relative_path == relative_path)
    }
}

/// Listing row for a stored snapshot, without the structured columns.
#[derive(Debug, Clone, Serialize)]
pub struct SnapshotSummary {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub total_size: u64,
    pub file_type_count: usize,
    pub folder_count: usize,
}

/// Current time truncated to what the store keeps (unix millis), so a
/// snapshot read back compares equal to the one written.
pub fn now_millis() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

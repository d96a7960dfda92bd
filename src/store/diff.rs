//! Snapshot comparison engine.
//!
//! Compares two snapshots and reports changes:
//! - Matches file types by extension and folders by relative path
//! - Shows per-entry deltas: grew, shrank, new, gone
//! - Net change of the total size

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::snapshot::StoredSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffScope {
    FileType,
    Folder,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffType {
    Grew,
    Shrank,
    New,
    Gone,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiffEntry {
    pub name: String,
    pub scope: DiffScope,
    pub old_size: u64,
    pub new_size: u64,
    pub delta: i64,
    pub diff_type: DiffType,
}

#[derive(Debug, Serialize)]
pub struct DiffResult {
    pub entries: Vec<DiffEntry>,
    pub net_change: i64,
    pub from_id: i64,
    pub to_id: i64,
    pub from_timestamp: DateTime<Utc>,
    pub to_timestamp: DateTime<Utc>,
}

fn signed(size: u64) -> i64 {
    i64::try_from(size).unwrap_or(i64::MAX)
}

/// Compare two stored snapshots and produce diff entries
pub fn compare_snapshots(from: &StoredSnapshot, to: &StoredSnapshot) -> DiffResult {
    let mut entries = Vec::new();

    let from_types: BTreeMap<&str, u64> = from.snapshot.file_types.iter().map(|(k, v)| (k.as_str(), *v)).collect();
    let to_types: BTreeMap<&str, u64> = to.snapshot.file_types.iter().map(|(k, v)| (k.as_str(), *v)).collect();
    compare_sizes(DiffScope::FileType, &from_types, &to_types, &mut entries);

    let from_folders: BTreeMap<&str, u64> = from
        .snapshot
        .folders
        .iter()
        .map(|f| (f.relative_path.as_str(), f.size))
        .collect();
    let to_folders: BTreeMap<&str, u64> = to
        .snapshot
        .folders
        .iter()
        .map(|f| (f.relative_path.as_str(), f.size))
        .collect();
    compare_sizes(DiffScope::Folder, &from_folders, &to_folders, &mut entries);

    DiffResult {
        entries,
        net_change: signed(to.snapshot.total_size).saturating_sub(signed(from.snapshot.total_size)),
        from_id: from.id,
        to_id: to.id,
        from_timestamp: from.snapshot.timestamp,
        to_timestamp: to.snapshot.timestamp,
    }
}

fn compare_sizes(
    scope: DiffScope,
    from: &BTreeMap<&str, u64>,
    to: &BTreeMap<&str, u64>,
    out: &mut Vec<DiffEntry>,
) {
    // grew, shrank and new
    for (name, &new_size) in to {
        let old_size = from.get(name).copied();
        let delta = signed(new_size).saturating_sub(signed(old_size.unwrap_or(0)));

        let diff_type = match old_size {
            None => DiffType::New,
            Some(_) if delta > 0 => DiffType::Grew,
            Some(_) if delta < 0 => DiffType::Shrank,
            Some(_) => continue,
        };

        out.push(DiffEntry {
            name: name.to_string(),
            scope,
            old_size: old_size.unwrap_or(0),
            new_size,
            delta,
            diff_type,
        });
    }

    // gone (only in 'from' snapshot)
    for (name, &old_size) in from {
        if to.contains_key(name) {
            continue;
        }
        out.push(DiffEntry {
            name: name.to_string(),
            scope,
            old_size,
            new_size: 0,
            delta: -signed(old_size),
            diff_type: DiffType::Gone,
        });
    }
}

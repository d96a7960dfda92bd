use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};

use super::Timeframe;
use crate::error::Result;
use crate::snapshot::{FolderRecord, Snapshot, SnapshotSummary};

const SELECT_COLUMNS: &str = "SELECT id, timestamp, total_size, file_types, folders FROM snapshots";

/// A snapshot together with its row id.
#[derive(Debug, Clone)]
pub struct StoredSnapshot {
    pub id: i64,
    pub snapshot: Snapshot,
}

/// Database handle shared by the scheduler (writer) and the api (readers).
///
/// The single connection is guarded by a mutex; it is only held for the
/// duration of one statement, never across a scan.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Opens (creating if needed) the database file and its parent directory.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))?;

        let store = Store { conn: Mutex::new(conn) };
        store.initialize()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        let store = Store {
            conn: Mutex::new(Connection::open_in_memory()?),
        };
        store.initialize()?;
        Ok(store)
    }

    /// Creates the schema if it is missing. Safe to call repeatedly.
    pub fn initialize(&self) -> Result<()> {
        self.conn().execute_batch(
            "CREATE TABLE IF NOT EXISTS snapshots (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp INTEGER NOT NULL,
                total_size INTEGER NOT NULL,
                file_types TEXT NOT NULL,
                folders TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_snapshots_timestamp ON snapshots(timestamp);",
        )?;
        Ok(())
    }

    /// Appends a snapshot and returns its row id.
    pub fn store(&self, snapshot: &Snapshot) -> Result<i64> {
        let file_types = serde_json::to_string(&snapshot.file_types)?;
        let folders = serde_json::to_string(&snapshot.folders)?;

        let conn = self.conn();
        conn.execute(
            "INSERT INTO snapshots (timestamp, total_size, file_types, folders)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                snapshot.timestamp.timestamp_millis(),
                i64::try_from(snapshot.total_size).unwrap_or(i64::MAX),
                file_types,
                folders
            ],
        )?;

        Ok(conn.last_insert_rowid())
    }

    /// The most recent snapshot, or `None` if nothing has been stored yet.
    pub fn get_latest(&self) -> Result<Option<Snapshot>> {
        Ok(self.recent(1)?.into_iter().next().map(|s| s.snapshot))
    }

    /// Snapshots taken within `timeframe` of now, oldest first.
    pub fn get_history(&self, timeframe: Timeframe) -> Result<Vec<Snapshot>> {
        self.history_since(Utc::now() - timeframe.window())
    }

    /// Snapshots with `timestamp >= cutoff`, oldest first.
    pub fn history_since(&self, cutoff: DateTime<Utc>) -> Result<Vec<Snapshot>> {
        let conn = self.conn();
        let mut stmt = conn.prepare_cached(&format!(
            "{SELECT_COLUMNS} WHERE timestamp >= ?1 ORDER BY timestamp ASC, id ASC"
        ))?;

        let snapshots = stmt
            .query_map(params![cutoff.timestamp_millis()], stored_from_row)?
            .map(|row| row.map(|s| s.snapshot))
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(snapshots)
    }

    /// Get a specific snapshot by ID
    pub fn get(&self, id: i64) -> Result<Option<Snapshot>> {
        let conn = self.conn();
        let mut stmt = conn.prepare_cached(&format!("{SELECT_COLUMNS} WHERE id = ?1"))?;
        let stored = stmt.query_row(params![id], stored_from_row).optional()?;
        Ok(stored.map(|s| s.snapshot))
    }

    /// Up to `limit` snapshots, newest first.
    pub fn recent(&self, limit: usize) -> Result<Vec<StoredSnapshot>> {
        let conn = self.conn();
        let mut stmt = conn.prepare_cached(&format!(
            "{SELECT_COLUMNS} ORDER BY timestamp DESC, id DESC LIMIT ?1"
        ))?;

        let rows = stmt
            .query_map(params![i64::try_from(limit).unwrap_or(i64::MAX)], stored_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(rows)
    }

    /// List all snapshots, newest first
    pub fn list(&self) -> Result<Vec<SnapshotSummary>> {
        let summaries = self
            .recent(usize::MAX)?
            .into_iter()
            .map(|stored| SnapshotSummary {
                id: stored.id,
                timestamp: stored.snapshot.timestamp,
                total_size: stored.snapshot.total_size,
                file_type_count: stored.snapshot.file_types.len(),
                folder_count: stored.snapshot.folders.len(),
            })
            .collect();

        Ok(summaries)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        // a panic while holding the guard cannot leave a half-written row
        // behind, statements are atomic
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn stored_from_row(row: &rusqlite::Row) -> rusqlite::Result<StoredSnapshot> {
    let millis: i64 = row.get(1)?;
    let timestamp = DateTime::from_timestamp_millis(millis).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            1,
            Type::Integer,
            format!("timestamp {millis} out of range").into(),
        )
    })?;

    let file_types: BTreeMap<String, u64> = json_column(row, 3)?;
    let folders: Vec<FolderRecord> = json_column(row, 4)?;

    Ok(StoredSnapshot {
        id: row.get(0)?,
        snapshot: Snapshot {
            timestamp,
            total_size: row.get::<_, i64>(2)?.max(0) as u64,
            file_types,
            folders,
        },
    })
}

fn json_column<T: serde::de::DeserializeOwned>(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<T> {
    let text: String = row.get(idx)?;
    serde_json::from_str(&text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::snapshot::now_millis;
    use chrono::Duration as ChronoDuration;

    fn snapshot_at(timestamp: DateTime<Utc>, total_size: u64) -> Snapshot {
        let mut file_types = BTreeMap::new();
        file_types.insert(".txt".to_string(), 100);
        file_types.insert(".log".to_string(), 50);

        Snapshot {
            timestamp,
            total_size,
            file_types,
            folders: vec![
                FolderRecord {
                    relative_path: ".".to_string(),
                    size: 100,
                    item_count: 1,
                },
                FolderRecord {
                    relative_path: "sub".to_string(),
                    size: 50,
                    item_count: 2,
                },
            ],
        }
    }

    fn days_ago(days: i64) -> DateTime<Utc> {
        now_millis() - ChronoDuration::days(days) + ChronoDuration::minutes(1)
    }

    #[test]
    fn empty_store_has_no_latest() {
        let store = Store::open_in_memory().unwrap();
        assert!(store.get_latest().unwrap().is_none());
        assert!(store.get_history(Timeframe::Year).unwrap().is_empty());
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn stored_snapshot_round_trips() {
        let store = Store::open_in_memory().unwrap();
        let original = snapshot_at(now_millis(), 150);

        store.store(&original).unwrap();
        let loaded = store.get_latest().unwrap().unwrap();

        assert_eq!(loaded.total_size, original.total_size);
        assert_eq!(loaded.file_types, original.file_types);
        assert_eq!(loaded.folders, original.folders);
        assert_eq!(loaded, original);
    }

    #[test]
    fn latest_is_max_timestamp_not_last_insert() {
        let store = Store::open_in_memory().unwrap();
        store.store(&snapshot_at(days_ago(0), 2)).unwrap();
        store.store(&snapshot_at(days_ago(3), 1)).unwrap();

        assert_eq!(store.get_latest().unwrap().unwrap().total_size, 2);
    }

    #[test]
    fn initialize_is_idempotent() {
        let store = Store::open_in_memory().unwrap();
        store.store(&snapshot_at(now_millis(), 5)).unwrap();
        store.initialize().unwrap();
        store.initialize().unwrap();
        assert_eq!(store.list().unwrap().len(), 1);
    }

    #[test]
    fn history_is_ascending_and_windowed() {
        let store = Store::open_in_memory().unwrap();
        for (days, size) in [(0, 1), (400, 2), (3, 3), (20, 4), (200, 5)] {
            store.store(&snapshot_at(days_ago(days), size)).unwrap();
        }

        let sizes = |tf: Timeframe| -> Vec<u64> {
            store.get_history(tf).unwrap().iter().map(|s| s.total_size).collect()
        };

        assert_eq!(sizes(Timeframe::Day), vec![1]);
        assert_eq!(sizes(Timeframe::Week), vec![3, 1]);
        assert_eq!(sizes(Timeframe::Month), vec![4, 3, 1]);
        assert_eq!(sizes(Timeframe::Year), vec![5, 4, 3, 1]);
    }

    #[test]
    fn shorter_windows_are_subsets_of_longer_ones() {
        let store = Store::open_in_memory().unwrap();
        for days in [0, 1, 2, 6, 8, 29, 31, 364, 366] {
            store.store(&snapshot_at(days_ago(days), days as u64)).unwrap();
        }

        let timestamps: Vec<Vec<DateTime<Utc>>> = Timeframe::ALL
            .iter()
            .map(|tf| store.get_history(*tf).unwrap().iter().map(|s| s.timestamp).collect())
            .collect();

        for pair in timestamps.windows(2) {
            assert!(pair[0].iter().all(|ts| pair[1].contains(ts)));
            assert!(pair[0].len() <= pair[1].len());
        }
        for series in &timestamps {
            assert!(series.windows(2).all(|w| w[0] <= w[1]));
        }
    }

    #[test]
    fn get_by_id_and_recent() {
        let store = Store::open_in_memory().unwrap();
        let first = store.store(&snapshot_at(days_ago(2), 10)).unwrap();
        let second = store.store(&snapshot_at(days_ago(1), 20)).unwrap();

        assert_eq!(store.get(first).unwrap().unwrap().total_size, 10);
        assert!(store.get(second + 100).unwrap().is_none());

        let recent = store.recent(2).unwrap();
        assert_eq!(recent.iter().map(|s| s.id).collect::<Vec<_>>(), vec![second, first]);
    }

    #[test]
    fn list_summarises_newest_first() {
        let store = Store::open_in_memory().unwrap();
        store.store(&snapshot_at(days_ago(5), 10)).unwrap();
        store.store(&snapshot_at(days_ago(1), 20)).unwrap();

        let list = store.list().unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].total_size, 20);
        assert_eq!(list[0].file_type_count, 2);
        assert_eq!(list[0].folder_count, 2);
    }

    #[test]
    fn oversized_totals_are_clamped() {
        let store = Store::open_in_memory().unwrap();
        store.store(&snapshot_at(now_millis(), u64::MAX)).unwrap();
        assert_eq!(store.get_latest().unwrap().unwrap().total_size, i64::MAX as u64);
    }

    #[test]
    fn corrupt_json_column_is_a_persistence_error() {
        let store = Store::open_in_memory().unwrap();
        store
            .conn()
            .execute(
                "INSERT INTO snapshots (timestamp, total_size, file_types, folders) VALUES (0, 0, 'nope', '[]')",
                [],
            )
            .unwrap();

        assert!(matches!(store.get_latest(), Err(Error::Persistence(_))));
    }

    #[test]
    fn file_database_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("storewatch.db");

        {
            let store = Store::open(&path).unwrap();
            store.store(&snapshot_at(now_millis(), 42)).unwrap();
        }

        let reopened = Store::open(&path).unwrap();
        assert_eq!(reopened.get_latest().unwrap().unwrap().total_size, 42);
    }
}

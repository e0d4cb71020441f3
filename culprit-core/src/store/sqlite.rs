use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};

use crate::error::StoreError;
use crate::types::{CommitMetrics, HistorySnapshot};

use super::MetricsStore;
use super::schema;

/// SQLite-backed implementation of `MetricsStore`.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Mutex<Connection>,
    db_path: Option<PathBuf>,
}

fn to_sql_count(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn from_sql_count(value: i64) -> usize {
    usize::try_from(value).unwrap_or(0)
}

impl SqliteStore {
    /// Open (or create) a store at the given path. Parent directories are created.
    pub fn open(path: &Path) -> crate::error::Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(StoreError::Io)?;
        }
        let conn = Connection::open(path).map_err(StoreError::Sqlite)?;
        let store = Self {
            conn: Mutex::new(conn),
            db_path: Some(path.to_path_buf()),
        };
        store.initialize()?;
        Ok(store)
    }

    /// Create an in-memory store (for testing).
    pub fn in_memory() -> crate::error::Result<Self> {
        let conn = Connection::open_in_memory().map_err(StoreError::Sqlite)?;
        let store = Self {
            conn: Mutex::new(conn),
            db_path: None,
        };
        store.initialize()?;
        Ok(store)
    }

    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    fn initialize(&self) -> crate::error::Result<()> {
        let conn = self.conn.lock().expect("culprit store mutex poisoned");

        conn.execute_batch(
            "PRAGMA synchronous = NORMAL;
             PRAGMA cache_size = -16000;",
        )
        .map_err(StoreError::Sqlite)?;

        // WAL is silently ignored for in-memory databases
        let _ = conn.execute_batch("PRAGMA journal_mode = WAL;");

        conn.execute_batch(schema::SCHEMA_SQL)
            .map_err(StoreError::Sqlite)?;

        let stored: Option<String> = conn
            .query_row(
                "SELECT value FROM culprit_meta WHERE key = 'schema_version'",
                [],
                |row| row.get(0),
            )
            .optional()
            .map_err(StoreError::Sqlite)?;
        // Metric rows are rebuilt by every graph build, so an older table is dropped.
        if let Some(version) = stored.filter(|v| v != schema::SCHEMA_VERSION) {
            tracing::info!(from = %version, to = schema::SCHEMA_VERSION, "Recreating commit_metrics");
            conn.execute_batch("DROP TABLE IF EXISTS commit_metrics;")
                .map_err(StoreError::Sqlite)?;
            conn.execute_batch(schema::SCHEMA_SQL)
                .map_err(StoreError::Sqlite)?;
        }

        conn.execute(
            "INSERT OR REPLACE INTO culprit_meta (key, value) VALUES ('schema_version', ?1)",
            params![schema::SCHEMA_VERSION],
        )
        .map_err(StoreError::Sqlite)?;

        Ok(())
    }

    fn row_to_metrics(row: &rusqlite::Row<'_>) -> rusqlite::Result<CommitMetrics> {
        Ok(CommitMetrics {
            commit_id: row.get(0)?,
            in_degree: from_sql_count(row.get(1)?),
            out_degree: from_sql_count(row.get(2)?),
            is_merge: row.get::<_, i64>(3)? != 0,
            min_depth: from_sql_count(row.get(4)?),
            max_depth: from_sql_count(row.get(5)?),
            branch_count_time_aware: from_sql_count(row.get(6)?),
            average_degree: row.get(7)?,
            distance_to_segment_start: from_sql_count(row.get(8)?),
            distinct_upstream_merges_before: from_sql_count(row.get(9)?),
            days_since_last_merge: from_sql_count(row.get(10)?),
            history: HistorySnapshot {
                history_vertices: from_sql_count(row.get(11)?),
                history_edges: from_sql_count(row.get(12)?),
                history_branches: from_sql_count(row.get(13)?),
                history_max_degree: from_sql_count(row.get(14)?),
                history_depth: from_sql_count(row.get(15)?),
            },
        })
    }
}

#[async_trait::async_trait]
impl MetricsStore for SqliteStore {
    async fn save_commit_metrics(&self, metrics: &CommitMetrics) -> crate::error::Result<()> {
        let conn = self.conn.lock().expect("culprit store mutex poisoned");
        conn.execute(
            "INSERT INTO commit_metrics (
                commit_id, in_degree, out_degree, merge_flag, min_depth, max_depth,
                branch_count_time_aware, average_degree, distance_to_segment_start,
                distinct_upstream_merges_before, days_since_last_merge,
                history_vertices, history_edges, history_branches, history_max_degree,
                history_depth, computed_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
             ON CONFLICT(commit_id) DO UPDATE SET
                in_degree = excluded.in_degree,
                out_degree = excluded.out_degree,
                merge_flag = excluded.merge_flag,
                min_depth = excluded.min_depth,
                max_depth = excluded.max_depth,
                branch_count_time_aware = excluded.branch_count_time_aware,
                average_degree = excluded.average_degree,
                distance_to_segment_start = excluded.distance_to_segment_start,
                distinct_upstream_merges_before = excluded.distinct_upstream_merges_before,
                days_since_last_merge = excluded.days_since_last_merge,
                history_vertices = excluded.history_vertices,
                history_edges = excluded.history_edges,
                history_branches = excluded.history_branches,
                history_max_degree = excluded.history_max_degree,
                history_depth = excluded.history_depth,
                computed_at = excluded.computed_at",
            params![
                metrics.commit_id,
                to_sql_count(metrics.in_degree),
                to_sql_count(metrics.out_degree),
                metrics.merge_flag(),
                to_sql_count(metrics.min_depth),
                to_sql_count(metrics.max_depth),
                to_sql_count(metrics.branch_count_time_aware),
                metrics.average_degree,
                to_sql_count(metrics.distance_to_segment_start),
                to_sql_count(metrics.distinct_upstream_merges_before),
                to_sql_count(metrics.days_since_last_merge),
                to_sql_count(metrics.history.history_vertices),
                to_sql_count(metrics.history.history_edges),
                to_sql_count(metrics.history.history_branches),
                to_sql_count(metrics.history.history_max_degree),
                to_sql_count(metrics.history.history_depth),
                Utc::now().to_rfc3339(),
            ],
        )
        .map_err(StoreError::Sqlite)?;
        Ok(())
    }

    async fn get_commit_metrics(
        &self,
        commit_id: &str,
    ) -> crate::error::Result<Option<CommitMetrics>> {
        let conn = self.conn.lock().expect("culprit store mutex poisoned");
        let row = conn
            .query_row(
                "SELECT commit_id, in_degree, out_degree, merge_flag, min_depth, max_depth,
                        branch_count_time_aware, average_degree, distance_to_segment_start,
                        distinct_upstream_merges_before, days_since_last_merge,
                        history_vertices, history_edges, history_branches,
                        history_max_degree, history_depth
                 FROM commit_metrics WHERE commit_id = ?1",
                params![commit_id],
                Self::row_to_metrics,
            )
            .optional()
            .map_err(StoreError::Sqlite)?;
        Ok(row)
    }

    async fn commit_ids(&self) -> crate::error::Result<HashSet<String>> {
        let conn = self.conn.lock().expect("culprit store mutex poisoned");
        let mut stmt = conn
            .prepare("SELECT commit_id FROM commit_metrics")
            .map_err(StoreError::Sqlite)?;
        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(StoreError::Sqlite)?
            .collect::<rusqlite::Result<HashSet<_>>>()
            .map_err(StoreError::Sqlite)?;
        Ok(ids)
    }

    async fn save_candidates(
        &self,
        defect: &str,
        fixing_commit: &str,
        candidates: &BTreeSet<String>,
    ) -> crate::error::Result<u64> {
        let mut conn = self.conn.lock().expect("culprit store mutex poisoned");
        let tx = conn.transaction().map_err(StoreError::Sqlite)?;
        let recorded_at = Utc::now().to_rfc3339();
        let mut inserted = 0u64;
        {
            let mut stmt = tx
                .prepare(
                    "INSERT OR IGNORE INTO bug_introducing_candidates
                        (defect, fixing_commit, candidate, recorded_at)
                     VALUES (?1, ?2, ?3, ?4)",
                )
                .map_err(StoreError::Sqlite)?;
            for candidate in candidates {
                let changed = stmt
                    .execute(params![defect, fixing_commit, candidate, recorded_at])
                    .map_err(StoreError::Sqlite)?;
                inserted += changed as u64;
            }
        }
        tx.commit().map_err(StoreError::Sqlite)?;
        Ok(inserted)
    }

    async fn get_candidates(&self, defect: &str) -> crate::error::Result<BTreeSet<String>> {
        let conn = self.conn.lock().expect("culprit store mutex poisoned");
        let mut stmt = conn
            .prepare("SELECT candidate FROM bug_introducing_candidates WHERE defect = ?1")
            .map_err(StoreError::Sqlite)?;
        let candidates = stmt
            .query_map(params![defect], |row| row.get::<_, String>(0))
            .map_err(StoreError::Sqlite)?
            .collect::<rusqlite::Result<BTreeSet<_>>>()
            .map_err(StoreError::Sqlite)?;
        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: &str, depth: usize) -> CommitMetrics {
        CommitMetrics {
            commit_id: id.to_string(),
            in_degree: 1,
            out_degree: 2,
            is_merge: false,
            min_depth: depth,
            max_depth: depth + 1,
            branch_count_time_aware: 1,
            average_degree: 0.75,
            distance_to_segment_start: 3,
            distinct_upstream_merges_before: 0,
            days_since_last_merge: 12,
            history: HistorySnapshot {
                history_vertices: 9,
                history_edges: 10,
                history_branches: 2,
                history_max_degree: 3,
                history_depth: depth + 1,
            },
        }
    }

    #[tokio::test]
    async fn metrics_round_trip_and_upsert() {
        let store = SqliteStore::in_memory().unwrap();
        store.save_commit_metrics(&row("abc", 1)).await.unwrap();
        assert_eq!(store.get_commit_metrics("abc").await.unwrap(), Some(row("abc", 1)));

        store.save_commit_metrics(&row("abc", 4)).await.unwrap();
        assert_eq!(store.get_commit_metrics("abc").await.unwrap().unwrap().min_depth, 4);
        assert_eq!(store.commit_ids().await.unwrap(), HashSet::from(["abc".to_string()]));
    }

    #[tokio::test]
    async fn missing_row_is_none() {
        let store = SqliteStore::in_memory().unwrap();
        assert_eq!(store.get_commit_metrics("nope").await.unwrap(), None);
    }

    #[tokio::test]
    async fn merge_flag_is_stored_as_integer() {
        let store = SqliteStore::in_memory().unwrap();
        let mut merge = row("m", 2);
        merge.is_merge = true;
        store.save_commit_metrics(&merge).await.unwrap();

        let flag: i64 = store
            .conn
            .lock()
            .unwrap()
            .query_row("SELECT merge_flag FROM commit_metrics WHERE commit_id = 'm'", [], |r| {
                r.get(0)
            })
            .unwrap();
        assert_eq!(flag, 1);
        assert!(store.get_commit_metrics("m").await.unwrap().unwrap().is_merge);
    }

    #[tokio::test]
    async fn candidates_accumulate_per_defect() {
        let store = SqliteStore::in_memory().unwrap();
        let first = BTreeSet::from(["a".to_string(), "b".to_string()]);
        assert_eq!(store.save_candidates("BUG-1", "fix1", &first).await.unwrap(), 2);
        assert_eq!(store.save_candidates("BUG-1", "fix1", &first).await.unwrap(), 0);

        let second = BTreeSet::from(["b".to_string(), "c".to_string()]);
        store.save_candidates("BUG-1", "fix2", &second).await.unwrap();
        store.save_candidates("BUG-2", "fix3", &second).await.unwrap();

        assert_eq!(
            store.get_candidates("BUG-1").await.unwrap(),
            BTreeSet::from(["a".to_string(), "b".to_string(), "c".to_string()])
        );
        assert!(store.get_candidates("BUG-9").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn file_store_persists_across_opens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/culprit.db");
        {
            let store = SqliteStore::open(&path).unwrap();
            store.save_commit_metrics(&row("abc", 1)).await.unwrap();
        }
        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.db_path(), Some(path.as_path()));
        assert!(store.get_commit_metrics("abc").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn older_metrics_table_is_recreated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("culprit.db");
        {
            let conn = Connection::open(&path).unwrap();
            conn.execute_batch(
                "CREATE TABLE culprit_meta (key TEXT PRIMARY KEY, value TEXT NOT NULL);
                 INSERT INTO culprit_meta VALUES ('schema_version', '1');
                 CREATE TABLE commit_metrics (commit_id TEXT PRIMARY KEY, in_degree INTEGER);
                 INSERT INTO commit_metrics VALUES ('old', 1);",
            )
            .unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        assert!(store.commit_ids().await.unwrap().is_empty());
        store.save_commit_metrics(&row("abc", 1)).await.unwrap();
        assert_eq!(store.get_commit_metrics("abc").await.unwrap(), Some(row("abc", 1)));

        let version: String = store
            .conn
            .lock()
            .unwrap()
            .query_row("SELECT value FROM culprit_meta WHERE key = 'schema_version'", [], |r| {
                r.get(0)
            })
            .unwrap();
        assert_eq!(version, schema::SCHEMA_VERSION);
    }
}

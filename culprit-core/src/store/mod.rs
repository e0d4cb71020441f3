pub mod schema;
pub mod sqlite;
pub mod traits;

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::error::CulpritError;
use crate::progress::ProgressReporter;
use crate::types::CommitMetrics;

pub use sqlite::SqliteStore;
pub use traits::MetricsStore;

/// Statistics returned by [`persist_metrics`].
#[derive(Debug, Default)]
pub struct PersistStats {
    pub rows_saved: u64,
    pub duration: Duration,
    pub errors: Vec<(String, CulpritError)>,
}

/// Write one row per commit. A failed row is logged and the rest continue.
pub async fn persist_metrics(
    store: &dyn MetricsStore,
    metrics: &BTreeMap<String, CommitMetrics>,
    progress: &dyn ProgressReporter,
) -> PersistStats {
    let start = Instant::now();
    let mut stats = PersistStats::default();

    progress.start("Persisting commit metrics", metrics.len() as u64);
    for (commit_id, row) in metrics {
        match store.save_commit_metrics(row).await {
            Ok(()) => stats.rows_saved += 1,
            Err(e) => {
                warn!(commit = %commit_id, error = %e, "Failed to persist commit metrics");
                stats.errors.push((commit_id.clone(), e));
            }
        }
        progress.step();
    }
    progress.finish();

    stats.duration = start.elapsed();
    info!(
        rows = stats.rows_saved,
        errors = stats.errors.len(),
        duration = ?stats.duration,
        "Commit metrics persisted"
    );
    stats
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeSet, HashSet};

    use super::*;
    use crate::error::StoreError;
    use crate::graph::build_graph;
    use crate::progress::NoopReporter;
    use crate::repo::MemoryRepository;
    use crate::types::{CommitInfo, HeadKind};

    /// Delegates to SQLite but rejects one commit id.
    struct FlakyStore {
        inner: SqliteStore,
        reject: String,
    }

    #[async_trait::async_trait]
    impl MetricsStore for FlakyStore {
        async fn save_commit_metrics(&self, metrics: &CommitMetrics) -> crate::error::Result<()> {
            if metrics.commit_id == self.reject {
                return Err(StoreError::Sqlite(rusqlite::Error::InvalidQuery).into());
            }
            self.inner.save_commit_metrics(metrics).await
        }

        async fn get_commit_metrics(
            &self,
            commit_id: &str,
        ) -> crate::error::Result<Option<CommitMetrics>> {
            self.inner.get_commit_metrics(commit_id).await
        }

        async fn commit_ids(&self) -> crate::error::Result<HashSet<String>> {
            self.inner.commit_ids().await
        }

        async fn save_candidates(
            &self,
            defect: &str,
            fixing_commit: &str,
            candidates: &BTreeSet<String>,
        ) -> crate::error::Result<u64> {
            self.inner.save_candidates(defect, fixing_commit, candidates).await
        }

        async fn get_candidates(&self, defect: &str) -> crate::error::Result<BTreeSet<String>> {
            self.inner.get_candidates(defect).await
        }
    }

    fn linear_repo() -> MemoryRepository {
        let mut repo = MemoryRepository::new();
        repo.add_commit(CommitInfo::new("a", &[], 0))
            .add_commit(CommitInfo::new("b", &["a"], 10))
            .add_commit(CommitInfo::new("c", &["b"], 20))
            .add_head("refs/heads/main", HeadKind::Local, "c");
        repo
    }

    #[tokio::test]
    async fn persists_every_row() {
        let build = build_graph(&linear_repo()).unwrap();
        let store = SqliteStore::in_memory().unwrap();
        let stats = persist_metrics(&store, &build.metrics, &NoopReporter).await;

        assert_eq!(stats.rows_saved, 3);
        assert!(stats.errors.is_empty());
        assert_eq!(
            store.commit_ids().await.unwrap(),
            HashSet::from(["a".to_string(), "b".to_string(), "c".to_string()])
        );
        let c = store.get_commit_metrics("c").await.unwrap().unwrap();
        assert_eq!(&c, build.metrics_for("c").unwrap());
    }

    #[tokio::test]
    async fn failed_row_does_not_stop_the_rest() {
        let build = build_graph(&linear_repo()).unwrap();
        let store = FlakyStore {
            inner: SqliteStore::in_memory().unwrap(),
            reject: "b".to_string(),
        };
        let stats = persist_metrics(&store, &build.metrics, &NoopReporter).await;

        assert_eq!(stats.rows_saved, 2);
        assert_eq!(stats.errors.len(), 1);
        assert_eq!(stats.errors[0].0, "b");
        assert!(store.get_commit_metrics("c").await.unwrap().is_some());
        assert!(store.get_commit_metrics("b").await.unwrap().is_none());
    }
}

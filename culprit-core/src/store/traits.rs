use std::collections::{BTreeSet, HashSet};

use crate::types::CommitMetrics;

/// Persistence for metric rows and tracer results.
#[async_trait::async_trait]
pub trait MetricsStore: Send + Sync {
    /// Insert or replace the row for `metrics.commit_id`.
    async fn save_commit_metrics(&self, metrics: &CommitMetrics) -> crate::error::Result<()>;

    async fn get_commit_metrics(
        &self,
        commit_id: &str,
    ) -> crate::error::Result<Option<CommitMetrics>>;

    /// Ids of every commit with a stored row.
    async fn commit_ids(&self) -> crate::error::Result<HashSet<String>>;

    /// Record candidates for `defect`. Returns how many were new.
    async fn save_candidates(
        &self,
        defect: &str,
        fixing_commit: &str,
        candidates: &BTreeSet<String>,
    ) -> crate::error::Result<u64>;

    /// All candidates recorded for `defect`, across fixing commits.
    async fn get_candidates(&self, defect: &str) -> crate::error::Result<BTreeSet<String>>;
}

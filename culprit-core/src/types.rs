use serde::{Deserialize, Serialize};

/// A commit as seen through [`RepositoryAccess`](crate::repo::RepositoryAccess).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitInfo {
    /// Full hex object id.
    pub id: String,
    /// Parent ids in declared order.
    pub parents: Vec<String>,
    /// Committer time, Unix seconds.
    pub timestamp: i64,
}

impl CommitInfo {
    pub fn new(id: impl Into<String>, parents: &[&str], timestamp: i64) -> Self {
        Self {
            id: id.into(),
            parents: parents.iter().map(|p| (*p).to_string()).collect(),
            timestamp,
        }
    }

    pub fn is_merge(&self) -> bool {
        self.parents.len() > 1
    }

    pub fn first_parent(&self) -> Option<&str> {
        self.parents.first().map(String::as_str)
    }
}

/// Where a head came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HeadKind {
    Local,
    Remote,
    /// The repository's `HEAD`.
    Head,
}

/// A branch head: a named pointer to a tip commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeadRef {
    pub name: String,
    pub kind: HeadKind,
    pub tip: String,
}

impl HeadRef {
    pub fn new(name: impl Into<String>, kind: HeadKind, tip: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            tip: tip.into(),
        }
    }
}

/// One file's unified-diff text from a fixing commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilePatch {
    /// Path after the change (the pre-change path for deletions).
    pub path: String,
    /// Pre-change path when it differs from `path` (renames).
    pub old_path: Option<String>,
    pub patch: String,
}

impl FilePatch {
    pub fn new(path: impl Into<String>, patch: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            old_path: None,
            patch: patch.into(),
        }
    }

    /// Path as it existed before the change.
    pub fn pre_change_path(&self) -> &str {
        self.old_path.as_deref().unwrap_or(&self.path)
    }
}

/// The persisted per-commit metric row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitMetrics {
    pub commit_id: String,
    /// Number of distinct parents present in the graph.
    pub in_degree: usize,
    /// Number of distinct children.
    pub out_degree: usize,
    pub is_merge: bool,
    /// Shortest parent-path length to a root.
    pub min_depth: usize,
    /// Longest parent-path length to a root.
    pub max_depth: usize,
    /// Heads whose segment had started by this commit's timestamp and that reach it.
    pub branch_count_time_aware: usize,
    /// Graph-wide edges / vertices.
    pub average_degree: f64,
    /// Commits between this one and the start of its segment.
    pub distance_to_segment_start: usize,
    /// Distinct merged-in segment starts handed down the first-parent chain.
    pub distinct_upstream_merges_before: usize,
    /// Whole days since the last merge on this commit's segment.
    pub days_since_last_merge: usize,
    #[serde(flatten)]
    pub history: HistorySnapshot,
}

/// Shape of the history replayed in commit-time order up to and including
/// one commit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistorySnapshot {
    /// Commits replayed so far, plus the parents they named.
    pub history_vertices: usize,
    pub history_edges: usize,
    /// Heads that reach at least one replayed commit.
    pub history_branches: usize,
    /// Largest parent-plus-child count of any replayed vertex.
    pub history_max_degree: usize,
    /// Longest root-to-commit path among replayed commits.
    pub history_depth: usize,
}

impl CommitMetrics {
    /// Stored as the `merge_flag` column.
    pub fn merge_flag(&self) -> i64 {
        i64::from(self.is_merge)
    }
}

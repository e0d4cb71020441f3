/// Current schema version.
pub const SCHEMA_VERSION: &str = "2";

/// Full SQL schema for culprit's `SQLite` database.
pub const SCHEMA_SQL: &str = r"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS culprit_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

-- One row per commit, replaced on every graph build
CREATE TABLE IF NOT EXISTS commit_metrics (
    commit_id TEXT PRIMARY KEY,
    in_degree INTEGER NOT NULL,
    out_degree INTEGER NOT NULL,
    merge_flag INTEGER NOT NULL,
    min_depth INTEGER NOT NULL,
    max_depth INTEGER NOT NULL,
    branch_count_time_aware INTEGER NOT NULL,
    average_degree REAL NOT NULL,
    distance_to_segment_start INTEGER NOT NULL,
    distinct_upstream_merges_before INTEGER NOT NULL,
    days_since_last_merge INTEGER NOT NULL,
    history_vertices INTEGER NOT NULL,
    history_edges INTEGER NOT NULL,
    history_branches INTEGER NOT NULL,
    history_max_degree INTEGER NOT NULL,
    history_depth INTEGER NOT NULL,
    computed_at TEXT NOT NULL
);

-- Candidate bug-introducing commits per defect
CREATE TABLE IF NOT EXISTS bug_introducing_candidates (
    defect TEXT NOT NULL,
    fixing_commit TEXT NOT NULL,
    candidate TEXT NOT NULL,
    recorded_at TEXT NOT NULL,
    PRIMARY KEY (defect, fixing_commit, candidate)
);
CREATE INDEX IF NOT EXISTS idx_candidates_defect ON bug_introducing_candidates(defect);
CREATE INDEX IF NOT EXISTS idx_candidates_commit ON bug_introducing_candidates(candidate);
";

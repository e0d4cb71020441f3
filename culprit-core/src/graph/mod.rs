//! Commit graph construction.
//!
//! The build runs in two phases. [`CommitGraph`] is assembled from the
//! repository's heads and history; it is then frozen into a [`GraphBuild`]
//! together with its topological order, the resolved first parents and the
//! per-commit metrics. Nothing mutates the graph after the metric passes start.

pub mod export;
pub mod first_parent;
pub mod metrics;

use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::{Duration, Instant};

use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::GraphConfig;
use crate::error::{GraphError, Result};
use crate::repo::RepositoryAccess;
use crate::types::{CommitInfo, CommitMetrics, HeadRef};

pub use export::{ExportEdge, ExportNode, GraphExport, GraphSummary};
pub use first_parent::{FirstParentStrategy, FirstParents};
pub use metrics::Segments;

/// A commit vertex. Parents named by a commit but absent from the history
/// become placeholder vertices with no parents and timestamp 0.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitVertex {
    pub id: String,
    pub parents: Vec<String>,
    pub timestamp: i64,
    pub is_merge: bool,
}

impl CommitVertex {
    fn placeholder(id: &str) -> Self {
        Self {
            id: id.to_string(),
            parents: Vec::new(),
            timestamp: 0,
            is_merge: false,
        }
    }
}

/// Directed parent → child graph of commits.
#[derive(Debug, Default)]
pub struct CommitGraph {
    graph: DiGraph<CommitVertex, ()>,
    index: HashMap<String, NodeIndex>,
    first_parent: HashMap<NodeIndex, NodeIndex>,
    heads: Vec<HeadRef>,
}

impl CommitGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// The vertex for `id`, created as a placeholder when new.
    pub fn ensure_vertex(&mut self, id: &str) -> NodeIndex {
        if let Some(&idx) = self.index.get(id) {
            return idx;
        }
        let idx = self.graph.add_node(CommitVertex::placeholder(id));
        self.index.insert(id.to_string(), idx);
        idx
    }

    /// Insert or complete `commit` and add an edge from each of its parents.
    pub fn add_commit(&mut self, commit: &CommitInfo) -> NodeIndex {
        let idx = self.ensure_vertex(&commit.id);
        self.graph[idx] = CommitVertex {
            id: commit.id.clone(),
            parents: commit.parents.clone(),
            timestamp: commit.timestamp,
            is_merge: commit.is_merge(),
        };
        for (position, parent) in commit.parents.iter().enumerate() {
            self.add_edge(parent, &commit.id, position);
        }
        idx
    }

    /// Add `parent → child`. Idempotent; returns whether an edge was inserted.
    ///
    /// `position` is the parent's index in the child's declared parent list;
    /// position 0 records the declared first parent.
    pub fn add_edge(&mut self, parent: &str, child: &str, position: usize) -> bool {
        let from = self.ensure_vertex(parent);
        let to = self.ensure_vertex(child);
        if position == 0 {
            self.first_parent.entry(to).or_insert(from);
        }
        if self.graph.find_edge(from, to).is_some() {
            return false;
        }
        self.graph.add_edge(from, to, ());
        true
    }

    /// Register a head; heads sharing a tip collapse into the first one seen.
    pub fn add_head(&mut self, head: HeadRef) -> bool {
        if self.heads.iter().any(|h| h.tip == head.tip) {
            debug!(name = %head.name, tip = %head.tip, "Head shares a tip with an earlier head");
            return false;
        }
        self.heads.push(head);
        true
    }

    pub fn heads(&self) -> &[HeadRef] {
        &self.heads
    }

    pub fn vertex_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Edges per vertex; 0 for an empty graph.
    #[allow(clippy::cast_precision_loss)]
    pub fn average_degree(&self) -> f64 {
        if self.vertex_count() == 0 {
            0.0
        } else {
            self.edge_count() as f64 / self.vertex_count() as f64
        }
    }

    pub fn index_of(&self, id: &str) -> Option<NodeIndex> {
        self.index.get(id).copied()
    }

    pub fn vertex(&self, id: &str) -> Option<&CommitVertex> {
        self.index_of(id).map(|idx| &self.graph[idx])
    }

    pub fn vertex_at(&self, idx: NodeIndex) -> &CommitVertex {
        &self.graph[idx]
    }

    pub fn vertices(&self) -> impl Iterator<Item = &CommitVertex> {
        self.graph.node_weights()
    }

    pub fn in_degree(&self, idx: NodeIndex) -> usize {
        self.graph.neighbors_directed(idx, Direction::Incoming).count()
    }

    pub fn out_degree(&self, idx: NodeIndex) -> usize {
        self.graph.neighbors_directed(idx, Direction::Outgoing).count()
    }

    /// Distinct parents in declared order.
    pub fn parents(&self, idx: NodeIndex) -> Vec<NodeIndex> {
        let mut seen = HashSet::new();
        self.graph[idx]
            .parents
            .iter()
            .filter_map(|p| self.index_of(p))
            .filter(|p| seen.insert(*p))
            .collect()
    }

    pub fn children(&self, idx: NodeIndex) -> impl Iterator<Item = NodeIndex> + '_ {
        self.graph.neighbors_directed(idx, Direction::Outgoing)
    }

    /// The parent at position 0 of `idx`'s declared parent list.
    pub fn declared_first_parent(&self, idx: NodeIndex) -> Option<NodeIndex> {
        self.first_parent.get(&idx).copied()
    }

    pub(crate) fn petgraph(&self) -> &DiGraph<CommitVertex, ()> {
        &self.graph
    }

    /// Parents before children.
    pub fn topological_order(&self) -> std::result::Result<Vec<NodeIndex>, GraphError> {
        petgraph::algo::toposort(&self.graph, None).map_err(|cycle| GraphError::Cycle {
            commit: self.graph[cycle.node_id()].id.clone(),
        })
    }
}

/// A frozen graph plus everything computed from it.
#[derive(Debug)]
pub struct GraphBuild {
    pub graph: CommitGraph,
    pub order: Vec<NodeIndex>,
    pub first_parents: FirstParents,
    pub segments: Segments,
    /// One row per commit, keyed by commit id.
    pub metrics: BTreeMap<String, CommitMetrics>,
    pub duration: Duration,
}

impl GraphBuild {
    /// Freeze `graph`: order it, resolve first parents and compute metrics.
    pub fn freeze(graph: CommitGraph, strategy: FirstParentStrategy) -> Result<Self> {
        let start = Instant::now();
        let order = graph.topological_order()?;
        let first_parents = FirstParents::resolve(&graph, strategy);
        let segments = Segments::compute(&graph, &order, &first_parents);
        let metrics = metrics::compute_metrics(&graph, &order, &first_parents, &segments);
        Ok(Self {
            graph,
            order,
            first_parents,
            segments,
            metrics,
            duration: start.elapsed(),
        })
    }

    pub fn metrics_for(&self, id: &str) -> Option<&CommitMetrics> {
        self.metrics.get(id)
    }

    /// Commit ids from `id`'s segment start up to and including `id`.
    pub fn segment_path(&self, id: &str) -> Option<Vec<String>> {
        let idx = self.graph.index_of(id)?;
        Some(
            self.segments
                .path(idx, &self.first_parents)
                .into_iter()
                .map(|v| self.graph.vertex_at(v).id.clone())
                .collect(),
        )
    }
}

/// Builds a [`GraphBuild`] from any [`RepositoryAccess`].
#[derive(Debug, Default, Clone)]
pub struct GraphBuilder {
    config: GraphConfig,
}

impl GraphBuilder {
    pub fn new(config: GraphConfig) -> Self {
        Self { config }
    }

    /// Gather heads and history, then freeze and compute metrics.
    ///
    /// Unresolvable heads are skipped with a warning. Failing to list heads,
    /// walk history or order the graph aborts the build.
    pub fn build<R: RepositoryAccess + ?Sized>(&self, repo: &R) -> Result<GraphBuild> {
        let start = Instant::now();
        let mut graph = CommitGraph::new();

        for head in repo.list_heads()? {
            match repo.resolve(&head.tip) {
                Ok(Some(tip)) => {
                    graph.add_head(HeadRef { tip: tip.id, ..head });
                }
                Ok(None) => warn!(name = %head.name, tip = %head.tip, "Head is unreachable, skipping"),
                Err(e) => warn!(name = %head.name, error = %e, "Failed to resolve head, skipping"),
            }
        }

        let tips: Vec<String> = graph.heads().iter().map(|h| h.tip.clone()).collect();
        let commits = repo.walk(&tips)?;
        debug!(heads = tips.len(), commits = commits.len(), "History collected");

        for commit in &commits {
            graph.add_commit(commit);
        }

        let mut build = GraphBuild::freeze(graph, self.config.first_parent)?;
        build.duration = start.elapsed();
        info!(
            vertices = build.graph.vertex_count(),
            edges = build.graph.edge_count(),
            heads = build.graph.heads().len(),
            strategy = %build.first_parents.strategy(),
            duration = ?build.duration,
            "Commit graph built"
        );
        Ok(build)
    }
}

/// Build with default configuration.
pub fn build_graph<R: RepositoryAccess + ?Sized>(repo: &R) -> Result<GraphBuild> {
    GraphBuilder::default().build(repo)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::MemoryRepository;
    use crate::types::HeadKind;

    #[test]
    fn edges_are_idempotent() {
        let mut graph = CommitGraph::new();
        assert!(graph.add_edge("a", "b", 0));
        assert!(!graph.add_edge("a", "b", 0));
        assert_eq!(graph.edge_count(), 1);
        assert_eq!(graph.vertex_count(), 2);
    }

    #[test]
    fn missing_parent_becomes_placeholder() {
        let mut graph = CommitGraph::new();
        graph.add_commit(&CommitInfo::new("b", &["a"], 100));
        let a = graph.vertex("a").unwrap();
        assert_eq!(a.timestamp, 0);
        assert!(a.parents.is_empty());
        assert_eq!(graph.in_degree(graph.index_of("b").unwrap()), 1);
    }

    #[test]
    fn placeholder_is_completed_when_commit_arrives() {
        let mut graph = CommitGraph::new();
        graph.add_commit(&CommitInfo::new("b", &["a"], 100));
        graph.add_commit(&CommitInfo::new("a", &[], 50));
        assert_eq!(graph.vertex("a").unwrap().timestamp, 50);
        assert_eq!(graph.vertex_count(), 2);
        assert_eq!(graph.edge_count(), 1);
    }

    #[test]
    fn duplicate_parent_makes_one_edge() {
        let mut graph = CommitGraph::new();
        graph.add_commit(&CommitInfo::new("m", &["a", "a"], 10));
        let m = graph.index_of("m").unwrap();
        assert_eq!(graph.edge_count(), 1);
        assert_eq!(graph.parents(m).len(), 1);
        assert!(graph.vertex_at(m).is_merge);
    }

    #[test]
    fn heads_dedupe_by_tip() {
        let mut graph = CommitGraph::new();
        assert!(graph.add_head(HeadRef::new("refs/heads/main", HeadKind::Local, "c")));
        assert!(!graph.add_head(HeadRef::new("HEAD", HeadKind::Head, "c")));
        assert_eq!(graph.heads().len(), 1);
    }

    #[test]
    fn cycle_is_reported() {
        let mut graph = CommitGraph::new();
        graph.add_edge("a", "b", 0);
        graph.add_edge("b", "a", 0);
        let err = graph.topological_order().unwrap_err();
        assert!(matches!(err, GraphError::Cycle { .. }));
    }

    #[test]
    fn empty_repository_builds_empty_graph() {
        let repo = MemoryRepository::new();
        let build = build_graph(&repo).unwrap();
        assert_eq!(build.graph.vertex_count(), 0);
        assert!(build.metrics.is_empty());
        assert!((build.graph.average_degree() - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn unreachable_head_is_skipped() {
        let mut repo = MemoryRepository::new();
        repo.add_commit(CommitInfo::new("a", &[], 10))
            .add_head("refs/heads/main", HeadKind::Local, "a")
            .add_head("refs/heads/gone", HeadKind::Local, "missing");

        let build = build_graph(&repo).unwrap();
        assert_eq!(build.graph.heads().len(), 1);
        assert_eq!(build.graph.vertex_count(), 1);
    }

    #[test]
    fn heads_resolve_revision_names_to_ids() {
        let mut repo = MemoryRepository::new();
        repo.add_commit(CommitInfo::new("a", &[], 10))
            .add_head("refs/heads/main", HeadKind::Local, "a")
            .add_head("HEAD", HeadKind::Head, "a");

        let build = build_graph(&repo).unwrap();
        assert_eq!(build.graph.heads().len(), 1);
        assert_eq!(build.graph.heads()[0].name, "refs/heads/main");
    }
}

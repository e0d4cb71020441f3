use petgraph::graph::NodeIndex;
use serde::{Deserialize, Serialize};

use super::CommitGraph;

/// How the first parent of a commit is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FirstParentStrategy {
    /// The parent listed first by the commit.
    #[default]
    Declared,
    /// Prefer parents that did not fork; among those, the earliest.
    PreferLinear,
}

impl FirstParentStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Declared => "declared",
            Self::PreferLinear => "prefer-linear",
        }
    }
}

impl std::fmt::Display for FirstParentStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for FirstParentStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "declared" => Ok(Self::Declared),
            "prefer-linear" => Ok(Self::PreferLinear),
            other => Err(format!(
                "unknown first-parent strategy '{other}' (expected declared or prefer-linear)"
            )),
        }
    }
}

/// First-parent choice for every vertex, fixed once before metrics run.
#[derive(Debug, Clone)]
pub struct FirstParents {
    strategy: FirstParentStrategy,
    chosen: Vec<Option<NodeIndex>>,
}

impl FirstParents {
    pub fn resolve(graph: &CommitGraph, strategy: FirstParentStrategy) -> Self {
        let chosen = graph
            .petgraph()
            .node_indices()
            .map(|v| match strategy {
                FirstParentStrategy::Declared => graph.declared_first_parent(v),
                FirstParentStrategy::PreferLinear => prefer_linear(graph, v),
            })
            .collect();
        Self { strategy, chosen }
    }

    pub fn strategy(&self) -> FirstParentStrategy {
        self.strategy
    }

    pub fn get(&self, v: NodeIndex) -> Option<NodeIndex> {
        self.chosen.get(v.index()).copied().flatten()
    }

    /// Every distinct parent of `v` other than its chosen first parent.
    pub fn others(&self, graph: &CommitGraph, v: NodeIndex) -> Vec<NodeIndex> {
        let first = self.get(v);
        graph
            .parents(v)
            .into_iter()
            .filter(|p| Some(*p) != first)
            .collect()
    }
}

fn prefer_linear(graph: &CommitGraph, v: NodeIndex) -> Option<NodeIndex> {
    let parents = graph.parents(v);
    let linear: Vec<NodeIndex> = parents
        .iter()
        .copied()
        .filter(|p| graph.out_degree(*p) == 1)
        .collect();
    let pool = if linear.is_empty() { &parents } else { &linear };

    if let [only] = pool.as_slice() {
        return Some(*only);
    }
    // Ties keep declared order.
    pool.iter()
        .copied()
        .min_by_key(|p| graph.vertex_at(*p).timestamp)
}

use serde::{Deserialize, Serialize};

use super::GraphBuild;
use crate::types::CommitMetrics;

/// Graph-wide numbers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphSummary {
    pub vertices: usize,
    pub edges: usize,
    pub heads: usize,
    pub roots: usize,
    pub merges: usize,
    pub max_out_degree: usize,
    pub average_degree: f64,
    pub first_parent_strategy: String,
}

impl std::fmt::Display for GraphSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} commits, {} edges, {} heads, {} roots, {} merges, max out-degree {}, average degree {:.3} ({} first parents)",
            self.vertices,
            self.edges,
            self.heads,
            self.roots,
            self.merges,
            self.max_out_degree,
            self.average_degree,
            self.first_parent_strategy,
        )
    }
}

/// A vertex with its metric row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportNode {
    pub id: String,
    pub timestamp: i64,
    /// Names of heads pointing at this commit.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub heads: Vec<String>,
    pub metrics: CommitMetrics,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportEdge {
    /// Parent.
    pub source: String,
    /// Child.
    pub target: String,
    /// Whether `source` is the resolved first parent of `target`.
    pub first_parent: bool,
}

/// JSON-ready snapshot of a built graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphExport {
    pub summary: GraphSummary,
    pub nodes: Vec<ExportNode>,
    pub edges: Vec<ExportEdge>,
}

impl GraphBuild {
    pub fn summary(&self) -> GraphSummary {
        let graph = &self.graph;
        let mut roots = 0;
        let mut merges = 0;
        let mut max_out_degree = 0;
        for &v in &self.order {
            if graph.in_degree(v) == 0 {
                roots += 1;
            }
            if graph.vertex_at(v).is_merge {
                merges += 1;
            }
            max_out_degree = max_out_degree.max(graph.out_degree(v));
        }

        GraphSummary {
            vertices: graph.vertex_count(),
            edges: graph.edge_count(),
            heads: graph.heads().len(),
            roots,
            merges,
            max_out_degree,
            average_degree: graph.average_degree(),
            first_parent_strategy: self.first_parents.strategy().to_string(),
        }
    }

    /// Nodes in topological order; edges grouped by child, parents in declared order.
    pub fn export(&self) -> GraphExport {
        let graph = &self.graph;
        let mut nodes = Vec::with_capacity(self.order.len());
        let mut edges = Vec::with_capacity(graph.edge_count());

        for &v in &self.order {
            let vertex = graph.vertex_at(v);
            let Some(metrics) = self.metrics.get(&vertex.id) else {
                continue;
            };
            nodes.push(ExportNode {
                id: vertex.id.clone(),
                timestamp: vertex.timestamp,
                heads: graph
                    .heads()
                    .iter()
                    .filter(|h| h.tip == vertex.id)
                    .map(|h| h.name.clone())
                    .collect(),
                metrics: metrics.clone(),
            });

            let first = self.first_parents.get(v);
            for p in graph.parents(v) {
                edges.push(ExportEdge {
                    source: graph.vertex_at(p).id.clone(),
                    target: vertex.id.clone(),
                    first_parent: Some(p) == first,
                });
            }
        }

        GraphExport {
            summary: self.summary(),
            nodes,
            edges,
        }
    }
}

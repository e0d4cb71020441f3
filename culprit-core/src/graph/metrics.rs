// Per-commit metric passes over a frozen graph.
//
// Every pass walks the topological order once (branch counts walk once per
// head, history snapshots replay it by commit time). Results are dense
// vectors indexed by `NodeIndex::index()`.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::rc::Rc;

use petgraph::graph::NodeIndex;
use petgraph::visit::{Dfs, Reversed};

use super::{CommitGraph, FirstParents};
use crate::types::{CommitMetrics, HistorySnapshot};

const SECONDS_PER_DAY: i64 = 86_400;

/// Shortest and longest parent-path length from each vertex to a root.
#[derive(Debug, Clone)]
pub struct Depths {
    pub min: Vec<usize>,
    pub max: Vec<usize>,
}

pub fn depths(graph: &CommitGraph, order: &[NodeIndex]) -> Depths {
    let n = graph.vertex_count();
    let mut min = vec![0; n];
    let mut max = vec![0; n];

    for &v in order {
        let parents = graph.parents(v);
        if parents.is_empty() {
            continue;
        }
        min[v.index()] = 1 + parents.iter().map(|p| min[p.index()]).min().unwrap_or(0);
        max[v.index()] = 1 + parents.iter().map(|p| max[p.index()]).max().unwrap_or(0);
    }
    Depths { min, max }
}

/// Segment membership: the maximal first-parent chain a commit sits on.
///
/// A commit starts a new segment when it has no first parent or when its
/// first parent has more than one child.
#[derive(Debug, Clone)]
pub struct Segments {
    distance: Vec<usize>,
    start: Vec<NodeIndex>,
}

impl Segments {
    pub fn compute(graph: &CommitGraph, order: &[NodeIndex], first_parents: &FirstParents) -> Self {
        let n = graph.vertex_count();
        let mut distance = vec![0; n];
        let mut start: Vec<NodeIndex> = (0..n).map(NodeIndex::new).collect();

        for &v in order {
            match first_parents.get(v) {
                Some(p) if graph.out_degree(p) <= 1 => {
                    distance[v.index()] = distance[p.index()] + 1;
                    start[v.index()] = start[p.index()];
                }
                _ => {}
            }
        }
        Self { distance, start }
    }

    pub fn distance(&self, v: NodeIndex) -> usize {
        self.distance[v.index()]
    }

    pub fn start(&self, v: NodeIndex) -> NodeIndex {
        self.start[v.index()]
    }

    /// Vertices from the segment start to `v`, inclusive.
    pub fn path(&self, v: NodeIndex, first_parents: &FirstParents) -> Vec<NodeIndex> {
        let start = self.start(v);
        let mut path = vec![v];
        let mut current = v;
        while current != start {
            match first_parents.get(current) {
                Some(p) => {
                    path.push(p);
                    current = p;
                }
                None => break,
            }
        }
        path.reverse();
        path
    }
}

/// Size of the merged-in segment-start set each commit inherits from its
/// first parent. Merges extend the set with the segment starts of their
/// other parents before handing it to their children.
pub fn distinct_upstream_merges(
    graph: &CommitGraph,
    order: &[NodeIndex],
    first_parents: &FirstParents,
    segments: &Segments,
) -> Vec<usize> {
    let n = graph.vertex_count();
    let empty: Rc<BTreeSet<NodeIndex>> = Rc::new(BTreeSet::new());
    let mut handed: Vec<Rc<BTreeSet<NodeIndex>>> = vec![Rc::clone(&empty); n];
    let mut counts = vec![0; n];

    for &v in order {
        let inherited = first_parents
            .get(v)
            .map_or_else(|| Rc::clone(&empty), |p| Rc::clone(&handed[p.index()]));
        counts[v.index()] = inherited.len();

        let others = first_parents.others(graph, v);
        handed[v.index()] = if graph.vertex_at(v).is_merge && !others.is_empty() {
            let mut extended = (*inherited).clone();
            extended.extend(others.into_iter().map(|p| segments.start(p)));
            Rc::new(extended)
        } else {
            inherited
        };
    }
    counts
}

/// Whole days between a commit and the most recent earlier merge on its
/// segment, in topological order. 0 when there is none or the clock runs
/// backwards.
pub fn days_since_last_merge(
    graph: &CommitGraph,
    order: &[NodeIndex],
    segments: &Segments,
) -> Vec<usize> {
    let mut days = vec![0; graph.vertex_count()];
    let mut last_merge: HashMap<NodeIndex, i64> = HashMap::new();

    for &v in order {
        let vertex = graph.vertex_at(v);
        let segment = segments.start(v);
        if let Some(&merged_at) = last_merge.get(&segment) {
            days[v.index()] = elapsed_days(merged_at, vertex.timestamp);
        }
        if vertex.is_merge {
            last_merge.insert(segment, vertex.timestamp);
        }
    }
    days
}

fn elapsed_days(from: i64, to: i64) -> usize {
    usize::try_from(to.saturating_sub(from).div_euclid(SECONDS_PER_DAY)).unwrap_or(0)
}

/// For each commit, the number of heads that reach it and whose tip's
/// segment had started by the commit's timestamp.
pub fn time_aware_branch_counts(graph: &CommitGraph, segments: &Segments) -> Vec<usize> {
    let mut counts = vec![0; graph.vertex_count()];
    let ancestors = Reversed(graph.petgraph());

    for head in graph.heads() {
        let Some(tip) = graph.index_of(&head.tip) else {
            continue;
        };
        let segment_time = graph.vertex_at(segments.start(tip)).timestamp;
        let mut dfs = Dfs::new(ancestors, tip);
        while let Some(v) = dfs.next(ancestors) {
            if segment_time <= graph.vertex_at(v).timestamp {
                counts[v.index()] += 1;
            }
        }
    }
    counts
}

/// Replay the graph in commit-time order (topological position breaks ties)
/// and snapshot its shape after each commit.
///
/// Replaying a commit inserts it together with its parents and the edges
/// between them, so a parent with a skewed, later timestamp is counted
/// before its own turn.
pub fn history_snapshots(
    graph: &CommitGraph,
    order: &[NodeIndex],
    max_depths: &[usize],
) -> Vec<HistorySnapshot> {
    let n = graph.vertex_count();
    let mut replay = order.to_vec();
    replay.sort_by_key(|&v| graph.vertex_at(v).timestamp);

    let mut step = vec![0; n];
    for (i, &v) in replay.iter().enumerate() {
        step[v.index()] = i;
    }
    // A head joins the snapshot at the first replayed commit it reaches.
    let mut heads_joining = vec![0; n];
    let ancestors = Reversed(graph.petgraph());
    for head in graph.heads() {
        let Some(tip) = graph.index_of(&head.tip) else {
            continue;
        };
        let mut dfs = Dfs::new(ancestors, tip);
        let mut first = None;
        while let Some(v) = dfs.next(ancestors) {
            let at = step[v.index()];
            first = Some(first.map_or(at, |f: usize| f.min(at)));
        }
        if let Some(at) = first {
            heads_joining[at] += 1;
        }
    }

    let mut inserted = vec![false; n];
    let mut degree = vec![0usize; n];
    let mut current = HistorySnapshot::default();
    let mut snapshots = vec![HistorySnapshot::default(); n];

    for (i, &v) in replay.iter().enumerate() {
        let parents = graph.parents(v);
        for &u in parents.iter().chain(std::iter::once(&v)) {
            if !inserted[u.index()] {
                inserted[u.index()] = true;
                current.history_vertices += 1;
            }
        }
        for &p in &parents {
            degree[p.index()] += 1;
            current.history_max_degree = current.history_max_degree.max(degree[p.index()]);
        }
        degree[v.index()] += parents.len();
        current.history_edges += parents.len();
        current.history_max_degree = current.history_max_degree.max(degree[v.index()]);
        current.history_branches += heads_joining[i];
        current.history_depth = current.history_depth.max(max_depths[v.index()]);
        snapshots[v.index()] = current;
    }
    snapshots
}

/// Assemble one [`CommitMetrics`] row per vertex.
pub fn compute_metrics(
    graph: &CommitGraph,
    order: &[NodeIndex],
    first_parents: &FirstParents,
    segments: &Segments,
) -> BTreeMap<String, CommitMetrics> {
    let depths = depths(graph, order);
    let upstream = distinct_upstream_merges(graph, order, first_parents, segments);
    let days = days_since_last_merge(graph, order, segments);
    let branches = time_aware_branch_counts(graph, segments);
    let history = history_snapshots(graph, order, &depths.max);
    let average_degree = graph.average_degree();

    order
        .iter()
        .map(|&v| {
            let vertex = graph.vertex_at(v);
            let i = v.index();
            let row = CommitMetrics {
                commit_id: vertex.id.clone(),
                in_degree: graph.in_degree(v),
                out_degree: graph.out_degree(v),
                is_merge: vertex.is_merge,
                min_depth: depths.min[i],
                max_depth: depths.max[i],
                branch_count_time_aware: branches[i],
                average_degree,
                distance_to_segment_start: segments.distance(v),
                distinct_upstream_merges_before: upstream[i],
                days_since_last_merge: days[i],
                history: history[i],
            };
            (vertex.id.clone(), row)
        })
        .collect()
}

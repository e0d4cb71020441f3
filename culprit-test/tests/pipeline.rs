// End-to-end tests against real git repositories.

use std::collections::{BTreeSet, HashSet};

use culprit_core::config::{CulpritConfig, TraceConfig};
use culprit_core::graph::{FirstParentStrategy, GraphBuilder, build_graph};
use culprit_core::progress::NoopReporter;
use culprit_core::repo::{GitRepository, RepositoryAccess};
use culprit_core::store::{MetricsStore, SqliteStore, persist_metrics};
use culprit_core::trace::{
    BugIntroducingTracer, TraceRequest, TraceStart, trace_bug_introducing_commits,
};
use culprit_patch::changed_line_numbers;
use culprit_test::{DAY, EPOCH, TestRepo};

#[test]
fn linear_history_metrics() {
    let fixture = TestRepo::linear();
    let repo = GitRepository::open(fixture.path()).unwrap();
    let build = build_graph(&repo).unwrap();

    assert_eq!(build.graph.vertex_count(), 4);
    assert_eq!(build.graph.edge_count(), 3);
    assert_eq!(build.graph.heads().len(), 1);

    let a = build.metrics_for(fixture.id("a")).unwrap();
    assert_eq!(a.min_depth, 0);
    assert_eq!(a.out_degree, 1);

    let d = build.metrics_for(fixture.id("d")).unwrap();
    assert_eq!(d.min_depth, 3);
    assert_eq!(d.max_depth, 3);
    assert_eq!(d.distance_to_segment_start, 3);
    assert_eq!(d.out_degree, 0);
    assert_eq!(d.distinct_upstream_merges_before, 0);
    assert_eq!(d.days_since_last_merge, 0);
    assert!(!d.is_merge);
    assert_eq!(d.history.history_vertices, 4);
    assert_eq!(d.history.history_edges, 3);
    assert_eq!(d.history.history_depth, 3);
    assert_eq!(a.history.history_vertices, 1);
}

#[test]
fn commit_timestamps_come_from_the_committer() {
    let fixture = TestRepo::linear();
    let repo = GitRepository::open(fixture.path()).unwrap();
    let c = repo.resolve(fixture.id("c")).unwrap().unwrap();
    assert_eq!(c.timestamp, EPOCH + 2 * DAY);
    assert_eq!(c.parents, vec![fixture.id("b").to_string()]);
}

#[test]
fn forked_merge_metrics() {
    let fixture = TestRepo::forked_merge();
    let repo = GitRepository::open(fixture.path()).unwrap();
    let build = build_graph(&repo).unwrap();

    assert_eq!(build.graph.vertex_count(), 6);
    assert_eq!(build.graph.heads().len(), 2);

    let m = build.metrics_for(fixture.id("m")).unwrap();
    assert!(m.is_merge);
    assert_eq!(m.in_degree, 2);
    assert_eq!(m.min_depth, 3);
    assert_eq!(m.max_depth, 3);

    let n = build.metrics_for(fixture.id("n")).unwrap();
    assert_eq!(n.distinct_upstream_merges_before, 1);
    assert_eq!(n.days_since_last_merge, 6);

    let counts: Vec<usize> = ["a", "b", "c", "e", "m", "n"]
        .iter()
        .map(|label| build.metrics_for(fixture.id(label)).unwrap().branch_count_time_aware)
        .collect();
    assert_eq!(counts, vec![0, 0, 1, 1, 1, 1]);
}

#[test]
fn every_commit_gets_one_metrics_row() {
    let fixture = TestRepo::forked_merge();
    let repo = GitRepository::open(fixture.path()).unwrap();
    let build = build_graph(&repo).unwrap();

    let ids: HashSet<&str> = build.metrics.keys().map(String::as_str).collect();
    let labels: HashSet<&str> = fixture.labels().map(|l| fixture.id(l)).collect();
    assert_eq!(ids, labels);
}

#[test]
fn prefer_linear_strategy_on_real_history() {
    let fixture = TestRepo::forked_merge();
    let repo = GitRepository::open(fixture.path()).unwrap();
    let config = CulpritConfig::from_toml("[graph]\nfirst_parent = \"prefer-linear\"\n").unwrap();
    let build = GraphBuilder::new(config.graph).build(&repo).unwrap();

    assert_eq!(build.first_parents.strategy(), FirstParentStrategy::PreferLinear);
    assert_eq!(build.metrics.len(), 6);

    // Both of m's parents are linear; the older one, e, wins.
    let path = build.segment_path(fixture.id("n")).unwrap();
    assert_eq!(path, vec![fixture.id("e"), fixture.id("m"), fixture.id("n")]);

    let declared = build_graph(&repo).unwrap();
    let path = declared.segment_path(fixture.id("n")).unwrap();
    assert_eq!(path, vec![fixture.id("c"), fixture.id("m"), fixture.id("n")]);
}

#[test]
fn fix_patches_touch_the_broken_line() {
    let fixture = TestRepo::bug_fix();
    let repo = GitRepository::open(fixture.path()).unwrap();
    let patches = repo.commit_patches(fixture.id("fix")).unwrap();

    assert_eq!(patches.len(), 1);
    assert_eq!(patches[0].path, "src/calc.rs");
    assert_eq!(patches[0].old_path, None);
    assert_eq!(changed_line_numbers(&patches[0].patch).unwrap(), BTreeSet::from([3]));
}

#[test]
fn blame_attributes_lines_to_their_commits() {
    let fixture = TestRepo::bug_fix();
    let repo = GitRepository::open(fixture.path()).unwrap();
    let blame = repo.blame("src/calc.rs", fixture.id("c3")).unwrap();

    assert_eq!(blame.line_count(), 5);
    assert_eq!(blame.commit_for_line(1), Some(fixture.id("c1")));
    assert_eq!(blame.commit_for_line(3), Some(fixture.id("c2")));
    assert_eq!(blame.commit_for_line(6), None);
}

#[test]
fn trace_finds_the_commit_that_broke_the_line() {
    let fixture = TestRepo::bug_fix();
    let mut repo = GitRepository::open(fixture.path()).unwrap();
    let patches = repo.commit_patches(fixture.id("fix")).unwrap();

    let found = trace_bug_introducing_commits(&mut repo, fixture.id("fix"), &patches, 3);
    assert_eq!(found, BTreeSet::from([fixture.id("c2").to_string()]));
}

#[test]
fn tracing_from_the_fix_itself_finds_nothing() {
    let fixture = TestRepo::bug_fix();
    let mut repo = GitRepository::open(fixture.path()).unwrap();
    let patches = repo.commit_patches(fixture.id("fix")).unwrap();

    let mut request = TraceRequest::new(fixture.id("fix"), patches, 3);
    request.start = TraceStart::FixingCommit;
    let outcome = BugIntroducingTracer::default().trace(&mut repo, &request, &NoopReporter);
    assert!(outcome.candidates.is_empty());
    assert!(outcome.failures.is_empty());
}

#[tokio::test]
async fn known_commits_come_from_persisted_metrics() {
    let fixture = TestRepo::bug_fix();
    let mut repo = GitRepository::open(fixture.path()).unwrap();
    let build = build_graph(&repo).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let store = SqliteStore::open(&dir.path().join("culprit.db")).unwrap();
    let stats = persist_metrics(&store, &build.metrics, &NoopReporter).await;
    assert_eq!(stats.rows_saved, 5);

    let patches = repo.commit_patches(fixture.id("fix")).unwrap();
    let mut request = TraceRequest::new(fixture.id("fix"), patches, 3);
    request.known_commits = Some(store.commit_ids().await.unwrap());
    let outcome = BugIntroducingTracer::default().trace(&mut repo, &request, &NoopReporter);
    assert_eq!(outcome.candidates, BTreeSet::from([fixture.id("c2").to_string()]));

    let saved = store
        .save_candidates("CALC-1", fixture.id("fix"), &outcome.candidates)
        .await
        .unwrap();
    assert_eq!(saved, 1);
    assert_eq!(store.get_candidates("CALC-1").await.unwrap(), outcome.candidates);
}

#[test]
fn missing_fixing_commit_is_recovered_from_the_remote() {
    let upstream = TestRepo::bug_fix();
    let clone = upstream.clone_branch("stable");

    let source = GitRepository::open(upstream.path()).unwrap();
    let patches = source.commit_patches(upstream.id("fix")).unwrap();

    let mut repo = GitRepository::open(clone.path()).unwrap();
    assert!(repo.resolve(upstream.id("fix")).unwrap().is_none());

    let tracer = BugIntroducingTracer::new(&TraceConfig::default());
    let request = TraceRequest::new(upstream.id("fix"), patches, 3);
    let outcome = tracer.trace(&mut repo, &request, &NoopReporter);

    assert_eq!(outcome.recovered, vec![upstream.id("fix").to_string()]);
    assert_eq!(outcome.candidates, BTreeSet::from([upstream.id("c2").to_string()]));
    assert!(repo.resolve(upstream.id("fix")).unwrap().is_some());
}

#[test]
fn recovery_disabled_leaves_the_commit_missing() {
    let upstream = TestRepo::bug_fix();
    let clone = upstream.clone_branch("stable");
    let mut repo = GitRepository::open(clone.path()).unwrap();

    let config = TraceConfig {
        recover_missing: false,
        ..TraceConfig::default()
    };
    let request = TraceRequest::new(upstream.id("fix"), Vec::new(), 3);
    let outcome = BugIntroducingTracer::new(&config).trace(&mut repo, &request, &NoopReporter);

    assert!(outcome.recovered.is_empty());
    assert_eq!(outcome.failures.len(), 1);
    assert!(repo.resolve(upstream.id("fix")).unwrap().is_none());
}

#[test]
fn stale_lock_files_are_removed() {
    let fixture = TestRepo::linear();
    let git_dir = fixture.path().join(".git");
    std::fs::write(git_dir.join("index.lock"), "").unwrap();
    std::fs::write(git_dir.join("HEAD.lock"), "").unwrap();

    let mut repo = GitRepository::open(fixture.path()).unwrap();
    assert_eq!(repo.clear_stale_locks().unwrap(), 2);
    assert!(!git_dir.join("index.lock").exists());
    assert_eq!(repo.clear_stale_locks().unwrap(), 0);
}

#[test]
fn graph_export_serializes() {
    let fixture = TestRepo::forked_merge();
    let repo = GitRepository::open(fixture.path()).unwrap();
    let export = build_graph(&repo).unwrap().export();

    let json = serde_json::to_value(&export).unwrap();
    assert_eq!(json["nodes"].as_array().unwrap().len(), 6);
    assert_eq!(json["edges"].as_array().unwrap().len(), 6);
    assert_eq!(json["summary"]["merges"], 1);
}

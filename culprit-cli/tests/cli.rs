// CLI tests: run the `culprit` binary against fixture repositories.

use assert_cmd::Command;
use predicates::prelude::*;

use culprit_test::TestRepo;

fn culprit() -> Command {
    let mut cmd = Command::cargo_bin("culprit").unwrap();
    cmd.env_remove("RUST_LOG");
    cmd
}

#[test]
fn graph_prints_summary_and_rows() {
    let repo = TestRepo::forked_merge();
    culprit()
        .arg("graph")
        .arg(repo.path())
        .assert()
        .success()
        .stdout(predicate::str::starts_with(
            "6 commits, 6 edges, 2 heads, 1 roots, 1 merges",
        ))
        .stdout(predicate::str::contains(&repo.id("m")[..12]))
        .stdout(predicate::str::contains("(merge)"));
}

#[test]
fn graph_json_export() {
    let repo = TestRepo::linear();
    let output = culprit()
        .args(["graph", "--format", "json"])
        .arg(repo.path())
        .output()
        .unwrap();
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["summary"]["vertices"], 4);
    assert_eq!(json["nodes"].as_array().unwrap().len(), 4);
}

#[test]
fn graph_persists_to_database() {
    let repo = TestRepo::linear();
    let db = repo.path().join("out/metrics.db");
    culprit()
        .args(["graph", "--db"])
        .arg(&db)
        .arg(repo.path())
        .assert()
        .success();
    assert!(db.exists());
}

#[test]
fn graph_on_missing_path_exits_3() {
    culprit()
        .args(["graph", "/definitely/not/a/repo"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("Cannot resolve path"));
}

#[test]
fn graph_with_bad_config_exits_2() {
    let repo = TestRepo::linear();
    std::fs::write(repo.path().join("culprit.toml"), "[trace]\nremote = \"\"\n").unwrap();
    culprit()
        .arg("graph")
        .arg(repo.path())
        .assert()
        .code(2)
        .stderr(predicate::str::contains("config"));
}

#[test]
fn trace_prints_the_bug_introducing_commit() {
    let repo = TestRepo::bug_fix();
    culprit()
        .args(["trace", repo.id("fix"), "--path"])
        .arg(repo.path())
        .assert()
        .success()
        .stdout(format!("{}\n", repo.id("c2")))
        .stderr(predicate::str::contains("1 candidates"));
}

#[test]
fn trace_accepts_revision_names() {
    let repo = TestRepo::bug_fix();
    culprit()
        .args(["trace", "main", "--format", "json", "--path"])
        .arg(repo.path())
        .assert()
        .success()
        .stdout(predicate::str::contains(repo.id("c2")))
        .stdout(predicate::str::contains(repo.id("fix")));
}

#[test]
fn trace_records_candidates_for_a_defect() {
    let repo = TestRepo::bug_fix();
    culprit()
        .args(["graph", "--persist"])
        .arg(repo.path())
        .assert()
        .success();
    culprit()
        .args(["trace", repo.id("fix"), "--known-only", "--defect", "CALC-1", "--path"])
        .arg(repo.path())
        .assert()
        .success()
        .stdout(predicate::str::contains(repo.id("c2")));
    assert!(repo.path().join(".culprit/culprit.db").exists());
}

#[test]
fn trace_of_unknown_commit_without_patch_fails() {
    let repo = TestRepo::linear();
    culprit()
        .args(["trace", "0123456789abcdef0123456789abcdef01234567", "--path"])
        .arg(repo.path())
        .assert()
        .code(1)
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn trace_fetches_a_fixing_commit_missing_from_the_clone() {
    let upstream = TestRepo::bug_fix();
    let clone = upstream.clone_branch("stable");
    culprit()
        .args(["trace", upstream.id("fix"), "--path"])
        .arg(clone.path())
        .assert()
        .success()
        .stdout(format!("{}\n", upstream.id("c2")))
        .stderr(predicate::str::contains("1 recovered"));
}

#[test]
fn trace_without_recovery_reports_the_missing_fix() {
    let upstream = TestRepo::bug_fix();
    let clone = upstream.clone_branch("stable");
    culprit()
        .args(["trace", upstream.id("fix"), "--no-recover", "--path"])
        .arg(clone.path())
        .assert()
        .code(1)
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn score_reads_stdin() {
    culprit()
        .args(["score", "--threshold", "3"])
        .write_stdin("@@ -1,4 +1,1 @@\n-    if (x == null) {\n-        return;\n-    }\n     run(x);\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("null_check"))
        .stdout(predicate::str::contains("likely defect: yes (threshold 3)"));
}

#[test]
fn score_accepts_negative_threshold() {
    culprit()
        .args(["score", "--threshold", "-2"])
        .write_stdin("@@ -1,2 +1,1 @@\n-    logger.info(\"warm\");\n     run();\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("score: -1"))
        .stdout(predicate::str::contains("likely defect: yes (threshold -2)"));
}

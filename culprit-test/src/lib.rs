// Integration test utilities and git fixtures for culprit.

use std::collections::HashMap;
use std::path::Path;
use std::process::Command;

/// Committer time of the first fixture commit.
pub const EPOCH: i64 = 1_700_000_000;
pub const DAY: i64 = 86_400;

/// A test fixture with a temporary git repository.
///
/// Commits are made with fixed author and committer dates, so metric values
/// that depend on time are stable. Each commit is remembered by a label.
#[derive(Debug)]
pub struct TestRepo {
    pub dir: tempfile::TempDir,
    commits: HashMap<String, String>,
}

impl TestRepo {
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Full id of the commit recorded under `label`.
    pub fn id(&self, label: &str) -> &str {
        self.commits
            .get(label)
            .unwrap_or_else(|| panic!("no fixture commit labelled {label}"))
    }

    /// Labels in any order.
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.commits.keys().map(String::as_str)
    }

    fn init() -> Self {
        let dir = tempfile::tempdir().expect("create tempdir");
        git(dir.path(), &["init", "--initial-branch=main"], EPOCH);
        git(dir.path(), &["config", "user.email", "test@culprit.dev"], EPOCH);
        git(dir.path(), &["config", "user.name", "Test"], EPOCH);
        git(dir.path(), &["config", "commit.gpgsign", "false"], EPOCH);
        git(dir.path(), &["config", "uploadpack.allowAnySHA1InWant", "true"], EPOCH);
        Self {
            dir,
            commits: HashMap::new(),
        }
    }

    /// Write `content` to `rel`, commit everything at `timestamp`, label the result.
    fn commit_file(&mut self, label: &str, rel: &str, content: &str, timestamp: i64) {
        let root = self.dir.path();
        let file = root.join(rel);
        if let Some(parent) = file.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&file, content).unwrap();
        git(root, &["add", "-A"], timestamp);
        git(root, &["commit", "-m", label], timestamp);
        self.record_head(label);
    }

    fn record_head(&mut self, label: &str) {
        let id = git(self.dir.path(), &["rev-parse", "HEAD"], EPOCH);
        self.commits.insert(label.to_string(), id.trim().to_string());
    }

    /// `a - b - c - d` on `main`, one day apart.
    pub fn linear() -> Self {
        let mut repo = Self::init();
        for (i, label) in ["a", "b", "c", "d"].into_iter().enumerate() {
            let offset = i64::try_from(i).unwrap() * DAY;
            repo.commit_file(label, &format!("{label}.txt"), label, EPOCH + offset);
        }
        repo
    }

    /// ```text
    /// a - b - c - m - n     (main)
    ///      \     /
    ///       e ---           (feature)
    /// ```
    /// `b` day 1, `e` day 2, `c` day 3, merge `m` day 4, `n` day 10.
    pub fn forked_merge() -> Self {
        let mut repo = Self::init();
        repo.commit_file("a", "a.txt", "a", EPOCH);
        repo.commit_file("b", "b.txt", "b", EPOCH + DAY);

        git(repo.path(), &["checkout", "-b", "feature"], EPOCH);
        repo.commit_file("e", "e.txt", "e", EPOCH + 2 * DAY);

        git(repo.path(), &["checkout", "main"], EPOCH);
        repo.commit_file("c", "c.txt", "c", EPOCH + 3 * DAY);

        git(
            repo.path(),
            &["merge", "--no-ff", "--no-edit", "feature", "-m", "m"],
            EPOCH + 4 * DAY,
        );
        repo.record_head("m");

        repo.commit_file("n", "n.txt", "n", EPOCH + 10 * DAY);
        repo
    }

    /// `c1` writes `src/calc.rs`, `c2` breaks line 3, `c3` edits the README,
    /// `fix` restores line 3. Branch `stable` stays at `c3`.
    pub fn bug_fix() -> Self {
        let mut repo = Self::init();
        repo.commit_file("c1", "src/calc.rs", &calc_source("2"), EPOCH);
        repo.commit_file("c2", "src/calc.rs", &calc_source("0"), EPOCH + DAY);
        repo.commit_file("c3", "README.md", "# calc\n", EPOCH + 2 * DAY);
        git(repo.path(), &["branch", "stable"], EPOCH);
        repo.commit_file("fix", "src/calc.rs", &calc_source("2"), EPOCH + 3 * DAY);
        repo
    }

    /// A `--no-local` clone of `branch` only, so commits past it are absent.
    pub fn clone_branch(&self, branch: &str) -> Self {
        let dir = tempfile::tempdir().expect("create tempdir");
        let source = self.path().to_string_lossy().into_owned();
        let target = dir.path().to_string_lossy().into_owned();
        git(
            self.path(),
            &[
                "clone",
                "--no-local",
                "--single-branch",
                "--branch",
                branch,
                &source,
                &target,
            ],
            EPOCH,
        );
        git(dir.path(), &["config", "user.email", "test@culprit.dev"], EPOCH);
        git(dir.path(), &["config", "user.name", "Test"], EPOCH);

        let commits = self
            .commits
            .iter()
            .filter(|(_, id)| {
                Command::new("git")
                    .args(["cat-file", "-e", &format!("{id}^{{commit}}")])
                    .current_dir(dir.path())
                    .status()
                    .is_ok_and(|s| s.success())
            })
            .map(|(label, id)| (label.clone(), id.clone()))
            .collect();
        Self { dir, commits }
    }
}

fn calc_source(y: &str) -> String {
    format!("fn main() {{\n    let x = 1;\n    let y = {y};\n    println!(\"{{}}\", x + y);\n}}\n")
}

/// Run git in `dir` with author and committer dates pinned to `timestamp`.
fn git(dir: &Path, args: &[&str], timestamp: i64) -> String {
    let date = format!("@{timestamp} +0000");
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .env("GIT_AUTHOR_NAME", "Test")
        .env("GIT_AUTHOR_EMAIL", "test@culprit.dev")
        .env("GIT_COMMITTER_NAME", "Test")
        .env("GIT_COMMITTER_EMAIL", "test@culprit.dev")
        .env("GIT_AUTHOR_DATE", &date)
        .env("GIT_COMMITTER_DATE", &date)
        .output()
        .unwrap_or_else(|e| panic!("git {}: {e}", args.join(" ")));
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        panic!("git {} failed: {stderr}", args.join(" "));
    }
    String::from_utf8_lossy(&output.stdout).into_owned()
}

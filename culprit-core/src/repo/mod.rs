//! Repository access adapter.
//!
//! Everything culprit needs from a version-control system goes through
//! [`RepositoryAccess`]. [`GitRepository`] talks to a real git clone;
//! [`MemoryRepository`] serves scripted histories for tests.

pub mod git;
pub mod memory;

use std::collections::{BTreeMap, HashSet, VecDeque};

use tracing::debug;

use crate::error::Result;
use crate::types::{CommitInfo, FilePatch, HeadRef};

pub use git::GitRepository;
pub use memory::MemoryRepository;

/// Line-to-commit attribution of one file at one revision.
///
/// Lines are 1-based; lines past the end of the file have no attribution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlameMap {
    lines: BTreeMap<u32, String>,
}

impl BlameMap {
    /// Attribution for lines `1..=commits.len()`, in order.
    pub fn from_commits<I, S>(commits: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: (1..).zip(commits.into_iter().map(Into::into)).collect(),
        }
    }

    pub fn insert(&mut self, line: u32, commit: impl Into<String>) {
        self.lines.insert(line, commit.into());
    }

    /// Commit that last touched `line`, or `None` when it is out of range.
    pub fn commit_for_line(&self, line: u32) -> Option<&str> {
        self.lines.get(&line).map(String::as_str)
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }
}

/// Read (and, for missing-commit recovery, mutate) a repository.
pub trait RepositoryAccess {
    /// All local and remote branch heads plus `HEAD`, unresolved.
    fn list_heads(&self) -> Result<Vec<HeadRef>>;

    /// Look up a commit by id or revision expression.
    ///
    /// `Ok(None)` means the commit is not available locally.
    fn resolve(&self, id: &str) -> Result<Option<CommitInfo>>;

    /// Every commit reachable from `tips`.
    ///
    /// The default walks breadth-first through [`resolve`](Self::resolve);
    /// parents that cannot be resolved are left out.
    fn walk(&self, tips: &[String]) -> Result<Vec<CommitInfo>> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut queue: VecDeque<String> = tips.iter().cloned().collect();
        let mut commits = Vec::new();

        while let Some(id) = queue.pop_front() {
            if !seen.insert(id.clone()) {
                continue;
            }
            match self.resolve(&id)? {
                Some(commit) => {
                    queue.extend(
                        commit
                            .parents
                            .iter()
                            .filter(|p| !seen.contains(*p))
                            .cloned(),
                    );
                    commits.push(commit);
                }
                None => debug!(commit = %id, "Unresolvable commit during walk"),
            }
        }
        Ok(commits)
    }

    /// Attribute each line of `path` as it exists at revision `start`.
    fn blame(&self, path: &str, start: &str) -> Result<BlameMap>;

    /// Per-file patches introduced by commit `id`, against its first parent.
    fn commit_patches(&self, id: &str) -> Result<Vec<FilePatch>>;

    /// Fetch commit `id` from the configured remote.
    fn fetch_commit(&mut self, id: &str) -> Result<()>;

    /// Check out `id` on a throwaway branch, discarding local changes.
    /// Returns the branch name.
    fn checkout_disposable_branch(&mut self, id: &str) -> Result<String>;

    /// Remove lock files left behind by interrupted operations.
    /// Returns how many were removed.
    fn clear_stale_locks(&mut self) -> Result<usize>;
}

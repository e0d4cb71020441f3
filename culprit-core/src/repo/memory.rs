use std::cell::Cell;
use std::collections::HashMap;

use super::{BlameMap, RepositoryAccess};
use crate::error::{RepositoryError, Result};
use crate::types::{CommitInfo, FilePatch, HeadKind, HeadRef};

/// Scripted in-memory repository.
///
/// Commits, heads, blame results and patches are registered up front.
/// Commits added with [`add_remote_commit`](Self::add_remote_commit) are
/// invisible to [`resolve`](RepositoryAccess::resolve) until fetched.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    commits: HashMap<String, CommitInfo>,
    remote: HashMap<String, CommitInfo>,
    heads: Vec<HeadRef>,
    blames: HashMap<(String, String), BlameMap>,
    patches: HashMap<String, Vec<FilePatch>>,
    stale_locks: usize,
    fetched: Vec<String>,
    checkouts: Vec<String>,
    blame_calls: Cell<usize>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_commit(&mut self, commit: CommitInfo) -> &mut Self {
        self.commits.insert(commit.id.clone(), commit);
        self
    }

    /// A commit only reachable through [`fetch_commit`](RepositoryAccess::fetch_commit).
    pub fn add_remote_commit(&mut self, commit: CommitInfo) -> &mut Self {
        self.remote.insert(commit.id.clone(), commit);
        self
    }

    pub fn add_head(&mut self, name: &str, kind: HeadKind, tip: &str) -> &mut Self {
        self.heads.push(HeadRef::new(name, kind, tip));
        self
    }

    /// Blame of `path` at `start`; one commit id per line, starting at line 1.
    pub fn add_blame(&mut self, path: &str, start: &str, lines: &[&str]) -> &mut Self {
        self.blames.insert(
            (path.to_string(), start.to_string()),
            BlameMap::from_commits(lines.iter().copied()),
        );
        self
    }

    pub fn add_patches(&mut self, id: &str, patches: Vec<FilePatch>) -> &mut Self {
        self.patches.insert(id.to_string(), patches);
        self
    }

    /// Pretend `count` lock files were left behind.
    pub fn leave_stale_locks(&mut self, count: usize) -> &mut Self {
        self.stale_locks = count;
        self
    }

    pub fn stale_locks(&self) -> usize {
        self.stale_locks
    }

    pub fn fetched(&self) -> &[String] {
        &self.fetched
    }

    pub fn checkouts(&self) -> &[String] {
        &self.checkouts
    }

    /// Number of `blame` calls served so far.
    pub fn blame_calls(&self) -> usize {
        self.blame_calls.get()
    }
}

impl RepositoryAccess for MemoryRepository {
    fn list_heads(&self) -> Result<Vec<HeadRef>> {
        Ok(self.heads.clone())
    }

    fn resolve(&self, id: &str) -> Result<Option<CommitInfo>> {
        Ok(self.commits.get(id).cloned())
    }

    fn blame(&self, path: &str, start: &str) -> Result<BlameMap> {
        self.blame_calls.set(self.blame_calls.get() + 1);
        self.blames
            .get(&(path.to_string(), start.to_string()))
            .cloned()
            .ok_or_else(|| {
                RepositoryError::Command {
                    command: format!("git blame --porcelain {start} -- {path}"),
                    stderr: format!("fatal: no such path '{path}' in {start}"),
                }
                .into()
            })
    }

    fn commit_patches(&self, id: &str) -> Result<Vec<FilePatch>> {
        Ok(self.patches.get(id).cloned().unwrap_or_default())
    }

    fn fetch_commit(&mut self, id: &str) -> Result<()> {
        let commit = self.remote.remove(id).ok_or_else(|| RepositoryError::Command {
            command: format!("git fetch --no-tags origin {id}"),
            stderr: format!("fatal: remote error: upload-pack: not our ref {id}"),
        })?;
        self.fetched.push(id.to_string());
        self.commits.insert(commit.id.clone(), commit);
        Ok(())
    }

    fn checkout_disposable_branch(&mut self, id: &str) -> Result<String> {
        if !self.commits.contains_key(id) {
            return Err(RepositoryError::Command {
                command: format!("git checkout {id}"),
                stderr: format!("fatal: reference is not a tree: {id}"),
            }
            .into());
        }
        let branch = super::git::disposable_branch_name(id);
        self.checkouts.push(branch.clone());
        Ok(branch)
    }

    fn clear_stale_locks(&mut self) -> Result<usize> {
        Ok(std::mem::take(&mut self.stale_locks))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_commits_resolve_only_after_fetch() {
        let mut repo = MemoryRepository::new();
        repo.add_remote_commit(CommitInfo::new("r", &[], 5));

        assert_eq!(repo.resolve("r").unwrap(), None);
        repo.fetch_commit("r").unwrap();
        assert_eq!(repo.resolve("r").unwrap().unwrap().timestamp, 5);
        assert_eq!(repo.fetched(), ["r".to_string()]);
        assert!(repo.fetch_commit("r").is_err());
    }

    #[test]
    fn unknown_blame_is_an_error() {
        let repo = MemoryRepository::new();
        assert!(repo.blame("src/lib.rs", "abc").is_err());
        assert_eq!(repo.blame_calls(), 1);
    }

    #[test]
    fn locks_clear_once() {
        let mut repo = MemoryRepository::new();
        repo.leave_stale_locks(2);
        assert_eq!(repo.clear_stale_locks().unwrap(), 2);
        assert_eq!(repo.clear_stale_locks().unwrap(), 0);
    }
}

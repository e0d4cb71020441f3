use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, info, warn};

use super::{BlameMap, RepositoryAccess};
use crate::error::{GraphError, RepositoryError, Result};
use crate::types::{CommitInfo, FilePatch, HeadKind, HeadRef};

/// Prefix of the local ref a recovered commit is fetched into.
pub const RECOVERY_REF_PREFIX: &str = "refs/culprit/recovered/";

/// Prefix of branches created to check out recovered commits.
pub const DISPOSABLE_BRANCH_PREFIX: &str = "culprit-recover-";

/// Lock files under the git dir that interrupted commands leave behind.
const STALE_LOCKS: &[&str] = &[
    "index.lock",
    "HEAD.lock",
    "config.lock",
    "shallow.lock",
    "packed-refs.lock",
];

/// Branch name used when checking out `id` for recovery.
pub fn disposable_branch_name(id: &str) -> String {
    let short: String = id.chars().take(12).collect();
    format!("{DISPOSABLE_BRANCH_PREFIX}{short}")
}

/// A git clone on disk.
///
/// Object lookups, ref listing and history walks go through `gix`; blame,
/// patch text and the recovery operations run the `git` binary in the
/// working tree.
#[derive(Debug)]
pub struct GitRepository {
    path: PathBuf,
    repo: gix::Repository,
    remote: String,
}

fn git_err(e: impl std::fmt::Display) -> RepositoryError {
    RepositoryError::Git(e.to_string())
}

impl GitRepository {
    pub fn open(path: &Path) -> Result<Self> {
        let repo = gix::open(path)
            .map_err(|e| RepositoryError::Open(format!("{}: {e}", path.display())))?;
        Ok(Self {
            path: path.to_path_buf(),
            repo,
            remote: "origin".to_string(),
        })
    }

    /// Remote used by [`fetch_commit`](RepositoryAccess::fetch_commit).
    #[must_use]
    pub fn with_remote(mut self, remote: impl Into<String>) -> Self {
        self.remote = remote.into();
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Re-read refs and the object database after the `git` binary changed them.
    fn reopen(&mut self) -> Result<()> {
        self.repo = gix::open(&self.path)
            .map_err(|e| RepositoryError::Open(format!("{}: {e}", self.path.display())))?;
        Ok(())
    }

    fn git(&self, args: &[&str]) -> Result<String> {
        debug!(args = ?args, "Running git");
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.path)
            .output()
            .map_err(RepositoryError::Io)?;

        if !output.status.success() {
            return Err(RepositoryError::Command {
                command: format!("git {}", args.join(" ")),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }
            .into());
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

fn commit_info(commit: &gix::Commit<'_>) -> Result<CommitInfo> {
    let timestamp = commit.time().map_err(git_err)?.seconds;
    Ok(CommitInfo {
        id: commit.id().to_string(),
        parents: commit.parent_ids().map(|p| p.to_string()).collect(),
        timestamp,
    })
}

impl RepositoryAccess for GitRepository {
    fn list_heads(&self) -> Result<Vec<HeadRef>> {
        let mut heads = Vec::new();
        let platform = self.repo.references().map_err(git_err)?;

        for (kind, refs) in [
            (HeadKind::Local, platform.local_branches()),
            (HeadKind::Remote, platform.remote_branches()),
        ] {
            for reference in refs.map_err(git_err)? {
                let reference = match reference {
                    Ok(r) => r,
                    Err(e) => {
                        warn!(error = %e, "Unreadable branch ref, skipping");
                        continue;
                    }
                };
                let name = reference.name().as_bstr().to_string();
                match reference.try_id() {
                    Some(tip) => heads.push(HeadRef::new(name, kind, tip.to_string())),
                    None => debug!(name = %name, "Skipping symbolic ref"),
                }
            }
        }

        match self.repo.head_id() {
            Ok(id) => heads.push(HeadRef::new("HEAD", HeadKind::Head, id.to_string())),
            Err(e) => warn!(error = %e, "HEAD does not point at a commit, skipping"),
        }

        Ok(heads)
    }

    fn resolve(&self, id: &str) -> Result<Option<CommitInfo>> {
        let Ok(found) = self.repo.rev_parse_single(id) else {
            debug!(commit = id, "Revision not found");
            return Ok(None);
        };
        let Ok(object) = found.object() else {
            debug!(commit = id, "Object not in local database");
            return Ok(None);
        };
        match object.try_into_commit() {
            Ok(commit) => commit_info(&commit).map(Some),
            Err(_) => {
                debug!(commit = id, "Revision is not a commit");
                Ok(None)
            }
        }
    }

    fn walk(&self, tips: &[String]) -> Result<Vec<CommitInfo>> {
        let mut ids = Vec::with_capacity(tips.len());
        for tip in tips {
            let oid = gix::ObjectId::from_hex(tip.as_bytes())
                .map_err(|e| GraphError::Walk(format!("invalid commit id {tip}: {e}")))?;
            ids.push(oid);
        }

        let walk = self
            .repo
            .rev_walk(ids)
            .all()
            .map_err(|e| GraphError::Walk(e.to_string()))?;

        let mut commits = Vec::new();
        for info in walk {
            let info = info.map_err(|e| GraphError::Walk(e.to_string()))?;
            let commit = self.repo.find_commit(info.id).map_err(git_err)?;
            commits.push(commit_info(&commit)?);
        }
        Ok(commits)
    }

    fn blame(&self, path: &str, start: &str) -> Result<BlameMap> {
        let output = self.git(&["blame", "--porcelain", start, "--", path])?;
        Ok(parse_porcelain_blame(&output))
    }

    fn commit_patches(&self, id: &str) -> Result<Vec<FilePatch>> {
        let output = self.git(&[
            "log",
            "-1",
            "-p",
            "-m",
            "--first-parent",
            "-M",
            "--no-color",
            "--no-ext-diff",
            "--format=",
            id,
        ])?;
        Ok(split_file_patches(&output))
    }

    fn fetch_commit(&mut self, id: &str) -> Result<()> {
        let refspec = format!("{id}:{RECOVERY_REF_PREFIX}{id}");
        info!(commit = id, remote = %self.remote, "Fetching missing commit");
        self.git(&["fetch", "--no-tags", self.remote.as_str(), &refspec])?;
        self.reopen()
    }

    fn checkout_disposable_branch(&mut self, id: &str) -> Result<String> {
        let branch = disposable_branch_name(id);
        self.git(&["reset", "--hard"])?;
        self.git(&["checkout", "-B", &branch, id])?;
        self.reopen()?;
        Ok(branch)
    }

    fn clear_stale_locks(&mut self) -> Result<usize> {
        let git_dir = self.repo.git_dir().to_path_buf();
        let mut removed = 0;
        for name in STALE_LOCKS {
            let lock = git_dir.join(name);
            if lock.is_file() {
                std::fs::remove_file(&lock).map_err(RepositoryError::Io)?;
                warn!(path = %lock.display(), "Removed stale git lock");
                removed += 1;
            }
        }
        Ok(removed)
    }
}

fn is_object_id(token: &str) -> bool {
    matches!(token.len(), 40 | 64) && token.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Parse `git blame --porcelain` output.
///
/// Every source line is introduced by `<sha> <orig-line> <final-line> [<count>]`;
/// metadata lines and the tab-prefixed content line follow it.
pub(crate) fn parse_porcelain_blame(output: &str) -> BlameMap {
    let mut blame = BlameMap::default();
    for line in output.lines() {
        if line.starts_with('\t') {
            continue;
        }
        let mut fields = line.split(' ');
        let (Some(sha), Some(_orig), Some(final_line)) = (fields.next(), fields.next(), fields.next())
        else {
            continue;
        };
        if !is_object_id(sha) {
            continue;
        }
        if let Ok(final_line) = final_line.parse::<u32>() {
            blame.insert(final_line, sha);
        }
    }
    blame
}

/// Split multi-file diff output into one [`FilePatch`] per `diff --git` section.
pub(crate) fn split_file_patches(output: &str) -> Vec<FilePatch> {
    let mut sections: Vec<String> = Vec::new();
    for line in output.lines() {
        if line.starts_with("diff --git ") {
            sections.push(String::new());
        }
        if let Some(current) = sections.last_mut() {
            current.push_str(line);
            current.push('\n');
        }
    }

    sections
        .into_iter()
        .filter_map(|section| {
            let mut old_path = None;
            let mut new_path = None;
            for line in section.lines() {
                if line.starts_with("@@") {
                    break;
                }
                if let Some(p) = line.strip_prefix("--- a/") {
                    old_path = Some(p.to_string());
                } else if let Some(p) = line.strip_prefix("+++ b/") {
                    new_path = Some(p.to_string());
                } else if let Some(p) = line.strip_prefix("rename from ") {
                    old_path = Some(p.to_string());
                } else if let Some(p) = line.strip_prefix("rename to ") {
                    new_path = Some(p.to_string());
                }
            }

            let path = new_path.clone().or_else(|| old_path.clone());
            let Some(path) = path else {
                debug!("Skipping diff section without file paths");
                return None;
            };
            let old_path = old_path.filter(|old| *old != path);
            Some(FilePatch {
                path,
                old_path,
                patch: section,
            })
        })
        .collect()
}

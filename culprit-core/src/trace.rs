//! Bug-introducing commit tracer.
//!
//! Starting from the lines a fixing commit changed, blame each line at the
//! fix's parent, record the commit that last touched it, and repeat from
//! that commit's parents until the depth budget runs out. Failures are
//! contained to the line or file they happen on.

use std::collections::hash_map::Entry;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::TraceConfig;
use crate::error::Result;
use crate::progress::{NoopReporter, ProgressReporter};
use crate::repo::{BlameMap, RepositoryAccess};
use crate::types::{CommitInfo, FilePatch};

/// Revision whose blame is consulted first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TraceStart {
    /// The fixing commit's first declared parent.
    #[default]
    Parent,
    /// The fixing commit itself.
    FixingCommit,
}

/// Inputs of one trace.
#[derive(Debug, Clone, Default)]
pub struct TraceRequest {
    pub fixing_commit: String,
    pub files: Vec<FilePatch>,
    pub max_depth: u32,
    pub start: TraceStart,
    /// Commits walked through but never reported (e.g. other commits of the
    /// same pull request as the fix).
    pub exclude: HashSet<String>,
    /// When set, only commits in this set are reported.
    pub known_commits: Option<HashSet<String>>,
}

impl TraceRequest {
    pub fn new(fixing_commit: impl Into<String>, files: Vec<FilePatch>, max_depth: u32) -> Self {
        Self {
            fixing_commit: fixing_commit.into(),
            files,
            max_depth,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceFailureKind {
    /// The file's patch could not be parsed; the file was skipped.
    PatchParse,
    /// Blame failed for the file at a revision.
    Blame,
    /// The changed line does not exist at the blamed revision.
    OutOfRange,
    /// A commit could not be resolved, even after recovery.
    MissingCommit,
}

/// A contained per-file or per-line failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceFailure {
    pub path: String,
    pub line: Option<u32>,
    /// Revision (or commit) involved.
    pub context: String,
    pub kind: TraceFailureKind,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TraceOutcome {
    /// Candidate bug-introducing commits.
    pub candidates: BTreeSet<String>,
    /// Distinct (path, line, revision) keys examined.
    pub visited: usize,
    /// Blame invocations actually run.
    pub blame_runs: usize,
    /// Commits that had to be fetched to resolve.
    pub recovered: Vec<String>,
    pub failures: Vec<TraceFailure>,
}

/// Runs traces against a repository.
#[derive(Debug, Clone)]
pub struct BugIntroducingTracer {
    recover_missing: bool,
}

impl Default for BugIntroducingTracer {
    fn default() -> Self {
        Self::new(&TraceConfig::default())
    }
}

impl BugIntroducingTracer {
    pub fn new(config: &TraceConfig) -> Self {
        Self {
            recover_missing: config.recover_missing,
        }
    }

    pub fn trace<R: RepositoryAccess + ?Sized>(
        &self,
        repo: &mut R,
        request: &TraceRequest,
        progress: &dyn ProgressReporter,
    ) -> TraceOutcome {
        let started = Instant::now();
        let mut run = TraceRun {
            repo,
            request,
            recover_missing: self.recover_missing,
            visited: HashSet::new(),
            blames: HashMap::new(),
            resolved: HashMap::new(),
            recovery_attempted: HashSet::new(),
            outcome: TraceOutcome::default(),
        };

        if request.max_depth == 0 {
            debug!(fix = %request.fixing_commit, "Depth budget is zero, nothing to trace");
            return run.outcome;
        }

        let Some(fix) = run.resolve(&request.fixing_commit) else {
            warn!(fix = %request.fixing_commit, "Fixing commit cannot be resolved");
            run.outcome.failures.push(TraceFailure {
                path: String::new(),
                line: None,
                context: request.fixing_commit.clone(),
                kind: TraceFailureKind::MissingCommit,
                message: "fixing commit not found".to_string(),
            });
            return run.outcome;
        };

        let context = match request.start {
            TraceStart::Parent => fix.first_parent().map(str::to_string),
            TraceStart::FixingCommit => Some(fix.id.clone()),
        };
        let Some(context) = context else {
            info!(fix = %fix.id, "Fixing commit is a root commit, nothing to trace");
            return run.outcome;
        };

        progress.start("Tracing changed lines", request.files.len() as u64);
        for file in &request.files {
            run.trace_file(file, &context);
            progress.step();
        }
        progress.finish();

        let outcome = run.outcome;
        info!(
            fix = %fix.id,
            candidates = outcome.candidates.len(),
            visited = outcome.visited,
            blame_runs = outcome.blame_runs,
            failures = outcome.failures.len(),
            duration = ?started.elapsed(),
            "Trace complete"
        );
        outcome
    }
}

/// Candidate bug-introducing commits for `fixing_commit`, with default options.
pub fn trace_bug_introducing_commits<R: RepositoryAccess + ?Sized>(
    repo: &mut R,
    fixing_commit: &str,
    files: &[FilePatch],
    max_depth: u32,
) -> BTreeSet<String> {
    let request = TraceRequest::new(fixing_commit, files.to_vec(), max_depth);
    BugIntroducingTracer::default()
        .trace(repo, &request, &NoopReporter)
        .candidates
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct VisitKey {
    path: String,
    line: u32,
    context: String,
}

struct Frame {
    context: String,
    remaining: u32,
}

/// Per-trace state: caches and the outcome being accumulated.
struct TraceRun<'a, R: ?Sized> {
    repo: &'a mut R,
    request: &'a TraceRequest,
    recover_missing: bool,
    visited: HashSet<VisitKey>,
    blames: HashMap<(String, String), std::result::Result<BlameMap, String>>,
    resolved: HashMap<String, Option<CommitInfo>>,
    recovery_attempted: HashSet<String>,
    outcome: TraceOutcome,
}

impl<R: RepositoryAccess + ?Sized> TraceRun<'_, R> {
    fn trace_file(&mut self, file: &FilePatch, context: &str) {
        let lines = match culprit_patch::changed_line_numbers(&file.patch) {
            Ok(lines) => lines,
            Err(e) => {
                warn!(path = %file.path, error = %e, "Unparseable patch, skipping file");
                self.fail(&file.path, None, context, TraceFailureKind::PatchParse, e.to_string());
                return;
            }
        };
        let path = match self.request.start {
            TraceStart::Parent => file.pre_change_path(),
            TraceStart::FixingCommit => file.path.as_str(),
        };
        debug!(path, lines = lines.len(), "Tracing file");
        for line in lines {
            self.trace_line(path, line, context);
        }
    }

    fn trace_line(&mut self, path: &str, line: u32, context: &str) {
        let mut stack = vec![Frame {
            context: context.to_string(),
            remaining: self.request.max_depth,
        }];

        while let Some(frame) = stack.pop() {
            if frame.remaining == 0 {
                continue;
            }
            let key = VisitKey {
                path: path.to_string(),
                line,
                context: frame.context.clone(),
            };
            if !self.visited.insert(key) {
                continue;
            }
            self.outcome.visited += 1;

            let blamed = match self.blamed_commit(path, line, &frame.context) {
                Ok(blamed) => blamed,
                Err(message) => {
                    self.fail(path, Some(line), &frame.context, TraceFailureKind::Blame, message);
                    continue;
                }
            };
            let Some(blamed) = blamed else {
                debug!(path, line, context = %frame.context, "Line outside file at revision");
                self.fail(
                    path,
                    Some(line),
                    &frame.context,
                    TraceFailureKind::OutOfRange,
                    "line not present at revision".to_string(),
                );
                continue;
            };
            if blamed == frame.context {
                continue;
            }

            let Some(commit) = self.resolve(&blamed) else {
                self.fail(
                    path,
                    Some(line),
                    &blamed,
                    TraceFailureKind::MissingCommit,
                    "blamed commit cannot be resolved".to_string(),
                );
                continue;
            };

            if self.request.exclude.contains(&commit.id) {
                debug!(commit = %commit.id, "Excluded commit, tracing through");
            } else if self.is_known(&commit.id) {
                self.outcome.candidates.insert(commit.id.clone());
            } else {
                debug!(commit = %commit.id, "Commit not in known set, not recording");
                continue;
            }

            // Reverse so the first parent is explored first.
            for parent in commit.parents.iter().rev() {
                stack.push(Frame {
                    context: parent.clone(),
                    remaining: frame.remaining - 1,
                });
            }
        }
    }

    fn is_known(&self, id: &str) -> bool {
        self.request
            .known_commits
            .as_ref()
            .is_none_or(|known| known.contains(id))
    }

    /// Commit blamed for `line` of `path` at `context`; blame runs once per
    /// (path, context).
    fn blamed_commit(
        &mut self,
        path: &str,
        line: u32,
        context: &str,
    ) -> std::result::Result<Option<String>, String> {
        let cached = match self.blames.entry((path.to_string(), context.to_string())) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                self.outcome.blame_runs += 1;
                let result = self.repo.blame(path, context).map_err(|e| {
                    warn!(path, context, error = %e, "Blame failed");
                    e.to_string()
                });
                entry.insert(result)
            }
        };
        match cached {
            Ok(blame) => Ok(blame.commit_for_line(line).map(str::to_string)),
            Err(message) => Err(message.clone()),
        }
    }

    fn resolve(&mut self, id: &str) -> Option<CommitInfo> {
        if let Some(cached) = self.resolved.get(id) {
            return cached.clone();
        }
        let found = match self.repo.resolve(id) {
            Ok(Some(commit)) => Some(commit),
            Ok(None) if self.recover_missing => self.recover(id),
            Ok(None) => None,
            Err(e) => {
                warn!(commit = id, error = %e, "Failed to resolve commit");
                None
            }
        };
        self.resolved.insert(id.to_string(), found.clone());
        found
    }

    /// Fetch `id` from the remote and check it out; at most once per id.
    fn recover(&mut self, id: &str) -> Option<CommitInfo> {
        if !self.recovery_attempted.insert(id.to_string()) {
            return None;
        }
        info!(commit = id, "Commit missing locally, attempting recovery");
        match recover_commit(&mut *self.repo, id) {
            Ok(Some(commit)) => {
                self.outcome.recovered.push(id.to_string());
                Some(commit)
            }
            Ok(None) => {
                warn!(commit = id, "Commit still unresolved after fetch");
                None
            }
            Err(e) => {
                warn!(commit = id, error = %e, "Recovery failed");
                if let Err(e) = self.repo.clear_stale_locks() {
                    warn!(error = %e, "Failed to clear stale locks");
                }
                None
            }
        }
    }

    fn fail(
        &mut self,
        path: &str,
        line: Option<u32>,
        context: &str,
        kind: TraceFailureKind,
        message: String,
    ) {
        self.outcome.failures.push(TraceFailure {
            path: path.to_string(),
            line,
            context: context.to_string(),
            kind,
            message,
        });
    }
}

/// Clear stale locks, fetch `id` from the configured remote and check it out on
/// a disposable branch. `Ok(None)` when the fetch succeeded but `id` still
/// does not resolve.
pub fn recover_commit<R: RepositoryAccess + ?Sized>(
    repo: &mut R,
    id: &str,
) -> Result<Option<CommitInfo>> {
    let cleared = repo.clear_stale_locks()?;
    if cleared > 0 {
        debug!(cleared, "Cleared stale locks before fetch");
    }
    repo.fetch_commit(id)?;
    let branch = repo.checkout_disposable_branch(id)?;
    debug!(commit = id, branch = %branch, "Checked out recovered commit");
    repo.resolve(id)
}

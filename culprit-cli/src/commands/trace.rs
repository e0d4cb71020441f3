use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Args;

use culprit_core::repo::{GitRepository, RepositoryAccess};
use culprit_core::store::{MetricsStore, SqliteStore};
use culprit_core::trace::{
    BugIntroducingTracer, TraceOutcome, TraceRequest, TraceStart, recover_commit,
};
use culprit_core::types::{CommitInfo, FilePatch};

#[derive(Args, Debug)]
pub struct TraceArgs {
    /// Fixing commit (any revision git understands)
    pub fix: String,

    /// Path to git repository (default: current directory)
    #[arg(long, default_value = ".")]
    pub path: PathBuf,

    /// Maximum blame hops per changed line (default: from config)
    #[arg(long)]
    pub depth: Option<u32>,

    /// Start blaming at the fixing commit instead of its first parent
    #[arg(long)]
    pub from_fix: bool,

    /// Commit to walk through without reporting (repeatable)
    #[arg(long)]
    pub exclude: Vec<String>,

    /// Patch file for one changed file, as FILE:REPO_PATH (repeatable).
    /// When absent, patches are taken from the fixing commit.
    #[arg(long, value_name = "FILE:REPO_PATH")]
    pub patch: Vec<String>,

    /// Only report commits already persisted by `culprit graph --persist`
    #[arg(long)]
    pub known_only: bool,

    /// Record the candidates in the database under this defect id
    #[arg(long)]
    pub defect: Option<String>,

    /// Database path (default: from config)
    #[arg(long)]
    pub db: Option<PathBuf>,

    /// Do not fetch commits missing from the clone
    #[arg(long)]
    pub no_recover: bool,

    /// Config file (default: culprit.toml in the repository, if present)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Output format: text or json
    #[arg(long, default_value = "text", value_parser = ["text", "json"])]
    pub format: String,
}

pub async fn run(args: TraceArgs) -> anyhow::Result<()> {
    let repo_path = super::resolve_repo_path(&args.path)?;
    let mut config = super::load_config(args.config.as_deref(), &repo_path)?;
    if args.no_recover {
        config.trace.recover_missing = false;
    }

    let mut repo = GitRepository::open(&repo_path)
        .with_context(|| format!("Failed to open {}", repo_path.display()))?
        .with_remote(config.trace.remote.clone());

    let local_fix = repo
        .resolve(&args.fix)
        .with_context(|| format!("Failed to resolve {}", args.fix))?;
    let mut recovered_fix = None;
    let fix = match local_fix {
        Some(commit) => commit.id,
        None if !args.patch.is_empty() => args.fix.clone(),
        None if config.trace.recover_missing => match recover_fix(&mut repo, &args.fix) {
            Some(commit) => {
                recovered_fix = Some(commit.id.clone());
                commit.id
            }
            None => anyhow::bail!(
                "Fixing commit {} not found, even after fetching from '{}'",
                args.fix,
                config.trace.remote
            ),
        },
        None => anyhow::bail!(
            "Fixing commit {} not found and recovery is disabled; pass --patch to trace it anyway",
            args.fix
        ),
    };

    let files = if args.patch.is_empty() {
        repo.commit_patches(&fix)
            .with_context(|| format!("Failed to read patches of {fix}"))?
    } else {
        args.patch
            .iter()
            .map(String::as_str)
            .map(read_patch_arg)
            .collect::<anyhow::Result<Vec<_>>>()?
    };
    if files.is_empty() {
        eprintln!("Fixing commit {fix} changes no files");
    }

    let mut request = TraceRequest::new(
        fix.clone(),
        files,
        args.depth.unwrap_or(config.trace.max_depth),
    );
    request.start = if args.from_fix {
        TraceStart::FixingCommit
    } else {
        config.trace.start
    };
    request.exclude = resolve_all(&repo, &args.exclude);

    let store = if args.known_only || args.defect.is_some() {
        let db_path = super::resolve_db_path(&repo_path, &config, args.db.as_deref());
        Some(super::open_store(&db_path)?)
    } else {
        None
    };
    if let (true, Some(store)) = (args.known_only, &store) {
        let known = store.commit_ids().await.context("Failed to read stored commit ids")?;
        if known.is_empty() {
            eprintln!("Warning: no commits stored yet; run `culprit graph --persist` first");
        }
        request.known_commits = Some(known);
    }

    let tracer = BugIntroducingTracer::new(&config.trace);
    let mut outcome = tracer.trace(&mut repo, &request, &super::progress_reporter());
    if let Some(id) = recovered_fix {
        outcome.recovered.insert(0, id);
    }

    if let (Some(defect), Some(store)) = (&args.defect, &store) {
        record_candidates(store, defect, &fix, &outcome).await?;
    }

    match args.format.as_str() {
        "json" => {
            let report = serde_json::json!({
                "fixing_commit": fix,
                "candidates": outcome.candidates,
                "visited": outcome.visited,
                "blame_runs": outcome.blame_runs,
                "recovered": outcome.recovered,
                "failures": outcome.failures,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        _ => print_text(&outcome),
    }
    Ok(())
}

/// Fetch a fixing commit the clone lacks. Failures are logged and reported as
/// not found.
fn recover_fix(repo: &mut GitRepository, fix: &str) -> Option<CommitInfo> {
    tracing::info!(commit = fix, "Fixing commit missing locally, attempting recovery");
    match recover_commit(repo, fix) {
        Ok(found) => found,
        Err(e) => {
            tracing::warn!(commit = fix, error = %e, "Recovery failed");
            if let Err(e) = repo.clear_stale_locks() {
                tracing::warn!(error = %e, "Failed to clear stale locks");
            }
            None
        }
    }
}

/// Parse `FILE:REPO_PATH` and read the patch text from FILE.
fn read_patch_arg(value: &str) -> anyhow::Result<FilePatch> {
    let Some((file, repo_path)) = value.split_once(':') else {
        anyhow::bail!("Invalid --patch value '{value}' (expected FILE:REPO_PATH)");
    };
    if repo_path.is_empty() {
        anyhow::bail!("Invalid --patch value '{value}' (empty repository path)");
    }
    let text = std::fs::read_to_string(Path::new(file))
        .with_context(|| format!("Cannot read patch file: {file}"))?;
    Ok(FilePatch::new(repo_path, text))
}

/// Full ids for revisions that resolve; others are kept verbatim.
fn resolve_all(repo: &GitRepository, revisions: &[String]) -> HashSet<String> {
    revisions
        .iter()
        .map(|rev| match repo.resolve(rev) {
            Ok(Some(commit)) => commit.id,
            _ => rev.clone(),
        })
        .collect()
}

async fn record_candidates(
    store: &SqliteStore,
    defect: &str,
    fix: &str,
    outcome: &TraceOutcome,
) -> anyhow::Result<()> {
    let inserted = store
        .save_candidates(defect, fix, &outcome.candidates)
        .await
        .with_context(|| format!("Failed to store candidates for {defect}"))?;
    tracing::info!(defect, inserted, "Candidates recorded");
    Ok(())
}

fn print_text(outcome: &TraceOutcome) {
    for candidate in &outcome.candidates {
        println!("{candidate}");
    }
    for failure in &outcome.failures {
        match failure.line {
            Some(line) => eprintln!(
                "  skipped {}:{line} at {}: {}",
                failure.path, failure.context, failure.message
            ),
            None => eprintln!("  skipped {} at {}: {}", failure.path, failure.context, failure.message),
        }
    }
    eprintln!(
        "{} candidates ({} lines visited, {} blame runs, {} recovered, {} failures)",
        outcome.candidates.len(),
        outcome.visited,
        outcome.blame_runs,
        outcome.recovered.len(),
        outcome.failures.len(),
    );
}

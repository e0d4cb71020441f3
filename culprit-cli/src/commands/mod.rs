pub mod graph;
pub mod score;
pub mod trace;

use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Subcommand;

use culprit_core::config::CulpritConfig;
use culprit_core::progress::BarReporter;
use culprit_core::store::SqliteStore;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Build the commit graph and compute per-commit metrics
    Graph(graph::GraphArgs),
    /// Trace the commits that likely introduced the defect a fix repairs
    Trace(trace::TraceArgs),
    /// Score a patch for defect-fix likelihood
    Score(score::ScoreArgs),
}

pub async fn run(cmd: Command) -> anyhow::Result<()> {
    match cmd {
        Command::Graph(args) => graph::run(args).await,
        Command::Trace(args) => trace::run(args).await,
        Command::Score(args) => score::run(args),
    }
}

/// Canonicalize the repository path argument.
pub fn resolve_repo_path(path: &Path) -> anyhow::Result<PathBuf> {
    std::fs::canonicalize(path).with_context(|| format!("Cannot resolve path: {}", path.display()))
}

/// `--config` when given, otherwise `culprit.toml` under `repo_root` or defaults.
pub fn load_config(explicit: Option<&Path>, repo_root: &Path) -> anyhow::Result<CulpritConfig> {
    match explicit {
        Some(path) => CulpritConfig::load(path)
            .with_context(|| format!("Cannot load config: {}", path.display())),
        None => CulpritConfig::discover(repo_root)
            .with_context(|| format!("Cannot load config from {}", repo_root.display())),
    }
}

/// `--db` when given, otherwise the configured store path. Relative paths
/// are taken from the repository root.
pub fn resolve_db_path(
    repo_root: &Path,
    config: &CulpritConfig,
    explicit: Option<&Path>,
) -> PathBuf {
    let path = explicit.unwrap_or(config.store.path.as_path());
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        repo_root.join(path)
    }
}

pub fn open_store(db_path: &Path) -> anyhow::Result<SqliteStore> {
    SqliteStore::open(db_path)
        .with_context(|| format!("Cannot open database: {}", db_path.display()))
}

/// Progress bars only when stderr is a terminal.
pub fn progress_reporter() -> BarReporter {
    if std::io::stderr().is_terminal() {
        BarReporter::visible()
    } else {
        BarReporter::hidden()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn db_path_defaults_under_repo_root() {
        let config = CulpritConfig::default();
        let root = Path::new("/repo");
        assert_eq!(
            resolve_db_path(root, &config, None),
            PathBuf::from("/repo/.culprit/culprit.db")
        );
        assert_eq!(
            resolve_db_path(root, &config, Some(Path::new("other.db"))),
            PathBuf::from("/repo/other.db")
        );
        assert_eq!(
            resolve_db_path(root, &config, Some(Path::new("/tmp/x.db"))),
            PathBuf::from("/tmp/x.db")
        );
    }

    #[test]
    fn missing_explicit_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_config(Some(&dir.path().join("nope.toml")), dir.path()).unwrap_err();
        assert!(format!("{err:#}").contains("Cannot load config"));
    }

    #[test]
    fn discovered_config_is_optional() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(load_config(None, dir.path()).unwrap(), CulpritConfig::default());
    }
}

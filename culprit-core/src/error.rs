/// Top-level culprit error type.
///
/// All fallible operations in `culprit-core` return [`Result<T, CulpritError>`](Result).
/// Failures local to one commit, line or file are contained by the caller and
/// logged; only the variants that reach a build's public entry point abort it.
#[derive(thiserror::Error, Debug)]
pub enum CulpritError {
    /// The repository could not be opened, read or mutated.
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    /// The commit graph could not be built (aborts the whole build).
    #[error("Graph build failed: {0}")]
    Graph(#[from] GraphError),

    /// Error from the metrics store (`SQLite` operations).
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Error in configuration parsing or validation.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Errors from the repository access adapter.
#[derive(thiserror::Error, Debug)]
pub enum RepositoryError {
    /// The path is not a readable git repository.
    #[error("Cannot open repository: {0}")]
    Open(String),

    /// A git library operation failed (object lookup, ref iteration, walk).
    #[error("Git error: {0}")]
    Git(String),

    /// A `git` subprocess exited unsuccessfully.
    #[error("`{command}` failed: {stderr}")]
    Command {
        /// The command line that was run.
        command: String,
        /// Trimmed standard error of the subprocess.
        stderr: String,
    },

    /// Filesystem or process-spawn failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that abort a graph build.
#[derive(thiserror::Error, Debug)]
pub enum GraphError {
    /// History could not be walked.
    #[error("History walk failed: {0}")]
    Walk(String),

    /// History contains a cycle, so no topological order exists.
    #[error("Commit graph is not acyclic (cycle through {commit})")]
    Cycle {
        /// A commit participating in the cycle.
        commit: String,
    },
}

/// Errors from the SQLite-backed metrics store.
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    /// Underlying `SQLite` operation failed.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// The database directory could not be created.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors in culprit configuration parsing and validation.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// The configuration file does not exist at the expected path.
    #[error("Config file not found: {0}")]
    NotFound(String),

    /// Configuration values are present but semantically invalid.
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// Configuration file syntax could not be parsed (TOML error).
    #[error("Parse error: {0}")]
    Parse(String),
}

/// Convenience alias for `Result<T, CulpritError>`.
pub type Result<T> = std::result::Result<T, CulpritError>;

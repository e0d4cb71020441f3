use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::graph::FirstParentStrategy;
use crate::trace::TraceStart;

/// Default location of the metrics database, relative to the repository root.
pub const DEFAULT_DB_PATH: &str = ".culprit/culprit.db";

/// File name looked up in the repository root when no `--config` is given.
pub const CONFIG_FILE_NAME: &str = "culprit.toml";

/// Top-level culprit configuration, matching `culprit.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CulpritConfig {
    #[serde(default)]
    pub graph: GraphConfig,
    #[serde(default)]
    pub trace: TraceConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphConfig {
    /// How each merge's first parent is chosen before metrics run.
    #[serde(default)]
    pub first_parent: FirstParentStrategy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraceConfig {
    /// Maximum parent hops below the starting revision.
    pub max_depth: u32,
    /// Revision whose blame is consulted first.
    pub start: TraceStart,
    /// Remote used to fetch commits missing from the local clone.
    pub remote: String,
    /// Whether to fetch and check out missing commits during a trace.
    pub recover_missing: bool,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            max_depth: 3,
            start: TraceStart::default(),
            remote: "origin".to_string(),
            recover_missing: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    pub threshold: i32,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            threshold: culprit_patch::DEFAULT_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_DB_PATH),
        }
    }
}

impl CulpritConfig {
    /// Read and validate a TOML config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound(path.display().to_string())
            } else {
                ConfigError::Invalid(format!("cannot read {}: {e}", path.display()))
            }
        })?;
        Self::from_toml(&text)
    }

    /// `culprit.toml` in `repo_root` when present, defaults otherwise.
    pub fn discover(repo_root: &Path) -> Result<Self, ConfigError> {
        let candidate = repo_root.join(CONFIG_FILE_NAME);
        if candidate.is_file() {
            Self::load(&candidate)
        } else {
            Ok(Self::default())
        }
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.trace.remote.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "trace.remote must name a remote".to_string(),
            ));
        }
        if self.store.path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("store.path must not be empty".to_string()));
        }
        Ok(())
    }
}

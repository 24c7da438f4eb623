//! Runtime configuration loaded from `~/.deferred/config.toml`.
//!
//! ```toml
//! [runtime]
//! checkpoint_budget = 1024
//! report_unhandled_rejections = true
//!
//! [logging]
//! filter = "info"
//! ```
//!
//! Every field is optional; a missing file is not an error.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

pub const DEFAULT_CHECKPOINT_BUDGET: usize = 1024;
pub const DEFAULT_LOG_FILTER: &str = "info";

const fn default_true() -> bool {
    true
}

const fn default_checkpoint_budget() -> usize {
    DEFAULT_CHECKPOINT_BUDGET
}

fn default_log_filter() -> String {
    DEFAULT_LOG_FILTER.to_string()
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config at {}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

impl ConfigError {
    pub fn path(&self) -> &Path {
        match self {
            ConfigError::Read { path, .. } | ConfigError::Parse { path, .. } => path,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub runtime: RuntimeSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

/// Event loop tuning.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuntimeSection {
    /// Max microtasks the async driver runs per poll before yielding to
    /// tokio. Zero is treated as 1.
    #[serde(default = "default_checkpoint_budget")]
    pub checkpoint_budget: usize,
    /// Log a warning for each promise rejected with no handler.
    #[serde(default = "default_true")]
    pub report_unhandled_rejections: bool,
}

impl Default for RuntimeSection {
    fn default() -> Self {
        Self {
            checkpoint_budget: DEFAULT_CHECKPOINT_BUDGET,
            report_unhandled_rejections: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingSection {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

impl RuntimeConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Load from the default location. `Ok(None)` when there is no file or no
    /// home directory.
    pub fn load() -> Result<Option<Self>, ConfigError> {
        let Some(path) = config_path() else {
            return Ok(None);
        };
        if !path.exists() {
            return Ok(None);
        }
        Self::load_from(&path).map(Some)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let path = path.to_path_buf();
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!("Failed to read config at {:?}: {}", path, err);
                return Err(ConfigError::Read { path, source: err });
            }
        };

        match Self::from_toml_str(&content) {
            Ok(config) => {
                tracing::debug!(path = %path.display(), "loaded config");
                Ok(config)
            }
            Err(err) => {
                tracing::warn!("Failed to parse config at {:?}: {}", path, err);
                Err(ConfigError::Parse { path, source: err })
            }
        }
    }

    /// Checkpoint budget with the zero case clamped to 1.
    #[must_use]
    pub fn checkpoint_budget(&self) -> usize {
        self.runtime.checkpoint_budget.max(1)
    }

    #[must_use]
    pub fn report_unhandled_rejections(&self) -> bool {
        self.runtime.report_unhandled_rejections
    }

    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.logging.filter
    }
}

pub fn config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".deferred").join("config.toml"))
}

//! Runtime configuration.
//!
//! Read from the process environment, after loading a `.env` file from the
//! current directory or any parent if there is one.

use std::env::VarError;

use camino::Utf8PathBuf;
use tracing::debug;

/// Directory artifacts are written to.
pub const OUTPUT_DIR_VAR: &str = "FORCE2PG_OUTPUT_DIR";
/// `tracing` filter directives.
pub const LOG_VAR: &str = "FORCE2PG_LOG";

pub const DEFAULT_OUTPUT_DIR: &str = "outputs";
pub const DEFAULT_LOG_FILTER: &str = "force2pg=info";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Root of the per-object artifact directories
    pub output_dir: Utf8PathBuf,
    /// Filter for the log subscriber, in `EnvFilter` syntax
    pub log_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_dir: Utf8PathBuf::from(DEFAULT_OUTPUT_DIR),
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl Config {
    /// Load `.env` (if any), then read the configuration from the environment.
    pub fn load() -> crate::Result<Self> {
        match dotenvy::dotenv() {
            Ok(path) => debug!(path = %path.display(), "loaded .env"),
            Err(e) if e.not_found() => {}
            Err(e) => return Err(ConfigError::DotEnv(e.to_string()).into()),
        }
        Ok(Self::from_lookup(|key| std::env::var(key))?)
    }

    /// Build the configuration from any variable lookup with the contract of
    /// [`std::env::var`]. Unset variables take their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Result<String, VarError>,
    {
        let var = |key: &str| match lookup(key) {
            Ok(value) => Ok(Some(value)),
            Err(VarError::NotPresent) => Ok(None),
            Err(VarError::NotUnicode(_)) => Err(ConfigError::NotUnicode(key.to_string())),
        };

        let mut config = Config::default();

        if let Some(dir) = var(OUTPUT_DIR_VAR)? {
            if dir.trim().is_empty() {
                return Err(ConfigError::Empty(OUTPUT_DIR_VAR.to_string()));
            }
            config.output_dir = Utf8PathBuf::from(dir);
        }
        if let Some(filter) = var(LOG_VAR)? {
            config.log_filter = filter;
        }

        Ok(config)
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The `.env` file exists but couldn't be read or parsed
    DotEnv(String),
    /// A variable holds something that isn't UTF-8
    NotUnicode(String),
    /// A variable that must not be empty is
    Empty(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::DotEnv(e) => write!(f, "Failed to load .env: {}", e),
            ConfigError::NotUnicode(key) => write!(f, "{} is not valid UTF-8", key),
            ConfigError::Empty(key) => write!(f, "{} is set but empty", key),
        }
    }
}

impl std::error::Error for ConfigError {}

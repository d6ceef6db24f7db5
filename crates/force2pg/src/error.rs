use camino::Utf8PathBuf;
use thiserror::Error;

use crate::config::ConfigError;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to read artifact {path}: {source}")]
    ReadArtifact {
        path: Utf8PathBuf,
        source: std::io::Error,
    },

    #[error("failed to write artifact {path}: {source}")]
    WriteArtifact {
        path: Utf8PathBuf,
        source: std::io::Error,
    },

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to install log subscriber: {0}")]
    Logging(String),
}

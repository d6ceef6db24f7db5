//! Log subscriber setup.

use tracing_subscriber::EnvFilter;

use crate::{Config, Error, Result};

/// Install a stderr `fmt` subscriber filtered by `config.log_filter`.
///
/// Fails instead of panicking when the filter doesn't parse or a global
/// subscriber is already installed.
pub fn init(config: &Config) -> Result<()> {
    let filter =
        EnvFilter::try_new(&config.log_filter).map_err(|e| Error::Logging(e.to_string()))?;

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_env_filter(filter)
        .try_init()
        .map_err(|e| Error::Logging(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bad_filter_is_an_error() {
        let config = Config {
            log_filter: "force2pg=loud".to_string(),
            ..Config::default()
        };
        assert!(matches!(init(&config), Err(Error::Logging(_))));
    }
}

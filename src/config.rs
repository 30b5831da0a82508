//! Startup configuration, read once from the environment.

use std::path::PathBuf;

/// Server-wide configuration resolved once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Port to bind the listening socket on, all interfaces.
    pub port: u16,
    /// Backlog passed to `listen(2)`.
    pub listen_backlog: u32,
    /// Number of agencies the barrier waits for before computing the draw.
    pub expected_agencies: u8,
    /// The pick that wins the lottery.
    pub lottery_winner_number: u16,
    /// Size of the worker-pool semaphore.
    pub max_workers: usize,
    /// Path to the append-only bet store.
    pub storage_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 12345,
            listen_backlog: 1024,
            expected_agencies: 5,
            lottery_winner_number: 7574,
            max_workers: 5,
            storage_path: PathBuf::from("./bets.csv"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("environment variable {var} has an invalid value: {value:?}")]
    InvalidValue { var: &'static str, value: String },
    #[error("{var} must be greater than zero")]
    MustBePositive { var: &'static str },
}

impl Config {
    /// Builds a `Config` from the documented environment variables, falling
    /// back to the defaults in `Default::default` for anything unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Config::default();

        if let Some(v) = read_env("SERVER_PORT")? {
            config.port = parse_env("SERVER_PORT", &v)?;
        }
        if let Some(v) = read_env("SERVER_LISTEN_BACKLOG")? {
            config.listen_backlog = parse_env("SERVER_LISTEN_BACKLOG", &v)?;
        }
        if let Some(v) = read_env("AGENCY_CLOSING_NUMBER")? {
            let expected: u8 = parse_env("AGENCY_CLOSING_NUMBER", &v)?;
            if expected == 0 {
                return Err(ConfigError::MustBePositive {
                    var: "AGENCY_CLOSING_NUMBER",
                });
            }
            config.expected_agencies = expected;
        }
        if let Some(v) = read_env("LOTTERY_WINNER_NUMBER")? {
            config.lottery_winner_number = parse_env("LOTTERY_WINNER_NUMBER", &v)?;
        }
        if let Some(v) = read_env("SERVER_MAX_WORKERS")? {
            let workers: usize = parse_env("SERVER_MAX_WORKERS", &v)?;
            if workers == 0 {
                return Err(ConfigError::MustBePositive {
                    var: "SERVER_MAX_WORKERS",
                });
            }
            config.max_workers = workers;
        }
        if let Some(v) = read_env("BETS_STORAGE_PATH")? {
            config.storage_path = PathBuf::from(v);
        }

        Ok(config)
    }
}

fn read_env(var: &'static str) -> Result<Option<String>, ConfigError> {
    match std::env::var(var) {
        Ok(v) => Ok(Some(v)),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(std::env::VarError::NotUnicode(_)) => Err(ConfigError::InvalidValue {
            var,
            value: "<non-unicode>".to_string(),
        }),
    }
}

fn parse_env<T: std::str::FromStr>(var: &'static str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        var,
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = Config::default();
        assert_eq!(config.port, 12345);
        assert_eq!(config.listen_backlog, 1024);
        assert_eq!(config.expected_agencies, 5);
        assert_eq!(config.lottery_winner_number, 7574);
        assert_eq!(config.max_workers, 5);
        assert_eq!(config.storage_path, PathBuf::from("./bets.csv"));
    }
}

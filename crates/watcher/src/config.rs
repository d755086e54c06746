use std::path::PathBuf;
use std::str::FromStr;

/// A missing or malformed environment variable.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{var} has an invalid value '{value}'")]
    Invalid { var: &'static str, value: String },
}

/// Watcher configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// Base URL of the Pulseboard API, without a trailing slash.
    pub api_base_url: String,
    /// Team API key the watcher authenticates with.
    pub api_key: String,
    pub poll_interval_secs: u64,
    /// Test runner executable.
    pub runner_program: String,
    /// Runner arguments; `{title}` is replaced by the test title.
    pub runner_args: Vec<String>,
    pub runner_workdir: Option<PathBuf>,
}

impl WatcherConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var              | Default                          |
    /// |----------------------|----------------------------------|
    /// | `API_BASE_URL`       | `http://localhost:3000`          |
    /// | `WATCHER_API_KEY`    | required                         |
    /// | `POLL_INTERVAL_SECS` | `30`                             |
    /// | `RUNNER_PROGRAM`     | `npx`                            |
    /// | `RUNNER_ARGS`        | `playwright test --grep {title}` |
    /// | `RUNNER_WORKDIR`     | current directory                |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let poll_interval_secs = match get("POLL_INTERVAL_SECS") {
            None => 30,
            Some(value) => parse_positive(&value).ok_or(ConfigError::Invalid {
                var: "POLL_INTERVAL_SECS",
                value,
            })?,
        };

        Ok(Self {
            api_base_url: get("API_BASE_URL")
                .unwrap_or_else(|| "http://localhost:3000".into())
                .trim_end_matches('/')
                .to_string(),
            api_key: get("WATCHER_API_KEY").ok_or(ConfigError::Missing("WATCHER_API_KEY"))?,
            poll_interval_secs,
            runner_program: get("RUNNER_PROGRAM").unwrap_or_else(|| "npx".into()),
            runner_args: get("RUNNER_ARGS")
                .unwrap_or_else(|| "playwright test --grep {title}".into())
                .split_whitespace()
                .map(str::to_string)
                .collect(),
            runner_workdir: get("RUNNER_WORKDIR").map(PathBuf::from),
        })
    }
}

fn parse_positive<T: FromStr + Default + PartialOrd>(value: &str) -> Option<T> {
    value
        .trim()
        .parse::<T>()
        .ok()
        .filter(|v| *v > T::default())
}

use std::str::FromStr;

use axum::http::HeaderValue;

/// A missing or malformed environment variable.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{var} has an invalid value '{value}'")]
    Invalid { var: &'static str, value: String },
}

/// Server configuration loaded from environment variables.
///
/// Everything except the database URL and admin key has a default suitable
/// for local development.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// How long shutdown waits for background work (default: `30`).
    pub shutdown_timeout_secs: u64,
    pub database_url: String,
    /// Broker for cross-instance fan-out. `None` runs a single instance.
    pub redis_url: Option<String>,
    /// Credential for admin WebSocket connections and admin endpoints.
    pub admin_api_key: String,
    /// Period of the retry request expiry sweep (default: `60`).
    pub sweep_interval_secs: u64,
    /// Period of WebSocket pings (default: `30`).
    pub heartbeat_interval_secs: u64,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                  | Default                    |
    /// |--------------------------|----------------------------|
    /// | `HOST`                   | `0.0.0.0`                  |
    /// | `PORT`                   | `3000`                     |
    /// | `CORS_ORIGINS`           | `http://localhost:5173`    |
    /// | `REQUEST_TIMEOUT_SECS`   | `30`                       |
    /// | `SHUTDOWN_TIMEOUT_SECS`  | `30`                       |
    /// | `DATABASE_URL`           | required                   |
    /// | `REDIS_URL`              | unset (single instance)    |
    /// | `ADMIN_API_KEY`          | required                   |
    /// | `SWEEP_INTERVAL_SECS`    | `60`                       |
    /// | `HEARTBEAT_INTERVAL_SECS`| `30`                       |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env) over an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let vars = Vars(&lookup);

        let cors_origins: Vec<String> = vars
            .or("CORS_ORIGINS", "http://localhost:5173")
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if let Some(bad) = cors_origins
            .iter()
            .find(|o| HeaderValue::from_str(o).is_err())
        {
            return Err(ConfigError::Invalid {
                var: "CORS_ORIGINS",
                value: bad.clone(),
            });
        }

        Ok(Self {
            host: vars.or("HOST", "0.0.0.0"),
            port: vars.parse("PORT", 3000)?,
            cors_origins,
            request_timeout_secs: vars.parse("REQUEST_TIMEOUT_SECS", 30)?,
            shutdown_timeout_secs: vars.parse("SHUTDOWN_TIMEOUT_SECS", 30)?,
            database_url: vars.required("DATABASE_URL")?,
            redis_url: vars.optional("REDIS_URL"),
            admin_api_key: vars.required("ADMIN_API_KEY")?,
            sweep_interval_secs: vars.parse(
                "SWEEP_INTERVAL_SECS",
                pulseboard_core::retry::SWEEP_INTERVAL_SECS,
            )?,
            heartbeat_interval_secs: vars.parse("HEARTBEAT_INTERVAL_SECS", 30)?,
        })
    }
}

struct Vars<'a, F: Fn(&str) -> Option<String>>(&'a F);

impl<F: Fn(&str) -> Option<String>> Vars<'_, F> {
    fn optional(&self, name: &str) -> Option<String> {
        (self.0)(name).filter(|v| !v.trim().is_empty())
    }

    fn or(&self, name: &str, default: &str) -> String {
        self.optional(name).unwrap_or_else(|| default.to_string())
    }

    fn required(&self, name: &'static str) -> Result<String, ConfigError> {
        self.optional(name).ok_or(ConfigError::Missing(name))
    }

    fn parse<T: FromStr>(&self, name: &'static str, default: T) -> Result<T, ConfigError> {
        match self.optional(name) {
            None => Ok(default),
            Some(value) => value.trim().parse().map_err(|_| ConfigError::Invalid {
                var: name,
                value,
            }),
        }
    }
}

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Environment (dev, staging, prod)
    #[serde(default = "default_environment")]
    pub environment: String,

    /// CORS allowed origins, comma separated. Any origin when unset.
    pub cors_origins: Option<String>,

    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Database URL
    pub db_url: Option<String>,

    /// Number of chat messages replayed to a joining session
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    /// Interpreter invoked as `<program> -c <code>` for run-python
    #[serde(default = "default_runner_program")]
    pub runner_program: String,

    #[serde(default = "default_runner_timeout_secs")]
    pub runner_timeout_secs: u64,
}

impl Config {
    /// Load configuration from environment variables or app.env file
    pub fn load() -> Result<Self, ConfigError> {
        // Try to load from app.env file first
        if std::path::Path::new("app.env").exists() {
            dotenvy::from_filename("app.env").ok();
        } else {
            // Fallback to .env file
            dotenvy::dotenv().ok();
        }

        // Runs before tracing is installed, so errors are logged by the caller
        Ok(envy::from_env::<Config>()?)
    }

    /// Tracing filter used when `RUST_LOG` is unset: crate and HTTP tracing
    /// at debug, everything else at `log_level`.
    pub fn log_filter(&self) -> String {
        format!(
            "colab_code=debug,tower_http=debug,axum::rejection=trace,{}",
            self.log_level
        )
    }

    /// Get the full server address
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn runner_timeout(&self) -> Duration {
        Duration::from_secs(self.runner_timeout_secs)
    }

    /// Parsed list of allowed CORS origins, `None` meaning any origin.
    pub fn cors_origin_list(&self) -> Option<Vec<String>> {
        let origins: Vec<String> = self
            .cors_origins
            .as_deref()?
            .split(',')
            .map(str::trim)
            .filter(|o| !o.is_empty() && *o != "*")
            .map(str::to_string)
            .collect();
        if origins.is_empty() {
            None
        } else {
            Some(origins)
        }
    }

    /// Check if running in development mode
    pub fn is_development(&self) -> bool {
        self.environment.to_lowercase() == "dev" || self.environment.to_lowercase() == "development"
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            environment: default_environment(),
            log_level: default_log_level(),
            cors_origins: None,
            service_name: default_service_name(),
            db_url: None,
            history_limit: default_history_limit(),
            runner_program: default_runner_program(),
            runner_timeout_secs: default_runner_timeout_secs(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Environment variable error: {0}")]
    EnvError(#[from] envy::Error),
}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    4000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_service_name() -> String {
    "colab-code".to_string()
}

fn default_environment() -> String {
    "development".to_string()
}

fn default_history_limit() -> usize {
    100
}

fn default_runner_program() -> String {
    "python".to_string()
}

fn default_runner_timeout_secs() -> u64 {
    10
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_serve_port_4000_with_memory_store() {
        let config = Config::default();
        assert_eq!(config.server_address(), "0.0.0.0:4000");
        assert_eq!(config.history_limit, 100);
        assert_eq!(config.runner_program, "python");
        assert!(config.is_development());
        assert!(config.db_url.is_none());
    }

    #[test]
    fn envy_fills_missing_fields_with_defaults() {
        let vars = vec![
            ("PORT".to_string(), "5050".to_string()),
            ("HISTORY_LIMIT".to_string(), "20".to_string()),
        ];
        let config: Config = envy::from_iter(vars).unwrap();
        assert_eq!(config.port, 5050);
        assert_eq!(config.history_limit, 20);
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.runner_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn cors_origins_are_split_and_wildcard_means_any() {
        let mut config = Config::default();
        assert_eq!(config.cors_origin_list(), None);

        config.cors_origins = Some("*".to_string());
        assert_eq!(config.cors_origin_list(), None);

        config.cors_origins = Some("http://localhost:3000, https://code.example.org".to_string());
        assert_eq!(
            config.cors_origin_list(),
            Some(vec![
                "http://localhost:3000".to_string(),
                "https://code.example.org".to_string()
            ])
        );
    }

    #[test]
    fn log_level_is_the_fallback_filter() {
        let vars = vec![("LOG_LEVEL".to_string(), "warn".to_string())];
        let config: Config = envy::from_iter(vars).unwrap();
        assert_eq!(
            config.log_filter(),
            "colab_code=debug,tower_http=debug,axum::rejection=trace,warn"
        );
        assert!(Config::default().log_filter().ends_with(",info"));
    }
}

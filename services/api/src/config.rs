use avex_core::session::ExecutionContext;
use std::net::SocketAddr;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub log_level: Level,
    /// Gates bulk admin actions (completeAll, resetProgress).
    pub execution: ExecutionContext,
    /// Shared secret for the admin control endpoint. When unset, the
    /// endpoint refuses every request.
    pub admin_token: Option<String>,
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let env_str = std::env::var("AVEX_ENV").unwrap_or_else(|_| "development".to_string());
        let execution = match env_str.to_lowercase().as_str() {
            "production" | "prod" => ExecutionContext::Production,
            "development" | "dev" => ExecutionContext::Development,
            other => {
                return Err(ConfigError::InvalidValue(
                    "AVEX_ENV".to_string(),
                    format!("'{}' is not a known execution context", other),
                ));
            }
        };

        let admin_token = std::env::var("ADMIN_TOKEN").ok().filter(|t| !t.is_empty());

        Ok(Self {
            bind_address,
            log_level,
            execution,
            admin_token,
        })
    }
}

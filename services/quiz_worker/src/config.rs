//! services/quiz_worker/src/config.rs
//!
//! Defines the worker's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub log_level: Level,
    pub openai_api_key: Option<String>,
    pub llm_base_url: Option<String>,
    pub analysis_model: String,
    pub drafting_model: String,
    pub validation_model: String,
    pub llm_requests_per_minute: u32,
    pub max_db_connections: u32,
}

fn var_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parse_positive(name: &str, default: u32) -> Result<u32, ConfigError> {
    let raw = var_or(name, &default.to_string());
    match raw.trim().parse::<u32>() {
        Ok(value) if value > 0 => Ok(value),
        _ => Err(ConfigError::InvalidValue(
            name.to_string(),
            format!("'{raw}' is not a positive integer"),
        )),
    }
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| ConfigError::MissingVar("DATABASE_URL".to_string()))?;

        let log_level_str = var_or("RUST_LOG", "INFO");
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- Provider settings ---
        let openai_api_key = std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty());
        let llm_base_url = std::env::var("LLM_BASE_URL").ok().filter(|u| !u.is_empty());
        let analysis_model = var_or("ANALYSIS_MODEL", "gpt-4o");
        let drafting_model = var_or("DRAFTING_MODEL", "gpt-4o-mini");
        let validation_model = var_or("VALIDATION_MODEL", "gpt-4o-mini");

        // --- Throughput ---
        let llm_requests_per_minute = parse_positive("LLM_REQUESTS_PER_MINUTE", 30)?;
        let max_db_connections = parse_positive("MAX_DB_CONNECTIONS", 5)?;

        Ok(Self {
            database_url,
            log_level,
            openai_api_key,
            llm_base_url,
            analysis_model,
            drafting_model,
            validation_model,
            llm_requests_per_minute,
            max_db_connections,
        })
    }
}

//! Environment configuration
//!
//! Database and model settings are read from the process environment
//! (after `dotenv` has loaded any `.env` file).

use crate::error::{AssistantError, Result};
use std::env;
use std::time::Duration;

/// Temperature for SQL generation: structured, repeatable output.
pub const SQL_TEMPERATURE: f32 = 0.1;

/// Temperature for answer phrasing.
pub const RESPONSE_TEMPERATURE: f32 = 0.3;

/// Variables the assistant needs to run with a real model and database.
pub const REQUIRED_VARIABLES: &[(&str, &str)] = &[
    ("OPENAI_API_KEY", "language model API key"),
    ("DB_HOST", "database server host"),
    ("DB_USER", "database username"),
    ("DB_PASSWORD", "database password"),
    ("DB_NAME", "database name"),
];

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    /// Catalog schema that introspection is restricted to.
    pub schema: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            user: String::new(),
            password: String::new(),
            database: "school_db".to_string(),
            schema: "public".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Empty when no key is configured; every model call then fails and
    /// the deterministic fallbacks answer instead.
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub timeout: Duration,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: "gpt-4".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; `from_env` passes the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let port = match get("DB_PORT") {
            Some(raw) => raw
                .trim()
                .parse::<u16>()
                .map_err(|e| AssistantError::Config(format!("DB_PORT '{}' is not a port: {}", raw, e)))?,
            None => defaults.database.port,
        };

        let timeout = match get("LLM_TIMEOUT_SECS") {
            Some(raw) => Duration::from_secs(raw.trim().parse::<u64>().map_err(|e| {
                AssistantError::Config(format!("LLM_TIMEOUT_SECS '{}' is not a number: {}", raw, e))
            })?),
            None => defaults.llm.timeout,
        };

        Ok(Self {
            database: DatabaseConfig {
                host: get("DB_HOST").unwrap_or(defaults.database.host),
                port,
                user: get("DB_USER").unwrap_or_default(),
                password: get("DB_PASSWORD").unwrap_or_default(),
                database: get("DB_NAME").unwrap_or(defaults.database.database),
                schema: get("DB_SCHEMA").unwrap_or(defaults.database.schema),
            },
            llm: LlmConfig {
                api_key: get("OPENAI_API_KEY").unwrap_or_default(),
                model: get("OPENAI_MODEL").unwrap_or(defaults.llm.model),
                base_url: get("OPENAI_BASE_URL").unwrap_or(defaults.llm.base_url),
                timeout,
            },
        })
    }

    /// Required variables that are unset, formatted as `NAME (description)`.
    pub fn missing_variables() -> Vec<String> {
        missing_from(|key| env::var(key).ok())
    }
}

fn missing_from<F>(lookup: F) -> Vec<String>
where
    F: Fn(&str) -> Option<String>,
{
    REQUIRED_VARIABLES
        .iter()
        .filter(|(key, _)| lookup(*key).map_or(true, |v| v.trim().is_empty()))
        .map(|(key, description)| format!("{} ({})", key, description))
        .collect()
}

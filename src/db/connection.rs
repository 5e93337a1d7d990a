//! Database connection management using sqlx

use crate::config::DatabaseConfig;
use crate::error::{AssistantError, Result};
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{error, info};

pub type DbPool = PgPool;

/// Connection options from discrete settings. Credentials are passed as
/// fields, so special characters in the password need no URL escaping.
pub fn connect_options(config: &DatabaseConfig) -> PgConnectOptions {
    let mut options = PgConnectOptions::new()
        .host(&config.host)
        .port(config.port)
        .database(&config.database);
    if !config.user.is_empty() {
        options = options.username(&config.user);
    }
    if !config.password.is_empty() {
        options = options.password(&config.password);
    }
    options
}

/// Initialize the database connection pool and check it answers.
pub async fn init_pool(config: &DatabaseConfig) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(30))
        .connect_with(connect_options(config))
        .await
        .map_err(|e| {
            error!("Database connection to {}:{}/{} failed: {}", config.host, config.port, config.database, e);
            AssistantError::Connectivity(e.to_string())
        })?;

    // Test the connection
    sqlx::query("SELECT 1")
        .execute(&pool)
        .await
        .map_err(|e| AssistantError::Connectivity(e.to_string()))?;

    info!("Database connection established ({}:{}/{})", config.host, config.port, config.database);
    Ok(pool)
}

//! Database layer for PropIntel
//!
//! Provides:
//! - SeaORM entity models
//! - `QueryHistory`, the store for analysed questions
//! - Connection setup and schema bootstrap

pub mod models;
mod history;

pub use history::{HistoryStats, NewQueryRecord, ProviderSuccessCounts, QueryHistory};
pub use models::QueryRecord;

use crate::config::DatabaseConfig;
use crate::errors::{AppError, Result};
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Schema};
use std::time::Duration;
use tracing::info;

/// Open a connection pool from configuration
pub async fn connect(config: &DatabaseConfig) -> Result<DatabaseConnection> {
    info!(backend = backend_name(&config.url), "Connecting to database...");

    let mut opts = ConnectOptions::new(&config.url);
    opts.max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
        .sqlx_logging(false);

    let conn = Database::connect(opts)
        .await
        .map_err(|e| AppError::DatabaseConnection {
            message: format!("Failed to connect: {}", e),
        })?;

    info!("Database connection established");
    Ok(conn)
}

/// Create the tables if they do not exist yet
pub async fn ensure_schema(conn: &DatabaseConnection) -> Result<()> {
    let backend = conn.get_database_backend();
    let schema = Schema::new(backend);

    let mut create = schema.create_table_from_entity(models::QueryEntity);
    create.if_not_exists();
    conn.execute(backend.build(&create)).await?;

    Ok(())
}

fn backend_name(url: &str) -> &'static str {
    if url.starts_with("postgres") {
        "postgres"
    } else if url.starts_with("sqlite") {
        "sqlite"
    } else {
        "unknown"
    }
}

use anyhow::Context;
use sqlx::{postgres::PgPoolOptions, PgPool};
use tracing::info;

use crate::config::AppConfig;

/// Builds the shared connection pool. Every query borrows a connection for the
/// duration of one statement and hands it back when the future completes or is dropped.
pub async fn connect(config: &AppConfig) -> anyhow::Result<PgPool> {
    let db = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await
        .context("connect to database")?;
    info!(max_connections = config.max_connections, "database pool ready");
    Ok(db)
}

/// Applies the embedded schema migrations.
///
/// The users migration is `CREATE TABLE IF NOT EXISTS`, and sqlx holds an advisory
/// lock while migrating, so several instances may start against the same database.
pub async fn migrate(db: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations")
        .run(db)
        .await
        .context("run database migrations")?;
    info!("database schema up to date");
    Ok(())
}

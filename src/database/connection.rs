use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

use crate::config::DatabaseConfig;
use crate::error::Result;

/// Open a connection pool sized from configuration
pub async fn connect(config: &DatabaseConfig) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.url)
        .await?;

    info!(max_connections = config.max_connections, "Database pool established");
    Ok(pool)
}

/// Round-trip a trivial query
pub async fn health_check(pool: &PgPool) -> Result<bool> {
    let (health,): (i32,) = sqlx::query_as("SELECT 1").fetch_one(pool).await?;
    Ok(health == 1)
}

//! Schema migrations embedded from the `migrations/` directory.

use sqlx::migrate::Migrator;
use sqlx::PgPool;
use tracing::info;

use crate::error::{ReviewError, Result};

pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Apply outstanding migrations; already-applied ones are skipped
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    MIGRATOR
        .run(pool)
        .await
        .map_err(|e| ReviewError::Internal(format!("Migration failed: {e}")))?;
    info!(migrations = MIGRATOR.iter().count(), "Database schema up to date");
    Ok(())
}

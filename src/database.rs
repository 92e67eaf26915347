use std::str::FromStr;

use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{PgPool, Pool, Postgres};

use crate::config::DatabaseSettings;

pub type DatabasePool = Pool<Postgres>;

/// Build the Postgres pool from settings.
///
/// When `pooler_compat` is set the prepared-statement cache is disabled;
/// transaction-mode poolers hand the same server connection to different
/// clients and cached statement names collide.
pub async fn create_pool(settings: &DatabaseSettings) -> anyhow::Result<PgPool> {
    let mut options = PgConnectOptions::from_str(&settings.url)?;
    if settings.pooler_compat {
        options = options.statement_cache_capacity(0);
    }

    let pool = PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .acquire_timeout(settings.acquire_timeout)
        .connect_with(options)
        .await?;

    Ok(pool)
}

/// Round-trip health check; retried once before giving up so a single
/// dropped pooler connection does not fail the task.
pub async fn health_check(pool: &PgPool) -> anyhow::Result<()> {
    for attempt in 0..2 {
        match sqlx::query("SELECT 1").execute(pool).await {
            Ok(_) => return Ok(()),
            Err(e) if attempt == 0 => {
                tracing::warn!("Database health check failed, retrying once: {}", e);
            }
            Err(e) => return Err(e.into()),
        }
    }
    unreachable!()
}

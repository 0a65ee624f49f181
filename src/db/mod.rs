use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};

pub mod queries;
pub mod registrations;
pub mod sent_alerts;

pub use registrations::{PgRegistrationStore, RegistrationStore};
pub use sent_alerts::{DedupStore, PgDedupStore};

pub type DbPool = Pool<Postgres>;

pub async fn init_pool(database_url: &str, max_connections: u32) -> Result<DbPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await?;
    Ok(pool)
}

pub async fn ensure_schema(pool: &DbPool) -> Result<()> {
    for statement in [
        queries::CREATE_ALERT_DEVICES,
        queries::CREATE_ALERT_DEVICES_UPDATED_AT_IDX,
        queries::CREATE_SENT_ALERTS,
        queries::CREATE_SENT_ALERTS_UPDATED_AT_IDX,
    ] {
        sqlx::query(statement)
            .execute(pool)
            .await
            .context("Failed to apply schema")?;
    }
    Ok(())
}

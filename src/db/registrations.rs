use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::types::Json;
use sqlx::FromRow;
use tracing::warn;

use super::{queries, DbPool};
use crate::models::{DeviceRegistration, Location};

/// Device token -> locations mappings.
#[async_trait]
pub trait RegistrationStore: Send + Sync {
    /// Every stored registration, in canonical `locations` form. Rows with no
    /// usable location come back with an empty list.
    async fn load_all(&self) -> Result<Vec<DeviceRegistration>>;

    /// Replaces the device's location list. An empty list unregisters the
    /// device: a stored registration never has zero locations.
    async fn upsert(
        &self,
        token: &str,
        locations: &[Location],
        updated_at: DateTime<Utc>,
    ) -> Result<()>;

    async fn delete_many(&self, tokens: &[String]) -> Result<u64>;

    async fn prune_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64>;
}

#[derive(Debug, FromRow)]
pub struct RegistrationRow {
    pub token: String,
    pub locations: Option<Json<Value>>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub updated_at: DateTime<Utc>,
}

impl RegistrationRow {
    /// Folds the legacy single-point columns into the list form. A list that
    /// fails to parse is treated as absent.
    pub fn into_registration(self) -> DeviceRegistration {
        let listed = match self.locations {
            Some(Json(Value::Null)) | None => None,
            Some(Json(raw)) => match serde_json::from_value::<Vec<Location>>(raw) {
                Ok(list) => Some(list),
                Err(e) => {
                    warn!(
                        "Unreadable locations for device {}: {}",
                        token_prefix(&self.token),
                        e
                    );
                    None
                }
            },
        };

        let locations = match (listed, self.latitude, self.longitude) {
            (Some(list), _, _) if !list.is_empty() => list,
            (_, Some(latitude), Some(longitude)) => vec![Location::new(latitude, longitude)],
            _ => Vec::new(),
        };

        DeviceRegistration {
            token: self.token,
            locations,
            updated_at: self.updated_at,
        }
    }
}

pub fn token_prefix(token: &str) -> &str {
    match token.char_indices().nth(8) {
        Some((idx, _)) => &token[..idx],
        None => token,
    }
}

pub struct PgRegistrationStore {
    pool: DbPool,
}

impl PgRegistrationStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RegistrationStore for PgRegistrationStore {
    async fn load_all(&self) -> Result<Vec<DeviceRegistration>> {
        let rows = sqlx::query_as::<_, RegistrationRow>(queries::SELECT_ALL_DEVICES)
            .fetch_all(&self.pool)
            .await
            .context("Failed to load device registrations")?;

        Ok(rows
            .into_iter()
            .map(RegistrationRow::into_registration)
            .collect())
    }

    async fn upsert(
        &self,
        token: &str,
        locations: &[Location],
        updated_at: DateTime<Utc>,
    ) -> Result<()> {
        if locations.is_empty() {
            self.delete_many(&[token.to_string()]).await?;
            return Ok(());
        }
        sqlx::query(queries::UPSERT_DEVICE)
            .bind(token)
            .bind(Json(locations))
            .bind(updated_at)
            .execute(&self.pool)
            .await
            .context("Failed to upsert device registration")?;
        Ok(())
    }

    async fn delete_many(&self, tokens: &[String]) -> Result<u64> {
        if tokens.is_empty() {
            return Ok(0);
        }
        let result = sqlx::query(queries::DELETE_DEVICES)
            .bind(tokens)
            .execute(&self.pool)
            .await
            .context("Failed to delete device registrations")?;
        Ok(result.rows_affected())
    }

    async fn prune_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(queries::DELETE_DEVICES_UPDATED_BEFORE)
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .context("Failed to prune stale device registrations")?;
        Ok(result.rows_affected())
    }
}

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;

use super::{queries, DbPool};
use crate::models::{Alert, GeoKey};

/// Per-GeoKey record of alert identifiers already delivered.
///
/// Records only ever grow (set union) until pruned by age, so running the
/// same cycle twice never loses or duplicates an identifier.
#[async_trait]
pub trait DedupStore: Send + Sync {
    async fn sent_ids(&self, key: &GeoKey) -> Result<HashSet<String>>;

    /// Unions `alert_ids` into the record for `key` and refreshes its timestamp.
    async fn record_sent(&self, key: &GeoKey, alert_ids: &[String], now: DateTime<Utc>)
        -> Result<()>;

    async fn prune_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64>;

    /// Alerts not yet delivered for `key`, in input order. Repeated ids in
    /// the input are returned once.
    async fn filter_new(&self, key: &GeoKey, alerts: Vec<Alert>) -> Result<Vec<Alert>> {
        let mut seen = self.sent_ids(key).await?;
        Ok(alerts
            .into_iter()
            .filter(|alert| seen.insert(alert.id.clone()))
            .collect())
    }

    async fn mark_sent(&self, key: &GeoKey, alerts: &[Alert], now: DateTime<Utc>) -> Result<()> {
        if alerts.is_empty() {
            return Ok(());
        }
        let ids: Vec<String> = alerts.iter().map(|a| a.id.clone()).collect();
        self.record_sent(key, &ids, now).await
    }
}

pub struct PgDedupStore {
    pool: DbPool,
}

impl PgDedupStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DedupStore for PgDedupStore {
    async fn sent_ids(&self, key: &GeoKey) -> Result<HashSet<String>> {
        let ids: Option<Vec<String>> = sqlx::query_scalar(queries::SELECT_SENT_ALERT_IDS)
            .bind(key.as_str())
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("Failed to read sent alerts for {}", key))?;

        Ok(ids.unwrap_or_default().into_iter().collect())
    }

    async fn record_sent(
        &self,
        key: &GeoKey,
        alert_ids: &[String],
        now: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(queries::UPSERT_SENT_ALERT_IDS)
            .bind(key.as_str())
            .bind(alert_ids)
            .bind(now)
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to mark alerts sent for {}", key))?;
        Ok(())
    }

    async fn prune_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(queries::DELETE_SENT_ALERTS_UPDATED_BEFORE)
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .context("Failed to prune stale sent alert records")?;
        Ok(result.rows_affected())
    }
}

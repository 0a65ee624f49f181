use chrono::{DateTime, Utc};
use tracing::{error, info};

use super::AlertContext;
use crate::config::PruneSettings;

#[derive(Debug, Default, Clone, PartialEq)]
pub struct PruneSummary {
    pub registrations_removed: u64,
    pub sent_alerts_removed: u64,
    pub failures: usize,
}

/// Drops registrations and dedup records that have not been touched within
/// their retention windows. The two deletions are independent: one failing
/// does not stop the other.
pub async fn run_prune_pass(
    ctx: &AlertContext,
    settings: &PruneSettings,
    now: DateTime<Utc>,
) -> PruneSummary {
    let mut summary = PruneSummary::default();

    let registration_cutoff = now - settings.registration_max_age;
    match ctx.registrations.prune_older_than(registration_cutoff).await {
        Ok(removed) => {
            summary.registrations_removed = removed;
            if removed > 0 {
                info!("Cleaned up {} stale device(s)", removed);
            }
        }
        Err(e) => {
            summary.failures += 1;
            error!("Failed to prune stale devices: {:#}", e);
        }
    }

    let sent_cutoff = now - settings.sent_alert_max_age;
    match ctx.sent_alerts.prune_older_than(sent_cutoff).await {
        Ok(removed) => {
            summary.sent_alerts_removed = removed;
            if removed > 0 {
                info!("Cleaned up {} stale sent alert record(s)", removed);
            }
        }
        Err(e) => {
            summary.failures += 1;
            error!("Failed to prune sent alert records: {:#}", e);
        }
    }

    summary
}

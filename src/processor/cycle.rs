use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use tracing::{debug, error, info, warn};

use super::aggregator::{group_by_geo_key, LocationGroup};
use super::dispatch::dispatch_all;
use super::resolver::DeliveryAccumulator;
use super::AlertContext;
use crate::models::GeoKey;

#[derive(Debug, Default, Clone, PartialEq)]
pub struct CycleSummary {
    pub devices: usize,
    pub geo_keys: usize,
    pub keys_failed: usize,
    pub new_alerts: usize,
    pub targets: usize,
    pub delivered: usize,
    pub transient_failures: usize,
    pub auth_failures: usize,
    pub invalid_tokens: usize,
    pub tokens_removed: u64,
}

#[derive(Debug, Default)]
struct KeyOutcome {
    accumulator: DeliveryAccumulator,
    new_alerts: usize,
}

/// Fetch, filter and mark for one cell. Alerts are recorded as sent before
/// anyone is notified, so a failed push is never repeated on a later cycle.
async fn process_key(
    ctx: &AlertContext,
    key: &GeoKey,
    group: &LocationGroup,
    now: DateTime<Utc>,
) -> Result<KeyOutcome> {
    let fetch = ctx.source.fetch(group.latitude, group.longitude);
    let alerts = match tokio::time::timeout(ctx.settings.fetch_timeout, fetch).await {
        Ok(alerts) => alerts,
        Err(_) => {
            warn!("Alert fetch for {} timed out", key);
            Vec::new()
        }
    };
    if alerts.is_empty() {
        return Ok(KeyOutcome::default());
    }

    let fresh = ctx
        .sent_alerts
        .filter_new(key, alerts)
        .await
        .context("dedup filter failed")?;
    if fresh.is_empty() {
        debug!("No new alerts for {}", key);
        return Ok(KeyOutcome::default());
    }

    ctx.sent_alerts
        .mark_sent(key, &fresh, now)
        .await
        .context("marking alerts sent failed")?;

    let mut accumulator = DeliveryAccumulator::default();
    for token in &group.tokens {
        for alert in &fresh {
            accumulator.offer(token, alert, key);
        }
    }

    info!(
        geo_key = %key,
        new_alerts = fresh.len(),
        devices = group.tokens.len(),
        "New alerts for location"
    );

    Ok(KeyOutcome {
        accumulator,
        new_alerts: fresh.len(),
    })
}

/// Runs one alert-dispatch cycle.
///
/// Only a failure to load registrations fails the cycle. Per-key failures
/// skip that key; delivery and cleanup failures are logged and counted.
pub async fn run_alert_cycle(ctx: &AlertContext, now: DateTime<Utc>) -> Result<CycleSummary> {
    let registrations = ctx
        .registrations
        .load_all()
        .await
        .context("Failed to load registrations")?;
    let groups = group_by_geo_key(&registrations);

    let mut summary = CycleSummary {
        devices: registrations.len(),
        geo_keys: groups.len(),
        ..CycleSummary::default()
    };
    if groups.is_empty() {
        debug!("No registered locations, nothing to check");
        return Ok(summary);
    }

    let results: Vec<(GeoKey, Result<KeyOutcome>)> = stream::iter(groups)
        .map(|(key, group)| async move {
            let result = process_key(ctx, &key, &group, now).await;
            (key, result)
        })
        .buffer_unordered(ctx.settings.max_concurrent_fetches.max(1))
        .collect()
        .await;

    let mut accumulator = DeliveryAccumulator::default();
    for (key, result) in results {
        match result {
            Ok(outcome) => {
                summary.new_alerts += outcome.new_alerts;
                accumulator.merge(outcome.accumulator);
            }
            Err(e) => {
                summary.keys_failed += 1;
                error!("Skipping location {}: {:#}", key, e);
            }
        }
    }

    debug!("{} device(s) with a pending alert", accumulator.device_count());
    let targets = accumulator.resolve();
    summary.targets = targets.len();
    if targets.is_empty() {
        return Ok(summary);
    }

    let report = dispatch_all(
        ctx.transport.as_ref(),
        targets,
        ctx.settings.max_concurrent_sends,
        ctx.settings.push_timeout,
    )
    .await;
    summary.delivered = report.delivered;
    summary.transient_failures = report.transient_failures;
    summary.auth_failures = report.auth_failures;
    summary.invalid_tokens = report.invalid_tokens.len();

    if !report.invalid_tokens.is_empty() {
        match ctx.registrations.delete_many(&report.invalid_tokens).await {
            Ok(removed) => {
                summary.tokens_removed = removed;
                info!("Removed {} invalid device token(s)", removed);
            }
            Err(e) => {
                error!(
                    "Failed to remove {} invalid device token(s): {:#}",
                    report.invalid_tokens.len(),
                    e
                );
            }
        }
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CycleSettings;
    use crate::models::alert::test_alert;
    use crate::models::{Alert, Severity};
    use crate::push::DeliveryOutcome;
    use crate::testing::{
        MemoryDedupStore, MemoryRegistrationStore, RecordingTransport, StaticAlertSource,
    };
    use std::sync::Arc;

    struct Harness {
        registrations: Arc<MemoryRegistrationStore>,
        sent_alerts: Arc<MemoryDedupStore>,
        source: Arc<StaticAlertSource>,
        transport: Arc<RecordingTransport>,
        ctx: AlertContext,
    }

    fn harness(
        registrations: MemoryRegistrationStore,
        source: StaticAlertSource,
        transport: RecordingTransport,
    ) -> Harness {
        let registrations = Arc::new(registrations);
        let sent_alerts = Arc::new(MemoryDedupStore::default());
        let source = Arc::new(source);
        let transport = Arc::new(transport);
        let ctx = AlertContext {
            registrations: registrations.clone(),
            sent_alerts: sent_alerts.clone(),
            source: source.clone(),
            transport: transport.clone(),
            settings: CycleSettings::default(),
        };
        Harness {
            registrations,
            sent_alerts,
            source,
            transport,
            ctx,
        }
    }

    fn alert(id: &str, severity: Severity, event: &str) -> Alert {
        let mut alert = test_alert(id, severity);
        alert.event = event.to_string();
        alert
    }

    #[tokio::test]
    async fn test_device_with_two_alerting_locations_gets_one_push() {
        let registrations = MemoryRegistrationStore::default();
        registrations.insert("dev", &[(34.0500, -118.2500), (34.0522, -118.2437)], Utc::now());

        let source = StaticAlertSource::default()
            .with_alerts(34.05, -118.25, vec![alert("heat", Severity::Moderate, "Heat Advisory")])
            .with_alerts(
                34.05,
                -118.24,
                vec![
                    alert("heat", Severity::Moderate, "Heat Advisory"),
                    alert("fire", Severity::Extreme, "Red Flag Warning"),
                ],
            );

        let h = harness(registrations, source, RecordingTransport::default());
        let summary = run_alert_cycle(&h.ctx, Utc::now()).await.unwrap();

        assert_eq!(summary.targets, 1);
        assert_eq!(summary.delivered, 1);
        let pushes = h.transport.sent_to("dev");
        assert_eq!(pushes.len(), 1);
        assert_eq!(pushes[0].title, "Red Flag Warning");
        assert_eq!(pushes[0].data["alertId"], "fire");
        assert_eq!(pushes[0].data["geoKey"], "34.05,-118.24");
    }

    #[tokio::test]
    async fn test_nearby_devices_share_one_fetch() {
        let registrations = MemoryRegistrationStore::default();
        registrations.insert("a", &[(34.0512, -118.2549)], Utc::now());
        registrations.insert("b", &[(34.0460, -118.2451)], Utc::now());

        let source = StaticAlertSource::default().with_alerts(
            34.05,
            -118.25,
            vec![alert("wind", Severity::Severe, "High Wind Warning")],
        );

        let h = harness(registrations, source, RecordingTransport::default());
        let summary = run_alert_cycle(&h.ctx, Utc::now()).await.unwrap();

        assert_eq!(h.source.fetch_count(), 1);
        assert_eq!(summary.geo_keys, 1);
        assert_eq!(summary.delivered, 2);
        assert_eq!(h.transport.sent_to("a").len(), 1);
        assert_eq!(h.transport.sent_to("b").len(), 1);
    }

    #[tokio::test]
    async fn test_unchanged_alert_is_pushed_once_across_cycles() {
        let registrations = MemoryRegistrationStore::default();
        registrations.insert("dev", &[(47.61, -122.33)], Utc::now());
        let source = StaticAlertSource::default().with_alerts(
            47.61,
            -122.33,
            vec![alert("flood", Severity::Severe, "Flood Warning")],
        );

        let h = harness(registrations, source, RecordingTransport::default());

        let first = run_alert_cycle(&h.ctx, Utc::now()).await.unwrap();
        assert_eq!(first.delivered, 1);

        let second = run_alert_cycle(&h.ctx, Utc::now()).await.unwrap();
        assert_eq!(second.new_alerts, 0);
        assert_eq!(second.delivered, 0);
        assert_eq!(h.transport.sent_count(), 1);
    }

    #[tokio::test]
    async fn test_invalid_token_is_removed_after_cycle() {
        let registrations = MemoryRegistrationStore::default();
        registrations.insert("X", &[(47.61, -122.33)], Utc::now());
        registrations.insert("Y", &[(47.61, -122.33)], Utc::now());
        let source = StaticAlertSource::default().with_alerts(
            47.61,
            -122.33,
            vec![alert("flood", Severity::Severe, "Flood Warning")],
        );
        let transport = RecordingTransport::default().with_outcome("X", DeliveryOutcome::InvalidToken);

        let h = harness(registrations, source, transport);
        let summary = run_alert_cycle(&h.ctx, Utc::now()).await.unwrap();

        assert_eq!(summary.invalid_tokens, 1);
        assert_eq!(summary.tokens_removed, 1);
        assert!(!h.registrations.contains("X"));
        assert!(h.registrations.contains("Y"));
    }

    #[tokio::test]
    async fn test_transient_failure_is_not_retried_next_cycle() {
        let registrations = MemoryRegistrationStore::default();
        registrations.insert("dev", &[(47.61, -122.33)], Utc::now());
        let source = StaticAlertSource::default().with_alerts(
            47.61,
            -122.33,
            vec![alert("flood", Severity::Severe, "Flood Warning")],
        );
        let transport = RecordingTransport::default()
            .with_outcome("dev", DeliveryOutcome::TransientFailure("503".to_string()));

        let h = harness(registrations, source, transport);
        let first = run_alert_cycle(&h.ctx, Utc::now()).await.unwrap();
        assert_eq!(first.transient_failures, 1);
        assert!(h.registrations.contains("dev"));

        run_alert_cycle(&h.ctx, Utc::now()).await.unwrap();
        assert_eq!(h.transport.sent_count(), 1);
    }

    #[tokio::test]
    async fn test_credential_rejection_is_counted_and_keeps_the_device() {
        let registrations = MemoryRegistrationStore::default();
        registrations.insert("dev", &[(47.61, -122.33)], Utc::now());
        let source = StaticAlertSource::default().with_alerts(
            47.61,
            -122.33,
            vec![alert("flood", Severity::Severe, "Flood Warning")],
        );
        let transport = RecordingTransport::default()
            .with_outcome("dev", DeliveryOutcome::AuthFailure("401 UNAUTHENTICATED".to_string()));

        let h = harness(registrations, source, transport);
        let summary = run_alert_cycle(&h.ctx, Utc::now()).await.unwrap();

        assert_eq!(summary.auth_failures, 1);
        assert_eq!(summary.transient_failures, 0);
        assert_eq!(summary.invalid_tokens, 0);
        assert!(h.registrations.contains("dev"));
    }

    #[tokio::test]
    async fn test_failing_key_does_not_block_other_devices() {
        let registrations = MemoryRegistrationStore::default();
        registrations.insert("broken", &[(47.61, -122.33)], Utc::now());
        registrations.insert("fine", &[(25.76, -80.19)], Utc::now());
        let source = StaticAlertSource::default()
            .with_alerts(47.61, -122.33, vec![alert("flood", Severity::Severe, "Flood Warning")])
            .with_alerts(25.76, -80.19, vec![alert("storm", Severity::Extreme, "Hurricane Warning")]);

        let h = harness(registrations, source, RecordingTransport::default());
        h.sent_alerts
            .fail_reads_for(&GeoKey::from_coordinates(47.61, -122.33).unwrap());

        let summary = run_alert_cycle(&h.ctx, Utc::now()).await.unwrap();
        assert_eq!(summary.keys_failed, 1);
        assert!(h.transport.sent_to("broken").is_empty());
        assert_eq!(h.transport.sent_to("fine").len(), 1);
    }

    #[tokio::test]
    async fn test_unmarked_alerts_are_not_delivered() {
        let registrations = MemoryRegistrationStore::default();
        registrations.insert("dev", &[(47.61, -122.33)], Utc::now());
        let source = StaticAlertSource::default().with_alerts(
            47.61,
            -122.33,
            vec![alert("flood", Severity::Severe, "Flood Warning")],
        );

        let h = harness(registrations, source, RecordingTransport::default());
        let key = GeoKey::from_coordinates(47.61, -122.33).unwrap();
        h.sent_alerts.fail_writes_for(&key);

        let summary = run_alert_cycle(&h.ctx, Utc::now()).await.unwrap();
        assert_eq!(summary.keys_failed, 1);
        assert_eq!(h.transport.sent_count(), 0);
        assert!(!h.sent_alerts.has_record(&key));
    }

    #[tokio::test]
    async fn test_failed_token_cleanup_does_not_fail_cycle() {
        let registrations = MemoryRegistrationStore::failing_writes();
        registrations.insert("X", &[(47.61, -122.33)], Utc::now());
        let source = StaticAlertSource::default().with_alerts(
            47.61,
            -122.33,
            vec![alert("flood", Severity::Severe, "Flood Warning")],
        );
        let transport = RecordingTransport::default().with_outcome("X", DeliveryOutcome::InvalidToken);

        let h = harness(registrations, source, transport);
        let summary = run_alert_cycle(&h.ctx, Utc::now()).await.unwrap();
        assert_eq!(summary.invalid_tokens, 1);
        assert_eq!(summary.tokens_removed, 0);
    }

    #[tokio::test]
    async fn test_registration_load_failure_fails_the_cycle() {
        let h = harness(
            MemoryRegistrationStore::failing_loads(),
            StaticAlertSource::default(),
            RecordingTransport::default(),
        );
        assert!(run_alert_cycle(&h.ctx, Utc::now()).await.is_err());
        assert_eq!(h.source.fetch_count(), 0);
    }

    #[tokio::test]
    async fn test_empty_registry_is_a_no_op() {
        let h = harness(
            MemoryRegistrationStore::default(),
            StaticAlertSource::default(),
            RecordingTransport::default(),
        );
        let summary = run_alert_cycle(&h.ctx, Utc::now()).await.unwrap();
        assert_eq!(summary, CycleSummary::default());
    }
}

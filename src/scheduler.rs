use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::{PruneSettings, ScheduleSettings};
use crate::processor::cycle::run_alert_cycle;
use crate::processor::prune::run_prune_pass;
use crate::processor::AlertContext;

/// Counts consecutive failed cycles and trips after `max_failures`.
#[derive(Debug)]
struct CircuitBreaker {
    consecutive_failures: u32,
    max_failures: u32,
    cooldown: Duration,
}

impl CircuitBreaker {
    fn new(max_failures: u32, cooldown: Duration) -> Self {
        Self {
            consecutive_failures: 0,
            max_failures,
            cooldown,
        }
    }

    fn record_success(&mut self) {
        self.consecutive_failures = 0;
    }

    /// Returns the cooldown to sleep when this failure trips the breaker.
    fn record_failure(&mut self) -> Option<Duration> {
        self.consecutive_failures += 1;
        if self.consecutive_failures >= self.max_failures {
            self.consecutive_failures = 0;
            Some(self.cooldown)
        } else {
            None
        }
    }
}

/// Runs the alert cycle on a fixed interval. A cycle that overruns the
/// interval delays the next tick instead of overlapping with it.
pub async fn run_alert_schedule(ctx: Arc<AlertContext>, settings: ScheduleSettings) {
    info!(
        "Alert checks every {}s (circuit breaker after {} failures, {}s cooldown)",
        settings.alert_interval.as_secs(),
        settings.max_failures,
        settings.cooldown.as_secs()
    );

    let mut ticker = interval(settings.alert_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut breaker = CircuitBreaker::new(settings.max_failures, settings.cooldown);

    loop {
        ticker.tick().await;

        let span = info_span!("alert_cycle", cycle_id = %Uuid::new_v4());
        let result = run_alert_cycle(&ctx, Utc::now()).instrument(span).await;

        match result {
            Ok(summary) => {
                breaker.record_success();
                info!(
                    devices = summary.devices,
                    geo_keys = summary.geo_keys,
                    keys_failed = summary.keys_failed,
                    new_alerts = summary.new_alerts,
                    delivered = summary.delivered,
                    transient_failures = summary.transient_failures,
                    auth_failures = summary.auth_failures,
                    tokens_removed = summary.tokens_removed,
                    "Alert cycle complete"
                );
            }
            Err(e) => {
                error!(
                    "Alert cycle failed: {:#}. Failure count ({} / {})",
                    e,
                    breaker.consecutive_failures + 1,
                    breaker.max_failures
                );
                if let Some(cooldown) = breaker.record_failure() {
                    warn!(
                        "Circuit breaker tripped! Sleeping for {} seconds...",
                        cooldown.as_secs()
                    );
                    tokio::time::sleep(cooldown).await;
                    ticker.reset();
                    info!("Circuit breaker reset. Resuming alert checks.");
                }
            }
        }
    }
}

pub async fn run_prune_schedule(
    ctx: Arc<AlertContext>,
    every: Duration,
    settings: PruneSettings,
) {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let summary = run_prune_pass(&ctx, &settings, Utc::now()).await;
        info!(
            registrations_removed = summary.registrations_removed,
            sent_alerts_removed = summary.sent_alerts_removed,
            failures = summary.failures,
            "Prune pass complete"
        );
    }
}

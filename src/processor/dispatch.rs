use futures::stream::{self, StreamExt};
use std::time::Duration;
use tracing::{debug, error, warn};

use super::resolver::DeliveryTarget;
use crate::db::registrations::token_prefix;
use crate::push::{DeliveryOutcome, PushMessage, PushTransport};

#[derive(Debug, Default, Clone, PartialEq)]
pub struct DispatchReport {
    pub delivered: usize,
    pub invalid_tokens: Vec<String>,
    pub transient_failures: usize,
    pub auth_failures: usize,
}

/// Sends one push per target with at most `max_concurrent` requests in
/// flight. A send that exceeds `timeout` counts as a transient failure.
/// Nothing is retried.
pub async fn dispatch_all(
    transport: &dyn PushTransport,
    targets: Vec<DeliveryTarget>,
    max_concurrent: usize,
    timeout: Duration,
) -> DispatchReport {
    let outcomes: Vec<(String, DeliveryOutcome)> = stream::iter(targets)
        .map(|target| async move {
            let message = PushMessage::for_alert(&target.alert, &target.geo_key);
            let outcome = match tokio::time::timeout(timeout, transport.send(&target.token, &message)).await {
                Ok(outcome) => outcome,
                Err(_) => DeliveryOutcome::TransientFailure(format!(
                    "send timed out after {}ms",
                    timeout.as_millis()
                )),
            };
            (target.token, outcome)
        })
        .buffer_unordered(max_concurrent.max(1))
        .collect()
        .await;

    let mut report = DispatchReport::default();
    let mut auth_reason = None;
    for (token, outcome) in outcomes {
        match outcome {
            DeliveryOutcome::Delivered => {
                report.delivered += 1;
            }
            DeliveryOutcome::InvalidToken => {
                debug!("Token {} rejected as invalid", token_prefix(&token));
                report.invalid_tokens.push(token);
            }
            DeliveryOutcome::TransientFailure(reason) => {
                warn!("Push to {} failed: {}", token_prefix(&token), reason);
                report.transient_failures += 1;
            }
            DeliveryOutcome::AuthFailure(reason) => {
                report.auth_failures += 1;
                auth_reason = Some(reason);
            }
        }
    }
    if let Some(reason) = auth_reason {
        error!(
            "{} push(es) refused due to FCM credentials: {}",
            report.auth_failures, reason
        );
    }
    report.invalid_tokens.sort();
    report
}

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use crate::models::{Alert, GeoKey};

#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryTarget {
    pub token: String,
    pub alert: Alert,
    pub geo_key: GeoKey,
}

#[derive(Debug, Default)]
struct DeviceCandidates {
    considered: HashSet<String>,
    best: Option<(Alert, GeoKey)>,
}

impl DeviceCandidates {
    fn offer(&mut self, alert: &Alert, key: &GeoKey) {
        if !self.considered.insert(alert.id.clone()) {
            // Same alert seen from another cell: keep the smaller key so the
            // reported cell does not depend on processing order.
            if let Some((best, best_key)) = &mut self.best {
                if best.id == alert.id && key.as_str() < best_key.as_str() {
                    *best_key = key.clone();
                }
            }
            return;
        }
        self.replace_if_better(alert, key);
    }

    fn replace_if_better(&mut self, alert: &Alert, key: &GeoKey) {
        let better = match &self.best {
            None => true,
            Some((best, best_key)) => match alert.priority_cmp(best) {
                Ordering::Less => true,
                Ordering::Equal => key.as_str() < best_key.as_str(),
                Ordering::Greater => false,
            },
        };
        if better {
            self.best = Some((alert.clone(), key.clone()));
        }
    }
}

/// Per-cycle reduction from (token, new alert) pairs to one target per
/// device.
///
/// Each GeoKey can fill its own accumulator; `merge` combines them. The
/// winner is the minimum under [`Alert::priority_cmp`], a total order, so the
/// result is the same for any processing or merge order.
#[derive(Debug, Default)]
pub struct DeliveryAccumulator {
    devices: HashMap<String, DeviceCandidates>,
}

impl DeliveryAccumulator {
    pub fn offer(&mut self, token: &str, alert: &Alert, key: &GeoKey) {
        self.devices
            .entry(token.to_string())
            .or_default()
            .offer(alert, key);
    }

    pub fn merge(&mut self, other: DeliveryAccumulator) {
        for (token, incoming) in other.devices {
            let entry = self.devices.entry(token).or_default();
            if let Some((alert, key)) = &incoming.best {
                entry.offer(alert, key);
            }
            entry.considered.extend(incoming.considered);
        }
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    pub fn resolve(self) -> Vec<DeliveryTarget> {
        let mut targets: Vec<DeliveryTarget> = self
            .devices
            .into_iter()
            .filter_map(|(token, candidates)| {
                candidates.best.map(|(alert, geo_key)| DeliveryTarget {
                    token,
                    alert,
                    geo_key,
                })
            })
            .collect();
        targets.sort_by(|a, b| a.token.cmp(&b.token));
        targets
    }
}

//! In-memory stand-ins for the store, feed and transport.

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use crate::alert_source::AlertSource;
use crate::db::{DedupStore, RegistrationStore};
use crate::models::{Alert, DeviceRegistration, GeoKey, Location};
use crate::push::{DeliveryOutcome, PushMessage, PushTransport};

#[derive(Default)]
pub struct MemoryRegistrationStore {
    records: Mutex<HashMap<String, DeviceRegistration>>,
    fail_loads: bool,
    fail_writes: bool,
}

impl MemoryRegistrationStore {
    pub fn failing_loads() -> Self {
        Self {
            fail_loads: true,
            ..Self::default()
        }
    }

    pub fn failing_writes() -> Self {
        Self {
            fail_writes: true,
            ..Self::default()
        }
    }

    pub fn insert(&self, token: &str, points: &[(f64, f64)], updated_at: DateTime<Utc>) {
        let registration = DeviceRegistration {
            token: token.to_string(),
            locations: points
                .iter()
                .map(|&(lat, lon)| Location::new(lat, lon))
                .collect(),
            updated_at,
        };
        self.records
            .lock()
            .unwrap()
            .insert(token.to_string(), registration);
    }

    pub fn get(&self, token: &str) -> Option<DeviceRegistration> {
        self.records.lock().unwrap().get(token).cloned()
    }

    pub fn contains(&self, token: &str) -> bool {
        self.records.lock().unwrap().contains_key(token)
    }
}

#[async_trait]
impl RegistrationStore for MemoryRegistrationStore {
    async fn load_all(&self) -> Result<Vec<DeviceRegistration>> {
        if self.fail_loads {
            bail!("registration store unavailable");
        }
        Ok(self.records.lock().unwrap().values().cloned().collect())
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
        self.records.lock().unwrap().insert(
            token.to_string(),
            DeviceRegistration {
                token: token.to_string(),
                locations: locations.to_vec(),
                updated_at,
            },
        );
        Ok(())
    }

    async fn delete_many(&self, tokens: &[String]) -> Result<u64> {
        if self.fail_writes {
            bail!("batch delete rejected");
        }
        let mut records = self.records.lock().unwrap();
        Ok(tokens
            .iter()
            .filter(|token| records.remove(token.as_str()).is_some())
            .count() as u64)
    }

    async fn prune_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        if self.fail_writes {
            bail!("range delete rejected");
        }
        let mut records = self.records.lock().unwrap();
        let before = records.len();
        records.retain(|_, r| r.updated_at >= cutoff);
        Ok((before - records.len()) as u64)
    }
}

/// Keeps ids as a list with union-on-write so tests can see duplicate growth.
#[derive(Default)]
pub struct MemoryDedupStore {
    records: Mutex<HashMap<String, (Vec<String>, DateTime<Utc>)>>,
    failing_reads: Mutex<HashSet<String>>,
    failing_writes: Mutex<HashSet<String>>,
}

impl MemoryDedupStore {
    pub fn fail_reads_for(&self, key: &GeoKey) {
        self.failing_reads.lock().unwrap().insert(key.to_string());
    }

    pub fn fail_writes_for(&self, key: &GeoKey) {
        self.failing_writes.lock().unwrap().insert(key.to_string());
    }

    pub fn stored_len(&self, key: &GeoKey) -> usize {
        self.records
            .lock()
            .unwrap()
            .get(key.as_str())
            .map(|(ids, _)| ids.len())
            .unwrap_or(0)
    }

    pub fn has_record(&self, key: &GeoKey) -> bool {
        self.records.lock().unwrap().contains_key(key.as_str())
    }

    pub fn set_updated_at(&self, key: &GeoKey, updated_at: DateTime<Utc>) {
        if let Some(record) = self.records.lock().unwrap().get_mut(key.as_str()) {
            record.1 = updated_at;
        }
    }
}

#[async_trait]
impl DedupStore for MemoryDedupStore {
    async fn sent_ids(&self, key: &GeoKey) -> Result<HashSet<String>> {
        if self.failing_reads.lock().unwrap().contains(key.as_str()) {
            bail!("read failed for {}", key);
        }
        Ok(self
            .records
            .lock()
            .unwrap()
            .get(key.as_str())
            .map(|(ids, _)| ids.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn record_sent(
        &self,
        key: &GeoKey,
        alert_ids: &[String],
        now: DateTime<Utc>,
    ) -> Result<()> {
        if self.failing_writes.lock().unwrap().contains(key.as_str()) {
            bail!("write failed for {}", key);
        }
        let mut records = self.records.lock().unwrap();
        let record = records
            .entry(key.to_string())
            .or_insert_with(|| (Vec::new(), now));
        for id in alert_ids {
            if !record.0.contains(id) {
                record.0.push(id.clone());
            }
        }
        record.1 = now;
        Ok(())
    }

    async fn prune_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut records = self.records.lock().unwrap();
        let before = records.len();
        records.retain(|_, (_, updated_at)| *updated_at >= cutoff);
        Ok((before - records.len()) as u64)
    }
}

#[derive(Default)]
pub struct StaticAlertSource {
    alerts: HashMap<String, Vec<Alert>>,
    calls: Mutex<Vec<String>>,
}

impl StaticAlertSource {
    pub fn with_alerts(mut self, latitude: f64, longitude: f64, alerts: Vec<Alert>) -> Self {
        if let Some(key) = GeoKey::from_coordinates(latitude, longitude) {
            self.alerts.insert(key.to_string(), alerts);
        }
        self
    }

    pub fn fetch_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl AlertSource for StaticAlertSource {
    async fn fetch(&self, latitude: f64, longitude: f64) -> Vec<Alert> {
        let Some(key) = GeoKey::from_coordinates(latitude, longitude) else {
            return Vec::new();
        };
        self.calls.lock().unwrap().push(key.to_string());
        self.alerts.get(key.as_str()).cloned().unwrap_or_default()
    }
}

#[derive(Default)]
pub struct RecordingTransport {
    outcomes: HashMap<String, DeliveryOutcome>,
    sent: Mutex<Vec<(String, PushMessage)>>,
}

impl RecordingTransport {
    pub fn with_outcome(mut self, token: &str, outcome: DeliveryOutcome) -> Self {
        self.outcomes.insert(token.to_string(), outcome);
        self
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    pub fn sent_to(&self, token: &str) -> Vec<PushMessage> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(t, _)| t == token)
            .map(|(_, m)| m.clone())
            .collect()
    }
}

#[async_trait]
impl PushTransport for RecordingTransport {
    async fn send(&self, token: &str, message: &PushMessage) -> DeliveryOutcome {
        self.sent
            .lock()
            .unwrap()
            .push((token.to_string(), message.clone()));
        self.outcomes
            .get(token)
            .cloned()
            .unwrap_or(DeliveryOutcome::Delivered)
    }
}

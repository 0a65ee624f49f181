//! Active weather alerts from the National Weather Service feed.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{ACCEPT, USER_AGENT};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

use crate::models::{Alert, Severity};

/// Source of active alerts for a point.
///
/// Implementations never fail: any upstream problem reads as "no alerts
/// here" so one bad point cannot stall the rest of the cycle.
#[async_trait]
pub trait AlertSource: Send + Sync {
    async fn fetch(&self, latitude: f64, longitude: f64) -> Vec<Alert>;
}

/// Only the feature list is parsed up front. Each feature is read field by
/// field so a mistyped entry cannot hide its siblings.
#[derive(Debug, Deserialize)]
struct FeatureCollection {
    #[serde(default)]
    features: Option<Vec<Value>>,
}

fn text<'a>(object: Option<&'a Value>, field: &str) -> Option<&'a str> {
    object?.get(field)?.as_str()
}

fn parse_timestamp(raw: Option<&str>) -> Option<DateTime<Utc>> {
    let raw = raw?.trim();
    match DateTime::parse_from_rfc3339(raw) {
        Ok(t) => Some(t.with_timezone(&Utc)),
        Err(_) => {
            debug!("Ignoring unparseable alert timestamp '{}'", raw);
            None
        }
    }
}

fn parse_feature(feature: &Value, now: DateTime<Utc>) -> Option<Alert> {
    let props = feature.get("properties").filter(|p| p.is_object());
    let id = text(props, "id")
        .or_else(|| text(Some(feature), "id"))
        .filter(|id| !id.trim().is_empty())?;
    let owned = |field: &str| text(props, field).unwrap_or_default().to_string();

    let alert = Alert {
        id: id.to_string(),
        event: text(props, "event").unwrap_or("Weather Alert").to_string(),
        severity: text(props, "severity")
            .map(Severity::parse)
            .unwrap_or(Severity::Unknown),
        headline: owned("headline"),
        description: owned("description"),
        instruction: owned("instruction"),
        area_desc: owned("areaDesc"),
        sender_name: owned("senderName"),
        effective: parse_timestamp(text(props, "effective")),
        expires: parse_timestamp(text(props, "expires")),
    };

    if alert.is_expired_at(now) {
        None
    } else {
        Some(alert)
    }
}

fn normalize(collection: FeatureCollection, now: DateTime<Utc>) -> Vec<Alert> {
    collection
        .features
        .unwrap_or_default()
        .iter()
        .filter_map(|feature| parse_feature(feature, now))
        .collect()
}

pub struct NwsAlertSource {
    client: reqwest::Client,
    base_url: String,
    user_agent: String,
}

impl NwsAlertSource {
    pub fn new(base_url: &str, user_agent: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            user_agent: user_agent.to_string(),
        })
    }

    async fn request(&self, latitude: f64, longitude: f64) -> reqwest::Result<FeatureCollection> {
        let url = format!("{}?point={},{}", self.base_url, latitude, longitude);
        self.client
            .get(url)
            .header(USER_AGENT, &self.user_agent)
            .header(ACCEPT, "application/geo+json")
            .send()
            .await?
            .error_for_status()?
            .json::<FeatureCollection>()
            .await
    }
}

#[async_trait]
impl AlertSource for NwsAlertSource {
    async fn fetch(&self, latitude: f64, longitude: f64) -> Vec<Alert> {
        match self.request(latitude, longitude).await {
            Ok(collection) => normalize(collection, Utc::now()),
            Err(e) => {
                warn!("Alert fetch failed for {},{}: {}", latitude, longitude, e);
                Vec::new()
            }
        }
    }
}

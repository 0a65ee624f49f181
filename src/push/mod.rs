//! Push delivery.

pub mod auth;
pub mod fcm;

use async_trait::async_trait;
use std::collections::BTreeMap;

use crate::models::{Alert, GeoKey};

pub use fcm::{FcmSettings, FcmTransport};

#[derive(Debug, Clone, PartialEq)]
pub struct PushMessage {
    pub title: String,
    pub body: String,
    pub data: BTreeMap<String, String>,
}

impl PushMessage {
    pub fn for_alert(alert: &Alert, geo_key: &GeoKey) -> Self {
        let mut data = BTreeMap::new();
        data.insert("alertId".to_string(), alert.id.clone());
        data.insert("severity".to_string(), alert.severity.to_string());
        data.insert("event".to_string(), alert.event.clone());
        data.insert("geoKey".to_string(), geo_key.to_string());

        Self {
            title: alert.event.clone(),
            body: alert.body(),
            data,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    /// The transport no longer recognizes the token; drop the registration.
    InvalidToken,
    TransientFailure(String),
    /// The transport refused our credentials. Says nothing about the token.
    AuthFailure(String),
}

#[async_trait]
pub trait PushTransport: Send + Sync {
    async fn send(&self, token: &str, message: &PushMessage) -> DeliveryOutcome;
}

//! Firebase Cloud Messaging HTTP v1 transport.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

use super::auth::{AccessTokenProvider, FcmCredentials, ServiceAccountKey};
use super::{DeliveryOutcome, PushMessage, PushTransport};
use crate::config::AppConfig;
use crate::db::registrations::token_prefix;
use crate::error::TransportError;

#[derive(Debug, Clone)]
pub struct FcmSettings {
    pub endpoint: String,
    pub project_id: String,
    pub credentials: FcmCredentials,
    pub android_channel_id: String,
    pub validate_only: bool,
    pub timeout: Duration,
}

impl FcmSettings {
    /// A service-account key takes precedence over a pre-issued token. The
    /// project id falls back to the one named in the key.
    pub fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        let mut project_id = config.fcm_project_id.trim().to_string();
        let credentials = if !config.fcm_service_account_path.trim().is_empty() {
            let key = ServiceAccountKey::from_file(config.fcm_service_account_path.trim())?;
            if project_id.is_empty() {
                project_id = key.project_id.clone().unwrap_or_default();
            }
            FcmCredentials::ServiceAccount(key)
        } else if !config.fcm_access_token.trim().is_empty() {
            FcmCredentials::Static(config.fcm_access_token.trim().to_string())
        } else {
            anyhow::bail!("FCM_SERVICE_ACCOUNT_PATH or FCM_ACCESS_TOKEN must be set");
        };
        if project_id.is_empty() {
            anyhow::bail!("FCM_PROJECT_ID must be set when the service account key has none");
        }

        Ok(Self {
            endpoint: config.fcm_endpoint.clone(),
            project_id,
            credentials,
            android_channel_id: config.android_channel_id.clone(),
            validate_only: config.fcm_validate_only,
            timeout: config.push_timeout(),
        })
    }
}

#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    validate_only: bool,
    message: FcmMessage<'a>,
}

#[derive(Debug, Serialize)]
struct FcmMessage<'a> {
    token: &'a str,
    notification: FcmNotification<'a>,
    data: &'a BTreeMap<String, String>,
    android: AndroidConfig<'a>,
    apns: ApnsConfig,
}

#[derive(Debug, Serialize)]
struct FcmNotification<'a> {
    title: &'a str,
    body: &'a str,
}

#[derive(Debug, Serialize)]
struct AndroidConfig<'a> {
    priority: &'static str,
    notification: AndroidNotification<'a>,
}

#[derive(Debug, Serialize)]
struct AndroidNotification<'a> {
    channel_id: &'a str,
    notification_priority: &'static str,
}

#[derive(Debug, Serialize)]
struct ApnsConfig {
    payload: ApnsPayload,
}

#[derive(Debug, Serialize)]
struct ApnsPayload {
    aps: Aps,
}

#[derive(Debug, Serialize)]
struct Aps {
    sound: &'static str,
    #[serde(rename = "content-available")]
    content_available: u8,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorEnvelope {
    #[serde(default)]
    error: Option<ErrorBody>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    details: Vec<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(default, rename = "errorCode")]
    error_code: Option<String>,
}

/// Pulls the most specific error code out of an FCM error body: the
/// `FcmError` detail code when present, else the RPC status.
fn parse_error(body: &str) -> (Option<String>, String) {
    let envelope: ErrorEnvelope = serde_json::from_str(body).unwrap_or_default();
    match envelope.error {
        Some(error) => {
            let code = error
                .details
                .iter()
                .find_map(|d| d.error_code.clone())
                .or(error.status);
            (code, error.message.unwrap_or_default())
        }
        None => (None, body.chars().take(200).collect()),
    }
}

/// Maps a failed send to an outcome. Only answers that name the token as
/// dead count as invalid. Credential problems are reported separately since
/// they fail every send until fixed.
pub fn classify(error: &TransportError) -> DeliveryOutcome {
    match error {
        TransportError::Auth(_) | TransportError::Rejected { status: 401 | 403, .. } => {
            DeliveryOutcome::AuthFailure(error.to_string())
        }
        TransportError::Rejected { code, message, .. } => {
            let mentions_token = message.to_ascii_lowercase().contains("registration token");
            match code.as_deref() {
                Some("UNREGISTERED") => DeliveryOutcome::InvalidToken,
                Some("INVALID_ARGUMENT") | Some("NOT_FOUND") if mentions_token => {
                    DeliveryOutcome::InvalidToken
                }
                _ => DeliveryOutcome::TransientFailure(error.to_string()),
            }
        }
        TransportError::Http(_) => DeliveryOutcome::TransientFailure(error.to_string()),
    }
}

pub struct FcmTransport {
    client: reqwest::Client,
    send_url: String,
    auth: AccessTokenProvider,
    android_channel_id: String,
    validate_only: bool,
}

impl FcmTransport {
    pub fn new(settings: FcmSettings) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(settings.timeout).build()?;
        let send_url = format!(
            "{}/v1/projects/{}/messages:send",
            settings.endpoint.trim_end_matches('/'),
            settings.project_id
        );
        let auth = AccessTokenProvider::new(settings.credentials, client.clone())?;
        Ok(Self {
            client,
            send_url,
            auth,
            android_channel_id: settings.android_channel_id,
            validate_only: settings.validate_only,
        })
    }

    async fn post(&self, token: &str, message: &PushMessage) -> Result<(), TransportError> {
        let request = SendRequest {
            validate_only: self.validate_only,
            message: FcmMessage {
                token,
                notification: FcmNotification {
                    title: &message.title,
                    body: &message.body,
                },
                data: &message.data,
                android: AndroidConfig {
                    priority: "HIGH",
                    notification: AndroidNotification {
                        channel_id: &self.android_channel_id,
                        notification_priority: "PRIORITY_HIGH",
                    },
                },
                apns: ApnsConfig {
                    payload: ApnsPayload {
                        aps: Aps {
                            sound: "default",
                            content_available: 1,
                        },
                    },
                },
            },
        };

        let access_token = self.auth.access_token().await?;
        let response = self
            .client
            .post(&self.send_url)
            .bearer_auth(access_token)
            .json(&request)
            .send()
            .await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        let (code, message) = parse_error(&body);
        Err(TransportError::Rejected {
            status: status.as_u16(),
            code,
            message,
        })
    }
}

#[async_trait]
impl PushTransport for FcmTransport {
    async fn send(&self, token: &str, message: &PushMessage) -> DeliveryOutcome {
        match self.post(token, message).await {
            Ok(()) => {
                debug!("FCM accepted push for {}", token_prefix(token));
                DeliveryOutcome::Delivered
            }
            Err(e) => classify(&e),
        }
    }
}

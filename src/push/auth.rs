//! OAuth access tokens for the FCM HTTP v1 API.

use anyhow::Context;
use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::info;

use crate::error::TransportError;

pub const FCM_SCOPE: &str = "https://www.googleapis.com/auth/firebase.messaging";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;
// Refresh this long before the token endpoint's stated expiry.
const REFRESH_MARGIN: Duration = Duration::from_secs(60);

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

/// The fields of a Google service-account JSON key that token minting needs.
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    #[serde(default)]
    pub project_id: Option<String>,
}

impl ServiceAccountKey {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read service account key {}", path))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse service account key {}", path))
    }
}

#[derive(Clone)]
pub enum FcmCredentials {
    /// Pre-issued bearer token, used as is and never refreshed.
    Static(String),
    ServiceAccount(ServiceAccountKey),
}

impl fmt::Debug for FcmCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FcmCredentials::Static(_) => f.write_str("Static(<redacted>)"),
            FcmCredentials::ServiceAccount(key) => {
                write!(f, "ServiceAccount({})", key.client_email)
            }
        }
    }
}

#[derive(Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

struct CachedToken {
    value: String,
    refresh_at: Instant,
}

enum TokenSource {
    Static(String),
    ServiceAccount {
        key: ServiceAccountKey,
        signer: EncodingKey,
    },
}

/// Hands out a valid bearer token, minting a new one from the service
/// account when the cached one is close to expiry.
pub struct AccessTokenProvider {
    source: TokenSource,
    client: reqwest::Client,
    cached: Mutex<Option<CachedToken>>,
}

impl AccessTokenProvider {
    pub fn new(credentials: FcmCredentials, client: reqwest::Client) -> anyhow::Result<Self> {
        let source = match credentials {
            FcmCredentials::Static(token) => TokenSource::Static(token),
            FcmCredentials::ServiceAccount(key) => {
                let signer = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
                    .context("Invalid service account private key")?;
                TokenSource::ServiceAccount { key, signer }
            }
        };
        Ok(Self {
            source,
            client,
            cached: Mutex::new(None),
        })
    }

    pub async fn access_token(&self) -> Result<String, TransportError> {
        let (key, signer) = match &self.source {
            TokenSource::Static(token) => return Ok(token.clone()),
            TokenSource::ServiceAccount { key, signer } => (key, signer),
        };

        // Held across the refresh so concurrent sends mint at most once.
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.refresh_at {
                return Ok(token.value.clone());
            }
        }

        let fresh = self.mint(key, signer).await?;
        let value = fresh.value.clone();
        *cached = Some(fresh);
        Ok(value)
    }

    async fn mint(
        &self,
        key: &ServiceAccountKey,
        signer: &EncodingKey,
    ) -> Result<CachedToken, TransportError> {
        let now = Utc::now().timestamp();
        let claims = AssertionClaims {
            iss: &key.client_email,
            scope: FCM_SCOPE,
            aud: &key.token_uri,
            iat: now,
            exp: now + ASSERTION_LIFETIME_SECS,
        };
        let assertion = encode(&Header::new(Algorithm::RS256), &claims, signer)
            .map_err(|e| TransportError::Auth(format!("failed to sign token assertion: {e}")))?;

        let response = self
            .client
            .post(&key.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Auth(format!(
                "token endpoint returned {}: {}",
                status.as_u16(),
                body.chars().take(200).collect::<String>()
            )));
        }

        let token: TokenResponse = response.json().await?;
        let lifetime = Duration::from_secs(token.expires_in.unwrap_or(3600));
        info!(
            "Minted FCM access token for {} (expires in {}s)",
            key.client_email,
            lifetime.as_secs()
        );
        Ok(CachedToken {
            value: token.access_token,
            refresh_at: Instant::now() + lifetime.saturating_sub(REFRESH_MARGIN),
        })
    }
}

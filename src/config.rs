use anyhow::{bail, Result};
use dotenvy::dotenv;
use serde::Deserialize;
use std::env;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub db_max_connections: u32,
    pub nws_alerts_url: String,
    pub nws_user_agent: String,
    pub fetch_timeout_secs: u64,
    pub fcm_project_id: String,
    pub fcm_service_account_path: String,
    pub fcm_access_token: String,
    pub fcm_endpoint: String,
    pub fcm_validate_only: bool,
    pub push_timeout_secs: u64,
    pub android_channel_id: String,
    pub max_concurrent_fetches: usize,
    pub max_concurrent_sends: usize,
    pub alert_check_interval_secs: u64,
    pub prune_interval_secs: u64,
    pub registration_max_age_days: i64,
    pub sent_alert_max_age_days: i64,
    pub scheduler_max_failures: u32,
    pub scheduler_cooldown_secs: u64,
    pub http_bind_addr: String,
    pub log_level: String,
    pub log_format: String,
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Pushes without credentials would all fail, so refuse to start instead.
fn check_fcm_credentials(project_id: &str, key_path: &str, access_token: &str) -> Result<()> {
    let has_key = !key_path.trim().is_empty();
    if !has_key && access_token.trim().is_empty() {
        bail!("FCM_SERVICE_ACCOUNT_PATH (or GOOGLE_APPLICATION_CREDENTIALS) or FCM_ACCESS_TOKEN must be set");
    }
    if !has_key && project_id.trim().is_empty() {
        bail!("FCM_PROJECT_ID must be set");
    }
    Ok(())
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        dotenv().ok();

        let db_host = env_or("DB_HOST", "localhost");
        let db_port = env_or("DB_PORT", "5432");
        let db_name = env_or("DB_DATABASE", "heather");
        let db_user = env_or("DB_USER", "heather");
        let db_pwd = env_or("DB_PWD", "heather");

        let database_url = format!(
            "postgres://{}:{}@{}:{}/{}",
            db_user, db_pwd, db_host, db_port, db_name
        );

        let fcm_project_id = env::var("FCM_PROJECT_ID").unwrap_or_default();
        let fcm_service_account_path = env::var("FCM_SERVICE_ACCOUNT_PATH")
            .or_else(|_| env::var("GOOGLE_APPLICATION_CREDENTIALS"))
            .unwrap_or_default();
        let fcm_access_token = env::var("FCM_ACCESS_TOKEN").unwrap_or_default();
        check_fcm_credentials(&fcm_project_id, &fcm_service_account_path, &fcm_access_token)?;

        let fcm_validate_only = env::var("FCM_VALIDATE_ONLY")
            .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
            .unwrap_or(false);

        Ok(Self {
            database_url,
            db_max_connections: env_parse("DB_MAX_CONNECTIONS", 10),
            nws_alerts_url: env_or("NWS_ALERTS_URL", "https://api.weather.gov/alerts/active"),
            nws_user_agent: env_or("NWS_USER_AGENT", "(Heather Weather App Alerts Service)"),
            fetch_timeout_secs: env_parse("FETCH_TIMEOUT_SECS", 10),
            fcm_project_id,
            fcm_service_account_path,
            fcm_access_token,
            fcm_endpoint: env_or("FCM_ENDPOINT", "https://fcm.googleapis.com"),
            fcm_validate_only,
            push_timeout_secs: env_parse("PUSH_TIMEOUT_SECS", 10),
            android_channel_id: env_or("ANDROID_CHANNEL_ID", "heather_weather_alerts"),
            max_concurrent_fetches: env_parse("MAX_CONCURRENT_FETCHES", 8usize).max(1),
            max_concurrent_sends: env_parse("MAX_CONCURRENT_SENDS", 32usize).max(1),
            alert_check_interval_secs: env_parse("ALERT_CHECK_INTERVAL_SECS", 300u64).max(1),
            prune_interval_secs: env_parse("PRUNE_INTERVAL_SECS", 86_400u64).max(1),
            registration_max_age_days: env_parse("REGISTRATION_MAX_AGE_DAYS", 30),
            sent_alert_max_age_days: env_parse("SENT_ALERT_MAX_AGE_DAYS", 2),
            scheduler_max_failures: env_parse("SCHEDULER_MAX_FAILURES", 5),
            scheduler_cooldown_secs: env_parse("SCHEDULER_COOLDOWN_SECS", 300),
            http_bind_addr: env_or("HTTP_BIND_ADDR", "0.0.0.0:8080"),
            log_level: env_or("LOG_LEVEL", "info"),
            log_format: env_or("LOG_FORMAT", "text"),
        })
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn push_timeout(&self) -> Duration {
        Duration::from_secs(self.push_timeout_secs)
    }

    pub fn cycle_settings(&self) -> CycleSettings {
        CycleSettings {
            max_concurrent_fetches: self.max_concurrent_fetches,
            max_concurrent_sends: self.max_concurrent_sends,
            fetch_timeout: self.fetch_timeout(),
            push_timeout: self.push_timeout(),
        }
    }

    pub fn schedule_settings(&self) -> ScheduleSettings {
        ScheduleSettings {
            alert_interval: Duration::from_secs(self.alert_check_interval_secs),
            prune_interval: Duration::from_secs(self.prune_interval_secs),
            max_failures: self.scheduler_max_failures.max(1),
            cooldown: Duration::from_secs(self.scheduler_cooldown_secs),
        }
    }

    pub fn prune_settings(&self) -> PruneSettings {
        PruneSettings {
            registration_max_age: chrono::Duration::days(self.registration_max_age_days),
            sent_alert_max_age: chrono::Duration::days(self.sent_alert_max_age_days),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CycleSettings {
    pub max_concurrent_fetches: usize,
    pub max_concurrent_sends: usize,
    pub fetch_timeout: Duration,
    pub push_timeout: Duration,
}

impl Default for CycleSettings {
    fn default() -> Self {
        Self {
            max_concurrent_fetches: 8,
            max_concurrent_sends: 32,
            fetch_timeout: Duration::from_secs(10),
            push_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScheduleSettings {
    pub alert_interval: Duration,
    pub prune_interval: Duration,
    pub max_failures: u32,
    pub cooldown: Duration,
}

#[derive(Debug, Clone)]
pub struct PruneSettings {
    pub registration_max_age: chrono::Duration,
    pub sent_alert_max_age: chrono::Duration,
}

impl Default for PruneSettings {
    fn default() -> Self {
        Self {
            registration_max_age: chrono::Duration::days(30),
            sent_alert_max_age: chrono::Duration::days(2),
        }
    }
}

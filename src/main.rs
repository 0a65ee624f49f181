mod alert_source;
mod config;
mod db;
mod error;
mod http;
mod models;
mod processor;
mod push;
mod scheduler;
#[cfg(test)]
mod testing;

use anyhow::Context;
use config::AppConfig;
use std::sync::Arc;
use tracing::info;

use alert_source::NwsAlertSource;
use db::{PgDedupStore, PgRegistrationStore};
use processor::AlertContext;
use push::{FcmSettings, FcmTransport};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load config
    let config = AppConfig::load()?;

    // Init logging
    if config.log_format.eq_ignore_ascii_case("json") {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(&config.log_level)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(&config.log_level)
            .init();
    }

    info!("Starting Heather Weather Alerts Service...");

    // Init DB
    let pool = db::init_pool(&config.database_url, config.db_max_connections).await?;
    db::ensure_schema(&pool).await?;
    info!("Connected to database");

    let source = NwsAlertSource::new(
        &config.nws_alerts_url,
        &config.nws_user_agent,
        config.fetch_timeout(),
    )?;
    let transport = FcmTransport::new(FcmSettings::from_config(&config)?)?;
    if config.fcm_validate_only {
        info!("FCM validate-only mode: pushes will not be delivered");
    }

    let ctx = Arc::new(AlertContext {
        registrations: Arc::new(PgRegistrationStore::new(pool.clone())),
        sent_alerts: Arc::new(PgDedupStore::new(pool)),
        source: Arc::new(source),
        transport: Arc::new(transport),
        settings: config.cycle_settings(),
    });

    let schedule = config.schedule_settings();
    tokio::spawn(scheduler::run_prune_schedule(
        ctx.clone(),
        schedule.prune_interval,
        config.prune_settings(),
    ));
    tokio::spawn(scheduler::run_alert_schedule(ctx.clone(), schedule));

    let listener = tokio::net::TcpListener::bind(&config.http_bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.http_bind_addr))?;
    info!("Listening on {}", config.http_bind_addr);

    axum::serve(listener, http::build_router(ctx))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await?;

    Ok(())
}

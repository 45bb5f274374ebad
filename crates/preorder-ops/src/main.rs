use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use preorder_platform::{
    HttpOrderAdapter, PgSplitPaymentStore, RedisBus, RedisNotificationDispatcher, ServiceConfig,
    connect_database,
};
use preorder_split::{SplitPaymentOrchestrator, run_reminder_sweep};
use tokio::time::{MissedTickBehavior, interval};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "preorder_ops=info".to_string()),
        )
        .init();

    let config = ServiceConfig::worker_from_env()?;
    if config.reminder_interval_secs == 0 {
        anyhow::bail!("REMINDER_INTERVAL_SECS must be greater than zero");
    }

    let pool = connect_database(&config.database_url).await?;
    let redis = RedisBus::connect(&config.redis_url)?;
    let adapter =
        HttpOrderAdapter::new(&config.order_api).context("failed to build order API client")?;
    let dispatcher = RedisNotificationDispatcher::new(redis, config.notification_channel.clone());
    let orchestrator =
        SplitPaymentOrchestrator::new(PgSplitPaymentStore::new(pool), adapter, dispatcher);

    let mut ticker = interval(Duration::from_secs(config.reminder_interval_secs));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(
        "ops worker running reminder sweep every {}s",
        config.reminder_interval_secs
    );

    loop {
        ticker.tick().await;

        if let Err(err) = run_reminder_sweep(&orchestrator, Utc::now()).await {
            error!("reminder sweep failed: {err:#}");
        }
    }
}

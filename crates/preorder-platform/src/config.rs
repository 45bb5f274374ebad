use anyhow::{Context, Result};

const DEFAULT_ORDER_API_TIMEOUT_SECS: u64 = 15;
const DEFAULT_REMINDER_INTERVAL_SECS: u64 = 3600;

#[derive(Clone, Debug)]
pub struct OrderApiConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServiceConfig {
    pub database_url: String,
    pub redis_url: String,
    pub http_addr: String,
    pub order_api: OrderApiConfig,
    pub notification_channel: String,
    pub reminder_interval_secs: u64,
}

impl ServiceConfig {
    pub fn from_env(default_http_addr: &str) -> Result<Self> {
        let http_addr =
            std::env::var("HTTP_ADDR").unwrap_or_else(|_| default_http_addr.to_string());

        Ok(Self {
            http_addr,
            ..Self::worker_from_env()?
        })
    }

    pub fn worker_from_env() -> Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL is required")?;
        let redis_url = std::env::var("REDIS_URL").context("REDIS_URL is required")?;
        let base_url =
            std::env::var("ORDER_API_BASE_URL").context("ORDER_API_BASE_URL is required")?;
        let timeout_secs = parse_env_u64("ORDER_API_TIMEOUT_SECS", DEFAULT_ORDER_API_TIMEOUT_SECS)?;
        let reminder_interval_secs =
            parse_env_u64("REMINDER_INTERVAL_SECS", DEFAULT_REMINDER_INTERVAL_SECS)?;
        let notification_channel = std::env::var("NOTIFICATION_CHANNEL")
            .unwrap_or_else(|_| "notifications.email".to_string());

        Ok(Self {
            database_url,
            redis_url,
            http_addr: String::new(),
            order_api: OrderApiConfig {
                base_url,
                timeout_secs,
            },
            notification_channel,
            reminder_interval_secs,
        })
    }
}

fn parse_env_u64(name: &str, default: u64) -> Result<u64> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .with_context(|| format!("{name} must be a non-negative integer")),
        Err(_) => Ok(default),
    }
}

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use preorder_tools::{NotificationDispatcher, NotificationTemplate};
use redis::{AsyncCommands, Client};
use serde::Serialize;

use crate::contracts::NotificationJob;

#[derive(Clone)]
pub struct RedisBus {
    client: Client,
}

impl RedisBus {
    pub fn connect(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url)?;
        Ok(Self { client })
    }

    pub async fn publish_json<T: Serialize>(&self, channel: &str, payload: &T) -> Result<()> {
        let mut connection = self.client.get_multiplexed_async_connection().await?;
        let serialized = serde_json::to_string(payload)?;
        let _: i64 = connection.publish(channel, serialized).await?;
        Ok(())
    }
}

/// Hands notifications to the mail worker as [`NotificationJob`]s on a pub/sub channel.
#[derive(Clone)]
pub struct RedisNotificationDispatcher {
    bus: RedisBus,
    channel: String,
}

impl RedisNotificationDispatcher {
    pub fn new(bus: RedisBus, channel: impl Into<String>) -> Self {
        Self {
            bus,
            channel: channel.into(),
        }
    }
}

#[async_trait]
impl NotificationDispatcher for RedisNotificationDispatcher {
    async fn send(
        &self,
        shop_id: &str,
        template: NotificationTemplate,
        recipient: &str,
        variables: serde_json::Value,
    ) -> Result<()> {
        let job = NotificationJob {
            shop_id: shop_id.to_string(),
            template,
            template_key: template.key().to_string(),
            recipient: recipient.to_string(),
            variables,
            queued_at: Utc::now(),
        };

        self.bus.publish_json(&self.channel, &job).await
    }
}

use chrono::{DateTime, Utc};
use preorder_core::{Address, ExternalOrderCompletedEvent, SplitPaymentConfig, SplitPaymentOrder};
use preorder_tools::NotificationTemplate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSplitPaymentRequest {
    pub customer_email: String,
    pub customer_name: Option<String>,
    pub product_id: String,
    pub variant_id: Option<String>,
    pub product_title: String,
    pub variant_title: Option<String>,
    #[serde(default = "default_quantity")]
    pub quantity: i32,
    pub unit_price: Decimal,
    pub currency: String,
    pub deposit_percentage: Option<i32>,
    pub shipping_address: Option<Address>,
    pub billing_address: Option<Address>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListSplitPaymentsQuery {
    pub status: Option<String>,
    pub customer_email: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListSplitPaymentsResponse {
    pub items: Vec<SplitPaymentOrder>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CancelSplitPaymentRequest {
    pub reason: Option<String>,
}

/// Partial update; absent fields keep their stored (or default) value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpsertSplitPaymentConfigRequest {
    pub enabled: Option<bool>,
    pub default_percentage: Option<i32>,
    pub minimum_deposit: Option<i32>,
    pub maximum_deposit: Option<i32>,
    pub payment_terms_days: Option<i32>,
    pub auto_charge_remaining: Option<bool>,
    pub send_payment_reminders: Option<bool>,
    pub reminder_days_before: Option<Vec<i32>>,
    pub late_fee_enabled: Option<bool>,
    pub late_fee_percentage: Option<Decimal>,
    pub grace_period_days: Option<i32>,
}

impl UpsertSplitPaymentConfigRequest {
    pub fn apply(self, mut config: SplitPaymentConfig) -> SplitPaymentConfig {
        if let Some(value) = self.enabled {
            config.enabled = value;
        }
        if let Some(value) = self.default_percentage {
            config.default_percentage = value;
        }
        if let Some(value) = self.minimum_deposit {
            config.minimum_deposit = value;
        }
        if let Some(value) = self.maximum_deposit {
            config.maximum_deposit = value;
        }
        if let Some(value) = self.payment_terms_days {
            config.payment_terms_days = value;
        }
        if let Some(value) = self.auto_charge_remaining {
            config.auto_charge_remaining = value;
        }
        if let Some(value) = self.send_payment_reminders {
            config.send_payment_reminders = value;
        }
        if let Some(value) = self.reminder_days_before {
            config.reminder_days_before = value;
        }
        if let Some(value) = self.late_fee_enabled {
            config.late_fee_enabled = value;
        }
        if let Some(value) = self.late_fee_percentage {
            config.late_fee_percentage = value;
        }
        if let Some(value) = self.grace_period_days {
            config.grace_period_days = value;
        }
        config
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterShopRequest {
    pub shop_domain: String,
    pub access_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterShopResponse {
    pub shop_id: String,
    pub shop_domain: String,
}

/// Tags arrive either as a JSON list or as the platform's comma-separated string.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WebhookTags {
    List(Vec<String>),
    Csv(String),
}

impl Default for WebhookTags {
    fn default() -> Self {
        Self::List(Vec::new())
    }
}

impl WebhookTags {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            Self::List(tags) => tags,
            Self::Csv(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|tag| !tag.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }
}

/// "Order paid" payload as delivered by the order platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderPaidWebhook {
    pub order_id: String,
    /// Present when the paid order was completed from a pre-payment order.
    pub draft_order_id: Option<String>,
    #[serde(default)]
    pub tags: WebhookTags,
}

impl OrderPaidWebhook {
    pub fn into_event(self, shop_domain: &str) -> ExternalOrderCompletedEvent {
        let (order_ref, paid_order_ref) = match self.draft_order_id {
            Some(draft_order_id) => (draft_order_id, Some(self.order_id)),
            None => (self.order_id, None),
        };

        ExternalOrderCompletedEvent {
            order_ref,
            correlation_tags: self.tags.into_vec(),
            shop_domain: shop_domain.trim().to_ascii_lowercase(),
            paid_order_ref,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationJob {
    pub shop_id: String,
    pub template: NotificationTemplate,
    pub template_key: String,
    pub recipient: String,
    pub variables: serde_json::Value,
    pub queued_at: DateTime<Utc>,
}

fn default_quantity() -> i32 {
    1
}

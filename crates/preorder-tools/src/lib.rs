use async_trait::async_trait;
use preorder_core::{Address, BuyerInfo, Shop};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DraftLineItem {
    pub title: String,
    pub product_id: String,
    pub variant_id: Option<String>,
    pub quantity: i32,
    pub price: Decimal,
}

/// A pre-payment order to be created on the order platform.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DraftOrderRequest {
    pub line_items: Vec<DraftLineItem>,
    pub buyer: BuyerInfo,
    pub currency: String,
    pub tags: Vec<String>,
    pub note: String,
    pub shipping_address: Option<Address>,
    pub billing_address: Option<Address>,
    /// Stable per created leg so the platform can drop duplicate submissions.
    pub idempotency_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RefundRequest {
    pub full: bool,
    pub note: String,
}

impl RefundRequest {
    pub fn full(note: impl Into<String>) -> Self {
        Self {
            full: true,
            note: note.into(),
        }
    }
}

#[async_trait]
pub trait OrderAdapter: Send + Sync {
    /// Creates a pre-payment order and returns its reference.
    async fn create_order(&self, shop: &Shop, request: &DraftOrderRequest)
    -> anyhow::Result<String>;
    async fn send_invoice(&self, shop: &Shop, order_ref: &str, message: &str)
    -> anyhow::Result<()>;
    async fn refund(
        &self,
        shop: &Shop,
        order_ref: &str,
        request: &RefundRequest,
    ) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum NotificationTemplate {
    SplitPaymentCreated,
    DepositReceived,
    RemainingPaymentDue,
    SplitPaymentCompleted,
    SplitPaymentCancelled,
    SplitPaymentRefunded,
}

impl NotificationTemplate {
    pub fn key(&self) -> &'static str {
        match self {
            Self::SplitPaymentCreated => "split_payment_created",
            Self::DepositReceived => "deposit_received",
            Self::RemainingPaymentDue => "remaining_payment_due",
            Self::SplitPaymentCompleted => "split_payment_completed",
            Self::SplitPaymentCancelled => "split_payment_cancelled",
            Self::SplitPaymentRefunded => "split_payment_refunded",
        }
    }
}

#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn send(
        &self,
        shop_id: &str,
        template: NotificationTemplate,
        recipient: &str,
        variables: serde_json::Value,
    ) -> anyhow::Result<()>;
}

pub mod config;
pub mod contracts;
pub mod db;
pub mod order_api;
pub mod redis_bus;

pub use config::{OrderApiConfig, ServiceConfig};
pub use contracts::{
    CancelSplitPaymentRequest, CreateSplitPaymentRequest, ListSplitPaymentsQuery,
    ListSplitPaymentsResponse, NotificationJob, OrderPaidWebhook, RegisterShopRequest,
    RegisterShopResponse, UpsertSplitPaymentConfigRequest, WebhookTags,
};
pub use db::{PgSplitPaymentStore, connect_database};
pub use order_api::HttpOrderAdapter;
pub use redis_bus::{RedisBus, RedisNotificationDispatcher};

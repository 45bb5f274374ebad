#![allow(dead_code)]

use std::{
    collections::HashSet,
    sync::{
        Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use preorder_core::{
    Addresses, BuyerInfo, LineInfo, OrderFilter, Shop, SplitPaymentConfig, SplitPaymentOrder,
    SplitPaymentStore,
};
use preorder_memstore::InMemorySplitPaymentStore;
use preorder_split::{CreateSplitPayment, SplitPaymentOrchestrator};
use preorder_tools::{
    DraftOrderRequest, NotificationDispatcher, NotificationTemplate, OrderAdapter, RefundRequest,
};
use rust_decimal::Decimal;
use uuid::Uuid;

pub const SHOP_ID: &str = "shop-1";
pub const SHOP_DOMAIN: &str = "lamps.example";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdapterCall {
    CreateOrder { order_ref: String, tags: Vec<String>, price: Decimal },
    SendInvoice { order_ref: String, message: String },
    Refund { order_ref: String },
}

#[derive(Default)]
pub struct RecordingAdapter {
    calls: Mutex<Vec<AdapterCall>>,
    created: AtomicUsize,
    pub fail_create_after: Mutex<Option<usize>>,
    pub fail_invoice: AtomicBool,
    pub fail_refund: AtomicBool,
    /// Paid order refs whose refund is rejected.
    pub fail_refund_for: Mutex<HashSet<String>>,
}

impl RecordingAdapter {
    pub fn calls(&self) -> Vec<AdapterCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn refunds(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                AdapterCall::Refund { order_ref } => Some(order_ref),
                _ => None,
            })
            .collect()
    }

    pub fn invoices(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                AdapterCall::SendInvoice { order_ref, .. } => Some(order_ref),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }
}

#[async_trait]
impl OrderAdapter for RecordingAdapter {
    async fn create_order(
        &self,
        _shop: &Shop,
        request: &DraftOrderRequest,
    ) -> anyhow::Result<String> {
        let created = self.created.load(Ordering::SeqCst);
        if let Some(limit) = *self.fail_create_after.lock().unwrap() {
            if created >= limit {
                anyhow::bail!("order platform unavailable");
            }
        }

        let order_ref = format!("draft-{}", self.created.fetch_add(1, Ordering::SeqCst) + 1);
        self.calls.lock().unwrap().push(AdapterCall::CreateOrder {
            order_ref: order_ref.clone(),
            tags: request.tags.clone(),
            price: request.line_items[0].price,
        });
        Ok(order_ref)
    }

    async fn send_invoice(&self, _shop: &Shop, order_ref: &str, message: &str) -> anyhow::Result<()> {
        if self.fail_invoice.load(Ordering::SeqCst) {
            anyhow::bail!("invoice endpoint timed out");
        }
        self.calls.lock().unwrap().push(AdapterCall::SendInvoice {
            order_ref: order_ref.to_string(),
            message: message.to_string(),
        });
        Ok(())
    }

    async fn refund(
        &self,
        _shop: &Shop,
        order_ref: &str,
        _request: &RefundRequest,
    ) -> anyhow::Result<()> {
        if self.fail_refund.load(Ordering::SeqCst)
            || self.fail_refund_for.lock().unwrap().contains(order_ref)
        {
            anyhow::bail!("refund rejected by payment gateway");
        }
        self.calls.lock().unwrap().push(AdapterCall::Refund {
            order_ref: order_ref.to_string(),
        });
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingDispatcher {
    sent: Mutex<Vec<(NotificationTemplate, String, serde_json::Value)>>,
    pub fail: AtomicBool,
}

impl RecordingDispatcher {
    pub fn templates(&self) -> Vec<NotificationTemplate> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|(template, _, _)| *template)
            .collect()
    }

    pub fn last_variables(&self) -> Option<serde_json::Value> {
        self.sent
            .lock()
            .unwrap()
            .last()
            .map(|(_, _, variables)| variables.clone())
    }
}

#[async_trait]
impl NotificationDispatcher for RecordingDispatcher {
    async fn send(
        &self,
        _shop_id: &str,
        template: NotificationTemplate,
        recipient: &str,
        variables: serde_json::Value,
    ) -> anyhow::Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("mail relay refused connection");
        }
        self.sent
            .lock()
            .unwrap()
            .push((template, recipient.to_string(), variables));
        Ok(())
    }
}

/// Memory store that can be told to fail config reads for some shops or to
/// fail updates after a number of successful ones.
#[derive(Default)]
pub struct FaultyStore {
    inner: InMemorySplitPaymentStore,
    pub config_failures: Mutex<HashSet<String>>,
    pub updates_before_failure: Mutex<Option<usize>>,
}

#[async_trait]
impl SplitPaymentStore for FaultyStore {
    async fn get_shop(&self, shop_id: &str) -> anyhow::Result<Option<Shop>> {
        self.inner.get_shop(shop_id).await
    }

    async fn find_shop_by_domain(&self, shop_domain: &str) -> anyhow::Result<Option<Shop>> {
        self.inner.find_shop_by_domain(shop_domain).await
    }

    async fn upsert_shop(&self, shop: Shop) -> anyhow::Result<Shop> {
        self.inner.upsert_shop(shop).await
    }

    async fn get_config(&self, shop_id: &str) -> anyhow::Result<Option<SplitPaymentConfig>> {
        if self.config_failures.lock().unwrap().contains(shop_id) {
            anyhow::bail!("connection reset while reading config for {shop_id}");
        }
        self.inner.get_config(shop_id).await
    }

    async fn upsert_config(&self, config: SplitPaymentConfig) -> anyhow::Result<SplitPaymentConfig> {
        self.inner.upsert_config(config).await
    }

    async fn insert_order(&self, order: SplitPaymentOrder) -> anyhow::Result<SplitPaymentOrder> {
        self.inner.insert_order(order).await
    }

    async fn update_order(&self, order: SplitPaymentOrder) -> anyhow::Result<SplitPaymentOrder> {
        {
            let mut remaining = self.updates_before_failure.lock().unwrap();
            match remaining.as_mut() {
                Some(0) => anyhow::bail!("connection reset while updating {}", order.id),
                Some(count) => *count -= 1,
                None => {}
            }
        }
        self.inner.update_order(order).await
    }

    async fn get_order(&self, id: Uuid) -> anyhow::Result<Option<SplitPaymentOrder>> {
        self.inner.get_order(id).await
    }

    async fn find_order_by_ref(
        &self,
        shop_id: &str,
        order_ref: &str,
    ) -> anyhow::Result<Option<SplitPaymentOrder>> {
        self.inner.find_order_by_ref(shop_id, order_ref).await
    }

    async fn list_orders(&self, filter: &OrderFilter) -> anyhow::Result<Vec<SplitPaymentOrder>> {
        self.inner.list_orders(filter).await
    }
}

pub type FaultyOrchestrator =
    SplitPaymentOrchestrator<FaultyStore, RecordingAdapter, RecordingDispatcher>;

/// One shop per config, each reachable at `<shop_id>.example`.
pub async fn faulty_orchestrator(configs: Vec<SplitPaymentConfig>) -> FaultyOrchestrator {
    let store = FaultyStore::default();
    for config in configs {
        store
            .upsert_shop(Shop {
                shop_id: config.shop_id.clone(),
                shop_domain: format!("{}.example", config.shop_id),
                access_token: "token".to_string(),
            })
            .await
            .unwrap();
        store.upsert_config(config).await.unwrap();
    }

    SplitPaymentOrchestrator::new(
        store,
        RecordingAdapter::default(),
        RecordingDispatcher::default(),
    )
}

pub type TestOrchestrator =
    SplitPaymentOrchestrator<InMemorySplitPaymentStore, RecordingAdapter, RecordingDispatcher>;

pub fn enabled_config() -> SplitPaymentConfig {
    let mut config = SplitPaymentConfig::new(SHOP_ID);
    config.enabled = true;
    config.default_percentage = 30;
    config.minimum_deposit = 25;
    config.maximum_deposit = 75;
    config.payment_terms_days = 30;
    config
}

pub async fn orchestrator_with(config: SplitPaymentConfig) -> TestOrchestrator {
    let store = InMemorySplitPaymentStore::new();
    store
        .upsert_shop(Shop {
            shop_id: SHOP_ID.to_string(),
            shop_domain: SHOP_DOMAIN.to_string(),
            access_token: "token".to_string(),
        })
        .await
        .unwrap();
    store.upsert_config(config).await.unwrap();

    SplitPaymentOrchestrator::new(
        store,
        RecordingAdapter::default(),
        RecordingDispatcher::default(),
    )
}

pub async fn orchestrator() -> TestOrchestrator {
    orchestrator_with(enabled_config()).await
}

pub fn lamp_request(requested_percentage: Option<i32>) -> CreateSplitPayment {
    CreateSplitPayment {
        shop_id: SHOP_ID.to_string(),
        buyer: BuyerInfo {
            email: "buyer@example.com".to_string(),
            name: Some("Ada Buyer".to_string()),
        },
        line: LineInfo {
            product_id: "gid-lamp".to_string(),
            variant_id: Some("gid-lamp-brass".to_string()),
            product_title: "Arc Lamp".to_string(),
            variant_title: Some("Brass".to_string()),
        },
        quantity: 2,
        unit_price: "500.00".parse().unwrap(),
        currency: "usd".to_string(),
        requested_percentage,
        addresses: Addresses::default(),
        notes: None,
    }
}

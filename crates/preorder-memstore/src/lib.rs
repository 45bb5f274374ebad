use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use preorder_core::{
    ActivityLog, ActivityLogEntry, OrderFilter, Shop, SplitPaymentConfig, SplitPaymentOrder,
    SplitPaymentStore,
};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
pub struct InMemorySplitPaymentStore {
    shops: RwLock<HashMap<String, Shop>>,
    configs: RwLock<HashMap<String, SplitPaymentConfig>>,
    orders: RwLock<HashMap<Uuid, SplitPaymentOrder>>,
    activity: RwLock<Vec<ActivityLogEntry>>,
}

impl InMemorySplitPaymentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn order_count(&self) -> usize {
        self.orders.read().await.len()
    }

    pub async fn activity(&self) -> Vec<ActivityLogEntry> {
        self.activity.read().await.clone()
    }
}

#[async_trait]
impl SplitPaymentStore for InMemorySplitPaymentStore {
    async fn get_shop(&self, shop_id: &str) -> anyhow::Result<Option<Shop>> {
        let shops = self.shops.read().await;
        Ok(shops.get(shop_id).cloned())
    }

    async fn find_shop_by_domain(&self, shop_domain: &str) -> anyhow::Result<Option<Shop>> {
        let shops = self.shops.read().await;
        Ok(shops
            .values()
            .find(|shop| shop.shop_domain.eq_ignore_ascii_case(shop_domain))
            .cloned())
    }

    async fn upsert_shop(&self, shop: Shop) -> anyhow::Result<Shop> {
        let mut shops = self.shops.write().await;
        shops.insert(shop.shop_id.clone(), shop.clone());
        Ok(shop)
    }

    async fn get_config(&self, shop_id: &str) -> anyhow::Result<Option<SplitPaymentConfig>> {
        let configs = self.configs.read().await;
        Ok(configs.get(shop_id).cloned())
    }

    async fn upsert_config(
        &self,
        mut config: SplitPaymentConfig,
    ) -> anyhow::Result<SplitPaymentConfig> {
        config.updated_at = Utc::now();
        let mut configs = self.configs.write().await;
        configs.insert(config.shop_id.clone(), config.clone());
        Ok(config)
    }

    async fn insert_order(&self, order: SplitPaymentOrder) -> anyhow::Result<SplitPaymentOrder> {
        let mut orders = self.orders.write().await;
        if orders.contains_key(&order.id) {
            anyhow::bail!("split payment order {} already exists", order.id);
        }
        orders.insert(order.id, order.clone());
        Ok(order)
    }

    async fn update_order(
        &self,
        mut order: SplitPaymentOrder,
    ) -> anyhow::Result<SplitPaymentOrder> {
        let mut orders = self.orders.write().await;
        let Some(slot) = orders.get_mut(&order.id) else {
            anyhow::bail!("split payment order {} does not exist", order.id);
        };
        order.updated_at = Utc::now();
        *slot = order.clone();
        Ok(order)
    }

    async fn get_order(&self, id: Uuid) -> anyhow::Result<Option<SplitPaymentOrder>> {
        let orders = self.orders.read().await;
        Ok(orders.get(&id).cloned())
    }

    async fn find_order_by_ref(
        &self,
        shop_id: &str,
        order_ref: &str,
    ) -> anyhow::Result<Option<SplitPaymentOrder>> {
        let orders = self.orders.read().await;
        Ok(orders
            .values()
            .find(|order| {
                order.shop_id == shop_id
                    && (order.deposit_order_ref.as_deref() == Some(order_ref)
                        || order.remaining_order_ref.as_deref() == Some(order_ref))
            })
            .cloned())
    }

    async fn list_orders(&self, filter: &OrderFilter) -> anyhow::Result<Vec<SplitPaymentOrder>> {
        let orders = self.orders.read().await;
        let mut matched: Vec<SplitPaymentOrder> = orders
            .values()
            .filter(|order| filter.matches(order))
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        if let Some(limit) = filter.row_limit() {
            matched.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        }

        Ok(matched)
    }
}

#[async_trait]
impl ActivityLog for InMemorySplitPaymentStore {
    async fn append(&self, entry: ActivityLogEntry) -> anyhow::Result<()> {
        let mut activity = self.activity.write().await;
        activity.push(entry);
        Ok(())
    }

    async fn entries_for(&self, resource_id: &str) -> anyhow::Result<Vec<ActivityLogEntry>> {
        let activity = self.activity.read().await;
        Ok(activity
            .iter()
            .filter(|entry| entry.resource_id.as_deref() == Some(resource_id))
            .cloned()
            .collect())
    }
}

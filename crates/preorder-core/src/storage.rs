use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{
    ActivityLogEntry, Shop, SplitPaymentConfig, SplitPaymentOrder, SplitPaymentStatus,
};

/// Equality filter over stored split payment orders. `None` fields match
/// everything.
#[derive(Debug, Clone, Default)]
pub struct OrderFilter {
    pub shop_id: Option<String>,
    pub status: Option<SplitPaymentStatus>,
    pub customer_email: Option<String>,
    /// Newest-first cap on the result. `None` returns every match; callers
    /// serving pages pick their own bound.
    pub limit: Option<i64>,
}

impl OrderFilter {
    /// Row cap every store applies: `None` stays unbounded, negatives become 0.
    pub fn row_limit(&self) -> Option<i64> {
        self.limit.map(|limit| limit.max(0))
    }

    pub fn matches(&self, order: &SplitPaymentOrder) -> bool {
        self.shop_id
            .as_ref()
            .is_none_or(|shop_id| *shop_id == order.shop_id)
            && self.status.is_none_or(|status| status == order.status)
            && self
                .customer_email
                .as_ref()
                .is_none_or(|email| email.eq_ignore_ascii_case(&order.customer_email))
    }
}

#[async_trait]
pub trait SplitPaymentStore: Send + Sync {
    async fn get_shop(&self, shop_id: &str) -> anyhow::Result<Option<Shop>>;
    async fn find_shop_by_domain(&self, shop_domain: &str) -> anyhow::Result<Option<Shop>>;
    async fn upsert_shop(&self, shop: Shop) -> anyhow::Result<Shop>;

    async fn get_config(&self, shop_id: &str) -> anyhow::Result<Option<SplitPaymentConfig>>;
    async fn upsert_config(&self, config: SplitPaymentConfig) -> anyhow::Result<SplitPaymentConfig>;

    async fn insert_order(&self, order: SplitPaymentOrder) -> anyhow::Result<SplitPaymentOrder>;
    async fn update_order(&self, order: SplitPaymentOrder) -> anyhow::Result<SplitPaymentOrder>;
    async fn get_order(&self, id: Uuid) -> anyhow::Result<Option<SplitPaymentOrder>>;
    /// Finds the order whose deposit or remaining pre-payment order is `order_ref`.
    async fn find_order_by_ref(
        &self,
        shop_id: &str,
        order_ref: &str,
    ) -> anyhow::Result<Option<SplitPaymentOrder>>;
    async fn list_orders(&self, filter: &OrderFilter) -> anyhow::Result<Vec<SplitPaymentOrder>>;
}

#[async_trait]
pub trait ActivityLog: Send + Sync {
    async fn append(&self, entry: ActivityLogEntry) -> anyhow::Result<()>;
    async fn entries_for(&self, resource_id: &str) -> anyhow::Result<Vec<ActivityLogEntry>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_limit_stays_unbounded() {
        assert_eq!(OrderFilter::default().row_limit(), None);

        let filter = OrderFilter {
            limit: Some(-5),
            ..OrderFilter::default()
        };
        assert_eq!(filter.row_limit(), Some(0));

        let filter = OrderFilter {
            limit: Some(25),
            ..OrderFilter::default()
        };
        assert_eq!(filter.row_limit(), Some(25));
    }
}

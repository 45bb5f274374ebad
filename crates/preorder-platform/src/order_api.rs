use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use preorder_core::Shop;
use preorder_tools::{DraftOrderRequest, OrderAdapter, RefundRequest};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::OrderApiConfig;

const ACCESS_TOKEN_HEADER: &str = "X-Access-Token";
const IDEMPOTENCY_KEY_HEADER: &str = "Idempotency-Key";

#[derive(Debug, Deserialize)]
struct CreatedOrder {
    id: String,
}

#[derive(Debug, Serialize)]
struct SendInvoiceBody<'a> {
    message: &'a str,
}

/// REST client for the external order platform.
#[derive(Clone)]
pub struct HttpOrderAdapter {
    client: Client,
    base_url: String,
}

impl HttpOrderAdapter {
    pub fn new(config: &OrderApiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("failed to build order API client")?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn shop_url(&self, shop: &Shop, path: &str) -> String {
        format!("{}/shops/{}/{}", self.base_url, shop.shop_domain, path)
    }
}

#[async_trait]
impl OrderAdapter for HttpOrderAdapter {
    async fn create_order(&self, shop: &Shop, request: &DraftOrderRequest) -> Result<String> {
        let created: CreatedOrder = self
            .client
            .post(self.shop_url(shop, "draft_orders"))
            .header(ACCESS_TOKEN_HEADER, &shop.access_token)
            .header(IDEMPOTENCY_KEY_HEADER, &request.idempotency_key)
            .json(request)
            .send()
            .await
            .context("order platform unreachable")?
            .error_for_status()
            .context("order platform rejected draft order")?
            .json()
            .await
            .context("malformed draft order response")?;

        info!(
            "created draft order {} for shop {} ({})",
            created.id, shop.shop_id, request.idempotency_key
        );
        Ok(created.id)
    }

    async fn send_invoice(&self, shop: &Shop, order_ref: &str, message: &str) -> Result<()> {
        self.client
            .post(self.shop_url(shop, &format!("draft_orders/{order_ref}/send_invoice")))
            .header(ACCESS_TOKEN_HEADER, &shop.access_token)
            .json(&SendInvoiceBody { message })
            .send()
            .await
            .context("order platform unreachable")?
            .error_for_status()
            .with_context(|| format!("order platform rejected invoice for {order_ref}"))?;

        Ok(())
    }

    async fn refund(&self, shop: &Shop, order_ref: &str, request: &RefundRequest) -> Result<()> {
        self.client
            .post(self.shop_url(shop, &format!("orders/{order_ref}/refunds")))
            .header(ACCESS_TOKEN_HEADER, &shop.access_token)
            .json(request)
            .send()
            .await
            .context("order platform unreachable")?
            .error_for_status()
            .with_context(|| format!("order platform rejected refund for {order_ref}"))?;

        info!("refunded order {order_ref} for shop {}", shop.shop_id);
        Ok(())
    }
}

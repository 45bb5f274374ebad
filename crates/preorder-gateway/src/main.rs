use std::{net::SocketAddr, sync::Arc};

use anyhow::Result as AnyResult;
use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post, put},
};
use chrono::Utc;
use preorder_core::{
    ActivityLog, ActivityLogEntry, Addresses, BuyerInfo, LineInfo, OrderFilter, Shop,
    SplitPaymentConfig, SplitPaymentError, SplitPaymentOrder, SplitPaymentStatus,
    SplitPaymentStore,
};
use preorder_platform::{
    CancelSplitPaymentRequest, CreateSplitPaymentRequest, HttpOrderAdapter, ListSplitPaymentsQuery,
    ListSplitPaymentsResponse, OrderPaidWebhook, PgSplitPaymentStore, RedisBus,
    RedisNotificationDispatcher, RegisterShopRequest, RegisterShopResponse, ServiceConfig,
    UpsertSplitPaymentConfigRequest, connect_database,
};
use preorder_split::{
    CreateSplitPayment, ReminderSweepReport, SplitPaymentOrchestrator, WebhookRouter,
    run_reminder_sweep,
};
use serde_json::json;
use tracing::{error, info, warn};
use uuid::Uuid;

const SHOP_DOMAIN_HEADER: &str = "x-shop-domain";
const DEFAULT_PAGE_SIZE: i64 = 100;
const MAX_PAGE_SIZE: i64 = 500;

type Orchestrator =
    SplitPaymentOrchestrator<PgSplitPaymentStore, HttpOrderAdapter, RedisNotificationDispatcher>;

#[derive(Clone)]
struct AppState {
    orchestrator: Arc<Orchestrator>,
}

impl AppState {
    fn store(&self) -> &PgSplitPaymentStore {
        self.orchestrator.store()
    }
}

#[tokio::main]
async fn main() -> AnyResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "preorder_gateway=info".to_string()),
        )
        .init();

    let config = ServiceConfig::from_env("0.0.0.0:8080")?;
    let pool = connect_database(&config.database_url).await?;
    let redis = RedisBus::connect(&config.redis_url)?;
    let adapter = HttpOrderAdapter::new(&config.order_api)?;
    let dispatcher = RedisNotificationDispatcher::new(redis, config.notification_channel.clone());

    let orchestrator =
        SplitPaymentOrchestrator::new(PgSplitPaymentStore::new(pool), adapter, dispatcher);
    let state = AppState {
        orchestrator: Arc::new(orchestrator),
    };

    let router = Router::new()
        .route("/healthz", get(healthz))
        .route("/shops/{shop_id}", put(register_shop))
        .route(
            "/shops/{shop_id}/split-payment-config",
            get(get_config).put(upsert_config),
        )
        .route(
            "/shops/{shop_id}/split-payments",
            get(list_split_payments).post(create_split_payment),
        )
        .route("/split-payments/{split_payment_id}", get(get_split_payment))
        .route(
            "/split-payments/{split_payment_id}/activity",
            get(list_activity),
        )
        .route(
            "/split-payments/{split_payment_id}/remaining-invoice",
            post(send_remaining_invoice),
        )
        .route(
            "/split-payments/{split_payment_id}/cancel",
            post(cancel_split_payment),
        )
        .route(
            "/split-payments/{split_payment_id}/refund",
            post(refund_split_payment),
        )
        .route("/webhooks/orders-paid", post(order_paid_webhook))
        .route("/jobs/reminders", post(run_reminders))
        .with_state(state);

    let addr: SocketAddr = config.http_addr.parse()?;
    info!("gateway listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}

async fn healthz() -> &'static str {
    "ok"
}

async fn register_shop(
    State(state): State<AppState>,
    Path(shop_id): Path<String>,
    Json(payload): Json<RegisterShopRequest>,
) -> Result<(StatusCode, Json<RegisterShopResponse>), (StatusCode, String)> {
    let shop_domain = payload.shop_domain.trim().to_ascii_lowercase();
    if shop_id.trim().is_empty() || shop_domain.is_empty() {
        return Err(invalid_request("shop_id and shop_domain are required"));
    }
    if payload.access_token.trim().is_empty() {
        return Err(invalid_request("access_token is required"));
    }

    let shop = state
        .store()
        .upsert_shop(Shop {
            shop_id: shop_id.trim().to_string(),
            shop_domain,
            access_token: payload.access_token,
        })
        .await
        .map_err(internal_error)?;

    info!("registered shop {} ({})", shop.shop_id, shop.shop_domain);

    Ok((
        StatusCode::OK,
        Json(RegisterShopResponse {
            shop_id: shop.shop_id,
            shop_domain: shop.shop_domain,
        }),
    ))
}

async fn get_config(
    State(state): State<AppState>,
    Path(shop_id): Path<String>,
) -> Result<Json<SplitPaymentConfig>, (StatusCode, String)> {
    let config = state
        .store()
        .get_config(&shop_id)
        .await
        .map_err(internal_error)?
        .unwrap_or_else(|| SplitPaymentConfig::new(shop_id));

    Ok(Json(config))
}

async fn upsert_config(
    State(state): State<AppState>,
    Path(shop_id): Path<String>,
    Json(payload): Json<UpsertSplitPaymentConfigRequest>,
) -> Result<Json<SplitPaymentConfig>, (StatusCode, String)> {
    let store = state.store();
    store
        .get_shop(&shop_id)
        .await
        .map_err(internal_error)?
        .ok_or_else(|| split_payment_error(SplitPaymentError::ShopNotFound(shop_id.clone())))?;

    let current = store
        .get_config(&shop_id)
        .await
        .map_err(internal_error)?
        .unwrap_or_else(|| SplitPaymentConfig::new(shop_id.clone()));
    let config = payload.apply(current).validate().map_err(split_payment_error)?;

    let saved = store.upsert_config(config).await.map_err(internal_error)?;
    record_activity(
        store,
        &shop_id,
        "split_payment.config_updated",
        None,
        json!({
            "enabled": saved.enabled,
            "minimum_deposit": saved.minimum_deposit,
            "maximum_deposit": saved.maximum_deposit,
            "default_percentage": saved.default_percentage,
        }),
    )
    .await;

    Ok(Json(saved))
}

async fn create_split_payment(
    State(state): State<AppState>,
    Path(shop_id): Path<String>,
    Json(payload): Json<CreateSplitPaymentRequest>,
) -> Result<(StatusCode, Json<SplitPaymentOrder>), (StatusCode, String)> {
    let request = CreateSplitPayment {
        shop_id: shop_id.clone(),
        buyer: BuyerInfo {
            email: payload.customer_email,
            name: payload.customer_name,
        },
        line: LineInfo {
            product_id: payload.product_id,
            variant_id: payload.variant_id,
            product_title: payload.product_title,
            variant_title: payload.variant_title,
        },
        quantity: payload.quantity,
        unit_price: payload.unit_price,
        currency: payload.currency,
        requested_percentage: payload.deposit_percentage,
        addresses: Addresses {
            shipping: payload.shipping_address,
            billing: payload.billing_address,
        },
        notes: payload.notes,
    };

    let order = state
        .orchestrator
        .create(request)
        .await
        .map_err(split_payment_error)?;

    record_activity(
        state.store(),
        &shop_id,
        "split_payment.created",
        Some(order.id.to_string()),
        json!({
            "total_amount": order.total_amount.to_string(),
            "deposit_percentage": order.deposit_percentage,
            "deposit_order_ref": order.deposit_order_ref,
            "remaining_order_ref": order.remaining_order_ref,
        }),
    )
    .await;

    Ok((StatusCode::CREATED, Json(order)))
}

async fn list_split_payments(
    State(state): State<AppState>,
    Path(shop_id): Path<String>,
    Query(query): Query<ListSplitPaymentsQuery>,
) -> Result<Json<ListSplitPaymentsResponse>, (StatusCode, String)> {
    let status = query
        .status
        .as_deref()
        .map(str::parse::<SplitPaymentStatus>)
        .transpose()
        .map_err(split_payment_error)?;

    let filter = OrderFilter {
        shop_id: Some(shop_id),
        status,
        customer_email: query.customer_email,
        limit: Some(page_limit(query.limit)),
    };
    let items = state
        .orchestrator
        .list(&filter)
        .await
        .map_err(split_payment_error)?;

    Ok(Json(ListSplitPaymentsResponse { items }))
}

async fn get_split_payment(
    State(state): State<AppState>,
    Path(split_payment_id): Path<Uuid>,
) -> Result<Json<SplitPaymentOrder>, (StatusCode, String)> {
    let order = state
        .orchestrator
        .get(split_payment_id)
        .await
        .map_err(split_payment_error)?;

    Ok(Json(order))
}

async fn list_activity(
    State(state): State<AppState>,
    Path(split_payment_id): Path<Uuid>,
) -> Result<Json<Vec<ActivityLogEntry>>, (StatusCode, String)> {
    let entries = state
        .store()
        .entries_for(&split_payment_id.to_string())
        .await
        .map_err(internal_error)?;

    Ok(Json(entries))
}

async fn send_remaining_invoice(
    State(state): State<AppState>,
    Path(split_payment_id): Path<Uuid>,
) -> Result<Json<SplitPaymentOrder>, (StatusCode, String)> {
    let order = state
        .orchestrator
        .send_remaining_invoice(split_payment_id)
        .await
        .map_err(split_payment_error)?;

    record_activity(
        state.store(),
        &order.shop_id,
        "split_payment.remaining_invoice_sent",
        Some(order.id.to_string()),
        json!({ "remaining_order_ref": order.remaining_order_ref }),
    )
    .await;

    Ok(Json(order))
}

async fn cancel_split_payment(
    State(state): State<AppState>,
    Path(split_payment_id): Path<Uuid>,
    Json(payload): Json<CancelSplitPaymentRequest>,
) -> Result<Json<SplitPaymentOrder>, (StatusCode, String)> {
    let order = state
        .orchestrator
        .cancel(split_payment_id, payload.reason.as_deref())
        .await
        .map_err(split_payment_error)?;

    record_activity(
        state.store(),
        &order.shop_id,
        "split_payment.cancelled",
        Some(order.id.to_string()),
        json!({
            "reason": payload.reason,
            "deposit_refunded": order.deposit_refunded,
        }),
    )
    .await;

    Ok(Json(order))
}

async fn refund_split_payment(
    State(state): State<AppState>,
    Path(split_payment_id): Path<Uuid>,
    Json(payload): Json<CancelSplitPaymentRequest>,
) -> Result<Json<SplitPaymentOrder>, (StatusCode, String)> {
    let order = state
        .orchestrator
        .refund(split_payment_id, payload.reason.as_deref())
        .await
        .map_err(split_payment_error)?;

    record_activity(
        state.store(),
        &order.shop_id,
        "split_payment.refunded",
        Some(order.id.to_string()),
        json!({
            "reason": payload.reason,
            "deposit_refunded": order.deposit_refunded,
            "remaining_refunded": order.remaining_refunded,
        }),
    )
    .await;

    Ok(Json(order))
}

/// Always acknowledges deliveries it could parse; a non-2xx answer would only
/// make the platform redeliver an event the router has already recorded.
async fn order_paid_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<OrderPaidWebhook>,
) -> Result<(StatusCode, Json<serde_json::Value>), (StatusCode, String)> {
    let shop_domain = headers
        .get(SHOP_DOMAIN_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| invalid_request("missing X-Shop-Domain header"))?;

    let event = payload.into_event(shop_domain);
    let router = WebhookRouter::new(state.orchestrator.as_ref());

    match router.route(&event).await {
        Ok(outcome) => Ok((StatusCode::OK, Json(json!(outcome)))),
        Err(SplitPaymentError::Store(err)) => {
            error!("webhook for order {} hit a store failure: {err:#}", event.order_ref);
            Err(internal_error(err))
        }
        Err(err) => {
            warn!("webhook for order {} failed: {err}", event.order_ref);
            Ok((
                StatusCode::OK,
                Json(json!({
                    "outcome": "failed",
                    "order_ref": event.order_ref,
                    "error": err.to_string(),
                })),
            ))
        }
    }
}

async fn run_reminders(
    State(state): State<AppState>,
) -> Result<Json<ReminderSweepReport>, (StatusCode, String)> {
    let report = run_reminder_sweep(state.orchestrator.as_ref(), Utc::now())
        .await
        .map_err(split_payment_error)?;

    Ok(Json(report))
}

async fn record_activity(
    store: &PgSplitPaymentStore,
    shop_id: &str,
    action: &str,
    resource_id: Option<String>,
    details: serde_json::Value,
) {
    let entry = ActivityLogEntry::new(shop_id, action, resource_id, details);
    if let Err(err) = store.append(entry).await {
        warn!("failed to record {action} for shop {shop_id}: {err}");
    }
}

fn page_limit(requested: Option<i64>) -> i64 {
    requested
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE)
}

fn split_payment_status(err: &SplitPaymentError) -> StatusCode {
    match err {
        SplitPaymentError::FeatureDisabled { .. } => StatusCode::FORBIDDEN,
        SplitPaymentError::InvalidPercentage { .. }
        | SplitPaymentError::InvalidInput(_)
        | SplitPaymentError::UnclassifiedEvent(_) => StatusCode::BAD_REQUEST,
        SplitPaymentError::DepositNotPaid(_)
        | SplitPaymentError::MissingOrderReference { .. }
        | SplitPaymentError::InvalidTransition { .. } => StatusCode::CONFLICT,
        SplitPaymentError::OrderNotFound(_) | SplitPaymentError::ShopNotFound(_) => {
            StatusCode::NOT_FOUND
        }
        SplitPaymentError::RefundFailed { .. } | SplitPaymentError::Adapter(_) => {
            StatusCode::BAD_GATEWAY
        }
        SplitPaymentError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn split_payment_error(err: SplitPaymentError) -> (StatusCode, String) {
    let status = split_payment_status(&err);
    if status.is_server_error() {
        error!("split payment request failed: {err:#}");
    }
    (status, err.to_string())
}

fn invalid_request(message: &str) -> (StatusCode, String) {
    (StatusCode::BAD_REQUEST, message.to_string())
}

fn internal_error<E: std::fmt::Display>(err: E) -> (StatusCode, String) {
    (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
}

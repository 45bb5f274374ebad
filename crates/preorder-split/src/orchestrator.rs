use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use preorder_core::{
    Addresses, BuyerInfo, LineInfo, OrderFilter, PaymentLeg, Shop, SplitPaymentConfig,
    SplitPaymentError, SplitPaymentOrder, SplitPaymentResult, SplitPaymentStatus,
    SplitPaymentStore, TAG_SPLIT_PAYMENT, late_fee, order_total, round_minor, split,
};
use preorder_tools::{
    DraftLineItem, DraftOrderRequest, NotificationDispatcher, NotificationTemplate, OrderAdapter,
    RefundRequest,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSplitPayment {
    pub shop_id: String,
    pub buyer: BuyerInfo,
    pub line: LineInfo,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub currency: String,
    pub requested_percentage: Option<i32>,
    #[serde(default)]
    pub addresses: Addresses,
    pub notes: Option<String>,
}

/// Drives a split payment order through its lifecycle. Every transition
/// reads the current record, talks to the order platform first and only then
/// persists, so a failed external call leaves the stored order untouched.
pub struct SplitPaymentOrchestrator<S, A, N> {
    store: S,
    adapter: A,
    dispatcher: N,
}

impl<S, A, N> SplitPaymentOrchestrator<S, A, N>
where
    S: SplitPaymentStore,
    A: OrderAdapter,
    N: NotificationDispatcher,
{
    pub fn new(store: S, adapter: A, dispatcher: N) -> Self {
        Self {
            store,
            adapter,
            dispatcher,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    pub fn dispatcher(&self) -> &N {
        &self.dispatcher
    }

    pub async fn create(
        &self,
        request: CreateSplitPayment,
    ) -> SplitPaymentResult<SplitPaymentOrder> {
        let currency = validate_create_request(&request)?;
        let unit_price = round_minor(request.unit_price);
        let total_amount = order_total(request.quantity, unit_price)?;

        let config = self
            .load_config(&request.shop_id)
            .await?
            .filter(|config| config.enabled)
            .ok_or_else(|| SplitPaymentError::FeatureDisabled {
                shop_id: request.shop_id.clone(),
            })?;

        let percentage = request
            .requested_percentage
            .unwrap_or(config.default_percentage);
        if !config.accepts_percentage(percentage) {
            return Err(SplitPaymentError::InvalidPercentage {
                requested: percentage,
                minimum: config.minimum_deposit,
                maximum: config.maximum_deposit,
            });
        }

        let amounts = split(total_amount, percentage, config.payment_terms_days)?;
        let shop = self.load_shop(&request.shop_id).await?;
        let id = Uuid::new_v4();

        let deposit_draft = draft_order(
            id,
            &request,
            &currency,
            PaymentLeg::Deposit,
            amounts.deposit_amount,
            percentage,
            amounts.due_date,
        );
        let deposit_order_ref = self
            .adapter
            .create_order(&shop, &deposit_draft)
            .await
            .map_err(SplitPaymentError::Adapter)?;

        let remaining_draft = draft_order(
            id,
            &request,
            &currency,
            PaymentLeg::Remaining,
            amounts.remaining_amount,
            100 - percentage,
            amounts.due_date,
        );
        let remaining_order_ref = match self.adapter.create_order(&shop, &remaining_draft).await {
            Ok(order_ref) => order_ref,
            Err(err) => {
                error!(
                    "split payment {id}: remaining order creation failed, deposit order {deposit_order_ref} on shop {} is orphaned: {err:#}",
                    shop.shop_id
                );
                return Err(SplitPaymentError::Adapter(err));
            }
        };

        let now = Utc::now();
        let order = SplitPaymentOrder {
            id,
            shop_id: request.shop_id.clone(),
            customer_email: request.buyer.email.trim().to_string(),
            customer_name: request.buyer.name.clone(),
            product_id: request.line.product_id.clone(),
            variant_id: request.line.variant_id.clone(),
            product_title: request.line.product_title.clone(),
            variant_title: request.line.variant_title.clone(),
            quantity: request.quantity,
            unit_price,
            currency,
            total_amount,
            deposit_percentage: percentage,
            deposit_amount: amounts.deposit_amount,
            remaining_amount: amounts.remaining_amount,
            deposit_order_ref: Some(deposit_order_ref.clone()),
            remaining_order_ref: Some(remaining_order_ref.clone()),
            deposit_paid_order_id: None,
            remaining_paid_order_id: None,
            deposit_paid: false,
            remaining_paid: false,
            deposit_refunded: false,
            remaining_refunded: false,
            deposit_paid_at: None,
            remaining_paid_at: None,
            remaining_invoice_sent_at: None,
            due_date: amounts.due_date,
            status: SplitPaymentStatus::PendingDeposit,
            notes: request
                .notes
                .as_deref()
                .map(str::trim)
                .filter(|notes| !notes.is_empty())
                .map(str::to_string),
            tags: BTreeSet::from([TAG_SPLIT_PAYMENT.to_string()]),
            created_at: now,
            updated_at: now,
        };

        let order = match self.store.insert_order(order).await {
            Ok(order) => order,
            Err(err) => {
                error!(
                    "failed to persist split payment {id}; external orders {deposit_order_ref} and {remaining_order_ref} have no local record: {err:#}"
                );
                return Err(SplitPaymentError::Store(err));
            }
        };

        let invoice_message = format!(
            "Deposit of {} {} ({}%) for your pre-order of {}. The remaining {} {} is due by {}.",
            order.deposit_amount,
            order.currency,
            order.deposit_percentage,
            order.product_title,
            order.remaining_amount,
            order.currency,
            format_date(order.due_date),
        );
        if let Err(err) = self
            .adapter
            .send_invoice(&shop, &deposit_order_ref, &invoice_message)
            .await
        {
            warn!("failed to send deposit invoice for split payment {id}: {err:#}");
        }

        self.notify(&order, NotificationTemplate::SplitPaymentCreated, json!({}))
            .await;

        info!(
            "split payment {} created for shop {}: total {} {}, deposit {}%",
            order.id, order.shop_id, order.total_amount, order.currency, order.deposit_percentage
        );

        Ok(order)
    }

    pub async fn handle_deposit_completed(
        &self,
        split_payment_id: Uuid,
        paid_order_ref: &str,
    ) -> SplitPaymentResult<SplitPaymentOrder> {
        let mut order = self.load_order(split_payment_id).await?;

        if order.deposit_paid {
            info!("deposit for split payment {split_payment_id} already recorded, skipping");
            return Ok(order);
        }
        if order.status != SplitPaymentStatus::PendingDeposit {
            return Err(SplitPaymentError::InvalidTransition {
                id: split_payment_id,
                status: order.status,
                action: "record the deposit of",
            });
        }

        order.deposit_paid = true;
        order.deposit_paid_at = Some(Utc::now());
        order.deposit_paid_order_id = Some(paid_order_ref.to_string());
        order.status = SplitPaymentStatus::DepositPaid;

        let order = self
            .store
            .update_order(order)
            .await
            .map_err(SplitPaymentError::Store)?;
        info!("deposit received for split payment {split_payment_id}");

        self.notify(
            &order,
            NotificationTemplate::DepositReceived,
            json!({ "paid_order_ref": paid_order_ref }),
        )
        .await;

        // The deposit stays recorded even if the balance invoice fails; the
        // reminder sweep sends it later.
        match self.store.get_config(&order.shop_id).await {
            Ok(Some(config)) if config.auto_charge_remaining => {
                match self.send_remaining_invoice(split_payment_id).await {
                    Ok(updated) => return Ok(updated),
                    Err(err) => warn!(
                        "automatic balance invoice for split payment {split_payment_id} failed: {err}"
                    ),
                }
            }
            Ok(_) => {}
            Err(err) => warn!(
                "could not load config for shop {} after deposit: {err:#}",
                order.shop_id
            ),
        }

        Ok(order)
    }

    pub async fn send_remaining_invoice(
        &self,
        split_payment_id: Uuid,
    ) -> SplitPaymentResult<SplitPaymentOrder> {
        let mut order = self.load_order(split_payment_id).await?;

        if !order.deposit_paid {
            return Err(SplitPaymentError::DepositNotPaid(split_payment_id));
        }
        if order.remaining_paid || order.status != SplitPaymentStatus::DepositPaid {
            return Err(SplitPaymentError::InvalidTransition {
                id: split_payment_id,
                status: order.status,
                action: "invoice the remaining balance of",
            });
        }
        let remaining_order_ref =
            order
                .remaining_order_ref
                .clone()
                .ok_or(SplitPaymentError::MissingOrderReference {
                    id: split_payment_id,
                    leg: "remaining",
                })?;

        let shop = self.load_shop(&order.shop_id).await?;
        let config = self.load_config(&order.shop_id).await?;
        let now = Utc::now();
        let fee = config
            .as_ref()
            .map(|config| late_fee(order.remaining_amount, config, order.due_date, now))
            .unwrap_or(Decimal::ZERO);

        let mut message = format!(
            "Remaining balance of {} {} for your pre-order of {} is due by {}.",
            order.remaining_amount,
            order.currency,
            order.product_title,
            format_date(order.due_date),
        );
        if fee > Decimal::ZERO {
            message.push_str(&format!(
                " A late fee of {fee} {} applies to overdue balances.",
                order.currency
            ));
        }

        self.adapter
            .send_invoice(&shop, &remaining_order_ref, &message)
            .await
            .map_err(SplitPaymentError::Adapter)?;

        order.remaining_invoice_sent_at = Some(now);
        let order = self
            .store
            .update_order(order)
            .await
            .map_err(SplitPaymentError::Store)?;
        info!("remaining balance invoice sent for split payment {split_payment_id}");

        self.notify(
            &order,
            NotificationTemplate::RemainingPaymentDue,
            json!({ "late_fee": fee.to_string() }),
        )
        .await;

        Ok(order)
    }

    pub async fn handle_remaining_completed(
        &self,
        split_payment_id: Uuid,
        paid_order_ref: &str,
    ) -> SplitPaymentResult<SplitPaymentOrder> {
        let mut order = self.load_order(split_payment_id).await?;

        if order.remaining_paid {
            info!(
                "remaining payment for split payment {split_payment_id} already recorded, skipping"
            );
            return Ok(order);
        }
        if !order.deposit_paid {
            return Err(SplitPaymentError::DepositNotPaid(split_payment_id));
        }
        if order.status != SplitPaymentStatus::DepositPaid {
            return Err(SplitPaymentError::InvalidTransition {
                id: split_payment_id,
                status: order.status,
                action: "record the remaining payment of",
            });
        }

        order.remaining_paid = true;
        order.remaining_paid_at = Some(Utc::now());
        order.remaining_paid_order_id = Some(paid_order_ref.to_string());
        order.status = SplitPaymentStatus::Completed;

        let order = self
            .store
            .update_order(order)
            .await
            .map_err(SplitPaymentError::Store)?;
        info!("split payment {split_payment_id} completed");

        self.notify(
            &order,
            NotificationTemplate::SplitPaymentCompleted,
            json!({ "paid_order_ref": paid_order_ref }),
        )
        .await;

        Ok(order)
    }

    /// Cancels a non-terminal order. A paid deposit is refunded first and its
    /// refund marker stored before the status changes; if the refund fails the
    /// order keeps its current status.
    pub async fn cancel(
        &self,
        split_payment_id: Uuid,
        reason: Option<&str>,
    ) -> SplitPaymentResult<SplitPaymentOrder> {
        let mut order = self.load_order(split_payment_id).await?;

        if order.status.is_terminal() {
            return Err(SplitPaymentError::InvalidTransition {
                id: split_payment_id,
                status: order.status,
                action: "cancel",
            });
        }

        if order.deposit_paid && !order.deposit_refunded {
            let paid_order_ref = order.deposit_paid_order_id.clone().ok_or(
                SplitPaymentError::MissingOrderReference {
                    id: split_payment_id,
                    leg: "paid deposit",
                },
            )?;
            let shop = self.load_shop(&order.shop_id).await?;
            let note = refund_note("cancelled", reason);

            self.adapter
                .refund(&shop, &paid_order_ref, &RefundRequest::full(note))
                .await
                .map_err(|source| {
                    error!(
                        "deposit refund for split payment {split_payment_id} failed, order left {}",
                        order.status
                    );
                    SplitPaymentError::RefundFailed {
                        id: split_payment_id,
                        source,
                    }
                })?;

            order.deposit_refunded = true;
            order = self
                .store
                .update_order(order)
                .await
                .map_err(SplitPaymentError::Store)?;
        }

        order.append_note(&status_note("Cancelled", reason));
        order.status = SplitPaymentStatus::Cancelled;

        let order = self
            .store
            .update_order(order)
            .await
            .map_err(SplitPaymentError::Store)?;
        info!(
            "split payment {split_payment_id} cancelled (deposit refunded: {})",
            order.deposit_refunded
        );

        self.notify(
            &order,
            NotificationTemplate::SplitPaymentCancelled,
            json!({
                "reason": reason,
                "deposit_refunded": order.deposit_refunded,
            }),
        )
        .await;

        Ok(order)
    }

    /// Refunds every paid leg in full and moves the order to `refunded`.
    /// Each leg's refund marker is persisted as soon as that refund succeeds,
    /// so a retry after a partial failure only refunds what is left.
    pub async fn refund(
        &self,
        split_payment_id: Uuid,
        reason: Option<&str>,
    ) -> SplitPaymentResult<SplitPaymentOrder> {
        let mut order = self.load_order(split_payment_id).await?;

        if !matches!(
            order.status,
            SplitPaymentStatus::DepositPaid | SplitPaymentStatus::Completed
        ) {
            return Err(SplitPaymentError::InvalidTransition {
                id: split_payment_id,
                status: order.status,
                action: "refund",
            });
        }

        let shop = self.load_shop(&order.shop_id).await?;
        let note = refund_note("refunded", reason);

        for leg in [PaymentLeg::Deposit, PaymentLeg::Remaining] {
            let (paid, refunded, paid_order_ref) = match leg {
                PaymentLeg::Deposit => (
                    order.deposit_paid,
                    order.deposit_refunded,
                    order.deposit_paid_order_id.clone(),
                ),
                PaymentLeg::Remaining => (
                    order.remaining_paid,
                    order.remaining_refunded,
                    order.remaining_paid_order_id.clone(),
                ),
            };
            if !paid || refunded {
                continue;
            }

            let paid_order_ref = paid_order_ref.ok_or(SplitPaymentError::MissingOrderReference {
                id: split_payment_id,
                leg: leg.as_str(),
            })?;
            self.adapter
                .refund(&shop, &paid_order_ref, &RefundRequest::full(note.clone()))
                .await
                .map_err(|source| SplitPaymentError::RefundFailed {
                    id: split_payment_id,
                    source,
                })?;

            match leg {
                PaymentLeg::Deposit => order.deposit_refunded = true,
                PaymentLeg::Remaining => order.remaining_refunded = true,
            }
            order = self
                .store
                .update_order(order)
                .await
                .map_err(SplitPaymentError::Store)?;
            info!(
                "{} leg of split payment {split_payment_id} refunded",
                leg.as_str()
            );
        }

        order.append_note(&status_note("Refunded", reason));
        order.status = SplitPaymentStatus::Refunded;

        let order = self
            .store
            .update_order(order)
            .await
            .map_err(SplitPaymentError::Store)?;

        self.notify(
            &order,
            NotificationTemplate::SplitPaymentRefunded,
            json!({ "reason": reason }),
        )
        .await;

        Ok(order)
    }

    pub async fn get(&self, split_payment_id: Uuid) -> SplitPaymentResult<SplitPaymentOrder> {
        self.load_order(split_payment_id).await
    }

    pub async fn list(&self, filter: &OrderFilter) -> SplitPaymentResult<Vec<SplitPaymentOrder>> {
        self.store
            .list_orders(filter)
            .await
            .map_err(SplitPaymentError::Store)
    }

    async fn load_order(&self, split_payment_id: Uuid) -> SplitPaymentResult<SplitPaymentOrder> {
        self.store
            .get_order(split_payment_id)
            .await
            .map_err(SplitPaymentError::Store)?
            .ok_or_else(|| SplitPaymentError::OrderNotFound(split_payment_id.to_string()))
    }

    async fn load_shop(&self, shop_id: &str) -> SplitPaymentResult<Shop> {
        self.store
            .get_shop(shop_id)
            .await
            .map_err(SplitPaymentError::Store)?
            .ok_or_else(|| SplitPaymentError::ShopNotFound(shop_id.to_string()))
    }

    async fn load_config(&self, shop_id: &str) -> SplitPaymentResult<Option<SplitPaymentConfig>> {
        self.store
            .get_config(shop_id)
            .await
            .map_err(SplitPaymentError::Store)
    }

    async fn notify(&self, order: &SplitPaymentOrder, template: NotificationTemplate, extra: Value) {
        let mut variables = json!({
            "split_payment_id": order.id,
            "customer_name": order.customer_name,
            "product_title": order.product_title,
            "variant_title": order.variant_title,
            "currency": order.currency,
            "total_amount": order.total_amount.to_string(),
            "deposit_amount": order.deposit_amount.to_string(),
            "remaining_amount": order.remaining_amount.to_string(),
            "deposit_percentage": order.deposit_percentage,
            "due_date": format_date(order.due_date),
            "status": order.status,
        });
        if let (Some(base), Value::Object(extra)) = (variables.as_object_mut(), extra) {
            base.extend(extra);
        }

        if let Err(err) = self
            .dispatcher
            .send(&order.shop_id, template, &order.customer_email, variables)
            .await
        {
            warn!(
                "failed to send {} notification for split payment {}: {err:#}",
                template.key(),
                order.id
            );
        }
    }
}

fn validate_create_request(request: &CreateSplitPayment) -> SplitPaymentResult<String> {
    if request.shop_id.trim().is_empty() {
        return Err(invalid_input("shop_id is required"));
    }
    if request.buyer.email.trim().is_empty() || !request.buyer.email.contains('@') {
        return Err(invalid_input("customer email is required"));
    }
    if request.line.product_id.trim().is_empty() {
        return Err(invalid_input("product_id is required"));
    }
    if request.line.product_title.trim().is_empty() {
        return Err(invalid_input("product_title is required"));
    }

    let currency = request.currency.trim().to_ascii_uppercase();
    if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(invalid_input("currency must be a 3-letter code"));
    }

    Ok(currency)
}

fn invalid_input(message: &str) -> SplitPaymentError {
    SplitPaymentError::InvalidInput(message.to_string())
}

fn draft_order(
    id: Uuid,
    request: &CreateSplitPayment,
    currency: &str,
    leg: PaymentLeg,
    amount: Decimal,
    leg_percentage: i32,
    due_date: DateTime<Utc>,
) -> DraftOrderRequest {
    let product = match &request.line.variant_title {
        Some(variant) if !variant.trim().is_empty() => {
            format!("{} - {}", request.line.product_title, variant.trim())
        }
        _ => request.line.product_title.clone(),
    };
    let (title, note) = match leg {
        PaymentLeg::Deposit => (
            format!("{product} (Deposit {leg_percentage}%)"),
            format!("Split payment {id}: deposit for {} x {product}", request.quantity),
        ),
        PaymentLeg::Remaining => (
            format!("{product} (Remaining balance {leg_percentage}%)"),
            format!(
                "Split payment {id}: remaining balance for {} x {product}, due {}",
                request.quantity,
                format_date(due_date)
            ),
        ),
    };

    DraftOrderRequest {
        line_items: vec![DraftLineItem {
            title,
            product_id: request.line.product_id.clone(),
            variant_id: request.line.variant_id.clone(),
            quantity: 1,
            price: amount,
        }],
        buyer: request.buyer.clone(),
        currency: currency.to_string(),
        tags: vec![TAG_SPLIT_PAYMENT.to_string(), leg.tag().to_string()],
        note,
        shipping_address: request.addresses.shipping.clone(),
        billing_address: request.addresses.billing.clone(),
        idempotency_key: format!("{id}:{}", leg.as_str()),
    }
}

fn refund_note(action: &str, reason: Option<&str>) -> String {
    match reason.map(str::trim).filter(|reason| !reason.is_empty()) {
        Some(reason) => format!("Split payment {action}: {reason}"),
        None => format!("Split payment {action}"),
    }
}

fn status_note(label: &str, reason: Option<&str>) -> String {
    match reason.map(str::trim).filter(|reason| !reason.is_empty()) {
        Some(reason) => format!("{label}: {reason}"),
        None => label.to_string(),
    }
}

fn format_date(value: DateTime<Utc>) -> String {
    value.format("%Y-%m-%d").to_string()
}

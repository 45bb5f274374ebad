use preorder_core::{
    ActivityLog, ActivityLogEntry, ExternalOrderCompletedEvent, PaymentLeg, Shop,
    SplitPaymentError, SplitPaymentResult, SplitPaymentStatus, SplitPaymentStore,
};
use preorder_tools::{NotificationDispatcher, OrderAdapter};
use serde::Serialize;
use serde_json::json;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::orchestrator::SplitPaymentOrchestrator;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RouteOutcome {
    DepositCompleted {
        split_payment_id: Uuid,
        status: SplitPaymentStatus,
        replayed: bool,
    },
    RemainingCompleted {
        split_payment_id: Uuid,
        status: SplitPaymentStatus,
        replayed: bool,
    },
    Ignored {
        reason: String,
    },
    OrderNotFound {
        order_ref: String,
    },
}

impl RouteOutcome {
    pub fn action(&self) -> &'static str {
        match self {
            Self::DepositCompleted { .. } => "split_payment.deposit_completed",
            Self::RemainingCompleted { .. } => "split_payment.remaining_completed",
            Self::Ignored { .. } => "split_payment.webhook_ignored",
            Self::OrderNotFound { .. } => "split_payment.webhook_order_not_found",
        }
    }

    fn split_payment_id(&self) -> Option<Uuid> {
        match self {
            Self::DepositCompleted {
                split_payment_id, ..
            }
            | Self::RemainingCompleted {
                split_payment_id, ..
            } => Some(*split_payment_id),
            Self::Ignored { .. } | Self::OrderNotFound { .. } => None,
        }
    }
}

/// Entry point for "order completed" webhooks from the order platform.
pub struct WebhookRouter<'a, S, A, N> {
    orchestrator: &'a SplitPaymentOrchestrator<S, A, N>,
}

impl<'a, S, A, N> WebhookRouter<'a, S, A, N>
where
    S: SplitPaymentStore + ActivityLog,
    A: OrderAdapter,
    N: NotificationDispatcher,
{
    pub fn new(orchestrator: &'a SplitPaymentOrchestrator<S, A, N>) -> Self {
        Self { orchestrator }
    }

    /// Routes one event and records the outcome in the activity log.
    /// Foreign and unmatched events resolve to `Ok` so the delivery can be
    /// acknowledged; handler failures are returned after being recorded.
    pub async fn route(
        &self,
        event: &ExternalOrderCompletedEvent,
    ) -> SplitPaymentResult<RouteOutcome> {
        let shop = self
            .orchestrator
            .store()
            .find_shop_by_domain(&event.shop_domain)
            .await
            .map_err(SplitPaymentError::Store)?;

        let result = self.dispatch(shop.as_ref(), event).await;

        let shop_id = shop
            .as_ref()
            .map(|shop| shop.shop_id.clone())
            .unwrap_or_else(|| event.shop_domain.clone());
        self.record(&shop_id, event, &result).await;

        result
    }

    async fn dispatch(
        &self,
        shop: Option<&Shop>,
        event: &ExternalOrderCompletedEvent,
    ) -> SplitPaymentResult<RouteOutcome> {
        let leg = match PaymentLeg::classify(&event.correlation_tags) {
            Ok(leg) => leg,
            Err(err) => {
                info!("ignoring order {} from {}: {err}", event.order_ref, event.shop_domain);
                return Ok(RouteOutcome::Ignored {
                    reason: err.to_string(),
                });
            }
        };

        let Some(shop) = shop else {
            warn!(
                "ignoring split payment webhook from unknown shop {}",
                event.shop_domain
            );
            return Ok(RouteOutcome::Ignored {
                reason: format!("unknown shop {}", event.shop_domain),
            });
        };

        let order = self
            .orchestrator
            .store()
            .find_order_by_ref(&shop.shop_id, &event.order_ref)
            .await
            .map_err(SplitPaymentError::Store)?;
        let Some(order) = order else {
            let err = SplitPaymentError::OrderNotFound(event.order_ref.clone());
            warn!("{err} (shop {}), acknowledging webhook", shop.shop_id);
            return Ok(RouteOutcome::OrderNotFound {
                order_ref: event.order_ref.clone(),
            });
        };

        let expected_ref = match leg {
            PaymentLeg::Deposit => order.deposit_order_ref.as_deref(),
            PaymentLeg::Remaining => order.remaining_order_ref.as_deref(),
        };
        if expected_ref != Some(event.order_ref.as_str()) {
            warn!(
                "order {} is tagged {} but is not the {} order of split payment {}",
                event.order_ref,
                leg.tag(),
                leg.as_str(),
                order.id
            );
            return Ok(RouteOutcome::Ignored {
                reason: format!("order is not the {} leg of its split payment", leg.as_str()),
            });
        }

        let outcome = match leg {
            PaymentLeg::Deposit => {
                let replayed = order.deposit_paid;
                self.orchestrator
                    .handle_deposit_completed(order.id, event.paid_order_ref())
                    .await
                    .map(|updated| RouteOutcome::DepositCompleted {
                        split_payment_id: updated.id,
                        status: updated.status,
                        replayed,
                    })
            }
            PaymentLeg::Remaining => {
                let replayed = order.remaining_paid;
                self.orchestrator
                    .handle_remaining_completed(order.id, event.paid_order_ref())
                    .await
                    .map(|updated| RouteOutcome::RemainingCompleted {
                        split_payment_id: updated.id,
                        status: updated.status,
                        replayed,
                    })
            }
        };

        if let Err(err) = &outcome {
            error!(
                "{} webhook for split payment {} failed: {err}",
                leg.as_str(),
                order.id
            );
        }

        outcome
    }

    async fn record(
        &self,
        shop_id: &str,
        event: &ExternalOrderCompletedEvent,
        result: &SplitPaymentResult<RouteOutcome>,
    ) {
        let (action, resource_id, outcome) = match result {
            Ok(outcome) => (
                outcome.action(),
                outcome
                    .split_payment_id()
                    .map(|id| id.to_string())
                    .unwrap_or_else(|| event.order_ref.clone()),
                json!(outcome),
            ),
            Err(err) => (
                "split_payment.webhook_failed",
                event.order_ref.clone(),
                json!({ "outcome": "failed", "error": err.to_string() }),
            ),
        };

        let entry = ActivityLogEntry::new(
            shop_id,
            action,
            Some(resource_id),
            json!({
                "order_ref": event.order_ref,
                "paid_order_ref": event.paid_order_ref(),
                "shop_domain": event.shop_domain,
                "correlation_tags": event.correlation_tags,
                "result": outcome,
            }),
        );

        if let Err(err) = self.orchestrator.store().append(entry).await {
            warn!(
                "failed to record activity for order {}: {err:#}",
                event.order_ref
            );
        }
    }
}

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use preorder_core::{
    OrderFilter, SplitPaymentConfig, SplitPaymentOrder, SplitPaymentResult, SplitPaymentStatus,
    SplitPaymentStore,
};
use preorder_tools::{NotificationDispatcher, OrderAdapter};
use serde::Serialize;
use tracing::{info, warn};

use crate::orchestrator::SplitPaymentOrchestrator;

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct ReminderSweepReport {
    pub examined: usize,
    pub reminded: usize,
    pub failed: usize,
}

/// Whether the balance invoice of `order` should go out again at `now`.
///
/// Reminders fire on the configured day offsets before the due date, and
/// once more on the first day a late fee applies. At most one invoice is
/// sent per calendar day.
pub fn reminder_due(
    order: &SplitPaymentOrder,
    config: &SplitPaymentConfig,
    now: DateTime<Utc>,
) -> bool {
    if !config.send_payment_reminders
        || order.remaining_paid
        || order.status != SplitPaymentStatus::DepositPaid
    {
        return false;
    }

    let today = now.date_naive();
    if order
        .remaining_invoice_sent_at
        .is_some_and(|sent_at| sent_at.date_naive() == today)
    {
        return false;
    }

    let days_until_due = (order.due_date.date_naive() - today).num_days();
    if days_until_due >= 0 {
        return config
            .reminder_days_before
            .iter()
            .any(|offset| i64::from(*offset) == days_until_due);
    }

    config.late_fee_enabled && -days_until_due == i64::from(config.grace_period_days) + 1
}

pub async fn run_reminder_sweep<S, A, N>(
    orchestrator: &SplitPaymentOrchestrator<S, A, N>,
    now: DateTime<Utc>,
) -> SplitPaymentResult<ReminderSweepReport>
where
    S: SplitPaymentStore,
    A: OrderAdapter,
    N: NotificationDispatcher,
{
    let filter = OrderFilter {
        status: Some(SplitPaymentStatus::DepositPaid),
        ..OrderFilter::default()
    };
    let orders = orchestrator.list(&filter).await?;

    let mut configs: HashMap<String, Option<SplitPaymentConfig>> = HashMap::new();
    let mut unreadable_shops: HashSet<String> = HashSet::new();
    let mut report = ReminderSweepReport::default();

    for order in orders {
        report.examined += 1;

        if unreadable_shops.contains(&order.shop_id) {
            report.failed += 1;
            continue;
        }
        if !configs.contains_key(&order.shop_id) {
            match orchestrator.store().get_config(&order.shop_id).await {
                Ok(config) => {
                    configs.insert(order.shop_id.clone(), config);
                }
                Err(err) => {
                    warn!(
                        "skipping reminders for shop {}: config unavailable: {err:#}",
                        order.shop_id
                    );
                    unreadable_shops.insert(order.shop_id.clone());
                    report.failed += 1;
                    continue;
                }
            }
        }
        let Some(Some(config)) = configs.get(&order.shop_id) else {
            continue;
        };

        if !reminder_due(&order, config, now) {
            continue;
        }

        match orchestrator.send_remaining_invoice(order.id).await {
            Ok(_) => report.reminded += 1,
            Err(err) => {
                report.failed += 1;
                warn!("payment reminder for split payment {} failed: {err}", order.id);
            }
        }
    }

    info!(
        "reminder sweep examined {} orders, reminded {}, failed {}",
        report.examined, report.reminded, report.failed
    );

    Ok(report)
}

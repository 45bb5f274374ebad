mod common;

use common::{SHOP_DOMAIN, lamp_request, orchestrator};
use preorder_core::{ActivityLog, ExternalOrderCompletedEvent, SplitPaymentStatus};
use preorder_split::{RouteOutcome, WebhookRouter};

fn event(order_ref: &str, tags: &[&str]) -> ExternalOrderCompletedEvent {
    ExternalOrderCompletedEvent {
        order_ref: order_ref.to_string(),
        correlation_tags: tags.iter().map(|tag| tag.to_string()).collect(),
        shop_domain: SHOP_DOMAIN.to_string(),
        paid_order_ref: None,
    }
}

#[tokio::test]
async fn deposit_then_final_payment_completes_the_order() {
    let orchestrator = orchestrator().await;
    let order = orchestrator.create(lamp_request(Some(30))).await.unwrap();
    let router = WebhookRouter::new(&orchestrator);

    let deposit = router
        .route(&event("draft-1", &["split-payment", "deposit"]))
        .await
        .unwrap();
    assert_eq!(
        deposit,
        RouteOutcome::DepositCompleted {
            split_payment_id: order.id,
            status: SplitPaymentStatus::DepositPaid,
            replayed: false,
        }
    );

    let remaining = router
        .route(&event("draft-2", &["split-payment", "final-payment"]))
        .await
        .unwrap();
    assert_eq!(
        remaining,
        RouteOutcome::RemainingCompleted {
            split_payment_id: order.id,
            status: SplitPaymentStatus::Completed,
            replayed: false,
        }
    );

    let stored = orchestrator.get(order.id).await.unwrap();
    assert_eq!(stored.deposit_paid_order_id.as_deref(), Some("draft-1"));
    assert_eq!(stored.remaining_paid_order_id.as_deref(), Some("draft-2"));

    let activity = orchestrator
        .store()
        .entries_for(&order.id.to_string())
        .await
        .unwrap();
    let actions: Vec<&str> = activity.iter().map(|entry| entry.action.as_str()).collect();
    assert_eq!(
        actions,
        vec![
            "split_payment.deposit_completed",
            "split_payment.remaining_completed"
        ]
    );
}

#[tokio::test]
async fn replayed_deposit_webhook_is_acknowledged() {
    let orchestrator = orchestrator().await;
    let order = orchestrator.create(lamp_request(Some(30))).await.unwrap();
    let router = WebhookRouter::new(&orchestrator);
    let deposit = event("draft-1", &["split-payment", "deposit"]);

    router.route(&deposit).await.unwrap();
    let replay = router.route(&deposit).await.unwrap();

    assert_eq!(
        replay,
        RouteOutcome::DepositCompleted {
            split_payment_id: order.id,
            status: SplitPaymentStatus::DepositPaid,
            replayed: true,
        }
    );
}

#[tokio::test]
async fn uses_the_paid_order_ref_when_present() {
    let orchestrator = orchestrator().await;
    let order = orchestrator.create(lamp_request(Some(30))).await.unwrap();
    let router = WebhookRouter::new(&orchestrator);
    let mut deposit = event("draft-1", &["split-payment", "deposit"]);
    deposit.paid_order_ref = Some("order-5001".to_string());

    router.route(&deposit).await.unwrap();

    let stored = orchestrator.get(order.id).await.unwrap();
    assert_eq!(stored.deposit_paid_order_id.as_deref(), Some("order-5001"));
}

#[tokio::test]
async fn foreign_and_ambiguous_events_are_ignored_and_logged() {
    let orchestrator = orchestrator().await;
    let router = WebhookRouter::new(&orchestrator);

    for tags in [
        vec!["gift-card"],
        vec!["split-payment"],
        vec!["split-payment", "deposit", "final-payment"],
    ] {
        let outcome = router.route(&event("order-77", &tags)).await.unwrap();
        assert!(matches!(outcome, RouteOutcome::Ignored { .. }), "{tags:?}");
    }

    let activity = orchestrator.store().entries_for("order-77").await.unwrap();
    assert_eq!(activity.len(), 3);
    assert!(
        activity
            .iter()
            .all(|entry| entry.action == "split_payment.webhook_ignored")
    );
}

#[tokio::test]
async fn unmatched_order_is_acknowledged() {
    let orchestrator = orchestrator().await;
    orchestrator.create(lamp_request(Some(30))).await.unwrap();
    let router = WebhookRouter::new(&orchestrator);

    let outcome = router
        .route(&event("draft-404", &["split-payment", "deposit"]))
        .await
        .unwrap();

    assert_eq!(
        outcome,
        RouteOutcome::OrderNotFound {
            order_ref: "draft-404".to_string()
        }
    );
}

#[tokio::test]
async fn tag_that_disagrees_with_the_matched_leg_is_ignored() {
    let orchestrator = orchestrator().await;
    let order = orchestrator.create(lamp_request(Some(30))).await.unwrap();
    let router = WebhookRouter::new(&orchestrator);

    let outcome = router
        .route(&event("draft-2", &["split-payment", "deposit"]))
        .await
        .unwrap();

    assert!(matches!(outcome, RouteOutcome::Ignored { .. }));
    let stored = orchestrator.get(order.id).await.unwrap();
    assert_eq!(stored.status, SplitPaymentStatus::PendingDeposit);
}

#[tokio::test]
async fn handler_failures_are_recorded_and_returned() {
    let orchestrator = orchestrator().await;
    let order = orchestrator.create(lamp_request(Some(30))).await.unwrap();
    let router = WebhookRouter::new(&orchestrator);

    let result = router
        .route(&event("draft-2", &["split-payment", "final-payment"]))
        .await;

    assert!(result.is_err());
    let activity = orchestrator.store().entries_for("draft-2").await.unwrap();
    assert_eq!(activity.len(), 1);
    assert_eq!(activity[0].action, "split_payment.webhook_failed");
    assert_eq!(
        orchestrator.get(order.id).await.unwrap().status,
        SplitPaymentStatus::PendingDeposit
    );
}

#[tokio::test]
async fn events_from_unknown_shops_are_ignored() {
    let orchestrator = orchestrator().await;
    let router = WebhookRouter::new(&orchestrator);
    let mut deposit = event("draft-1", &["split-payment", "deposit"]);
    deposit.shop_domain = "unknown.example".to_string();

    let outcome = router.route(&deposit).await.unwrap();

    assert!(matches!(outcome, RouteOutcome::Ignored { .. }));
}

mod common;

use chrono::Utc;
use common::{SHOP_ID, enabled_config, faulty_orchestrator, lamp_request, orchestrator_with};
use preorder_split::run_reminder_sweep;

#[tokio::test]
async fn sweep_invoices_balances_on_reminder_days() {
    let mut config = enabled_config();
    config.payment_terms_days = 7;
    config.reminder_days_before = vec![7];
    let orchestrator = orchestrator_with(config).await;

    let awaiting = orchestrator.create(lamp_request(Some(30))).await.unwrap();
    orchestrator
        .handle_deposit_completed(awaiting.id, "paid-1")
        .await
        .unwrap();
    // Still waiting for its deposit, so never reminded.
    orchestrator.create(lamp_request(Some(30))).await.unwrap();
    orchestrator.adapter().clear();

    let now = Utc::now();
    let report = run_reminder_sweep(&orchestrator, now).await.unwrap();

    assert_eq!(report.examined, 1);
    assert_eq!(report.reminded, 1);
    assert_eq!(report.failed, 0);
    assert_eq!(orchestrator.adapter().invoices(), vec!["draft-2".to_string()]);

    // A second run on the same day does not invoice again.
    let again = run_reminder_sweep(&orchestrator, now).await.unwrap();
    assert_eq!(again.reminded, 0);
}

#[tokio::test]
async fn sweep_skips_shops_with_reminders_off() {
    let mut config = enabled_config();
    config.payment_terms_days = 3;
    config.reminder_days_before = vec![3];
    config.send_payment_reminders = false;
    let orchestrator = orchestrator_with(config).await;

    let order = orchestrator.create(lamp_request(Some(30))).await.unwrap();
    orchestrator
        .handle_deposit_completed(order.id, "paid-1")
        .await
        .unwrap();

    let report = run_reminder_sweep(&orchestrator, Utc::now()).await.unwrap();

    assert_eq!(report.examined, 1);
    assert_eq!(report.reminded, 0);
}

#[tokio::test]
async fn unreadable_shop_config_does_not_stop_the_sweep() {
    let mut healthy = enabled_config();
    healthy.payment_terms_days = 7;
    healthy.reminder_days_before = vec![7];
    let mut broken = healthy.clone();
    broken.shop_id = "shop-2".to_string();
    let orchestrator = faulty_orchestrator(vec![healthy, broken]).await;

    for shop_id in [SHOP_ID, "shop-2"] {
        let mut request = lamp_request(Some(30));
        request.shop_id = shop_id.to_string();
        let order = orchestrator.create(request).await.unwrap();
        orchestrator
            .handle_deposit_completed(order.id, "paid")
            .await
            .unwrap();
    }
    orchestrator.adapter().clear();
    orchestrator
        .store()
        .config_failures
        .lock()
        .unwrap()
        .insert("shop-2".to_string());

    let report = run_reminder_sweep(&orchestrator, Utc::now()).await.unwrap();

    assert_eq!(report.examined, 2);
    assert_eq!(report.reminded, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(orchestrator.adapter().invoices(), vec!["draft-2".to_string()]);
}

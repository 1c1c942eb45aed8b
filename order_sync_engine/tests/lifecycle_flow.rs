//! End-to-end order lifecycle: checkout, payment declaration, confirmation, shipment, delivery.

use std::sync::{Arc, Mutex};

use gss_common::Money;
use order_sync_engine::{
    cache::FileStore,
    events::{EventHooks, NotificationCategory},
    manager::ManagerState,
    order_types::{ClientStatus, DraftOrder, LineItem, RemoteOrderRecord},
    test_utils::{init_test_logging, owner, MemoryRemote},
    workflow::{StepStatus, STEP_DELIVERED, STEP_PAYMENT_PENDING, STEP_PREPARATION},
    UnifiedOrderManager,
};

async fn settle() {
    tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
}

#[tokio::test]
async fn order_lifecycle_from_checkout_to_delivery() {
    init_test_logging();
    let remote = MemoryRemote::new();
    let seen: Arc<Mutex<Vec<NotificationCategory>>> = Arc::default();
    let mut hooks = EventHooks::default();
    let sink = Arc::clone(&seen);
    hooks.on_notification(move |event| {
        let sink = Arc::clone(&sink);
        Box::pin(async move {
            sink.lock().unwrap().push(event.0.category);
        })
    });
    let manager = UnifiedOrderManager::with_hooks(
        owner(),
        remote.clone(),
        Arc::new(FileStore::in_memory()),
        25,
        hooks,
    );

    assert!(manager.initialize().await);
    assert_eq!(manager.state(), ManagerState::Active);

    // Checkout: 49.99, two items. Cached immediately, pushed to the remote store in the background.
    let draft = DraftOrder::new(vec![
        LineItem::new("p-1", "Scented candle", Money::from_cents(2999), 1),
        LineItem::new("p-2", "Gift wrap", Money::from_cents(2000), 1),
    ]);
    let order = manager.create_order(draft).unwrap();
    assert_eq!(order.total, Money::from_cents(4999));
    assert_eq!(order.client_status(), ClientStatus::Pending);
    settle().await;
    assert!(remote.rows().iter().any(|r| r.id.as_deref() == Some(order.id.as_str())));

    // The customer declares a bank transfer; the remote service pushes the update.
    let mut record = RemoteOrderRecord::from(&order);
    record.lifecycle_status = Some("declared".to_string());
    remote.push_update(record.clone()).await;
    settle().await;

    let cached = &manager.get_orders()[0];
    assert_eq!(cached.client_status(), ClientStatus::Preparing);
    let workflow = manager.workflow_for(&order.id).unwrap();
    assert_eq!(workflow.step(STEP_PAYMENT_PENDING).unwrap().status, StepStatus::InProgress);

    // An admin confirms the payment.
    record.lifecycle_status = Some("confirmed".to_string());
    remote.push_update(record.clone()).await;
    settle().await;

    let cached = &manager.get_orders()[0];
    assert_eq!(cached.client_status(), ClientStatus::Delivered);
    let workflow = manager.workflow_for(&order.id).unwrap();
    assert_eq!(workflow.step(STEP_PREPARATION).unwrap().status, StepStatus::InProgress);

    // A tracking reference appears; shipment and delivery close out the timeline.
    record.tracking_reference = Some("TRK-12345".to_string());
    remote.push_update(record.clone()).await;
    settle().await;

    let workflow = manager.workflow_for(&order.id).unwrap();
    assert_eq!(workflow.step(STEP_DELIVERED).unwrap().status, StepStatus::Completed);
    assert!(workflow.is_completed());

    let categories: Vec<NotificationCategory> =
        manager.notifications().iter().map(|n| n.category).collect();
    assert_eq!(categories, vec![
        NotificationCategory::NewOrder,
        NotificationCategory::Info,
        NotificationCategory::PaymentConfirmed,
        NotificationCategory::OrderShipped,
        NotificationCategory::OrderDelivered,
    ]);
    assert_eq!(manager.unread_notification_count(), 5);
    let first = manager.notifications()[0].id.clone();
    assert!(manager.mark_notification_read(&first));
    assert_eq!(manager.unread_notification_count(), 4);
    // The registered hook saw every notification too.
    assert_eq!(seen.lock().unwrap().len(), 5);

    // After cleanup, further pushes land nowhere.
    manager.cleanup().await;
    record.lifecycle_status = Some("rejected".to_string());
    remote.push_update(record).await;
    settle().await;
    assert_eq!(manager.get_orders()[0].client_status(), ClientStatus::Delivered);
    assert_eq!(manager.state(), ManagerState::Stopped);
}

#[tokio::test]
async fn duplicate_push_events_notify_once() {
    init_test_logging();
    let remote = MemoryRemote::new();
    let manager =
        UnifiedOrderManager::with_hooks(owner(), remote.clone(), Arc::new(FileStore::in_memory()), 25, EventHooks::default());
    manager.initialize().await;

    let order = manager
        .create_order(DraftOrder::new(vec![LineItem::new("p-1", "Mug", Money::from_cents(1250), 1)]))
        .unwrap();
    settle().await;

    let mut record = RemoteOrderRecord::from(&order);
    record.lifecycle_status = Some("declared".to_string());
    // The backend hiccups and delivers the same event twice, then a full sync re-reads the same state.
    remote.push_update(record.clone()).await;
    remote.push_update(record).await;
    settle().await;
    assert!(manager.full_sync().await);

    let categories: Vec<NotificationCategory> =
        manager.notifications().iter().map(|n| n.category).collect();
    assert_eq!(categories, vec![NotificationCategory::NewOrder, NotificationCategory::Info]);

    manager.cleanup().await;
}

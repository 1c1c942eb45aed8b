//! Degraded-mode behavior: the manager keeps serving cached data whatever the network does.

use std::sync::Arc;

use gss_common::Money;
use order_sync_engine::{
    cache::FileStore,
    events::EventProducers,
    manager::ManagerState,
    order_types::{ClientStatus, DraftOrder, LineItem},
    test_utils::{init_test_logging, owner, MemoryRemote},
    UnifiedOrderManager,
};

fn draft() -> DraftOrder {
    DraftOrder::new(vec![
        LineItem::new("p-1", "Scented candle", Money::from_cents(2999), 1),
        LineItem::new("p-2", "Gift wrap", Money::from_cents(2000), 1),
    ])
}

async fn settle() {
    tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
}

#[tokio::test]
async fn offline_startup_recovers_on_later_sync() {
    init_test_logging();
    let remote = MemoryRemote::new();
    remote.set_fail_all_queries(true);
    remote.set_fail_inserts(true);
    remote.set_fail_subscribe(true);
    let manager =
        UnifiedOrderManager::new(owner(), remote.clone(), Arc::new(FileStore::in_memory()), EventProducers::default());

    // Completely offline: initialization reports the failure but the manager still works off the cache.
    assert!(!manager.initialize().await);
    assert_eq!(manager.state(), ManagerState::Subscribing);
    let order = manager.create_order(draft()).unwrap();
    settle().await;
    assert_eq!(manager.get_orders().len(), 1);
    assert!(remote.rows().is_empty());

    // The network comes back; a manual sync pushes the locally created order up.
    remote.set_fail_all_queries(false);
    remote.set_fail_inserts(false);
    assert!(manager.full_sync().await);
    settle().await;
    assert!(remote.rows().iter().any(|r| r.id.as_deref() == Some(order.id.as_str())));
    assert_eq!(manager.get_orders().len(), 1);

    manager.cleanup().await;
}

#[tokio::test]
async fn double_submission_collapses_on_sync() {
    init_test_logging();
    let remote = MemoryRemote::new();
    remote.set_fail_inserts(true);
    let manager =
        UnifiedOrderManager::new(owner(), remote.clone(), Arc::new(FileStore::in_memory()), EventProducers::default());
    manager.initialize().await;

    // A flaky connection makes the customer tap "place order" twice. Both copies are cached and neither reaches
    // the remote store.
    let first = manager.create_order(draft()).unwrap();
    let second = manager.create_order(draft()).unwrap();
    assert_ne!(first.id, second.id);
    settle().await;
    assert_eq!(manager.get_orders().len(), 2);

    // The sync recognises the pair as one submission and keeps a single copy.
    assert!(manager.full_sync().await);
    let orders = manager.get_orders();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].total, Money::from_cents(4999));
    assert_eq!(orders[0].client_status(), ClientStatus::Pending);

    manager.cleanup().await;
}

#[tokio::test]
async fn clearing_the_cache_is_repopulated_by_the_next_sync() {
    init_test_logging();
    let remote = MemoryRemote::new();
    let manager =
        UnifiedOrderManager::new(owner(), remote.clone(), Arc::new(FileStore::in_memory()), EventProducers::default());
    manager.initialize().await;
    manager.create_order(draft()).unwrap();
    settle().await;
    assert_eq!(remote.insert_count(), 1);

    manager.clear_cached_orders();
    assert!(manager.get_orders().is_empty());

    assert!(manager.full_sync().await);
    assert_eq!(manager.get_orders().len(), 1);

    manager.cleanup().await;
}

//! Test support: an in-memory [`RemoteOrderService`] double and a handful of fixture builders.
//!
//! Enable the `test_utils` feature to use these from integration tests or a downstream crate's test suite.

use std::sync::{
    atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    Arc,
    Mutex,
};

use chrono::Utc;
use gss_common::Money;
use log::*;
use tokio::sync::mpsc;

use crate::{
    order_types::{LifecycleStatus, LineItem, Order, OrderId, OwnerId, RemoteOrderRecord},
    traits::{
        OwnerFilter,
        RemoteChange,
        RemoteChangeKind,
        RemoteOrderError,
        RemoteOrderService,
        SubscriptionHandle,
    },
};

/// Load `.env.test` and initialise the logger. Safe to call from every test.
pub fn init_test_logging() {
    dotenvy::from_filename(".env.test").ok();
    let _ = env_logger::try_init();
}

pub fn owner() -> OwnerId {
    OwnerId::new("u-1", "u-1@example.com")
}

/// A cached order fixture: two items, 49.99 total, created now.
pub fn test_order(id: &str, owner: &OwnerId, status: LifecycleStatus) -> Order {
    let now = Utc::now();
    Order {
        id: OrderId::from(id),
        owner: owner.clone(),
        created_at: now,
        updated_at: now,
        total: Money::from_cents(4999),
        item_count: 2,
        line_items: vec![
            LineItem::new("p-1", "Scented candle", Money::from_cents(2999), 1),
            LineItem::new("p-2", "Gift wrap", Money::from_cents(2000), 1),
        ],
        shipping_address: None,
        lifecycle_status: status,
        tracking_reference: None,
    }
}

/// A well-formed remote row fixture matching [`test_order`], with the status given as the raw wire string.
pub fn test_record(id: &str, owner: &OwnerId, status: &str) -> RemoteOrderRecord {
    let now = Utc::now();
    RemoteOrderRecord {
        id: Some(id.to_string()),
        owner_key: Some(owner.key.clone()),
        owner_email: Some(owner.email.clone()),
        total: Some(Money::from_cents(4999)),
        item_count: Some(2),
        lifecycle_status: Some(status.to_string()),
        created_at: Some(now),
        updated_at: Some(now),
        ..Default::default()
    }
}

//--------------------------------------    MemoryRemote    ----------------------------------------------------------

const SUBSCRIPTION_CHANNEL_CAPACITY: usize = 32;

struct Subscriber {
    handle: SubscriptionHandle,
    owner_key: String,
    sender: mpsc::Sender<RemoteChange>,
}

#[derive(Default)]
struct Inner {
    rows: Mutex<Vec<RemoteOrderRecord>>,
    subscribers: Mutex<Vec<Subscriber>>,
    next_handle: AtomicU64,
    fail_all_queries: AtomicBool,
    fail_key_queries: AtomicBool,
    fail_inserts: AtomicBool,
    fail_subscribe: AtomicBool,
    query_count: AtomicUsize,
    insert_count: AtomicUsize,
}

/// An in-memory stand-in for the remote order store, with switchable failure modes so tests can exercise every
/// degraded path. Push events are simulated with [`MemoryRemote::push_update`].
#[derive(Clone, Default)]
pub struct MemoryRemote {
    inner: Arc<Inner>,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the store's contents with the given rows.
    pub fn seed(&self, rows: Vec<RemoteOrderRecord>) {
        *self.inner.rows.lock().unwrap() = rows;
    }

    pub fn rows(&self) -> Vec<RemoteOrderRecord> {
        self.inner.rows.lock().unwrap().clone()
    }

    /// Every query fails with `Unavailable` (server down).
    pub fn set_fail_all_queries(&self, fail: bool) {
        self.inner.fail_all_queries.store(fail, Ordering::SeqCst);
    }

    /// Key-filtered queries fail with `PermissionDenied`; email-filtered queries still succeed.
    pub fn set_fail_key_queries(&self, fail: bool) {
        self.inner.fail_key_queries.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_inserts(&self, fail: bool) {
        self.inner.fail_inserts.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_subscribe(&self, fail: bool) {
        self.inner.fail_subscribe.store(fail, Ordering::SeqCst);
    }

    pub fn query_count(&self) -> usize {
        self.inner.query_count.load(Ordering::SeqCst)
    }

    pub fn insert_count(&self) -> usize {
        self.inner.insert_count.load(Ordering::SeqCst)
    }

    /// Store the row and deliver it as a push event to every subscriber watching its owner.
    pub async fn push_update(&self, record: RemoteOrderRecord) {
        let kind = if self.upsert_row(record.clone()) { RemoteChangeKind::Updated } else { RemoteChangeKind::Inserted };
        let senders: Vec<mpsc::Sender<RemoteChange>> = {
            let subscribers = self.inner.subscribers.lock().unwrap();
            subscribers
                .iter()
                .filter(|s| Some(s.owner_key.as_str()) == record.owner_key.as_deref())
                .map(|s| s.sender.clone())
                .collect()
        };
        for sender in senders {
            if sender.send(RemoteChange { kind, record: record.clone() }).await.is_err() {
                debug!("🚀️ A subscriber dropped its receiver; event not delivered");
            }
        }
    }

    /// Returns true if an existing row was replaced.
    fn upsert_row(&self, record: RemoteOrderRecord) -> bool {
        let mut rows = self.inner.rows.lock().unwrap();
        match rows.iter_mut().find(|r| r.id == record.id) {
            Some(row) => {
                *row = record;
                true
            },
            None => {
                rows.push(record);
                false
            },
        }
    }
}

impl RemoteOrderService for MemoryRemote {
    async fn query(&self, filter: OwnerFilter) -> Result<Vec<RemoteOrderRecord>, RemoteOrderError> {
        self.inner.query_count.fetch_add(1, Ordering::SeqCst);
        if self.inner.fail_all_queries.load(Ordering::SeqCst) {
            return Err(RemoteOrderError::Unavailable("simulated outage".to_string()));
        }
        if matches!(filter, OwnerFilter::Key(_)) && self.inner.fail_key_queries.load(Ordering::SeqCst) {
            return Err(RemoteOrderError::PermissionDenied(format!("simulated refusal for {filter}")));
        }
        let rows = self.inner.rows.lock().unwrap();
        let matching = rows
            .iter()
            .filter(|r| match &filter {
                OwnerFilter::Key(key) => r.owner_key.as_deref() == Some(key.as_str()),
                OwnerFilter::Email(email) => r.owner_email.as_deref() == Some(email.as_str()),
            })
            .cloned()
            .collect();
        Ok(matching)
    }

    async fn insert(&self, record: RemoteOrderRecord) -> Result<RemoteOrderRecord, RemoteOrderError> {
        self.inner.insert_count.fetch_add(1, Ordering::SeqCst);
        if self.inner.fail_inserts.load(Ordering::SeqCst) {
            return Err(RemoteOrderError::Unavailable("simulated outage".to_string()));
        }
        self.upsert_row(record.clone());
        Ok(record)
    }

    async fn update(&self, record: RemoteOrderRecord) -> Result<RemoteOrderRecord, RemoteOrderError> {
        let replaced = self.upsert_row(record.clone());
        if !replaced {
            let id = OrderId::from(record.id.as_deref().unwrap_or("<missing>"));
            return Err(RemoteOrderError::RecordRejected(id, "no such row".to_string()));
        }
        Ok(record)
    }

    async fn subscribe(
        &self,
        owner: &OwnerId,
    ) -> Result<(SubscriptionHandle, mpsc::Receiver<RemoteChange>), RemoteOrderError> {
        if self.inner.fail_subscribe.load(Ordering::SeqCst) {
            return Err(RemoteOrderError::PermissionDenied("simulated subscribe refusal".to_string()));
        }
        let handle = SubscriptionHandle(self.inner.next_handle.fetch_add(1, Ordering::SeqCst));
        let (sender, receiver) = mpsc::channel(SUBSCRIPTION_CHANNEL_CAPACITY);
        self.inner.subscribers.lock().unwrap().push(Subscriber { handle, owner_key: owner.key.clone(), sender });
        debug!("🚀️ Subscription {handle} opened for {owner}");
        Ok((handle, receiver))
    }

    async fn unsubscribe(&self, handle: SubscriptionHandle) {
        let mut subscribers = self.inner.subscribers.lock().unwrap();
        let before = subscribers.len();
        subscribers.retain(|s| s.handle != handle);
        if subscribers.len() == before {
            debug!("🚀️ unsubscribe({handle}) matched no active subscription");
        }
    }
}

//! The local cache store: durable, synchronous, per-owner order persistence.
//!
//! The UI reads orders from here and only here. The reconciliation engine is the writer. The unit of atomicity is
//! the per-owner order set: [`OrderCache::replace_all`] swaps the whole set in one critical section, so readers
//! never observe a partially merged sync.
//!
//! Every mutating call emits a [`CacheChange`] on a broadcast channel so views can refresh without polling.

mod file_store;

use std::fmt::Debug;

use thiserror::Error;
use tokio::sync::broadcast;

pub use file_store::FileStore;

use crate::order_types::{Order, OrderId};

#[derive(Debug, Clone)]
pub enum CacheChange {
    /// The whole order set for an owner was replaced (full sync or bulk admin action).
    Replaced { owner_key: String, count: usize },
    /// A single order was inserted or updated in place.
    Upserted { owner_key: String, order_id: OrderId },
    /// All orders for an owner were removed. Destructive; only the admin bulk-reset path calls this.
    Cleared { owner_key: String },
}

#[derive(Debug, Clone, Error)]
pub enum CacheError {
    #[error("Could not persist the cache snapshot: {0}")]
    Io(String),
    #[error("The cache snapshot on disk is corrupt: {0}")]
    Corrupt(String),
}

/// Contract for the local cache store. All operations are synchronous; callers on the async side must treat them
/// as non-blocking (they only touch memory and, for durable stores, a small local file).
///
/// No ordering guarantee is imposed on the returned orders; callers sort when they need a particular view.
pub trait OrderCache: Send + Sync + Debug {
    /// All cached orders for the owner key, in no particular order.
    fn orders_for(&self, owner_key: &str) -> Result<Vec<Order>, CacheError>;

    /// Atomically replace the owner's entire order set.
    fn replace_all(&self, owner_key: &str, orders: Vec<Order>) -> Result<(), CacheError>;

    /// Insert the order, or replace the cached copy with the same id.
    fn upsert(&self, order: Order) -> Result<(), CacheError>;

    /// Remove every order for the owner. Destructive: this is the bulk-reset administrative operation and makes no
    /// correctness promises about concurrent syncs.
    fn clear_owner(&self, owner_key: &str) -> Result<(), CacheError>;

    /// Subscribe to change signals. Each mutating call above emits exactly one signal.
    fn subscribe_changes(&self) -> broadcast::Receiver<CacheChange>;
}

//! Order Sync Engine
//!
//! The order sync engine keeps a gift shop client's local view of its orders consistent with the remote,
//! authoritative order service. It is backend-agnostic: anything that implements
//! [`traits::RemoteOrderService`] can act as the remote store.
//!
//! The library is divided into three main sections:
//! 1. The local cache ([`mod@cache`]). The UI reads orders from the cache and only the cache, so a network outage
//!    never blanks the order history. The file-backed [`cache::FileStore`] is the default implementation.
//! 2. The reconciliation core ([`mod@reconcile`], [`mod@workflow`], [`mod@notify`]). Full syncs and push-delivered
//!    events both flow through the [`reconcile::SyncEngine`], which feeds the per-order workflow tracker and the
//!    notification dispatcher. Duplicate delivery across the two channels is absorbed there.
//! 3. The public façade ([`mod@manager`]). The [`manager::UnifiedOrderManager`] owns the subscription lifecycle
//!    and is the only type an embedding application needs to hold.
//!
//! The engine also emits a set of events that the embedding application can subscribe to via [`events::EventHooks`]:
//! an order changed, a sync completed, a notification was created. Hooks are async and run on the tokio runtime
//! without blocking the reconciliation path.

pub mod cache;
pub mod config;
pub mod events;
pub mod helpers;
pub mod manager;
pub mod notify;
pub mod order_types;
pub mod reconcile;
pub mod status;
pub mod traits;
pub mod workflow;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

pub use config::SyncConfig;
pub use manager::{ManagerState, OrderQueryFilter, UnifiedOrderManager};
pub use reconcile::SyncEngine;
pub use status::map_status;

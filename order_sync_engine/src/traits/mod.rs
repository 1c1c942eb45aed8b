//! Interface contracts for the engine's external collaborators.
//!
//! The remote order service is the authoritative store for orders. The engine never assumes anything about how it is
//! implemented; everything it needs is captured by the [`RemoteOrderService`] trait. The in-memory test double in
//! `test_utils` and any production backend both implement this trait.

mod remote_order_service;

pub use remote_order_service::{
    OwnerFilter,
    RemoteChange,
    RemoteChangeKind,
    RemoteOrderError,
    RemoteOrderService,
    SubscriptionHandle,
};

use std::fmt::Display;

use thiserror::Error;
use tokio::sync::mpsc;

use crate::order_types::{OrderId, OwnerId, RemoteOrderRecord};

/// The field used to select orders belonging to an owner.
///
/// The primary lookup is by owner key. Some backend deployments have been observed to refuse key-filtered queries
/// (inconsistent row-level permissions), so the engine can fall back to querying by email once per sync cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OwnerFilter {
    Key(String),
    Email(String),
}

impl OwnerFilter {
    pub fn key_of(owner: &OwnerId) -> Self {
        Self::Key(owner.key.clone())
    }

    pub fn email_of(owner: &OwnerId) -> Self {
        Self::Email(owner.email.clone())
    }
}

impl Display for OwnerFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OwnerFilter::Key(k) => write!(f, "owner_key={k}"),
            OwnerFilter::Email(e) => write!(f, "owner_email={e}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteChangeKind {
    Inserted,
    Updated,
}

/// A single push-delivered change for one order row, as received on the subscription channel.
#[derive(Debug, Clone)]
pub struct RemoteChange {
    pub kind: RemoteChangeKind,
    pub record: RemoteOrderRecord,
}

/// An opaque token identifying one active subscription. Returned by [`RemoteOrderService::subscribe`] and consumed
/// by [`RemoteOrderService::unsubscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(pub u64);

impl Display for SubscriptionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

#[derive(Debug, Clone, Error)]
pub enum RemoteOrderError {
    #[error("The remote order service is unavailable: {0}")]
    Unavailable(String),
    #[error("The remote order service refused the request: {0}")]
    PermissionDenied(String),
    #[error("The remote order service rejected the record for order {0}: {1}")]
    RecordRejected(OrderId, String),
    #[error("No active subscription for handle {0}")]
    UnknownSubscription(SubscriptionHandle),
}

impl RemoteOrderError {
    /// Whether retrying the same query with the alternate owner filter is worthwhile.
    pub fn is_retryable_with_alternate_key(&self) -> bool {
        matches!(self, RemoteOrderError::Unavailable(_) | RemoteOrderError::PermissionDenied(_))
    }
}

/// The contract the remote, authoritative order store must satisfy.
///
/// Implementations are expected to be cheap to clone (a handle over a connection pool or similar), because the
/// engine clones them into fire-and-forget push-back tasks.
#[allow(async_fn_in_trait)]
pub trait RemoteOrderService: Clone + Send + Sync + 'static {
    /// Fetch every order row matching the given owner filter.
    async fn query(&self, filter: OwnerFilter) -> Result<Vec<RemoteOrderRecord>, RemoteOrderError>;

    /// Persist a brand-new order row. Returns the row as stored (the backend may fill in server-side fields).
    fn insert(
        &self,
        record: RemoteOrderRecord,
    ) -> impl std::future::Future<Output = Result<RemoteOrderRecord, RemoteOrderError>> + Send;

    /// Update an existing order row by id.
    async fn update(&self, record: RemoteOrderRecord) -> Result<RemoteOrderRecord, RemoteOrderError>;

    /// Open a push channel delivering insert/update events for rows owned by `owner`.
    ///
    /// Events arrive on the returned receiver in the order the backend emits them; the engine applies them in that
    /// order without batching or reordering.
    async fn subscribe(
        &self,
        owner: &OwnerId,
    ) -> Result<(SubscriptionHandle, mpsc::Receiver<RemoteChange>), RemoteOrderError>;

    /// Release a subscription. After this returns, no further events are delivered for the handle.
    async fn unsubscribe(&self, handle: SubscriptionHandle);
}

//! The unified order manager: the one façade the UI talks to.
//!
//! The manager owns the subscription lifecycle and wires the cache, reconciliation engine, workflow tracker and
//! notification dispatcher together. Reads are served from the local cache immediately; the remote store is only
//! ever consulted asynchronously, so the UI never blocks on network health.

use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use log::*;
use thiserror::Error;
use tokio::{sync::mpsc, task::JoinHandle};

use crate::{
    cache::{CacheChange, CacheError, FileStore, OrderCache},
    config::SyncConfig,
    events::{EventHandlers, EventHooks, EventProducers, Notification},
    helpers::new_order_id,
    notify::NotificationDispatcher,
    order_types::{ClientStatus, DraftOrder, LifecycleStatus, Order, OrderId, OwnerId},
    reconcile::SyncEngine,
    traits::{RemoteChange, RemoteOrderService, SubscriptionHandle},
    workflow::{OrderWorkflow, WorkflowTracker},
};

/// The manager's position in its lifecycle. `Stopped` is terminal; a stopped manager serves nothing and a new one
/// must be constructed for a new session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerState {
    Uninitialized,
    /// A full sync has run (or been attempted) and the subscribe call is outstanding or has failed. Cached data is
    /// served; push updates are not flowing yet.
    Subscribing,
    /// The subscription acknowledged; push updates flow into the cache.
    Active,
    Stopped,
}

#[derive(Debug, Clone, Error)]
pub enum OrderManagerError {
    #[error("Cannot create an order with no items")]
    EmptyDraft,
    #[error("The order manager has been stopped")]
    Stopped,
}

/// Filter for the UI read path. Empty filter matches everything.
#[derive(Debug, Clone, Default)]
pub struct OrderQueryFilter {
    pub statuses: Vec<ClientStatus>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl OrderQueryFilter {
    pub fn with_status(mut self, status: ClientStatus) -> Self {
        self.statuses.push(status);
        self
    }

    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    pub fn until(mut self, until: DateTime<Utc>) -> Self {
        self.until = Some(until);
        self
    }

    pub fn matches(&self, order: &Order) -> bool {
        if !self.statuses.is_empty() && !self.statuses.contains(&order.client_status()) {
            return false;
        }
        if let Some(since) = self.since {
            if order.created_at < since {
                return false;
            }
        }
        if let Some(until) = self.until {
            if order.created_at > until {
                return false;
            }
        }
        true
    }
}

pub struct UnifiedOrderManager<R: RemoteOrderService> {
    owner: OwnerId,
    remote: R,
    cache: Arc<dyn OrderCache>,
    engine: Arc<SyncEngine<R>>,
    tracker: Arc<WorkflowTracker>,
    dispatcher: Arc<NotificationDispatcher>,
    state: Mutex<ManagerState>,
    subscription: tokio::sync::Mutex<Option<(SubscriptionHandle, JoinHandle<()>)>>,
}

impl<R: RemoteOrderService> std::fmt::Debug for UnifiedOrderManager<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "UnifiedOrderManager({})", self.owner)
    }
}

impl<R: RemoteOrderService> UnifiedOrderManager<R> {
    pub fn new(owner: OwnerId, remote: R, cache: Arc<dyn OrderCache>, producers: EventProducers) -> Self {
        let tracker = Arc::new(WorkflowTracker::new());
        let dispatcher = Arc::new(NotificationDispatcher::new(producers.clone()));
        let engine = Arc::new(SyncEngine::new(
            remote.clone(),
            Arc::clone(&cache),
            Arc::clone(&tracker),
            Arc::clone(&dispatcher),
            producers,
        ));
        Self {
            owner,
            remote,
            cache,
            engine,
            tracker,
            dispatcher,
            state: Mutex::new(ManagerState::Uninitialized),
            subscription: tokio::sync::Mutex::new(None),
        }
    }

    /// Build a manager from a [`SyncConfig`]: the configured cache store (file-backed snapshot, or purely
    /// in-memory) and relay buffers sized by the config, with the given hooks registered and running.
    pub fn from_config(
        owner: OwnerId,
        remote: R,
        config: &SyncConfig,
        hooks: EventHooks,
    ) -> Result<Self, CacheError> {
        let cache: Arc<dyn OrderCache> = if config.in_memory {
            Arc::new(FileStore::in_memory())
        } else {
            Arc::new(FileStore::open(&config.cache_path)?)
        };
        Ok(Self::with_hooks(owner, remote, cache, config.event_buffer_size, hooks))
    }

    /// Build a manager with the given UI hooks registered and their relay loops already spawned.
    pub fn with_hooks(
        owner: OwnerId,
        remote: R,
        cache: Arc<dyn OrderCache>,
        buffer_size: usize,
        hooks: EventHooks,
    ) -> Self {
        let handlers = EventHandlers::new(buffer_size, hooks);
        let producers = handlers.producers();
        handlers.start();
        Self::new(owner, remote, cache, producers)
    }

    /// Run one full sync, then open the push channel. The manager serves cached data from the moment this is
    /// called, whatever the network does.
    ///
    /// Returns whether the initial full sync reached the remote store.
    pub async fn initialize(&self) -> bool {
        {
            let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if *state != ManagerState::Uninitialized {
                warn!("🛒 initialize() called in state {:?}; ignoring", *state);
                return false;
            }
        }
        let synced = self.engine.full_sync(&self.owner).await;
        self.set_state(ManagerState::Subscribing);
        match self.remote.subscribe(&self.owner).await {
            Ok((handle, receiver)) => {
                if self.engine.is_halted() {
                    // cleanup() raced us; release the subscription we no longer want.
                    self.remote.unsubscribe(handle).await;
                    return synced;
                }
                let pump = spawn_pump(Arc::clone(&self.engine), receiver);
                *self.subscription.lock().await = Some((handle, pump));
                self.set_state(ManagerState::Active);
                info!("🛒 Subscription active for {}", self.owner);
            },
            Err(e) => {
                warn!("🛒 Could not subscribe to order changes for {}: {e}. Serving cached data only.", self.owner);
            },
        }
        synced
    }

    /// The owner's cached orders, newest first. Never touches the remote store.
    pub fn get_orders(&self) -> Vec<Order> {
        let mut orders = self.cache.orders_for(&self.owner.key).unwrap_or_else(|e| {
            error!("🛒 Could not read cached orders for {}: {e}", self.owner);
            Vec::new()
        });
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        orders
    }

    pub fn get_orders_filtered(&self, filter: &OrderQueryFilter) -> Vec<Order> {
        self.get_orders().into_iter().filter(|o| filter.matches(o)).collect()
    }

    /// Create an order from a checkout draft: cached immediately, pushed to the remote store in the background.
    pub fn create_order(&self, draft: DraftOrder) -> Result<Order, OrderManagerError> {
        if self.state() == ManagerState::Stopped {
            return Err(OrderManagerError::Stopped);
        }
        if draft.item_count() == 0 {
            return Err(OrderManagerError::EmptyDraft);
        }
        let now = Utc::now();
        let order = Order {
            id: new_order_id(),
            owner: self.owner.clone(),
            created_at: now,
            updated_at: now,
            total: draft.total(),
            item_count: draft.item_count(),
            line_items: draft.line_items,
            shipping_address: draft.shipping_address,
            lifecycle_status: LifecycleStatus::Pending,
            tracking_reference: None,
        };
        self.engine.register_local_order(&order);
        Ok(order)
    }

    /// Manually triggered full sync. `false` means the remote store could not be reached and the UI should say so;
    /// cached data remains valid either way.
    pub async fn full_sync(&self) -> bool {
        if self.state() == ManagerState::Stopped {
            return false;
        }
        self.engine.full_sync(&self.owner).await
    }

    /// Stop the manager. Idempotent, and terminal: after the first call returns, no further subscription event is
    /// applied and any in-flight fetch result is discarded.
    pub async fn cleanup(&self) {
        self.engine.halt();
        let was_stopped = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            let was = *state == ManagerState::Stopped;
            *state = ManagerState::Stopped;
            was
        };
        if let Some((handle, pump)) = self.subscription.lock().await.take() {
            self.remote.unsubscribe(handle).await;
            pump.abort();
        }
        if !was_stopped {
            info!("🛒 Order manager stopped for {}", self.owner);
        }
    }

    pub fn state(&self) -> ManagerState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn owner(&self) -> &OwnerId {
        &self.owner
    }

    /// The order's six-step timeline, if the manager has seen the order this session.
    pub fn workflow_for(&self, order_id: &OrderId) -> Option<OrderWorkflow> {
        self.tracker.workflow_for(order_id)
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.dispatcher.notifications()
    }

    pub fn unread_notification_count(&self) -> usize {
        self.dispatcher.unread_count()
    }

    pub fn mark_notification_read(&self, notification_id: &str) -> bool {
        self.dispatcher.mark_read(notification_id)
    }

    /// Change signals from the cache store, for views that render straight off the cache.
    pub fn subscribe_cache_changes(&self) -> tokio::sync::broadcast::Receiver<CacheChange> {
        self.cache.subscribe_changes()
    }

    /// Destructive: drop every cached order for this owner. Admin bulk-reset only; the next full sync repopulates
    /// from the remote store.
    pub fn clear_cached_orders(&self) {
        if let Err(e) = self.cache.clear_owner(&self.owner.key) {
            error!("🛒 Could not clear cached orders for {}: {e}", self.owner);
        }
    }

    /// Move to `new_state` unless already stopped; `Stopped` is terminal.
    fn set_state(&self, new_state: ManagerState) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state == ManagerState::Stopped {
            debug!("🛒 Ignoring state change to {new_state:?}: manager is stopped");
            return;
        }
        trace!("🛒 Manager state {:?} -> {new_state:?}", *state);
        *state = new_state;
    }
}

fn spawn_pump<R: RemoteOrderService>(
    engine: Arc<SyncEngine<R>>,
    mut receiver: mpsc::Receiver<RemoteChange>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        debug!("🛒 Subscription pump started");
        while let Some(change) = receiver.recv().await {
            if engine.is_halted() {
                break;
            }
            engine.apply_remote_change(&change);
        }
        debug!("🛒 Subscription pump stopped");
    })
}

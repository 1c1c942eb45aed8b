//! The reconciliation engine: keeps the local cache consistent with the remote order store.
//!
//! Two entry points feed it. [`SyncEngine::full_sync`] fetches the owner's complete remote order set and merges it
//! over the cache in one atomic replace; [`SyncEngine::apply_remote_change`] applies a single push-delivered event.
//! Both funnel observed transitions through the same path into the workflow tracker and the notification
//! dispatcher, so it does not matter which channel delivers a change first: the tracker is monotonic and the
//! dispatcher de-duplicates.
//!
//! Remote failures never propagate to the caller. Every failure mode degrades to "operate on cached data" with a
//! logged diagnostic; the boolean returned by `full_sync` only tells a manual-sync UI whether the server was
//! reached.

use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use log::*;

use crate::{
    cache::OrderCache,
    events::{EventProducers, OrderUpdatedEvent, OrdersSyncedEvent},
    notify::NotificationDispatcher,
    order_types::{Order, OrderId, OwnerId, RemoteOrderRecord},
    traits::{OwnerFilter, RemoteChange, RemoteOrderService},
    workflow::WorkflowTracker,
};

pub struct SyncEngine<R: RemoteOrderService> {
    remote: R,
    cache: Arc<dyn OrderCache>,
    tracker: Arc<WorkflowTracker>,
    dispatcher: Arc<NotificationDispatcher>,
    producers: EventProducers,
    halted: Arc<AtomicBool>,
}

impl<R: RemoteOrderService> std::fmt::Debug for SyncEngine<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SyncEngine")
    }
}

impl<R: RemoteOrderService> SyncEngine<R> {
    pub fn new(
        remote: R,
        cache: Arc<dyn OrderCache>,
        tracker: Arc<WorkflowTracker>,
        dispatcher: Arc<NotificationDispatcher>,
        producers: EventProducers,
    ) -> Self {
        Self { remote, cache, tracker, dispatcher, producers, halted: Arc::new(AtomicBool::new(false)) }
    }

    /// Stop applying results. An in-flight fetch may still complete, but nothing it returns will be written.
    pub fn halt(&self) {
        self.halted.store(true, Ordering::SeqCst);
    }

    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::SeqCst)
    }

    /// Register an order created locally at checkout: cache it, start its workflow, notify, and push it to the
    /// remote store in the background.
    pub fn register_local_order(&self, order: &Order) {
        if let Err(e) = self.cache.upsert(order.clone()) {
            error!("🔄️ Could not cache new order {}: {e}", order.id);
        }
        self.tracker.start_order(&order.id);
        self.dispatcher.order_created(order);
        for producer in &self.producers.order_updated {
            producer.try_publish(OrderUpdatedEvent::new(None, order.clone()));
        }
        self.push_back(order);
        debug!("🔄️🛍️ Registered local order {} for {}", order.id, order.owner);
    }

    /// Merge the owner's remote orders over the local cache.
    ///
    /// Remote rows win for any id both sides know. Local-only orders are kept, de-duplicated, and pushed back to
    /// the remote store on a best-effort background task. The merged set lands in the cache as one atomic replace.
    ///
    /// Returns `true` if the remote store was reached, `false` if the engine fell back to cached data.
    pub async fn full_sync(&self, owner: &OwnerId) -> bool {
        trace!("🔄️ Full sync starting for {owner}");
        let Some(remote_orders) = self.fetch_remote_orders(owner).await else {
            info!("🔄️ Remote store unreachable; serving cached orders for {owner} until the next sync");
            return false;
        };
        if self.is_halted() {
            debug!("🔄️ Discarding fetch result for {owner}: engine halted mid-sync");
            return false;
        }
        let local = self.cache.orders_for(&owner.key).unwrap_or_else(|e| {
            error!("🔄️ Could not read cached orders for {owner}: {e}");
            Vec::new()
        });
        let local_by_id: HashMap<OrderId, Order> = local.iter().map(|o| (o.id.clone(), o.clone())).collect();
        let remote_ids: HashSet<OrderId> = remote_orders.iter().map(|o| o.id.clone()).collect();

        // Remote is the source of truth for anything it knows about.
        for order in &remote_orders {
            self.observe_order_change(local_by_id.get(&order.id), order);
        }

        let local_only: Vec<Order> = local.into_iter().filter(|o| !remote_ids.contains(&o.id)).collect();
        for order in &local_only {
            self.push_back(order);
        }
        let survivors = dedup_local_orders(local_only);

        let mut merged = remote_orders;
        merged.extend(survivors);
        let count = merged.len();
        if let Err(e) = self.cache.replace_all(&owner.key, merged) {
            error!("🔄️ Could not write merged order set for {owner}: {e}");
            return false;
        }
        debug!("🔄️ Full sync complete for {owner}: {count} orders cached");
        for producer in &self.producers.orders_synced {
            producer.publish(OrdersSyncedEvent { owner: owner.clone(), count }).await;
        }
        true
    }

    /// Apply one push-delivered insert/update event. Synchronous once the payload is in hand; events must be
    /// applied in the order the channel delivered them.
    pub fn apply_remote_change(&self, change: &RemoteChange) {
        if self.is_halted() {
            debug!("🔄️ Ignoring remote change: engine halted");
            return;
        }
        let mut order = match change.record.validate() {
            Ok(order) => order,
            Err(e) => {
                warn!("🔄️ Skipping malformed remote record ({:?}): {e}", change.kind);
                return;
            },
        };
        let previous = self
            .cache
            .orders_for(&order.owner.key)
            .unwrap_or_else(|e| {
                error!("🔄️ Could not read cached orders for {}: {e}", order.owner);
                Vec::new()
            })
            .into_iter()
            .find(|o| o.id == order.id);
        if let Some(prev) = &previous {
            // A partial update must never lose fields the cache already knows.
            if change.record.created_at.is_none() {
                order.created_at = prev.created_at;
            }
            let update = order.shipping_address.take();
            order.shipping_address = prev.shipping_address.clone();
            if let Some(update) = update {
                order.merge_shipping_address(&update);
            }
            if order.line_items.is_empty() && !prev.line_items.is_empty() {
                order.line_items = prev.line_items.clone();
            }
        }
        if let Err(e) = self.cache.upsert(order.clone()) {
            error!("🔄️ Could not cache remote change for {}: {e}", order.id);
            return;
        }
        self.observe_order_change(previous.as_ref(), &order);
    }

    /// Fetch and validate the owner's remote orders, retrying once with the alternate lookup key. `None` means the
    /// remote store could not be reached at all this cycle.
    async fn fetch_remote_orders(&self, owner: &OwnerId) -> Option<Vec<Order>> {
        let records = match self.remote.query(OwnerFilter::key_of(owner)).await {
            Ok(records) => records,
            Err(e) if e.is_retryable_with_alternate_key() => {
                warn!("🔄️ Query by owner key failed for {owner}: {e}. Retrying with the alternate key.");
                match self.remote.query(OwnerFilter::email_of(owner)).await {
                    Ok(records) => records,
                    Err(e) => {
                        warn!("🔄️ Alternate-key query also failed for {owner}: {e}");
                        return None;
                    },
                }
            },
            Err(e) => {
                warn!("🔄️ Remote query failed for {owner}: {e}");
                return None;
            },
        };
        Some(validate_batch(records))
    }

    /// Feed an observed `(previous, current)` pair through the workflow tracker and notification dispatcher, and
    /// let the UI know the cached order changed.
    fn observe_order_change(&self, previous: Option<&Order>, current: &Order) {
        if previous.is_none() {
            self.tracker.start_order(&current.id);
        }
        let status_changed = previous.map_or(true, |p| p.lifecycle_status != current.lifecycle_status);
        let mut completed_now = false;
        if status_changed {
            completed_now |= self.tracker.observe_transition(&current.id, current.lifecycle_status);
        }
        let tracking_appeared = previous.map_or(false, |p| p.tracking_reference.is_none())
            && current.tracking_reference.is_some();
        if tracking_appeared {
            if let Some(reference) = &current.tracking_reference {
                completed_now |= self.tracker.observe_tracking_reference(&current.id, reference);
                self.dispatcher.order_shipped(current, reference);
            }
        }
        self.dispatcher.order_transitioned(previous, current);
        if completed_now {
            self.dispatcher.workflow_completed(current);
        }
        if previous != Some(current) {
            for producer in &self.producers.order_updated {
                producer.try_publish(OrderUpdatedEvent::new(previous.cloned(), current.clone()));
            }
        }
    }

    /// Best-effort background push of a local-only order to the remote store. Failure is logged, never surfaced;
    /// the next full sync will try again.
    fn push_back(&self, order: &Order) {
        let remote = self.remote.clone();
        let record = RemoteOrderRecord::from(order);
        let order_id = order.id.clone();
        tokio::spawn(async move {
            match remote.insert(record).await {
                Ok(_) => debug!("🔄️ Pushed local order {order_id} to the remote store"),
                Err(e) => {
                    warn!("🔄️ Could not push local order {order_id} to the remote store: {e}. A later sync will retry.")
                },
            }
        });
    }
}

fn validate_batch(records: Vec<RemoteOrderRecord>) -> Vec<Order> {
    records
        .into_iter()
        .filter_map(|record| match record.validate() {
            Ok(order) => Some(order),
            Err(e) => {
                warn!("🔄️ Skipping malformed remote record in batch: {e}");
                None
            },
        })
        .collect()
}

/// Collapse local-only orders that look like accidental double-submissions.
///
/// The key is `(total, item_count)`, which is a deliberately weak identity: the UI can double-submit an order under
/// transient network conditions and the copies share no id. Within a group the most recently created order
/// survives. Two genuinely distinct orders placed in quick succession with coincidentally equal totals would be
/// merged too; a client-generated idempotency key would close that gap, but the remote contract does not carry one.
fn dedup_local_orders(orders: Vec<Order>) -> Vec<Order> {
    let mut winners: HashMap<(i64, u32), usize> = HashMap::new();
    for (i, order) in orders.iter().enumerate() {
        let key = (order.total.cents(), order.item_count);
        match winners.get(&key) {
            Some(&j) if orders[j].created_at >= order.created_at => {
                debug!("🔄️ Dropping {} as a duplicate of {}", order.id, orders[j].id);
            },
            Some(&j) => {
                debug!("🔄️ Dropping {} as a duplicate of {}", orders[j].id, order.id);
                winners.insert(key, i);
            },
            None => {
                winners.insert(key, i);
            },
        }
    }
    let mut keep: Vec<usize> = winners.into_values().collect();
    keep.sort_unstable();
    keep.into_iter().map(|i| orders[i].clone()).collect()
}

//! The notification dispatcher: turns observed order transitions into user-visible notifications, exactly once per
//! meaningful transition.
//!
//! The dispatcher owns every [`Notification`] it creates. Other components report transitions to it; none of them
//! build notifications themselves. De-duplication lives here too: a per-order record of the last lifecycle status
//! that was notified absorbs duplicate delivery of the same remote event, whether it arrives twice on the push
//! channel or again via a full sync.

use std::{
    collections::{HashMap, HashSet},
    sync::{Mutex, PoisonError},
};

use chrono::Utc;
use log::*;

use crate::{
    events::{EventProducers, NewNotificationEvent, Notification, NotificationCategory},
    helpers::new_notification_id,
    order_types::{LifecycleStatus, Order, OrderId},
};

#[derive(Default)]
pub struct NotificationDispatcher {
    last_notified: Mutex<HashMap<OrderId, LifecycleStatus>>,
    delivered: Mutex<HashSet<OrderId>>,
    notifications: Mutex<Vec<Notification>>,
    producers: EventProducers,
}

impl std::fmt::Debug for NotificationDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "NotificationDispatcher")
    }
}

impl NotificationDispatcher {
    pub fn new(producers: EventProducers) -> Self {
        Self { producers, ..Default::default() }
    }

    /// Notify that a brand-new order was placed at checkout.
    pub fn order_created(&self, order: &Order) -> Notification {
        self.record_notified(&order.id, order.lifecycle_status);
        self.emit(
            NotificationCategory::NewOrder,
            "Order placed",
            format!("Your order {} has been received ({} items, {} total).", order.id, order.item_count, order.total),
            Some(order.id.clone()),
        )
    }

    /// Report an observed `(previous, current)` order pair. Emits at most one notification, and only when the
    /// lifecycle status actually changed to something this order has not been notified about already. Routine field
    /// updates (shipping address completion and the like) emit nothing.
    pub fn order_transitioned(&self, previous: Option<&Order>, current: &Order) -> Option<Notification> {
        let Some(previous) = previous else {
            // First sighting of this order on this device: treat it as newly placed.
            return Some(self.order_created(current));
        };
        if previous.lifecycle_status == current.lifecycle_status {
            return None;
        }
        {
            let last = self.last_notified.lock().unwrap_or_else(PoisonError::into_inner);
            if last.get(&current.id) == Some(&current.lifecycle_status) {
                debug!("🔔 Suppressing duplicate notification for {} ({})", current.id, current.lifecycle_status);
                return None;
            }
        }
        self.record_notified(&current.id, current.lifecycle_status);
        let (category, title, message) = describe_transition(current);
        Some(self.emit(category, title, message, Some(current.id.clone())))
    }

    /// Notify that a tracking reference appeared on the order.
    pub fn order_shipped(&self, order: &Order, tracking_reference: &str) -> Notification {
        self.emit(
            NotificationCategory::OrderShipped,
            "Order shipped",
            format!("Order {} is on its way. Tracking reference: {tracking_reference}.", order.id),
            Some(order.id.clone()),
        )
    }

    /// Notify that the order's workflow reached full completion. At most once per order.
    pub fn workflow_completed(&self, order: &Order) -> Option<Notification> {
        {
            let mut delivered = self.delivered.lock().unwrap_or_else(PoisonError::into_inner);
            if !delivered.insert(order.id.clone()) {
                return None;
            }
        }
        Some(self.emit(
            NotificationCategory::OrderDelivered,
            "Order delivered",
            format!("Order {} has completed its journey. Enjoy!", order.id),
            Some(order.id.clone()),
        ))
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.notifications.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn unread_count(&self) -> usize {
        self.notifications.lock().unwrap_or_else(PoisonError::into_inner).iter().filter(|n| !n.read).count()
    }

    /// Mark a notification as read. Returns false if the id is unknown.
    pub fn mark_read(&self, notification_id: &str) -> bool {
        let mut notifications = self.notifications.lock().unwrap_or_else(PoisonError::into_inner);
        match notifications.iter_mut().find(|n| n.id == notification_id) {
            Some(n) => {
                n.read = true;
                true
            },
            None => false,
        }
    }

    fn record_notified(&self, order_id: &OrderId, status: LifecycleStatus) {
        let mut last = self.last_notified.lock().unwrap_or_else(PoisonError::into_inner);
        last.insert(order_id.clone(), status);
    }

    fn emit<S: Into<String>>(
        &self,
        category: NotificationCategory,
        title: &str,
        message: S,
        related_order_id: Option<OrderId>,
    ) -> Notification {
        let notification = Notification {
            id: new_notification_id(),
            category,
            title: title.to_string(),
            message: message.into(),
            timestamp: Utc::now(),
            read: false,
            related_order_id,
        };
        debug!("🔔 {category:?}: {title}");
        {
            let mut notifications = self.notifications.lock().unwrap_or_else(PoisonError::into_inner);
            notifications.push(notification.clone());
        }
        for producer in &self.producers.notification {
            producer.try_publish(NewNotificationEvent(notification.clone()));
        }
        notification
    }
}

fn describe_transition(current: &Order) -> (NotificationCategory, &'static str, String) {
    let id = &current.id;
    match current.lifecycle_status {
        LifecycleStatus::Declared => (
            NotificationCategory::Info,
            "Payment declared",
            format!("We received your payment declaration for order {id}. It will be verified shortly."),
        ),
        LifecycleStatus::Processing => (
            NotificationCategory::OrderShipped,
            "Order in processing",
            format!("Order {id} is being processed and prepared for dispatch."),
        ),
        LifecycleStatus::Confirmed => (
            NotificationCategory::PaymentConfirmed,
            "Payment confirmed",
            format!("Payment for order {id} was approved. Total: {}.", current.total),
        ),
        LifecycleStatus::Rejected => (
            NotificationCategory::PaymentRejected,
            "Payment rejected",
            format!("The payment for order {id} could not be verified. Please contact support."),
        ),
        LifecycleStatus::Pending => {
            (NotificationCategory::Info, "Order update", format!("Order {id} was updated."))
        },
    }
}

#[cfg(test)]
mod test {
    use chrono::Utc;
    use gss_common::Money;

    use super::*;
    use crate::order_types::OwnerId;

    fn order(status: LifecycleStatus) -> Order {
        Order {
            id: OrderId::from("o-1"),
            owner: OwnerId::new("u-1", "u-1@example.com"),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            total: Money::from_cents(4999),
            item_count: 2,
            line_items: vec![],
            shipping_address: None,
            lifecycle_status: status,
            tracking_reference: None,
        }
    }

    #[test]
    fn duplicate_transition_notifies_once() {
        let dispatcher = NotificationDispatcher::new(EventProducers::default());
        let pending = order(LifecycleStatus::Pending);
        let declared = order(LifecycleStatus::Declared);
        assert!(dispatcher.order_transitioned(Some(&pending), &declared).is_some());
        // The same remote event delivered twice.
        assert!(dispatcher.order_transitioned(Some(&pending), &declared).is_none());
        assert_eq!(dispatcher.notifications().len(), 1);
        assert_eq!(dispatcher.notifications()[0].category, NotificationCategory::Info);
    }

    #[test]
    fn routine_field_update_is_silent() {
        let dispatcher = NotificationDispatcher::new(EventProducers::default());
        let before = order(LifecycleStatus::Declared);
        let mut after = order(LifecycleStatus::Declared);
        after.shipping_address = Some(Default::default());
        assert!(dispatcher.order_transitioned(Some(&before), &after).is_none());
        assert!(dispatcher.notifications().is_empty());
    }

    #[test]
    fn unknown_order_counts_as_new() {
        let dispatcher = NotificationDispatcher::new(EventProducers::default());
        let n = dispatcher.order_transitioned(None, &order(LifecycleStatus::Pending)).unwrap();
        assert_eq!(n.category, NotificationCategory::NewOrder);
        assert_eq!(n.related_order_id, Some(OrderId::from("o-1")));
    }

    #[test]
    fn confirmation_and_rejection_categories() {
        let dispatcher = NotificationDispatcher::new(EventProducers::default());
        let n = dispatcher
            .order_transitioned(Some(&order(LifecycleStatus::Declared)), &order(LifecycleStatus::Confirmed))
            .unwrap();
        assert_eq!(n.category, NotificationCategory::PaymentConfirmed);
        let n = dispatcher
            .order_transitioned(Some(&order(LifecycleStatus::Confirmed)), &order(LifecycleStatus::Rejected))
            .unwrap();
        assert_eq!(n.category, NotificationCategory::PaymentRejected);
    }

    #[test]
    fn workflow_completion_notifies_once() {
        let dispatcher = NotificationDispatcher::new(EventProducers::default());
        let o = order(LifecycleStatus::Confirmed);
        assert!(dispatcher.workflow_completed(&o).is_some());
        assert!(dispatcher.workflow_completed(&o).is_none());
    }

    #[test]
    fn read_tracking() {
        let dispatcher = NotificationDispatcher::new(EventProducers::default());
        let n = dispatcher.order_created(&order(LifecycleStatus::Pending));
        assert_eq!(dispatcher.unread_count(), 1);
        assert!(dispatcher.mark_read(&n.id));
        assert_eq!(dispatcher.unread_count(), 0);
        assert!(!dispatcher.mark_read("ntf-nonexistent"));
    }
}

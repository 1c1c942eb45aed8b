use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::order_types::{Order, OrderId, OwnerId};

/// One order changed in the local cache (incremental update or a create at checkout).
#[derive(Debug, Clone)]
pub struct OrderUpdatedEvent {
    pub old_order: Option<Order>,
    pub new_order: Order,
}

impl OrderUpdatedEvent {
    pub fn new(old_order: Option<Order>, new_order: Order) -> Self {
        Self { old_order, new_order }
    }
}

/// A full sync completed and the owner's cached order set was replaced.
#[derive(Debug, Clone)]
pub struct OrdersSyncedEvent {
    pub owner: OwnerId,
    pub count: usize,
}

/// The stable category a notification belongs to. The UI uses this to pick an icon and sound; it is the only
/// presentation concern this subsystem carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationCategory {
    NewOrder,
    PaymentConfirmed,
    PaymentRejected,
    OrderShipped,
    OrderDelivered,
    Info,
}

/// A user-visible notification. Created only by the notification dispatcher; the reconciliation engine never
/// constructs these directly, which is what keeps re-syncs from double-notifying.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub category: NotificationCategory,
    pub title: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub read: bool,
    pub related_order_id: Option<OrderId>,
}

#[derive(Debug, Clone)]
pub struct NewNotificationEvent(pub Notification);

use std::{future::Future, pin::Pin, sync::Arc};

use crate::events::{
    EventProducer,
    EventRelay,
    Hook,
    NewNotificationEvent,
    OrderUpdatedEvent,
    OrdersSyncedEvent,
};

/// Producer handles for every event type, fanned out to each registered hook. Cheap to clone; every component that
/// publishes events holds a copy.
#[derive(Default, Clone)]
pub struct EventProducers {
    pub order_updated: Vec<EventProducer<OrderUpdatedEvent>>,
    pub orders_synced: Vec<EventProducer<OrdersSyncedEvent>>,
    pub notification: Vec<EventProducer<NewNotificationEvent>>,
}

/// The hooks the embedding application registers before the manager starts. Unregistered events are simply not
/// relayed.
#[derive(Default, Clone)]
pub struct EventHooks {
    pub on_order_updated: Option<Hook<OrderUpdatedEvent>>,
    pub on_orders_synced: Option<Hook<OrdersSyncedEvent>>,
    pub on_notification: Option<Hook<NewNotificationEvent>>,
}

impl EventHooks {
    pub fn on_order_updated<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(OrderUpdatedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_order_updated = Some(Arc::new(f));
        self
    }

    pub fn on_orders_synced<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(OrdersSyncedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_orders_synced = Some(Arc::new(f));
        self
    }

    pub fn on_notification<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(NewNotificationEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_notification = Some(Arc::new(f));
        self
    }
}

/// The relays built from the registered hooks. Call [`EventHandlers::producers`] for each publisher first, then
/// [`EventHandlers::start`] to spawn the relay loops.
pub struct EventHandlers {
    order_updated: Option<EventRelay<OrderUpdatedEvent>>,
    orders_synced: Option<EventRelay<OrdersSyncedEvent>>,
    notification: Option<EventRelay<NewNotificationEvent>>,
}

impl EventHandlers {
    pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
        Self {
            order_updated: hooks.on_order_updated.map(|h| EventRelay::new(buffer_size, h)),
            orders_synced: hooks.on_orders_synced.map(|h| EventRelay::new(buffer_size, h)),
            notification: hooks.on_notification.map(|h| EventRelay::new(buffer_size, h)),
        }
    }

    pub fn producers(&self) -> EventProducers {
        let mut result = EventProducers::default();
        if let Some(relay) = &self.order_updated {
            result.order_updated.push(relay.producer());
        }
        if let Some(relay) = &self.orders_synced {
            result.orders_synced.push(relay.producer());
        }
        if let Some(relay) = &self.notification {
            result.notification.push(relay.producer());
        }
        result
    }

    /// Spawn each relay loop onto the runtime. The loops exit once every producer clone has been dropped.
    pub fn start(self) {
        if let Some(relay) = self.order_updated {
            tokio::spawn(relay.run());
        }
        if let Some(relay) = self.orders_synced {
            tokio::spawn(relay.run());
        }
        if let Some(relay) = self.notification {
            tokio::spawn(relay.run());
        }
    }
}

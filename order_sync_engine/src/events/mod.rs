//! Typed publish/subscribe for engine events.
//!
//! The UI layer never polls: it registers async hooks for the events it cares about and the engine pushes. The
//! relay is stateless; a hook receives the event payload and nothing else. Hooks can be async and run on the tokio
//! runtime without blocking the reconciliation path.

mod event_types;
mod hooks;
mod relay;

pub use event_types::{NewNotificationEvent, Notification, NotificationCategory, OrderUpdatedEvent, OrdersSyncedEvent};
pub use hooks::{EventHandlers, EventHooks, EventProducers};
pub use relay::{EventProducer, EventRelay, Hook};

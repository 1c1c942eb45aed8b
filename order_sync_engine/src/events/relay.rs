use std::{future::Future, pin::Pin, sync::Arc};

use log::*;
use tokio::{sync::mpsc, task::JoinSet};

/// An async callback registered for one event type.
pub type Hook<E> = Arc<dyn Fn(E) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Receives events from any number of [`EventProducer`]s and runs the hook for each one.
///
/// Each event is handled on its own task so a slow hook cannot back up the channel. The relay shuts down once every
/// producer has been dropped, after draining the hook tasks still in flight.
pub struct EventRelay<E: Send + 'static> {
    receiver: mpsc::Receiver<E>,
    sender: mpsc::Sender<E>,
    hook: Hook<E>,
}

impl<E: Send + 'static> EventRelay<E> {
    pub fn new(buffer_size: usize, hook: Hook<E>) -> Self {
        let (sender, receiver) = mpsc::channel(buffer_size);
        Self { receiver, sender, hook }
    }

    pub fn producer(&self) -> EventProducer<E> {
        EventProducer { sender: self.sender.clone() }
    }

    /// Run until all producers are gone. Usually spawned onto the runtime by [`super::EventHandlers::start`].
    pub async fn run(mut self) {
        debug!("📬️ Event relay running");
        // Dropping our own sender means the recv loop ends when the last external producer goes away.
        drop(self.sender);
        let mut in_flight = JoinSet::new();
        while let Some(event) = self.receiver.recv().await {
            let hook = Arc::clone(&self.hook);
            in_flight.spawn(async move {
                (hook)(event).await;
            });
        }
        while let Some(res) = in_flight.join_next().await {
            if let Err(e) = res {
                warn!("📬️ Event hook panicked or was cancelled: {e}");
            }
        }
        debug!("📬️ Event relay shut down");
    }
}

#[derive(Clone)]
pub struct EventProducer<E> {
    sender: mpsc::Sender<E>,
}

impl<E> EventProducer<E> {
    /// Publish from an async context, waiting for channel capacity.
    pub async fn publish(&self, event: E) {
        if self.sender.send(event).await.is_err() {
            error!("📬️ Event dropped: relay has shut down");
        }
    }

    /// Publish from synchronous code. A full buffer drops the event with a log line rather than blocking the
    /// reconciliation path.
    pub fn try_publish(&self, event: E) {
        match self.sender.try_send(event) {
            Ok(()) => {},
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("📬️ Event dropped: relay buffer is full");
            },
            Err(mpsc::error::TrySendError::Closed(_)) => {
                error!("📬️ Event dropped: relay has shut down");
            },
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::atomic::{AtomicU64, Ordering};

    use super::*;

    #[tokio::test]
    async fn relay_handles_every_event_before_shutdown() {
        let _ = env_logger::try_init();
        let total = Arc::new(AtomicU64::new(0));
        let t2 = Arc::clone(&total);
        let hook: Hook<u64> = Arc::new(move |v| {
            let total = Arc::clone(&t2);
            Box::pin(async move {
                tokio::time::sleep(tokio::time::Duration::from_millis(5)).await;
                total.fetch_add(v, Ordering::SeqCst);
            }) as Pin<Box<dyn Future<Output = ()> + Send>>
        });
        let relay = EventRelay::new(4, hook);
        let producer_a = relay.producer();
        let producer_b = relay.producer();
        tokio::spawn(async move {
            for i in 1..=5u64 {
                producer_a.publish(i).await;
            }
        });
        tokio::spawn(async move {
            for i in 6..=10u64 {
                producer_b.publish(i).await;
            }
        });
        relay.run().await;
        assert_eq!(total.load(Ordering::SeqCst), 55);
    }

    #[tokio::test]
    async fn try_publish_never_blocks() {
        let hook: Hook<u64> = Arc::new(|_| Box::pin(async {}) as Pin<Box<dyn Future<Output = ()> + Send>>);
        let relay = EventRelay::new(1, hook);
        let producer = relay.producer();
        // Nothing is draining the channel yet; the second publish overflows and is dropped, not deadlocked.
        producer.try_publish(1);
        producer.try_publish(2);
        drop(producer);
        relay.run().await;
    }
}

//! Broadcast hub implementation
//!
//! Owns the subscriber registry and the fan-out loop.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use parking_lot::RwLock;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::task::TaskTracker;

use super::config::HubConfig;
use super::event::BroadcastEvent;
use super::subscriber::Subscription;
use crate::stats::{HubStatus, SubscriberStatus};

/// Registry entry for one live subscriber
struct SubscriberEntry {
    address: String,
    tx: mpsc::Sender<Bytes>,
}

/// Registry state guarded by a single lock so that registration and the
/// shutdown flag flip are atomic with respect to each other
#[derive(Default)]
struct Registry {
    subscribers: HashMap<u64, SubscriberEntry>,
    shutting_down: bool,
}

/// Fan-out of broadcast events to independently paced subscribers
pub struct Hub {
    registry: RwLock<Registry>,
    tracker: TaskTracker,
    next_id: AtomicU64,
    dropped_events: AtomicU64,
    config: HubConfig,
}

impl Hub {
    /// Create a new hub
    pub fn new(config: HubConfig) -> Self {
        Self {
            registry: RwLock::new(Registry::default()),
            tracker: TaskTracker::new(),
            next_id: AtomicU64::new(1),
            dropped_events: AtomicU64::new(0),
            config,
        }
    }

    /// Get the hub configuration
    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Register a subscriber
    ///
    /// Returns `None` once shutdown has begun; the caller must reject the
    /// connection.
    pub fn register_subscriber(&self, address: impl Into<String>) -> Option<Subscription> {
        let address = address.into();
        let mut registry = self.registry.write();

        if registry.shutting_down {
            tracing::info!(address = %address, "Rejecting subscriber, hub is shutting down");
            return None;
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.config.subscriber_capacity);
        registry.subscribers.insert(
            id,
            SubscriberEntry {
                address: address.clone(),
                tx,
            },
        );

        tracing::info!(
            subscriber = id,
            address = %address,
            subscribers = registry.subscribers.len(),
            "Subscriber registered"
        );

        Some(Subscription {
            id,
            address,
            rx,
            _token: self.tracker.token(),
        })
    }

    /// Remove a subscriber from the registry; idempotent
    pub fn deregister_subscriber(&self, id: u64) {
        let mut registry = self.registry.write();

        if registry.subscribers.remove(&id).is_some() {
            tracing::info!(
                subscriber = id,
                subscribers = registry.subscribers.len(),
                "Subscriber removed"
            );
        }
    }

    /// Number of registered subscribers
    pub fn subscriber_count(&self) -> usize {
        self.registry.read().subscribers.len()
    }

    /// Whether shutdown has begun
    pub fn is_shutting_down(&self) -> bool {
        self.registry.read().shutting_down
    }

    /// Registry snapshot for the status endpoint
    pub fn status(&self) -> HubStatus {
        let registry = self.registry.read();

        let mut client_channels: Vec<SubscriberStatus> = registry
            .subscribers
            .iter()
            .map(|(id, entry)| SubscriberStatus {
                id: *id,
                address: entry.address.clone(),
                queued: entry.tx.max_capacity() - entry.tx.capacity(),
            })
            .collect();
        client_channels.sort_by_key(|status| status.id);

        HubStatus {
            subscribers: client_channels.len(),
            dropped_events: self.dropped_events.load(Ordering::Relaxed),
            client_channels,
        }
    }

    /// Run the fan-out loop until `input` closes, then drain
    ///
    /// Each event is formatted once and offered to every subscriber without
    /// waiting; a full queue drops the event for that subscriber only. Once
    /// the input closes, every queue is closed and this returns only after all
    /// outstanding [`Subscription`]s have been dropped.
    pub async fn run(&self, mut input: mpsc::Receiver<BroadcastEvent>) {
        while let Some(event) = input.recv().await {
            let frame = event.to_frame();
            let registry = self.registry.read();

            for (id, entry) in registry.subscribers.iter() {
                match entry.tx.try_send(frame.clone()) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        self.dropped_events.fetch_add(1, Ordering::Relaxed);
                        tracing::warn!(
                            subscriber = id,
                            address = %entry.address,
                            event_type = %event.event_type,
                            "Subscriber queue full, dropping event"
                        );
                    }
                    Err(TrySendError::Closed(_)) => {
                        tracing::debug!(
                            subscriber = id,
                            event_type = %event.event_type,
                            "Subscriber queue closed, skipping"
                        );
                    }
                }
            }
        }

        tracing::info!("Hub input closed, starting shutdown");
        self.shutdown().await;
        tracing::info!("Hub shutdown complete");
    }

    async fn shutdown(&self) {
        let closed = {
            let mut registry = self.registry.write();
            registry.shutting_down = true;
            // Dropping the senders closes every subscriber queue
            let closed = registry.subscribers.len();
            registry.subscribers.clear();
            closed
        };

        self.tracker.close();
        tracing::info!(
            subscribers = closed,
            outstanding = self.tracker.len(),
            "Waiting for subscribers to terminate"
        );
        self.tracker.wait().await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::hub::event::kind;

    fn spawn_hub(hub: &Arc<Hub>) -> (mpsc::Sender<BroadcastEvent>, tokio::task::JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(hub.config().input_capacity);
        let hub = Arc::clone(hub);
        let handle = tokio::spawn(async move { hub.run(rx).await });
        (tx, handle)
    }

    fn sequence_number(frame: &Bytes) -> u32 {
        let event = BroadcastEvent::parse_frame(frame).unwrap();
        std::str::from_utf8(&event.data.unwrap()).unwrap().parse().unwrap()
    }

    #[tokio::test]
    async fn test_register_deregister() {
        let hub = Hub::new(HubConfig::default());

        let a = hub.register_subscriber("10.0.0.1:1000").unwrap();
        let b = hub.register_subscriber("10.0.0.2:2000").unwrap();
        assert_ne!(a.id(), b.id());
        assert_eq!(hub.subscriber_count(), 2);

        hub.deregister_subscriber(a.id());
        hub.deregister_subscriber(a.id());
        assert_eq!(hub.subscriber_count(), 1);

        let status = hub.status();
        assert_eq!(status.subscribers, 1);
        assert_eq!(status.client_channels[0].address, "10.0.0.2:2000");
        assert_eq!(status.client_channels[0].queued, 0);
    }

    #[tokio::test]
    async fn test_fan_out_to_all_subscribers() {
        let hub = Arc::new(Hub::new(HubConfig::default()));
        let mut a = hub.register_subscriber("a").unwrap();
        let mut b = hub.register_subscriber("b").unwrap();
        let (tx, handle) = spawn_hub(&hub);

        tx.send(BroadcastEvent::new(kind::RAW_IMAGE, "efgh")).await.unwrap();
        tx.send(BroadcastEvent::signal(kind::REQUEST_START)).await.unwrap();

        for sub in [&mut a, &mut b] {
            assert_eq!(&sub.recv().await.unwrap()[..], b"event: raw_image\ndata: efgh\n\n");
            assert_eq!(
                &sub.recv().await.unwrap()[..],
                b"event: llm_request_start\ndata: \n\n"
            );
        }

        drop(tx);
        drop(a);
        drop(b);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_slow_subscriber_does_not_block_others() {
        let hub = Arc::new(Hub::new(HubConfig::default()));
        let capacity = hub.config().subscriber_capacity;

        let mut fast = hub.register_subscriber("fast").unwrap();
        let mut slow = hub.register_subscriber("slow").unwrap();

        let reader = tokio::spawn(async move {
            let mut received = Vec::new();
            while let Some(frame) = fast.recv().await {
                received.push(sequence_number(&frame));
            }
            received
        });

        let (tx, handle) = spawn_hub(&hub);
        for i in 0..1000u32 {
            tx.send(BroadcastEvent::new("seq", i.to_string())).await.unwrap();
            assert!(hub.status().client_channels.iter().all(|c| c.queued <= capacity));
        }
        drop(tx);

        let received = reader.await.unwrap();
        assert_eq!(received.first(), Some(&0));
        assert!(received.windows(2).all(|w| w[0] < w[1]), "fast subscriber saw reordering");

        // The slow subscriber kept exactly the first `capacity` events
        let mut queued = Vec::new();
        while let Some(frame) = slow.try_recv() {
            queued.push(sequence_number(&frame));
        }
        assert_eq!(queued, (0..capacity as u32).collect::<Vec<_>>());
        assert!(hub.status().dropped_events >= (1000 - capacity) as u64);

        drop(slow);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_subscribers() {
        let hub = Arc::new(Hub::new(HubConfig::default()));
        let mut held = hub.register_subscriber("held").unwrap();
        let (tx, handle) = spawn_hub(&hub);

        tx.send(BroadcastEvent::new(kind::TIMESTAMP, "1")).await.unwrap();
        drop(tx);

        // The queue is closed but the subscription is still alive
        assert!(held.recv().await.is_some());
        assert!(held.recv().await.is_none());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!handle.is_finished(), "hub returned before subscriber exited");
        assert!(hub.is_shutting_down());

        drop(held);
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("hub drain did not complete")
            .unwrap();
    }

    #[tokio::test]
    async fn test_register_rejected_during_shutdown() {
        let hub = Arc::new(Hub::new(HubConfig::default()));
        let (tx, handle) = spawn_hub(&hub);

        drop(tx);
        handle.await.unwrap();

        assert!(hub.register_subscriber("late").is_none());
        assert_eq!(hub.subscriber_count(), 0);
    }
}

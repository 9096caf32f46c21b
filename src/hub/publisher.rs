//! Producer side of the hub's input queue

use parking_lot::RwLock;
use tokio::sync::mpsc;

use super::event::BroadcastEvent;

/// Sends events into the hub
///
/// The hub shuts down once every sender is gone, so the owner calls
/// [`EventPublisher::close`] when it stops producing. Publishing after close
/// drops the event.
#[derive(Debug)]
pub struct EventPublisher {
    tx: RwLock<Option<mpsc::Sender<BroadcastEvent>>>,
}

impl EventPublisher {
    /// Wrap the sending half of the hub's input channel
    pub fn new(tx: mpsc::Sender<BroadcastEvent>) -> Self {
        Self {
            tx: RwLock::new(Some(tx)),
        }
    }

    /// Queue an event for fan-out
    ///
    /// Waits for space in the input queue. The hub drains it without ever
    /// blocking on subscribers, so the wait is short.
    pub async fn publish(&self, event: BroadcastEvent) {
        let tx = self.tx.read().clone();

        match tx {
            Some(tx) => {
                if let Err(e) = tx.send(event).await {
                    tracing::debug!(
                        event_type = %e.0.event_type,
                        "Hub has stopped, dropping event"
                    );
                }
            }
            None => {
                tracing::debug!(
                    event_type = %event.event_type,
                    "Publisher closed, dropping event"
                );
            }
        }
    }

    /// Number of events waiting in the hub's input queue
    pub fn depth(&self) -> usize {
        self.tx
            .read()
            .as_ref()
            .map(|tx| tx.max_capacity() - tx.capacity())
            .unwrap_or(0)
    }

    /// Stop producing; the hub begins shutdown once pending events drain
    pub fn close(&self) {
        if self.tx.write().take().is_some() {
            tracing::debug!("Event publisher closed");
        }
    }

    /// Whether [`EventPublisher::close`] has been called
    pub fn is_closed(&self) -> bool {
        self.tx.read().is_none()
    }
}

//! Bounded pipeline queue

use tokio::sync::mpsc::{self, error::TrySendError};

use super::error::EnqueueError;
use super::snapshot::QueuedAlert;
use crate::error::Error;

/// Default pipeline queue capacity
pub const DEFAULT_QUEUE_CAPACITY: usize = 3;

/// Producer side of the pipeline queue
///
/// Enqueueing never waits: a full queue rejects the alert.
#[derive(Debug, Clone)]
pub struct AlertQueue {
    tx: mpsc::Sender<QueuedAlert>,
}

/// Create a bounded pipeline queue
///
/// A zero capacity would make every enqueue fail and is refused.
pub fn channel(capacity: usize) -> crate::error::Result<(AlertQueue, mpsc::Receiver<QueuedAlert>)> {
    if capacity == 0 {
        return Err(Error::Config("alert queue capacity must be at least 1".into()));
    }

    let (tx, rx) = mpsc::channel(capacity);
    Ok((AlertQueue { tx }, rx))
}

impl AlertQueue {
    /// Try to queue an alert without waiting
    pub fn try_enqueue(&self, alert: QueuedAlert) -> Result<(), EnqueueError> {
        match self.tx.try_send(alert) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(alert)) => {
                tracing::warn!(
                    timestamp = alert.timestamp,
                    prompt_id = alert.prompt.id,
                    "Alert queue is full, dropping alert"
                );
                Err(EnqueueError::Full)
            }
            Err(TrySendError::Closed(_)) => Err(EnqueueError::Closed),
        }
    }

    /// Alerts currently waiting
    pub fn depth(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    /// Fixed capacity
    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }
}

#[cfg(test)]
mod tests {
    use tokio_test::{assert_err, assert_ok};

    use super::*;

    fn alert(timestamp: i64) -> QueuedAlert {
        QueuedAlert {
            timestamp,
            ..Default::default()
        }
    }

    #[test]
    fn test_zero_capacity_rejected() {
        assert!(matches!(channel(0), Err(Error::Config(_))));
    }

    #[test]
    fn test_full_queue_rejects() {
        let (queue, _rx) = channel(DEFAULT_QUEUE_CAPACITY).unwrap();

        for i in 0..DEFAULT_QUEUE_CAPACITY {
            assert_eq!(queue.try_enqueue(alert(i as i64)), Ok(()));
        }
        assert_eq!(queue.try_enqueue(alert(99)), Err(EnqueueError::Full));
        assert_eq!(queue.depth(), DEFAULT_QUEUE_CAPACITY);
    }

    #[test]
    fn test_accepted_alerts_come_out_in_order() {
        let (queue, mut rx) = assert_ok!(channel(2));
        assert_ok!(queue.try_enqueue(alert(1)));
        assert_ok!(queue.try_enqueue(alert(2)));

        assert_eq!(assert_ok!(rx.try_recv()).timestamp, 1);
        assert_eq!(assert_ok!(rx.try_recv()).timestamp, 2);
        assert_err!(rx.try_recv());
        assert_eq!(queue.depth(), 0);
    }

    #[test]
    fn test_closed_queue() {
        let (queue, rx) = channel(1).unwrap();
        drop(rx);
        assert_eq!(queue.try_enqueue(alert(1)), Err(EnqueueError::Closed));
    }
}

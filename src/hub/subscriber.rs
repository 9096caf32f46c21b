//! Subscriber handles and the per-connection serving loop

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::time::{interval_at, timeout, Instant, MissedTickBehavior};
use tokio_util::task::task_tracker::TaskTrackerToken;

use super::config::MIN_PING_INTERVAL;
use super::event::PING_FRAME;
use super::store::Hub;

/// A registered subscriber's end of its outbound queue
///
/// Holds a drain token: the hub's shutdown does not complete until every
/// `Subscription` has been dropped.
#[derive(Debug)]
pub struct Subscription {
    pub(super) id: u64,
    pub(super) address: String,
    pub(super) rx: mpsc::Receiver<Bytes>,
    pub(super) _token: TaskTrackerToken,
}

impl Subscription {
    /// Registry id
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Remote address given at registration
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Wait for the next formatted frame; `None` once the hub closed the queue
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.rx.recv().await
    }

    /// Take a queued frame without waiting
    pub fn try_recv(&mut self) -> Option<Bytes> {
        self.rx.try_recv().ok()
    }
}

/// Why a serving loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServeExit {
    /// The viewer disconnected
    ClientGone,
    /// The hub closed the queue during shutdown
    HubClosed,
    /// A write failed or exceeded the write deadline
    WriteFailed,
}

impl Hub {
    /// Serve one subscriber until its connection, the hub, or a write ends it
    ///
    /// `conn` is the connection's write side; the response body drains it.
    /// The receiver being dropped is the connection's close signal. Each frame
    /// and keepalive must be accepted within the configured write deadline.
    pub async fn serve(&self, mut subscription: Subscription, conn: mpsc::Sender<Bytes>) -> ServeExit {
        // Covers a zero written to the field directly
        let period = self.config().ping_interval.max(MIN_PING_INTERVAL);
        let mut ping = interval_at(Instant::now() + period, period);
        ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let exit = loop {
            tokio::select! {
                _ = conn.closed() => {
                    tracing::debug!(
                        subscriber = subscription.id,
                        address = %subscription.address,
                        "Subscriber connection closed"
                    );
                    break ServeExit::ClientGone;
                }
                _ = ping.tick() => {
                    if !self.write(&subscription, &conn, Bytes::from_static(PING_FRAME)).await {
                        break ServeExit::WriteFailed;
                    }
                }
                frame = subscription.rx.recv() => match frame {
                    Some(frame) => {
                        if !self.write(&subscription, &conn, frame).await {
                            break ServeExit::WriteFailed;
                        }
                    }
                    None => {
                        tracing::debug!(
                            subscriber = subscription.id,
                            address = %subscription.address,
                            "Subscriber queue closed by hub"
                        );
                        break ServeExit::HubClosed;
                    }
                },
            }
        };

        self.deregister_subscriber(subscription.id);
        drop(subscription);

        exit
    }

    async fn write(&self, subscription: &Subscription, conn: &mpsc::Sender<Bytes>, frame: Bytes) -> bool {
        match timeout(self.config().write_timeout, conn.send(frame)).await {
            Ok(Ok(())) => true,
            Ok(Err(_)) => {
                tracing::debug!(
                    subscriber = subscription.id,
                    address = %subscription.address,
                    "Write to closed subscriber connection"
                );
                false
            }
            Err(_) => {
                tracing::warn!(
                    subscriber = subscription.id,
                    address = %subscription.address,
                    "Write to subscriber timed out"
                );
                false
            }
        }
    }
}

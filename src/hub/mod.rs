//! Broadcast hub for live viewers
//!
//! The hub fans every [`BroadcastEvent`] out to all registered subscribers.
//! Each subscriber has its own bounded outbound queue, so one slow viewer only
//! ever loses its own events.
//!
//! # Architecture
//!
//! ```text
//!   AlertPipeline ──► EventPublisher ──► input queue
//!                                            │
//!                                      Hub::run (fan-out)
//!                         ┌──────────────────┼──────────────────┐
//!                         ▼                  ▼                  ▼
//!                   [queue: 50]        [queue: 50]        [queue: 50]
//!                   Hub::serve         Hub::serve         Hub::serve
//!                         │                  │                  │
//!                     response           response           response
//! ```
//!
//! Frames are formatted once per event and shared between queues as
//! reference-counted `Bytes`.
//!
//! Closing the input (dropping every sender) starts shutdown: new
//! registrations are refused, every queue is closed, and `run` returns once all
//! serving loops have released their subscriptions.

pub mod config;
pub mod event;
pub mod publisher;
pub mod store;
pub mod subscriber;

pub use config::HubConfig;
pub use event::{kind, BroadcastEvent, PING_FRAME};
pub use publisher::EventPublisher;
pub use store::Hub;
pub use subscriber::{ServeExit, Subscription};

//! Operational status snapshots
//!
//! Read-only views served by the status endpoints. Taking a snapshot has no
//! side effects.

pub mod metrics;

pub use metrics::{CurrentState, HubStatus, PipelineStatus, SubscriberStatus};

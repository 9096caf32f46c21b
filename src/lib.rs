//! Alert processing pipeline with live event fan-out
//!
//! Alerts (an annotated image, a raw image, and a timestamp) are queued,
//! processed one at a time against one or two streaming inference backends,
//! and every intermediate result is pushed to connected viewers as
//! Server-Sent-Events.
//!
//! ```no_run
//! use alertcast::{AlertServer, ServerConfig};
//!
//! # async fn run() -> alertcast::Result<()> {
//! let server = AlertServer::new(ServerConfig::default())?;
//! server.run_until(async {
//!     let _ = tokio::signal::ctrl_c().await;
//! }).await?;
//! # Ok(())
//! # }
//! ```

pub mod alert;
pub mod error;
pub mod hub;
pub mod inference;
pub mod prompts;
pub mod server;
pub mod stats;

#[cfg(test)]
mod testing;

pub use alert::{AlertPipeline, AlertSnapshot, QueuedAlert};
pub use error::{Error, Result};
pub use hub::{BroadcastEvent, Hub, HubConfig};
pub use inference::{BackendConfig, InferenceBackend, InferenceClient, WireFormat};
pub use prompts::{PromptCatalog, PromptItem};
pub use server::{AlertServer, ServerConfig};

//! Alert pipeline
//!
//! Alerts enter through [`AlertPipeline::enqueue`] (or the bus and REST
//! ingestion helpers) and are processed one at a time by
//! [`AlertPipeline::run`]. Enqueueing never blocks; a full queue rejects the
//! alert and the caller decides how to report it.
//!
//! After processing an alert the pipeline pauses. While paused, further
//! alerts for the same prompt are discarded; an alert carrying a different
//! prompt is always processed. [`AlertPipeline::resume`] reopens the gate.

pub mod controller;
pub mod error;
pub mod gate;
pub mod ingest;
pub mod queue;
pub mod snapshot;
pub mod stage;

pub use controller::AlertPipeline;
pub use error::{EnqueueError, IngestError, SetPromptError};
pub use ingest::{BusAlert, PromptChange};
pub use queue::{AlertQueue, DEFAULT_QUEUE_CAPACITY};
pub use snapshot::{AlertSnapshot, AnalysisStore, QueuedAlert, SnapshotStore};
pub use stage::Stage;

//! Alert pipeline error types

/// Rejected enqueue attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum EnqueueError {
    /// The queue is at capacity; the alert was dropped
    #[error("alert queue is full")]
    Full,

    /// The consumer is gone
    #[error("alert queue is closed")]
    Closed,
}

/// Error type for prompt changes
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SetPromptError {
    /// No prompt with this id
    #[error("prompt id {0} does not exist")]
    UnknownPrompt(usize),

    /// The prompt was selected but there is no alert to re-run it against
    #[error("prompt set - but there are no pending alerts")]
    NoPendingAlert,

    /// The re-run could not be queued
    #[error(transparent)]
    Enqueue(#[from] EnqueueError),
}

/// Error type for inbound alert payloads
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// The payload was not a valid alert document
    #[error("malformed alert payload: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The alert could not be queued
    #[error(transparent)]
    Enqueue(#[from] EnqueueError),
}

//! Inbound alert and prompt-change payloads

use serde::Deserialize;

use super::controller::AlertPipeline;
use super::error::IngestError;
use super::snapshot::QueuedAlert;

/// Alert document published on the message bus
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct BusAlert {
    #[serde(default)]
    pub annotated_image: String,
    #[serde(default)]
    pub raw_image: String,
    #[serde(default)]
    pub timestamp: i64,
}

impl BusAlert {
    /// Parse a raw bus payload
    pub fn parse(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }
}

/// Prompt-change request body, `{"id": <int>}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct PromptChange {
    pub id: usize,
}

impl PromptChange {
    /// Parse a request body; the id is required and must be a non-negative integer
    pub fn parse(body: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(body)
    }
}

impl AlertPipeline {
    /// Queue an alert received from the bus, tagged with the selected prompt
    ///
    /// Malformed payloads and a full queue are both reported to the caller,
    /// which for the bus path has no one to tell but the log.
    pub fn handle_bus_message(&self, payload: &[u8]) -> Result<(), IngestError> {
        let message = BusAlert::parse(payload)?;
        let prompt = self.catalog().selected();

        tracing::debug!(
            timestamp = message.timestamp,
            prompt_id = prompt.id,
            "Received alert message"
        );

        self.enqueue(QueuedAlert {
            annotated_image: message.annotated_image.into_bytes(),
            raw_image: message.raw_image.into_bytes(),
            timestamp: message.timestamp,
            prompt,
        })?;

        Ok(())
    }
}

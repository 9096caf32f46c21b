//! Alert values and the latest-alert store

use parking_lot::RwLock;

use super::stage::Stage;
use crate::prompts::PromptItem;

/// One alert waiting in the pipeline queue
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueuedAlert {
    pub annotated_image: Vec<u8>,
    pub raw_image: Vec<u8>,
    pub timestamp: i64,
    /// Prompt selected when the alert arrived
    pub prompt: PromptItem,
}

/// The most recently processed alert
///
/// The zero value (no images, zero timestamp) means no alert has been
/// processed yet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlertSnapshot {
    pub annotated_image: Vec<u8>,
    pub raw_image: Vec<u8>,
    pub timestamp: i64,
    pub prompt: PromptItem,
}

impl AlertSnapshot {
    /// Whether this is the zero value
    pub fn is_empty(&self) -> bool {
        self.annotated_image.is_empty() && self.raw_image.is_empty() && self.timestamp == 0
    }

    /// Build an alert that re-runs these images against another prompt
    pub fn requeue(&self, prompt: PromptItem) -> QueuedAlert {
        QueuedAlert {
            annotated_image: self.annotated_image.clone(),
            raw_image: self.raw_image.clone(),
            timestamp: self.timestamp,
            prompt,
        }
    }
}

impl From<QueuedAlert> for AlertSnapshot {
    fn from(alert: QueuedAlert) -> Self {
        Self {
            annotated_image: alert.annotated_image,
            raw_image: alert.raw_image,
            timestamp: alert.timestamp,
            prompt: alert.prompt,
        }
    }
}

/// Single-writer, many-reader holder of the latest [`AlertSnapshot`]
///
/// Values cross the lock only by copy, so callers never share buffers with
/// the stored snapshot.
#[derive(Debug, Default)]
pub struct SnapshotStore {
    latest: RwLock<AlertSnapshot>,
}

impl SnapshotStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the latest snapshot, or the zero value
    pub fn get(&self) -> AlertSnapshot {
        self.latest.read().clone()
    }

    /// Replace the stored snapshot wholesale
    pub fn replace(&self, snapshot: AlertSnapshot) {
        *self.latest.write() = snapshot;
    }
}

/// Accumulated text of the two inference stages for the latest alert
#[derive(Debug, Default)]
pub struct AnalysisStore {
    image: RwLock<String>,
    threat: RwLock<String>,
}

impl AnalysisStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a stage's text, replacing the previous value
    pub fn store(&self, stage: Stage, text: String) {
        *self.slot(stage).write() = text;
    }

    /// Get a stage's text
    pub fn load(&self, stage: Stage) -> String {
        self.slot(stage).read().clone()
    }

    /// Clear both stages
    pub fn clear(&self) {
        self.image.write().clear();
        self.threat.write().clear();
    }

    fn slot(&self, stage: Stage) -> &RwLock<String> {
        match stage {
            Stage::Description => &self.image,
            Stage::Classification => &self.threat,
        }
    }
}

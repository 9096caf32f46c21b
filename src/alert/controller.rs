//! Alert pipeline controller
//!
//! A single consumer drains the pipeline queue. For each alert that passes
//! the pause gate it stores the snapshot, broadcasts the images and prompt,
//! then streams the description stage (and, when configured, the
//! classification stage) to viewers as fragments arrive.
//!
//! Event order for one processed alert:
//!
//! ```text
//! timestamp, annotated_image, raw_image, llm_request_start, prompt,
//! [llm_response_start, llm_response*, llm_response_stop],
//! [threat_response_start, threat_response*, threat_response_stop],
//! pause_events
//! ```
//!
//! Bracketed groups are only emitted when the stage produced content.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::error::{EnqueueError, SetPromptError};
use super::gate;
use super::queue::{self, AlertQueue};
use super::snapshot::{AlertSnapshot, AnalysisStore, QueuedAlert, SnapshotStore};
use super::stage::Stage;
use crate::hub::{kind, BroadcastEvent, EventPublisher};
use crate::inference::{InferenceBackend, InferenceRequest};
use crate::prompts::{PromptCatalog, PromptItem};
use crate::stats::{CurrentState, PipelineStatus};

/// Second-stage backend and the instruction prepended to the description
struct Classifier {
    backend: Arc<dyn InferenceBackend>,
    prompt: String,
}

/// Single-consumer alert processor
pub struct AlertPipeline {
    catalog: Arc<PromptCatalog>,
    queue: AlertQueue,
    receiver: Mutex<Option<mpsc::Receiver<QueuedAlert>>>,
    events: EventPublisher,
    describer: Arc<dyn InferenceBackend>,
    classifier: Option<Classifier>,
    paused: AtomicBool,
    snapshot: SnapshotStore,
    analysis: AnalysisStore,
}

impl AlertPipeline {
    /// Create a pipeline with a queue of `queue_capacity` alerts
    pub fn new(
        catalog: Arc<PromptCatalog>,
        queue_capacity: usize,
        events: EventPublisher,
        describer: Arc<dyn InferenceBackend>,
    ) -> crate::error::Result<Self> {
        let (queue, receiver) = queue::channel(queue_capacity)?;

        Ok(Self {
            catalog,
            queue,
            receiver: Mutex::new(Some(receiver)),
            events,
            describer,
            classifier: None,
            paused: AtomicBool::new(false),
            snapshot: SnapshotStore::new(),
            analysis: AnalysisStore::new(),
        })
    }

    /// Classify every description with `backend`, prefixing it with `prompt`
    pub fn with_classifier(mut self, backend: Arc<dyn InferenceBackend>, prompt: impl Into<String>) -> Self {
        self.classifier = Some(Classifier {
            backend,
            prompt: prompt.into(),
        });
        self
    }

    /// Prompt catalog
    pub fn catalog(&self) -> &PromptCatalog {
        &self.catalog
    }

    /// Queue an alert without waiting
    pub fn enqueue(&self, alert: QueuedAlert) -> Result<(), EnqueueError> {
        self.queue.try_enqueue(alert)
    }

    /// Whether the pause gate is closed
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    /// Copy of the latest processed alert, or the zero value
    pub fn latest_snapshot(&self) -> AlertSnapshot {
        self.snapshot.get()
    }

    /// Reopen the pause gate and tell viewers
    pub async fn resume(&self) {
        self.paused.store(false, Ordering::Release);
        tracing::info!("Resuming alert processing");
        self.events.publish(BroadcastEvent::signal(kind::RESUME)).await;
    }

    /// Select a prompt and re-run the latest alert's images against it
    ///
    /// The selection sticks even when there is no alert to re-run.
    pub fn set_prompt(&self, id: usize) -> Result<PromptItem, SetPromptError> {
        let item = self
            .catalog
            .select(id)
            .map_err(|_| SetPromptError::UnknownPrompt(id))?;

        let snapshot = self.snapshot.get();
        if snapshot.is_empty() {
            return Err(SetPromptError::NoPendingAlert);
        }

        self.queue.try_enqueue(snapshot.requeue(item.clone()))?;
        Ok(item)
    }

    /// Queue depths and gate state
    pub fn status(&self) -> PipelineStatus {
        PipelineStatus {
            llm_channel: self.queue.depth(),
            sse_channel: self.events.depth(),
            paused: self.is_paused(),
        }
    }

    /// Latest alert, stage texts, and gate state for late-joining viewers
    pub fn current_state(&self) -> CurrentState {
        let snapshot = self.snapshot.get();

        CurrentState {
            annotated_image: String::from_utf8_lossy(&snapshot.annotated_image).into_owned(),
            raw_image: String::from_utf8_lossy(&snapshot.raw_image).into_owned(),
            timestamp: snapshot.timestamp,
            prompt: String::from_utf8_lossy(&snapshot.prompt.event_data()).into_owned(),
            image_analysis: self.analysis.load(Stage::Description),
            threat_analysis: self.analysis.load(Stage::Classification),
            events_paused: self.is_paused(),
        }
    }

    /// Stop producing events; the hub drains and shuts down
    pub fn close_events(&self) {
        self.events.close();
    }

    /// Consume the queue until `cancel` fires
    ///
    /// Only the first call runs; the queue has a single consumer.
    pub async fn run(&self, cancel: CancellationToken) {
        let receiver = self.receiver.lock().take();
        let Some(mut receiver) = receiver else {
            tracing::warn!("Alert pipeline is already running");
            return;
        };

        tracing::info!(capacity = self.queue.capacity(), "Alert pipeline started");
        let mut last_prompt: Option<usize> = None;

        loop {
            let alert = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                alert = receiver.recv() => match alert {
                    Some(alert) => alert,
                    None => break,
                },
            };

            let prompt_id = alert.prompt.id;
            if !gate::should_process(self.is_paused(), last_prompt, prompt_id) {
                tracing::debug!(
                    prompt_id,
                    timestamp = alert.timestamp,
                    "Ignoring alert while events are paused"
                );
                continue;
            }

            self.paused.store(true, Ordering::Release);
            last_prompt = Some(prompt_id);

            self.process(alert, &cancel).await;
        }

        tracing::info!("Alert pipeline stopped");
    }

    async fn process(&self, alert: QueuedAlert, cancel: &CancellationToken) {
        tracing::info!(
            timestamp = alert.timestamp,
            prompt_id = alert.prompt.id,
            "Processing alert"
        );

        let snapshot = AlertSnapshot::from(alert);
        self.snapshot.replace(snapshot.clone());
        self.analysis.clear();

        self.emit(BroadcastEvent::new(kind::TIMESTAMP, snapshot.timestamp.to_string())).await;
        self.emit(BroadcastEvent::new(kind::ANNOTATED_IMAGE, snapshot.annotated_image.clone())).await;
        self.emit(BroadcastEvent::new(kind::RAW_IMAGE, snapshot.raw_image.clone())).await;
        self.emit(BroadcastEvent::signal(kind::REQUEST_START)).await;
        self.emit(BroadcastEvent::new(kind::PROMPT, snapshot.prompt.event_data())).await;

        let request = InferenceRequest::new(snapshot.prompt.descriptive.as_str())
            .with_image(String::from_utf8_lossy(&snapshot.raw_image));
        let description = self
            .run_stage(Stage::Description, self.describer.as_ref(), request, cancel)
            .await;

        if let Some(classifier) = &self.classifier {
            if description.is_empty() {
                tracing::debug!("Description is empty, skipping classification");
            } else if !cancel.is_cancelled() {
                let request = InferenceRequest::new(format!("{}\n\n{}", classifier.prompt, description));
                self.run_stage(Stage::Classification, classifier.backend.as_ref(), request, cancel)
                    .await;
            }
        }

        self.emit(BroadcastEvent::signal(kind::PAUSE)).await;
    }

    /// Forward one stage's fragments as they arrive and return the full text
    async fn run_stage(
        &self,
        stage: Stage,
        backend: &dyn InferenceBackend,
        request: InferenceRequest,
        cancel: &CancellationToken,
    ) -> String {
        let mut fragments = backend.stream(request, cancel.child_token());
        let mut text = String::new();
        let mut started = false;

        while let Some(fragment) = fragments.next().await {
            if !started {
                self.emit(BroadcastEvent::signal(stage.start_event())).await;
                started = true;
            }

            let data = serde_json::json!({ "response": fragment }).to_string();
            self.emit(BroadcastEvent::new(stage.chunk_event(), Bytes::from(data))).await;
            text.push_str(&fragment);
        }

        if started {
            self.emit(BroadcastEvent::signal(stage.stop_event())).await;
        }

        tracing::info!(stage = %stage, chars = text.len(), "Inference stage finished");
        self.analysis.store(stage, text.clone());
        text
    }

    async fn emit(&self, event: BroadcastEvent) {
        self.events.publish(event).await;
    }
}

//! HTTP server listener
//!
//! Wires the pipeline consumer, the hub fan-out loop, and the axum router,
//! and sequences their shutdown.

use std::future::Future;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::alert::AlertPipeline;
use crate::error::{Error, Result};
use crate::hub::{BroadcastEvent, EventPublisher, Hub};
use crate::inference::{BackendConfig, CaptureSink, InferenceClient};
use crate::prompts::PromptCatalog;
use crate::server::config::ServerConfig;
use crate::server::routes::{self, AppState};

/// Alert broadcast server
pub struct AlertServer {
    config: ServerConfig,
    pipeline: Arc<AlertPipeline>,
    hub: Arc<Hub>,
    hub_input: Mutex<Option<mpsc::Receiver<BroadcastEvent>>>,
}

impl AlertServer {
    /// Create a server from configuration
    ///
    /// Fails on an unusable prompt catalog, a zero queue capacity, or a
    /// capture directory that cannot be written.
    pub fn new(config: ServerConfig) -> Result<Self> {
        let catalog = Arc::new(PromptCatalog::load(config.prompts_file.as_deref())?);

        let hub = Arc::new(Hub::new(config.hub.clone()));
        let (event_tx, event_rx) = mpsc::channel(config.hub.input_capacity);

        if let Some(dir) = &config.capture_dir {
            std::fs::create_dir_all(dir)?;
        }

        let describer = backend(&config.description, config.capture_dir.as_deref(), "stage1.txt")?;
        let mut pipeline = AlertPipeline::new(
            catalog,
            config.queue_capacity,
            EventPublisher::new(event_tx),
            Arc::new(describer),
        )?;

        if let Some(classification) = &config.classification {
            let classifier = backend(classification, config.capture_dir.as_deref(), "stage2.txt")?;
            pipeline = pipeline.with_classifier(Arc::new(classifier), config.classification_prompt.clone());
        }

        Ok(Self {
            config,
            pipeline: Arc::new(pipeline),
            hub,
            hub_input: Mutex::new(Some(event_rx)),
        })
    }

    /// Get the alert pipeline
    pub fn pipeline(&self) -> &Arc<AlertPipeline> {
        &self.pipeline
    }

    /// Get the broadcast hub
    pub fn hub(&self) -> &Arc<Hub> {
        &self.hub
    }

    /// Get the bind address
    pub fn bind_addr(&self) -> SocketAddr {
        self.config.bind_addr
    }

    /// Bind the configured address and serve until `shutdown` resolves
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener until `shutdown` resolves
    ///
    /// Shutdown order: the pipeline consumer is cancelled (aborting any
    /// in-flight backend call), its event publisher is closed, the hub drains
    /// and ends every live event stream, and finally the HTTP server finishes
    /// its remaining connections.
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let hub_input = self
            .hub_input
            .lock()
            .take()
            .ok_or_else(|| Error::Config("server is already running".into()))?;

        let app = routes::router(
            AppState::new(Arc::clone(&self.pipeline), Arc::clone(&self.hub)),
            self.config.cors_origin.as_deref(),
        )?;

        let cancel = CancellationToken::new();

        let hub_task = tokio::spawn({
            let hub = Arc::clone(&self.hub);
            async move { hub.run(hub_input).await }
        });

        let pipeline_task = tokio::spawn({
            let pipeline = Arc::clone(&self.pipeline);
            let cancel = cancel.clone();
            async move {
                pipeline.run(cancel).await;
                pipeline.close_events();
            }
        });

        let graceful = {
            let cancel = cancel.clone();
            async move {
                tokio::select! {
                    _ = shutdown => tracing::info!("Shutdown signal received"),
                    _ = cancel.cancelled() => {}
                }
                cancel.cancel();
            }
        };

        tracing::info!(addr = %listener.local_addr()?, "Alert server listening");

        let result = axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
            .with_graceful_shutdown(graceful)
            .await;

        // Covers the server failing before a shutdown signal
        cancel.cancel();

        if let Err(e) = pipeline_task.await {
            tracing::error!(error = %e, "Pipeline task failed");
            self.pipeline.close_events();
        }
        if let Err(e) = hub_task.await {
            tracing::error!(error = %e, "Hub task failed");
        }

        tracing::info!("Alert server stopped");
        result.map_err(Error::from)
    }
}

fn backend(config: &BackendConfig, capture_dir: Option<&Path>, capture_file: &str) -> Result<InferenceClient> {
    let client = InferenceClient::new(config.clone())?;

    tracing::info!(
        url = %config.url,
        model = %config.model,
        format = %config.format,
        "Inference backend configured"
    );

    match capture_dir {
        Some(dir) => Ok(client.with_capture(CaptureSink::create(dir.join(capture_file))?)),
        None => Ok(client),
    }
}

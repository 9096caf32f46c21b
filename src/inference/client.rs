//! HTTP inference client
//!
//! Posts one request per call and turns the response into a stream of
//! content fragments. The stream ends on the backend's stop marker, EOF,
//! cancellation, the request deadline, or any transport error. Errors are
//! logged here and never reach the caller; a failed call is simply a short
//! (possibly empty) stream.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures::{Stream, StreamExt};
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;

use super::capture::CaptureSink;
use super::format::{Decoded, ResponseFormat, WireFormat};
use super::lines::LineBuffer;
use super::request::InferenceRequest;
use crate::error::Result;

/// Default time allowed for a whole call, body included
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Lazily produced content fragments in arrival order
pub type FragmentStream = Pin<Box<dyn Stream<Item = String> + Send>>;

/// Anything that can answer an [`InferenceRequest`] with a fragment stream
pub trait InferenceBackend: Send + Sync {
    /// Start a call; the returned stream stops early once `cancel` fires
    fn stream(&self, request: InferenceRequest, cancel: CancellationToken) -> FragmentStream;
}

/// Backend endpoint configuration
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Endpoint URL
    pub url: String,
    /// Model name sent in the request body
    pub model: String,
    /// Wire format spoken by the endpoint
    pub format: WireFormat,
    /// Deadline for the whole call
    pub request_timeout: Duration,
    /// Optional `keep_alive` hint for generate-style backends
    pub keep_alive: Option<String>,
}

impl BackendConfig {
    /// Create a config for `url` with default settings
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            model: String::new(),
            format: WireFormat::default(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            keep_alive: None,
        }
    }

    /// Set the model name
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the wire format
    pub fn format(mut self, format: WireFormat) -> Self {
        self.format = format;
        self
    }

    /// Set the call deadline
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the keep-alive hint
    pub fn keep_alive(mut self, keep_alive: impl Into<String>) -> Self {
        self.keep_alive = Some(keep_alive.into());
        self
    }
}

/// reqwest-backed [`InferenceBackend`]
#[derive(Debug, Clone)]
pub struct InferenceClient {
    http: reqwest::Client,
    config: BackendConfig,
    format: Arc<dyn ResponseFormat>,
    capture: Option<CaptureSink>,
}

impl InferenceClient {
    /// Create a client for one backend endpoint
    pub fn new(config: BackendConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            http,
            format: config.format.strategy(),
            config,
            capture: None,
        })
    }

    /// Record every raw response line to `sink`
    pub fn with_capture(mut self, sink: CaptureSink) -> Self {
        self.capture = Some(sink);
        self
    }

    /// Backend configuration
    pub fn config(&self) -> &BackendConfig {
        &self.config
    }
}

impl InferenceBackend for InferenceClient {
    fn stream(&self, request: InferenceRequest, cancel: CancellationToken) -> FragmentStream {
        let http = self.http.clone();
        let config = self.config.clone();
        let format = Arc::clone(&self.format);
        let capture = self.capture.clone();

        Box::pin(async_stream::stream! {
            let _flush = capture.as_ref().map(CaptureSink::flush_on_drop);
            let deadline = Instant::now() + config.request_timeout;

            let body = match format.request_body(&config, &request) {
                Ok(body) => body,
                Err(e) => {
                    tracing::error!(url = %config.url, error = %e, "Failed to encode request body");
                    return;
                }
            };

            tracing::debug!(url = %config.url, format = %config.format, "Sending inference request");

            let sent = tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!(url = %config.url, "Inference request cancelled");
                    return;
                }
                _ = sleep_until(deadline) => {
                    tracing::warn!(url = %config.url, "Inference request timed out before response");
                    return;
                }
                sent = http.post(&config.url).json(&body).send() => sent,
            };

            let response = match sent {
                Ok(response) if response.status().is_success() => response,
                Ok(response) => {
                    tracing::warn!(
                        url = %config.url,
                        status = %response.status(),
                        "Backend returned error status"
                    );
                    return;
                }
                Err(e) => {
                    tracing::warn!(url = %config.url, error = %e, "Backend request failed");
                    return;
                }
            };

            if !format.streaming() {
                let text = tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = sleep_until(deadline) => {
                        tracing::warn!(url = %config.url, "Inference response timed out");
                        return;
                    }
                    text = response.text() => text,
                };

                match text {
                    Ok(text) => {
                        if let Some(decoded) = decode_logged(format.as_ref(), capture.as_ref(), &text) {
                            if let Some(fragment) = decoded.fragment {
                                yield fragment;
                            }
                        }
                    }
                    Err(e) => {
                        tracing::warn!(url = %config.url, error = %e, "Failed to read response body");
                    }
                }
                return;
            }

            let chunks = response.bytes_stream();
            tokio::pin!(chunks);
            let mut lines = LineBuffer::default();

            'read: loop {
                let chunk = tokio::select! {
                    _ = cancel.cancelled() => {
                        tracing::debug!(url = %config.url, "Inference stream cancelled");
                        break 'read;
                    }
                    _ = sleep_until(deadline) => {
                        tracing::warn!(url = %config.url, "Inference stream timed out");
                        break 'read;
                    }
                    chunk = chunks.next() => chunk,
                };

                let eof = match chunk {
                    Some(Ok(bytes)) => {
                        lines.push(&bytes);
                        false
                    }
                    Some(Err(e)) => {
                        tracing::warn!(url = %config.url, error = %e, "Inference stream read failed");
                        break 'read;
                    }
                    None => true,
                };

                loop {
                    let line = match lines.next_line() {
                        Some(line) => line,
                        None if eof => match lines.finish() {
                            Some(line) => line,
                            None => break,
                        },
                        None => break,
                    };

                    let Some(decoded) = decode_logged(format.as_ref(), capture.as_ref(), &line) else {
                        continue;
                    };
                    if let Some(fragment) = decoded.fragment {
                        yield fragment;
                    }
                    if decoded.finished {
                        tracing::debug!(url = %config.url, "Backend signalled end of response");
                        break 'read;
                    }
                }

                if eof {
                    break 'read;
                }
            }
        })
    }
}

fn decode_logged(format: &dyn ResponseFormat, capture: Option<&CaptureSink>, raw: &str) -> Option<Decoded> {
    if let Some(capture) = capture {
        capture.record(raw);
    }

    match format.decode(raw) {
        Ok(decoded) => Some(decoded),
        Err(e) => {
            tracing::warn!(error = %e, "Skipping undecodable backend line");
            None
        }
    }
}

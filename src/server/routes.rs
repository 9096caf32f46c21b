//! HTTP endpoints
//!
//! - `GET  /healthz` - liveness probe
//! - `GET  /api/sse` - live event stream
//! - `GET  /api/ssestatus` - subscriber queue depths
//! - `GET  /api/prompt` - prompt list
//! - `POST /api/prompt` - select a prompt and re-run the latest alert
//! - `GET|POST /api/resumeevents` - reopen the pause gate
//! - `GET  /api/alertsstatus` - pipeline queue depths
//! - `GET  /api/currentstate` - latest alert for late-joining viewers
//! - `POST /api/alerts` - submit a bus alert payload over HTTP

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::{ConnectInfo, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::alert::{AlertPipeline, EnqueueError, IngestError, PromptChange, SetPromptError};
use crate::error::{Error, Result};
use crate::hub::Hub;

/// Buffer between a subscriber's serving loop and its response body
const CONNECTION_BUFFER: usize = 1;

/// State shared by every handler
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<AlertPipeline>,
    pub hub: Arc<Hub>,
}

impl AppState {
    pub fn new(pipeline: Arc<AlertPipeline>, hub: Arc<Hub>) -> Self {
        Self { pipeline, hub }
    }
}

/// Build the application router
///
/// With `cors_origin` set, every response carries it as
/// `Access-Control-Allow-Origin`.
pub fn router(state: AppState, cors_origin: Option<&str>) -> Result<Router> {
    let router = Router::new()
        .route("/healthz", get(health))
        .route("/api/sse", get(events))
        .route("/api/ssestatus", get(hub_status))
        .route("/api/prompt", get(list_prompts).post(set_prompt))
        .route("/api/resumeevents", get(resume).post(resume))
        .route("/api/alertsstatus", get(pipeline_status))
        .route("/api/currentstate", get(current_state))
        .route("/api/alerts", post(submit_alert))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    match cors_origin {
        Some(origin) => Ok(router.layer(cors_layer(origin)?)),
        None => Ok(router),
    }
}

fn cors_layer(origin: &str) -> Result<CorsLayer> {
    let allow_origin = if origin == "*" {
        AllowOrigin::any()
    } else {
        let value = HeaderValue::from_str(origin)
            .map_err(|e| Error::Config(format!("CORS origin {:?}: {}", origin, e)))?;
        AllowOrigin::exact(value)
    };

    Ok(CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(Any)
        .allow_headers(Any))
}

async fn health() -> &'static str {
    "OK"
}

/// Stream broadcast frames to one viewer until it leaves or the hub closes
async fn events(State(state): State<AppState>, ConnectInfo(addr): ConnectInfo<SocketAddr>) -> Response {
    let Some(subscription) = state.hub.register_subscriber(addr.to_string()) else {
        return (StatusCode::SERVICE_UNAVAILABLE, "server is shutting down").into_response();
    };

    let (conn_tx, conn_rx) = mpsc::channel::<Bytes>(CONNECTION_BUFFER);
    let hub = Arc::clone(&state.hub);
    tokio::spawn(async move {
        let id = subscription.id();
        let exit = hub.serve(subscription, conn_tx).await;
        tracing::debug!(subscriber = id, exit = ?exit, "Event stream ended");
    });

    let body = Body::from_stream(ReceiverStream::new(conn_rx).map(Ok::<_, Infallible>));

    (
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        body,
    )
        .into_response()
}

async fn hub_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.hub.status())
}

async fn list_prompts(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.pipeline.catalog().short_prompts())
}

async fn set_prompt(State(state): State<AppState>, body: Bytes) -> Response {
    let change = match PromptChange::parse(&body) {
        Ok(change) => change,
        Err(e) => {
            return (StatusCode::BAD_REQUEST, format!("could not parse prompt request: {}", e)).into_response();
        }
    };

    match state.pipeline.set_prompt(change.id) {
        Ok(item) => format!("prompt set to {}", item.id).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn resume(State(state): State<AppState>) -> &'static str {
    state.pipeline.resume().await;
    "OK"
}

async fn pipeline_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.pipeline.status())
}

async fn current_state(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.pipeline.current_state())
}

async fn submit_alert(State(state): State<AppState>, body: Bytes) -> Response {
    match state.pipeline.handle_bus_message(&body) {
        Ok(()) => (StatusCode::ACCEPTED, "alert queued").into_response(),
        Err(e) => e.into_response(),
    }
}

fn enqueue_status(e: EnqueueError) -> StatusCode {
    match e {
        EnqueueError::Full | EnqueueError::Closed => StatusCode::SERVICE_UNAVAILABLE,
    }
}

impl IntoResponse for SetPromptError {
    fn into_response(self) -> Response {
        let status = match self {
            SetPromptError::UnknownPrompt(_) => StatusCode::BAD_REQUEST,
            SetPromptError::NoPendingAlert => StatusCode::PRECONDITION_FAILED,
            SetPromptError::Enqueue(e) => enqueue_status(e),
        };
        tracing::info!(status = %status, error = %self, "Prompt change rejected");
        (status, self.to_string()).into_response()
    }
}

impl IntoResponse for IngestError {
    fn into_response(self) -> Response {
        let status = match &self {
            IngestError::Malformed(_) => StatusCode::BAD_REQUEST,
            IngestError::Enqueue(e) => enqueue_status(*e),
        };
        tracing::info!(status = %status, error = %self, "Alert rejected");
        (status, self.to_string()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::time::Duration;

    use axum::body::to_bytes;
    use axum::extract::connect_info::MockConnectInfo;
    use axum::http::Request;
    use tower::ServiceExt;

    use super::*;
    use crate::alert::QueuedAlert;
    use crate::hub::{kind, BroadcastEvent, EventPublisher, HubConfig};
    use crate::prompts::PromptCatalog;
    use crate::testing::ScriptedBackend;

    struct Fixture {
        state: AppState,
        events: Option<mpsc::Receiver<BroadcastEvent>>,
    }

    fn fixture(queue_capacity: usize) -> Fixture {
        let catalog = PromptCatalog::from_reader(Cursor::new("short0\nshort1|descriptive1\nshort2\n")).unwrap();
        let (tx, rx) = mpsc::channel(64);
        let pipeline = AlertPipeline::new(
            Arc::new(catalog),
            queue_capacity,
            EventPublisher::new(tx),
            ScriptedBackend::new(&["ok"]),
        )
        .unwrap();

        Fixture {
            state: AppState::new(Arc::new(pipeline), Arc::new(Hub::new(HubConfig::default()))),
            events: Some(rx),
        }
    }

    fn app(state: &AppState) -> Router {
        router(state.clone(), None)
            .unwrap()
            .layer(MockConnectInfo(SocketAddr::from(([127, 0, 0, 1], 40000))))
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, String) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_request(uri: &str, body: &'static str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let fixture = fixture(3);
        let (status, body) = send(app(&fixture.state), get_request("/healthz")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "OK");
    }

    #[tokio::test]
    async fn test_list_prompts() {
        let fixture = fixture(3);
        let (status, body) = send(app(&fixture.state), get_request("/api/prompt")).await;

        assert_eq!(status, StatusCode::OK);
        let prompts: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(
            prompts,
            serde_json::json!([
                {"id": 0, "prompt": "short0"},
                {"id": 1, "prompt": "short1"},
                {"id": 2, "prompt": "short2"},
            ])
        );
    }

    #[tokio::test]
    async fn test_set_prompt_rejections() {
        let fixture = fixture(3);

        let (status, _) = send(app(&fixture.state), post_request("/api/prompt", "{not json")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(app(&fixture.state), post_request("/api/prompt", "{}")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(app(&fixture.state), post_request("/api/prompt", r#"{"id":"1"}"#)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = send(app(&fixture.state), post_request("/api/prompt", r#"{"id":7}"#)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.contains("does not exist"));

        // Valid id but nothing to re-run
        let (status, _) = send(app(&fixture.state), post_request("/api/prompt", r#"{"id":2}"#)).await;
        assert_eq!(status, StatusCode::PRECONDITION_FAILED);
        assert_eq!(fixture.state.pipeline.catalog().selected().id, 2);
        assert_eq!(fixture.state.pipeline.status().llm_channel, 0);
    }

    #[tokio::test]
    async fn test_submit_alert() {
        let fixture = fixture(1);
        let payload = r#"{"annotated_image":"abcd","raw_image":"efgh","timestamp":1234}"#;

        let (status, _) = send(app(&fixture.state), post_request("/api/alerts", payload)).await;
        assert_eq!(status, StatusCode::ACCEPTED);

        let (status, _) = send(app(&fixture.state), post_request("/api/alerts", payload)).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        let (status, _) = send(app(&fixture.state), post_request("/api/alerts", "[1,2")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (_, body) = send(app(&fixture.state), get_request("/api/alertsstatus")).await;
        let status: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(status["llm_channel"], 1);
        assert_eq!(status["sse_channel"], 0);
        assert_eq!(status["paused"], false);
    }

    #[tokio::test]
    async fn test_set_prompt_reruns_alert() {
        let mut fixture = fixture(3);
        let pipeline = Arc::clone(&fixture.state.pipeline);
        let mut events = fixture.events.take().unwrap();

        pipeline
            .enqueue(QueuedAlert {
                raw_image: b"efgh".to_vec(),
                timestamp: 1234,
                prompt: pipeline.catalog().selected(),
                ..Default::default()
            })
            .unwrap();

        let cancel = tokio_util::sync::CancellationToken::new();
        let task = tokio::spawn({
            let pipeline = Arc::clone(&pipeline);
            let cancel = cancel.clone();
            async move { pipeline.run(cancel).await }
        });

        // Wait for the first alert to finish
        loop {
            let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
                .await
                .unwrap()
                .unwrap();
            if event.event_type == kind::PAUSE {
                break;
            }
        }

        let (status, body) = send(app(&fixture.state), post_request("/api/prompt", r#"{"id":1}"#)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "prompt set to 1");

        let (_, body) = send(app(&fixture.state), get_request("/api/currentstate")).await;
        let state: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(state["raw_image"], "efgh");
        assert_eq!(state["timestamp"], 1234);

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_resume() {
        let mut fixture = fixture(3);
        let mut events = fixture.events.take().unwrap();

        let (status, body) = send(app(&fixture.state), get_request("/api/resumeevents")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "OK");
        assert!(!fixture.state.pipeline.is_paused());
        assert_eq!(events.recv().await.unwrap().event_type, kind::RESUME);
    }

    #[tokio::test]
    async fn test_current_state_before_any_alert() {
        let fixture = fixture(3);
        let (status, body) = send(app(&fixture.state), get_request("/api/currentstate")).await;

        assert_eq!(status, StatusCode::OK);
        let state: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(state["timestamp"], 0);
        assert_eq!(state["raw_image"], "");
        assert_eq!(state["events_paused"], false);
    }

    #[tokio::test]
    async fn test_event_stream() {
        let mut fixture = fixture(3);
        let input = fixture.events.take().unwrap();
        let hub = Arc::clone(&fixture.state.hub);
        let hub_task = tokio::spawn(async move { hub.run(input).await });

        let response = app(&fixture.state)
            .oneshot(get_request("/api/sse"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/event-stream");

        let (_, body) = send(app(&fixture.state), get_request("/api/ssestatus")).await;
        let status: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(status["subscribers"], 1);
        assert_eq!(status["client_channels"][0]["address"], "127.0.0.1:40000");

        fixture.state.pipeline.resume().await;

        let mut body = response.into_body().into_data_stream();
        let frame = tokio::time::timeout(Duration::from_secs(5), body.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(&frame[..], b"event: resume_events\ndata: \n\n");

        // Closing the hub input ends the stream and completes the drain
        fixture.state.pipeline.close_events();
        let rest = tokio::time::timeout(Duration::from_secs(5), body.next()).await.unwrap();
        assert!(rest.is_none());
        tokio::time::timeout(Duration::from_secs(5), hub_task)
            .await
            .unwrap()
            .unwrap();

        // New viewers are turned away once the hub has shut down
        let (status, _) = send(app(&fixture.state), get_request("/api/sse")).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_cors_origin() {
        let fixture = fixture(3);
        let app = router(fixture.state.clone(), Some("http://viewer.local")).unwrap();

        let request = Request::builder()
            .uri("/healthz")
            .header(header::ORIGIN, "http://viewer.local")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "http://viewer.local"
        );

        assert!(router(fixture.state.clone(), Some("bad\norigin")).is_err());
    }
}

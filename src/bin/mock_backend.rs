//! Replays a captured backend response
//!
//! Every `POST` answers with lines from the capture file, one at a time with
//! a delay in between, until a line containing the stop marker or the end of
//! the file. The position carries over between requests and wraps around at
//! the end, so a capture holding several responses is replayed in turn.
//!
//! Run with:
//!   mock-backend --source captures/stage1.txt --port 11434

use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use clap::Parser;
use parking_lot::Mutex;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "mock-backend", about = "Replay captured inference responses")]
struct Args {
    /// Port to listen on
    #[arg(long, env = "MOCK_PORT", default_value_t = 8080)]
    port: u16,

    /// Capture file to replay
    #[arg(long, env = "MOCK_SOURCE")]
    source: PathBuf,

    /// Delay between lines in milliseconds
    #[arg(long, env = "MOCK_LINE_DELAY_MS", default_value_t = 100)]
    line_delay_ms: u64,

    /// Substring marking the last line of a response
    #[arg(long, env = "MOCK_RESPONSE_STOP", default_value = "\"done\":true")]
    response_stop: String,

    /// Text written before every line (e.g. `data: `)
    #[arg(long, env = "MOCK_RESPONSE_PREFIX", default_value = "")]
    response_prefix: String,
}

/// Capture lines and the replay position
struct Replay {
    lines: Vec<String>,
    position: Mutex<usize>,
    delay: Duration,
    stop: String,
    prefix: String,
}

impl Replay {
    /// Take the lines of the next response and advance the position
    fn next_response(&self) -> Vec<String> {
        let mut position = self.position.lock();
        let mut response = Vec::new();

        loop {
            let line = &self.lines[*position];
            response.push(format!("{}{}\n", self.prefix, line));
            *position += 1;

            if *position >= self.lines.len() {
                *position = 0;
                break;
            }
            if line.contains(&self.stop) {
                break;
            }
        }

        response
    }
}

async fn respond(State(replay): State<Arc<Replay>>) -> Response {
    let lines = replay.next_response();
    let delay = replay.delay;

    tracing::info!(lines = lines.len(), "Replaying response");

    let body = async_stream::stream! {
        let count = lines.len();
        for (i, line) in lines.into_iter().enumerate() {
            yield Ok::<_, Infallible>(Bytes::from(line));
            if i + 1 < count {
                tokio::time::sleep(delay).await;
            }
        }
    };

    (
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(body),
    )
        .into_response()
}

fn app(replay: Arc<Replay>) -> Router {
    Router::new()
        .fallback(post(respond))
        .with_state(replay)
        .layer(TraceLayer::new_for_http())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mock_backend=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let text = std::fs::read_to_string(&args.source)
        .with_context(|| format!("reading {}", args.source.display()))?;
    let lines: Vec<String> = text.lines().map(str::to_string).collect();
    anyhow::ensure!(!lines.is_empty(), "could not read any lines from {}", args.source.display());

    tracing::info!(source = %args.source.display(), lines = lines.len(), "Loaded capture");

    let replay = Arc::new(Replay {
        lines,
        position: Mutex::new(0),
        delay: Duration::from_millis(args.line_delay_ms),
        stop: args.response_stop,
        prefix: args.response_prefix,
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr = %addr, "Mock backend listening");

    axum::serve(listener, app(replay))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down");
        })
        .await?;

    Ok(())
}

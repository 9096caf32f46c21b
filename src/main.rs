//! Alert broadcast server
//!
//! Run with:
//!   alertcast --description-url http://localhost:11434/api/generate
//!
//! Open http://localhost:8080/api/sse to watch events, and submit alerts to
//! POST /api/alerts.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use alertcast::hub::HubConfig;
use alertcast::server::config::{DEFAULT_CLASSIFICATION_PROMPT, DEFAULT_DESCRIPTION_URL};
use alertcast::{AlertServer, BackendConfig, ServerConfig, WireFormat};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "alertcast", version, about = "Alert inference pipeline with live event fan-out")]
struct Args {
    /// Address to listen on
    #[arg(long, env = "ALERTCAST_BIND", default_value = "0.0.0.0:8080")]
    bind: SocketAddr,

    /// File of `short|descriptive` prompt lines; built-in prompts when unset
    #[arg(long, env = "ALERTCAST_PROMPTS")]
    prompts: Option<PathBuf>,

    /// Pipeline queue capacity
    #[arg(long, env = "ALERTCAST_QUEUE_CAPACITY", default_value_t = 3)]
    queue_capacity: usize,

    /// Image description endpoint
    #[arg(long, env = "ALERTCAST_DESCRIPTION_URL", default_value = DEFAULT_DESCRIPTION_URL)]
    description_url: String,

    /// Image description model
    #[arg(long, env = "ALERTCAST_DESCRIPTION_MODEL", default_value = "llava")]
    description_model: String,

    /// Wire format of the description endpoint
    #[arg(long, env = "ALERTCAST_DESCRIPTION_FORMAT", value_enum, default_value_t = WireFormat::JsonLines)]
    description_format: WireFormat,

    /// How long the description backend should keep its model loaded
    #[arg(long, env = "ALERTCAST_KEEP_ALIVE", default_value = "300m")]
    keep_alive: String,

    /// Classification endpoint; classification is skipped when unset
    #[arg(long, env = "ALERTCAST_CLASSIFICATION_URL")]
    classification_url: Option<String>,

    /// Classification model
    #[arg(long, env = "ALERTCAST_CLASSIFICATION_MODEL", default_value = "/mnt/models")]
    classification_model: String,

    /// Wire format of the classification endpoint
    #[arg(long, env = "ALERTCAST_CLASSIFICATION_FORMAT", value_enum, default_value_t = WireFormat::ChatSse)]
    classification_format: WireFormat,

    /// Instruction placed before the description for classification
    #[arg(long, env = "ALERTCAST_CLASSIFICATION_PROMPT", default_value = DEFAULT_CLASSIFICATION_PROMPT)]
    classification_prompt: String,

    /// Seconds allowed for each backend call
    #[arg(long, env = "ALERTCAST_REQUEST_TIMEOUT", default_value_t = 60, value_parser = clap::value_parser!(u64).range(1..))]
    request_timeout: u64,

    /// Save raw backend responses to stage1.txt / stage2.txt in this directory
    #[arg(long, env = "ALERTCAST_CAPTURE_DIR")]
    capture_dir: Option<PathBuf>,

    /// Access-Control-Allow-Origin value; no CORS headers when unset
    #[arg(long, env = "ALERTCAST_CORS")]
    cors: Option<String>,

    /// Seconds between keepalive pings on idle event streams
    #[arg(long, env = "ALERTCAST_PING_INTERVAL", default_value_t = 15, value_parser = clap::value_parser!(u64).range(1..))]
    ping_interval: u64,
}

impl Args {
    fn into_config(self) -> ServerConfig {
        let timeout = Duration::from_secs(self.request_timeout);

        let description = BackendConfig::new(self.description_url)
            .model(self.description_model)
            .format(self.description_format)
            .request_timeout(timeout)
            .keep_alive(self.keep_alive);

        let mut config = ServerConfig::with_addr(self.bind)
            .queue_capacity(self.queue_capacity)
            .description(description)
            .hub(HubConfig::default().ping_interval(Duration::from_secs(self.ping_interval)));

        if let Some(url) = self.classification_url {
            let classification = BackendConfig::new(url)
                .model(self.classification_model)
                .format(self.classification_format)
                .request_timeout(timeout);
            config = config.classification(classification, self.classification_prompt);
        }
        if let Some(path) = self.prompts {
            config = config.prompts_file(path);
        }
        if let Some(dir) = self.capture_dir {
            config = config.capture_dir(dir);
        }
        if let Some(origin) = self.cors {
            config = config.cors_origin(origin);
        }

        config
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "alertcast=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Args::parse().into_config();
    let server = AlertServer::new(config)?;

    server.run_until(shutdown_signal()).await?;

    tracing::info!("All tasks terminated");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

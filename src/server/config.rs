//! Server configuration

use std::net::SocketAddr;
use std::path::PathBuf;

use crate::alert::DEFAULT_QUEUE_CAPACITY;
use crate::hub::HubConfig;
use crate::inference::{BackendConfig, WireFormat};

/// Default description backend endpoint
pub const DEFAULT_DESCRIPTION_URL: &str = "http://localhost:11434/api/generate";

/// Default classification instruction
pub const DEFAULT_CLASSIFICATION_PROMPT: &str =
    "Does the text in the following paragraph describe a dangerous situation - answer yes or no";

/// Server configuration options
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,

    /// Prompts file; the built-in prompts are used when unset
    pub prompts_file: Option<PathBuf>,

    /// Pipeline queue capacity (must be at least 1)
    pub queue_capacity: usize,

    /// Broadcast hub settings
    pub hub: HubConfig,

    /// Stage-1 (image description) backend
    pub description: BackendConfig,

    /// Stage-2 (classification) backend; stage 2 is skipped when unset
    pub classification: Option<BackendConfig>,

    /// Instruction prepended to the description for stage 2
    pub classification_prompt: String,

    /// Directory receiving raw backend responses
    pub capture_dir: Option<PathBuf>,

    /// Value for `Access-Control-Allow-Origin`; no CORS headers when unset
    pub cors_origin: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            prompts_file: None,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            hub: HubConfig::default(),
            description: BackendConfig::new(DEFAULT_DESCRIPTION_URL)
                .model("llava")
                .format(WireFormat::JsonLines)
                .keep_alive("300m"),
            classification: None,
            classification_prompt: DEFAULT_CLASSIFICATION_PROMPT.to_string(),
            capture_dir: None,
            cors_origin: None,
        }
    }
}

impl ServerConfig {
    /// Create a new config with custom bind address
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            bind_addr: addr,
            ..Default::default()
        }
    }

    /// Set the bind address
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Load prompts from a file
    pub fn prompts_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.prompts_file = Some(path.into());
        self
    }

    /// Set the pipeline queue capacity
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Set the hub configuration
    pub fn hub(mut self, hub: HubConfig) -> Self {
        self.hub = hub;
        self
    }

    /// Set the description backend
    pub fn description(mut self, backend: BackendConfig) -> Self {
        self.description = backend;
        self
    }

    /// Enable the classification stage
    pub fn classification(mut self, backend: BackendConfig, prompt: impl Into<String>) -> Self {
        self.classification = Some(backend);
        self.classification_prompt = prompt.into();
        self
    }

    /// Capture raw backend responses under `dir`
    pub fn capture_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.capture_dir = Some(dir.into());
        self
    }

    /// Allow cross-origin requests from `origin`
    pub fn cors_origin(mut self, origin: impl Into<String>) -> Self {
        self.cors_origin = Some(origin.into());
        self
    }
}

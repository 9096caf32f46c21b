//! HTTP server
//!
//! Serves the live event stream and the REST endpoints, and owns the
//! background tasks (pipeline consumer and hub fan-out) for its lifetime.

pub mod config;
pub mod listener;
pub mod routes;

pub use config::ServerConfig;
pub use listener::AlertServer;
pub use routes::{router, AppState};

//! Streaming inference adapter
//!
//! One backend call is presented as a lazy, finite stream of content
//! fragments regardless of the backend's wire format. The pipeline only ever
//! sees [`InferenceBackend::stream`]; the format is picked by configuration.

pub mod capture;
pub mod client;
pub mod format;
pub mod lines;
pub mod request;

pub use capture::{CaptureSink, FlushGuard};
pub use client::{BackendConfig, FragmentStream, InferenceBackend, InferenceClient};
pub use format::{ChatSse, DecodeError, Decoded, JsonLines, ResponseFormat, SingleObject, WireFormat};
pub use lines::LineBuffer;
pub use request::InferenceRequest;

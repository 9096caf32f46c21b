//! Backend wire formats
//!
//! Three incompatible backend protocols are normalized into content
//! fragments:
//!
//! - [`JsonLines`]: newline-delimited JSON objects, each with a `response` or
//!   `content` field, streamed until EOF (Ollama `/api/generate` style).
//! - [`ChatSse`]: `data: {...}` frames from an OpenAI-compatible chat
//!   completion endpoint, ended by `data: [DONE]` or a finish reason. Bare
//!   `{"content": ..}` frames (llama.cpp style) are accepted as well.
//! - [`SingleObject`]: one non-streamed JSON object.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::client::BackendConfig;
use super::request::InferenceRequest;

/// Backend protocol selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum WireFormat {
    /// Newline-delimited JSON objects
    #[default]
    JsonLines,
    /// Server-Sent-Event framed chat completion chunks
    ChatSse,
    /// A single JSON object
    SingleObject,
}

impl WireFormat {
    /// Get the decoding strategy for this format
    pub fn strategy(self) -> Arc<dyn ResponseFormat> {
        match self {
            WireFormat::JsonLines => Arc::new(JsonLines),
            WireFormat::ChatSse => Arc::new(ChatSse),
            WireFormat::SingleObject => Arc::new(SingleObject),
        }
    }
}

impl std::fmt::Display for WireFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WireFormat::JsonLines => write!(f, "json-lines"),
            WireFormat::ChatSse => write!(f, "chat-sse"),
            WireFormat::SingleObject => write!(f, "single-object"),
        }
    }
}

/// Result of decoding one line (or a whole body for non-streaming formats)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Decoded {
    /// Content carried by this line, if any
    pub fragment: Option<String>,
    /// The backend signalled the end of its answer
    pub finished: bool,
}

impl Decoded {
    fn skip() -> Self {
        Self::default()
    }

    fn content(text: Option<String>, finished: bool) -> Self {
        Self {
            fragment: text.filter(|t| !t.is_empty()),
            finished,
        }
    }
}

/// Error decoding a single line or body
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The payload was not valid JSON of the expected shape
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// A line that is not part of the expected framing
    #[error("unexpected line: {0}")]
    Unframed(String),
}

/// Decoding strategy for one backend protocol
pub trait ResponseFormat: Send + Sync + std::fmt::Debug {
    /// Whether the response is consumed line by line
    fn streaming(&self) -> bool;

    /// Build the JSON request body
    fn request_body(
        &self,
        config: &BackendConfig,
        request: &InferenceRequest,
    ) -> Result<serde_json::Value, serde_json::Error>;

    /// Decode one line, or the whole body when not streaming
    fn decode(&self, raw: &str) -> Result<Decoded, DecodeError>;
}

/// Generate-style request body shared by [`JsonLines`] and [`SingleObject`]
#[derive(Debug, Serialize)]
struct GenerateBody<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    images: Vec<&'a str>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    keep_alive: Option<&'a str>,
}

impl<'a> GenerateBody<'a> {
    fn new(config: &'a BackendConfig, request: &'a InferenceRequest, stream: bool) -> Self {
        Self {
            model: &config.model,
            prompt: &request.prompt,
            images: request.image.as_deref().into_iter().collect(),
            stream,
            keep_alive: config.keep_alive.as_deref(),
        }
    }
}

/// Response object carrying text in either `response` or `content`
#[derive(Debug, Deserialize)]
struct GenerateChunk {
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    done: bool,
}

impl GenerateChunk {
    fn text(self) -> Option<String> {
        self.response.or(self.content)
    }
}

/// Newline-delimited JSON objects
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonLines;

impl ResponseFormat for JsonLines {
    fn streaming(&self) -> bool {
        true
    }

    fn request_body(
        &self,
        config: &BackendConfig,
        request: &InferenceRequest,
    ) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(GenerateBody::new(config, request, request.stream))
    }

    fn decode(&self, raw: &str) -> Result<Decoded, DecodeError> {
        let line = raw.trim();
        if line.is_empty() {
            return Ok(Decoded::skip());
        }

        let chunk: GenerateChunk = serde_json::from_str(line)?;
        let done = chunk.done;
        Ok(Decoded::content(chunk.text(), done))
    }
}

/// Chat completion request body
#[derive(Debug, Serialize)]
struct ChatBody<'a> {
    model: &'a str,
    stream: bool,
    temperature: f32,
    n: u32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: ChatContent<'a>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum ChatContent<'a> {
    Text(&'a str),
    Parts(Vec<ContentPart<'a>>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

/// One streamed chat completion chunk
#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    stop: bool,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    #[serde(default)]
    delta: Option<ChatDelta>,
    #[serde(default)]
    message: Option<ChatDelta>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Server-Sent-Event framed chat completion chunks
#[derive(Debug, Clone, Copy, Default)]
pub struct ChatSse;

const DONE_MARKER: &str = "[DONE]";

impl ResponseFormat for ChatSse {
    fn streaming(&self) -> bool {
        true
    }

    fn request_body(
        &self,
        config: &BackendConfig,
        request: &InferenceRequest,
    ) -> Result<serde_json::Value, serde_json::Error> {
        let content = match request.image.as_deref() {
            Some(image) => ChatContent::Parts(vec![
                ContentPart::Text {
                    text: &request.prompt,
                },
                ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: format!("data:image/jpeg;base64,{}", image),
                    },
                },
            ]),
            None => ChatContent::Text(&request.prompt),
        };

        serde_json::to_value(ChatBody {
            model: &config.model,
            stream: request.stream,
            temperature: 0.0,
            n: 1,
            messages: vec![ChatMessage {
                role: "user",
                content,
            }],
        })
    }

    fn decode(&self, raw: &str) -> Result<Decoded, DecodeError> {
        let line = raw.trim();
        if line.is_empty() || line.starts_with(':') {
            return Ok(Decoded::skip());
        }

        let Some(payload) = line.strip_prefix("data:") else {
            // Other SSE fields carry nothing we use
            if ["event:", "id:", "retry:"].iter().any(|f| line.starts_with(f)) {
                return Ok(Decoded::skip());
            }
            return Err(DecodeError::Unframed(line.to_string()));
        };

        let payload = payload.trim();
        if payload == DONE_MARKER {
            return Ok(Decoded {
                fragment: None,
                finished: true,
            });
        }

        let chunk: ChatChunk = serde_json::from_str(payload)?;

        let mut finished = chunk.stop;
        let mut text: Option<String> = chunk.content;
        for choice in chunk.choices {
            if let Some(content) = choice.delta.or(choice.message).and_then(|d| d.content) {
                text.get_or_insert_with(String::new).push_str(&content);
            }
            if choice.finish_reason.is_some_and(|r| r != "null") {
                finished = true;
            }
        }

        Ok(Decoded::content(text, finished))
    }
}

/// A single JSON object, `{"content"|"response": "..."}`
#[derive(Debug, Clone, Copy, Default)]
pub struct SingleObject;

impl ResponseFormat for SingleObject {
    fn streaming(&self) -> bool {
        false
    }

    fn request_body(
        &self,
        config: &BackendConfig,
        request: &InferenceRequest,
    ) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(GenerateBody::new(config, request, false))
    }

    fn decode(&self, raw: &str) -> Result<Decoded, DecodeError> {
        let chunk: GenerateChunk = serde_json::from_str(raw.trim())?;
        Ok(Decoded::content(chunk.text(), true))
    }
}

//! Backend request payload

/// One inference call: a text prompt, an optional image, and a streaming flag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InferenceRequest {
    /// Prompt text
    pub prompt: String,
    /// Base64-encoded image, passed through as received
    pub image: Option<String>,
    /// Ask the backend to stream its answer
    pub stream: bool,
}

impl InferenceRequest {
    /// Create a streaming text-only request
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            image: None,
            stream: true,
        }
    }

    /// Attach an image; an empty image is treated as none
    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        let image = image.into();
        self.image = if image.is_empty() { None } else { Some(image) };
        self
    }

    /// Set the streaming flag
    pub fn streaming(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }
}

//! Prompt catalog error types

/// Error type for catalog loading and selection
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// The source contained no usable prompt lines
    #[error("no prompts were loaded")]
    Empty,

    /// A line had a descriptive part but no short label
    #[error("line {line}: short prompt is not set")]
    MissingShort { line: usize },

    /// Selection requested for an id the catalog does not contain
    #[error("prompt id {0} does not exist")]
    UnknownPrompt(usize),

    /// The prompts file could not be read
    #[error("could not read prompts: {0}")]
    Io(#[from] std::io::Error),
}

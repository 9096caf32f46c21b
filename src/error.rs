//! Error types
//!
//! Module-level errors live next to the code that produces them; this type
//! collects the ones that can abort startup or the server run.

use crate::prompts::CatalogError;

/// Result alias for crate operations
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Prompt catalog could not be loaded
    #[error("prompt catalog: {0}")]
    Catalog(#[from] CatalogError),

    /// Invalid configuration value
    #[error("invalid configuration: {0}")]
    Config(String),

    /// I/O failure (binding the listener, opening capture files)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP client could not be constructed
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::Config("alert queue capacity must be at least 1".into());
        assert_eq!(
            err.to_string(),
            "invalid configuration: alert queue capacity must be at least 1"
        );

        let err = Error::from(CatalogError::Empty);
        assert_eq!(err.to_string(), "prompt catalog: no prompts were loaded");
    }
}

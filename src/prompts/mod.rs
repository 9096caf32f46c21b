//! Prompt catalog
//!
//! An ordered, immutable set of prompts loaded once at startup. Each prompt has
//! a short label shown to viewers and a descriptive form sent to the vision
//! model. One prompt is selected at a time; new alerts pick up whichever prompt
//! is selected when they arrive.

pub mod catalog;
pub mod error;

pub use catalog::{PromptCatalog, PromptItem};
pub use error::CatalogError;

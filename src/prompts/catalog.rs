//! Prompt catalog implementation

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use super::error::CatalogError;

/// Prompts used when no prompts file is configured
const BUILTIN_PROMPTS: &[&str] = &["Please describe this image", "Is this person a threat?"];

/// A single selectable prompt
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptItem {
    /// 0-based position in the catalog, stable for the process lifetime
    pub id: usize,
    /// Label shown to viewers
    pub short: String,
    /// Text sent to the vision model
    pub descriptive: String,
}

/// Viewer-facing form of a prompt: `{"id":..,"prompt":"<short>"}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShortPrompt {
    pub id: usize,
    pub prompt: String,
}

impl PromptItem {
    /// Get the viewer-facing form of this prompt
    pub fn short_form(&self) -> ShortPrompt {
        ShortPrompt {
            id: self.id,
            prompt: self.short.clone(),
        }
    }

    /// Encode the short form as JSON for the `prompt` broadcast event
    pub fn event_data(&self) -> Bytes {
        // A struct of a usize and a String always serializes.
        Bytes::from(serde_json::to_vec(&self.short_form()).unwrap_or_default())
    }
}

/// Ordered prompt set with a single selected entry
#[derive(Debug)]
pub struct PromptCatalog {
    items: Vec<PromptItem>,
    selected: AtomicUsize,
}

impl PromptCatalog {
    /// Build a catalog from the built-in prompts
    pub fn builtin() -> Self {
        let items = BUILTIN_PROMPTS
            .iter()
            .enumerate()
            .map(|(id, text)| PromptItem {
                id,
                short: text.to_string(),
                descriptive: text.to_string(),
            })
            .collect();

        Self::from_items(items)
    }

    /// Load from a prompts file, or fall back to the built-in prompts
    pub fn load(path: Option<&Path>) -> Result<Self, CatalogError> {
        match path {
            Some(path) => {
                let file = File::open(path)?;
                let catalog = Self::from_reader(BufReader::new(file))?;
                tracing::info!(
                    path = %path.display(),
                    prompts = catalog.len(),
                    "Loaded prompt catalog"
                );
                Ok(catalog)
            }
            None => {
                tracing::info!("No prompts file provided, using built-in prompts");
                Ok(Self::builtin())
            }
        }
    }

    /// Parse `short|descriptive` lines
    ///
    /// Blank lines are skipped. A line without `|` uses the same text for both
    /// forms, as does a line whose descriptive part is blank.
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self, CatalogError> {
        let mut items = Vec::new();

        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() {
                tracing::debug!(line = index + 1, "Skipping blank prompt line");
                continue;
            }

            let mut parts = line.split('|');
            let short = parts.next().unwrap_or_default().trim();
            let descriptive = parts.next().map(str::trim).unwrap_or_default();

            if short.is_empty() {
                return Err(CatalogError::MissingShort { line: index + 1 });
            }
            let descriptive = if descriptive.is_empty() {
                short
            } else {
                descriptive
            };

            items.push(PromptItem {
                id: items.len(),
                short: short.to_string(),
                descriptive: descriptive.to_string(),
            });
        }

        if items.is_empty() {
            return Err(CatalogError::Empty);
        }

        Ok(Self::from_items(items))
    }

    fn from_items(items: Vec<PromptItem>) -> Self {
        Self {
            items,
            selected: AtomicUsize::new(0),
        }
    }

    /// All prompts in catalog order
    pub fn list(&self) -> &[PromptItem] {
        &self.items
    }

    /// Viewer-facing form of every prompt, in catalog order
    pub fn short_prompts(&self) -> Vec<ShortPrompt> {
        self.items.iter().map(PromptItem::short_form).collect()
    }

    /// Number of prompts
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the catalog is empty (never true for a loaded catalog)
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Get the currently selected prompt
    pub fn selected(&self) -> PromptItem {
        let id = self.selected.load(Ordering::Acquire);
        self.items[id].clone()
    }

    /// Select a prompt by id
    pub fn select(&self, id: usize) -> Result<PromptItem, CatalogError> {
        let item = self
            .items
            .get(id)
            .cloned()
            .ok_or(CatalogError::UnknownPrompt(id))?;

        self.selected.store(id, Ordering::Release);
        tracing::info!(prompt_id = id, prompt = %item.short, "Prompt selected");

        Ok(item)
    }
}

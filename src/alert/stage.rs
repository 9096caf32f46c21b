//! Inference stages and their broadcast event names

use crate::hub::kind;

/// One of the two inference calls made per alert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Vision model describes the raw image
    Description,
    /// Text model classifies the description
    Classification,
}

impl Stage {
    /// Name used in logs
    pub fn name(self) -> &'static str {
        match self {
            Stage::Description => "description",
            Stage::Classification => "classification",
        }
    }

    /// Event sent before the stage's first fragment
    pub fn start_event(self) -> &'static str {
        match self {
            Stage::Description => kind::DESCRIPTION_START,
            Stage::Classification => kind::CLASSIFICATION_START,
        }
    }

    /// Event carrying one fragment
    pub fn chunk_event(self) -> &'static str {
        match self {
            Stage::Description => kind::DESCRIPTION,
            Stage::Classification => kind::CLASSIFICATION,
        }
    }

    /// Event closing a started stage
    pub fn stop_event(self) -> &'static str {
        match self {
            Stage::Description => kind::DESCRIPTION_STOP,
            Stage::Classification => kind::CLASSIFICATION_STOP,
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

//! Import events and the sink/consumer seams they flow through

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A logical import produced by the drop-directory watcher
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "path", rename_all = "snake_case")]
pub enum ImportEvent {
    /// A standalone media file; the consumer deletes it after copying
    SingleFile(PathBuf),
    /// A self-contained player document (first-line marker matched)
    PlayerDocument(PathBuf),
    /// A narrative manifest whose components are all on disk
    Narrative(PathBuf),
}

impl ImportEvent {
    pub fn path(&self) -> &Path {
        match self {
            ImportEvent::SingleFile(p) | ImportEvent::PlayerDocument(p) | ImportEvent::Narrative(p) => p,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ImportEvent::SingleFile(_) => "single_file",
            ImportEvent::PlayerDocument(_) => "player_document",
            ImportEvent::Narrative(_) => "narrative",
        }
    }
}

/// Where the watcher hands off events.
///
/// Production: `ImportDispatcher` (channel + replay backlog)
/// Testing: `RecordingSink`
#[cfg_attr(test, mockall::automock)]
pub trait ImportSink: Send + Sync {
    /// Hand off an event. Must not block on the consumer.
    fn emit(&self, event: ImportEvent);
}

/// Whoever is currently listening for imports
pub trait ImportConsumer: Send + Sync {
    fn on_import(&self, event: ImportEvent);
}

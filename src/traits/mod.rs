//! Trait definitions for dependency injection
//!
//! All external dependencies are abstracted behind traits to enable testing.

use std::sync::{Arc, Mutex};

mod file_watcher;
mod import_sink;
mod media_library;

pub use file_watcher::{FileWatcher, FileWatcherError, FileEvent, FileEventKind};
pub use import_sink::{ImportConsumer, ImportEvent, ImportSink};
pub use media_library::{LibraryError, MediaItem, MediaKind, MediaLibrary, Visibility};

#[cfg(test)]
pub use file_watcher::MockFileWatcher;
#[cfg(test)]
pub use import_sink::MockImportSink;

/// Shared event handler type used by file watchers
pub type EventHandler = Arc<Mutex<Option<Arc<dyn Fn(FileEvent) + Send + Sync>>>>;

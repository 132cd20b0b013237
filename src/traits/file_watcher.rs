//! File watching trait for monitoring the drop directory

use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FileWatcherError {
    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),
    #[error("Watch error: {0}")]
    WatchError(String),
    #[error("No close-after-write notifications on {0}; mediadrop needs Linux (inotify)")]
    UnsupportedPlatform(&'static str),
}

/// Event emitted when a file in a watched directory changes
#[derive(Debug, Clone)]
pub struct FileEvent {
    pub path: PathBuf,
    pub kind: FileEventKind,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl FileEvent {
    /// Convenience constructor for the only kind the importer acts on
    pub fn close_write(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: FileEventKind::CloseWrite,
            timestamp: chrono::Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FileEventKind {
    /// A file opened for writing was closed
    CloseWrite,
    Created,
    Modified,
    Deleted,
    /// Opens, reads, attribute changes, moves
    Other,
}

/// Callback type for watcher events (alias keeps mockall's macro happy)
pub type FileEventHandler = Arc<dyn Fn(FileEvent) + Send + Sync>;

/// Trait for file system watching
///
/// Production: inotify via `notify` crate
/// Testing: Manual event emission
#[cfg_attr(test, mockall::automock)]
pub trait FileWatcher: Send + Sync {
    /// Start watching a directory (non-recursive)
    fn watch(&self, path: PathBuf) -> Result<(), FileWatcherError>;

    /// Stop watching a directory
    fn unwatch(&self, path: PathBuf) -> Result<(), FileWatcherError>;

    /// Get the list of currently watched paths
    fn watched_paths(&self) -> Vec<PathBuf>;

    /// Set the callback invoked for every event, one at a time
    fn set_event_handler(&self, handler: FileEventHandler);
}

//! inotify file watcher implementation

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use notify::event::{AccessKind, AccessMode};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use crate::traits::{EventHandler, FileWatcher, FileWatcherError, FileEvent, FileEventKind};

pub struct InotifyWatcher {
    watcher: Arc<Mutex<RecommendedWatcher>>,
    watched_paths: Arc<Mutex<Vec<PathBuf>>>,
    event_handler: EventHandler,
}

/// Map a raw notify event kind onto the kinds the importer distinguishes
pub(crate) fn map_event_kind(kind: &EventKind) -> FileEventKind {
    match kind {
        EventKind::Access(AccessKind::Close(AccessMode::Write)) => FileEventKind::CloseWrite,
        EventKind::Create(_) => FileEventKind::Created,
        EventKind::Modify(_) => FileEventKind::Modified,
        EventKind::Remove(_) => FileEventKind::Deleted,
        _ => FileEventKind::Other,
    }
}

/// Only inotify reports a file being closed after writing. Elsewhere notify
/// sees creates and modifies but never a finished file.
pub(crate) fn ensure_close_write_support(os: &'static str) -> Result<(), FileWatcherError> {
    if os == "linux" {
        Ok(())
    } else {
        Err(FileWatcherError::UnsupportedPlatform(os))
    }
}

impl InotifyWatcher {
    pub fn new() -> Result<Self, FileWatcherError> {
        ensure_close_write_support(std::env::consts::OS)?;
        let (tx, rx) = std::sync::mpsc::channel::<notify::Result<notify::Event>>();
        let event_handler: EventHandler = Arc::new(Mutex::new(None));
        let event_handler_clone = Arc::clone(&event_handler);

        // Single delivery thread: the handler is never invoked concurrently
        std::thread::Builder::new()
            .name("mediadrop-watch".into())
            .spawn(move || {
                for result in rx {
                    match result {
                        Ok(event) => {
                            tracing::trace!("File event: {:?}", event);
                            let kind = map_event_kind(&event.kind);
                            let handler = event_handler_clone.lock().unwrap().clone();
                            if let Some(handler) = handler {
                                for path in event.paths {
                                    handler(FileEvent {
                                        path,
                                        kind: kind.clone(),
                                        timestamp: chrono::Utc::now(),
                                    });
                                }
                            }
                        }
                        Err(error) => {
                            tracing::error!("Watch error: {:?}", error);
                        }
                    }
                }
                tracing::debug!("Watch delivery thread exiting");
            })
            .map_err(|e| FileWatcherError::WatchError(e.to_string()))?;

        let watcher = notify::recommended_watcher(tx)
            .map_err(|e| FileWatcherError::WatchError(e.to_string()))?;

        Ok(Self {
            watcher: Arc::new(Mutex::new(watcher)),
            watched_paths: Arc::new(Mutex::new(Vec::new())),
            event_handler,
        })
    }
}

impl FileWatcher for InotifyWatcher {
    fn watch(&self, path: PathBuf) -> Result<(), FileWatcherError> {
        if !path.exists() {
            return Err(FileWatcherError::PathNotFound(path));
        }
        if !path.is_dir() {
            return Err(FileWatcherError::NotADirectory(path));
        }

        self.watcher
            .lock()
            .unwrap()
            .watch(&path, RecursiveMode::NonRecursive)
            .map_err(|e| FileWatcherError::WatchError(e.to_string()))?;

        self.watched_paths.lock().unwrap().push(path.clone());
        tracing::info!("Watching path: {:?}", path);

        Ok(())
    }

    fn unwatch(&self, path: PathBuf) -> Result<(), FileWatcherError> {
        self.watcher
            .lock()
            .unwrap()
            .unwatch(&path)
            .map_err(|e| FileWatcherError::WatchError(e.to_string()))?;

        self.watched_paths.lock().unwrap().retain(|p| p != &path);
        tracing::info!("Unwatched path: {:?}", path);

        Ok(())
    }

    fn watched_paths(&self) -> Vec<PathBuf> {
        self.watched_paths.lock().unwrap().clone()
    }

    fn set_event_handler(&self, handler: Arc<dyn Fn(FileEvent) + Send + Sync>) {
        *self.event_handler.lock().unwrap() = Some(handler);
        tracing::debug!("File event handler set");
    }
}

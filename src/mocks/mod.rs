//! Test doubles for dependency injection
//!
//! Hand-written doubles for the file watcher and the import sink/consumer seams.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use crate::traits::{
    FileWatcher, FileWatcherError, FileEvent, FileEventKind,
    ImportConsumer, ImportEvent, ImportSink,
};

// ============================================================================
// ManualFileWatcher
// ============================================================================

/// Manual file watcher for testing
///
/// Does not actually watch the file system. Tests call methods directly to
/// simulate file events.
#[derive(Clone)]
pub struct ManualFileWatcher {
    watched: Arc<Mutex<Vec<PathBuf>>>,
    event_handler: Arc<Mutex<Option<Arc<dyn Fn(FileEvent) + Send + Sync>>>>,
}

impl ManualFileWatcher {
    pub fn new() -> Self {
        Self {
            watched: Arc::new(Mutex::new(Vec::new())),
            event_handler: Arc::new(Mutex::new(None)),
        }
    }

    /// Check if a path is currently watched
    pub fn is_watching(&self, path: &PathBuf) -> bool {
        self.watched.lock().unwrap().contains(path)
    }

    /// Simulate an event of any kind (for testing)
    pub fn simulate_event(&self, path: PathBuf, kind: FileEventKind) {
        let handler = self.event_handler.lock().unwrap().clone();
        if let Some(handler) = handler {
            handler(FileEvent {
                path,
                kind,
                timestamp: chrono::Utc::now(),
            });
        }
    }

    /// Simulate a file finishing its write (for testing)
    pub fn simulate_close_write(&self, path: PathBuf) {
        self.simulate_event(path, FileEventKind::CloseWrite);
    }
}

impl Default for ManualFileWatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl FileWatcher for ManualFileWatcher {
    fn watch(&self, path: PathBuf) -> Result<(), FileWatcherError> {
        let mut watched = self.watched.lock().unwrap();
        if !watched.contains(&path) {
            watched.push(path);
        }
        Ok(())
    }

    fn unwatch(&self, path: PathBuf) -> Result<(), FileWatcherError> {
        let mut watched = self.watched.lock().unwrap();
        watched.retain(|p| p != &path);
        Ok(())
    }

    fn watched_paths(&self) -> Vec<PathBuf> {
        self.watched.lock().unwrap().clone()
    }

    fn set_event_handler(&self, handler: Arc<dyn Fn(FileEvent) + Send + Sync>) {
        *self.event_handler.lock().unwrap() = Some(handler);
    }
}

// ============================================================================
// RecordingSink / RecordingConsumer
// ============================================================================

/// Sink that records every emitted event synchronously
#[derive(Clone, Default)]
pub struct RecordingSink {
    events: Arc<Mutex<Vec<ImportEvent>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all recorded events
    pub fn events(&self) -> Vec<ImportEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Number of narrative events for a given manifest
    pub fn narrative_count(&self, manifest: &PathBuf) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| matches!(e, ImportEvent::Narrative(p) if p == manifest))
            .count()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }
}

impl ImportSink for RecordingSink {
    fn emit(&self, event: ImportEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// Consumer that records what the dispatcher hands it
#[derive(Clone, Default)]
pub struct RecordingConsumer {
    events: Arc<Mutex<Vec<ImportEvent>>>,
}

impl RecordingConsumer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ImportEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl ImportConsumer for RecordingConsumer {
    fn on_import(&self, event: ImportEvent) {
        self.events.lock().unwrap().push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::MockFileWatcher;

    #[test]
    fn test_file_watcher() {
        let watcher = ManualFileWatcher::new();
        let path = PathBuf::from("/tmp/drop");

        watcher.watch(path.clone()).unwrap();
        watcher.watch(path.clone()).unwrap();
        assert!(watcher.is_watching(&path));
        assert_eq!(watcher.watched_paths().len(), 1);

        watcher.unwatch(path.clone()).unwrap();
        assert!(!watcher.is_watching(&path));
    }

    #[test]
    fn test_file_watcher_event_handler() {
        let watcher = ManualFileWatcher::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        watcher.set_event_handler(Arc::new(move |event: FileEvent| {
            seen_clone.lock().unwrap().push((event.path, event.kind));
        }));

        watcher.simulate_close_write(PathBuf::from("/tmp/drop/a.jpg"));
        watcher.simulate_event(PathBuf::from("/tmp/drop/b.jpg"), FileEventKind::Created);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], (PathBuf::from("/tmp/drop/a.jpg"), FileEventKind::CloseWrite));
        assert_eq!(seen[1].1, FileEventKind::Created);
    }

    #[test]
    fn test_file_watcher_no_handler() {
        let watcher = ManualFileWatcher::new();
        // Should not panic
        watcher.simulate_close_write(PathBuf::from("/tmp/drop/a.jpg"));
    }

    #[test]
    fn test_recording_sink_counts_narratives() {
        let sink = RecordingSink::new();
        let manifest = PathBuf::from("/tmp/drop/story.smil");
        sink.emit(ImportEvent::Narrative(manifest.clone()));
        sink.emit(ImportEvent::SingleFile(PathBuf::from("/tmp/drop/a.jpg")));
        assert_eq!(sink.narrative_count(&manifest), 1);
        sink.clear();
        assert!(sink.events().is_empty());
    }

    #[test]
    fn test_mock_watcher_rejects_missing_path() {
        let mut watcher = MockFileWatcher::new();
        watcher
            .expect_watch()
            .returning(|p| Err(FileWatcherError::PathNotFound(p)));
        assert!(watcher.watch(PathBuf::from("/missing")).is_err());
    }
}

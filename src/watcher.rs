//! Drop-directory watcher - classifies completed files and routes them
//!
//! The DirectoryWatcher maps close-after-write events to import events. Single
//! items are emitted immediately; manifests and their components go through
//! the [`ImportReassembler`] so that a narrative is only emitted once it is
//! complete on disk.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::extensions::{ExtensionTable, FileClass};
use crate::reassembler::{ComponentOutcome, ImportReassembler, ManifestOutcome};
use crate::traits::{FileEvent, FileEventKind, FileWatcher, FileWatcherError, ImportEvent, ImportSink};

pub struct DirectoryWatcher {
    directory: PathBuf,
    extensions: ExtensionTable,
    reassembler: ImportReassembler,
    sink: Arc<dyn ImportSink>,
}

impl DirectoryWatcher {
    pub fn new(directory: impl AsRef<Path>, extensions: ExtensionTable, sink: Arc<dyn ImportSink>) -> Self {
        let directory = absolute(directory.as_ref());
        Self {
            reassembler: ImportReassembler::new(directory.clone(), extensions.clone()),
            directory,
            extensions,
            sink,
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn reassembler(&self) -> &ImportReassembler {
        &self.reassembler
    }

    /// Route the watcher's events here and start watching the directory
    pub fn start(self: &Arc<Self>, file_watcher: &dyn FileWatcher) -> Result<(), FileWatcherError> {
        let this = Arc::clone(self);
        file_watcher.set_event_handler(Arc::new(move |event| this.handle_event(&event)));
        file_watcher.watch(self.directory.clone())?;
        tracing::info!(path = %self.directory.display(), "Initialising - watching drop directory");
        Ok(())
    }

    /// Stop watching; in-flight bundles are lost, not resolved
    pub fn stop(&self, file_watcher: &dyn FileWatcher) -> Result<(), FileWatcherError> {
        let result = file_watcher.unwatch(self.directory.clone());
        self.reassembler.clear();
        tracing::info!(path = %self.directory.display(), "Stopping - no longer watching drop directory");
        result
    }

    /// Classify one filesystem event. Never fails: a bad file is logged and
    /// skipped so watching continues.
    pub fn handle_event(&self, event: &FileEvent) {
        if event.kind != FileEventKind::CloseWrite {
            return;
        }

        let path = if event.path.is_absolute() {
            event.path.clone()
        } else {
            self.directory.join(&event.path)
        };

        // some stacks create the file before permission is granted
        match std::fs::metadata(&path) {
            Ok(meta) if meta.len() > 0 => {}
            _ => return,
        }

        match self.extensions.classify(&path) {
            FileClass::PlayerDocument => {
                if !self.reassembler.is_pending_component(&path) && self.is_player_document(&path) {
                    tracing::info!(path = %path.display(), "Received player document");
                    self.sink.emit(ImportEvent::PlayerDocument(path));
                    return;
                }
                self.handle_component(path);
            }
            FileClass::Manifest(_) => self.handle_manifest(&path),
            FileClass::Media => self.handle_component(path),
        }
    }

    fn handle_manifest(&self, path: &Path) {
        tracing::debug!(path = %path.display(), "Starting to parse manifest");
        match self.reassembler.accept_manifest(path) {
            ManifestOutcome::Completed(event) => self.sink.emit(event),
            ManifestOutcome::Pending { awaiting } => {
                tracing::debug!(path = %path.display(), awaiting, "Manifest tracked");
            }
            ManifestOutcome::AlreadyTracked
            | ManifestOutcome::DuplicateRemoved
            | ManifestOutcome::ParseFailed => {}
        }
    }

    fn handle_component(&self, path: PathBuf) {
        match self.reassembler.accept_component(&path) {
            ComponentOutcome::Completed(event) => self.sink.emit(event),
            ComponentOutcome::Pending { .. } => {}
            ComponentOutcome::Untracked => {
                tracing::info!(path = %path.display(), "Importing standalone file");
                self.sink.emit(ImportEvent::SingleFile(path));
            }
        }
    }

    /// Minimal sniff: only the first line is read
    fn is_player_document(&self, path: &Path) -> bool {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "Player document sniff failed");
                return false;
            }
        };
        let mut first_line = String::new();
        if let Err(e) = BufReader::new(file).read_line(&mut first_line) {
            tracing::debug!(path = %path.display(), error = %e, "Player document sniff failed");
            return false;
        }
        first_line.trim_end_matches(['\r', '\n']) == self.extensions.player_marker()
    }
}

fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

//! Production implementations of traits

mod file_watcher;

pub use file_watcher::InotifyWatcher;

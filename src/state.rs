//! Application state management

use std::path::PathBuf;
use std::sync::Arc;

use crate::config::{AppConfig, KEY_BACKLOG_CAPACITY};
use crate::dispatcher::{ImportDispatcher, DEFAULT_BACKLOG_CAPACITY};
use crate::drop_directory::{default_candidates, resolve_drop_directory};
use crate::extensions::ExtensionTable;
use crate::importer::{ImportSettings, MediaImporter};
use crate::library::SqliteMediaLibrary;
use crate::production::InotifyWatcher;
use crate::traits::{FileWatcher, FileWatcherError, MediaLibrary};
use crate::watcher::DirectoryWatcher;

/// Startup options, usually from the command line
#[derive(Debug, Clone)]
pub struct AppOptions {
    pub drop_dir: Option<PathBuf>,
    pub data_dir: PathBuf,
    pub keep_files: bool,
}

/// Application state containing all dependencies
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub library: Arc<dyn MediaLibrary>,
    pub file_watcher: Arc<dyn FileWatcher>,
    pub dispatcher: Arc<ImportDispatcher>,
    pub importer: Arc<MediaImporter>,
    pub watcher: Arc<DirectoryWatcher>,
}

impl AppState {
    /// Create a new AppState with production implementations
    pub fn new_production(options: &AppOptions) -> Result<Self, Box<dyn std::error::Error>> {
        tracing::info!("Initializing AppState");
        std::fs::create_dir_all(&options.data_dir)?;

        let config_path = options.data_dir.join("config.sqlite");
        tracing::info!(path = %config_path.display(), "Opening config database");
        let config_conn = rusqlite::Connection::open(&config_path)?;
        AppConfig::init_table(&config_conn)?;
        let config = Arc::new(AppConfig::from_connection(config_conn));

        let library_path = options.data_dir.join("library.sqlite");
        tracing::info!(path = %library_path.display(), "Opening media library");
        let library: Arc<dyn MediaLibrary> = Arc::new(SqliteMediaLibrary::open(&library_path)?);

        let drop_dir = resolve_drop_directory(options.drop_dir.as_deref(), &config, &default_candidates())
            .ok_or("No drop directory configured and no platform default available")?;
        if !drop_dir.exists() {
            tracing::info!(path = %drop_dir.display(), "Creating drop directory");
            std::fs::create_dir_all(&drop_dir)?;
        }

        let mut settings = ImportSettings::from_config(&config)?;
        if options.keep_files {
            settings.delete_after_import = false;
        }
        let importer = Arc::new(MediaImporter::new(
            options.data_dir.join("media"),
            library.clone(),
            settings,
        )?);

        let capacity = config.get_usize_or(KEY_BACKLOG_CAPACITY, DEFAULT_BACKLOG_CAPACITY)?;
        let dispatcher = Arc::new(ImportDispatcher::spawn(capacity)?);

        let file_watcher: Arc<dyn FileWatcher> = Arc::new(InotifyWatcher::new()?);
        tracing::info!("inotify file watcher initialized");

        let watcher = Arc::new(DirectoryWatcher::new(
            &drop_dir,
            ExtensionTable::default(),
            dispatcher.clone(),
        ));

        tracing::info!("AppState initialization complete");
        Ok(Self {
            config,
            library,
            file_watcher,
            dispatcher,
            importer,
            watcher,
        })
    }

    /// Attach the importer and begin watching
    pub fn start(&self) -> Result<(), FileWatcherError> {
        self.dispatcher.attach(self.importer.clone());
        self.watcher.start(&*self.file_watcher)
    }

    /// Stop watching and drain queued imports
    pub fn stop(&self) {
        if let Err(e) = self.watcher.stop(&*self.file_watcher) {
            tracing::warn!(error = %e, "Failed to unwatch drop directory");
        }
        self.dispatcher.flush();
        self.dispatcher.shutdown();
    }

    /// Create a new AppState with test implementations
    #[cfg(test)]
    pub fn new_test(drop_dir: &std::path::Path, storage_dir: &std::path::Path) -> Self {
        use crate::mocks::ManualFileWatcher;

        let config = Arc::new(AppConfig::open_in_memory().unwrap());
        let library: Arc<dyn MediaLibrary> = Arc::new(SqliteMediaLibrary::open_in_memory().unwrap());
        let importer = Arc::new(
            MediaImporter::new(storage_dir, library.clone(), ImportSettings::default()).unwrap(),
        );
        let dispatcher = Arc::new(ImportDispatcher::spawn(DEFAULT_BACKLOG_CAPACITY).unwrap());
        let file_watcher: Arc<dyn FileWatcher> = Arc::new(ManualFileWatcher::new());
        let watcher = Arc::new(DirectoryWatcher::new(
            drop_dir,
            ExtensionTable::default(),
            dispatcher.clone(),
        ));

        Self {
            config,
            library,
            file_watcher,
            dispatcher,
            importer,
            watcher,
        }
    }
}

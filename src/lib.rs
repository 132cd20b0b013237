//! mediadrop - import media and narrative bundles from a Bluetooth drop directory
//!
//! This library provides the core functionality for mediadrop, organized around
//! trait-based dependency injection for testability.

pub mod traits;
pub mod mocks;
pub mod production;

pub mod config;
pub mod dispatcher;
pub mod drop_directory;
pub mod extensions;
pub mod importer;
pub mod library;
pub mod manifest;
pub mod reassembler;
pub mod watcher;
mod state;

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub use library::SqliteMediaLibrary;
pub use state::{AppOptions, AppState};

/// Log to stdout and to a daily file in `log_dir`.
///
/// Keep the returned guard alive for the lifetime of the process, or buffered
/// file output is lost.
pub fn init_logging(log_dir: &Path) -> Result<WorkerGuard, Box<dyn std::error::Error>> {
    std::fs::create_dir_all(log_dir)?;
    let file_appender = rolling::daily(log_dir, "mediadrop.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "mediadrop=info,mediadrop_lib=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer()) // stdout
        .with(tracing_subscriber::fmt::layer().with_writer(non_blocking).with_ansi(false)) // file
        .try_init()?;

    Ok(guard)
}

/// Initialize the application and start watching
pub fn setup_app(options: &AppOptions) -> Result<AppState, Box<dyn std::error::Error>> {
    tracing::info!("mediadrop starting up");

    let state = AppState::new_production(options)?;
    state.start()?;

    tracing::info!(
        drop_dir = %state.watcher.directory().display(),
        "mediadrop initialized - import pipeline active"
    );
    Ok(state)
}

//! Copies completed imports into permanent storage and records them
//!
//! The importer is the consumer end of the dispatcher. Standalone files are
//! copied and removed from the drop directory; narratives have each of their
//! components imported and a rewritten manifest stored that points at the
//! stored copies.

use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

use crate::config::{AppConfig, KEY_DELETE_AFTER_IMPORT, KEY_IMPORT_PARENT};
use crate::extensions::{ExtensionTable, SYNC_EXTENSION};
use crate::manifest::{parse_manifest, resolve_reference, rewrite_sources, ManifestError};
use crate::traits::{ImportConsumer, ImportEvent, LibraryError, MediaItem, MediaKind, MediaLibrary, Visibility};

/// Owner used when nobody is signed in; their media is public
pub const UNKNOWN_PERSON_ID: &str = "unknown-person";

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Library error: {0}")]
    Library(#[from] LibraryError),
    #[error("Manifest error: {0}")]
    Manifest(#[from] ManifestError),
    #[error("Cannot read imported file: {0}")]
    Unreadable(PathBuf),
}

#[derive(Debug, Clone)]
pub struct ImportSettings {
    pub parent_id: String,
    pub delete_after_import: bool,
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self {
            parent_id: UNKNOWN_PERSON_ID.to_string(),
            delete_after_import: true,
        }
    }
}

impl ImportSettings {
    pub fn from_config(config: &AppConfig) -> Result<Self, LibraryError> {
        let defaults = Self::default();
        Ok(Self {
            parent_id: config.get(KEY_IMPORT_PARENT)?.unwrap_or(defaults.parent_id),
            delete_after_import: config.get_bool_or(KEY_DELETE_AFTER_IMPORT, defaults.delete_after_import)?,
        })
    }

    pub fn visibility(&self) -> Visibility {
        if self.parent_id == UNKNOWN_PERSON_ID {
            Visibility::Public
        } else {
            Visibility::Private
        }
    }
}

pub struct MediaImporter {
    storage_dir: PathBuf,
    library: Arc<dyn MediaLibrary>,
    settings: ImportSettings,
    extensions: ExtensionTable,
}

impl MediaImporter {
    pub fn new(
        storage_dir: impl Into<PathBuf>,
        library: Arc<dyn MediaLibrary>,
        settings: ImportSettings,
    ) -> Result<Self, ImportError> {
        let storage_dir = storage_dir.into();
        std::fs::create_dir_all(&storage_dir)?;
        Ok(Self {
            storage_dir,
            library,
            settings,
            extensions: ExtensionTable::default(),
        })
    }

    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    /// Import one event, returning every item added to the library
    pub fn import(&self, event: &ImportEvent) -> Result<Vec<MediaItem>, ImportError> {
        let source = event.path();
        if File::open(source).is_err() {
            // probably won't work either, but don't leave it lying around
            let _ = std::fs::remove_file(source);
            return Err(ImportError::Unreadable(source.to_path_buf()));
        }

        match event {
            ImportEvent::SingleFile(path) => {
                let kind = MediaKind::from_file_name(&file_name(path));
                Ok(vec![self.import_file(path, kind)?])
            }
            ImportEvent::PlayerDocument(path) => Ok(vec![self.import_file(path, MediaKind::PlayerDocument)?]),
            ImportEvent::Narrative(path) => self.import_narrative(path),
        }
    }

    fn new_item(&self, original_name: &str, file_name: String, kind: MediaKind) -> MediaItem {
        MediaItem {
            internal_id: uuid::Uuid::new_v4().to_string(),
            parent_id: self.settings.parent_id.clone(),
            file_name,
            original_name: original_name.to_string(),
            kind,
            visibility: self.settings.visibility(),
            text_extra: None,
            created_at: chrono::Utc::now().timestamp(),
        }
    }

    /// Copy into storage under a fresh name, record, then delete the source
    fn import_file(&self, source: &Path, kind: MediaKind) -> Result<MediaItem, ImportError> {
        self.import_file_with_text(source, kind, None)
    }

    fn import_file_with_text(
        &self,
        source: &Path,
        kind: MediaKind,
        text_extra: Option<String>,
    ) -> Result<MediaItem, ImportError> {
        let original_name = file_name(source);
        let stored_name = format!("{}{}", uuid::Uuid::new_v4(), extension_of(&original_name));
        std::fs::copy(source, self.storage_dir.join(&stored_name))?;

        let mut item = self.new_item(&original_name, stored_name, kind);
        item.text_extra = text_extra;
        self.library.add_media(&item)?;
        if self.settings.delete_after_import {
            let _ = std::fs::remove_file(source);
        }
        tracing::info!(original = %original_name, stored = %item.file_name, kind = kind.as_str(), "Imported media item");
        Ok(item)
    }

    fn import_text(&self, source: &Path) -> Result<MediaItem, ImportError> {
        let text = String::from_utf8_lossy(&std::fs::read(source)?).into_owned();
        self.import_file_with_text(source, MediaKind::Text, Some(text))
    }

    fn import_narrative(&self, manifest_path: &Path) -> Result<Vec<MediaItem>, ImportError> {
        let manifest = parse_manifest(manifest_path)?;
        let manifest_text = std::fs::read_to_string(manifest_path)?;
        let base = manifest_path.parent().unwrap_or(Path::new("."));

        let mut items = Vec::new();
        let mut replacements: HashMap<String, String> = HashMap::new();
        let mut imported: Vec<&str> = Vec::new();

        for frame in &manifest.frames {
            for (src, kind) in frame.components() {
                if imported.contains(&src) {
                    continue;
                }
                imported.push(src);
                let Some(source) = resolve_reference(base, src) else {
                    continue;
                };
                let result = match kind {
                    MediaKind::Text => self.import_text(&source),
                    _ => self.import_file(&source, kind),
                };
                match result {
                    Ok(item) => {
                        replacements.insert(src.to_string(), item.file_name.clone());
                        items.push(item);
                    }
                    Err(e) => {
                        tracing::warn!(path = %source.display(), error = %e, "Unable to import narrative component");
                    }
                }
            }
        }

        // non-media entries (sync copies and the like) are only cleaned up
        if self.settings.delete_after_import {
            for src in manifest.file_list() {
                if imported.contains(&src.as_str()) {
                    continue;
                }
                if let Some(path) = resolve_reference(base, src) {
                    let _ = std::fs::remove_file(path);
                }
            }
        }

        let rewritten = rewrite_sources(&manifest_text, &replacements)?;
        let stored_name = format!("{}{}", uuid::Uuid::new_v4(), SYNC_EXTENSION);
        std::fs::write(self.storage_dir.join(&stored_name), rewritten)?;
        let narrative = self.new_item(&file_name(manifest_path), stored_name, MediaKind::Narrative);
        self.library.add_media(&narrative)?;

        if self.settings.delete_after_import {
            let _ = std::fs::remove_file(manifest_path);
            if let Some(primary) = self.extensions.primary_manifest(manifest_path) {
                let _ = std::fs::remove_file(primary);
            }
        }

        tracing::info!(
            manifest = %manifest_path.display(),
            frames = manifest.frames.len(),
            components = items.len(),
            "Imported narrative"
        );
        items.push(narrative);
        Ok(items)
    }
}

impl ImportConsumer for MediaImporter {
    fn on_import(&self, event: ImportEvent) {
        match self.import(&event) {
            Ok(items) => tracing::debug!(kind = event.as_str(), items = items.len(), "Import finished"),
            Err(e) => tracing::warn!(
                kind = event.as_str(),
                path = %event.path().display(),
                error = %e,
                "Import failed"
            ),
        }
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// `".jpg"` for `"photo.jpg"`, empty when there is no extension
fn extension_of(name: &str) -> String {
    name.rsplit_once('.')
        .filter(|(stem, _)| !stem.is_empty())
        .map(|(_, ext)| format!(".{}", ext.to_ascii_lowercase()))
        .unwrap_or_default()
}

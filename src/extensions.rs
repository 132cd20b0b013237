//! Declarative file-extension classification for the drop directory
//!
//! Matching is done on the file name only; no filesystem access happens here.

use std::path::{Path, PathBuf};

pub const PLAYER_DOCUMENT_EXTENSION: &str = ".html";
pub const MANIFEST_EXTENSION: &str = ".smil";
/// Some Bluetooth stacks auto-delete `.smil` files, so senders also ship
/// the manifest disguised as a jpeg.
pub const SYNC_EXTENSION: &str = ".sync.jpg";
pub const PLAYER_DOCUMENT_MARKER: &str = "<!DOCTYPE html>";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestVariant {
    Primary,
    Sync,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileClass {
    /// Candidate for the first-line marker sniff
    PlayerDocument,
    Manifest(ManifestVariant),
    /// Anything else: a bundle component or a standalone item
    Media,
}

#[derive(Debug, Clone)]
pub struct ExtensionTable {
    entries: Vec<(String, FileClass)>,
    player_marker: String,
}

impl Default for ExtensionTable {
    fn default() -> Self {
        Self::new(
            vec![
                (PLAYER_DOCUMENT_EXTENSION, FileClass::PlayerDocument),
                (MANIFEST_EXTENSION, FileClass::Manifest(ManifestVariant::Primary)),
                (SYNC_EXTENSION, FileClass::Manifest(ManifestVariant::Sync)),
            ],
            PLAYER_DOCUMENT_MARKER,
        )
    }
}

impl ExtensionTable {
    pub fn new(entries: Vec<(&str, FileClass)>, player_marker: &str) -> Self {
        let mut entries: Vec<(String, FileClass)> = entries
            .into_iter()
            .map(|(suffix, class)| (suffix.to_ascii_lowercase(), class))
            .collect();
        // `.sync.jpg` must win over a hypothetical `.jpg` entry
        entries.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        Self {
            entries,
            player_marker: player_marker.to_string(),
        }
    }

    pub fn player_marker(&self) -> &str {
        &self.player_marker
    }

    pub fn classify(&self, path: &Path) -> FileClass {
        let Some(name) = lower_file_name(path) else {
            return FileClass::Media;
        };
        self.entries
            .iter()
            .find(|(suffix, _)| name.ends_with(suffix.as_str()))
            .map(|(_, class)| *class)
            .unwrap_or(FileClass::Media)
    }

    fn suffix_for(&self, variant: ManifestVariant) -> Option<&str> {
        self.entries
            .iter()
            .find(|(_, class)| *class == FileClass::Manifest(variant))
            .map(|(suffix, _)| suffix.as_str())
    }

    /// The same manifest under the other manifest extension
    /// (`story.smil` ↔ `story.sync.jpg`), or `None` for non-manifests.
    pub fn sibling_manifest(&self, path: &Path) -> Option<PathBuf> {
        let FileClass::Manifest(variant) = self.classify(path) else {
            return None;
        };
        let other = match variant {
            ManifestVariant::Primary => ManifestVariant::Sync,
            ManifestVariant::Sync => ManifestVariant::Primary,
        };
        let from = self.suffix_for(variant)?;
        let to = self.suffix_for(other)?;

        let name = path.file_name()?.to_str()?;
        let stem = &name[..name.len() - from.len()];
        Some(path.with_file_name(format!("{stem}{to}")))
    }

    /// The primary-extension form of a manifest path
    pub fn primary_manifest(&self, path: &Path) -> Option<PathBuf> {
        match self.classify(path) {
            FileClass::Manifest(ManifestVariant::Primary) => Some(path.to_path_buf()),
            FileClass::Manifest(ManifestVariant::Sync) => self.sibling_manifest(path),
            _ => None,
        }
    }

    /// Bookkeeping references inside a manifest that are never waited on
    pub fn is_sync_reference(&self, path: &Path) -> bool {
        self.classify(path) == FileClass::Manifest(ManifestVariant::Sync)
    }
}

fn lower_file_name(path: &Path) -> Option<String> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.to_ascii_lowercase())
}

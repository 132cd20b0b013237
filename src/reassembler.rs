//! Narrative bundle reassembly
//!
//! A narrative arrives as a manifest plus the components it references, each
//! delivered as an independent file. The reassembler tracks one bundle per
//! manifest path and reports completion exactly once, when every awaited
//! component is on disk.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Instant;

use crate::extensions::ExtensionTable;
use crate::manifest::{parse_manifest, resolve_reference};
use crate::traits::ImportEvent;

/// What happened to a manifest candidate
#[derive(Debug, Clone, PartialEq)]
pub enum ManifestOutcome {
    /// The same manifest path is already pending
    AlreadyTracked,
    /// Same narrative under the other extension; the file was deleted
    DuplicateRemoved,
    /// Unreadable or malformed; no bundle, file left in place
    ParseFailed,
    Pending { awaiting: usize },
    Completed(ImportEvent),
}

/// What happened to a non-manifest file
#[derive(Debug, Clone, PartialEq)]
pub enum ComponentOutcome {
    /// Not referenced by any pending bundle
    Untracked,
    Pending { manifest: PathBuf, awaiting: usize },
    Completed(ImportEvent),
}

#[derive(Debug)]
struct Bundle {
    /// Component path → present on disk. The key set never grows.
    components: HashMap<PathBuf, bool>,
    tracked_since: Instant,
}

impl Bundle {
    fn awaiting(&self) -> usize {
        self.components.values().filter(|present| !**present).count()
    }
}

#[derive(Debug, Default)]
struct ReassemblyState {
    bundles: HashMap<PathBuf, Bundle>,
    /// Most recently completed manifest, used only for sibling duplicates
    last_emitted: Option<PathBuf>,
}

impl ReassemblyState {
    fn owner_of(&self, component: &Path) -> Option<PathBuf> {
        self.bundles
            .iter()
            .find(|(_, bundle)| bundle.components.contains_key(component))
            .map(|(manifest, _)| manifest.clone())
    }

    /// Re-stat every component and commit the bundle if all are present.
    /// Returns the number still awaited, or `None` once committed.
    fn check_completion(&mut self, manifest: &Path) -> Option<usize> {
        let bundle = self.bundles.get_mut(manifest)?;
        for (path, present) in bundle.components.iter_mut() {
            *present = path.exists();
        }

        let awaiting = bundle.awaiting();
        if awaiting > 0 {
            tracing::debug!(manifest = %manifest.display(), awaiting, "Narrative not yet complete - waiting");
            return Some(awaiting);
        }

        if let Some(bundle) = self.bundles.remove(manifest) {
            tracing::info!(
                manifest = %manifest.display(),
                components = bundle.components.len(),
                elapsed_ms = bundle.tracked_since.elapsed().as_millis() as u64,
                "Narrative complete"
            );
        }
        self.last_emitted = Some(manifest.to_path_buf());
        None
    }
}

pub struct ImportReassembler {
    directory: PathBuf,
    extensions: ExtensionTable,
    state: Mutex<ReassemblyState>,
}

impl ImportReassembler {
    pub fn new(directory: impl Into<PathBuf>, extensions: ExtensionTable) -> Self {
        Self {
            directory: directory.into(),
            extensions,
            state: Mutex::new(ReassemblyState::default()),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Handle a file classified as a manifest (either extension)
    pub fn accept_manifest(&self, manifest: &Path) -> ManifestOutcome {
        let mut state = self.state.lock().unwrap();

        // don't add the same key twice
        if state.bundles.contains_key(manifest) {
            tracing::debug!(manifest = %manifest.display(), "Manifest already tracked - ignoring");
            return ManifestOutcome::AlreadyTracked;
        }

        if let Some(sibling) = self.extensions.sibling_manifest(manifest) {
            let sibling_pending = state.bundles.contains_key(&sibling);
            let sibling_emitted = state.last_emitted.as_deref() == Some(sibling.as_path());
            if sibling_pending || sibling_emitted {
                state.last_emitted = None;
                if let Err(e) = std::fs::remove_file(manifest) {
                    tracing::warn!(path = %manifest.display(), error = %e, "Failed to delete duplicate manifest");
                }
                tracing::info!(path = %manifest.display(), "Found duplicate manifest - deleted");
                return ManifestOutcome::DuplicateRemoved;
            }
        }

        let parsed = match parse_manifest(manifest) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!(path = %manifest.display(), error = %e, "Manifest parse error");
                return ManifestOutcome::ParseFailed;
            }
        };

        let mut components = HashMap::new();
        for name in parsed.file_list() {
            let Some(component) = resolve_reference(&self.directory, name) else {
                continue;
            };
            if component.exists() {
                tracing::debug!(path = %component.display(), "Component already on disk");
                components.insert(component, true);
            } else if self.extensions.is_sync_reference(&component) {
                tracing::debug!(path = %component.display(), "Sync reference - not awaited");
            } else {
                tracing::debug!(path = %component.display(), "Component not yet received");
                components.insert(component, false);
            }
        }

        tracing::info!(
            manifest = %manifest.display(),
            components = components.len(),
            "Tracking narrative bundle"
        );
        state.bundles.insert(
            manifest.to_path_buf(),
            Bundle {
                components,
                tracked_since: Instant::now(),
            },
        );

        // the manifest may have arrived last
        match state.check_completion(manifest) {
            Some(awaiting) => ManifestOutcome::Pending { awaiting },
            None => ManifestOutcome::Completed(ImportEvent::Narrative(manifest.to_path_buf())),
        }
    }

    /// Handle a non-manifest file. `Untracked` means it is a standalone item.
    pub fn accept_component(&self, path: &Path) -> ComponentOutcome {
        let mut state = self.state.lock().unwrap();

        let Some(manifest) = state.owner_of(path) else {
            return ComponentOutcome::Untracked;
        };

        tracing::debug!(path = %path.display(), manifest = %manifest.display(), "Component received");
        if let Some(bundle) = state.bundles.get_mut(&manifest) {
            bundle.components.insert(path.to_path_buf(), true);
        }

        match state.check_completion(&manifest) {
            Some(awaiting) => ComponentOutcome::Pending { manifest, awaiting },
            None => ComponentOutcome::Completed(ImportEvent::Narrative(manifest)),
        }
    }

    /// Whether `path` is awaited (or held) by some pending bundle
    pub fn is_pending_component(&self, path: &Path) -> bool {
        self.state.lock().unwrap().owner_of(path).is_some()
    }

    pub fn pending_manifests(&self) -> Vec<PathBuf> {
        let mut manifests: Vec<PathBuf> = self.state.lock().unwrap().bundles.keys().cloned().collect();
        manifests.sort();
        manifests
    }

    pub fn last_emitted(&self) -> Option<PathBuf> {
        self.state.lock().unwrap().last_emitted.clone()
    }

    /// Drop every pending bundle and the duplicate memory
    pub fn clear(&self) {
        let mut state = self.state.lock().unwrap();
        let dropped = state.bundles.len();
        state.bundles.clear();
        state.last_emitted = None;
        if dropped > 0 {
            tracing::warn!(dropped, "Discarded incomplete narrative bundles");
        }
    }
}

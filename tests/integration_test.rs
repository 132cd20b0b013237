//! End-to-end integration tests for the mediadrop import pipeline.
//!
//! Tests the full flow: File Event → Classify → Reassemble → Dispatch → Import

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

use mediadrop_lib::dispatcher::ImportDispatcher;
use mediadrop_lib::extensions::ExtensionTable;
use mediadrop_lib::importer::{ImportSettings, MediaImporter, UNKNOWN_PERSON_ID};
use mediadrop_lib::mocks::{ManualFileWatcher, RecordingConsumer, RecordingSink};
use mediadrop_lib::traits::{FileEventKind, ImportEvent, ImportSink, MediaKind, MediaLibrary};
use mediadrop_lib::watcher::DirectoryWatcher;
use mediadrop_lib::SqliteMediaLibrary;

const STORY: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<smil xmlns="http://www.w3.org/ns/SMIL" version="3.0">
  <body>
    <par dur="4000ms">
      <img src="goat.jpg"/>
      <audio src="goat.m4a"/>
    </par>
    <par dur="3000ms">
      <text src="goat.txt"/>
    </par>
    <img src="story.sync.jpg"/>
  </body>
</smil>"#;

const COMPONENTS: [(&str, &str); 3] = [
    ("goat.jpg", "jpeg bytes"),
    ("goat.m4a", "audio bytes"),
    ("goat.txt", "Our new goat"),
];

/// Watcher wired to a recording sink through a manual file watcher
fn setup() -> (TempDir, ManualFileWatcher, Arc<DirectoryWatcher>, Arc<RecordingSink>) {
    let dir = tempfile::tempdir().unwrap();
    let sink = Arc::new(RecordingSink::new());
    let watcher = Arc::new(DirectoryWatcher::new(dir.path(), ExtensionTable::default(), sink.clone()));
    let fs_watcher = ManualFileWatcher::new();
    watcher.start(&fs_watcher).unwrap();
    (dir, fs_watcher, watcher, sink)
}

/// Write a file, then report its close-after-write
fn receive(dir: &Path, fs_watcher: &ManualFileWatcher, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, contents).unwrap();
    fs_watcher.simulate_close_write(path.clone());
    path
}

#[test]
fn test_bundle_completes_once_in_every_arrival_order() {
    // manifest first, manifest last, manifest in the middle
    for manifest_position in 0..=COMPONENTS.len() {
        let (dir, fs_watcher, _watcher, sink) = setup();
        let manifest = dir.path().join("story.smil");

        let mut arrivals: Vec<(&str, &str)> = COMPONENTS.to_vec();
        arrivals.insert(manifest_position, ("story.smil", STORY));

        for (i, (name, contents)) in arrivals.iter().enumerate() {
            receive(dir.path(), &fs_watcher, name, contents);
            let complete = i == arrivals.len() - 1;
            assert_eq!(
                sink.narrative_count(&manifest),
                usize::from(complete),
                "manifest at position {manifest_position}, after {name}"
            );
        }

        // components seen before their manifest were standalone at the time
        let singles = sink
            .events()
            .iter()
            .filter(|e| matches!(e, ImportEvent::SingleFile(_)))
            .count();
        assert_eq!(singles, manifest_position);
        assert_eq!(sink.events().last(), Some(&ImportEvent::Narrative(manifest)));
    }
}

#[test]
fn test_no_second_narrative_after_completion() {
    let (dir, fs_watcher, _watcher, sink) = setup();
    let manifest = receive(dir.path(), &fs_watcher, "story.smil", STORY);
    for (name, contents) in COMPONENTS {
        receive(dir.path(), &fs_watcher, name, contents);
    }
    assert_eq!(sink.narrative_count(&manifest), 1);

    // late re-deliveries of components are plain files now
    fs_watcher.simulate_close_write(dir.path().join("goat.jpg"));
    assert_eq!(sink.narrative_count(&manifest), 1);
    assert_eq!(
        sink.events().last(),
        Some(&ImportEvent::SingleFile(dir.path().join("goat.jpg")))
    );
}

#[test]
fn test_sync_duplicate_is_deleted_after_completion() {
    let (dir, fs_watcher, watcher, sink) = setup();
    for (name, contents) in COMPONENTS {
        receive(dir.path(), &fs_watcher, name, contents);
    }
    sink.clear();

    let manifest = receive(dir.path(), &fs_watcher, "story.smil", STORY);
    assert_eq!(sink.events(), vec![ImportEvent::Narrative(manifest)]);

    let duplicate = receive(dir.path(), &fs_watcher, "story.sync.jpg", STORY);
    assert!(!duplicate.exists());
    assert_eq!(sink.events().len(), 1);
    assert!(watcher.reassembler().pending_manifests().is_empty());
}

#[test]
fn test_sync_duplicate_is_deleted_while_pending() {
    let (dir, fs_watcher, watcher, sink) = setup();
    let manifest = receive(dir.path(), &fs_watcher, "story.sync.jpg", STORY);
    let duplicate = receive(dir.path(), &fs_watcher, "story.smil", STORY);

    assert!(!duplicate.exists());
    assert_eq!(watcher.reassembler().pending_manifests(), vec![manifest.clone()]);

    for (name, contents) in COMPONENTS {
        receive(dir.path(), &fs_watcher, name, contents);
    }
    assert_eq!(sink.events(), vec![ImportEvent::Narrative(manifest)]);
}

#[test]
fn test_sync_reference_never_blocks_completion() {
    let (dir, fs_watcher, _watcher, sink) = setup();
    let manifest = receive(
        dir.path(),
        &fs_watcher,
        "notes.smil",
        r#"<smil><body><img src="notes.sync.jpg"/><img src="other.sync.jpg"/></body></smil>"#,
    );
    assert_eq!(sink.events(), vec![ImportEvent::Narrative(manifest)]);
}

#[test]
fn test_malformed_manifests_then_normal_traffic() {
    let (dir, fs_watcher, watcher, sink) = setup();
    for i in 0..5 {
        receive(dir.path(), &fs_watcher, &format!("broken{i}.smil"), "<smil><body><par>");
        receive(dir.path(), &fs_watcher, &format!("junk{i}.sync.jpg"), "\u{ff}\u{d8}\u{ff} not xml");
    }
    assert!(sink.events().is_empty());
    assert!(watcher.reassembler().pending_manifests().is_empty());

    let photo = receive(dir.path(), &fs_watcher, "photo.jpg", "jpeg");
    let manifest = receive(dir.path(), &fs_watcher, "story.smil", STORY);
    for (name, contents) in COMPONENTS {
        receive(dir.path(), &fs_watcher, name, contents);
    }
    assert_eq!(
        sink.events(),
        vec![ImportEvent::SingleFile(photo), ImportEvent::Narrative(manifest)]
    );
}

#[test]
fn test_ignored_notifications_and_empty_files() {
    let (dir, fs_watcher, _watcher, sink) = setup();
    let photo = dir.path().join("photo.jpg");
    fs::write(&photo, "jpeg").unwrap();
    fs_watcher.simulate_event(photo.clone(), FileEventKind::Created);
    fs_watcher.simulate_event(photo.clone(), FileEventKind::Modified);
    fs_watcher.simulate_event(photo, FileEventKind::Other);
    receive(dir.path(), &fs_watcher, "placeholder.jpg", "");
    assert!(sink.events().is_empty());
}

#[test]
fn test_full_pipeline_into_library() {
    let drop = tempfile::tempdir().unwrap();
    let storage = tempfile::tempdir().unwrap();
    let library = Arc::new(SqliteMediaLibrary::open_in_memory().unwrap());
    let importer = Arc::new(
        MediaImporter::new(storage.path(), library.clone(), ImportSettings::default()).unwrap(),
    );
    let dispatcher = Arc::new(ImportDispatcher::spawn(16).unwrap());
    let watcher = Arc::new(DirectoryWatcher::new(drop.path(), ExtensionTable::default(), dispatcher.clone()));
    let fs_watcher = ManualFileWatcher::new();
    watcher.start(&fs_watcher).unwrap();

    // nobody listening yet: events wait in the backlog
    receive(drop.path(), &fs_watcher, "holiday.jpg", "jpeg bytes");
    receive(drop.path(), &fs_watcher, "story.smil", STORY);
    for (name, contents) in COMPONENTS {
        receive(drop.path(), &fs_watcher, name, contents);
    }
    dispatcher.flush();
    assert_eq!(dispatcher.backlog_len(), 2);
    assert_eq!(library.count().unwrap(), 0);

    dispatcher.attach(importer);
    dispatcher.flush();

    // holiday photo + 3 components + rewritten narrative
    assert_eq!(library.count().unwrap(), 5);
    let items = library.list_for_parent(UNKNOWN_PERSON_ID).unwrap();
    assert_eq!(items.iter().filter(|i| i.kind == MediaKind::Narrative).count(), 1);
    assert_eq!(items.iter().filter(|i| i.kind == MediaKind::Image).count(), 2);
    assert_eq!(fs::read_dir(drop.path()).unwrap().count(), 0);

    watcher.stop(&fs_watcher).unwrap();
    dispatcher.shutdown();
}

#[test]
fn test_manifest_cannot_reach_outside_drop_directory() {
    let root = tempfile::tempdir().unwrap();
    let drop = root.path().join("drop");
    fs::create_dir(&drop).unwrap();
    let sibling = root.path().join("sibling_victim.txt");
    fs::write(&sibling, "keep me").unwrap();
    let elsewhere = tempfile::tempdir().unwrap();
    let victim = elsewhere.path().join("victim.txt");
    fs::write(&victim, "keep me too").unwrap();

    let storage = tempfile::tempdir().unwrap();
    let library = Arc::new(SqliteMediaLibrary::open_in_memory().unwrap());
    let importer = Arc::new(
        MediaImporter::new(storage.path(), library.clone(), ImportSettings::default()).unwrap(),
    );
    let dispatcher = Arc::new(ImportDispatcher::spawn(16).unwrap());
    dispatcher.attach(importer);
    let watcher = Arc::new(DirectoryWatcher::new(&drop, ExtensionTable::default(), dispatcher.clone()));
    let fs_watcher = ManualFileWatcher::new();
    watcher.start(&fs_watcher).unwrap();

    let manifest = format!(
        r#"<smil><body><par><img src="{}"/><audio src="../sibling_victim.txt"/><text src="caption.txt"/></par></body></smil>"#,
        victim.display()
    );
    receive(&drop, &fs_watcher, "story.smil", &manifest);
    // the outside files are not components, so the caption is still awaited
    assert_eq!(watcher.reassembler().pending_manifests(), vec![drop.join("story.smil")]);

    receive(&drop, &fs_watcher, "caption.txt", "A walk by the river");
    dispatcher.flush();

    // caption + narrative, nothing from outside
    assert_eq!(library.count().unwrap(), 2);
    assert_eq!(fs::read_to_string(&victim).unwrap(), "keep me too");
    assert_eq!(fs::read_to_string(&sibling).unwrap(), "keep me");
    assert_eq!(fs::read_dir(&drop).unwrap().count(), 0);

    watcher.stop(&fs_watcher).unwrap();
    dispatcher.shutdown();
}

#[test]
fn test_dispatcher_replays_in_arrival_order() {
    let dispatcher = ImportDispatcher::spawn(8).unwrap();
    let events: Vec<ImportEvent> = (0..5)
        .map(|i| ImportEvent::SingleFile(PathBuf::from(format!("/drop/{i}.jpg"))))
        .collect();
    for event in &events {
        dispatcher.emit(event.clone());
    }

    let consumer = Arc::new(RecordingConsumer::new());
    dispatcher.attach(consumer.clone());
    dispatcher.flush();
    assert_eq!(consumer.events(), events);
}

//! SMIL narrative manifest parsing
//!
//! A manifest is a small SMIL document whose `<par>` elements each describe
//! one frame of a narrative:
//!
//! ```xml
//! <smil>
//!   <body>
//!     <par dur="5000ms">
//!       <img src="frame1.jpg"/>
//!       <audio src="frame1.m4a"/>
//!       <text src="frame1.txt"/>
//!     </par>
//!   </body>
//! </smil>
//! ```
//!
//! The watcher only needs [`Manifest::file_list`]; the importer uses the
//! frames. Every `src` is a name inside the drop directory and is resolved
//! with [`resolve_reference`].

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use quick_xml::events::{BytesStart, Event};
use quick_xml::{Reader as XmlReader, Writer as XmlWriter};
use thiserror::Error;

use crate::traits::MediaKind;

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("XML error: {0}")]
    Xml(String),
    #[error("Not a SMIL document")]
    NotSmil,
}

/// One `<par>` block
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    pub duration_ms: Option<u64>,
    pub image: Option<String>,
    pub video: Option<String>,
    pub audio: Vec<String>,
    pub text: Option<String>,
}

impl Frame {
    /// Every file this frame references, with the kind it is stored as
    pub fn components(&self) -> impl Iterator<Item = (&str, MediaKind)> {
        self.image
            .iter()
            .map(|s| (s.as_str(), MediaKind::Image))
            .chain(self.video.iter().map(|s| (s.as_str(), MediaKind::Video)))
            .chain(self.audio.iter().map(|s| (s.as_str(), MediaKind::Audio)))
            .chain(self.text.iter().map(|s| (s.as_str(), MediaKind::Text)))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Manifest {
    files: Vec<String>,
    pub frames: Vec<Frame>,
}

impl Manifest {
    /// Every `src` in document order, de-duplicated. Includes non-media and
    /// sync references so they can be cleaned from disk later.
    pub fn file_list(&self) -> &[String] {
        &self.files
    }

    fn add_file(&mut self, src: &str) {
        if !self.files.iter().any(|f| f == src) {
            self.files.push(src.to_string());
        }
    }
}

pub fn parse_manifest(path: &Path) -> Result<Manifest, ManifestError> {
    let text = std::fs::read_to_string(path)?;
    parse_manifest_str(&text)
}

pub fn parse_manifest_str(xml: &str) -> Result<Manifest, ManifestError> {
    let mut reader = XmlReader::from_str(xml);
    reader.trim_text(true);
    let mut buf = Vec::new();

    let mut manifest = Manifest::default();
    let mut current: Option<Frame> = None;
    let mut seen_root = false;
    let mut depth: usize = 0;

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| ManifestError::Xml(e.to_string()))?;
        match event {
            Event::Start(e) => {
                check_root(&e, &mut seen_root)?;
                depth += 1;
                if e.local_name().as_ref() == b"par" {
                    current = Some(Frame {
                        duration_ms: attribute(&e, b"dur")?.as_deref().and_then(parse_duration_ms),
                        ..Frame::default()
                    });
                } else {
                    visit_element(&e, &mut manifest, current.as_mut())?;
                }
            }
            Event::Empty(e) => {
                check_root(&e, &mut seen_root)?;
                if e.local_name().as_ref() == b"par" {
                    // an empty frame still counts towards the narrative length
                    manifest.frames.push(Frame {
                        duration_ms: attribute(&e, b"dur")?.as_deref().and_then(parse_duration_ms),
                        ..Frame::default()
                    });
                } else {
                    visit_element(&e, &mut manifest, current.as_mut())?;
                }
            }
            Event::End(e) => {
                depth = depth.saturating_sub(1);
                if e.local_name().as_ref() == b"par" {
                    if let Some(frame) = current.take() {
                        manifest.frames.push(frame);
                    }
                }
            }
            Event::Eof => break,
            _ => (),
        }
        buf.clear();
    }

    if !seen_root {
        return Err(ManifestError::NotSmil);
    }
    if depth != 0 {
        return Err(ManifestError::Xml("unexpected end of document".into()));
    }
    Ok(manifest)
}

fn check_root(e: &BytesStart<'_>, seen_root: &mut bool) -> Result<(), ManifestError> {
    if !*seen_root {
        if e.local_name().as_ref() != b"smil" {
            return Err(ManifestError::NotSmil);
        }
        *seen_root = true;
    }
    Ok(())
}

fn attribute(e: &BytesStart<'_>, name: &[u8]) -> Result<Option<String>, ManifestError> {
    for attr in e.attributes() {
        let attr = attr.map_err(|e| ManifestError::Xml(e.to_string()))?;
        if attr.key.local_name().as_ref() == name {
            let value = attr
                .unescape_value()
                .map_err(|e| ManifestError::Xml(e.to_string()))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

fn visit_element(
    e: &BytesStart<'_>,
    manifest: &mut Manifest,
    frame: Option<&mut Frame>,
) -> Result<(), ManifestError> {
    let Some(src) = attribute(e, b"src")? else {
        return Ok(());
    };
    let src = src.trim();
    if src.is_empty() {
        return Ok(());
    }
    manifest.add_file(src);

    if let Some(frame) = frame {
        match e.local_name().as_ref() {
            b"img" => frame.image = Some(src.to_string()),
            b"video" => frame.video = Some(src.to_string()),
            b"audio" => frame.audio.push(src.to_string()),
            b"text" => frame.text = Some(src.to_string()),
            _ => (),
        }
    }
    Ok(())
}

/// Resolve a manifest `src` to a path inside `directory`.
///
/// Only plain name components are accepted (`./` is dropped). Absolute
/// paths, `..`, roots and drive prefixes yield `None`.
pub fn resolve_reference(directory: &Path, src: &str) -> Option<PathBuf> {
    let mut resolved = directory.to_path_buf();
    let mut named = false;
    for component in Path::new(src).components() {
        match component {
            Component::Normal(part) => {
                resolved.push(part);
                named = true;
            }
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                tracing::warn!(src, directory = %directory.display(), "Manifest reference leaves the drop directory - skipped");
                return None;
            }
        }
    }
    named.then_some(resolved)
}

/// Rewrite `src` attributes through `replacements` (keyed by the unescaped
/// value). Everything else is written back unchanged.
pub fn rewrite_sources(xml: &str, replacements: &HashMap<String, String>) -> Result<String, ManifestError> {
    let mut reader = XmlReader::from_str(xml);
    let mut writer = XmlWriter::new(Vec::new());
    let mut buf = Vec::new();

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| ManifestError::Xml(e.to_string()))?;
        let event = match event {
            Event::Eof => break,
            Event::Start(e) => Event::Start(replace_src(&e, replacements)?),
            Event::Empty(e) => Event::Empty(replace_src(&e, replacements)?),
            other => other,
        };
        writer
            .write_event(event)
            .map_err(|e| ManifestError::Xml(e.to_string()))?;
        buf.clear();
    }

    String::from_utf8(writer.into_inner()).map_err(|e| ManifestError::Xml(e.to_string()))
}

fn replace_src(
    e: &BytesStart<'_>,
    replacements: &HashMap<String, String>,
) -> Result<BytesStart<'static>, ManifestError> {
    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let mut rewritten = BytesStart::new(name);
    for attr in e.attributes() {
        let attr = attr.map_err(|e| ManifestError::Xml(e.to_string()))?;
        let replacement = if attr.key.local_name().as_ref() == b"src" {
            let value = attr
                .unescape_value()
                .map_err(|e| ManifestError::Xml(e.to_string()))?;
            replacements.get(value.trim())
        } else {
            None
        };
        match replacement {
            Some(stored) => {
                let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
                rewritten.push_attribute((key.as_str(), stored.as_str()));
            }
            None => rewritten.push_attribute(attr),
        }
    }
    Ok(rewritten)
}

/// `"5000ms"`, `"5s"`, `"2.5s"` or bare milliseconds
pub fn parse_duration_ms(value: &str) -> Option<u64> {
    let value = value.trim();
    if let Some(ms) = value.strip_suffix("ms") {
        return ms.trim().parse().ok();
    }
    if let Some(secs) = value.strip_suffix('s') {
        let secs: f64 = secs.trim().parse().ok()?;
        if secs.is_sign_negative() || !secs.is_finite() {
            return None;
        }
        return Some((secs * 1000.0).round() as u64);
    }
    value.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const STORY: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<smil xmlns="http://www.w3.org/ns/SMIL" version="3.0">
  <head><layout><region id="image"/></layout></head>
  <body>
    <par dur="5000ms">
      <img src="frame1.jpg" region="image"/>
      <audio src="frame1.m4a"/>
      <text src="frame1.txt"/>
    </par>
    <par dur="2.5s">
      <video src="clip.mp4"/>
      <audio src="music.mp3"/>
      <audio src="frame1.m4a"/>
    </par>
    <img src="story.sync.jpg"/>
  </body>
</smil>"#;

    #[test]
    fn test_file_list_in_document_order_without_duplicates() {
        let manifest = parse_manifest_str(STORY).unwrap();
        assert_eq!(
            manifest.file_list(),
            &["frame1.jpg", "frame1.m4a", "frame1.txt", "clip.mp4", "music.mp3", "story.sync.jpg"]
        );
    }

    #[test]
    fn test_frames() {
        let manifest = parse_manifest_str(STORY).unwrap();
        assert_eq!(manifest.frames.len(), 2);

        let first = &manifest.frames[0];
        assert_eq!(first.duration_ms, Some(5000));
        assert_eq!(first.image.as_deref(), Some("frame1.jpg"));
        assert_eq!(first.audio, vec!["frame1.m4a"]);
        assert_eq!(first.text.as_deref(), Some("frame1.txt"));

        let second = &manifest.frames[1];
        assert_eq!(second.duration_ms, Some(2500));
        assert_eq!(second.video.as_deref(), Some("clip.mp4"));
        assert_eq!(second.audio.len(), 2);
        let kinds: Vec<MediaKind> = second.components().map(|(_, kind)| kind).collect();
        assert_eq!(kinds, vec![MediaKind::Video, MediaKind::Audio, MediaKind::Audio]);
    }

    #[test]
    fn test_empty_smil_has_no_files() {
        let manifest = parse_manifest_str("<smil><body/></smil>").unwrap();
        assert!(manifest.file_list().is_empty());
        assert!(manifest.frames.is_empty());
    }

    #[test]
    fn test_wrong_root_is_rejected() {
        let result = parse_manifest_str("<html><body><img src=\"a.jpg\"/></body></html>");
        assert!(matches!(result, Err(ManifestError::NotSmil)));
    }

    #[test]
    fn test_plain_text_is_rejected() {
        let result = parse_manifest_str("this is not a manifest");
        assert!(matches!(result, Err(ManifestError::NotSmil)));
    }

    #[test]
    fn test_truncated_document_is_rejected() {
        let result = parse_manifest_str("<smil><body><par dur=\"1s\"><img src=\"a.jpg\"/>");
        assert!(matches!(result, Err(ManifestError::Xml(_))));
    }

    #[test]
    fn test_mismatched_tags_are_rejected() {
        let result = parse_manifest_str("<smil><body></par></smil>");
        assert!(matches!(result, Err(ManifestError::Xml(_))));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let result = parse_manifest(Path::new("/nonexistent/story.smil"));
        assert!(matches!(result, Err(ManifestError::Io(_))));
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration_ms("5000ms"), Some(5000));
        assert_eq!(parse_duration_ms("5s"), Some(5000));
        assert_eq!(parse_duration_ms("0.25s"), Some(250));
        assert_eq!(parse_duration_ms("1200"), Some(1200));
        assert_eq!(parse_duration_ms("indefinite"), None);
        assert_eq!(parse_duration_ms("-1s"), None);
    }

    #[test]
    fn test_resolve_reference_stays_inside_directory() {
        let dir = Path::new("/drop");
        assert_eq!(resolve_reference(dir, "a.jpg"), Some(PathBuf::from("/drop/a.jpg")));
        assert_eq!(resolve_reference(dir, "./a.jpg"), Some(PathBuf::from("/drop/a.jpg")));
        assert_eq!(resolve_reference(dir, "sub/a.jpg"), Some(PathBuf::from("/drop/sub/a.jpg")));

        assert_eq!(resolve_reference(dir, "/etc/passwd"), None);
        assert_eq!(resolve_reference(dir, "../outside.txt"), None);
        assert_eq!(resolve_reference(dir, "sub/../../outside.txt"), None);
        assert_eq!(resolve_reference(dir, ""), None);
        assert_eq!(resolve_reference(dir, "."), None);
    }

    #[test]
    fn test_rewrite_sources_handles_quoting_and_escapes() {
        let xml = r#"<smil><body><par dur="1s"><img src='a.jpg' region="image"/><text src="b&amp;c.txt"/><audio src="keep.m4a"/></par></body></smil>"#;
        let replacements = HashMap::from([
            ("a.jpg".to_string(), "1111.jpg".to_string()),
            ("b&c.txt".to_string(), "2222.txt".to_string()),
        ]);

        let rewritten = rewrite_sources(xml, &replacements).unwrap();
        let manifest = parse_manifest_str(&rewritten).unwrap();
        assert_eq!(manifest.file_list(), &["1111.jpg", "2222.txt", "keep.m4a"]);
        assert_eq!(manifest.frames[0].duration_ms, Some(1000));
        assert!(rewritten.contains(r#"region="image""#));
    }
}

//! Media library trait for recording imported items

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("Database error: {0}")]
    DatabaseError(String),
}

/// What kind of content a stored item holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Image,
    Audio,
    Video,
    Text,
    Narrative,
    PlayerDocument,
    Other,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Audio => "audio",
            MediaKind::Video => "video",
            MediaKind::Text => "text",
            MediaKind::Narrative => "narrative",
            MediaKind::PlayerDocument => "player_document",
            MediaKind::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "image" => MediaKind::Image,
            "audio" => MediaKind::Audio,
            "video" => MediaKind::Video,
            "text" => MediaKind::Text,
            "narrative" => MediaKind::Narrative,
            "player_document" => MediaKind::PlayerDocument,
            _ => MediaKind::Other,
        }
    }

    /// Guess the kind of a plain media file from its extension
    pub fn from_file_name(name: &str) -> Self {
        let ext = name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "jpg" | "jpeg" | "png" | "gif" | "bmp" | "webp" => MediaKind::Image,
            "m4a" | "mp3" | "aac" | "ogg" | "wav" | "amr" | "3ga" => MediaKind::Audio,
            "mp4" | "3gp" | "mov" | "webm" | "mkv" => MediaKind::Video,
            "txt" => MediaKind::Text,
            _ => MediaKind::Other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Public,
    Private,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Private => "private",
        }
    }
}

/// A media item stored in the library
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaItem {
    pub internal_id: String,
    pub parent_id: String,
    /// Name of the copy inside the storage directory
    pub file_name: String,
    /// Name the file arrived with
    pub original_name: String,
    pub kind: MediaKind,
    pub visibility: Visibility,
    #[serde(default)]
    pub text_extra: Option<String>,
    pub created_at: i64,
}

/// Trait for media library operations
///
/// Production: SQLite with WAL mode
/// Testing: in-memory SQLite
pub trait MediaLibrary: Send + Sync {
    /// Record a newly stored item
    fn add_media(&self, item: &MediaItem) -> Result<(), LibraryError>;

    /// Fetch one item by internal id
    fn get(&self, internal_id: &str) -> Result<Option<MediaItem>, LibraryError>;

    /// All items owned by a parent, oldest first
    fn list_for_parent(&self, parent_id: &str) -> Result<Vec<MediaItem>, LibraryError>;

    /// Total number of items
    fn count(&self) -> Result<usize, LibraryError>;
}

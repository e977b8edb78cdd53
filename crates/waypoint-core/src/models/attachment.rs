//! Attachment model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::note::NoteId;

/// A unique identifier for an attachment, using UUID v7.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AttachmentId(Uuid);

impl AttachmentId {
    /// Create a new unique attachment ID using UUID v7.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID.
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for AttachmentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AttachmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for AttachmentId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Kind of media an attachment holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
        }
    }

    /// Parse a stored kind value, falling back to `Image` for anything
    /// unrecognized so old rows keep reading.
    #[must_use]
    pub fn from_stored(value: &str) -> Self {
        if value.eq_ignore_ascii_case("video") {
            Self::Video
        } else {
            Self::Image
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where an attachment's full-size media lives.
///
/// Small images embed directly in the record; videos and large images are
/// files in the managed media directory, referenced by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaRef {
    /// Media bytes embedded in the attachment record.
    Inline(Vec<u8>),
    /// File name inside the managed media directory.
    File(String),
}

impl MediaRef {
    /// Whether the media is backed by a managed file.
    #[must_use]
    pub const fn is_file(&self) -> bool {
        matches!(self, Self::File(_))
    }
}

/// A media attachment owned by exactly one note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// Unique attachment identifier.
    pub id: AttachmentId,
    /// Parent note identifier (navigation only; the note owns the lifecycle).
    pub note_id: NoteId,
    /// Image or video.
    pub kind: MediaKind,
    /// Inline bytes or managed file reference.
    pub media: MediaRef,
    /// Small JPEG preview for list rendering; `None` when generation failed.
    pub thumbnail: Option<Vec<u8>>,
    /// Creation timestamp (Unix ms).
    pub created_at: i64,
}

impl Attachment {
    /// Create a new attachment record for stored media.
    #[must_use]
    pub fn new(
        note_id: NoteId,
        kind: MediaKind,
        media: MediaRef,
        thumbnail: Option<Vec<u8>>,
    ) -> Self {
        Self {
            id: AttachmentId::new(),
            note_id,
            kind,
            media,
            thumbnail,
            created_at: crate::util::now_ms(),
        }
    }

    #[must_use]
    pub const fn has_thumbnail(&self) -> bool {
        self.thumbnail.is_some()
    }
}

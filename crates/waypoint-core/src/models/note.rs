//! Note model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{Error, Result};

use super::attachment::Attachment;

/// A unique identifier for a note, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NoteId(Uuid);

impl NoteId {
    /// Create a new unique note ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for NoteId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for NoteId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// A geographic tag attached to a note.
///
/// Latitude and longitude always travel together; an untagged note carries
/// `None` rather than a half-filled pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    /// Create a coordinate, rejecting values outside the WGS84 ranges.
    pub fn new(latitude: f64, longitude: f64) -> Result<Self> {
        if !(-90.0..=90.0).contains(&latitude) {
            return Err(Error::Validation(format!(
                "Latitude out of range: {latitude}"
            )));
        }
        if !(-180.0..=180.0).contains(&longitude) {
            return Err(Error::Validation(format!(
                "Longitude out of range: {longitude}"
            )));
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }
}

/// A note in the system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    /// Unique identifier
    pub id: NoteId,
    /// Short human title, never empty
    pub title: String,
    /// Free-form body text, may be empty
    pub body: String,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Last update timestamp (Unix ms)
    pub updated_at: i64,
    /// Optional geographic tag
    pub coordinate: Option<Coordinate>,
    /// Owned media attachments, ordered by creation
    pub attachments: Vec<Attachment>,
}

impl Note {
    /// Create a new note with the given title, body, and optional location.
    ///
    /// The title is trimmed; an empty or whitespace-only title is rejected.
    pub fn new(
        title: impl Into<String>,
        body: impl Into<String>,
        coordinate: Option<Coordinate>,
    ) -> Result<Self> {
        let title = validate_title(title)?;
        let now = crate::util::now_ms();
        Ok(Self {
            id: NoteId::new(),
            title,
            body: body.into(),
            created_at: now,
            updated_at: now,
            coordinate,
            attachments: Vec::new(),
        })
    }

    /// Whether the note carries a geographic tag.
    #[must_use]
    pub const fn has_location(&self) -> bool {
        self.coordinate.is_some()
    }
}

/// Trim a candidate title and reject empties.
pub(crate) fn validate_title(title: impl Into<String>) -> Result<String> {
    let title = title.into().trim().to_string();
    if title.is_empty() {
        return Err(Error::Validation(
            "Note title cannot be empty".to_string(),
        ));
    }
    Ok(title)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_note_id_unique() {
        let id1 = NoteId::new();
        let id2 = NoteId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_note_id_parse() {
        let id = NoteId::new();
        let parsed: NoteId = id.as_str().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_note_new() {
        let note = Note::new("Grocery List", "Eggs, milk", None).unwrap();
        assert_eq!(note.title, "Grocery List");
        assert_eq!(note.body, "Eggs, milk");
        assert!(note.coordinate.is_none());
        assert!(note.attachments.is_empty());
        assert!(note.created_at > 0);
        assert_eq!(note.created_at, note.updated_at);
    }

    #[test]
    fn test_note_new_trims_title() {
        let note = Note::new("  Trip ideas  ", "", None).unwrap();
        assert_eq!(note.title, "Trip ideas");
    }

    #[test]
    fn test_note_new_rejects_blank_title() {
        assert!(matches!(
            Note::new("", "body", None),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            Note::new(" \n\t ", "body", None),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_note_with_coordinate() {
        let coordinate = Coordinate::new(43.6532, -79.3832).unwrap();
        let note = Note::new("Harbourfront", "", Some(coordinate)).unwrap();
        assert!(note.has_location());
        assert_eq!(note.coordinate.unwrap().latitude, 43.6532);
    }

    #[test]
    fn test_coordinate_rejects_out_of_range() {
        assert!(Coordinate::new(91.0, 0.0).is_err());
        assert!(Coordinate::new(-90.5, 0.0).is_err());
        assert!(Coordinate::new(0.0, 180.5).is_err());
        assert!(Coordinate::new(0.0, -181.0).is_err());
        assert!(Coordinate::new(90.0, -180.0).is_ok());
    }
}

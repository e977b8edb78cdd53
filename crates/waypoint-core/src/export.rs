//! Share and export formatting for a single note.
//!
//! Both renderings are pure: nothing here touches persistence, and
//! attachment binaries are never embedded in an export.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::Note;

/// Serializable note representation used by the JSON export.
///
/// Fields are declared alphabetically so the rendered document keeps a
/// stable key order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportNote {
    pub body: String,
    pub created_at: i64,
    pub id: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub title: String,
    pub updated_at: i64,
}

/// Convert a note into its export record.
#[must_use]
pub fn note_to_export_item(note: &Note) -> ExportNote {
    ExportNote {
        body: note.body.clone(),
        created_at: note.created_at,
        id: note.id.to_string(),
        latitude: note.coordinate.map(|c| c.latitude),
        longitude: note.coordinate.map(|c| c.longitude),
        title: note.title.clone(),
        updated_at: note.updated_at,
    }
}

/// Render the plain-text share summary.
///
/// Fixed template: title line, details line, a location line only when the
/// note is geotagged, and a trailing created line.
#[must_use]
pub fn share_text(note: &Note) -> String {
    let mut text = format!("Title: {}\nDetails: {}", note.title, note.body);
    if let Some(coordinate) = note.coordinate {
        let _ = write!(
            text,
            "\nLocation: {}, {}",
            coordinate.latitude, coordinate.longitude
        );
    }
    let _ = write!(text, "\nCreated: {}", format_created(note.created_at));
    text
}

/// Render the note as pretty-printed JSON with stable key order.
pub fn render_json_export(note: &Note) -> serde_json::Result<String> {
    serde_json::to_string_pretty(&note_to_export_item(note))
}

/// Default file name for a JSON export of this note.
#[must_use]
pub fn suggested_export_file_name(note: &Note) -> String {
    format!("note_{}.json", note.id)
}

fn format_created(timestamp_ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |created| created.format("%b %-d, %Y at %H:%M").to_string(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Coordinate;
    use crate::models::NoteId;
    use pretty_assertions::assert_eq;

    fn grocery_note() -> Note {
        Note {
            id: NoteId::new(),
            title: "Grocery List".to_string(),
            body: "Eggs, milk".to_string(),
            created_at: 1_700_000_000_000,
            updated_at: 1_700_000_000_000,
            coordinate: None,
            attachments: Vec::new(),
        }
    }

    #[test]
    fn share_text_without_location_has_no_location_line() {
        let note = grocery_note();
        let expected = format!(
            "Title: Grocery List\nDetails: Eggs, milk\nCreated: {}",
            format_created(note.created_at)
        );
        assert_eq!(share_text(&note), expected);
        assert!(!share_text(&note).contains("Location:"));
    }

    #[test]
    fn share_text_with_location_inserts_line_before_created() {
        let mut note = grocery_note();
        note.coordinate = Some(Coordinate::new(43.6532, -79.3832).unwrap());

        let text = share_text(&note);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "Title: Grocery List");
        assert_eq!(lines[1], "Details: Eggs, milk");
        assert_eq!(lines[2], "Location: 43.6532, -79.3832");
        assert!(lines[3].starts_with("Created: "));
    }

    #[test]
    fn json_export_round_trips_fields() {
        let mut note = grocery_note();
        note.coordinate = Some(Coordinate::new(1.5, -2.5).unwrap());
        note.updated_at = note.created_at + 42;

        let rendered = render_json_export(&note).unwrap();
        let parsed: ExportNote = serde_json::from_str(&rendered).unwrap();

        assert_eq!(parsed, note_to_export_item(&note));
        assert_eq!(parsed.id, note.id.to_string());
        assert_eq!(parsed.latitude, Some(1.5));
        assert_eq!(parsed.longitude, Some(-2.5));
    }

    #[test]
    fn json_export_keys_are_alphabetical() {
        let rendered = render_json_export(&grocery_note()).unwrap();

        let positions: Vec<usize> = [
            "\"body\"",
            "\"created_at\"",
            "\"id\"",
            "\"latitude\"",
            "\"longitude\"",
            "\"title\"",
            "\"updated_at\"",
        ]
        .iter()
        .map(|key| rendered.find(key).expect("missing export key"))
        .collect();

        assert!(positions.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn json_export_omits_attachment_binaries() {
        let rendered = render_json_export(&grocery_note()).unwrap();
        assert!(!rendered.contains("attachments"));
        assert!(!rendered.contains("thumbnail"));
    }

    #[test]
    fn suggested_export_file_name_embeds_note_id() {
        let note = grocery_note();
        assert_eq!(
            suggested_export_file_name(&note),
            format!("note_{}.json", note.id)
        );
    }
}

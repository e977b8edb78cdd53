//! Search and sort projection over the repository's note snapshot.
//!
//! A pure function of its inputs: the list screen re-runs it whenever the
//! watched snapshot or the search/sort parameters change.

use crate::models::Note;

/// Display ordering for the note list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    /// Oldest first.
    CreatedAsc,
    /// Newest first.
    #[default]
    CreatedDesc,
}

/// Derive the sorted, search-filtered view of `notes`.
///
/// Matching is a case-insensitive substring test against title or body; a
/// blank term keeps every note. Ordering is by `created_at` with ties broken
/// by id, so equal timestamps still project deterministically.
#[must_use]
pub fn project(notes: &[Note], search_term: &str, order: SortOrder) -> Vec<Note> {
    let term = search_term.trim().to_lowercase();

    let mut selected: Vec<Note> = notes
        .iter()
        .filter(|note| matches(note, &term))
        .cloned()
        .collect();

    selected.sort_by(|a, b| {
        let ordering = a
            .created_at
            .cmp(&b.created_at)
            .then_with(|| a.id.cmp(&b.id));
        match order {
            SortOrder::CreatedAsc => ordering,
            SortOrder::CreatedDesc => ordering.reverse(),
        }
    });
    selected
}

fn matches(note: &Note, term: &str) -> bool {
    term.is_empty()
        || note.title.to_lowercase().contains(term)
        || note.body.to_lowercase().contains(term)
}

//! Reminder scheduling boundary.
//!
//! Reminder delivery belongs to a platform collaborator (local notifications
//! on mobile, a desktop daemon). The core only shapes the request and treats
//! scheduling failure as non-fatal to whatever flow asked for it.

use serde::{Deserialize, Serialize};

use crate::models::{Note, NoteId};

/// A request to surface a note again at a later time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderRequest {
    pub note_id: NoteId,
    pub title: String,
    /// Delivery time (Unix ms).
    pub trigger_at: i64,
}

impl ReminderRequest {
    /// Build a reminder for an existing note.
    #[must_use]
    pub fn for_note(note: &Note, trigger_at: i64) -> Self {
        Self {
            note_id: note.id,
            title: note.title.clone(),
            trigger_at,
        }
    }
}

/// Collaborator that hands reminder requests to the platform.
#[allow(async_fn_in_trait)]
pub trait ReminderScheduler {
    async fn schedule(&self, request: ReminderRequest) -> std::result::Result<(), String>;
}

/// Schedule a reminder, logging (never propagating) scheduler failures.
pub async fn schedule_reminder<S: ReminderScheduler>(scheduler: &S, request: ReminderRequest) {
    let note_id = request.note_id;
    if let Err(error) = scheduler.schedule(request).await {
        tracing::warn!(%note_id, %error, "failed to schedule reminder");
    }
}

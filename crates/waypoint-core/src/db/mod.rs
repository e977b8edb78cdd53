//! Database layer for Waypoint

mod connection;
mod migrations;
mod repository;

pub use connection::Database;
pub use repository::{
    LibSqlNoteRepository, NewAttachment, NewNote, NoteChanges, NoteRepository,
    MAX_ATTACHMENTS_PER_NOTE,
};

//! Note repository implementation

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use libsql::{params, Connection, Value};
use tokio::sync::watch;

use crate::error::{Error, Result};
use crate::media::{MediaStore, StoredMedia};
use crate::models::{
    validate_title, Attachment, AttachmentId, Coordinate, MediaKind, MediaRef, Note, NoteId,
};
use crate::util::next_edit_timestamp;

/// Fixed per-note attachment cap.
pub const MAX_ATTACHMENTS_PER_NOTE: usize = 6;

/// Attachment payload received from the picker boundary.
#[derive(Debug, Clone)]
pub enum NewAttachment {
    /// Raw image bytes as handed over by the system picker. The declared
    /// kind is trusted; undecodable bytes only cost the thumbnail.
    Image { bytes: Vec<u8> },
    /// Path to a video file to copy into the managed media area.
    Video { source: PathBuf },
}

/// Input for creating a note.
#[derive(Debug, Clone, Default)]
pub struct NewNote {
    pub title: String,
    pub body: String,
    pub coordinate: Option<Coordinate>,
    pub attachments: Vec<NewAttachment>,
}

/// Field changes applied by `update`. `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct NoteChanges {
    pub title: Option<String>,
    pub body: Option<String>,
    /// `Some(None)` clears the geotag, `Some(Some(c))` replaces it.
    pub coordinate: Option<Option<Coordinate>>,
    pub add_attachments: Vec<NewAttachment>,
    pub remove_attachments: Vec<AttachmentId>,
}

/// Trait for note storage operations (async)
#[allow(async_fn_in_trait)]
pub trait NoteRepository {
    /// Create a new note with its attachments as one logical unit
    async fn create(&self, input: NewNote) -> Result<Note>;

    /// Get a note by ID
    async fn get(&self, id: &NoteId) -> Result<Note>;

    /// List all notes in insertion order; display ordering is the query
    /// engine's job
    async fn list(&self) -> Result<Vec<Note>>;

    /// Apply field changes to a note, refreshing `updated_at`
    async fn update(&self, id: &NoteId, changes: NoteChanges) -> Result<Note>;

    /// Delete a note, its attachments, and their backing media
    async fn delete(&self, id: &NoteId) -> Result<()>;

    /// Watch the latest committed note snapshot without polling
    fn subscribe(&self) -> watch::Receiver<Vec<Note>>;
}

/// libSQL implementation of `NoteRepository`
///
/// Locking: a registry of per-note mutexes serializes mutations to one note
/// id without cross-blocking other ids, while a single connection mutex
/// keeps statement batches from interleaving inside an open transaction.
/// Media I/O (the long-running part) runs outside the connection mutex.
pub struct LibSqlNoteRepository {
    conn: tokio::sync::Mutex<Connection>,
    media: MediaStore,
    note_locks: Mutex<HashMap<NoteId, Arc<tokio::sync::Mutex<()>>>>,
    snapshot: watch::Sender<Vec<Note>>,
}

impl LibSqlNoteRepository {
    /// Create a repository over an open connection and media store.
    ///
    /// Publishes the initial snapshot so subscribers start from committed
    /// state rather than an empty placeholder.
    pub async fn new(conn: Connection, media: MediaStore) -> Result<Self> {
        let initial = load_all(&conn).await?;
        let (snapshot, _) = watch::channel(initial);
        Ok(Self {
            conn: tokio::sync::Mutex::new(conn),
            media,
            note_locks: Mutex::new(HashMap::new()),
            snapshot,
        })
    }

    /// Media store used for attachment payloads.
    pub const fn media(&self) -> &MediaStore {
        &self.media
    }

    /// Mutex serializing mutations to one note id. Different ids get
    /// different mutexes and never cross-block.
    fn note_lock(&self, id: &NoteId) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .note_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        locks.entry(*id).or_default().clone()
    }

    /// Persist each attachment input through the media store, tracking the
    /// stored refs in `staged` so they roll back if the operation dies
    /// before commit.
    async fn stage_attachments(
        &self,
        note_id: NoteId,
        inputs: &[NewAttachment],
        staged: &mut StagedMedia<'_>,
    ) -> Result<Vec<Attachment>> {
        let mut attachments = Vec::with_capacity(inputs.len());
        for input in inputs {
            let (kind, stored) = match input {
                NewAttachment::Image { bytes } => {
                    (MediaKind::Image, self.media.store_image(bytes).await?)
                }
                NewAttachment::Video { source } => {
                    (MediaKind::Video, self.media.store_video(source).await?)
                }
            };
            let StoredMedia { media, thumbnail } = stored;
            staged.track(media.clone());
            attachments.push(Attachment::new(note_id, kind, media, thumbnail));
        }
        Ok(attachments)
    }

    /// Finish an open transaction and publish the fresh snapshot before
    /// releasing the connection, so snapshots land in commit order.
    async fn commit_and_publish(&self, conn: &Connection, outcome: Result<()>) -> Result<()> {
        match outcome {
            Ok(()) => {
                if let Err(e) = conn.execute("COMMIT", ()).await {
                    conn.execute("ROLLBACK", ()).await.ok();
                    return Err(e.into());
                }
            }
            Err(e) => {
                conn.execute("ROLLBACK", ()).await.ok();
                return Err(e);
            }
        }

        let notes = load_all(conn).await?;
        self.snapshot.send_replace(notes);
        Ok(())
    }
}

impl NoteRepository for LibSqlNoteRepository {
    async fn create(&self, input: NewNote) -> Result<Note> {
        let mut note = Note::new(input.title, input.body, input.coordinate)?;
        if input.attachments.len() > MAX_ATTACHMENTS_PER_NOTE {
            return Err(Error::Validation(format!(
                "A note can hold at most {MAX_ATTACHMENTS_PER_NOTE} attachments"
            )));
        }

        // Media lands before the records commit; the guard rolls written
        // files back if anything below fails or the call is cancelled.
        let mut staged = StagedMedia::new(&self.media);
        note.attachments = self
            .stage_attachments(note.id, &input.attachments, &mut staged)
            .await?;

        let lock = self.note_lock(&note.id);
        let _guard = lock.lock().await;

        let conn = self.conn.lock().await;
        conn.execute("BEGIN IMMEDIATE", ()).await?;
        let outcome = insert_note_rows(&conn, &note).await;
        self.commit_and_publish(&conn, outcome).await?;
        staged.keep();

        Ok(note)
    }

    async fn get(&self, id: &NoteId) -> Result<Note> {
        let conn = self.conn.lock().await;
        fetch_note(&conn, id)
            .await?
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    async fn list(&self) -> Result<Vec<Note>> {
        let conn = self.conn.lock().await;
        load_all(&conn).await
    }

    async fn update(&self, id: &NoteId, changes: NoteChanges) -> Result<Note> {
        let lock = self.note_lock(id);
        let _guard = lock.lock().await;

        let mut note = {
            let conn = self.conn.lock().await;
            fetch_note(&conn, id)
                .await?
                .ok_or_else(|| Error::NotFound(id.to_string()))?
        };

        for attachment_id in &changes.remove_attachments {
            if !note.attachments.iter().any(|a| a.id == *attachment_id) {
                return Err(Error::NotFound(attachment_id.to_string()));
            }
        }
        let remaining = note
            .attachments
            .len()
            .saturating_sub(changes.remove_attachments.len())
            + changes.add_attachments.len();
        if remaining > MAX_ATTACHMENTS_PER_NOTE {
            return Err(Error::Validation(format!(
                "A note can hold at most {MAX_ATTACHMENTS_PER_NOTE} attachments"
            )));
        }

        // Field validation happens before any media lands on disk.
        if let Some(title) = changes.title {
            note.title = validate_title(title)?;
        }
        if let Some(body) = changes.body {
            note.body = body;
        }
        if let Some(coordinate) = changes.coordinate {
            note.coordinate = coordinate;
        }
        note.updated_at = next_edit_timestamp(note.updated_at);

        let mut staged = StagedMedia::new(&self.media);
        let added = self
            .stage_attachments(note.id, &changes.add_attachments, &mut staged)
            .await?;

        {
            let conn = self.conn.lock().await;
            conn.execute("BEGIN IMMEDIATE", ()).await?;
            let outcome =
                apply_update_rows(&conn, &note, &added, &changes.remove_attachments).await;
            self.commit_and_publish(&conn, outcome).await?;
        }
        staged.keep();

        // Backing media for removed attachments goes after the commit;
        // a failed unlink only leaves an orphan file, never a broken note.
        let (removed, kept): (Vec<_>, Vec<_>) = note
            .attachments
            .into_iter()
            .partition(|a| changes.remove_attachments.contains(&a.id));
        for attachment in &removed {
            if let Err(error) = self.media.delete(&attachment.media) {
                tracing::warn!(attachment = %attachment.id, %error, "failed to delete removed attachment media");
            }
        }
        note.attachments = kept;
        note.attachments.extend(added);

        Ok(note)
    }

    async fn delete(&self, id: &NoteId) -> Result<()> {
        let lock = self.note_lock(id);
        let _guard = lock.lock().await;

        let note = {
            let conn = self.conn.lock().await;
            fetch_note(&conn, id)
                .await?
                .ok_or_else(|| Error::NotFound(id.to_string()))?
        };

        // Backing media goes first so records never outlive their bytes;
        // individual unlink failures are logged, not fatal.
        for attachment in &note.attachments {
            if let Err(error) = self.media.delete(&attachment.media) {
                tracing::warn!(attachment = %attachment.id, %error, "failed to delete attachment media");
            }
        }

        let conn = self.conn.lock().await;
        conn.execute("BEGIN IMMEDIATE", ()).await?;
        let outcome = delete_note_rows(&conn, id).await;
        self.commit_and_publish(&conn, outcome).await?;

        Ok(())
    }

    fn subscribe(&self) -> watch::Receiver<Vec<Note>> {
        self.snapshot.subscribe()
    }
}

/// Media refs written ahead of a commit. Dropping the guard without
/// [`StagedMedia::keep`] deletes the backing files, so a failed or cancelled
/// operation never leaks partial artifacts.
struct StagedMedia<'a> {
    media: &'a MediaStore,
    staged: Vec<MediaRef>,
}

impl<'a> StagedMedia<'a> {
    const fn new(media: &'a MediaStore) -> Self {
        Self {
            media,
            staged: Vec::new(),
        }
    }

    fn track(&mut self, media_ref: MediaRef) {
        self.staged.push(media_ref);
    }

    /// The records committed; the staged media is now owned by them.
    fn keep(mut self) {
        self.staged.clear();
    }
}

impl Drop for StagedMedia<'_> {
    fn drop(&mut self) {
        for media_ref in &self.staged {
            if let Err(error) = self.media.delete(media_ref) {
                tracing::warn!(%error, "failed to roll back staged media");
            }
        }
    }
}

async fn insert_note_row(conn: &Connection, note: &Note) -> Result<()> {
    let (latitude, longitude) = coordinate_values(note.coordinate);
    conn.execute(
        "INSERT INTO notes (id, title, body, created_at, updated_at, latitude, longitude)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
        params![
            note.id.as_str(),
            note.title.clone(),
            note.body.clone(),
            note.created_at,
            note.updated_at,
            latitude,
            longitude
        ],
    )
    .await?;
    Ok(())
}

async fn insert_attachment_row(conn: &Connection, attachment: &Attachment) -> Result<()> {
    let (file_name, inline_data) = match &attachment.media {
        MediaRef::File(name) => (Value::Text(name.clone()), Value::Null),
        MediaRef::Inline(bytes) => (Value::Null, Value::Blob(bytes.clone())),
    };
    let thumbnail = attachment
        .thumbnail
        .as_ref()
        .map_or(Value::Null, |bytes| Value::Blob(bytes.clone()));

    conn.execute(
        "INSERT INTO attachments (id, note_id, kind, file_name, inline_data, thumbnail, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
        params![
            attachment.id.as_str(),
            attachment.note_id.as_str(),
            attachment.kind.as_str(),
            file_name,
            inline_data,
            thumbnail,
            attachment.created_at
        ],
    )
    .await?;
    Ok(())
}

async fn insert_note_rows(conn: &Connection, note: &Note) -> Result<()> {
    insert_note_row(conn, note).await?;
    for attachment in &note.attachments {
        insert_attachment_row(conn, attachment).await?;
    }
    Ok(())
}

async fn apply_update_rows(
    conn: &Connection,
    note: &Note,
    added: &[Attachment],
    removed: &[AttachmentId],
) -> Result<()> {
    let (latitude, longitude) = coordinate_values(note.coordinate);
    let rows = conn
        .execute(
            "UPDATE notes SET title = ?, body = ?, latitude = ?, longitude = ?, updated_at = ?
             WHERE id = ?",
            params![
                note.title.clone(),
                note.body.clone(),
                latitude,
                longitude,
                note.updated_at,
                note.id.as_str()
            ],
        )
        .await?;
    if rows == 0 {
        return Err(Error::NotFound(note.id.to_string()));
    }

    for attachment_id in removed {
        conn.execute(
            "DELETE FROM attachments WHERE id = ? AND note_id = ?",
            params![attachment_id.as_str(), note.id.as_str()],
        )
        .await?;
    }
    for attachment in added {
        insert_attachment_row(conn, attachment).await?;
    }
    Ok(())
}

async fn delete_note_rows(conn: &Connection, id: &NoteId) -> Result<()> {
    conn.execute(
        "DELETE FROM attachments WHERE note_id = ?",
        params![id.as_str()],
    )
    .await?;
    let rows = conn
        .execute("DELETE FROM notes WHERE id = ?", params![id.as_str()])
        .await?;
    if rows == 0 {
        return Err(Error::NotFound(id.to_string()));
    }
    Ok(())
}

async fn fetch_note(conn: &Connection, id: &NoteId) -> Result<Option<Note>> {
    let mut rows = conn
        .query(
            "SELECT id, title, body, created_at, updated_at, latitude, longitude
             FROM notes WHERE id = ?",
            params![id.as_str()],
        )
        .await?;

    let Some(row) = rows.next().await? else {
        return Ok(None);
    };
    let mut note = parse_note_row(&row)?;
    note.attachments = fetch_attachments(conn, id).await?;
    Ok(Some(note))
}

async fn fetch_attachments(conn: &Connection, id: &NoteId) -> Result<Vec<Attachment>> {
    let mut rows = conn
        .query(
            "SELECT id, note_id, kind, file_name, inline_data, thumbnail, created_at
             FROM attachments WHERE note_id = ?
             ORDER BY created_at, id",
            params![id.as_str()],
        )
        .await?;

    let mut attachments = Vec::new();
    while let Some(row) = rows.next().await? {
        attachments.push(parse_attachment_row(&row)?);
    }
    Ok(attachments)
}

async fn load_all(conn: &Connection) -> Result<Vec<Note>> {
    let mut rows = conn
        .query(
            "SELECT id, title, body, created_at, updated_at, latitude, longitude
             FROM notes ORDER BY rowid",
            (),
        )
        .await?;

    let mut notes = Vec::new();
    while let Some(row) = rows.next().await? {
        notes.push(parse_note_row(&row)?);
    }

    let mut rows = conn
        .query(
            "SELECT id, note_id, kind, file_name, inline_data, thumbnail, created_at
             FROM attachments ORDER BY created_at, id",
            (),
        )
        .await?;

    let mut by_note: HashMap<NoteId, Vec<Attachment>> = HashMap::new();
    while let Some(row) = rows.next().await? {
        let attachment = parse_attachment_row(&row)?;
        by_note
            .entry(attachment.note_id)
            .or_default()
            .push(attachment);
    }

    for note in &mut notes {
        note.attachments = by_note.remove(&note.id).unwrap_or_default();
    }
    Ok(notes)
}

fn coordinate_values(coordinate: Option<Coordinate>) -> (Value, Value) {
    coordinate.map_or((Value::Null, Value::Null), |c| {
        (Value::Real(c.latitude), Value::Real(c.longitude))
    })
}

fn opt_real(row: &libsql::Row, idx: i32) -> Result<Option<f64>> {
    match row.get_value(idx)? {
        Value::Null => Ok(None),
        Value::Real(value) => Ok(Some(value)),
        #[allow(clippy::cast_precision_loss)]
        Value::Integer(value) => Ok(Some(value as f64)),
        other => Err(Error::Validation(format!(
            "Expected numeric column, got {other:?}"
        ))),
    }
}

fn opt_text(row: &libsql::Row, idx: i32) -> Result<Option<String>> {
    match row.get_value(idx)? {
        Value::Null => Ok(None),
        Value::Text(value) => Ok(Some(value)),
        other => Err(Error::Validation(format!(
            "Expected text column, got {other:?}"
        ))),
    }
}

fn opt_blob(row: &libsql::Row, idx: i32) -> Result<Option<Vec<u8>>> {
    match row.get_value(idx)? {
        Value::Null => Ok(None),
        Value::Blob(value) => Ok(Some(value)),
        other => Err(Error::Validation(format!(
            "Expected blob column, got {other:?}"
        ))),
    }
}

/// Parse a note from a database row (without attachments)
fn parse_note_row(row: &libsql::Row) -> Result<Note> {
    let id: String = row.get(0)?;
    let latitude = opt_real(row, 5)?;
    let longitude = opt_real(row, 6)?;
    // Both-or-neither: a half-written pair reads as untagged.
    let coordinate = match (latitude, longitude) {
        (Some(latitude), Some(longitude)) => Some(Coordinate {
            latitude,
            longitude,
        }),
        _ => None,
    };

    Ok(Note {
        id: id.parse().unwrap_or_default(),
        title: row.get(1)?,
        body: row.get(2)?,
        created_at: row.get(3)?,
        updated_at: row.get(4)?,
        coordinate,
        attachments: Vec::new(),
    })
}

/// Parse an attachment from a database row
fn parse_attachment_row(row: &libsql::Row) -> Result<Attachment> {
    let id: String = row.get(0)?;
    let note_id: String = row.get(1)?;
    let kind: String = row.get(2)?;
    let file_name = opt_text(row, 3)?;
    let inline_data = opt_blob(row, 4)?;

    let media = match file_name {
        Some(name) => MediaRef::File(name),
        None => MediaRef::Inline(inline_data.unwrap_or_default()),
    };

    Ok(Attachment {
        id: id.parse().unwrap_or_default(),
        note_id: note_id.parse().unwrap_or_default(),
        kind: MediaKind::from_stored(&kind),
        media,
        thumbnail: opt_blob(row, 5)?,
        created_at: row.get(6)?,
    })
}

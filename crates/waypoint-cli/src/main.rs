//! Waypoint CLI - Capture geotagged notes from the command line
//!
//! Quick capture with minimal friction, plus listing, search, editing,
//! sharing, and JSON export.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::aot::Generator;
use clap_complete::{generate, shells};
use thiserror::Error;
use waypoint_core::db::{
    Database, LibSqlNoteRepository, NewAttachment, NewNote, NoteChanges, NoteRepository,
};
use waypoint_core::export::{render_json_export, share_text, suggested_export_file_name};
use waypoint_core::media::MediaStore;
use waypoint_core::query::{project, SortOrder};
use waypoint_core::{AttachmentId, Coordinate, Note, NoteId};

#[derive(Parser)]
#[command(name = "waypoint")]
#[command(about = "Capture geotagged notes with photos and videos")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Optional path to local database file
    #[arg(long, value_name = "PATH", global = true)]
    db_path: Option<PathBuf>,

    /// Quick capture: waypoint "note title here"
    #[arg(trailing_var_arg = true)]
    title: Vec<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new note
    #[command(alias = "new")]
    Add {
        /// Note title
        title: Vec<String>,
        /// Body text
        #[arg(short, long)]
        body: Option<String>,
        /// Attach an image file (repeatable)
        #[arg(long, value_name = "PATH")]
        photo: Vec<PathBuf>,
        /// Attach a video file (repeatable)
        #[arg(long, value_name = "PATH")]
        video: Vec<PathBuf>,
        /// Geotag as "LAT,LON"
        #[arg(long, value_name = "LAT,LON")]
        location: Option<String>,
    },
    /// List notes
    List {
        /// Filter by a search term
        #[arg(short, long)]
        search: Option<String>,
        /// Sort order by creation time
        #[arg(long, value_enum, default_value_t = SortArg::Desc)]
        sort: SortArg,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Search notes
    Search {
        /// Search query
        query: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show a single note
    Show {
        /// Note ID or unique ID prefix
        id: String,
    },
    /// Edit an existing note
    Edit {
        /// Note ID or unique ID prefix
        id: String,
        /// New title
        #[arg(long)]
        title: Option<String>,
        /// New body text
        #[arg(long)]
        body: Option<String>,
        /// Attach an image file (repeatable)
        #[arg(long, value_name = "PATH")]
        photo: Vec<PathBuf>,
        /// Attach a video file (repeatable)
        #[arg(long, value_name = "PATH")]
        video: Vec<PathBuf>,
        /// Remove an attachment by ID (repeatable)
        #[arg(long, value_name = "ATTACHMENT_ID")]
        remove_attachment: Vec<String>,
        /// Set the geotag as "LAT,LON"
        #[arg(long, value_name = "LAT,LON", conflicts_with = "clear_location")]
        location: Option<String>,
        /// Remove the geotag
        #[arg(long)]
        clear_location: bool,
    },
    /// Delete an existing note
    Delete {
        /// Note ID or unique ID prefix
        id: String,
    },
    /// Print the share summary for a note
    Share {
        /// Note ID or unique ID prefix
        id: String,
    },
    /// Export a note as JSON
    Export {
        /// Note ID or unique ID prefix
        id: String,
        /// Optional output path (stdout when omitted); directories get a
        /// generated file name
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Core(#[from] waypoint_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("No note title provided")]
    EmptyTitle,
    #[error("Note ID cannot be empty")]
    EmptyNoteId,
    #[error("Search query cannot be empty")]
    EmptySearchQuery,
    #[error("Invalid location '{0}', expected \"LAT,LON\"")]
    InvalidLocation(String),
    #[error("Invalid attachment ID: {0}")]
    InvalidAttachmentId(String),
    #[error("Note not found for id/prefix: {0}")]
    NoteNotFound(String),
    #[error("{0}")]
    AmbiguousNoteId(String),
    #[error("Could not determine a data directory; pass --db-path")]
    DataDirUnavailable,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
enum SortArg {
    Asc,
    Desc,
}

impl From<SortArg> for SortOrder {
    fn from(value: SortArg) -> Self {
        match value {
            SortArg::Asc => Self::CreatedAsc,
            SortArg::Desc => Self::CreatedDesc,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("waypoint=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();
    let db_path = resolve_db_path(cli.db_path)?;
    tracing::debug!(path = %db_path.display(), "using database");

    match cli.command {
        Some(Commands::Add {
            title,
            body,
            photo,
            video,
            location,
        }) => {
            run_add(
                &title,
                body.as_deref(),
                &photo,
                &video,
                location.as_deref(),
                &db_path,
            )
            .await?;
        }
        Some(Commands::List { search, sort, json }) => {
            run_list(search.as_deref().unwrap_or(""), sort.into(), json, &db_path).await?;
        }
        Some(Commands::Search { query, json }) => {
            let query = normalize_search_query(&query)?;
            run_list(&query, SortOrder::CreatedDesc, json, &db_path).await?;
        }
        Some(Commands::Show { id }) => run_show(&id, &db_path).await?,
        Some(Commands::Edit {
            id,
            title,
            body,
            photo,
            video,
            remove_attachment,
            location,
            clear_location,
        }) => {
            let coordinate = if clear_location {
                Some(None)
            } else {
                location
                    .as_deref()
                    .map(parse_location)
                    .transpose()?
                    .map(Some)
            };
            run_edit(
                &id,
                NoteChanges {
                    title,
                    body,
                    coordinate,
                    add_attachments: read_attachment_inputs(&photo, &video)?,
                    remove_attachments: parse_attachment_ids(&remove_attachment)?,
                },
                &db_path,
            )
            .await?;
        }
        Some(Commands::Delete { id }) => run_delete(&id, &db_path).await?,
        Some(Commands::Share { id }) => run_share(&id, &db_path).await?,
        Some(Commands::Export { id, output }) => {
            run_export(&id, output.as_deref(), &db_path).await?;
        }
        Some(Commands::Completions { shell, output }) => {
            run_completions(shell, output.as_deref())?;
        }
        None => {
            // Quick capture mode: waypoint "my note"
            if cli.title.is_empty() {
                Cli::command().print_help().map_err(CliError::Io)?;
                println!();
            } else {
                run_add(&cli.title, None, &[], &[], None, &db_path).await?;
            }
        }
    }

    Ok(())
}

async fn run_add(
    title_parts: &[String],
    body: Option<&str>,
    photos: &[PathBuf],
    videos: &[PathBuf],
    location: Option<&str>,
    db_path: &Path,
) -> Result<(), CliError> {
    let title = title_parts.join(" ");
    if title.trim().is_empty() {
        return Err(CliError::EmptyTitle);
    }
    let coordinate = location.map(parse_location).transpose()?;
    let attachments = read_attachment_inputs(photos, videos)?;

    let (_db, repo) = open_repository(db_path).await?;
    let note = repo
        .create(NewNote {
            title,
            body: body.unwrap_or_default().to_string(),
            coordinate,
            attachments,
        })
        .await?;

    println!("{}", note.id);
    Ok(())
}

async fn run_list(
    search: &str,
    order: SortOrder,
    as_json: bool,
    db_path: &Path,
) -> Result<(), CliError> {
    let (_db, repo) = open_repository(db_path).await?;
    let notes = project(&repo.list().await?, search, order);

    if as_json {
        let items = notes.iter().map(note_to_list_item).collect::<Vec<_>>();
        println!("{}", serde_json::to_string_pretty(&items)?);
    } else {
        for line in format_note_lines(&notes) {
            println!("{line}");
        }
    }
    Ok(())
}

async fn run_show(id: &str, db_path: &Path) -> Result<(), CliError> {
    let (_db, repo) = open_repository(db_path).await?;
    let note = resolve_note(&repo, id).await?;

    println!("{}", note.title);
    if !note.body.is_empty() {
        println!("\n{}", note.body);
    }
    if let Some(coordinate) = note.coordinate {
        println!(
            "\nLocation: {}, {}",
            coordinate.latitude, coordinate.longitude
        );
    }
    for attachment in &note.attachments {
        let preview = if attachment.has_thumbnail() {
            "preview ready"
        } else {
            "no preview"
        };
        println!("[{}] {} ({preview})", attachment.kind, attachment.id);
    }
    println!("\nCreated: {}", format_timestamp(note.created_at));
    println!("Updated: {}", format_timestamp(note.updated_at));
    Ok(())
}

async fn run_edit(id: &str, changes: NoteChanges, db_path: &Path) -> Result<(), CliError> {
    let (_db, repo) = open_repository(db_path).await?;
    let note = resolve_note(&repo, id).await?;

    let updated = repo.update(&note.id, changes).await?;
    println!("{}", updated.id);
    Ok(())
}

async fn run_delete(id: &str, db_path: &Path) -> Result<(), CliError> {
    let (_db, repo) = open_repository(db_path).await?;
    let note = resolve_note(&repo, id).await?;

    repo.delete(&note.id).await?;
    println!("{}", note.id);
    Ok(())
}

async fn run_share(id: &str, db_path: &Path) -> Result<(), CliError> {
    let (_db, repo) = open_repository(db_path).await?;
    let note = resolve_note(&repo, id).await?;
    println!("{}", share_text(&note));
    Ok(())
}

async fn run_export(
    id: &str,
    output_path: Option<&Path>,
    db_path: &Path,
) -> Result<(), CliError> {
    let (_db, repo) = open_repository(db_path).await?;
    let note = resolve_note(&repo, id).await?;
    let rendered = render_json_export(&note)?;

    if let Some(path) = output_path {
        let path = if path.is_dir() {
            path.join(suggested_export_file_name(&note))
        } else {
            path.to_path_buf()
        };
        std::fs::write(&path, rendered)?;
        println!("{}", path.display());
    } else {
        println!("{rendered}");
    }
    Ok(())
}

fn run_completions(shell: CompletionShell, output_path: Option<&Path>) -> Result<(), CliError> {
    let mut command = Cli::command();
    let mut buffer = Vec::new();

    match shell {
        CompletionShell::Bash => generate_for_shell(shells::Bash, &mut command, &mut buffer),
        CompletionShell::Zsh => generate_for_shell(shells::Zsh, &mut command, &mut buffer),
        CompletionShell::Fish => generate_for_shell(shells::Fish, &mut command, &mut buffer),
    }

    if let Some(path) = output_path {
        std::fs::write(path, &buffer)?;
        println!("{}", path.display());
    } else {
        io::stdout().write_all(&buffer)?;
    }

    Ok(())
}

fn generate_for_shell<G: Generator>(
    generator: G,
    command: &mut clap::Command,
    buffer: &mut Vec<u8>,
) {
    generate(generator, command, "waypoint", buffer);
}

/// Resolve the database file: flag, then env, then the platform data dir.
fn resolve_db_path(flag: Option<PathBuf>) -> Result<PathBuf, CliError> {
    if let Some(path) = flag {
        return Ok(path);
    }
    if let Ok(path) = std::env::var("WAYPOINT_DB_PATH") {
        if !path.trim().is_empty() {
            return Ok(PathBuf::from(path));
        }
    }
    let data_dir = dirs::data_dir().ok_or(CliError::DataDirUnavailable)?;
    Ok(data_dir.join("waypoint").join("waypoint.db"))
}

/// Managed media lives next to the database file.
fn media_dir(db_path: &Path) -> PathBuf {
    db_path
        .parent()
        .map_or_else(|| PathBuf::from("media"), |parent| parent.join("media"))
}

async fn open_repository(db_path: &Path) -> Result<(Database, LibSqlNoteRepository), CliError> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let db = Database::open(db_path).await?;
    let media = MediaStore::new(media_dir(db_path))?;
    let repo = LibSqlNoteRepository::new(db.connection().clone(), media).await?;
    Ok((db, repo))
}

/// Resolve a note by full ID or unique ID prefix.
async fn resolve_note(repo: &LibSqlNoteRepository, note_query: &str) -> Result<Note, CliError> {
    let note_query = normalize_note_identifier(note_query)?;

    if let Ok(note_id) = note_query.parse::<NoteId>() {
        if let Ok(note) = repo.get(&note_id).await {
            return Ok(note);
        }
    }

    let mut matches: Vec<Note> = repo
        .list()
        .await?
        .into_iter()
        .filter(|note| note.id.to_string().starts_with(&note_query))
        .collect();

    if matches.is_empty() {
        return Err(CliError::NoteNotFound(note_query));
    }
    if matches.len() > 1 {
        let options = matches
            .iter()
            .take(3)
            .map(|note| note.id.to_string().chars().take(13).collect::<String>())
            .collect::<Vec<_>>()
            .join(", ");
        return Err(CliError::AmbiguousNoteId(format!(
            "ID prefix '{note_query}' is ambiguous; matches: {options}"
        )));
    }
    Ok(matches.swap_remove(0))
}

fn read_attachment_inputs(
    photos: &[PathBuf],
    videos: &[PathBuf],
) -> Result<Vec<NewAttachment>, CliError> {
    let mut inputs = Vec::with_capacity(photos.len() + videos.len());
    for photo in photos {
        inputs.push(NewAttachment::Image {
            bytes: std::fs::read(photo)?,
        });
    }
    for video in videos {
        inputs.push(NewAttachment::Video {
            source: video.clone(),
        });
    }
    Ok(inputs)
}

fn parse_attachment_ids(raw: &[String]) -> Result<Vec<AttachmentId>, CliError> {
    raw.iter()
        .map(|value| {
            value
                .parse::<AttachmentId>()
                .map_err(|_| CliError::InvalidAttachmentId(value.clone()))
        })
        .collect()
}

/// Parse a "LAT,LON" argument into a validated coordinate.
fn parse_location(raw: &str) -> Result<Coordinate, CliError> {
    let invalid = || CliError::InvalidLocation(raw.to_string());

    let (latitude, longitude) = raw.split_once(',').ok_or_else(invalid)?;
    let latitude: f64 = latitude.trim().parse().map_err(|_| invalid())?;
    let longitude: f64 = longitude.trim().parse().map_err(|_| invalid())?;

    Coordinate::new(latitude, longitude).map_err(|_| invalid())
}

#[derive(Debug, serde::Serialize)]
struct NoteListItem {
    id: String,
    title: String,
    body: String,
    created_at: i64,
    updated_at: i64,
    relative_time: String,
    location: Option<String>,
    attachment_count: usize,
}

fn note_to_list_item(note: &Note) -> NoteListItem {
    let now_ms = chrono::Utc::now().timestamp_millis();
    NoteListItem {
        id: note.id.to_string(),
        title: note.title.clone(),
        body: note.body.clone(),
        created_at: note.created_at,
        updated_at: note.updated_at,
        relative_time: format_relative_time(note.created_at, now_ms),
        location: note
            .coordinate
            .map(|c| format!("{}, {}", c.latitude, c.longitude)),
        attachment_count: note.attachments.len(),
    }
}

fn format_note_lines(notes: &[Note]) -> Vec<String> {
    let now_ms = chrono::Utc::now().timestamp_millis();
    notes
        .iter()
        .map(|note| {
            let id = note.id.to_string();
            let short_id = id.chars().take(13).collect::<String>();
            let title = truncate_title(&note.title, 32);
            let relative_time = format_relative_time(note.created_at, now_ms);
            let markers = note_markers(note);

            if markers.is_empty() {
                format!("{short_id:<13}  {title:<32}  {relative_time}")
            } else {
                format!("{short_id:<13}  {title:<32}  {relative_time:<10}  {markers}")
            }
        })
        .collect()
}

fn note_markers(note: &Note) -> String {
    let mut markers = Vec::new();
    if !note.attachments.is_empty() {
        markers.push(format!("{} media", note.attachments.len()));
    }
    if note.has_location() {
        markers.push("geo".to_string());
    }
    markers.join(", ")
}

fn truncate_title(title: &str, max_chars: usize) -> String {
    if title.chars().count() <= max_chars {
        return title.to_string();
    }
    let take_len = max_chars.saturating_sub(3);
    let mut truncated = title.chars().take(take_len).collect::<String>();
    truncated.push_str("...");
    truncated
}

fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else {
        format_timestamp(timestamp_ms)
            .split(' ')
            .next()
            .unwrap_or_default()
            .to_string()
    }
}

fn format_timestamp(timestamp_ms: i64) -> String {
    chrono::DateTime::<chrono::Utc>::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |ts| ts.format("%Y-%m-%d %H:%M").to_string(),
    )
}

fn normalize_search_query(query: &str) -> Result<String, CliError> {
    let trimmed = query.trim();
    if trimmed.is_empty() {
        Err(CliError::EmptySearchQuery)
    } else {
        Ok(trimmed.to_string())
    }
}

fn normalize_note_identifier(id: &str) -> Result<String, CliError> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        Err(CliError::EmptyNoteId)
    } else {
        Ok(trimmed.to_string())
    }
}

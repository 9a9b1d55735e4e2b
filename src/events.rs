use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use std::fmt;
use std::str::FromStr;

use crate::{
    time::now_ms,
    validation::{self, nullable},
    AppError, AppResult,
};

pub const EVENTS_AREA: &str = "EVENTS";
pub const DEFAULT_COVER_IMAGE: &str = "default_cover_image_url";
pub const COPY_SUFFIX: &str = " - Copy";

const EVENT_COLUMNS: &str = "id, organizer_id, title, description, status, event_type, \
     start_time, end_time, location, online_url, cover_image, created_at, updated_at";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventStatus {
    Draft,
    Pending,
    Published,
    Ended,
    Cancelled,
}

impl EventStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            EventStatus::Draft => "DRAFT",
            EventStatus::Pending => "PENDING",
            EventStatus::Published => "PUBLISHED",
            EventStatus::Ended => "ENDED",
            EventStatus::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DRAFT" => Ok(EventStatus::Draft),
            "PENDING" => Ok(EventStatus::Pending),
            "PUBLISHED" => Ok(EventStatus::Published),
            "ENDED" => Ok(EventStatus::Ended),
            "CANCELLED" => Ok(EventStatus::Cancelled),
            other => Err(AppError::new("EVENTS/DECODE", "Unknown event status")
                .with_context("value", other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    Offline,
    Online,
}

impl EventType {
    pub const fn as_str(self) -> &'static str {
        match self {
            EventType::Offline => "OFFLINE",
            EventType::Online => "ONLINE",
        }
    }
}

impl FromStr for EventType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OFFLINE" => Ok(EventType::Offline),
            "ONLINE" => Ok(EventType::Online),
            other => Err(AppError::new("EVENTS/DECODE", "Unknown event type")
                .with_context("value", other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: i64,
    pub organizer_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub status: EventStatus,
    pub event_type: EventType,
    pub start_time: i64,
    pub end_time: i64,
    pub location: Option<String>,
    pub online_url: Option<String>,
    pub cover_image: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl TryFrom<&SqliteRow> for Event {
    type Error = AppError;

    fn try_from(row: &SqliteRow) -> Result<Self, Self::Error> {
        let status: String = row.try_get("status").map_err(AppError::from)?;
        let event_type: String = row.try_get("event_type").map_err(AppError::from)?;
        Ok(Self {
            id: row.try_get("id").map_err(AppError::from)?,
            organizer_id: row.try_get("organizer_id").map_err(AppError::from)?,
            title: row.try_get("title").map_err(AppError::from)?,
            description: row.try_get("description").map_err(AppError::from)?,
            status: status.parse()?,
            event_type: event_type.parse()?,
            start_time: row.try_get("start_time").map_err(AppError::from)?,
            end_time: row.try_get("end_time").map_err(AppError::from)?,
            location: row.try_get("location").map_err(AppError::from)?,
            online_url: row.try_get("online_url").map_err(AppError::from)?,
            cover_image: row.try_get("cover_image").map_err(AppError::from)?,
            created_at: row.try_get("created_at").map_err(AppError::from)?,
            updated_at: row.try_get("updated_at").map_err(AppError::from)?,
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventCreate {
    #[serde(default)]
    pub title: Option<String>,
}

/// Partial update; fields left out of the body keep their stored value.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EventUpdate {
    #[serde(default, deserialize_with = "nullable")]
    pub title: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub description: Option<Option<String>>,
    #[serde(default)]
    pub status: Option<EventStatus>,
    #[serde(default)]
    pub event_type: Option<EventType>,
    #[serde(default)]
    pub start_time: Option<i64>,
    #[serde(default)]
    pub end_time: Option<i64>,
    #[serde(default, deserialize_with = "nullable")]
    pub location: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub online_url: Option<Option<String>>,
    #[serde(default)]
    pub cover_image: Option<String>,
}

impl EventUpdate {
    fn apply(self, event: &mut Event) -> AppResult<()> {
        match self.title {
            None => {}
            Some(None) => return Err(AppError::missing_field("title")),
            Some(Some(raw)) => {
                if let Some(title) = validation::optional_non_blank(Some(raw.as_str()), "title")? {
                    validation::max_chars(&title, "title", 200)?;
                    event.title = title;
                }
            }
        }
        if let Some(description) = self.description {
            event.description = description;
        }
        if let Some(status) = self.status {
            event.status = status;
        }
        if let Some(event_type) = self.event_type {
            event.event_type = event_type;
        }
        if let Some(start) = self.start_time {
            event.start_time = start;
        }
        if let Some(end) = self.end_time {
            event.end_time = end;
        }
        if let Some(location) = self.location {
            event.location = location;
        }
        if let Some(online_url) = self.online_url {
            event.online_url = online_url;
        }
        if let Some(cover) = validation::optional_non_blank(self.cover_image.as_deref(), "cover_image")? {
            event.cover_image = cover;
        }
        validation::time_range(
            Some(event.start_time),
            Some(event.end_time),
            "start_time",
            "end_time",
        )
    }
}

fn event_not_found(id: i64) -> AppError {
    AppError::not_found(
        EVENTS_AREA,
        "Event not found, or you do not have permission to access it",
    )
    .with_context("event_id", id.to_string())
}

pub async fn list_events(pool: &SqlitePool, organizer_id: i64) -> AppResult<Vec<Event>> {
    let sql = format!(
        "SELECT {EVENT_COLUMNS} FROM events WHERE organizer_id = ? ORDER BY start_time DESC, id DESC"
    );
    let rows = sqlx::query(&sql)
        .bind(organizer_id)
        .fetch_all(pool)
        .await
        .map_err(|err| AppError::from(err).with_context("operation", "events_list"))?;
    rows.iter().map(Event::try_from).collect()
}

/// The event only if it exists and belongs to `organizer_id`.
pub async fn find_event(pool: &SqlitePool, organizer_id: i64, id: i64) -> AppResult<Option<Event>> {
    let sql = format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = ? AND organizer_id = ?");
    let row = sqlx::query(&sql)
        .bind(id)
        .bind(organizer_id)
        .fetch_optional(pool)
        .await
        .map_err(|err| {
            AppError::from(err)
                .with_context("operation", "events_get")
                .with_context("event_id", id.to_string())
        })?;
    row.as_ref().map(Event::try_from).transpose()
}

/// Ownership gate for every organizer route; missing and foreign events look the same.
pub async fn require_event(pool: &SqlitePool, organizer_id: i64, id: i64) -> AppResult<Event> {
    find_event(pool, organizer_id, id)
        .await?
        .ok_or_else(|| event_not_found(id))
}

async fn insert_event(pool: &SqlitePool, event: &Event) -> AppResult<Event> {
    let res = sqlx::query(
        "INSERT INTO events (organizer_id, title, description, status, event_type, start_time, end_time, \
         location, online_url, cover_image, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
    )
    .bind(event.organizer_id)
    .bind(&event.title)
    .bind(&event.description)
    .bind(event.status.as_str())
    .bind(event.event_type.as_str())
    .bind(event.start_time)
    .bind(event.end_time)
    .bind(&event.location)
    .bind(&event.online_url)
    .bind(&event.cover_image)
    .bind(event.created_at)
    .bind(event.updated_at)
    .execute(pool)
    .await
    .map_err(|err| AppError::from(err).with_context("operation", "events_insert"))?;

    let mut created = event.clone();
    created.id = res.last_insert_rowid();
    Ok(created)
}

/// Create a new draft event owned by `organizer_id`.
pub async fn create_draft(
    pool: &SqlitePool,
    organizer_id: i64,
    payload: EventCreate,
) -> AppResult<Event> {
    let title = validation::required_text(payload.title.as_deref(), "title")?;
    validation::max_chars(&title, "title", 200)?;
    let now = now_ms();
    let draft = Event {
        id: 0,
        organizer_id,
        title,
        description: None,
        status: EventStatus::Draft,
        event_type: EventType::Offline,
        start_time: now,
        end_time: now,
        location: None,
        online_url: None,
        cover_image: DEFAULT_COVER_IMAGE.to_string(),
        created_at: now,
        updated_at: now,
    };
    let created = insert_event(pool, &draft).await?;
    tracing::info!(target: "linkup", event = "event_created", event_id = created.id, organizer_id);
    Ok(created)
}

pub async fn update_event(
    pool: &SqlitePool,
    organizer_id: i64,
    id: i64,
    patch: EventUpdate,
) -> AppResult<Event> {
    let mut event = require_event(pool, organizer_id, id).await?;
    patch.apply(&mut event)?;
    event.updated_at = now_ms();

    sqlx::query(
        "UPDATE events SET title = ?1, description = ?2, status = ?3, event_type = ?4, \
         start_time = ?5, end_time = ?6, location = ?7, online_url = ?8, cover_image = ?9, \
         updated_at = ?10 WHERE id = ?11 AND organizer_id = ?12",
    )
    .bind(&event.title)
    .bind(&event.description)
    .bind(event.status.as_str())
    .bind(event.event_type.as_str())
    .bind(event.start_time)
    .bind(event.end_time)
    .bind(&event.location)
    .bind(&event.online_url)
    .bind(&event.cover_image)
    .bind(event.updated_at)
    .bind(id)
    .bind(organizer_id)
    .execute(pool)
    .await
    .map_err(|err| {
        AppError::from(err)
            .with_context("operation", "events_update")
            .with_context("event_id", id.to_string())
    })?;
    Ok(event)
}

pub async fn delete_event(pool: &SqlitePool, organizer_id: i64, id: i64) -> AppResult<()> {
    let res = sqlx::query("DELETE FROM events WHERE id = ? AND organizer_id = ?")
        .bind(id)
        .bind(organizer_id)
        .execute(pool)
        .await
        .map_err(|err| {
            AppError::from(err)
                .with_context("operation", "events_delete")
                .with_context("event_id", id.to_string())
        })?;
    if res.rows_affected() == 0 {
        return Err(event_not_found(id));
    }
    tracing::info!(target: "linkup", event = "event_deleted", event_id = id, organizer_id);
    Ok(())
}

/// Duplicate an event's own columns as a new draft; child rows stay with the source.
pub async fn copy_event(pool: &SqlitePool, organizer_id: i64, id: i64) -> AppResult<Event> {
    let source = require_event(pool, organizer_id, id).await?;
    let now = now_ms();
    let copy = Event {
        id: 0,
        title: format!("{}{}", source.title, COPY_SUFFIX),
        status: EventStatus::Draft,
        created_at: now,
        updated_at: now,
        ..source
    };
    let created = insert_event(pool, &copy).await?;
    tracing::info!(
        target: "linkup",
        event = "event_copied",
        source_id = id,
        event_id = created.id,
        organizer_id
    );
    Ok(created)
}

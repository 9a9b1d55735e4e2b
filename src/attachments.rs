use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};

use crate::{error::map_unique_violation, time::now_ms, validation, AppError, AppResult};

pub const ATTACHMENTS_AREA: &str = "ATTACHMENTS";

const ATTACHMENT_COLUMNS: &str = "id, event_id, file_name, url, mime_type, size_bytes, created_at";
const MAX_FILE_NAME_CHARS: usize = 255;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: i64,
    pub event_id: i64,
    pub file_name: String,
    pub url: String,
    pub mime_type: Option<String>,
    pub size_bytes: Option<i64>,
    pub created_at: i64,
}

impl TryFrom<&SqliteRow> for Attachment {
    type Error = AppError;

    fn try_from(row: &SqliteRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.try_get("id").map_err(AppError::from)?,
            event_id: row.try_get("event_id").map_err(AppError::from)?,
            file_name: row.try_get("file_name").map_err(AppError::from)?,
            url: row.try_get("url").map_err(AppError::from)?,
            mime_type: row.try_get("mime_type").map_err(AppError::from)?,
            size_bytes: row.try_get("size_bytes").map_err(AppError::from)?,
            created_at: row.try_get("created_at").map_err(AppError::from)?,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AttachmentCreate {
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub size_bytes: Option<i64>,
}

fn file_name(raw: Option<&str>) -> AppResult<String> {
    let name = validation::required_text(raw, "file_name")?;
    validation::max_chars(&name, "file_name", MAX_FILE_NAME_CHARS)?;
    if name.contains(['/', '\\']) {
        return Err(AppError::invalid_field(
            "file_name",
            "File names cannot contain path separators",
        )
        .with_context("value", name));
    }
    Ok(name)
}

fn url(raw: Option<&str>) -> AppResult<String> {
    let url = validation::required_text(raw, "url")?;
    if url.split(['/', '\\']).any(|segment| segment == "..") {
        return Err(
            AppError::invalid_field("url", "Attachment URLs cannot contain '..' segments")
                .with_context("value", url),
        );
    }
    Ok(url)
}

/// Explicit MIME type when given, otherwise a guess from the file extension.
fn resolve_mime(explicit: Option<&str>, file_name: &str) -> AppResult<Option<String>> {
    match validation::optional_non_blank(explicit, "mime_type")? {
        Some(mime) => {
            validation::mime_type(&mime, "mime_type")?;
            Ok(Some(mime))
        }
        None => Ok(mime_guess::from_path(file_name)
            .first()
            .map(|m| m.essence_str().to_string())),
    }
}

pub async fn list(pool: &SqlitePool, event_id: i64) -> AppResult<Vec<Attachment>> {
    let sql = format!(
        "SELECT {ATTACHMENT_COLUMNS} FROM event_attachments WHERE event_id = ? \
         ORDER BY created_at DESC, id DESC"
    );
    let rows = sqlx::query(&sql)
        .bind(event_id)
        .fetch_all(pool)
        .await
        .map_err(|err| AppError::from(err).with_context("operation", "attachments_list"))?;
    rows.iter().map(Attachment::try_from).collect()
}

pub async fn create(
    pool: &SqlitePool,
    event_id: i64,
    payload: AttachmentCreate,
) -> AppResult<Attachment> {
    let file_name = file_name(payload.file_name.as_deref())?;
    let url = url(payload.url.as_deref())?;
    let mime_type = resolve_mime(payload.mime_type.as_deref(), &file_name)?;
    if let Some(size) = payload.size_bytes {
        validation::non_negative_i64(size, "size_bytes")?;
    }

    let now = now_ms();
    let res = sqlx::query(
        "INSERT INTO event_attachments (event_id, file_name, url, mime_type, size_bytes, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )
    .bind(event_id)
    .bind(&file_name)
    .bind(&url)
    .bind(&mime_type)
    .bind(payload.size_bytes)
    .bind(now)
    .execute(pool)
    .await
    .map_err(|err| {
        map_unique_violation(
            err,
            ATTACHMENTS_AREA,
            "This file is already attached to the event",
        )
        .with_context("url", url.clone())
    })?;

    Ok(Attachment {
        id: res.last_insert_rowid(),
        event_id,
        file_name,
        url,
        mime_type,
        size_bytes: payload.size_bytes,
        created_at: now,
    })
}

pub async fn delete(pool: &SqlitePool, event_id: i64, id: i64) -> AppResult<()> {
    let res = sqlx::query("DELETE FROM event_attachments WHERE id = ? AND event_id = ?")
        .bind(id)
        .bind(event_id)
        .execute(pool)
        .await
        .map_err(|err| AppError::from(err).with_context("operation", "attachments_delete"))?;
    if res.rows_affected() == 0 {
        return Err(AppError::not_found(ATTACHMENTS_AREA, "Attachment not found")
            .with_context("event_id", event_id.to_string())
            .with_context("attachment_id", id.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{VALIDATION_INVALID_FIELD, VALIDATION_MISSING_FIELD};

    #[test]
    fn file_names_reject_separators() {
        assert_eq!(file_name(Some(" brief.pdf ")).unwrap(), "brief.pdf");
        assert_eq!(
            file_name(Some("../etc/passwd")).unwrap_err().code(),
            VALIDATION_INVALID_FIELD
        );
        assert_eq!(
            file_name(Some("a\\b.txt")).unwrap_err().code(),
            VALIDATION_INVALID_FIELD
        );
        assert_eq!(file_name(None).unwrap_err().code(), VALIDATION_MISSING_FIELD);
        assert!(file_name(Some(&"x".repeat(256))).is_err());
    }

    #[test]
    fn urls_reject_parent_segments() {
        assert!(url(Some("https://cdn.example.com/a/b.pdf")).is_ok());
        assert!(url(Some("https://cdn.example.com/a/../b.pdf")).is_err());
        // dots inside a segment are fine
        assert!(url(Some("https://cdn.example.com/a..b/c.pdf")).is_ok());
    }

    #[test]
    fn mime_is_guessed_from_extension() {
        assert_eq!(
            resolve_mime(None, "agenda.pdf").unwrap().as_deref(),
            Some("application/pdf")
        );
        assert_eq!(resolve_mime(None, "no_extension").unwrap(), None);
        assert_eq!(
            resolve_mime(Some("text/plain"), "agenda.pdf").unwrap().as_deref(),
            Some("text/plain")
        );
        assert!(resolve_mime(Some("nonsense"), "agenda.pdf").is_err());
    }
}

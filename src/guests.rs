use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};

use crate::{
    error::map_unique_violation,
    ticket_types,
    time::now_ms,
    validation::{self, nullable},
    AppError, AppResult,
};

pub const GUESTS_AREA: &str = "GUESTS";

const GUEST_COLUMNS: &str = "id, event_id, ticket_type_id, name, email, phone, checked_in, \
     checked_in_at, created_at, updated_at";

const DUPLICATE_EMAIL: &str = "A guest with this email is already on the list";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Guest {
    pub id: i64,
    pub event_id: i64,
    pub ticket_type_id: Option<i64>,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub checked_in: bool,
    pub checked_in_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl TryFrom<&SqliteRow> for Guest {
    type Error = AppError;

    fn try_from(row: &SqliteRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.try_get("id").map_err(AppError::from)?,
            event_id: row.try_get("event_id").map_err(AppError::from)?,
            ticket_type_id: row.try_get("ticket_type_id").map_err(AppError::from)?,
            name: row.try_get("name").map_err(AppError::from)?,
            email: row.try_get("email").map_err(AppError::from)?,
            phone: row.try_get("phone").map_err(AppError::from)?,
            checked_in: row
                .try_get::<i64, _>("checked_in")
                .map(|v| v != 0)
                .map_err(AppError::from)?,
            checked_in_at: row.try_get("checked_in_at").map_err(AppError::from)?,
            created_at: row.try_get("created_at").map_err(AppError::from)?,
            updated_at: row.try_get("updated_at").map_err(AppError::from)?,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GuestCreate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub ticket_type_id: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GuestUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub phone: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub ticket_type_id: Option<Option<i64>>,
}

fn guest_not_found(event_id: i64, id: i64) -> AppError {
    AppError::not_found(GUESTS_AREA, "Guest not found")
        .with_context("event_id", event_id.to_string())
        .with_context("guest_id", id.to_string())
}

async fn check_ticket_type(pool: &SqlitePool, event_id: i64, ticket_type_id: Option<i64>) -> AppResult<()> {
    if let Some(id) = ticket_type_id {
        ticket_types::require_in_event(pool, event_id, id).await?;
    }
    Ok(())
}

pub async fn list(pool: &SqlitePool, event_id: i64) -> AppResult<Vec<Guest>> {
    let sql = format!("SELECT {GUEST_COLUMNS} FROM guests WHERE event_id = ? ORDER BY id");
    let rows = sqlx::query(&sql)
        .bind(event_id)
        .fetch_all(pool)
        .await
        .map_err(|err| AppError::from(err).with_context("operation", "guests_list"))?;
    rows.iter().map(Guest::try_from).collect()
}

pub async fn require_in_event(pool: &SqlitePool, event_id: i64, id: i64) -> AppResult<Guest> {
    let sql = format!("SELECT {GUEST_COLUMNS} FROM guests WHERE id = ? AND event_id = ?");
    let row = sqlx::query(&sql)
        .bind(id)
        .bind(event_id)
        .fetch_optional(pool)
        .await
        .map_err(|err| AppError::from(err).with_context("operation", "guests_get"))?;
    match row {
        Some(row) => Guest::try_from(&row),
        None => Err(guest_not_found(event_id, id)),
    }
}

pub async fn create(pool: &SqlitePool, event_id: i64, payload: GuestCreate) -> AppResult<Guest> {
    let name = validation::required_text(payload.name.as_deref(), "name")?;
    validation::max_chars(&name, "name", 120)?;
    let raw_email = validation::required_text(payload.email.as_deref(), "email")?;
    let email = validation::email(&raw_email, "email")?;
    let phone = validation::optional_non_blank(payload.phone.as_deref(), "phone")?;
    check_ticket_type(pool, event_id, payload.ticket_type_id).await?;

    let now = now_ms();
    let res = sqlx::query(
        "INSERT INTO guests (event_id, ticket_type_id, name, email, phone, checked_in, checked_in_at, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, 0, NULL, ?6, ?7)",
    )
    .bind(event_id)
    .bind(payload.ticket_type_id)
    .bind(&name)
    .bind(&email)
    .bind(&phone)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .map_err(|err| map_unique_violation(err, GUESTS_AREA, DUPLICATE_EMAIL))?;

    Ok(Guest {
        id: res.last_insert_rowid(),
        event_id,
        ticket_type_id: payload.ticket_type_id,
        name,
        email,
        phone,
        checked_in: false,
        checked_in_at: None,
        created_at: now,
        updated_at: now,
    })
}

pub async fn update(
    pool: &SqlitePool,
    event_id: i64,
    id: i64,
    patch: GuestUpdate,
) -> AppResult<Guest> {
    let mut guest = require_in_event(pool, event_id, id).await?;
    if let Some(name) = validation::optional_non_blank(patch.name.as_deref(), "name")? {
        validation::max_chars(&name, "name", 120)?;
        guest.name = name;
    }
    if let Some(email) = patch.email {
        guest.email = validation::email(&email, "email")?;
    }
    if let Some(phone) = patch.phone {
        guest.phone = phone.filter(|p| !p.trim().is_empty());
    }
    if let Some(ticket_type_id) = patch.ticket_type_id {
        check_ticket_type(pool, event_id, ticket_type_id).await?;
        guest.ticket_type_id = ticket_type_id;
    }
    guest.updated_at = now_ms();

    sqlx::query(
        "UPDATE guests SET name = ?1, email = ?2, phone = ?3, ticket_type_id = ?4, updated_at = ?5 \
         WHERE id = ?6 AND event_id = ?7",
    )
    .bind(&guest.name)
    .bind(&guest.email)
    .bind(&guest.phone)
    .bind(guest.ticket_type_id)
    .bind(guest.updated_at)
    .bind(id)
    .bind(event_id)
    .execute(pool)
    .await
    .map_err(|err| map_unique_violation(err, GUESTS_AREA, DUPLICATE_EMAIL))?;
    Ok(guest)
}

/// Mark a guest as arrived. A repeat check-in keeps the first timestamp.
pub async fn check_in(pool: &SqlitePool, event_id: i64, id: i64) -> AppResult<Guest> {
    let now = now_ms();
    let res = sqlx::query(
        "UPDATE guests SET checked_in = 1, checked_in_at = COALESCE(checked_in_at, ?1), updated_at = ?1 \
         WHERE id = ?2 AND event_id = ?3",
    )
    .bind(now)
    .bind(id)
    .bind(event_id)
    .execute(pool)
    .await
    .map_err(|err| AppError::from(err).with_context("operation", "guests_check_in"))?;
    if res.rows_affected() == 0 {
        return Err(guest_not_found(event_id, id));
    }
    tracing::info!(target: "linkup", event = "guest_checked_in", event_id, guest_id = id);
    require_in_event(pool, event_id, id).await
}

pub async fn delete(pool: &SqlitePool, event_id: i64, id: i64) -> AppResult<()> {
    let res = sqlx::query("DELETE FROM guests WHERE id = ? AND event_id = ?")
        .bind(id)
        .bind(event_id)
        .execute(pool)
        .await
        .map_err(|err| AppError::from(err).with_context("operation", "guests_delete"))?;
    if res.rows_affected() == 0 {
        return Err(guest_not_found(event_id, id));
    }
    Ok(())
}

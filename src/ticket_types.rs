use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, Executor, Row, Sqlite, SqlitePool};

use crate::{
    error::map_unique_violation,
    time::now_ms,
    validation::{self, nullable},
    AppError, AppResult,
};

pub const TICKET_TYPES_AREA: &str = "TICKET_TYPES";
pub const VALIDATION_QUANTITY_BELOW_SOLD: &str = "VALIDATION/QUANTITY_BELOW_SOLD";

const TICKET_TYPE_COLUMNS: &str = "id, event_id, name, price, quantity_total, quantity_sold, \
     sale_start, sale_end, created_at, updated_at";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketType {
    pub id: i64,
    pub event_id: i64,
    pub name: String,
    pub price: f64,
    pub quantity_total: i64,
    pub quantity_sold: i64,
    pub sale_start: Option<i64>,
    pub sale_end: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl TicketType {
    pub fn remaining(&self) -> i64 {
        (self.quantity_total - self.quantity_sold).max(0)
    }
}

impl TryFrom<&SqliteRow> for TicketType {
    type Error = AppError;

    fn try_from(row: &SqliteRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.try_get("id").map_err(AppError::from)?,
            event_id: row.try_get("event_id").map_err(AppError::from)?,
            name: row.try_get("name").map_err(AppError::from)?,
            price: row.try_get("price").map_err(AppError::from)?,
            quantity_total: row.try_get("quantity_total").map_err(AppError::from)?,
            quantity_sold: row.try_get("quantity_sold").map_err(AppError::from)?,
            sale_start: row.try_get("sale_start").map_err(AppError::from)?,
            sale_end: row.try_get("sale_end").map_err(AppError::from)?,
            created_at: row.try_get("created_at").map_err(AppError::from)?,
            updated_at: row.try_get("updated_at").map_err(AppError::from)?,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TicketTypeCreate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub quantity_total: Option<i64>,
    #[serde(default)]
    pub sale_start: Option<i64>,
    #[serde(default)]
    pub sale_end: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TicketTypeUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub quantity_total: Option<i64>,
    #[serde(default, deserialize_with = "nullable")]
    pub sale_start: Option<Option<i64>>,
    #[serde(default, deserialize_with = "nullable")]
    pub sale_end: Option<Option<i64>>,
}

fn validate(ticket: &TicketType) -> AppResult<()> {
    validation::max_chars(&ticket.name, "name", 100)?;
    validation::non_negative_f64(ticket.price, "price")?;
    validation::non_negative_i64(ticket.quantity_total, "quantity_total")?;
    if ticket.quantity_total < ticket.quantity_sold {
        return Err(AppError::new(
            VALIDATION_QUANTITY_BELOW_SOLD,
            "Total quantity cannot be lower than tickets already sold",
        )
        .with_context("quantity_total", ticket.quantity_total.to_string())
        .with_context("quantity_sold", ticket.quantity_sold.to_string()));
    }
    validation::time_range(ticket.sale_start, ticket.sale_end, "sale_start", "sale_end")
}

fn ticket_type_not_found(event_id: i64, id: i64) -> AppError {
    AppError::not_found(TICKET_TYPES_AREA, "Ticket type not found")
        .with_context("event_id", event_id.to_string())
        .with_context("ticket_type_id", id.to_string())
}

const DUPLICATE_NAME: &str = "A ticket type with this name already exists for the event";

pub async fn list(pool: &SqlitePool, event_id: i64) -> AppResult<Vec<TicketType>> {
    let sql = format!("SELECT {TICKET_TYPE_COLUMNS} FROM ticket_types WHERE event_id = ? ORDER BY id");
    let rows = sqlx::query(&sql)
        .bind(event_id)
        .fetch_all(pool)
        .await
        .map_err(|err| AppError::from(err).with_context("operation", "ticket_types_list"))?;
    rows.iter().map(TicketType::try_from).collect()
}

/// Look up a ticket type by id alone; callers enforce event scoping.
pub async fn get_by_id<'e, E>(executor: E, id: i64) -> AppResult<Option<TicketType>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!("SELECT {TICKET_TYPE_COLUMNS} FROM ticket_types WHERE id = ?");
    let row = sqlx::query(&sql)
        .bind(id)
        .fetch_optional(executor)
        .await
        .map_err(|err| AppError::from(err).with_context("operation", "ticket_types_get"))?;
    row.as_ref().map(TicketType::try_from).transpose()
}

pub async fn require_in_event(pool: &SqlitePool, event_id: i64, id: i64) -> AppResult<TicketType> {
    match get_by_id(pool, id).await? {
        Some(ticket) if ticket.event_id == event_id => Ok(ticket),
        _ => Err(ticket_type_not_found(event_id, id)),
    }
}

pub async fn create(
    pool: &SqlitePool,
    event_id: i64,
    payload: TicketTypeCreate,
) -> AppResult<TicketType> {
    let name = validation::required_text(payload.name.as_deref(), "name")?;
    let price = payload.price.ok_or_else(|| AppError::missing_field("price"))?;
    let quantity_total = payload
        .quantity_total
        .ok_or_else(|| AppError::missing_field("quantity_total"))?;
    let now = now_ms();
    let mut ticket = TicketType {
        id: 0,
        event_id,
        name,
        price,
        quantity_total,
        quantity_sold: 0,
        sale_start: payload.sale_start,
        sale_end: payload.sale_end,
        created_at: now,
        updated_at: now,
    };
    validate(&ticket)?;

    let res = sqlx::query(
        "INSERT INTO ticket_types (event_id, name, price, quantity_total, quantity_sold, sale_start, sale_end, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, 0, ?5, ?6, ?7, ?8)",
    )
    .bind(event_id)
    .bind(&ticket.name)
    .bind(ticket.price)
    .bind(ticket.quantity_total)
    .bind(ticket.sale_start)
    .bind(ticket.sale_end)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .map_err(|err| {
        map_unique_violation(err, TICKET_TYPES_AREA, DUPLICATE_NAME)
            .with_context("name", ticket.name.clone())
    })?;
    ticket.id = res.last_insert_rowid();
    Ok(ticket)
}

pub async fn update(
    pool: &SqlitePool,
    event_id: i64,
    id: i64,
    patch: TicketTypeUpdate,
) -> AppResult<TicketType> {
    let mut ticket = require_in_event(pool, event_id, id).await?;
    if let Some(name) = validation::optional_non_blank(patch.name.as_deref(), "name")? {
        ticket.name = name;
    }
    if let Some(price) = patch.price {
        ticket.price = price;
    }
    if let Some(total) = patch.quantity_total {
        ticket.quantity_total = total;
    }
    if let Some(start) = patch.sale_start {
        ticket.sale_start = start;
    }
    if let Some(end) = patch.sale_end {
        ticket.sale_end = end;
    }
    validate(&ticket)?;
    ticket.updated_at = now_ms();

    sqlx::query(
        "UPDATE ticket_types SET name = ?1, price = ?2, quantity_total = ?3, sale_start = ?4, \
         sale_end = ?5, updated_at = ?6 WHERE id = ?7 AND event_id = ?8",
    )
    .bind(&ticket.name)
    .bind(ticket.price)
    .bind(ticket.quantity_total)
    .bind(ticket.sale_start)
    .bind(ticket.sale_end)
    .bind(ticket.updated_at)
    .bind(id)
    .bind(event_id)
    .execute(pool)
    .await
    .map_err(|err| map_unique_violation(err, TICKET_TYPES_AREA, DUPLICATE_NAME))?;
    Ok(ticket)
}

pub async fn delete(pool: &SqlitePool, event_id: i64, id: i64) -> AppResult<()> {
    let res = sqlx::query("DELETE FROM ticket_types WHERE id = ? AND event_id = ?")
        .bind(id)
        .bind(event_id)
        .execute(pool)
        .await
        .map_err(|err| AppError::from(err).with_context("operation", "ticket_types_delete"))?;
    if res.rows_affected() == 0 {
        return Err(ticket_type_not_found(event_id, id));
    }
    Ok(())
}

use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use std::str::FromStr;

use crate::{
    error::map_unique_violation,
    time::now_ms,
    validation::{self, nullable},
    AppError, AppResult,
};

pub const COUPONS_AREA: &str = "COUPONS";

const COUPON_COLUMNS: &str = "id, event_id, code, discount_type, discount_value, usage_limit, \
     used_count, valid_from, valid_until, created_at, updated_at";

const DUPLICATE_CODE: &str = "A coupon with this code already exists for the event";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiscountType {
    Percent,
    Fixed,
}

impl DiscountType {
    pub const fn as_str(self) -> &'static str {
        match self {
            DiscountType::Percent => "PERCENT",
            DiscountType::Fixed => "FIXED",
        }
    }
}

impl FromStr for DiscountType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PERCENT" => Ok(DiscountType::Percent),
            "FIXED" => Ok(DiscountType::Fixed),
            other => Err(AppError::new("COUPONS/DECODE", "Unknown discount type")
                .with_context("value", other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coupon {
    pub id: i64,
    pub event_id: i64,
    pub code: String,
    pub discount_type: DiscountType,
    pub discount_value: f64,
    pub usage_limit: Option<i64>,
    pub used_count: i64,
    pub valid_from: Option<i64>,
    pub valid_until: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl TryFrom<&SqliteRow> for Coupon {
    type Error = AppError;

    fn try_from(row: &SqliteRow) -> Result<Self, Self::Error> {
        let discount_type: String = row.try_get("discount_type").map_err(AppError::from)?;
        Ok(Self {
            id: row.try_get("id").map_err(AppError::from)?,
            event_id: row.try_get("event_id").map_err(AppError::from)?,
            code: row.try_get("code").map_err(AppError::from)?,
            discount_type: discount_type.parse()?,
            discount_value: row.try_get("discount_value").map_err(AppError::from)?,
            usage_limit: row.try_get("usage_limit").map_err(AppError::from)?,
            used_count: row.try_get("used_count").map_err(AppError::from)?,
            valid_from: row.try_get("valid_from").map_err(AppError::from)?,
            valid_until: row.try_get("valid_until").map_err(AppError::from)?,
            created_at: row.try_get("created_at").map_err(AppError::from)?,
            updated_at: row.try_get("updated_at").map_err(AppError::from)?,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CouponCreate {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub discount_type: Option<DiscountType>,
    #[serde(default)]
    pub discount_value: Option<f64>,
    #[serde(default)]
    pub usage_limit: Option<i64>,
    #[serde(default)]
    pub valid_from: Option<i64>,
    #[serde(default)]
    pub valid_until: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CouponUpdate {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub discount_type: Option<DiscountType>,
    #[serde(default)]
    pub discount_value: Option<f64>,
    #[serde(default, deserialize_with = "nullable")]
    pub usage_limit: Option<Option<i64>>,
    #[serde(default, deserialize_with = "nullable")]
    pub valid_from: Option<Option<i64>>,
    #[serde(default, deserialize_with = "nullable")]
    pub valid_until: Option<Option<i64>>,
}

fn validate(coupon: &Coupon) -> AppResult<()> {
    let value = coupon.discount_value;
    let ok = match coupon.discount_type {
        DiscountType::Percent => value.is_finite() && value > 0.0 && value <= 100.0,
        DiscountType::Fixed => value.is_finite() && value > 0.0,
    };
    if !ok {
        return Err(AppError::invalid_field(
            "discount_value",
            match coupon.discount_type {
                DiscountType::Percent => "Percentage discounts must be above 0 and at most 100",
                DiscountType::Fixed => "Fixed discounts must be greater than 0",
            },
        )
        .with_context("value", value.to_string()));
    }
    if let Some(limit) = coupon.usage_limit {
        if limit < 1 {
            return Err(AppError::invalid_field(
                "usage_limit",
                "Usage limit must be at least 1",
            ));
        }
        if limit < coupon.used_count {
            return Err(AppError::invalid_field(
                "usage_limit",
                "Usage limit cannot be lower than redemptions so far",
            )
            .with_context("used_count", coupon.used_count.to_string()));
        }
    }
    validation::time_range(coupon.valid_from, coupon.valid_until, "valid_from", "valid_until")
}

fn coupon_not_found(event_id: i64, id: i64) -> AppError {
    AppError::not_found(COUPONS_AREA, "Coupon not found")
        .with_context("event_id", event_id.to_string())
        .with_context("coupon_id", id.to_string())
}

pub async fn list(pool: &SqlitePool, event_id: i64) -> AppResult<Vec<Coupon>> {
    let sql = format!("SELECT {COUPON_COLUMNS} FROM coupons WHERE event_id = ? ORDER BY id");
    let rows = sqlx::query(&sql)
        .bind(event_id)
        .fetch_all(pool)
        .await
        .map_err(|err| AppError::from(err).with_context("operation", "coupons_list"))?;
    rows.iter().map(Coupon::try_from).collect()
}

pub async fn require_in_event(pool: &SqlitePool, event_id: i64, id: i64) -> AppResult<Coupon> {
    let sql = format!("SELECT {COUPON_COLUMNS} FROM coupons WHERE id = ? AND event_id = ?");
    let row = sqlx::query(&sql)
        .bind(id)
        .bind(event_id)
        .fetch_optional(pool)
        .await
        .map_err(|err| AppError::from(err).with_context("operation", "coupons_get"))?;
    match row {
        Some(row) => Coupon::try_from(&row),
        None => Err(coupon_not_found(event_id, id)),
    }
}

pub async fn create(pool: &SqlitePool, event_id: i64, payload: CouponCreate) -> AppResult<Coupon> {
    let raw_code = validation::required_text(payload.code.as_deref(), "code")?;
    let code = validation::coupon_code(&raw_code, "code")?;
    let discount_type = payload
        .discount_type
        .ok_or_else(|| AppError::missing_field("discount_type"))?;
    let discount_value = payload
        .discount_value
        .ok_or_else(|| AppError::missing_field("discount_value"))?;
    let now = now_ms();
    let mut coupon = Coupon {
        id: 0,
        event_id,
        code,
        discount_type,
        discount_value,
        usage_limit: payload.usage_limit,
        used_count: 0,
        valid_from: payload.valid_from,
        valid_until: payload.valid_until,
        created_at: now,
        updated_at: now,
    };
    validate(&coupon)?;

    let res = sqlx::query(
        "INSERT INTO coupons (event_id, code, discount_type, discount_value, usage_limit, used_count, valid_from, valid_until, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, ?7, ?8, ?9)",
    )
    .bind(event_id)
    .bind(&coupon.code)
    .bind(coupon.discount_type.as_str())
    .bind(coupon.discount_value)
    .bind(coupon.usage_limit)
    .bind(coupon.valid_from)
    .bind(coupon.valid_until)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .map_err(|err| {
        map_unique_violation(err, COUPONS_AREA, DUPLICATE_CODE).with_context("code", coupon.code.clone())
    })?;
    coupon.id = res.last_insert_rowid();
    Ok(coupon)
}

pub async fn update(
    pool: &SqlitePool,
    event_id: i64,
    id: i64,
    patch: CouponUpdate,
) -> AppResult<Coupon> {
    let mut coupon = require_in_event(pool, event_id, id).await?;
    if let Some(code) = patch.code {
        coupon.code = validation::coupon_code(&code, "code")?;
    }
    if let Some(discount_type) = patch.discount_type {
        coupon.discount_type = discount_type;
    }
    if let Some(value) = patch.discount_value {
        coupon.discount_value = value;
    }
    if let Some(limit) = patch.usage_limit {
        coupon.usage_limit = limit;
    }
    if let Some(from) = patch.valid_from {
        coupon.valid_from = from;
    }
    if let Some(until) = patch.valid_until {
        coupon.valid_until = until;
    }
    validate(&coupon)?;
    coupon.updated_at = now_ms();

    sqlx::query(
        "UPDATE coupons SET code = ?1, discount_type = ?2, discount_value = ?3, usage_limit = ?4, \
         valid_from = ?5, valid_until = ?6, updated_at = ?7 WHERE id = ?8 AND event_id = ?9",
    )
    .bind(&coupon.code)
    .bind(coupon.discount_type.as_str())
    .bind(coupon.discount_value)
    .bind(coupon.usage_limit)
    .bind(coupon.valid_from)
    .bind(coupon.valid_until)
    .bind(coupon.updated_at)
    .bind(id)
    .bind(event_id)
    .execute(pool)
    .await
    .map_err(|err| map_unique_violation(err, COUPONS_AREA, DUPLICATE_CODE))?;
    Ok(coupon)
}

pub async fn delete(pool: &SqlitePool, event_id: i64, id: i64) -> AppResult<()> {
    let res = sqlx::query("DELETE FROM coupons WHERE id = ? AND event_id = ?")
        .bind(id)
        .bind(event_id)
        .execute(pool)
        .await
        .map_err(|err| AppError::from(err).with_context("operation", "coupons_delete"))?;
    if res.rows_affected() == 0 {
        return Err(coupon_not_found(event_id, id));
    }
    Ok(())
}
